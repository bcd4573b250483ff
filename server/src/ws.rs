//! `/ws/terminal/{id}` WebSocket bridge, and the `client-session-changed`
//! hook receiver. Grounded on `web_server.rs`'s `ws_handler`/
//! `handle_socket_attach` pattern and `api/terminal.py`'s hook handler, but
//! rebuilt around a fresh PTY-per-connection attaching to a standing mux
//! session.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{SinkExt, StreamExt};

use common::bridge::BridgeHandle;
use common::model::SessionMode;
use common::mux;
use common::pty::{BridgeEvent, PtyBridge};

use crate::state::AppState;

const RESIZE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const AUXILIARY_LAUNCH_DELAY: Duration = Duration::from_millis(500);

#[derive(serde::Deserialize)]
struct ControlMessage {
    resize: Option<ResizeDims>,
    #[serde(default)]
    refresh: bool,
}

#[derive(serde::Deserialize)]
struct ResizeDims {
    cols: u16,
    rows: u16,
}

pub async fn terminal_ws_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let session_id = match common::model::SessionId::parse(&id) {
        Some(id) => id,
        None => {
            return ws
                .on_upgrade(|mut socket| async move {
                    close_session_dead(&mut socket, "invalid session id").await;
                })
                .into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_terminal_socket(socket, state, session_id))
}

async fn close_session_dead(socket: &mut WebSocket, message: &str) {
    let reason = serde_json::json!({ "error": "session_dead", "message": message }).to_string();
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: 4000,
            reason: reason.into(),
        })))
        .await;
}

/// Close a steady-state connection after an internal error (a mux/pty
/// failure from `bridge.resize`), per the 1011 + string-reason contract —
/// distinct from `close_session_dead`'s pre-setup 4000 + JSON contract.
async fn close_internal_error(
    ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    reason: String,
) {
    let _ = ws_tx
        .send(Message::Close(Some(CloseFrame {
            code: 1011,
            reason: reason.into(),
        })))
        .await;
}

async fn handle_terminal_socket(mut socket: WebSocket, state: AppState, session_id: common::model::SessionId) {
    let alive = match state.lifecycle.ensure_alive(session_id).await {
        Ok(alive) => alive,
        Err(e) => {
            tracing::warn!(session = %session_id, error = %e, "ensure_alive_failed");
            close_session_dead(&mut socket, "lifecycle error").await;
            return;
        }
    };
    if !alive {
        close_session_dead(&mut socket, "session not found or could not be revived").await;
        return;
    }

    let _ = state.store.touch(session_id).await;

    let row = match state.store.get_session(session_id).await {
        Ok(Some(row)) => row,
        _ => {
            close_session_dead(&mut socket, "session row vanished").await;
            return;
        }
    };

    if let Err(e) = state.mux.create(&session_id.to_string(), row.working_dir.as_deref()).await {
        tracing::warn!(session = %session_id, error = %e, "mux_create_failed");
        close_session_dead(&mut socket, "mux session unavailable").await;
        return;
    }

    let base = mux::session_name(&session_id.to_string());
    let target = match &row.last_target_session {
        Some(t) if mux::validate_name(t) && state.mux.exists_by_name(t).await => Some(t.as_str()),
        _ => None,
    };

    let mut bridge = match PtyBridge::attach(&base, target) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(session = %session_id, error = %e, "pty_attach_failed");
            close_session_dead(&mut socket, "failed to attach pty").await;
            return;
        }
    };

    let writer = bridge.writer();
    let mut output_rx = bridge.take_output();

    let (write_tx, mut write_rx) = tokio::sync::mpsc::channel::<Vec<u8>>(64);
    let (resize_tx, mut resize_rx) = tokio::sync::mpsc::channel::<(u16, u16)>(8);
    state
        .bridges
        .insert(session_id, BridgeHandle::new(write_tx, resize_tx));

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Initial-resize handshake: wait up to 5s for the first client control
    // message. Any message received (resize or not) is forwarded to the
    // normal control/raw-input dispatcher so no client bytes are lost.
    let handshake = tokio::time::timeout(RESIZE_HANDSHAKE_TIMEOUT, ws_rx.next()).await;
    match handshake {
        Ok(Some(Ok(msg))) => {
            if let Err(e) = dispatch_client_message(msg, &writer, &bridge, &state.mux, &base).await {
                tracing::warn!(session = %session_id, error = %e, "resize_handshake_internal_error");
                close_internal_error(&mut ws_tx, e.to_string()).await;
                state.bridges.remove(session_id);
                bridge.teardown();
                return;
            }
        }
        Ok(Some(Err(_))) | Ok(None) => {
            state.bridges.remove(session_id);
            bridge.teardown();
            return;
        }
        Err(_) => {
            tracing::debug!(session = %session_id, "resize_handshake_timeout");
        }
    }

    if let Some(scrollback) = state.mux.capture_scrollback(&base).await {
        let _ = ws_tx.send(Message::Text(scrollback.into())).await;
    }

    if matches!(row.mode, SessionMode::Auxiliary)
        && !state
            .mux
            .is_auxiliary_running(&base, &state.config.auxiliary_process_name)
            .await
    {
        let auxiliary = state.auxiliary.clone();
        tokio::spawn(async move {
            tokio::time::sleep(AUXILIARY_LAUNCH_DELAY).await;
            if let Err(e) = auxiliary.start_auxiliary(session_id).await {
                tracing::warn!(session = %session_id, error = %e, "auxiliary_start_failed");
            }
        });
    }

    let reader_task = async {
        while let Some(event) = output_rx.recv().await {
            match event {
                BridgeEvent::Output(text) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                BridgeEvent::Exited => break,
            }
        }
        None
    };

    // `None` means a normal disconnect or pty exit; `Some(e)` carries the
    // internal error that ended the steady state (resize/mux failure),
    // which must be reported to the client with a 1011 close before teardown.
    let writer_task = async {
        loop {
            tokio::select! {
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(msg)) => {
                            if let Err(e) = dispatch_client_message(msg, &writer, &bridge, &state.mux, &base).await {
                                break Some(e);
                            }
                        }
                        _ => break None,
                    }
                }
                Some(bytes) = write_rx.recv() => {
                    writer.write(&bytes).await;
                }
                Some((cols, rows)) = resize_rx.recv() => {
                    if let Err(e) = bridge.resize(&state.mux, &base, cols, rows).await {
                        break Some(e);
                    }
                }
            }
        }
    };

    let termination: Option<common::error::BridgeError> = tokio::select! {
        reason = reader_task => reason,
        reason = writer_task => reason,
    };

    state.bridges.remove(session_id);
    if let Some(e) = termination {
        tracing::warn!(session = %session_id, error = %e, "steady_state_internal_error");
        close_internal_error(&mut ws_tx, e.to_string()).await;
    }
    bridge.teardown();
}

async fn dispatch_client_message(
    msg: Message,
    writer: &common::pty::PtyWriter,
    bridge: &PtyBridge,
    mux: &mux::MuxDriver,
    mux_name: &str,
) -> Result<(), common::error::BridgeError> {
    match msg {
        Message::Text(text) => {
            let trimmed = text.trim_start();
            if trimmed.starts_with('{') {
                if let Ok(control) = serde_json::from_str::<ControlMessage>(trimmed) {
                    if let Some(dims) = control.resize {
                        bridge.resize(mux, mux_name, dims.cols, dims.rows).await?;
                        return Ok(());
                    }
                    if control.refresh {
                        writer.write(b"\x0c").await;
                        return Ok(());
                    }
                }
            }
            writer.write(text.as_bytes()).await;
        }
        Message::Binary(bytes) => writer.write(&bytes).await,
        _ => {}
    }
    Ok(())
}

#[derive(serde::Deserialize)]
pub struct SwitchHookQuery {
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
}

/// `GET /api/internal/session-switch` — loopback-only hook registered with
/// the multiplexer as a `client-session-changed` hook at startup.
pub async fn session_switch_hook(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<SwitchHookQuery>,
) -> Json<serde_json::Value> {
    if !addr.ip().is_loopback() {
        tracing::warn!(peer = %addr, "session_switch_hook_rejected_non_loopback");
        return Json(serde_json::json!({ "status": "rejected" }));
    }

    if !query.from.is_empty() && !mux::validate_name(&query.from) {
        return Json(serde_json::json!({ "status": "ignored" }));
    }
    if !query.to.is_empty() && !mux::validate_name(&query.to) {
        return Json(serde_json::json!({ "status": "ignored" }));
    }

    let Some(terminal_id) = mux::strip_prefix(&query.from) else {
        return Json(serde_json::json!({ "status": "ignored" }));
    };
    let Some(session_id) = common::model::SessionId::parse(terminal_id) else {
        return Json(serde_json::json!({ "status": "ignored" }));
    };

    let clearing = mux::strip_prefix(&query.to).is_some();
    let target = if clearing { None } else { Some(query.to.as_str()) };

    match state.store.update_target_session(session_id, target).await {
        Ok(true) => Json(serde_json::json!({ "status": if clearing { "cleared" } else { "stored" } })),
        Ok(false) => Json(serde_json::json!({ "status": "ignored" })),
        Err(e) => {
            tracing::warn!(error = %e, "session_switch_hook_store_failed");
            Json(serde_json::json!({ "status": "ignored" }))
        }
    }
}
