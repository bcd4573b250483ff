//! Router assembly and the standalone server entry point. Binds to
//! 127.0.0.1 only — the session-switch hook and WebSocket bridge both assume
//! a loopback-only deployment.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use common::auxiliary::AuxiliaryLifecycle;
use common::bridge::BridgeRegistry;
use common::config::Config;
use common::lifecycle::{LifecycleBatch, LifecycleCore, Reconciler};
use common::mux::MuxDriver;
use common::pane::PaneManager;
use common::store::SqliteStore;

use crate::routes;
use crate::state::AppState;
use crate::ws;

pub async fn run_server(config: &'static Config) -> anyhow::Result<()> {
    let store: Arc<dyn common::store::Store> = Arc::new(SqliteStore::open(&config.db_path)?);
    let mux = Arc::new(MuxDriver::with_extra_filtered_env_vars(
        config.mux_binary.clone(),
        config.extra_filtered_env_vars.clone(),
    ));

    let reconciler = Reconciler::with_retention(store.clone(), mux.clone(), config.purge_after_days);
    let report = reconciler.run().await?;
    tracing::info!(
        flipped_alive = report.flipped_alive,
        flipped_dead = report.flipped_dead,
        purged = report.purged,
        orphans_killed = report.orphans_killed,
        "startup_reconciliation_done"
    );

    let lifecycle = Arc::new(LifecycleCore::new(store.clone(), mux.clone()));
    let batch = Arc::new(LifecycleBatch::new(store.clone(), lifecycle.clone()));
    let panes = Arc::new(PaneManager::new(store.clone()));
    let bridges = Arc::new(BridgeRegistry::new());
    let auxiliary = Arc::new(AuxiliaryLifecycle::new(
        store.clone(),
        mux.clone(),
        bridges.clone(),
        config.auxiliary_command.clone(),
        config.auxiliary_process_name.clone(),
    ));

    let callback_base = format!("http://127.0.0.1:{}/api/internal/session-switch", config.port);
    mux.register_switch_hook(&callback_base).await;

    let state = AppState {
        store,
        mux,
        lifecycle,
        batch,
        panes,
        auxiliary,
        bridges,
        config,
    };

    let app = build_router(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server_listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/terminal/{id}", get(ws::terminal_ws_handler))
        .route("/api/internal/session-switch", get(ws::session_switch_hook))
        .route("/api/sessions", get(routes::list_sessions))
        .route("/api/sessions/reset-all", post(routes::reset_all_sessions))
        .route(
            "/api/sessions/{id}",
            get(routes::get_session)
                .patch(routes::update_session)
                .delete(routes::delete_session),
        )
        .route("/api/sessions/{id}/reset", post(routes::reset_session))
        .route(
            "/api/sessions/{id}/auxiliary",
            get(routes::get_auxiliary_state),
        )
        .route(
            "/api/sessions/{id}/auxiliary/start",
            post(routes::start_auxiliary),
        )
        .route("/api/panes", get(routes::list_panes).post(routes::create_pane))
        .route("/api/panes/count", get(routes::count_panes))
        .route("/api/panes/swap", post(routes::swap_panes))
        .route("/api/panes/order", post(routes::update_pane_order))
        .route("/api/panes/layout", post(routes::update_pane_layouts))
        .route(
            "/api/panes/{id}",
            get(routes::get_pane)
                .patch(routes::update_pane)
                .delete(routes::delete_pane),
        )
        .route(
            "/api/projects/{project_id}/settings",
            get(routes::get_project_settings).put(routes::upsert_project_settings),
        )
        .route(
            "/api/projects/{project_id}/disable",
            post(routes::disable_project),
        )
        .with_state(state)
}
