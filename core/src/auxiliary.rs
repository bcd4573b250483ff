//! Start/verify the secondary AI-assistant process inside a session's mux
//! pane, with conditional-update race protection. Grounded on
//! storage/terminal_claude.py's `update_claude_state` and
//! api/terminal.py's auto-start-on-connect logic.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::bridge::BridgeRegistry;
use crate::error::LifecycleError;
use crate::model::{AuxiliaryState, SessionId};
use crate::mux::{self, MuxDriver};
use crate::store::Store;

/// Delay before checking whether the launched process actually came up.
const VERIFY_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartResult {
    pub started: bool,
    pub state: AuxiliaryState,
}

pub struct AuxiliaryLifecycle {
    store: Arc<dyn Store>,
    mux: Arc<MuxDriver>,
    bridges: Arc<BridgeRegistry>,
    launch_command: String,
    process_name: String,
}

impl AuxiliaryLifecycle {
    pub fn new(
        store: Arc<dyn Store>,
        mux: Arc<MuxDriver>,
        bridges: Arc<BridgeRegistry>,
        launch_command: impl Into<String>,
        process_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            mux,
            bridges,
            launch_command: launch_command.into(),
            process_name: process_name.into(),
        }
    }

    /// Attempt to start the auxiliary process for `session_id`. Only one
    /// concurrent caller wins the race to `Starting`; the rest observe the
    /// already-advanced state and return without side effects.
    pub async fn start_auxiliary(&self, session_id: SessionId) -> Result<StartResult, LifecycleError> {
        let current = self
            .store
            .get_auxiliary_state(session_id)
            .await?
            .unwrap_or(AuxiliaryState::NotStarted);

        if matches!(current, AuxiliaryState::Running | AuxiliaryState::Starting) {
            return Ok(StartResult {
                started: false,
                state: current,
            });
        }

        let won = self
            .store
            .update_auxiliary_state(session_id, AuxiliaryState::Starting, Some(current))
            .await?;

        if !won {
            let observed = self
                .store
                .get_auxiliary_state(session_id)
                .await?
                .unwrap_or(current);
            return Ok(StartResult {
                started: false,
                state: observed,
            });
        }

        if let Some(handle) = self.bridges.get(session_id) {
            handle.write(self.launch_command.as_bytes()).await;
            handle.write(b"\r").await;
        }
        info!(session = %session_id, "auxiliary_launch_sent");

        self.schedule_verification(session_id);

        Ok(StartResult {
            started: true,
            state: AuxiliaryState::Starting,
        })
    }

    fn schedule_verification(&self, session_id: SessionId) {
        let store = self.store.clone();
        let mux = self.mux.clone();
        let process_name = self.process_name.clone();

        tokio::spawn(async move {
            tokio::time::sleep(VERIFY_DELAY).await;

            let name = mux::session_name(&session_id.to_string());
            let running = mux.is_auxiliary_running(&name, &process_name).await;
            let new_state = if running {
                AuxiliaryState::Running
            } else {
                AuxiliaryState::Error
            };

            match store
                .update_auxiliary_state(session_id, new_state, Some(AuxiliaryState::Starting))
                .await
            {
                Ok(true) => info!(session = %session_id, state = new_state.as_str(), "auxiliary_verified"),
                Ok(false) => info!(session = %session_id, "auxiliary_verification_stale"),
                Err(e) => warn!(session = %session_id, error = %e, "auxiliary_verification_failed"),
            }
        });
    }

    pub async fn get_auxiliary_state(&self, session_id: SessionId) -> Result<AuxiliaryState, LifecycleError> {
        Ok(self
            .store
            .get_auxiliary_state(session_id)
            .await?
            .unwrap_or(AuxiliaryState::NotStarted))
    }
}
