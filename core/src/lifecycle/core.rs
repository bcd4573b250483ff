//! Atomic single-session operations with strict rollback rules.
//! Grounded on services/lifecycle_core.py.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::LifecycleError;
use crate::model::{PaneId, Session, SessionId, SessionMode};
use crate::mux::MuxDriver;
use crate::store::{NewSession, SessionUpdate, Store};

pub struct LifecycleCore {
    store: Arc<dyn Store>,
    mux: Arc<MuxDriver>,
}

impl LifecycleCore {
    pub fn new(store: Arc<dyn Store>, mux: Arc<MuxDriver>) -> Self {
        Self { store, mux }
    }

    /// Create a session, preferring resurrection of a dead row for the same
    /// `(project_id, mode)` over inserting a new one.
    pub async fn create(
        &self,
        name: &str,
        project_id: Option<&str>,
        working_dir: Option<&str>,
        mode: SessionMode,
        pane_id: Option<PaneId>,
    ) -> Result<SessionId, LifecycleError> {
        if let Some(project_id) = project_id {
            if let Some(dead) = self.store.get_dead_session_by_project(project_id, mode).await? {
                let id = dead.id;
                self.store
                    .update_session(
                        id,
                        SessionUpdate {
                            name: Some(name.to_string()),
                            working_dir: working_dir.map(|s| s.to_string()),
                            is_alive: Some(true),
                        },
                    )
                    .await?;

                match self.mux.create(&id.to_string(), working_dir).await {
                    Ok(_) => {
                        info!(session = %id, "session_resurrected");
                        return Ok(id);
                    }
                    Err(e) => {
                        warn!(session = %id, error = %e, "resurrection_mux_failed");
                        self.store.mark_dead(id).await?;
                        return Err(LifecycleError::Mux(e));
                    }
                }
            }
        }

        let created = self
            .store
            .create_session(NewSession {
                name: name.to_string(),
                project_id: project_id.map(|s| s.to_string()),
                working_dir: working_dir.map(|s| s.to_string()),
                mode,
                pane_id,
            })
            .await?;
        let id = created.id;

        match self.mux.create(&id.to_string(), working_dir).await {
            Ok(_) => {
                info!(session = %id, "session_created");
                Ok(id)
            }
            Err(e) => {
                warn!(session = %id, error = %e, "new_session_mux_failed");
                self.store.delete_session(id).await?;
                Err(LifecycleError::Mux(e))
            }
        }
    }

    /// Idempotent delete: best-effort mux kill, then Store delete. Always
    /// returns true.
    pub async fn delete(&self, id: SessionId) -> Result<bool, LifecycleError> {
        let _ = self.mux.kill(&id.to_string(), true).await;
        self.store.delete_session(id).await?;
        Ok(true)
    }

    /// Ensure the session is reachable, recreating its mux session if needed.
    /// Called at WebSocket connect time.
    pub async fn ensure_alive(&self, id: SessionId) -> Result<bool, LifecycleError> {
        let row = match self.store.get_session(id).await? {
            Some(row) => row,
            None => return Ok(false),
        };

        if self.mux.exists_by_id(&id.to_string()).await {
            if !row.is_alive {
                self.store
                    .update_session(
                        id,
                        SessionUpdate {
                            is_alive: Some(true),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
            return Ok(true);
        }

        match self.mux.create(&id.to_string(), row.working_dir.as_deref()).await {
            Ok(_) => {
                self.store
                    .update_session(
                        id,
                        SessionUpdate {
                            is_alive: Some(true),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(true)
            }
            Err(e) => {
                warn!(session = %id, error = %e, "ensure_alive_mux_failed");
                self.store.mark_dead(id).await?;
                Ok(false)
            }
        }
    }

    pub async fn get(&self, id: SessionId) -> Result<Option<Session>, LifecycleError> {
        Ok(self.store.get_session(id).await?)
    }
}
