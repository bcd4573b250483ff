//! Bulk reset operations over one or many projects.
//! Grounded on services/lifecycle_batch.py.

use std::sync::Arc;

use tracing::info;

use crate::error::LifecycleError;
use crate::model::{PaneId, SessionId, SessionMode};
use crate::store::{SettingsUpdate, Store};

use super::core::LifecycleCore;

pub struct LifecycleBatch {
    store: Arc<dyn Store>,
    core: Arc<LifecycleCore>,
}

impl LifecycleBatch {
    pub fn new(store: Arc<dyn Store>, core: Arc<LifecycleCore>) -> Self {
        Self { store, core }
    }

    /// Delete and recreate a single session, preserving its identity fields.
    /// The returned id may resurrect a different dead row for the same
    /// (project, mode), so it need not equal a fresh UUID.
    pub async fn reset(&self, id: SessionId) -> Result<Option<SessionId>, LifecycleError> {
        let row = match self.core.get(id).await? {
            Some(row) => row,
            None => return Ok(None),
        };

        self.core.delete(id).await?;

        let new_id = self
            .core
            .create(
                &row.name,
                row.project_id.as_deref(),
                row.working_dir.as_deref(),
                row.mode,
                row.pane_id,
            )
            .await?;
        Ok(Some(new_id))
    }

    /// Delete every live session for a project and recreate one per mode.
    pub async fn reset_project(
        &self,
        project_id: &str,
        working_dir: Option<&str>,
    ) -> Result<Vec<SessionId>, LifecycleError> {
        let sessions = self.store.get_all_project_sessions(project_id).await?;

        let mut orphans_cleaned = 0usize;
        let mut seen_modes = std::collections::HashSet::new();
        let mut representative: std::collections::HashMap<
            SessionMode,
            (String, Option<String>, Option<PaneId>),
        > = std::collections::HashMap::new();

        for row in &sessions {
            if seen_modes.insert(row.mode) {
                representative.insert(row.mode, (row.name.clone(), row.working_dir.clone(), row.pane_id));
            } else {
                orphans_cleaned += 1;
            }
            self.core.delete(row.id).await?;
        }

        if orphans_cleaned > 0 {
            info!(project_id, orphans_cleaned, "reset_project_orphans_cleaned");
        }

        let mut created = Vec::new();
        for mode in [SessionMode::Shell, SessionMode::Auxiliary] {
            let (name, old_dir, pane_id) = representative
                .get(&mode)
                .cloned()
                .unwrap_or_else(|| (project_id.to_string(), None, None));
            let dir = working_dir.map(|s| s.to_string()).or(old_dir);
            let id = self
                .core
                .create(&name, Some(project_id), dir.as_deref(), mode, pane_id)
                .await?;
            created.push(id);
        }
        Ok(created)
    }

    /// Reset every live session in the system; returns the count reset.
    pub async fn reset_all(&self) -> Result<u64, LifecycleError> {
        let sessions = self.store.list_sessions(false).await?;
        let mut count = 0u64;
        for row in sessions {
            if self.reset(row.id).await?.is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Delete all live sessions for a project and mark it disabled.
    pub async fn disable_project(&self, project_id: &str) -> Result<(), LifecycleError> {
        let sessions = self.store.get_all_project_sessions(project_id).await?;
        for row in sessions {
            self.core.delete(row.id).await?;
        }
        self.store
            .upsert_settings(
                project_id,
                SettingsUpdate {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }
}
