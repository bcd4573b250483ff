//! PaneManager: grouping of 1-2 sessions into a pane, with a hard cap on
//! total panes. Grounded on storage/pane_crud.py.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::LifecycleError;
use crate::model::{PaneId, PaneType, PaneWithSessions, MAX_PANES};
use crate::store::{NewPane, PaneLayoutUpdate, PaneUpdate, Store};

const LAYOUT_RETRY_DELAYS_MS: [u64; 2] = [100, 200];

pub struct PaneManager {
    store: Arc<dyn Store>,
}

impl PaneManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_with_sessions(
        &self,
        pane_type: PaneType,
        pane_name: &str,
        project_id: Option<&str>,
        working_dir: Option<&str>,
        pane_order: Option<i64>,
    ) -> Result<PaneWithSessions, LifecycleError> {
        match pane_type {
            PaneType::Project if project_id.is_none() => {
                return Err(LifecycleError::InvalidRequest(
                    "project panes require a project_id".to_string(),
                ));
            }
            PaneType::Adhoc if project_id.is_some() => {
                return Err(LifecycleError::InvalidRequest(
                    "adhoc panes must not have a project_id".to_string(),
                ));
            }
            _ => {}
        }

        let count = self.store.count_panes().await?;
        if count >= MAX_PANES {
            return Err(LifecycleError::InvalidRequest(format!(
                "pane cap reached ({MAX_PANES})"
            )));
        }

        Ok(self
            .store
            .create_pane_with_sessions(NewPane {
                pane_type,
                pane_name: pane_name.to_string(),
                project_id: project_id.map(|s| s.to_string()),
                working_dir: working_dir.map(|s| s.to_string()),
                pane_order,
            })
            .await?)
    }

    pub async fn update_pane(
        &self,
        id: PaneId,
        mut fields: PaneUpdate,
    ) -> Result<Option<crate::model::Pane>, LifecycleError> {
        if let Some(mode) = fields.active_mode {
            if matches!(mode, crate::model::SessionMode::Auxiliary) {
                let pane = self.store.get_pane(id).await?;
                if matches!(pane.map(|p| p.pane_type), Some(PaneType::Adhoc)) {
                    return Err(LifecycleError::InvalidRequest(
                        "adhoc panes cannot run in auxiliary mode".to_string(),
                    ));
                }
            }
        } else {
            fields.active_mode = None;
        }
        Ok(self.store.update_pane(id, fields).await?)
    }

    pub async fn delete_pane(&self, id: PaneId) -> Result<bool, LifecycleError> {
        Ok(self.store.delete_pane(id).await?)
    }

    pub async fn swap_positions(&self, a: PaneId, b: PaneId) -> Result<(), LifecycleError> {
        if !self.store.swap_pane_positions(a, b).await? {
            return Err(LifecycleError::InvalidRequest(
                "one or both panes not found".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn update_order(&self, orders: &[(PaneId, i64)]) -> Result<(), LifecycleError> {
        Ok(self.store.update_pane_order(orders).await?)
    }

    /// Apply layout updates, retrying up to 3 times with linear backoff on
    /// storage contention.
    pub async fn update_layouts(&self, items: &[PaneLayoutUpdate]) -> Result<(), LifecycleError> {
        let mut attempt = 0;
        loop {
            match self.store.update_pane_layouts(items).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < LAYOUT_RETRY_DELAYS_MS.len() => {
                    warn!(attempt, error = %e, "pane_layout_update_retry");
                    tokio::time::sleep(Duration::from_millis(LAYOUT_RETRY_DELAYS_MS[attempt])).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
