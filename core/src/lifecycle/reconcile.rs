//! Startup reconciliation between the Store and the live mux sessions.
//! Order matters: purge dead rows before computing orphans, so orphan
//! detection runs against the post-purge Store contents.
//! Grounded on services/lifecycle_reconcile.py.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use crate::error::LifecycleError;
use crate::mux::MuxDriver;
use crate::store::{SessionUpdate, Store};

/// Fallback retention window when no config value is supplied.
const DEFAULT_ORPHAN_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Default, Clone)]
pub struct ReconcileReport {
    pub flipped_alive: u64,
    pub flipped_dead: u64,
    pub purged: u64,
    pub orphans_killed: u64,
}

pub struct Reconciler {
    store: Arc<dyn Store>,
    mux: Arc<MuxDriver>,
    purge_after_days: i64,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>, mux: Arc<MuxDriver>) -> Self {
        Self::with_retention(store, mux, DEFAULT_ORPHAN_RETENTION_DAYS)
    }

    /// Same as `new`, but with an explicit purge retention window (the
    /// `purge_after_days` config field; `new` assumes the default of 7).
    pub fn with_retention(store: Arc<dyn Store>, mux: Arc<MuxDriver>, purge_after_days: i64) -> Self {
        Self {
            store,
            mux,
            purge_after_days,
        }
    }

    pub async fn run(&self) -> Result<ReconcileReport, LifecycleError> {
        let mut report = ReconcileReport::default();

        let rows = self.store.list_sessions(true).await?;
        let live_mux: HashSet<String> = self.mux.list_prefixed().await;

        for row in &rows {
            let id_str = row.id.to_string();
            let mux_has_it = live_mux.contains(&id_str);
            if mux_has_it && !row.is_alive {
                self.store
                    .update_session(
                        row.id,
                        SessionUpdate {
                            is_alive: Some(true),
                            ..Default::default()
                        },
                    )
                    .await?;
                report.flipped_alive += 1;
            } else if !mux_has_it && row.is_alive {
                self.store.mark_dead(row.id).await?;
                report.flipped_dead += 1;
            }
        }

        report.purged = self.store.purge_dead(self.purge_after_days).await?;

        let remaining = self.store.list_sessions(true).await?;
        let remaining_ids: HashSet<String> = remaining.iter().map(|r| r.id.to_string()).collect();

        for name in live_mux {
            if !remaining_ids.contains(&name) && self.mux.kill(&name, true).await.unwrap_or(false) {
                report.orphans_killed += 1;
            }
        }

        info!(
            flipped_alive = report.flipped_alive,
            flipped_dead = report.flipped_dead,
            purged = report.purged,
            orphans_killed = report.orphans_killed,
            "reconciliation_complete"
        );
        Ok(report)
    }
}
