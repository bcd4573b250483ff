//! Session lifecycle: atomic single-session operations (`core`), bulk reset
//! operations (`batch`), and startup reconciliation between Store and mux
//! (`reconcile`). Grounded on services/lifecycle_core.py, lifecycle_batch.py
//! and lifecycle_reconcile.py.

mod batch;
mod core;
mod reconcile;

pub use batch::LifecycleBatch;
pub use core::LifecycleCore;
pub use reconcile::{ReconcileReport, Reconciler};
