//! Shared application state: the Store, MuxDriver, lifecycle services, and
//! the registry of currently-attached PTY bridges.

use std::sync::Arc;

use common::auxiliary::AuxiliaryLifecycle;
use common::bridge::BridgeRegistry;
use common::config::Config;
use common::lifecycle::{LifecycleBatch, LifecycleCore};
use common::mux::MuxDriver;
use common::pane::PaneManager;
use common::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub mux: Arc<MuxDriver>,
    pub lifecycle: Arc<LifecycleCore>,
    pub batch: Arc<LifecycleBatch>,
    pub panes: Arc<PaneManager>,
    pub auxiliary: Arc<AuxiliaryLifecycle>,
    pub bridges: Arc<BridgeRegistry>,
    pub config: &'static Config,
}
