//! Process-wide registry of active PTY bridges: one entry per *currently
//! attached* WebSocket, keyed by durable session id. Durable session state
//! lives in the Store, not here — this registry exists only so other
//! components (AuxiliaryLifecycle) can write into an already-attached
//! bridge's PTY.

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::model::SessionId;

/// Handle to a live bridge's input side. Cheap to clone; the bridge task owns
/// the actual master fd and is the sole reader of `write_rx`/`resize_rx`.
#[derive(Clone)]
pub struct BridgeHandle {
    write_tx: mpsc::Sender<Vec<u8>>,
    resize_tx: mpsc::Sender<(u16, u16)>,
}

impl BridgeHandle {
    pub fn new(write_tx: mpsc::Sender<Vec<u8>>, resize_tx: mpsc::Sender<(u16, u16)>) -> Self {
        Self {
            write_tx,
            resize_tx,
        }
    }

    /// Best-effort write; silently dropped if the bridge has already torn down.
    pub async fn write(&self, bytes: &[u8]) {
        let _ = self.write_tx.send(bytes.to_vec()).await;
    }

    pub async fn resize(&self, cols: u16, rows: u16) {
        let _ = self.resize_tx.send((cols, rows)).await;
    }
}

#[derive(Default)]
pub struct BridgeRegistry {
    handles: DashMap<SessionId, BridgeHandle>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: SessionId, handle: BridgeHandle) {
        self.handles.insert(id, handle);
    }

    pub fn remove(&self, id: SessionId) {
        self.handles.remove(&id);
    }

    pub fn get(&self, id: SessionId) -> Option<BridgeHandle> {
        self.handles.get(&id).map(|h| h.clone())
    }
}
