//! Typed error taxonomy shared across the lifecycle, store, mux, and pty
//! bridge layers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("tmux command timed out after {0}s")]
    Timeout(u64),
    #[error("tmux command failed: {0}")]
    CommandFailed(String),
    #[error("invalid session name: {0}")]
    InvalidName(String),
    #[error("tmux binary not found or failed to spawn: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("pool exhausted")]
    PoolExhausted,
    #[error("not found")]
    NotFound,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("session not alive")]
    SessionDead,
    #[error(transparent)]
    Mux(#[from] MuxError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("pty error: {0}")]
    Pty(String),
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Mux(#[from] MuxError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("not found")]
    NotFound,
}
