//! Shared logic for a multiplexed web-terminal service: a `tmux` driver, a
//! SQLite-backed session/pane store, atomic session lifecycle operations,
//! startup reconciliation, and a PTY bridge between a client connection and
//! an attached mux session.

pub mod auxiliary;
pub mod bridge;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod mux;
pub mod pane;
pub mod pty;
pub mod store;
