//! summitflow-terminal server: axum HTTP + WebSocket front end over the
//! `common` crate's Store/MuxDriver/lifecycle services.

mod routes;
mod state;
mod web_server;
mod ws;

pub use web_server::run_server;
