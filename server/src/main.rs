//! Standalone summitflow-terminal server binary.

use std::path::PathBuf;

use clap::Parser;

/// Multiplexed web-terminal service: bridges browser WebSocket clients to
/// persistent tmux sessions.
#[derive(Parser, Debug)]
#[command(name = "summitflow-terminal-server")]
struct Cli {
    /// HTTP/WebSocket listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Path to the SQLite database file.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Root directory for per-session working directories.
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Name or path of the tmux binary to invoke.
    #[arg(long)]
    mux_bin: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();

    let cli = Cli::parse();

    let config = common::config::ensure_loaded_with_overrides(common::config::Overrides {
        port: cli.port,
        db_path: cli.db_path,
        working_dir: cli.working_dir,
        mux_binary: cli.mux_bin,
    });

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(server::run_server(config))
}
