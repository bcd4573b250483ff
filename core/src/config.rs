//! Global config singleton. Load settings.json once; every component calls
//! `ensure_loaded()` so the first caller does the work, later callers get the
//! same instance.

use std::path::PathBuf;
use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Cached config, loaded from `settings.json` (or its defaults).
#[derive(Debug, Clone)]
pub struct Config {
    /// Root for per-session working directories. Default: ~/test.
    pub working_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Name or path of the `tmux` binary to invoke.
    pub mux_binary: String,
    /// Fleet-wide hard cap on total panes.
    pub max_panes: i64,
    /// Dead sessions older than this are purged at reconciliation.
    pub purge_after_days: i64,
    /// Shell command used to launch the auxiliary (AI-assistant) process.
    pub auxiliary_command: String,
    /// Process name to look for via `pane_current_command` when verifying
    /// the auxiliary process started.
    pub auxiliary_process_name: String,
    /// Additional env var names to unset in every mux session, beyond the
    /// built-in deny-list in `mux::FILTERED_ENV_VARS`.
    pub extra_filtered_env_vars: Vec<String>,
    /// HTTP listen port for the server.
    pub port: u16,
}

fn config_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..")
}

/// Ensure config is loaded (idempotent). Loads settings.json on first call;
/// returns the same instance afterwards.
pub fn ensure_loaded() -> &'static Config {
    CONFIG.get_or_init(|| {
        let path = std::env::var("SUMMITFLOW_SETTINGS")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_root().join("settings.json"));
        load_settings_from(&path)
    })
}

/// CLI-supplied overrides applied on top of `settings.json`, highest priority.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub mux_binary: Option<String>,
}

/// Like `ensure_loaded`, but only on the very first call: applies `overrides`
/// on top of the settings-file values before caching. Later calls from
/// anywhere else (including with different overrides) just return the
/// already-cached instance.
pub fn ensure_loaded_with_overrides(overrides: Overrides) -> &'static Config {
    CONFIG.get_or_init(|| {
        let path = std::env::var("SUMMITFLOW_SETTINGS")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_root().join("settings.json"));
        let mut config = load_settings_from(&path);
        if let Some(port) = overrides.port {
            config.port = port;
        }
        if let Some(db_path) = overrides.db_path {
            config.db_path = db_path;
        }
        if let Some(working_dir) = overrides.working_dir {
            config.working_dir = working_dir;
        }
        if let Some(mux_binary) = overrides.mux_binary {
            config.mux_binary = mux_binary;
        }
        config
    })
}

fn load_settings_from(path: &std::path::Path) -> Config {
    let Ok(data) = std::fs::read_to_string(path) else {
        return Config::default();
    };
    let Ok(root) = serde_json::from_str::<serde_json::Value>(&data) else {
        return Config::default();
    };

    let defaults = Config::default();

    let working_dir = root
        .get("working_dir")
        .and_then(|v| v.as_str())
        .map(|s| PathBuf::from(s.trim()))
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(defaults.working_dir);

    let db_path = root
        .get("db_path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .unwrap_or_else(|| working_dir.join("summitflow.db"));

    let mux_binary = root
        .get("mux_binary")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or(defaults.mux_binary);

    let max_panes = root
        .get("max_panes")
        .and_then(|v| v.as_i64())
        .unwrap_or(defaults.max_panes);

    let purge_after_days = root
        .get("purge_after_days")
        .and_then(|v| v.as_i64())
        .unwrap_or(defaults.purge_after_days);

    let auxiliary_command = root
        .get("auxiliary_command")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or(defaults.auxiliary_command);

    let auxiliary_process_name = root
        .get("auxiliary_process_name")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or(defaults.auxiliary_process_name);

    let extra_filtered_env_vars = root
        .get("extra_filtered_env_vars")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let port = root
        .get("port")
        .and_then(|v| v.as_u64())
        .map(|p| p as u16)
        .unwrap_or(defaults.port);

    Config {
        working_dir,
        db_path,
        mux_binary,
        max_panes,
        purge_after_days,
        auxiliary_command,
        auxiliary_process_name,
        extra_filtered_env_vars,
        port,
    }
}

fn default_working_dir() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join("test")
}

impl Default for Config {
    fn default() -> Self {
        let working_dir = default_working_dir();
        Self {
            db_path: working_dir.join("summitflow.db"),
            working_dir,
            mux_binary: "tmux".to_string(),
            max_panes: crate::model::MAX_PANES,
            purge_after_days: 7,
            auxiliary_command: "claude --dangerously-skip-permissions".to_string(),
            auxiliary_process_name: "claude".to_string(),
            extra_filtered_env_vars: Vec::new(),
            port: 7890,
        }
    }
}
