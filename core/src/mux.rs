//! MuxDriver: thin adapter over the `tmux` CLI. Centralizes shell-injection
//! risk, timeout handling, and session-option policy to one place.
//! Grounded on `terminal/utils/tmux.py`.

use std::collections::HashSet;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::MuxError;

const MUX_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const SESSION_PREFIX: &str = "summitflow-";
const DEFAULT_COLS: u16 = 120;
const DEFAULT_ROWS: u16 = 30;

/// Secret env vars unset in every session we create, so child shells can't inherit them.
pub const FILTERED_ENV_VARS: &[&str] = &[
    "DATABASE_URL",
    "CF_ACCESS_CLIENT_ID",
    "CF_ACCESS_CLIENT_SECRET",
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "GOOGLE_API_KEY",
    "GEMINI_API_KEY",
    "SECRET_KEY",
    "JWT_SECRET",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "GITHUB_TOKEN",
    "GITLAB_TOKEN",
    "SLACK_TOKEN",
    "DISCORD_TOKEN",
];

fn session_name_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-:]+$").unwrap())
}

/// Validate an external-facing mux session name before it is interpolated
/// into any subprocess argument list.
pub fn validate_name(name: &str) -> bool {
    name.len() < 256 && session_name_pattern().is_match(name)
}

/// Derive the mux session name for a durable session id.
pub fn session_name(id: &str) -> String {
    format!("{SESSION_PREFIX}{id}")
}

/// Strip the service prefix, returning the bare session id if `name` carries it.
pub fn strip_prefix(name: &str) -> Option<&str> {
    name.strip_prefix(SESSION_PREFIX)
}

/// Thin adapter over the external multiplexer CLI.
#[derive(Debug, Clone)]
pub struct MuxDriver {
    binary: String,
    extra_filtered_env_vars: Vec<String>,
}

impl Default for MuxDriver {
    fn default() -> Self {
        Self::new("tmux")
    }
}

impl MuxDriver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            extra_filtered_env_vars: Vec::new(),
        }
    }

    /// Like `new`, but also unsetting `extra_vars` (config-supplied
    /// additions to the built-in `FILTERED_ENV_VARS` deny-list) in every
    /// session this driver creates.
    pub fn with_extra_filtered_env_vars(binary: impl Into<String>, extra_vars: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            extra_filtered_env_vars: extra_vars,
        }
    }

    /// Run a tmux command with a fixed per-call timeout.
    /// Returns (ok, stdout-or-stderr).
    pub async fn run(&self, args: &[&str]) -> Result<(bool, String), MuxError> {
        let binary = self.binary.clone();
        let owned_args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let fut = async move {
            let output = Command::new(&binary).args(&owned_args).output().await?;
            Ok::<_, std::io::Error>(output)
        };

        let output = match timeout(MUX_COMMAND_TIMEOUT, fut).await {
            Ok(res) => res.map_err(MuxError::Spawn)?,
            Err(_) => {
                error!(cmd = ?args, "mux_command_timeout");
                return Err(MuxError::Timeout(MUX_COMMAND_TIMEOUT.as_secs()));
            }
        };

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Ok((true, stdout))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let msg = if stderr.is_empty() {
                format!("tmux exited with status {}", output.status)
            } else {
                stderr
            };
            debug!(cmd = ?args, error = %msg, "mux_command_failed");
            Ok((false, msg))
        }
    }

    /// Run a command, raising `MuxError::CommandFailed` on non-zero exit.
    async fn run_checked(&self, args: &[&str]) -> Result<String, MuxError> {
        let (ok, out) = self.run(args).await?;
        if ok {
            Ok(out)
        } else {
            Err(MuxError::CommandFailed(out))
        }
    }

    pub async fn exists_by_name(&self, name: &str) -> bool {
        matches!(self.run(&["has-session", "-t", name]).await, Ok((true, _)))
    }

    pub async fn exists_by_id(&self, id: &str) -> bool {
        self.exists_by_name(&session_name(id)).await
    }

    async fn apply_session_options(&self, name: &str, disable_mouse: bool) {
        if disable_mouse {
            let _ = self.run(&["set-option", "-t", name, "mouse", "off"]).await;
        }
        let _ = self.run(&["set-option", "-t", name, "status", "off"]).await;
        for var in FILTERED_ENV_VARS {
            let _ = self
                .run(&["set-environment", "-t", name, "-u", var])
                .await;
        }
        for var in &self.extra_filtered_env_vars {
            let _ = self
                .run(&["set-environment", "-t", name, "-u", var])
                .await;
        }
        debug!(
            session = name,
            filtered_vars = FILTERED_ENV_VARS.len() + self.extra_filtered_env_vars.len(),
            "session_configured"
        );
    }

    /// Create (or idempotently reconfigure) a detached mux session for `id`.
    pub async fn create(&self, id: &str, working_dir: Option<&str>) -> Result<String, MuxError> {
        let name = session_name(id);
        if !validate_name(&name) {
            return Err(MuxError::InvalidName(name));
        }

        if self.exists_by_name(&name).await {
            info!(session = %name, "mux_session_exists");
            self.apply_session_options(&name, true).await;
            return Ok(name);
        }

        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        let effective_dir = working_dir.unwrap_or(&home);
        let cols = DEFAULT_COLS.to_string();
        let rows = DEFAULT_ROWS.to_string();
        let args = [
            "new-session",
            "-d",
            "-s",
            &name,
            "-x",
            &cols,
            "-y",
            &rows,
            "-c",
            effective_dir,
        ];
        self.run_checked(&args).await?;
        self.apply_session_options(&name, true).await;
        info!(session = %name, working_dir = effective_dir, "mux_session_created");
        Ok(name)
    }

    /// Kill the mux session for `id`. Returns true iff it was actually killed.
    pub async fn kill(&self, id: &str, ignore_missing: bool) -> Result<bool, MuxError> {
        let name = session_name(id);
        let (ok, err) = self.run(&["kill-session", "-t", &name]).await?;
        if ok {
            info!(session = %name, "mux_session_killed");
            return Ok(true);
        }
        if ignore_missing && err.to_lowercase().contains("session not found") {
            info!(session = %name, "mux_session_not_found");
            return Ok(false);
        }
        if !ignore_missing {
            return Err(MuxError::CommandFailed(err));
        }
        Ok(false)
    }

    /// All mux sessions whose names carry the service prefix, stripped.
    pub async fn list_prefixed(&self) -> HashSet<String> {
        let (ok, out) = match self.run(&["list-sessions", "-F", "#{session_name}"]).await {
            Ok(v) => v,
            Err(_) => return HashSet::new(),
        };
        if !ok {
            return HashSet::new();
        }
        out.lines()
            .filter_map(strip_prefix)
            .map(|s| s.to_string())
            .collect()
    }

    /// Full scrollback history (escape sequences included, wrapped lines joined).
    pub async fn capture_scrollback(&self, name: &str) -> Option<String> {
        let (ok, out) = self
            .run(&["capture-pane", "-t", name, "-S", "-", "-e", "-J", "-p"])
            .await
            .ok()?;
        if ok {
            Some(out)
        } else {
            warn!(session = name, "scrollback_capture_failed");
            None
        }
    }

    pub async fn resize_window(&self, name: &str, cols: u16, rows: u16) -> bool {
        let cols_s = cols.to_string();
        let rows_s = rows.to_string();
        match self
            .run(&["resize-window", "-t", name, "-x", &cols_s, "-y", &rows_s])
            .await
        {
            Ok((true, _)) => {
                debug!(session = name, cols, rows, "mux_window_resized");
                true
            }
            _ => {
                warn!(session = name, cols, rows, "mux_window_resize_failed");
                false
            }
        }
    }

    /// Register the global `client-session-changed` hook so the multiplexer
    /// fire-and-forgets a GET to our session-switch endpoint on every client
    /// attach/switch. Best-effort: logged, not propagated, since a failure
    /// here only degrades `last_target_session` tracking, not correctness.
    pub async fn register_switch_hook(&self, callback_url_base: &str) {
        let cmd = format!(
            "run-shell -b \"curl -s -m 2 '{callback_url_base}?from=#{{hook_client_session_name}}&to=#{{session_name}}' >/dev/null 2>&1\""
        );
        match self.run(&["set-hook", "-g", "client-session-changed", &cmd]).await {
            Ok((true, _)) => info!("switch_hook_registered"),
            Ok((false, err)) => warn!(error = %err, "switch_hook_registration_failed"),
            Err(e) => warn!(error = %e, "switch_hook_registration_failed"),
        }
    }

    /// True iff any pane's current command matches the auxiliary command name.
    /// Process-check heuristic: strictly more reliable than scanning decoded
    /// output for a prompt regex.
    pub async fn is_auxiliary_running(&self, name: &str, command: &str) -> bool {
        let (ok, out) = match self
            .run(&["list-panes", "-t", name, "-F", "#{pane_current_command}"])
            .await
        {
            Ok(v) => v,
            Err(_) => return false,
        };
        ok && out
            .lines()
            .any(|line| line.to_lowercase().contains(&command.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_name_accepts_expected_charset() {
        assert!(validate_name("summitflow-abc123"));
        assert!(validate_name("a_b:c-1"));
    }

    #[test]
    fn validate_name_rejects_shell_metacharacters() {
        assert!(!validate_name("foo; rm -rf /"));
        assert!(!validate_name("foo$(whoami)"));
        assert!(!validate_name("foo bar"));
        assert!(!validate_name(""));
    }

    #[test]
    fn validate_name_rejects_oversized_names() {
        let long = "a".repeat(256);
        assert!(!validate_name(&long));
    }

    #[test]
    fn session_name_adds_prefix_and_strip_prefix_reverses_it() {
        let id = "4b1b7e3a-0000-4000-8000-000000000000";
        let name = session_name(id);
        assert_eq!(name, format!("summitflow-{id}"));
        assert_eq!(strip_prefix(&name), Some(id));
    }

    #[test]
    fn strip_prefix_returns_none_for_foreign_names() {
        assert_eq!(strip_prefix("some-other-session"), None);
    }

    /// Writes a stub tmux binary that logs every invocation to `log_path`
    /// and exits 0, used to exercise `MuxDriver` without a real tmux.
    fn stub_mux_binary(dir: &std::path::Path, log_path: &std::path::Path) -> std::path::PathBuf {
        let script = dir.join("tmux");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$@\" >> {}\nexit 0\n", log_path.display()),
        )
        .unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&script, perms).unwrap();
        script
    }

    #[tokio::test]
    async fn run_reports_success_for_a_zero_exit_stub() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log");
        let bin = stub_mux_binary(dir.path(), &log);
        let driver = MuxDriver::new(bin.to_string_lossy().to_string());

        let (ok, _) = driver.run(&["has-session", "-t", "foo"]).await.unwrap();
        assert!(ok);
        assert!(std::fs::read_to_string(&log).unwrap().contains("has-session -t foo"));
    }

    #[tokio::test]
    async fn create_unsets_both_builtin_and_extra_filtered_env_vars() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log");
        let bin = stub_mux_binary(dir.path(), &log);
        let driver = MuxDriver::with_extra_filtered_env_vars(
            bin.to_string_lossy().to_string(),
            vec!["CUSTOM_SECRET".to_string()],
        );

        driver.create("abc", None).await.unwrap();

        let log_contents = std::fs::read_to_string(&log).unwrap();
        assert!(log_contents.contains("set-environment -t summitflow-abc -u DATABASE_URL"));
        assert!(log_contents.contains("set-environment -t summitflow-abc -u CUSTOM_SECRET"));
    }

    #[tokio::test]
    async fn register_switch_hook_never_propagates_failure() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("tmux");
        std::fs::write(&script, "#!/bin/sh\nexit 1\n").unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let driver = MuxDriver::new(script.to_string_lossy().to_string());
        driver.register_switch_hook("http://127.0.0.1:9/hook").await;
    }
}
