//! Shared test support: a stub `tmux` binary good enough to exercise
//! `MuxDriver` without a real multiplexer. Session existence is tracked as
//! marker files in a scratch directory, so `has-session`/`new-session`/
//! `kill-session` behave consistently across calls within one test.

use std::path::{Path, PathBuf};

use common::mux::MuxDriver;

/// A scratch directory backing a stub tmux binary, plus the driver pointed
/// at it. Dropping this removes the directory.
pub struct StubMux {
    pub driver: MuxDriver,
    _dir: tempfile::TempDir,
}

impl StubMux {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let sessions_dir = dir.path().join("sessions");
        std::fs::create_dir_all(&sessions_dir).unwrap();
        let script_path = write_stub_script(dir.path(), &sessions_dir);
        Self {
            driver: MuxDriver::new(script_path.to_string_lossy().to_string()),
            _dir: dir,
        }
    }
}

fn write_stub_script(dir: &Path, sessions_dir: &Path) -> PathBuf {
    let script_path = dir.join("tmux");
    let sessions = sessions_dir.display();
    let script = format!(
        r#"#!/bin/sh
sessions="{sessions}"
case "$1" in
  new-session)
    name=""
    prev=""
    for arg in "$@"; do
      if [ "$prev" = "-s" ]; then name="$arg"; fi
      prev="$arg"
    done
    touch "$sessions/$name"
    exit 0
    ;;
  has-session)
    name="$3"
    if [ -f "$sessions/$name" ]; then exit 0; else echo "session not found" >&2; exit 1; fi
    ;;
  kill-session)
    name="$3"
    if [ -f "$sessions/$name" ]; then rm -f "$sessions/$name"; exit 0; else echo "session not found" >&2; exit 1; fi
    ;;
  list-sessions)
    ls "$sessions" 2>/dev/null
    exit 0
    ;;
  list-panes)
    echo "bash"
    exit 0
    ;;
  capture-pane)
    exit 0
    ;;
  set-option|set-environment|resize-window|set-hook)
    exit 0
    ;;
  *)
    exit 0
    ;;
esac
"#
    );
    std::fs::write(&script_path, script).unwrap();
    let mut perms = std::fs::metadata(&script_path).unwrap().permissions();
    std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
    std::fs::set_permissions(&script_path, perms).unwrap();
    script_path
}

pub fn open_store() -> (tempfile::TempDir, common::store::SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = common::store::SqliteStore::open(dir.path().join("test.db")).unwrap();
    (dir, store)
}

/// Push a session's `last_accessed_at` `days` into the past, via a side
/// connection to the same sqlite file, so purge-retention tests don't have
/// to wait out real wall-clock time.
pub fn backdate_last_accessed(db_dir: &Path, id: common::model::SessionId, days: i64) {
    let conn = rusqlite::Connection::open(db_dir.join("test.db")).unwrap();
    let cutoff = (chrono::Utc::now() - chrono::Duration::days(days)).to_rfc3339();
    conn.execute(
        "UPDATE sessions SET last_accessed_at = ?1 WHERE id = ?2",
        rusqlite::params![cutoff, id.to_string()],
    )
    .unwrap();
}
