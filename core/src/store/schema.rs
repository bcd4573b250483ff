//! SQLite schema. Adapted from the prior PostgreSQL schema (terminal/storage/schema.py)
//! to SQLite syntax: partial indexes via WHERE, CHECK constraints inline.

pub const SESSIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id                   TEXT PRIMARY KEY,
    name                 TEXT NOT NULL,
    project_id           TEXT,
    working_dir          TEXT,
    mode                 TEXT NOT NULL DEFAULT 'shell' CHECK (mode IN ('shell', 'auxiliary')),
    session_number       INTEGER NOT NULL DEFAULT 1 CHECK (session_number >= 1),
    is_alive             INTEGER NOT NULL DEFAULT 1,
    created_at           TEXT NOT NULL,
    last_accessed_at     TEXT NOT NULL,
    last_target_session  TEXT,
    auxiliary_state      TEXT NOT NULL DEFAULT 'not_started'
        CHECK (auxiliary_state IN ('not_started', 'starting', 'running', 'stopped', 'error')),
    pane_id              TEXT REFERENCES panes(id)
);

CREATE INDEX IF NOT EXISTS idx_sessions_alive ON sessions(is_alive) WHERE is_alive = 1;
CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_id) WHERE project_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_sessions_pane ON sessions(pane_id) WHERE pane_id IS NOT NULL;
";

pub const PANES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS panes (
    id             TEXT PRIMARY KEY,
    pane_type      TEXT NOT NULL CHECK (pane_type IN ('project', 'adhoc')),
    project_id     TEXT,
    pane_order     INTEGER NOT NULL DEFAULT 0,
    pane_name      TEXT NOT NULL,
    active_mode    TEXT NOT NULL DEFAULT 'shell' CHECK (active_mode IN ('shell', 'auxiliary')),
    width_percent  REAL,
    height_percent REAL,
    grid_row       INTEGER,
    grid_col       INTEGER,
    created_at     TEXT NOT NULL,
    CHECK (
        (pane_type = 'project' AND project_id IS NOT NULL) OR
        (pane_type = 'adhoc' AND project_id IS NULL)
    ),
    CHECK (NOT (pane_type = 'adhoc' AND active_mode = 'auxiliary'))
);

CREATE INDEX IF NOT EXISTS idx_panes_order ON panes(pane_order);
";

pub const PROJECT_SETTINGS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS project_settings (
    project_id     TEXT PRIMARY KEY,
    enabled        INTEGER NOT NULL DEFAULT 0,
    active_mode    TEXT NOT NULL DEFAULT 'shell' CHECK (active_mode IN ('shell', 'auxiliary')),
    display_order  INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_project_settings_enabled ON project_settings(enabled) WHERE enabled = 1;
";

/// Create all tables (panes before sessions: sessions.pane_id references panes).
pub fn create_tables(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(PANES_TABLE)?;
    conn.execute_batch(SESSIONS_TABLE)?;
    conn.execute_batch(PROJECT_SETTINGS_TABLE)?;
    Ok(())
}
