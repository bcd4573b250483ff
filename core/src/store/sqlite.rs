//! SQLite implementation of the Store trait. Ported from
//! storage/terminal_crud.py, storage/terminal_claude.py, storage/pane_crud.py,
//! storage/project_settings.py, storage/terminal_project.py.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StoreError;
use crate::model::{
    AuxiliaryState, Pane, PaneId, PaneType, PaneWithSessions, ProjectSettings, Session, SessionId,
    SessionMode,
};

use super::pool::Pool;
use super::{
    NewPane, NewSession, PaneLayoutUpdate, PaneUpdate, ProjectSessions, SessionUpdate,
    SettingsUpdate, Store,
};

pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        Ok(Self {
            pool: Pool::open(path)?,
        })
    }
}

fn session_from_row(row: &Row) -> rusqlite::Result<Session> {
    let id: String = row.get("id")?;
    let mode: String = row.get("mode")?;
    let auxiliary_state: String = row.get("auxiliary_state")?;
    let created_at: String = row.get("created_at")?;
    let last_accessed_at: String = row.get("last_accessed_at")?;
    let pane_id: Option<String> = row.get("pane_id")?;
    let is_alive: i64 = row.get("is_alive")?;

    Ok(Session {
        id: SessionId::parse(&id).expect("valid uuid in db"),
        name: row.get("name")?,
        project_id: row.get("project_id")?,
        working_dir: row.get("working_dir")?,
        mode: SessionMode::from_str_opt(&mode).unwrap_or(SessionMode::Shell),
        session_number: row.get("session_number")?,
        is_alive: is_alive != 0,
        created_at: parse_ts(&created_at),
        last_accessed_at: parse_ts(&last_accessed_at),
        last_target_session: row.get("last_target_session")?,
        auxiliary_state: AuxiliaryState::from_str_opt(&auxiliary_state)
            .unwrap_or(AuxiliaryState::NotStarted),
        pane_id: pane_id.and_then(|s| PaneId::parse(&s)),
    })
}

fn pane_from_row(row: &Row) -> rusqlite::Result<Pane> {
    let id: String = row.get("id")?;
    let pane_type: String = row.get("pane_type")?;
    let active_mode: String = row.get("active_mode")?;
    let created_at: String = row.get("created_at")?;

    Ok(Pane {
        id: PaneId::parse(&id).expect("valid uuid in db"),
        pane_type: PaneType::from_str_opt(&pane_type).unwrap_or(PaneType::Adhoc),
        project_id: row.get("project_id")?,
        pane_order: row.get("pane_order")?,
        pane_name: row.get("pane_name")?,
        active_mode: SessionMode::from_str_opt(&active_mode).unwrap_or(SessionMode::Shell),
        width_percent: row.get("width_percent")?,
        height_percent: row.get("height_percent")?,
        grid_row: row.get("grid_row")?,
        grid_col: row.get("grid_col")?,
        created_at: parse_ts(&created_at),
    })
}

fn settings_from_row(row: &Row) -> rusqlite::Result<ProjectSettings> {
    let active_mode: String = row.get("active_mode")?;
    let enabled: i64 = row.get("enabled")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(ProjectSettings {
        project_id: row.get("project_id")?,
        enabled: enabled != 0,
        active_mode: SessionMode::from_str_opt(&active_mode).unwrap_or(SessionMode::Shell),
        display_order: row.get("display_order")?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn now_str() -> String {
    Utc::now().to_rfc3339()
}

const SESSION_COLUMNS: &str = "id, name, project_id, working_dir, mode, session_number, \
    is_alive, created_at, last_accessed_at, last_target_session, auxiliary_state, pane_id";

const PANE_COLUMNS: &str = "id, pane_type, project_id, pane_order, pane_name, active_mode, \
    width_percent, height_percent, grid_row, grid_col, created_at";

const SETTINGS_COLUMNS: &str = "project_id, enabled, active_mode, display_order, created_at, updated_at";

#[async_trait]
impl Store for SqliteStore {
    async fn list_sessions(&self, include_dead: bool) -> Result<Vec<Session>, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                let sql = if include_dead {
                    format!(
                        "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY created_at"
                    )
                } else {
                    format!(
                        "SELECT {SESSION_COLUMNS} FROM sessions WHERE is_alive = 1 ORDER BY created_at"
                    )
                };
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], session_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
                conn.query_row(&sql, params![id.to_string()], session_from_row)
                    .optional()
                    .map_err(StoreError::from)
            })
            .await
    }

    async fn create_session(&self, params: NewSession) -> Result<Session, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                let session_number: i64 = if let Some(project_id) = &params.project_id {
                    conn.query_row(
                        "SELECT COALESCE(MAX(session_number), 0) + 1 FROM sessions \
                         WHERE project_id = ?1 AND mode = ?2 AND is_alive = 1",
                        rusqlite::params![project_id, params.mode.as_str()],
                        |r| r.get(0),
                    )?
                } else {
                    1
                };

                let id = SessionId::new();
                let now = now_str();
                conn.execute(
                    "INSERT INTO sessions (id, name, project_id, working_dir, mode, \
                     session_number, is_alive, created_at, last_accessed_at, pane_id) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7, ?8)",
                    rusqlite::params![
                        id.to_string(),
                        params.name,
                        params.project_id,
                        params.working_dir,
                        params.mode.as_str(),
                        session_number,
                        now,
                        params.pane_id.map(|p| p.to_string()),
                    ],
                )?;

                let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
                conn.query_row(&sql, rusqlite::params![id.to_string()], session_from_row)
                    .map_err(StoreError::from)
            })
            .await
    }

    async fn update_session(
        &self,
        id: SessionId,
        fields: SessionUpdate,
    ) -> Result<Option<Session>, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                let mut sets = Vec::new();
                let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
                if let Some(name) = fields.name {
                    sets.push("name = ?");
                    values.push(Box::new(name));
                }
                if let Some(wd) = fields.working_dir {
                    sets.push("working_dir = ?");
                    values.push(Box::new(wd));
                }
                if let Some(alive) = fields.is_alive {
                    sets.push("is_alive = ?");
                    values.push(Box::new(alive as i64));
                }
                if sets.is_empty() {
                    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
                    return conn
                        .query_row(&sql, rusqlite::params![id.to_string()], session_from_row)
                        .optional()
                        .map_err(StoreError::from);
                }
                let sql = format!(
                    "UPDATE sessions SET {} WHERE id = ?",
                    sets.join(", ")
                );
                values.push(Box::new(id.to_string()));
                let param_refs: Vec<&dyn rusqlite::ToSql> =
                    values.iter().map(|v| v.as_ref()).collect();
                conn.execute(&sql, param_refs.as_slice())?;

                let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
                conn.query_row(&sql, rusqlite::params![id.to_string()], session_from_row)
                    .optional()
                    .map_err(StoreError::from)
            })
            .await
    }

    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                let n = conn.execute(
                    "DELETE FROM sessions WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                )?;
                Ok(n > 0)
            })
            .await
    }

    async fn mark_dead(&self, id: SessionId) -> Result<bool, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                let n = conn.execute(
                    "UPDATE sessions SET is_alive = 0 WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                )?;
                Ok(n > 0)
            })
            .await
    }

    async fn touch(&self, id: SessionId) -> Result<bool, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                let n = conn.execute(
                    "UPDATE sessions SET last_accessed_at = ?1 WHERE id = ?2",
                    rusqlite::params![now_str(), id.to_string()],
                )?;
                Ok(n > 0)
            })
            .await
    }

    async fn purge_dead(&self, older_than_days: i64) -> Result<u64, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                let cutoff = (Utc::now() - chrono::Duration::days(older_than_days)).to_rfc3339();
                let n = conn.execute(
                    "DELETE FROM sessions WHERE is_alive = 0 AND last_accessed_at < ?1",
                    rusqlite::params![cutoff],
                )?;
                Ok(n as u64)
            })
            .await
    }

    async fn list_orphaned(&self, older_than_days: i64) -> Result<Vec<Session>, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                let cutoff = (Utc::now() - chrono::Duration::days(older_than_days)).to_rfc3339();
                let sql = format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE is_alive = 0 AND last_accessed_at < ?1"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params![cutoff], session_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    async fn get_session_by_project(
        &self,
        project_id: &str,
        mode: SessionMode,
    ) -> Result<Option<Session>, StoreError> {
        let project_id = project_id.to_string();
        self.pool
            .with(move |conn: &Connection| {
                let sql = format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE project_id = ?1 AND mode = ?2 \
                     AND is_alive = 1 ORDER BY created_at DESC LIMIT 1"
                );
                conn.query_row(&sql, rusqlite::params![project_id, mode.as_str()], session_from_row)
                    .optional()
                    .map_err(StoreError::from)
            })
            .await
    }

    async fn get_dead_session_by_project(
        &self,
        project_id: &str,
        mode: SessionMode,
    ) -> Result<Option<Session>, StoreError> {
        let project_id = project_id.to_string();
        self.pool
            .with(move |conn: &Connection| {
                let sql = format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE project_id = ?1 AND mode = ?2 \
                     AND is_alive = 0 ORDER BY created_at DESC LIMIT 1"
                );
                conn.query_row(&sql, rusqlite::params![project_id, mode.as_str()], session_from_row)
                    .optional()
                    .map_err(StoreError::from)
            })
            .await
    }

    async fn get_project_sessions(&self, project_id: &str) -> Result<ProjectSessions, StoreError> {
        let project_id = project_id.to_string();
        self.pool
            .with(move |conn: &Connection| {
                let sql = format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE project_id = ?1 AND is_alive = 1 \
                     ORDER BY created_at DESC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params![project_id], session_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                let mut out = ProjectSessions::default();
                for row in rows {
                    match row.mode {
                        SessionMode::Shell if out.shell.is_none() => out.shell = Some(row),
                        SessionMode::Auxiliary if out.auxiliary.is_none() => {
                            out.auxiliary = Some(row)
                        }
                        _ => {}
                    }
                }
                Ok(out)
            })
            .await
    }

    async fn get_all_project_sessions(&self, project_id: &str) -> Result<Vec<Session>, StoreError> {
        let project_id = project_id.to_string();
        self.pool
            .with(move |conn: &Connection| {
                let sql = format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE project_id = ?1 AND is_alive = 1"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params![project_id], session_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    async fn update_target_session(
        &self,
        id: SessionId,
        name: Option<&str>,
    ) -> Result<bool, StoreError> {
        let name = name.filter(|s| !s.is_empty()).map(|s| s.to_string());
        self.pool
            .with(move |conn: &Connection| {
                let n = conn.execute(
                    "UPDATE sessions SET last_target_session = ?1 WHERE id = ?2",
                    rusqlite::params![name, id.to_string()],
                )?;
                Ok(n > 0)
            })
            .await
    }

    async fn update_auxiliary_state(
        &self,
        id: SessionId,
        new: AuxiliaryState,
        expected: Option<AuxiliaryState>,
    ) -> Result<bool, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                let n = if let Some(expected) = expected {
                    conn.execute(
                        "UPDATE sessions SET auxiliary_state = ?1 WHERE id = ?2 AND auxiliary_state = ?3",
                        rusqlite::params![new.as_str(), id.to_string(), expected.as_str()],
                    )?
                } else {
                    conn.execute(
                        "UPDATE sessions SET auxiliary_state = ?1 WHERE id = ?2",
                        rusqlite::params![new.as_str(), id.to_string()],
                    )?
                };
                Ok(n > 0)
            })
            .await
    }

    async fn get_auxiliary_state(&self, id: SessionId) -> Result<Option<AuxiliaryState>, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                let state: Option<String> = conn
                    .query_row(
                        "SELECT auxiliary_state FROM sessions WHERE id = ?1",
                        rusqlite::params![id.to_string()],
                        |r| r.get(0),
                    )
                    .optional()?;
                Ok(state.and_then(|s| AuxiliaryState::from_str_opt(&s)))
            })
            .await
    }

    async fn list_panes(&self) -> Result<Vec<Pane>, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                let sql = format!("SELECT {PANE_COLUMNS} FROM panes ORDER BY pane_order");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], pane_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    async fn get_pane(&self, id: PaneId) -> Result<Option<Pane>, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                let sql = format!("SELECT {PANE_COLUMNS} FROM panes WHERE id = ?1");
                conn.query_row(&sql, rusqlite::params![id.to_string()], pane_from_row)
                    .optional()
                    .map_err(StoreError::from)
            })
            .await
    }

    async fn get_pane_with_sessions(
        &self,
        id: PaneId,
    ) -> Result<Option<PaneWithSessions>, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                let sql = format!("SELECT {PANE_COLUMNS} FROM panes WHERE id = ?1");
                let pane = match conn
                    .query_row(&sql, rusqlite::params![id.to_string()], pane_from_row)
                    .optional()?
                {
                    Some(p) => p,
                    None => return Ok(None),
                };
                let sql = format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE pane_id = ?1 ORDER BY mode"
                );
                let mut stmt = conn.prepare(&sql)?;
                let sessions = stmt
                    .query_map(rusqlite::params![id.to_string()], session_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(PaneWithSessions { pane, sessions }))
            })
            .await
    }

    async fn count_panes(&self) -> Result<i64, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                conn.query_row("SELECT COUNT(*) FROM panes", [], |r| r.get(0))
                    .map_err(StoreError::from)
            })
            .await
    }

    async fn create_pane_with_sessions(
        &self,
        params: NewPane,
    ) -> Result<PaneWithSessions, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                let tx = conn.unchecked_transaction()?;

                let pane_order = match params.pane_order {
                    Some(o) => o,
                    None => tx.query_row(
                        "SELECT COALESCE(MAX(pane_order), -1) + 1 FROM panes",
                        [],
                        |r| r.get(0),
                    )?,
                };

                let pane_id = PaneId::new();
                let now = now_str();
                tx.execute(
                    "INSERT INTO panes (id, pane_type, project_id, pane_order, pane_name, \
                     active_mode, created_at) VALUES (?1, ?2, ?3, ?4, ?5, 'shell', ?6)",
                    rusqlite::params![
                        pane_id.to_string(),
                        params.pane_type.as_str(),
                        params.project_id,
                        pane_order,
                        params.pane_name,
                        now,
                    ],
                )?;

                let session_number: i64 = if let Some(project_id) = &params.project_id {
                    tx.query_row(
                        "SELECT COALESCE(MAX(session_number), 0) + 1 FROM sessions \
                         WHERE project_id = ?1 AND is_alive = 1",
                        rusqlite::params![project_id],
                        |r| r.get(0),
                    )?
                } else {
                    1
                };

                let mut sessions = Vec::new();
                let shell_id = SessionId::new();
                tx.execute(
                    "INSERT INTO sessions (id, name, project_id, working_dir, mode, \
                     session_number, is_alive, created_at, last_accessed_at, pane_id) \
                     VALUES (?1, ?2, ?3, ?4, 'shell', ?5, 1, ?6, ?6, ?7)",
                    rusqlite::params![
                        shell_id.to_string(),
                        params.pane_name,
                        params.project_id,
                        params.working_dir,
                        session_number,
                        now,
                        pane_id.to_string(),
                    ],
                )?;
                let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
                sessions.push(tx.query_row(
                    &sql,
                    rusqlite::params![shell_id.to_string()],
                    session_from_row,
                )?);

                if matches!(params.pane_type, PaneType::Project) {
                    let aux_id = SessionId::new();
                    tx.execute(
                        "INSERT INTO sessions (id, name, project_id, working_dir, mode, \
                         session_number, is_alive, created_at, last_accessed_at, pane_id) \
                         VALUES (?1, ?2, ?3, ?4, 'auxiliary', ?5, 1, ?6, ?6, ?7)",
                        rusqlite::params![
                            aux_id.to_string(),
                            params.pane_name,
                            params.project_id,
                            params.working_dir,
                            session_number,
                            now,
                            pane_id.to_string(),
                        ],
                    )?;
                    sessions.push(tx.query_row(
                        &sql,
                        rusqlite::params![aux_id.to_string()],
                        session_from_row,
                    )?);
                }

                let pane_sql = format!("SELECT {PANE_COLUMNS} FROM panes WHERE id = ?1");
                let pane = tx.query_row(
                    &pane_sql,
                    rusqlite::params![pane_id.to_string()],
                    pane_from_row,
                )?;

                tx.commit()?;
                Ok(PaneWithSessions { pane, sessions })
            })
            .await
    }

    async fn update_pane(&self, id: PaneId, fields: PaneUpdate) -> Result<Option<Pane>, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                let mut sets = Vec::new();
                let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
                if let Some(v) = fields.pane_name {
                    sets.push("pane_name = ?");
                    values.push(Box::new(v));
                }
                if let Some(v) = fields.pane_order {
                    sets.push("pane_order = ?");
                    values.push(Box::new(v));
                }
                if let Some(v) = fields.active_mode {
                    sets.push("active_mode = ?");
                    values.push(Box::new(v.as_str().to_string()));
                }
                if let Some(v) = fields.width_percent {
                    sets.push("width_percent = ?");
                    values.push(Box::new(v));
                }
                if let Some(v) = fields.height_percent {
                    sets.push("height_percent = ?");
                    values.push(Box::new(v));
                }
                if let Some(v) = fields.grid_row {
                    sets.push("grid_row = ?");
                    values.push(Box::new(v));
                }
                if let Some(v) = fields.grid_col {
                    sets.push("grid_col = ?");
                    values.push(Box::new(v));
                }

                let sql_get = format!("SELECT {PANE_COLUMNS} FROM panes WHERE id = ?1");
                if sets.is_empty() {
                    return conn
                        .query_row(&sql_get, rusqlite::params![id.to_string()], pane_from_row)
                        .optional()
                        .map_err(StoreError::from);
                }

                let sql = format!("UPDATE panes SET {} WHERE id = ?", sets.join(", "));
                values.push(Box::new(id.to_string()));
                let param_refs: Vec<&dyn rusqlite::ToSql> =
                    values.iter().map(|v| v.as_ref()).collect();
                conn.execute(&sql, param_refs.as_slice())?;

                conn.query_row(&sql_get, rusqlite::params![id.to_string()], pane_from_row)
                    .optional()
                    .map_err(StoreError::from)
            })
            .await
    }

    async fn delete_pane(&self, id: PaneId) -> Result<bool, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                conn.execute(
                    "DELETE FROM sessions WHERE pane_id = ?1",
                    rusqlite::params![id.to_string()],
                )?;
                let n = conn.execute(
                    "DELETE FROM panes WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                )?;
                Ok(n > 0)
            })
            .await
    }

    async fn swap_pane_positions(&self, a: PaneId, b: PaneId) -> Result<bool, StoreError> {
        self.pool
            .with(move |conn: &Connection| {
                let tx = conn.unchecked_transaction()?;
                let order_a: Option<i64> = tx
                    .query_row(
                        "SELECT pane_order FROM panes WHERE id = ?1",
                        rusqlite::params![a.to_string()],
                        |r| r.get(0),
                    )
                    .optional()?;
                let order_b: Option<i64> = tx
                    .query_row(
                        "SELECT pane_order FROM panes WHERE id = ?1",
                        rusqlite::params![b.to_string()],
                        |r| r.get(0),
                    )
                    .optional()?;
                let (order_a, order_b) = match (order_a, order_b) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Ok(false),
                };
                tx.execute(
                    "UPDATE panes SET pane_order = ?1 WHERE id = ?2",
                    rusqlite::params![order_b, a.to_string()],
                )?;
                tx.execute(
                    "UPDATE panes SET pane_order = ?1 WHERE id = ?2",
                    rusqlite::params![order_a, b.to_string()],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await
    }

    async fn update_pane_order(&self, orders: &[(PaneId, i64)]) -> Result<(), StoreError> {
        let orders = orders.to_vec();
        self.pool
            .with(move |conn: &Connection| {
                for (id, order) in orders {
                    conn.execute(
                        "UPDATE panes SET pane_order = ?1 WHERE id = ?2",
                        rusqlite::params![order, id.to_string()],
                    )?;
                }
                Ok(())
            })
            .await
    }

    async fn update_pane_layouts(&self, items: &[PaneLayoutUpdate]) -> Result<(), StoreError> {
        let items = items.to_vec();
        self.pool
            .with(move |conn: &Connection| {
                for item in items {
                    conn.execute(
                        "UPDATE panes SET \
                         width_percent = COALESCE(?1, width_percent), \
                         height_percent = COALESCE(?2, height_percent), \
                         grid_row = COALESCE(?3, grid_row), \
                         grid_col = COALESCE(?4, grid_col) \
                         WHERE id = ?5",
                        rusqlite::params![
                            item.width_percent,
                            item.height_percent,
                            item.grid_row,
                            item.grid_col,
                            item.pane_id.to_string(),
                        ],
                    )?;
                }
                Ok(())
            })
            .await
    }

    async fn get_settings(&self, project_id: &str) -> Result<Option<ProjectSettings>, StoreError> {
        let project_id = project_id.to_string();
        self.pool
            .with(move |conn: &Connection| {
                let sql = format!("SELECT {SETTINGS_COLUMNS} FROM project_settings WHERE project_id = ?1");
                conn.query_row(&sql, rusqlite::params![project_id], settings_from_row)
                    .optional()
                    .map_err(StoreError::from)
            })
            .await
    }

    async fn upsert_settings(
        &self,
        project_id: &str,
        fields: SettingsUpdate,
    ) -> Result<ProjectSettings, StoreError> {
        let project_id = project_id.to_string();
        self.pool
            .with(move |conn: &Connection| {
                let now = now_str();
                let existing = conn
                    .query_row(
                        "SELECT enabled, active_mode, display_order FROM project_settings WHERE project_id = ?1",
                        rusqlite::params![project_id],
                        |r| {
                            let enabled: i64 = r.get(0)?;
                            let mode: String = r.get(1)?;
                            let order: i64 = r.get(2)?;
                            Ok((enabled != 0, mode, order))
                        },
                    )
                    .optional()?;

                let (enabled, active_mode, display_order) = match existing {
                    Some((e, m, o)) => (
                        fields.enabled.unwrap_or(e),
                        fields.active_mode.map(|m| m.as_str().to_string()).unwrap_or(m),
                        fields.display_order.unwrap_or(o),
                    ),
                    None => (
                        fields.enabled.unwrap_or(false),
                        fields
                            .active_mode
                            .map(|m| m.as_str().to_string())
                            .unwrap_or_else(|| SessionMode::Shell.as_str().to_string()),
                        fields.display_order.unwrap_or(0),
                    ),
                };

                conn.execute(
                    "INSERT INTO project_settings (project_id, enabled, active_mode, \
                     display_order, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
                     ON CONFLICT(project_id) DO UPDATE SET \
                     enabled = excluded.enabled, active_mode = excluded.active_mode, \
                     display_order = excluded.display_order, updated_at = excluded.updated_at",
                    rusqlite::params![project_id, enabled as i64, active_mode, display_order, now],
                )?;

                let sql = format!("SELECT {SETTINGS_COLUMNS} FROM project_settings WHERE project_id = ?1");
                conn.query_row(&sql, rusqlite::params![project_id], settings_from_row)
                    .map_err(StoreError::from)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PaneType, SessionMode};

    fn open_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn create_and_get_session_roundtrips() {
        let (_dir, store) = open_store();
        let session = store
            .create_session(NewSession {
                name: "shell-1".into(),
                project_id: Some("proj-a".into()),
                working_dir: Some("/tmp/proj-a".into()),
                mode: SessionMode::Shell,
                pane_id: None,
            })
            .await
            .unwrap();

        assert_eq!(session.session_number, 1);
        assert!(session.is_alive);

        let fetched = store.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "shell-1");
        assert_eq!(fetched.project_id.as_deref(), Some("proj-a"));
    }

    #[tokio::test]
    async fn session_numbers_increment_per_project_and_mode() {
        let (_dir, store) = open_store();
        let new = |n: &str| NewSession {
            name: n.into(),
            project_id: Some("proj-a".into()),
            working_dir: None,
            mode: SessionMode::Shell,
            pane_id: None,
        };
        let s1 = store.create_session(new("a")).await.unwrap();
        let s2 = store.create_session(new("b")).await.unwrap();
        assert_eq!(s1.session_number, 1);
        assert_eq!(s2.session_number, 2);
    }

    #[tokio::test]
    async fn list_sessions_excludes_dead_by_default() {
        let (_dir, store) = open_store();
        let session = store
            .create_session(NewSession {
                name: "shell".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        store.mark_dead(session.id).await.unwrap();

        assert!(store.list_sessions(false).await.unwrap().is_empty());
        assert_eq!(store.list_sessions(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_session_leaves_unspecified_fields_unchanged() {
        let (_dir, store) = open_store();
        let session = store
            .create_session(NewSession {
                name: "original".into(),
                working_dir: Some("/tmp/a".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let updated = store
            .update_session(
                session.id,
                SessionUpdate {
                    name: Some("renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.working_dir.as_deref(), Some("/tmp/a"));
    }

    #[tokio::test]
    async fn delete_session_is_idempotent() {
        let (_dir, store) = open_store();
        let session = store
            .create_session(NewSession {
                name: "x".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(store.delete_session(session.id).await.unwrap());
        assert!(!store.delete_session(session.id).await.unwrap());
    }

    #[tokio::test]
    async fn purge_dead_only_removes_sessions_past_the_cutoff() {
        let (_dir, store) = open_store();
        let session = store
            .create_session(NewSession {
                name: "x".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        store.mark_dead(session.id).await.unwrap();

        // Just marked dead, not past a 7-day cutoff yet.
        assert_eq!(store.purge_dead(7).await.unwrap(), 0);
        assert!(store.get_session(session.id).await.unwrap().is_some());

        // A cutoff of 0 days treats "now" as past-due.
        assert_eq!(store.purge_dead(0).await.unwrap(), 1);
        assert!(store.get_session(session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_auxiliary_state_is_compare_and_swap() {
        let (_dir, store) = open_store();
        let session = store
            .create_session(NewSession {
                name: "aux".into(),
                mode: SessionMode::Auxiliary,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(
            store
                .update_auxiliary_state(
                    session.id,
                    AuxiliaryState::Starting,
                    Some(AuxiliaryState::NotStarted),
                )
                .await
                .unwrap()
        );
        // Wrong expected state: rejected.
        assert!(
            !store
                .update_auxiliary_state(
                    session.id,
                    AuxiliaryState::Running,
                    Some(AuxiliaryState::NotStarted),
                )
                .await
                .unwrap()
        );
        assert_eq!(
            store.get_auxiliary_state(session.id).await.unwrap(),
            Some(AuxiliaryState::Starting)
        );
    }

    #[tokio::test]
    async fn create_pane_with_sessions_creates_a_shell_session_and_an_auxiliary_for_project_panes() {
        let (_dir, store) = open_store();
        let pane = store
            .create_pane_with_sessions(NewPane {
                pane_type: PaneType::Project,
                pane_name: "main".into(),
                project_id: Some("proj-a".into()),
                working_dir: Some("/tmp/proj-a".into()),
                pane_order: None,
            })
            .await
            .unwrap();

        assert_eq!(pane.sessions.len(), 2);
        assert!(pane.sessions.iter().any(|s| s.mode == SessionMode::Shell));
        assert!(pane.sessions.iter().any(|s| s.mode == SessionMode::Auxiliary));
        assert!(pane.sessions.iter().all(|s| s.pane_id == Some(pane.pane.id)));
    }

    #[tokio::test]
    async fn create_pane_with_sessions_skips_auxiliary_for_adhoc_panes() {
        let (_dir, store) = open_store();
        let pane = store
            .create_pane_with_sessions(NewPane {
                pane_type: PaneType::Adhoc,
                pane_name: "scratch".into(),
                project_id: None,
                working_dir: None,
                pane_order: None,
            })
            .await
            .unwrap();

        assert_eq!(pane.sessions.len(), 1);
        assert_eq!(pane.sessions[0].mode, SessionMode::Shell);
    }

    #[tokio::test]
    async fn swap_pane_positions_exchanges_pane_order() {
        let (_dir, store) = open_store();
        let a = store
            .create_pane_with_sessions(NewPane {
                pane_type: PaneType::Adhoc,
                pane_name: "a".into(),
                project_id: None,
                working_dir: None,
                pane_order: Some(0),
            })
            .await
            .unwrap();
        let b = store
            .create_pane_with_sessions(NewPane {
                pane_type: PaneType::Adhoc,
                pane_name: "b".into(),
                project_id: None,
                working_dir: None,
                pane_order: Some(1),
            })
            .await
            .unwrap();

        assert!(store.swap_pane_positions(a.pane.id, b.pane.id).await.unwrap());

        let a2 = store.get_pane(a.pane.id).await.unwrap().unwrap();
        let b2 = store.get_pane(b.pane.id).await.unwrap().unwrap();
        assert_eq!(a2.pane_order, 1);
        assert_eq!(b2.pane_order, 0);
    }

    #[tokio::test]
    async fn swap_pane_positions_reports_false_for_a_missing_pane() {
        let (_dir, store) = open_store();
        let a = store
            .create_pane_with_sessions(NewPane {
                pane_type: PaneType::Adhoc,
                pane_name: "a".into(),
                project_id: None,
                working_dir: None,
                pane_order: None,
            })
            .await
            .unwrap();
        let missing = PaneId::new();
        assert!(!store.swap_pane_positions(a.pane.id, missing).await.unwrap());
    }

    #[tokio::test]
    async fn upsert_settings_inserts_then_updates() {
        let (_dir, store) = open_store();
        let created = store
            .upsert_settings(
                "proj-a",
                SettingsUpdate {
                    enabled: Some(true),
                    active_mode: Some(SessionMode::Shell),
                    display_order: Some(1),
                },
            )
            .await
            .unwrap();
        assert!(created.enabled);

        let updated = store
            .upsert_settings(
                "proj-a",
                SettingsUpdate {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated.enabled);
        assert_eq!(updated.display_order, 1);
    }
}
