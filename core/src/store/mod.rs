//! Store: persistent state (sessions, panes, project settings). Provides
//! atomic, typed CRUD and conditional updates. Source of truth for session
//! liveness.

mod pool;
mod schema;
mod sqlite;

pub use pool::Pool;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{
    AuxiliaryState, Pane, PaneId, PaneWithSessions, ProjectSettings, Session, SessionId,
    SessionMode,
};

/// Fields accepted when creating a new session. `id`/`session_number` are computed.
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub name: String,
    pub project_id: Option<String>,
    pub working_dir: Option<String>,
    pub mode: SessionMode,
    pub pane_id: Option<PaneId>,
}

/// Mutable fields on `update_session`. `None` means "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub name: Option<String>,
    pub working_dir: Option<String>,
    pub is_alive: Option<bool>,
}

/// Both canonical sessions for a project, when present.
#[derive(Debug, Clone, Default)]
pub struct ProjectSessions {
    pub shell: Option<Session>,
    pub auxiliary: Option<Session>,
}

/// Fields accepted when creating a pane with its owned sessions.
#[derive(Debug, Clone)]
pub struct NewPane {
    pub pane_type: crate::model::PaneType,
    pub pane_name: String,
    pub project_id: Option<String>,
    pub working_dir: Option<String>,
    pub pane_order: Option<i64>,
}

/// Mutable fields on `update_pane`.
#[derive(Debug, Clone, Default)]
pub struct PaneUpdate {
    pub pane_name: Option<String>,
    pub pane_order: Option<i64>,
    pub active_mode: Option<SessionMode>,
    pub width_percent: Option<f64>,
    pub height_percent: Option<f64>,
    pub grid_row: Option<i64>,
    pub grid_col: Option<i64>,
}

/// One item in a bulk layout update; `pane_id` selects the row, other fields
/// are applied via COALESCE(new, old).
#[derive(Debug, Clone, Default)]
pub struct PaneLayoutUpdate {
    pub pane_id: PaneId,
    pub width_percent: Option<f64>,
    pub height_percent: Option<f64>,
    pub grid_row: Option<i64>,
    pub grid_col: Option<i64>,
}

/// Mutable fields on `upsert_settings`.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub enabled: Option<bool>,
    pub active_mode: Option<SessionMode>,
    pub display_order: Option<i64>,
}

/// Persistent CRUD surface. Hidden behind a trait so lifecycle/pane logic can
/// be exercised against an in-memory fake in tests without a real database.
#[async_trait]
pub trait Store: Send + Sync {
    async fn list_sessions(&self, include_dead: bool) -> Result<Vec<Session>, StoreError>;
    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StoreError>;
    async fn create_session(&self, params: NewSession) -> Result<Session, StoreError>;
    async fn update_session(
        &self,
        id: SessionId,
        fields: SessionUpdate,
    ) -> Result<Option<Session>, StoreError>;
    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError>;
    async fn mark_dead(&self, id: SessionId) -> Result<bool, StoreError>;
    async fn touch(&self, id: SessionId) -> Result<bool, StoreError>;
    async fn purge_dead(&self, older_than_days: i64) -> Result<u64, StoreError>;
    async fn list_orphaned(&self, older_than_days: i64) -> Result<Vec<Session>, StoreError>;
    async fn get_session_by_project(
        &self,
        project_id: &str,
        mode: SessionMode,
    ) -> Result<Option<Session>, StoreError>;
    async fn get_dead_session_by_project(
        &self,
        project_id: &str,
        mode: SessionMode,
    ) -> Result<Option<Session>, StoreError>;
    async fn get_project_sessions(&self, project_id: &str) -> Result<ProjectSessions, StoreError>;
    async fn get_all_project_sessions(&self, project_id: &str) -> Result<Vec<Session>, StoreError>;
    async fn update_target_session(
        &self,
        id: SessionId,
        name: Option<&str>,
    ) -> Result<bool, StoreError>;
    async fn update_auxiliary_state(
        &self,
        id: SessionId,
        new: AuxiliaryState,
        expected: Option<AuxiliaryState>,
    ) -> Result<bool, StoreError>;
    async fn get_auxiliary_state(&self, id: SessionId) -> Result<Option<AuxiliaryState>, StoreError>;

    async fn list_panes(&self) -> Result<Vec<Pane>, StoreError>;
    async fn get_pane(&self, id: PaneId) -> Result<Option<Pane>, StoreError>;
    async fn get_pane_with_sessions(
        &self,
        id: PaneId,
    ) -> Result<Option<PaneWithSessions>, StoreError>;
    async fn count_panes(&self) -> Result<i64, StoreError>;
    async fn create_pane_with_sessions(
        &self,
        params: NewPane,
    ) -> Result<PaneWithSessions, StoreError>;
    async fn update_pane(&self, id: PaneId, fields: PaneUpdate) -> Result<Option<Pane>, StoreError>;
    async fn delete_pane(&self, id: PaneId) -> Result<bool, StoreError>;
    async fn swap_pane_positions(&self, a: PaneId, b: PaneId) -> Result<bool, StoreError>;
    async fn update_pane_order(&self, orders: &[(PaneId, i64)]) -> Result<(), StoreError>;
    async fn update_pane_layouts(&self, items: &[PaneLayoutUpdate]) -> Result<(), StoreError>;

    async fn get_settings(&self, project_id: &str) -> Result<Option<ProjectSettings>, StoreError>;
    async fn upsert_settings(
        &self,
        project_id: &str,
        fields: SettingsUpdate,
    ) -> Result<ProjectSettings, StoreError>;
}
