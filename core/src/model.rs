//! Data model: Session, Pane, ProjectSettings and their enums.
//! The Store is the exclusive owner of these records (see store module).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque session identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque pane identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaneId(pub uuid::Uuid);

impl PaneId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for PaneId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A session's purpose: plain shell, or a secondary AI-assistant process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Shell,
    Auxiliary,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Shell => "shell",
            SessionMode::Auxiliary => "auxiliary",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "shell" => Some(SessionMode::Shell),
            "auxiliary" => Some(SessionMode::Auxiliary),
            _ => None,
        }
    }
}

/// Run state of the auxiliary (AI-assistant) process inside a session's mux pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxiliaryState {
    NotStarted,
    Starting,
    Running,
    Stopped,
    Error,
}

impl AuxiliaryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuxiliaryState::NotStarted => "not_started",
            AuxiliaryState::Starting => "starting",
            AuxiliaryState::Running => "running",
            AuxiliaryState::Stopped => "stopped",
            AuxiliaryState::Error => "error",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(AuxiliaryState::NotStarted),
            "starting" => Some(AuxiliaryState::Starting),
            "running" => Some(AuxiliaryState::Running),
            "stopped" => Some(AuxiliaryState::Stopped),
            "error" => Some(AuxiliaryState::Error),
            _ => None,
        }
    }
}

/// Durable record of one terminal. Source of truth for whether a mux session
/// is expected to exist (`is_alive`); survives past mux death to allow resurrection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub project_id: Option<String>,
    pub working_dir: Option<String>,
    pub mode: SessionMode,
    pub session_number: i64,
    pub is_alive: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_accessed_at: chrono::DateTime<chrono::Utc>,
    pub last_target_session: Option<String>,
    pub auxiliary_state: AuxiliaryState,
    pub pane_id: Option<PaneId>,
}

/// Grouping of 1-2 sessions, owned atomically by PaneManager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaneType {
    Project,
    Adhoc,
}

impl PaneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaneType::Project => "project",
            PaneType::Adhoc => "adhoc",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "project" => Some(PaneType::Project),
            "adhoc" => Some(PaneType::Adhoc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pane {
    pub id: PaneId,
    pub pane_type: PaneType,
    pub project_id: Option<String>,
    pub pane_order: i64,
    pub pane_name: String,
    pub active_mode: SessionMode,
    pub width_percent: Option<f64>,
    pub height_percent: Option<f64>,
    pub grid_row: Option<i64>,
    pub grid_col: Option<i64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A pane plus its owned sessions, returned from creation/lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaneWithSessions {
    #[serde(flatten)]
    pub pane: Pane,
    pub sessions: Vec<Session>,
}

/// Per-project terminal configuration. Upserted idempotently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub project_id: String,
    pub enabled: bool,
    pub active_mode: SessionMode,
    pub display_order: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Hard cap on total panes, enforced by PaneManager at creation.
pub const MAX_PANES: i64 = 4;
