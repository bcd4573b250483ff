//! Minimal REST surface over LifecycleCore/Batch/PaneManager/Store. Kept
//! deliberately thin per the non-goal on auth/CORS — no middleware layer,
//! just the routes that exercise the core's contracts end-to-end.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use common::error::{LifecycleError, StoreError};
use common::model::{PaneId, SessionId, SessionMode};
use common::store::{PaneLayoutUpdate, PaneUpdate, SessionUpdate, SettingsUpdate};

use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn lifecycle_status(e: LifecycleError) -> (StatusCode, String) {
    match e {
        LifecycleError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        LifecycleError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
        LifecycleError::Store(StoreError::NotFound) => (StatusCode::NOT_FOUND, "not found".to_string()),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

fn store_status(e: StoreError) -> (StatusCode, String) {
    match e {
        StoreError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

fn parse_session_id(id: &str) -> Result<SessionId, (StatusCode, String)> {
    SessionId::parse(id).ok_or((StatusCode::BAD_REQUEST, "invalid session id".to_string()))
}

fn parse_pane_id(id: &str) -> Result<PaneId, (StatusCode, String)> {
    PaneId::parse(id).ok_or((StatusCode::BAD_REQUEST, "invalid pane id".to_string()))
}

#[derive(serde::Deserialize)]
pub struct ListSessionsQuery {
    #[serde(default)]
    include_dead: bool,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Query(q): Query<ListSessionsQuery>,
) -> ApiResult<Vec<common::model::Session>> {
    let rows = state
        .store
        .list_sessions(q.include_dead)
        .await
        .map_err(store_status)?;
    Ok(Json(rows))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<common::model::Session> {
    let id = parse_session_id(&id)?;
    let row = state
        .store
        .get_session(id)
        .await
        .map_err(store_status)?
        .ok_or((StatusCode::NOT_FOUND, "not found".to_string()))?;
    Ok(Json(row))
}

#[derive(serde::Deserialize, Default)]
pub struct UpdateSessionBody {
    name: Option<String>,
    working_dir: Option<String>,
    is_alive: Option<bool>,
}

pub async fn update_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateSessionBody>,
) -> ApiResult<common::model::Session> {
    let id = parse_session_id(&id)?;
    let row = state
        .store
        .update_session(
            id,
            SessionUpdate {
                name: body.name,
                working_dir: body.working_dir,
                is_alive: body.is_alive,
            },
        )
        .await
        .map_err(store_status)?
        .ok_or((StatusCode::NOT_FOUND, "not found".to_string()))?;
    Ok(Json(row))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let id = parse_session_id(&id)?;
    state.lifecycle.delete(id).await.map_err(lifecycle_status)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(serde::Serialize)]
pub struct ResetResponse {
    id: Option<String>,
}

pub async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ResetResponse> {
    let id = parse_session_id(&id)?;
    let new_id = state.batch.reset(id).await.map_err(lifecycle_status)?;
    Ok(Json(ResetResponse {
        id: new_id.map(|i| i.to_string()),
    }))
}

#[derive(serde::Serialize)]
pub struct ResetAllResponse {
    count: u64,
}

pub async fn reset_all_sessions(State(state): State<AppState>) -> ApiResult<ResetAllResponse> {
    let count = state.batch.reset_all().await.map_err(lifecycle_status)?;
    Ok(Json(ResetAllResponse { count }))
}

pub async fn list_panes(State(state): State<AppState>) -> ApiResult<Vec<common::model::Pane>> {
    let panes = state.store.list_panes().await.map_err(store_status)?;
    Ok(Json(panes))
}

pub async fn count_panes(State(state): State<AppState>) -> ApiResult<i64> {
    let count = state.store.count_panes().await.map_err(store_status)?;
    Ok(Json(count))
}

pub async fn get_pane(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<common::model::PaneWithSessions> {
    let id = parse_pane_id(&id)?;
    let pane = state
        .store
        .get_pane_with_sessions(id)
        .await
        .map_err(store_status)?
        .ok_or((StatusCode::NOT_FOUND, "not found".to_string()))?;
    Ok(Json(pane))
}

#[derive(serde::Deserialize)]
pub struct CreatePaneBody {
    pane_type: String,
    pane_name: String,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    working_dir: Option<String>,
    #[serde(default)]
    pane_order: Option<i64>,
}

pub async fn create_pane(
    State(state): State<AppState>,
    Json(body): Json<CreatePaneBody>,
) -> ApiResult<common::model::PaneWithSessions> {
    let pane_type = common::model::PaneType::from_str_opt(&body.pane_type)
        .ok_or((StatusCode::BAD_REQUEST, "invalid pane_type".to_string()))?;
    let pane = state
        .panes
        .create_with_sessions(
            pane_type,
            &body.pane_name,
            body.project_id.as_deref(),
            body.working_dir.as_deref(),
            body.pane_order,
        )
        .await
        .map_err(lifecycle_status)?;
    Ok(Json(pane))
}

#[derive(serde::Deserialize, Default)]
pub struct UpdatePaneBody {
    pane_name: Option<String>,
    pane_order: Option<i64>,
    active_mode: Option<String>,
    width_percent: Option<f64>,
    height_percent: Option<f64>,
    grid_row: Option<i64>,
    grid_col: Option<i64>,
}

pub async fn update_pane(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdatePaneBody>,
) -> ApiResult<common::model::Pane> {
    let id = parse_pane_id(&id)?;
    let active_mode = match body.active_mode {
        Some(s) => Some(
            SessionMode::from_str_opt(&s)
                .ok_or((StatusCode::BAD_REQUEST, "invalid active_mode".to_string()))?,
        ),
        None => None,
    };
    let pane = state
        .panes
        .update_pane(
            id,
            PaneUpdate {
                pane_name: body.pane_name,
                pane_order: body.pane_order,
                active_mode,
                width_percent: body.width_percent,
                height_percent: body.height_percent,
                grid_row: body.grid_row,
                grid_col: body.grid_col,
            },
        )
        .await
        .map_err(lifecycle_status)?
        .ok_or((StatusCode::NOT_FOUND, "not found".to_string()))?;
    Ok(Json(pane))
}

pub async fn delete_pane(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let id = parse_pane_id(&id)?;
    state.panes.delete_pane(id).await.map_err(lifecycle_status)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(serde::Deserialize)]
pub struct SwapPanesBody {
    a: String,
    b: String,
}

pub async fn swap_panes(
    State(state): State<AppState>,
    Json(body): Json<SwapPanesBody>,
) -> Result<StatusCode, (StatusCode, String)> {
    let a = parse_pane_id(&body.a)?;
    let b = parse_pane_id(&body.b)?;
    state.panes.swap_positions(a, b).await.map_err(lifecycle_status)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(serde::Deserialize)]
pub struct OrderItem {
    id: String,
    order: i64,
}

pub async fn update_pane_order(
    State(state): State<AppState>,
    Json(body): Json<Vec<OrderItem>>,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut orders = Vec::with_capacity(body.len());
    for item in body {
        orders.push((parse_pane_id(&item.id)?, item.order));
    }
    state.panes.update_order(&orders).await.map_err(lifecycle_status)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(serde::Deserialize)]
pub struct LayoutItem {
    pane_id: String,
    width_percent: Option<f64>,
    height_percent: Option<f64>,
    grid_row: Option<i64>,
    grid_col: Option<i64>,
}

pub async fn update_pane_layouts(
    State(state): State<AppState>,
    Json(body): Json<Vec<LayoutItem>>,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut items = Vec::with_capacity(body.len());
    for item in body {
        items.push(PaneLayoutUpdate {
            pane_id: parse_pane_id(&item.pane_id)?,
            width_percent: item.width_percent,
            height_percent: item.height_percent,
            grid_row: item.grid_row,
            grid_col: item.grid_col,
        });
    }
    state
        .panes
        .update_layouts(&items)
        .await
        .map_err(lifecycle_status)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_project_settings(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<common::model::ProjectSettings> {
    let settings = state
        .store
        .get_settings(&project_id)
        .await
        .map_err(store_status)?
        .ok_or((StatusCode::NOT_FOUND, "not found".to_string()))?;
    Ok(Json(settings))
}

#[derive(serde::Deserialize, Default)]
pub struct UpdateSettingsBody {
    enabled: Option<bool>,
    active_mode: Option<String>,
    display_order: Option<i64>,
}

pub async fn upsert_project_settings(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(body): Json<UpdateSettingsBody>,
) -> ApiResult<common::model::ProjectSettings> {
    let active_mode = match body.active_mode {
        Some(s) => Some(
            SessionMode::from_str_opt(&s)
                .ok_or((StatusCode::BAD_REQUEST, "invalid active_mode".to_string()))?,
        ),
        None => None,
    };
    let settings = state
        .store
        .upsert_settings(
            &project_id,
            SettingsUpdate {
                enabled: body.enabled,
                active_mode,
                display_order: body.display_order,
            },
        )
        .await
        .map_err(store_status)?;
    Ok(Json(settings))
}

pub async fn disable_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .batch
        .disable_project(&project_id)
        .await
        .map_err(lifecycle_status)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(serde::Serialize)]
pub struct AuxiliaryStateResponse {
    state: String,
}

pub async fn get_auxiliary_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<AuxiliaryStateResponse> {
    let id = parse_session_id(&id)?;
    let s = state
        .auxiliary
        .get_auxiliary_state(id)
        .await
        .map_err(lifecycle_status)?;
    Ok(Json(AuxiliaryStateResponse {
        state: s.as_str().to_string(),
    }))
}

#[derive(serde::Serialize)]
pub struct StartAuxiliaryResponse {
    started: bool,
    state: String,
}

pub async fn start_auxiliary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StartAuxiliaryResponse> {
    let id = parse_session_id(&id)?;
    let result = state.auxiliary.start_auxiliary(id).await.map_err(lifecycle_status)?;
    Ok(Json(StartAuxiliaryResponse {
        started: result.started,
        state: result.state.as_str().to_string(),
    }))
}
