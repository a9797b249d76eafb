//! Web server module for Harvester.
//!
//! JSON API over the collection supervisor, the round-robin cursor and the
//! record store.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use strum_macros::Display;
use thiserror::Error;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::collector::{CollectionSupervisor, CollectorError, CursorTracker};
use crate::storage::{DEFAULT_GROUP, GroupId, Record, RecordReader, StorageError};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<CollectionSupervisor>,
    pub cursor: Arc<CursorTracker>,
    pub reader: RecordReader,
}

/// Request failure rendered as `{"detail": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("group_id must be a positive integer, got {0}")]
    InvalidGroup(GroupId),

    #[error("group {0} has no collected data")]
    NoData(GroupId),

    #[error("collection failed: {0}")]
    Collect(#[from] CollectorError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidGroup(_) => StatusCode::BAD_REQUEST,
            Self::NoData(_) => StatusCode::NOT_FOUND,
            Self::Collect(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn check_group(group_id: GroupId) -> Result<GroupId, ApiError> {
    if group_id < 1 {
        return Err(ApiError::InvalidGroup(group_id));
    }
    Ok(group_id)
}

/// Outcome reported by the start/stop endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CollectionStatus {
    Collecting,
    AlreadyCollecting,
    Stopped,
    AlreadyStopped,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,
}

#[derive(Serialize)]
struct CurrentResponse {
    group_id: GroupId,
    current_data: Record,
    next_update: &'static str,
}

#[derive(Serialize)]
struct RecordsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    group_id: Option<GroupId>,
    total_count: usize,
    data: Vec<Record>,
}

#[derive(Serialize)]
struct StatsResponse {
    total_records: u64,
    available_groups: Vec<GroupId>,
    current_indexes: BTreeMap<GroupId, u64>,
    latest_collection: Option<DateTime<Utc>>,
    earliest_collection: Option<DateTime<Utc>>,
    collection_interval: String,
}

#[derive(Serialize)]
struct CollectResponse {
    message: String,
    data: Record,
}

#[derive(Serialize)]
struct ControlResponse {
    message: String,
    group_id: GroupId,
    status: CollectionStatus,
}

#[derive(Serialize)]
struct GroupStatusResponse {
    group_id: GroupId,
    is_collecting: bool,
    total_records: u64,
    current_index: u64,
    status: CollectionStatus,
}

#[derive(Serialize)]
struct StatusResponse {
    collecting_groups: BTreeMap<GroupId, bool>,
    available_groups: Vec<GroupId>,
    current_indexes: BTreeMap<GroupId, u64>,
}

#[derive(Serialize)]
struct GroupDetail {
    group_id: GroupId,
    total_records: u64,
    current_index: u64,
    is_collecting: bool,
    latest_record: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct GroupsResponse {
    available_groups: Vec<GroupId>,
    group_details: Vec<GroupDetail>,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/", get(root_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/current", get(current_default_handler))
        .route("/current/{group_id}", get(current_handler))
        .route("/all", get(all_handler))
        .route("/all/{group_id}", get(all_group_handler))
        .route("/stats", get(stats_handler))
        .route("/collect", post(collect_default_handler))
        .route("/collect/{group_id}", post(collect_handler))
        .route("/start", post(start_default_handler))
        .route("/start/{group_id}", post(start_handler))
        .route("/stop", post(stop_default_handler))
        .route("/stop/{group_id}", post(stop_handler))
        .route("/status", get(status_handler))
        .route("/status/{group_id}", get(group_status_handler))
        .route("/groups", get(groups_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Service banner and endpoint listing.
async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Harvester data collection API",
        "endpoints": {
            "/current/{group_id}": "next record of a group; every call advances to the following one",
            "/all": "all collected records",
            "/all/{group_id}": "all records of a group",
            "/stats": "store statistics",
            "/collect/{group_id}": "collect once for a group",
            "/start/{group_id}": "start collecting for a group",
            "/stop/{group_id}": "stop collecting for a group",
            "/status": "collection status of all groups",
            "/status/{group_id}": "collection status of a group",
            "/groups": "groups that have data",
        }
    }))
}

/// Liveness check.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        db: None,
    })
}

/// Readiness check against the record store.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.reader.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "ok".to_string(),
            db: Some("ready".to_string()),
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    db: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}

async fn current_default_handler(state: State<Arc<AppState>>) -> ApiResult<CurrentResponse> {
    current_handler(state, Path(DEFAULT_GROUP)).await
}

/// Advance the group's cursor and return the record it pointed at.
async fn current_handler(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<GroupId>,
) -> ApiResult<CurrentResponse> {
    let group_id = check_group(group_id)?;
    let record = state
        .cursor
        .next(group_id)
        .await?
        .ok_or(ApiError::NoData(group_id))?;

    Ok(Json(CurrentResponse {
        group_id,
        current_data: record,
        next_update: "the next call returns the following record",
    }))
}

async fn all_handler(State(state): State<Arc<AppState>>) -> ApiResult<RecordsResponse> {
    let data = state.reader.list(None).await?;
    Ok(Json(RecordsResponse {
        group_id: None,
        total_count: data.len(),
        data,
    }))
}

async fn all_group_handler(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<GroupId>,
) -> ApiResult<RecordsResponse> {
    let group_id = check_group(group_id)?;
    let data = state.reader.list(Some(group_id)).await?;
    Ok(Json(RecordsResponse {
        group_id: Some(group_id),
        total_count: data.len(),
        data,
    }))
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> ApiResult<StatsResponse> {
    let stats = state.reader.stats().await?;
    let available_groups = state.reader.distinct_groups().await?;

    Ok(Json(StatsResponse {
        total_records: stats.total_records,
        available_groups,
        current_indexes: state.cursor.snapshot().await,
        latest_collection: stats.latest,
        earliest_collection: stats.earliest,
        collection_interval: humantime::format_duration(state.supervisor.interval()).to_string(),
    }))
}

async fn collect_default_handler(state: State<Arc<AppState>>) -> ApiResult<CollectResponse> {
    collect_handler(state, Path(DEFAULT_GROUP)).await
}

/// One-shot fetch-and-store, independent of any running task.
async fn collect_handler(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<GroupId>,
) -> ApiResult<CollectResponse> {
    let group_id = check_group(group_id)?;
    let record = state.supervisor.collect_once(group_id).await?;
    Ok(Json(CollectResponse {
        message: format!("group {} collected record {}", group_id, record.id),
        data: record,
    }))
}

async fn start_default_handler(state: State<Arc<AppState>>) -> ApiResult<ControlResponse> {
    start_handler(state, Path(DEFAULT_GROUP)).await
}

async fn start_handler(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<GroupId>,
) -> ApiResult<ControlResponse> {
    let group_id = check_group(group_id)?;
    let (status, message) = if state.supervisor.start(group_id).await {
        (
            CollectionStatus::Collecting,
            format!("group {} collection started", group_id),
        )
    } else {
        (
            CollectionStatus::AlreadyCollecting,
            format!("group {} collection is already running", group_id),
        )
    };

    tracing::debug!(group_id, %status, "Start requested");
    Ok(Json(ControlResponse {
        message,
        group_id,
        status,
    }))
}

async fn stop_default_handler(state: State<Arc<AppState>>) -> ApiResult<ControlResponse> {
    stop_handler(state, Path(DEFAULT_GROUP)).await
}

async fn stop_handler(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<GroupId>,
) -> ApiResult<ControlResponse> {
    let group_id = check_group(group_id)?;
    let (status, message) = if state.supervisor.stop(group_id).await {
        (
            CollectionStatus::Stopped,
            format!("group {} collection stopped", group_id),
        )
    } else {
        (
            CollectionStatus::AlreadyStopped,
            format!("group {} collection is not running", group_id),
        )
    };

    tracing::debug!(group_id, %status, "Stop requested");
    Ok(Json(ControlResponse {
        message,
        group_id,
        status,
    }))
}

async fn group_status_handler(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<GroupId>,
) -> ApiResult<GroupStatusResponse> {
    let group_id = check_group(group_id)?;
    let is_collecting = state.supervisor.is_active(group_id).await;

    Ok(Json(GroupStatusResponse {
        group_id,
        is_collecting,
        total_records: state.reader.count(Some(group_id)).await?,
        current_index: state.cursor.index(group_id).await,
        status: if is_collecting {
            CollectionStatus::Collecting
        } else {
            CollectionStatus::Stopped
        },
    }))
}

async fn status_handler(State(state): State<Arc<AppState>>) -> ApiResult<StatusResponse> {
    Ok(Json(StatusResponse {
        collecting_groups: state.supervisor.active_snapshot().await,
        available_groups: state.reader.distinct_groups().await?,
        current_indexes: state.cursor.snapshot().await,
    }))
}

async fn groups_handler(State(state): State<Arc<AppState>>) -> ApiResult<GroupsResponse> {
    let summaries = state.reader.group_summaries().await?;
    let indexes = state.cursor.snapshot().await;

    let mut group_details = Vec::with_capacity(summaries.len());
    for summary in summaries {
        group_details.push(GroupDetail {
            group_id: summary.group_id,
            total_records: summary.total_records,
            current_index: indexes.get(&summary.group_id).copied().unwrap_or(0),
            is_collecting: state.supervisor.is_active(summary.group_id).await,
            latest_record: summary.latest,
        });
    }

    Ok(Json(GroupsResponse {
        available_groups: group_details.iter().map(|g| g.group_id).collect(),
        group_details,
    }))
}
