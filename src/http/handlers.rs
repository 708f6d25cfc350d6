use super::state::AppState;
use crate::audio::{AudioDevice, TargetPresence};
use crate::error::RecorderError;
use crate::session::{DeletionReport, EngineStatus, SessionSnapshot, StartRequest};
use crate::transfer::{StorageConfig, StorageConfigPatch, TransferJob};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
    pub timestamp: String,
}

/// Hardware, recording and defaults in one response
#[derive(Debug, Serialize)]
pub struct SystemStatusResponse {
    pub timestamp: String,
    pub service: String,
    pub version: &'static str,
    pub device: TargetPresence,
    pub recording: EngineStatus,
    pub config: RecorderDefaults,
}

#[derive(Debug, Serialize)]
pub struct RecorderDefaults {
    pub default_duration: f64,
    pub max_duration: f64,
    pub sample_rate: u32,
    pub output_prefix: String,
    pub playback_directory: String,
    pub recordings_directory: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeviceQuery {
    /// Overrides the configured target pattern
    pub pattern: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    pub devices: Vec<AudioDevice>,
    pub count: usize,
    pub target_pattern: String,
}

#[derive(Debug, Serialize)]
pub struct TargetDeviceResponse {
    pub found: bool,
    pub pattern: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<AudioDevice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<AudioDevice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub sessions: Vec<SessionSnapshot>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    /// Session id or human id of a finished session
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    /// Session id or human id of a finished session
    pub session_id: String,
    #[serde(default)]
    pub delete_after_transfer: bool,
}

#[derive(Debug, Serialize)]
pub struct TransferListResponse {
    pub transfers: Vec<TransferJob>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// HTTP status for each error class
pub fn status_for(err: &RecorderError) -> StatusCode {
    match err {
        RecorderError::SessionAlreadyActive | RecorderError::SessionInProgress(_) => {
            StatusCode::CONFLICT
        }
        RecorderError::DeviceNotFound { .. }
        | RecorderError::NoActiveSession
        | RecorderError::SessionNotFound(_)
        | RecorderError::NoSessionFiles(_) => StatusCode::NOT_FOUND,
        RecorderError::InvalidPlaybackFile(_)
        | RecorderError::InvalidRequest(_)
        | RecorderError::StorageDisabled
        | RecorderError::StorageIncomplete(_)
        | RecorderError::ProtocolNotImplemented(_)
        | RecorderError::NothingToTransfer(_) => StatusCode::BAD_REQUEST,
        RecorderError::Audio(_) | RecorderError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: RecorderError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        warn!("Request rejected: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: state.service_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Local::now().to_rfc3339(),
    })
}

/// GET /api/v1/status
/// Target device presence, current recording and recorder defaults
pub async fn system_status(State(state): State<AppState>) -> Response {
    let device = match state.engine.target_presence().await {
        Ok(device) => device,
        Err(e) => return error_response(e),
    };
    let settings = state.engine.settings();

    Json(SystemStatusResponse {
        timestamp: Local::now().to_rfc3339(),
        service: state.service_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        device,
        recording: state.engine.status().await,
        config: RecorderDefaults {
            default_duration: settings.default_duration_secs,
            max_duration: settings.max_duration_secs,
            sample_rate: settings.sample_rate,
            output_prefix: settings.output_prefix.clone(),
            playback_directory: settings.playback_dir.display().to_string(),
            recordings_directory: settings.recordings_dir.display().to_string(),
        },
    })
    .into_response()
}

/// GET /api/v1/devices
/// Enumerate every audio device with the target flag set
pub async fn list_devices(
    State(state): State<AppState>,
    Query(query): Query<DeviceQuery>,
) -> Response {
    let pattern = query
        .pattern
        .unwrap_or_else(|| state.engine.settings().device_pattern.clone());

    match state.engine.devices(Some(pattern.clone())).await {
        Ok(devices) => (
            StatusCode::OK,
            Json(DeviceListResponse {
                count: devices.len(),
                devices,
                target_pattern: pattern,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/v1/devices/target
/// Resolve the configured input/output pair
pub async fn target_device(State(state): State<AppState>) -> Response {
    let pattern = state.engine.settings().device_pattern.clone();

    match state.engine.resolve_devices(None, None).await {
        Ok(pair) => Json(TargetDeviceResponse {
            found: true,
            pattern,
            input: Some(pair.input),
            output: Some(pair.output),
            error: None,
        })
        .into_response(),
        Err(e @ RecorderError::DeviceNotFound { .. }) => Json(TargetDeviceResponse {
            found: false,
            pattern,
            input: None,
            output: None,
            error: Some(e.to_string()),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/v1/recordings/start
/// Start a playback+capture session; returns once it is running
pub async fn start_recording(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Response {
    info!("Start requested for playback file {}", req.playback_file);

    let config = match req.resolve(state.engine.settings()) {
        Ok(config) => config,
        Err(e) => return error_response(e),
    };

    match state.engine.start(config).await {
        Ok(session) => {
            info!("Recording {} started", session.id());
            (StatusCode::ACCEPTED, Json(session.snapshot())).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /api/v1/recordings/stop
/// Cancel the active session and return it finalized
pub async fn stop_recording(State(state): State<AppState>) -> Response {
    match state.engine.stop().await {
        Ok(session) => (StatusCode::OK, Json(session.snapshot())).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/v1/recordings/status
pub async fn recording_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.status().await)
}

/// GET /api/v1/recordings/history
pub async fn recording_history(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.engine.history().await;
    Json(HistoryResponse {
        count: sessions.len(),
        sessions,
    })
}

/// POST /api/v1/recordings/delete
/// Remove a finished session's files from the recordings directory
pub async fn delete_recording(
    State(state): State<AppState>,
    Json(req): Json<DeleteRequest>,
) -> Response {
    if req.session_id.trim().is_empty() {
        return error_response(RecorderError::InvalidRequest(
            "session_id is required".to_string(),
        ));
    }

    match state.engine.delete(req.session_id.trim()).await {
        Ok(report) => {
            info!(
                "Deleted {} files of session {}",
                report.deleted_count, report.session_id
            );
            (StatusCode::OK, Json::<DeletionReport>(report)).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /api/v1/recordings/transfer
/// Queue delivery of a finished session's files
pub async fn transfer_recording(
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Response {
    match state
        .transfers
        .enqueue(&req.session_id, req.delete_after_transfer)
        .await
    {
        Ok(job) => (StatusCode::ACCEPTED, Json(job)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/v1/transfers
pub async fn list_transfers(State(state): State<AppState>) -> impl IntoResponse {
    let transfers = state.transfers.jobs().await;
    Json(TransferListResponse {
        count: transfers.len(),
        transfers,
    })
}

/// GET /api/v1/transfers/:id
pub async fn get_transfer(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.transfers.job(id).await {
        Some(job) => (StatusCode::OK, Json(job)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Transfer {} not found", id),
            }),
        )
            .into_response(),
    }
}

/// GET /api/v1/storage/config
/// Current storage target with the password masked
pub async fn get_storage_config(State(state): State<AppState>) -> Json<StorageConfig> {
    Json(state.storage.load().await.masked())
}

/// PUT /api/v1/storage/config
/// Merge the given fields and replace the config in one step
pub async fn update_storage_config(
    State(state): State<AppState>,
    Json(patch): Json<StorageConfigPatch>,
) -> Json<StorageConfig> {
    let updated = state.storage.update(patch).await;
    Json(updated.masked())
}
