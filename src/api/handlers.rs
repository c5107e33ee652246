use crate::action::{ActionType, record_action};
use crate::api::ApiContext;
use crate::api::responses::{
    ActionRequest, ActionSuccessResponse, CorrectionSuccessResponse, CountersResponse, ErrorCode,
    ErrorResponse, HealthStatus, HealthSuccessResponse, LastBrewResponse, ScaleResponse,
    ScannerState, ScannerStatusResponse, StatusSuccessResponse,
};
use crate::correction::{BrewCorrection, correct_brew};
use crate::error::AppError;
use crate::sink::{Sink, SinkError};
use crate::state::{AppState, BrewCounters, BrewSummary, ScaleStatus, ScannerStatus};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, warn};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum ApiResponse<T> {
    Success {
        status: StatusCode,
        body: T,
    },
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success { status, body } => (status, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(context): State<ApiContext>) -> impl IntoResponse {
    build_health_response(&context.state, SystemTime::now())
}

pub async fn get_status(State(context): State<ApiContext>) -> impl IntoResponse {
    build_status_response(&context.state, SystemTime::now())
}

pub async fn put_brew_correction(
    State(context): State<ApiContext>,
    Path(brew_id): Path<String>,
    Json(correction): Json<BrewCorrection>,
) -> impl IntoResponse {
    // Sink calls may block on network IO.
    let result = tokio::task::spawn_blocking(move || {
        build_correction_response(
            context.sink.as_ref(),
            &context.database,
            &brew_id,
            &correction,
            SystemTime::now(),
        )
    })
    .await;
    result.unwrap_or_else(|err| {
        error!(error = %err, "Correction task failed");
        internal_error("/api/brews", "correction task failed")
    })
}

pub async fn post_action(
    State(context): State<ApiContext>,
    Json(request): Json<ActionRequest>,
) -> impl IntoResponse {
    let result = tokio::task::spawn_blocking(move || {
        build_action_response(
            context.sink.as_ref(),
            &context.database,
            &request,
            SystemTime::now(),
        )
    })
    .await;
    result.unwrap_or_else(|err| {
        error!(error = %err, "Action task failed");
        internal_error("/api/actions", "action task failed")
    })
}

fn build_health_response(
    state: &Arc<RwLock<AppState>>,
    now: SystemTime,
) -> ApiResponse<HealthSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/health", "state lock poisoned while reading scale");
        }
    };
    let status = derive_health_status(&guard);
    drop(guard);

    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => return internal_error("/api/health", "timestamp formatting failure"),
    };

    let status_code = match status {
        HealthStatus::Ko => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };

    ApiResponse::Success {
        status: status_code,
        body: HealthSuccessResponse { status, timestamp },
    }
}

fn derive_health_status(state: &AppState) -> HealthStatus {
    if !state.scale().connected {
        return HealthStatus::Ko;
    }
    if state.counters().sink_failures > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    }
}

fn build_status_response(
    state: &Arc<RwLock<AppState>>,
    now: SystemTime,
) -> ApiResponse<StatusSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/status", "state lock poisoned while reading status");
        }
    };
    let status = guard.status();
    let last_brew = guard.last_brew().cloned();
    let counters = guard.counters();
    let scale = guard.scale();
    drop(guard);

    let body = map_status(status, last_brew, counters, scale, now);

    match body {
        Ok(body) => ApiResponse::Success {
            status: StatusCode::OK,
            body,
        },
        Err(err) => {
            warn!(error = %err, "Failed to format status timestamps");
            internal_error("/api/status", "timestamp formatting failure")
        }
    }
}

fn map_status(
    status: ScannerStatus,
    last_brew: Option<BrewSummary>,
    counters: BrewCounters,
    scale: ScaleStatus,
    now: SystemTime,
) -> Result<StatusSuccessResponse, TimestampError> {
    let scanner = match status {
        ScannerStatus::Idle => ScannerStatusResponse {
            state: ScannerState::Idle,
            brew_id: None,
            started_at: None,
        },
        ScannerStatus::Tracking {
            brew_id,
            started_at,
        } => ScannerStatusResponse {
            state: ScannerState::Tracking,
            brew_id: Some(brew_id.to_string()),
            started_at: Some(format_timestamp(started_at)?),
        },
    };
    Ok(StatusSuccessResponse {
        scanner,
        last_brew: last_brew.map(map_last_brew).transpose()?,
        counters: CountersResponse {
            finalized: counters.finalized,
            discarded: counters.discarded,
            sink_failures: counters.sink_failures,
        },
        scale: ScaleResponse {
            connected: scale.connected,
            battery_level: scale.battery_level,
        },
        timestamp: format_timestamp(now)?,
    })
}

fn map_last_brew(summary: BrewSummary) -> Result<LastBrewResponse, TimestampError> {
    Ok(LastBrewResponse {
        id: summary.id.to_string(),
        shot_type: summary.shot_type,
        start: format_timestamp(summary.start)?,
        end: format_timestamp(summary.end)?,
        final_weight: summary.final_weight,
        unit: summary.unit,
        sample_count: summary.sample_count,
        beans_weight: summary.beans_weight,
        grind_setting: summary.grind_setting,
        battery_level: summary.battery_level,
    })
}

fn build_correction_response(
    sink: &dyn Sink,
    database: &str,
    brew_id: &str,
    correction: &BrewCorrection,
    now: SystemTime,
) -> ApiResponse<CorrectionSuccessResponse> {
    const ROUTE: &str = "/api/brews";
    if let Err(err) = correct_brew(sink, database, brew_id, correction) {
        return match err {
            AppError::UnknownBrew(id) => client_error(
                ROUTE,
                StatusCode::NOT_FOUND,
                ErrorCode::UnknownBrew,
                format!("No brew with id {id}"),
                now,
            ),
            AppError::InvalidCorrection(message) => client_error(
                ROUTE,
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidRequest,
                message,
                now,
            ),
            AppError::Sink(err) => sink_error(ROUTE, &err, now),
            AppError::PartialCorrection { brew_id, source } => {
                warn!(
                    route = ROUTE,
                    brew_id = %brew_id,
                    error = %source,
                    "Brew only partially corrected"
                );
                client_error(
                    ROUTE,
                    StatusCode::BAD_GATEWAY,
                    ErrorCode::PartialCorrection,
                    format!("Summary of brew {brew_id} corrected, sample series was not"),
                    now,
                )
            }
            other => {
                error!(error = %other, "Unexpected correction failure");
                internal_error(ROUTE, "unexpected correction failure")
            }
        };
    }

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success {
            status: StatusCode::OK,
            body: CorrectionSuccessResponse {
                brew_id: brew_id.to_string(),
                shot_type: correction.shot_type,
                timestamp,
            },
        },
        Err(_) => internal_error(ROUTE, "timestamp formatting failure"),
    }
}

fn build_action_response(
    sink: &dyn Sink,
    database: &str,
    request: &ActionRequest,
    now: SystemTime,
) -> ApiResponse<ActionSuccessResponse> {
    const ROUTE: &str = "/api/actions";
    let action = match request.action_type.parse::<ActionType>() {
        Ok(action) => action,
        Err(_) => {
            return client_error(
                ROUTE,
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidAction,
                format!("Unknown action type {}", request.action_type),
                now,
            );
        }
    };

    match record_action(sink, database, now, action) {
        Ok(()) => {}
        Err(AppError::Sink(err)) => return sink_error(ROUTE, &err, now),
        Err(other) => {
            error!(error = %other, "Unexpected action failure");
            return internal_error(ROUTE, "unexpected action failure");
        }
    }

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success {
            status: StatusCode::CREATED,
            body: ActionSuccessResponse {
                action_type: action.to_string(),
                action_category: action.category(),
                timestamp,
            },
        },
        Err(_) => internal_error(ROUTE, "timestamp formatting failure"),
    }
}

fn sink_error<T>(route: &str, err: &SinkError, now: SystemTime) -> ApiResponse<T> {
    warn!(route, error = %err, "Sink request failed");
    match err {
        SinkError::Unsupported(operation) => client_error(
            route,
            StatusCode::NOT_IMPLEMENTED,
            ErrorCode::Unsupported,
            format!("Configured sink does not support {operation}"),
            now,
        ),
        _ => client_error(
            route,
            StatusCode::BAD_GATEWAY,
            ErrorCode::SinkUnavailable,
            "Sink request failed".to_string(),
            now,
        ),
    }
}

fn client_error<T>(
    route: &str,
    status: StatusCode,
    error_code: ErrorCode,
    error_message: String,
    now: SystemTime,
) -> ApiResponse<T> {
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Error {
            status,
            body: ErrorResponse {
                error_code,
                error_message,
                timestamp,
            },
        },
        Err(_) => internal_error(route, "timestamp formatting failure"),
    }
}

fn internal_error<T>(route: &str, message: &str) -> ApiResponse<T> {
    error!(route, message = message, "Internal error while handling request");
    let formatted = format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    });
    ApiResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ErrorResponse {
            error_code: ErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: formatted,
        },
    }
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}
