use crate::action::ActionCategory;
use crate::brew::ShotType;
use crate::scale::WeightUnit;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Ko,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ScannerState {
    Idle,
    Tracking,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ScannerStatusResponse {
    pub state: ScannerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brew_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct LastBrewResponse {
    pub id: String,
    pub shot_type: ShotType,
    pub start: String,
    pub end: String,
    pub final_weight: f64,
    pub unit: WeightUnit,
    pub sample_count: usize,
    pub beans_weight: f64,
    pub grind_setting: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CountersResponse {
    pub finalized: u64,
    pub discarded: u64,
    pub sink_failures: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ScaleResponse {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct StatusSuccessResponse {
    pub scanner: ScannerStatusResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_brew: Option<LastBrewResponse>,
    pub counters: CountersResponse,
    pub scale: ScaleResponse,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CorrectionSuccessResponse {
    pub brew_id: String,
    pub shot_type: ShotType,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ActionSuccessResponse {
    pub action_type: String,
    pub action_category: ActionCategory,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnknownBrew,
    InvalidRequest,
    InvalidAction,
    Unsupported,
    SinkUnavailable,
    PartialCorrection,
    InternalError,
}
