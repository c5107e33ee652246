use crate::buffer::DEFAULT_HISTORY_CAPACITY;
use crate::config::ConfigError;
use crate::scale::{DEFAULT_QUEUE_CAPACITY, Sample};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use uuid::Uuid;

pub mod classifier;
pub mod detector;

pub const DEFAULT_EXPECTED_SINGLE_SHOT_WEIGHT: f64 = 30.0;
pub const DEFAULT_EXPECTED_DOUBLE_SHOT_WEIGHT: f64 = 65.0;
pub const DEFAULT_SINGLE_SHOT_BEANS_WEIGHT: f64 = 8.75;
pub const DEFAULT_DOUBLE_SHOT_BEANS_WEIGHT: f64 = 16.0;
/// Relative grinder setting, 0.0 finest to 1.0 coarsest.
pub const DEFAULT_GRIND_SETTING: f64 = 0.208695652;
pub const DEFAULT_MIN_BREW_DURATION: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_BREW_DURATION: Duration = Duration::from_secs(60);
pub const DEFAULT_INCREASE_THRESHOLD: f64 = 0.0;
pub const DEFAULT_PLATEAU_THRESHOLD: f64 = 0.1;
pub const DEFAULT_WINDOW_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShotType {
    #[serde(rename = "unknown")]
    Unspecified,
    Single,
    Double,
}

impl ShotType {
    /// Number of feedback pulses used to announce this shot type.
    pub fn pulse_count(self) -> u8 {
        match self {
            ShotType::Single => 1,
            ShotType::Double => 2,
            ShotType::Unspecified => 0,
        }
    }
}

impl fmt::Display for ShotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShotType::Single => write!(f, "single"),
            ShotType::Double => write!(f, "double"),
            ShotType::Unspecified => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid shot type: {0}")]
pub struct ParseShotTypeError(pub String);

impl FromStr for ShotType {
    type Err = ParseShotTypeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(ShotType::Single),
            "double" => Ok(ShotType::Double),
            "unknown" => Ok(ShotType::Unspecified),
            _ => Err(ParseShotTypeError(value.to_string())),
        }
    }
}

/// A detected shot pull and the weight trajectory recorded while it was tracked.
#[derive(Debug, Clone, PartialEq)]
pub struct BrewEvent {
    pub id: Uuid,
    pub start: SystemTime,
    pub end: Option<SystemTime>,
    pub shot_type: ShotType,
    /// Samples from start to end, oldest first.
    pub samples: Vec<Sample>,
}

impl BrewEvent {
    /// Open a brew from the window that confirmed the increasing run.
    pub fn begin(window: Vec<Sample>) -> Option<Self> {
        let start = window.first()?.timestamp;
        Some(Self {
            id: Uuid::new_v4(),
            start,
            end: None,
            shot_type: ShotType::Unspecified,
            samples: window,
        })
    }

    /// Time between start and end; zero if the clock went backwards.
    pub fn elapsed(&self) -> Option<Duration> {
        let end = self.end?;
        Some(end.duration_since(self.start).unwrap_or(Duration::ZERO))
    }

    pub fn final_sample(&self) -> Option<&Sample> {
        self.samples.last()
    }
}

/// Tuning for segmentation and classification. Fixed once the engine is built.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannerSettings {
    pub expected_single_shot_weight: f64,
    pub expected_double_shot_weight: f64,
    pub single_shot_beans_weight: f64,
    pub double_shot_beans_weight: f64,
    pub grind_setting: f64,
    pub min_brew_duration: Duration,
    pub max_brew_duration: Duration,
    pub increase_threshold: f64,
    pub plateau_threshold: f64,
    pub window_size: usize,
    pub history_capacity: usize,
    pub queue_capacity: usize,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            expected_single_shot_weight: DEFAULT_EXPECTED_SINGLE_SHOT_WEIGHT,
            expected_double_shot_weight: DEFAULT_EXPECTED_DOUBLE_SHOT_WEIGHT,
            single_shot_beans_weight: DEFAULT_SINGLE_SHOT_BEANS_WEIGHT,
            double_shot_beans_weight: DEFAULT_DOUBLE_SHOT_BEANS_WEIGHT,
            grind_setting: DEFAULT_GRIND_SETTING,
            min_brew_duration: DEFAULT_MIN_BREW_DURATION,
            max_brew_duration: DEFAULT_MAX_BREW_DURATION,
            increase_threshold: DEFAULT_INCREASE_THRESHOLD,
            plateau_threshold: DEFAULT_PLATEAU_THRESHOLD,
            window_size: DEFAULT_WINDOW_SIZE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ScannerSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(invalid("history_capacity must be positive"));
        }
        if self.window_size < 2 {
            return Err(invalid("window_size must be at least 2"));
        }
        if self.window_size > self.history_capacity {
            return Err(invalid(format!(
                "window_size {} exceeds history_capacity {}",
                self.window_size, self.history_capacity
            )));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity must be positive"));
        }
        if !(self.increase_threshold >= 0.0 && self.increase_threshold.is_finite()) {
            return Err(invalid("increase_threshold must be a non-negative number"));
        }
        if !(self.plateau_threshold > 0.0 && self.plateau_threshold.is_finite()) {
            return Err(invalid("plateau_threshold must be positive"));
        }
        if !(self.expected_single_shot_weight > 0.0 && self.expected_double_shot_weight > 0.0) {
            return Err(invalid("expected shot weights must be positive"));
        }
        if self.min_brew_duration > self.max_brew_duration {
            return Err(invalid("min_brew_duration exceeds max_brew_duration"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
