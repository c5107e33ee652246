use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::time::SystemTime;

pub mod mock;
pub mod replay;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightUnit {
    #[serde(rename = "g")]
    Grams,
    #[serde(rename = "oz")]
    Ounces,
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightUnit::Grams => write!(f, "g"),
            WeightUnit::Ounces => write!(f, "oz"),
        }
    }
}

/// A single weight measurement as reported by the scale.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: SystemTime,
    pub weight: f64,
    pub unit: WeightUnit,
    /// Device battery level at the time of the measurement, passed through untouched.
    pub battery_level: Option<f64>,
}

impl Sample {
    pub fn grams(timestamp: SystemTime, weight: f64) -> Self {
        Self {
            timestamp,
            weight,
            unit: WeightUnit::Grams,
            battery_level: None,
        }
    }
}

/// Device-side capabilities of a connected scale.
///
/// Samples themselves are delivered over the bounded channel returned by
/// [`sample_channel`]; a dropped sender means the device is gone.
pub trait Scale: Send + Sync {
    fn battery_level(&self) -> Option<f64>;
    /// Best-effort haptic feedback, `count` pulses.
    fn buzz(&self, count: u8) -> Result<(), AppError>;
    fn disconnect(&self) -> Result<(), AppError>;
}

/// Bounded sample queue. A full queue blocks the producer instead of dropping samples.
pub fn sample_channel(capacity: usize) -> (SyncSender<Sample>, Receiver<Sample>) {
    sync_channel(capacity)
}
