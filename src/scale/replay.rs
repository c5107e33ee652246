//! Scale stand-in that replays a recorded weight trace.
//!
//! Recordings are JSON arrays of `{"timestamp_ms", "weight", "unit"}` objects,
//! the same shape the scale reports live. Samples keep their recorded
//! timestamps; the replay interval only paces delivery.

use crate::error::AppError;
use crate::scale::{Sample, Scale, WeightUnit};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::time::{Duration, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Deserialize)]
pub struct RecordedSample {
    pub timestamp_ms: u64,
    pub weight: f64,
    #[serde(default = "default_unit")]
    pub unit: WeightUnit,
    #[serde(default)]
    pub battery_level: Option<f64>,
}

fn default_unit() -> WeightUnit {
    WeightUnit::Grams
}

impl From<RecordedSample> for Sample {
    fn from(recorded: RecordedSample) -> Self {
        Sample {
            timestamp: UNIX_EPOCH + Duration::from_millis(recorded.timestamp_ms),
            weight: recorded.weight,
            unit: recorded.unit,
            battery_level: recorded.battery_level,
        }
    }
}

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("failed to read recording: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse recording: {0}")]
    Parse(#[from] serde_json::Error),
}

pub fn load_recording(path: impl AsRef<Path>) -> Result<Vec<Sample>, RecordingError> {
    let contents = std::fs::read_to_string(path)?;
    parse_recording(&contents)
}

pub fn parse_recording(contents: &str) -> Result<Vec<Sample>, RecordingError> {
    let recorded: Vec<RecordedSample> = serde_json::from_str(contents)?;
    Ok(recorded.into_iter().map(Sample::from).collect())
}

#[derive(Debug)]
pub struct ReplayScale {
    samples: Vec<Sample>,
    interval: Duration,
    battery_level: Option<f64>,
    stop: Arc<AtomicBool>,
}

impl ReplayScale {
    pub fn new(samples: Vec<Sample>, interval: Duration, battery_level: Option<f64>) -> Self {
        Self {
            samples,
            interval,
            battery_level,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Feed the recording into `sender` from a producer thread.
    ///
    /// The sender is dropped once the recording is exhausted or the scale is
    /// disconnected, which the engine observes as a lost source.
    pub fn start(&self, sender: SyncSender<Sample>) -> std::thread::JoinHandle<()> {
        let samples = self.samples.clone();
        let interval = self.interval;
        let stop = Arc::clone(&self.stop);
        std::thread::spawn(move || {
            info!(count = samples.len(), "Replaying recorded samples");
            for sample in samples {
                if stop.load(Ordering::Relaxed) {
                    debug!("Replay stopped by disconnect");
                    break;
                }
                if sender.send(sample).is_err() {
                    debug!("Replay receiver dropped");
                    break;
                }
                if !interval.is_zero() {
                    std::thread::sleep(interval);
                }
            }
        })
    }
}

impl Scale for ReplayScale {
    fn battery_level(&self) -> Option<f64> {
        self.battery_level
    }

    fn buzz(&self, count: u8) -> Result<(), AppError> {
        info!(count, "Replay scale feedback");
        Ok(())
    }

    fn disconnect(&self) -> Result<(), AppError> {
        self.stop.store(true, Ordering::Relaxed);
        Ok(())
    }
}
