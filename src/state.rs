use crate::brew::classifier::BrewMetadata;
use crate::brew::{BrewEvent, ShotType};
use crate::scale::WeightUnit;
use std::time::SystemTime;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerStatus {
    Idle,
    Tracking { brew_id: Uuid, started_at: SystemTime },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrewSummary {
    pub id: Uuid,
    pub start: SystemTime,
    pub end: SystemTime,
    pub shot_type: ShotType,
    pub final_weight: f64,
    pub unit: WeightUnit,
    pub sample_count: usize,
    pub beans_weight: f64,
    pub grind_setting: f64,
    pub battery_level: Option<f64>,
}

impl BrewSummary {
    /// Summarize a finalized brew; `None` if it has no end or no samples.
    pub fn from_event(
        event: &BrewEvent,
        metadata: BrewMetadata,
        battery_level: Option<f64>,
    ) -> Option<Self> {
        let last = event.final_sample()?;
        Some(Self {
            id: event.id,
            start: event.start,
            end: event.end?,
            shot_type: event.shot_type,
            final_weight: last.weight,
            unit: last.unit,
            sample_count: event.samples.len(),
            beans_weight: metadata.beans_weight,
            grind_setting: metadata.grind_setting,
            battery_level,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrewCounters {
    pub finalized: u64,
    pub discarded: u64,
    pub sink_failures: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScaleStatus {
    pub connected: bool,
    pub battery_level: Option<f64>,
}

/// Read-only view of the scanner published for the API.
///
/// Written only by the engine's run loop; nothing here feeds back into detection.
#[derive(Debug)]
pub struct AppState {
    status: ScannerStatus,
    status_tx: watch::Sender<ScannerStatus>,
    last_brew: Option<BrewSummary>,
    last_brew_tx: watch::Sender<Option<BrewSummary>>,
    counters: BrewCounters,
    scale: ScaleStatus,
}

impl AppState {
    pub fn new() -> Self {
        let (status_tx, _status_rx) = watch::channel(ScannerStatus::Idle);
        let (last_brew_tx, _last_brew_rx) = watch::channel(None);
        Self {
            status: ScannerStatus::Idle,
            status_tx,
            last_brew: None,
            last_brew_tx,
            counters: BrewCounters::default(),
            scale: ScaleStatus::default(),
        }
    }

    pub fn status(&self) -> ScannerStatus {
        self.status
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ScannerStatus> {
        self.status_tx.subscribe()
    }

    pub fn set_status(&mut self, status: ScannerStatus) {
        self.status = status;
        self.status_tx.send_replace(status);
    }

    pub fn last_brew(&self) -> Option<&BrewSummary> {
        self.last_brew.as_ref()
    }

    pub fn subscribe_last_brew(&self) -> watch::Receiver<Option<BrewSummary>> {
        self.last_brew_tx.subscribe()
    }

    pub fn set_last_brew(&mut self, summary: BrewSummary) {
        self.last_brew = Some(summary.clone());
        self.counters.finalized += 1;
        self.last_brew_tx.send_replace(Some(summary));
    }

    pub fn counters(&self) -> BrewCounters {
        self.counters
    }

    pub fn record_discard(&mut self) {
        self.counters.discarded += 1;
    }

    pub fn record_sink_failure(&mut self) {
        self.counters.sink_failures += 1;
    }

    pub fn scale(&self) -> ScaleStatus {
        self.scale
    }

    pub fn set_scale(&mut self, scale: ScaleStatus) {
        self.scale = scale;
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
