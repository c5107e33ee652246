use crate::brew::classifier::BrewMetadata;
use crate::brew::detector::{BrewDetector, BrewOutcome};
use crate::brew::{BrewEvent, ScannerSettings};
use crate::buffer::HistoryBuffer;
use crate::error::AppError;
use crate::scale::{Sample, Scale};
use crate::sink::{
    BREW_MEASUREMENT, DEFAULT_DATABASE, DataPoint, FieldValue, Fields, Measurement,
    SUMMARY_MEASUREMENT, Sink, Tags,
};
use crate::state::{AppState, BrewSummary, ScaleStatus, ScannerStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// How long the run loop waits for a sample before re-checking the stop flag.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

/// One monitoring session: history, segmentation state and downstream wiring.
///
/// The engine exclusively owns its history and in-flight brew; the shared
/// [`AppState`] only receives snapshots.
pub struct Engine {
    history: HistoryBuffer<Sample>,
    detector: BrewDetector,
    queue_capacity: usize,
    scale: Arc<dyn Scale>,
    sink: Arc<dyn Sink>,
    database: String,
    state: Arc<RwLock<AppState>>,
}

impl Engine {
    pub fn new(
        settings: &ScannerSettings,
        scale: Arc<dyn Scale>,
        sink: Arc<dyn Sink>,
        state: Arc<RwLock<AppState>>,
    ) -> Result<Self, AppError> {
        settings.validate()?;
        Ok(Self {
            history: HistoryBuffer::new(settings.history_capacity)?,
            detector: BrewDetector::new(settings),
            queue_capacity: settings.queue_capacity,
            scale,
            sink,
            database: DEFAULT_DATABASE.to_string(),
            state,
        })
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn detector(&self) -> &BrewDetector {
        &self.detector
    }

    pub fn history(&self) -> &HistoryBuffer<Sample> {
        &self.history
    }

    /// Process one sample synchronously.
    pub fn ingest(&mut self, sample: Sample) -> Result<Option<BrewOutcome>, AppError> {
        self.history.append(sample.clone());
        let window = self.history.window(self.detector.window_size())?;
        let outcome = self.detector.evaluate(&sample, window.as_deref());

        match &outcome {
            Some(BrewOutcome::Started { id, start }) => {
                let status = ScannerStatus::Tracking {
                    brew_id: *id,
                    started_at: *start,
                };
                self.publish(|state| state.set_status(status));
            }
            Some(BrewOutcome::Finalized(event)) => self.finalize(event),
            Some(BrewOutcome::Discarded { .. }) => {
                self.publish(|state| {
                    state.record_discard();
                    state.set_status(ScannerStatus::Idle);
                });
            }
            None => {}
        }

        Ok(outcome)
    }

    /// Consume samples until the source disconnects or `stop` is raised.
    ///
    /// On stop, samples already queued are still processed; a brew that is
    /// still being tracked afterwards is dropped.
    pub fn run(&mut self, samples: &Receiver<Sample>, stop: &AtomicBool) -> Result<(), AppError> {
        let battery_level = self.scale.battery_level();
        self.publish(|state| {
            state.set_scale(ScaleStatus {
                connected: true,
                battery_level,
            })
        });
        info!(
            window_size = self.detector.window_size(),
            history_capacity = self.history.capacity(),
            "Brew scanner running"
        );

        loop {
            if stop.load(Ordering::Relaxed) {
                return self.shutdown(samples);
            }

            match samples.recv_timeout(RECEIVE_TIMEOUT) {
                Ok(sample) => {
                    self.ingest(sample)?;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.discard_in_flight();
                    self.publish(|state| {
                        state.set_scale(ScaleStatus {
                            connected: false,
                            battery_level: None,
                        })
                    });
                    error!("Scale source disconnected, stopping scanner");
                    return Err(AppError::SourceDisconnected);
                }
            }
        }
    }

    fn shutdown(&mut self, samples: &Receiver<Sample>) -> Result<(), AppError> {
        let mut drained = 0usize;
        for sample in samples.try_iter().take(self.queue_capacity) {
            self.ingest(sample)?;
            drained += 1;
        }
        self.discard_in_flight();
        info!(drained, "Brew scanner stopped");
        Ok(())
    }

    fn discard_in_flight(&mut self) {
        if let Some(BrewOutcome::Discarded { event, .. }) = self.detector.abandon() {
            info!(
                brew_id = %event.id,
                samples = event.samples.len(),
                "Discarding in-flight brew"
            );
            self.publish(|state| {
                state.record_discard();
                state.set_status(ScannerStatus::Idle);
            });
        }
    }

    fn finalize(&self, event: &BrewEvent) {
        let metadata = self.detector.classifier().metadata(event.shot_type);
        let battery_level = self.scale.battery_level();

        let mut sink_failed = false;
        match summary_point(event, metadata, battery_level) {
            Some(point) => {
                sink_failed |= !self.emit(SUMMARY_MEASUREMENT, &[point]);
            }
            None => warn!(brew_id = %event.id, "Finalized brew has no summary"),
        }
        sink_failed |= !self.emit(BREW_MEASUREMENT, &sample_points(event));

        if let Err(err) = self.scale.buzz(event.shot_type.pulse_count()) {
            warn!(brew_id = %event.id, error = %err, "Failed to signal shot type on scale");
        }

        let summary = BrewSummary::from_event(event, metadata, battery_level);
        self.publish(|state| {
            if let Some(summary) = summary {
                state.set_last_brew(summary);
            }
            if sink_failed {
                state.record_sink_failure();
            }
            state.set_status(ScannerStatus::Idle);
            state.set_scale(ScaleStatus {
                connected: true,
                battery_level,
            });
        });
    }

    /// Emit one batch; failures are logged and reported, never retried here.
    fn emit(&self, measurement: &str, points: &[DataPoint]) -> bool {
        let measurement = Measurement::new(self.database.as_str(), measurement);
        match self.sink.emit_data_points(&measurement, points) {
            Ok(()) => {
                debug!(measurement = %measurement, points = points.len(), "Emitted brew data");
                true
            }
            Err(err) => {
                warn!(measurement = %measurement, error = %err, "Failed to emit brew data");
                false
            }
        }
    }

    fn publish(&self, update: impl FnOnce(&mut AppState)) {
        match self.state.write() {
            Ok(mut guard) => update(&mut guard),
            Err(_) => warn!("State lock poisoned while publishing scanner state"),
        }
    }
}

/// Run the engine on a dedicated thread until the source disconnects or `stop` is raised.
pub fn spawn_engine_thread(
    mut engine: Engine,
    samples: Receiver<Sample>,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<Result<(), AppError>> {
    std::thread::spawn(move || engine.run(&samples, &stop))
}

fn brew_tags(event: &BrewEvent) -> Tags {
    [
        ("id".to_string(), event.id.to_string()),
        ("shot_type".to_string(), event.shot_type.to_string()),
    ]
    .into_iter()
    .collect()
}

fn summary_point(
    event: &BrewEvent,
    metadata: BrewMetadata,
    battery_level: Option<f64>,
) -> Option<DataPoint> {
    let last = event.final_sample()?;
    let end = event.end?;

    let mut fields = Fields::new();
    fields.insert("start".to_string(), FieldValue::Integer(epoch_millis(event.start)));
    fields.insert("end".to_string(), FieldValue::Integer(epoch_millis(end)));
    fields.insert("end_weight".to_string(), FieldValue::Float(last.weight));
    fields.insert("unit".to_string(), FieldValue::Text(last.unit.to_string()));
    fields.insert("beans_weight".to_string(), FieldValue::Float(metadata.beans_weight));
    fields.insert("grind_setting".to_string(), FieldValue::Float(metadata.grind_setting));
    if let Some(battery_level) = battery_level {
        fields.insert("battery_level".to_string(), FieldValue::Float(battery_level));
    }

    Some(DataPoint {
        timestamp: event.start,
        tags: brew_tags(event),
        fields,
    })
}

fn sample_points(event: &BrewEvent) -> Vec<DataPoint> {
    let tags = brew_tags(event);
    event
        .samples
        .iter()
        .map(|sample| DataPoint {
            timestamp: sample.timestamp,
            tags: tags.clone(),
            fields: [
                ("unit".to_string(), FieldValue::Text(sample.unit.to_string())),
                ("weight".to_string(), FieldValue::Float(sample.weight)),
            ]
            .into_iter()
            .collect(),
        })
        .collect()
}

fn epoch_millis(timestamp: SystemTime) -> i64 {
    timestamp
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brew::ShotType;
    use crate::scale::mock::{MockScale, MockScaleBehavior};
    use crate::scale::sample_channel;
    use crate::sink::memory::MemorySink;

    struct Fixture {
        engine: Engine,
        scale: Arc<MockScale>,
        sink: Arc<MemorySink>,
        state: Arc<RwLock<AppState>>,
    }

    fn fixture(behavior: MockScaleBehavior) -> Result<Fixture, AppError> {
        let settings = ScannerSettings {
            expected_single_shot_weight: 45.0,
            expected_double_shot_weight: 90.0,
            ..ScannerSettings::default()
        };
        let scale = Arc::new(MockScale::new(behavior));
        let sink = Arc::new(MemorySink::new());
        let state = Arc::new(RwLock::new(AppState::new()));
        let engine = Engine::new(&settings, scale.clone(), sink.clone(), Arc::clone(&state))?;
        Ok(Fixture {
            engine,
            scale,
            sink,
            state,
        })
    }

    fn at(offset_ms: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(1_700_000_000_000 + offset_ms)
    }

    /// Ramp, a plateau starting at `plateau_ms`, then confirmation four samples later.
    fn shot(final_weight: f64, plateau_ms: u64) -> Vec<Sample> {
        let mut samples: Vec<Sample> = [10.0, 12.0, 14.0, 16.0, 18.0]
            .into_iter()
            .enumerate()
            .map(|(index, weight)| Sample::grams(at(index as u64 * 200), weight))
            .collect();
        for step in 0..5u64 {
            samples.push(Sample::grams(at(plateau_ms + step * 100), final_weight));
        }
        samples
    }

    #[test]
    fn finalized_brew_is_emitted_and_signalled() -> Result<(), AppError> {
        let mut fixture = fixture(MockScaleBehavior::ok())?;

        let mut finalized = Vec::new();
        for sample in shot(47.81, 20_000) {
            if let Some(BrewOutcome::Finalized(event)) = fixture.engine.ingest(sample)? {
                finalized.push(event);
            }
        }

        assert_eq!(finalized.len(), 1);
        let brew = &finalized[0];
        assert_eq!(brew.shot_type, ShotType::Single);
        assert_eq!(fixture.scale.buzzes(), vec![1]);

        let summary = fixture.sink.points(&Measurement::new("brews", "summary"));
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].timestamp, at(0));
        assert_eq!(
            summary[0].fields.get("end_weight"),
            Some(&FieldValue::Float(47.81))
        );
        assert_eq!(
            summary[0].fields.get("beans_weight"),
            Some(&FieldValue::Float(8.75))
        );
        assert_eq!(
            summary[0].fields.get("battery_level"),
            Some(&FieldValue::Float(87.0))
        );
        assert_eq!(
            summary[0].tags.get("shot_type").map(String::as_str),
            Some("single")
        );

        let points = fixture.sink.points(&Measurement::new("brews", "brew"));
        assert_eq!(points.len(), brew.samples.len());
        assert!(points.iter().all(|p| p.tags.get("id") == Some(&brew.id.to_string())));

        let guard = fixture.state.read().map_err(|_| AppError::StateLock)?;
        assert_eq!(guard.status(), ScannerStatus::Idle);
        assert_eq!(guard.counters().finalized, 1);
        assert_eq!(guard.last_brew().map(|b| b.id), Some(brew.id));
        Ok(())
    }

    #[test]
    fn short_brew_is_not_emitted() -> Result<(), AppError> {
        let mut fixture = fixture(MockScaleBehavior::ok())?;

        for sample in shot(47.81, 1_000) {
            fixture.engine.ingest(sample)?;
        }

        assert!(fixture.sink.measurements().is_empty());
        assert!(fixture.scale.buzzes().is_empty());
        assert!(!fixture.engine.detector().is_tracking());
        let guard = fixture.state.read().map_err(|_| AppError::StateLock)?;
        assert_eq!(guard.counters().discarded, 1);
        Ok(())
    }

    #[test]
    fn sink_failure_does_not_stop_ingestion() -> Result<(), AppError> {
        let mut fixture = fixture(MockScaleBehavior::fail_buzz())?;
        fixture.sink.set_failing(true);

        for sample in shot(86.72, 25_000) {
            fixture.engine.ingest(sample)?;
        }
        fixture.sink.set_failing(false);
        let second: Vec<Sample> = shot(47.81, 25_000)
            .into_iter()
            .map(|mut sample| {
                sample.timestamp += Duration::from_secs(120);
                sample
            })
            .collect();
        for sample in second {
            fixture.engine.ingest(sample)?;
        }

        let summary = fixture.sink.points(&Measurement::new("brews", "summary"));
        assert_eq!(summary.len(), 1);
        let guard = fixture.state.read().map_err(|_| AppError::StateLock)?;
        assert_eq!(guard.counters().finalized, 2);
        assert_eq!(guard.counters().sink_failures, 1);
        Ok(())
    }

    #[test]
    fn invalid_settings_fail_construction() {
        let settings = ScannerSettings {
            history_capacity: 0,
            ..ScannerSettings::default()
        };

        let result = Engine::new(
            &settings,
            Arc::new(MockScale::default()),
            Arc::new(MemorySink::new()),
            Arc::new(RwLock::new(AppState::new())),
        );

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn disconnected_source_ends_run_with_error() -> Result<(), AppError> {
        let mut fixture = fixture(MockScaleBehavior::ok())?;
        let (sender, receiver) = sample_channel(8);
        for sample in shot(47.81, 20_000).into_iter().take(6) {
            sender
                .send(sample)
                .map_err(|_| AppError::Scale("send failed".to_string()))?;
        }
        drop(sender);

        let result = fixture.engine.run(&receiver, &AtomicBool::new(false));

        assert!(matches!(result, Err(AppError::SourceDisconnected)));
        assert!(!fixture.engine.detector().is_tracking());
        assert!(fixture.sink.measurements().is_empty());
        let guard = fixture.state.read().map_err(|_| AppError::StateLock)?;
        assert!(!guard.scale().connected);
        Ok(())
    }

    #[test]
    fn stop_drains_queue_and_discards_in_flight_brew() -> Result<(), AppError> {
        let mut fixture = fixture(MockScaleBehavior::ok())?;
        let (sender, receiver) = sample_channel(16);
        for sample in shot(47.81, 20_000).into_iter().take(7) {
            sender
                .send(sample)
                .map_err(|_| AppError::Scale("send failed".to_string()))?;
        }

        let result = fixture.engine.run(&receiver, &AtomicBool::new(true));

        assert!(result.is_ok());
        assert_eq!(fixture.engine.history().len(), 7);
        assert!(!fixture.engine.detector().is_tracking());
        assert!(fixture.sink.measurements().is_empty());
        let guard = fixture.state.read().map_err(|_| AppError::StateLock)?;
        assert_eq!(guard.counters().discarded, 1);
        assert_eq!(guard.status(), ScannerStatus::Idle);
        Ok(())
    }
}
