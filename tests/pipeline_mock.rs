use brew_scanner::brew::detector::{BrewOutcome, DiscardReason};
use brew_scanner::brew::{ScannerSettings, ShotType};
use brew_scanner::engine::{Engine, spawn_engine_thread};
use brew_scanner::error::AppError;
use brew_scanner::scale::mock::{MockScale, MockScaleBehavior};
use brew_scanner::scale::replay::ReplayScale;
use brew_scanner::scale::{Sample, sample_channel};
use brew_scanner::sink::memory::MemorySink;
use brew_scanner::sink::{FieldValue, Measurement};
use brew_scanner::state::{AppState, ScannerStatus};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const BASE_MS: u64 = 1_700_000_000_000;

fn at(offset_ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(BASE_MS + offset_ms)
}

fn settings() -> ScannerSettings {
    ScannerSettings {
        expected_single_shot_weight: 45.0,
        expected_double_shot_weight: 90.0,
        ..ScannerSettings::default()
    }
}

fn ramp_start() -> Vec<Sample> {
    [10.0, 12.0, 14.0, 16.0, 18.0]
        .into_iter()
        .enumerate()
        .map(|(index, weight)| Sample::grams(at(index as u64 * 200), weight))
        .collect()
}

/// Alternating flat readings every 200ms after `after_ms`.
fn plateau(after_ms: u64, high: f64, low: f64, count: u64) -> Vec<Sample> {
    (0..count)
        .map(|j| {
            let weight = if j % 2 == 0 { high } else { low };
            Sample::grams(at(after_ms + 200 * (j + 1)), weight)
        })
        .collect()
}

/// A 21.6s single shot: steady ramp to ~47.7g, then a noisy plateau.
fn single_shot() -> Vec<Sample> {
    let mut samples = ramp_start();
    samples.extend((1..=99u64).map(|i| Sample::grams(at(800 + 200 * i), 18.0 + 0.3 * i as f64)));
    samples.extend(plateau(20_600, 47.81, 47.77, 10));
    samples
}

#[test]
fn replayed_shot_is_finalized_and_persisted() -> Result<(), Box<dyn std::error::Error>> {
    let settings = settings();
    let scale = Arc::new(ReplayScale::new(single_shot(), Duration::ZERO, Some(72.0)));
    let sink = Arc::new(MemorySink::new());
    let state = Arc::new(RwLock::new(AppState::new()));
    let engine = Engine::new(&settings, scale.clone(), sink.clone(), Arc::clone(&state))?;

    let (sender, receiver) = sample_channel(settings.queue_capacity);
    let producer = scale.start(sender);
    let handle = spawn_engine_thread(engine, receiver, Arc::new(AtomicBool::new(false)));

    let result = handle.join().expect("engine thread");
    producer.join().expect("replay thread");
    assert!(matches!(result, Err(AppError::SourceDisconnected)));

    let summary = sink.points(&Measurement::new("brews", "summary"));
    assert_eq!(summary.len(), 1);
    let summary = &summary[0];
    assert_eq!(summary.timestamp, at(0));
    assert_eq!(summary.tags.get("shot_type").map(String::as_str), Some("single"));
    assert_eq!(
        summary.fields.get("start"),
        Some(&FieldValue::Integer(BASE_MS as i64))
    );
    assert_eq!(
        summary.fields.get("end"),
        Some(&FieldValue::Integer((BASE_MS + 21_600) as i64))
    );
    assert_eq!(summary.fields.get("end_weight"), Some(&FieldValue::Float(47.81)));
    assert_eq!(summary.fields.get("battery_level"), Some(&FieldValue::Float(72.0)));
    assert_eq!(summary.fields.get("beans_weight"), Some(&FieldValue::Float(8.75)));

    let brew = sink.points(&Measurement::new("brews", "brew"));
    assert_eq!(brew.len(), 5 + 99 + 5);
    assert_eq!(brew[0].timestamp, at(0));
    assert_eq!(brew[brew.len() - 1].timestamp, at(21_600));
    let brew_id = summary.tags.get("id").cloned();
    assert!(brew.iter().all(|point| point.tags.get("id") == brew_id.as_ref()));

    let guard = state.read().map_err(|_| AppError::StateLock)?;
    let last_brew = guard.last_brew().expect("last brew published");
    assert_eq!(last_brew.shot_type, ShotType::Single);
    assert_eq!(last_brew.end, at(21_600));
    assert_eq!(guard.counters().finalized, 1);
    assert_eq!(guard.counters().discarded, 0);
    assert_eq!(guard.status(), ScannerStatus::Idle);
    assert!(!guard.scale().connected);
    Ok(())
}

#[test]
fn short_pour_is_discarded_without_output() -> Result<(), Box<dyn std::error::Error>> {
    let settings = settings();
    let scale = Arc::new(MockScale::new(MockScaleBehavior::ok()));
    let sink = Arc::new(MemorySink::new());
    let state = Arc::new(RwLock::new(AppState::new()));
    let engine = Engine::new(&settings, scale.clone(), sink.clone(), Arc::clone(&state))?;

    let (sender, receiver) = sample_channel(settings.queue_capacity);
    let handle = spawn_engine_thread(engine, receiver, Arc::new(AtomicBool::new(false)));
    let mut samples = ramp_start();
    samples.extend(plateau(800, 18.05, 18.01, 6));
    for sample in samples {
        sender.send(sample)?;
    }
    drop(sender);

    let result = handle.join().expect("engine thread");
    assert!(matches!(result, Err(AppError::SourceDisconnected)));
    assert!(sink.measurements().is_empty());
    assert!(scale.buzzes().is_empty());

    let guard = state.read().map_err(|_| AppError::StateLock)?;
    assert!(guard.last_brew().is_none());
    assert_eq!(guard.counters().discarded, 1);
    Ok(())
}

/// Increasing run followed directly by ~10.5s of readings oscillating around 47.8g.
/// The plateau window fills five samples into the oscillation, long before the
/// minimum brew duration, so the pour is dropped and the rest never restarts tracking.
#[test]
fn immediate_plateau_after_ramp_is_too_short() -> Result<(), Box<dyn std::error::Error>> {
    let settings = settings();
    let scale = Arc::new(MockScale::new(MockScaleBehavior::ok()));
    let sink = Arc::new(MemorySink::new());
    let state = Arc::new(RwLock::new(AppState::new()));
    let mut engine = Engine::new(&settings, scale.clone(), sink.clone(), Arc::clone(&state))?;

    let mut samples = ramp_start();
    samples.extend((0..50u64).map(|j| {
        let weight = if j % 2 == 0 { 47.82 } else { 47.78 };
        Sample::grams(at(800 + 210 * (j + 1)), weight)
    }));

    let mut outcomes = Vec::new();
    for sample in samples {
        if let Some(outcome) = engine.ingest(sample)? {
            outcomes.push(outcome);
        }
    }

    assert_eq!(outcomes.len(), 2);
    assert!(matches!(outcomes[0], BrewOutcome::Started { start, .. } if start == at(0)));
    match &outcomes[1] {
        BrewOutcome::Discarded { event, reason } => {
            assert_eq!(*reason, DiscardReason::TooShort(Duration::from_millis(1_850)));
            assert_eq!(event.end, Some(at(1_850)));
        }
        other => panic!("expected discarded brew, got {other:?}"),
    }
    assert!(!engine.detector().is_tracking());
    assert!(sink.measurements().is_empty());
    assert!(scale.buzzes().is_empty());

    let guard = state.read().map_err(|_| AppError::StateLock)?;
    assert_eq!(guard.status(), ScannerStatus::Idle);
    assert_eq!(guard.counters().discarded, 1);
    assert_eq!(guard.counters().finalized, 0);
    Ok(())
}

#[test]
fn stop_flag_drains_queue_and_drops_in_flight_brew() -> Result<(), Box<dyn std::error::Error>> {
    let settings = settings();
    let scale = Arc::new(MockScale::new(MockScaleBehavior::ok()));
    let sink = Arc::new(MemorySink::new());
    let state = Arc::new(RwLock::new(AppState::new()));
    let engine = Engine::new(&settings, scale.clone(), sink.clone(), Arc::clone(&state))?;

    let (sender, receiver) = sample_channel(settings.queue_capacity);
    for sample in ramp_start() {
        sender.send(sample)?;
    }
    let stop = Arc::new(AtomicBool::new(true));
    let handle = spawn_engine_thread(engine, receiver, stop);

    let result = handle.join().expect("engine thread");
    assert!(result.is_ok());
    assert!(sink.measurements().is_empty());

    let guard = state.read().map_err(|_| AppError::StateLock)?;
    assert_eq!(guard.counters().discarded, 1);
    assert_eq!(guard.status(), ScannerStatus::Idle);
    drop(sender);
    Ok(())
}
