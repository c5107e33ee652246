//! Segmentation state machine.
//!
//! Idle until a full window of strictly increasing weights is seen, then
//! Tracking until a window of flat (or falling) weights confirms the plateau.
//! A confirmed plateau either finalizes the brew or discards it when the pour
//! duration is out of bounds. Both paths return to Idle.

use crate::brew::classifier::ShotClassifier;
use crate::brew::{BrewEvent, ScannerSettings};
use crate::scale::Sample;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    TooShort(Duration),
    TooLong(Duration),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BrewOutcome {
    Started { id: Uuid, start: SystemTime },
    Finalized(BrewEvent),
    Discarded { event: BrewEvent, reason: DiscardReason },
}

#[derive(Debug, Clone, PartialEq)]
enum ScannerState {
    Idle,
    Tracking(BrewEvent),
}

#[derive(Debug, Clone)]
pub struct BrewDetector {
    window_size: usize,
    increase_threshold: f64,
    plateau_threshold: f64,
    min_brew_duration: Duration,
    max_brew_duration: Duration,
    classifier: ShotClassifier,
    state: ScannerState,
}

impl BrewDetector {
    pub fn new(settings: &ScannerSettings) -> Self {
        Self {
            window_size: settings.window_size,
            increase_threshold: settings.increase_threshold,
            plateau_threshold: settings.plateau_threshold,
            min_brew_duration: settings.min_brew_duration,
            max_brew_duration: settings.max_brew_duration,
            classifier: ShotClassifier::new(settings),
            state: ScannerState::Idle,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn classifier(&self) -> &ShotClassifier {
        &self.classifier
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, ScannerState::Tracking(_))
    }

    pub fn current(&self) -> Option<&BrewEvent> {
        match &self.state {
            ScannerState::Tracking(brew) => Some(brew),
            ScannerState::Idle => None,
        }
    }

    /// Advance the state machine with the sample that was just recorded.
    ///
    /// `window` holds the trailing `window_size` samples oldest first, ending
    /// with `newest`; `None` means the history is not yet deep enough and no
    /// transition is evaluated.
    pub fn evaluate(&mut self, newest: &Sample, window: Option<&[Sample]>) -> Option<BrewOutcome> {
        let window = window.filter(|window| window.len() == self.window_size);

        match &mut self.state {
            ScannerState::Idle => {
                let window = window?;
                if !self.is_increasing(window) {
                    return None;
                }
                let brew = BrewEvent::begin(window.to_vec())?;
                info!(
                    brew_id = %brew.id,
                    weight = newest.weight,
                    "Started tracking brew"
                );
                let outcome = BrewOutcome::Started {
                    id: brew.id,
                    start: brew.start,
                };
                self.state = ScannerState::Tracking(brew);
                Some(outcome)
            }
            ScannerState::Tracking(brew) => {
                brew.samples.push(newest.clone());
                let window = window?;
                if !is_plateau(window, self.plateau_threshold) {
                    return None;
                }
                match std::mem::replace(&mut self.state, ScannerState::Idle) {
                    ScannerState::Tracking(event) => Some(self.complete(event, newest)),
                    ScannerState::Idle => None,
                }
            }
        }
    }

    /// Drop an in-flight brew without reporting it downstream.
    pub fn abandon(&mut self) -> Option<BrewOutcome> {
        match std::mem::replace(&mut self.state, ScannerState::Idle) {
            ScannerState::Tracking(event) => {
                debug!(brew_id = %event.id, "Abandoning in-flight brew");
                Some(BrewOutcome::Discarded {
                    event,
                    reason: DiscardReason::Shutdown,
                })
            }
            ScannerState::Idle => None,
        }
    }

    fn is_increasing(&self, window: &[Sample]) -> bool {
        window
            .windows(2)
            .all(|pair| pair[1].weight - pair[0].weight > self.increase_threshold)
    }

    fn complete(&self, mut event: BrewEvent, newest: &Sample) -> BrewOutcome {
        event.end = Some(newest.timestamp);
        let elapsed = event.elapsed().unwrap_or(Duration::ZERO);

        if elapsed < self.min_brew_duration {
            warn!(
                brew_id = %event.id,
                elapsed_ms = elapsed.as_millis(),
                "Brew time too short, ignoring data points"
            );
            return BrewOutcome::Discarded {
                event,
                reason: DiscardReason::TooShort(elapsed),
            };
        }
        if elapsed > self.max_brew_duration {
            warn!(
                brew_id = %event.id,
                elapsed_ms = elapsed.as_millis(),
                "Brew time too long, ignoring data points"
            );
            return BrewOutcome::Discarded {
                event,
                reason: DiscardReason::TooLong(elapsed),
            };
        }

        event.shot_type = self.classifier.classify(newest.weight);
        info!(
            brew_id = %event.id,
            shot_type = %event.shot_type,
            elapsed_ms = elapsed.as_millis(),
            final_weight = newest.weight,
            samples = event.samples.len(),
            "Finished tracking brew"
        );
        BrewOutcome::Finalized(event)
    }
}

fn is_plateau(window: &[Sample], threshold: f64) -> bool {
    window
        .windows(2)
        .all(|pair| pair[1].weight - pair[0].weight < threshold)
}
