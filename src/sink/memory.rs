use crate::sink::{DataPoint, Fields, Measurement, Sink, SinkError, Tag};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// In-process sink. Keeps every emitted batch, grouped by measurement.
#[derive(Debug, Default)]
pub struct MemorySink {
    series: Mutex<BTreeMap<Measurement, Vec<DataPoint>>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent emissions fail with `SinkError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn points(&self, measurement: &Measurement) -> Vec<DataPoint> {
        self.series
            .lock()
            .ok()
            .and_then(|guard| guard.get(measurement).cloned())
            .unwrap_or_default()
    }

    pub fn measurements(&self) -> Vec<Measurement> {
        self.series
            .lock()
            .map(|guard| guard.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), SinkError> {
        if self.failing.load(Ordering::Relaxed) {
            Err(SinkError::Unavailable("memory sink set to fail".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Sink for MemorySink {
    fn emit_data_points(
        &self,
        measurement: &Measurement,
        points: &[DataPoint],
    ) -> Result<(), SinkError> {
        self.check_available()?;
        let mut guard = self
            .series
            .lock()
            .map_err(|_| SinkError::Unavailable("memory sink lock poisoned".to_string()))?;
        guard
            .entry(measurement.clone())
            .or_default()
            .extend_from_slice(points);
        Ok(())
    }

    fn modify_measurement(
        &self,
        measurement: &Measurement,
        selector: &Tag,
        replacement: &Tag,
        extra_fields: &Fields,
    ) -> Result<(), SinkError> {
        self.check_available()?;
        let mut guard = self
            .series
            .lock()
            .map_err(|_| SinkError::Unavailable("memory sink lock poisoned".to_string()))?;
        let not_found = || SinkError::NotFound(format!("{measurement} {}={}", selector.name, selector.value));
        let points = guard.get_mut(measurement).ok_or_else(not_found)?;

        let mut matched = 0usize;
        for point in points
            .iter_mut()
            .filter(|point| point.tags.get(&selector.name) == Some(&selector.value))
        {
            point
                .tags
                .insert(replacement.name.clone(), replacement.value.clone());
            for (name, value) in extra_fields {
                point.fields.insert(name.clone(), value.clone());
            }
            matched += 1;
        }

        if matched == 0 {
            return Err(not_found());
        }
        Ok(())
    }
}
