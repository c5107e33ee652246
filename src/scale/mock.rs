use crate::error::AppError;
use crate::scale::Scale;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy)]
pub struct MockScaleBehavior {
    pub battery_level: Option<f64>,
    pub buzz_ok: bool,
    pub disconnect_ok: bool,
}

impl MockScaleBehavior {
    pub fn ok() -> Self {
        Self {
            battery_level: Some(87.0),
            buzz_ok: true,
            disconnect_ok: true,
        }
    }

    pub fn fail_buzz() -> Self {
        Self {
            buzz_ok: false,
            ..Self::ok()
        }
    }

    pub fn without_battery() -> Self {
        Self {
            battery_level: None,
            ..Self::ok()
        }
    }
}

#[derive(Debug)]
pub struct MockScale {
    behavior: MockScaleBehavior,
    buzzes: Mutex<Vec<u8>>,
    disconnected: AtomicBool,
}

impl MockScale {
    pub fn new(behavior: MockScaleBehavior) -> Self {
        Self {
            behavior,
            buzzes: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
        }
    }

    /// Feedback pulses requested so far, one entry per `buzz` call.
    pub fn buzzes(&self) -> Vec<u8> {
        self.buzzes
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Relaxed)
    }
}

impl Default for MockScale {
    fn default() -> Self {
        Self::new(MockScaleBehavior::ok())
    }
}

impl Scale for MockScale {
    fn battery_level(&self) -> Option<f64> {
        self.behavior.battery_level
    }

    fn buzz(&self, count: u8) -> Result<(), AppError> {
        if !self.behavior.buzz_ok {
            return Err(AppError::Scale("mock buzz failed".to_string()));
        }
        self.buzzes
            .lock()
            .map_err(|_| AppError::Scale("mock buzz log poisoned".to_string()))?
            .push(count);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), AppError> {
        if self.behavior.disconnect_ok {
            self.disconnected.store(true, Ordering::Relaxed);
            Ok(())
        } else {
            Err(AppError::Scale("mock disconnect failed".to_string()))
        }
    }
}
