use std::sync::Mutex;

use chrono::Utc;
use shared::domain::EpochSeconds;

/// Source of "now" in the controller's epoch-seconds domain.
pub trait Clock: Send + Sync {
    fn now(&self) -> EpochSeconds;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> EpochSeconds {
        Utc::now().timestamp_millis() as f64 / 1000.0
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<EpochSeconds>,
}

impl ManualClock {
    pub fn new(start: EpochSeconds) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, seconds: f64) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += seconds;
    }

    pub fn set(&self, at: EpochSeconds) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> EpochSeconds {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
