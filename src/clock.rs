use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::model::Ms;

/// Source of "now". The engine never reads the system time directly so that
/// completion and past-date rules can be driven deterministically in tests.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Ms;

    /// Wall-clock time in the service's single, timezone-agnostic frame.
    fn now(&self) -> NaiveDateTime {
        DateTime::from_timestamp_millis(self.now_ms())
            .map(|dt| dt.naive_utc())
            .unwrap_or_default()
    }

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Ms {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as Ms)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    ms: AtomicI64,
}

impl ManualClock {
    pub fn new(ms: Ms) -> Self {
        Self {
            ms: AtomicI64::new(ms),
        }
    }

    pub fn at(dt: NaiveDateTime) -> Self {
        Self::new(dt.and_utc().timestamp_millis())
    }

    pub fn set(&self, dt: NaiveDateTime) {
        self.ms.store(dt.and_utc().timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta: Ms) {
        self.ms.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Ms {
        self.ms.load(Ordering::SeqCst)
    }
}
