//! A seam around `Utc::now()` so the deterministic scenarios in the test
//! suite don't race the wall clock. Business logic takes `&dyn Clock`
//! instead of calling `Utc::now()` directly, the way the station's
//! teacher keeps its own timestamp reads behind a small checkable surface
//! rather than scattering them through strategy code.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only advances when told to, for deterministic scenario
/// tests (see `tests/scenarios.rs`).
#[derive(Debug)]
pub struct TestClock {
    current: Mutex<DateTime<Utc>>,
}

impl TestClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut current = self.current.lock();
        *current += delta;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.current.lock() = at;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}
