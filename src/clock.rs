//! Wall-time abstraction so tests can inject deterministic timestamps
//! instead of racing the real clock.
//!
//! On platforms with coarse wall-clock resolution, consecutive real-time
//! reads can collide and break LRU ordering. The planner's tiebreak on
//! `firstDetected` (and, beyond that, on id) is the defense against that;
//! `Clock` itself makes no resolution guarantee.

use std::sync::Mutex;
use std::time::SystemTime;

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Test-only clock that only advances when told to, so scenarios can
/// assert on exact before/after timestamps without sleeping real time.
pub struct FakeClock {
    current: Mutex<SystemTime>,
}

impl FakeClock {
    pub fn new(start: SystemTime) -> Self {
        FakeClock {
            current: Mutex::new(start),
        }
    }

    pub fn advance(&self, delta: std::time::Duration) {
        let mut guard = self.current.lock().unwrap();
        *guard += delta;
    }

    pub fn set(&self, at: SystemTime) {
        *self.current.lock().unwrap() = at;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        *self.current.lock().unwrap()
    }
}
