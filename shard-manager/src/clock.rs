//! A thin clock seam so tests can control the timestamps stamped on
//! `ShardInfo` without sleeping real wallclock time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Supplies monotonic wallclock microseconds. Implementations must never
/// return a value smaller than a previously returned value.
pub trait Clock: Send + Sync {
    fn now_micros(&self) -> u64;
}

/// The real system clock, backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_micros() as u64
    }
}

/// A deterministic, manually-advanced clock for tests.
#[derive(Debug, Default)]
pub struct FakeClock {
    micros: AtomicU64,
}

impl FakeClock {
    pub fn new(start_micros: u64) -> Self {
        FakeClock { micros: AtomicU64::new(start_micros) }
    }

    pub fn advance(&self, delta_micros: u64) {
        self.micros.fetch_add(delta_micros, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_micros(&self) -> u64 {
        self.micros.fetch_add(1, Ordering::SeqCst)
    }
}
