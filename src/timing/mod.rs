//! Presentation timestamp helpers
//!
//! Sensor timestamps arrive as nanoseconds on an arbitrary monotonic base.
//! Recording wants microseconds relative to the first captured frame.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

const UNSET: i64 = i64::MIN;

/// Rebases sensor timestamps onto the first frame of a session.
///
/// The first call to [`PtsBaseline::pts_us`] latches the baseline; shared
/// clones see the same baseline.
#[derive(Debug, Clone)]
pub struct PtsBaseline {
    start_ns: Arc<AtomicI64>,
}

impl PtsBaseline {
    pub fn new() -> Self {
        Self {
            start_ns: Arc::new(AtomicI64::new(UNSET)),
        }
    }

    /// Microseconds since the first timestamp seen
    pub fn pts_us(&self, sensor_ns: i64) -> i64 {
        let start = match self.start_ns.compare_exchange(
            UNSET,
            sensor_ns,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => sensor_ns,
            Err(existing) => existing,
        };
        (sensor_ns - start) / 1000
    }

    pub fn is_latched(&self) -> bool {
        self.start_ns.load(Ordering::Acquire) != UNSET
    }

    /// Forget the baseline so the next frame starts a new timeline
    pub fn reset(&self) {
        self.start_ns.store(UNSET, Ordering::Release);
    }
}

impl Default for PtsBaseline {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic nanosecond clock for sources without their own sensor clock
#[derive(Debug, Clone)]
pub struct SensorClock {
    start: Arc<Instant>,
}

impl SensorClock {
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    #[inline]
    pub fn now_ns(&self) -> i64 {
        self.start.elapsed().as_nanos() as i64
    }
}

impl Default for SensorClock {
    fn default() -> Self {
        Self::new()
    }
}
