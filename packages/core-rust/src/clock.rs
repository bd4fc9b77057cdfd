//! Wall-clock abstraction for dependency injection.

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time as milliseconds since the Unix epoch.
///
/// Replace the real clock with a fixed one for deterministic tests.
pub trait ClockSource: Send + Sync {
    fn now(&self) -> u64;
}

/// Clock that reads the real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> u64 {
        let elapsed = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed,
            Err(err) => {
                tracing::warn!(error = %err, "system clock is before Unix epoch");
                return 0;
            }
        };
        #[allow(clippy::cast_possible_truncation)]
        let millis = elapsed.as_millis() as u64;
        millis
    }
}
