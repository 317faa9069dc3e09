use core::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default epoch: Wednesday, January 1, 2025 00:00:00 UTC
///
/// The epoch is fixed for the lifetime of a deployment. Changing it after IDs
/// have been persisted re-maps the timestamp bits and breaks ordering and
/// uniqueness against previously issued IDs.
pub const DEFAULT_EPOCH: Duration = Duration::from_millis(1_735_689_600_000);

/// A source of millisecond timestamps relative to a configured epoch.
///
/// This abstraction lets you plug in the real wall clock in production and a
/// mocked time source in tests, so clock regressions and millisecond
/// boundaries can be simulated deterministically.
///
/// # Example
///
/// ```
/// use idmint::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// let time = FixedTime;
/// assert_eq!(time.current_millis(), 1234);
/// ```
pub trait TimeSource {
    /// Returns the current time in milliseconds since the configured epoch.
    fn current_millis(&self) -> u64;
}

/// The production [`TimeSource`]: the system wall clock, offset from a fixed
/// epoch.
///
/// Every call reads `SystemTime::now()`. Wall-clock adjustments (NTP
/// corrections, manual changes) are intentionally visible through this source:
/// the allocator must be able to observe a backward step and refuse to issue
/// IDs, rather than have it hidden behind a monotonic timer.
#[derive(Clone, Debug)]
pub struct WallClock {
    epoch_millis: u64,
}

impl Default for WallClock {
    /// Constructs a wall clock aligned to [`DEFAULT_EPOCH`].
    ///
    /// Panics if system time is earlier than the default epoch.
    fn default() -> Self {
        Self::with_epoch(DEFAULT_EPOCH)
    }
}

impl WallClock {
    /// Constructs a wall clock using a custom epoch as the origin (t = 0),
    /// specified as a [`Duration`] since 1970-01-01 UTC.
    ///
    /// # Panics
    ///
    /// Panics if the current system time is earlier than the given epoch. A
    /// host whose clock predates the epoch is misconfigured and must not mint
    /// IDs.
    pub fn with_epoch(epoch: Duration) -> Self {
        let system_now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX_EPOCH");
        system_now
            .checked_sub(epoch)
            .expect("system clock before custom epoch");

        Self {
            epoch_millis: epoch.as_millis() as u64,
        }
    }
}

impl TimeSource for WallClock {
    /// Returns the number of milliseconds since the configured epoch.
    ///
    /// Saturates to zero if the system clock reads earlier than the epoch at
    /// call time; the allocator then surfaces the regression to the caller.
    fn current_millis(&self) -> u64 {
        let unix_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as u64);
        unix_millis.saturating_sub(self.epoch_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_clock_advances_from_epoch() {
        let clock = WallClock::default();
        let a = clock.current_millis();
        std::thread::sleep(Duration::from_millis(2));
        let b = clock.current_millis();
        assert!(a > 0);
        assert!(b >= a + 1);
    }

    #[test]
    fn recent_epoch_yields_smaller_timestamps() {
        let unix = WallClock::with_epoch(Duration::ZERO);
        let custom = WallClock::with_epoch(DEFAULT_EPOCH);
        assert!(custom.current_millis() < unix.current_millis());
    }
}
