//! Time utilities plugin.
//!
//! Provides [`TimePlugin`] which registers the [`Clock`] host state. Every
//! timestamp the resource manager records (load time, start time, refresh
//! timing) is read from this clock so tests can drive time with a
//! [`MockClock`].
//!
//! # Example
//!
//! ```
//! use keystone_host::host::Host;
//! use keystone_core::{Clock, HostInfoPlugin, TimePlugin};
//!
//! let mut host = Host::new();
//! host.add_plugins(HostInfoPlugin).add_plugins(TimePlugin::default());
//! host.finish().unwrap();
//!
//! let clock = host.state::<Clock>().unwrap();
//! let start = clock.now();
//! assert!(clock.elapsed_since(start) < std::time::Duration::from_secs(60));
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use keystone_host::host::Host;
use keystone_host::plugin::{Plugin, PluginId};
use keystone_host::state::HostState;

use crate::HostInfoPlugin;

// ─────────────────────────────────────────────────────────────────────────────
// ClockProvider Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for providing current time.
///
/// Implement this for custom time providers (e.g., a frozen clock in tests).
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Instant;
/// use keystone_core::{Clock, ClockProvider};
///
/// struct FixedClock(Instant);
///
/// impl ClockProvider for FixedClock {
///     fn now(&self) -> Instant {
///         self.0
///     }
/// }
///
/// let at = Instant::now();
/// let clock = Clock::with_provider(Arc::new(FixedClock(at)));
/// assert_eq!(clock.now(), at);
/// ```
pub trait ClockProvider: Send + Sync + 'static {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// System clock provider using `std::time::Instant`.
#[derive(Debug, Clone, Copy, Default)]
struct SystemClock;

impl ClockProvider for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────────────────────────────────────

/// Time provider shared through host state.
///
/// Cheap to clone; clones share the same provider.
#[derive(Clone)]
pub struct Clock {
    provider: Arc<dyn ClockProvider>,
}

impl HostState for Clock {}

impl Clock {
    /// Creates a Clock using the system clock.
    #[must_use]
    pub fn system() -> Self {
        Self {
            provider: Arc::new(SystemClock),
        }
    }

    /// Creates a Clock with a custom provider.
    #[must_use]
    pub fn with_provider(provider: Arc<dyn ClockProvider>) -> Self {
        Self { provider }
    }

    /// Returns the current instant.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.provider.now()
    }

    /// Returns the duration elapsed since the given instant.
    ///
    /// Saturates to zero when `earlier` lies in the future.
    #[must_use]
    pub fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

impl core::fmt::Debug for Clock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Clock").finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TimePlugin
// ─────────────────────────────────────────────────────────────────────────────

/// Time utilities plugin.
///
/// # State Provided
///
/// | State | Description |
/// |-------|-------------|
/// | [`Clock`] | Time provider, mockable for testing |
///
/// # Dependencies
///
/// - [`HostInfoPlugin`]
///
/// # Testing with Mock Clock
///
/// Requires the `test-utils` feature.
///
/// ```ignore
/// use std::sync::Arc;
/// use std::time::{Duration, Instant};
/// use keystone_host::host::Host;
/// use keystone_core::{Clock, HostInfoPlugin, MockClock, TimePlugin};
///
/// let mock = Arc::new(MockClock::new(Instant::now()));
/// let start = mock.current();
///
/// let mut host = Host::new();
/// host.add_plugins(HostInfoPlugin)
///     .add_plugins(TimePlugin::with_clock(mock.clone()));
/// host.finish().unwrap();
///
/// mock.advance(Duration::from_secs(60));
/// let clock = host.state::<Clock>().unwrap();
/// assert_eq!(clock.elapsed_since(start), Duration::from_secs(60));
/// ```
#[derive(Clone, Default)]
pub struct TimePlugin {
    /// Custom clock provider (for testing).
    clock: Option<Arc<dyn ClockProvider>>,
}

impl TimePlugin {
    /// Creates a new `TimePlugin` with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a `TimePlugin` with a custom clock provider.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn ClockProvider>) -> Self {
        Self { clock: Some(clock) }
    }
}

impl Plugin for TimePlugin {
    fn build(&self, host: &mut Host) {
        let clock = match &self.clock {
            Some(provider) => Clock::with_provider(Arc::clone(provider)),
            None => Clock::system(),
        };
        host.insert_state(clock);
    }

    fn dependencies(&self) -> Vec<PluginId> {
        vec![PluginId::of::<HostInfoPlugin>()]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MockClock for Testing
// ─────────────────────────────────────────────────────────────────────────────

/// Mock clock with controllable time.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockClock {
    current: parking_lot::RwLock<Instant>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockClock {
    /// Creates a mock clock set to the given instant.
    #[must_use]
    pub fn new(start: Instant) -> Self {
        Self {
            current: parking_lot::RwLock::new(start),
        }
    }

    /// Advances the clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        *self.current.write() += duration;
    }

    /// Sets the clock to a specific instant.
    pub fn set(&self, instant: Instant) {
        *self.current.write() = instant;
    }

    /// Returns the current instant.
    #[must_use]
    pub fn current(&self) -> Instant {
        *self.current.read()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl ClockProvider for MockClock {
    fn now(&self) -> Instant {
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_default_uses_system_time() {
        let clock = Clock::default();
        let before = Instant::now();
        let clock_now = clock.now();
        let after = Instant::now();

        assert!(clock_now >= before);
        assert!(clock_now <= after);
    }

    #[test]
    fn clock_elapsed_since_saturates() {
        let mock = Arc::new(MockClock::new(Instant::now()));
        let clock = Clock::with_provider(mock.clone());
        let future = mock.current() + Duration::from_secs(5);

        assert_eq!(clock.elapsed_since(future), Duration::ZERO);
    }

    #[test]
    fn mock_clock_advance() {
        let mock = MockClock::new(Instant::now());
        let initial = mock.current();

        mock.advance(Duration::from_secs(60));

        assert_eq!(mock.current().duration_since(initial), Duration::from_secs(60));
    }

    #[test]
    fn mock_clock_set() {
        let mock = MockClock::new(Instant::now());
        let target = Instant::now() + Duration::from_secs(100);

        mock.set(target);

        assert_eq!(mock.current(), target);
    }

    #[test]
    fn cloned_clock_shares_provider() {
        let mock = Arc::new(MockClock::new(Instant::now()));
        let clock = Clock::with_provider(mock.clone());
        let copy = clock.clone();

        mock.advance(Duration::from_secs(3));
        assert_eq!(clock.now(), copy.now());
    }

    #[test]
    fn time_plugin_with_mock_clock() {
        let mock = Arc::new(MockClock::new(Instant::now()));
        let start = mock.current();

        let mut host = Host::new();
        host.add_plugins(HostInfoPlugin);
        host.add_plugins(TimePlugin::with_clock(mock.clone()));
        host.finish().unwrap();

        mock.advance(Duration::from_secs(60));
        let clock = host.state::<Clock>().unwrap();
        assert_eq!(clock.now().duration_since(start), Duration::from_secs(60));
    }

    #[test]
    fn time_plugin_requires_host_info() {
        let mut host = Host::new();
        host.add_plugins(TimePlugin::default());
        assert!(host.finish().is_err());
    }
}
