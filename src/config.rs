//! Configuration for validators and their wait helpers.
//!
//! Timeouts here govern only the asynchronous query helpers; event dispatch
//! itself is synchronous and never blocks on a timer.

use std::time::Duration;

/// Default interval between wake-up checks while waiting for a branch.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default deadline for asynchronous queries.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline used when a debugger is attached, so a paused process does not
/// time out assertions underneath the person stepping through it.
pub const DEBUGGER_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Tuning knobs for a validator's asynchronous query helpers.
///
/// # Examples
///
/// ```rust,ignore
/// use tracexpect::ValidatorConfig;
/// use std::time::Duration;
///
/// let config = ValidatorConfig::new()
///     .with_wait_timeout(Duration::from_secs(30))
///     .with_poll_interval(Duration::from_millis(25));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Upper bound on how long a waiting query sleeps between re-checks.
    ///
    /// Completion of a branch wakes waiters immediately; the poll interval
    /// only caps the staleness window if a wake-up is missed.
    ///
    /// **Default**: 10ms
    pub poll_interval: Duration,

    /// Deadline applied to asynchronous queries that do not pass an explicit
    /// timeout.
    ///
    /// **Default**: 5s, or 300s when a debugger is attached at startup
    pub wait_timeout: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        let wait_timeout = if debugger_attached() {
            DEBUGGER_WAIT_TIMEOUT
        } else {
            DEFAULT_WAIT_TIMEOUT
        };
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            wait_timeout,
        }
    }
}

impl ValidatorConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration suited to stepping through a test by hand,
    /// regardless of whether a debugger was detected.
    pub fn debugging() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            wait_timeout: DEBUGGER_WAIT_TIMEOUT,
        }
    }

    /// Set the interval between wake-up checks.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the default deadline for asynchronous queries.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }
}

/// Whether the current process is being traced by a debugger.
///
/// Reads `TracerPid` from `/proc/self/status` on Linux. On other platforms
/// this always reports `false`.
#[cfg(target_os = "linux")]
pub fn debugger_attached() -> bool {
    match std::fs::read_to_string("/proc/self/status") {
        Ok(status) => status.lines().any(|line| {
            line.strip_prefix("TracerPid:")
                .map(|pid| pid.trim() != "0")
                .unwrap_or(false)
        }),
        Err(_) => false,
    }
}

/// Whether the current process is being traced by a debugger.
#[cfg(not(target_os = "linux"))]
pub fn debugger_attached() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ValidatorConfig::default();

        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert!(
            config.wait_timeout == DEFAULT_WAIT_TIMEOUT
                || config.wait_timeout == DEBUGGER_WAIT_TIMEOUT
        );
    }

    #[test]
    fn test_debugging_config() {
        let config = ValidatorConfig::debugging();

        assert_eq!(config.wait_timeout, DEBUGGER_WAIT_TIMEOUT);
    }

    #[test]
    fn test_builder_methods() {
        let config = ValidatorConfig::new()
            .with_poll_interval(Duration::from_millis(25))
            .with_wait_timeout(Duration::from_secs(30));

        assert_eq!(config.poll_interval, Duration::from_millis(25));
        assert_eq!(config.wait_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_debugger_detection_does_not_panic() {
        // Value depends on the environment; the probe itself must be safe.
        let _ = debugger_attached();
    }
}
