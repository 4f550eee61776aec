//! Registry configuration

use std::time::Duration;

/// Default bound on a single capture call
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default interval between repeated capture-miss log lines
pub const DEFAULT_ERROR_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration for the camera registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Timeout passed to every `capture_frame` call. Also bounds how long
    /// stopping an acquisition loop can take.
    pub capture_timeout: Duration,

    /// Minimum time between two log lines for the same recurring capture miss
    pub error_log_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
            error_log_interval: DEFAULT_ERROR_LOG_INTERVAL,
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout = timeout;
        self
    }

    pub fn error_log_interval(mut self, interval: Duration) -> Self {
        self.error_log_interval = interval;
        self
    }
}
