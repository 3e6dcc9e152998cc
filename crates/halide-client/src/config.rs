//! Cluster bootstrap policy.

use std::time::Duration;
use tracing::warn;

/// Environment variable toggling automatic cluster registration
pub const ENV_AUTO_JOIN: &str = "HALIDE_CLUSTER_AUTO_JOIN";

/// Environment variable toggling automatic theme installation
pub const ENV_AUTO_THEME: &str = "HALIDE_CLUSTER_AUTO_THEME";

/// Environment variable overriding the registration attempt budget
pub const ENV_REGISTER_ATTEMPTS: &str = "HALIDE_CLUSTER_REGISTER_ATTEMPTS";

/// Environment variable overriding the delay between attempts
pub const ENV_REGISTER_DELAY: &str = "HALIDE_CLUSTER_REGISTER_DELAY";

/// Environment variable overriding the per-request timeout
pub const ENV_REGISTER_TIMEOUT: &str = "HALIDE_CLUSTER_REGISTER_TIMEOUT";

/// Longest retry delay or request timeout accepted from the environment.
pub const MAX_ENV_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Tunables for the bootstrap sequence.
///
/// Built once at process start and passed by value; nothing reads the
/// environment after that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterPolicy {
    /// Register with the Portal on startup
    pub auto_join: bool,

    /// Install the Portal theme on startup
    pub auto_theme: bool,

    /// Total registration attempts, including the first
    pub max_attempts: u32,

    /// Fixed delay between attempts
    pub retry_delay: Duration,

    /// Timeout for each HTTP request
    pub request_timeout: Duration,
}

impl Default for ClusterPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterPolicy {
    /// Default policy: both features on, 6 attempts, 15s delay, 15s timeout
    #[must_use]
    pub const fn new() -> Self {
        Self {
            auto_join: true,
            auto_theme: true,
            max_attempts: 6,
            retry_delay: Duration::from_secs(15),
            request_timeout: Duration::from_secs(15),
        }
    }

    /// Defaults overridden from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden from an arbitrary key lookup.
    ///
    /// Values that fail to parse are logged and ignored.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut policy = Self::new();

        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(raw) = value(ENV_AUTO_JOIN) {
            match parse_bool(&raw) {
                Some(v) => policy.auto_join = v,
                None => warn!(key = ENV_AUTO_JOIN, value = %raw, "ignoring invalid boolean"),
            }
        }

        if let Some(raw) = value(ENV_AUTO_THEME) {
            match parse_bool(&raw) {
                Some(v) => policy.auto_theme = v,
                None => warn!(key = ENV_AUTO_THEME, value = %raw, "ignoring invalid boolean"),
            }
        }

        if let Some(raw) = value(ENV_REGISTER_ATTEMPTS) {
            match raw.parse::<u32>() {
                Ok(n) => policy.max_attempts = n.max(1),
                Err(_) => warn!(key = ENV_REGISTER_ATTEMPTS, value = %raw, "ignoring invalid count"),
            }
        }

        if let Some(raw) = value(ENV_REGISTER_DELAY) {
            match parse_duration(&raw) {
                Some(d) if d <= MAX_ENV_DURATION => policy.retry_delay = d,
                _ => warn!(key = ENV_REGISTER_DELAY, value = %raw, "ignoring invalid duration"),
            }
        }

        if let Some(raw) = value(ENV_REGISTER_TIMEOUT) {
            match parse_duration(&raw) {
                Some(d) if !d.is_zero() && d <= MAX_ENV_DURATION => policy.request_timeout = d,
                _ => warn!(key = ENV_REGISTER_TIMEOUT, value = %raw, "ignoring invalid duration"),
            }
        }

        policy
    }

    /// Set the attempt budget (at least one)
    #[must_use]
    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    /// Set the delay between attempts
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enable or disable automatic registration
    #[must_use]
    pub const fn auto_join(mut self, enabled: bool) -> Self {
        self.auto_join = enabled;
        self
    }

    /// Enable or disable automatic theme installation
    #[must_use]
    pub const fn auto_theme(mut self, enabled: bool) -> Self {
        self.auto_theme = enabled;
        self
    }

    /// Upper bound on how long registration can block startup.
    ///
    /// Saturates at `Duration::MAX` instead of overflowing.
    #[must_use]
    pub const fn worst_case(&self) -> Duration {
        self.request_timeout
            .saturating_add(self.retry_delay)
            .saturating_mul(self.max_attempts)
    }
}

/// Parse a boolean flag (`true/false`, `1/0`, `yes/no`, `on/off`)
#[must_use]
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a duration: bare seconds (`42`) or a humantime string (`500ms`, `15s`, `2m`, `1h 30m`)
#[must_use]
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).ok()
}
