//! Engine configuration.
//!
//! All settings are plain values handed to the component that needs them;
//! nothing is read from the environment or kept in globals.

use std::time::Duration;

/// Which transports the connection manager may fall back to.
///
/// Implicit TLS is always tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FallbackPolicy {
    /// Implicit TLS or nothing.
    #[default]
    ImplicitTlsOnly,
    /// Fall back to STARTTLS on the plain port.
    AllowStartTls,
    /// Fall back to STARTTLS, then to an unencrypted connection.
    AllowPlaintext,
}

impl FallbackPolicy {
    /// Returns true if STARTTLS may be tried.
    #[must_use]
    pub const fn allows_starttls(self) -> bool {
        matches!(self, Self::AllowStartTls | Self::AllowPlaintext)
    }

    /// Returns true if an unencrypted connection may be used.
    #[must_use]
    pub const fn allows_plaintext(self) -> bool {
        matches!(self, Self::AllowPlaintext)
    }
}

/// How to reach the server.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransportConfig {
    /// Port for implicit TLS.
    pub implicit_tls_port: u16,
    /// Port for STARTTLS and plaintext.
    pub plain_port: u16,
    /// Allowed degraded transports.
    pub fallback: FallbackPolicy,
    /// Deadline per attempt, covering TCP, TLS and the greeting.
    pub connect_timeout: Duration,
    /// Deadline for a single command once connected.
    pub io_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportConfig {
    /// Implicit TLS on 993, no fallback, 30 s connect and 60 s command
    /// deadlines.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            implicit_tls_port: 993,
            plain_port: 143,
            fallback: FallbackPolicy::ImplicitTlsOnly,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
        }
    }

    /// Sets the implicit TLS port.
    #[must_use]
    pub const fn implicit_tls_port(mut self, port: u16) -> Self {
        self.implicit_tls_port = port;
        self
    }

    /// Sets the STARTTLS/plaintext port.
    #[must_use]
    pub const fn plain_port(mut self, port: u16) -> Self {
        self.plain_port = port;
        self
    }

    /// Sets the fallback policy.
    #[must_use]
    pub const fn fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sets the per-attempt connect deadline.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-command deadline.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }
}

/// Settings for streamed fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FetchConfig {
    /// Messages buffered between the reader task and the consumer.
    pub queue_depth: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchConfig {
    /// A queue of 32 messages.
    #[must_use]
    pub const fn new() -> Self {
        Self { queue_depth: 32 }
    }

    /// Sets the queue depth. Zero is treated as one.
    #[must_use]
    pub const fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = if depth == 0 { 1 } else { depth };
        self
    }
}

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Backoff {
    /// Delay before the first attempt.
    pub initial: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Attempts before giving up.
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Backoff {
    /// 2 s doubling up to 80 s, five attempts.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(80),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }

    /// Sets the first delay.
    #[must_use]
    pub const fn initial(mut self, delay: Duration) -> Self {
        self.initial = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub const fn max(mut self, delay: Duration) -> Self {
        self.max = delay;
        self
    }

    /// Sets the growth factor.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the attempt limit.
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Delay before attempt `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let secs = self.initial.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// What the watcher does after losing its connection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReconnectPolicy {
    /// Whether to reconnect at all.
    pub enabled: bool,
    /// Delays between attempts.
    pub backoff: Backoff,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectPolicy {
    /// Reconnect with the default backoff.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: true,
            backoff: Backoff::new(),
        }
    }

    /// Never reconnect.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            backoff: Backoff::new(),
        }
    }

    /// Sets the backoff.
    #[must_use]
    pub const fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Settings for the IDLE watcher.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WatchConfig {
    /// How long `stop` waits for the watcher to leave IDLE.
    pub grace_period: Duration,
    /// IDLE is re-issued after this long without traffic. RFC 2177 asks
    /// for less than 30 minutes.
    pub idle_renewal: Duration,
    /// NOOP interval for servers without IDLE.
    pub poll_interval: Duration,
    /// Recovery after transport loss.
    pub reconnect: ReconnectPolicy,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchConfig {
    /// 5 s grace, 29 min IDLE renewal, 60 s polling, reconnect enabled.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            idle_renewal: Duration::from_secs(29 * 60),
            poll_interval: Duration::from_secs(60),
            reconnect: ReconnectPolicy::new(),
        }
    }

    /// Sets the stop grace period.
    #[must_use]
    pub const fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Sets the IDLE renewal interval.
    #[must_use]
    pub const fn idle_renewal(mut self, renewal: Duration) -> Self {
        self.idle_renewal = renewal;
        self
    }

    /// Sets the polling interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the reconnect policy.
    #[must_use]
    pub const fn reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// Settings for folder synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SyncConfig {
    /// Only messages sent within this many days are fetched.
    pub window_days: u32,
    /// Open folders with EXAMINE so nothing is marked seen.
    pub read_only: bool,
    /// LIST reference used by `sync_all`.
    pub reference: String,
    /// LIST pattern used by `sync_all`.
    pub pattern: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncConfig {
    /// Ninety days, read-only, every folder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            window_days: 90,
            read_only: true,
            reference: String::new(),
            pattern: "*".to_string(),
        }
    }

    /// Sets the time window.
    #[must_use]
    pub const fn window_days(mut self, days: u32) -> Self {
        self.window_days = days;
        self
    }

    /// Sets read-only selection.
    #[must_use]
    pub const fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Sets the LIST pattern.
    #[must_use]
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.implicit_tls_port, 993);
        assert_eq!(config.plain_port, 143);
        assert_eq!(config.fallback, FallbackPolicy::ImplicitTlsOnly);
        assert!(!config.fallback.allows_starttls());
    }

    #[test]
    fn test_fallback_ladder() {
        assert!(FallbackPolicy::AllowStartTls.allows_starttls());
        assert!(!FallbackPolicy::AllowStartTls.allows_plaintext());
        assert!(FallbackPolicy::AllowPlaintext.allows_starttls());
        assert!(FallbackPolicy::AllowPlaintext.allows_plaintext());
    }

    #[test]
    fn test_queue_depth_floor() {
        assert_eq!(FetchConfig::new().queue_depth(0).queue_depth, 1);
        assert_eq!(FetchConfig::default().queue_depth, 32);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let backoff = Backoff::new();
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(4), Duration::from_secs(16));
        assert_eq!(backoff.delay(10), Duration::from_secs(80));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(80));
    }

    #[test]
    fn test_backoff_multiplier_below_one() {
        let backoff = Backoff::new().multiplier(0.5);
        assert_eq!(backoff.delay(3), Duration::from_secs(2));
    }

    #[test]
    fn test_watch_defaults() {
        let config = WatchConfig::default();
        assert!(config.idle_renewal < Duration::from_secs(30 * 60));
        assert!(config.reconnect.enabled);
        assert!(!ReconnectPolicy::disabled().enabled);
    }

    #[test]
    fn test_sync_defaults() {
        let config = SyncConfig::default().window_days(30);
        assert_eq!(config.window_days, 30);
        assert!(config.read_only);
        assert_eq!(config.pattern, "*");
    }
}
