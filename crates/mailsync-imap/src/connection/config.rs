//! Per-attempt connection parameters.

use std::time::Duration;

/// Transport security of a single connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Security {
    /// TLS from the first byte (port 993).
    Implicit,
    /// Plaintext greeting, then `STARTTLS` (port 143).
    StartTls,
    /// No encryption (port 143). Only for trusted networks and tests.
    None,
}

impl Security {
    /// Returns the well-known port for this mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Implicit => 993,
            Self::StartTls | Self::None => 143,
        }
    }

    /// Returns true if credentials would travel unencrypted.
    #[must_use]
    pub const fn is_plaintext(self) -> bool {
        matches!(self, Self::None)
    }
}

impl std::fmt::Display for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Implicit => "implicit-tls",
            Self::StartTls => "starttls",
            Self::None => "plaintext",
        })
    }
}

/// Where and how to open one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Server hostname, also used for certificate verification.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Deadline for TCP connect plus TLS handshake plus greeting.
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    /// Implicit TLS on port 993 with a 30 second connect timeout.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: Security::Implicit.default_port(),
            security: Security::Implicit,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the security mode and moves to its default port.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self.port = security.default_port();
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
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
    fn test_default_ports() {
        assert_eq!(Security::Implicit.default_port(), 993);
        assert_eq!(Security::StartTls.default_port(), 143);
        assert_eq!(Security::None.default_port(), 143);
    }

    #[test]
    fn test_builder_order() {
        let config = ConnectionConfig::new("imap.example.com")
            .security(Security::StartTls)
            .port(1143);
        assert_eq!(config.port, 1143);
        assert_eq!(config.security, Security::StartTls);

        let config = ConnectionConfig::new("imap.example.com").security(Security::None);
        assert_eq!(config.port, 143);
        assert!(config.security.is_plaintext());
    }
}
