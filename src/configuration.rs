//! Transport layer configuration.
//!
//! Defaults follow the KNX transport layer: 6 s connection timeout, 3 s
//! acknowledgment timeout, 3 repetitions and extended frames. Settings can be
//! built in code or read from `KEY=VALUE` text such as [`DEFAULT_CONFIG`],
//! one setting per line; keys that are absent keep their default.

use crate::error::{KnxError, Result};
use crate::protocol::constants::{
    DEFAULT_ACK_TIMEOUT, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_MAX_REPETITIONS, MAX_APDU_LENGTH,
};
use core::time::Duration;

/// Configuration text equivalent to [`TransportConfig::default`].
pub const DEFAULT_CONFIG: &str = r#"
CONNECTION_TIMEOUT_MS=6000
ACK_TIMEOUT_MS=3000
MAX_REPETITIONS=3
MAX_APDU_LENGTH=255
"#;

/// Timing and sizing parameters of a transport connection
///
/// # Examples
///
/// ```
/// use core::time::Duration;
/// use knx_transport::TransportConfig;
///
/// let config = TransportConfig::default()
///     .with_ack_timeout(Duration::from_millis(1500))
///     .with_max_apdu_length(15);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.max_payload_length(), 14);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransportConfig {
    connection_timeout: Duration,
    ack_timeout: Duration,
    max_repetitions: u8,
    max_apdu_length: u8,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportConfig {
    /// The default configuration, usable in `const` context.
    pub const fn new() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            max_repetitions: DEFAULT_MAX_REPETITIONS,
            max_apdu_length: MAX_APDU_LENGTH,
        }
    }

    /// Set the connection liveness timeout
    #[must_use]
    pub const fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the acknowledgment timeout
    #[must_use]
    pub const fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Set how many times an unacknowledged data TPDU is repeated
    #[must_use]
    pub const fn with_max_repetitions(mut self, repetitions: u8) -> Self {
        self.max_repetitions = repetitions;
        self
    }

    /// Set the largest APDU (octets after the TPCI) the medium carries
    #[must_use]
    pub const fn with_max_apdu_length(mut self, length: u8) -> Self {
        self.max_apdu_length = length;
        self
    }

    /// Connection liveness timeout
    #[inline]
    pub const fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Acknowledgment timeout
    #[inline]
    pub const fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    /// Repetitions allowed per data TPDU
    #[inline]
    pub const fn max_repetitions(&self) -> u8 {
        self.max_repetitions
    }

    /// Largest APDU length
    #[inline]
    pub const fn max_apdu_length(&self) -> u8 {
        self.max_apdu_length
    }

    /// Largest payload after the APCI octet a data request may carry.
    #[inline]
    pub const fn max_payload_length(&self) -> usize {
        (self.max_apdu_length as usize).saturating_sub(1)
    }

    /// Check the parameters for consistency.
    ///
    /// # Errors
    ///
    /// - `InvalidTimeout` if a timeout is zero or the acknowledgment timeout
    ///   is not shorter than the connection timeout
    /// - `InvalidApduLength` if the APDU length is zero
    pub fn validate(&self) -> Result<()> {
        if self.connection_timeout.is_zero()
            || self.ack_timeout.is_zero()
            || self.ack_timeout >= self.connection_timeout
        {
            return Err(KnxError::invalid_timeout());
        }
        if self.max_apdu_length == 0 {
            return Err(KnxError::invalid_apdu_length());
        }
        Ok(())
    }

    /// Read a configuration from `KEY=VALUE` lines.
    ///
    /// Recognised keys: `CONNECTION_TIMEOUT_MS`, `ACK_TIMEOUT_MS`,
    /// `MAX_REPETITIONS`, `MAX_APDU_LENGTH`. The result is validated.
    ///
    /// # Errors
    ///
    /// `MalformedValue` for values that do not parse, plus anything
    /// [`TransportConfig::validate`] rejects.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut config = Self::new();

        if let Some(ms) = lookup(text, "CONNECTION_TIMEOUT_MS") {
            config.connection_timeout = Duration::from_millis(parse(ms)?);
        }
        if let Some(ms) = lookup(text, "ACK_TIMEOUT_MS") {
            config.ack_timeout = Duration::from_millis(parse(ms)?);
        }
        if let Some(count) = lookup(text, "MAX_REPETITIONS") {
            config.max_repetitions = parse(count)?;
        }
        if let Some(length) = lookup(text, "MAX_APDU_LENGTH") {
            config.max_apdu_length = parse(length)?;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Value of the first `key=` line, trimmed.
fn lookup<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    text.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(key)?.trim_start().strip_prefix('='))
        .map(str::trim)
}

fn parse<T: core::str::FromStr>(value: &str) -> Result<T> {
    value.parse().map_err(|_invalid| KnxError::malformed_config_value())
}
