//! Error types for local transport-layer rejections.
//!
//! Inbound frames never produce errors: malformed, foreign or out-of-sequence
//! TPDUs are handled as transitions of the connection state machine. The
//! errors below are what a *caller* sees when it misuses the local service
//! (sending while closed, oversized payloads, bad configuration, ...).
//!
//! Each category wraps a crate-private kind enum and, with `std`, a backtrace.

use core::fmt;

#[cfg(feature = "std")]
use std::backtrace::Backtrace;

/// Result type alias for KNX transport operations.
pub type Result<T> = core::result::Result<T, KnxError>;

// =============================================================================
// Error Kind Enums (Internal)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum ProtocolErrorKind {
    InvalidFrame,
    PayloadTooLarge,
    InvalidControlField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum ConnectionErrorKind {
    NotConnected,
    AlreadyConnected,
    Busy,
    NoFreeConnections,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum TransportErrorKind {
    SendFailed,
    BufferTooSmall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum AddressingErrorKind {
    InvalidIndividualAddress,
    OutOfRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum ConfigurationErrorKind {
    MalformedValue,
    InvalidTimeout,
    InvalidApduLength,
}

// =============================================================================
// Main Error Type
// =============================================================================

/// KNX transport error.
///
/// Returned synchronously by local service requests and by the codec when
/// asked to encode into a buffer that cannot hold the frame.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KnxError {
    /// Frame construction or encoding errors
    Protocol(ProtocolError),
    /// Connection state errors (not connected, busy, ...)
    Connection(ConnectionError),
    /// Network link errors
    Transport(TransportError),
    /// Addressing errors (invalid address format, etc.)
    Addressing(AddressingError),
    /// Invalid transport configuration
    Configuration(ConfigurationError),
}

// =============================================================================
// Structured Error Types
// =============================================================================

/// Protocol error with optional backtrace
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProtocolError {
    kind: ProtocolErrorKind,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl ProtocolError {
    pub(crate) fn new(kind: ProtocolErrorKind) -> Self {
        Self {
            kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }

    /// The TPDU was invalid and could not be encoded
    pub fn is_invalid_frame(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::InvalidFrame)
    }

    /// The payload exceeded the transport-level bound
    pub fn is_payload_too_large(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::PayloadTooLarge)
    }

    /// The application control field does not fit in 10 bits
    pub fn is_invalid_control_field(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::InvalidControlField)
    }
}

/// Connection error with optional backtrace
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionError {
    kind: ConnectionErrorKind,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl ConnectionError {
    pub(crate) fn new(kind: ConnectionErrorKind) -> Self {
        Self {
            kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the request needs an open connection
    pub fn is_not_connected(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::NotConnected)
    }

    /// Check if a connection is already open or being opened
    pub fn is_already_connected(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::AlreadyConnected)
    }

    /// Check if a data request is already waiting to be sent
    pub fn is_busy(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::Busy)
    }

    /// Check if every connection slot is in use
    pub fn is_no_free_connections(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::NoFreeConnections)
    }
}

/// Transport error with optional backtrace
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportError {
    kind: TransportErrorKind,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl TransportError {
    pub(crate) fn new(kind: TransportErrorKind) -> Self {
        Self {
            kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if buffer is too small
    pub fn is_buffer_too_small(&self) -> bool {
        matches!(self.kind, TransportErrorKind::BufferTooSmall)
    }

    /// Check if the link refused the frame
    pub fn is_send_failed(&self) -> bool {
        matches!(self.kind, TransportErrorKind::SendFailed)
    }
}

/// Addressing error with optional backtrace
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressingError {
    kind: AddressingErrorKind,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl AddressingError {
    pub(crate) fn new(kind: AddressingErrorKind) -> Self {
        Self {
            kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if address is out of range
    pub fn is_out_of_range(&self) -> bool {
        matches!(self.kind, AddressingErrorKind::OutOfRange)
    }
}

/// Configuration error with optional backtrace
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigurationError {
    kind: ConfigurationErrorKind,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl ConfigurationError {
    pub(crate) fn new(kind: ConfigurationErrorKind) -> Self {
        Self {
            kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }

    /// A `KEY=VALUE` line carried a value that does not parse
    pub fn is_malformed_value(&self) -> bool {
        matches!(self.kind, ConfigurationErrorKind::MalformedValue)
    }

    /// Timeouts are zero or the ack timeout is not shorter than the connection timeout
    pub fn is_invalid_timeout(&self) -> bool {
        matches!(self.kind, ConfigurationErrorKind::InvalidTimeout)
    }
}

// =============================================================================
// Convenience Constructors for KnxError
// =============================================================================

impl KnxError {
    // Protocol errors
    pub(crate) fn invalid_frame() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::InvalidFrame))
    }

    pub(crate) fn payload_too_large() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::PayloadTooLarge))
    }

    pub(crate) fn invalid_control_field() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::InvalidControlField))
    }

    // Connection errors
    pub(crate) fn not_connected() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::NotConnected))
    }

    pub(crate) fn already_connected() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::AlreadyConnected))
    }

    pub(crate) fn busy() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::Busy))
    }

    pub(crate) fn no_free_connections() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::NoFreeConnections))
    }

    // Transport errors
    pub(crate) fn buffer_too_small() -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::BufferTooSmall))
    }

    /// The medium refused a frame.
    ///
    /// For [`NetworkLink`](crate::net::NetworkLink) implementations to report
    /// a frame that could not be queued.
    pub fn send_failed() -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::SendFailed))
    }

    // Addressing errors
    pub(crate) fn invalid_individual_address() -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::InvalidIndividualAddress))
    }

    pub(crate) fn address_out_of_range() -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::OutOfRange))
    }

    // Configuration errors
    pub(crate) fn malformed_config_value() -> Self {
        Self::Configuration(ConfigurationError::new(ConfigurationErrorKind::MalformedValue))
    }

    pub(crate) fn invalid_timeout() -> Self {
        Self::Configuration(ConfigurationError::new(ConfigurationErrorKind::InvalidTimeout))
    }

    pub(crate) fn invalid_apdu_length() -> Self {
        Self::Configuration(ConfigurationError::new(ConfigurationErrorKind::InvalidApduLength))
    }

    /// Shorthand for `matches!(self, KnxError::Connection(e) if e.is_not_connected())`
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::Connection(e) if e.is_not_connected())
    }

    /// Shorthand for `matches!(self, KnxError::Protocol(e) if e.is_payload_too_large())`
    pub fn is_payload_too_large(&self) -> bool {
        matches!(self, Self::Protocol(e) if e.is_payload_too_large())
    }
}

// =============================================================================
// Display Implementation
// =============================================================================

impl fmt::Display for KnxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnxError::Protocol(e) => write!(f, "Protocol error: {:?}", e.kind),
            KnxError::Connection(e) => write!(f, "Connection error: {:?}", e.kind),
            KnxError::Transport(e) => write!(f, "Transport error: {:?}", e.kind),
            KnxError::Addressing(e) => write!(f, "Addressing error: {:?}", e.kind),
            KnxError::Configuration(e) => write!(f, "Configuration error: {:?}", e.kind),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for KnxError {}
