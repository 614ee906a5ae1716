//! States, events and actions of the transport connection state machine.

use crate::addressing::IndividualAddress;
use crate::protocol::tpdu::{Payload, Tpdu};
use core::fmt;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// No connection
    #[default]
    Closed,
    /// Local `T_Connect` sent, waiting for confirmation
    Connecting,
    /// Open, no data TPDU outstanding
    OpenIdle,
    /// Open, one data TPDU awaiting `T_ACK`/`T_NAK`
    OpenWait,
}

impl ConnectionState {
    /// `OpenIdle` or `OpenWait`
    pub const fn is_open(self) -> bool {
        matches!(self, Self::OpenIdle | Self::OpenWait)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "Closed",
            Self::Connecting => "Connecting",
            Self::OpenIdle => "OpenIdle",
            Self::OpenWait => "OpenWait",
        };
        f.write_str(name)
    }
}

/// Why a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DisconnectReason {
    /// The local user asked for it
    LocalRequest,
    /// The peer sent `T_Disconnect`
    PeerRequest,
    /// The connection deadline expired
    Timeout,
    /// No acknowledgment after the last allowed repetition
    AckExhausted,
    /// The peer sent a TPDU that has no meaning in the current state
    ProtocolViolation,
    /// The link rejected the local `T_Connect`
    LinkFailure,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::LocalRequest => "local request",
            Self::PeerRequest => "peer request",
            Self::Timeout => "timeout",
            Self::AckExhausted => "acknowledgment retries exhausted",
            Self::ProtocolViolation => "protocol violation",
            Self::LinkFailure => "link failure",
        };
        f.write_str(text)
    }
}

/// Action executed for an event, numbered after the KNX transport layer
/// style 1 action table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Action {
    /// A0: nothing to do
    Ignore,
    /// A1: accept an inbound `T_Connect`
    AcceptConnection,
    /// A2: acknowledge, advance the receive counter and deliver
    AcknowledgeAndDeliver,
    /// A3: acknowledge a duplicate again without delivering
    Reacknowledge,
    /// A4: reject an out-of-sequence TPDU with `T_NAK`
    NegativeAcknowledge,
    /// A5: close without sending anything
    CloseSilently,
    /// A6: send `T_Disconnect` to the peer and close
    Abort,
    /// A7: transmit a data TPDU and wait for its acknowledgment
    Transmit,
    /// A8: the outstanding TPDU was acknowledged
    Confirm,
    /// A9: send the outstanding TPDU again
    Retransmit,
    /// A10: answer a stray TPDU with `T_Disconnect` to its source
    RejectForeign,
    /// A11: hold a local data request until the connection is idle
    Defer,
    /// A12: send `T_Connect` to open a connection
    OpenConnection,
    /// A13: the peer confirmed the connection
    ConfirmConnect,
    /// A14: local disconnect, `T_Disconnect` sent
    Disconnect,
    /// A15: local disconnect confirmed without a frame
    ConfirmDisconnect,
}

impl Action {
    /// Number in the reference action table (`A0`..`A15`)
    pub const fn number(self) -> u8 {
        match self {
            Self::Ignore => 0,
            Self::AcceptConnection => 1,
            Self::AcknowledgeAndDeliver => 2,
            Self::Reacknowledge => 3,
            Self::NegativeAcknowledge => 4,
            Self::CloseSilently => 5,
            Self::Abort => 6,
            Self::Transmit => 7,
            Self::Confirm => 8,
            Self::Retransmit => 9,
            Self::RejectForeign => 10,
            Self::Defer => 11,
            Self::OpenConnection => 12,
            Self::ConfirmConnect => 13,
            Self::Disconnect => 14,
            Self::ConfirmDisconnect => 15,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.number())
    }
}

/// One processed event: state before, action taken, state after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transition {
    /// State the event was processed in
    pub from: ConnectionState,
    /// What was done
    pub action: Action,
    /// Resulting state
    pub to: ConnectionState,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --{}--> {}", self.from, self.action, self.to)
    }
}

/// Outcome of an accepted data request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendStatus {
    /// The data TPDU is on the wire
    Transmitted,
    /// Held until the connection is open and idle
    Deferred,
}

/// Input of the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    /// Decoded TPDU from the network
    Received {
        source: IndividualAddress,
        tpdu: Tpdu,
    },
    /// Local active open
    ConnectRequest { peer: IndividualAddress },
    /// Local teardown
    DisconnectRequest,
    /// Local `T_Data_Connected` request
    DataRequest { apci: u16, payload: Payload },
    /// Link confirmation of the local `T_Connect`
    ConnectConfirm { positive: bool },
    ConnectionTimeout,
    AckTimeout,
}

/// A notification delivered to the local user, as recorded by test contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// `on_connected`
    Connected(IndividualAddress),
    /// `on_connect_failed`
    ConnectFailed(IndividualAddress, DisconnectReason),
    /// `on_data_indication`
    DataIndication(IndividualAddress, u16, Payload),
    /// `on_data_confirmed`
    DataConfirmed(IndividualAddress),
    /// `on_data_failed`
    DataFailed(IndividualAddress),
    /// `on_disconnected`
    Disconnected(IndividualAddress, DisconnectReason),
}
