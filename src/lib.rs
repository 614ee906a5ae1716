#![cfg_attr(all(not(test), not(feature = "std")), no_std)]

//! # knx-transport
//!
//! KNX Transport Layer for embedded systems.
//!
//! This crate provides a `no_std` implementation of the connection-oriented
//! point-to-point mode of the KNX transport layer, the reliable channel
//! device management runs over.
//!
//! ## Features
//!
//! - TPDU codec for control and data frames
//! - Per-peer state machine with sequencing, acknowledgment and retransmission
//! - Multi-connection dispatcher with fixed slots
//! - Sans-IO core: link, timers and user are traits
//! - Optional Embassy scheduler and driver loop
//!
//! ## Example
//!
//! ```rust,ignore
//! use knx_transport::{ia, TransportConfig, TransportConnection};
//!
//! let mut conn = TransportConnection::new(TransportConfig::default());
//! conn.connect(&mut ctx, ia!(1, 1, 10))?;
//! conn.on_connect_confirm(&mut ctx, true);
//! conn.send_data(&mut ctx, 0x300, &[])?;
//! ```

// Macro modules (must be declared before use)
#[macro_use]
mod logging;
#[macro_use]
pub mod macros;

pub mod addressing;
pub mod configuration;
pub mod error;
pub mod net;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
#[doc(inline)]
pub use addressing::IndividualAddress;
#[doc(inline)]
pub use configuration::{TransportConfig, DEFAULT_CONFIG};
#[doc(inline)]
pub use error::{KnxError, Result};
#[doc(inline)]
pub use net::NetworkLink;
#[doc(inline)]
pub use protocol::{Apci, SequenceNumber, Tpdu, TransportControl};
#[doc(inline)]
pub use transport::{
    Action, ConnectionState, DisconnectReason, Notification, Observer, Scheduler, SendStatus,
    TimerKind, TimerToken, Transition, TransportConnection, TransportContext, TransportLayer,
    TransportUser,
};
