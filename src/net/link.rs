//! Network link abstraction.
//!
//! Outbound TPDUs are handed to the link fire-and-forget: any delivery
//! confirmation from the peer comes back later as an inbound `T_ACK`/`T_NAK`.
//!
//! ## Example
//!
//! ```rust
//! use knx_transport::net::NetworkLink;
//! use knx_transport::{IndividualAddress, Result};
//!
//! struct Loopback {
//!     last: Option<(IndividualAddress, [u8; 2])>,
//! }
//!
//! impl NetworkLink for Loopback {
//!     fn send(&mut self, destination: IndividualAddress, tpdu: &[u8]) -> Result<()> {
//!         let mut head = [0u8; 2];
//!         let n = tpdu.len().min(2);
//!         head[..n].copy_from_slice(&tpdu[..n]);
//!         self.last = Some((destination, head));
//!         Ok(())
//!     }
//! }
//! ```

use crate::addressing::IndividualAddress;
use crate::error::Result;

/// Network layer service used by the transport layer.
///
/// Implementations wrap whatever actually moves frames between individual
/// addresses, such as a TP1 transceiver or a cEMI tunnel.
pub trait NetworkLink {
    /// Hand an encoded TPDU addressed to `destination` to the medium.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the frame could not be queued. The state
    /// machine logs the failure and relies on its timers to recover.
    fn send(&mut self, destination: IndividualAddress, tpdu: &[u8]) -> Result<()>;

    /// Check if the link is currently able to transmit.
    ///
    /// Default implementation returns `true`.
    fn is_ready(&self) -> bool {
        true
    }
}

impl<T: NetworkLink + ?Sized> NetworkLink for &mut T {
    fn send(&mut self, destination: IndividualAddress, tpdu: &[u8]) -> Result<()> {
        (**self).send(destination, tpdu)
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}
