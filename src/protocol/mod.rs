//! KNX transport layer protocol definitions.
//!
//! This module contains the wire-level pieces of the transport layer:
//! TPCI constants, the APCI service catalogue, 4-bit sequence numbers and
//! the TPDU codec.

pub mod apci;
pub mod constants;
pub mod sequence;
pub mod tpdu;

pub use apci::Apci;
pub use constants::*;
pub use sequence::{SequenceCheck, SequenceNumber};
pub use tpdu::{Destination, Frame, Payload, Tpdu, TransportControl};
