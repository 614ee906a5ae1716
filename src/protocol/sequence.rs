//! 4-bit transport sequence numbers.
//!
//! Numbered TPDUs (`T_Data_Connected`, `T_ACK`, `T_NAK`) carry a sequence
//! number modulo 16. The receiver accepts exactly the expected number,
//! re-acknowledges the one just before it (the peer's retransmission of a
//! frame whose Ack was lost) and rejects everything else.

use core::fmt;

/// Sequence number modulo 16
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequenceNumber(u8);

/// How an inbound sequence number relates to the expected one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequenceCheck {
    /// The expected number: accept, acknowledge and advance
    InOrder,
    /// The previous number: a retransmission, acknowledge again without delivery
    Duplicate,
    /// Anything else: reject with `T_NAK`
    OutOfOrder,
}

impl SequenceNumber {
    /// Sequence numbers wrap after this many values
    pub const MODULUS: u8 = 16;

    /// Zero, the value both counters start at when a connection opens
    pub const ZERO: Self = Self(0);

    /// Create a sequence number, `None` if `value` is not below 16.
    pub const fn new(value: u8) -> Option<Self> {
        if value < Self::MODULUS {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Extract the sequence number from bits 5-2 of a TPCI octet.
    #[inline]
    pub const fn from_tpci(tpci: u8) -> Self {
        Self((tpci >> 2) & 0x0F)
    }

    /// The sequence number shifted into TPCI position.
    #[inline]
    pub const fn to_tpci_bits(self) -> u8 {
        self.0 << 2
    }

    /// Raw value (0-15)
    #[inline]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// The following number, wrapping 15 → 0.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self((self.0 + 1) % Self::MODULUS)
    }

    /// The preceding number, wrapping 0 → 15.
    #[inline]
    #[must_use]
    pub const fn previous(self) -> Self {
        Self((self.0 + Self::MODULUS - 1) % Self::MODULUS)
    }

    /// Advance in place.
    #[inline]
    pub fn increment(&mut self) {
        *self = self.next();
    }

    /// Classify `received` against `self` taken as the expected number.
    pub const fn classify(self, received: Self) -> SequenceCheck {
        if received.0 == self.0 {
            SequenceCheck::InOrder
        } else if received.0 == self.previous().0 {
            SequenceCheck::Duplicate
        } else {
            SequenceCheck::OutOfOrder
        }
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
