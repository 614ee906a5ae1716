//! KNX Individual Address.
//!
//! The individual address is the identity of a transport connection endpoint:
//! every connection-oriented TPDU is exchanged between two of them.
//!
//! ```text
//!  15    12 11     8 7              0
//! ┌────────┬────────┬────────────────┐
//! │  Area  │  Line  │     Device     │
//! └────────┴────────┴────────────────┘
//! ```

use crate::error::{KnxError, Result};
use core::fmt;

/// KNX Individual Address (Area.Line.Device)
///
/// # Examples
///
/// ```
/// use knx_transport::IndividualAddress;
///
/// let addr = IndividualAddress::new(1, 1, 5).unwrap();
/// assert_eq!(addr.raw(), 0x1105);
///
/// let parsed: IndividualAddress = "1.1.5".parse().unwrap();
/// assert_eq!(parsed, addr);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndividualAddress {
    raw: u16,
}

impl IndividualAddress {
    /// Maximum area value (4 bits)
    pub const MAX_AREA: u8 = 15;
    /// Maximum line value (4 bits)
    pub const MAX_LINE: u8 = 15;

    /// Create an address from its components.
    ///
    /// # Errors
    ///
    /// Returns an out-of-range addressing error if `area` or `line` exceed 15.
    pub fn new(area: u8, line: u8, device: u8) -> Result<Self> {
        if area > Self::MAX_AREA || line > Self::MAX_LINE {
            return Err(KnxError::address_out_of_range());
        }
        Ok(Self::from_raw(
            (u16::from(area) << 12) | (u16::from(line) << 8) | u16::from(device),
        ))
    }

    /// Create an address from its 16-bit bus representation.
    #[inline(always)]
    pub const fn from_raw(raw: u16) -> Self {
        Self { raw }
    }

    /// The 16-bit bus representation.
    #[inline(always)]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Area component (0-15).
    #[inline(always)]
    pub const fn area(self) -> u8 {
        (self.raw >> 12) as u8 & 0x0F
    }

    /// Line component (0-15).
    #[inline(always)]
    pub const fn line(self) -> u8 {
        (self.raw >> 8) as u8 & 0x0F
    }

    /// Device component (0-255).
    #[inline(always)]
    pub const fn device(self) -> u8 {
        self.raw as u8
    }

    /// Big-endian wire bytes.
    #[inline]
    pub const fn to_bytes(self) -> [u8; 2] {
        self.raw.to_be_bytes()
    }
}

impl fmt::Display for IndividualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area(), self.line(), self.device())
    }
}

impl From<u16> for IndividualAddress {
    #[inline(always)]
    fn from(raw: u16) -> Self {
        Self::from_raw(raw)
    }
}

impl From<IndividualAddress> for u16 {
    #[inline(always)]
    fn from(addr: IndividualAddress) -> u16 {
        addr.raw
    }
}

impl core::str::FromStr for IndividualAddress {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('.').map(str::parse::<u8>);
        let mut next = || {
            parts
                .next()
                .and_then(core::result::Result::ok)
                .ok_or_else(KnxError::invalid_individual_address)
        };

        let area = next()?;
        let line = next()?;
        let device = next()?;

        if parts.next().is_some() {
            return Err(KnxError::invalid_individual_address());
        }

        Self::new(area, line, device)
    }
}
