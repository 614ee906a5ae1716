//! APCI (Application Layer Protocol Control Information) catalogue.
//!
//! The transport layer does not interpret the application control field of a
//! data TPDU; it only carries and size-checks it. This module names the
//! services exchanged over a transport connection so higher layers (and logs)
//! can classify a raw 10-bit field, and it knows how many fixed header octets
//! each service puts in front of its data.
//!
//! The 10-bit APCI spans two octets:
//!
//! ```text
//!  TPCI octet        APCI octet
//! ┌──────────┬───┐  ┌─────┬──────────────┐
//! │   TPCI   │9 8│  │ 7 6 │ 5  4  3 2 1 0│
//! └──────────┴───┘  └─────┴──────────────┘
//!                          └ data (4-bit services) or
//!                            code bits (10-bit services)
//! ```

use crate::protocol::constants::MAX_APCI;

/// Connection-oriented application services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Apci {
    /// Group Value Read (`A_GroupValue_Read`)
    GroupValueRead,
    /// Group Value Response (`A_GroupValue_Response`)
    GroupValueResponse,
    /// Group Value Write (`A_GroupValue_Write`)
    GroupValueWrite,
    /// Individual Address Write
    IndividualAddressWrite,
    /// Individual Address Read
    IndividualAddressRead,
    /// Individual Address Response
    IndividualAddressResponse,
    /// ADC Read
    AdcRead,
    /// ADC Response
    AdcResponse,
    /// Memory Read (count in the low APCI bits)
    MemoryRead,
    /// Memory Response
    MemoryResponse,
    /// Memory Write
    MemoryWrite,
    /// User Memory Read
    UserMemoryRead,
    /// User Memory Response
    UserMemoryResponse,
    /// User Memory Write
    UserMemoryWrite,
    /// User Manufacturer Info Read
    UserManufacturerInfoRead,
    /// User Manufacturer Info Response
    UserManufacturerInfoResponse,
    /// Device Descriptor Read (descriptor type in the low APCI bits)
    DeviceDescriptorRead,
    /// Device Descriptor Response
    DeviceDescriptorResponse,
    /// Restart
    Restart,
    /// Authorize Request
    AuthorizeRequest,
    /// Authorize Response
    AuthorizeResponse,
    /// Key Write
    KeyWrite,
    /// Key Response
    KeyResponse,
    /// Property Value Read
    PropertyValueRead,
    /// Property Value Response
    PropertyValueResponse,
    /// Property Value Write
    PropertyValueWrite,
    /// Property Description Read
    PropertyDescriptionRead,
    /// Property Description Response
    PropertyDescriptionResponse,
    /// Unknown/Unsupported APCI
    Unknown(u16),
}

impl Apci {
    /// Classify a raw 10-bit application control field.
    ///
    /// 4-bit services ignore the six data bits; the user-memory and
    /// management ranges (`0x2C0..=0x2FF`, `0x3C0..=0x3FF`) use all ten.
    pub const fn from_raw(raw: u16) -> Self {
        let raw = raw & MAX_APCI;
        let high = raw & 0x3C0;

        if high == 0x2C0 || high == 0x3C0 {
            return match raw {
                0x2C0 => Self::UserMemoryRead,
                0x2C1 => Self::UserMemoryResponse,
                0x2C2 => Self::UserMemoryWrite,
                0x2C5 => Self::UserManufacturerInfoRead,
                0x2C6 => Self::UserManufacturerInfoResponse,
                0x3D1 => Self::AuthorizeRequest,
                0x3D2 => Self::AuthorizeResponse,
                0x3D3 => Self::KeyWrite,
                0x3D4 => Self::KeyResponse,
                0x3D5 => Self::PropertyValueRead,
                0x3D6 => Self::PropertyValueResponse,
                0x3D7 => Self::PropertyValueWrite,
                0x3D8 => Self::PropertyDescriptionRead,
                0x3D9 => Self::PropertyDescriptionResponse,
                _ => Self::Unknown(raw),
            };
        }

        match high {
            0x000 => Self::GroupValueRead,
            0x040 => Self::GroupValueResponse,
            0x080 => Self::GroupValueWrite,
            0x0C0 => Self::IndividualAddressWrite,
            0x100 => Self::IndividualAddressRead,
            0x140 => Self::IndividualAddressResponse,
            0x180 => Self::AdcRead,
            0x1C0 => Self::AdcResponse,
            0x200 => Self::MemoryRead,
            0x240 => Self::MemoryResponse,
            0x280 => Self::MemoryWrite,
            0x300 => Self::DeviceDescriptorRead,
            0x340 => Self::DeviceDescriptorResponse,
            0x380 => Self::Restart,
            _ => Self::Unknown(raw),
        }
    }

    /// The service code with all data bits cleared.
    pub const fn to_raw(self) -> u16 {
        match self {
            Self::GroupValueRead => 0x000,
            Self::GroupValueResponse => 0x040,
            Self::GroupValueWrite => 0x080,
            Self::IndividualAddressWrite => 0x0C0,
            Self::IndividualAddressRead => 0x100,
            Self::IndividualAddressResponse => 0x140,
            Self::AdcRead => 0x180,
            Self::AdcResponse => 0x1C0,
            Self::MemoryRead => 0x200,
            Self::MemoryResponse => 0x240,
            Self::MemoryWrite => 0x280,
            Self::UserMemoryRead => 0x2C0,
            Self::UserMemoryResponse => 0x2C1,
            Self::UserMemoryWrite => 0x2C2,
            Self::UserManufacturerInfoRead => 0x2C5,
            Self::UserManufacturerInfoResponse => 0x2C6,
            Self::DeviceDescriptorRead => 0x300,
            Self::DeviceDescriptorResponse => 0x340,
            Self::Restart => 0x380,
            Self::AuthorizeRequest => 0x3D1,
            Self::AuthorizeResponse => 0x3D2,
            Self::KeyWrite => 0x3D3,
            Self::KeyResponse => 0x3D4,
            Self::PropertyValueRead => 0x3D5,
            Self::PropertyValueResponse => 0x3D6,
            Self::PropertyValueWrite => 0x3D7,
            Self::PropertyDescriptionRead => 0x3D8,
            Self::PropertyDescriptionResponse => 0x3D9,
            Self::Unknown(val) => val,
        }
    }

    /// Whether the low six bits of the APCI octet carry data.
    pub const fn has_short_data(self) -> bool {
        let raw = self.to_raw();
        !matches!(raw & 0x3C0, 0x2C0 | 0x3C0)
    }

    /// Fixed octets the service places in the payload before its data.
    ///
    /// Memory services carry a 2-octet address, user memory adds an
    /// extension/count octet, property services carry object index,
    /// property id and a 2-octet count/start field.
    pub const fn header_length(self) -> usize {
        match self {
            Self::AdcRead => 1,
            Self::MemoryRead | Self::MemoryResponse | Self::MemoryWrite => 2,
            Self::AdcResponse
            | Self::UserMemoryRead
            | Self::UserMemoryResponse
            | Self::UserMemoryWrite
            | Self::PropertyDescriptionRead => 3,
            Self::PropertyValueRead | Self::PropertyValueResponse | Self::PropertyValueWrite => 4,
            Self::AuthorizeRequest | Self::KeyWrite => 5,
            Self::AuthorizeResponse | Self::KeyResponse => 1,
            Self::PropertyDescriptionResponse => 7,
            _ => 0,
        }
    }

    /// Largest data block the service can carry in an APDU of
    /// `max_apdu_length` octets (the octets following the TPCI).
    ///
    /// Returns 0 when the APDU cannot even hold the service header.
    pub const fn max_data_length(self, max_apdu_length: u8) -> usize {
        // The APCI octet itself is part of the APDU length.
        (max_apdu_length as usize).saturating_sub(1 + self.header_length())
    }
}

impl From<u16> for Apci {
    fn from(raw: u16) -> Self {
        Self::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{MAX_APDU_LENGTH, STANDARD_APDU_LENGTH};

    #[test]
    fn test_short_services_ignore_data_bits() {
        // MemoryRead with count 4 in the low bits
        assert_eq!(Apci::from_raw(0x204), Apci::MemoryRead);
        // DeviceDescriptorRead, descriptor type 0
        assert_eq!(Apci::from_raw(0x300), Apci::DeviceDescriptorRead);
        assert_eq!(Apci::from_raw(0x081), Apci::GroupValueWrite);
        assert!(Apci::MemoryRead.has_short_data());
    }

    #[test]
    fn test_extended_services() {
        assert_eq!(Apci::from_raw(0x3D5), Apci::PropertyValueRead);
        assert_eq!(Apci::from_raw(0x3D7), Apci::PropertyValueWrite);
        assert_eq!(Apci::from_raw(0x2C1), Apci::UserMemoryResponse);
        assert_eq!(Apci::from_raw(0x3DF), Apci::Unknown(0x3DF));
        assert!(!Apci::PropertyValueRead.has_short_data());
    }

    #[test]
    fn test_raw_codes() {
        for apci in [
            Apci::MemoryWrite,
            Apci::Restart,
            Apci::KeyWrite,
            Apci::PropertyDescriptionResponse,
            Apci::UserManufacturerInfoRead,
        ] {
            assert_eq!(Apci::from_raw(apci.to_raw()), apci);
        }
    }

    #[test]
    fn test_max_data_length() {
        // Standard frame: 15 octets after TPCI, minus APCI octet, minus address
        assert_eq!(Apci::MemoryWrite.max_data_length(STANDARD_APDU_LENGTH), 12);
        assert_eq!(Apci::PropertyValueWrite.max_data_length(STANDARD_APDU_LENGTH), 10);
        assert_eq!(Apci::Restart.max_data_length(MAX_APDU_LENGTH), 254);
        assert_eq!(Apci::PropertyDescriptionResponse.max_data_length(4), 0);
    }
}
