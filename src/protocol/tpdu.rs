//! Transport Protocol Data Unit codec.
//!
//! A TPDU is the TPCI octet, optionally followed by the low APCI octet and the
//! application payload:
//!
//! ```text
//! Control TPDU:   ┌──────┐
//!                 │ TPCI │
//!                 └──────┘
//! Data TPDU:      ┌──────────────┬──────────┬─────────────┐
//!                 │ TPCI | APCI↑ │ APCI low │ payload ... │
//!                 └──────────────┴──────────┴─────────────┘
//! ```
//!
//! Construction never fails loudly: an out-of-range APCI or an oversized
//! payload produces [`TransportControl::Invalid`], which refuses to encode.
//! Decoding is equally total and maps every malformed buffer to `Invalid`.

use crate::error::{KnxError, Result};
use crate::protocol::apci::Apci;
use crate::protocol::constants::{
    CONTROL_HEADER_SIZE, DATA_HEADER_SIZE, MAX_APCI, MAX_PAYLOAD_SIZE, MAX_TPDU_SIZE, TPCI_ACK,
    TPCI_CONNECT, TPCI_DISCONNECT, TPCI_NAK, TPCI_NUMBERED_DATA, TPCI_SEQUENCE_MASK,
    TPCI_TAG_GROUP, TPCI_TYPE_MASK, TPCI_UNNUMBERED_DATA,
};
use crate::protocol::sequence::SequenceNumber;
use core::fmt;
use heapless::Vec;

/// Payload storage of a data TPDU
pub type Payload = Vec<u8, MAX_PAYLOAD_SIZE>;

/// An encoded TPDU
pub type Frame = Vec<u8, MAX_TPDU_SIZE>;

/// Transport control discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportControl {
    /// `T_Connect`
    Connect,
    /// `T_Disconnect`
    Disconnect,
    /// `T_ACK` for the given sequence number
    Ack(SequenceNumber),
    /// `T_NAK` for the given sequence number
    Nak(SequenceNumber),
    /// `T_Data_Connected`, numbered
    DataConnected(SequenceNumber),
    /// `T_Data_Individual`, connectionless point-to-point
    DataIndividual,
    /// `T_Data_Broadcast` / `T_Data_SystemBroadcast`
    DataBroadcast,
    /// `T_Data_Group`
    DataGroup,
    /// `T_Data_Tag_Group`
    DataTagGroup,
    /// Malformed or unconstructible TPDU
    Invalid,
}

impl TransportControl {
    /// Whether the TPDU carries an APCI and payload.
    pub const fn is_data(self) -> bool {
        matches!(
            self,
            Self::DataConnected(_)
                | Self::DataIndividual
                | Self::DataBroadcast
                | Self::DataGroup
                | Self::DataTagGroup
        )
    }

    /// Whether the TPDU belongs to the connection-oriented service.
    pub const fn is_connection_oriented(self) -> bool {
        matches!(
            self,
            Self::Connect | Self::Disconnect | Self::Ack(_) | Self::Nak(_) | Self::DataConnected(_)
        )
    }

    /// The sequence number of numbered TPDUs.
    pub const fn sequence(self) -> Option<SequenceNumber> {
        match self {
            Self::Ack(seq) | Self::Nak(seq) | Self::DataConnected(seq) => Some(seq),
            _ => None,
        }
    }

    /// The TPCI octet, without APCI bits. `None` for `Invalid`.
    pub const fn tpci(self) -> Option<u8> {
        let octet = match self {
            Self::Connect => TPCI_CONNECT,
            Self::Disconnect => TPCI_DISCONNECT,
            Self::Ack(seq) => TPCI_ACK | seq.to_tpci_bits(),
            Self::Nak(seq) => TPCI_NAK | seq.to_tpci_bits(),
            Self::DataConnected(seq) => TPCI_NUMBERED_DATA | seq.to_tpci_bits(),
            Self::DataIndividual | Self::DataBroadcast | Self::DataGroup => TPCI_UNNUMBERED_DATA,
            Self::DataTagGroup => TPCI_TAG_GROUP,
            Self::Invalid => return None,
        };
        Some(octet)
    }
}

impl fmt::Display for TransportControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => f.write_str("T_Connect"),
            Self::Disconnect => f.write_str("T_Disconnect"),
            Self::Ack(seq) => write!(f, "T_ACK({seq})"),
            Self::Nak(seq) => write!(f, "T_NAK({seq})"),
            Self::DataConnected(seq) => write!(f, "T_Data_Connected({seq})"),
            Self::DataIndividual => f.write_str("T_Data_Individual"),
            Self::DataBroadcast => f.write_str("T_Data_Broadcast"),
            Self::DataGroup => f.write_str("T_Data_Group"),
            Self::DataTagGroup => f.write_str("T_Data_Tag_Group"),
            Self::Invalid => f.write_str("Invalid"),
        }
    }
}

/// Kind of destination address a frame was sent to.
///
/// Unnumbered data TPDUs share the TPCI value `0x00`; only the link layer's
/// destination (individual, group or the broadcast group 0/0/0) tells them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Destination {
    /// Individual address
    #[default]
    Individual,
    /// Group address other than 0/0/0
    Group,
    /// Broadcast (group address 0/0/0)
    Broadcast,
}

/// Transport Protocol Data Unit
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Tpdu {
    control: TransportControl,
    application_control: Option<u16>,
    payload: Payload,
}

impl Tpdu {
    /// The invalid sentinel
    pub const fn invalid() -> Self {
        Self {
            control: TransportControl::Invalid,
            application_control: None,
            payload: Vec::new(),
        }
    }

    const fn control_only(control: TransportControl) -> Self {
        Self {
            control,
            application_control: None,
            payload: Vec::new(),
        }
    }

    /// `T_Connect`
    pub const fn connect() -> Self {
        Self::control_only(TransportControl::Connect)
    }

    /// `T_Disconnect`
    pub const fn disconnect() -> Self {
        Self::control_only(TransportControl::Disconnect)
    }

    /// `T_ACK` for `sequence`
    pub const fn ack(sequence: SequenceNumber) -> Self {
        Self::control_only(TransportControl::Ack(sequence))
    }

    /// `T_NAK` for `sequence`
    pub const fn nak(sequence: SequenceNumber) -> Self {
        Self::control_only(TransportControl::Nak(sequence))
    }

    /// `T_Data_Connected` carrying `application_control` and `payload`.
    ///
    /// Returns [`Tpdu::invalid`] if the APCI exceeds 10 bits or the payload
    /// exceeds [`MAX_PAYLOAD_SIZE`].
    pub fn data_connected(sequence: SequenceNumber, application_control: u16, payload: &[u8]) -> Self {
        Self::data(TransportControl::DataConnected(sequence), application_control, payload)
    }

    /// `T_Data_Individual`
    pub fn data_individual(application_control: u16, payload: &[u8]) -> Self {
        Self::data(TransportControl::DataIndividual, application_control, payload)
    }

    /// `T_Data_Group`
    pub fn data_group(application_control: u16, payload: &[u8]) -> Self {
        Self::data(TransportControl::DataGroup, application_control, payload)
    }

    /// `T_Data_Broadcast`
    pub fn data_broadcast(application_control: u16, payload: &[u8]) -> Self {
        Self::data(TransportControl::DataBroadcast, application_control, payload)
    }

    /// `T_Data_Tag_Group`
    pub fn data_tag_group(application_control: u16, payload: &[u8]) -> Self {
        Self::data(TransportControl::DataTagGroup, application_control, payload)
    }

    fn data(control: TransportControl, application_control: u16, payload: &[u8]) -> Self {
        if application_control > MAX_APCI {
            return Self::invalid();
        }
        match Vec::from_slice(payload) {
            Ok(payload) => Self {
                control,
                application_control: Some(application_control),
                payload,
            },
            Err(_overflow) => Self::invalid(),
        }
    }

    /// Decode an individually addressed TPDU.
    #[inline]
    pub fn decode(bytes: &[u8]) -> Self {
        Self::decode_for(bytes, Destination::Individual)
    }

    /// Decode a TPDU received on a destination of kind `destination`.
    ///
    /// Never fails: anything malformed decodes to [`Tpdu::invalid`].
    pub fn decode_for(bytes: &[u8], destination: Destination) -> Self {
        let Some(&tpci) = bytes.first() else {
            return Self::invalid();
        };

        if tpci & 0x80 != 0 {
            // Control TPDUs carry nothing after the TPCI
            if bytes.len() != CONTROL_HEADER_SIZE || destination != Destination::Individual {
                return Self::invalid();
            }
            let sequence = SequenceNumber::from_tpci(tpci);
            let control = match tpci {
                TPCI_CONNECT => TransportControl::Connect,
                TPCI_DISCONNECT => TransportControl::Disconnect,
                _ if tpci & !TPCI_SEQUENCE_MASK == TPCI_ACK => TransportControl::Ack(sequence),
                _ if tpci & !TPCI_SEQUENCE_MASK == TPCI_NAK => TransportControl::Nak(sequence),
                _ => return Self::invalid(),
            };
            return Self::control_only(control);
        }

        if bytes.len() < DATA_HEADER_SIZE {
            return Self::invalid();
        }

        let application_control = (u16::from(tpci & 0x03) << 8) | u16::from(bytes[1]);
        let sequence_bits = tpci & TPCI_SEQUENCE_MASK;

        let control = if tpci & TPCI_TYPE_MASK == TPCI_NUMBERED_DATA {
            if destination != Destination::Individual {
                return Self::invalid();
            }
            TransportControl::DataConnected(SequenceNumber::from_tpci(tpci))
        } else {
            match (destination, sequence_bits) {
                (Destination::Individual, TPCI_UNNUMBERED_DATA) => TransportControl::DataIndividual,
                (Destination::Broadcast, TPCI_UNNUMBERED_DATA) => TransportControl::DataBroadcast,
                (Destination::Group, TPCI_UNNUMBERED_DATA) => TransportControl::DataGroup,
                (Destination::Group, TPCI_TAG_GROUP) => TransportControl::DataTagGroup,
                _ => return Self::invalid(),
            }
        };

        Self::data(control, application_control, &bytes[DATA_HEADER_SIZE..])
    }

    /// The transport control field
    #[inline]
    pub const fn control(&self) -> TransportControl {
        self.control
    }

    /// The 10-bit application control field, data TPDUs only
    #[inline]
    pub const fn application_control(&self) -> Option<u16> {
        self.application_control
    }

    /// The application service of a data TPDU
    pub fn apci(&self) -> Option<Apci> {
        self.application_control.map(Apci::from_raw)
    }

    /// Payload following the APCI octet (empty for control TPDUs)
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Sequence number of numbered TPDUs
    #[inline]
    pub const fn sequence(&self) -> Option<SequenceNumber> {
        self.control.sequence()
    }

    /// Well-formedness: not `Invalid`, and data TPDUs carry an in-range APCI.
    pub fn is_valid(&self) -> bool {
        match self.control {
            TransportControl::Invalid => false,
            control if control.is_data() => {
                matches!(self.application_control, Some(apci) if apci <= MAX_APCI)
            }
            _ => true,
        }
    }

    /// Size of the encoded TPDU
    pub fn encoded_len(&self) -> usize {
        if self.control.is_data() {
            DATA_HEADER_SIZE + self.payload.len()
        } else {
            CONTROL_HEADER_SIZE
        }
    }

    /// Encode into `buf`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// - `InvalidFrame` if the TPDU is not well-formed
    /// - `BufferTooSmall` if `buf` cannot hold [`Tpdu::encoded_len`] bytes
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if !self.is_valid() {
            return Err(KnxError::invalid_frame());
        }
        let tpci = self.control.tpci().ok_or_else(KnxError::invalid_frame)?;
        let len = self.encoded_len();
        if buf.len() < len {
            return Err(KnxError::buffer_too_small());
        }

        match self.application_control {
            Some(apci) if self.control.is_data() => {
                buf[0] = tpci | ((apci >> 8) as u8 & 0x03);
                buf[1] = apci as u8;
                buf[DATA_HEADER_SIZE..len].copy_from_slice(&self.payload);
            }
            _ => buf[0] = tpci,
        }

        Ok(len)
    }

    /// Encode into an owned fixed-capacity frame.
    ///
    /// # Errors
    ///
    /// `InvalidFrame` if the TPDU is not well-formed.
    pub fn to_frame(&self) -> Result<Frame> {
        let mut buf = [0u8; MAX_TPDU_SIZE];
        let len = self.encode(&mut buf)?;
        Vec::from_slice(&buf[..len]).map_err(|_overflow| KnxError::buffer_too_small())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(value: u8) -> SequenceNumber {
        SequenceNumber::new(value).unwrap()
    }

    fn encode(tpdu: &Tpdu) -> std::vec::Vec<u8> {
        tpdu.to_frame().unwrap().to_vec()
    }

    #[test]
    fn test_control_octets() {
        assert_eq!(encode(&Tpdu::connect()), [0x80]);
        assert_eq!(encode(&Tpdu::disconnect()), [0x81]);
        assert_eq!(encode(&Tpdu::ack(seq(0))), [0xC2]);
        assert_eq!(encode(&Tpdu::ack(seq(15))), [0xFE]);
        assert_eq!(encode(&Tpdu::nak(seq(3))), [0xCF]);
    }

    #[test]
    fn test_data_connected_layout() {
        // MemoryRead (0x200) with count 4, seq 1, address 0x0060
        let tpdu = Tpdu::data_connected(seq(1), 0x204, &[0x00, 0x60]);
        assert_eq!(encode(&tpdu), [0x46, 0x04, 0x00, 0x60]);
        assert_eq!(tpdu.apci(), Some(Apci::MemoryRead));

        // DeviceDescriptorRead type 0, seq 0
        let tpdu = Tpdu::data_connected(seq(0), 0x300, &[]);
        assert_eq!(encode(&tpdu), [0x43, 0x00]);
    }

    #[test]
    fn test_decode_round_trip() {
        for tpdu in [
            Tpdu::connect(),
            Tpdu::disconnect(),
            Tpdu::ack(seq(7)),
            Tpdu::nak(seq(9)),
            Tpdu::data_connected(seq(12), 0x3D5, &[0x00, 0x0B, 0x10, 0x01]),
            Tpdu::data_individual(0x100, &[]),
        ] {
            assert_eq!(Tpdu::decode(&encode(&tpdu)), tpdu);
        }
    }

    #[test]
    fn test_decode_for_destination() {
        let bytes = [0x00, 0x81];
        assert_eq!(
            Tpdu::decode_for(&bytes, Destination::Group).control(),
            TransportControl::DataGroup
        );
        assert_eq!(
            Tpdu::decode_for(&bytes, Destination::Broadcast).control(),
            TransportControl::DataBroadcast
        );
        assert_eq!(
            Tpdu::decode_for(&[0x04, 0x80], Destination::Group).control(),
            TransportControl::DataTagGroup
        );
        // Tag bit on an individually addressed frame
        assert!(!Tpdu::decode(&[0x04, 0x80]).is_valid());
        // Numbered data on a group address
        assert!(!Tpdu::decode_for(&[0x40, 0x80], Destination::Group).is_valid());
    }

    #[test]
    fn test_decode_malformed() {
        assert!(!Tpdu::decode(&[]).is_valid());
        // Data TPCI without APCI octet
        assert!(!Tpdu::decode(&[0x42]).is_valid());
        // Control TPDU with trailing bytes
        assert!(!Tpdu::decode(&[0x80, 0x00]).is_valid());
        // Reserved control codes
        assert!(!Tpdu::decode(&[0x82]).is_valid());
        assert!(!Tpdu::decode(&[0xC0]).is_valid());
    }

    #[test]
    fn test_oversized_payload_is_invalid() {
        let payload = [0u8; MAX_PAYLOAD_SIZE + 1];
        let tpdu = Tpdu::data_connected(seq(0), 0x280, &payload);
        assert!(!tpdu.is_valid());
        assert!(tpdu.to_frame().is_err());

        let max = [0xAA; MAX_PAYLOAD_SIZE];
        let tpdu = Tpdu::data_connected(seq(0), 0x280, &max);
        assert_eq!(tpdu.to_frame().unwrap().len(), MAX_TPDU_SIZE);

        let mut long = std::vec![0x42, 0x80];
        long.extend_from_slice(&payload);
        assert!(!Tpdu::decode(&long).is_valid());
    }

    #[test]
    fn test_apci_out_of_range_is_invalid() {
        assert!(!Tpdu::data_connected(seq(0), 0x400, &[]).is_valid());
        assert!(Tpdu::data_connected(seq(0), 0x3FF, &[]).is_valid());
    }

    #[test]
    fn test_encode_buffer_too_small() {
        let tpdu = Tpdu::data_connected(seq(0), 0x280, &[1, 2, 3]);
        let mut buf = [0u8; 4];
        match tpdu.encode(&mut buf) {
            Err(KnxError::Transport(e)) => assert!(e.is_buffer_too_small()),
            other => panic!("unexpected {other:?}"),
        }
        let mut buf = [0u8; 5];
        assert_eq!(tpdu.encode(&mut buf).unwrap(), 5);
    }
}
