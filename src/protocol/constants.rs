//! Transport layer protocol constants.
//!
//! TPCI octet layout (first octet of every TPDU):
//!
//! ```text
//!   7   6   5   4   3   2   1   0
//! ┌───┬───┬───────────────┬───────┐
//! │ C │ N │  Sequence No  │  x x  │
//! └───┴───┴───────────────┴───────┘
//!  C = control (1) / data (0)
//!  N = numbered (1) / unnumbered (0)
//!  x = APCI bits 9-8 for data, control code for control TPDUs
//! ```

use core::time::Duration;

/// Mask selecting the control/numbered flags of the TPCI octet
pub const TPCI_TYPE_MASK: u8 = 0xC0;

/// Mask selecting the 4-bit sequence number of the TPCI octet
pub const TPCI_SEQUENCE_MASK: u8 = 0x3C;

/// Shift of the sequence number inside the TPCI octet
pub const TPCI_SEQUENCE_SHIFT: u8 = 2;

/// Unnumbered data (T_Data_Individual / Group / Broadcast)
pub const TPCI_UNNUMBERED_DATA: u8 = 0x00;

/// Unnumbered data with the tag bit set (T_Data_Tag_Group)
pub const TPCI_TAG_GROUP: u8 = 0x04;

/// Numbered data (T_Data_Connected), sequence in bits 5-2
pub const TPCI_NUMBERED_DATA: u8 = 0x40;

/// Unnumbered control: T_Connect
pub const TPCI_CONNECT: u8 = 0x80;

/// Unnumbered control: T_Disconnect
pub const TPCI_DISCONNECT: u8 = 0x81;

/// Numbered control: T_ACK, sequence in bits 5-2
pub const TPCI_ACK: u8 = 0xC2;

/// Numbered control: T_NAK, sequence in bits 5-2
pub const TPCI_NAK: u8 = 0xC3;

/// Largest application control value (10 bits)
pub const MAX_APCI: u16 = 0x03FF;

/// Header of a data TPDU: TPCI octet plus the low APCI octet
pub const DATA_HEADER_SIZE: usize = 2;

/// Header of a control TPDU: the TPCI octet alone
pub const CONTROL_HEADER_SIZE: usize = 1;

/// Largest APDU length (octets after the TPCI) of an extended frame
pub const MAX_APDU_LENGTH: u8 = 255;

/// Largest APDU length of a standard frame
pub const STANDARD_APDU_LENGTH: u8 = 15;

/// Absolute transport-level bound on the payload following the APCI
pub const MAX_PAYLOAD_SIZE: usize = MAX_APDU_LENGTH as usize - 1;

/// Largest encoded TPDU
pub const MAX_TPDU_SIZE: usize = DATA_HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// Connection liveness timeout of the reference behaviour
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(6);

/// Acknowledgment timeout of the reference behaviour
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(3);

/// Retransmissions allowed for one numbered data TPDU
pub const DEFAULT_MAX_REPETITIONS: u8 = 3;
