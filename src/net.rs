//! Boundary with the network layer.
//!
//! The transport state machine never touches a medium directly: encoded
//! TPDUs leave through a [`NetworkLink`] and inbound frames are handed back to
//! the connection by whoever owns the receiving side.

pub mod link;
#[cfg(any(test, feature = "std"))]
pub mod mock_link;

pub use link::NetworkLink;
