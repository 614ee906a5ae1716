//! KNX addressing.
//!
//! Transport connections are established between individual addresses
//! (Area.Line.Device), the physical identity of a device on the bus.

pub mod individual;

pub use individual::IndividualAddress;
