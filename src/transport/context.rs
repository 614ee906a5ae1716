//! Collaborators of a transport connection.
//!
//! Every entry point of the state machine takes one `&mut C` where
//! `C: TransportContext`: the network link for outbound frames, the timer
//! scheduler, the local user receiving notifications and an observer of the
//! processed transitions. A single value usually implements all four; the
//! blanket impl picks it up automatically.

use crate::addressing::IndividualAddress;
use crate::net::NetworkLink;
use crate::transport::event::{DisconnectReason, Transition};
use crate::transport::timer::Scheduler;

/// Local user of the connection-oriented service (management client,
/// application layer).
///
/// Exactly one terminal notification is delivered per connection attempt and
/// per teardown.
pub trait TransportUser {
    /// The connection to `peer` is open (passive accept or confirmed active open).
    fn on_connected(&mut self, peer: IndividualAddress);

    /// An active open towards `peer` did not complete.
    fn on_connect_failed(&mut self, peer: IndividualAddress, reason: DisconnectReason);

    /// In-sequence data from `peer`. Delivered once per sequence number.
    fn on_data_indication(&mut self, peer: IndividualAddress, apci: u16, payload: &[u8]);

    /// The peer acknowledged the last data request.
    fn on_data_confirmed(&mut self, peer: IndividualAddress);

    /// The last data request will never be acknowledged.
    fn on_data_failed(&mut self, peer: IndividualAddress);

    /// The open connection to `peer` ended.
    fn on_disconnected(&mut self, peer: IndividualAddress, reason: DisconnectReason);
}

/// Trace of processed transitions, for tests and diagnostics.
pub trait Observer {
    /// Called once per processed event, after its action ran.
    fn on_transition(&mut self, _peer: Option<IndividualAddress>, _transition: &Transition) {}
}

/// Everything a connection needs from its environment
pub trait TransportContext: NetworkLink + Scheduler + TransportUser + Observer {}

impl<T: NetworkLink + Scheduler + TransportUser + Observer + ?Sized> TransportContext for T {}
