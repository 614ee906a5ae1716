//! In-memory link and context for testing.
//!
//! [`MockLink`] records every frame handed to it and can be told to fail.
//! [`RecordingContext`] wraps one and additionally records timer requests,
//! user notifications and transitions, so a test can drive a connection with
//! nothing else.
//!
//! ```rust,ignore
//! use knx_transport::net::mock_link::RecordingContext;
//! use knx_transport::{ia, ConnectionState, TransportConfig, TransportConnection};
//!
//! let mut ctx = RecordingContext::new();
//! let mut conn = TransportConnection::new(TransportConfig::default());
//!
//! conn.on_frame_received(&mut ctx, ia!(1, 1, 5), &[0x80]);
//! assert_eq!(conn.state(), ConnectionState::OpenIdle);
//! ```

use crate::addressing::IndividualAddress;
use crate::error::{KnxError, Result};
use crate::net::link::NetworkLink;
use crate::transport::context::{Observer, TransportUser};
use crate::transport::event::{Action, DisconnectReason, Notification, Transition};
use crate::transport::timer::{Scheduler, TimerKind, TimerToken};
use core::time::Duration;

/// Link that records outbound frames instead of sending them.
#[derive(Debug)]
pub struct MockLink {
    sent: Vec<(IndividualAddress, Vec<u8>)>,
    fail: bool,
    ready: bool,
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLink {
    /// Create a ready link with nothing sent.
    pub fn new() -> Self {
        Self {
            sent: Vec::new(),
            fail: false,
            ready: true,
        }
    }

    /// All frames sent so far, with their destination.
    pub fn sent_frames(&self) -> &[(IndividualAddress, Vec<u8>)] {
        &self.sent
    }

    /// The last frame sent, if any.
    pub fn last_sent(&self) -> Option<&(IndividualAddress, Vec<u8>)> {
        self.sent.last()
    }

    /// Drain the recorded frames.
    pub fn take_sent(&mut self) -> Vec<(IndividualAddress, Vec<u8>)> {
        core::mem::take(&mut self.sent)
    }

    /// Make subsequent sends fail with a transport error.
    pub fn set_fail(&mut self, fail: bool) {
        self.fail = fail;
    }

    /// Simulate a link that is (not) able to transmit.
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }
}

impl NetworkLink for MockLink {
    fn send(&mut self, destination: IndividualAddress, tpdu: &[u8]) -> Result<()> {
        if self.fail {
            return Err(KnxError::send_failed());
        }
        self.sent.push((destination, tpdu.to_vec()));
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

/// A complete transport context that records everything.
#[derive(Debug, Default)]
pub struct RecordingContext {
    /// Outbound frames
    pub link: MockLink,
    armed: Vec<(TimerToken, Duration)>,
    cancelled: Vec<TimerToken>,
    notifications: Vec<Notification>,
    transitions: Vec<(Option<IndividualAddress>, Transition)>,
}

impl RecordingContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames sent so far
    pub fn sent(&self) -> &[(IndividualAddress, Vec<u8>)] {
        self.link.sent_frames()
    }

    /// Drain the frames sent so far
    pub fn take_sent(&mut self) -> Vec<(IndividualAddress, Vec<u8>)> {
        self.link.take_sent()
    }

    /// Notifications delivered to the user so far
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Drain the notifications
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        core::mem::take(&mut self.notifications)
    }

    /// Processed transitions, with the peer they concern
    pub fn transitions(&self) -> &[(Option<IndividualAddress>, Transition)] {
        &self.transitions
    }

    /// Just the actions of the processed transitions
    pub fn actions(&self) -> Vec<Action> {
        self.transitions.iter().map(|(_, t)| t.action).collect()
    }

    /// Every `arm` request, in order
    pub fn armed(&self) -> &[(TimerToken, Duration)] {
        &self.armed
    }

    /// Every `cancel` request, in order
    pub fn cancelled(&self) -> &[TimerToken] {
        &self.cancelled
    }

    /// The most recent arming of `kind` on `slot` that has not been cancelled.
    pub fn pending_timer(&self, slot: u8, kind: TimerKind) -> Option<TimerToken> {
        self.armed
            .iter()
            .rev()
            .map(|(token, _)| *token)
            .find(|token| token.slot() == slot && token.kind() == kind)
            .filter(|token| !self.cancelled.contains(token))
    }
}

impl NetworkLink for RecordingContext {
    fn send(&mut self, destination: IndividualAddress, tpdu: &[u8]) -> Result<()> {
        self.link.send(destination, tpdu)
    }

    fn is_ready(&self) -> bool {
        self.link.is_ready()
    }
}

impl Scheduler for RecordingContext {
    fn arm(&mut self, token: TimerToken, after: Duration) {
        self.armed.push((token, after));
    }

    fn cancel(&mut self, token: TimerToken) {
        self.cancelled.push(token);
    }
}

impl TransportUser for RecordingContext {
    fn on_connected(&mut self, peer: IndividualAddress) {
        self.notifications.push(Notification::Connected(peer));
    }

    fn on_connect_failed(&mut self, peer: IndividualAddress, reason: DisconnectReason) {
        self.notifications.push(Notification::ConnectFailed(peer, reason));
    }

    fn on_data_indication(&mut self, peer: IndividualAddress, apci: u16, payload: &[u8]) {
        // Payloads are bounded by the TPDU codec
        let payload = heapless::Vec::from_slice(payload).unwrap_or_default();
        self.notifications.push(Notification::DataIndication(peer, apci, payload));
    }

    fn on_data_confirmed(&mut self, peer: IndividualAddress) {
        self.notifications.push(Notification::DataConfirmed(peer));
    }

    fn on_data_failed(&mut self, peer: IndividualAddress) {
        self.notifications.push(Notification::DataFailed(peer));
    }

    fn on_disconnected(&mut self, peer: IndividualAddress, reason: DisconnectReason) {
        self.notifications.push(Notification::Disconnected(peer, reason));
    }
}

impl Observer for RecordingContext {
    fn on_transition(&mut self, peer: Option<IndividualAddress>, transition: &Transition) {
        self.transitions.push((peer, *transition));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_link_records_and_fails() {
        let mut link = MockLink::new();
        link.send(ia!(1, 1, 1), &[0x80]).unwrap();
        assert_eq!(link.sent_frames().len(), 1);
        assert_eq!(link.last_sent().unwrap().1, [0x80]);

        link.set_fail(true);
        match link.send(ia!(1, 1, 1), &[0x81]) {
            Err(KnxError::Transport(e)) => assert!(e.is_send_failed()),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(link.take_sent().len(), 1);
        assert!(link.sent_frames().is_empty());
    }
}
