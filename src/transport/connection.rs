//! Connection-oriented transport state machine.
//!
//! One [`TransportConnection`] serves one peer at a time. Inbound frames,
//! local requests and timer expiries are serialized into a small event queue
//! and processed one at a time to completion; each processed event yields
//! exactly one [`Transition`], reported to the context's observer.
//!
//! ```text
//!            T_Connect (peer)            data request
//!   Closed ────────────────────▶ OpenIdle ───────────▶ OpenWait
//!     │                            ▲  ▲                  │  │
//!     │ connect()                  │  └── T_ACK(seq) ────┘  │ ack timeout /
//!     ▼                            │                        │ T_NAK: repeat
//!   Connecting ── confirm ─────────┘                        ▼
//!                                              teardown after the last repetition
//! ```
//!
//! Ordering: inbound TPDUs are never deferred. A local data request made
//! while the connection is still being opened or is waiting for an
//! acknowledgment goes into a one-slot buffer and is replayed, before any
//! other queued event, as soon as the connection is open and idle.

use crate::addressing::IndividualAddress;
use crate::configuration::TransportConfig;
use crate::error::{KnxError, Result};
use crate::protocol::constants::MAX_APCI;
use crate::protocol::sequence::{SequenceCheck, SequenceNumber};
use crate::protocol::tpdu::{Frame, Payload, Tpdu, TransportControl};
use crate::transport::context::TransportContext;
use crate::transport::event::{
    Action, ConnectionState, DisconnectReason, Event, SendStatus, Transition,
};
use crate::transport::timer::{TimerKind, TimerPair, TimerToken};
use heapless::{Deque, Vec};

/// Depth of the per-connection event queue
pub const EVENT_QUEUE_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Session {
    peer: IndividualAddress,
    seq_send: SequenceNumber,
    seq_recv: SequenceNumber,
}

impl Session {
    const fn new(peer: IndividualAddress) -> Self {
        Self {
            peer,
            seq_send: SequenceNumber::ZERO,
            seq_recv: SequenceNumber::ZERO,
        }
    }
}

/// The data TPDU awaiting acknowledgment
#[derive(Debug, Clone, PartialEq, Eq)]
struct Outstanding {
    frame: Frame,
    repetitions: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Closed,
    Connecting(Session),
    OpenIdle(Session),
    OpenWait(Session, Outstanding),
}

/// Transport connection to a single peer
#[derive(Debug)]
pub struct TransportConnection {
    slot: u8,
    config: TransportConfig,
    state: State,
    timers: TimerPair,
    queue: Deque<Event, EVENT_QUEUE_DEPTH>,
    deferred: Option<Event>,
}

impl Default for TransportConnection {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl TransportConnection {
    /// Create a closed connection using timer slot 0.
    pub const fn new(config: TransportConfig) -> Self {
        Self::with_slot(config, 0)
    }

    /// Create a closed connection whose timer tokens carry `slot`.
    ///
    /// Used by [`TransportLayer`](crate::transport::TransportLayer) to route
    /// expiries back to the right connection.
    pub const fn with_slot(config: TransportConfig, slot: u8) -> Self {
        Self {
            slot,
            config,
            state: State::Closed,
            timers: TimerPair::new(slot),
            queue: Deque::new(),
            deferred: None,
        }
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    /// Current state
    pub const fn state(&self) -> ConnectionState {
        match self.state {
            State::Closed => ConnectionState::Closed,
            State::Connecting(_) => ConnectionState::Connecting,
            State::OpenIdle(_) => ConnectionState::OpenIdle,
            State::OpenWait(..) => ConnectionState::OpenWait,
        }
    }

    fn session(&self) -> Option<Session> {
        match self.state {
            State::Closed => None,
            State::Connecting(session) | State::OpenIdle(session) | State::OpenWait(session, _) => {
                Some(session)
            }
        }
    }

    fn session_mut(&mut self) -> Option<&mut Session> {
        match &mut self.state {
            State::Closed => None,
            State::Connecting(session) | State::OpenIdle(session) | State::OpenWait(session, _) => {
                Some(session)
            }
        }
    }

    /// The connection partner, `None` while closed
    pub fn peer(&self) -> Option<IndividualAddress> {
        self.session().map(|session| session.peer)
    }

    /// Sequence number of the next data TPDU to send
    pub fn seq_send(&self) -> Option<SequenceNumber> {
        self.session().map(|session| session.seq_send)
    }

    /// Sequence number expected from the peer
    pub fn seq_recv(&self) -> Option<SequenceNumber> {
        self.session().map(|session| session.seq_recv)
    }

    /// Repetitions of the outstanding data TPDU so far (0 unless `OpenWait`)
    pub const fn repetitions(&self) -> u8 {
        match &self.state {
            State::OpenWait(_, outstanding) => outstanding.repetitions,
            _ => 0,
        }
    }

    /// Whether a data TPDU is awaiting acknowledgment
    pub const fn has_pending(&self) -> bool {
        matches!(self.state, State::OpenWait(..))
    }

    /// Whether a local data request is held back
    pub const fn has_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    /// Whether the connection deadline is running
    pub const fn connection_timer_armed(&self) -> bool {
        self.timers.connection.is_armed()
    }

    /// Whether the acknowledgment deadline is running
    pub const fn ack_timer_armed(&self) -> bool {
        self.timers.acknowledge.is_armed()
    }

    /// Timer slot
    pub const fn slot(&self) -> u8 {
        self.slot
    }

    /// Active configuration
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Local service
    // ---------------------------------------------------------------------

    /// Open a connection to `peer` (sends `T_Connect`).
    ///
    /// The connection becomes `OpenIdle` once the link confirms the request
    /// ([`on_connect_confirm`](Self::on_connect_confirm)) or the peer answers
    /// with its own `T_Connect`.
    ///
    /// # Errors
    ///
    /// `AlreadyConnected` unless the connection is closed.
    pub fn connect<C>(&mut self, ctx: &mut C, peer: IndividualAddress) -> Result<()>
    where
        C: TransportContext + ?Sized,
    {
        if self.state() != ConnectionState::Closed {
            return Err(KnxError::already_connected());
        }
        self.submit(ctx, Event::ConnectRequest { peer })
    }

    /// Close the connection (sends `T_Disconnect` if a peer is known).
    ///
    /// Calling this on a closed connection is a silent no-op.
    pub fn disconnect<C>(&mut self, ctx: &mut C)
    where
        C: TransportContext + ?Sized,
    {
        if self.submit(ctx, Event::DisconnectRequest).is_err() {
            knx_log!(warn, "[{}] event queue full, disconnect dropped", self.slot);
        }
    }

    /// Send `payload` under application control `apci` as `T_Data_Connected`.
    ///
    /// # Errors
    ///
    /// - `InvalidControlField` if `apci` does not fit in 10 bits
    /// - `PayloadTooLarge` if `payload` exceeds the configured bound
    /// - `NotConnected` if the connection is closed
    /// - `Busy` if a request is already held back
    pub fn send_data<C>(&mut self, ctx: &mut C, apci: u16, payload: &[u8]) -> Result<SendStatus>
    where
        C: TransportContext + ?Sized,
    {
        if apci > MAX_APCI {
            return Err(KnxError::invalid_control_field());
        }
        if payload.len() > self.config.max_payload_length() {
            return Err(KnxError::payload_too_large());
        }

        let status = match self.state() {
            ConnectionState::Closed => return Err(KnxError::not_connected()),
            _ if self.deferred.is_some() => return Err(KnxError::busy()),
            ConnectionState::OpenIdle => SendStatus::Transmitted,
            ConnectionState::Connecting | ConnectionState::OpenWait => SendStatus::Deferred,
        };

        let payload = Vec::from_slice(payload).map_err(|_overflow| KnxError::payload_too_large())?;
        self.submit(ctx, Event::DataRequest { apci, payload })?;
        Ok(status)
    }

    // ---------------------------------------------------------------------
    // Inbound
    // ---------------------------------------------------------------------

    /// Decode and process a frame received from `source`.
    pub fn on_frame_received<C>(&mut self, ctx: &mut C, source: IndividualAddress, bytes: &[u8])
    where
        C: TransportContext + ?Sized,
    {
        self.on_tpdu_received(ctx, source, Tpdu::decode(bytes));
    }

    /// Process an already decoded TPDU received from `source`.
    pub fn on_tpdu_received<C>(&mut self, ctx: &mut C, source: IndividualAddress, tpdu: Tpdu)
    where
        C: TransportContext + ?Sized,
    {
        if self.submit(ctx, Event::Received { source, tpdu }).is_err() {
            knx_log!(warn, "[{}] event queue full, dropping frame from {}", self.slot, source);
        }
    }

    /// Link-layer confirmation of the local `T_Connect`.
    pub fn on_connect_confirm<C>(&mut self, ctx: &mut C, positive: bool)
    where
        C: TransportContext + ?Sized,
    {
        if self.submit(ctx, Event::ConnectConfirm { positive }).is_err() {
            knx_log!(warn, "[{}] event queue full, connect confirmation dropped", self.slot);
        }
    }

    // ---------------------------------------------------------------------
    // Timers
    // ---------------------------------------------------------------------

    /// A token armed by this connection fired.
    ///
    /// Stale tokens (cancelled or superseded) are ignored.
    pub fn on_timer<C>(&mut self, ctx: &mut C, token: TimerToken)
    where
        C: TransportContext + ?Sized,
    {
        let event = match token.kind() {
            TimerKind::Connection if self.timers.connection.expire(token) => Event::ConnectionTimeout,
            TimerKind::Acknowledge if self.timers.acknowledge.expire(token) => Event::AckTimeout,
            _ => {
                knx_log!(trace, "[{}] ignoring stale timer {}", self.slot, token);
                return;
            }
        };
        if self.submit(ctx, event).is_err() {
            knx_log!(warn, "[{}] event queue full, timer {} dropped", self.slot, token);
        }
    }

    /// The connection deadline expired. No-op unless it is running.
    pub fn on_connection_timeout<C>(&mut self, ctx: &mut C)
    where
        C: TransportContext + ?Sized,
    {
        if self.timers.connection.disarm() && self.submit(ctx, Event::ConnectionTimeout).is_err() {
            knx_log!(warn, "[{}] event queue full, connection timeout dropped", self.slot);
        }
    }

    /// The acknowledgment deadline expired. No-op unless it is running.
    pub fn on_ack_timeout<C>(&mut self, ctx: &mut C)
    where
        C: TransportContext + ?Sized,
    {
        if self.timers.acknowledge.disarm() && self.submit(ctx, Event::AckTimeout).is_err() {
            knx_log!(warn, "[{}] event queue full, ack timeout dropped", self.slot);
        }
    }

    // ---------------------------------------------------------------------
    // Event processing
    // ---------------------------------------------------------------------

    fn submit<C>(&mut self, ctx: &mut C, event: Event) -> Result<()>
    where
        C: TransportContext + ?Sized,
    {
        self.queue.push_back(event).map_err(|_full| KnxError::busy())?;
        self.process(ctx);
        Ok(())
    }

    fn process<C>(&mut self, ctx: &mut C)
    where
        C: TransportContext + ?Sized,
    {
        loop {
            let replay = matches!(self.state, State::OpenIdle(_)) && self.deferred.is_some();
            let next = if replay {
                self.deferred.take()
            } else {
                self.queue.pop_front()
            };
            let Some(event) = next else {
                break;
            };
            self.step(ctx, event);
        }
    }

    fn step<C>(&mut self, ctx: &mut C, event: Event)
    where
        C: TransportContext + ?Sized,
    {
        let from = self.state();
        let peer = self.peer();

        let action = match event {
            Event::Received { source, tpdu } => self.received(ctx, source, &tpdu),
            Event::ConnectRequest { peer } => self.open(ctx, peer),
            Event::DisconnectRequest => self.local_disconnect(ctx),
            Event::DataRequest { apci, payload } => self.data_request(ctx, apci, payload),
            Event::ConnectConfirm { positive } => self.connect_confirm(ctx, positive),
            Event::ConnectionTimeout => self.connection_timeout(ctx),
            Event::AckTimeout => self.ack_timeout(ctx),
        };

        let transition = Transition {
            from,
            action,
            to: self.state(),
        };
        knx_log!(debug, "[{}] {}", self.slot, transition);
        ctx.on_transition(self.peer().or(peer), &transition);
    }

    fn received<C>(&mut self, ctx: &mut C, source: IndividualAddress, tpdu: &Tpdu) -> Action
    where
        C: TransportContext + ?Sized,
    {
        let control = tpdu.control();
        if !control.is_connection_oriented() {
            if control == TransportControl::Invalid {
                knx_log!(warn, "[{}] dropping malformed TPDU from {}", self.slot, source);
            } else {
                knx_log!(trace, "[{}] ignoring {} from {}", self.slot, control, source);
            }
            return Action::Ignore;
        }

        let state = self.state();
        let from_peer = self.peer() == Some(source);

        match control {
            TransportControl::Connect => match state {
                ConnectionState::Closed => self.accept(ctx, source),
                ConnectionState::Connecting if from_peer => self.confirm_connect(ctx),
                _ if from_peer => self.abort(ctx, DisconnectReason::ProtocolViolation),
                // A third party connecting while data is in flight ends the connection
                ConnectionState::OpenWait => {
                    self.reject_foreign(ctx, source);
                    self.abort(ctx, DisconnectReason::ProtocolViolation)
                }
                _ => self.reject_foreign(ctx, source),
            },
            TransportControl::Disconnect => {
                if from_peer {
                    self.abort(ctx, DisconnectReason::PeerRequest)
                } else {
                    Action::Ignore
                }
            }
            _ if !from_peer => self.reject_foreign(ctx, source),
            TransportControl::DataConnected(sequence) => {
                if state == ConnectionState::Connecting {
                    self.abort(ctx, DisconnectReason::ProtocolViolation)
                } else {
                    self.receive_data(ctx, sequence, tpdu)
                }
            }
            TransportControl::Ack(sequence) => {
                if state == ConnectionState::OpenWait && self.seq_send() == Some(sequence) {
                    self.confirm(ctx)
                } else {
                    self.abort(ctx, DisconnectReason::ProtocolViolation)
                }
            }
            TransportControl::Nak(sequence) => {
                if state == ConnectionState::OpenWait && self.seq_send() == Some(sequence) {
                    self.repeat_or_abort(ctx)
                } else {
                    self.abort(ctx, DisconnectReason::ProtocolViolation)
                }
            }
            _ => Action::Ignore,
        }
    }

    fn open<C>(&mut self, ctx: &mut C, peer: IndividualAddress) -> Action
    where
        C: TransportContext + ?Sized,
    {
        if self.state != State::Closed {
            return Action::Ignore;
        }
        self.state = State::Connecting(Session::new(peer));
        self.timers.connection.start(ctx, self.config.connection_timeout());
        knx_log!(info, "[{}] connecting to {}", self.slot, peer);

        if !self.send_tpdu(ctx, peer, &Tpdu::connect()) {
            // The link will never confirm a frame it did not take
            if self.queue.push_back(Event::ConnectConfirm { positive: false }).is_err() {
                knx_log!(warn, "[{}] event queue full, connect failure lost", self.slot);
            }
        }
        Action::OpenConnection
    }

    fn accept<C>(&mut self, ctx: &mut C, source: IndividualAddress) -> Action
    where
        C: TransportContext + ?Sized,
    {
        self.state = State::OpenIdle(Session::new(source));
        self.timers.connection.start(ctx, self.config.connection_timeout());
        knx_log!(info, "[{}] connection from {} accepted", self.slot, source);
        ctx.on_connected(source);
        Action::AcceptConnection
    }

    fn confirm_connect<C>(&mut self, ctx: &mut C) -> Action
    where
        C: TransportContext + ?Sized,
    {
        let State::Connecting(session) = self.state else {
            return Action::Ignore;
        };
        self.state = State::OpenIdle(session);
        self.timers.connection.start(ctx, self.config.connection_timeout());
        knx_log!(info, "[{}] connection to {} open", self.slot, session.peer);
        ctx.on_connected(session.peer);
        Action::ConfirmConnect
    }

    fn connect_confirm<C>(&mut self, ctx: &mut C, positive: bool) -> Action
    where
        C: TransportContext + ?Sized,
    {
        match (self.state(), positive) {
            (ConnectionState::Connecting, true) => self.confirm_connect(ctx),
            (ConnectionState::Connecting, false) => {
                self.close(ctx, DisconnectReason::LinkFailure, false);
                Action::CloseSilently
            }
            _ => Action::Ignore,
        }
    }

    fn receive_data<C>(&mut self, ctx: &mut C, sequence: SequenceNumber, tpdu: &Tpdu) -> Action
    where
        C: TransportContext + ?Sized,
    {
        let Some(session) = self.session_mut() else {
            return Action::Ignore;
        };
        let peer = session.peer;
        let check = session.seq_recv.classify(sequence);
        if check == SequenceCheck::InOrder {
            session.seq_recv.increment();
        }

        let action = match check {
            SequenceCheck::InOrder => {
                self.send_tpdu(ctx, peer, &Tpdu::ack(sequence));
                if let Some(apci) = tpdu.application_control() {
                    ctx.on_data_indication(peer, apci, tpdu.payload());
                }
                Action::AcknowledgeAndDeliver
            }
            SequenceCheck::Duplicate => {
                knx_log!(debug, "[{}] duplicate {} from {}", self.slot, sequence, peer);
                self.send_tpdu(ctx, peer, &Tpdu::ack(sequence));
                Action::Reacknowledge
            }
            SequenceCheck::OutOfOrder => {
                knx_log!(warn, "[{}] out-of-sequence {} from {}", self.slot, sequence, peer);
                self.send_tpdu(ctx, peer, &Tpdu::nak(sequence));
                Action::NegativeAcknowledge
            }
        };
        self.timers.connection.start(ctx, self.config.connection_timeout());
        action
    }

    fn data_request<C>(&mut self, ctx: &mut C, apci: u16, payload: Payload) -> Action
    where
        C: TransportContext + ?Sized,
    {
        match self.state {
            State::OpenIdle(session) => self.transmit(ctx, session, apci, &payload),
            State::Connecting(_) | State::OpenWait(..) if self.deferred.is_none() => {
                self.deferred = Some(Event::DataRequest { apci, payload });
                Action::Defer
            }
            State::Connecting(session) | State::OpenWait(session, _) => {
                knx_log!(warn, "[{}] deferral slot taken, data request failed", self.slot);
                ctx.on_data_failed(session.peer);
                Action::Ignore
            }
            State::Closed => {
                knx_log!(warn, "[{}] data request on closed connection dropped", self.slot);
                Action::Ignore
            }
        }
    }

    fn transmit<C>(&mut self, ctx: &mut C, session: Session, apci: u16, payload: &[u8]) -> Action
    where
        C: TransportContext + ?Sized,
    {
        let tpdu = Tpdu::data_connected(session.seq_send, apci, payload);
        let Ok(frame) = tpdu.to_frame() else {
            knx_log!(warn, "[{}] data request could not be encoded", self.slot);
            ctx.on_data_failed(session.peer);
            return Action::Ignore;
        };

        // A link failure is recovered by the acknowledgment timer
        self.send_frame(ctx, session.peer, &frame);
        self.state = State::OpenWait(
            session,
            Outstanding {
                frame,
                repetitions: 0,
            },
        );
        self.timers.acknowledge.start(ctx, self.config.ack_timeout());
        self.timers.connection.start(ctx, self.config.connection_timeout());
        Action::Transmit
    }

    fn confirm<C>(&mut self, ctx: &mut C) -> Action
    where
        C: TransportContext + ?Sized,
    {
        let State::OpenWait(mut session, _) = self.state else {
            return Action::Ignore;
        };
        session.seq_send.increment();
        self.state = State::OpenIdle(session);
        self.timers.acknowledge.stop(ctx);
        self.timers.connection.start(ctx, self.config.connection_timeout());
        ctx.on_data_confirmed(session.peer);
        Action::Confirm
    }

    fn repeat_or_abort<C>(&mut self, ctx: &mut C) -> Action
    where
        C: TransportContext + ?Sized,
    {
        if self.repetitions() < self.config.max_repetitions() {
            self.retransmit(ctx)
        } else {
            self.abort(ctx, DisconnectReason::AckExhausted)
        }
    }

    fn retransmit<C>(&mut self, ctx: &mut C) -> Action
    where
        C: TransportContext + ?Sized,
    {
        let State::OpenWait(session, outstanding) = &mut self.state else {
            return Action::Ignore;
        };
        outstanding.repetitions += 1;
        let peer = session.peer;
        let repetition = outstanding.repetitions;
        let frame = outstanding.frame.clone();

        knx_log!(debug, "[{}] repetition {} to {}", self.slot, repetition, peer);
        self.send_frame(ctx, peer, &frame);
        self.timers.acknowledge.start(ctx, self.config.ack_timeout());
        self.timers.connection.start(ctx, self.config.connection_timeout());
        Action::Retransmit
    }

    fn local_disconnect<C>(&mut self, ctx: &mut C) -> Action
    where
        C: TransportContext + ?Sized,
    {
        if self.state == State::Closed {
            return Action::ConfirmDisconnect;
        }
        self.close(ctx, DisconnectReason::LocalRequest, true);
        Action::Disconnect
    }

    fn connection_timeout<C>(&mut self, ctx: &mut C) -> Action
    where
        C: TransportContext + ?Sized,
    {
        if self.state == State::Closed {
            return Action::Ignore;
        }
        self.abort(ctx, DisconnectReason::Timeout)
    }

    fn ack_timeout<C>(&mut self, ctx: &mut C) -> Action
    where
        C: TransportContext + ?Sized,
    {
        if !self.has_pending() {
            return Action::Ignore;
        }
        self.repeat_or_abort(ctx)
    }

    fn reject_foreign<C>(&mut self, ctx: &mut C, source: IndividualAddress) -> Action
    where
        C: TransportContext + ?Sized,
    {
        knx_log!(warn, "[{}] rejecting TPDU from unconnected {}", self.slot, source);
        self.send_tpdu(ctx, source, &Tpdu::disconnect());
        Action::RejectForeign
    }

    fn abort<C>(&mut self, ctx: &mut C, reason: DisconnectReason) -> Action
    where
        C: TransportContext + ?Sized,
    {
        self.close(ctx, reason, true);
        Action::Abort
    }

    /// Return to `Closed`, reporting exactly one terminal outcome.
    ///
    /// Re-entering `Closed` from `Closed` does nothing.
    fn close<C>(&mut self, ctx: &mut C, reason: DisconnectReason, notify_peer: bool)
    where
        C: TransportContext + ?Sized,
    {
        let previous = core::mem::replace(&mut self.state, State::Closed);
        self.timers.stop_all(ctx);

        let (session, connecting, outstanding) = match previous {
            State::Closed => return,
            State::Connecting(session) => (session, true, false),
            State::OpenIdle(session) => (session, false, false),
            State::OpenWait(session, _) => (session, false, true),
        };
        let peer = session.peer;

        if notify_peer {
            self.send_tpdu(ctx, peer, &Tpdu::disconnect());
        }
        if outstanding {
            ctx.on_data_failed(peer);
        }
        if self.deferred.take().is_some() {
            ctx.on_data_failed(peer);
        }

        knx_log!(info, "[{}] connection to {} closed: {}", self.slot, peer, reason);
        if connecting && reason != DisconnectReason::LocalRequest {
            ctx.on_connect_failed(peer, reason);
        } else {
            ctx.on_disconnected(peer, reason);
        }
    }

    fn send_tpdu<C>(&self, ctx: &mut C, destination: IndividualAddress, tpdu: &Tpdu) -> bool
    where
        C: TransportContext + ?Sized,
    {
        match tpdu.to_frame() {
            Ok(frame) => self.send_frame(ctx, destination, &frame),
            Err(e) => {
                knx_log!(warn, "[{}] cannot encode {}: {}", self.slot, tpdu.control(), e);
                false
            }
        }
    }

    fn send_frame<C>(&self, ctx: &mut C, destination: IndividualAddress, frame: &[u8]) -> bool
    where
        C: TransportContext + ?Sized,
    {
        if !ctx.is_ready() {
            knx_log!(warn, "[{}] link not ready, frame to {} dropped", self.slot, destination);
            return false;
        }
        match ctx.send(destination, frame) {
            Ok(()) => true,
            Err(e) => {
                knx_log!(warn, "[{}] send to {} failed: {}", self.slot, destination, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::mock_link::RecordingContext;
    use crate::transport::event::Notification;
    use core::time::Duration;

    const PEER: IndividualAddress = ia!(1, 1, 5);
    const OTHER: IndividualAddress = ia!(1, 1, 9);

    fn seq(value: u8) -> SequenceNumber {
        SequenceNumber::new(value).unwrap()
    }

    fn frame(tpdu: &Tpdu) -> std::vec::Vec<u8> {
        tpdu.to_frame().unwrap().to_vec()
    }

    /// `T_Data_Connected` carrying a MemoryResponse
    fn data(sequence: u8, payload: &[u8]) -> std::vec::Vec<u8> {
        frame(&Tpdu::data_connected(seq(sequence), 0x240, payload))
    }

    fn fire(conn: &mut TransportConnection, ctx: &mut RecordingContext, kind: TimerKind) {
        let token = ctx.pending_timer(conn.slot(), kind).unwrap();
        conn.on_timer(ctx, token);
    }

    /// A connection opened passively by `PEER`, with the record cleared.
    fn open() -> (TransportConnection, RecordingContext) {
        let mut ctx = RecordingContext::new();
        let mut conn = TransportConnection::default();
        conn.on_frame_received(&mut ctx, PEER, &[0x80]);
        ctx.take_sent();
        ctx.take_notifications();
        (conn, ctx)
    }

    #[test]
    fn test_passive_open() {
        let mut ctx = RecordingContext::new();
        let mut conn = TransportConnection::default();

        conn.on_frame_received(&mut ctx, PEER, &[0x80]);

        assert_eq!(conn.state(), ConnectionState::OpenIdle);
        assert_eq!(conn.peer(), Some(PEER));
        assert_eq!((conn.seq_send(), conn.seq_recv()), (Some(seq(0)), Some(seq(0))));
        assert_eq!(ctx.notifications(), [Notification::Connected(PEER)]);
        assert!(conn.connection_timer_armed());
        assert_eq!(ctx.armed()[0].1, Duration::from_secs(6));
        assert_eq!(ctx.actions(), [Action::AcceptConnection]);
        assert!(ctx.sent().is_empty());
    }

    #[test]
    fn test_send_and_acknowledge() {
        let (mut conn, mut ctx) = open();

        let status = conn.send_data(&mut ctx, 0x280, &[0x01, 0x00, 0x10, 0xAA]).unwrap();
        assert_eq!(status, SendStatus::Transmitted);
        assert_eq!(conn.state(), ConnectionState::OpenWait);
        assert!(conn.has_pending());
        assert!(conn.ack_timer_armed());
        assert_eq!(ctx.sent()[0], (PEER, std::vec![0x42, 0x80, 0x01, 0x00, 0x10, 0xAA]));

        conn.on_frame_received(&mut ctx, PEER, &[0xC2]);

        assert_eq!(conn.state(), ConnectionState::OpenIdle);
        assert_eq!(conn.seq_send(), Some(seq(1)));
        assert!(!conn.ack_timer_armed());
        assert_eq!(ctx.notifications(), [Notification::DataConfirmed(PEER)]);
        assert_eq!(ctx.actions()[1..], [Action::Transmit, Action::Confirm]);
    }

    #[test]
    fn test_ack_exhaustion() {
        let (mut conn, mut ctx) = open();
        conn.send_data(&mut ctx, 0x200, &[0x00, 0x60]).unwrap();

        for repetition in 1..=3 {
            fire(&mut conn, &mut ctx, TimerKind::Acknowledge);
            assert_eq!(conn.state(), ConnectionState::OpenWait);
            assert_eq!(conn.repetitions(), repetition);
        }
        fire(&mut conn, &mut ctx, TimerKind::Acknowledge);

        let sent = ctx.take_sent();
        assert_eq!(sent.len(), 5);
        assert!(sent[..4].iter().all(|(to, bytes)| *to == PEER && *bytes == sent[0].1));
        assert_eq!(sent[4], (PEER, std::vec![0x81]));
        assert_eq!(
            ctx.notifications(),
            [
                Notification::DataFailed(PEER),
                Notification::Disconnected(PEER, DisconnectReason::AckExhausted)
            ]
        );
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.connection_timer_armed() && !conn.ack_timer_armed());
    }

    #[test]
    fn test_out_of_sequence_is_rejected() {
        let (mut conn, mut ctx) = open();
        for n in 0..3 {
            conn.on_frame_received(&mut ctx, PEER, &data(n, &[n]));
        }
        assert_eq!(conn.seq_recv(), Some(seq(3)));
        ctx.take_sent();
        ctx.take_notifications();

        conn.on_frame_received(&mut ctx, PEER, &data(5, &[5]));

        assert_eq!(ctx.sent(), [(PEER, std::vec![0xC3 | 5 << 2])]);
        assert_eq!(conn.seq_recv(), Some(seq(3)));
        assert!(ctx.notifications().is_empty());
        assert_eq!(conn.state(), ConnectionState::OpenIdle);
    }

    #[test]
    fn test_duplicate_is_acknowledged_once_delivered_once() {
        let (mut conn, mut ctx) = open();
        let bytes = data(0, &[0x12, 0x34]);

        conn.on_frame_received(&mut ctx, PEER, &bytes);
        conn.on_frame_received(&mut ctx, PEER, &bytes);

        assert_eq!(ctx.sent(), [(PEER, std::vec![0xC2]), (PEER, std::vec![0xC2])]);
        let indications = ctx
            .notifications()
            .iter()
            .filter(|n| matches!(n, Notification::DataIndication(..)))
            .count();
        assert_eq!(indications, 1);
        assert_eq!(conn.seq_recv(), Some(seq(1)));
        assert_eq!(ctx.actions()[1..], [Action::AcknowledgeAndDeliver, Action::Reacknowledge]);
    }

    #[test]
    fn test_frame_for_unknown_connection() {
        let mut ctx = RecordingContext::new();
        let mut conn = TransportConnection::default();

        conn.on_frame_received(&mut ctx, OTHER, &data(0, &[]));

        assert_eq!(ctx.sent(), [(OTHER, std::vec![0x81])]);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(ctx.notifications().is_empty());
        assert!(ctx.armed().is_empty());
    }

    #[test]
    fn test_foreign_source_while_open() {
        let (mut conn, mut ctx) = open();

        conn.on_frame_received(&mut ctx, OTHER, &[0x80]);
        conn.on_frame_received(&mut ctx, OTHER, &[0xC2]);

        assert_eq!(ctx.sent(), [(OTHER, std::vec![0x81]), (OTHER, std::vec![0x81])]);
        assert_eq!(conn.peer(), Some(PEER));
        assert_eq!(conn.state(), ConnectionState::OpenIdle);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let (mut conn, mut ctx) = open();

        conn.disconnect(&mut ctx);
        conn.disconnect(&mut ctx);

        assert_eq!(ctx.sent(), [(PEER, std::vec![0x81])]);
        assert_eq!(
            ctx.notifications(),
            [Notification::Disconnected(PEER, DisconnectReason::LocalRequest)]
        );
        assert_eq!(ctx.actions()[1..], [Action::Disconnect, Action::ConfirmDisconnect]);
    }

    #[test]
    fn test_disconnect_during_send_fails_data() {
        let (mut conn, mut ctx) = open();
        conn.send_data(&mut ctx, 0x200, &[0x00, 0x60]).unwrap();

        conn.disconnect(&mut ctx);

        assert_eq!(
            ctx.notifications(),
            [
                Notification::DataFailed(PEER),
                Notification::Disconnected(PEER, DisconnectReason::LocalRequest)
            ]
        );
        assert!(!conn.ack_timer_armed());
    }

    #[test]
    fn test_peer_disconnect() {
        let (mut conn, mut ctx) = open();

        conn.on_frame_received(&mut ctx, PEER, &[0x81]);

        assert_eq!(ctx.sent(), [(PEER, std::vec![0x81])]);
        assert_eq!(
            ctx.notifications(),
            [Notification::Disconnected(PEER, DisconnectReason::PeerRequest)]
        );
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.connection_timer_armed());

        // A second T_Disconnect finds nothing to close and is not answered
        conn.on_frame_received(&mut ctx, PEER, &[0x81]);
        assert_eq!(ctx.notifications().len(), 1);
        assert_eq!(ctx.sent().len(), 1);
    }

    #[test]
    fn test_peer_disconnect_during_send() {
        let (mut conn, mut ctx) = open();
        conn.send_data(&mut ctx, 0x200, &[0x00, 0x60]).unwrap();
        ctx.take_sent();

        conn.on_frame_received(&mut ctx, PEER, &[0x81]);

        assert_eq!(ctx.sent(), [(PEER, std::vec![0x81])]);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(
            ctx.notifications(),
            [
                Notification::DataFailed(PEER),
                Notification::Disconnected(PEER, DisconnectReason::PeerRequest)
            ]
        );
        assert!(!conn.ack_timer_armed());
    }

    #[test]
    fn test_peer_disconnect_while_connecting() {
        let mut ctx = RecordingContext::new();
        let mut conn = TransportConnection::default();
        conn.connect(&mut ctx, PEER).unwrap();
        ctx.take_sent();

        conn.on_frame_received(&mut ctx, PEER, &[0x81]);

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(ctx.sent(), [(PEER, std::vec![0x81])]);
        assert_eq!(
            ctx.notifications(),
            [Notification::ConnectFailed(PEER, DisconnectReason::PeerRequest)]
        );
        assert!(!conn.connection_timer_armed());
    }

    #[test]
    fn test_connection_timeout_while_connecting() {
        let mut ctx = RecordingContext::new();
        let mut conn = TransportConnection::default();
        conn.connect(&mut ctx, PEER).unwrap();

        fire(&mut conn, &mut ctx, TimerKind::Connection);

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(ctx.sent(), [(PEER, std::vec![0x80]), (PEER, std::vec![0x81])]);
        assert_eq!(
            ctx.notifications(),
            [Notification::ConnectFailed(PEER, DisconnectReason::Timeout)]
        );
        assert_eq!(ctx.actions(), [Action::OpenConnection, Action::Abort]);
    }

    #[test]
    fn test_foreign_connect_during_send_aborts() {
        let (mut conn, mut ctx) = open();
        conn.send_data(&mut ctx, 0x200, &[0x00, 0x60]).unwrap();
        ctx.take_sent();

        conn.on_frame_received(&mut ctx, OTHER, &[0x80]);

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(ctx.sent(), [(OTHER, std::vec![0x81]), (PEER, std::vec![0x81])]);
        assert_eq!(
            ctx.notifications(),
            [
                Notification::DataFailed(PEER),
                Notification::Disconnected(PEER, DisconnectReason::ProtocolViolation)
            ]
        );
    }

    #[test]
    fn test_active_open() {
        let mut ctx = RecordingContext::new();
        let mut conn = TransportConnection::default();

        conn.connect(&mut ctx, PEER).unwrap();
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(ctx.sent(), [(PEER, std::vec![0x80])]);

        conn.on_connect_confirm(&mut ctx, true);
        assert_eq!(conn.state(), ConnectionState::OpenIdle);
        assert_eq!(ctx.notifications(), [Notification::Connected(PEER)]);

        assert!(conn.connect(&mut ctx, OTHER).is_err());
    }

    #[test]
    fn test_negative_connect_confirm() {
        let mut ctx = RecordingContext::new();
        let mut conn = TransportConnection::default();

        conn.connect(&mut ctx, PEER).unwrap();
        conn.on_connect_confirm(&mut ctx, false);

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(
            ctx.notifications(),
            [Notification::ConnectFailed(PEER, DisconnectReason::LinkFailure)]
        );
    }

    #[test]
    fn test_connect_fails_when_link_refuses() {
        let mut ctx = RecordingContext::new();
        ctx.link.set_fail(true);
        let mut conn = TransportConnection::default();

        conn.connect(&mut ctx, PEER).unwrap();

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(
            ctx.notifications(),
            [Notification::ConnectFailed(PEER, DisconnectReason::LinkFailure)]
        );
        assert_eq!(ctx.actions(), [Action::OpenConnection, Action::CloseSilently]);
    }

    #[test]
    fn test_data_while_connecting_aborts() {
        let mut ctx = RecordingContext::new();
        let mut conn = TransportConnection::default();
        conn.connect(&mut ctx, PEER).unwrap();
        ctx.take_sent();

        conn.on_frame_received(&mut ctx, PEER, &data(0, &[]));

        assert_eq!(ctx.sent(), [(PEER, std::vec![0x81])]);
        assert_eq!(
            ctx.notifications(),
            [Notification::ConnectFailed(PEER, DisconnectReason::ProtocolViolation)]
        );
    }

    #[test]
    fn test_deferred_request_replayed_after_ack() {
        let (mut conn, mut ctx) = open();
        conn.send_data(&mut ctx, 0x200, &[0x00, 0x60]).unwrap();

        let status = conn.send_data(&mut ctx, 0x200, &[0x00, 0x70]).unwrap();
        assert_eq!(status, SendStatus::Deferred);
        assert!(conn.has_deferred());
        match conn.send_data(&mut ctx, 0x200, &[0x00, 0x80]) {
            Err(KnxError::Connection(e)) => assert!(e.is_busy()),
            other => panic!("unexpected {other:?}"),
        }

        // Inbound data is handled while the request waits
        conn.on_frame_received(&mut ctx, PEER, &data(0, &[0x99]));
        assert!(conn.has_deferred());

        conn.on_frame_received(&mut ctx, PEER, &[0xC2]);

        assert!(!conn.has_deferred());
        assert_eq!(conn.state(), ConnectionState::OpenWait);
        let (_, last) = ctx.sent().last().unwrap();
        assert_eq!(*last, [0x46, 0x00, 0x00, 0x70]);
        assert_eq!(
            ctx.actions()[1..],
            [
                Action::Transmit,
                Action::Defer,
                Action::AcknowledgeAndDeliver,
                Action::Confirm,
                Action::Transmit
            ]
        );
    }

    #[test]
    fn test_deferred_while_connecting() {
        let mut ctx = RecordingContext::new();
        let mut conn = TransportConnection::default();
        conn.connect(&mut ctx, PEER).unwrap();

        assert_eq!(conn.send_data(&mut ctx, 0x300, &[]).unwrap(), SendStatus::Deferred);
        conn.on_connect_confirm(&mut ctx, true);

        assert_eq!(conn.state(), ConnectionState::OpenWait);
        assert_eq!(ctx.sent().last().unwrap().1, [0x43, 0x00]);
    }

    #[test]
    fn test_nak_triggers_repetition() {
        let (mut conn, mut ctx) = open();
        conn.send_data(&mut ctx, 0x200, &[0x00, 0x60]).unwrap();

        conn.on_frame_received(&mut ctx, PEER, &[0xC3]);

        assert_eq!(conn.repetitions(), 1);
        assert_eq!(ctx.sent().len(), 2);
        assert_eq!(ctx.sent()[0], ctx.sent()[1]);
        assert_eq!(conn.state(), ConnectionState::OpenWait);
    }

    #[test]
    fn test_wrong_ack_sequence_aborts() {
        let (mut conn, mut ctx) = open();
        conn.send_data(&mut ctx, 0x200, &[0x00, 0x60]).unwrap();

        conn.on_frame_received(&mut ctx, PEER, &frame(&Tpdu::ack(seq(4))));

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(
            ctx.notifications().last(),
            Some(&Notification::Disconnected(PEER, DisconnectReason::ProtocolViolation))
        );
    }

    #[test]
    fn test_connection_timeout() {
        let (mut conn, mut ctx) = open();
        let stale = ctx.pending_timer(0, TimerKind::Connection).unwrap();

        // Traffic restarts the deadline, so the first token goes stale
        conn.on_frame_received(&mut ctx, PEER, &data(0, &[]));
        conn.on_timer(&mut ctx, stale);
        assert_eq!(conn.state(), ConnectionState::OpenIdle);

        fire(&mut conn, &mut ctx, TimerKind::Connection);

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(
            ctx.notifications().last(),
            Some(&Notification::Disconnected(PEER, DisconnectReason::Timeout))
        );
        assert_eq!(ctx.sent().last().unwrap().1, [0x81]);
    }

    #[test]
    fn test_direct_timeout_entry_points() {
        let (mut conn, mut ctx) = open();
        conn.on_ack_timeout(&mut ctx);
        assert_eq!(conn.state(), ConnectionState::OpenIdle);

        conn.on_connection_timeout(&mut ctx);
        assert_eq!(conn.state(), ConnectionState::Closed);

        // Already disarmed
        conn.on_connection_timeout(&mut ctx);
        assert_eq!(ctx.notifications().len(), 1);
    }

    #[test]
    fn test_local_rejections() {
        let mut ctx = RecordingContext::new();
        let mut conn = TransportConnection::default();

        assert!(conn.send_data(&mut ctx, 0x200, &[]).unwrap_err().is_not_connected());

        conn.on_frame_received(&mut ctx, PEER, &[0x80]);
        let oversized = [0u8; 255];
        assert!(conn.send_data(&mut ctx, 0x200, &oversized).unwrap_err().is_payload_too_large());
        match conn.send_data(&mut ctx, 0x400, &[]) {
            Err(KnxError::Protocol(e)) => assert!(e.is_invalid_control_field()),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(conn.state(), ConnectionState::OpenIdle);
    }

    #[test]
    fn test_standard_frame_bound() {
        let mut ctx = RecordingContext::new();
        let mut conn = TransportConnection::new(TransportConfig::new().with_max_apdu_length(15));
        conn.on_frame_received(&mut ctx, PEER, &[0x80]);

        assert!(conn.send_data(&mut ctx, 0x280, &[0u8; 15]).is_err());
        assert!(conn.send_data(&mut ctx, 0x280, &[0u8; 14]).is_ok());
    }

    #[test]
    fn test_sequence_wraps() {
        let (mut conn, mut ctx) = open();
        for n in 0..17u8 {
            conn.on_frame_received(&mut ctx, PEER, &data(n % 16, &[n]));
        }
        let delivered: std::vec::Vec<u8> = ctx
            .notifications()
            .iter()
            .filter_map(|n| match n {
                Notification::DataIndication(_, _, payload) => Some(payload[0]),
                _ => None,
            })
            .collect();
        assert_eq!(delivered, (0..17).collect::<std::vec::Vec<u8>>());
        assert_eq!(conn.seq_recv(), Some(seq(1)));
    }

    #[test]
    fn test_malformed_and_connectionless_ignored() {
        let (mut conn, mut ctx) = open();

        conn.on_frame_received(&mut ctx, PEER, &[0x42]);
        conn.on_frame_received(&mut ctx, PEER, &[0x00, 0x80]);

        assert!(ctx.sent().is_empty());
        assert_eq!(ctx.actions()[1..], [Action::Ignore, Action::Ignore]);
        assert_eq!(conn.state(), ConnectionState::OpenIdle);
    }
}
