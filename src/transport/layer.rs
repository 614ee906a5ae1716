//! Multi-connection dispatcher.
//!
//! A device can serve several management clients at once. [`TransportLayer`]
//! owns `N` connection slots, routes inbound TPDUs by source address and
//! timer tokens by slot, and claims a free slot for every new connection.

use crate::addressing::IndividualAddress;
use crate::configuration::TransportConfig;
use crate::error::{KnxError, Result};
use crate::protocol::tpdu::{Tpdu, TransportControl};
use crate::transport::connection::TransportConnection;
use crate::transport::context::TransportContext;
use crate::transport::event::{ConnectionState, SendStatus};
use crate::transport::timer::TimerToken;

/// `N` transport connections behind one network link
///
/// # Examples
///
/// ```
/// use knx_transport::{TransportConfig, TransportLayer};
///
/// let layer = TransportLayer::<4>::new(TransportConfig::default()).unwrap();
/// assert_eq!(layer.open_connections(), 0);
/// ```
#[derive(Debug)]
pub struct TransportLayer<const N: usize> {
    connections: [TransportConnection; N],
}

impl<const N: usize> TransportLayer<N> {
    const SLOTS_FIT: () = assert!(N > 0 && N <= 256, "slot numbers are 8 bits");

    /// Create `N` closed connections sharing `config`.
    ///
    /// # Errors
    ///
    /// Whatever [`TransportConfig::validate`] rejects.
    pub fn new(config: TransportConfig) -> Result<Self> {
        let () = Self::SLOTS_FIT;
        config.validate()?;
        Ok(Self {
            connections: core::array::from_fn(|slot| {
                TransportConnection::with_slot(config, slot as u8)
            }),
        })
    }

    fn find(&self, peer: IndividualAddress) -> Option<usize> {
        self.connections
            .iter()
            .position(|conn| conn.peer() == Some(peer))
    }

    fn free(&self) -> Option<usize> {
        self.connections
            .iter()
            .position(|conn| conn.state() == ConnectionState::Closed)
    }

    /// The connection to `peer`, if any
    pub fn connection(&self, peer: IndividualAddress) -> Option<&TransportConnection> {
        self.find(peer).map(|index| &self.connections[index])
    }

    /// All slots, open or not
    pub fn connections(&self) -> &[TransportConnection] {
        &self.connections
    }

    /// Number of slots not `Closed`
    pub fn open_connections(&self) -> usize {
        self.connections
            .iter()
            .filter(|conn| conn.state() != ConnectionState::Closed)
            .count()
    }

    /// Open a connection to `peer` in a free slot.
    ///
    /// # Errors
    ///
    /// - `AlreadyConnected` if a slot already serves `peer`
    /// - `NoFreeConnections` if every slot is in use
    pub fn connect<C>(&mut self, ctx: &mut C, peer: IndividualAddress) -> Result<()>
    where
        C: TransportContext + ?Sized,
    {
        if self.find(peer).is_some() {
            return Err(KnxError::already_connected());
        }
        let index = self.free().ok_or_else(KnxError::no_free_connections)?;
        self.connections[index].connect(ctx, peer)
    }

    /// Close the connection to `peer`. No-op if there is none.
    pub fn disconnect<C>(&mut self, ctx: &mut C, peer: IndividualAddress)
    where
        C: TransportContext + ?Sized,
    {
        if let Some(index) = self.find(peer) {
            self.connections[index].disconnect(ctx);
        }
    }

    /// Send data over the connection to `peer`.
    ///
    /// # Errors
    ///
    /// `NotConnected` if no slot serves `peer`, otherwise as
    /// [`TransportConnection::send_data`].
    pub fn send_data<C>(
        &mut self,
        ctx: &mut C,
        peer: IndividualAddress,
        apci: u16,
        payload: &[u8],
    ) -> Result<SendStatus>
    where
        C: TransportContext + ?Sized,
    {
        let index = self.find(peer).ok_or_else(KnxError::not_connected)?;
        self.connections[index].send_data(ctx, apci, payload)
    }

    /// Link confirmation of the `T_Connect` sent to `peer`.
    pub fn on_connect_confirm<C>(&mut self, ctx: &mut C, peer: IndividualAddress, positive: bool)
    where
        C: TransportContext + ?Sized,
    {
        if let Some(index) = self.find(peer) {
            self.connections[index].on_connect_confirm(ctx, positive);
        }
    }

    /// Decode and route an individually addressed frame from `source`.
    pub fn on_frame_received<C>(&mut self, ctx: &mut C, source: IndividualAddress, bytes: &[u8])
    where
        C: TransportContext + ?Sized,
    {
        self.on_tpdu_received(ctx, source, Tpdu::decode(bytes));
    }

    /// Route a decoded TPDU from `source`.
    ///
    /// Connectionless and malformed TPDUs are dropped here. A `T_Connect`
    /// from an unknown source claims a free slot; when none is left it is
    /// answered with `T_Disconnect`.
    pub fn on_tpdu_received<C>(&mut self, ctx: &mut C, source: IndividualAddress, tpdu: Tpdu)
    where
        C: TransportContext + ?Sized,
    {
        let control = tpdu.control();
        if !control.is_connection_oriented() {
            knx_log!(trace, "dropping {} from {}", control, source);
            return;
        }

        if let Some(index) = self.find(source) {
            self.connections[index].on_tpdu_received(ctx, source, tpdu);
            return;
        }
        if control == TransportControl::Disconnect {
            return;
        }

        match self.free() {
            // A closed connection accepts T_Connect and rejects everything else
            Some(index) => self.connections[index].on_tpdu_received(ctx, source, tpdu),
            None => {
                knx_log!(warn, "no free connection for {}, sending T_Disconnect", source);
                reject(ctx, source);
            }
        }
    }

    /// Route an expired timer to its slot.
    pub fn on_timer<C>(&mut self, ctx: &mut C, token: TimerToken)
    where
        C: TransportContext + ?Sized,
    {
        match self.connections.get_mut(usize::from(token.slot())) {
            Some(conn) => conn.on_timer(ctx, token),
            None => knx_log!(warn, "timer {} for unknown slot", token),
        }
    }
}

fn reject<C>(ctx: &mut C, destination: IndividualAddress)
where
    C: TransportContext + ?Sized,
{
    let result = Tpdu::disconnect()
        .to_frame()
        .and_then(|frame| ctx.send(destination, &frame));
    if let Err(e) = result {
        knx_log!(warn, "T_Disconnect to {} failed: {}", destination, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::mock_link::RecordingContext;
    use crate::transport::event::{DisconnectReason, Notification};
    use crate::transport::timer::TimerKind;

    const A: IndividualAddress = ia!(1, 1, 10);
    const B: IndividualAddress = ia!(1, 1, 11);
    const C: IndividualAddress = ia!(1, 1, 12);

    fn layer() -> TransportLayer<2> {
        TransportLayer::new(TransportConfig::default()).unwrap()
    }

    #[test]
    fn test_inbound_connects_claim_slots() {
        let mut ctx = RecordingContext::new();
        let mut layer = layer();

        layer.on_frame_received(&mut ctx, A, &[0x80]);
        layer.on_frame_received(&mut ctx, B, &[0x80]);
        assert_eq!(layer.open_connections(), 2);
        assert_eq!(layer.connection(B).unwrap().slot(), 1);

        // Full: the third client is turned away
        layer.on_frame_received(&mut ctx, C, &[0x80]);
        assert_eq!(ctx.sent(), [(C, std::vec![0x81])]);
        assert!(layer.connection(C).is_none());
    }

    #[test]
    fn test_frames_routed_by_source() {
        let mut ctx = RecordingContext::new();
        let mut layer = layer();
        layer.on_frame_received(&mut ctx, A, &[0x80]);
        layer.on_frame_received(&mut ctx, B, &[0x80]);

        // DeviceDescriptorRead from B, seq 0
        layer.on_frame_received(&mut ctx, B, &[0x43, 0x00]);

        assert_eq!(ctx.sent(), [(B, std::vec![0xC2])]);
        assert_eq!(layer.connection(B).unwrap().seq_recv().unwrap().value(), 1);
        assert_eq!(layer.connection(A).unwrap().seq_recv().unwrap().value(), 0);
    }

    #[test]
    fn test_unknown_source_rejected() {
        let mut ctx = RecordingContext::new();
        let mut layer = layer();

        layer.on_frame_received(&mut ctx, C, &[0x43, 0x00]);
        layer.on_frame_received(&mut ctx, C, &[0x81]);
        layer.on_frame_received(&mut ctx, C, &[0x00, 0x80]);

        assert_eq!(ctx.sent(), [(C, std::vec![0x81])]);
        assert_eq!(layer.open_connections(), 0);
    }

    #[test]
    fn test_timer_routed_by_slot() {
        let mut ctx = RecordingContext::new();
        let mut layer = layer();
        layer.on_frame_received(&mut ctx, A, &[0x80]);
        layer.on_frame_received(&mut ctx, B, &[0x80]);

        let token = ctx.pending_timer(1, TimerKind::Connection).unwrap();
        layer.on_timer(&mut ctx, token);

        assert!(layer.connection(B).is_none());
        assert!(layer.connection(A).is_some());
        assert_eq!(
            ctx.notifications().last(),
            Some(&Notification::Disconnected(B, DisconnectReason::Timeout))
        );
    }

    #[test]
    fn test_local_requests() {
        let mut ctx = RecordingContext::new();
        let mut layer = layer();

        assert!(layer.send_data(&mut ctx, A, 0x300, &[]).unwrap_err().is_not_connected());

        layer.connect(&mut ctx, A).unwrap();
        layer.on_connect_confirm(&mut ctx, A, true);
        assert!(layer.connect(&mut ctx, A).is_err());
        layer.connect(&mut ctx, B).unwrap();
        match layer.connect(&mut ctx, C) {
            Err(KnxError::Connection(e)) => assert!(e.is_no_free_connections()),
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(
            layer.send_data(&mut ctx, A, 0x300, &[]).unwrap(),
            SendStatus::Transmitted
        );

        layer.disconnect(&mut ctx, A);
        layer.disconnect(&mut ctx, C);
        assert_eq!(layer.open_connections(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TransportConfig::default().with_max_apdu_length(0);
        assert!(TransportLayer::<1>::new(config).is_err());
    }
}
