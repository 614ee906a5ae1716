//! Embassy runtime integration.
//!
//! [`EmbassyScheduler`] keeps the armed deadlines of a [`TransportLayer`] in
//! a fixed table and sleeps until the earliest one with `embassy-time`.
//! [`run`] is the driver loop: it waits on inbound frames, local requests and
//! the next deadline at once and feeds whichever completes into the layer.
//!
//! ## Example
//!
//! ```rust,ignore
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! use embassy_sync::channel::Channel;
//! use knx_transport::transport::embassy::{run, EmbassyContext, InboundFrame, LocalRequest};
//!
//! static INBOUND: Channel<CriticalSectionRawMutex, InboundFrame, 4> = Channel::new();
//! static REQUESTS: Channel<CriticalSectionRawMutex, LocalRequest, 4> = Channel::new();
//!
//! #[embassy_executor::task]
//! async fn transport_task(link: Tp1Link, user: ManagementServer) {
//!     let mut layer = TransportLayer::<4>::new(TransportConfig::default()).unwrap();
//!     let mut ctx = EmbassyContext::<_, _, 8>::new(link, user);
//!     run(&mut layer, &mut ctx, INBOUND.receiver(), REQUESTS.receiver()).await;
//! }
//! ```

use crate::addressing::IndividualAddress;
use crate::error::Result;
use crate::net::NetworkLink;
use crate::protocol::tpdu::{Frame, Payload};
use crate::transport::context::{Observer, TransportUser};
use crate::transport::event::DisconnectReason;
use crate::transport::layer::TransportLayer;
use crate::transport::timer::{Scheduler, TimerToken};
use embassy_futures::select::{select3, Either3};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Receiver;
use embassy_time::{Duration, Instant, Timer};

/// Deadline table for up to `T` armed timers
#[derive(Debug, Default)]
pub struct EmbassyScheduler<const T: usize> {
    timers: heapless::Vec<(TimerToken, Instant), T>,
}

impl<const T: usize> EmbassyScheduler<T> {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self {
            timers: heapless::Vec::new(),
        }
    }

    /// Number of armed timers
    pub fn armed(&self) -> usize {
        self.timers.len()
    }

    fn earliest(&self) -> Option<(TimerToken, Instant)> {
        self.timers.iter().copied().min_by_key(|(_, at)| *at)
    }

    /// Wait for the earliest deadline and return its token.
    ///
    /// Pends forever while nothing is armed. Cancel-safe: dropping the future
    /// leaves the table untouched.
    pub async fn next_expired(&mut self) -> TimerToken {
        let Some((token, at)) = self.earliest() else {
            return core::future::pending().await;
        };
        Timer::at(at).await;
        self.timers.retain(|(armed, _)| *armed != token);
        token
    }
}

impl<const T: usize> Scheduler for EmbassyScheduler<T> {
    fn arm(&mut self, token: TimerToken, after: core::time::Duration) {
        // A deadline has one live arming at a time
        self.timers.retain(|(armed, _)| !armed.same_timer(token));

        let micros = u64::try_from(after.as_micros()).unwrap_or(u64::MAX);
        let at = Instant::now()
            .checked_add(Duration::from_micros(micros))
            .unwrap_or(Instant::MAX);
        if self.timers.push((token, at)).is_err() {
            knx_log!(error, "timer table full, {} not armed", token);
        }
    }

    fn cancel(&mut self, token: TimerToken) {
        self.timers.retain(|(armed, _)| *armed != token);
    }
}

/// Link, user and scheduler bundled into one transport context.
#[derive(Debug)]
pub struct EmbassyContext<L, U, const T: usize> {
    /// Outbound side of the network layer
    pub link: L,
    /// Local user receiving notifications
    pub user: U,
    /// Deadline table
    pub scheduler: EmbassyScheduler<T>,
}

impl<L, U, const T: usize> EmbassyContext<L, U, T> {
    /// Bundle `link` and `user` with an empty scheduler.
    pub const fn new(link: L, user: U) -> Self {
        Self {
            link,
            user,
            scheduler: EmbassyScheduler::new(),
        }
    }
}

impl<L: NetworkLink, U, const T: usize> NetworkLink for EmbassyContext<L, U, T> {
    fn send(&mut self, destination: IndividualAddress, tpdu: &[u8]) -> Result<()> {
        self.link.send(destination, tpdu)
    }

    fn is_ready(&self) -> bool {
        self.link.is_ready()
    }
}

impl<L, U, const T: usize> Scheduler for EmbassyContext<L, U, T> {
    fn arm(&mut self, token: TimerToken, after: core::time::Duration) {
        self.scheduler.arm(token, after);
    }

    fn cancel(&mut self, token: TimerToken) {
        self.scheduler.cancel(token);
    }
}

impl<L, U: TransportUser, const T: usize> TransportUser for EmbassyContext<L, U, T> {
    fn on_connected(&mut self, peer: IndividualAddress) {
        self.user.on_connected(peer);
    }

    fn on_connect_failed(&mut self, peer: IndividualAddress, reason: DisconnectReason) {
        self.user.on_connect_failed(peer, reason);
    }

    fn on_data_indication(&mut self, peer: IndividualAddress, apci: u16, payload: &[u8]) {
        self.user.on_data_indication(peer, apci, payload);
    }

    fn on_data_confirmed(&mut self, peer: IndividualAddress) {
        self.user.on_data_confirmed(peer);
    }

    fn on_data_failed(&mut self, peer: IndividualAddress) {
        self.user.on_data_failed(peer);
    }

    fn on_disconnected(&mut self, peer: IndividualAddress, reason: DisconnectReason) {
        self.user.on_disconnected(peer, reason);
    }
}

impl<L, U, const T: usize> Observer for EmbassyContext<L, U, T> {}

/// A frame received from the network layer
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InboundFrame {
    /// Sender
    pub source: IndividualAddress,
    /// Encoded TPDU
    pub bytes: Frame,
}

/// A request from the local user
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LocalRequest {
    /// Open a connection
    Connect(IndividualAddress),
    /// Close a connection
    Disconnect(IndividualAddress),
    /// Send data over an open connection
    SendData {
        /// Connection partner
        peer: IndividualAddress,
        /// 10-bit application control field
        apci: u16,
        /// Data following the APCI octet
        payload: Payload,
    },
}

/// Drive `layer` forever from the two channels and the scheduler.
///
/// Frames accepted by the link count as link-confirmed, so a successful
/// local connect is confirmed right away. Rejected requests are logged;
/// a rejected data request is also reported through `on_data_failed`.
pub async fn run<M, L, U, const N: usize, const T: usize, const Q: usize>(
    layer: &mut TransportLayer<N>,
    ctx: &mut EmbassyContext<L, U, T>,
    inbound: Receiver<'_, M, InboundFrame, Q>,
    requests: Receiver<'_, M, LocalRequest, Q>,
) where
    M: RawMutex,
    L: NetworkLink,
    U: TransportUser,
{
    loop {
        let next = select3(
            inbound.receive(),
            requests.receive(),
            ctx.scheduler.next_expired(),
        )
        .await;

        match next {
            Either3::First(frame) => layer.on_frame_received(ctx, frame.source, &frame.bytes),
            Either3::Second(request) => handle_request(layer, ctx, request),
            Either3::Third(token) => layer.on_timer(ctx, token),
        }
    }
}

fn handle_request<L, U, const N: usize, const T: usize>(
    layer: &mut TransportLayer<N>,
    ctx: &mut EmbassyContext<L, U, T>,
    request: LocalRequest,
) where
    L: NetworkLink,
    U: TransportUser,
{
    match request {
        LocalRequest::Connect(peer) => match layer.connect(ctx, peer) {
            Ok(()) => layer.on_connect_confirm(ctx, peer, true),
            Err(e) => knx_log!(warn, "connect to {} rejected: {}", peer, e),
        },
        LocalRequest::Disconnect(peer) => layer.disconnect(ctx, peer),
        LocalRequest::SendData {
            peer,
            apci,
            payload,
        } => {
            if let Err(e) = layer.send_data(ctx, peer, apci, &payload) {
                knx_log!(warn, "data request to {} rejected: {}", peer, e);
                ctx.user.on_data_failed(peer);
            }
        }
    }
}
