//! Connection-oriented transport layer.
//!
//! - [`connection`] - the per-peer state machine
//! - [`layer`] - `N` connections behind one network link
//! - [`context`] - traits the runtime implements for the state machine
//! - [`event`] - states, actions, transitions and notifications
//! - [`timer`] - deadline tokens and the [`Scheduler`] trait
//! - `embassy` - Embassy scheduler and driver loop (`embassy` feature)

pub mod connection;
pub mod context;
#[cfg(feature = "embassy")]
pub mod embassy;
pub mod event;
pub mod layer;
pub mod timer;

pub use connection::{TransportConnection, EVENT_QUEUE_DEPTH};
pub use context::{Observer, TransportContext, TransportUser};
pub use event::{
    Action, ConnectionState, DisconnectReason, Notification, SendStatus, Transition,
};
pub use layer::TransportLayer;
pub use timer::{Scheduler, TimerKind, TimerToken};
