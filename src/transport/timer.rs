//! Connection and acknowledgment deadlines.
//!
//! The state machine owns no clocks. It asks a [`Scheduler`] to fire a
//! [`TimerToken`] after a delay and the surrounding runtime hands the token
//! back through `on_timer` when it expires. Every (re)arm bumps the token's
//! generation, so a firing that raced a cancel or a restart is recognised as
//! stale and dropped.

use core::fmt;
use core::time::Duration;

/// Which of the two deadlines a token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerKind {
    /// Connection liveness, restarted on every valid exchange
    Connection,
    /// Single-shot acknowledgment wait for the outstanding data TPDU
    Acknowledge,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => f.write_str("connection"),
            Self::Acknowledge => f.write_str("acknowledge"),
        }
    }
}

/// Opaque handle identifying one arming of one deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerToken {
    slot: u8,
    kind: TimerKind,
    generation: u16,
}

impl TimerToken {
    /// Connection slot the deadline belongs to
    #[inline]
    pub const fn slot(self) -> u8 {
        self.slot
    }

    /// Which deadline
    #[inline]
    pub const fn kind(self) -> TimerKind {
        self.kind
    }

    /// Arming counter
    #[inline]
    pub const fn generation(self) -> u16 {
        self.generation
    }

    /// Same slot and kind, regardless of generation.
    ///
    /// Schedulers use this to replace an earlier arming of the same deadline.
    #[inline]
    pub fn same_timer(self, other: Self) -> bool {
        self.slot == other.slot && self.kind == other.kind
    }
}

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.kind, self.generation, self.slot)
    }
}

/// Deferred wake-up service provided by the runtime.
pub trait Scheduler {
    /// Fire `token` once, `after` from now.
    fn arm(&mut self, token: TimerToken, after: Duration);

    /// Forget `token` if it has not fired yet.
    ///
    /// Cancelling an unknown or already-fired token must be a no-op.
    fn cancel(&mut self, token: TimerToken);
}

impl<T: Scheduler + ?Sized> Scheduler for &mut T {
    fn arm(&mut self, token: TimerToken, after: Duration) {
        (**self).arm(token, after);
    }

    fn cancel(&mut self, token: TimerToken) {
        (**self).cancel(token);
    }
}

/// One deadline of a connection
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    slot: u8,
    kind: TimerKind,
    generation: u16,
    armed: bool,
}

impl Deadline {
    pub(crate) const fn new(slot: u8, kind: TimerKind) -> Self {
        Self {
            slot,
            kind,
            generation: 0,
            armed: false,
        }
    }

    const fn token(&self) -> TimerToken {
        TimerToken {
            slot: self.slot,
            kind: self.kind,
            generation: self.generation,
        }
    }

    pub(crate) const fn is_armed(&self) -> bool {
        self.armed
    }

    /// Arm, or restart if already running.
    pub(crate) fn start<S: Scheduler + ?Sized>(&mut self, scheduler: &mut S, after: Duration) {
        if self.armed {
            scheduler.cancel(self.token());
        }
        self.generation = self.generation.wrapping_add(1);
        self.armed = true;
        scheduler.arm(self.token(), after);
    }

    /// Disarm. No-op when not running.
    pub(crate) fn stop<S: Scheduler + ?Sized>(&mut self, scheduler: &mut S) {
        if self.armed {
            scheduler.cancel(self.token());
            self.armed = false;
        }
    }

    /// Disarm without cancelling, for an expiry reported out of band.
    ///
    /// Returns whether the deadline was running. The scheduler's copy of the
    /// token is left to fire and be discarded as stale.
    pub(crate) fn disarm(&mut self) -> bool {
        core::mem::replace(&mut self.armed, false)
    }

    /// Consume a firing. `false` for stale or foreign tokens.
    pub(crate) fn expire(&mut self, token: TimerToken) -> bool {
        if self.armed && token == self.token() {
            self.armed = false;
            true
        } else {
            false
        }
    }
}

/// Connection and acknowledgment deadline of one connection
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimerPair {
    pub(crate) connection: Deadline,
    pub(crate) acknowledge: Deadline,
}

impl TimerPair {
    pub(crate) const fn new(slot: u8) -> Self {
        Self {
            connection: Deadline::new(slot, TimerKind::Connection),
            acknowledge: Deadline::new(slot, TimerKind::Acknowledge),
        }
    }

    pub(crate) fn stop_all<S: Scheduler + ?Sized>(&mut self, scheduler: &mut S) {
        self.connection.stop(scheduler);
        self.acknowledge.stop(scheduler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log {
        armed: Vec<TimerToken>,
        cancelled: Vec<TimerToken>,
    }

    impl Scheduler for Log {
        fn arm(&mut self, token: TimerToken, _after: Duration) {
            self.armed.push(token);
        }

        fn cancel(&mut self, token: TimerToken) {
            self.cancelled.push(token);
        }
    }

    #[test]
    fn test_restart_cancels_previous_arming() {
        let mut log = Log::default();
        let mut deadline = Deadline::new(2, TimerKind::Connection);

        deadline.start(&mut log, Duration::from_secs(6));
        deadline.start(&mut log, Duration::from_secs(6));

        assert_eq!(log.armed.len(), 2);
        assert_eq!(log.cancelled, [log.armed[0]]);
        assert!(log.armed[0].same_timer(log.armed[1]));
        assert_ne!(log.armed[0], log.armed[1]);
        assert_eq!(log.armed[1].slot(), 2);
    }

    #[test]
    fn test_stale_token_is_ignored() {
        let mut log = Log::default();
        let mut deadline = Deadline::new(0, TimerKind::Acknowledge);

        deadline.start(&mut log, Duration::from_secs(3));
        let first = log.armed[0];
        deadline.start(&mut log, Duration::from_secs(3));
        let second = log.armed[1];

        assert!(!deadline.expire(first));
        assert!(deadline.expire(second));
        // A token fires at most once
        assert!(!deadline.expire(second));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut log = Log::default();
        let mut pair = TimerPair::new(0);

        pair.connection.start(&mut log, Duration::from_secs(6));
        pair.stop_all(&mut log);
        pair.stop_all(&mut log);

        assert_eq!(log.cancelled.len(), 1);
        assert!(!pair.connection.is_armed());
        assert!(!pair.connection.expire(log.armed[0]));
    }
}
