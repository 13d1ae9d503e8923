//! Timer records and handles
use core::{cmp::Reverse, fmt, num::NonZeroUsize};
use ecu_core::{assert::Halt, dlist};

use crate::{
    tick::{elapsed, Tick},
    tlist::Tlist,
};

/// An expiry callback.
///
/// Receives the collection the timer belongs to, the timer's own handle, and
/// the user data given to [`Tlist::add_timer`]. Returns `true` if the expiry
/// was handled. Returning `false` keeps the timer expired, and the collection
/// fires it again on the next call to [`Tlist::service`].
///
/// The callback may arm, disarm, or reconfigure any timer of the collection,
/// including the one being fired. It must not call [`Tlist::service`].
pub type TimerFn<S, D, const N: usize, A = Halt> = fn(&mut Tlist<S, D, N, A>, TimerId, D) -> bool;

/// Names a timer of a [`Tlist`].
///
/// A handle is only meaningful for the collection that issued it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(NonZeroUsize);

impl TimerId {
    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(NonZeroUsize::MIN.saturating_add(index))
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0.get() - 1
    }

    /// Get the raw value of the handle. Starts at one and increments by one
    /// per timer added to the collection.
    #[inline]
    pub fn get(self) -> NonZeroUsize {
        self.0
    }
}

impl fmt::Debug for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TimerId({})", self.0)
    }
}

/// Whether a timer stops or restarts after a handled expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimerKind {
    #[default]
    OneShot,
    Periodic,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct TimerFlags: u8 {
        /// The callback reported a failure. The timer counts as expired until
        /// a callback succeeds or the timer is reconfigured.
        const RETRY = 1 << 0;
        /// The callback failed during the current service pass. The pass
        /// skips the timer from now on.
        const DEFERRED = 1 << 1;
        /// The timer was armed, disarmed, or reconfigured. Cleared right
        /// before the callback runs so that the service pass can tell whether
        /// the callback took over the timer.
        const RECONFIGURED = 1 << 2;
    }
}

/// How soon a timer is due, as observed at some tick count. Sorts soonest
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Urgency {
    /// The callback failed and the expiry is still pending.
    Retry,
    /// The deadline has passed by the given number of ticks.
    Overdue(Reverse<Tick>),
    /// The deadline is the given number of ticks away.
    Pending(Tick),
}

/// *Timer control block* - the state data of a timer.
pub(crate) struct TimerCb<S, D, const N: usize, A> {
    pub(crate) link: Option<dlist::Link<usize>>,
    pub(crate) callback: TimerFn<S, D, N, A>,
    pub(crate) data: D,
    /// The timeout period in ticks. `0` until the timer is first configured.
    pub(crate) period: Tick,
    /// The tick count at which the current timeout period began.
    pub(crate) starting_ticks: Tick,
    pub(crate) kind: TimerKind,
    pub(crate) flags: TimerFlags,
}

impl<S, D, const N: usize, A> TimerCb<S, D, N, A> {
    pub(crate) fn new(callback: TimerFn<S, D, N, A>, data: D) -> Self {
        Self {
            link: None,
            callback,
            data,
            period: 0,
            starting_ticks: 0,
            kind: TimerKind::OneShot,
            flags: TimerFlags::empty(),
        }
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.link.is_some()
    }

    /// Get the number of ticks left until expiry as observed at `now`.
    #[inline]
    pub(crate) fn remaining(&self, now: Tick, mask: Tick) -> Tick {
        if self.flags.contains(TimerFlags::RETRY) {
            0
        } else {
            self.period
                .saturating_sub(elapsed(now, self.starting_ticks, mask))
        }
    }

    /// Get the sort key of the timer in the active list as observed at `now`.
    ///
    /// Unlike [`Self::remaining`], this keeps apart timers that are overdue by
    /// different amounts.
    pub(crate) fn urgency(&self, now: Tick, mask: Tick) -> Urgency {
        if self.flags.contains(TimerFlags::RETRY) {
            return Urgency::Retry;
        }
        let elapsed = elapsed(now, self.starting_ticks, mask);
        match self.period.checked_sub(elapsed) {
            Some(remaining) if remaining > 0 => Urgency::Pending(remaining),
            _ => Urgency::Overdue(Reverse(elapsed - self.period)),
        }
    }

    /// Forget any pending retry and mark the timer as reconfigured.
    #[inline]
    pub(crate) fn touch(&mut self) {
        self.flags.remove(TimerFlags::RETRY | TimerFlags::DEFERRED);
        self.flags.insert(TimerFlags::RECONFIGURED);
    }
}

impl<S, D, const N: usize, A> dlist::Linked<usize> for TimerCb<S, D, N, A> {
    #[inline]
    fn link(&self) -> &Option<dlist::Link<usize>> {
        &self.link
    }

    #[inline]
    fn link_mut(&mut self) -> &mut Option<dlist::Link<usize>> {
        &mut self.link
    }
}

impl<S, D: fmt::Debug, const N: usize, A> fmt::Debug for TimerCb<S, D, N, A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TimerCb")
            .field("self", &(self as *const _))
            .field("data", &self.data)
            .field("period", &self.period)
            .field("starting_ticks", &self.starting_ticks)
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .field("link", &self.link)
            .finish()
    }
}
