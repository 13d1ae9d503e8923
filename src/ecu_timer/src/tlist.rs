//! Timer collections
//!
//! A [`Tlist`] owns a fixed-capacity arena of timers and keeps the armed ones
//! in an intrusive list ordered by the number of ticks left until their
//! expiry, soonest first. [`Tlist::service`] reads the tick source once and
//! fires expired timers from the front of the list until it finds one that
//! has not expired yet.
//!
//! # Ordering
//!
//! Every armed timer's deadline is measured against the same tick count, and
//! the distance to each one decreases at the same rate as the counter
//! advances, so the order established at insertion stays valid without
//! re-sorting. Overdue timers are ordered by how late they are, most overdue
//! first, and timers whose callback failed stay ahead of all others. Timers
//! with equal deadlines keep their insertion order.
//!
//! # Expiry Callbacks
//!
//! Callbacks receive `&mut Tlist` and may arm, disarm, or reconfigure any
//! timer, including the one being fired. When a callback does that to its own
//! timer, the service pass leaves the timer as the callback configured it.
//! Otherwise:
//!
//!  - A one-shot timer whose callback returned `true` is disarmed.
//!  - A periodic timer whose callback returned `true` starts a new period (see
//!    [`Reschedule`]) and is re-inserted at its sorted position.
//!  - A timer whose callback returned `false` stays expired. It is skipped for
//!    the rest of the current pass and fired again by the next one.
//!
//! During a service pass, every tick count is taken from the single reading
//! made at its start, so timers armed by callbacks are measured against the
//! same instant as the rest of the list.
use core::{fmt, panic::Location};
use arrayvec::ArrayVec;
use ecu_core::{
    assert::{AssertHandler, Fault, Halt},
    dlist::{Iter, ListAccessor, ListHead},
};

use crate::{
    tick::{overflow_mask, Tick, TickSource},
    timer::{TimerCb, TimerFlags, TimerFn, TimerId, TimerKind},
};


/// Where a periodic timer's next period starts after a handled expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Reschedule {
    /// The next period starts at the tick count observed by the service pass.
    /// A late service delays every subsequent expiry.
    #[default]
    FromNow,
    /// The next period starts at the expiry instant that was just handled. A
    /// late service is caught up: the timer fires again in the same pass
    /// while whole periods remain overdue.
    FromDeadline,
}

/// A collection of timers driven by one [`TickSource`].
///
/// `D` is the user data handed to expiry callbacks, `N` is the maximum number
/// of timers, and `A` receives precondition violations.
pub struct Tlist<S, D, const N: usize, A = Halt> {
    timers: ArrayVec<TimerCb<S, D, N, A>, N>,
    /// The armed timers, sorted by remaining ticks.
    active: ListHead<usize>,
    source: S,
    overflow_mask: Tick,
    reschedule: Reschedule,
    handler: A,
    /// The tick count read at the start of the current service pass.
    now: Tick,
    /// `true` while [`Self::service`] is running.
    servicing: bool,
}

impl<S: TickSource, D: Copy, const N: usize> Tlist<S, D, N> {
    /// Construct an empty collection that halts on precondition violations.
    ///
    /// Faults with [`Fault::InvalidArgument`] if `source` reports a tick width
    /// outside `1..=8` bytes.
    #[track_caller]
    pub fn new(source: S) -> Self {
        Self::with_handler(source, Halt)
    }
}

impl<S: TickSource, D: Copy, const N: usize, A: AssertHandler> Tlist<S, D, N, A> {
    /// Construct an empty collection that reports precondition violations to
    /// `handler`.
    #[track_caller]
    pub fn with_handler(source: S, handler: A) -> Self {
        let width = source.tick_width();
        let overflow_mask = match overflow_mask(width) {
            Some(mask) => mask,
            None => handler.on_fault(Fault::InvalidArgument, Location::caller()),
        };
        log::debug!(
            "new timer list: width = {} byte(s), overflow_mask = {:#x}, capacity = {}",
            width,
            overflow_mask,
            N
        );
        Self {
            timers: ArrayVec::new(),
            active: ListHead::new(),
            source,
            overflow_mask,
            reschedule: Reschedule::FromNow,
            handler,
            now: 0,
            servicing: false,
        }
    }

    /// Set the periodic reschedule policy.
    pub fn with_reschedule(mut self, reschedule: Reschedule) -> Self {
        self.reschedule = reschedule;
        self
    }

    pub fn reschedule(&self) -> Reschedule {
        self.reschedule
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn handler(&self) -> &A {
        &self.handler
    }

    /// The overflow mask derived from the tick source's width.
    pub fn overflow_mask(&self) -> Tick {
        self.overflow_mask
    }

    /// The maximum number of timers.
    pub fn capacity(&self) -> usize {
        N
    }

    /// The number of timers added by [`Self::add_timer`], armed or not.
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    #[track_caller]
    fn fault(&self, fault: Fault) -> ! {
        self.handler.on_fault(fault, Location::caller())
    }

    /// Get the arena index of `id`, faulting if it's out of range.
    #[track_caller]
    fn index_of(&self, id: TimerId) -> usize {
        let index = id.index();
        if index >= self.timers.len() {
            self.fault(Fault::BadId);
        }
        index
    }

    #[track_caller]
    fn check_period(&self, period: Tick) {
        if period == 0 || period > self.overflow_mask {
            log::debug!(
                "rejecting period {} (overflow_mask = {:#x})",
                period,
                self.overflow_mask
            );
            self.fault(Fault::InvalidArgument);
        }
    }

    /// Get the tick count that new periods start from. Reads the tick source
    /// unless a service pass is running.
    fn current_ticks(&mut self) -> Tick {
        if !self.servicing {
            self.now = self.source.ticks() & self.overflow_mask;
        }
        self.now
    }

    fn peek_ticks(&self) -> Tick {
        if self.servicing {
            self.now
        } else {
            self.source.ticks() & self.overflow_mask
        }
    }

    /// Remove the timer at `index` from the active list if it's there.
    #[track_caller]
    fn unlink(&mut self, index: usize) {
        if !self.timers[index].is_active() {
            return;
        }
        let result = ListAccessor::new(&mut self.active, &mut self.timers[..]).remove(index);
        if result.is_err() {
            self.fault(Fault::Inconsistent);
        }
    }

    /// Insert the unlinked timer at `index` at its sorted position as
    /// observed at `now`. Overdue timers are ordered by their deadlines, so a
    /// periodic timer catching up does not overtake later deadlines.
    #[track_caller]
    fn link_sorted(&mut self, index: usize, now: Tick) {
        let mask = self.overflow_mask;
        let result = ListAccessor::new(&mut self.active, &mut self.timers[..])
            .push_sorted_or_back(index, |x, y| x.urgency(now, mask) < y.urgency(now, mask));
        if result.is_err() {
            self.fault(Fault::Inconsistent);
        }
    }

    /// Add a disarmed timer to the collection.
    ///
    /// Faults with [`Fault::CapacityExceeded`] if the collection already holds
    /// `N` timers. May be called from an expiry callback.
    #[track_caller]
    pub fn add_timer(&mut self, callback: TimerFn<S, D, N, A>, data: D) -> TimerId {
        if self.timers.try_push(TimerCb::new(callback, data)).is_err() {
            self.fault(Fault::CapacityExceeded);
        }
        let id = TimerId::from_index(self.timers.len() - 1);
        log::trace!("add_timer -> {:?}", id);
        id
    }

    /// Disarm the timer and replace its period and kind. The period is not
    /// validated until the timer is armed.
    #[track_caller]
    pub fn set(&mut self, id: TimerId, period: Tick, kind: TimerKind) {
        let index = self.index_of(id);
        self.unlink(index);
        let timer = &mut self.timers[index];
        timer.period = period;
        timer.kind = kind;
        timer.touch();
        log::trace!("set {:?}: period = {}, kind = {:?}", id, period, kind);
    }

    /// Configure the timer and start it. The timeout period begins at the
    /// current tick count.
    ///
    /// Faults with [`Fault::InvalidArgument`] if `period` is zero or exceeds
    /// [`Self::overflow_mask`]. On a fault, the timer is left unmodified.
    #[track_caller]
    pub fn arm(&mut self, id: TimerId, period: Tick, kind: TimerKind) {
        let index = self.index_of(id);
        self.check_period(period);
        let timer = &mut self.timers[index];
        timer.period = period;
        timer.kind = kind;
        self.start(index);
    }

    /// Restart the timer with its current period and kind. Armed timers start
    /// a fresh timeout period from the current tick count.
    ///
    /// Faults with [`Fault::InvalidArgument`] if the timer was never given a
    /// valid period.
    #[track_caller]
    pub fn rearm(&mut self, id: TimerId) {
        let index = self.index_of(id);
        self.check_period(self.timers[index].period);
        self.start(index);
    }

    #[track_caller]
    fn start(&mut self, index: usize) {
        self.unlink(index);
        let now = self.current_ticks();
        let timer = &mut self.timers[index];
        timer.touch();
        timer.starting_ticks = now;
        log::trace!(
            "arm {:?}: period = {}, kind = {:?}, starting_ticks = {}",
            TimerId::from_index(index),
            timer.period,
            timer.kind,
            now
        );
        self.link_sorted(index, now);
    }

    /// Stop the timer. Does nothing if it's not armed.
    #[track_caller]
    pub fn disarm(&mut self, id: TimerId) {
        let index = self.index_of(id);
        self.unlink(index);
        self.timers[index].touch();
        log::trace!("disarm {:?}", id);
    }

    #[track_caller]
    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers[self.index_of(id)].is_active()
    }

    #[track_caller]
    pub fn period(&self, id: TimerId) -> Tick {
        self.timers[self.index_of(id)].period
    }

    #[track_caller]
    pub fn kind(&self, id: TimerId) -> TimerKind {
        self.timers[self.index_of(id)].kind
    }

    /// Get the user data given to [`Self::add_timer`].
    #[track_caller]
    pub fn data(&self, id: TimerId) -> D {
        self.timers[self.index_of(id)].data
    }

    /// Get the number of ticks left until the timer expires, or `None` if it's
    /// not armed. A timer whose callback failed reports `Some(0)`.
    #[track_caller]
    pub fn remaining(&self, id: TimerId) -> Option<Tick> {
        let timer = &self.timers[self.index_of(id)];
        timer
            .is_active()
            .then(|| timer.remaining(self.peek_ticks(), self.overflow_mask))
    }

    /// Get the number of ticks left until the soonest expiry, or `None` if no
    /// timer is armed.
    pub fn next_expiry(&self) -> Option<Tick> {
        let first = self.active.first?;
        Some(self.timers[first].remaining(self.peek_ticks(), self.overflow_mask))
    }

    /// Iterate over the armed timers, soonest expiry first.
    pub fn iter(&self) -> impl Iterator<Item = TimerId> + '_ {
        Iter::new(&self.active, &self.timers[..]).map(move |entry| match entry {
            Ok((index, _)) => TimerId::from_index(index),
            Err(_) => self.fault(Fault::Inconsistent),
        })
    }

    /// The number of armed timers.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Disarm every timer.
    #[track_caller]
    pub fn clear(&mut self) {
        self.clear_with(|_, _| {});
    }

    /// Disarm every timer, calling `f` for each one that was armed, soonest
    /// expiry first.
    #[track_caller]
    pub fn clear_with(&mut self, mut f: impl FnMut(TimerId, D)) {
        let mut count = 0usize;
        loop {
            let popped = ListAccessor::new(&mut self.active, &mut self.timers[..]).pop_front();
            let index = match popped {
                Ok(Some(index)) => index,
                Ok(None) => break,
                Err(_) => self.fault(Fault::Inconsistent),
            };
            let timer = &mut self.timers[index];
            timer.touch();
            f(TimerId::from_index(index), timer.data);
            count += 1;
        }
        log::debug!("clear: disarmed {} timer(s)", count);
    }

    /// Fire every expired timer.
    ///
    /// Faults with [`Fault::BadContext`] if called from an expiry callback of
    /// this collection. If a callback faults and the handler unwinds, the
    /// collection remains usable.
    #[track_caller]
    pub fn service(&mut self) {
        if self.servicing {
            self.fault(Fault::BadContext);
        }

        let now = self.current_ticks();
        let mut pass = ServicePass::begin(self, now);

        while let Some(index) = pass.list.first_pending() {
            if pass.list.timers[index].remaining(now, pass.list.overflow_mask) > 0 {
                break;
            }
            pass.list.fire(index, now);
            pass.fired += 1;
        }
    }

    /// Find the first armed timer that has not failed during the current
    /// service pass.
    #[track_caller]
    fn first_pending(&self) -> Option<usize> {
        for entry in Iter::new(&self.active, &self.timers[..]) {
            match entry {
                Ok((index, timer)) if !timer.flags.contains(TimerFlags::DEFERRED) => {
                    return Some(index)
                }
                Ok(_) => {}
                Err(_) => self.fault(Fault::Inconsistent),
            }
        }
        None
    }

    #[track_caller]
    fn fire(&mut self, index: usize, now: Tick) {
        let id = TimerId::from_index(index);
        let timer = &mut self.timers[index];
        timer.flags.remove(TimerFlags::RECONFIGURED);
        let (callback, data) = (timer.callback, timer.data);

        log::trace!("fire {:?}", id);
        let handled = callback(self, id, data);

        let timer = &mut self.timers[index];
        if timer.flags.contains(TimerFlags::RECONFIGURED) {
            log::trace!("{:?} was reconfigured by its callback", id);
            return;
        }

        if !handled {
            log::trace!("{:?} failed; retrying on the next pass", id);
            timer.flags.insert(TimerFlags::RETRY | TimerFlags::DEFERRED);
            return;
        }

        timer.flags.remove(TimerFlags::RETRY);
        match timer.kind {
            TimerKind::OneShot => self.unlink(index),
            TimerKind::Periodic => {
                timer.starting_ticks = match self.reschedule {
                    Reschedule::FromNow => now,
                    Reschedule::FromDeadline => {
                        timer.starting_ticks.wrapping_add(timer.period) & self.overflow_mask
                    }
                };
                self.unlink(index);
                self.link_sorted(index, now);
            }
        }
    }

    /// Clear `DEFERRED` from every timer. Returns the number of timers
    /// cleared.
    ///
    /// The deferred timers form a prefix of the active list: each one was the
    /// first pending timer when it failed, and timers whose callback failed
    /// sort ahead of anything inserted later.
    fn clear_deferred(&mut self) -> usize {
        let first = self.active.first;
        let mut cursor = first;
        let mut count = 0;
        while let Some(index) = cursor {
            let timer = &mut self.timers[index];
            if !timer.flags.contains(TimerFlags::DEFERRED) {
                break;
            }
            timer.flags.remove(TimerFlags::DEFERRED);
            count += 1;
            cursor = timer.link.map(|link| link.next).filter(|&next| Some(next) != first);
        }
        count
    }
}

/// An ongoing [`Tlist::service`] call. Ends the pass when dropped, including
/// when a callback's fault unwinds through it.
struct ServicePass<'a, S: TickSource, D: Copy, const N: usize, A: AssertHandler> {
    list: &'a mut Tlist<S, D, N, A>,
    now: Tick,
    fired: usize,
}

impl<'a, S: TickSource, D: Copy, const N: usize, A: AssertHandler> ServicePass<'a, S, D, N, A> {
    fn begin(list: &'a mut Tlist<S, D, N, A>, now: Tick) -> Self {
        list.servicing = true;
        Self {
            list,
            now,
            fired: 0,
        }
    }
}

impl<S: TickSource, D: Copy, const N: usize, A: AssertHandler> Drop for ServicePass<'_, S, D, N, A> {
    fn drop(&mut self) {
        let deferred = self.list.clear_deferred();
        self.list.servicing = false;

        if self.fired > 0 {
            log::debug!(
                "service @ {}: fired {} timer(s), {} deferred",
                self.now,
                self.fired,
                deferred
            );
        }
    }
}

impl<S, D: fmt::Debug, const N: usize, A> fmt::Debug for Tlist<S, D, N, A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        struct ActiveList<'a, S, D, const N: usize, A>(&'a Tlist<S, D, N, A>);

        impl<S, D: fmt::Debug, const N: usize, A> fmt::Debug for ActiveList<'_, S, D, N, A> {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                let list = self.0;
                f.debug_list()
                    .entries(
                        Iter::new(&list.active, &list.timers[..])
                            .map_while(Result::ok)
                            .map(|(index, timer)| (TimerId::from_index(index), timer)),
                    )
                    .finish()
            }
        }

        f.debug_struct("Tlist")
            .field("overflow_mask", &self.overflow_mask)
            .field("reschedule", &self.reschedule)
            .field("now", &self.now)
            .field("servicing", &self.servicing)
            .field("capacity", &N)
            .field("timer_count", &self.timers.len())
            .field("active", &ActiveList(self))
            .finish()
    }
}
