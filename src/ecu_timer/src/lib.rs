#![doc = include_str!("./lib.md")]
#![cfg_attr(not(test), no_std)] // `no_std` except when building the unit tests
#![forbid(unsafe_code)]
pub mod tick;
pub mod timer;
pub mod tlist;

pub use ecu_core::assert::{AssertHandler, Fault, Halt};
pub use self::{
    tick::{Counter, RawTicks, Resolution, Tick, TickSource},
    timer::{TimerFn, TimerId, TimerKind},
    tlist::{Reschedule, Tlist},
};
