//! Precondition violations and the fatal-assert hook
//!
//! ECU components never return error codes for programmer errors. A violated
//! precondition is reported to an [`AssertHandler`], which must not return.
//! The handler is an ordinary value owned by the component that reports
//! through it, so each component can be given its own strategy: [`Halt`] on a
//! target, [`Unwind`] in a test harness, or anything the application defines.
use core::{fmt, panic::Location};

/// The macro to define [`Fault`].
macro_rules! define_fault {
    (
        $( #[$meta:meta] )*
        pub enum Fault {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident = $vd:expr
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        pub enum Fault {
            $(
                $( #[$vmeta] )*
                $vname = $vd
            ),*
        }

        impl Fault {
            /// Get the short name of the fault.
            ///
            /// # Examples
            ///
            /// ```
            /// use ecu_core::assert::Fault;
            /// assert_eq!(Fault::InvalidArgument.as_str(), "InvalidArgument");
            /// ```
            pub fn as_str(self) -> &'static str {
                match self {
                    $(
                        Self::$vname => stringify!($vname),
                    )*
                }
            }
        }

        impl fmt::Debug for Fault {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_fault! {
    /// The kinds of precondition violation an ECU component can detect.
    ///
    /// The discriminants are stable so that a handler can hand them to a C
    /// fault logger or store them in a retained-RAM crash record.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[repr(i8)]
    pub enum Fault {
        /// A parameter is out of its valid range: a zero period, a period
        /// that the tick counter cannot represent, or a tick width outside
        /// `1..=size_of::<Tick>()`.
        InvalidArgument = -17,
        /// An object handle does not name an object of the component it was
        /// passed to.
        BadId = -18,
        /// The current context disallows the operation, e.g., servicing a
        /// timer collection from inside one of its own expiry callbacks.
        BadContext = -25,
        /// A fixed-capacity container has no room for another object.
        CapacityExceeded = -43,
        /// A linked structure was found in an inconsistent state.
        Inconsistent = -44,
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidArgument => "invalid argument",
            Self::BadId => "bad object id",
            Self::BadContext => "operation not allowed in the current context",
            Self::CapacityExceeded => "capacity exceeded",
            Self::Inconsistent => "inconsistent linked structure",
        })
    }
}

/// The fatal-assert hook.
///
/// `on_fault` receives the violated precondition and the source location of
/// the public operation that detected it. It must not return; the component
/// that called it may be in a half-updated state.
pub trait AssertHandler {
    fn on_fault(&self, fault: Fault, location: &'static Location<'static>) -> !;
}

impl<T: AssertHandler + ?Sized> AssertHandler for &T {
    #[inline]
    fn on_fault(&self, fault: Fault, location: &'static Location<'static>) -> ! {
        (**self).on_fault(fault, location)
    }
}

/// Report `fault` to `handler` unless `cond` holds.
#[inline]
#[track_caller]
pub fn assert_that(handler: &impl AssertHandler, cond: bool, fault: Fault) {
    if !cond {
        handler.on_fault(fault, Location::caller());
    }
}

/// The default handler. Logs the fault and spins forever so that a debugger
/// can be attached to inspect the call stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct Halt;

impl AssertHandler for Halt {
    fn on_fault(&self, fault: Fault, location: &'static Location<'static>) -> ! {
        log::error!("{:?} ({}) at {}", fault, fault, location);
        loop {
            core::hint::spin_loop();
        }
    }
}

/// The panic payload raised by [`Unwind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultReport {
    pub fault: Fault,
    pub location: &'static Location<'static>,
}

impl fmt::Display for FaultReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at {}", self.fault, self.location)
    }
}

/// A handler that unwinds with a [`FaultReport`] payload.
///
/// Meant for host builds and test harnesses, which can observe the fault
/// with `std::panic::catch_unwind` and `downcast_ref::<FaultReport>()`.
#[cfg(any(test, feature = "std"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct Unwind;

#[cfg(any(test, feature = "std"))]
impl AssertHandler for Unwind {
    fn on_fault(&self, fault: Fault, location: &'static Location<'static>) -> ! {
        log::debug!("unwinding on {:?} at {}", fault, location);
        std::panic::panic_any(FaultReport { fault, location })
    }
}
