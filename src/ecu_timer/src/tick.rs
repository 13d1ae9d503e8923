//! Ticks, overflow masks, and tick sources
//!
//! # Overflow Mask
//!
//! All tick arithmetic is done in [`Tick`], the widest counter type the engine
//! supports, but the hardware counter behind a [`TickSource`] may be narrower.
//! When an 8-bit counter wraps from `0xff` to `0x00`, the unmasked difference
//! `0x00 - 0xff` computed in `Tick` is `0xffff_ffff_ffff_0001`: correct in the
//! low 8 bits, garbage in the borrowed high bits. ANDing every difference with
//! the overflow mask (`0xff` for an 8-bit counter) discards the garbage:
//!
//! ```text
//!   starting_ticks = 0xf6 (246)       now = 0x04 (4, after wrapping)
//!
//!   now - starting_ticks  = 0xffff_ffff_ffff_ff0e
//!                         & 0x0000_0000_0000_00ff
//!                         = 0x0e (14 ticks elapsed)
//! ```
//!
//! This is only correct while the true elapsed time is below the counter's
//! range, so a collection must be serviced at least once per counter period.
use core::mem::size_of;
use num_traits::{AsPrimitive, PrimInt, Unsigned};


/// The internal tick type. Every narrower hardware counter is hosted in it.
pub type Tick = u64;

// The wraparound arithmetic only works for an unsigned type.
const _: () = assert!(Tick::MIN == 0, "`Tick` must be unsigned");

/// The width of [`Tick`] in bytes; the widest supported counter width.
pub const MAX_TICK_WIDTH: usize = size_of::<Tick>();

/// Calculate the overflow mask for a tick counter that is `width_bytes` bytes
/// wide.
///
/// Returns `None` unless `0 < width_bytes <= MAX_TICK_WIDTH`.
///
/// # Examples
///
/// ```
/// use ecu_timer::tick::overflow_mask;
/// assert_eq!(overflow_mask(1), Some(0xff));
/// assert_eq!(overflow_mask(2), Some(0xffff));
/// assert_eq!(overflow_mask(8), Some(u64::MAX));
/// assert_eq!(overflow_mask(0), None);
/// ```
#[inline]
pub const fn overflow_mask(width_bytes: usize) -> Option<Tick> {
    if width_bytes == 0 || width_bytes > MAX_TICK_WIDTH {
        return None;
    }
    Some(Tick::MAX >> (Tick::BITS as usize - 8 * width_bytes))
}

/// Calculate the number of ticks elapsed from `start` to `now` on a counter
/// described by `mask`, absorbing any wraparound of the counter in between.
#[inline]
pub const fn elapsed(now: Tick, start: Tick, mask: Tick) -> Tick {
    now.wrapping_sub(start) & mask
}

/// Named hardware counter resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// The counter wraps after `u8::MAX`.
    Bits8,
    /// The counter wraps after `u16::MAX`.
    Bits16,
    /// The counter wraps after `u32::MAX`.
    Bits32,
    /// The counter wraps after `u64::MAX`.
    Bits64,
}

impl Resolution {
    pub const fn width_bytes(self) -> usize {
        match self {
            Self::Bits8 => 1,
            Self::Bits16 => 2,
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }

    /// The largest count the counter can hold. Equal to the overflow mask.
    pub const fn max_ticks(self) -> Tick {
        match self {
            Self::Bits8 => u8::MAX as Tick,
            Self::Bits16 => u16::MAX as Tick,
            Self::Bits32 => u32::MAX as Tick,
            Self::Bits64 => u64::MAX,
        }
    }

    pub const fn from_width_bytes(width_bytes: usize) -> Option<Self> {
        match width_bytes {
            1 => Some(Self::Bits8),
            2 => Some(Self::Bits16),
            4 => Some(Self::Bits32),
            8 => Some(Self::Bits64),
            _ => None,
        }
    }
}

/// The interface between a timer collection and the hardware counter that
/// drives it.
pub trait TickSource {
    /// The width of the hardware counter in bytes. Must not change after the
    /// source is handed to a collection.
    fn tick_width(&self) -> usize;

    /// Read the raw count of the hardware counter.
    fn ticks(&self) -> Tick;
}

impl<T: TickSource + ?Sized> TickSource for &T {
    #[inline]
    fn tick_width(&self) -> usize {
        (**self).tick_width()
    }

    #[inline]
    fn ticks(&self) -> Tick {
        (**self).ticks()
    }
}

/// A [`TickSource`] reading a native unsigned counter through a closure. The
/// counter width is that of the closure's return type.
///
/// ```
/// use core::cell::Cell;
/// use ecu_timer::tick::{Counter, TickSource};
///
/// let tim2_cnt = Cell::new(0xfffeu16);
/// let source = Counter::new(|| tim2_cnt.get());
/// assert_eq!(source.tick_width(), 2);
/// assert_eq!(source.ticks(), 0xfffe);
/// ```
#[derive(Clone, Copy)]
pub struct Counter<F>(F);

impl<F> Counter<F> {
    pub const fn new(read: F) -> Self {
        Self(read)
    }
}

impl<F, T> TickSource for Counter<F>
where
    F: Fn() -> T,
    T: PrimInt + Unsigned + AsPrimitive<Tick>,
{
    #[inline]
    fn tick_width(&self) -> usize {
        size_of::<T>()
    }

    #[inline]
    fn ticks(&self) -> Tick {
        (self.0)().as_()
    }
}

/// A [`TickSource`] made of an explicit counter width and a closure returning
/// the raw count already widened to [`Tick`].
///
/// The width is not validated here; the collection that receives the source
/// rejects invalid widths.
#[derive(Clone, Copy)]
pub struct RawTicks<F> {
    width_bytes: usize,
    read: F,
}

impl<F: Fn() -> Tick> RawTicks<F> {
    pub const fn new(width_bytes: usize, read: F) -> Self {
        Self { width_bytes, read }
    }

    pub const fn with_resolution(resolution: Resolution, read: F) -> Self {
        Self::new(resolution.width_bytes(), read)
    }
}

impl<F: Fn() -> Tick> TickSource for RawTicks<F> {
    #[inline]
    fn tick_width(&self) -> usize {
        self.width_bytes
    }

    #[inline]
    fn ticks(&self) -> Tick {
        (self.read)()
    }
}
