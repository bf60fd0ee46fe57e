use crate::{PageSize, PhysicalAddress, Size4K};
use core::fmt;
use core::ops::{Add, AddAssign, Sub};

/// Number of a 4 KiB physical frame, i.e. `physical address >> 12`.
///
/// Frame numbers index the page descriptor table directly. The buddy
/// relations used by the frame allocator are plain bit arithmetic on them:
///
/// - a block of order `k` starts at a frame aligned to `2^k`,
/// - its buddy is `frame XOR 2^k`,
/// - the block both of them form at order `k + 1` starts at the lower one.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FrameNumber(usize);

impl FrameNumber {
    #[inline]
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) const fn from_index_u64(index: u64) -> Self {
        Self(index as usize)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// First byte of the frame.
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new((self.0 as u64) << Size4K::SHIFT)
    }

    /// Whether a block of `2^order` frames may start at this frame.
    #[inline]
    #[must_use]
    pub const fn is_aligned(self, order: u32) -> bool {
        self.0 & ((1 << order) - 1) == 0
    }

    /// The largest order this frame is aligned to (`usize::BITS` for frame 0).
    #[inline]
    #[must_use]
    pub const fn alignment_order(self) -> u32 {
        self.0.trailing_zeros()
    }

    /// The other half of the order `order + 1` block this block belongs to.
    #[inline]
    #[must_use]
    pub const fn buddy(self, order: u32) -> Self {
        Self(self.0 ^ (1 << order))
    }

    /// First frame of the order `order + 1` block formed with the buddy.
    #[inline]
    #[must_use]
    pub const fn parent(self, order: u32) -> Self {
        Self(self.0 & !(1 << order))
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, frames: usize) -> Option<Self> {
        match self.0.checked_add(frames) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:#x})", self.0)
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<PhysicalAddress> for FrameNumber {
    #[inline]
    fn from(value: PhysicalAddress) -> Self {
        value.frame()
    }
}

impl Add<usize> for FrameNumber {
    type Output = Self;
    #[inline]
    fn add(self, rhs: usize) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<usize> for FrameNumber {
    #[inline]
    fn add_assign(&mut self, rhs: usize) {
        self.0 += rhs;
    }
}

impl Sub for FrameNumber {
    type Output = usize;
    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}
