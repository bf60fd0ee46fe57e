use crate::{FrameNumber, PhysicalAddress};
use core::fmt;
use core::ops::Range;

/// Half-open range `[start, end)` of physical addresses.
///
/// ### Invariants
/// - `start <= end`; constructors clamp `end` up to `start` otherwise.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct PhysicalRange {
    start: PhysicalAddress,
    end: PhysicalAddress,
}

impl PhysicalRange {
    #[inline]
    #[must_use]
    pub const fn new(start: PhysicalAddress, end: PhysicalAddress) -> Self {
        if end.as_u64() < start.as_u64() {
            Self { start, end: start }
        } else {
            Self { start, end }
        }
    }

    #[inline]
    #[must_use]
    pub const fn from_base_len(start: PhysicalAddress, len: u64) -> Self {
        Self::new(start, PhysicalAddress::new(start.as_u64().saturating_add(len)))
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> PhysicalAddress {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        self.end
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end.as_u64() - self.start.as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, pa: PhysicalAddress) -> bool {
        pa.as_u64() >= self.start.as_u64() && pa.as_u64() < self.end.as_u64()
    }

    /// Whether `other` lies entirely within this range.
    #[inline]
    #[must_use]
    pub const fn contains_range(&self, other: &Self) -> bool {
        other.start.as_u64() >= self.start.as_u64() && other.end.as_u64() <= self.end.as_u64()
    }

    /// Whether both ranges share at least one byte. Empty ranges overlap nothing.
    #[inline]
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start.as_u64() < other.end.as_u64()
            && other.start.as_u64() < self.end.as_u64()
    }

    /// All frames touching this range, partially covered ones included.
    #[inline]
    #[must_use]
    pub const fn covering_frames(&self) -> Range<FrameNumber> {
        self.start.frame()..self.end.frame_ceil()
    }

    /// The part of this range that also lies in `other`; empty if they
    /// do not overlap.
    #[inline]
    #[must_use]
    pub const fn clip(&self, other: &Self) -> Self {
        let start = if self.start.as_u64() > other.start.as_u64() {
            self.start
        } else {
            other.start
        };
        let end = if self.end.as_u64() < other.end.as_u64() {
            self.end
        } else {
            other.end
        };
        Self::new(start, end)
    }
}

impl fmt::Debug for PhysicalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalRange({:?}..{:?})", self.start, self.end)
    }
}

impl fmt::Display for PhysicalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

impl From<Range<PhysicalAddress>> for PhysicalRange {
    #[inline]
    fn from(value: Range<PhysicalAddress>) -> Self {
        Self::new(value.start, value.end)
    }
}
