//! # Memory Zones
//!
//! Physical memory is partitioned by address into zones with different
//! allocation eligibility:
//!
//! ```text
//! 0 ─────────── dma_end ─────────── highmem_start ─────────── end
//! │    DMA      │       NORMAL       │        HIGHMEM          │
//! ```
//!
//! Frames the allocator must not hand out (kernel image, firmware holes,
//! the descriptor table) belong to the reserved zone regardless of address.
//! Both thresholds are multiples of the largest block size, so a buddy pair
//! never straddles two zones.

use crate::error::InitError;
use crate::free_area::FreeArea;
use crate::order::{ORDERS, Order};
use core::fmt;
use core::ops::Range;
use kernel_info::memory::{DMA_ZONE_END, HIGHMEM_ZONE_START};
use kernel_memory_addresses::{FrameNumber, PhysicalAddress};

/// Zone tag, stored in two bits of every page descriptor.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
pub enum ZoneType {
    /// Never allocatable.
    Reserved = 0,
    /// Reachable by legacy ISA DMA.
    Dma = 1,
    /// Permanently mapped by the kernel's direct map.
    Normal = 2,
    /// Above the direct map; must be mapped before use.
    HighMem = 3,
}

impl ZoneType {
    /// All zones in address order.
    pub const ALL: [Self; 4] = [Self::Reserved, Self::Dma, Self::Normal, Self::HighMem];

    /// Order in which allocation requests search zones.
    pub const FALLBACK: [Self; 3] = [Self::Dma, Self::Normal, Self::HighMem];

    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Reserved => "RESERVED",
            Self::Dma => "DMA",
            Self::Normal => "NORMAL",
            Self::HighMem => "HIGHMEM",
        }
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub(crate) const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            1 => Self::Dma,
            2 => Self::Normal,
            3 => Self::HighMem,
            _ => Self::Reserved,
        }
    }

    #[inline]
    pub(crate) const fn into_bits(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Physical thresholds separating DMA, NORMAL and HIGHMEM.
///
/// The default follows [`DMA_ZONE_END`] and [`HIGHMEM_ZONE_START`]. A custom
/// layout must keep both thresholds aligned to [`Order::MAX`] blocks and
/// ordered; [`PageAllocator::with_layout`](crate::PageAllocator::with_layout)
/// rejects it otherwise.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ZoneLayout {
    pub dma_end: PhysicalAddress,
    pub highmem_start: PhysicalAddress,
}

impl ZoneLayout {
    pub const DEFAULT: Self = Self::new(
        PhysicalAddress::new(DMA_ZONE_END),
        PhysicalAddress::new(HIGHMEM_ZONE_START),
    );

    #[must_use]
    pub const fn new(dma_end: PhysicalAddress, highmem_start: PhysicalAddress) -> Self {
        Self {
            dma_end,
            highmem_start,
        }
    }

    pub(crate) const fn validate(&self) -> Result<(), InitError> {
        let block = Order::MAX.bytes();
        let dma_end = self.dma_end.as_u64();
        let highmem_start = self.highmem_start.as_u64();
        if dma_end.is_multiple_of(block)
            && highmem_start.is_multiple_of(block)
            && dma_end <= highmem_start
        {
            Ok(())
        } else {
            Err(InitError::InvalidLayout {
                dma_end: self.dma_end,
                highmem_start: self.highmem_start,
            })
        }
    }

    /// The allocatable zone an address falls into.
    #[must_use]
    pub const fn zone_of(&self, frame: FrameNumber) -> ZoneType {
        let pa = frame.base().as_u64();
        if pa < self.dma_end.as_u64() {
            ZoneType::Dma
        } else if pa < self.highmem_start.as_u64() {
            ZoneType::Normal
        } else {
            ZoneType::HighMem
        }
    }

    /// Frame window of `zone` in a table of `end` frames.
    ///
    /// The reserved zone has no window of its own.
    #[must_use]
    pub fn window(&self, zone: ZoneType, end: FrameNumber) -> Range<FrameNumber> {
        let (start, stop) = match zone {
            ZoneType::Reserved => (FrameNumber::new(0), FrameNumber::new(0)),
            ZoneType::Dma => (FrameNumber::new(0), self.dma_end.frame()),
            ZoneType::Normal => (self.dma_end.frame(), self.highmem_start.frame()),
            ZoneType::HighMem => (self.highmem_start.frame(), end),
        };
        start.min(end)..stop.min(end)
    }
}

impl Default for ZoneLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One zone: its window, its size and its free lists.
#[derive(Debug, Clone)]
pub struct Zone {
    zone_type: ZoneType,
    frames: Range<FrameNumber>,
    length: usize,
    free_areas: [FreeArea; ORDERS],
}

impl Zone {
    pub(crate) const fn new(zone_type: ZoneType, frames: Range<FrameNumber>) -> Self {
        Self {
            zone_type,
            frames,
            length: 0,
            free_areas: [FreeArea::EMPTY; ORDERS],
        }
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.zone_type.name()
    }

    #[inline]
    #[must_use]
    pub const fn zone_type(&self) -> ZoneType {
        self.zone_type
    }

    /// Frames whose address falls into this zone, managed or not.
    #[inline]
    #[must_use]
    pub const fn frames(&self) -> Range<FrameNumber> {
        self.frames.start..self.frames.end
    }

    /// Number of frames the zone manages: free plus allocated.
    ///
    /// For the reserved zone, the number of reserved frames.
    #[inline]
    #[must_use]
    pub const fn length(&self) -> usize {
        self.length
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, frame: FrameNumber) -> bool {
        self.frames.contains(&frame)
    }

    #[inline]
    #[must_use]
    pub const fn free_area(&self, order: Order) -> &FreeArea {
        &self.free_areas[order.as_usize()]
    }

    /// Free frames across all orders.
    #[must_use]
    pub fn free_pages(&self) -> usize {
        Order::all()
            .map(|order| self.free_area(order).count() * order.pages())
            .sum()
    }

    #[inline]
    #[must_use]
    pub fn allocated_pages(&self) -> usize {
        self.length - self.free_pages()
    }

    #[inline]
    pub(crate) const fn free_area_mut(&mut self, order: Order) -> &mut FreeArea {
        &mut self.free_areas[order.as_usize()]
    }

    #[inline]
    pub(crate) const fn add_pages(&mut self, pages: usize) {
        self.length += pages;
    }
}
