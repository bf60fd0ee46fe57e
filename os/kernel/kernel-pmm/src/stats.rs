//! # Allocator Statistics
//!
//! Read-only snapshots of the allocator, for diagnostics and tests.

use crate::descriptor::PageState;
use crate::order::{ORDERS, Order};
use crate::zone::ZoneType;
use core::fmt;
use kernel_memory_addresses::{FrameNumber, PhysicalAddress, VirtualAddress};

/// Free-list summary of one allocatable zone.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ZoneStats {
    pub zone: ZoneType,
    /// First frame of the zone window.
    pub start: FrameNumber,
    /// First frame past the zone window.
    pub end: FrameNumber,
    /// Frames the zone manages, free or allocated.
    pub managed_pages: usize,
    pub free_pages: usize,
    /// Number of free blocks per order.
    pub free_blocks: [usize; ORDERS],
}

impl ZoneStats {
    #[inline]
    #[must_use]
    pub const fn allocated_pages(&self) -> usize {
        self.managed_pages - self.free_pages
    }

    #[inline]
    #[must_use]
    pub const fn free_blocks(&self, order: Order) -> usize {
        self.free_blocks[order.as_usize()]
    }
}

impl fmt::Display for ZoneStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<8} {}..{}: {}/{} pages free, blocks [",
            self.zone.name(),
            self.start.base(),
            self.end.base(),
            self.free_pages,
            self.managed_pages
        )?;
        for (order, count) in self.free_blocks.iter().enumerate() {
            if order > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{count}")?;
        }
        f.write_str("]")
    }
}

/// Snapshot of the whole allocator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryStats {
    /// Frames described by the descriptor table.
    pub frames: usize,
    pub reserved_pages: usize,
    /// DMA, NORMAL and HIGHMEM, in that order.
    pub zones: [ZoneStats; 3],
}

impl MemoryStats {
    #[must_use]
    pub fn zone(&self, zone: ZoneType) -> Option<&ZoneStats> {
        self.zones.iter().find(|stats| stats.zone == zone)
    }

    #[must_use]
    pub fn managed_pages(&self) -> usize {
        self.zones.iter().map(|z| z.managed_pages).sum()
    }

    #[must_use]
    pub fn free_pages(&self) -> usize {
        self.zones.iter().map(|z| z.free_pages).sum()
    }

    #[must_use]
    pub fn allocated_pages(&self) -> usize {
        self.zones.iter().map(ZoneStats::allocated_pages).sum()
    }
}

impl fmt::Display for MemoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} frames: {} reserved, {} managed, {} free",
            self.frames,
            self.reserved_pages,
            self.managed_pages(),
            self.free_pages()
        )?;
        for zone in &self.zones {
            writeln!(f, "  {zone}")?;
        }
        Ok(())
    }
}

/// Everything the allocator knows about one frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PageInfo {
    pub frame: FrameNumber,
    pub zone: ZoneType,
    pub state: PageState,
    /// Head and order of the free or allocated block containing the frame.
    pub block: Option<(FrameNumber, Order)>,
    pub virt_addr: Option<VirtualAddress>,
}

impl PageInfo {
    #[inline]
    #[must_use]
    pub const fn phys_addr(&self) -> PhysicalAddress {
        self.frame.base()
    }
}

impl fmt::Display for PageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {} at {}: zone {}, {:?}",
            self.frame,
            self.phys_addr(),
            self.zone,
            self.state
        )?;
        if let Some((head, order)) = self.block {
            write!(f, ", in order {order} block at {head}")?;
        }
        if let Some(va) = self.virt_addr {
            write!(f, ", mapped at {va}")?;
        }
        Ok(())
    }
}
