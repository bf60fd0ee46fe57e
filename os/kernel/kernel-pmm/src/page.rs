use crate::order::Order;
use crate::zone::ZoneType;
use core::fmt;
use kernel_info::memory::{is_direct_mapped, phys_to_virt};
use kernel_memory_addresses::{FrameNumber, PhysicalAddress, PhysicalRange, VirtualAddress};

/// Handle to an allocated block of `2^order` contiguous frames.
///
/// A handle is a plain value: copying it does not duplicate ownership of the
/// memory. The allocator checks every handle passed back to it against the
/// descriptor table, so a stale or forged handle is reported instead of
/// corrupting the free lists.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Page {
    frame: FrameNumber,
    order: Order,
    zone: ZoneType,
}

impl Page {
    /// Rebuild a handle, e.g. from a frame number stored in a page table.
    #[inline]
    #[must_use]
    pub const fn from_raw_parts(frame: FrameNumber, order: Order, zone: ZoneType) -> Self {
        Self { frame, order, zone }
    }

    /// First frame of the block.
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> FrameNumber {
        self.frame
    }

    #[inline]
    #[must_use]
    pub const fn order(&self) -> Order {
        self.order
    }

    #[inline]
    #[must_use]
    pub const fn zone(&self) -> ZoneType {
        self.zone
    }

    /// Number of frames in the block.
    #[inline]
    #[must_use]
    pub const fn pages(&self) -> usize {
        self.order.pages()
    }

    #[inline]
    #[must_use]
    pub const fn phys_addr(&self) -> PhysicalAddress {
        self.frame.base()
    }

    /// Bytes covered by the block.
    #[inline]
    #[must_use]
    pub const fn phys_range(&self) -> PhysicalRange {
        PhysicalRange::from_base_len(self.phys_addr(), self.order.bytes())
    }

    /// The block's address in the kernel's direct map.
    ///
    /// `None` for blocks above the direct map; those must be mapped first.
    #[inline]
    #[must_use]
    pub const fn direct_map_addr(&self) -> Option<VirtualAddress> {
        let last = PhysicalAddress::new(self.phys_range().end().as_u64() - 1);
        if is_direct_mapped(last) {
            Some(phys_to_virt(self.phys_addr()))
        } else {
            None
        }
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("frame", &self.frame)
            .field("order", &self.order)
            .field("zone", &self.zone)
            .finish()
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} order {} block {}",
            self.zone,
            self.order,
            self.phys_range()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses() {
        let page = Page::from_raw_parts(FrameNumber::new(0x400), Order::new(2).unwrap(), ZoneType::Dma);
        assert_eq!(page.phys_addr().as_u64(), 0x40_0000);
        assert_eq!(page.phys_range().len(), 4 * 4096);
        assert_eq!(page.pages(), 4);
        assert_eq!(
            page.direct_map_addr().map(VirtualAddress::as_u64),
            Some(0xC040_0000)
        );
    }

    #[test]
    fn highmem_blocks_are_not_direct_mapped() {
        let page = Page::from_raw_parts(
            PhysicalAddress::new(896 * 1024 * 1024).frame(),
            Order::ZERO,
            ZoneType::HighMem,
        );
        assert_eq!(page.direct_map_addr(), None);

        let below = Page::from_raw_parts(
            PhysicalAddress::new(892 * 1024 * 1024).frame(),
            Order::MAX,
            ZoneType::Normal,
        );
        assert!(below.direct_map_addr().is_some());
    }
}
