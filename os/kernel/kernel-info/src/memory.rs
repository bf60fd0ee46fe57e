//! # Memory Layout

use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K, Size4M, VirtualAddress};

/// Size of a physical frame and of a regular page.
pub const PAGE_SIZE: u64 = Size4K::SIZE;

/// Largest buddy order; a block of this order spans `2^MAX_ORDER` frames.
///
/// An order-10 block is 4 MiB, exactly one large page of the page directory.
pub const MAX_ORDER: u8 = 10;

/// Smallest amount of usable physical memory the kernel boots with.
pub const MIN_MEMORY: u64 = 32 * 1024 * 1024;

/// Where the kernel's direct map of low physical memory begins (VMA).
///
/// Physical address `pa` below [`HIGHMEM_ZONE_START`] is accessible at
/// `KERNEL_BASE + pa`.
pub const KERNEL_BASE: u64 = 0xC000_0000;

/// End of the memory window reachable by legacy ISA DMA.
pub const DMA_ZONE_END: u64 = 16 * 1024 * 1024;

/// Start of physical memory that is not covered by the kernel's direct map.
pub const HIGHMEM_ZONE_START: u64 = 896 * 1024 * 1024;

const _: () = {
    assert!(PAGE_SIZE << MAX_ORDER == Size4M::SIZE);
    assert!(MIN_MEMORY.is_multiple_of(Size4M::SIZE));
    assert!(DMA_ZONE_END.is_multiple_of(Size4M::SIZE));
    assert!(HIGHMEM_ZONE_START.is_multiple_of(Size4M::SIZE));
    assert!(DMA_ZONE_END < HIGHMEM_ZONE_START);
    assert!(KERNEL_BASE + HIGHMEM_ZONE_START <= 0x1_0000_0000);
};

/// Translate a physical address into the kernel's direct map.
///
/// Pure arithmetic: the result only refers to mapped memory for addresses
/// below [`HIGHMEM_ZONE_START`].
#[inline]
#[must_use]
pub const fn phys_to_virt(pa: PhysicalAddress) -> VirtualAddress {
    VirtualAddress::new(pa.as_u64() + KERNEL_BASE)
}

/// Translate a direct-map virtual address back to its physical address.
///
/// Addresses below [`KERNEL_BASE`] saturate to physical address zero.
#[inline]
#[must_use]
pub const fn virt_to_phys(va: VirtualAddress) -> PhysicalAddress {
    PhysicalAddress::new(va.as_u64().saturating_sub(KERNEL_BASE))
}

/// Whether `pa` can be reached through [`phys_to_virt`].
#[inline]
#[must_use]
pub const fn is_direct_mapped(pa: PhysicalAddress) -> bool {
    pa.as_u64() < HIGHMEM_ZONE_START
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_map_round_trip() {
        let pa = PhysicalAddress::new(0x0012_3456);
        let va = phys_to_virt(pa);
        assert_eq!(va.as_u64(), 0xC012_3456);
        assert_eq!(virt_to_phys(va), pa);
    }

    #[test]
    fn kernel_base_is_pde_768() {
        let va = phys_to_virt(PhysicalAddress::zero());
        assert_eq!(va.pde_index().as_usize(), 768);
        assert_eq!(va.pte_index().as_usize(), 0);
    }

    #[test]
    fn highmem_is_not_direct_mapped() {
        assert!(is_direct_mapped(PhysicalAddress::new(HIGHMEM_ZONE_START - 1)));
        assert!(!is_direct_mapped(PhysicalAddress::new(HIGHMEM_ZONE_START)));
    }
}
