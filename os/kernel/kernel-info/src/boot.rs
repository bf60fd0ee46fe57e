//! # Kernel Boot Information
//!
//! The boot loader hands over a multiboot memory map: a list of physical
//! regions, each tagged with what firmware believes it is. The frame
//! allocator only needs a reduced view of it, [`BootMemoryMap`]: one usable
//! span, the kernel image inside it, and the holes the allocator must never
//! touch.

use kernel_memory_addresses::{FrameNumber, PageSize, PhysicalAddress, PhysicalRange, Size4K};

/// Number of reserved ranges a [`BootMemoryMap`] can carry besides the kernel image.
pub const MAX_RESERVED_RANGES: usize = 32;

/// Region type as reported by the multiboot memory map.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MemoryRegionKind {
    /// RAM free for use (multiboot type 1).
    Available = 1,
    /// Reserved by firmware or hardware (type 2 and anything unknown).
    Reserved = 2,
    /// ACPI tables; reclaimable once parsed (type 3).
    AcpiReclaimable = 3,
    /// ACPI non-volatile storage, must be preserved across sleep (type 4).
    AcpiNvs = 4,
    /// Defective RAM (type 5).
    BadMemory = 5,
}

impl MemoryRegionKind {
    #[must_use]
    pub const fn from_multiboot(kind: u32) -> Self {
        match kind {
            1 => Self::Available,
            3 => Self::AcpiReclaimable,
            4 => Self::AcpiNvs,
            5 => Self::BadMemory,
            _ => Self::Reserved,
        }
    }
}

/// One entry of the boot memory map.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryRegion {
    /// Physical start address.
    pub base: u64,
    /// Length in **bytes**.
    pub length: u64,
    pub kind: MemoryRegionKind,
}

impl MemoryRegion {
    #[must_use]
    pub const fn new(base: u64, length: u64, kind: MemoryRegionKind) -> Self {
        Self { base, length, kind }
    }

    #[must_use]
    pub const fn range(&self) -> PhysicalRange {
        PhysicalRange::from_base_len(PhysicalAddress::new(self.base), self.length)
    }

    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self.kind, MemoryRegionKind::Available) && self.length > 0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootMemoryMapError {
    #[error("the boot memory map contains no available memory")]
    NoAvailableMemory,
    #[error("more than {capacity} reserved ranges in the boot memory map")]
    TooManyReservedRanges { capacity: usize },
}

/// The physical memory the frame allocator is asked to manage.
///
/// A frame is usable when it lies completely inside [`usable`](Self::usable)
/// and overlaps neither the kernel image nor any [reserved](Self::reserved)
/// range.
#[derive(Clone, Debug)]
pub struct BootMemoryMap {
    usable: PhysicalRange,
    /// Bytes of RAM inside `usable`, excluding firmware holes.
    ram: u64,
    kernel_image: PhysicalRange,
    reserved: [PhysicalRange; MAX_RESERVED_RANGES],
    reserved_len: usize,
}

impl BootMemoryMap {
    /// Usable memory `[base, base + size)` with the kernel image inside it.
    #[must_use]
    pub const fn new(base: PhysicalAddress, size: u64, kernel_image: PhysicalRange) -> Self {
        Self {
            usable: PhysicalRange::from_base_len(base, size),
            ram: size,
            kernel_image,
            reserved: [PhysicalRange::new(PhysicalAddress::zero(), PhysicalAddress::zero());
                MAX_RESERVED_RANGES],
            reserved_len: 0,
        }
    }

    /// Reduce a multiboot memory map.
    ///
    /// The usable span runs from the lowest to the highest byte of any
    /// available region. Every gap between available regions becomes a
    /// reserved range, and so does every other region that reaches into the
    /// span, even where an available region claims the same bytes.
    ///
    /// # Errors
    /// - [`BootMemoryMapError::NoAvailableMemory`] if no region is available.
    /// - [`BootMemoryMapError::TooManyReservedRanges`] if the holes exceed
    ///   [`MAX_RESERVED_RANGES`].
    pub fn from_regions(
        regions: &[MemoryRegion],
        kernel_image: PhysicalRange,
    ) -> Result<Self, BootMemoryMapError> {
        let available = || regions.iter().filter(|r| r.is_available()).map(MemoryRegion::range);

        let start = available()
            .map(|r| r.start())
            .min()
            .ok_or(BootMemoryMapError::NoAvailableMemory)?;
        let end = available()
            .map(|r| r.end())
            .max()
            .ok_or(BootMemoryMapError::NoAvailableMemory)?;

        let mut map = Self::new(start, end.as_u64() - start.as_u64(), kernel_image);

        let mut cursor = start;
        while cursor < end {
            // Skip over every available region covering the cursor.
            if let Some(covered_to) = available()
                .filter(|r| r.contains(cursor))
                .map(|r| r.end())
                .max()
            {
                cursor = covered_to;
                continue;
            }

            let next = available()
                .map(|r| r.start())
                .filter(|s| *s > cursor)
                .min()
                .unwrap_or(end);
            map = map.with_reserved(PhysicalRange::new(cursor, next))?;
            cursor = next;
        }

        // Firmware claims win over overlapping available entries.
        for region in regions.iter().filter(|r| r.kind != MemoryRegionKind::Available) {
            let range = region.range().clip(&map.usable);
            if range.is_empty() || map.reserved().iter().any(|r| r.contains_range(&range)) {
                continue;
            }
            map = map.with_reserved(range)?;
        }

        map.ram = map.count_ram_frames() * Size4K::SIZE;
        Ok(map)
    }

    /// Whole frames of the span that no reserved range touches.
    fn count_ram_frames(&self) -> u64 {
        let frames = self.usable.covering_frames();
        let mut count = 0;
        for index in frames.start.as_usize()..frames.end.as_usize() {
            let bytes = PhysicalRange::from_base_len(FrameNumber::new(index).base(), Size4K::SIZE);
            if self.usable.contains_range(&bytes)
                && !self.reserved().iter().any(|r| r.overlaps(&bytes))
            {
                count += 1;
            }
        }
        count
    }

    /// Exclude another range from allocation.
    ///
    /// # Errors
    /// Fails when [`MAX_RESERVED_RANGES`] ranges are already recorded.
    pub const fn with_reserved(mut self, range: PhysicalRange) -> Result<Self, BootMemoryMapError> {
        if self.reserved_len == MAX_RESERVED_RANGES {
            return Err(BootMemoryMapError::TooManyReservedRanges {
                capacity: MAX_RESERVED_RANGES,
            });
        }
        self.reserved[self.reserved_len] = range;
        self.reserved_len += 1;
        Ok(self)
    }

    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.usable.start()
    }

    /// Size of the usable span in bytes, holes included.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.usable.len()
    }

    /// Bytes of RAM the firmware reported inside the span.
    ///
    /// Holes found by [`from_regions`](Self::from_regions) do not count;
    /// ranges reserved later with [`with_reserved`](Self::with_reserved)
    /// (kernel data, the descriptor table) still do.
    #[must_use]
    pub const fn ram_size(&self) -> u64 {
        self.ram
    }

    /// First byte past the usable span.
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        self.usable.end()
    }

    #[must_use]
    pub const fn usable(&self) -> PhysicalRange {
        self.usable
    }

    #[must_use]
    pub const fn kernel_image(&self) -> PhysicalRange {
        self.kernel_image
    }

    #[must_use]
    pub fn reserved(&self) -> &[PhysicalRange] {
        &self.reserved[..self.reserved_len]
    }

    /// Whether the allocator may hand out `frame`.
    #[must_use]
    pub fn is_frame_usable(&self, frame: FrameNumber) -> bool {
        let bytes = PhysicalRange::from_base_len(frame.base(), Size4K::SIZE);
        self.usable.contains_range(&bytes)
            && !self.kernel_image.overlaps(&bytes)
            && !self.reserved().iter().any(|r| r.overlaps(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn kernel() -> PhysicalRange {
        PhysicalRange::new(PhysicalAddress::new(MIB), PhysicalAddress::new(2 * MIB + 0x800))
    }

    #[test]
    fn frames_around_the_kernel_image() {
        let map = BootMemoryMap::new(PhysicalAddress::zero(), 64 * MIB, kernel());
        assert!(map.is_frame_usable(FrameNumber::new(0)));
        assert!(map.is_frame_usable(FrameNumber::new(0xFF)));
        assert!(!map.is_frame_usable(FrameNumber::new(0x100)));
        // The image ends half way into frame 0x200.
        assert!(!map.is_frame_usable(FrameNumber::new(0x200)));
        assert!(map.is_frame_usable(FrameNumber::new(0x201)));
        assert!(!map.is_frame_usable(FrameNumber::new((64 * MIB / 4096) as usize)));
    }

    #[test]
    fn holes_between_regions_are_reserved() {
        let regions = [
            MemoryRegion::new(0, 0x9_FC00, MemoryRegionKind::Available),
            MemoryRegion::new(0x9_FC00, 0x400, MemoryRegionKind::Reserved),
            MemoryRegion::new(0xF_0000, 0x1_0000, MemoryRegionKind::Reserved),
            MemoryRegion::new(MIB, 127 * MIB, MemoryRegionKind::Available),
            MemoryRegion::new(0xFFFC_0000, 0x4_0000, MemoryRegionKind::Reserved),
        ];
        let map = BootMemoryMap::from_regions(&regions, kernel()).unwrap();

        assert_eq!(map.base(), PhysicalAddress::zero());
        assert_eq!(map.size(), 128 * MIB);
        assert_eq!(
            map.reserved(),
            &[PhysicalRange::new(PhysicalAddress::new(0x9_FC00), PhysicalAddress::new(MIB))]
        );

        // The frame holding the end of low memory is only partially available.
        assert!(map.is_frame_usable(FrameNumber::new(0x9E)));
        assert!(!map.is_frame_usable(FrameNumber::new(0x9F)));
        assert!(!map.is_frame_usable(FrameNumber::new(0xA0)));
        assert!(!map.is_frame_usable(kernel().start().frame()));
        assert!(map.is_frame_usable(PhysicalAddress::new(3 * MIB).frame()));
    }

    #[test]
    fn overlapping_available_regions_merge() {
        let regions = [
            MemoryRegion::new(MIB, 8 * MIB, MemoryRegionKind::Available),
            MemoryRegion::new(4 * MIB, 60 * MIB, MemoryRegionKind::Available),
            MemoryRegion::new(80 * MIB, 16 * MIB, MemoryRegionKind::Available),
        ];
        let map = BootMemoryMap::from_regions(&regions, kernel()).unwrap();
        assert_eq!(map.base().as_u64(), MIB);
        assert_eq!(map.end().as_u64(), 96 * MIB);
        assert_eq!(
            map.reserved(),
            &[PhysicalRange::new(
                PhysicalAddress::new(64 * MIB),
                PhysicalAddress::new(80 * MIB)
            )]
        );
    }

    #[test]
    fn firmware_regions_inside_available_memory_are_reserved() {
        let regions = [
            MemoryRegion::new(0, 64 * MIB, MemoryRegionKind::Available),
            MemoryRegion::new(8 * MIB, 4 * MIB, MemoryRegionKind::Reserved),
            MemoryRegion::new(60 * MIB, 8 * MIB, MemoryRegionKind::AcpiNvs),
            MemoryRegion::new(0xFFFC_0000, 0x4_0000, MemoryRegionKind::BadMemory),
        ];
        let map = BootMemoryMap::from_regions(&regions, kernel()).unwrap();

        assert_eq!(
            map.reserved(),
            &[
                PhysicalRange::new(PhysicalAddress::new(8 * MIB), PhysicalAddress::new(12 * MIB)),
                PhysicalRange::new(PhysicalAddress::new(60 * MIB), PhysicalAddress::new(64 * MIB)),
            ]
        );
        assert!(!map.is_frame_usable(PhysicalAddress::new(8 * MIB).frame()));
        assert!(!map.is_frame_usable(PhysicalAddress::new(12 * MIB - 4096).frame()));
        assert!(map.is_frame_usable(PhysicalAddress::new(12 * MIB).frame()));
        assert_eq!(map.size(), 64 * MIB);
        assert_eq!(map.ram_size(), 56 * MIB);
    }

    #[test]
    fn ram_excludes_holes_but_not_the_kernel() {
        let regions = [
            MemoryRegion::new(0, MIB, MemoryRegionKind::Available),
            MemoryRegion::new(63 * MIB, MIB, MemoryRegionKind::Available),
        ];
        let map = BootMemoryMap::from_regions(&regions, kernel()).unwrap();
        assert_eq!(map.size(), 64 * MIB);
        assert_eq!(map.ram_size(), 2 * MIB);

        let plain = BootMemoryMap::new(PhysicalAddress::zero(), 32 * MIB, kernel());
        let plain = plain
            .with_reserved(PhysicalRange::from_base_len(PhysicalAddress::new(4 * MIB), MIB))
            .unwrap();
        assert_eq!(plain.ram_size(), 32 * MIB);
    }

    #[test]
    fn empty_maps_are_rejected() {
        let regions = [MemoryRegion::new(0, MIB, MemoryRegionKind::Reserved)];
        assert_eq!(
            BootMemoryMap::from_regions(&regions, kernel()).unwrap_err(),
            BootMemoryMapError::NoAvailableMemory
        );
    }

    #[test]
    fn reserved_capacity_is_bounded() {
        let mut map = BootMemoryMap::new(PhysicalAddress::zero(), 64 * MIB, kernel());
        for i in 0..MAX_RESERVED_RANGES as u64 {
            let start = PhysicalAddress::new(8 * MIB + i * Size4K::SIZE);
            map = map
                .with_reserved(PhysicalRange::from_base_len(start, 4096))
                .unwrap();
        }
        assert_eq!(
            map.with_reserved(PhysicalRange::default()).unwrap_err(),
            BootMemoryMapError::TooManyReservedRanges {
                capacity: MAX_RESERVED_RANGES
            }
        );
    }

    #[test]
    fn multiboot_types() {
        assert_eq!(MemoryRegionKind::from_multiboot(1), MemoryRegionKind::Available);
        assert_eq!(MemoryRegionKind::from_multiboot(4), MemoryRegionKind::AcpiNvs);
        assert_eq!(MemoryRegionKind::from_multiboot(42), MemoryRegionKind::Reserved);
    }
}
