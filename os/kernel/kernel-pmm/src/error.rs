use crate::order::Order;
use crate::zone::ZoneType;
use kernel_info::boot::BootMemoryMapError;
use kernel_info::memory::MAX_ORDER;
use kernel_memory_addresses::{FrameNumber, PhysicalAddress, PhysicalRange};

/// The allocator could not be built from the boot memory map.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("insufficient physical memory: {size} bytes usable, at least {required} required")]
    InsufficientMemory { size: u64, required: u64 },
    #[error("descriptor table holds {len} entries but {required} frames must be described")]
    TableTooSmall { len: usize, required: usize },
    #[error("{frames} frames exceed the descriptor link range")]
    TooManyFrames { frames: usize },
    #[error("invalid zone layout: DMA ends at {dma_end}, high memory starts at {highmem_start}")]
    InvalidLayout {
        dma_end: PhysicalAddress,
        highmem_start: PhysicalAddress,
    },
    #[error("the page allocator is already initialized")]
    AlreadyInitialized,
    #[error("descriptor table {range} overlaps memory that is not usable RAM")]
    TableNotUsable { range: PhysicalRange },
    #[error("descriptor table {range} is outside the direct map")]
    TableNotDirectMapped { range: PhysicalRange },
    #[error(transparent)]
    BootMap(#[from] BootMemoryMapError),
}

/// An allocation request could not be served.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("out of memory: no free order {order} block in any eligible zone")]
    OutOfMemory { order: Order },
    #[error("allocation flags do not name any zone")]
    NoEligibleZone,
    #[error("order {order} exceeds the maximum order {max}", max = MAX_ORDER)]
    InvalidOrder { order: u8 },
}

/// A page handle does not match the descriptor table.
///
/// Returned before any allocator state is modified.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    #[error("frame {frame} is not described by the page table")]
    UnknownFrame { frame: FrameNumber },
    #[error("double free of frame {frame}")]
    DoubleFree { frame: FrameNumber },
    #[error("frame {frame} is not the head of an allocated block")]
    NotAllocated { frame: FrameNumber },
    #[error("frame {frame} was allocated at order {allocated}, not {requested}")]
    OrderMismatch {
        frame: FrameNumber,
        allocated: Order,
        requested: Order,
    },
    #[error("frame {frame} belongs to zone {actual}, not {claimed}")]
    ZoneMismatch {
        frame: FrameNumber,
        actual: ZoneType,
        claimed: ZoneType,
    },
}

/// First inconsistency found by [`PageAllocator::verify`](crate::PageAllocator::verify).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorruptionError {
    #[error("{zone} order {order} free list: link at frame {frame} is broken")]
    BrokenLink {
        zone: ZoneType,
        order: Order,
        frame: FrameNumber,
    },
    #[error("{zone} order {order} free list: frame {frame} is not a free head of that order")]
    MisplacedBlock {
        zone: ZoneType,
        order: Order,
        frame: FrameNumber,
    },
    #[error("{zone} order {order} free list: count is {count} but {listed} blocks are linked")]
    CountMismatch {
        zone: ZoneType,
        order: Order,
        count: usize,
        listed: usize,
    },
    #[error("{zone} order {order}: {heads} free heads but {listed} listed blocks")]
    UnlistedFreeBlock {
        zone: ZoneType,
        order: Order,
        heads: usize,
        listed: usize,
    },
    #[error("order {order} block at {frame} is misaligned or outside its zone")]
    InvalidBlock { frame: FrameNumber, order: Order },
    #[error("frame {frame} is a tail outside any block")]
    OrphanTail { frame: FrameNumber },
    #[error("frame {frame} lies inside the block at {head} but is not a tail")]
    Overlap { frame: FrameNumber, head: FrameNumber },
    #[error("frame {frame} was never placed in a zone")]
    Unplaced { frame: FrameNumber },
    #[error("zone {zone} manages {length} pages but {accounted} are free or allocated")]
    LengthMismatch {
        zone: ZoneType,
        length: usize,
        accounted: usize,
    },
}
