//! # Kernel-wide Page Allocator
//!
//! The boot path builds one [`PageAllocator`] with [`mem_init`] and every
//! subsystem shares it through the functions below. All of them serialize on
//! a single [`SpinLock`], taken with interrupts masked; none of them block
//! beyond that lock.
//!
//! Allocation failure is an ordinary `None`. Configuration errors at init and
//! invalid frees are kernel bugs and panic, after the lock is released.

use crate::descriptor::PageDescriptor;
use crate::flags::AllocFlags;
use crate::order::Order;
use crate::page::Page;
use crate::{InitError, PageAllocator};
use kernel_info::boot::BootMemoryMap;
use kernel_info::memory::{MAX_ORDER, PAGE_SIZE, is_direct_mapped, phys_to_virt};
use kernel_memory_addresses::{FrameNumber, PhysicalAddress, PhysicalRange, Size4K};
use kernel_sync::SpinLock;
use log::{debug, info, warn};

static PAGE_ALLOCATOR: SpinLock<Option<PageAllocator<'static>>> = SpinLock::new(None);

/// Initialize the kernel's page allocator.
///
/// # Errors
/// The reasons of [`PageAllocator::new`], and [`InitError::AlreadyInitialized`]
/// on a second call.
pub fn try_mem_init(
    map: &BootMemoryMap,
    table: &'static mut [PageDescriptor],
) -> Result<(), InitError> {
    let mut slot = PAGE_ALLOCATOR.lock_irq();
    if slot.is_some() {
        return Err(InitError::AlreadyInitialized);
    }
    *slot = Some(PageAllocator::new(map, table)?);
    Ok(())
}

/// Initialize the kernel's page allocator; call exactly once during boot.
///
/// # Panics
/// On any [`InitError`], e.g. less than
/// [`MIN_MEMORY`](kernel_info::memory::MIN_MEMORY) of usable memory. The
/// kernel cannot continue without physical memory management.
pub fn mem_init(map: &BootMemoryMap, table: &'static mut [PageDescriptor]) {
    if let Err(err) = try_mem_init(map, table) {
        panic!("mem_init failed: {err}");
    }
}

/// Where [`mem_init_in_place`] puts the descriptor table: the first page
/// boundary after the kernel image, one descriptor per frame of the map.
#[must_use]
pub fn descriptor_table_range(map: &BootMemoryMap) -> PhysicalRange {
    let frames = map.end().frame_ceil().as_usize();
    let bytes = (frames * size_of::<PageDescriptor>()) as u64;
    PhysicalRange::from_base_len(
        map.kernel_image().end().align_up::<Size4K>(),
        bytes.next_multiple_of(PAGE_SIZE),
    )
}

/// Check the [`descriptor_table_range`] of `map` and reserve it.
///
/// Returns the map with the table excluded from allocation, and the range.
///
/// # Errors
/// - [`InitError::TableNotUsable`] if any frame of the table is reserved,
///   part of the kernel image or outside the usable span.
/// - [`InitError::TableNotDirectMapped`] if the table ends above the direct map.
/// - [`InitError::BootMap`] if the map has no room for another reserved range.
pub fn place_descriptor_table(
    map: BootMemoryMap,
) -> Result<(BootMemoryMap, PhysicalRange), InitError> {
    let range = descriptor_table_range(&map);
    let frames = range.covering_frames();
    if !(frames.start.as_usize()..frames.end.as_usize())
        .all(|frame| map.is_frame_usable(FrameNumber::new(frame)))
    {
        return Err(InitError::TableNotUsable { range });
    }
    let last = PhysicalAddress::new(range.end().as_u64().saturating_sub(1));
    if !is_direct_mapped(last) {
        return Err(InitError::TableNotDirectMapped { range });
    }
    Ok((map.with_reserved(range)?, range))
}

/// Initialize the page allocator with its descriptor table placed in
/// physical memory right after the kernel image.
///
/// The table's frames are checked and reserved by [`place_descriptor_table`]
/// before the allocator is built.
///
/// # Safety
/// Every frame the map calls usable must be mapped writable through the
/// kernel's direct map, and the table's frames must be unused by anything
/// else for the rest of the kernel's lifetime.
///
/// # Panics
/// For the reasons of [`place_descriptor_table`] and [`mem_init`].
pub unsafe fn mem_init_in_place(map: BootMemoryMap) {
    let (map, range) = match place_descriptor_table(map) {
        Ok(placed) => placed,
        Err(err) => panic!("cannot place page descriptors: {err}"),
    };

    let frames = map.end().frame_ceil().as_usize();
    let base = phys_to_virt(range.start()).as_mut_ptr::<PageDescriptor>();
    // SAFETY: The range is usable RAM below the direct-map limit, which the caller
    // guarantees is mapped and exclusively ours; it is page aligned and sized for
    // `frames` descriptors.
    let table = unsafe {
        for index in 0..frames {
            base.add(index).write(PageDescriptor::UNMANAGED);
        }
        core::slice::from_raw_parts_mut(base, frames)
    };

    info!("Placing {frames} page descriptors at {range}");
    mem_init(&map, table);
}

/// Run `f` on the kernel's page allocator, if it is initialized.
///
/// The allocator stays locked while `f` runs.
pub fn with_page_allocator<R>(f: impl FnOnce(&mut PageAllocator<'static>) -> R) -> Option<R> {
    PAGE_ALLOCATOR.lock_irq().as_mut().map(f)
}

/// Allocate `2^order` contiguous frames.
///
/// Returns `None` when no eligible zone has a large enough free block, for
/// an order above [`MAX_ORDER`], and before [`mem_init`].
pub fn alloc_pages(order: u8, flags: AllocFlags) -> Option<Page> {
    let Some(order) = Order::new(order) else {
        warn!("Rejecting allocation of order {order}, maximum is {MAX_ORDER}");
        return None;
    };
    let page = with_page_allocator(|allocator| allocator.alloc_pages(order, flags).ok());
    if page.is_none() {
        warn!("Page allocation before mem_init");
    }
    page.flatten()
}

/// Allocate a single frame; see [`alloc_pages`].
pub fn alloc_page(flags: AllocFlags) -> Option<Page> {
    alloc_pages(0, flags)
}

/// Return a block obtained from [`alloc_pages`] or [`alloc_page`].
///
/// # Panics
/// If `page` does not describe a live allocation (double free, forged or
/// stale handle) or the allocator is not initialized.
pub fn free_page(page: Page) {
    match with_page_allocator(|allocator| allocator.free_pages(page)) {
        Some(Ok(())) => {}
        Some(Err(err)) => panic!("free_page({page}): {err}"),
        None => panic!("free_page({page}) before mem_init"),
    }
}

/// Log the free-list summary of every zone.
pub fn log_debug_stats() {
    match with_page_allocator(|allocator| allocator.stats()) {
        Some(stats) => {
            info!(
                "Physical memory: {} frames, {} reserved, {} free, {} allocated",
                stats.frames,
                stats.reserved_pages,
                stats.free_pages(),
                stats.allocated_pages()
            );
            for zone in &stats.zones {
                info!("  {zone}");
            }
        }
        None => info!("Physical memory: page allocator not initialized"),
    }
}

/// Log everything the allocator knows about the head frame of `page`.
pub fn log_debug_page(page: Page) {
    match with_page_allocator(|allocator| allocator.page_info(page.frame())).flatten() {
        Some(info) => debug!("{info}"),
        None => debug!("{page}: frame not described"),
    }
}
