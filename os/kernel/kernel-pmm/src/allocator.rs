//! # Buddy Engine
//!
//! [`PageAllocator`] owns the descriptor table and the four zones and is the
//! only code that mutates either.
//!
//! ## Blocks
//!
//! A block of order `k` is `2^k` frames starting at a frame aligned to
//! `2^k`. Its head descriptor records the state and order; the remaining
//! frames are tails. The split tree is implicit:
//!
//! ```text
//!   order k+1   [ parent .......................... ]
//!   order k     [ lower = parent ][ upper = parent ^ 2^k ]
//! ```
//!
//! so no parent or child links are stored.
//!
//! ## Policies
//!
//! - Zones are searched DMA, NORMAL, HIGHMEM; only those allowed by the
//!   request's [`AllocFlags`] are considered.
//! - A request pops the smallest non-empty order at or above the requested
//!   one. Splitting keeps the lower half and queues the upper half.
//! - Freeing merges with the buddy while the buddy is a free head of the same
//!   order in the same zone. The merged block starts at the lower buddy.
//! - Free lists are LIFO.

use crate::descriptor::{MAX_FRAMES, PageDescriptor, PageState};
use crate::error::{AllocError, CorruptionError, InitError, PageError};
use crate::flags::AllocFlags;
use crate::order::{ORDERS, Order};
use crate::page::Page;
use crate::stats::{MemoryStats, PageInfo, ZoneStats};
use crate::zone::{Zone, ZoneLayout, ZoneType};
use kernel_info::boot::BootMemoryMap;
use kernel_info::memory::MIN_MEMORY;
use kernel_memory_addresses::{FrameNumber, PhysicalAddress, VirtualAddress};
use log::{debug, info, trace};

/// Buddy allocator over a caller-provided descriptor table.
///
/// ### Invariants
/// - Every described frame is reserved, a block head, or a tail of exactly
///   one block.
/// - Every free head is listed in exactly one free list, the one of its zone
///   and order; list counts match list lengths.
/// - Free and allocated pages of a zone add up to its length.
///
/// [`verify`](Self::verify) checks all of these.
pub struct PageAllocator<'t> {
    table: &'t mut [PageDescriptor],
    zones: [Zone; 4],
}

impl<'t> PageAllocator<'t> {
    /// Build the allocator with the default zone thresholds.
    ///
    /// # Errors
    /// See [`with_layout`](Self::with_layout).
    pub fn new(map: &BootMemoryMap, table: &'t mut [PageDescriptor]) -> Result<Self, InitError> {
        Self::with_layout(map, table, ZoneLayout::DEFAULT)
    }

    /// Build the allocator from the boot memory map.
    ///
    /// `table` must hold one descriptor per frame in `[0, map.end())`; any
    /// surplus entries are left untouched. Frames the map does not declare
    /// usable are reserved. Every other frame is seeded into the free lists
    /// of its zone, in the largest aligned blocks that fit.
    ///
    /// # Errors
    /// - [`InitError::InvalidLayout`] if the zone thresholds are not aligned
    ///   to [`Order::MAX`] blocks or out of order.
    /// - [`InitError::InsufficientMemory`] if the map reports less than
    ///   [`MIN_MEMORY`] of RAM.
    /// - [`InitError::TooManyFrames`] if frame numbers would not fit the
    ///   free-list links.
    /// - [`InitError::TableTooSmall`] if `table` is too short.
    pub fn with_layout(
        map: &BootMemoryMap,
        table: &'t mut [PageDescriptor],
        layout: ZoneLayout,
    ) -> Result<Self, InitError> {
        layout.validate()?;
        if map.ram_size() < MIN_MEMORY {
            return Err(InitError::InsufficientMemory {
                size: map.ram_size(),
                required: MIN_MEMORY,
            });
        }

        let frames = map.end().frame_ceil().as_usize();
        if frames > MAX_FRAMES {
            return Err(InitError::TooManyFrames { frames });
        }
        if table.len() < frames {
            return Err(InitError::TableTooSmall {
                len: table.len(),
                required: frames,
            });
        }

        let (table, _) = table.split_at_mut(frames);
        let end = FrameNumber::new(frames);
        let zones = ZoneType::ALL.map(|zone| Zone::new(zone, layout.window(zone, end)));

        let mut allocator = Self { table, zones };
        allocator.classify(map, &layout);
        for zone in ZoneType::FALLBACK {
            allocator.seed(zone);
        }

        info!(
            "Page allocator manages {} of {frames} frames ({} reserved)",
            frames - allocator.zone(ZoneType::Reserved).length(),
            allocator.zone(ZoneType::Reserved).length()
        );
        for zone in ZoneType::FALLBACK.map(|zone| allocator.zone(zone)) {
            info!(
                "Zone {:<8} {}..{}: {} pages",
                zone.name(),
                zone.frames().start.base(),
                zone.frames().end.base(),
                zone.length()
            );
        }
        Ok(allocator)
    }

    /// Reserve unusable frames; tag usable ones with their zone.
    fn classify(&mut self, map: &BootMemoryMap, layout: &ZoneLayout) {
        let mut reserved = 0;
        for (index, descriptor) in self.table.iter_mut().enumerate() {
            let frame = FrameNumber::new(index);
            if map.is_frame_usable(frame) {
                descriptor.place(layout.zone_of(frame), PageState::Unmanaged);
            } else {
                descriptor.place(ZoneType::Reserved, PageState::Reserved);
                reserved += 1;
            }
        }
        self.zones[ZoneType::Reserved.index()].add_pages(reserved);
    }

    /// Cover the usable frames of `zone` with maximal aligned blocks.
    fn seed(&mut self, zone: ZoneType) {
        let window = self.zones[zone.index()].frames();
        let mut frame = window.start;
        while frame < window.end {
            if !self.is_unseeded_run(frame, 1, window.end) {
                frame += 1;
                continue;
            }

            let aligned = frame.alignment_order();
            let order = Order::all()
                .rev()
                .filter(|order| u32::from(*order) <= aligned)
                .find(|order| self.is_unseeded_run(frame, order.pages(), window.end))
                .unwrap_or(Order::ZERO);

            let head = frame.as_usize();
            for descriptor in &mut self.table[head + 1..head + order.pages()] {
                descriptor.set_state(PageState::Tail);
            }
            self.push_free(zone, frame, order);
            self.zones[zone.index()].add_pages(order.pages());
            frame += order.pages();
        }
    }

    fn is_unseeded_run(&self, start: FrameNumber, pages: usize, end: FrameNumber) -> bool {
        start.checked_add(pages).is_some_and(|stop| stop <= end)
            && self.table[start.as_usize()..start.as_usize() + pages]
                .iter()
                .all(|descriptor| descriptor.state() == PageState::Unmanaged)
    }

    /// Allocate `2^order` contiguous frames.
    ///
    /// # Errors
    /// - [`AllocError::NoEligibleZone`] if `flags` name no zone.
    /// - [`AllocError::OutOfMemory`] if no eligible zone has a free block of
    ///   `order` or larger. A smaller block is never returned instead.
    pub fn alloc_pages(&mut self, order: Order, flags: AllocFlags) -> Result<Page, AllocError> {
        if !flags.has_zone() {
            debug!("Rejecting order {order} allocation without zone: {flags:?}");
            return Err(AllocError::NoEligibleZone);
        }

        for zone in ZoneType::FALLBACK {
            if !flags.allows(zone) {
                continue;
            }
            if let Some(frame) = self.take_block(zone, order) {
                self.table[frame.as_usize()].set_state(PageState::Allocated {
                    order,
                    attributes: flags.attributes(),
                });
                return Ok(Page::from_raw_parts(frame, order, zone));
            }
        }

        debug!("Out of memory for order {order} block: {flags:?}");
        Err(AllocError::OutOfMemory { order })
    }

    /// Allocate a single frame.
    ///
    /// # Errors
    /// See [`alloc_pages`](Self::alloc_pages).
    pub fn alloc_page(&mut self, flags: AllocFlags) -> Result<Page, AllocError> {
        self.alloc_pages(Order::ZERO, flags)
    }

    /// Pop a block of `order` from `zone`, splitting a larger one if needed.
    fn take_block(&mut self, zone: ZoneType, order: Order) -> Option<FrameNumber> {
        let areas = &mut self.zones[zone.index()];
        let table = &mut *self.table;
        let (mut current, frame) = order.and_above().find_map(|candidate| {
            areas
                .free_area_mut(candidate)
                .pop(table)
                .map(|frame| (candidate, frame))
        })?;

        while current > order {
            let Some(half) = current.lower() else { break };
            let upper = frame + half.pages();
            self.push_free(zone, upper, half);
            trace!("Split {zone} order {current} block at {frame}, queued {upper}");
            current = half;
        }
        Some(frame)
    }

    /// Return an allocated block.
    ///
    /// The handle is checked against the descriptor table first; nothing is
    /// modified if it does not describe a live allocation.
    ///
    /// # Errors
    /// - [`PageError::UnknownFrame`] if the frame is not in the table.
    /// - [`PageError::DoubleFree`] if the block is already free.
    /// - [`PageError::NotAllocated`] if the frame is not an allocated head.
    /// - [`PageError::OrderMismatch`] / [`PageError::ZoneMismatch`] if the
    ///   handle disagrees with the table.
    pub fn free_pages(&mut self, page: Page) -> Result<(), PageError> {
        self.check_allocated(page)?;

        let zone = page.zone();
        let window = self.zones[zone.index()].frames();
        let mut frame = page.frame();
        let mut order = page.order();
        self.table[frame.as_usize()].set_virt_addr(None);

        while let Some(merged) = order.higher() {
            let buddy = frame.buddy(u32::from(order));
            if !window.contains(&buddy) {
                break;
            }
            let descriptor = &self.table[buddy.as_usize()];
            if descriptor.zone() != zone || descriptor.state() != (PageState::Free { order }) {
                break;
            }

            self.zones[zone.index()]
                .free_area_mut(order)
                .remove(self.table, buddy);
            let lower = frame.parent(u32::from(order));
            let upper = if lower == frame { buddy } else { frame };
            self.table[upper.as_usize()].set_state(PageState::Tail);
            trace!("Merged {zone} order {order} buddies {lower} and {upper}");

            frame = lower;
            order = merged;
        }

        self.push_free(zone, frame, order);
        Ok(())
    }

    fn push_free(&mut self, zone: ZoneType, frame: FrameNumber, order: Order) {
        self.table[frame.as_usize()].set_state(PageState::Free { order });
        self.zones[zone.index()]
            .free_area_mut(order)
            .push(self.table, frame);
    }

    fn check_allocated(&self, page: Page) -> Result<(), PageError> {
        let frame = page.frame();
        let descriptor = self
            .table
            .get(frame.as_usize())
            .ok_or(PageError::UnknownFrame { frame })?;

        match descriptor.state() {
            PageState::Allocated { order, .. } if order != page.order() => {
                Err(PageError::OrderMismatch {
                    frame,
                    allocated: order,
                    requested: page.order(),
                })
            }
            PageState::Allocated { .. } if descriptor.zone() != page.zone() => {
                Err(PageError::ZoneMismatch {
                    frame,
                    actual: descriptor.zone(),
                    claimed: page.zone(),
                })
            }
            PageState::Allocated { .. } => Ok(()),
            PageState::Free { .. } => Err(PageError::DoubleFree { frame }),
            PageState::Tail => match self.block_containing(frame) {
                // Freed earlier and merged into a larger free block since.
                Some((_, _, PageState::Free { .. })) => Err(PageError::DoubleFree { frame }),
                _ => Err(PageError::NotAllocated { frame }),
            },
            PageState::Unmanaged | PageState::Reserved => Err(PageError::NotAllocated { frame }),
        }
    }

    /// Head, order and state of the free or allocated block holding `frame`.
    fn block_containing(&self, frame: FrameNumber) -> Option<(FrameNumber, Order, PageState)> {
        Order::all().find_map(|order| {
            let head = FrameNumber::new(frame.as_usize() & !(order.pages() - 1));
            let state = self.table.get(head.as_usize())?.state();
            let block = state.order()?;
            (frame - head < block.pages()).then_some((head, block, state))
        })
    }

    /// The allocated block containing `pa`, if any.
    #[must_use]
    pub fn page_at(&self, pa: PhysicalAddress) -> Option<Page> {
        let (head, order, state) = self.block_containing(pa.frame())?;
        state
            .is_allocated()
            .then(|| Page::from_raw_parts(head, order, self.table[head.as_usize()].zone()))
    }

    #[inline]
    #[must_use]
    pub fn descriptor(&self, frame: FrameNumber) -> Option<&PageDescriptor> {
        self.table.get(frame.as_usize())
    }

    /// The virtual address recorded for an allocated block.
    ///
    /// # Errors
    /// The same as [`free_pages`](Self::free_pages) for a handle that does
    /// not describe a live allocation.
    pub fn virt_addr(&self, page: Page) -> Result<Option<VirtualAddress>, PageError> {
        self.check_allocated(page)?;
        Ok(self.table[page.frame().as_usize()].virt_addr())
    }

    /// Record where the mapper has mapped an allocated block.
    ///
    /// The address is dropped when the block is freed.
    ///
    /// # Errors
    /// The same as [`free_pages`](Self::free_pages) for a handle that does
    /// not describe a live allocation.
    pub fn set_virt_addr(
        &mut self,
        page: Page,
        va: Option<VirtualAddress>,
    ) -> Result<(), PageError> {
        self.check_allocated(page)?;
        self.table[page.frame().as_usize()].set_virt_addr(va);
        Ok(())
    }

    #[inline]
    #[must_use]
    pub const fn zone(&self, zone: ZoneType) -> &Zone {
        &self.zones[zone.index()]
    }

    /// Number of frames described by the table.
    #[inline]
    #[must_use]
    pub const fn frames(&self) -> usize {
        self.table.len()
    }

    /// Head frames of the free blocks of `order` in `zone`, in allocation order.
    pub fn free_blocks(&self, zone: ZoneType, order: Order) -> impl Iterator<Item = FrameNumber> + '_ {
        self.zones[zone.index()].free_area(order).iter(self.table)
    }

    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        let zone_stats = |zone_type: ZoneType| {
            let zone = self.zone(zone_type);
            let mut free_blocks = [0; ORDERS];
            for order in Order::all() {
                free_blocks[order.as_usize()] = zone.free_area(order).count();
            }
            ZoneStats {
                zone: zone_type,
                start: zone.frames().start,
                end: zone.frames().end,
                managed_pages: zone.length(),
                free_pages: zone.free_pages(),
                free_blocks,
            }
        };

        MemoryStats {
            frames: self.frames(),
            reserved_pages: self.zone(ZoneType::Reserved).length(),
            zones: ZoneType::FALLBACK.map(zone_stats),
        }
    }

    #[must_use]
    pub fn page_info(&self, frame: FrameNumber) -> Option<PageInfo> {
        let descriptor = self.descriptor(frame)?;
        let block = self
            .block_containing(frame)
            .map(|(head, order, _)| (head, order));
        Some(PageInfo {
            frame,
            zone: descriptor.zone(),
            state: descriptor.state(),
            block,
            virt_addr: block.and_then(|(head, _)| self.table[head.as_usize()].virt_addr()),
        })
    }

    /// Cross-check the descriptor table, the free lists and the zone sizes.
    ///
    /// # Errors
    /// The first inconsistency found.
    pub fn verify(&self) -> Result<(), CorruptionError> {
        let mut listed = [[0; ORDERS]; 4];
        for zone in &self.zones {
            for order in Order::all() {
                listed[zone.zone_type().index()][order.as_usize()] =
                    self.verify_free_list(zone, order)?;
            }
        }

        let mut heads = [[0; ORDERS]; 4];
        let mut accounted = [0; 4];
        let mut index = 0;
        while index < self.table.len() {
            let frame = FrameNumber::new(index);
            let descriptor = &self.table[index];
            let zone = descriptor.zone();
            let order = match descriptor.state() {
                PageState::Reserved => {
                    accounted[ZoneType::Reserved.index()] += 1;
                    index += 1;
                    continue;
                }
                PageState::Unmanaged => return Err(CorruptionError::Unplaced { frame }),
                PageState::Tail => return Err(CorruptionError::OrphanTail { frame }),
                PageState::Free { order } => {
                    heads[zone.index()][order.as_usize()] += 1;
                    order
                }
                PageState::Allocated { order, .. } => order,
            };

            let window = self.zones[zone.index()].frames();
            let end = index + order.pages();
            if zone == ZoneType::Reserved
                || !frame.is_aligned(u32::from(order))
                || !window.contains(&frame)
                || end > window.end.as_usize()
            {
                return Err(CorruptionError::InvalidBlock { frame, order });
            }
            for tail in index + 1..end {
                let descriptor = &self.table[tail];
                if descriptor.state() != PageState::Tail || descriptor.zone() != zone {
                    return Err(CorruptionError::Overlap {
                        frame: FrameNumber::new(tail),
                        head: frame,
                    });
                }
            }

            accounted[zone.index()] += order.pages();
            index = end;
        }

        for zone in &self.zones {
            let zone_type = zone.zone_type();
            for order in Order::all() {
                let heads = heads[zone_type.index()][order.as_usize()];
                let listed = listed[zone_type.index()][order.as_usize()];
                if heads != listed {
                    return Err(CorruptionError::UnlistedFreeBlock {
                        zone: zone_type,
                        order,
                        heads,
                        listed,
                    });
                }
            }
            if accounted[zone_type.index()] != zone.length() {
                return Err(CorruptionError::LengthMismatch {
                    zone: zone_type,
                    length: zone.length(),
                    accounted: accounted[zone_type.index()],
                });
            }
        }
        Ok(())
    }

    /// Walk one free list; returns its length.
    fn verify_free_list(&self, zone: &Zone, order: Order) -> Result<usize, CorruptionError> {
        let area = zone.free_area(order);
        let zone_type = zone.zone_type();
        let mut prev = None;
        let mut listed = 0;
        let mut cursor = area.head();

        while let Some(frame) = cursor {
            let broken = CorruptionError::BrokenLink {
                zone: zone_type,
                order,
                frame,
            };
            let descriptor = self.table.get(frame.as_usize()).ok_or(broken)?;
            if descriptor.prev() != prev || listed >= self.table.len() {
                return Err(broken);
            }
            if descriptor.state() != (PageState::Free { order })
                || descriptor.zone() != zone_type
                || !zone.contains(frame)
            {
                return Err(CorruptionError::MisplacedBlock {
                    zone: zone_type,
                    order,
                    frame,
                });
            }
            listed += 1;
            prev = Some(frame);
            cursor = descriptor.next();
        }

        if listed == area.count() {
            Ok(listed)
        } else {
            Err(CorruptionError::CountMismatch {
                zone: zone_type,
                order,
                count: area.count(),
                listed,
            })
        }
    }
}
