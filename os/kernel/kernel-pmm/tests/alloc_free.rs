use kernel_info::boot::BootMemoryMap;
use kernel_memory_addresses::{FrameNumber, PhysicalAddress, PhysicalRange, VirtualAddress};
use kernel_pmm::{
    AllocError, AllocFlags, MemoryStats, Order, Page, PageAllocator, PageDescriptor, PageError,
    PageState, ZoneLayout, ZoneType,
};

const MIB: u64 = 1024 * 1024;

fn order(o: u8) -> Order {
    Order::new(o).unwrap()
}

/// `size_mib` of memory from address zero, with the kernel image at `[0, kernel_end)`.
fn boot_map(size_mib: u64, kernel_end: u64) -> BootMemoryMap {
    BootMemoryMap::new(
        PhysicalAddress::zero(),
        size_mib * MIB,
        PhysicalRange::new(PhysicalAddress::zero(), PhysicalAddress::new(kernel_end)),
    )
}

fn table_for(map: &BootMemoryMap) -> Vec<PageDescriptor> {
    vec![PageDescriptor::UNMANAGED; map.end().frame_ceil().as_usize()]
}

/// Free block heads per zone and order, sorted.
fn free_lists(allocator: &PageAllocator<'_>) -> Vec<Vec<usize>> {
    ZoneType::FALLBACK
        .into_iter()
        .flat_map(|zone| Order::all().map(move |order| (zone, order)))
        .map(|(zone, order)| {
            let mut heads: Vec<_> = allocator
                .free_blocks(zone, order)
                .map(FrameNumber::as_usize)
                .collect();
            heads.sort_unstable();
            heads
        })
        .collect()
}

/// Minimal LCG, enough to shuffle operations deterministically.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}

#[test]
fn split_keeps_the_lower_half() {
    // Leaves exactly one order-3 block at frame 8184, in NORMAL.
    let map = boot_map(32, 32 * MIB - 32 * 1024);
    let mut table = table_for(&map);
    let mut allocator = PageAllocator::new(&map, &mut table).unwrap();
    assert_eq!(allocator.stats().free_pages(), 8);
    assert_eq!(
        allocator.free_blocks(ZoneType::Normal, order(3)).collect::<Vec<_>>(),
        [FrameNumber::new(8184)]
    );

    let page = allocator.alloc_pages(order(2), AllocFlags::NORMAL).unwrap();
    assert_eq!(page.frame(), FrameNumber::new(8184));
    assert_eq!(page.zone(), ZoneType::Normal);

    let stats = allocator.stats();
    let normal = stats.zone(ZoneType::Normal).unwrap();
    assert_eq!(stats.free_pages(), 4);
    assert_eq!(normal.free_blocks(order(2)), 1);
    assert_eq!(normal.free_blocks(order(3)), 0);
    assert_eq!(
        allocator.free_blocks(ZoneType::Normal, order(2)).collect::<Vec<_>>(),
        [FrameNumber::new(8188)]
    );
    allocator.verify().unwrap();

    // Coalescing undoes the split exactly.
    allocator.free_pages(page).unwrap();
    assert_eq!(
        allocator.descriptor(FrameNumber::new(8184)).map(PageDescriptor::state),
        Some(PageState::Free { order: order(3) })
    );
    assert_eq!(
        allocator.descriptor(FrameNumber::new(8188)).map(PageDescriptor::state),
        Some(PageState::Tail)
    );
    assert_eq!(
        allocator.free_blocks(ZoneType::Normal, order(3)).collect::<Vec<_>>(),
        [FrameNumber::new(8184)]
    );
    allocator.verify().unwrap();
}

#[test]
fn round_trip_restores_every_order() {
    let map = boot_map(64, 4 * MIB);
    let mut table = table_for(&map);
    let mut allocator = PageAllocator::new(&map, &mut table).unwrap();

    // Fragment the DMA zone a little so the round trips start from mixed lists.
    let pinned = allocator.alloc_pages(order(3), AllocFlags::DMA).unwrap();

    for o in Order::all() {
        let before_stats = allocator.stats();
        let before_lists = free_lists(&allocator);

        let page = allocator.alloc_pages(o, AllocFlags::ANY_ZONE).unwrap();
        assert_eq!(page.order(), o);
        assert_eq!(allocator.stats().free_pages(), before_stats.free_pages() - o.pages());
        allocator.free_pages(page).unwrap();

        assert_eq!(allocator.stats(), before_stats, "order {o}");
        assert_eq!(free_lists(&allocator), before_lists, "order {o}");
        allocator.verify().unwrap();
    }

    allocator.free_pages(pinned).unwrap();
}

#[test]
fn sibling_buddies_coalesce_to_the_top() {
    let map = boot_map(64, 4 * MIB);
    let mut table = table_for(&map);
    let mut allocator = PageAllocator::new(&map, &mut table).unwrap();
    let initial: MemoryStats = allocator.stats();

    let first = allocator.alloc_page(AllocFlags::DMA).unwrap();
    let second = allocator.alloc_page(AllocFlags::DMA).unwrap();
    assert_eq!(first.frame().buddy(0), second.frame());

    allocator.free_pages(first).unwrap();
    let dma = allocator.stats();
    let dma = dma.zone(ZoneType::Dma).unwrap();
    assert_eq!(dma.free_blocks(Order::ZERO), 1);
    assert_eq!(dma.free_blocks(Order::MAX), 2);

    allocator.free_pages(second).unwrap();
    assert_eq!(allocator.stats(), initial);
    let dma = allocator.stats();
    let dma = dma.zone(ZoneType::Dma).unwrap();
    assert_eq!(dma.free_blocks(Order::MAX), 3);
    for o in Order::all().filter(|o| *o != Order::MAX) {
        assert_eq!(dma.free_blocks(o), 0, "order {o}");
    }
    allocator.verify().unwrap();
}

#[test]
fn double_frees_are_detected() {
    let map = boot_map(64, 4 * MIB);
    let mut table = table_for(&map);
    let mut allocator = PageAllocator::new(&map, &mut table).unwrap();

    let page = allocator.alloc_pages(order(1), AllocFlags::NORMAL).unwrap();
    allocator.free_pages(page).unwrap();
    // The block merged back into its order-10 parent.
    assert_eq!(
        allocator.free_pages(page),
        Err(PageError::DoubleFree { frame: page.frame() })
    );

    let lower = allocator.alloc_page(AllocFlags::NORMAL).unwrap();
    let upper = allocator.alloc_page(AllocFlags::NORMAL).unwrap();
    allocator.free_pages(lower).unwrap();
    allocator.free_pages(upper).unwrap();
    assert_eq!(
        allocator.free_pages(upper),
        Err(PageError::DoubleFree { frame: upper.frame() })
    );
    assert_eq!(
        allocator.free_pages(lower),
        Err(PageError::DoubleFree { frame: lower.frame() })
    );
    allocator.verify().unwrap();
}

#[test]
fn mismatched_handles_are_rejected() {
    let map = boot_map(64, 4 * MIB);
    let mut table = table_for(&map);
    let mut allocator = PageAllocator::new(&map, &mut table).unwrap();
    let page = allocator.alloc_pages(order(2), AllocFlags::NORMAL).unwrap();
    let before = allocator.stats();

    let wrong_order = Page::from_raw_parts(page.frame(), order(1), page.zone());
    assert_eq!(
        allocator.free_pages(wrong_order),
        Err(PageError::OrderMismatch {
            frame: page.frame(),
            allocated: order(2),
            requested: order(1)
        })
    );

    let wrong_zone = Page::from_raw_parts(page.frame(), page.order(), ZoneType::HighMem);
    assert_eq!(
        allocator.free_pages(wrong_zone),
        Err(PageError::ZoneMismatch {
            frame: page.frame(),
            actual: ZoneType::Normal,
            claimed: ZoneType::HighMem
        })
    );

    let interior = Page::from_raw_parts(page.frame() + 1, Order::ZERO, page.zone());
    assert_eq!(
        allocator.free_pages(interior),
        Err(PageError::NotAllocated {
            frame: page.frame() + 1
        })
    );

    assert_eq!(allocator.stats(), before);
    allocator.verify().unwrap();
    allocator.free_pages(page).unwrap();
}

#[test]
fn requests_without_a_zone_fail() {
    let map = boot_map(32, 4 * MIB);
    let mut table = table_for(&map);
    let mut allocator = PageAllocator::new(&map, &mut table).unwrap();
    assert_eq!(
        allocator.alloc_page(AllocFlags::PRESENT | AllocFlags::READWRITE),
        Err(AllocError::NoEligibleZone)
    );
}

#[test]
fn zones_are_searched_in_fallback_order() {
    // DMA [4 MiB, 8 MiB), NORMAL [8 MiB, 24 MiB), HIGHMEM [24 MiB, 32 MiB).
    let map = boot_map(32, 4 * MIB);
    let mut table = table_for(&map);
    let layout = ZoneLayout::new(PhysicalAddress::new(8 * MIB), PhysicalAddress::new(24 * MIB));
    let mut allocator = PageAllocator::with_layout(&map, &mut table, layout).unwrap();

    let first = allocator.alloc_pages(Order::MAX, AllocFlags::ANY_ZONE).unwrap();
    assert_eq!(first.zone(), ZoneType::Dma);
    let second = allocator.alloc_pages(Order::MAX, AllocFlags::ANY_ZONE).unwrap();
    assert_eq!(second.zone(), ZoneType::Normal);
    let high = allocator
        .alloc_pages(Order::MAX, AllocFlags::DMA | AllocFlags::HIGHMEM)
        .unwrap();
    assert_eq!(high.zone(), ZoneType::HighMem);
}

#[test]
fn zone_fidelity() {
    let map = boot_map(32, 4 * MIB);
    let mut table = table_for(&map);
    let layout = ZoneLayout::new(PhysicalAddress::new(8 * MIB), PhysicalAddress::new(24 * MIB));
    let mut allocator = PageAllocator::with_layout(&map, &mut table, layout).unwrap();

    let choices = [
        AllocFlags::DMA,
        AllocFlags::NORMAL,
        AllocFlags::HIGHMEM,
        AllocFlags::DMA | AllocFlags::HIGHMEM,
        AllocFlags::KERNEL,
    ];
    let mut rng = Lcg(7);
    let mut live = Vec::new();
    for _ in 0..500 {
        let flags = choices[rng.below(choices.len())];
        let o = order(u8::try_from(rng.below(7)).unwrap());
        match allocator.alloc_pages(o, flags) {
            Ok(page) => {
                assert!(flags.allows(page.zone()), "{page} for {flags:?}");
                assert_ne!(page.zone(), ZoneType::Reserved);
                assert!(allocator.zone(page.zone()).contains(page.frame()));
                live.push(page);
            }
            Err(err) => assert_eq!(err, AllocError::OutOfMemory { order: o }),
        }
        if live.len() > 20 {
            let page = live.swap_remove(rng.below(live.len()));
            allocator.free_pages(page).unwrap();
        }
    }
    allocator.verify().unwrap();
}

#[test]
fn exhaustion_never_degrades_to_smaller_blocks() {
    // A single order-10 block of DMA memory.
    let map = boot_map(32, 4 * MIB);
    let mut table = table_for(&map);
    let layout = ZoneLayout::new(PhysicalAddress::new(8 * MIB), PhysicalAddress::new(24 * MIB));
    let mut allocator = PageAllocator::with_layout(&map, &mut table, layout).unwrap();

    let half = allocator.alloc_pages(order(9), AllocFlags::DMA).unwrap();
    assert_eq!(
        allocator.alloc_pages(Order::MAX, AllocFlags::DMA),
        Err(AllocError::OutOfMemory { order: Order::MAX })
    );
    // Other zones still have 4 MiB blocks; DMA-only requests must not see them.
    assert!(allocator.alloc_pages(Order::MAX, AllocFlags::NORMAL).is_ok());

    let other_half = allocator.alloc_pages(order(9), AllocFlags::DMA).unwrap();
    for o in Order::all() {
        assert_eq!(
            allocator.alloc_pages(o, AllocFlags::DMA),
            Err(AllocError::OutOfMemory { order: o })
        );
    }
    assert_eq!(
        allocator.stats().zone(ZoneType::Dma).map(|z| z.free_pages),
        Some(0)
    );

    allocator.free_pages(half).unwrap();
    allocator.free_pages(other_half).unwrap();
    assert!(allocator.alloc_pages(Order::MAX, AllocFlags::DMA).is_ok());
}

#[test]
fn conservation_and_disjointness_under_churn() {
    let map = boot_map(64, 4 * MIB);
    let mut table = table_for(&map);
    let mut allocator = PageAllocator::new(&map, &mut table).unwrap();
    let initial = allocator.stats();
    let initial_lists = free_lists(&allocator);

    let mut rng = Lcg(0x5EED);
    let mut live: Vec<Page> = Vec::new();
    for step in 0..3000 {
        if live.is_empty() || rng.below(3) != 0 {
            let o = order(u8::try_from(rng.below(8)).unwrap());
            if let Ok(page) = allocator.alloc_pages(o, AllocFlags::KERNEL) {
                live.push(page);
            }
        } else {
            let page = live.swap_remove(rng.below(live.len()));
            allocator.free_pages(page).unwrap();
        }

        let stats = allocator.stats();
        for zone in &stats.zones {
            let in_use: usize = live
                .iter()
                .filter(|page| page.zone() == zone.zone)
                .map(Page::pages)
                .sum();
            assert_eq!(zone.free_pages + in_use, zone.managed_pages, "step {step}");
        }
        if step % 250 == 0 {
            allocator.verify().unwrap();
        }
    }

    let mut ranges: Vec<_> = live.iter().map(Page::phys_range).collect();
    ranges.sort_by_key(PhysicalRange::start);
    for pair in ranges.windows(2) {
        assert!(pair[0].end() <= pair[1].start(), "{} overlaps {}", pair[0], pair[1]);
    }

    for page in live.drain(..) {
        allocator.free_pages(page).unwrap();
    }
    assert_eq!(allocator.stats(), initial);
    assert_eq!(free_lists(&allocator), initial_lists);
    allocator.verify().unwrap();
}

#[test]
fn attributes_and_mappings_are_recorded() {
    let map = boot_map(32, 4 * MIB);
    let mut table = table_for(&map);
    let mut allocator = PageAllocator::new(&map, &mut table).unwrap();

    let flags = AllocFlags::NORMAL | AllocFlags::PRESENT | AllocFlags::USER;
    let page = allocator.alloc_page(flags).unwrap();
    assert_eq!(
        allocator.descriptor(page.frame()).map(PageDescriptor::state),
        Some(PageState::Allocated {
            order: Order::ZERO,
            attributes: flags.attributes()
        })
    );

    let va = VirtualAddress::new(0x4000_0000);
    assert_eq!(allocator.virt_addr(page), Ok(None));
    allocator.set_virt_addr(page, Some(va)).unwrap();
    assert_eq!(allocator.virt_addr(page), Ok(Some(va)));
    assert_eq!(
        allocator.page_info(page.frame()).and_then(|info| info.virt_addr),
        Some(va)
    );
    assert_eq!(allocator.page_at(page.phys_addr()), Some(page));

    allocator.free_pages(page).unwrap();
    assert_eq!(
        allocator.set_virt_addr(page, Some(va)),
        Err(PageError::DoubleFree { frame: page.frame() })
    );
    assert_eq!(allocator.page_at(page.phys_addr()), None);

    let again = allocator.alloc_page(flags).unwrap();
    assert_eq!(again, page);
    assert_eq!(allocator.virt_addr(again), Ok(None));
}
