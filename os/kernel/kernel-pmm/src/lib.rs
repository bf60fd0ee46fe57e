//! # Physical Page Allocator
//!
//! Buddy allocator for the kernel's physical memory. All usable RAM is split
//! into power-of-two blocks of 4 KiB frames (4 KiB .. 4 MiB), kept on
//! per-order free lists in one of three allocatable zones, and handed out
//! or taken back as contiguous ranges.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  global: mem_init / alloc_pages / free_page          │
//! │  one IRQ-safe SpinLock around one PageAllocator      │
//! └──────────────────────────┬───────────────────────────┘
//!                            │
//! ┌──────────────────────────▼───────────────────────────┐
//! │  PageAllocator (buddy engine)                        │
//! │  • zone selection: DMA → NORMAL → HIGHMEM            │
//! │  • split on allocation, coalesce on free             │
//! └─────────────┬────────────────────────┬───────────────┘
//!               │                        │
//! ┌─────────────▼──────────┐  ┌──────────▼───────────────┐
//! │  Zones                 │  │  Descriptor table        │
//! │  RESERVED, DMA, NORMAL,│  │  one PageDescriptor per  │
//! │  HIGHMEM; 11 FreeAreas │  │  frame; packed state,    │
//! │  each                  │  │  free-list links         │
//! └────────────────────────┘  └──────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! The allocator can be used on its own over any descriptor storage:
//!
//! ```rust
//! use kernel_info::boot::BootMemoryMap;
//! use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};
//! use kernel_pmm::{AllocFlags, Order, PageAllocator, PageDescriptor, ZoneType};
//!
//! let kernel = PhysicalRange::new(PhysicalAddress::zero(), PhysicalAddress::new(0x40_0000));
//! let map = BootMemoryMap::new(PhysicalAddress::zero(), 64 * 1024 * 1024, kernel);
//! let mut table = vec![PageDescriptor::UNMANAGED; 16 * 1024];
//! let mut pmm = PageAllocator::new(&map, &mut table).unwrap();
//!
//! let page = pmm.alloc_pages(Order::new(2).unwrap(), AllocFlags::KERNEL).unwrap();
//! assert_eq!(page.zone(), ZoneType::Dma);
//! assert_eq!(page.pages(), 4);
//! pmm.free_pages(page).unwrap();
//! assert_eq!(pmm.stats().free_pages(), 15 * 1024);
//! ```
//!
//! The kernel itself goes through the [`global`] functions, re-exported at
//! the crate root.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod allocator;
mod descriptor;
mod error;
mod flags;
mod free_area;
pub mod global;
mod order;
mod page;
mod stats;
mod zone;

pub use allocator::PageAllocator;
pub use descriptor::{PageDescriptor, PageState};
pub use error::{AllocError, CorruptionError, InitError, PageError};
pub use flags::{AllocFlags, PageAttributes};
pub use free_area::FreeArea;
pub use global::{
    alloc_page, alloc_pages, descriptor_table_range, free_page, log_debug_page, log_debug_stats,
    mem_init, mem_init_in_place, place_descriptor_table, try_mem_init, with_page_allocator,
};
pub use order::{ORDERS, Order};
pub use page::Page;
pub use stats::{MemoryStats, PageInfo, ZoneStats};
pub use zone::{Zone, ZoneLayout, ZoneType};
