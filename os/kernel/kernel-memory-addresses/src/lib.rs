//! # Physical and Virtual Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses, page frame numbers and
//! the index arithmetic of 32-bit two-level paging.
//!
//! ## Overview
//!
//! The physical page allocator and the virtual memory mapper exchange a lot of
//! integers that mean very different things: byte addresses in physical
//! memory, byte addresses in the kernel's virtual address space, and frame
//! numbers indexing the page descriptor table. This crate gives each of them
//! its own zero-cost type so they cannot be mixed up silently.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MemoryAddress`] | A raw address, either physical or virtual. |
//! | [`PhysicalAddress`] | A byte address in physical memory. |
//! | [`VirtualAddress`] | A byte address in a virtual address space. |
//! | [`FrameNumber`] | Index of a 4 KiB physical frame (`address / 4096`). |
//! | [`PhysicalRange`] | A half-open range of physical addresses. |
//! | [`PdeIndex`] / [`PteIndex`] | Page directory / page table slot of a virtual address. |
//!
//! ## Page Sizes
//!
//! Two page sizes exist in 32-bit paging, modelled as marker types
//! implementing [`PageSize`]:
//!
//! - [`Size4K`]: 4 KiB pages, the allocation granularity of the frame allocator
//! - [`Size4M`]: 4 MiB large pages, mapped by a single page directory entry;
//!   also the size of the largest buddy block
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0040_3042);
//! let frame = pa.frame();
//! assert_eq!(frame.as_usize(), 0x403);
//! assert_eq!(frame.base().as_u64(), 0x0040_3000);
//!
//! // Frame 0x403 pairs with 0x402 at order 0; frame 0x404 pairs with 0x400 at order 2.
//! assert_eq!(frame.buddy(0).as_usize(), 0x402);
//! assert_eq!(FrameNumber::new(0x404).buddy(2).as_usize(), 0x400);
//!
//! let va = VirtualAddress::new(0xC040_3042);
//! assert_eq!(va.pde_index().as_usize(), 0x301);
//! assert_eq!(va.pte_index().as_usize(), 0x003);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod frame_number;
mod memory_address;
mod page_size;
mod paging_index;
mod physical_address;
mod physical_range;
mod virtual_address;

pub use frame_number::FrameNumber;
pub use memory_address::MemoryAddress;
pub use page_size::{PageSize, Size4K, Size4M};
pub use paging_index::{PdeIndex, PteIndex};
pub use physical_address::PhysicalAddress;
pub use physical_range::PhysicalRange;
pub use virtual_address::VirtualAddress;
