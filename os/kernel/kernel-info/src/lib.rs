//! # Kernel Configuration and Boot Interface
//!
//! Constants and boot hand-off types shared by the kernel's memory subsystems.
//! Everything that decides *where* memory lives is defined here once, so the
//! frame allocator, the paging code and the boot path agree on it.
//!
//! ## Modules
//!
//! ### Boot Information ([`boot`])
//! * **Memory Regions**: multiboot memory map entries and their types
//! * **Boot Memory Map**: the reduced view the frame allocator consumes:
//!   one usable span, the kernel image, and reserved holes
//!
//! ### Memory Layout ([`memory`])
//! * **Frame Geometry**: page size, largest buddy order, minimum memory
//! * **Zone Boundaries**: DMA and high-memory thresholds
//! * **Direct Map**: translation between physical addresses and the
//!   kernel's window at [`KERNEL_BASE`](memory::KERNEL_BASE)
//!
//! ## Address Space Layout
//!
//! The kernel runs with 32-bit two-level paging and maps low physical memory
//! at a fixed offset:
//!
//! ```text
//! Virtual Address Space (32-bit):
//!
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │          User Space             │
//! KERNEL_BASE ├─────────────────────────────────┤ 0xC000_0000 (PDE 768)
//!             │   Direct Map of [0, 896 MiB)    │
//! 0xF800_0000 ├─────────────────────────────────┤
//!             │   Temporary / High Mappings     │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! ## Physical Memory Zones
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  DMA       [0, 16 MiB)          │ ISA DMA reachable
//! 0x0100_0000 ├─────────────────────────────────┤
//!             │  NORMAL    [16 MiB, 896 MiB)    │ permanently direct mapped
//! 0x3800_0000 ├─────────────────────────────────┤
//!             │  HIGHMEM   [896 MiB, end)       │ mapped on demand
//!             └─────────────────────────────────┘
//! ```
//!
//! All boundaries are multiples of 4 MiB, the size of the largest buddy block,
//! so no block ever straddles two zones. Compile-time assertions in
//! [`memory`] keep it that way.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_info::boot::BootMemoryMap;
//! use kernel_info::memory::MIN_MEMORY;
//! use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};
//!
//! let kernel = PhysicalRange::from_base_len(PhysicalAddress::new(0x10_0000), 0x20_0000);
//! let map = BootMemoryMap::new(PhysicalAddress::zero(), MIN_MEMORY, kernel);
//! assert!(!map.is_frame_usable(PhysicalAddress::new(0x10_0000).frame()));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
