//! Table indices of 32-bit two-level paging.
//!
//! A virtual address splits into a 10-bit page directory index (bits
//! `[31:22]`), a 10-bit page table index (bits `[21:12]`) and a 12-bit page
//! offset. Both tables hold 1024 four-byte entries.

use crate::VirtualAddress;

/// Number of entries in a page directory or page table.
const ENTRIES: u16 = 1024;

/// Index into the page directory (derived from VA bits `[31:22]`).
#[doc(alias = "addr_to_pde")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PdeIndex(u16);

/// Index into a page table (derived from VA bits `[21:12]`).
#[doc(alias = "addr_to_pte")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PteIndex(u16);

impl PdeIndex {
    /// Extract bits `[31:22]` of the virtual address.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new(((va.as_u64() >> 22) & 0x3FF) as u16)
    }

    /// Construct from a raw `u16`.
    ///
    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!(v < ENTRIES);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl PteIndex {
    /// Extract bits `[21:12]` of the virtual address.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new(((va.as_u64() >> 12) & 0x3FF) as u16)
    }

    /// Construct from a raw `u16`.
    ///
    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!(v < ENTRIES);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}
