//! # Allocation Flags
//!
//! A request names the zones it may be served from and the attributes the
//! returned pages should carry. Zone bits decide placement; attribute bits
//! are only recorded in the block's descriptor for the mapper to pick up.
//!
//! | Bit | Name        | Kind      |
//! |-----|-------------|-----------|
//! | 0   | `dma`       | zone      |
//! | 1   | `normal`    | zone      |
//! | 2   | `highmem`   | zone      |
//! | 3   | `present`   | attribute |
//! | 4   | `readwrite` | attribute |
//! | 5   | `user`      | attribute |
//!
//! There is no bit for the reserved zone: callers cannot ask for it.

use crate::ZoneType;
use bitfield_struct::bitfield;
use core::ops::{BitOr, BitOrAssign};

/// Zone eligibility and page attributes of an allocation request.
///
/// ### Example
/// ```rust
/// # use kernel_pmm::{AllocFlags, ZoneType};
/// let flags = AllocFlags::NORMAL | AllocFlags::READWRITE;
/// assert!(flags.allows(ZoneType::Normal));
/// assert!(!flags.allows(ZoneType::Dma));
/// assert!(flags.attributes().readwrite());
/// ```
#[bitfield(u8)]
#[derive(Eq, PartialEq)]
pub struct AllocFlags {
    /// May be served from `[0, 16 MiB)`.
    pub dma: bool,
    /// May be served from the permanently mapped zone.
    pub normal: bool,
    /// May be served from memory above the direct map.
    pub highmem: bool,

    pub present: bool,
    pub readwrite: bool,
    pub user: bool,

    #[bits(2)]
    __: u8,
}

impl AllocFlags {
    pub const DMA: Self = Self::new().with_dma(true);
    pub const NORMAL: Self = Self::new().with_normal(true);
    pub const HIGHMEM: Self = Self::new().with_highmem(true);

    /// Every allocatable zone.
    pub const ANY_ZONE: Self = Self::DMA.union(Self::NORMAL).union(Self::HIGHMEM);

    pub const PRESENT: Self = Self::new().with_present(true);
    pub const READWRITE: Self = Self::new().with_readwrite(true);
    pub const USER: Self = Self::new().with_user(true);

    /// Kernel data: any zone below the direct-map limit, present and writable.
    pub const KERNEL: Self = Self::DMA
        .union(Self::NORMAL)
        .union(Self::PRESENT)
        .union(Self::READWRITE);

    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self::from_bits(self.into_bits() | other.into_bits())
    }

    /// Whether a block from `zone` may satisfy the request.
    ///
    /// Always `false` for [`ZoneType::Reserved`].
    #[inline]
    #[must_use]
    pub const fn allows(self, zone: ZoneType) -> bool {
        match zone {
            ZoneType::Reserved => false,
            ZoneType::Dma => self.dma(),
            ZoneType::Normal => self.normal(),
            ZoneType::HighMem => self.highmem(),
        }
    }

    /// Whether any zone bit is set.
    #[inline]
    #[must_use]
    pub const fn has_zone(self) -> bool {
        self.dma() || self.normal() || self.highmem()
    }

    /// The attribute bits, as recorded in an allocated block's descriptor.
    #[inline]
    #[must_use]
    pub const fn attributes(self) -> PageAttributes {
        PageAttributes::new()
            .with_present(self.present())
            .with_readwrite(self.readwrite())
            .with_user(self.user())
    }
}

impl BitOr for AllocFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl BitOrAssign for AllocFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

/// Attributes of an allocated block, advisory for the mapper.
#[bitfield(u8)]
#[derive(Eq, PartialEq, Hash)]
pub struct PageAttributes {
    pub present: bool,
    pub readwrite: bool,
    pub user: bool,
    #[bits(5)]
    __: u8,
}
