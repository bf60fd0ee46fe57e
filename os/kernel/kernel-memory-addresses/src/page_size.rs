use core::fmt;
use core::hash::Hash;

mod sealed {
    pub trait Sealed {}
}

/// A page granule of 32-bit x86 paging.
///
/// Only [`Size4K`] and [`Size4M`] implement it.
pub trait PageSize:
    sealed::Sealed + Copy + Ord + Hash + fmt::Display + fmt::Debug
{
    /// Bytes per page; a power of two.
    const SIZE: u64;
    /// `log2(SIZE)`: the number of offset bits in an address.
    const SHIFT: u32;
    /// 4 KiB frames per page.
    const FRAMES: usize = 1 << (Self::SHIFT - 12);

    fn as_str() -> &'static str;
}

macro_rules! page_size {
    ($(#[$doc:meta])* $name:ident, $shift:literal, $label:literal) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl PageSize for $name {
            const SIZE: u64 = 1 << $shift;
            const SHIFT: u32 = $shift;

            fn as_str() -> &'static str {
                $label
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(Self::as_str())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "PageSize({})", Self::as_str())
            }
        }
    };
}

page_size!(
    /// 4 KiB: one frame, mapped by a page table entry.
    Size4K, 12, "4K"
);

page_size!(
    /// 4 MiB: mapped by a page directory entry with `PS=1`, and the size of
    /// the largest buddy block.
    Size4M, 22, "4M"
);
