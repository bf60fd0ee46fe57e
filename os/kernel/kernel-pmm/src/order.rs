use core::fmt;
use kernel_info::memory::{MAX_ORDER, PAGE_SIZE};

/// Number of distinct block orders, `0..=MAX_ORDER`.
pub const ORDERS: usize = MAX_ORDER as usize + 1;

/// Buddy order: log2 of a block's size in frames.
///
/// An order-`k` block spans `2^k` contiguous frames and starts at a frame
/// aligned to `2^k`. Values are always within `0..=MAX_ORDER`.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Order(u8);

impl Order {
    /// A single 4 KiB frame.
    pub const ZERO: Self = Self(0);

    /// A 4 MiB block, the largest the allocator manages.
    pub const MAX: Self = Self(MAX_ORDER);

    /// Returns `None` if `order` exceeds [`MAX_ORDER`].
    #[inline]
    #[must_use]
    pub const fn new(order: u8) -> Option<Self> {
        if order <= MAX_ORDER {
            Some(Self(order))
        } else {
            None
        }
    }

    /// Smallest order whose block holds `bytes`; `None` above 4 MiB.
    ///
    /// ```
    /// # use kernel_pmm::Order;
    /// assert_eq!(Order::for_size(1), Some(Order::ZERO));
    /// assert_eq!(Order::for_size(4097).map(Order::get), Some(1));
    /// assert_eq!(Order::for_size(3 * 1024 * 1024).map(Order::get), Some(10));
    /// assert_eq!(Order::for_size(5 * 1024 * 1024), None);
    /// ```
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn for_size(bytes: u64) -> Option<Self> {
        let pages = bytes.div_ceil(PAGE_SIZE);
        if pages <= 1 {
            return Some(Self::ZERO);
        }
        let order = pages.next_power_of_two().trailing_zeros();
        if order > MAX_ORDER as u32 {
            None
        } else {
            Some(Self(order as u8))
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Number of frames in a block of this order.
    #[inline]
    #[must_use]
    pub const fn pages(self) -> usize {
        1 << self.0
    }

    /// Size of a block of this order in bytes.
    #[inline]
    #[must_use]
    pub const fn bytes(self) -> u64 {
        PAGE_SIZE << self.0
    }

    /// The order of the two halves a block of this order splits into.
    #[inline]
    #[must_use]
    pub const fn lower(self) -> Option<Self> {
        if self.0 == 0 {
            None
        } else {
            Some(Self(self.0 - 1))
        }
    }

    /// The order of the block two buddies of this order merge into.
    #[inline]
    #[must_use]
    pub const fn higher(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }

    /// This order and every larger one, smallest first.
    pub fn and_above(self) -> impl DoubleEndedIterator<Item = Self> {
        (self.0..=MAX_ORDER).map(Self)
    }

    /// Every order, smallest first.
    pub fn all() -> impl DoubleEndedIterator<Item = Self> {
        Self::ZERO.and_above()
    }
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Order({})", self.0)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Order> for u32 {
    #[inline]
    fn from(value: Order) -> Self {
        Self::from(value.0)
    }
}

impl TryFrom<u8> for Order {
    type Error = crate::AllocError;

    fn try_from(order: u8) -> Result<Self, Self::Error> {
        Self::new(order).ok_or(crate::AllocError::InvalidOrder { order })
    }
}
