//! # Page Descriptors
//!
//! One [`PageDescriptor`] per physical frame, indexed by frame number. The
//! physical address is the index itself and is never stored.
//!
//! ## Encoding
//!
//! The state lives in a packed 16-bit word:
//!
//! | Bits  | Field       | Meaning |
//! |-------|-------------|---------|
//! | 0–2   | `state`     | [`PageState`] tag |
//! | 3–4   | `zone`      | [`ZoneType`] |
//! | 5–8   | `order`     | block order, for free and allocated heads |
//! | 9     | `present`   | attribute of an allocated head |
//! | 10    | `readwrite` | attribute of an allocated head |
//! | 11    | `user`      | attribute of an allocated head |
//! | 12–15 |             | unused |
//!
//! The word is private; the only way to read or write it is through
//! [`PageState`], which cannot express a free page with attributes, a tail
//! with an order, or any other mixed state.
//!
//! Only the first frame of a block (its *head*) carries the block's order
//! and state. All other frames of the block are [`PageState::Tail`].

use crate::flags::PageAttributes;
use crate::order::Order;
use crate::zone::ZoneType;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{FrameNumber, VirtualAddress};

/// Sentinel for "no neighbour" in the free-list links.
const NO_FRAME: u32 = u32::MAX;

/// Largest number of frames a descriptor table may describe.
pub(crate) const MAX_FRAMES: usize = NO_FRAME as usize;

/// What a frame currently is, as seen by the allocator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PageState {
    /// Not placed in any zone.
    Unmanaged,
    /// Never handed out: kernel image, firmware, descriptor table.
    Reserved,
    /// Head of a free block, listed in its zone's free list for `order`.
    Free { order: Order },
    /// Head of a block owned by a caller.
    Allocated {
        order: Order,
        attributes: PageAttributes,
    },
    /// Any frame of a block other than its head.
    Tail,
}

impl PageState {
    /// Block order, for heads.
    #[inline]
    #[must_use]
    pub const fn order(self) -> Option<Order> {
        match self {
            Self::Free { order } | Self::Allocated { order, .. } => Some(order),
            Self::Unmanaged | Self::Reserved | Self::Tail => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free { .. })
    }

    #[inline]
    #[must_use]
    pub const fn is_allocated(self) -> bool {
        matches!(self, Self::Allocated { .. })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
enum StateTag {
    Unmanaged = 0,
    Reserved = 1,
    Free = 2,
    Allocated = 3,
    Tail = 4,
}

impl StateTag {
    const fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Self::Reserved,
            2 => Self::Free,
            3 => Self::Allocated,
            4 => Self::Tail,
            _ => Self::Unmanaged,
        }
    }

    const fn into_bits(self) -> u8 {
        self as u8
    }
}

#[bitfield(u16)]
#[derive(Eq, PartialEq)]
struct DescriptorBits {
    #[bits(3)]
    state: StateTag,
    #[bits(2)]
    zone: ZoneType,
    #[bits(4)]
    order: u8,
    present: bool,
    readwrite: bool,
    user: bool,
    #[bits(4)]
    __: u8,
}

/// Allocator bookkeeping for one physical frame.
#[derive(Copy, Clone, Debug)]
pub struct PageDescriptor {
    bits: DescriptorBits,
    next: u32,
    prev: u32,
    virt_addr: Option<VirtualAddress>,
}

impl PageDescriptor {
    /// A frame that has not been placed yet.
    pub const UNMANAGED: Self = Self {
        bits: DescriptorBits::new(),
        next: NO_FRAME,
        prev: NO_FRAME,
        virt_addr: None,
    };

    #[must_use]
    pub const fn state(&self) -> PageState {
        let order = match Order::new(self.bits.order()) {
            Some(order) => order,
            None => Order::ZERO,
        };
        match self.bits.state() {
            StateTag::Unmanaged => PageState::Unmanaged,
            StateTag::Reserved => PageState::Reserved,
            StateTag::Free => PageState::Free { order },
            StateTag::Allocated => PageState::Allocated {
                order,
                attributes: PageAttributes::new()
                    .with_present(self.bits.present())
                    .with_readwrite(self.bits.readwrite())
                    .with_user(self.bits.user()),
            },
            StateTag::Tail => PageState::Tail,
        }
    }

    #[inline]
    #[must_use]
    pub const fn zone(&self) -> ZoneType {
        self.bits.zone()
    }

    /// Where the mapper has mapped the block, if it told the allocator.
    #[inline]
    #[must_use]
    pub const fn virt_addr(&self) -> Option<VirtualAddress> {
        self.virt_addr
    }

    /// Replace the state, keeping the zone.
    ///
    /// Free-list links are cleared unless the new state is free.
    pub(crate) const fn set_state(&mut self, state: PageState) {
        let zone = self.bits.zone();
        let mut bits = DescriptorBits::new().with_zone(zone);
        bits = match state {
            PageState::Unmanaged => bits.with_state(StateTag::Unmanaged),
            PageState::Reserved => bits.with_state(StateTag::Reserved),
            PageState::Tail => bits.with_state(StateTag::Tail),
            PageState::Free { order } => bits.with_state(StateTag::Free).with_order(order.get()),
            PageState::Allocated { order, attributes } => bits
                .with_state(StateTag::Allocated)
                .with_order(order.get())
                .with_present(attributes.present())
                .with_readwrite(attributes.readwrite())
                .with_user(attributes.user()),
        };
        self.bits = bits;
        if !state.is_free() {
            self.next = NO_FRAME;
            self.prev = NO_FRAME;
        }
    }

    /// Put the frame into `zone` with the given state.
    pub(crate) const fn place(&mut self, zone: ZoneType, state: PageState) {
        self.bits = self.bits.with_zone(zone);
        self.set_state(state);
        self.virt_addr = None;
    }

    #[inline]
    pub(crate) const fn set_virt_addr(&mut self, va: Option<VirtualAddress>) {
        self.virt_addr = va;
    }

    #[inline]
    pub(crate) const fn next(&self) -> Option<FrameNumber> {
        decode_link(self.next)
    }

    #[inline]
    pub(crate) const fn prev(&self) -> Option<FrameNumber> {
        decode_link(self.prev)
    }

    #[inline]
    pub(crate) const fn set_next(&mut self, frame: Option<FrameNumber>) {
        self.next = encode_link(frame);
    }

    #[inline]
    pub(crate) const fn set_prev(&mut self, frame: Option<FrameNumber>) {
        self.prev = encode_link(frame);
    }
}

impl Default for PageDescriptor {
    fn default() -> Self {
        Self::UNMANAGED
    }
}

#[inline]
const fn decode_link(link: u32) -> Option<FrameNumber> {
    if link == NO_FRAME {
        None
    } else {
        Some(FrameNumber::new(link as usize))
    }
}

#[inline]
#[allow(clippy::cast_possible_truncation)]
const fn encode_link(frame: Option<FrameNumber>) -> u32 {
    match frame {
        // Tables never exceed MAX_FRAMES entries.
        Some(frame) => frame.as_usize() as u32,
        None => NO_FRAME,
    }
}
