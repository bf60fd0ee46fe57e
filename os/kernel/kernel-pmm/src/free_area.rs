use crate::descriptor::PageDescriptor;
use kernel_memory_addresses::FrameNumber;

/// Free list of one order in one zone.
///
/// The list is intrusive: it is threaded through the `next`/`prev` frame
/// indices of the head descriptors of its blocks. New blocks are pushed to
/// the front and allocation pops from the front.
///
/// ### Invariants
/// - `count` equals the number of blocks reachable from `head`.
/// - Every listed frame is a free head of this list's order and zone.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FreeArea {
    count: usize,
    head: Option<FrameNumber>,
}

impl FreeArea {
    pub(crate) const EMPTY: Self = Self {
        count: 0,
        head: None,
    };

    /// Number of blocks in the list.
    #[inline]
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The block the next allocation of this order would take.
    #[inline]
    #[must_use]
    pub const fn head(&self) -> Option<FrameNumber> {
        self.head
    }

    pub(crate) fn push(&mut self, table: &mut [PageDescriptor], frame: FrameNumber) {
        if let Some(old) = self.head {
            table[old.as_usize()].set_prev(Some(frame));
        }
        let descriptor = &mut table[frame.as_usize()];
        descriptor.set_prev(None);
        descriptor.set_next(self.head);
        self.head = Some(frame);
        self.count += 1;
    }

    pub(crate) fn pop(&mut self, table: &mut [PageDescriptor]) -> Option<FrameNumber> {
        let frame = self.head?;
        self.remove(table, frame);
        Some(frame)
    }

    /// Unlink `frame`, which must be a member of this list.
    pub(crate) fn remove(&mut self, table: &mut [PageDescriptor], frame: FrameNumber) {
        let descriptor = &mut table[frame.as_usize()];
        let (prev, next) = (descriptor.prev(), descriptor.next());
        descriptor.set_prev(None);
        descriptor.set_next(None);

        match prev {
            Some(prev) => table[prev.as_usize()].set_next(next),
            None => {
                debug_assert_eq!(self.head, Some(frame));
                self.head = next;
            }
        }
        if let Some(next) = next {
            table[next.as_usize()].set_prev(prev);
        }
        self.count -= 1;
    }

    /// Walk the list from the front.
    pub(crate) fn iter<'a>(&self, table: &'a [PageDescriptor]) -> FreeAreaIter<'a> {
        FreeAreaIter {
            table,
            next: self.head,
        }
    }
}

pub(crate) struct FreeAreaIter<'a> {
    table: &'a [PageDescriptor],
    next: Option<FrameNumber>,
}

impl Iterator for FreeAreaIter<'_> {
    type Item = FrameNumber;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.next?;
        self.next = self.table.get(frame.as_usize()).and_then(PageDescriptor::next);
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(area: &FreeArea, table: &[PageDescriptor]) -> Vec<usize> {
        area.iter(table).map(FrameNumber::as_usize).collect()
    }

    #[test]
    fn lifo_order() {
        let mut table = [PageDescriptor::UNMANAGED; 8];
        let mut area = FreeArea::EMPTY;
        for frame in [2, 4, 6] {
            area.push(&mut table, FrameNumber::new(frame));
        }
        assert_eq!(area.count(), 3);
        assert_eq!(frames(&area, &table), [6, 4, 2]);
        assert_eq!(area.pop(&mut table), Some(FrameNumber::new(6)));
        assert_eq!(area.head(), Some(FrameNumber::new(4)));
        assert_eq!(table[4].prev(), None);
    }

    #[test]
    fn remove_from_the_middle_and_ends() {
        let mut table = [PageDescriptor::UNMANAGED; 8];
        let mut area = FreeArea::EMPTY;
        for frame in 0..5 {
            area.push(&mut table, FrameNumber::new(frame));
        }

        area.remove(&mut table, FrameNumber::new(2));
        assert_eq!(frames(&area, &table), [4, 3, 1, 0]);
        assert_eq!(table[3].next(), Some(FrameNumber::new(1)));
        assert_eq!(table[1].prev(), Some(FrameNumber::new(3)));

        area.remove(&mut table, FrameNumber::new(4));
        area.remove(&mut table, FrameNumber::new(0));
        assert_eq!(frames(&area, &table), [3, 1]);
        assert_eq!(table[1].next(), None);
        assert_eq!(area.count(), 2);

        assert_eq!(area.pop(&mut table), Some(FrameNumber::new(3)));
        assert_eq!(area.pop(&mut table), Some(FrameNumber::new(1)));
        assert_eq!(area.pop(&mut table), None);
        assert!(area.is_empty());
    }
}
