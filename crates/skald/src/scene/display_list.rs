//! Ordered child lists with deferred, stable depth sorting.
//!
//! The order of a [`DisplayList`] *is* the paint order: later entries are
//! drawn on top. Depth sorting is queued by whoever changes a depth and run
//! once per frame, so a hundred `set_depth` calls cost one sort.
//!
//! The sort must be stable. When many siblings share a depth (a common case
//! for bullets, particles, tiles) an unstable sort reshuffles them between
//! frames and they visibly flicker. `slice::sort_by` is a stable merge sort,
//! so ties keep their prior relative order.
//!
//! Depths are compared with `f32::total_cmp` after mapping NaN to
//! `+inf` and `-0.0` to `0.0`. A NaN depth paints above every finite
//! depth and never disturbs the order of its finite siblings.

use super::handle::NodeId;

#[derive(Debug, Clone, Default)]
pub struct DisplayList {
    entries: Vec<NodeId>,
    sort_queued: bool,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at `index` (clamped to the end), or append when `None`.
    /// Returns `false` and leaves the list untouched if `id` is already in it.
    pub fn add(&mut self, id: NodeId, index: Option<usize>) -> bool {
        if self.contains(id) {
            return false;
        }
        match index {
            Some(i) => self.entries.insert(i.min(self.entries.len()), id),
            None => self.entries.push(id),
        }
        true
    }

    pub fn remove(&mut self, id: NodeId) -> bool {
        match self.index_of(id) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    /// Move an entry to `index` (clamped to the last position).
    pub fn move_to(&mut self, id: NodeId, index: usize) -> bool {
        let Some(current) = self.index_of(id) else {
            return false;
        };
        let entry = self.entries.remove(current);
        let target = index.min(self.entries.len());
        self.entries.insert(target, entry);
        true
    }

    /// Mark the list for sorting on the next [`depth_sort`](Self::depth_sort).
    pub fn queue_depth_sort(&mut self) {
        self.sort_queued = true;
    }

    pub fn is_sort_queued(&self) -> bool {
        self.sort_queued
    }

    /// Stable sort by ascending depth, only if a sort was queued. Returns
    /// whether a sort ran.
    pub fn depth_sort(&mut self, depth_of: impl Fn(NodeId) -> f32) -> bool {
        if !self.sort_queued {
            return false;
        }
        self.sort_queued = false;
        self.entries
            .sort_by(|a, b| sort_key(depth_of(*a)).total_cmp(&sort_key(depth_of(*b))));
        true
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.entries.contains(&id)
    }

    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.entries.iter().position(|&e| e == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_slice(&self) -> &[NodeId] {
        &self.entries
    }

    /// Entries in paint order.
    pub fn iter(&self) -> std::iter::Copied<std::slice::Iter<'_, NodeId>> {
        self.entries.iter().copied()
    }

    pub(crate) fn clear(&mut self) -> Vec<NodeId> {
        self.sort_queued = false;
        std::mem::take(&mut self.entries)
    }
}

fn sort_key(depth: f32) -> f32 {
    if depth.is_nan() { f32::INFINITY } else { depth + 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn id(index: u32) -> NodeId {
        NodeId {
            index,
            generation: 0,
        }
    }

    #[test]
    fn add_appends_and_inserts() {
        let mut list = DisplayList::new();
        assert!(list.add(id(0), None));
        assert!(list.add(id(1), None));
        assert!(list.add(id(2), Some(0)));
        assert!(list.add(id(3), Some(99)));
        assert_eq!(list.as_slice(), &[id(2), id(0), id(1), id(3)]);
    }

    #[test]
    fn add_rejects_duplicates() {
        let mut list = DisplayList::new();
        list.add(id(0), None);
        assert!(!list.add(id(0), Some(0)));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn remove_and_move() {
        let mut list = DisplayList::new();
        for i in 0..4 {
            list.add(id(i), None);
        }
        assert!(list.remove(id(1)));
        assert!(!list.remove(id(1)));
        assert!(list.move_to(id(0), 10));
        assert_eq!(list.as_slice(), &[id(2), id(3), id(0)]);
        assert!(list.move_to(id(0), 0));
        assert_eq!(list.as_slice(), &[id(0), id(2), id(3)]);
        assert!(!list.move_to(id(7), 0));
    }

    #[test]
    fn depth_sort_is_stable() {
        // A(depth=1), B(depth=1), C(depth=0) inserted in that order.
        let (a, b, c) = (id(0), id(1), id(2));
        let depths: HashMap<NodeId, f32> = [(a, 1.0), (b, 1.0), (c, 0.0)].into_iter().collect();
        let mut list = DisplayList::new();
        list.add(a, None);
        list.add(b, None);
        list.add(c, None);

        list.queue_depth_sort();
        assert!(list.depth_sort(|n| depths[&n]));
        assert_eq!(list.as_slice(), &[c, a, b]);
    }

    #[test]
    fn depth_sort_only_when_queued() {
        let depths: HashMap<NodeId, f32> = [(id(0), 5.0), (id(1), 0.0)].into_iter().collect();
        let mut list = DisplayList::new();
        list.add(id(0), None);
        list.add(id(1), None);

        assert!(!list.depth_sort(|n| depths[&n]));
        assert_eq!(list.as_slice(), &[id(0), id(1)]);

        list.queue_depth_sort();
        assert!(list.depth_sort(|n| depths[&n]));
        assert!(!list.depth_sort(|n| depths[&n]));
        assert_eq!(list.as_slice(), &[id(1), id(0)]);
    }

    #[test]
    fn nan_depth_does_not_scramble_finite_siblings() {
        let depths = [3.0, f32::NAN, 1.0, 2.0, 0.0];
        let mut list = DisplayList::new();
        for i in 0..depths.len() as u32 {
            list.add(id(i), None);
        }
        list.queue_depth_sort();
        list.depth_sort(|n| depths[n.index as usize]);

        let sorted: Vec<u32> = list.iter().map(|n| n.index).collect();
        assert_eq!(sorted, vec![4, 2, 3, 0, 1]);
    }

    #[test]
    fn nan_and_infinity_tie_stably() {
        let depths = [f32::INFINITY, -f32::NAN, f32::NAN, 1.0, f32::INFINITY];
        let mut list = DisplayList::new();
        for i in 0..depths.len() as u32 {
            list.add(id(i), None);
        }
        list.queue_depth_sort();
        list.depth_sort(|n| depths[n.index as usize]);
        assert_eq!(list.iter().map(|n| n.index).collect::<Vec<_>>(), vec![3, 0, 1, 2, 4]);
    }

    #[test]
    fn signed_zeros_are_equal_depths() {
        let depths = [0.0, -0.0, 0.0];
        let mut list = DisplayList::new();
        for i in 0..3 {
            list.add(id(i), None);
        }
        list.queue_depth_sort();
        list.depth_sort(|n| depths[n.index as usize]);
        assert_eq!(list.iter().map(|n| n.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn many_equal_depths_keep_insertion_order() {
        let mut list = DisplayList::new();
        for i in 0..64 {
            list.add(id(i), None);
        }
        list.queue_depth_sort();
        list.depth_sort(|n| if n.index % 2 == 0 { 1.0 } else { 0.0 });
        let odds: Vec<u32> = list.iter().take(32).map(|n| n.index).collect();
        let evens: Vec<u32> = list.iter().skip(32).map(|n| n.index).collect();
        assert_eq!(odds, (0..64).filter(|i| i % 2 == 1).collect::<Vec<_>>());
        assert_eq!(evens, (0..64).filter(|i| i % 2 == 0).collect::<Vec<_>>());
    }
}
