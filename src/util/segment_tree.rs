use std::ops::RangeInclusive;

/// Static segment tree over the points `0..len`
///
/// Each inserted closed interval is stored on the `O(log n)` canonical nodes covering it, so
/// asking which intervals contain a point is a walk from the point's leaf to the root. Intervals
/// are identified by the order in which they were passed to `new`.
#[derive(Debug)]
pub struct SegmentTree {
    /// Number of leaves (a power of two, at least `len`)
    leaves: usize,

    /// Implicit binary tree: node `n` has children `2n` and `2n + 1`, leaves start at `leaves`
    nodes: Vec<Vec<usize>>,
}

impl SegmentTree {
    /// Make a new segment tree over `0..len` containing all the specified intervals
    ///
    /// Parts of intervals that fall outside of `0..len` are ignored.
    pub fn new(len: usize, intervals: impl IntoIterator<Item = RangeInclusive<usize>>) -> Self {
        let leaves = len.max(1).next_power_of_two();
        let mut tree = SegmentTree {
            leaves,
            nodes: vec![vec![]; 2 * leaves],
        };
        for (id, interval) in intervals.into_iter().enumerate() {
            let until = (*interval.end()).min(len.saturating_sub(1));
            if len > 0 && *interval.start() <= until {
                tree.insert(id, *interval.start(), until);
            }
        }
        tree
    }

    fn insert(&mut self, id: usize, from: usize, until: usize) {
        let mut lo = from + self.leaves;
        let mut hi = until + self.leaves + 1;
        while lo < hi {
            if lo & 1 == 1 {
                self.nodes[lo].push(id);
                lo += 1;
            }
            if hi & 1 == 1 {
                hi -= 1;
                self.nodes[hi].push(id);
            }
            lo >>= 1;
            hi >>= 1;
        }
    }

    /// Identifiers of all intervals containing the specified point
    pub fn intervals_containing(&self, point: usize) -> Vec<usize> {
        let mut found = vec![];
        if point >= self.leaves {
            return found;
        }
        let mut node = point + self.leaves;
        while node >= 1 {
            found.extend_from_slice(&self.nodes[node]);
            node >>= 1;
        }
        found
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    fn intervals_set(tree: &SegmentTree, point: usize) -> HashSet<usize> {
        tree.intervals_containing(point).into_iter().collect()
    }

    #[test]
    fn no_intervals() {
        let tree = SegmentTree::new(4, std::iter::empty());
        assert!(intervals_set(&tree, 0).is_empty());
        assert!(intervals_set(&tree, 3).is_empty());
        assert!(intervals_set(&tree, 9).is_empty());
    }

    #[test]
    fn single_interval() {
        let tree = SegmentTree::new(5, vec![1..=3]);
        assert!(intervals_set(&tree, 0).is_empty());
        assert_eq!(intervals_set(&tree, 1), HashSet::from([0]));
        assert_eq!(intervals_set(&tree, 2), HashSet::from([0]));
        assert_eq!(intervals_set(&tree, 3), HashSet::from([0]));
        assert!(intervals_set(&tree, 4).is_empty());
    }

    #[test]
    fn multiple_overlapping_intervals() {
        let tree = SegmentTree::new(11, vec![0..=2, 2..=4, 4..=6, 2..=8, 0..=10]);
        assert_eq!(intervals_set(&tree, 0), HashSet::from([0, 4]));
        assert_eq!(intervals_set(&tree, 1), HashSet::from([0, 4]));
        assert_eq!(intervals_set(&tree, 2), HashSet::from([0, 1, 3, 4]));
        assert_eq!(intervals_set(&tree, 3), HashSet::from([1, 3, 4]));
        assert_eq!(intervals_set(&tree, 4), HashSet::from([1, 2, 3, 4]));
        assert_eq!(intervals_set(&tree, 5), HashSet::from([2, 3, 4]));
        assert_eq!(intervals_set(&tree, 7), HashSet::from([3, 4]));
        assert_eq!(intervals_set(&tree, 9), HashSet::from([4]));
        assert_eq!(intervals_set(&tree, 10), HashSet::from([4]));
        assert!(intervals_set(&tree, 11).is_empty());
    }

    #[test]
    fn intervals_are_clipped_to_the_tree() {
        let tree = SegmentTree::new(3, vec![1..=7]);
        assert_eq!(intervals_set(&tree, 2), HashSet::from([0]));
        assert!(intervals_set(&tree, 3).is_empty());
    }
}
