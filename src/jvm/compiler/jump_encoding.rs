//! Pick which forward branches need 32-bit offsets
//!
//! A branch that doesn't fit in a signed 16-bit offset gets rewritten into a wider form:
//!
//! ```text,ignore,no_run
//!     goto L2           =>      goto_w L2
//!
//!     if* L2            =>      ifnot* L1
//!                               goto_w L2
//!                           L1: ...
//! ```
//!
//! ### Termination
//!
//! The rewrites are longer than the original branches (by 2 and 5 bytes), so widening one branch
//! may push other branches crossing it out of range too. The process still finishes because the
//! number of branches with 16-bit offsets only ever goes down: once a branch is widened it is
//! never considered again.
//!
//! The estimate made here is exact except for `tableswitch`/`lookupswitch` padding, which can
//! shrink or grow by up to 3 bytes when code before a switch grows. The layout loop catches any
//! branch the estimate missed and widens it on the next attempt.

use super::layout::NarrowJump;
use crate::util::SegmentTree;
use std::collections::HashSet;
use std::ops::{RangeBounds, RangeInclusive};

/// Range of relative jump offsets supported by `goto` and `if*` branch instructions
pub const SIGNED_16BIT_JUMP_RANGE: RangeInclusive<isize> =
    RangeInclusive::new(i16::MIN as isize, i16::MAX as isize);

/// Given the forward branches of a layout that used 16-bit offsets, find the branches that need
/// wider encodings, accounting for the growth of every widened branch.
///
/// Returns the indices of the branch instructions. The `small_jump_range` parameter should always
/// be `SIGNED_16BIT_JUMP_RANGE` - it is a parameter only for unit testing purposes.
pub fn widen_oversized_jumps(
    jumps: &[NarrowJump],
    code_len: usize,
    small_jump_range: &impl RangeBounds<isize>,
) -> HashSet<usize> {
    let mut intervals: Vec<JumpInterval> = jumps.iter().map(JumpInterval::new).collect();

    // Sort for stability of algorithm output (for unit test repeatibility)
    intervals.sort_unstable_by_key(|jump| (jump.from, jump.to));

    // Compute the starter set of oversized jumps (if there are none, bail out now)
    let mut oversized_jumps: Vec<usize> = intervals
        .iter()
        .enumerate()
        .filter(|(_, jump)| jump.is_oversized(small_jump_range))
        .map(|(id, _)| id)
        .collect();
    if oversized_jumps.is_empty() {
        return HashSet::new();
    }
    let mut known_oversized: Vec<bool> = intervals
        .iter()
        .map(|jump| jump.is_oversized(small_jump_range))
        .collect();

    // A widened branch grows in the middle of every jump that starts before it and ends after it
    let jump_tree = SegmentTree::new(
        code_len,
        intervals
            .iter()
            .map(|jump| RangeInclusive::new(jump.from, jump.to.saturating_sub(1))),
    );
    let mut widened: HashSet<usize> = HashSet::new();
    while let Some(oversized) = oversized_jumps.pop() {
        let jump = &intervals[oversized];
        if !widened.insert(jump.branch) {
            continue;
        }
        let growth = jump.widening_growth();
        let at = jump.from;
        log::trace!(
            "Widening branch {} at offset {} ({} bytes longer)",
            jump.branch,
            at,
            growth
        );

        // Update the new jump distances of intervals crossing
        for id in jump_tree.intervals_containing(at) {
            if id == oversized || known_oversized[id] {
                continue;
            }
            if intervals[id].from < at && intervals[id].lengthen_jump(growth, small_jump_range) {
                known_oversized[id] = true;
                oversized_jumps.push(id);
            }
        }
    }
    widened
}

/// Forward jump with a 16-bit offset, spanning `from..to` in the code
#[derive(Debug)]
struct JumpInterval {
    /// Index of the branch instruction
    branch: usize,
    from: usize,
    to: usize,
    is_goto: bool,

    /// Relative offset the jump needs, updated as jumps it crosses get wider
    jump_distance: isize,
}

impl JumpInterval {
    fn new(jump: &NarrowJump) -> JumpInterval {
        JumpInterval {
            branch: jump.branch,
            from: jump.from,
            to: jump.to,
            is_goto: jump.is_goto,
            jump_distance: jump.to as isize - jump.from as isize,
        }
    }

    fn is_oversized(&self, small_jump_range: &impl RangeBounds<isize>) -> bool {
        !small_jump_range.contains(&self.jump_distance)
    }

    /// How many more bytes the wide form takes up
    fn widening_growth(&self) -> isize {
        if self.is_goto {
            2
        } else {
            5
        }
    }

    /// Lengthen the jump, returning whether it just became oversized
    fn lengthen_jump(&mut self, by: isize, small_jump_range: &impl RangeBounds<isize>) -> bool {
        let was_oversized = self.is_oversized(small_jump_range);
        self.jump_distance += by;
        !was_oversized && self.is_oversized(small_jump_range)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn jump(branch: usize, from: usize, to: usize, is_goto: bool) -> NarrowJump {
        NarrowJump {
            branch,
            from,
            to,
            is_goto,
        }
    }

    fn widened(jumps: &[NarrowJump], range: RangeInclusive<isize>) -> Vec<usize> {
        let mut widened: Vec<usize> = widen_oversized_jumps(jumps, 200, &range).into_iter().collect();
        widened.sort_unstable();
        widened
    }

    #[test]
    fn nothing_oversized() {
        let jumps = vec![jump(0, 0, 10, true), jump(4, 20, 40, false)];
        assert!(widened(&jumps, -50..=50).is_empty());
    }

    #[test]
    fn single_oversized_jump() {
        let jumps = vec![jump(0, 0, 100, true), jump(4, 20, 40, false)];
        assert_eq!(widened(&jumps, -50..=50), vec![0]);
    }

    #[test]
    fn widening_cascades() {
        // Jump 1 starts before jump 2 and crosses it. Once jump 2 becomes an `if*` over a
        // `goto_w`, jump 1 gets 5 bytes longer and no longer fits.
        let jumps = vec![
            jump(1, 10, 58, true),
            jump(2, 20, 100, false),
            jump(3, 70, 110, false),
        ];
        assert_eq!(widened(&jumps, -50..=50), vec![1, 2]);
    }

    #[test]
    fn jumps_ending_at_the_widened_branch_are_unaffected() {
        let jumps = vec![jump(1, 10, 58, true), jump(2, 58, 200, true)];
        assert_eq!(widened(&jumps, -50..=50), vec![2]);
    }
}
