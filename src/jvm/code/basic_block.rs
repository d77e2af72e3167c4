use super::{HandlerList, Instruction};

/// Partition of a method body into basic blocks
///
/// A block starts at the first instruction, at every branch or handler target, after every
/// instruction that branches or doesn't fall through, and wherever the covering handlers change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlocks {
    starts: Vec<bool>,
    targets: Vec<bool>,
    handler_entries: Vec<bool>,
}

impl BasicBlocks {
    pub fn is_block_start(&self, index: usize) -> bool {
        self.starts.get(index).copied().unwrap_or(false)
    }

    /// Can control arrive at the instruction other than by falling through from its predecessor?
    pub fn is_jump_target(&self, index: usize) -> bool {
        index == 0 || self.targets.get(index).copied().unwrap_or(false)
    }

    /// Is the instruction the first one of an exception handler?
    pub fn is_handler_entry(&self, index: usize) -> bool {
        self.handler_entries.get(index).copied().unwrap_or(false)
    }

    /// Are all the instructions from `from` to `until` (inclusive) in one block?
    pub fn same_block(&self, from: usize, until: usize) -> bool {
        from <= until && until < self.starts.len() && !self.starts[from + 1..=until].contains(&true)
    }

    /// Indices of the first instruction in each block
    pub fn block_starts(&self) -> impl Iterator<Item = usize> + '_ {
        self.starts
            .iter()
            .enumerate()
            .filter(|(_, start)| **start)
            .map(|(idx, _)| idx)
    }
}

pub fn compute_basic_blocks(instructions: &[Instruction], handlers: &[HandlerList]) -> BasicBlocks {
    let len = instructions.len();
    let mut starts = vec![false; len];
    let mut targets = vec![false; len];
    let mut handler_entries = vec![false; len];
    if len > 0 {
        starts[0] = true;
    }

    for (idx, insn) in instructions.iter().enumerate() {
        let branch_targets = insn.branch_targets();
        for target in branch_targets {
            starts[*target] = true;
            targets[*target] = true;
        }
        if let Some(list) = handlers.get(idx) {
            for handler in list.iter() {
                starts[handler.target] = true;
                targets[handler.target] = true;
                handler_entries[handler.target] = true;
            }
        }
        if idx + 1 < len {
            let handlers_change = handlers.get(idx) != handlers.get(idx + 1);
            if !branch_targets.is_empty() || !insn.is_fall_through() || handlers_change {
                starts[idx + 1] = true;
            }
        }
    }

    BasicBlocks {
        starts,
        targets,
        handler_entries,
    }
}
