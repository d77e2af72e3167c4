//! Live local variables
//!
//! A local is live before an instruction if some path from the instruction reads the local before
//! writing it. Exception edges count as paths: an instruction covered by a handler can transfer to
//! the handler before having any effect, so whatever is live at the handler is live before the
//! instruction too.

use crate::jvm::code::{HandlerList, Instruction};

/// Set of local variable slots
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct LocalSet(Vec<u64>);

impl LocalSet {
    pub fn new() -> LocalSet {
        LocalSet::default()
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.0
            .get(slot / 64)
            .map_or(false, |bits| bits & (1 << (slot % 64)) != 0)
    }

    pub fn insert(&mut self, slot: usize) {
        if self.0.len() <= slot / 64 {
            self.0.resize(slot / 64 + 1, 0);
        }
        self.0[slot / 64] |= 1 << (slot % 64);
    }

    pub fn remove(&mut self, slot: usize) {
        if let Some(bits) = self.0.get_mut(slot / 64) {
            *bits &= !(1 << (slot % 64));
        }
    }

    /// Add every slot in `other`, returning whether anything was added
    pub fn union_with(&mut self, other: &LocalSet) -> bool {
        if self.0.len() < other.0.len() {
            self.0.resize(other.0.len(), 0);
        }
        let mut changed = false;
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            let merged = *mine | *theirs;
            changed |= merged != *mine;
            *mine = merged;
        }
        changed
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(word, bits)| {
            (0..64)
                .filter(move |bit| bits & (1 << bit) != 0)
                .map(move |bit| word * 64 + bit)
        })
    }
}

/// Locals live before every instruction
#[derive(Debug)]
pub struct Liveness {
    live_in: Vec<LocalSet>,
}

impl Liveness {
    /// Locals live before the instruction (unreachable or out of range indices have none)
    pub fn live_before(&self, index: usize) -> &LocalSet {
        static EMPTY: LocalSet = LocalSet(Vec::new());
        self.live_in.get(index).unwrap_or(&EMPTY)
    }
}

/// Backward dataflow analysis to a fixed point
pub fn analyze(instructions: &[Instruction], handlers: &[HandlerList]) -> Liveness {
    let len = instructions.len();
    let mut live_in: Vec<LocalSet> = vec![LocalSet::new(); len];

    // Predecessors along normal and exceptional edges, to know what to revisit
    let mut predecessors: Vec<Vec<usize>> = vec![vec![]; len];
    for (index, insn) in instructions.iter().enumerate() {
        for target in insn.branch_targets() {
            predecessors[*target].push(index);
        }
        if insn.is_fall_through() && index + 1 < len {
            predecessors[index + 1].push(index);
        }
        for handler in handlers[index].iter() {
            predecessors[handler.target].push(index);
        }
    }

    let mut queued = vec![true; len];
    let mut worklist: Vec<usize> = (0..len).collect();
    while let Some(index) = worklist.pop() {
        queued[index] = false;
        let insn = &instructions[index];

        let mut live = LocalSet::new();
        for target in insn.branch_targets() {
            live.union_with(&live_in[*target]);
        }
        if insn.is_fall_through() && index + 1 < len {
            live.union_with(&live_in[index + 1]);
        }
        match insn {
            Instruction::LocalStore { ty, index: local } => {
                for slot in *local as usize..*local as usize + ty.words() as usize {
                    live.remove(slot);
                }
            }
            Instruction::LocalLoad { ty, index: local } => {
                for slot in *local as usize..*local as usize + ty.words() as usize {
                    live.insert(slot);
                }
            }
            _ => (),
        }
        for handler in handlers[index].iter() {
            live.union_with(&live_in[handler.target]);
        }

        if live_in[index].union_with(&live) {
            for pred in &predecessors[index] {
                if !queued[*pred] {
                    queued[*pred] = true;
                    worklist.push(*pred);
                }
            }
        }
    }

    Liveness { live_in }
}
