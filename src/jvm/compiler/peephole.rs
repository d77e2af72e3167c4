//! Encoding-level folds over short instruction sequences
//!
//! None of these change the instruction array. Instead, `plan` decides up front how each
//! instruction is going to be encoded, which can mean not encoding it at all because a neighbour
//! absorbed it. A fold never spans a jump target: only the first instruction of a folded sequence
//! can be reached other than by falling through.

use crate::jvm::code::{
    BasicBlocks, BinaryOperator, Comparison, Constant, Instruction, ValueType,
};

/// How one instruction gets encoded
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Step {
    /// Encode the instruction on its own
    Emit,

    /// Encoded as part of an earlier instruction (or not at all)
    Skip,

    /// `iinc` standing in for this load and the constant, add, and store that follow it
    Increment { local: u16, delta: i16 },

    /// Conditional branch
    ///
    /// When `against_zero` is set, the instruction before pushed `0` or `null` and the branch is
    /// encoded as `if<cond>`, `ifnull`, or `ifnonnull`. The comparison and target may differ from
    /// the instruction's when the branch was inverted to absorb a following `goto`.
    Branch {
        comparison: Comparison,
        against_zero: bool,
        target: usize,
    },
}

/// Decide how every instruction gets encoded
pub fn plan(instructions: &[Instruction], blocks: &BasicBlocks) -> Vec<Step> {
    let len = instructions.len();
    let mut steps = vec![Step::Emit; len];
    let mut index = 0;
    while index < len {
        if let Some(step) = increment_at(instructions, blocks, index) {
            steps[index] = step;
            for skipped in &mut steps[index + 1..index + 4] {
                *skipped = Step::Skip;
            }
            index += 4;
            continue;
        }

        match &instructions[index] {
            Instruction::Goto(target) if *target == index + 1 => steps[index] = Step::Skip,
            Instruction::ConditionalBranch { comparison, target } => {
                let against_zero = index > 0
                    && steps[index - 1] == Step::Emit
                    && !blocks.is_jump_target(index)
                    && pushes_zero_for(&instructions[index - 1], *comparison);
                if against_zero {
                    steps[index - 1] = Step::Skip;
                }

                let inverted = match instructions.get(index + 1) {
                    Some(Instruction::Goto(goto_target))
                        if *target == index + 2 && !blocks.is_jump_target(index + 1) =>
                    {
                        Some(*goto_target)
                    }
                    _ => None,
                };
                match inverted {
                    Some(goto_target) => {
                        log::trace!("Inverting branch at {} around goto {}", index, goto_target);
                        steps[index] = Step::Branch {
                            comparison: !*comparison,
                            against_zero,
                            target: goto_target,
                        };
                        steps[index + 1] = Step::Skip;
                        index += 2;
                        continue;
                    }
                    None => {
                        steps[index] = Step::Branch {
                            comparison: *comparison,
                            against_zero,
                            target: *target,
                        };
                    }
                }
            }
            _ => (),
        }
        index += 1;
    }
    steps
}

/// Does the instruction push the value a zero-compare branch form compares against?
fn pushes_zero_for(insn: &Instruction, comparison: Comparison) -> bool {
    matches!(
        (insn, comparison),
        (Instruction::Constant(Constant::Int(0)), Comparison::Int(_))
            | (Instruction::Constant(Constant::Null), Comparison::Reference(_))
    )
}

/// Match `load x; push c; add (or sub); store x` on an `int` local starting at `index`
fn increment_at(instructions: &[Instruction], blocks: &BasicBlocks, index: usize) -> Option<Step> {
    let window = instructions.get(index..index + 4)?;
    if (index + 1..index + 4).any(|idx| blocks.is_jump_target(idx)) {
        return None;
    }
    match window {
        [Instruction::LocalLoad {
            ty: ValueType::Int,
            index: loaded,
        }, Instruction::Constant(Constant::Int(constant)), Instruction::BinaryOp {
            ty: ValueType::Int,
            op,
        }, Instruction::LocalStore {
            ty: ValueType::Int,
            index: stored,
        }] if loaded == stored => {
            let delta = match op {
                BinaryOperator::Add => Some(*constant),
                BinaryOperator::Sub => constant.checked_neg(),
                _ => None,
            }?;
            let delta = i16::try_from(delta).ok()?;
            Some(Step::Increment {
                local: *loaded,
                delta,
            })
        }
        _ => None,
    }
}
