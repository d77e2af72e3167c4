use super::{HandlerList, Instruction};
use crate::jvm::Error;

/// Word sizes (1 or 2) of the values on the operand stack, from the bottom up
///
/// Bytecode stack manipulation instructions (`pop2`, `dup_x2`, `swap`, etc.) work on words, while
/// their `Instruction` counterparts work on elements. Knowing the shape of the stack is what lets
/// us translate between the two.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct StackShape(Vec<u8>);

impl StackShape {
    pub fn empty() -> StackShape {
        StackShape(vec![])
    }

    pub fn from_words(words: Vec<u8>) -> StackShape {
        StackShape(words)
    }

    /// Word sizes of the stack elements, bottom first
    pub fn elements(&self) -> &[u8] {
        &self.0
    }

    /// Number of elements on the stack
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Total number of words on the stack
    pub fn words(&self) -> usize {
        self.0.iter().map(|w| *w as usize).sum()
    }

    /// Word size of the `n`-th element from the top (0 is the top)
    pub fn from_top(&self, n: usize) -> Option<u8> {
        self.0.len().checked_sub(n + 1).map(|idx| self.0[idx])
    }

    pub fn push(&mut self, words: u8) {
        self.0.push(words);
    }

    /// Remove the top `count` elements, returning their word sizes bottom first
    pub fn pop(&mut self, count: usize) -> Option<Vec<u8>> {
        let remaining = self.0.len().checked_sub(count)?;
        Some(self.0.split_off(remaining))
    }

    /// Update the shape to reflect what happens after the instruction runs
    ///
    /// `at` is only used in the error reported on underflow.
    pub fn apply(&mut self, insn: &Instruction, at: usize) -> Result<(), Error> {
        let underflow = || Error::stack_shape(at, format!("stack underflow at {}", insn));
        let popped = self.pop(insn.popped_count()).ok_or_else(underflow)?;
        match insn {
            Instruction::Dup(shape) => {
                let (under, copied) = popped.split_at(shape.delta());
                self.0.extend_from_slice(copied);
                self.0.extend_from_slice(under);
                self.0.extend_from_slice(copied);
            }
            Instruction::Swap => {
                self.0.push(popped[1]);
                self.0.push(popped[0]);
            }
            _ => {
                if let Some(words) = insn.pushed_word_size() {
                    self.0.push(words);
                }
            }
        }
        Ok(())
    }
}

/// Outcome of simulating the stack shape over a method body
#[derive(Debug, Clone)]
pub struct StackShapes {
    shapes: Vec<Option<StackShape>>,
    max_words: usize,
}

impl StackShapes {
    /// Shape of the stack before the instruction executes (`None` if it is unreachable)
    pub fn before(&self, index: usize) -> Option<&StackShape> {
        self.shapes.get(index).and_then(Option::as_ref)
    }

    pub fn is_reachable(&self, index: usize) -> bool {
        self.before(index).is_some()
    }

    /// Maximum height of the stack in words, at any point
    pub fn max_words(&self) -> usize {
        self.max_words
    }
}

/// Compute the stack shape before every instruction
///
/// Propagation starts at the first instruction with an empty stack and at every handler with just
/// the caught exception on the stack, and follows branch and fall-through edges. Every path
/// reaching an instruction must agree on the shape.
pub fn simulate(
    instructions: &[Instruction],
    handlers: &[HandlerList],
) -> Result<StackShapes, Error> {
    let len = instructions.len();
    let mut shapes: Vec<Option<StackShape>> = vec![None; len];
    let mut max_words = 0;

    let mut worklist: Vec<(usize, StackShape)> = vec![];
    for list in handlers {
        for handler in list.iter() {
            worklist.push((handler.target, StackShape::from_words(vec![1])));
        }
    }
    if len > 0 {
        worklist.push((0, StackShape::empty()));
    }

    while let Some((index, shape)) = worklist.pop() {
        let insn = instructions.get(index).ok_or_else(|| {
            Error::InvalidOperand(format!("control flow reaches index {} of {}", index, len))
        })?;
        match &shapes[index] {
            Some(existing) if *existing == shape => continue,
            Some(existing) => {
                return Err(Error::stack_shape(
                    index,
                    format!(
                        "stack is {:?} along one path but {:?} along another",
                        existing.elements(),
                        shape.elements()
                    ),
                ))
            }
            None => (),
        }

        let mut after = shape.clone();
        after.apply(insn, index)?;
        max_words = max_words.max(shape.words()).max(after.words());
        shapes[index] = Some(shape);

        for target in insn.branch_targets() {
            worklist.push((*target, after.clone()));
        }
        if insn.is_fall_through() {
            if index + 1 >= len {
                return Err(Error::InvalidOperand(format!(
                    "control falls off the end of the method after {}",
                    insn
                )));
            }
            worklist.push((index + 1, after));
        }
    }

    Ok(StackShapes { shapes, max_words })
}
