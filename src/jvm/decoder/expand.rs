use super::scan::RawOp;
use crate::jvm::code::opcodes::*;
use crate::jvm::code::{
    BinaryOperator, Comparison, Constant, DupShape, Instruction, PopCount, StackShape, ValueType,
};
use crate::jvm::{EncodingErrorKind, Error};

/// Translate a raw operation into instructions, using the stack shape before it
///
/// `nop`, `jsr`, and `ret` have no direct translation and produce nothing.
pub fn expand(op: &RawOp, shape: &StackShape, offset: usize) -> Result<Vec<Instruction>, Error> {
    let insns = match op {
        RawOp::Plain(insn) => vec![insn.clone()],
        RawOp::Nop | RawOp::Jsr(_) | RawOp::Ret(_) => vec![],
        RawOp::Stack(opcode) => vec![stack_instruction(*opcode, shape, offset)?],
        RawOp::Increment { index, delta } => vec![
            Instruction::LocalLoad {
                ty: ValueType::Int,
                index: *index,
            },
            Instruction::Constant(Constant::Int(*delta as i32)),
            Instruction::BinaryOp {
                ty: ValueType::Int,
                op: BinaryOperator::Add,
            },
            Instruction::LocalStore {
                ty: ValueType::Int,
                index: *index,
            },
        ],
        RawOp::IfZero { condition, target } => vec![
            Instruction::Constant(Constant::Int(0)),
            Instruction::ConditionalBranch {
                comparison: Comparison::Int(*condition),
                target: *target,
            },
        ],
        RawOp::IfNull { condition, target } => vec![
            Instruction::Constant(Constant::Null),
            Instruction::ConditionalBranch {
                comparison: Comparison::Reference(*condition),
                target: *target,
            },
        ],
    };
    Ok(insns)
}

/// Number of stack elements, starting `from` elements below the top, that make up exactly `words`
fn element_group(
    shape: &StackShape,
    from: usize,
    words: usize,
    offset: usize,
) -> Result<usize, Error> {
    let underflow = || Error::encoding(offset, EncodingErrorKind::StackUnderflow);
    let first = shape.from_top(from).ok_or_else(underflow)?;
    match (words, first) {
        (1, 1) | (2, 2) => Ok(1),
        (2, 1) => match shape.from_top(from + 1).ok_or_else(underflow)? {
            1 => Ok(2),
            _ => Err(Error::stack_shape(
                offset,
                "two-word stack operation splits a two-word value",
            )),
        },
        _ => Err(Error::stack_shape(
            offset,
            "one-word stack operation on a two-word value",
        )),
    }
}

/// `pop`, `dup`, `swap`, and variants, which are defined in terms of words
fn stack_instruction(opcode: u8, shape: &StackShape, offset: usize) -> Result<Instruction, Error> {
    let group = |from, words| element_group(shape, from, words, offset);
    let dup = |size_words, delta_words| -> Result<Instruction, Error> {
        let size = group(0, size_words)?;
        let delta = if delta_words == 0 {
            0
        } else {
            group(size, delta_words)?
        };
        Ok(Instruction::Dup(DupShape::new(size, delta)?))
    };

    match opcode {
        POP => Ok(Instruction::Pop(PopCount::new(group(0, 1)?)?)),
        POP2 => Ok(Instruction::Pop(PopCount::new(group(0, 2)?)?)),
        DUP => dup(1, 0),
        DUP_X1 => dup(1, 1),
        DUP_X2 => dup(1, 2),
        DUP2 => dup(2, 0),
        DUP2_X1 => dup(2, 1),
        DUP2_X2 => dup(2, 2),
        SWAP => {
            group(0, 1)?;
            group(1, 1)?;
            Ok(Instruction::Swap)
        }
        _ => Err(Error::encoding(offset, EncodingErrorKind::UnknownOpcode(opcode))),
    }
}
