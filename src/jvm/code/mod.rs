//! Intermediate representation of method bodies
//!
//! ### Structure
//!
//! A method body is a [`MethodData`]: an array of [`Instruction`]s, along with the list of
//! exception handlers covering each instruction and the bytecode offset each instruction was
//! decoded from. Branches target indices in the instruction array, so the representation can be
//! edited without worrying about byte offsets (see [`crate::jvm::editor`]).
//!
//! ### Stack shapes
//!
//! The instruction set is untyped as far as stack manipulation goes: `Dup`, `Swap`, and `Pop`
//! work on stack elements regardless of whether they are one or two words wide. Bytecode does
//! care, so both the decoder and compiler rely on [`simulate`] to reconstruct the word sizes of
//! everything on the stack at every instruction.

mod basic_block;
mod constant;
mod handlers;
mod instruction;
mod method;
pub(crate) mod opcodes;
mod stack_shape;
mod types;

pub use basic_block::*;
pub use constant::*;
pub use handlers::*;
pub use instruction::*;
pub use method::*;
pub use stack_shape::*;
pub use types::*;
