use super::editor::{EditorState, Label};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed IR construction: an operand is outside the legal range for its instruction
    #[error("invalid operand: {0}")]
    InvalidOperand(String),

    /// Malformed binary input to the decoder
    #[error("invalid encoding at offset {offset}: {kind}")]
    InvalidEncoding {
        offset: usize,
        kind: EncodingErrorKind,
    },

    /// The operand stack underflows or two paths reach a point with different stack shapes
    ///
    /// `at` is an instruction index, except when raised by the decoder where it is the byte
    /// offset of the offending instruction.
    #[error("malformed stack shape at {at}: {reason}")]
    MalformedStackShape { at: usize, reason: String },

    /// Method could not be split into pieces that each fit the code size ceiling
    #[error("method `{method}` needs {size} bytes of code, over the ceiling of {ceiling}")]
    CodeTooLarge {
        method: String,
        size: usize,
        ceiling: usize,
    },

    /// Branch offsets did not converge, even with every forward branch widened
    #[error("branch offsets in method `{method}` did not converge")]
    PatchOverflow { method: String },

    #[error("`{operation}` is not allowed while the method editor is {state:?}")]
    InvalidEditorState {
        operation: &'static str,
        state: EditorState,
    },

    #[error("instruction {0} already has a replacement patch")]
    DuplicateReplacement(usize),

    #[error("instruction index {index} is out of range for a method of {len} instructions")]
    InstructionOutOfRange { index: usize, len: usize },

    #[error("branch to label {0:?} which was never emitted")]
    UnplacedLabel(Label),

    #[error("constant pool overflow")]
    ConstantPoolOverflow,

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn encoding(offset: usize, kind: EncodingErrorKind) -> Error {
        log::error!("Undecodable bytecode at offset {}: {}", offset, kind);
        Error::InvalidEncoding { offset, kind }
    }

    pub(crate) fn stack_shape(at: usize, reason: impl Into<String>) -> Error {
        let reason = reason.into();
        log::error!("Malformed stack shape at {}: {}", at, reason);
        Error::MalformedStackShape { at, reason }
    }
}

/// Reasons the decoder rejects a bytecode array
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodingErrorKind {
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    #[error("fell off end of bytecode array")]
    Truncated,

    #[error("branch to offset {0} is out of range")]
    BranchOutOfRange(isize),

    #[error("branch into the middle of the instruction at {0}")]
    BranchIntoInstruction(usize),

    #[error("stack underflow")]
    StackUnderflow,

    #[error("'ret' outside of subroutine")]
    RetOutsideSubroutine,

    #[error("subroutine does not start by storing or popping its return address")]
    InvalidSubroutineEntry,

    #[error("subroutine calls itself")]
    RecursiveSubroutine,

    #[error("constant pool entry {0} is missing or has the wrong kind")]
    MissingConstant(u16),

    #[error("constant pool entry {0} cannot be loaded onto the stack")]
    UnloadableConstant(u16),

    #[error("switch has an empty key range or unsorted keys")]
    MalformedSwitch,

    #[error("exception handler range is empty or out of bounds")]
    InvalidHandlerRange,

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("invalid operand: {0}")]
    InvalidOperand(String),
}
