use super::{HandlerList, Instruction};
use crate::jvm::{Error, MethodAccessFlags, MethodDescriptor, Name};

/// Method body in the intermediate representation
///
/// The instruction, handler, and origin arrays always have the same length, and position `i` in
/// each describes the same instruction. Every branch target and every handler target is a valid
/// index into the instruction array.
#[derive(Clone, Debug)]
pub struct MethodData {
    pub access_flags: MethodAccessFlags,

    /// Binary name of the class declaring the method
    pub class_name: Name,
    pub name: Name,
    pub descriptor: MethodDescriptor,

    instructions: Vec<Instruction>,

    /// Handlers covering each instruction
    handlers: Vec<HandlerList>,

    /// Byte offset of the bytecode instruction each instruction came from (if any)
    ///
    /// Several instructions may share an origin, and code added after decoding may have none.
    origins: Vec<Option<usize>>,
}

impl MethodData {
    pub fn new(
        access_flags: MethodAccessFlags,
        class_name: Name,
        name: Name,
        descriptor: MethodDescriptor,
        instructions: Vec<Instruction>,
        handlers: Vec<HandlerList>,
        origins: Vec<Option<usize>>,
    ) -> Result<MethodData, Error> {
        let len = instructions.len();
        if handlers.len() != len || origins.len() != len {
            return Err(Error::InvalidOperand(format!(
                "method `{}` has {} instructions but {} handler lists and {} origins",
                name,
                len,
                handlers.len(),
                origins.len()
            )));
        }
        for (index, insn) in instructions.iter().enumerate() {
            insn.check_operands()?;
            let bad_target = insn
                .branch_targets()
                .iter()
                .chain(handlers[index].iter().map(|handler| &handler.target))
                .find(|target| **target >= len);
            if let Some(target) = bad_target {
                return Err(Error::InvalidOperand(format!(
                    "instruction {} ({}) refers to index {}, past the end of `{}`",
                    index, insn, target, name
                )));
            }
        }
        if descriptor.parameter_length(!access_flags.contains(MethodAccessFlags::STATIC)) > 255 {
            return Err(Error::InvalidOperand(format!(
                "method `{}` has too many parameters",
                name
            )));
        }
        Ok(MethodData {
            access_flags,
            class_name,
            name,
            descriptor,
            instructions,
            handlers,
            origins,
        })
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn handlers(&self) -> &[HandlerList] {
        &self.handlers
    }

    pub fn origins(&self) -> &[Option<usize>] {
        &self.origins
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Local variable slots taken up by the parameters (including `this`)
    pub fn parameter_slots(&self) -> usize {
        self.descriptor.parameter_length(!self.is_static())
    }

    /// Local variable slots used: the parameters plus every slot loaded or stored
    pub fn max_locals(&self) -> usize {
        self.instructions
            .iter()
            .filter_map(Instruction::local_access)
            .map(|(index, words)| index as usize + words as usize)
            .fold(self.parameter_slots(), usize::max)
    }

    /// Same method signature, different body
    pub fn with_body(
        &self,
        instructions: Vec<Instruction>,
        handlers: Vec<HandlerList>,
        origins: Vec<Option<usize>>,
    ) -> Result<MethodData, Error> {
        MethodData::new(
            self.access_flags,
            self.class_name.clone(),
            self.name.clone(),
            self.descriptor.clone(),
            instructions,
            handlers,
            origins,
        )
    }

    pub fn into_parts(self) -> (Vec<Instruction>, Vec<HandlerList>, Vec<Option<usize>>) {
        (self.instructions, self.handlers, self.origins)
    }
}
