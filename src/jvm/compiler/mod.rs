//! Compiling the intermediate representation back into bytecode
//!
//! ### Stages
//!
//!   1. The stack shape before every instruction is simulated, since `Pop`, `Dup`, and `Swap`
//!      can't be encoded without knowing the word sizes of what they move around.
//!
//!   2. [`peephole`] decides which instructions get folded into their neighbours (`iinc`,
//!      `if<cond>`, inverted branches).
//!
//!   3. [`layout`] writes out bytecode. Forward branches start out with 16-bit offsets. If some
//!      don't fit, [`jump_encoding`] picks which branches to widen and layout runs again. After
//!      `max_layout_retries` unsuccessful rounds, every forward branch gets a 32-bit offset.
//!
//!   4. If the code is over the size ceiling, [`splitter`] moves a region into a helper method
//!      and the smaller method is compiled again. Helpers that are still too large get split in
//!      turn.
//!
//!   5. [`handler_table`] turns the per-instruction handler lists into an exception table.

mod handler_table;
mod jump_encoding;
mod layout;
mod liveness;
mod peephole;
mod splitter;

use crate::jvm::code::{compute_basic_blocks, simulate, Constant, MethodData, RawHandler};
use crate::jvm::{
    CompilerSettings, ConstantPoolAllocator, Error, FieldType, MethodAccessFlags,
    MethodDescriptor, Name, PoolEntry, Serialize,
};
use byteorder::WriteBytesExt;
use jump_encoding::SIGNED_16BIT_JUMP_RANGE;
use layout::{Layout, LayoutInput};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Method body ready to go into a `Code` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledMethod {
    pub code: Vec<u8>,
    pub raw_handlers: Vec<RawHandler>,
    pub max_stack: u16,
    pub max_locals: u16,

    /// Byte offset of every instruction, followed by the length of the code
    pub offsets: Vec<usize>,

    /// Byte offset in the original bytecode of the instruction at each new byte offset
    pub origins: BTreeMap<usize, usize>,
}

/// Serializes as the body of a `Code` attribute (without attributes of its own)
impl Serialize for CompiledMethod {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        (self.code.len() as u32).serialize(writer)?;
        writer.write_all(&self.code)?;
        self.raw_handlers.serialize(writer)?;
        0u16.serialize(writer)?;
        Ok(())
    }
}

/// Method split off of an oversized method
///
/// Helpers are static methods of the same class as the method they came from.
#[derive(Debug, Clone)]
pub struct HelperMethod {
    pub name: Name,
    pub descriptor: MethodDescriptor,
    pub access_flags: MethodAccessFlags,
    pub compiled: CompiledMethod,
}

#[derive(Debug, Clone)]
pub struct CompilerOutput {
    pub main: CompiledMethod,

    /// Helpers the caller needs to add to the class, in the order they were split off
    pub helpers: Vec<HelperMethod>,
}

/// Compile a method body, splitting it into helpers if it doesn't fit the code size ceiling
pub fn compile(
    method: &MethodData,
    pool: &mut impl ConstantPoolAllocator,
    settings: &CompilerSettings,
) -> Result<CompilerOutput, Error> {
    let mut splitting = Splitting {
        pool,
        settings,
        base_name: method.name.clone(),
        named_helpers: 0,
        helpers: vec![],
    };
    let main = splitting.compile_fitting(method.clone())?;
    if !splitting.helpers.is_empty() {
        log::debug!(
            "Split `{}` into {} helpers",
            method.name,
            splitting.helpers.len()
        );
    }
    Ok(CompilerOutput {
        main,
        helpers: splitting.helpers,
    })
}

struct Splitting<'a, P> {
    pool: &'a mut P,
    settings: &'a CompilerSettings,

    /// Name of the method being compiled, which every helper name starts with
    base_name: Name,
    named_helpers: usize,
    helpers: Vec<HelperMethod>,
}

impl<'a, P: ConstantPoolAllocator> Splitting<'a, P> {
    /// Keep moving code into helpers until the method fits
    fn compile_fitting(&mut self, mut method: MethodData) -> Result<CompiledMethod, Error> {
        let mut previous_size = None;
        loop {
            let size = match encode(&method, &mut *self.pool, self.settings)? {
                Encoded::Fits(compiled) => return Ok(compiled),
                Encoded::TooLarge(size) => size,
            };
            let ceiling = self.settings.max_code_size;
            let too_large = || Error::CodeTooLarge {
                method: method.name.to_string(),
                size,
                ceiling,
            };
            if previous_size.map_or(false, |previous| size >= previous) {
                return Err(too_large());
            }
            previous_size = Some(size);

            let helper_name = self.next_helper_name();
            log::debug!(
                "`{}` needs {} bytes of code, moving a region into `{}`",
                method.name,
                size,
                helper_name
            );
            let extraction = match splitter::extract_helper(&method, self.settings, helper_name)? {
                Some(extraction) => extraction,
                None => return Err(too_large()),
            };

            // Reserve the helper's place before compiling it, since it may get split too
            let slot = self.helpers.len();
            let helper = extraction.helper;
            let compiled = self.compile_fitting(helper.clone())?;
            self.helpers.insert(
                slot,
                HelperMethod {
                    name: helper.name.clone(),
                    descriptor: helper.descriptor.clone(),
                    access_flags: helper.access_flags,
                    compiled,
                },
            );
            method = extraction.method;
        }
    }

    fn next_helper_name(&mut self) -> Name {
        let name = format!(
            "{}{}{}",
            self.base_name, self.settings.helper_name_prefix, self.named_helpers
        );
        self.named_helpers += 1;
        Name::from(name)
    }
}

/// Outcome of encoding a method without splitting it
enum Encoded {
    Fits(CompiledMethod),

    /// Size of the code, when over the ceiling
    TooLarge(usize),
}

/// Encode the method as it is
fn encode(
    method: &MethodData,
    pool: &mut impl ConstantPoolAllocator,
    settings: &CompilerSettings,
) -> Result<Encoded, Error> {
    let instructions = method.instructions();
    let handlers = method.handlers();
    let shapes = simulate(instructions, handlers)?;
    let blocks = compute_basic_blocks(instructions, handlers);
    let steps = peephole::plan(instructions, &blocks);
    let operands = layout::allocate_operands(method, pool)?;
    let mut catch_types: HashMap<Name, u16> = HashMap::new();
    for list in handlers {
        for handler in list.iter() {
            if let Some(class) = &handler.catch_class {
                if !catch_types.contains_key(class) {
                    let class_type = FieldType::Object(class.clone());
                    let entry = PoolEntry::Constant(Constant::Class(class_type));
                    catch_types.insert(class.clone(), pool.allocate(&entry)?);
                }
            }
        }
    }

    let input = LayoutInput {
        method_name: &method.name,
        instructions,
        shapes: &shapes,
        steps: &steps,
        operands: &operands,
    };
    let mut attempt = layout::layout(&input, &HashSet::new(), false)?;
    if attempt.code.len() > settings.max_code_size {
        return Ok(Encoded::TooLarge(attempt.code.len()));
    }
    if !attempt.overflowed.is_empty() {
        attempt = widen_until_settled(&input, attempt, settings)?;
        if attempt.code.len() > settings.max_code_size {
            return Ok(Encoded::TooLarge(attempt.code.len()));
        }
    }

    let raw_handlers = handler_table::exception_table(handlers, &attempt.offsets, &catch_types)?;
    let mut origins = BTreeMap::new();
    for (index, origin) in method.origins().iter().enumerate() {
        if let Some(origin) = origin {
            origins.entry(attempt.offsets[index]).or_insert(*origin);
        }
    }
    let max_stack = u16::try_from(attempt.max_stack).map_err(|_| {
        Error::InvalidOperand(format!("`{}` needs too much stack", method.name))
    })?;
    let max_locals = u16::try_from(method.max_locals()).map_err(|_| {
        Error::InvalidOperand(format!("`{}` needs too many locals", method.name))
    })?;
    log::trace!(
        "Encoded `{}` in {} bytes ({} handlers, max stack {}, max locals {})",
        method.name,
        attempt.code.len(),
        raw_handlers.len(),
        max_stack,
        max_locals
    );

    Ok(Encoded::Fits(CompiledMethod {
        code: attempt.code,
        raw_handlers,
        max_stack,
        max_locals,
        offsets: attempt.offsets,
        origins,
    }))
}

/// Lay out the method again with wider forward branches until every branch offset fits
fn widen_until_settled(
    input: &LayoutInput,
    first: Layout,
    settings: &CompilerSettings,
) -> Result<Layout, Error> {
    let mut wide = jump_encoding::widen_oversized_jumps(
        &first.narrow_jumps,
        first.code.len(),
        &SIGNED_16BIT_JUMP_RANGE,
    );
    wide.extend(first.overflowed.iter().copied());

    for retry in 0..settings.max_layout_retries {
        let attempt = layout::layout(input, &wide, false)?;
        if attempt.overflowed.is_empty() {
            log::debug!(
                "Widened {} branches in `{}` after {} retries",
                wide.len(),
                input.method_name,
                retry + 1
            );
            return Ok(attempt);
        }
        wide.extend(attempt.overflowed.iter().copied());
    }

    log::debug!(
        "Branches in `{}` did not settle, widening all forward branches",
        input.method_name
    );
    let attempt = layout::layout(input, &HashSet::new(), true)?;
    if !attempt.overflowed.is_empty() {
        return Err(Error::PatchOverflow {
            method: input.method_name.to_string(),
        });
    }
    Ok(attempt)
}
