//! Decoding bytecode into the intermediate representation
//!
//! ### Stages
//!
//! Decoding makes several passes over the code, each only looking at reachable instructions:
//!
//!   1. [`scan`] parses instructions lazily as control flow discovers them, resolving constant
//!      pool references and validating branch targets along the way.
//!
//!   2. [`subroutine`] assigns every instruction to either the main body or a `jsr` subroutine.
//!
//!   3. Each body is walked with the stack shape in hand, which is what it takes to translate
//!      `pop2`, `dup2_x1` and friends (see [`expand`]). A subroutine entered with different
//!      stack shapes is walked once per shape.
//!
//!   4. Finally the bodies are laid out: the main body first, in bytecode order, then one copy of
//!      a subroutine per call site. The `jsr` turns into a jump to the copy, which starts by
//!      pushing a `null` in place of the return address, and each `ret` turns into a jump back to
//!      the instruction after the `jsr`.

mod expand;
mod scan;
mod subroutine;

use crate::jvm::code::{
    Constant, ExceptionHandler, HandlerInterner, HandlerList, Instruction, MethodData, RawHandler,
    StackShape,
};
use crate::jvm::{
    ConstantPoolReader, EncodingErrorKind, Error, FieldType, MethodAccessFlags, MethodDescriptor,
    Name,
};
use scan::{RawOp, Scanner};
use std::collections::{BTreeMap, HashMap, VecDeque};
use subroutine::{Owner, Ownership};

/// Method body, fresh out of the decoder
#[derive(Debug, Clone)]
pub struct DecodedMethod {
    pub instructions: Vec<Instruction>,
    pub handlers: Vec<HandlerList>,

    /// Byte offset each instruction was decoded from
    pub origins: Vec<Option<usize>>,

    /// Did the bytecode use `jsr`/`ret`?
    pub has_subroutines: bool,
}

impl DecodedMethod {
    /// Attach the method signature
    pub fn into_method_data(
        self,
        access_flags: MethodAccessFlags,
        class_name: Name,
        name: Name,
        descriptor: MethodDescriptor,
    ) -> Result<MethodData, Error> {
        MethodData::new(
            access_flags,
            class_name,
            name,
            descriptor,
            self.instructions,
            self.handlers,
            self.origins,
        )
    }
}

/// Decode a method body from the contents of its `Code` attribute
///
/// Constant pool references are resolved through `pool`, each index at most once.
pub fn decode(
    code: &[u8],
    exception_table: &[RawHandler],
    pool: &dyn ConstantPoolReader,
) -> Result<DecodedMethod, Error> {
    for handler in exception_table {
        let (start, end, target) = (
            handler.start as usize,
            handler.end as usize,
            handler.target as usize,
        );
        if start >= end || end > code.len() || target >= code.len() {
            return Err(Error::encoding(
                start,
                EncodingErrorKind::InvalidHandlerRange,
            ));
        }
    }

    let mut scanner = Scanner::new(code, pool);
    let ownership = subroutine::assign_owners(&mut scanner, exception_table)?;

    let mut materializer = Materializer {
        scanner: &mut scanner,
        ownership: &ownership,
        handlers: exception_table,
        variants: vec![],
        known: HashMap::new(),
    };
    let main = materializer.materialize(Owner::Main, 0, StackShape::empty())?;
    let variants = materializer.variants;

    let decoded = Layout::new(&variants, exception_table).lay_out(main, &mut scanner)?;
    let decoded = DecodedMethod {
        has_subroutines: scanner.saw_subroutines(),
        ..decoded
    };
    log::debug!(
        "Decoded {} bytes into {} instructions ({} subroutines)",
        code.len(),
        decoded.instructions.len(),
        ownership.subroutine_count()
    );
    Ok(decoded)
}

/// Translation of one bytecode instruction
#[derive(Debug)]
enum NodeKind {
    /// Instructions (targets still byte offsets), possibly none
    Code(Vec<Instruction>),

    /// `jsr` to this variant
    Call { variant: usize, jsr_offset: usize },

    /// `ret`
    Return,
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,

    /// Offset of the next bytecode instruction
    next: usize,

    /// Does control continue to `next` when the instruction completes?
    falls_through: bool,
}

/// Body (main or subroutine) decoded for one entry stack shape
#[derive(Debug)]
struct Variant {
    nodes: BTreeMap<usize, Node>,

    /// Stack shape when `ret` executes, if it is reachable
    return_shape: Option<StackShape>,
}

struct Materializer<'s, 'a> {
    scanner: &'s mut Scanner<'a>,
    ownership: &'s Ownership,
    handlers: &'s [RawHandler],
    variants: Vec<Variant>,
    known: HashMap<(Owner, StackShape), usize>,
}

impl<'s, 'a> Materializer<'s, 'a> {
    /// Walk the body of `owner` starting with the given shape, returning the variant index
    fn materialize(
        &mut self,
        owner: Owner,
        entry: usize,
        entry_shape: StackShape,
    ) -> Result<usize, Error> {
        let key = (owner, entry_shape.clone());
        if let Some(id) = self.known.get(&key) {
            return Ok(*id);
        }
        let id = self.variants.len();
        self.known.insert(key, id);
        self.variants.push(Variant {
            nodes: BTreeMap::new(),
            return_shape: None,
        });

        let return_local = match owner {
            Owner::Main => None,
            Owner::Subroutine(entry) => self
                .ownership
                .subroutine(entry)
                .and_then(|subroutine| subroutine.return_local),
        };
        let mut shapes: HashMap<usize, StackShape> = HashMap::new();
        let mut nodes: BTreeMap<usize, Node> = BTreeMap::new();
        let mut return_shape: Option<StackShape> = None;

        let mut worklist: Vec<(usize, StackShape)> = vec![(entry, entry_shape)];
        while let Some((offset, shape)) = worklist.pop() {
            if self.ownership.owner(offset) != Some(owner) {
                continue;
            }
            match shapes.get(&offset) {
                Some(existing) if *existing == shape => continue,
                Some(existing) => {
                    return Err(Error::stack_shape(
                        offset,
                        format!(
                            "reached with stack {:?} and with stack {:?}",
                            existing.elements(),
                            shape.elements()
                        ),
                    ))
                }
                None => {
                    shapes.insert(offset, shape.clone());
                }
            }

            for handler in self.handlers.iter().filter(|h| h.covers(offset)) {
                worklist.push((handler.target as usize, StackShape::from_words(vec![1])));
            }

            let raw = self.scanner.scan(offset)?.clone();
            let kind = match &raw.op {
                RawOp::Jsr(target) => {
                    let mut callee_shape = shape.clone();
                    callee_shape.push(1);
                    let variant =
                        self.materialize(Owner::Subroutine(*target), *target, callee_shape)?;
                    if let Some(after) = &self.variants[variant].return_shape {
                        worklist.push((raw.next_offset(), after.clone()));
                    }
                    NodeKind::Call {
                        variant,
                        jsr_offset: offset,
                    }
                }
                RawOp::Ret(local) => {
                    if return_local != Some(*local) {
                        return Err(Error::encoding(
                            offset,
                            EncodingErrorKind::RetOutsideSubroutine,
                        ));
                    }
                    match &return_shape {
                        Some(existing) if *existing != shape => {
                            return Err(Error::stack_shape(
                                offset,
                                "subroutine returns with different stack shapes",
                            ))
                        }
                        _ => return_shape = Some(shape.clone()),
                    }
                    NodeKind::Return
                }
                op => {
                    let insns = expand::expand(op, &shape, offset)?;
                    let mut after = shape.clone();
                    for insn in &insns {
                        if after.depth() < insn.popped_count() {
                            return Err(Error::encoding(
                                offset,
                                EncodingErrorKind::StackUnderflow,
                            ));
                        }
                        after.apply(insn, offset)?;
                    }
                    for target in raw.targets() {
                        worklist.push((target, after.clone()));
                    }
                    if raw.falls_through() {
                        worklist.push((raw.next_offset(), after));
                    }
                    NodeKind::Code(insns)
                }
            };
            nodes.insert(
                offset,
                Node {
                    kind,
                    next: raw.next_offset(),
                    falls_through: raw.falls_through(),
                },
            );
        }

        self.variants[id] = Variant {
            nodes,
            return_shape,
        };
        Ok(id)
    }
}

/// Instruction in the final layout, before branch targets are resolved
struct Placed {
    insn: Instruction,

    /// Copy whose offset map resolves the targets and handlers
    copy: usize,

    /// Bytecode offset the instruction comes from
    origin: usize,

    /// Are the branch targets already instruction indices?
    resolved: bool,
}

/// One laid out copy of a variant, mapping bytecode offsets to instruction indices
///
/// Offsets that aren't in the copy are looked up in the copy that called it.
struct Copy {
    parent: Option<usize>,
    indices: HashMap<usize, usize>,
}

struct PendingCall {
    variant: usize,
    caller: usize,
    jsr_index: usize,
    jsr_offset: usize,

    /// Offset execution continues at when the subroutine returns
    continuation: usize,
}

struct Layout<'v> {
    variants: &'v [Variant],
    handlers: &'v [RawHandler],
    placed: Vec<Placed>,
    copies: Vec<Copy>,
    pending: VecDeque<PendingCall>,
}

impl<'v> Layout<'v> {
    fn new(variants: &'v [Variant], handlers: &'v [RawHandler]) -> Layout<'v> {
        Layout {
            variants,
            handlers,
            placed: vec![],
            copies: vec![],
            pending: VecDeque::new(),
        }
    }

    fn lookup(&self, copy: usize, offset: usize) -> Option<usize> {
        let mut current = Some(copy);
        while let Some(copy) = current {
            if let Some(index) = self.copies[copy].indices.get(&offset) {
                return Some(*index);
            }
            current = self.copies[copy].parent;
        }
        None
    }

    fn place(&mut self, insn: Instruction, copy: usize, origin: usize, resolved: bool) -> usize {
        let index = self.placed.len();
        self.placed.push(Placed {
            insn,
            copy,
            origin,
            resolved,
        });
        index
    }

    /// Lay out every node of a variant, in bytecode order
    fn place_copy(&mut self, variant: usize, parent: Option<usize>, return_to: Option<usize>) {
        let copy = self.copies.len();
        self.copies.push(Copy {
            parent,
            indices: HashMap::new(),
        });

        let variants = self.variants;
        let nodes = &variants[variant].nodes;
        let mut iter = nodes.iter().peekable();
        while let Some((offset, node)) = iter.next() {
            let start = self.placed.len();
            self.copies[copy].indices.insert(*offset, start);
            match &node.kind {
                NodeKind::Code(insns) => {
                    for insn in insns {
                        self.place(insn.clone(), copy, *offset, false);
                    }
                }
                NodeKind::Call {
                    variant,
                    jsr_offset,
                } => {
                    let jsr_index = self.place(Instruction::Goto(usize::MAX), copy, *offset, true);
                    self.pending.push_back(PendingCall {
                        variant: *variant,
                        caller: copy,
                        jsr_index,
                        jsr_offset: *jsr_offset,
                        continuation: node.next,
                    });
                }
                NodeKind::Return => {
                    // Only reachable in variants that return, which always get a return target
                    let target = return_to.unwrap_or(usize::MAX);
                    self.place(Instruction::Goto(target), copy, *offset, true);
                }
            }

            let falls_through = node.falls_through && matches!(node.kind, NodeKind::Code(_));
            let next_is_adjacent = iter.peek().map_or(false, |(next, _)| **next == node.next);
            if falls_through && !next_is_adjacent {
                self.place(Instruction::Goto(node.next), copy, *offset, false);
            }
        }
    }

    fn lay_out(mut self, main: usize, scanner: &mut Scanner) -> Result<DecodedMethod, Error> {
        self.place_copy(main, None, None);
        while let Some(call) = self.pending.pop_front() {
            let returns = self.variants[call.variant].return_shape.is_some();
            let return_to = if returns {
                Some(self.lookup(call.caller, call.continuation).ok_or_else(|| {
                    Error::encoding(
                        call.jsr_offset,
                        EncodingErrorKind::BranchOutOfRange(call.continuation as isize),
                    )
                })?)
            } else {
                None
            };
            let start = self.place(
                Instruction::Constant(Constant::Null),
                call.caller,
                call.jsr_offset,
                true,
            );
            self.placed[call.jsr_index].insn = Instruction::Goto(start);
            self.place_copy(call.variant, Some(call.caller), return_to);
        }

        let mut catch_classes: HashMap<u16, Option<Name>> = HashMap::new();
        let mut interner = HandlerInterner::new();
        let mut instructions = Vec::with_capacity(self.placed.len());
        let mut handlers = Vec::with_capacity(self.placed.len());
        let mut origins = Vec::with_capacity(self.placed.len());
        for placed in &self.placed {
            let insn = if placed.resolved {
                placed.insn.clone()
            } else {
                let mut resolved: HashMap<usize, usize> = HashMap::new();
                for target in placed.insn.branch_targets() {
                    let index = self.lookup(placed.copy, *target).ok_or_else(|| {
                        Error::encoding(
                            placed.origin,
                            EncodingErrorKind::BranchOutOfRange(*target as isize),
                        )
                    })?;
                    resolved.insert(*target, index);
                }
                placed
                    .insn
                    .map_targets(|target| resolved.get(&target).copied().unwrap_or(target))
            };

            let mut list = vec![];
            for raw in self.handlers.iter().filter(|h| h.covers(placed.origin)) {
                let target = self
                    .lookup(placed.copy, raw.target as usize)
                    .ok_or_else(|| {
                        Error::encoding(placed.origin, EncodingErrorKind::InvalidHandlerRange)
                    })?;
                let catch_class = match catch_classes.get(&raw.catch_type) {
                    Some(class) => class.clone(),
                    None => {
                        let class = catch_class(scanner, raw.catch_type, placed.origin)?;
                        catch_classes.insert(raw.catch_type, class.clone());
                        class
                    }
                };
                list.push(ExceptionHandler {
                    target,
                    catch_class,
                    loader: None,
                });
            }

            instructions.push(insn);
            handlers.push(interner.intern(list));
            origins.push(Some(placed.origin));
        }

        Ok(DecodedMethod {
            instructions,
            handlers,
            origins,
            has_subroutines: false,
        })
    }
}

fn catch_class(
    scanner: &mut Scanner,
    catch_type: u16,
    offset: usize,
) -> Result<Option<Name>, Error> {
    if catch_type == 0 {
        return Ok(None);
    }
    match scanner.constants().class(catch_type, offset)? {
        FieldType::Object(name) => Ok(Some(name)),
        _ => Err(Error::encoding(
            offset,
            EncodingErrorKind::MissingConstant(catch_type),
        )),
    }
}
