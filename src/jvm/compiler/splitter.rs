//! Moving part of an oversized method into a helper method
//!
//! ### Regions
//!
//! A region is a contiguous range `start..end` of instructions that behaves like a single
//! instruction from the outside:
//!
//!   - control only enters at `start`, and only leaves by reaching `end` (or by throwing)
//!   - every instruction in the region has the same outer handlers, and handlers that are only
//!     used inside the region come before those
//!   - the region only touches the top few elements of the stack, and leaves at most one new
//!     element behind
//!   - at most one local written in the region is read after it, and then nothing is left on the
//!     stack
//!
//! The region becomes the body of a static helper. Stack elements the region consumes and locals
//! it reads are passed in as parameters. Whatever the region leaves behind (a stack element or a
//! local) is the return value. In the original method, the region is replaced by loads of the
//! local parameters, an `invokestatic` of the helper, and possibly a store of the returned local.
//!
//! ### Search
//!
//! Windows of instructions are checked one after another. When a window can't be extracted, the
//! check suggests how to split it into smaller candidates (around the offending instruction if
//! there is one, otherwise down the middle) and those are tried breadth first.

use super::liveness::{self, LocalSet, Liveness};
use crate::jvm::code::{
    infer_frames, simulate, ExceptionHandler, HandlerInterner, HandlerList, Instruction,
    InvokeKind, MethodData, StackShapes, TypeFrame, ValueType, VerificationType,
};
use crate::jvm::{
    CompilerSettings, Error, FieldType, MethodAccessFlags, MethodDescriptor, MethodRef, Name,
};
use std::collections::VecDeque;
use std::ops::Range;

/// Outcome of moving a region into a helper
#[derive(Debug)]
pub struct Extraction {
    /// Original method, with the region replaced by a call to the helper
    pub method: MethodData,
    pub helper: MethodData,
}

/// Find a region of the method worth moving into a helper called `helper_name`, and move it
///
/// Returns `None` if no region can be extracted.
pub fn extract_helper(
    method: &MethodData,
    settings: &CompilerSettings,
    helper_name: Name,
) -> Result<Option<Extraction>, Error> {
    let len = method.len();
    let min_len = settings.min_helper_instructions.max(2);
    if len <= min_len {
        return Ok(None);
    }

    let analysis = Analysis::new(method)?;
    let window = settings.split_window.min(len / 2).max(min_len);
    let step = settings.split_step.min(window / 2).max(1);
    let mut start = 0;
    while start + min_len < len {
        let end = (start + window).min(len - 1);
        if let Some(region) = analysis.search(start..end, min_len) {
            log::trace!(
                "Extracting instructions {:?} of `{}` into `{}`",
                region.range,
                method.name,
                helper_name
            );
            return analysis.extract(&region, helper_name).map(Some);
        }
        start += step;
    }
    log::debug!("No extractable region in `{}`", method.name);
    Ok(None)
}

/// Extractable region, along with how the helper gets called
#[derive(Debug, PartialEq)]
struct Region {
    range: Range<usize>,

    /// Stack elements consumed, bottom first
    stack_params: Vec<FieldType>,

    /// Locals read, in increasing order
    local_params: Vec<(u16, FieldType)>,

    /// Element left on the stack
    stack_result: Option<FieldType>,

    /// Local written in the region and read afterwards
    live_out: Option<(u16, FieldType)>,

    /// Handlers covering the region as a whole
    outer_handlers: Vec<ExceptionHandler>,
}

impl Region {
    /// Local slots taken by the helper's parameters
    fn param_words(&self) -> usize {
        self.stack_params
            .iter()
            .chain(self.local_params.iter().map(|(_, typ)| typ))
            .map(|typ| ValueType::of(typ).words() as usize)
            .sum()
    }

    /// Stack parameters first, since they are already on the stack when the locals get loaded
    fn descriptor(&self) -> MethodDescriptor {
        let return_type = self
            .stack_result
            .clone()
            .or_else(|| self.live_out.as_ref().map(|(_, typ)| typ.clone()));
        MethodDescriptor {
            parameters: self
                .stack_params
                .iter()
                .chain(self.local_params.iter().map(|(_, typ)| typ))
                .cloned()
                .collect(),
            return_type,
        }
    }

    /// Instructions replacing the region in the original method
    fn wrapper_len(&self) -> usize {
        self.local_params.len() + 1 + usize::from(self.live_out.is_some())
    }
}

/// Why a candidate range can't be extracted, and what to try instead
#[derive(Debug, PartialEq)]
enum Rejection {
    Split(Range<usize>, Range<usize>),
    Abandon,
}

fn split_around(range: &Range<usize>, index: usize) -> Rejection {
    Rejection::Split(range.start..index, index + 1..range.end)
}

fn split_at(range: &Range<usize>, index: usize) -> Rejection {
    if index <= range.start || index >= range.end {
        return split_midpoint(range);
    }
    Rejection::Split(range.start..index, index..range.end)
}

fn split_midpoint(range: &Range<usize>) -> Rejection {
    if range.len() < 2 {
        return Rejection::Abandon;
    }
    let middle = range.start + range.len() / 2;
    Rejection::Split(range.start..middle, middle..range.end)
}

/// Is the slot the second half of a `long` or `double`?
fn is_second_half(locals: &[VerificationType], slot: usize) -> bool {
    slot > 0 && locals.get(slot - 1).map_or(false, |typ| typ.words() == 2)
}

/// Everything about the method that doesn't depend on the candidate region
struct Analysis<'m> {
    method: &'m MethodData,
    shapes: StackShapes,
    frames: Vec<Option<TypeFrame>>,
    liveness: Liveness,

    /// Instructions branching to each instruction
    branch_sources: Vec<Vec<usize>>,

    /// Instructions covered by a handler starting at each instruction
    handler_sources: Vec<Vec<usize>>,
}

impl<'m> Analysis<'m> {
    fn new(method: &'m MethodData) -> Result<Analysis<'m>, Error> {
        let instructions = method.instructions();
        let handlers = method.handlers();
        let shapes = simulate(instructions, handlers)?;
        let frames = infer_frames(method, method.max_locals())?;
        let liveness = liveness::analyze(instructions, handlers);

        let mut branch_sources = vec![vec![]; method.len()];
        let mut handler_sources = vec![vec![]; method.len()];
        for (index, insn) in instructions.iter().enumerate() {
            for target in insn.branch_targets() {
                branch_sources[*target].push(index);
            }
            for handler in handlers[index].iter() {
                handler_sources[handler.target].push(index);
            }
        }

        Ok(Analysis {
            method,
            shapes,
            frames,
            liveness,
            branch_sources,
            handler_sources,
        })
    }

    /// Find an extractable region inside the window
    fn search(&self, window: Range<usize>, min_len: usize) -> Option<Region> {
        let mut candidates = VecDeque::from([window]);
        while let Some(range) = candidates.pop_front() {
            if range.len() < min_len {
                continue;
            }
            match self.check(range) {
                Ok(region) => return Some(region),
                Err(Rejection::Split(first, second)) => {
                    candidates.push_back(first);
                    candidates.push_back(second);
                }
                Err(Rejection::Abandon) => (),
            }
        }
        None
    }

    /// Check whether the range can be extracted and work out the helper's signature
    fn check(&self, range: Range<usize>) -> Result<Region, Rejection> {
        let Range { start, end } = range;
        let instructions = self.method.instructions();
        let handlers = self.method.handlers();
        let inside = |index: usize| range.contains(&index);
        if end >= instructions.len() || start >= end {
            return Err(Rejection::Abandon);
        }

        // Single entry and single exit
        for index in range.clone() {
            let insn = &instructions[index];
            let stays_in_method = !matches!(
                insn,
                Instruction::Return(_) | Instruction::MonitorEnter | Instruction::MonitorExit
            );
            if !self.shapes.is_reachable(index) || !stays_in_method {
                return Err(split_around(&range, index));
            }
            if index > start && self.branch_sources[index].iter().any(|src| !inside(*src)) {
                return Err(split_at(&range, index));
            }
            if self.handler_sources[index].iter().any(|src| !inside(*src)) {
                return Err(split_around(&range, index));
            }
            if insn
                .branch_targets()
                .iter()
                .any(|target| *target != end && !inside(*target))
            {
                return Err(split_around(&range, index));
            }
        }

        // Internal handlers first, then the same outer handlers everywhere
        let outer_of = |index: usize| -> Option<&[ExceptionHandler]> {
            let list = &handlers[index];
            let internal = list.iter().take_while(|handler| inside(handler.target)).count();
            let outer = &list[internal..];
            if outer.iter().any(|handler| inside(handler.target)) {
                None
            } else {
                Some(outer)
            }
        };
        let outer_handlers = outer_of(start).ok_or_else(|| split_around(&range, start))?;
        let mut has_internal_handlers = false;
        for index in range.clone() {
            match outer_of(index) {
                None => return Err(split_around(&range, index)),
                Some(outer) if outer != outer_handlers => return Err(split_at(&range, index)),
                Some(outer) => {
                    has_internal_handlers |= outer.len() < handlers[index].len();
                }
            }
        }

        // Stack effect of the region as a whole
        let reject = || split_midpoint(&range);
        let shape_in = self.shapes.before(start).ok_or_else(reject)?;
        let shape_out = self.shapes.before(end).ok_or_else(reject)?;
        let (depth_in, depth_out) = (shape_in.depth(), shape_out.depth());
        if has_internal_handlers && depth_in != 0 {
            return Err(reject());
        }
        let floor = range
            .clone()
            .filter_map(|index| {
                let shape = self.shapes.before(index)?;
                Some(shape.depth().saturating_sub(instructions[index].popped_count()))
            })
            .fold(depth_in.min(depth_out), usize::min);
        let (consumed, produced) = (depth_in - floor, depth_out - floor);
        if produced > 1 {
            return Err(reject());
        }

        let frame_in = self.frames[start].as_ref().ok_or_else(reject)?;
        let frame_out = self.frames[end].as_ref().ok_or_else(reject)?;
        let params_from = frame_in.stack.len().checked_sub(consumed).ok_or_else(reject)?;
        let stack_params = frame_in.stack[params_from..]
            .iter()
            .map(VerificationType::field_type)
            .collect::<Option<Vec<FieldType>>>()
            .ok_or_else(reject)?;
        let stack_result = match produced {
            0 => None,
            _ => Some(
                frame_out
                    .stack
                    .last()
                    .and_then(VerificationType::field_type)
                    .ok_or_else(reject)?,
            ),
        };

        // Locals flowing in and out
        let mut accessed = LocalSet::new();
        let mut stored = LocalSet::new();
        let mut locals_end = 0;
        for insn in &instructions[range.clone()] {
            if let Some((local, words)) = insn.local_access() {
                for slot in local as usize..local as usize + words as usize {
                    accessed.insert(slot);
                    if matches!(insn, Instruction::LocalStore { .. }) {
                        stored.insert(slot);
                    }
                }
                locals_end = locals_end.max(local as usize + words as usize);
            }
        }

        let mut local_params = vec![];
        for slot in self.liveness.live_before(start).iter() {
            if !accessed.contains(slot) || is_second_half(&frame_in.locals, slot) {
                continue;
            }
            let typ = frame_in
                .locals
                .get(slot)
                .and_then(VerificationType::field_type)
                .ok_or_else(reject)?;
            local_params.push((slot as u16, typ));
        }

        let mut live_out = None;
        for slot in stored.iter() {
            if !self.liveness.live_before(end).contains(slot)
                || is_second_half(&frame_out.locals, slot)
            {
                continue;
            }
            if live_out.is_some() || produced > 0 {
                return Err(reject());
            }
            let typ = frame_out
                .locals
                .get(slot)
                .and_then(VerificationType::field_type)
                .ok_or_else(reject)?;
            live_out = Some((slot as u16, typ));
        }

        // Outer handlers see the locals of the original method, not the helper's
        for handler in outer_handlers {
            let live = self.liveness.live_before(handler.target);
            if stored.iter().any(|slot| live.contains(slot)) {
                return Err(reject());
            }
        }

        let region = Region {
            range: range.clone(),
            stack_params,
            local_params,
            stack_result,
            live_out,
            outer_handlers: outer_handlers.to_vec(),
        };
        let param_words = region.param_words();
        if param_words > 255 || locals_end + param_words > u16::MAX as usize + 1 {
            return Err(reject());
        }
        if region.wrapper_len() >= range.len() {
            return Err(Rejection::Abandon);
        }
        Ok(region)
    }

    /// Build the helper and the rewritten method
    fn extract(&self, region: &Region, helper_name: Name) -> Result<Extraction, Error> {
        let method = self.method;
        let instructions = method.instructions();
        let handlers = method.handlers();
        let origins = method.origins();
        let Range { start, end } = region.range;
        let descriptor = region.descriptor();
        let shift = region.param_words() as u16;
        let mut interner = HandlerInterner::new();

        // Helper: copy local parameters up past the parameter slots, push stack parameters
        let mut body = vec![];
        let mut param_slot = 0;
        let mut stack_param_slots = vec![];
        for typ in &region.stack_params {
            let ty = ValueType::of(typ);
            stack_param_slots.push((param_slot, ty));
            param_slot += ty.words() as u16;
        }
        for (local, typ) in &region.local_params {
            let ty = ValueType::of(typ);
            body.push(Instruction::LocalLoad {
                ty,
                index: param_slot,
            });
            body.push(Instruction::LocalStore {
                ty,
                index: shift_local(*local, shift)?,
            });
            param_slot += ty.words() as u16;
        }
        for (index, ty) in stack_param_slots {
            body.push(Instruction::LocalLoad { ty, index });
        }
        let prologue = body.len();
        let mut body_handlers = vec![HandlerList::empty(); prologue];
        let mut body_origins = vec![None; prologue];

        let exit = prologue + (end - start);
        let retarget = |target: usize| {
            if target == end {
                exit
            } else {
                prologue + target - start
            }
        };
        for index in start..end {
            let insn = match &instructions[index] {
                Instruction::LocalLoad { ty, index } => Instruction::LocalLoad {
                    ty: *ty,
                    index: shift_local(*index, shift)?,
                },
                Instruction::LocalStore { ty, index } => Instruction::LocalStore {
                    ty: *ty,
                    index: shift_local(*index, shift)?,
                },
                other => other.map_targets(retarget),
            };
            body.push(insn);
            let internal = handlers[index].len() - region.outer_handlers.len();
            let list = handlers[index][..internal]
                .iter()
                .map(|handler| ExceptionHandler {
                    target: retarget(handler.target),
                    ..handler.clone()
                })
                .collect();
            body_handlers.push(interner.intern(list));
            body_origins.push(origins[index]);
        }

        match (&region.stack_result, &region.live_out) {
            (Some(typ), _) => body.push(Instruction::Return(Some(ValueType::of(typ)))),
            (None, Some((local, typ))) => {
                let ty = ValueType::of(typ);
                body.push(Instruction::LocalLoad {
                    ty,
                    index: shift_local(*local, shift)?,
                });
                body.push(Instruction::Return(Some(ty)));
            }
            (None, None) => body.push(Instruction::Return(None)),
        }
        body_handlers.resize(body.len(), HandlerList::empty());
        body_origins.resize(body.len(), None);

        let helper = MethodData::new(
            MethodAccessFlags::HELPER,
            method.class_name.clone(),
            helper_name.clone(),
            descriptor.clone(),
            body,
            body_handlers,
            body_origins,
        )?;

        // Original method: the region shrinks down to the call
        let removed = end - start;
        let wrapper_len = region.wrapper_len();
        let remap = |target: usize| {
            if target <= start {
                target
            } else {
                target - removed + wrapper_len
            }
        };
        let new_len = method.len() - removed + wrapper_len;
        let mut new_instructions = Vec::with_capacity(new_len);
        let mut new_handlers = Vec::with_capacity(new_len);
        let mut new_origins = Vec::with_capacity(new_len);
        for index in (0..start).chain(end..method.len()) {
            if index == end {
                let outer = region
                    .outer_handlers
                    .iter()
                    .map(|handler| ExceptionHandler {
                        target: remap(handler.target),
                        ..handler.clone()
                    })
                    .collect();
                let outer = interner.intern(outer);
                for insn in wrapper(region, &method.class_name, helper_name.clone(), &descriptor) {
                    new_instructions.push(insn);
                    new_handlers.push(outer.clone());
                    new_origins.push(origins[start]);
                }
            }
            new_instructions.push(instructions[index].map_targets(remap));
            new_handlers.push(interner.intern(handlers[index].map_targets(remap)));
            new_origins.push(origins[index]);
        }

        let rewritten = method.with_body(new_instructions, new_handlers, new_origins)?;
        Ok(Extraction {
            method: rewritten,
            helper,
        })
    }
}

/// Instructions calling the helper in place of the region
fn wrapper(
    region: &Region,
    class: &Name,
    helper_name: Name,
    descriptor: &MethodDescriptor,
) -> Vec<Instruction> {
    let mut insns: Vec<Instruction> = region
        .local_params
        .iter()
        .map(|(local, typ)| Instruction::LocalLoad {
            ty: ValueType::of(typ),
            index: *local,
        })
        .collect();
    insns.push(Instruction::Invoke {
        kind: InvokeKind::Static,
        method: MethodRef {
            class: class.clone(),
            name: helper_name,
            descriptor: descriptor.clone(),
            is_interface: false,
        },
    });
    if let Some((local, typ)) = &region.live_out {
        insns.push(Instruction::LocalStore {
            ty: ValueType::of(typ),
            index: *local,
        });
    }
    insns
}

fn shift_local(local: u16, shift: u16) -> Result<u16, Error> {
    local.checked_add(shift).ok_or_else(|| {
        Error::InvalidOperand(format!(
            "local {} cannot be moved past {} parameter slots",
            local, shift
        ))
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{BinaryOperator, Constant};
    use crate::jvm::ParseDescriptor;

    fn int_load(index: u16) -> Instruction {
        Instruction::LocalLoad {
            ty: ValueType::Int,
            index,
        }
    }

    fn int_store(index: u16) -> Instruction {
        Instruction::LocalStore {
            ty: ValueType::Int,
            index,
        }
    }

    fn int_op(op: BinaryOperator) -> Instruction {
        Instruction::BinaryOp {
            ty: ValueType::Int,
            op,
        }
    }

    /// `x = x * 3 + 7` on each of the locals in turn, then return the sum of the first two
    fn statements(descriptor: &str, locals: &[u16]) -> MethodData {
        let mut insns = vec![];
        for local in locals {
            insns.extend([
                int_load(*local),
                Instruction::Constant(Constant::Int(3)),
                int_op(BinaryOperator::Mul),
                Instruction::Constant(Constant::Int(7)),
                int_op(BinaryOperator::Add),
                int_store(*local),
            ]);
        }
        insns.push(int_load(0));
        if descriptor.starts_with("(II)") {
            insns.push(int_load(1));
            insns.push(int_op(BinaryOperator::Add));
        }
        insns.push(Instruction::Return(Some(ValueType::Int)));
        let len = insns.len();
        MethodData::new(
            MethodAccessFlags::STATIC,
            Name::from("Foo"),
            Name::from("bar"),
            MethodDescriptor::parse(descriptor).unwrap(),
            insns,
            vec![HandlerList::empty(); len],
            (0..len).map(Some).collect(),
        )
        .unwrap()
    }

    fn settings() -> CompilerSettings {
        CompilerSettings {
            min_helper_instructions: 4,
            ..CompilerSettings::default()
        }
    }

    #[test]
    fn region_signature() {
        let method = statements("(I)I", &[0; 6]);
        let analysis = Analysis::new(&method).unwrap();
        let region = analysis.check(0..19).unwrap();
        assert!(region.stack_params.is_empty());
        assert_eq!(region.local_params, vec![(0, FieldType::int())]);
        assert_eq!(region.stack_result, Some(FieldType::int()));
        assert_eq!(region.live_out, None);
        assert_eq!(region.descriptor(), MethodDescriptor::parse("(I)I").unwrap());

        // Starting mid-statement consumes the partially computed value
        let region = analysis.check(3..12).unwrap();
        assert_eq!(region.stack_params, vec![FieldType::int()]);
        assert_eq!(region.local_params, vec![]);
        assert_eq!(region.stack_result, None);
        assert_eq!(region.live_out, Some((0, FieldType::int())));
        assert_eq!(region.descriptor(), MethodDescriptor::parse("(I)I").unwrap());
    }

    #[test]
    fn rejected_regions() {
        let method = statements("(II)I", &[0, 1, 0, 1, 0, 1]);
        let analysis = Analysis::new(&method).unwrap();

        // Local 0 is still needed after the region, and so is the value on the stack
        assert_eq!(analysis.check(0..19), Err(Rejection::Split(0..9, 9..19)));

        // Both operands of the final addition would be left on the stack
        assert_eq!(analysis.check(30..38), Err(Rejection::Split(30..34, 34..38)));
    }

    #[test]
    fn extracts_straight_line_code() {
        let method = statements("(I)I", &[0; 6]);
        let Extraction { method: main, helper } =
            extract_helper(&method, &settings(), Name::from("bar$helper0"))
                .unwrap()
                .unwrap();

        assert_eq!(helper.access_flags, MethodAccessFlags::HELPER);
        assert_eq!(helper.descriptor, MethodDescriptor::parse("(I)I").unwrap());
        assert_eq!(helper.len(), 2 + 19 + 1);
        assert_eq!(&helper.instructions()[..3], &[int_load(0), int_store(1), int_load(1)]);
        assert_eq!(
            helper.instructions().last(),
            Some(&Instruction::Return(Some(ValueType::Int)))
        );
        assert_eq!(helper.origins()[2], Some(0));

        assert_eq!(main.len(), method.len() - 19 + 2);
        assert_eq!(main.instructions()[0], int_load(0));
        match &main.instructions()[1] {
            Instruction::Invoke {
                kind: InvokeKind::Static,
                method,
            } => {
                assert_eq!(&*method.name, "bar$helper0");
                assert_eq!(&*method.class, "Foo");
            }
            other => panic!("expected a call to the helper, got {}", other),
        }
        assert_eq!(main.instructions()[2], Instruction::Constant(Constant::Int(3)));
        assert_eq!(main.origins()[1], Some(0));
    }

    #[test]
    fn short_methods_are_left_alone() {
        let method = statements("(I)I", &[0]);
        let settings = CompilerSettings {
            min_helper_instructions: 10,
            ..CompilerSettings::default()
        };
        let extraction = extract_helper(&method, &settings, Name::from("bar$helper0")).unwrap();
        assert!(extraction.is_none());
    }
}
