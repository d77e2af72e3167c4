//! Splicing code into a method body
//!
//! ### Passes
//!
//! Edits are made in passes. During a pass, patches get registered against the instructions of
//! the method as it was when the pass began. Nothing changes until the pass ends, at which point
//! every patch runs and emits its code, and a new method body is put together from the result:
//!
//! ```text,ignore,no_run
//!     BeforePass --begin_pass--> DuringPass --apply_patches--> EmittingCode --> BeforeEndPass
//!          ^                                                                        |
//!          +-----------------------------------end_pass-----------------------------+
//! ```
//!
//! (`end_pass` applies the patches first if that hasn't happened yet.)
//!
//! ### Labels
//!
//! Code emitted by patches refers to other code through labels: branch targets and handler
//! targets in emitted instructions are label numbers, not instruction indices. Label `i` for
//! `i < len` is the original instruction `i` (or rather the start of the code emitted for it,
//! including patches inserted before it). Label `len` is the end of the method body, right before
//! the bodies of method-wide handlers. More labels can be allocated during a pass and placed
//! wherever a patch likes with [`PatchEmitter::emit_label`].

use crate::jvm::code::{ExceptionHandler, HandlerInterner, HandlerList, Instruction, MethodData};
use crate::jvm::{Error, Name};

/// Position in the code emitted during a pass
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Label(pub usize);

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum EditorState {
    BeforePass,
    DuringPass,
    EmittingCode,
    BeforeEndPass,
}

/// Outcome of an editing pass
#[derive(Debug)]
pub enum Reconciled {
    Changed(MethodData),

    /// No patch emitted anything, so the method is exactly as it was
    Unchanged,
}

/// Code emitted for one insertion point
type Patch<'p> = Box<dyn FnOnce(&mut PatchEmitter) -> Result<(), Error> + 'p>;

struct HandlerPatch<'p> {
    catch_class: Option<Name>,
    label: usize,
    patch: Patch<'p>,
}

impl<'p> HandlerPatch<'p> {
    fn handler(&self) -> ExceptionHandler {
        ExceptionHandler {
            target: self.label,
            catch_class: self.catch_class.clone(),
            loader: None,
        }
    }
}

/// Patches registered so far in the current pass
#[derive(Default)]
struct Pass<'p> {
    next_label: usize,
    patch_count: usize,
    at_start: Vec<Patch<'p>>,
    before: Vec<Vec<Patch<'p>>>,
    after: Vec<Vec<Patch<'p>>>,
    replacements: Vec<Option<Patch<'p>>>,
    instruction_handlers: Vec<Vec<HandlerPatch<'p>>>,
    method_handlers: Vec<HandlerPatch<'p>>,
    after_body: Vec<Patch<'p>>,
}

impl<'p> Pass<'p> {
    fn new(len: usize) -> Pass<'p> {
        Pass {
            next_label: len + 1,
            before: (0..len).map(|_| vec![]).collect(),
            after: (0..len).map(|_| vec![]).collect(),
            replacements: (0..len).map(|_| None).collect(),
            instruction_handlers: (0..len).map(|_| vec![]).collect(),
            ..Pass::default()
        }
    }

    fn allocate_label(&mut self) -> usize {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    fn insert_before(&mut self, index: usize, patch: Patch<'p>) {
        self.before[index].push(patch);
        self.patch_count += 1;
    }

    fn insert_after(&mut self, index: usize, patch: Patch<'p>) {
        self.after[index].push(patch);
        self.patch_count += 1;
    }

    fn replace_with(&mut self, index: usize, patch: Patch<'p>) -> Result<(), Error> {
        if self.replacements[index].is_some() {
            return Err(Error::DuplicateReplacement(index));
        }
        self.replacements[index] = Some(patch);
        self.patch_count += 1;
        Ok(())
    }

    fn add_instruction_handler(
        &mut self,
        index: usize,
        catch_class: Option<Name>,
        patch: Patch<'p>,
    ) {
        let label = self.allocate_label();
        self.instruction_handlers[index].push(HandlerPatch {
            catch_class,
            label,
            patch,
        });
        self.patch_count += 1;
    }
}

/// Accumulates patches against a method body and reconciles them into a new body
pub struct MethodEditor<'p> {
    method: MethodData,
    state: EditorState,
    pass: Pass<'p>,

    /// New body, once patches are applied (if anything changed)
    outcome: Option<MethodData>,
}

impl<'p> MethodEditor<'p> {
    pub fn new(method: &MethodData) -> MethodEditor<'p> {
        MethodEditor {
            method: method.clone(),
            state: EditorState::BeforePass,
            pass: Pass::default(),
            outcome: None,
        }
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    /// Method body as of the start of the current pass (or the end of the last one)
    pub fn method(&self) -> &MethodData {
        &self.method
    }

    fn require(&self, operation: &'static str, state: EditorState) -> Result<(), Error> {
        if self.state != state {
            return Err(Error::InvalidEditorState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Check that the editor is in a pass and the index is an instruction
    fn require_instruction(&self, operation: &'static str, index: usize) -> Result<(), Error> {
        self.require(operation, EditorState::DuringPass)?;
        if index >= self.method.len() {
            return Err(Error::InstructionOutOfRange {
                index,
                len: self.method.len(),
            });
        }
        Ok(())
    }

    pub fn begin_pass(&mut self) -> Result<(), Error> {
        self.require("begin_pass", EditorState::BeforePass)?;
        self.state = EditorState::DuringPass;
        self.pass = Pass::new(self.method.len());
        self.outcome = None;
        Ok(())
    }

    pub fn allocate_label(&mut self) -> Result<Label, Error> {
        self.require("allocate_label", EditorState::DuringPass)?;
        Ok(Label(self.pass.allocate_label()))
    }

    /// Label referring to an original instruction
    pub fn instruction_label(&self, index: usize) -> Label {
        Label(index)
    }

    /// Label at the end of the method body
    pub fn end_label(&self) -> Label {
        Label(self.method.len())
    }

    /// Insert code at the start of the method
    ///
    /// The last patch inserted runs first.
    pub fn insert_at_start(
        &mut self,
        patch: impl FnOnce(&mut PatchEmitter) -> Result<(), Error> + 'p,
    ) -> Result<(), Error> {
        self.require("insert_at_start", EditorState::DuringPass)?;
        self.pass.at_start.push(Box::new(patch));
        self.pass.patch_count += 1;
        Ok(())
    }

    /// Insert code before an instruction, inside any handlers covering it
    ///
    /// Branches to the instruction land on the inserted code. The last patch inserted runs first.
    pub fn insert_before(
        &mut self,
        index: usize,
        patch: impl FnOnce(&mut PatchEmitter) -> Result<(), Error> + 'p,
    ) -> Result<(), Error> {
        self.require_instruction("insert_before", index)?;
        self.pass.insert_before(index, Box::new(patch));
        Ok(())
    }

    /// Insert code after an instruction, inside any handlers covering it
    ///
    /// Patches run in the order they were inserted. Whether the inserted code runs depends on the
    /// instruction: nothing after a `goto` runs unless something branches to it.
    pub fn insert_after(
        &mut self,
        index: usize,
        patch: impl FnOnce(&mut PatchEmitter) -> Result<(), Error> + 'p,
    ) -> Result<(), Error> {
        self.require_instruction("insert_after", index)?;
        self.pass.insert_after(index, Box::new(patch));
        Ok(())
    }

    /// Replace an instruction (at most once per pass)
    pub fn replace_with(
        &mut self,
        index: usize,
        patch: impl FnOnce(&mut PatchEmitter) -> Result<(), Error> + 'p,
    ) -> Result<(), Error> {
        self.require_instruction("replace_with", index)?;
        self.pass.replace_with(index, Box::new(patch))
    }

    /// Wrap an instruction in a handler whose body is emitted by the patch
    ///
    /// The handler only covers the instruction (or its replacement), not patches inserted before
    /// or after it. When the handler body completes, control continues after the instruction.
    /// Handlers added later are tried first.
    pub fn add_instruction_handler(
        &mut self,
        index: usize,
        catch_class: Option<Name>,
        patch: impl FnOnce(&mut PatchEmitter) -> Result<(), Error> + 'p,
    ) -> Result<(), Error> {
        self.require_instruction("add_instruction_handler", index)?;
        self.pass
            .add_instruction_handler(index, catch_class, Box::new(patch));
        Ok(())
    }

    /// Wrap the whole method in a handler whose body is emitted by the patch
    ///
    /// The body is placed after the method and must not fall off its end. Handlers added later
    /// are tried first.
    pub fn add_method_handler(
        &mut self,
        catch_class: Option<Name>,
        patch: impl FnOnce(&mut PatchEmitter) -> Result<(), Error> + 'p,
    ) -> Result<(), Error> {
        self.require("add_method_handler", EditorState::DuringPass)?;
        let label = self.pass.allocate_label();
        self.pass.method_handlers.push(HandlerPatch {
            catch_class,
            label,
            patch: Box::new(patch),
        });
        self.pass.patch_count += 1;
        Ok(())
    }

    /// Add code after the method body (and after method-wide handlers)
    ///
    /// Only reachable through labels. The last patch inserted runs first.
    pub fn insert_after_body(
        &mut self,
        patch: impl FnOnce(&mut PatchEmitter) -> Result<(), Error> + 'p,
    ) -> Result<(), Error> {
        self.require("insert_after_body", EditorState::DuringPass)?;
        self.pass.after_body.push(Box::new(patch));
        self.pass.patch_count += 1;
        Ok(())
    }

    /// Walk the instructions, registering patches relative to each one
    pub fn visit_instructions(
        &mut self,
        mut visit: impl FnMut(&mut InstructionCursor<'_, 'p>, &Instruction) -> Result<(), Error>,
    ) -> Result<(), Error> {
        self.require("visit_instructions", EditorState::DuringPass)?;
        let pass = &mut self.pass;
        for (index, insn) in self.method.instructions().iter().enumerate() {
            let mut cursor = InstructionCursor {
                pass: &mut *pass,
                index,
            };
            visit(&mut cursor, insn)?;
        }
        Ok(())
    }

    /// Run every patch and build the new method body
    ///
    /// Returns whether the body changed.
    pub fn apply_patches(&mut self) -> Result<bool, Error> {
        self.require("apply_patches", EditorState::DuringPass)?;
        self.state = EditorState::EmittingCode;
        let pass = std::mem::take(&mut self.pass);
        let outcome = if pass.patch_count == 0 {
            Ok(None)
        } else {
            reconcile(&self.method, pass)
        };
        self.state = EditorState::BeforeEndPass;
        self.outcome = outcome?;
        Ok(self.outcome.is_some())
    }

    /// Finish the pass, applying patches if that hasn't happened yet
    pub fn end_pass(&mut self) -> Result<Reconciled, Error> {
        if self.state == EditorState::DuringPass {
            self.apply_patches()?;
        }
        self.require("end_pass", EditorState::BeforeEndPass)?;
        self.state = EditorState::BeforePass;
        match self.outcome.take() {
            Some(method) => {
                self.method = method.clone();
                Ok(Reconciled::Changed(method))
            }
            None => Ok(Reconciled::Unchanged),
        }
    }
}

/// Handle for registering patches against the instruction being visited
pub struct InstructionCursor<'a, 'p> {
    pass: &'a mut Pass<'p>,
    index: usize,
}

impl<'a, 'p> InstructionCursor<'a, 'p> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn insert_before(
        &mut self,
        patch: impl FnOnce(&mut PatchEmitter) -> Result<(), Error> + 'p,
    ) {
        self.pass.insert_before(self.index, Box::new(patch))
    }

    pub fn insert_after(
        &mut self,
        patch: impl FnOnce(&mut PatchEmitter) -> Result<(), Error> + 'p,
    ) {
        self.pass.insert_after(self.index, Box::new(patch))
    }

    pub fn replace_with(
        &mut self,
        patch: impl FnOnce(&mut PatchEmitter) -> Result<(), Error> + 'p,
    ) -> Result<(), Error> {
        self.pass.replace_with(self.index, Box::new(patch))
    }

    pub fn add_instruction_handler(
        &mut self,
        catch_class: Option<Name>,
        patch: impl FnOnce(&mut PatchEmitter) -> Result<(), Error> + 'p,
    ) {
        self.pass
            .add_instruction_handler(self.index, catch_class, Box::new(patch))
    }
}

/// Sink for the code emitted by patches
///
/// Branch and handler targets of emitted instructions are labels (see the module docs).
pub struct PatchEmitter {
    instructions: Vec<Instruction>,
    handlers: Vec<HandlerList>,
    origins: Vec<Option<usize>>,
    label_positions: Vec<Option<usize>>,

    /// Handlers covering the insertion point
    covering: HandlerList,

    /// Origin given to emitted instructions
    origin: Option<usize>,

    /// Has a patch emitted anything?
    changed: bool,
}

impl PatchEmitter {
    fn new(labels: usize) -> PatchEmitter {
        PatchEmitter {
            instructions: vec![],
            handlers: vec![],
            origins: vec![],
            label_positions: vec![None; labels],
            covering: HandlerList::empty(),
            origin: None,
            changed: false,
        }
    }

    /// Emit an instruction, covered by the handlers of the insertion point
    pub fn emit(&mut self, insn: Instruction) -> Result<(), Error> {
        insn.check_operands()?;
        self.changed = true;
        let covering = self.covering.clone();
        self.push(insn, covering);
        Ok(())
    }

    /// Emit an instruction covered by extra handlers, tried before those of the insertion point
    pub fn emit_with_handlers(
        &mut self,
        insn: Instruction,
        handlers: &[ExceptionHandler],
    ) -> Result<(), Error> {
        if handlers.is_empty() {
            return self.emit(insn);
        }
        insn.check_operands()?;
        self.changed = true;
        let list = HandlerList::new(
            handlers
                .iter()
                .chain(self.covering.iter())
                .cloned()
                .collect(),
        );
        self.push(insn, list);
        Ok(())
    }

    /// Place a label at the next instruction emitted
    pub fn emit_label(&mut self, label: Label) -> Result<(), Error> {
        let position = self.instructions.len();
        match self.label_positions.get_mut(label.0) {
            Some(slot) => {
                *slot = Some(position);
                Ok(())
            }
            None => Err(Error::UnplacedLabel(label)),
        }
    }

    fn place(&mut self, label: usize) {
        if let Some(slot) = self.label_positions.get_mut(label) {
            *slot = Some(self.instructions.len());
        }
    }

    fn push(&mut self, insn: Instruction, handlers: HandlerList) {
        self.instructions.push(insn);
        self.handlers.push(handlers);
        self.origins.push(self.origin);
    }

    fn resolve(&self, label: usize) -> Result<usize, Error> {
        self.label_positions
            .get(label)
            .copied()
            .flatten()
            .ok_or(Error::UnplacedLabel(Label(label)))
    }
}

fn run_patch(out: &mut PatchEmitter, patch: Patch) -> Result<(), Error> {
    patch(out)
}

fn concat(
    first: impl IntoIterator<Item = ExceptionHandler>,
    rest: &[ExceptionHandler],
) -> Vec<ExceptionHandler> {
    first.into_iter().chain(rest.iter().cloned()).collect()
}

/// Run the patches of a pass and put the new method body together
fn reconcile(method: &MethodData, pass: Pass) -> Result<Option<MethodData>, Error> {
    let len = method.len();
    let Pass {
        next_label,
        at_start,
        before,
        after,
        replacements,
        instruction_handlers,
        method_handlers,
        after_body,
        ..
    } = pass;
    let mut out = PatchEmitter::new(next_label);
    let mut interner = HandlerInterner::new();

    for patch in at_start.into_iter().rev() {
        run_patch(&mut out, patch)?;
    }

    // Method-wide handlers cover everything except their own bodies, latest first
    let method_chain: Vec<HandlerPatch> = method_handlers.into_iter().rev().collect();
    let method_list: Vec<ExceptionHandler> =
        method_chain.iter().map(HandlerPatch::handler).collect();
    out.changed |= !method_chain.is_empty();

    let per_instruction = before
        .into_iter()
        .zip(replacements)
        .zip(after)
        .zip(instruction_handlers);
    for (index, (((before, replacement), after), handler_patches)) in per_instruction.enumerate()
    {
        out.place(index);
        out.origin = method.origins()[index];
        let original = method.handlers()[index].iter().cloned();
        let basic = interner.intern(concat(original, &method_list));

        out.covering = basic.clone();
        for patch in before.into_iter().rev() {
            run_patch(&mut out, patch)?;
        }

        let chain: Vec<HandlerPatch> = handler_patches.into_iter().rev().collect();
        let chain_list: Vec<ExceptionHandler> = chain.iter().map(HandlerPatch::handler).collect();
        out.covering = interner.intern(concat(chain_list.iter().cloned(), &basic));
        match replacement {
            Some(patch) => {
                out.changed = true;
                run_patch(&mut out, patch)?;
            }
            None => {
                let covering = out.covering.clone();
                out.push(method.instructions()[index].clone(), covering);
            }
        }

        out.covering = basic.clone();
        for patch in after {
            run_patch(&mut out, patch)?;
        }

        // Handler bodies sit behind a jump over them, and each jumps back when it's done
        if !chain.is_empty() {
            out.changed = true;
            let resume = index + 1;
            out.push(Instruction::Goto(resume), basic.clone());
            for (position, handler_patch) in chain.into_iter().enumerate() {
                out.covering =
                    interner.intern(concat(chain_list[position + 1..].iter().cloned(), &basic));
                out.place(handler_patch.label);
                run_patch(&mut out, handler_patch.patch)?;
                let covering = out.covering.clone();
                out.push(Instruction::Goto(resume), covering);
            }
        }
    }
    out.place(len);

    out.origin = None;
    for (position, handler_patch) in method_chain.into_iter().enumerate() {
        out.covering = interner.intern(method_list[position + 1..].to_vec());
        out.place(handler_patch.label);
        run_patch(&mut out, handler_patch.patch)?;
    }

    out.covering = HandlerList::empty();
    for patch in after_body.into_iter().rev() {
        run_patch(&mut out, patch)?;
    }

    if !out.changed {
        log::debug!("Editing pass over `{}` changed nothing", method.name);
        return Ok(None);
    }

    // Labels become instruction indices
    let mut instructions = Vec::with_capacity(out.instructions.len());
    for insn in &out.instructions {
        for target in insn.branch_targets() {
            out.resolve(*target)?;
        }
        instructions.push(insn.map_targets(|label| out.resolve(label).unwrap_or(label)));
    }
    let mut handlers = Vec::with_capacity(out.handlers.len());
    for list in &out.handlers {
        let mut resolved = Vec::with_capacity(list.len());
        for handler in list.iter() {
            resolved.push(ExceptionHandler {
                target: out.resolve(handler.target)?,
                ..handler.clone()
            });
        }
        handlers.push(interner.intern(resolved));
    }
    log::debug!(
        "Editing pass over `{}` went from {} to {} instructions",
        method.name,
        len,
        instructions.len()
    );
    method
        .with_body(instructions, handlers, out.origins)
        .map(Some)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{Constant, InvokeKind, PopCount, ValueType};
    use crate::jvm::{MethodAccessFlags, MethodDescriptor, MethodRef, ParseDescriptor};

    fn method(instructions: Vec<Instruction>, handlers: Vec<HandlerList>) -> MethodData {
        let len = instructions.len();
        MethodData::new(
            MethodAccessFlags::STATIC,
            Name::from("Foo"),
            Name::from("bar"),
            MethodDescriptor::parse("()V").unwrap(),
            instructions,
            handlers,
            (0..len).map(|idx| Some(idx * 10)).collect(),
        )
        .unwrap()
    }

    fn simple(instructions: Vec<Instruction>) -> MethodData {
        let len = instructions.len();
        method(instructions, vec![HandlerList::empty(); len])
    }

    fn int(value: i32) -> Instruction {
        Instruction::Constant(Constant::Int(value))
    }

    fn pop() -> Instruction {
        Instruction::Pop(PopCount::new(1).unwrap())
    }

    fn call() -> Instruction {
        Instruction::Invoke {
            kind: InvokeKind::Static,
            method: MethodRef {
                class: Name::from("Foo"),
                name: Name::from("f"),
                descriptor: MethodDescriptor::parse("()V").unwrap(),
                is_interface: false,
            },
        }
    }

    fn changed(editor: &mut MethodEditor) -> MethodData {
        match editor.end_pass().unwrap() {
            Reconciled::Changed(method) => method,
            Reconciled::Unchanged => panic!("expected the pass to change the method"),
        }
    }

    #[test]
    fn operations_check_the_state() {
        let original = simple(vec![Instruction::Return(None)]);
        let mut editor = MethodEditor::new(&original);
        assert!(matches!(
            editor.insert_before(0, |_| Ok(())),
            Err(Error::InvalidEditorState {
                operation: "insert_before",
                state: EditorState::BeforePass
            })
        ));
        assert!(editor.allocate_label().is_err());
        assert!(editor.end_pass().is_err());

        editor.begin_pass().unwrap();
        assert!(editor.begin_pass().is_err());
        assert!(matches!(
            editor.insert_after(1, |_| Ok(())),
            Err(Error::InstructionOutOfRange { index: 1, len: 1 })
        ));
        editor.replace_with(0, |_| Ok(())).unwrap();
        assert!(matches!(
            editor.replace_with(0, |_| Ok(())),
            Err(Error::DuplicateReplacement(0))
        ));
        assert!(editor.apply_patches().unwrap());
        assert_eq!(editor.state(), EditorState::BeforeEndPass);
        assert!(editor.insert_at_start(|_| Ok(())).is_err());
        assert!(matches!(editor.end_pass(), Ok(Reconciled::Changed(_))));
        assert_eq!(editor.state(), EditorState::BeforePass);
    }

    #[test]
    fn empty_passes_change_nothing() {
        let original = simple(vec![int(0), pop(), Instruction::Return(None)]);
        let mut editor = MethodEditor::new(&original);
        editor.begin_pass().unwrap();
        assert!(matches!(editor.end_pass(), Ok(Reconciled::Unchanged)));

        // Patches that emit nothing don't count either
        editor.begin_pass().unwrap();
        editor.insert_before(1, |_| Ok(())).unwrap();
        editor.insert_after_body(|_| Ok(())).unwrap();
        assert!(!editor.apply_patches().unwrap());
        assert!(matches!(editor.end_pass(), Ok(Reconciled::Unchanged)));
        assert_eq!(editor.method().instructions(), original.instructions());
    }

    #[test]
    fn patch_ordering() {
        let original = simple(vec![int(0), pop(), Instruction::Return(None)]);
        let mut editor = MethodEditor::new(&original);
        editor.begin_pass().unwrap();
        editor.insert_before(0, |out| out.emit(int(1))).unwrap();
        editor.insert_before(0, |out| out.emit(int(2))).unwrap();
        editor.insert_after(0, |out| out.emit(int(3))).unwrap();
        editor.insert_after(0, |out| out.emit(int(4))).unwrap();
        editor.insert_at_start(|out| out.emit(int(5))).unwrap();
        editor.insert_at_start(|out| out.emit(int(6))).unwrap();
        editor.replace_with(1, |out| {
            for _ in 0..5 {
                out.emit(pop())?;
            }
            Ok(())
        })
        .unwrap();
        let edited = changed(&mut editor);

        let mut expected = vec![int(6), int(5), int(2), int(1), int(0), int(3), int(4)];
        expected.extend(vec![pop(); 5]);
        expected.push(Instruction::Return(None));
        assert_eq!(edited.instructions(), &expected[..]);
        assert_eq!(edited.origins()[0], None);
        assert_eq!(edited.origins()[2], Some(0));
        assert_eq!(edited.origins()[7], Some(10));
        assert_eq!(editor.method().len(), expected.len());
    }

    #[test]
    fn branches_follow_their_targets() {
        let original = simple(vec![
            Instruction::Goto(2),
            int(0),
            Instruction::Return(None),
        ]);
        let mut editor = MethodEditor::new(&original);
        editor.begin_pass().unwrap();
        editor.insert_at_start(|out| out.emit(int(9))).unwrap();
        editor
            .insert_before(2, |out| out.emit(Instruction::Goto(1)))
            .unwrap();
        let edited = changed(&mut editor);
        assert_eq!(
            edited.instructions(),
            &[
                int(9),
                Instruction::Goto(3),
                int(0),
                Instruction::Goto(2),
                Instruction::Return(None)
            ]
        );
    }

    #[test]
    fn allocated_labels() {
        let original = simple(vec![int(0), pop(), Instruction::Return(None)]);
        let mut editor = MethodEditor::new(&original);
        editor.begin_pass().unwrap();
        let label = editor.allocate_label().unwrap();
        assert_eq!(label, Label(4));
        assert_eq!(editor.end_label(), Label(3));
        assert_eq!(editor.instruction_label(2), Label(2));
        editor
            .insert_before(2, move |out| out.emit(Instruction::Goto(label.0)))
            .unwrap();
        editor
            .insert_after_body(move |out| {
                out.emit_label(label)?;
                out.emit(Instruction::Return(None))
            })
            .unwrap();
        let edited = changed(&mut editor);
        assert_eq!(edited.instructions()[2], Instruction::Goto(4));
        assert_eq!(edited.len(), 5);

        // A label that never got placed
        editor.begin_pass().unwrap();
        let label = editor.allocate_label().unwrap();
        editor
            .insert_before(0, move |out| out.emit(Instruction::Goto(label.0)))
            .unwrap();
        assert!(matches!(
            editor.end_pass(),
            Err(Error::UnplacedLabel(unplaced)) if unplaced == label
        ));
        assert!(matches!(editor.end_pass(), Ok(Reconciled::Unchanged)));
    }

    #[test]
    fn instruction_handlers() {
        let original = simple(vec![call(), Instruction::Return(None)]);
        let mut editor = MethodEditor::new(&original);
        editor.begin_pass().unwrap();
        editor
            .add_instruction_handler(0, Some(Name::from("java/lang/Exception")), |out| {
                out.emit(pop())
            })
            .unwrap();
        editor
            .insert_before(0, |out| out.emit(Instruction::Constant(Constant::Null)))
            .unwrap();
        editor.insert_before(0, |out| out.emit(pop())).unwrap();
        let edited = changed(&mut editor);

        // null/pop run in reverse, then the call, guarded handler body, resume at the return
        assert_eq!(
            edited.instructions(),
            &[
                pop(),
                Instruction::Constant(Constant::Null),
                call(),
                Instruction::Goto(6),
                pop(),
                Instruction::Goto(6),
                Instruction::Return(None)
            ]
        );
        let caught = &edited.handlers()[2];
        assert_eq!(caught.len(), 1);
        assert_eq!(caught[0].target, 4);
        assert_eq!(caught[0].catch_class.as_deref(), Some("java/lang/Exception"));
        assert!(edited.handlers()[1].is_empty());
        assert!(edited.handlers()[4].is_empty());
    }

    #[test]
    fn method_handlers() {
        let original = simple(vec![call(), Instruction::Return(None)]);
        let mut editor = MethodEditor::new(&original);
        editor.begin_pass().unwrap();
        editor
            .add_method_handler(None, |out| {
                out.emit(pop())?;
                out.emit(Instruction::Return(None))
            })
            .unwrap();
        editor
            .add_method_handler(Some(Name::from("java/lang/Error")), |out| {
                out.emit(Instruction::Throw)
            })
            .unwrap();
        let edited = changed(&mut editor);

        assert_eq!(
            edited.instructions(),
            &[
                call(),
                Instruction::Return(None),
                Instruction::Throw,
                pop(),
                Instruction::Return(None)
            ]
        );
        let targets = |index: usize| -> Vec<usize> {
            edited.handlers()[index].iter().map(|h| h.target).collect()
        };
        assert_eq!(targets(0), vec![2, 3]);
        assert_eq!(targets(1), vec![2, 3]);
        assert_eq!(targets(2), vec![3]);
        assert!(targets(3).is_empty());
    }

    #[test]
    fn visiting_instructions() {
        let original = simple(vec![
            Instruction::LocalLoad {
                ty: ValueType::Int,
                index: 0,
            },
            pop(),
            Instruction::Return(None),
        ]);
        let mut editor = MethodEditor::new(&original);
        editor.begin_pass().unwrap();
        editor
            .visit_instructions(|cursor, insn| {
                if let Instruction::Return(_) = insn {
                    let index = cursor.index() as i32;
                    cursor.insert_before(move |out| {
                        out.emit(int(index))?;
                        out.emit(pop())
                    });
                }
                Ok(())
            })
            .unwrap();
        let edited = changed(&mut editor);
        assert_eq!(edited.len(), 5);
        assert_eq!(edited.instructions()[2], int(2));
    }
}
