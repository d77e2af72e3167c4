use super::{Constant, Instruction, InvokeKind, MethodData, ValueType};
use crate::jvm::{BaseType, Error, FieldType, Name};
use std::collections::VecDeque;

/// Types of values in locals and on the stack, as tracked by the JVM verifier
///
/// These are [the verification types][0], minus the subtyping between classes: two different
/// class types merge into `java/lang/Object`.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.10.1.2
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum VerificationType {
    Integer,
    Float,
    Long,
    Double,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object or array type
    Object(FieldType),

    /// Object created at instruction `at` whose `<init>` has not been called yet
    Uninitialized { class: Name, at: usize },

    /// Unusable value (uninitialized local, second half of a wide local, incompatible merge)
    Top,
}

impl VerificationType {
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            VerificationType::Null
                | VerificationType::UninitializedThis
                | VerificationType::Object(_)
                | VerificationType::Uninitialized { .. }
        )
    }

    /// Number of words the value takes on the stack (or slots in the locals)
    pub fn words(&self) -> u8 {
        match self {
            VerificationType::Long | VerificationType::Double => 2,
            _ => 1,
        }
    }

    pub fn java_lang_object() -> VerificationType {
        VerificationType::Object(FieldType::java_lang_object())
    }

    /// Type of a value of the given field type
    pub fn of(field_type: &FieldType) -> VerificationType {
        match field_type {
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Base(_) => VerificationType::Integer,
            reference => VerificationType::Object(reference.clone()),
        }
    }

    /// Field type that can hold values of this type, if there is a sensible one
    ///
    /// `null`, uninitialized objects, and `Top` don't have one.
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            VerificationType::Integer => Some(FieldType::int()),
            VerificationType::Float => Some(FieldType::float()),
            VerificationType::Long => Some(FieldType::long()),
            VerificationType::Double => Some(FieldType::double()),
            VerificationType::Object(typ) => Some(typ.clone()),
            _ => None,
        }
    }

    /// Stack representation of this type
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            VerificationType::Integer => Some(ValueType::Int),
            VerificationType::Float => Some(ValueType::Float),
            VerificationType::Long => Some(ValueType::Long),
            VerificationType::Double => Some(ValueType::Double),
            VerificationType::Top => None,
            _ => Some(ValueType::Reference),
        }
    }

    /// Least upper bound of two types
    pub fn merge(&self, other: &VerificationType) -> VerificationType {
        use VerificationType::*;
        match (self, other) {
            _ if self == other => self.clone(),
            (Null, Object(typ)) | (Object(typ), Null) => Object(typ.clone()),
            (Object(_), Object(_)) => VerificationType::java_lang_object(),
            _ => Top,
        }
    }

    fn from_value_type(value_type: ValueType) -> VerificationType {
        match value_type {
            ValueType::Int => VerificationType::Integer,
            ValueType::Long => VerificationType::Long,
            ValueType::Float => VerificationType::Float,
            ValueType::Double => VerificationType::Double,
            ValueType::Reference => VerificationType::Top,
        }
    }
}

impl Instruction {
    /// Type of the value pushed by the instruction
    ///
    /// `stack` holds the types on the stack before the instruction (bottom first) and `at` is the
    /// index of the instruction. This is `None` for instructions that don't push anything and for
    /// `Dup` and `Swap`, which only rearrange existing values.
    pub fn pushed_type(&self, at: usize, stack: &[VerificationType]) -> Option<VerificationType> {
        let typ = match self {
            Instruction::Constant(constant) => match constant {
                Constant::Null => VerificationType::Null,
                Constant::Int(_) => VerificationType::Integer,
                Constant::Long(_) => VerificationType::Long,
                Constant::Float(_) => VerificationType::Float,
                Constant::Double(_) => VerificationType::Double,
                Constant::String(_) => VerificationType::Object(FieldType::object("java/lang/String")),
                Constant::Class(_) => VerificationType::Object(FieldType::object("java/lang/Class")),
                Constant::MethodType(_) => {
                    VerificationType::Object(FieldType::object("java/lang/invoke/MethodType"))
                }
                Constant::MethodHandle(_) => {
                    VerificationType::Object(FieldType::object("java/lang/invoke/MethodHandle"))
                }
            },

            // The array is under the index
            Instruction::ArrayLoad(elem) if elem.value_type() == ValueType::Reference => {
                match stack.len().checked_sub(2).map(|idx| &stack[idx]) {
                    Some(VerificationType::Object(FieldType::Array(elem_type))) => {
                        VerificationType::of(elem_type)
                    }
                    Some(VerificationType::Null) => VerificationType::Null,
                    _ => VerificationType::Top,
                }
            }
            Instruction::GetField { field, .. } => VerificationType::of(&field.descriptor),
            Instruction::Invoke { method, .. } => {
                VerificationType::of(method.descriptor.return_type.as_ref()?)
            }
            Instruction::InvokeDynamic(call_site) => {
                VerificationType::of(call_site.descriptor.return_type.as_ref()?)
            }
            Instruction::New(class) => VerificationType::Uninitialized {
                class: class.clone(),
                at,
            },
            Instruction::NewArray(elem) => VerificationType::Object(FieldType::array(elem.clone())),
            Instruction::MultiNewArray { array, .. } | Instruction::CheckCast(array) => {
                VerificationType::Object(array.clone())
            }
            other => VerificationType::from_value_type(other.pushed_value_type()?),
        };
        Some(typ)
    }
}

/// Types of the locals and the stack before an instruction runs
///
/// A `long` or `double` local takes up two entries in `locals`: its type followed by `Top`. The
/// stack has one entry per element.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TypeFrame {
    pub locals: Vec<VerificationType>,
    pub stack: Vec<VerificationType>,
}

impl TypeFrame {
    /// Frame on entry to a method
    pub fn method_entry(method: &MethodData, max_locals: usize) -> TypeFrame {
        let mut locals = vec![];
        if !method.is_static() {
            if &*method.name == "<init>" {
                locals.push(VerificationType::UninitializedThis);
            } else {
                locals.push(VerificationType::Object(FieldType::Object(
                    method.class_name.clone(),
                )));
            }
        }
        for param in &method.descriptor.parameters {
            let typ = VerificationType::of(param);
            let wide = typ.words() == 2;
            locals.push(typ);
            if wide {
                locals.push(VerificationType::Top);
            }
        }
        if locals.len() < max_locals {
            locals.resize(max_locals, VerificationType::Top);
        }
        TypeFrame {
            locals,
            stack: vec![],
        }
    }

    fn set_local(&mut self, index: usize, typ: VerificationType) {
        let words = typ.words() as usize;
        if self.locals.len() < index + words {
            self.locals.resize(index + words, VerificationType::Top);
        }

        // Overwriting the second half of a wide value invalidates the first half
        if index > 0 && self.locals[index - 1].words() == 2 {
            self.locals[index - 1] = VerificationType::Top;
        }
        self.locals[index] = typ;
        if words == 2 {
            self.locals[index + 1] = VerificationType::Top;
        }
    }

    fn pop(&mut self, count: usize, at: usize) -> Result<Vec<VerificationType>, Error> {
        let remaining = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or_else(|| Error::stack_shape(at, "stack underflow while inferring types"))?;
        Ok(self.stack.split_off(remaining))
    }

    /// Replace an uninitialized type everywhere, after its `<init>` has been called
    fn initialize(&mut self, uninitialized: &VerificationType, initialized: VerificationType) {
        for typ in self.locals.iter_mut().chain(self.stack.iter_mut()) {
            if typ == uninitialized {
                *typ = initialized.clone();
            }
        }
    }

    /// Update the frame to reflect what happens after the instruction runs
    fn apply(&mut self, method: &MethodData, insn: &Instruction, at: usize) -> Result<(), Error> {
        match insn {
            Instruction::LocalLoad { ty, index } => {
                let typ = match self.locals.get(*index as usize) {
                    Some(typ) if typ.value_type() == Some(*ty) => typ.clone(),
                    _ => VerificationType::from_value_type(*ty),
                };
                self.stack.push(typ);
            }
            Instruction::LocalStore { index, .. } => {
                let mut popped = self.pop(1, at)?;
                self.set_local(*index as usize, popped.remove(0));
            }
            Instruction::Dup(shape) => {
                let popped = self.pop(shape.size() + shape.delta(), at)?;
                let (under, copied) = popped.split_at(shape.delta());
                self.stack.extend_from_slice(copied);
                self.stack.extend_from_slice(under);
                self.stack.extend_from_slice(copied);
            }
            Instruction::Swap => {
                let mut popped = self.pop(2, at)?;
                popped.swap(0, 1);
                self.stack.extend(popped);
            }
            Instruction::Invoke { kind, method: callee } => {
                let popped = self.pop(insn.popped_count(), at)?;
                if *kind == InvokeKind::Special && callee.is_init() {
                    match popped.first() {
                        Some(uninit @ VerificationType::Uninitialized { .. }) => {
                            let initialized = match uninit {
                                VerificationType::Uninitialized { class, .. } => {
                                    VerificationType::Object(FieldType::Object(class.clone()))
                                }
                                _ => VerificationType::Top,
                            };
                            self.initialize(uninit, initialized);
                        }
                        Some(VerificationType::UninitializedThis) => {
                            let initialized =
                                VerificationType::Object(FieldType::Object(method.class_name.clone()));
                            self.initialize(&VerificationType::UninitializedThis, initialized);
                        }
                        _ => (),
                    }
                }
                if let Some(typ) = insn.pushed_type(at, &self.stack) {
                    self.stack.push(typ);
                }
            }
            _ => {
                let pushed = insn.pushed_type(at, &self.stack);
                self.pop(insn.popped_count(), at)?;
                if let Some(typ) = pushed {
                    self.stack.push(typ);
                }
            }
        }
        Ok(())
    }

    /// Merge another frame into this one, returning whether anything changed
    fn merge_from(&mut self, other: &TypeFrame, at: usize) -> Result<bool, Error> {
        if self.stack.len() != other.stack.len() {
            return Err(Error::stack_shape(
                at,
                format!(
                    "stack has {} elements along one path but {} along another",
                    self.stack.len(),
                    other.stack.len()
                ),
            ));
        }
        let mut changed = false;
        if self.locals.len() < other.locals.len() {
            self.locals.resize(other.locals.len(), VerificationType::Top);
            changed = true;
        }
        let others = other
            .locals
            .iter()
            .chain(std::iter::repeat(&VerificationType::Top));
        for (mine, theirs) in self.locals.iter_mut().zip(others) {
            let merged = mine.merge(theirs);
            if merged != *mine {
                *mine = merged;
                changed = true;
            }
        }
        for (mine, theirs) in self.stack.iter_mut().zip(other.stack.iter()) {
            let merged = mine.merge(theirs);
            if merged != *mine {
                *mine = merged;
                changed = true;
            }
        }
        Ok(changed)
    }
}

/// Infer the type frame before every instruction of a method
///
/// This is a forward dataflow analysis to a fixed point. Unreachable instructions get no frame.
/// Handlers are entered with the locals from before or after any instruction they cover and the
/// caught exception on the stack.
pub fn infer_frames(
    method: &MethodData,
    max_locals: usize,
) -> Result<Vec<Option<TypeFrame>>, Error> {
    let instructions = method.instructions();
    let handlers = method.handlers();
    let len = instructions.len();
    let mut frames: Vec<Option<TypeFrame>> = vec![None; len];
    if len == 0 {
        return Ok(frames);
    }

    let mut queued = vec![false; len];
    let mut worklist = VecDeque::new();
    frames[0] = Some(TypeFrame::method_entry(method, max_locals));
    worklist.push_back(0);
    queued[0] = true;

    while let Some(index) = worklist.pop_front() {
        queued[index] = false;
        let before = match &frames[index] {
            Some(frame) => frame.clone(),
            None => continue,
        };
        let insn = &instructions[index];
        let mut after = before.clone();
        after.apply(method, insn, index)?;

        for handler in handlers[index].iter() {
            let exception = match &handler.catch_class {
                Some(class) => FieldType::Object(class.clone()),
                None => FieldType::object("java/lang/Throwable"),
            };
            let mut locals_frame = before.clone();
            locals_frame.stack = vec![];
            let mut after_locals = after.clone();
            after_locals.stack = vec![];
            locals_frame.merge_from(&after_locals, handler.target)?;
            locals_frame.stack = vec![VerificationType::Object(exception)];
            propagate(&mut frames, &mut worklist, &mut queued, handler.target, &locals_frame)?;
        }
        for target in insn.branch_targets() {
            propagate(&mut frames, &mut worklist, &mut queued, *target, &after)?;
        }
        if insn.is_fall_through() {
            propagate(&mut frames, &mut worklist, &mut queued, index + 1, &after)?;
        }
    }

    Ok(frames)
}

/// Merge a frame into the frame before `target`, queueing `target` if its frame changed
fn propagate(
    frames: &mut [Option<TypeFrame>],
    worklist: &mut VecDeque<usize>,
    queued: &mut [bool],
    target: usize,
    frame: &TypeFrame,
) -> Result<(), Error> {
    if target >= frames.len() {
        return Err(Error::InvalidOperand(format!(
            "control flow reaches index {} of {}",
            target,
            frames.len()
        )));
    }
    let changed = match &mut frames[target] {
        Some(existing) => existing.merge_from(frame, target)?,
        slot @ None => {
            *slot = Some(frame.clone());
            true
        }
    };
    if changed && !queued[target] {
        queued[target] = true;
        worklist.push_back(target);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::*;
    use crate::jvm::{MethodAccessFlags, MethodDescriptor, MethodRef, ParseDescriptor};

    fn method(descriptor: &str, is_static: bool, instructions: Vec<Instruction>) -> MethodData {
        let len = instructions.len();
        let flags = if is_static {
            MethodAccessFlags::STATIC
        } else {
            MethodAccessFlags::PUBLIC
        };
        MethodData::new(
            flags,
            Name::from("Foo"),
            Name::from("bar"),
            MethodDescriptor::parse(descriptor).unwrap(),
            instructions,
            vec![HandlerList::empty(); len],
            vec![None; len],
        )
        .unwrap()
    }

    #[test]
    fn merges() {
        let string = VerificationType::Object(FieldType::object("java/lang/String"));
        let list = VerificationType::Object(FieldType::object("java/util/List"));
        assert_eq!(VerificationType::Null.merge(&string), string);
        assert_eq!(string.merge(&list), VerificationType::java_lang_object());
        assert_eq!(string.merge(&VerificationType::Integer), VerificationType::Top);
        assert_eq!(
            VerificationType::Long.merge(&VerificationType::Long),
            VerificationType::Long
        );
    }

    #[test]
    fn entry_frame() {
        let method = method("(JLjava/lang/String;)V", false, vec![Instruction::Return(None)]);
        let frame = TypeFrame::method_entry(&method, 5);
        assert_eq!(
            frame.locals,
            vec![
                VerificationType::Object(FieldType::object("Foo")),
                VerificationType::Long,
                VerificationType::Top,
                VerificationType::Object(FieldType::object("java/lang/String")),
                VerificationType::Top,
            ]
        );
    }

    #[test]
    fn array_elements_and_stores() {
        let method = method(
            "([Ljava/lang/String;)V",
            true,
            vec![
                Instruction::LocalLoad {
                    ty: ValueType::Reference,
                    index: 0,
                },
                Instruction::Constant(Constant::Int(0)),
                Instruction::ArrayLoad(ArrayElement::Reference),
                Instruction::LocalStore {
                    ty: ValueType::Reference,
                    index: 1,
                },
                Instruction::Return(None),
            ],
        );
        let frames = infer_frames(&method, 2).unwrap();
        let last = frames[4].as_ref().unwrap();
        assert_eq!(
            last.locals[1],
            VerificationType::Object(FieldType::object("java/lang/String"))
        );
        assert!(last.stack.is_empty());
    }

    #[test]
    fn constructor_calls_initialize() {
        let init = MethodRef {
            class: Name::from("Bar"),
            name: Name::from("<init>"),
            descriptor: MethodDescriptor::parse("()V").unwrap(),
            is_interface: false,
        };
        let method = method(
            "()V",
            true,
            vec![
                Instruction::New(Name::from("Bar")),
                Instruction::Dup(DupShape::new(1, 0).unwrap()),
                Instruction::Invoke {
                    kind: InvokeKind::Special,
                    method: init,
                },
                Instruction::Pop(PopCount::new(1).unwrap()),
                Instruction::Return(None),
            ],
        );
        let frames = infer_frames(&method, 0).unwrap();
        assert_eq!(
            frames[2].as_ref().unwrap().stack,
            vec![
                VerificationType::Uninitialized {
                    class: Name::from("Bar"),
                    at: 0
                };
                2
            ]
        );
        assert_eq!(
            frames[3].as_ref().unwrap().stack,
            vec![VerificationType::Object(FieldType::object("Bar"))]
        );
    }

    #[test]
    fn loops_merge_to_fixed_point() {
        // x = null; while (x == null) { x = "s"; }
        let method = method(
            "()V",
            true,
            vec![
                Instruction::Constant(Constant::Null),
                Instruction::LocalStore {
                    ty: ValueType::Reference,
                    index: 0,
                },
                Instruction::LocalLoad {
                    ty: ValueType::Reference,
                    index: 0,
                },
                Instruction::Constant(Constant::Null),
                Instruction::ConditionalBranch {
                    comparison: Comparison::Reference(ReferenceCondition::Ne),
                    target: 8,
                },
                Instruction::Constant(Constant::String(Name::from("s"))),
                Instruction::LocalStore {
                    ty: ValueType::Reference,
                    index: 0,
                },
                Instruction::Goto(2),
                Instruction::Return(None),
            ],
        );
        let frames = infer_frames(&method, 1).unwrap();
        assert_eq!(
            frames[2].as_ref().unwrap().locals[0],
            VerificationType::Object(FieldType::object("java/lang/String"))
        );
    }
}
