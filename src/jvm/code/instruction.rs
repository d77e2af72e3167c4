use super::Constant;
use crate::jvm::{DynamicCallSite, Error, FieldRef, FieldType, MethodRef, Name, RenderDescriptor};
use crate::jvm::{BaseType, MethodDescriptor};
use crate::util::Width;
use std::fmt;
use std::ops::Not;

/// Kinds of values in local variables and on the operand stack
///
/// `boolean`, `byte`, `char`, and `short` values are all `Int` once they are on the stack.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ValueType {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueType {
    /// Number of stack words (or local variable slots) the value takes up
    pub fn words(self) -> u8 {
        match self {
            ValueType::Long | ValueType::Double => 2,
            _ => 1,
        }
    }

    /// Stack representation of a field type
    pub fn of(field_type: &FieldType) -> ValueType {
        match field_type {
            FieldType::Base(BaseType::Long) => ValueType::Long,
            FieldType::Base(BaseType::Float) => ValueType::Float,
            FieldType::Base(BaseType::Double) => ValueType::Double,
            FieldType::Base(_) => ValueType::Int,
            FieldType::Object(_) | FieldType::Array(_) => ValueType::Reference,
        }
    }

    /// Field type with the same stack representation (references become `java/lang/Object`)
    pub fn field_type(self) -> FieldType {
        match self {
            ValueType::Int => FieldType::int(),
            ValueType::Long => FieldType::long(),
            ValueType::Float => FieldType::float(),
            ValueType::Double => FieldType::double(),
            ValueType::Reference => FieldType::java_lang_object(),
        }
    }

    /// Position in the `i`, `l`, `f`, `d`, `a` opcode families
    pub(crate) fn opcode_offset(self) -> u8 {
        match self {
            ValueType::Int => 0,
            ValueType::Long => 1,
            ValueType::Float => 2,
            ValueType::Double => 3,
            ValueType::Reference => 4,
        }
    }

    fn letter(self) -> char {
        match self {
            ValueType::Int => 'I',
            ValueType::Long => 'J',
            ValueType::Float => 'F',
            ValueType::Double => 'D',
            ValueType::Reference => 'A',
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Element types distinguished by array load and store instructions
///
/// `Byte` is used for both `byte[]` and `boolean[]`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ArrayElement {
    Int,
    Long,
    Float,
    Double,
    Reference,
    Byte,
    Char,
    Short,
}

impl ArrayElement {
    pub fn value_type(self) -> ValueType {
        match self {
            ArrayElement::Long => ValueType::Long,
            ArrayElement::Float => ValueType::Float,
            ArrayElement::Double => ValueType::Double,
            ArrayElement::Reference => ValueType::Reference,
            ArrayElement::Int | ArrayElement::Byte | ArrayElement::Char | ArrayElement::Short => {
                ValueType::Int
            }
        }
    }

    /// Position in the `iaload`..`saload` (or `iastore`..`sastore`) opcode families
    pub(crate) fn opcode_offset(self) -> u8 {
        match self {
            ArrayElement::Int => 0,
            ArrayElement::Long => 1,
            ArrayElement::Float => 2,
            ArrayElement::Double => 3,
            ArrayElement::Reference => 4,
            ArrayElement::Byte => 5,
            ArrayElement::Char => 6,
            ArrayElement::Short => 7,
        }
    }

    pub(crate) fn from_opcode_offset(offset: u8) -> Option<ArrayElement> {
        Some(match offset {
            0 => ArrayElement::Int,
            1 => ArrayElement::Long,
            2 => ArrayElement::Float,
            3 => ArrayElement::Double,
            4 => ArrayElement::Reference,
            5 => ArrayElement::Byte,
            6 => ArrayElement::Char,
            7 => ArrayElement::Short,
            _ => return None,
        })
    }
}

impl fmt::Display for ArrayElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            ArrayElement::Int => 'I',
            ArrayElement::Long => 'J',
            ArrayElement::Float => 'F',
            ArrayElement::Double => 'D',
            ArrayElement::Reference => 'A',
            ArrayElement::Byte => 'B',
            ArrayElement::Char => 'C',
            ArrayElement::Short => 'S',
        };
        write!(f, "{}", letter)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
}

impl BinaryOperator {
    fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOperator::And | BinaryOperator::Or | BinaryOperator::Xor
        )
    }

    fn name(self) -> &'static str {
        match self {
            BinaryOperator::Add => "add",
            BinaryOperator::Sub => "sub",
            BinaryOperator::Mul => "mul",
            BinaryOperator::Div => "div",
            BinaryOperator::Rem => "rem",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::Xor => "xor",
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ShiftOperator {
    /// Shift left
    Shl,

    /// Arithmetic shift right
    Shr,

    /// Logical shift right
    Ushr,
}

/// Comparison of two values producing `-1`, `0`, or `1`
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ComparisonOperator {
    /// Only for `long`
    Cmp,

    /// Floating point comparison where `NaN` produces `-1`
    Cmpl,

    /// Floating point comparison where `NaN` produces `1`
    Cmpg,
}

/// Conditions on the ordering of two `int`s
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BranchCondition {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl BranchCondition {
    /// Position in the `ifeq`..`ifle` (or `if_icmpeq`..`if_icmple`) opcode families
    pub(crate) fn opcode_offset(self) -> u8 {
        match self {
            BranchCondition::Eq => 0,
            BranchCondition::Ne => 1,
            BranchCondition::Lt => 2,
            BranchCondition::Ge => 3,
            BranchCondition::Gt => 4,
            BranchCondition::Le => 5,
        }
    }

    pub(crate) fn from_opcode_offset(offset: u8) -> Option<BranchCondition> {
        Some(match offset {
            0 => BranchCondition::Eq,
            1 => BranchCondition::Ne,
            2 => BranchCondition::Lt,
            3 => BranchCondition::Ge,
            4 => BranchCondition::Gt,
            5 => BranchCondition::Le,
            _ => return None,
        })
    }

    /// Evaluate the condition on two values
    pub fn holds(self, left: i32, right: i32) -> bool {
        match self {
            BranchCondition::Eq => left == right,
            BranchCondition::Ne => left != right,
            BranchCondition::Lt => left < right,
            BranchCondition::Ge => left >= right,
            BranchCondition::Gt => left > right,
            BranchCondition::Le => left <= right,
        }
    }

    fn name(self) -> &'static str {
        match self {
            BranchCondition::Eq => "eq",
            BranchCondition::Ne => "ne",
            BranchCondition::Lt => "lt",
            BranchCondition::Ge => "ge",
            BranchCondition::Gt => "gt",
            BranchCondition::Le => "le",
        }
    }
}

impl Not for BranchCondition {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            BranchCondition::Eq => BranchCondition::Ne,
            BranchCondition::Ne => BranchCondition::Eq,
            BranchCondition::Lt => BranchCondition::Ge,
            BranchCondition::Ge => BranchCondition::Lt,
            BranchCondition::Gt => BranchCondition::Le,
            BranchCondition::Le => BranchCondition::Gt,
        }
    }
}

/// Conditions on the identity of two references
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ReferenceCondition {
    Eq,
    Ne,
}

impl Not for ReferenceCondition {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            ReferenceCondition::Eq => ReferenceCondition::Ne,
            ReferenceCondition::Ne => ReferenceCondition::Eq,
        }
    }
}

/// What a conditional branch compares: the top two stack values, both of the same kind
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Comparison {
    Int(BranchCondition),
    Reference(ReferenceCondition),
}

impl Comparison {
    /// Kind of the two operands
    pub fn operand_type(self) -> ValueType {
        match self {
            Comparison::Int(_) => ValueType::Int,
            Comparison::Reference(_) => ValueType::Reference,
        }
    }
}

impl Not for Comparison {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            Comparison::Int(cond) => Comparison::Int(!cond),
            Comparison::Reference(cond) => Comparison::Reference(!cond),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Int(cond) => write!(f, "I,{}", cond.name()),
            Comparison::Reference(ReferenceCondition::Eq) => write!(f, "A,eq"),
            Comparison::Reference(ReferenceCondition::Ne) => write!(f, "A,ne"),
        }
    }
}

/// Result type of a conversion
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ConversionTarget {
    Int,
    Long,
    Float,
    Double,

    /// `int` truncated to a `byte` (the result is still an `int` on the stack)
    Byte,
    Char,
    Short,
}

impl ConversionTarget {
    pub fn value_type(self) -> ValueType {
        match self {
            ConversionTarget::Long => ValueType::Long,
            ConversionTarget::Float => ValueType::Float,
            ConversionTarget::Double => ValueType::Double,
            ConversionTarget::Int
            | ConversionTarget::Byte
            | ConversionTarget::Char
            | ConversionTarget::Short => ValueType::Int,
        }
    }

    fn is_narrowing(self) -> bool {
        matches!(
            self,
            ConversionTarget::Byte | ConversionTarget::Char | ConversionTarget::Short
        )
    }

    fn letter(self) -> char {
        match self {
            ConversionTarget::Int => 'I',
            ConversionTarget::Long => 'J',
            ConversionTarget::Float => 'F',
            ConversionTarget::Double => 'D',
            ConversionTarget::Byte => 'B',
            ConversionTarget::Char => 'C',
            ConversionTarget::Short => 'S',
        }
    }
}

/// `i2l` through `i2s`, in opcode order
pub(crate) const CONVERSIONS: [(ValueType, ConversionTarget); 15] = [
    (ValueType::Int, ConversionTarget::Long),
    (ValueType::Int, ConversionTarget::Float),
    (ValueType::Int, ConversionTarget::Double),
    (ValueType::Long, ConversionTarget::Int),
    (ValueType::Long, ConversionTarget::Float),
    (ValueType::Long, ConversionTarget::Double),
    (ValueType::Float, ConversionTarget::Int),
    (ValueType::Float, ConversionTarget::Long),
    (ValueType::Float, ConversionTarget::Double),
    (ValueType::Double, ConversionTarget::Int),
    (ValueType::Double, ConversionTarget::Long),
    (ValueType::Double, ConversionTarget::Float),
    (ValueType::Int, ConversionTarget::Byte),
    (ValueType::Int, ConversionTarget::Char),
    (ValueType::Int, ConversionTarget::Short),
];

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// Number of stack elements removed by `Instruction::Pop`
///
/// An element is one value, so it may be either one or two words.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct PopCount(u8);

impl PopCount {
    pub fn new(elements: usize) -> Result<PopCount, Error> {
        match elements {
            1 | 2 => Ok(PopCount(elements as u8)),
            _ => Err(Error::InvalidOperand(format!(
                "cannot pop {} stack elements at once",
                elements
            ))),
        }
    }

    pub fn elements(self) -> usize {
        self.0 as usize
    }
}

/// Operand of `Instruction::Dup`
///
/// The `size` elements on top of the stack get copied and the copy is inserted underneath the
/// next `delta` elements. The sizes are counted in elements, so the number of words involved only
/// becomes clear once the stack shape is known.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct DupShape {
    size: u8,
    delta: u8,
}

impl DupShape {
    pub fn new(size: usize, delta: usize) -> Result<DupShape, Error> {
        if !(1..=2).contains(&size) || delta > 2 {
            return Err(Error::InvalidOperand(format!(
                "cannot duplicate {} elements under {} elements",
                size, delta
            )));
        }
        Ok(DupShape {
            size: size as u8,
            delta: delta as u8,
        })
    }

    pub fn size(self) -> usize {
        self.size as usize
    }

    pub fn delta(self) -> usize {
        self.delta as usize
    }
}

/// Cases of a multi-way branch
///
/// Keys are strictly increasing. The first target is the default target, the remaining targets
/// line up with the keys.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct SwitchTable {
    keys: Vec<i32>,
    targets: Vec<usize>,
}

impl SwitchTable {
    pub fn new(
        default: usize,
        cases: impl IntoIterator<Item = (i32, usize)>,
    ) -> Result<SwitchTable, Error> {
        let mut keys = vec![];
        let mut targets = vec![default];
        for (key, target) in cases {
            if let Some(last) = keys.last() {
                if *last >= key {
                    return Err(Error::InvalidOperand(format!(
                        "switch keys {} and {} are not in increasing order",
                        last, key
                    )));
                }
            }
            keys.push(key);
            targets.push(target);
        }
        Ok(SwitchTable { keys, targets })
    }

    pub fn default(&self) -> usize {
        self.targets[0]
    }

    pub fn keys(&self) -> &[i32] {
        &self.keys
    }

    /// Key-target pairs, in increasing key order
    pub fn cases(&self) -> impl Iterator<Item = (i32, usize)> + '_ {
        self.keys.iter().copied().zip(self.targets[1..].iter().copied())
    }

    /// Default target followed by the case targets
    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    /// Target for a given key
    pub fn lookup(&self, key: i32) -> usize {
        match self.keys.binary_search(&key) {
            Ok(idx) => self.targets[idx + 1],
            Err(_) => self.default(),
        }
    }

    fn map_targets(&self, f: &mut impl FnMut(usize) -> usize) -> SwitchTable {
        SwitchTable {
            keys: self.keys.clone(),
            targets: self.targets.iter().map(|target| f(*target)).collect(),
        }
    }
}

/// Instruction in the intermediate representation of a method body
///
/// Compared to bytecode, the instruction set is much more regular: there is one variant per
/// category of operation, types are operands, and branch targets are indices into the instruction
/// array rather than relative byte offsets. Several bytecode forms have no counterpart at all:
///
///   - `jsr`/`ret` subroutines are inlined by the decoder
///   - `iinc` is a load, constant, add, and store
///   - `if<cond>` and `ifnull` compare against an explicit constant
///   - `tableswitch` and `lookupswitch` are both `Switch`
///   - `wide`, `ldc`/`ldc_w`, `goto_w` and other encoding variants are picked by the compiler
///
/// Variants with public operands can be built directly, but only `checked` validates them.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Instruction {
    Constant(Constant),
    LocalLoad {
        ty: ValueType,
        index: u16,
    },
    LocalStore {
        ty: ValueType,
        index: u16,
    },
    ArrayLoad(ArrayElement),
    ArrayStore(ArrayElement),
    Pop(PopCount),
    Dup(DupShape),

    /// Swap the top two stack elements (regardless of their word sizes)
    Swap,
    BinaryOp {
        ty: ValueType,
        op: BinaryOperator,
    },
    Neg(ValueType),

    /// Shift a value of type `ty` by an `int` amount
    Shift {
        ty: ValueType,
        op: ShiftOperator,
    },
    Convert {
        from: ValueType,
        to: ConversionTarget,
    },
    Compare {
        ty: ValueType,
        op: ComparisonOperator,
    },
    ConditionalBranch {
        comparison: Comparison,
        target: usize,
    },
    Goto(usize),
    Switch(SwitchTable),
    GetField {
        field: FieldRef,
        is_static: bool,
    },
    PutField {
        field: FieldRef,
        is_static: bool,
    },
    Invoke {
        kind: InvokeKind,
        method: MethodRef,
    },
    InvokeDynamic(DynamicCallSite),

    /// Allocate an uninitialized object of the given class
    New(Name),

    /// Allocate an array with the given element type
    NewArray(FieldType),
    MultiNewArray {
        array: FieldType,
        dimensions: u8,
    },
    ArrayLength,
    CheckCast(FieldType),
    InstanceOf(FieldType),
    Throw,
    MonitorEnter,
    MonitorExit,
    Return(Option<ValueType>),
}

impl Instruction {
    /// Check the operands of the instruction, returning it if they are valid
    pub fn checked(self) -> Result<Instruction, Error> {
        self.check_operands()?;
        Ok(self)
    }

    /// Check that the operands are in range and consistent with each other
    pub fn check_operands(&self) -> Result<(), Error> {
        let invalid = |msg: String| Err(Error::InvalidOperand(msg));
        match self {
            Instruction::Constant(Constant::Class(FieldType::Base(_))) => {
                return invalid(format!("primitive class literal in {}", self))
            }
            Instruction::LocalLoad { ty, index } | Instruction::LocalStore { ty, index } => {
                if *index as usize + ty.words() as usize - 1 > u16::MAX as usize {
                    return invalid(format!("local variable out of range in {}", self));
                }
            }
            Instruction::BinaryOp { ty, op } => {
                let bad_bitwise = op.is_bitwise() && !matches!(ty, ValueType::Int | ValueType::Long);
                if *ty == ValueType::Reference || bad_bitwise {
                    return invalid(format!("operator not defined on type in {}", self));
                }
            }
            Instruction::Neg(ValueType::Reference) => {
                return invalid(format!("cannot negate references in {}", self))
            }
            Instruction::Shift { ty, .. } => {
                if !matches!(ty, ValueType::Int | ValueType::Long) {
                    return invalid(format!("cannot shift non-integral values in {}", self));
                }
            }
            Instruction::Convert { from, to } => {
                let bad = *from == ValueType::Reference
                    || (to.is_narrowing() && *from != ValueType::Int)
                    || (!to.is_narrowing() && *from == to.value_type());
                if bad {
                    return invalid(format!("no such conversion in {}", self));
                }
            }
            Instruction::Compare { ty, op } => {
                let ok = match ty {
                    ValueType::Long => *op == ComparisonOperator::Cmp,
                    ValueType::Float | ValueType::Double => *op != ComparisonOperator::Cmp,
                    _ => false,
                };
                if !ok {
                    return invalid(format!("no such comparison in {}", self));
                }
            }
            Instruction::Invoke { kind, method } => {
                let is_static = *kind == InvokeKind::Static;
                if method.descriptor.parameter_length(!is_static) > 255 {
                    return invalid(format!("too many parameters in {}", self));
                }
                if *kind == InvokeKind::Interface && !method.is_interface {
                    return invalid(format!("interface call to class method in {}", self));
                }
            }
            Instruction::MultiNewArray { array, dimensions } => {
                if *dimensions == 0 || array.dimensions() < *dimensions as usize {
                    return invalid(format!("bad array dimensions in {}", self));
                }
            }
            Instruction::CheckCast(typ) | Instruction::InstanceOf(typ) => {
                if !typ.is_reference() {
                    return invalid(format!("primitive type test in {}", self));
                }
            }
            _ => (),
        }
        Ok(())
    }

    /// Number of stack elements consumed
    pub fn popped_count(&self) -> usize {
        match self {
            Instruction::Constant(_)
            | Instruction::LocalLoad { .. }
            | Instruction::Goto(_)
            | Instruction::New(_)
            | Instruction::Return(None) => 0,

            Instruction::LocalStore { .. }
            | Instruction::Neg(_)
            | Instruction::Convert { .. }
            | Instruction::Switch(_)
            | Instruction::NewArray(_)
            | Instruction::ArrayLength
            | Instruction::CheckCast(_)
            | Instruction::InstanceOf(_)
            | Instruction::Throw
            | Instruction::MonitorEnter
            | Instruction::MonitorExit
            | Instruction::Return(Some(_)) => 1,

            Instruction::ArrayLoad(_)
            | Instruction::Swap
            | Instruction::BinaryOp { .. }
            | Instruction::Shift { .. }
            | Instruction::Compare { .. }
            | Instruction::ConditionalBranch { .. } => 2,

            Instruction::ArrayStore(_) => 3,
            Instruction::Pop(count) => count.elements(),
            Instruction::Dup(shape) => shape.size() + shape.delta(),
            Instruction::GetField { is_static, .. } => usize::from(!*is_static),
            Instruction::PutField { is_static, .. } => 1 + usize::from(!*is_static),
            Instruction::Invoke { kind, method } => {
                method.descriptor.parameters.len() + usize::from(*kind != InvokeKind::Static)
            }
            Instruction::InvokeDynamic(call_site) => call_site.descriptor.parameters.len(),
            Instruction::MultiNewArray { dimensions, .. } => *dimensions as usize,
        }
    }

    /// Number of stack elements produced
    pub fn pushed_count(&self) -> usize {
        match self {
            Instruction::Dup(shape) => 2 * shape.size() + shape.delta(),
            Instruction::Swap => 2,
            _ => usize::from(self.pushed_word_size().is_some()),
        }
    }

    /// Word size of the value pushed onto the stack
    ///
    /// This is `None` when nothing is pushed, and also for `Dup` and `Swap`, which push back
    /// elements whose sizes depend on what was on the stack.
    pub fn pushed_word_size(&self) -> Option<u8> {
        self.pushed_value_type().map(ValueType::words)
    }

    /// Kind of the value pushed onto the stack (see `pushed_word_size`)
    pub fn pushed_value_type(&self) -> Option<ValueType> {
        match self {
            Instruction::Constant(constant) => Some(constant.value_type()),
            Instruction::LocalLoad { ty, .. } => Some(*ty),
            Instruction::ArrayLoad(elem) => Some(elem.value_type()),
            Instruction::BinaryOp { ty, .. } | Instruction::Neg(ty) | Instruction::Shift { ty, .. } => {
                Some(*ty)
            }
            Instruction::Convert { to, .. } => Some(to.value_type()),
            Instruction::Compare { .. } | Instruction::ArrayLength | Instruction::InstanceOf(_) => {
                Some(ValueType::Int)
            }
            Instruction::GetField { field, .. } => Some(ValueType::of(&field.descriptor)),
            Instruction::Invoke { method, .. } => {
                method.descriptor.return_type.as_ref().map(ValueType::of)
            }
            Instruction::InvokeDynamic(call_site) => {
                call_site.descriptor.return_type.as_ref().map(ValueType::of)
            }
            Instruction::New(_)
            | Instruction::NewArray(_)
            | Instruction::MultiNewArray { .. }
            | Instruction::CheckCast(_) => Some(ValueType::Reference),

            Instruction::LocalStore { .. }
            | Instruction::ArrayStore(_)
            | Instruction::Pop(_)
            | Instruction::Dup(_)
            | Instruction::Swap
            | Instruction::ConditionalBranch { .. }
            | Instruction::Goto(_)
            | Instruction::Switch(_)
            | Instruction::PutField { .. }
            | Instruction::Throw
            | Instruction::MonitorEnter
            | Instruction::MonitorExit
            | Instruction::Return(_) => None,
        }
    }

    /// Can control continue on to the next instruction?
    pub fn is_fall_through(&self) -> bool {
        !matches!(
            self,
            Instruction::Goto(_) | Instruction::Switch(_) | Instruction::Throw | Instruction::Return(_)
        )
    }

    /// Indices of the instructions this one may branch to (not including fall-through)
    pub fn branch_targets(&self) -> &[usize] {
        match self {
            Instruction::ConditionalBranch { target, .. } | Instruction::Goto(target) => {
                std::slice::from_ref(target)
            }
            Instruction::Switch(table) => table.targets(),
            _ => &[],
        }
    }

    /// Copy of the instruction with every branch target remapped
    pub fn map_targets(&self, mut f: impl FnMut(usize) -> usize) -> Instruction {
        match self {
            Instruction::ConditionalBranch { comparison, target } => {
                Instruction::ConditionalBranch {
                    comparison: *comparison,
                    target: f(*target),
                }
            }
            Instruction::Goto(target) => Instruction::Goto(f(*target)),
            Instruction::Switch(table) => Instruction::Switch(table.map_targets(&mut f)),
            other => other.clone(),
        }
    }

    /// Is this a potentially excepting instruction (PEI)?
    ///
    /// These are the instructions that may transfer control to an exception handler instead of
    /// completing normally.
    pub fn is_pei(&self) -> bool {
        match self {
            Instruction::Constant(constant) => constant.needs_resolution(),
            Instruction::BinaryOp { ty, op } => {
                matches!(op, BinaryOperator::Div | BinaryOperator::Rem)
                    && matches!(ty, ValueType::Int | ValueType::Long)
            }
            Instruction::ArrayLoad(_)
            | Instruction::ArrayStore(_)
            | Instruction::GetField { .. }
            | Instruction::PutField { .. }
            | Instruction::Invoke { .. }
            | Instruction::InvokeDynamic(_)
            | Instruction::New(_)
            | Instruction::NewArray(_)
            | Instruction::MultiNewArray { .. }
            | Instruction::ArrayLength
            | Instruction::CheckCast(_)
            | Instruction::InstanceOf(_)
            | Instruction::Throw
            | Instruction::MonitorEnter
            | Instruction::MonitorExit => true,
            _ => false,
        }
    }

    /// Local variable read or written, along with how many slots it spans
    pub fn local_access(&self) -> Option<(u16, u8)> {
        match self {
            Instruction::LocalLoad { ty, index } | Instruction::LocalStore { ty, index } => {
                Some((*index, ty.words()))
            }
            _ => None,
        }
    }
}

fn fmt_method(f: &mut fmt::Formatter<'_>, class: &str, name: &str, desc: &MethodDescriptor) -> fmt::Result {
    write!(f, "{}.{}{}", class, name, desc.render())
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Constant(constant) => write!(f, "Constant({})", constant),
            Instruction::LocalLoad { ty, index } => write!(f, "LocalLoad({},{})", ty, index),
            Instruction::LocalStore { ty, index } => write!(f, "LocalStore({},{})", ty, index),
            Instruction::ArrayLoad(elem) => write!(f, "ArrayLoad({})", elem),
            Instruction::ArrayStore(elem) => write!(f, "ArrayStore({})", elem),
            Instruction::Pop(count) => write!(f, "Pop({})", count.elements()),
            Instruction::Dup(shape) => write!(f, "Dup({},{})", shape.size(), shape.delta()),
            Instruction::Swap => write!(f, "Swap"),
            Instruction::BinaryOp { ty, op } => write!(f, "BinaryOp({},{})", ty, op.name()),
            Instruction::Neg(ty) => write!(f, "Neg({})", ty),
            Instruction::Shift { ty, op } => {
                let op = match op {
                    ShiftOperator::Shl => "shl",
                    ShiftOperator::Shr => "shr",
                    ShiftOperator::Ushr => "ushr",
                };
                write!(f, "Shift({},{})", ty, op)
            }
            Instruction::Convert { from, to } => write!(f, "Convert({},{})", from, to.letter()),
            Instruction::Compare { ty, op } => {
                let op = match op {
                    ComparisonOperator::Cmp => "cmp",
                    ComparisonOperator::Cmpl => "cmpl",
                    ComparisonOperator::Cmpg => "cmpg",
                };
                write!(f, "Compare({},{})", ty, op)
            }
            Instruction::ConditionalBranch { comparison, target } => {
                write!(f, "ConditionalBranch({},{})", comparison, target)
            }
            Instruction::Goto(target) => write!(f, "Goto({})", target),
            Instruction::Switch(table) => {
                write!(f, "Switch(default:{}", table.default())?;
                for (key, target) in table.cases() {
                    write!(f, ",{}:{}", key, target)?;
                }
                write!(f, ")")
            }
            Instruction::GetField { field, is_static } => write!(
                f,
                "{}({}.{}:{})",
                if *is_static { "GetStatic" } else { "GetField" },
                field.class,
                field.name,
                field.descriptor
            ),
            Instruction::PutField { field, is_static } => write!(
                f,
                "{}({}.{}:{})",
                if *is_static { "PutStatic" } else { "PutField" },
                field.class,
                field.name,
                field.descriptor
            ),
            Instruction::Invoke { kind, method } => {
                let kind = match kind {
                    InvokeKind::Virtual => "virtual",
                    InvokeKind::Special => "special",
                    InvokeKind::Static => "static",
                    InvokeKind::Interface => "interface",
                };
                write!(f, "Invoke({} ", kind)?;
                fmt_method(f, &method.class, &method.name, &method.descriptor)?;
                write!(f, ")")
            }
            Instruction::InvokeDynamic(call_site) => write!(
                f,
                "InvokeDynamic(#{}:{}{})",
                call_site.bootstrap_method,
                call_site.name,
                call_site.descriptor.render()
            ),
            Instruction::New(class) => write!(f, "New({})", class),
            Instruction::NewArray(elem) => write!(f, "NewArray({})", elem),
            Instruction::MultiNewArray { array, dimensions } => {
                write!(f, "MultiNewArray({},{})", array, dimensions)
            }
            Instruction::ArrayLength => write!(f, "ArrayLength"),
            Instruction::CheckCast(typ) => write!(f, "CheckCast({})", typ),
            Instruction::InstanceOf(typ) => write!(f, "InstanceOf({})", typ),
            Instruction::Throw => write!(f, "Throw"),
            Instruction::MonitorEnter => write!(f, "MonitorEnter"),
            Instruction::MonitorExit => write!(f, "MonitorExit"),
            Instruction::Return(None) => write!(f, "Return"),
            Instruction::Return(Some(ty)) => write!(f, "Return({})", ty),
        }
    }
}

impl Width for ValueType {
    fn width(&self) -> usize {
        self.words() as usize
    }
}
