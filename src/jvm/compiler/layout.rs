//! Laying instructions out as bytecode
//!
//! Layout is a single pass over the instructions in order. Backward branch offsets are known by
//! the time the branch is written, so the narrowest encoding that fits is picked on the spot.
//! Forward branch offsets get patched in once every offset is known. Whether a forward branch
//! gets a 16-bit or a 32-bit offset is decided up front by the caller (see `jump_encoding`): a
//! layout where some 16-bit patch doesn't fit reports which branches overflowed and the caller
//! tries again with those branches widened.

use super::peephole::Step;
use crate::jvm::code::opcodes::*;
use crate::jvm::code::{
    BinaryOperator, Comparison, ComparisonOperator, Constant, DupShape, Instruction, InvokeKind,
    MethodData, PopCount, ReferenceCondition, ShiftOperator, StackShape, StackShapes, SwitchTable,
    ValueType, CONVERSIONS,
};
use crate::jvm::{ConstantPoolAllocator, Error, FieldType, PoolEntry, Serialize};
use byteorder::{BigEndian, ByteOrder};
use std::collections::HashSet;

/// Everything about a method body that stays the same from one layout attempt to the next
pub struct LayoutInput<'m> {
    /// Used in error messages
    pub method_name: &'m str,
    pub instructions: &'m [Instruction],
    pub shapes: &'m StackShapes,
    pub steps: &'m [Step],

    /// Constant pool index used by each instruction, if it uses one
    pub operands: &'m [Option<u16>],
}

/// Forward branch laid out with a 16-bit offset
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NarrowJump {
    /// Index of the branch instruction
    pub branch: usize,

    /// Byte offset of the branch instruction
    pub from: usize,

    /// Byte offset of the branch target
    pub to: usize,
    pub is_goto: bool,
}

/// Outcome of one layout attempt
#[derive(Debug)]
pub struct Layout {
    pub code: Vec<u8>,

    /// Byte offset of every instruction, followed by the length of the code
    ///
    /// Instructions that encode to nothing get the offset of whatever comes next.
    pub offsets: Vec<usize>,

    /// Maximum stack height in words, including what's needed to emulate some swaps
    pub max_stack: usize,

    /// Every forward branch that got a 16-bit offset
    pub narrow_jumps: Vec<NarrowJump>,

    /// Indices of branches whose 16-bit offset turned out too small
    pub overflowed: Vec<usize>,
}

#[derive(Copy, Clone, Debug)]
enum PatchWidth {
    Short,
    Int,
}

/// Placeholder for a forward branch offset
#[derive(Debug)]
struct Patch {
    /// Where the placeholder is in the code
    at: usize,

    /// Byte offset the relative jump is measured from
    from: usize,

    /// Index of the target instruction
    target: usize,

    /// Index of the branch instruction
    branch: usize,
    width: PatchWidth,
    is_goto: bool,
}

/// Does the constant get encoded without needing the constant pool?
pub fn is_inline_constant(constant: &Constant) -> bool {
    match constant {
        Constant::Null => true,
        Constant::Int(value) => i16::try_from(*value).is_ok(),
        Constant::Long(value) => *value == 0 || *value == 1,
        Constant::Float(value) => {
            let bits = value.to_bits();
            bits == 0f32.to_bits() || bits == 1f32.to_bits() || bits == 2f32.to_bits()
        }
        Constant::Double(value) => {
            let bits = value.to_bits();
            bits == 0f64.to_bits() || bits == 1f64.to_bits()
        }
        _ => false,
    }
}

/// Allocate the constant pool entry each instruction refers to
pub fn allocate_operands(
    method: &MethodData,
    pool: &mut impl ConstantPoolAllocator,
) -> Result<Vec<Option<u16>>, Error> {
    let class = |typ: &FieldType| PoolEntry::Constant(Constant::Class(typ.clone()));
    method
        .instructions()
        .iter()
        .map(|insn| {
            let entry = match insn {
                Instruction::Constant(constant) if !is_inline_constant(constant) => {
                    PoolEntry::Constant(constant.clone())
                }
                Instruction::GetField { field, .. } | Instruction::PutField { field, .. } => {
                    PoolEntry::FieldRef(field.clone())
                }
                Instruction::Invoke { method, .. } => PoolEntry::MethodRef(method.clone()),
                Instruction::InvokeDynamic(call_site) => {
                    PoolEntry::InvokeDynamic(call_site.clone())
                }
                Instruction::New(name) => class(&FieldType::Object(name.clone())),
                Instruction::NewArray(element) if element.is_reference() => class(element),
                Instruction::MultiNewArray { array, .. } => class(array),
                Instruction::CheckCast(typ) | Instruction::InstanceOf(typ) => class(typ),
                _ => return Ok(None),
            };
            pool.allocate(&entry).map(Some)
        })
        .collect()
}

/// Lay out the instructions
///
/// Forward branches in `wide` get 32-bit offsets (and so do all forward branches if `far` is set).
pub fn layout(input: &LayoutInput, wide: &HashSet<usize>, far: bool) -> Result<Layout, Error> {
    let mut writer = Writer {
        input,
        wide,
        far,
        code: vec![],
        offsets: Vec::with_capacity(input.instructions.len() + 1),
        patches: vec![],
        max_stack: input.shapes.max_words(),
    };
    for index in 0..input.instructions.len() {
        writer.offsets.push(writer.code.len());
        writer.step(index)?;
    }
    writer.offsets.push(writer.code.len());
    writer.finish()
}

fn jump_fits_i16(distance: isize) -> bool {
    i16::try_from(distance).is_ok()
}

struct Writer<'a> {
    input: &'a LayoutInput<'a>,
    wide: &'a HashSet<usize>,
    far: bool,
    code: Vec<u8>,
    offsets: Vec<usize>,
    patches: Vec<Patch>,
    max_stack: usize,
}

impl<'a> Writer<'a> {
    fn op(&mut self, opcode: u8) {
        self.code.push(opcode);
    }

    fn pool_index(&self, index: usize) -> Result<u16, Error> {
        self.input.operands[index].ok_or_else(|| {
            Error::InvalidOperand(format!(
                "instruction {} of `{}` has no constant pool entry",
                index, self.input.method_name
            ))
        })
    }

    fn overflow(&self) -> Error {
        Error::PatchOverflow {
            method: self.input.method_name.to_string(),
        }
    }

    /// Stack before the instruction, or a stack of one-word values if it is unreachable
    fn shape_before(&self, index: usize, elements: usize) -> StackShape {
        match self.input.shapes.before(index) {
            Some(shape) => shape.clone(),
            None => StackShape::from_words(vec![1; elements]),
        }
    }

    fn step(&mut self, index: usize) -> Result<(), Error> {
        let start = self.code.len();
        match self.input.steps[index] {
            Step::Skip => Ok(()),
            Step::Increment { local, delta } => self.increment(local, delta),
            Step::Branch {
                comparison,
                against_zero,
                target,
            } => self.conditional(index, start, comparison, against_zero, target),
            Step::Emit => self.instruction(index, start),
        }
    }

    fn increment(&mut self, local: u16, delta: i16) -> Result<(), Error> {
        match (u8::try_from(local), i8::try_from(delta)) {
            (Ok(local), Ok(delta)) => {
                self.op(IINC);
                local.serialize(&mut self.code)?;
                delta.serialize(&mut self.code)?;
            }
            _ => {
                self.op(WIDE);
                self.op(IINC);
                local.serialize(&mut self.code)?;
                delta.serialize(&mut self.code)?;
            }
        }
        Ok(())
    }

    /// Write a branch offset measured from `from`, or a placeholder if the target is ahead
    fn jump_offset(
        &mut self,
        index: usize,
        from: usize,
        target: usize,
        width: PatchWidth,
        is_goto: bool,
    ) -> Result<(), Error> {
        if target <= index {
            let distance = self.offsets[target] as isize - from as isize;
            match width {
                PatchWidth::Short => i16::try_from(distance)
                    .map_err(|_| self.overflow())?
                    .serialize(&mut self.code)?,
                PatchWidth::Int => i32::try_from(distance)
                    .map_err(|_| self.overflow())?
                    .serialize(&mut self.code)?,
            }
        } else {
            self.patches.push(Patch {
                at: self.code.len(),
                from,
                target,
                branch: index,
                width,
                is_goto,
            });
            match width {
                PatchWidth::Short => 0i16.serialize(&mut self.code)?,
                PatchWidth::Int => 0i32.serialize(&mut self.code)?,
            }
        }
        Ok(())
    }

    /// Should the branch at `index` to `target` use a 16-bit offset?
    fn is_narrow(&self, index: usize, from: usize, target: usize) -> bool {
        if target <= index {
            jump_fits_i16(self.offsets[target] as isize - from as isize)
        } else {
            !self.far && !self.wide.contains(&index)
        }
    }

    fn goto(&mut self, index: usize, start: usize, target: usize) -> Result<(), Error> {
        if self.is_narrow(index, start, target) {
            self.op(GOTO);
            self.jump_offset(index, start, target, PatchWidth::Short, true)
        } else {
            self.op(GOTO_W);
            self.jump_offset(index, start, target, PatchWidth::Int, true)
        }
    }

    /// Conditional branch, or if it can't reach, the inverted branch over a `goto_w`
    fn conditional(
        &mut self,
        index: usize,
        start: usize,
        comparison: Comparison,
        against_zero: bool,
        target: usize,
    ) -> Result<(), Error> {
        if self.is_narrow(index, start, target) {
            self.op(branch_opcode(comparison, against_zero));
            self.jump_offset(index, start, target, PatchWidth::Short, false)
        } else {
            self.op(branch_opcode(!comparison, against_zero));
            8i16.serialize(&mut self.code)?;
            let goto_start = self.code.len();
            self.op(GOTO_W);
            self.jump_offset(index, goto_start, target, PatchWidth::Int, false)
        }
    }

    fn switch(&mut self, index: usize, start: usize, table: &SwitchTable) -> Result<(), Error> {
        let keys = table.keys();
        let range = match (keys.first(), keys.last()) {
            (Some(low), Some(high)) => Some((*low, *high)),
            _ => None,
        };

        // Same cost model as `javac`
        let use_table = match range {
            Some((low, high)) => {
                let table_space = 4 + (high as i64 - low as i64 + 1);
                let table_time = 3;
                let lookup_space = 3 + 2 * keys.len() as i64;
                let lookup_time = keys.len() as i64;
                table_space + 3 * table_time <= lookup_space + 3 * lookup_time
            }
            None => false,
        };

        self.op(if use_table { TABLESWITCH } else { LOOKUPSWITCH });
        while self.code.len() % 4 != 0 {
            self.op(0);
        }
        self.jump_offset(index, start, table.default(), PatchWidth::Int, false)?;
        match range {
            Some((low, high)) if use_table => {
                low.serialize(&mut self.code)?;
                high.serialize(&mut self.code)?;
                for key in low..=high {
                    self.jump_offset(index, start, table.lookup(key), PatchWidth::Int, false)?;
                }
            }
            _ => {
                (keys.len() as i32).serialize(&mut self.code)?;
                for (key, target) in table.cases() {
                    key.serialize(&mut self.code)?;
                    self.jump_offset(index, start, target, PatchWidth::Int, false)?;
                }
            }
        }
        Ok(())
    }

    fn constant(&mut self, index: usize, constant: &Constant) -> Result<(), Error> {
        match constant {
            Constant::Null => self.op(ACONST_NULL),
            Constant::Int(value @ -1..=5) => self.op((ICONST_M1 as i32 + 1 + value) as u8),
            Constant::Int(value) if i8::try_from(*value).is_ok() => {
                self.op(BIPUSH);
                (*value as i8).serialize(&mut self.code)?;
            }
            Constant::Int(value) if i16::try_from(*value).is_ok() => {
                self.op(SIPUSH);
                (*value as i16).serialize(&mut self.code)?;
            }
            Constant::Long(value @ 0..=1) => self.op(LCONST_0 + *value as u8),
            Constant::Float(value) if is_inline_constant(constant) => {
                self.op(FCONST_0 + *value as u8)
            }
            Constant::Double(value) if is_inline_constant(constant) => {
                self.op(DCONST_0 + *value as u8)
            }
            Constant::Long(_) | Constant::Double(_) => {
                self.op(LDC2_W);
                self.pool_index(index)?.serialize(&mut self.code)?;
            }
            _ => {
                let pool_index = self.pool_index(index)?;
                match u8::try_from(pool_index) {
                    Ok(narrow) => {
                        self.op(LDC);
                        narrow.serialize(&mut self.code)?;
                    }
                    Err(_) => {
                        self.op(LDC_W);
                        pool_index.serialize(&mut self.code)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// `iload`/`istore` and friends
    fn local(&mut self, long_form: u8, short_form: u8, ty: ValueType, local: u16) -> Result<(), Error> {
        let type_offset = ty.opcode_offset();
        if local <= 3 {
            self.op(short_form + 4 * type_offset + local as u8);
        } else if let Ok(narrow) = u8::try_from(local) {
            self.op(long_form + type_offset);
            narrow.serialize(&mut self.code)?;
        } else {
            self.op(WIDE);
            self.op(long_form + type_offset);
            local.serialize(&mut self.code)?;
        }
        Ok(())
    }

    fn pop(&mut self, index: usize, count: PopCount) {
        let shape = self.shape_before(index, count.elements());
        let mut element = 0;
        while element < count.elements() {
            let words = shape.from_top(element).unwrap_or(1);
            let next_words = shape.from_top(element + 1).unwrap_or(1);
            if words == 2 {
                self.op(POP2);
                element += 1;
            } else if element + 1 < count.elements() && next_words == 1 {
                self.op(POP2);
                element += 2;
            } else {
                self.op(POP);
                element += 1;
            }
        }
    }

    /// Words taken by `count` elements, starting `from` elements below the top
    fn words_of(shape: &StackShape, from: usize, count: usize) -> usize {
        (from..from + count)
            .map(|n| shape.from_top(n).unwrap_or(1) as usize)
            .sum()
    }

    fn dup(&mut self, index: usize, dup: DupShape) -> Result<(), Error> {
        let shape = self.shape_before(index, dup.size() + dup.delta());
        let size_words = Self::words_of(&shape, 0, dup.size());
        let delta_words = Self::words_of(&shape, dup.size(), dup.delta());
        if !(1..=2).contains(&size_words) || delta_words > 2 {
            return Err(Error::stack_shape(
                index,
                format!(
                    "cannot duplicate {} words under {} words",
                    size_words, delta_words
                ),
            ));
        }
        self.op(DUP + 3 * (size_words as u8 - 1) + delta_words as u8);
        Ok(())
    }

    /// `swap` only works on one-word values, otherwise it is a `dup_x` followed by a pop
    fn swap(&mut self, index: usize) {
        let shape = self.shape_before(index, 2);
        let top = shape.from_top(0).unwrap_or(1);
        let under = shape.from_top(1).unwrap_or(1);
        if top == 1 && under == 1 {
            self.op(SWAP);
        } else {
            self.op(DUP + 3 * (top - 1) + under);
            self.op(if top == 1 { POP } else { POP2 });
            self.max_stack = self.max_stack.max(shape.words() + top as usize);
        }
    }

    fn instruction(&mut self, index: usize, start: usize) -> Result<(), Error> {
        let input = self.input;
        match &input.instructions[index] {
            Instruction::Constant(constant) => self.constant(index, constant)?,
            Instruction::LocalLoad { ty, index: local } => self.local(ILOAD, ILOAD_0, *ty, *local)?,
            Instruction::LocalStore { ty, index: local } => {
                self.local(ISTORE, ISTORE_0, *ty, *local)?
            }
            Instruction::ArrayLoad(element) => self.op(IALOAD + element.opcode_offset()),
            Instruction::ArrayStore(element) => self.op(IASTORE + element.opcode_offset()),
            Instruction::Pop(count) => self.pop(index, *count),
            Instruction::Dup(shape) => self.dup(index, *shape)?,
            Instruction::Swap => self.swap(index),
            Instruction::BinaryOp { ty, op } => {
                let opcode = match op {
                    BinaryOperator::Add => IADD + ty.opcode_offset(),
                    BinaryOperator::Sub => IADD + 4 + ty.opcode_offset(),
                    BinaryOperator::Mul => IADD + 8 + ty.opcode_offset(),
                    BinaryOperator::Div => IADD + 12 + ty.opcode_offset(),
                    BinaryOperator::Rem => IADD + 16 + ty.opcode_offset(),
                    BinaryOperator::And => IAND + ty.opcode_offset(),
                    BinaryOperator::Or => IAND + 2 + ty.opcode_offset(),
                    BinaryOperator::Xor => IAND + 4 + ty.opcode_offset(),
                };
                self.op(opcode);
            }
            Instruction::Neg(ty) => self.op(INEG + ty.opcode_offset()),
            Instruction::Shift { ty, op } => {
                let op_offset = match op {
                    ShiftOperator::Shl => 0,
                    ShiftOperator::Shr => 2,
                    ShiftOperator::Ushr => 4,
                };
                self.op(ISHL + op_offset + ty.opcode_offset());
            }
            Instruction::Convert { from, to } => {
                let position = CONVERSIONS
                    .iter()
                    .position(|conversion| *conversion == (*from, *to))
                    .ok_or_else(|| {
                        Error::InvalidOperand(format!("no conversion from {} to {:?}", from, to))
                    })?;
                self.op(I2L + position as u8);
            }
            Instruction::Compare { ty, op } => {
                let opcode = match (ty, op) {
                    (ValueType::Long, ComparisonOperator::Cmp) => LCMP,
                    (ValueType::Float, ComparisonOperator::Cmpl) => FCMPL,
                    (ValueType::Float, ComparisonOperator::Cmpg) => FCMPG,
                    (ValueType::Double, ComparisonOperator::Cmpl) => DCMPL,
                    (ValueType::Double, ComparisonOperator::Cmpg) => DCMPG,
                    _ => {
                        return Err(Error::InvalidOperand(format!(
                            "no {:?} comparison for {}",
                            op, ty
                        )))
                    }
                };
                self.op(opcode);
            }
            Instruction::ConditionalBranch { comparison, target } => {
                self.conditional(index, start, *comparison, false, *target)?
            }
            Instruction::Goto(target) => self.goto(index, start, *target)?,
            Instruction::Switch(table) => self.switch(index, start, table)?,
            Instruction::GetField { is_static, .. } => {
                self.op(if *is_static { GETSTATIC } else { GETFIELD });
                self.pool_index(index)?.serialize(&mut self.code)?;
            }
            Instruction::PutField { is_static, .. } => {
                self.op(if *is_static { PUTSTATIC } else { PUTFIELD });
                self.pool_index(index)?.serialize(&mut self.code)?;
            }
            Instruction::Invoke { kind, method } => {
                let opcode = match kind {
                    InvokeKind::Virtual => INVOKEVIRTUAL,
                    InvokeKind::Special => INVOKESPECIAL,
                    InvokeKind::Static => INVOKESTATIC,
                    InvokeKind::Interface => INVOKEINTERFACE,
                };
                self.op(opcode);
                self.pool_index(index)?.serialize(&mut self.code)?;
                if *kind == InvokeKind::Interface {
                    (method.descriptor.parameter_length(true) as u8).serialize(&mut self.code)?;
                    self.op(0);
                }
            }
            Instruction::InvokeDynamic(_) => {
                self.op(INVOKEDYNAMIC);
                self.pool_index(index)?.serialize(&mut self.code)?;
                0u16.serialize(&mut self.code)?;
            }
            Instruction::New(_) => {
                self.op(NEW);
                self.pool_index(index)?.serialize(&mut self.code)?;
            }
            Instruction::NewArray(FieldType::Base(base)) => {
                self.op(NEWARRAY);
                self.op(base.array_type_code());
            }
            Instruction::NewArray(_) => {
                self.op(ANEWARRAY);
                self.pool_index(index)?.serialize(&mut self.code)?;
            }
            Instruction::MultiNewArray { dimensions, .. } => {
                self.op(MULTIANEWARRAY);
                self.pool_index(index)?.serialize(&mut self.code)?;
                dimensions.serialize(&mut self.code)?;
            }
            Instruction::ArrayLength => self.op(ARRAYLENGTH),
            Instruction::CheckCast(_) => {
                self.op(CHECKCAST);
                self.pool_index(index)?.serialize(&mut self.code)?;
            }
            Instruction::InstanceOf(_) => {
                self.op(INSTANCEOF);
                self.pool_index(index)?.serialize(&mut self.code)?;
            }
            Instruction::Throw => self.op(ATHROW),
            Instruction::MonitorEnter => self.op(MONITORENTER),
            Instruction::MonitorExit => self.op(MONITOREXIT),
            Instruction::Return(None) => self.op(RETURN),
            Instruction::Return(Some(ty)) => self.op(IRETURN + ty.opcode_offset()),
        }
        Ok(())
    }

    /// Fill in forward branch offsets
    fn finish(mut self) -> Result<Layout, Error> {
        let mut narrow_jumps = vec![];
        let mut overflowed = vec![];
        for patch in std::mem::take(&mut self.patches) {
            let to = self.offsets[patch.target];
            let distance = to as isize - patch.from as isize;
            match patch.width {
                PatchWidth::Short => {
                    narrow_jumps.push(NarrowJump {
                        branch: patch.branch,
                        from: patch.from,
                        to,
                        is_goto: patch.is_goto,
                    });
                    match i16::try_from(distance) {
                        Ok(distance) => {
                            BigEndian::write_i16(&mut self.code[patch.at..patch.at + 2], distance)
                        }
                        Err(_) => overflowed.push(patch.branch),
                    }
                }
                PatchWidth::Int => {
                    let distance = i32::try_from(distance).map_err(|_| self.overflow())?;
                    BigEndian::write_i32(&mut self.code[patch.at..patch.at + 4], distance);
                }
            }
        }
        Ok(Layout {
            code: self.code,
            offsets: self.offsets,
            max_stack: self.max_stack,
            narrow_jumps,
            overflowed,
        })
    }
}

/// Opcode of a conditional branch
fn branch_opcode(comparison: Comparison, against_zero: bool) -> u8 {
    match (comparison, against_zero) {
        (Comparison::Int(condition), false) => IF_ICMPEQ + condition.opcode_offset(),
        (Comparison::Int(condition), true) => IFEQ + condition.opcode_offset(),
        (Comparison::Reference(ReferenceCondition::Eq), false) => IF_ACMPEQ,
        (Comparison::Reference(ReferenceCondition::Ne), false) => IF_ACMPNE,
        (Comparison::Reference(ReferenceCondition::Eq), true) => IFNULL,
        (Comparison::Reference(ReferenceCondition::Ne), true) => IFNONNULL,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{compute_basic_blocks, simulate, BranchCondition, HandlerList};
    use crate::jvm::compiler::peephole;

    fn lay_out(insns: &[Instruction], operands: &[Option<u16>], far: bool) -> Layout {
        let handlers = vec![HandlerList::empty(); insns.len()];
        let shapes = simulate(insns, &handlers).unwrap();
        let steps = peephole::plan(insns, &compute_basic_blocks(insns, &handlers));
        let input = LayoutInput {
            method_name: "test",
            instructions: insns,
            shapes: &shapes,
            steps: &steps,
            operands,
        };
        layout(&input, &HashSet::new(), far).unwrap()
    }

    fn int(value: i32) -> Instruction {
        Instruction::Constant(Constant::Int(value))
    }

    #[test]
    fn constants_pick_shortest_form() {
        let insns = vec![
            int(-1),
            int(100),
            int(-300),
            Instruction::Constant(Constant::Long(1)),
            Instruction::Constant(Constant::Float(2.0)),
            Instruction::Constant(Constant::Double(1.0)),
            Instruction::Constant(Constant::Int(1 << 20)),
            Instruction::Constant(Constant::Float(-0.0)),
            Instruction::Return(None),
        ];
        let operands = vec![None, None, None, None, None, None, Some(7), Some(300), None];
        let layout = lay_out(&insns, &operands, false);
        assert_eq!(
            layout.code,
            vec![
                0x02, 0x10, 100, 0x11, 0xfe, 0xd4, 0x0a, 0x0d, 0x0f, 0x12, 7, 0x13, 0x01, 0x2c,
                0xb1
            ]
        );
        assert!(!is_inline_constant(&Constant::Float(-0.0)));
    }

    #[test]
    fn locals_and_wide_forms() {
        let insns = vec![
            Instruction::LocalLoad {
                ty: ValueType::Long,
                index: 2,
            },
            Instruction::LocalStore {
                ty: ValueType::Long,
                index: 200,
            },
            Instruction::LocalLoad {
                ty: ValueType::Reference,
                index: 300,
            },
            Instruction::Return(Some(ValueType::Reference)),
        ];
        let layout = lay_out(&insns, &[None; 4], false);
        assert_eq!(
            layout.code,
            vec![0x20, 0x37, 200, 0xc4, 0x19, 0x01, 0x2c, 0xb0]
        );
        assert_eq!(layout.offsets, vec![0, 1, 3, 7, 8]);
    }

    #[test]
    fn stack_manipulation_follows_shapes() {
        let insns = vec![
            Instruction::Constant(Constant::Long(0)),
            int(0),
            Instruction::Swap,
            Instruction::Dup(DupShape::new(1, 0).unwrap()),
            Instruction::Pop(PopCount::new(2).unwrap()),
            Instruction::Pop(PopCount::new(1).unwrap()),
            Instruction::Return(None),
        ];
        let layout = lay_out(&insns, &[None; 7], false);
        assert_eq!(
            layout.code,
            vec![0x09, 0x03, 0x5b, 0x57, 0x5c, 0x58, 0x58, 0x57, 0xb1]
        );
        assert_eq!(layout.max_stack, 5);
    }

    #[test]
    fn forward_and_backward_branches() {
        let insns = vec![
            Instruction::LocalLoad {
                ty: ValueType::Int,
                index: 0,
            },
            int(0),
            Instruction::ConditionalBranch {
                comparison: Comparison::Int(BranchCondition::Eq),
                target: 6,
            },
            Instruction::Constant(Constant::Null),
            Instruction::Pop(PopCount::new(1).unwrap()),
            Instruction::Goto(0),
            Instruction::Return(None),
        ];
        let narrow = lay_out(&insns, &[None; 7], false);
        assert_eq!(
            narrow.code,
            vec![0x1a, 0x99, 0x00, 0x08, 0x01, 0x57, 0xa7, 0xff, 0xfa, 0xb1]
        );
        assert_eq!(
            narrow.narrow_jumps,
            vec![NarrowJump {
                branch: 2,
                from: 1,
                to: 9,
                is_goto: false
            }]
        );
        assert!(narrow.overflowed.is_empty());

        let far = lay_out(&insns, &[None; 7], true);
        assert_eq!(
            far.code,
            vec![
                0x1a, 0x9a, 0x00, 0x08, 0xc8, 0x00, 0x00, 0x00, 0x0a, 0x01, 0x57, 0xa7, 0xff,
                0xf5, 0xb1
            ]
        );
        assert!(far.narrow_jumps.is_empty());
    }

    #[test]
    fn switch_encodings() {
        let dense = SwitchTable::new(4, vec![(0, 4), (1, 4), (2, 4)]).unwrap();
        let sparse = SwitchTable::new(4, vec![(0, 4), (1000, 4)]).unwrap();
        for (table, opcode) in vec![(dense, TABLESWITCH), (sparse, LOOKUPSWITCH)] {
            let insns = vec![
                Instruction::Constant(Constant::Null),
                Instruction::Pop(PopCount::new(1).unwrap()),
                int(1),
                Instruction::Switch(table),
                Instruction::Return(None),
            ];
            let layout = lay_out(&insns, &[None; 5], false);
            assert_eq!(layout.code[3], opcode);
            assert_eq!(layout.offsets[4] % 4, 0);
            assert_eq!(&layout.code[4..8], &[0, 0, 0, layout.offsets[4] as u8 - 3]);
        }
    }
}
