use crate::jvm::code::opcodes::*;
use crate::jvm::code::{
    ArrayElement, BinaryOperator, BranchCondition, Comparison, ComparisonOperator, Constant,
    Instruction, InvokeKind, ReferenceCondition, ShiftOperator, SwitchTable, ValueType,
    CONVERSIONS,
};
use crate::jvm::{
    BaseType, BytecodeReader, ConstantPoolReader, DynamicCallSite, EncodingErrorKind, Error,
    FieldRef, FieldType, MethodRef, Name, PoolEntry,
};
use std::collections::HashMap;

/// Bytecode instruction with its operands resolved, but not yet translated into `Instruction`s
///
/// Branch targets are still byte offsets at this point.
#[derive(Debug, Clone)]
pub enum RawOp {
    /// Translates one-to-one (targets still need remapping)
    Plain(Instruction),

    Nop,

    /// `pop`, `pop2`, `dup*`, or `swap`: meaning depends on the stack shape
    Stack(u8),

    /// `iinc`
    Increment { index: u16, delta: i16 },

    /// `if<cond>`
    IfZero {
        condition: BranchCondition,
        target: usize,
    },

    /// `ifnull` and `ifnonnull`
    IfNull {
        condition: ReferenceCondition,
        target: usize,
    },

    Jsr(usize),
    Ret(u16),
}

#[derive(Debug, Clone)]
pub struct RawInstruction {
    pub offset: usize,
    pub length: usize,
    pub op: RawOp,
}

impl RawInstruction {
    pub fn next_offset(&self) -> usize {
        self.offset + self.length
    }

    /// Byte offsets of branch targets (not including `jsr` targets or fall-through)
    pub fn targets(&self) -> Vec<usize> {
        match &self.op {
            RawOp::Plain(insn) => insn.branch_targets().to_vec(),
            RawOp::IfZero { target, .. } | RawOp::IfNull { target, .. } => vec![*target],
            _ => vec![],
        }
    }

    /// Can control reach the next instruction? `jsr` only does so if the subroutine returns.
    pub fn falls_through(&self) -> bool {
        match &self.op {
            RawOp::Plain(insn) => insn.is_fall_through(),
            RawOp::Jsr(_) | RawOp::Ret(_) => false,
            _ => true,
        }
    }
}

/// Resolves constant pool indices, remembering what was already looked up
pub struct ConstantCache<'a> {
    pool: &'a dyn ConstantPoolReader,
    entries: HashMap<u16, PoolEntry>,
}

impl<'a> ConstantCache<'a> {
    pub fn new(pool: &'a dyn ConstantPoolReader) -> ConstantCache<'a> {
        ConstantCache {
            pool,
            entries: HashMap::new(),
        }
    }

    fn entry(&mut self, index: u16, offset: usize) -> Result<PoolEntry, Error> {
        if let Some(entry) = self.entries.get(&index) {
            return Ok(entry.clone());
        }
        let entry = self
            .pool
            .entry(index)
            .ok_or_else(|| Error::encoding(offset, EncodingErrorKind::MissingConstant(index)))?;
        self.entries.insert(index, entry.clone());
        Ok(entry)
    }

    fn missing(index: u16, offset: usize) -> Error {
        Error::encoding(offset, EncodingErrorKind::MissingConstant(index))
    }

    /// Constant loaded by `ldc` and friends (`wide` is whether the instruction was `ldc2_w`)
    fn loadable(&mut self, index: u16, wide: bool, offset: usize) -> Result<Constant, Error> {
        match self.entry(index, offset)? {
            PoolEntry::Constant(constant) => {
                let is_wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
                if is_wide != wide || constant == Constant::Null {
                    Err(Error::encoding(
                        offset,
                        EncodingErrorKind::UnloadableConstant(index),
                    ))
                } else {
                    Ok(constant)
                }
            }
            _ => Err(Error::encoding(
                offset,
                EncodingErrorKind::UnloadableConstant(index),
            )),
        }
    }

    pub fn class(&mut self, index: u16, offset: usize) -> Result<FieldType, Error> {
        match self.entry(index, offset)? {
            PoolEntry::Constant(Constant::Class(class)) => Ok(class),
            _ => Err(Self::missing(index, offset)),
        }
    }

    /// Class that must be an object type (not an array)
    fn object_class(&mut self, index: u16, offset: usize) -> Result<Name, Error> {
        match self.class(index, offset)? {
            FieldType::Object(name) => Ok(name),
            _ => Err(Self::missing(index, offset)),
        }
    }

    fn field(&mut self, index: u16, offset: usize) -> Result<FieldRef, Error> {
        match self.entry(index, offset)? {
            PoolEntry::FieldRef(field) => Ok(field),
            _ => Err(Self::missing(index, offset)),
        }
    }

    fn method(&mut self, index: u16, offset: usize) -> Result<MethodRef, Error> {
        match self.entry(index, offset)? {
            PoolEntry::MethodRef(method) => Ok(method),
            _ => Err(Self::missing(index, offset)),
        }
    }

    fn call_site(&mut self, index: u16, offset: usize) -> Result<DynamicCallSite, Error> {
        match self.entry(index, offset)? {
            PoolEntry::InvokeDynamic(call_site) => Ok(call_site),
            _ => Err(Self::missing(index, offset)),
        }
    }
}

const VALUE_TYPES: [ValueType; 5] = [
    ValueType::Int,
    ValueType::Long,
    ValueType::Float,
    ValueType::Double,
    ValueType::Reference,
];

const ARITHMETIC_OPERATORS: [BinaryOperator; 5] = [
    BinaryOperator::Add,
    BinaryOperator::Sub,
    BinaryOperator::Mul,
    BinaryOperator::Div,
    BinaryOperator::Rem,
];

const BITWISE_OPERATORS: [BinaryOperator; 3] =
    [BinaryOperator::And, BinaryOperator::Or, BinaryOperator::Xor];

const SHIFT_OPERATORS: [ShiftOperator; 3] =
    [ShiftOperator::Shl, ShiftOperator::Shr, ShiftOperator::Ushr];

/// Absolute target of a relative branch at `offset`
fn branch_target(code_len: usize, offset: usize, relative: i32) -> Result<usize, Error> {
    let target = offset as isize + relative as isize;
    if target < 0 || target as usize >= code_len {
        return Err(Error::encoding(
            offset,
            EncodingErrorKind::BranchOutOfRange(target),
        ));
    }
    Ok(target as usize)
}

/// Parse the instruction starting at `offset`
pub fn parse_instruction(
    code: &[u8],
    offset: usize,
    constants: &mut ConstantCache,
) -> Result<RawInstruction, Error> {
    let mut reader = BytecodeReader::at(code, offset);
    let opcode = reader.read_u8()?;
    let target16 = |reader: &mut BytecodeReader| -> Result<usize, Error> {
        let relative = reader.read_i16()?;
        branch_target(code.len(), offset, relative as i32)
    };
    let target32 = |reader: &mut BytecodeReader| -> Result<usize, Error> {
        let relative = reader.read_i32()?;
        branch_target(code.len(), offset, relative)
    };
    let plain = |insn: Instruction| RawOp::Plain(insn);

    let op = match opcode {
        NOP => RawOp::Nop,
        ACONST_NULL => plain(Instruction::Constant(Constant::Null)),
        ICONST_M1..=ICONST_5 => plain(Instruction::Constant(Constant::Int(
            opcode as i32 - ICONST_M1 as i32 - 1,
        ))),
        LCONST_0 | LCONST_1 => plain(Instruction::Constant(Constant::Long(
            (opcode - LCONST_0) as i64,
        ))),
        FCONST_0..=FCONST_2 => plain(Instruction::Constant(Constant::Float(
            (opcode - FCONST_0) as f32,
        ))),
        DCONST_0 | DCONST_1 => plain(Instruction::Constant(Constant::Double(
            (opcode - DCONST_0) as f64,
        ))),
        BIPUSH => plain(Instruction::Constant(Constant::Int(reader.read_i8()? as i32))),
        SIPUSH => plain(Instruction::Constant(Constant::Int(reader.read_i16()? as i32))),
        LDC => {
            let index = reader.read_u8()? as u16;
            plain(Instruction::Constant(constants.loadable(index, false, offset)?))
        }
        LDC_W => {
            let index = reader.read_u16()?;
            plain(Instruction::Constant(constants.loadable(index, false, offset)?))
        }
        LDC2_W => {
            let index = reader.read_u16()?;
            plain(Instruction::Constant(constants.loadable(index, true, offset)?))
        }

        ILOAD..=ALOAD => plain(Instruction::LocalLoad {
            ty: VALUE_TYPES[(opcode - ILOAD) as usize],
            index: reader.read_u8()? as u16,
        }),
        ILOAD_0..=ALOAD_3 => {
            let n = opcode - ILOAD_0;
            plain(Instruction::LocalLoad {
                ty: VALUE_TYPES[(n / 4) as usize],
                index: (n % 4) as u16,
            })
        }
        IALOAD..=SALOAD => match ArrayElement::from_opcode_offset(opcode - IALOAD) {
            Some(elem) => plain(Instruction::ArrayLoad(elem)),
            None => return Err(Error::encoding(offset, EncodingErrorKind::UnknownOpcode(opcode))),
        },
        ISTORE..=ASTORE => plain(Instruction::LocalStore {
            ty: VALUE_TYPES[(opcode - ISTORE) as usize],
            index: reader.read_u8()? as u16,
        }),
        ISTORE_0..=ASTORE_3 => {
            let n = opcode - ISTORE_0;
            plain(Instruction::LocalStore {
                ty: VALUE_TYPES[(n / 4) as usize],
                index: (n % 4) as u16,
            })
        }
        IASTORE..=SASTORE => match ArrayElement::from_opcode_offset(opcode - IASTORE) {
            Some(elem) => plain(Instruction::ArrayStore(elem)),
            None => return Err(Error::encoding(offset, EncodingErrorKind::UnknownOpcode(opcode))),
        },

        POP..=SWAP => RawOp::Stack(opcode),

        IADD..=DREM => {
            let n = (opcode - IADD) as usize;
            plain(Instruction::BinaryOp {
                ty: VALUE_TYPES[n % 4],
                op: ARITHMETIC_OPERATORS[n / 4],
            })
        }
        INEG..=DNEG => plain(Instruction::Neg(VALUE_TYPES[(opcode - INEG) as usize])),
        ISHL..=LUSHR => {
            let n = (opcode - ISHL) as usize;
            plain(Instruction::Shift {
                ty: VALUE_TYPES[n % 2],
                op: SHIFT_OPERATORS[n / 2],
            })
        }
        IAND..=LXOR => {
            let n = (opcode - IAND) as usize;
            plain(Instruction::BinaryOp {
                ty: VALUE_TYPES[n % 2],
                op: BITWISE_OPERATORS[n / 2],
            })
        }
        IINC => RawOp::Increment {
            index: reader.read_u8()? as u16,
            delta: reader.read_i8()? as i16,
        },
        I2L..=I2S => {
            let (from, to) = CONVERSIONS[(opcode - I2L) as usize];
            plain(Instruction::Convert { from, to })
        }

        LCMP => plain(Instruction::Compare {
            ty: ValueType::Long,
            op: ComparisonOperator::Cmp,
        }),
        FCMPL | FCMPG | DCMPL | DCMPG => plain(Instruction::Compare {
            ty: if opcode < DCMPL {
                ValueType::Float
            } else {
                ValueType::Double
            },
            op: if opcode == FCMPL || opcode == DCMPL {
                ComparisonOperator::Cmpl
            } else {
                ComparisonOperator::Cmpg
            },
        }),

        IFEQ..=IFLE => match BranchCondition::from_opcode_offset(opcode - IFEQ) {
            Some(condition) => RawOp::IfZero {
                condition,
                target: target16(&mut reader)?,
            },
            None => return Err(Error::encoding(offset, EncodingErrorKind::UnknownOpcode(opcode))),
        },
        IF_ICMPEQ..=IF_ICMPLE => match BranchCondition::from_opcode_offset(opcode - IF_ICMPEQ) {
            Some(condition) => plain(Instruction::ConditionalBranch {
                comparison: Comparison::Int(condition),
                target: target16(&mut reader)?,
            }),
            None => return Err(Error::encoding(offset, EncodingErrorKind::UnknownOpcode(opcode))),
        },
        IF_ACMPEQ | IF_ACMPNE => plain(Instruction::ConditionalBranch {
            comparison: Comparison::Reference(if opcode == IF_ACMPEQ {
                ReferenceCondition::Eq
            } else {
                ReferenceCondition::Ne
            }),
            target: target16(&mut reader)?,
        }),
        IFNULL | IFNONNULL => RawOp::IfNull {
            condition: if opcode == IFNULL {
                ReferenceCondition::Eq
            } else {
                ReferenceCondition::Ne
            },
            target: target16(&mut reader)?,
        },
        GOTO => plain(Instruction::Goto(target16(&mut reader)?)),
        GOTO_W => plain(Instruction::Goto(target32(&mut reader)?)),
        JSR => RawOp::Jsr(target16(&mut reader)?),
        JSR_W => RawOp::Jsr(target32(&mut reader)?),
        RET => RawOp::Ret(reader.read_u8()? as u16),

        TABLESWITCH => {
            reader.align_to_four()?;
            let default = target32(&mut reader)?;
            let low = reader.read_i32()?;
            let high = reader.read_i32()?;
            if high < low {
                return Err(Error::encoding(offset, EncodingErrorKind::MalformedSwitch));
            }
            let mut cases = vec![];
            for key in low as i64..=high as i64 {
                cases.push((key as i32, target32(&mut reader)?));
            }
            let table = SwitchTable::new(default, cases)
                .map_err(|_| Error::encoding(offset, EncodingErrorKind::MalformedSwitch))?;
            plain(Instruction::Switch(table))
        }
        LOOKUPSWITCH => {
            reader.align_to_four()?;
            let default = target32(&mut reader)?;
            let pairs = reader.read_i32()?;
            if pairs < 0 {
                return Err(Error::encoding(offset, EncodingErrorKind::MalformedSwitch));
            }
            let mut cases = vec![];
            for _ in 0..pairs {
                let key = reader.read_i32()?;
                cases.push((key, target32(&mut reader)?));
            }
            let table = SwitchTable::new(default, cases)
                .map_err(|_| Error::encoding(offset, EncodingErrorKind::MalformedSwitch))?;
            plain(Instruction::Switch(table))
        }

        IRETURN..=ARETURN => plain(Instruction::Return(Some(
            VALUE_TYPES[(opcode - IRETURN) as usize],
        ))),
        RETURN => plain(Instruction::Return(None)),

        GETSTATIC | GETFIELD => plain(Instruction::GetField {
            field: constants.field(reader.read_u16()?, offset)?,
            is_static: opcode == GETSTATIC,
        }),
        PUTSTATIC | PUTFIELD => plain(Instruction::PutField {
            field: constants.field(reader.read_u16()?, offset)?,
            is_static: opcode == PUTSTATIC,
        }),
        INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC => plain(Instruction::Invoke {
            kind: match opcode {
                INVOKEVIRTUAL => InvokeKind::Virtual,
                INVOKESPECIAL => InvokeKind::Special,
                _ => InvokeKind::Static,
            },
            method: constants.method(reader.read_u16()?, offset)?,
        }),
        INVOKEINTERFACE => {
            let index = reader.read_u16()?;
            let method = constants.method(index, offset)?;
            if !method.is_interface {
                return Err(ConstantCache::missing(index, offset));
            }
            let _count = reader.read_u8()?;
            let _zero = reader.read_u8()?;
            plain(Instruction::Invoke {
                kind: InvokeKind::Interface,
                method,
            })
        }
        INVOKEDYNAMIC => {
            let call_site = constants.call_site(reader.read_u16()?, offset)?;
            let _zero = reader.read_u16()?;
            plain(Instruction::InvokeDynamic(call_site))
        }

        NEW => plain(Instruction::New(
            constants.object_class(reader.read_u16()?, offset)?,
        )),
        NEWARRAY => {
            let code = reader.read_u8()?;
            match BaseType::from_array_type_code(code) {
                Some(base) => plain(Instruction::NewArray(FieldType::Base(base))),
                None => {
                    return Err(Error::encoding(
                        offset,
                        EncodingErrorKind::InvalidDescriptor(format!("array type code {}", code)),
                    ))
                }
            }
        }
        ANEWARRAY => plain(Instruction::NewArray(
            constants.class(reader.read_u16()?, offset)?,
        )),
        ARRAYLENGTH => plain(Instruction::ArrayLength),
        ATHROW => plain(Instruction::Throw),
        CHECKCAST => plain(Instruction::CheckCast(
            constants.class(reader.read_u16()?, offset)?,
        )),
        INSTANCEOF => plain(Instruction::InstanceOf(
            constants.class(reader.read_u16()?, offset)?,
        )),
        MONITORENTER => plain(Instruction::MonitorEnter),
        MONITOREXIT => plain(Instruction::MonitorExit),
        MULTIANEWARRAY => {
            let array = constants.class(reader.read_u16()?, offset)?;
            let dimensions = reader.read_u8()?;
            if dimensions == 0 || array.dimensions() < dimensions as usize {
                return Err(Error::encoding(
                    offset,
                    EncodingErrorKind::InvalidDescriptor(format!(
                        "{} dimensions of {}",
                        dimensions, array
                    )),
                ));
            }
            plain(Instruction::MultiNewArray { array, dimensions })
        }

        WIDE => {
            let modified = reader.read_u8()?;
            match modified {
                ILOAD..=ALOAD => plain(Instruction::LocalLoad {
                    ty: VALUE_TYPES[(modified - ILOAD) as usize],
                    index: reader.read_u16()?,
                }),
                ISTORE..=ASTORE => plain(Instruction::LocalStore {
                    ty: VALUE_TYPES[(modified - ISTORE) as usize],
                    index: reader.read_u16()?,
                }),
                RET => RawOp::Ret(reader.read_u16()?),
                IINC => RawOp::Increment {
                    index: reader.read_u16()?,
                    delta: reader.read_i16()?,
                },
                _ => {
                    return Err(Error::encoding(
                        offset,
                        EncodingErrorKind::UnknownOpcode(modified),
                    ))
                }
            }
        }

        _ => return Err(Error::encoding(offset, EncodingErrorKind::UnknownOpcode(opcode))),
    };

    if let RawOp::Plain(insn) = &op {
        insn.check_operands().map_err(|err| {
            let reason = match err {
                Error::InvalidOperand(reason) => reason,
                other => other.to_string(),
            };
            Error::encoding(offset, EncodingErrorKind::InvalidOperand(reason))
        })?;
    }

    Ok(RawInstruction {
        offset,
        length: reader.position() - offset,
        op,
    })
}

/// What is known about each byte of the code array
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Slot {
    Unseen,

    /// First byte of the instruction with this index in `Scanner::instructions`
    Start(usize),

    /// Some later byte of an instruction
    Inside,
}

/// Lazily parses instructions as control flow discovers them
///
/// Only reachable bytes are ever looked at, and every instruction is parsed exactly once. Two
/// instructions overlapping (because of a branch into the middle of an instruction) is an error.
pub struct Scanner<'a> {
    code: &'a [u8],
    constants: ConstantCache<'a>,
    slots: Vec<Slot>,
    instructions: Vec<RawInstruction>,
}

impl<'a> Scanner<'a> {
    pub fn new(code: &'a [u8], pool: &'a dyn ConstantPoolReader) -> Scanner<'a> {
        Scanner {
            code,
            constants: ConstantCache::new(pool),
            slots: vec![Slot::Unseen; code.len()],
            instructions: vec![],
        }
    }

    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    pub fn constants(&mut self) -> &mut ConstantCache<'a> {
        &mut self.constants
    }

    /// Parse (or look up) the instruction at a byte offset
    pub fn scan(&mut self, offset: usize) -> Result<&RawInstruction, Error> {
        match self.slots.get(offset).copied() {
            None => Err(Error::encoding(offset, EncodingErrorKind::Truncated)),
            Some(Slot::Start(idx)) => Ok(&self.instructions[idx]),
            Some(Slot::Inside) => Err(Error::encoding(
                offset,
                EncodingErrorKind::BranchIntoInstruction(offset),
            )),
            Some(Slot::Unseen) => {
                let raw = parse_instruction(self.code, offset, &mut self.constants)?;
                for inside in offset + 1..raw.next_offset() {
                    if self.slots[inside] != Slot::Unseen {
                        return Err(Error::encoding(
                            inside,
                            EncodingErrorKind::BranchIntoInstruction(offset),
                        ));
                    }
                    self.slots[inside] = Slot::Inside;
                }
                log::trace!("Scanned {:?} at {}", raw.op, offset);
                let idx = self.instructions.len();
                self.slots[offset] = Slot::Start(idx);
                self.instructions.push(raw);
                Ok(&self.instructions[idx])
            }
        }
    }

    /// Has any `jsr` or `ret` been scanned?
    pub fn saw_subroutines(&self) -> bool {
        self.instructions
            .iter()
            .any(|raw| matches!(raw.op, RawOp::Jsr(_) | RawOp::Ret(_)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::ConversionTarget;
    use crate::jvm::{ConstantPool, ConstantPoolAllocator};

    fn parse(code: &[u8]) -> Result<RawInstruction, Error> {
        parse_with_pool(code, &ConstantPool::new())
    }

    fn parse_with_pool(code: &[u8], pool: &ConstantPool) -> Result<RawInstruction, Error> {
        let mut constants = ConstantCache::new(pool);
        parse_instruction(code, 0, &mut constants)
    }

    #[test]
    fn short_forms() {
        let raw = parse(&[0x2d]).unwrap();
        assert!(matches!(
            raw.op,
            RawOp::Plain(Instruction::LocalLoad {
                ty: ValueType::Reference,
                index: 3
            })
        ));
        let raw = parse(&[0x02]).unwrap();
        assert!(matches!(
            raw.op,
            RawOp::Plain(Instruction::Constant(Constant::Int(-1)))
        ));
        let raw = parse(&[0x90]).unwrap();
        assert!(matches!(
            raw.op,
            RawOp::Plain(Instruction::Convert {
                from: ValueType::Double,
                to: ConversionTarget::Float
            })
        ));
    }

    #[test]
    fn wide_iinc() {
        let raw = parse(&[0xc4, 0x84, 0x01, 0x00, 0xff, 0xfe]).unwrap();
        assert_eq!(raw.length, 6);
        assert!(matches!(
            raw.op,
            RawOp::Increment {
                index: 256,
                delta: -2
            }
        ));
    }

    #[test]
    fn tableswitch_padding() {
        // nop; tableswitch (pad 2) default=+20 low=1 high=2 targets +11 +12
        let mut code = vec![0x00, 0xaa, 0x00, 0x00];
        for word in [20i32, 1, 2, 11, 12] {
            code.extend_from_slice(&word.to_be_bytes());
        }
        code.resize(40, 0);
        let pool = ConstantPool::new();
        let mut constants = ConstantCache::new(&pool);
        let raw = parse_instruction(&code, 1, &mut constants).unwrap();
        assert_eq!(raw.length, 23);
        match raw.op {
            RawOp::Plain(Instruction::Switch(table)) => {
                assert_eq!(table.default(), 21);
                assert_eq!(table.cases().collect::<Vec<_>>(), vec![(1, 12), (2, 13)]);
            }
            other => panic!("expected switch, got {:?}", other),
        }
    }

    #[test]
    fn branch_out_of_range() {
        match parse(&[0xa7, 0x00, 0x10]) {
            Err(Error::InvalidEncoding { offset: 0, kind }) => {
                assert_eq!(kind, EncodingErrorKind::BranchOutOfRange(16))
            }
            other => panic!("expected out of range branch, got {:?}", other),
        }
    }

    #[test]
    fn missing_constant() {
        match parse(&[0x12, 0x05]) {
            Err(Error::InvalidEncoding { kind, .. }) => {
                assert_eq!(kind, EncodingErrorKind::MissingConstant(5))
            }
            other => panic!("expected missing constant, got {:?}", other),
        }
    }

    #[test]
    fn unknown_opcode() {
        match parse(&[0xfe]) {
            Err(Error::InvalidEncoding { kind, .. }) => {
                assert_eq!(kind, EncodingErrorKind::UnknownOpcode(0xfe))
            }
            other => panic!("expected unknown opcode, got {:?}", other),
        }
    }

    #[test]
    fn overlapping_instructions() {
        // sipush 0x00a7 decoded at 0, then a branch lands on the operand byte
        let code = [0x11, 0x00, 0xa7, 0x00, 0x00];
        let pool = ConstantPool::new();
        let mut scanner = Scanner::new(&code, &pool);
        scanner.scan(0).unwrap();
        assert!(matches!(
            scanner.scan(1),
            Err(Error::InvalidEncoding {
                kind: EncodingErrorKind::BranchIntoInstruction(1),
                ..
            })
        ));
    }

    #[test]
    fn primitive_class_operands() {
        let mut pool = ConstantPool::new();
        let int = pool
            .allocate(&PoolEntry::Constant(Constant::Class(FieldType::int())))
            .unwrap();
        assert_eq!(int, 1);

        // `checkcast int` and `ldc int.class` are well formed but meaningless
        for code in [&[0xc0, 0x00, 0x01][..], &[0x12, 0x01][..]] {
            assert!(matches!(
                parse_with_pool(code, &pool),
                Err(Error::InvalidEncoding {
                    offset: 0,
                    kind: EncodingErrorKind::InvalidOperand(_)
                })
            ));
        }
    }
}
