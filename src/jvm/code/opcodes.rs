//! Bytecode opcodes
//!
//! Only the opcodes that get special treatment have names here. Families of opcodes that differ
//! only by type or condition (`iload`/`lload`/..., `ifeq`/`ifne`/...) are addressed as the first
//! member of the family plus an offset.
//!
//! See [the list of instructions][0].
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-6.html#jvms-6.5

pub const NOP: u8 = 0x00;
pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_M1: u8 = 0x02;
pub const ICONST_5: u8 = 0x08;
pub const LCONST_0: u8 = 0x09;
pub const LCONST_1: u8 = 0x0a;
pub const FCONST_0: u8 = 0x0b;
pub const FCONST_2: u8 = 0x0d;
pub const DCONST_0: u8 = 0x0e;
pub const DCONST_1: u8 = 0x0f;
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;

/// `iload`, `lload`, `fload`, `dload`, `aload`
pub const ILOAD: u8 = 0x15;
pub const ALOAD: u8 = 0x19;

/// `iload_0` through `aload_3`, four per type
pub const ILOAD_0: u8 = 0x1a;
pub const ALOAD_3: u8 = 0x2d;

/// `iaload` through `saload`
pub const IALOAD: u8 = 0x2e;
pub const SALOAD: u8 = 0x35;

/// `istore`, `lstore`, `fstore`, `dstore`, `astore`
pub const ISTORE: u8 = 0x36;
pub const ASTORE: u8 = 0x3a;

/// `istore_0` through `astore_3`, four per type
pub const ISTORE_0: u8 = 0x3b;
pub const ASTORE_3: u8 = 0x4e;

/// `iastore` through `sastore`
pub const IASTORE: u8 = 0x4f;
pub const SASTORE: u8 = 0x56;

pub const POP: u8 = 0x57;
pub const POP2: u8 = 0x58;
pub const DUP: u8 = 0x59;
pub const DUP_X1: u8 = 0x5a;
pub const DUP_X2: u8 = 0x5b;
pub const DUP2: u8 = 0x5c;
pub const DUP2_X1: u8 = 0x5d;
pub const DUP2_X2: u8 = 0x5e;
pub const SWAP: u8 = 0x5f;

/// `iadd` through `drem`: four types per operator
pub const IADD: u8 = 0x60;
pub const DREM: u8 = 0x73;

/// `ineg` through `dneg`
pub const INEG: u8 = 0x74;
pub const DNEG: u8 = 0x77;

/// `ishl` through `lushr`: two types per operator
pub const ISHL: u8 = 0x78;
pub const LUSHR: u8 = 0x7d;

/// `iand` through `lxor`: two types per operator
pub const IAND: u8 = 0x7e;
pub const LXOR: u8 = 0x83;

pub const IINC: u8 = 0x84;

/// `i2l` through `i2s`
pub const I2L: u8 = 0x85;
pub const I2S: u8 = 0x93;

pub const LCMP: u8 = 0x94;
pub const FCMPL: u8 = 0x95;
pub const FCMPG: u8 = 0x96;
pub const DCMPL: u8 = 0x97;
pub const DCMPG: u8 = 0x98;

/// `ifeq` through `ifle`
pub const IFEQ: u8 = 0x99;
pub const IFLE: u8 = 0x9e;

/// `if_icmpeq` through `if_icmple`
pub const IF_ICMPEQ: u8 = 0x9f;
pub const IF_ICMPLE: u8 = 0xa4;

pub const IF_ACMPEQ: u8 = 0xa5;
pub const IF_ACMPNE: u8 = 0xa6;
pub const GOTO: u8 = 0xa7;
pub const JSR: u8 = 0xa8;
pub const RET: u8 = 0xa9;
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;

/// `ireturn` through `areturn`
pub const IRETURN: u8 = 0xac;
pub const ARETURN: u8 = 0xb0;
pub const RETURN: u8 = 0xb1;

pub const GETSTATIC: u8 = 0xb2;
pub const PUTSTATIC: u8 = 0xb3;
pub const GETFIELD: u8 = 0xb4;
pub const PUTFIELD: u8 = 0xb5;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
pub const INVOKEINTERFACE: u8 = 0xb9;
pub const INVOKEDYNAMIC: u8 = 0xba;
pub const NEW: u8 = 0xbb;
pub const NEWARRAY: u8 = 0xbc;
pub const ANEWARRAY: u8 = 0xbd;
pub const ARRAYLENGTH: u8 = 0xbe;
pub const ATHROW: u8 = 0xbf;
pub const CHECKCAST: u8 = 0xc0;
pub const INSTANCEOF: u8 = 0xc1;
pub const MONITORENTER: u8 = 0xc2;
pub const MONITOREXIT: u8 = 0xc3;
pub const WIDE: u8 = 0xc4;
pub const MULTIANEWARRAY: u8 = 0xc5;
pub const IFNULL: u8 = 0xc6;
pub const IFNONNULL: u8 = 0xc7;
pub const GOTO_W: u8 = 0xc8;
pub const JSR_W: u8 = 0xc9;
