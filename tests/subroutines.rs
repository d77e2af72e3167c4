mod common;

use common::{compile_and_reload, decode_static, init_logging, Value};
use jvmkit::jvm::code::{BinaryOperator, Constant, Instruction, RawHandler};
use jvmkit::jvm::decoder::decode;
use jvmkit::jvm::*;

// static int f(int x) {
//     try { x = x + 1; } finally { x = x * 2; }
//     return x;
// }
//
// as compiled by an old `javac`, with the `finally` block in a subroutine
const FINALLY: [u8; 22] = [
    0x1a, // iload_0
    0x04, // iconst_1
    0x60, // iadd
    0x3b, // istore_0
    0xa8, 0x00, 0x0b, // jsr 15
    0x1a, // iload_0
    0xac, // ireturn
    0x4c, // astore_1
    0xa8, 0x00, 0x05, // jsr 15
    0x2b, // aload_1
    0xbf, // athrow
    0x4d, // astore_2
    0x1a, // iload_0
    0x05, // iconst_2
    0x68, // imul
    0x3b, // istore_0
    0xa9, 0x02, // ret 2
];

fn count(instructions: &[Instruction], wanted: impl Fn(&Instruction) -> bool) -> usize {
    instructions.iter().filter(|insn| wanted(insn)).count()
}

#[test]
fn finally_blocks_are_inlined() {
    init_logging();
    let mut pool = ConstantPool::new();
    let table = [RawHandler {
        start: 0,
        end: 4,
        target: 9,
        catch_type: 0,
    }];
    let decoded = decode(&FINALLY, &table, &pool).unwrap();
    assert!(decoded.has_subroutines);
    let method = decode_static("f", "(I)I", &FINALLY, &table, &pool).unwrap();

    // One copy of the subroutine per `jsr`, each entered with a `null` return address
    let multiplies = count(method.instructions(), |insn| {
        matches!(insn, Instruction::BinaryOp { op: BinaryOperator::Mul, .. })
    });
    assert_eq!(multiplies, 2);
    let nulls = count(method.instructions(), |insn| {
        matches!(insn, Instruction::Constant(Constant::Null))
    });
    assert_eq!(nulls, 2);
    assert_eq!(method.handlers()[0].len(), 1);
    assert_eq!(method.handlers()[0][0].catch_class, None);

    let (output, program) =
        compile_and_reload(&method, &mut pool, &CompilerSettings::default());
    assert_eq!(program.call("f", &[Value::Int(3)]), Some(Value::Int(8)));
    assert_eq!(program.call("f", &[Value::Int(-1)]), Some(Value::Int(0)));

    // The compiled code has no subroutines left
    let recompiled = decode(&output.main.code, &output.main.raw_handlers, &pool).unwrap();
    assert!(!recompiled.has_subroutines);
    assert_eq!(output.main.raw_handlers.len(), 1);
}

// Subroutine calling another subroutine
const NESTED: [u8; 17] = [
    0xa8, 0x00, 0x05, // jsr 5
    0x1a, // iload_0
    0xac, // ireturn
    0x4c, // astore_1
    0xa8, 0x00, 0x05, // jsr 11
    0xa9, 0x01, // ret 1
    0x4d, // astore_2
    0x84, 0x00, 0x05, // iinc 0 5
    0xa9, 0x02, // ret 2
];

#[test]
fn nested_subroutines() {
    init_logging();
    let mut pool = ConstantPool::new();
    let method = decode_static("g", "(I)I", &NESTED, &[], &pool).unwrap();
    let nulls = count(method.instructions(), |insn| {
        matches!(insn, Instruction::Constant(Constant::Null))
    });
    assert_eq!(nulls, 2);

    let (output, program) =
        compile_and_reload(&method, &mut pool, &CompilerSettings::default());
    assert_eq!(program.call("g", &[Value::Int(1)]), Some(Value::Int(6)));
    assert_eq!(output.main.max_locals, 3);
}

#[test]
fn stray_rets_are_rejected() {
    let pool = ConstantPool::new();
    let code = [0xa9, 0x00];
    assert!(matches!(
        decode(&code, &[], &pool),
        Err(Error::InvalidEncoding {
            kind: EncodingErrorKind::RetOutsideSubroutine,
            ..
        })
    ));
}

// static int h(int x) {
//     try { return x; } finally { try { throw null; } catch (Throwable t) {} }
// }
//
// with the only `ret` of the subroutine inside its own handler
const RET_IN_HANDLER: [u8; 11] = [
    0xa8, 0x00, 0x05, // jsr 5
    0x1a, // iload_0
    0xac, // ireturn
    0x4c, // astore_1
    0x01, // aconst_null
    0xbf, // athrow
    0x57, // pop
    0xa9, 0x01, // ret 1
];

#[test]
fn rets_reached_through_handlers() {
    init_logging();
    let mut pool = ConstantPool::new();
    let table = [RawHandler {
        start: 6,
        end: 8,
        target: 8,
        catch_type: 0,
    }];
    let decoded = decode(&RET_IN_HANDLER, &table, &pool).unwrap();
    assert!(decoded.has_subroutines);
    let method = decode_static("h", "(I)I", &RET_IN_HANDLER, &table, &pool).unwrap();
    let throws = count(method.instructions(), |insn| matches!(insn, Instruction::Throw));
    assert_eq!(throws, 1);
    assert!(method.handlers().iter().any(|list| list.len() == 1));

    let (_, program) = compile_and_reload(&method, &mut pool, &CompilerSettings::default());
    assert_eq!(program.call("h", &[Value::Int(7)]), Some(Value::Int(7)));
    assert_eq!(program.call("h", &[Value::Int(-3)]), Some(Value::Int(-3)));
}

#[test]
fn recursive_subroutines_are_rejected() {
    let pool = ConstantPool::new();
    let code = [
        0xa8, 0x00, 0x04, // 0: jsr 4
        0xb1, // 3: return
        0x4b, // 4: astore_0
        0xa8, 0xff, 0xff, // 5: jsr 4
        0xa9, 0x00, // 8: ret 0
    ];
    assert!(matches!(
        decode(&code, &[], &pool),
        Err(Error::InvalidEncoding {
            offset: 5,
            kind: EncodingErrorKind::RecursiveSubroutine
        })
    ));
}

#[test]
fn subroutines_sharing_code_are_rejected() {
    let pool = ConstantPool::new();
    let code = [
        0xa8, 0x00, 0x07, // 0: jsr 7
        0xa8, 0x00, 0x08, // 3: jsr 11
        0xb1, // 6: return
        0x4c, // 7: astore_1
        0xa7, 0x00, 0x04, // 8: goto 12
        0x4c, // 11: astore_1
        0xa9, 0x01, // 12: ret 1
    ];
    assert!(matches!(
        decode(&code, &[], &pool),
        Err(Error::InvalidEncoding {
            offset: 12,
            kind: EncodingErrorKind::InvalidSubroutineEntry
        })
    ));
}
