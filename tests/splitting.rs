mod common;

use common::{
    compile_and_reload, init_logging, static_method, Program, Value, ARITHMETIC_EXCEPTION,
};
use jvmkit::jvm::code::{
    BinaryOperator, BranchCondition, Comparison, Constant, ExceptionHandler, HandlerList,
    Instruction, MethodData, PopCount, ValueType,
};
use jvmkit::jvm::compiler::compile;
use jvmkit::jvm::*;
use std::collections::HashSet;

fn settings(ceiling: usize) -> CompilerSettings {
    CompilerSettings {
        min_helper_instructions: 4,
        ..CompilerSettings::with_max_code_size(ceiling)
    }
}

/// `x = x * 3 + 7` on a local of the given type
fn statement(ty: ValueType, local: u16) -> Vec<Instruction> {
    let constant = |value: i32| match ty {
        ValueType::Long => Instruction::Constant(Constant::Long(value as i64)),
        _ => Instruction::Constant(Constant::Int(value)),
    };
    vec![
        Instruction::LocalLoad { ty, index: local },
        constant(3),
        Instruction::BinaryOp {
            ty,
            op: BinaryOperator::Mul,
        },
        constant(7),
        Instruction::BinaryOp {
            ty,
            op: BinaryOperator::Add,
        },
        Instruction::LocalStore { ty, index: local },
    ]
}

fn reference(method: &MethodData) -> Program {
    let mut program = Program::default();
    program.add(method.clone());
    program
}

fn check_output(output: &jvmkit::jvm::compiler::CompilerOutput, prefix: &str, ceiling: usize) {
    assert!(!output.helpers.is_empty());
    assert!(output.main.code.len() <= ceiling);
    let mut names = HashSet::new();
    for helper in &output.helpers {
        assert!(helper.compiled.code.len() <= ceiling);
        assert!(helper.name.starts_with(prefix));
        assert!(helper.access_flags.contains(MethodAccessFlags::STATIC));
        assert!(names.insert(helper.name.clone()));
    }
}

#[test]
fn straight_line_code() {
    init_logging();
    let mut insns = vec![];
    for _ in 0..20 {
        insns.extend(statement(ValueType::Int, 0));
    }
    insns.push(Instruction::LocalLoad {
        ty: ValueType::Int,
        index: 0,
    });
    insns.push(Instruction::Return(Some(ValueType::Int)));
    let method = static_method("run", "(I)I", insns);

    let mut pool = ConstantPool::new();
    let (output, program) = compile_and_reload(&method, &mut pool, &settings(50));
    check_output(&output, "run$helper", 50);
    let expected = reference(&method);
    for arg in [0, 1, -5, 123456] {
        assert_eq!(
            program.call("run", &[Value::Int(arg)]),
            expected.call("run", &[Value::Int(arg)])
        );
    }
}

#[test]
fn wide_locals() {
    init_logging();
    let mut insns = vec![];
    for _ in 0..12 {
        insns.extend(statement(ValueType::Long, 0));
    }
    insns.push(Instruction::LocalLoad {
        ty: ValueType::Long,
        index: 0,
    });
    insns.push(Instruction::Return(Some(ValueType::Long)));
    let method = static_method("wide", "(J)J", insns);

    let mut pool = ConstantPool::new();
    let (output, program) = compile_and_reload(&method, &mut pool, &settings(60));
    check_output(&output, "wide$helper", 60);
    let expected = reference(&method);
    for arg in [0, 9, -40_000_000_000] {
        assert_eq!(
            program.call("wide", &[Value::Long(arg)]),
            expected.call("wide", &[Value::Long(arg)])
        );
    }
}

#[test]
fn loop_bodies() {
    init_logging();
    let body_statements = 16;
    let exit = 5 + 6 * body_statements + 5;
    let mut insns = vec![
        Instruction::Constant(Constant::Int(0)),
        Instruction::LocalStore {
            ty: ValueType::Int,
            index: 1,
        },
        Instruction::LocalLoad {
            ty: ValueType::Int,
            index: 1,
        },
        Instruction::Constant(Constant::Int(3)),
        Instruction::ConditionalBranch {
            comparison: Comparison::Int(BranchCondition::Ge),
            target: exit,
        },
    ];
    for _ in 0..body_statements {
        insns.extend(statement(ValueType::Int, 0));
    }
    insns.extend([
        Instruction::LocalLoad {
            ty: ValueType::Int,
            index: 1,
        },
        Instruction::Constant(Constant::Int(1)),
        Instruction::BinaryOp {
            ty: ValueType::Int,
            op: BinaryOperator::Add,
        },
        Instruction::LocalStore {
            ty: ValueType::Int,
            index: 1,
        },
        Instruction::Goto(2),
    ]);
    assert_eq!(insns.len(), exit);
    insns.push(Instruction::LocalLoad {
        ty: ValueType::Int,
        index: 0,
    });
    insns.push(Instruction::Return(Some(ValueType::Int)));
    let method = static_method("looping", "(I)I", insns);

    let mut pool = ConstantPool::new();
    let (output, program) = compile_and_reload(&method, &mut pool, &settings(60));
    check_output(&output, "looping$helper", 60);
    let expected = reference(&method);
    for arg in [0, 2, -17] {
        assert_eq!(
            program.call("looping", &[Value::Int(arg)]),
            expected.call("looping", &[Value::Int(arg)])
        );
    }
}

/// `x = x <op> (d + adjust)` on int locals 0 and 1
fn divide(op: BinaryOperator, adjust: i32) -> Vec<Instruction> {
    vec![
        Instruction::LocalLoad {
            ty: ValueType::Int,
            index: 0,
        },
        Instruction::LocalLoad {
            ty: ValueType::Int,
            index: 1,
        },
        Instruction::Constant(Constant::Int(adjust)),
        Instruction::BinaryOp {
            ty: ValueType::Int,
            op: BinaryOperator::Add,
        },
        Instruction::BinaryOp {
            ty: ValueType::Int,
            op,
        },
        Instruction::LocalStore {
            ty: ValueType::Int,
            index: 0,
        },
    ]
}

// static int guarded(int x, int d) {
//     try {
//         ... x = x * 3 + 7 ...
//         try { x = x / d; } catch (ArithmeticException e) { x = x + 100; }
//         ... x = x * 3 + 7 ...
//         x = x % (d - 2);
//         ... x = x * 3 + 7 ...
//     } catch (Throwable t) {
//         return -1;
//     }
//     return x / (d + 1);
// }
#[test]
fn handlers_and_throwing_paths() {
    init_logging();
    let mut insns = vec![];
    for _ in 0..6 {
        insns.extend(statement(ValueType::Int, 0));
    }
    let try_start = insns.len();
    insns.extend(divide(BinaryOperator::Div, 0));
    let try_end = insns.len();
    let after_catch = try_end + 1 + 5;
    insns.push(Instruction::Goto(after_catch));
    let catch = insns.len();
    insns.extend([
        Instruction::Pop(PopCount::new(1).unwrap()),
        Instruction::LocalLoad {
            ty: ValueType::Int,
            index: 0,
        },
        Instruction::Constant(Constant::Int(100)),
        Instruction::BinaryOp {
            ty: ValueType::Int,
            op: BinaryOperator::Add,
        },
        Instruction::LocalStore {
            ty: ValueType::Int,
            index: 0,
        },
    ]);
    assert_eq!(insns.len(), after_catch);
    for _ in 0..6 {
        insns.extend(statement(ValueType::Int, 0));
    }
    insns.extend(divide(BinaryOperator::Rem, -2));
    for _ in 0..3 {
        insns.extend(statement(ValueType::Int, 0));
    }
    let covered = insns.len();
    insns.extend(divide(BinaryOperator::Div, 1));
    insns.pop();
    insns.push(Instruction::Return(Some(ValueType::Int)));
    let outer_target = insns.len();
    insns.extend([
        Instruction::Pop(PopCount::new(1).unwrap()),
        Instruction::Constant(Constant::Int(-1)),
        Instruction::Return(Some(ValueType::Int)),
    ]);

    let outer = ExceptionHandler {
        target: outer_target,
        catch_class: None,
        loader: None,
    };
    let inner = ExceptionHandler {
        target: catch,
        catch_class: Some(Name::from(ARITHMETIC_EXCEPTION)),
        loader: None,
    };
    let outer_only = HandlerList::new(vec![outer.clone()]);
    let both = HandlerList::new(vec![inner, outer]);
    let handlers = (0..insns.len())
        .map(|index| {
            if (try_start..try_end).contains(&index) {
                both.clone()
            } else if index < covered {
                outer_only.clone()
            } else {
                HandlerList::empty()
            }
        })
        .collect();
    let len = insns.len();
    let method = MethodData::new(
        MethodAccessFlags::STATIC,
        Name::from(common::CLASS),
        Name::from("guarded"),
        MethodDescriptor::parse("(II)I").unwrap(),
        insns,
        handlers,
        vec![None; len],
    )
    .unwrap();

    let mut pool = ConstantPool::new();
    let (output, program) = compile_and_reload(&method, &mut pool, &settings(80));
    check_output(&output, "guarded$helper", 80);
    assert!(!output.main.raw_handlers.is_empty());
    let expected = reference(&method);
    for (x, d) in [(5, 3), (5, 0), (5, 2), (5, -1), (-7, 4), (0, 1)] {
        let args = [Value::Int(x), Value::Int(d)];
        assert_eq!(
            program.outcome("guarded", &args),
            expected.outcome("guarded", &args),
            "guarded({}, {})",
            x,
            d
        );
    }

    // Caught by the inner handler, caught by the outer one, and not caught at all
    let args = |x: i32, d: i32| [Value::Int(x), Value::Int(d)];
    assert_eq!(program.outcome("guarded", &args(5, 0)), Ok(Some(Value::Int(118))));
    assert_eq!(program.outcome("guarded", &args(5, 2)), Ok(Some(Value::Int(-1))));
    assert_eq!(program.outcome("guarded", &args(5, -1)), Err(ARITHMETIC_EXCEPTION));
}

#[test]
fn hopeless_ceilings() {
    init_logging();
    let mut insns = vec![];
    for _ in 0..10 {
        insns.extend(statement(ValueType::Int, 0));
    }
    insns.push(Instruction::Return(None));
    let method = static_method("tiny", "(I)V", insns);
    assert!(matches!(
        compile(&method, &mut ConstantPool::new(), &settings(5)),
        Err(Error::CodeTooLarge { ceiling: 5, .. })
    ));
}
