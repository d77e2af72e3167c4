//! Shared test fixtures: a small interpreter for method bodies, plus compile/decode plumbing
#![allow(dead_code)]

use jvmkit::jvm::code::{
    BinaryOperator, Comparison, Constant, Instruction, MethodData, ReferenceCondition, ValueType,
};
use jvmkit::jvm::compiler::{compile, CompilerOutput};
use jvmkit::jvm::decoder::decode;
use jvmkit::jvm::{
    CompilerSettings, ConstantPool, Error, MethodAccessFlags, MethodDescriptor, Name,
    ParseDescriptor,
};
use std::collections::HashMap;

pub const CLASS: &str = "Test";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Static method of the test class with no handlers
pub fn static_method(name: &str, descriptor: &str, instructions: Vec<Instruction>) -> MethodData {
    let len = instructions.len();
    MethodData::new(
        MethodAccessFlags::STATIC,
        Name::from(CLASS),
        Name::from(name),
        MethodDescriptor::parse(descriptor).unwrap(),
        instructions,
        vec![Default::default(); len],
        vec![None; len],
    )
    .unwrap()
}

/// Decode a static method of the test class
pub fn decode_static(
    name: &str,
    descriptor: &str,
    code: &[u8],
    handlers: &[jvmkit::jvm::code::RawHandler],
    pool: &ConstantPool,
) -> Result<MethodData, Error> {
    decode(code, handlers, pool)?.into_method_data(
        MethodAccessFlags::STATIC,
        Name::from(CLASS),
        Name::from(name),
        MethodDescriptor::parse(descriptor).unwrap(),
    )
}

/// Compile a method, then decode the main method and every helper back
pub fn compile_and_reload(
    method: &MethodData,
    pool: &mut ConstantPool,
    settings: &CompilerSettings,
) -> (CompilerOutput, Program) {
    let output = compile(method, pool, settings).unwrap();
    let mut program = Program::default();
    let main = decode(&output.main.code, &output.main.raw_handlers, &*pool)
        .unwrap()
        .into_method_data(
            method.access_flags,
            method.class_name.clone(),
            method.name.clone(),
            method.descriptor.clone(),
        )
        .unwrap();
    program.add(main);
    for helper in &output.helpers {
        let decoded = decode(&helper.compiled.code, &helper.compiled.raw_handlers, &*pool)
            .unwrap()
            .into_method_data(
                helper.access_flags,
                method.class_name.clone(),
                helper.name.clone(),
                helper.descriptor.clone(),
            )
            .unwrap();
        program.add(decoded);
    }
    (output, program)
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Value {
    Int(i32),
    Long(i64),
    Null,

    /// Caught exception of the given class
    Exception(&'static str),
}

impl Value {
    fn int(self) -> i32 {
        match self {
            Value::Int(value) => value,
            other => panic!("expected an int, found {:?}", other),
        }
    }

    fn long(self) -> i64 {
        match self {
            Value::Long(value) => value,
            other => panic!("expected a long, found {:?}", other),
        }
    }
}

pub const ARITHMETIC_EXCEPTION: &str = "java/lang/ArithmeticException";
pub const NULL_POINTER_EXCEPTION: &str = "java/lang/NullPointerException";

/// Can a handler for `catch_class` catch the exception?
fn catches(catch_class: Option<&str>, thrown: &str) -> bool {
    match catch_class {
        None => true,
        Some(class) => {
            class == thrown
                || matches!(
                    class,
                    "java/lang/RuntimeException" | "java/lang/Exception" | "java/lang/Throwable"
                )
        }
    }
}

/// Result of running a method: the returned value, or the class of an uncaught exception
pub type Outcome = Result<Option<Value>, &'static str>;

/// Static methods of the test class, runnable by name
///
/// Only what the tests use is supported: `int`/`long` arithmetic, locals, stack manipulation,
/// branches, switches, static calls within the class, and exceptions (division by zero and
/// `athrow`). Anything else panics.
#[derive(Default)]
pub struct Program {
    methods: HashMap<String, MethodData>,
}

const STEP_LIMIT: usize = 10_000_000;

impl Program {
    pub fn add(&mut self, method: MethodData) {
        self.methods.insert(method.name.to_string(), method);
    }

    pub fn method(&self, name: &str) -> &MethodData {
        &self.methods[name]
    }

    /// Run a method that isn't expected to throw
    pub fn call(&self, name: &str, args: &[Value]) -> Option<Value> {
        match self.outcome(name, args) {
            Ok(result) => result,
            Err(class) => panic!("`{}` threw {}", name, class),
        }
    }

    pub fn outcome(&self, name: &str, args: &[Value]) -> Outcome {
        let mut steps = 0;
        self.run(self.method(name), args, &mut steps)
    }

    fn run(&self, method: &MethodData, args: &[Value], steps: &mut usize) -> Outcome {
        let mut locals: Vec<Option<Value>> = vec![None; method.max_locals()];
        let mut slot = 0;
        for arg in args {
            locals[slot] = Some(*arg);
            slot += if let Value::Long(_) = arg { 2 } else { 1 };
        }
        let mut stack: Vec<Value> = vec![];
        let mut pc = 0;
        loop {
            *steps += 1;
            assert!(*steps < STEP_LIMIT, "ran for too long");
            let at = pc;
            let insn = &method.instructions()[at];
            pc += 1;
            let thrown: Option<&'static str> = match insn {
                Instruction::Constant(Constant::Int(value)) => {
                    stack.push(Value::Int(*value));
                    None
                }
                Instruction::Constant(Constant::Long(value)) => {
                    stack.push(Value::Long(*value));
                    None
                }
                Instruction::Constant(Constant::Null) => {
                    stack.push(Value::Null);
                    None
                }
                Instruction::LocalLoad { index, .. } => {
                    stack.push(locals[*index as usize].expect("load of unset local"));
                    None
                }
                Instruction::LocalStore { index, .. } => {
                    locals[*index as usize] = stack.pop();
                    None
                }
                Instruction::Pop(count) => {
                    let len = stack.len();
                    stack.truncate(len - count.elements());
                    None
                }
                Instruction::Dup(shape) => {
                    let len = stack.len();
                    let copy: Vec<Value> = stack[len - shape.size()..].to_vec();
                    let insert_at = len - shape.size() - shape.delta();
                    stack.splice(insert_at..insert_at, copy);
                    None
                }
                Instruction::Swap => {
                    let len = stack.len();
                    stack.swap(len - 1, len - 2);
                    None
                }
                Instruction::BinaryOp { ty, op } => {
                    let right = stack.pop().unwrap();
                    let left = stack.pop().unwrap();
                    let result = match ty {
                        ValueType::Int => int_op(*op, left.int(), right.int()).map(Value::Int),
                        ValueType::Long => {
                            long_op(*op, left.long(), right.long()).map(Value::Long)
                        }
                        other => panic!("unsupported operand type {:?}", other),
                    };
                    match result {
                        Some(value) => {
                            stack.push(value);
                            None
                        }
                        None => Some(ARITHMETIC_EXCEPTION),
                    }
                }
                Instruction::Neg(ValueType::Int) => {
                    let value = stack.pop().unwrap().int();
                    stack.push(Value::Int(value.wrapping_neg()));
                    None
                }
                Instruction::ConditionalBranch { comparison, target } => {
                    let right = stack.pop().unwrap();
                    let left = stack.pop().unwrap();
                    let taken = match comparison {
                        Comparison::Int(cond) => cond.holds(left.int(), right.int()),
                        Comparison::Reference(ReferenceCondition::Eq) => left == right,
                        Comparison::Reference(ReferenceCondition::Ne) => left != right,
                    };
                    if taken {
                        pc = *target;
                    }
                    None
                }
                Instruction::Goto(target) => {
                    pc = *target;
                    None
                }
                Instruction::Switch(table) => {
                    let key = stack.pop().unwrap().int();
                    pc = table.lookup(key);
                    None
                }
                Instruction::Invoke { method: callee, .. } => {
                    assert_eq!(&*callee.class, CLASS, "call outside the test class");
                    let arity = callee.descriptor.parameters.len();
                    let args = stack.split_off(stack.len() - arity);
                    let target = self.method(&callee.name);
                    match self.run(target, &args, steps) {
                        Ok(Some(result)) => {
                            stack.push(result);
                            None
                        }
                        Ok(None) => None,
                        Err(class) => Some(class),
                    }
                }
                Instruction::Throw => match stack.pop().unwrap() {
                    Value::Exception(class) => Some(class),
                    Value::Null => Some(NULL_POINTER_EXCEPTION),
                    other => panic!("threw {:?}", other),
                },
                Instruction::Return(None) => return Ok(None),
                Instruction::Return(Some(_)) => return Ok(stack.pop()),
                other => panic!("unsupported instruction {}", other),
            };

            if let Some(class) = thrown {
                let handler = method.handlers()[at]
                    .iter()
                    .find(|handler| catches(handler.catch_class.as_deref(), class));
                match handler {
                    Some(handler) => {
                        stack.clear();
                        stack.push(Value::Exception(class));
                        pc = handler.target;
                    }
                    None => return Err(class),
                }
            }
        }
    }
}

/// `None` on division by zero
fn int_op(op: BinaryOperator, left: i32, right: i32) -> Option<i32> {
    if matches!(op, BinaryOperator::Div | BinaryOperator::Rem) && right == 0 {
        return None;
    }
    Some(match op {
        BinaryOperator::Add => left.wrapping_add(right),
        BinaryOperator::Sub => left.wrapping_sub(right),
        BinaryOperator::Mul => left.wrapping_mul(right),
        BinaryOperator::Div => left.wrapping_div(right),
        BinaryOperator::Rem => left.wrapping_rem(right),
        BinaryOperator::And => left & right,
        BinaryOperator::Or => left | right,
        BinaryOperator::Xor => left ^ right,
    })
}

fn long_op(op: BinaryOperator, left: i64, right: i64) -> Option<i64> {
    if matches!(op, BinaryOperator::Div | BinaryOperator::Rem) && right == 0 {
        return None;
    }
    Some(match op {
        BinaryOperator::Add => left.wrapping_add(right),
        BinaryOperator::Sub => left.wrapping_sub(right),
        BinaryOperator::Mul => left.wrapping_mul(right),
        BinaryOperator::Div => left.wrapping_div(right),
        BinaryOperator::Rem => left.wrapping_rem(right),
        BinaryOperator::And => left & right,
        BinaryOperator::Or => left | right,
        BinaryOperator::Xor => left ^ right,
    })
}
