//! Decode, edit, and re-encode JVM method bodies
//!
//! ### Pipeline
//!
//! A method body starts out as the contents of a `Code` attribute: a bytecode array and an
//! exception table. The [`decoder`] turns that into a [`code::MethodData`], an array of
//! instructions where branches refer to instruction indices and where subroutines (`jsr`/`ret`)
//! have been inlined. The [`editor`] can then splice new code in around existing instructions.
//! Finally, the [`compiler`] lays the instructions back out into bytecode, picking encodings and
//! splitting the method into helpers if it is too large.
//!
//! Constant pool indices are resolved through a [`ConstantPoolReader`] while decoding and
//! allocated through a [`ConstantPoolAllocator`] while compiling. [`ConstantPool`] implements both.
//!
//! ### Example
//!
//! ```
//! use jvmkit::jvm::code::{Instruction, ValueType};
//! use jvmkit::jvm::compiler::compile;
//! use jvmkit::jvm::decoder::decode;
//! use jvmkit::jvm::editor::{MethodEditor, Reconciled};
//! use jvmkit::jvm::*;
//!
//! # fn example() -> Result<(), Error> {
//! // static int identity(int x) { return x; }
//! let code = [0x1a, 0xac];
//! let mut pool = ConstantPool::new();
//! let method = decode(&code, &[], &pool)?.into_method_data(
//!     MethodAccessFlags::STATIC,
//!     Name::from("Example"),
//!     Name::from("identity"),
//!     MethodDescriptor::parse("(I)I").unwrap(),
//! )?;
//!
//! // Add one to the argument before returning it
//! let mut editor = MethodEditor::new(&method);
//! editor.begin_pass()?;
//! editor.insert_before(1, |emitter| {
//!     emitter.emit(Instruction::Constant(code::Constant::Int(1)))?;
//!     emitter.emit(Instruction::BinaryOp {
//!         ty: ValueType::Int,
//!         op: code::BinaryOperator::Add,
//!     })
//! })?;
//! let edited = match editor.end_pass()? {
//!     Reconciled::Changed(edited) => edited,
//!     Reconciled::Unchanged => method,
//! };
//!
//! let output = compile(&edited, &mut pool, &CompilerSettings::default())?;
//! assert_eq!(output.main.code, vec![0x1a, 0x04, 0x60, 0xac]);
//! assert!(output.helpers.is_empty());
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod access_flags;
mod binary_format;
pub mod code;
pub mod compiler;
mod constants;
pub mod decoder;
mod descriptors;
pub mod editor;
mod errors;
mod settings;

pub use access_flags::*;
pub use binary_format::*;
pub use constants::*;
pub use descriptors::*;
pub use errors::*;
pub use settings::*;

/// Class, member, and string names
///
/// These are shared between many instructions (and cloned freely), so they are reference counted.
pub type Name = std::sync::Arc<str>;
