//! Bytecode engineering for JVM method bodies
//!
//! See [`jvm`] for an overview.

pub mod jvm;
mod util;
