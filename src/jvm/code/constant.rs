use super::ValueType;
use crate::jvm::{FieldType, MethodDescriptor, MethodHandle, Name, RenderDescriptor};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Value pushed by a constant instruction
///
/// Everything except `Null` and small integers ends up in the constant pool when encoded (and
/// comes from there when decoded). Floating point values are compared and hashed by their bit
/// pattern, so `NaN` constants are equal to themselves and `0.0` is not the same as `-0.0`.
#[derive(Clone, Debug)]
pub enum Constant {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(Name),

    /// Class literal (must be an object or array type)
    Class(FieldType),
    MethodType(MethodDescriptor),
    MethodHandle(MethodHandle),
}

impl Constant {
    /// Kind of value pushed onto the stack
    pub fn value_type(&self) -> ValueType {
        match self {
            Constant::Int(_) => ValueType::Int,
            Constant::Long(_) => ValueType::Long,
            Constant::Float(_) => ValueType::Float,
            Constant::Double(_) => ValueType::Double,
            Constant::Null
            | Constant::String(_)
            | Constant::Class(_)
            | Constant::MethodType(_)
            | Constant::MethodHandle(_) => ValueType::Reference,
        }
    }

    /// Does loading this constant involve resolving a symbolic reference?
    pub fn needs_resolution(&self) -> bool {
        matches!(
            self,
            Constant::Class(_) | Constant::MethodType(_) | Constant::MethodHandle(_)
        )
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Constant) -> bool {
        match (self, other) {
            (Constant::Null, Constant::Null) => true,
            (Constant::Int(i1), Constant::Int(i2)) => i1 == i2,
            (Constant::Long(l1), Constant::Long(l2)) => l1 == l2,
            (Constant::Float(f1), Constant::Float(f2)) => f1.to_bits() == f2.to_bits(),
            (Constant::Double(d1), Constant::Double(d2)) => d1.to_bits() == d2.to_bits(),
            (Constant::String(s1), Constant::String(s2)) => s1 == s2,
            (Constant::Class(c1), Constant::Class(c2)) => c1 == c2,
            (Constant::MethodType(m1), Constant::MethodType(m2)) => m1 == m2,
            (Constant::MethodHandle(h1), Constant::MethodHandle(h2)) => h1 == h2,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Constant::Null => (),
            Constant::Int(i) => i.hash(state),
            Constant::Long(l) => l.hash(state),
            Constant::Float(f) => f.to_bits().hash(state),
            Constant::Double(d) => d.to_bits().hash(state),
            Constant::String(s) => s.hash(state),
            Constant::Class(c) => c.hash(state),
            Constant::MethodType(m) => m.hash(state),
            Constant::MethodHandle(h) => h.hash(state),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => write!(f, "null"),
            Constant::Int(i) => write!(f, "{}", i),
            Constant::Long(l) => write!(f, "{}L", l),
            Constant::Float(x) => write!(f, "{:?}F", x),
            Constant::Double(x) => write!(f, "{:?}D", x),
            Constant::String(s) => write!(f, "{:?}", s),
            Constant::Class(c) => write!(f, "{}.class", c),
            Constant::MethodType(m) => write!(f, "{}", m.render()),
            Constant::MethodHandle(h) => write!(f, "{:?}", h),
        }
    }
}
