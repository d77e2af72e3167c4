use super::Name;
use crate::util::Width;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

/// Reason a type or method descriptor could not be parsed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct DescriptorError(String);

/// Utility trait for converting descriptors to and from string representations
pub trait RenderDescriptor {
    /// Turn the descriptor into a string
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    /// Write the descriptor to a string
    fn render_to(&self, write_to: &mut String);
}

pub trait ParseDescriptor: Sized {
    /// Parse a descriptor from a string
    fn parse(source: &str) -> Result<Self, DescriptorError> {
        let mut chars = source.chars().peekable();
        let ret = Self::parse_from(&mut chars)?;
        match chars.next() {
            None => Ok(ret),
            Some(c) => Err(DescriptorError(format!(
                "Unexpected leftover input '{}' in '{}'",
                c, source
            ))),
        }
    }

    /// Read the descriptor from a character buffer
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, DescriptorError>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

impl BaseType {
    /// Operand of `newarray` for arrays of this element type
    pub fn array_type_code(self) -> u8 {
        match self {
            BaseType::Boolean => 4,
            BaseType::Char => 5,
            BaseType::Float => 6,
            BaseType::Double => 7,
            BaseType::Byte => 8,
            BaseType::Short => 9,
            BaseType::Int => 10,
            BaseType::Long => 11,
        }
    }

    /// Inverse of `array_type_code`
    pub fn from_array_type_code(code: u8) -> Option<BaseType> {
        Some(match code {
            4 => BaseType::Boolean,
            5 => BaseType::Char,
            6 => BaseType::Float,
            7 => BaseType::Double,
            8 => BaseType::Byte,
            9 => BaseType::Short,
            10 => BaseType::Int,
            11 => BaseType::Long,
            _ => return None,
        })
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        let c = match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        };
        write_to.push(c);
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, DescriptorError> {
        Ok(match source.next() {
            Some('B') => BaseType::Byte,
            Some('C') => BaseType::Char,
            Some('D') => BaseType::Double,
            Some('F') => BaseType::Float,
            Some('I') => BaseType::Int,
            Some('J') => BaseType::Long,
            Some('S') => BaseType::Short,
            Some('Z') => BaseType::Boolean,
            Some(c) => {
                return Err(DescriptorError(format!(
                    "Invalid base type character '{}'",
                    c
                )))
            }
            None => return Err(DescriptorError("Missing base type character".into())),
        })
    }
}

/// Type of a field, local variable, array element, or method parameter
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),

    /// Class or interface, by binary name (eg. `java/lang/String`)
    Object(Name),

    /// Array with the given element type
    Array(Box<FieldType>),
}

impl FieldType {
    pub fn object(class_name: &str) -> FieldType {
        FieldType::Object(Name::from(class_name))
    }

    pub fn array(element_type: FieldType) -> FieldType {
        FieldType::Array(Box::new(element_type))
    }

    pub const fn int() -> FieldType {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType {
        FieldType::Base(BaseType::Long)
    }

    pub const fn float() -> FieldType {
        FieldType::Base(BaseType::Float)
    }

    pub const fn double() -> FieldType {
        FieldType::Base(BaseType::Double)
    }

    pub fn java_lang_object() -> FieldType {
        FieldType::object("java/lang/Object")
    }

    pub fn is_reference(&self) -> bool {
        !matches!(self, FieldType::Base(_))
    }

    /// Element type, if this is an array type
    pub fn element_type(&self) -> Option<&FieldType> {
        match self {
            FieldType::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Number of array dimensions (0 for non-arrays)
    pub fn dimensions(&self) -> usize {
        let mut typ = self;
        let mut dimensions = 0;
        while let FieldType::Array(element) = typ {
            dimensions += 1;
            typ = element;
        }
        dimensions
    }

    /// Name used to refer to this type from a `CONSTANT_Class` entry
    ///
    /// Classes use their binary name, arrays use their full descriptor. Primitive types have no
    /// such name.
    pub fn class_name(&self) -> Option<String> {
        match self {
            FieldType::Base(_) => None,
            FieldType::Object(name) => Some(name.to_string()),
            FieldType::Array(_) => Some(self.render()),
        }
    }

    /// Inverse of `class_name`
    pub fn from_class_name(class_name: &str) -> Result<FieldType, DescriptorError> {
        if class_name.starts_with('[') {
            FieldType::parse(class_name)
        } else {
            check_class_name(class_name)?;
            Ok(FieldType::object(class_name))
        }
    }
}

fn check_class_name(name: &str) -> Result<(), DescriptorError> {
    if name.is_empty() {
        Err(DescriptorError("Class name is empty".into()))
    } else if name.contains(&['.', ';', '['][..]) {
        Err(DescriptorError(format!(
            "Class name '{}' contains an illegal character",
            name
        )))
    } else {
        Ok(())
    }
}

impl Width for FieldType {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            _ => 1,
        }
    }
}

impl RenderDescriptor for FieldType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Object(name) => {
                write_to.push('L');
                write_to.push_str(name);
                write_to.push(';');
            }
            FieldType::Array(element) => {
                write_to.push('[');
                element.render_to(write_to);
            }
        }
    }
}

impl ParseDescriptor for FieldType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, DescriptorError> {
        match source.peek().copied() {
            None => Err(DescriptorError("Missing field type".into())),
            Some('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => {
                BaseType::parse_from(source).map(FieldType::Base)
            }
            Some('[') => {
                source.next();
                Ok(FieldType::array(FieldType::parse_from(source)?))
            }
            Some('L') => {
                source.next();
                let mut class_name = String::new();
                loop {
                    match source.next() {
                        Some(';') => break,
                        Some(c) => class_name.push(c),
                        None => {
                            return Err(DescriptorError(format!(
                                "Missing terminator for 'L{}'",
                                class_name
                            )))
                        }
                    }
                }
                check_class_name(&class_name)?;
                Ok(FieldType::Object(Name::from(class_name)))
            }
            Some(c) => Err(DescriptorError(format!(
                "Invalid field type character '{}'",
                c
            ))),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub return_type: Option<FieldType>, // `None` is for `void` (ie. no return)
}

impl MethodDescriptor {
    /// Total length of parameters (not the same as the length of the vector),
    /// which must be 255 or less for it to be valid
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let this_len = if has_this_param { 1 } else { 0 };
        this_len + self.parameters.iter().map(Width::width).sum::<usize>()
    }

    /// Stack words taken up by the returned value
    pub fn return_width(&self) -> usize {
        self.return_type.as_ref().map_or(0, Width::width)
    }
}

impl RenderDescriptor for MethodDescriptor {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(typ) => typ.render_to(write_to),
        }
    }
}

impl ParseDescriptor for MethodDescriptor {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, DescriptorError> {
        if source.next() != Some('(') {
            return Err(DescriptorError(
                "Expected method descriptor to start with '('".into(),
            ));
        }
        let mut parameters = vec![];
        while source.next_if_eq(&')').is_none() {
            parameters.push(FieldType::parse_from(source)?);
        }
        let return_type = if source.next_if_eq(&'V').is_some() {
            None
        } else {
            Some(FieldType::parse_from(source)?)
        };
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn field_types() {
        let typ = FieldType::parse("[[Ljava/lang/String;").unwrap();
        assert_eq!(
            typ,
            FieldType::array(FieldType::array(FieldType::object("java/lang/String")))
        );
        assert_eq!(typ.dimensions(), 2);
        assert_eq!(typ.render(), "[[Ljava/lang/String;");
        assert_eq!(typ.class_name().unwrap(), "[[Ljava/lang/String;");
        assert_eq!(FieldType::long().width(), 2);

        assert!(FieldType::parse("Ljava/lang/String").is_err());
        assert!(FieldType::parse("II").is_err());
        assert!(FieldType::parse("L;").is_err());
    }

    #[test]
    fn class_names() {
        assert_eq!(
            FieldType::from_class_name("java/util/List").unwrap(),
            FieldType::object("java/util/List")
        );
        assert_eq!(
            FieldType::from_class_name("[I").unwrap(),
            FieldType::array(FieldType::int())
        );
        assert!(FieldType::from_class_name("java.util.List").is_err());
    }

    #[test]
    fn method_descriptors() {
        let desc = MethodDescriptor::parse("(IJLjava/lang/Object;[D)V").unwrap();
        assert_eq!(desc.parameters.len(), 4);
        assert_eq!(desc.parameter_length(false), 5);
        assert_eq!(desc.parameter_length(true), 6);
        assert_eq!(desc.return_type, None);
        assert_eq!(desc.render(), "(IJLjava/lang/Object;[D)V");

        let desc = MethodDescriptor::parse("()D").unwrap();
        assert_eq!(desc.return_width(), 2);

        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
    }
}
