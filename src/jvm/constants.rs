use super::code::Constant;
use super::{Error, FieldType, MethodDescriptor, Name};
use crate::util::{Offset, OffsetVec, Width};
use std::collections::HashMap;

/// Symbolic reference to a field
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FieldRef {
    /// Binary name of the class declaring the field
    pub class: Name,
    pub name: Name,
    pub descriptor: FieldType,
}

/// Symbolic reference to a method
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodRef {
    /// Binary name of the class (or array descriptor) declaring the method
    pub class: Name,
    pub name: Name,
    pub descriptor: MethodDescriptor,

    /// Is the method declared in an interface (ie. is this an `InterfaceMethodref`)?
    pub is_interface: bool,
}

impl MethodRef {
    /// Is this an instance initialization method?
    pub fn is_init(&self) -> bool {
        &*self.name == "<init>"
    }
}

/// Kinds of method handles
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

/// Member a method handle refers to
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum HandleMember {
    Field(FieldRef),
    Method(MethodRef),
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodHandle {
    pub kind: HandleKind,
    pub member: HandleMember,
}

/// Call site of an `invokedynamic` instruction
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct DynamicCallSite {
    /// Index into the class's bootstrap methods (opaque to this crate)
    pub bootstrap_method: u16,
    pub name: Name,
    pub descriptor: MethodDescriptor,
}

/// Constant pool entries that can be referenced from inside a method body
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum PoolEntry {
    /// Loadable constant (never `Constant::Null`)
    Constant(Constant),
    FieldRef(FieldRef),
    MethodRef(MethodRef),
    InvokeDynamic(DynamicCallSite),
}

impl Width for PoolEntry {
    fn width(&self) -> usize {
        match self {
            PoolEntry::Constant(Constant::Long(_)) | PoolEntry::Constant(Constant::Double(_)) => 2,
            _ => 1,
        }
    }
}

/// Read access to a class's constant pool
///
/// Implementations should be cheap to query: the decoder asks for each index it sees at most once
/// per method, but it will ask for every index referenced in the method.
pub trait ConstantPoolReader {
    /// Look up the entry at an index, if there is one
    fn entry(&self, index: u16) -> Option<PoolEntry>;
}

/// Write access to a class's constant pool
pub trait ConstantPoolAllocator {
    /// Get the index of an entry, adding it to the pool if it isn't already there
    ///
    /// Entries that are already in the pool must keep their index.
    fn allocate(&mut self, entry: &PoolEntry) -> Result<u16, Error>;
}

/// In-memory constant pool
///
/// Entries are deduplicated by value, so allocating something that is already in the pool (for
/// instance because the pool was pre-populated with a class file's existing constants) hands back
/// the existing index.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: OffsetVec<PoolEntry>,
    indices: HashMap<PoolEntry, u16>,
}

impl ConstantPool {
    pub fn new() -> ConstantPool {
        ConstantPool {
            entries: OffsetVec::new_starting_at(Offset(1)),
            indices: HashMap::new(),
        }
    }

    /// Number of entries (not the same as the next free index)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }

    /// Iterate over entries along with their indices
    pub fn iter(&self) -> impl Iterator<Item = (u16, &PoolEntry)> {
        self.entries
            .iter()
            .map(|(offset, entry)| (offset.0 as u16, entry))
    }
}

impl Default for ConstantPool {
    fn default() -> ConstantPool {
        ConstantPool::new()
    }
}

impl ConstantPoolReader for ConstantPool {
    fn entry(&self, index: u16) -> Option<PoolEntry> {
        self.entries.get_offset(Offset(index as usize)).cloned()
    }
}

impl ConstantPoolAllocator for ConstantPool {
    fn allocate(&mut self, entry: &PoolEntry) -> Result<u16, Error> {
        if let Some(index) = self.indices.get(entry) {
            return Ok(*index);
        }
        if let PoolEntry::Constant(Constant::Null) = entry {
            return Err(Error::InvalidOperand(
                "`null` has no constant pool representation".into(),
            ));
        }

        // Offsets are `u16`, and the last offset is unusable (the count is `u16` too)
        let offset = self.entries.offset_len();
        if offset.0 + entry.width() > u16::MAX as usize {
            return Err(Error::ConstantPoolOverflow);
        }
        self.entries.push(entry.clone());
        let index = offset.0 as u16;
        self.indices.insert(entry.clone(), index);
        Ok(index)
    }
}
