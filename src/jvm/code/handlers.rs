use crate::jvm::{Error, Name, Serialize};
use byteorder::WriteBytesExt;
use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Arc;

/// Exception handler covering an instruction
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ExceptionHandler {
    /// Index of the first instruction of the handler
    pub target: usize,

    /// Binary name of the exception class caught, or `None` for a catch-all (`finally`) handler
    pub catch_class: Option<Name>,

    /// Token identifying where `catch_class` should be resolved
    ///
    /// This is never interpreted here, just carried along for the benefit of callers juggling
    /// classes from several class loaders.
    pub loader: Option<Name>,
}

/// Ordered list of the handlers covering an instruction, innermost first
///
/// Lists are immutable and cheap to clone. Lists built through the same `HandlerInterner` share
/// storage, in which case comparing them doesn't even need to look at the handlers.
#[derive(Clone, Debug, Eq, Hash)]
pub struct HandlerList(Arc<[ExceptionHandler]>);

impl HandlerList {
    pub fn empty() -> HandlerList {
        HandlerList(Arc::from(Vec::new()))
    }

    pub fn new(handlers: Vec<ExceptionHandler>) -> HandlerList {
        HandlerList(Arc::from(handlers))
    }

    /// Do the two lists share storage?
    pub fn ptr_eq(&self, other: &HandlerList) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Copy of the list with every handler target remapped
    pub fn map_targets(&self, mut f: impl FnMut(usize) -> usize) -> Vec<ExceptionHandler> {
        self.0
            .iter()
            .map(|handler| ExceptionHandler {
                target: f(handler.target),
                ..handler.clone()
            })
            .collect()
    }
}

impl Default for HandlerList {
    fn default() -> HandlerList {
        HandlerList::empty()
    }
}

impl PartialEq for HandlerList {
    fn eq(&self, other: &HandlerList) -> bool {
        self.ptr_eq(other) || self.0[..] == other.0[..]
    }
}

impl Deref for HandlerList {
    type Target = [ExceptionHandler];

    fn deref(&self) -> &[ExceptionHandler] {
        &self.0
    }
}

/// Table of handler lists, used so that equal lists are all backed by the same allocation
#[derive(Default, Debug)]
pub struct HandlerInterner {
    lists: HashSet<HandlerList>,
}

impl HandlerInterner {
    pub fn new() -> HandlerInterner {
        HandlerInterner::default()
    }

    pub fn intern(&mut self, handlers: Vec<ExceptionHandler>) -> HandlerList {
        let list = HandlerList::new(handlers);
        if let Some(existing) = self.lists.get(&list) {
            return existing.clone();
        }
        self.lists.insert(list.clone());
        list
    }
}

/// Entry in the exception table of a `Code` attribute
///
/// The handler covers the byte range `start..end` and transfers control to `target`. A
/// `catch_type` of 0 catches everything, otherwise it is the constant pool index of a class.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct RawHandler {
    pub start: u16,
    pub end: u16,
    pub target: u16,
    pub catch_type: u16,
}

impl RawHandler {
    /// Parse handlers from a flat array of `start, end, target, catch_type` quadruples
    pub fn from_flat(flat: &[u16]) -> Result<Vec<RawHandler>, Error> {
        if flat.len() % 4 != 0 {
            return Err(Error::InvalidOperand(format!(
                "flattened exception table has {} entries, which is not a multiple of 4",
                flat.len()
            )));
        }
        Ok(flat
            .chunks_exact(4)
            .map(|chunk| RawHandler {
                start: chunk[0],
                end: chunk[1],
                target: chunk[2],
                catch_type: chunk[3],
            })
            .collect())
    }

    /// Does the handler's range include this offset?
    pub fn covers(&self, offset: usize) -> bool {
        (self.start as usize..self.end as usize).contains(&offset)
    }
}

impl Serialize for RawHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start.serialize(writer)?;
        self.end.serialize(writer)?;
        self.target.serialize(writer)?;
        self.catch_type.serialize(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn catch(target: usize, class: &str) -> ExceptionHandler {
        ExceptionHandler {
            target,
            catch_class: Some(Name::from(class)),
            loader: None,
        }
    }

    #[test]
    fn interned_lists_share_storage() {
        let mut interner = HandlerInterner::new();
        let list1 = interner.intern(vec![catch(3, "java/lang/Exception")]);
        let list2 = interner.intern(vec![catch(3, "java/lang/Exception")]);
        let list3 = HandlerList::new(vec![catch(3, "java/lang/Exception")]);
        assert!(list1.ptr_eq(&list2));
        assert!(!list1.ptr_eq(&list3));
        assert_eq!(list1, list3);
        assert_ne!(list1, HandlerList::empty());
    }

    #[test]
    fn flat_tables() {
        let handlers = RawHandler::from_flat(&[0, 4, 10, 0, 2, 3, 12, 7]).unwrap();
        assert_eq!(handlers.len(), 2);
        assert!(handlers[0].covers(0));
        assert!(handlers[0].covers(3));
        assert!(!handlers[0].covers(4));
        assert_eq!(handlers[1].catch_type, 7);
        assert!(RawHandler::from_flat(&[0, 4, 10]).is_err());

        let mut bytes = vec![];
        handlers[1].serialize(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0, 2, 0, 3, 0, 12, 0, 7]);
    }
}
