//! Discovering `jsr`/`ret` subroutines
//!
//! Subroutines are not delimited in bytecode: a subroutine is whatever code is reachable from the
//! target of a `jsr` without going through a `ret` for that subroutine. We find them in two steps:
//!
//!   1. Deciding whether a subroutine ever returns (`ReturnFinder`), since code after a `jsr` to
//!      a subroutine that never returns is not reachable from the `jsr`.
//!
//!   2. Assigning each reachable instruction to exactly one owner: the main body or one
//!      subroutine (`assign_owners`). Subroutines called from inside a subroutine are nested in it.

use super::scan::{RawOp, Scanner};
use crate::jvm::code::opcodes::POP;
use crate::jvm::code::{Instruction, RawHandler, ValueType};
use crate::jvm::{EncodingErrorKind, Error};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Body a bytecode instruction belongs to
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Owner {
    Main,

    /// Subroutine starting at this offset
    Subroutine(usize),
}

#[derive(Debug, Clone)]
pub struct Subroutine {
    /// Local variable the return address is stored into (`None` if the subroutine never returns)
    pub return_local: Option<u16>,

    /// Owner of the first call site found
    pub parent: Owner,
}

/// Owner of every reachable instruction
#[derive(Debug, Default)]
pub struct Ownership {
    owners: HashMap<usize, Owner>,
    subroutines: BTreeMap<usize, Subroutine>,
}

impl Ownership {
    pub fn owner(&self, offset: usize) -> Option<Owner> {
        self.owners.get(&offset).copied()
    }

    pub fn subroutine(&self, entry: usize) -> Option<&Subroutine> {
        self.subroutines.get(&entry)
    }

    pub fn subroutine_count(&self) -> usize {
        self.subroutines.len()
    }
}

/// Memoized search for the `ret` matching a subroutine entry
struct ReturnFinder<'h> {
    handlers: &'h [RawHandler],
    memo: HashMap<usize, Option<u16>>,
    in_progress: HashSet<usize>,
}

impl<'h> ReturnFinder<'h> {
    fn new(handlers: &'h [RawHandler]) -> ReturnFinder<'h> {
        ReturnFinder {
            handlers,
            memo: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    /// Local holding the return address, if the subroutine can return at all
    ///
    /// The subroutine must start by either storing the return address (`astore`) or discarding it
    /// (`pop`, in which case it can't return). Starting from there, normal control flow is
    /// searched for a `ret` of the same local, entering the handlers that cover each instruction
    /// visited. Paths that overwrite the local are abandoned, as are paths through calls to
    /// subroutines that are still being searched.
    fn find_return(&mut self, scanner: &mut Scanner, entry: usize) -> Result<Option<u16>, Error> {
        if let Some(found) = self.memo.get(&entry) {
            return Ok(*found);
        }
        if !self.in_progress.insert(entry) {
            return Ok(None);
        }

        let first = scanner.scan(entry)?.clone();
        let local = match first.op {
            RawOp::Plain(Instruction::LocalStore {
                ty: ValueType::Reference,
                index,
            }) => index,
            RawOp::Stack(POP) => {
                self.in_progress.remove(&entry);
                self.memo.insert(entry, None);
                return Ok(None);
            }
            _ => {
                return Err(Error::encoding(
                    entry,
                    EncodingErrorKind::InvalidSubroutineEntry,
                ))
            }
        };

        let mut found = None;
        let mut visited: HashSet<usize> = HashSet::new();
        let mut worklist = vec![first.next_offset()];
        while let Some(offset) = worklist.pop() {
            if !visited.insert(offset) {
                continue;
            }
            let raw = scanner.scan(offset)?.clone();
            worklist.extend(
                self.handlers
                    .iter()
                    .filter(|handler| handler.covers(offset))
                    .map(|handler| handler.target as usize),
            );
            match raw.op {
                RawOp::Ret(ret_local) if ret_local == local => {
                    found = Some(local);
                    break;
                }
                RawOp::Ret(_) => (),
                RawOp::Plain(Instruction::LocalStore { ty, index })
                    if index == local || (ty.words() == 2 && index.checked_add(1) == Some(local)) => {}
                RawOp::Jsr(target) => {
                    if self.find_return(scanner, target)?.is_some() {
                        worklist.push(raw.next_offset());
                    }
                }
                _ => {
                    worklist.extend(raw.targets());
                    if raw.falls_through() {
                        worklist.push(raw.next_offset());
                    }
                }
            }
        }

        log::trace!("Subroutine at {} returns through {:?}", entry, found);
        self.in_progress.remove(&entry);
        self.memo.insert(entry, found);
        Ok(found)
    }
}

struct Assigner<'s, 'a> {
    scanner: &'s mut Scanner<'a>,
    handlers: &'s [RawHandler],
    returns: ReturnFinder<'s>,
    ownership: Ownership,
}

impl<'s, 'a> Assigner<'s, 'a> {
    /// Claim everything reachable from `entry` for `owner`, then recurse into the subroutines it
    /// calls (in order of entry offset)
    ///
    /// Code already claimed by one of the `ancestors` is where control leaves the subroutine, so
    /// it is not followed. Code claimed by anything else means two bodies share instructions.
    fn assign(&mut self, owner: Owner, entry: usize, ancestors: &[Owner]) -> Result<(), Error> {
        let mut called: Vec<usize> = vec![];
        let mut worklist = vec![entry];
        while let Some(offset) = worklist.pop() {
            match self.ownership.owners.get(&offset) {
                Some(existing) if *existing == owner || ancestors.contains(existing) => continue,
                Some(_) => {
                    return Err(Error::encoding(
                        offset,
                        EncodingErrorKind::InvalidSubroutineEntry,
                    ))
                }
                None => {
                    self.ownership.owners.insert(offset, owner);
                }
            }

            let raw = self.scanner.scan(offset)?.clone();
            if let RawOp::Jsr(target) = raw.op {
                let callee = Owner::Subroutine(target);
                if callee == owner || ancestors.contains(&callee) {
                    return Err(Error::encoding(
                        offset,
                        EncodingErrorKind::RecursiveSubroutine,
                    ));
                }
                called.push(target);
                if self.returns.find_return(self.scanner, target)?.is_some() {
                    worklist.push(raw.next_offset());
                }
            } else {
                worklist.extend(raw.targets());
                if raw.falls_through() {
                    worklist.push(raw.next_offset());
                }
            }
            worklist.extend(
                self.handlers
                    .iter()
                    .filter(|handler| handler.covers(offset))
                    .map(|handler| handler.target as usize),
            );
        }

        called.sort_unstable();
        called.dedup();
        let mut nested = ancestors.to_vec();
        nested.push(owner);
        for target in called {
            if self.ownership.subroutines.contains_key(&target) {
                continue;
            }
            if self.ownership.owners.contains_key(&target) {
                return Err(Error::encoding(
                    target,
                    EncodingErrorKind::InvalidSubroutineEntry,
                ));
            }
            let return_local = self.returns.find_return(self.scanner, target)?;
            log::debug!(
                "Subroutine at {} called from {:?} (returns: {})",
                target,
                owner,
                return_local.is_some()
            );
            self.ownership.subroutines.insert(
                target,
                Subroutine {
                    return_local,
                    parent: owner,
                },
            );
            self.assign(Owner::Subroutine(target), target, &nested)?;
        }
        Ok(())
    }
}

/// Work out which body (main or subroutine) each reachable instruction belongs to
///
/// Scanning starts at offset 0 and follows fall-through, branch, and handler edges. A `jsr`
/// contributes its successor only if the subroutine it calls can return.
pub fn assign_owners(scanner: &mut Scanner, handlers: &[RawHandler]) -> Result<Ownership, Error> {
    let mut assigner = Assigner {
        scanner,
        handlers,
        returns: ReturnFinder::new(handlers),
        ownership: Ownership::default(),
    };
    assigner.assign(Owner::Main, 0, &[])?;
    Ok(assigner.ownership)
}
