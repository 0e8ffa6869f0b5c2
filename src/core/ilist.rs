//! Ordered instruction lists.
//!
//! An [`InstrList`] is the mutable form of one block: the host hands it to the
//! checker after instrumentation, the checker restructures it in place, and
//! the host then executes it. Positions are addressed by [`InstrId`] rather
//! than by index, so an id obtained before an insertion still names the same
//! instruction afterwards.

use super::instr::{Instr, InstrId, RuntimeCall};
use std::fmt;

#[derive(Debug, Clone, Default)]
pub struct InstrList {
    instrs: Vec<Instr>,
}

impl InstrList {
    pub fn new() -> Self {
        Self { instrs: Vec::new() }
    }

    /// Build a list of application instructions.
    pub fn from_app(insns: impl IntoIterator<Item = iced_x86::Instruction>) -> Self {
        Self {
            instrs: insns.into_iter().map(Instr::app).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instr> {
        self.instrs.iter()
    }

    /// Application instructions only, in order.
    pub fn iter_app(&self) -> impl Iterator<Item = &Instr> {
        self.instrs.iter().filter(|i| i.is_app())
    }

    pub fn first(&self) -> Option<&Instr> {
        self.instrs.first()
    }

    pub fn last(&self) -> Option<&Instr> {
        self.instrs.last()
    }

    pub fn first_app(&self) -> Option<&Instr> {
        self.iter_app().next()
    }

    pub fn last_app(&self) -> Option<&Instr> {
        self.instrs.iter().rev().find(|i| i.is_app())
    }

    /// Index of the instruction with the given id.
    pub fn position(&self, id: InstrId) -> Option<usize> {
        self.instrs.iter().position(|i| i.id() == id)
    }

    pub fn contains(&self, id: InstrId) -> bool {
        self.position(id).is_some()
    }

    /// Insert `instr` immediately before `at`. Returns the new id, or `None`
    /// when `at` is not in this list.
    pub fn insert_before(&mut self, at: InstrId, instr: Instr) -> Option<InstrId> {
        let pos = self.position(at)?;
        let id = instr.id();
        self.instrs.insert(pos, instr);
        Some(id)
    }

    /// Insert `instr` immediately after `at`.
    pub fn insert_after(&mut self, at: InstrId, instr: Instr) -> Option<InstrId> {
        let pos = self.position(at)?;
        let id = instr.id();
        self.instrs.insert(pos + 1, instr);
        Some(id)
    }

    /// Splice a clean call in front of `at`.
    pub fn insert_clean_call(&mut self, at: InstrId, call: RuntimeCall) -> Option<InstrId> {
        self.insert_before(at, Instr::clean_call(call))
    }

    /// Remove and return the instruction with the given id.
    pub fn remove(&mut self, id: InstrId) -> Option<Instr> {
        let pos = self.position(id)?;
        Some(self.instrs.remove(pos))
    }

    pub fn push(&mut self, instr: Instr) -> InstrId {
        let id = instr.id();
        self.instrs.push(instr);
        id
    }

    /// Move every instruction of `other` to the end of this list, leaving
    /// `other` empty.
    pub fn append(&mut self, other: &mut InstrList) {
        self.instrs.append(&mut other.instrs);
    }

    /// Deep copy with fresh ids, preserving order and attributes.
    pub fn clone_list(&self) -> InstrList {
        Self {
            instrs: self.instrs.iter().map(Instr::duplicate).collect(),
        }
    }

    /// Drop every instruction for which `keep` returns false.
    pub fn retain(&mut self, keep: impl FnMut(&Instr) -> bool) {
        self.instrs.retain(keep);
    }
}

impl fmt::Display for InstrList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instr in &self.instrs {
            crate::x64::format::write_instr(f, instr)?;
            writeln!(f)?;
        }
        Ok(())
    }
}
