// This module defines the instruction representation the checker operates on. An Instr
// wraps one entry of a block's instruction stream: a decoded x86-64 machine instruction
// (iced_x86::Instruction), a zero-size label, or a clean call into the runtime. Every Instr
// carries a process-unique InstrId so positions stay valid while the stream is mutated, an
// app flag separating original program code from inserted instrumentation (meta code), and
// one optional opaque Note used to tag structural labels. Attribute queries used by the
// classifier and duplicator (writes-memory, interrupt, syscall, control transfer, return)
// are answered here for machine instructions and are always false for labels and calls.

//! Instruction representation.

use super::host::ThreadContext;
use crate::x64::classify;
use iced_x86::Instruction;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_INSTR_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an instruction inside any instruction list.
///
/// Ids are allocated from a process-wide counter, so instructions moved from
/// one list into another never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(u64);

impl InstrId {
    fn fresh() -> Self {
        Self(NEXT_INSTR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque per-instruction annotation value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Note(pub usize);

/// Signature of a procedure executed by a clean call.
pub type CleanCallFn = dyn Fn(&mut dyn ThreadContext, &[i64]) + Send + Sync;

/// A synchronous call into the runtime, spliced into the instruction stream.
///
/// The host executes the call exactly once each time control passes over its
/// position, in program order with the surrounding instructions.
#[derive(Clone)]
pub struct RuntimeCall {
    name: &'static str,
    target: Arc<CleanCallFn>,
    args: Vec<i64>,
}

impl RuntimeCall {
    pub fn new<F>(name: &'static str, args: Vec<i64>, target: F) -> Self
    where
        F: Fn(&mut dyn ThreadContext, &[i64]) + Send + Sync + 'static,
    {
        Self {
            name,
            target: Arc::new(target),
            args,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn args(&self) -> &[i64] {
        &self.args
    }

    /// Run the call against the given thread.
    pub fn invoke(&self, thread: &mut dyn ThreadContext) {
        (self.target)(thread, &self.args);
    }
}

impl fmt::Debug for RuntimeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeCall")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish()
    }
}

/// What an instruction list entry is.
#[derive(Debug, Clone)]
pub enum InstrKind {
    /// A real x86-64 machine instruction.
    Machine(Instruction),
    /// A position marker with no runtime behaviour.
    Label,
    /// A clean call into the runtime.
    CleanCall(RuntimeCall),
}

/// One entry of an instruction list.
#[derive(Debug, Clone)]
pub struct Instr {
    id: InstrId,
    kind: InstrKind,
    app: bool,
    note: Option<Note>,
}

impl Instr {
    /// Application instruction belonging to the original program.
    pub fn app(insn: Instruction) -> Self {
        Self::with_kind(InstrKind::Machine(insn), true)
    }

    /// Instrumentation (meta) machine instruction.
    pub fn meta(insn: Instruction) -> Self {
        Self::with_kind(InstrKind::Machine(insn), false)
    }

    /// Meta label.
    pub fn label() -> Self {
        Self::with_kind(InstrKind::Label, false)
    }

    /// Meta clean call.
    pub fn clean_call(call: RuntimeCall) -> Self {
        Self::with_kind(InstrKind::CleanCall(call), false)
    }

    fn with_kind(kind: InstrKind, app: bool) -> Self {
        Self {
            id: InstrId::fresh(),
            kind,
            app,
            note: None,
        }
    }

    /// Copy of this instruction under a fresh id.
    pub fn duplicate(&self) -> Self {
        Self {
            id: InstrId::fresh(),
            ..self.clone()
        }
    }

    pub fn id(&self) -> InstrId {
        self.id
    }

    pub fn kind(&self) -> &InstrKind {
        &self.kind
    }

    pub fn is_app(&self) -> bool {
        self.app
    }

    pub fn is_meta(&self) -> bool {
        !self.app
    }

    pub fn set_meta(&mut self) {
        self.app = false;
    }

    pub fn note(&self) -> Option<Note> {
        self.note
    }

    pub fn set_note(&mut self, note: Note) {
        self.note = Some(note);
    }

    pub fn is_label(&self) -> bool {
        matches!(self.kind, InstrKind::Label)
    }

    /// The machine instruction, if this entry is one.
    pub fn machine(&self) -> Option<&Instruction> {
        match &self.kind {
            InstrKind::Machine(insn) => Some(insn),
            _ => None,
        }
    }

    pub fn runtime_call(&self) -> Option<&RuntimeCall> {
        match &self.kind {
            InstrKind::CleanCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn writes_memory(&self) -> bool {
        self.machine().is_some_and(classify::writes_memory)
    }

    pub fn is_interrupt(&self) -> bool {
        self.machine().is_some_and(classify::is_interrupt)
    }

    pub fn is_syscall(&self) -> bool {
        self.machine().is_some_and(classify::is_syscall)
    }

    /// Control-transfer instruction (branch, jump or call).
    pub fn is_cti(&self) -> bool {
        self.machine().is_some_and(classify::is_cti)
    }

    pub fn is_return(&self) -> bool {
        self.machine().is_some_and(classify::is_return)
    }

    /// Ends the block with an explicit transfer of control.
    pub fn is_terminator(&self) -> bool {
        self.is_cti() || self.is_return()
    }
}
