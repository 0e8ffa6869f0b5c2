// This module defines the traits through which the checker talks to its host, the dynamic
// binary instrumentation engine that discovers blocks, applies instrumentation and
// executes code. The checker consumes four services: note reservation for structural
// labels, thread-local storage slots, machine-state access for the calling thread, and an
// event pipeline that calls back on thread start, thread exit, and after the
// instrumentation phase of every block. Keeping these behind traits lets the same checker
// run inside a real engine or against the reference host in crate::sim.

//! Host collaborator traits.

use super::ilist::InstrList;
use super::instr::Note;
use super::machine::{Arch, MachineState};
use std::any::Any;
use std::sync::Arc;

/// Index of a registered thread-local storage slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TlsSlot(pub usize);

/// Opaque per-thread value stored in a TLS slot.
pub type TlsValue = Box<dyn Any + Send>;

/// How the host should treat a block after a client callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitFlags {
    /// Continue with default processing.
    #[default]
    Default,
}

/// Ordering of a client among all post-instrumentation callbacks.
///
/// Lower values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority {
    pub name: &'static str,
    pub value: i32,
}

impl Priority {
    pub const fn new(name: &'static str, value: i32) -> Self {
        Self { name, value }
    }
}

/// One executing application thread, as seen from inside a callback.
///
/// Machine-state accessors operate on the live register file of the thread
/// the callback is running on.
pub trait ThreadContext {
    fn thread_id(&self) -> u64;

    fn arch(&self) -> Arch;

    /// Full copy of the current register file.
    fn machine_state(&self) -> MachineState;

    /// Replace the whole register file.
    fn set_machine_state(&mut self, state: &MachineState);

    fn tls_field(&self, slot: TlsSlot) -> Option<&(dyn Any + Send)>;

    fn tls_field_mut(&mut self, slot: TlsSlot) -> Option<&mut (dyn Any + Send)>;

    /// Store `value` in `slot`, returning the previous value.
    fn set_tls_field(&mut self, slot: TlsSlot, value: Option<TlsValue>) -> Option<TlsValue>;
}

/// Callbacks a client installs into the host's event pipeline.
pub trait PipelineClient: Send + Sync {
    fn thread_init(&self, thread: &mut dyn ThreadContext);

    fn thread_exit(&self, thread: &mut dyn ThreadContext);

    /// Called once per block after all instrumentation has been inserted and
    /// before the block is finalized for execution.
    fn bb_post_instrumentation(
        &self,
        thread: &mut dyn ThreadContext,
        bb: &mut InstrList,
        for_trace: bool,
        translating: bool,
    ) -> EmitFlags;
}

/// Process-wide services of the instrumentation engine.
pub trait Host: Send + Sync {
    /// Reserve `count` consecutive note values never handed out again.
    fn reserve_note_range(&self, count: usize) -> Option<Note>;

    fn register_tls_field(&self) -> Option<TlsSlot>;

    fn unregister_tls_field(&self, slot: TlsSlot) -> bool;

    /// Install `client`'s callbacks. Fails if `priority.name` is already taken.
    fn register_client(&self, client: Arc<dyn PipelineClient>, priority: Priority) -> bool;

    fn unregister_client(&self, name: &str) -> bool;
}
