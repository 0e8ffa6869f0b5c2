//! Per-thread snapshot storage.
//!
//! Every application thread owns one [`SnapshotPair`], held in the checker's
//! thread-local storage slot from thread start to thread exit. Only the
//! owning thread ever touches it, so no locking is involved.

use super::host::{ThreadContext, TlsSlot};
use super::machine::MachineState;

/// The two register-file snapshots a thread needs to check one block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SnapshotPair {
    /// State just before the original region ran.
    pub for_restore: MachineState,
    /// State just after the instrumented region ran.
    pub for_cmp: MachineState,
}

/// Allocate a zeroed pair and attach it to `thread`.
pub fn thread_init(thread: &mut dyn ThreadContext, slot: TlsSlot) {
    let previous = thread.set_tls_field(slot, Some(Box::new(SnapshotPair::default())));
    debug_assert!(previous.is_none(), "thread initialized twice");
    log::trace!("thread {}: snapshot store allocated", thread.thread_id());
}

/// Release the pair attached to `thread`.
///
/// # Panics
///
/// Panics if the thread has no pair; exit without a matching init is an
/// internal consistency failure.
pub fn thread_exit(thread: &mut dyn ThreadContext, slot: TlsSlot) {
    let pair = thread.set_tls_field(slot, None);
    assert!(
        pair.is_some_and(|p| p.is::<SnapshotPair>()),
        "thread-local storage should not be empty"
    );
    log::trace!("thread {}: snapshot store released", thread.thread_id());
}

/// The calling thread's pair.
///
/// # Panics
///
/// Panics if the thread was never initialized.
pub fn pair(thread: &dyn ThreadContext, slot: TlsSlot) -> &SnapshotPair {
    thread
        .tls_field(slot)
        .and_then(|v| v.downcast_ref::<SnapshotPair>())
        .unwrap_or_else(|| panic!("thread {} has no snapshot store", thread.thread_id()))
}

/// Mutable access to the calling thread's pair.
///
/// # Panics
///
/// Panics if the thread was never initialized.
pub fn pair_mut(thread: &mut dyn ThreadContext, slot: TlsSlot) -> &mut SnapshotPair {
    let id = thread.thread_id();
    thread
        .tls_field_mut(slot)
        .and_then(|v| v.downcast_mut::<SnapshotPair>())
        .unwrap_or_else(|| panic!("thread {id} has no snapshot store"))
}
