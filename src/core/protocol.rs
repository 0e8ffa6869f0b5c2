// This module installs and implements the save/restore/compare protocol. After duplication a
// block carries three markers; the protocol splices clean calls in front of them:
//
//   before ORIG_BB: save the live state into the restore slot
//   before COPY_BB: save the live state into the compare slot, then restore the restore slot
//   before TERM:    compare the live state against the compare slot
//
// At run time this rewinds the register file after the instrumented region so the
// uninstrumented copy re-executes from the identical starting state. Both runs execute the
// same deterministic application code, so any difference at TERM was introduced by the
// instrumentation. A difference is an integrity violation: it is logged and then aborts the
// thread with a panic that names the first differing register.

//! Save/restore/compare protocol.

use super::duplicate::DuplicatedBlockLayout;
use super::host::{ThreadContext, TlsSlot};
use super::ilist::InstrList;
use super::instr::RuntimeCall;
use super::machine::{compare_states, Arch};
use super::store;

/// Runtime call names, as they appear in listings.
pub const SAVE_STATE: &str = "statecmp_save_state";
pub const RESTORE_STATE: &str = "statecmp_restore_state";
pub const COMPARE_STATE: &str = "statecmp_compare_state";

/// Capture the live register file into the restore slot or, when `for_cmp`
/// is set, the compare slot.
pub fn save_state(thread: &mut dyn ThreadContext, slot: TlsSlot, for_cmp: bool) {
    log::trace!("thread {}: save state (for_cmp={for_cmp})", thread.thread_id());
    let state = thread.machine_state();
    let pair = store::pair_mut(thread, slot);
    if for_cmp {
        pair.for_cmp = state;
    } else {
        pair.for_restore = state;
    }
}

/// Rewind the live register file to the restore slot.
pub fn restore_state(thread: &mut dyn ThreadContext, slot: TlsSlot) {
    log::trace!("thread {}: restore state", thread.thread_id());
    let saved = store::pair(thread, slot).for_restore;
    thread.set_machine_state(&saved);
}

/// Compare the live register file (after the uninstrumented re-execution)
/// with the compare slot (after the instrumented execution), using the
/// schema of `arch`.
///
/// # Panics
///
/// Panics with `state mismatch: <field>` when any field differs, and when the
/// thread does not run `arch` code.
pub fn compare_state(thread: &mut dyn ThreadContext, slot: TlsSlot, arch: Arch) {
    assert!(
        thread.arch() == arch,
        "thread {} runs {} code but the checker compares {} state",
        thread.thread_id(),
        thread.arch().name(),
        arch.name()
    );
    let expected = thread.machine_state();
    let instrumented = &store::pair(thread, slot).for_cmp;
    if let Err(mismatch) = compare_states(arch, instrumented, &expected) {
        log::error!("thread {}: {}", thread.thread_id(), mismatch);
        panic!("{mismatch}");
    }
}

fn save_call(slot: TlsSlot, for_cmp: bool) -> RuntimeCall {
    RuntimeCall::new(SAVE_STATE, vec![i64::from(for_cmp)], move |thread, args| {
        save_state(thread, slot, args.first().is_some_and(|&v| v != 0));
    })
}

fn restore_call(slot: TlsSlot) -> RuntimeCall {
    RuntimeCall::new(RESTORE_STATE, Vec::new(), move |thread, _| {
        restore_state(thread, slot);
    })
}

fn compare_call(slot: TlsSlot, arch: Arch) -> RuntimeCall {
    RuntimeCall::new(COMPARE_STATE, Vec::new(), move |thread, _| {
        compare_state(thread, slot, arch);
    })
}

/// Splice the protocol's clean calls in front of the three markers.
///
/// Returns `None`, leaving `bb` untouched, if any marker of `layout` is not
/// in `bb`.
pub fn install(
    bb: &mut InstrList,
    layout: &DuplicatedBlockLayout,
    slot: TlsSlot,
    arch: Arch,
) -> Option<()> {
    let markers = [layout.original_start, layout.copy_start, layout.terminator];
    if !markers.iter().all(|&id| bb.contains(id)) {
        return None;
    }

    // Save state before the original region so the copy can start from it.
    bb.insert_clean_call(layout.original_start, save_call(slot, false))?;

    // Keep the instrumented result, then rewind for the re-execution.
    bb.insert_clean_call(layout.copy_start, save_call(slot, true))?;
    bb.insert_clean_call(layout.copy_start, restore_call(slot))?;

    bb.insert_clean_call(layout.terminator, compare_call(slot, arch))?;
    Some(())
}
