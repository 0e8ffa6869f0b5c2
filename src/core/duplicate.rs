// This module implements the block duplication transform. Given a block whose application
// instructions are interleaved with instrumentation, it builds a stripped copy holding only
// the application instructions and splices it after the original, separated by markers:
//
//   ORIG_BB   original instructions + instrumentation, terminator removed
//   COPY_BB   application instructions only, terminator excluded
//   TERM
//   terminator, if any, now present once
//
// A block that falls through has no terminator, so TERM is the last entry.
//
// Removing the original's terminator makes the instrumented region fall into the copy, so
// one dynamic pass through the block executes the application code twice. The transform
// touches nothing else; instrumentation exists only in the original region.

//! Block duplication.

use super::ilist::InstrList;
use super::instr::InstrId;
use super::markers::{MarkerKind, MarkerRegistry};

/// Marker positions produced by one duplication.
///
/// Only ids are held; the instructions belong to the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicatedBlockLayout {
    pub original_start: InstrId,
    pub copy_start: InstrId,
    pub terminator: InstrId,
    /// Whether the block ended in an explicit control transfer that was
    /// relocated behind the terminator marker.
    pub relocated_terminator: bool,
}

/// Restructure `bb` into original region + copy region joined by markers.
///
/// Returns `None`, leaving `bb` untouched, when the block has no application
/// instruction to duplicate.
pub fn duplicate_block(markers: &MarkerRegistry, bb: &mut InstrList) -> Option<DuplicatedBlockLayout> {
    let first = bb.first()?.id();
    bb.last_app()?;

    let mut copy = bb.clone_list();
    copy.retain(|i| i.is_app());

    let original_start = markers.insert(bb, first, MarkerKind::OriginalStart, true)?;
    let copy_first = copy.first()?.id();
    let copy_start = markers.insert(&mut copy, copy_first, MarkerKind::CopyStart, true)?;

    // TERM goes before the copy's terminator, or after its last instruction
    // when the block falls through.
    let copy_last = copy.last_app()?;
    let copy_last_id = copy_last.id();
    let copy_ends_in_transfer = copy_last.is_terminator();
    let terminator = markers.insert(
        &mut copy,
        copy_last_id,
        MarkerKind::Terminator,
        copy_ends_in_transfer,
    )?;

    let relocated_terminator = match bb.last_app() {
        Some(last) if last.is_terminator() => {
            let id = last.id();
            bb.remove(id);
            true
        }
        _ => false,
    };

    bb.append(&mut copy);
    log::trace!(
        "duplicated block: {} instructions, terminator {}",
        bb.len(),
        if relocated_terminator { "relocated" } else { "none" }
    );

    Some(DuplicatedBlockLayout {
        original_start,
        copy_start,
        terminator,
        relocated_terminator,
    })
}
