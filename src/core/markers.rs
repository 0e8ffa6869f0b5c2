// This module owns the structural labels the duplicator inserts into a block. Three marker
// kinds exist (start of the original region, start of the copy region, and the logical end
// of the copy region). At activation the registry reserves one contiguous range of note
// values from the host, one value per kind, and from then on a marker is simply a meta label
// whose note equals base + kind. The registry is immutable after construction, so it is
// shared freely between block-processing threads.

//! Marker registry.

use super::error::SetupError;
use super::host::Host;
use super::ilist::InstrList;
use super::instr::{Instr, InstrId, Note};

/// Structural position tags, in the order they appear in a duplicated block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// Beginning of the original (instrumented) region.
    OriginalStart,
    /// Beginning of the uninstrumented copy region.
    CopyStart,
    /// Logical end of the copy region; precedes the relocated terminator.
    Terminator,
}

impl MarkerKind {
    pub const COUNT: usize = 3;

    pub const ALL: [MarkerKind; Self::COUNT] = [
        MarkerKind::OriginalStart,
        MarkerKind::CopyStart,
        MarkerKind::Terminator,
    ];

    fn offset(self) -> usize {
        match self {
            MarkerKind::OriginalStart => 0,
            MarkerKind::CopyStart => 1,
            MarkerKind::Terminator => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MarkerKind::OriginalStart => "ORIG_BB",
            MarkerKind::CopyStart => "COPY_BB",
            MarkerKind::Terminator => "TERM",
        }
    }
}

/// Reserved note range for the three marker kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerRegistry {
    base: Note,
}

impl MarkerRegistry {
    /// Reserve the marker notes from the host.
    pub fn reserve(host: &dyn Host) -> Result<Self, SetupError> {
        let base = host
            .reserve_note_range(MarkerKind::COUNT)
            .ok_or(SetupError::NoteSpaceExhausted {
                requested: MarkerKind::COUNT,
            })?;
        log::debug!("reserved marker notes {}..{}", base.0, base.0 + MarkerKind::COUNT);
        Ok(Self { base })
    }

    /// Registry over an already reserved range starting at `base`.
    pub fn with_base(base: Note) -> Self {
        Self { base }
    }

    pub fn base(&self) -> Note {
        self.base
    }

    /// Note value identifying markers of `kind`.
    pub fn label(&self, kind: MarkerKind) -> Note {
        Note(self.base.0 + kind.offset())
    }

    /// Whether `instr` is a marker of `kind`.
    pub fn matches(&self, instr: &Instr, kind: MarkerKind) -> bool {
        instr.note() == Some(self.label(kind))
    }

    /// Decode the marker kind carried by `instr`, if any.
    pub fn kind_of(&self, instr: &Instr) -> Option<MarkerKind> {
        let note = instr.note()?;
        MarkerKind::ALL.into_iter().find(|&k| self.label(k) == note)
    }

    /// Build a meta label tagged as `kind`.
    pub fn make_label(&self, kind: MarkerKind) -> Instr {
        let mut label = Instr::label();
        label.set_note(self.label(kind));
        label
    }

    /// Insert a `kind` label before (`preinsert`) or after `at`.
    pub fn insert(
        &self,
        list: &mut InstrList,
        at: InstrId,
        kind: MarkerKind,
        preinsert: bool,
    ) -> Option<InstrId> {
        let label = self.make_label(kind);
        if preinsert {
            list.insert_before(at, label)
        } else {
            list.insert_after(at, label)
        }
    }

    /// Markers present in `list`, left to right.
    pub fn scan(&self, list: &InstrList) -> Vec<(InstrId, MarkerKind)> {
        list.iter()
            .filter_map(|i| self.kind_of(i).map(|k| (i.id(), k)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_contiguous() {
        let reg = MarkerRegistry::with_base(Note(100));
        assert_eq!(reg.label(MarkerKind::OriginalStart), Note(100));
        assert_eq!(reg.label(MarkerKind::CopyStart), Note(101));
        assert_eq!(reg.label(MarkerKind::Terminator), Note(102));
    }

    #[test]
    fn test_match_and_decode() {
        let reg = MarkerRegistry::with_base(Note(40));
        let label = reg.make_label(MarkerKind::CopyStart);
        assert!(label.is_label());
        assert!(label.is_meta());
        assert!(reg.matches(&label, MarkerKind::CopyStart));
        assert!(!reg.matches(&label, MarkerKind::Terminator));
        assert_eq!(reg.kind_of(&label), Some(MarkerKind::CopyStart));

        let foreign = MarkerRegistry::with_base(Note(80));
        assert_eq!(foreign.kind_of(&label), None);
        assert_eq!(reg.kind_of(&Instr::label()), None);
    }
}
