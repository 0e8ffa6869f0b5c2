//! Listing output for instruction lists (NASM syntax).

use crate::core::instr::{Instr, InstrKind};
use iced_x86::{Formatter, NasmFormatter};
use std::fmt;

/// Write one instruction as `app|meta <text>`.
pub fn write_instr(f: &mut fmt::Formatter<'_>, instr: &Instr) -> fmt::Result {
    let origin = if instr.is_app() { "app " } else { "meta" };
    match instr.kind() {
        InstrKind::Machine(insn) => {
            let mut text = String::new();
            NasmFormatter::new().format(insn, &mut text);
            write!(f, "{origin}  {text}")
        }
        InstrKind::Label => match instr.note() {
            Some(note) => write!(f, "{origin}  label <note {:#x}>", note.0),
            None => write!(f, "{origin}  label"),
        },
        InstrKind::CleanCall(call) => write!(f, "{origin}  call {}{:?}", call.name(), call.args()),
    }
}

/// [`fmt::Display`] adapter for a single instruction.
pub struct DisplayInstr<'a>(&'a Instr);

impl fmt::Display for DisplayInstr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_instr(f, self.0)
    }
}

pub fn display(instr: &Instr) -> DisplayInstr<'_> {
    DisplayInstr(instr)
}
