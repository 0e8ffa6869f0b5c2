//! A deliberately faulty instrumentation client.
//!
//! [`ClobberClient`] plays the role of a buggy tool: it inserts a meta
//! instruction that overwrites one register in front of the last application
//! instruction of every block. Registered at a priority ahead of the checker,
//! the corruption lands in the instrumented region only, which is exactly the
//! kind of fault the checker exists to catch.

use crate::core::host::{EmitFlags, PipelineClient, Priority, ThreadContext};
use crate::core::ilist::InstrList;
use crate::core::instr::Instr;
use crate::x64::clobber_instruction;
use iced_x86::Instruction;

pub struct ClobberClient {
    field: String,
    insn: Instruction,
}

impl ClobberClient {
    /// Default callback slot, ahead of the checker.
    pub const PRIORITY: Priority = Priority::new("clobber", 100);

    /// `None` when the field cannot be targeted by a single instruction.
    pub fn new(field: &str) -> Option<Self> {
        let insn = clobber_instruction(field)?;
        Some(Self {
            field: field.to_ascii_lowercase(),
            insn,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Insert the clobber into `bb`. Returns false for blocks without
    /// application instructions.
    pub fn apply(&self, bb: &mut InstrList) -> bool {
        let Some(last) = bb.last_app().map(Instr::id) else {
            return false;
        };
        bb.insert_before(last, Instr::meta(self.insn)).is_some()
    }
}

impl PipelineClient for ClobberClient {
    fn thread_init(&self, _thread: &mut dyn ThreadContext) {}

    fn thread_exit(&self, _thread: &mut dyn ThreadContext) {}

    fn bb_post_instrumentation(
        &self,
        _thread: &mut dyn ThreadContext,
        bb: &mut InstrList,
        _for_trace: bool,
        _translating: bool,
    ) -> EmitFlags {
        if self.apply(bb) {
            log::trace!("clobbered {} in block", self.field);
        }
        EmitFlags::Default
    }
}
