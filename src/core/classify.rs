//! Side-effect classification of blocks.
//!
//! A block is eligible for duplicate-and-compare checking only when none of
//! its application instructions writes memory, raises an interrupt or issues
//! a system call: re-executing such an instruction could repeat an effect
//! that is not idempotent. Instrumentation instructions are not considered,
//! since they never run in the copy region.

use super::ilist::InstrList;
use super::instr::{Instr, InstrId};
use std::fmt;

/// Why an instruction disqualifies its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    MemoryWrite,
    Interrupt,
    Syscall,
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SideEffect::MemoryWrite => "memory write",
            SideEffect::Interrupt => "interrupt",
            SideEffect::Syscall => "system call",
        };
        f.write_str(s)
    }
}

/// Classification outcome for one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// First offending application instruction and its effect.
    SideEffects { at: InstrId, effect: SideEffect },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// Effect of `instr` that rules out re-execution, if any.
pub fn side_effect(instr: &Instr) -> Option<SideEffect> {
    if instr.is_syscall() {
        Some(SideEffect::Syscall)
    } else if instr.is_interrupt() {
        Some(SideEffect::Interrupt)
    } else if instr.writes_memory() {
        Some(SideEffect::MemoryWrite)
    } else {
        None
    }
}

/// Classify the application instructions of `bb`.
pub fn classify(bb: &InstrList) -> Eligibility {
    bb.iter_app()
        .find_map(|i| side_effect(i).map(|effect| Eligibility::SideEffects { at: i.id(), effect }))
        .unwrap_or(Eligibility::Eligible)
}

pub fn is_side_effect_free(bb: &InstrList) -> bool {
    classify(bb).is_eligible()
}

#[cfg(test)]
mod tests {
    use super::*;
    use iced_x86::code_asm::*;

    fn block(f: impl FnOnce(&mut CodeAssembler) -> Result<(), iced_x86::IcedError>) -> InstrList {
        let mut a = CodeAssembler::new(64).unwrap();
        f(&mut a).unwrap();
        InstrList::from_app(a.instructions().iter().copied())
    }

    #[test]
    fn test_arithmetic_block_is_eligible() {
        let bb = block(|a| {
            a.mov(rax, rbx)?;
            a.add(rax, 8)?;
            a.xor(ecx, ecx)?;
            a.ret()
        });
        assert_eq!(classify(&bb), Eligibility::Eligible);
        assert!(is_side_effect_free(&bb));
    }

    #[test]
    fn test_store_disqualifies() {
        let bb = block(|a| {
            a.mov(rax, rbx)?;
            a.mov(qword_ptr(rdi), rax)?;
            a.ret()
        });
        let store = bb.iter().nth(1).unwrap().id();
        assert_eq!(
            classify(&bb),
            Eligibility::SideEffects {
                at: store,
                effect: SideEffect::MemoryWrite
            }
        );
    }

    #[test]
    fn test_syscall_and_interrupt() {
        let sys = block(|a| a.syscall());
        assert!(matches!(
            classify(&sys),
            Eligibility::SideEffects {
                effect: SideEffect::Syscall,
                ..
            }
        ));
        let trap = block(|a| a.int3());
        assert!(matches!(
            classify(&trap),
            Eligibility::SideEffects {
                effect: SideEffect::Interrupt,
                ..
            }
        ));
    }

    #[test]
    fn test_meta_stores_are_ignored() {
        let mut bb = block(|a| {
            a.inc(rax)?;
            a.ret()
        });
        let mut a = CodeAssembler::new(64).unwrap();
        a.mov(qword_ptr(rsp - 8), rax).unwrap();
        let first = bb.first().unwrap().id();
        bb.insert_before(first, Instr::meta(a.instructions()[0]));
        assert!(is_side_effect_free(&bb));
    }
}
