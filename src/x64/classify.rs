//! x86-64 instruction attribute queries.
//!
//! Thin predicates over iced-x86's decoded instruction info. Memory writes
//! include implicit accesses (stack pushes, calls, string stores), since the
//! side-effect classifier must not miss any write the hardware performs.

use iced_x86::{FlowControl, Instruction, InstructionInfoFactory, Mnemonic, OpAccess};

/// Linux 32-bit system call gate.
const INT_SYSCALL_VECTOR: u8 = 0x80;

/// Whether `insn` may store to memory, explicitly or implicitly.
pub fn writes_memory(insn: &Instruction) -> bool {
    let mut factory = InstructionInfoFactory::new();
    let info = factory.info(insn);
    info.used_memory().iter().any(|mem| {
        matches!(
            mem.access(),
            OpAccess::Write | OpAccess::CondWrite | OpAccess::ReadWrite | OpAccess::ReadCondWrite
        )
    })
}

/// `int n`, `int3`, `int1`, `into`.
pub fn is_interrupt(insn: &Instruction) -> bool {
    insn.flow_control() == FlowControl::Interrupt
}

pub fn is_syscall(insn: &Instruction) -> bool {
    match insn.mnemonic() {
        Mnemonic::Syscall | Mnemonic::Sysenter => true,
        Mnemonic::Int => insn.immediate8() == INT_SYSCALL_VECTOR,
        _ => false,
    }
}

/// Branches, jumps and calls. Returns are reported by [`is_return`].
pub fn is_cti(insn: &Instruction) -> bool {
    let transfers = matches!(
        insn.flow_control(),
        FlowControl::UnconditionalBranch
            | FlowControl::ConditionalBranch
            | FlowControl::IndirectBranch
            | FlowControl::Call
            | FlowControl::IndirectCall
            | FlowControl::XbeginXabortXend
    );
    transfers && !is_syscall(insn)
}

pub fn is_return(insn: &Instruction) -> bool {
    insn.flow_control() == FlowControl::Return
}

#[cfg(test)]
mod tests {
    use super::*;
    use iced_x86::code_asm::*;

    fn one(f: impl FnOnce(&mut CodeAssembler) -> Result<(), iced_x86::IcedError>) -> Instruction {
        let mut a = CodeAssembler::new(64).unwrap();
        f(&mut a).unwrap();
        a.instructions()[0]
    }

    #[test]
    fn test_register_arithmetic_is_pure() {
        let add = one(|a| a.add(rax, rbx));
        assert!(!writes_memory(&add));
        assert!(!is_interrupt(&add));
        assert!(!is_syscall(&add));
        assert!(!is_cti(&add));
        assert!(!is_return(&add));
    }

    #[test]
    fn test_memory_writes() {
        assert!(writes_memory(&one(|a| a.mov(qword_ptr(rsp + 8), rax))));
        assert!(writes_memory(&one(|a| a.add(dword_ptr(rdi), 1))));
        assert!(writes_memory(&one(|a| a.push(rbx))));
        assert!(!writes_memory(&one(|a| a.mov(rax, qword_ptr(rsi)))));
        assert!(!writes_memory(&one(|a| a.lea(rax, qword_ptr(rsi + rdi * 4)))));
    }

    #[test]
    fn test_interrupts_and_syscalls() {
        assert!(is_interrupt(&one(|a| a.int3())));
        assert!(is_syscall(&one(|a| a.syscall())));
        let int80 = one(|a| a.int(0x80));
        assert!(is_syscall(&int80));
        assert!(is_interrupt(&int80));
        assert!(!is_syscall(&one(|a| a.int(0x3))));
    }

    #[test]
    fn test_control_transfers() {
        assert!(is_cti(&one(|a| a.jmp(0x1000u64))));
        assert!(is_cti(&one(|a| a.jne(0x1000u64))));
        assert!(is_cti(&one(|a| a.call(rax))));
        assert!(is_return(&one(|a| a.ret())));
        assert!(!is_cti(&one(|a| a.ret())));
        assert!(!is_cti(&one(|a| a.syscall())));
    }
}
