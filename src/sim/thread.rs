//! Simulated application threads.

use crate::core::host::{ThreadContext, TlsSlot, TlsValue};
use crate::core::ilist::InstrList;
use crate::core::instr::InstrKind;
use crate::core::machine::{Arch, MachineState};
use crate::x64::emu::{self, BlockExit, EmulationError, Step};
use std::any::Any;

/// One application thread with its own register file and TLS slots.
pub struct SimThread {
    id: u64,
    arch: Arch,
    state: MachineState,
    tls: Vec<Option<TlsValue>>,
}

impl SimThread {
    pub fn new(id: u64, arch: Arch) -> Self {
        Self {
            id,
            arch,
            state: MachineState::zeroed(),
            tls: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut MachineState {
        &mut self.state
    }

    /// Execute a (possibly transformed) block from the current state.
    ///
    /// Labels are skipped, clean calls run against this thread, and machine
    /// instructions are interpreted until one transfers control.
    pub fn execute(&mut self, bb: &InstrList) -> Result<BlockExit, EmulationError> {
        if self.arch != Arch::X86_64 {
            return Err(EmulationError::ArchMismatch(self.arch.name()));
        }
        for instr in bb.iter() {
            match instr.kind() {
                InstrKind::Label => {}
                InstrKind::CleanCall(call) => call.invoke(self),
                InstrKind::Machine(insn) => {
                    if let Step::Exit(exit) = emu::step(&mut self.state, insn)? {
                        return Ok(exit);
                    }
                }
            }
        }
        Ok(BlockExit::FallThrough)
    }
}

impl ThreadContext for SimThread {
    fn thread_id(&self) -> u64 {
        self.id
    }

    fn arch(&self) -> Arch {
        self.arch
    }

    fn machine_state(&self) -> MachineState {
        self.state
    }

    fn set_machine_state(&mut self, state: &MachineState) {
        self.state = *state;
    }

    fn tls_field(&self, slot: TlsSlot) -> Option<&(dyn Any + Send)> {
        self.tls.get(slot.0)?.as_deref()
    }

    fn tls_field_mut(&mut self, slot: TlsSlot) -> Option<&mut (dyn Any + Send)> {
        self.tls.get_mut(slot.0)?.as_deref_mut()
    }

    fn set_tls_field(&mut self, slot: TlsSlot, value: Option<TlsValue>) -> Option<TlsValue> {
        if self.tls.len() <= slot.0 {
            self.tls.resize_with(slot.0 + 1, || None);
        }
        std::mem::replace(&mut self.tls[slot.0], value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iced_x86::code_asm::*;

    #[test]
    fn test_execute_until_return() {
        let mut a = CodeAssembler::new(64).unwrap();
        a.mov(rax, 5i64).unwrap();
        a.add(rax, rcx).unwrap();
        a.ret().unwrap();
        a.mov(rax, 0i64).unwrap();
        let bb = InstrList::from_app(a.instructions().iter().copied());

        let mut thread = SimThread::new(1, Arch::X86_64);
        thread.state_mut().gpr[1] = 7;
        assert_eq!(thread.execute(&bb), Ok(BlockExit::Return));
        assert_eq!(thread.state().gpr[0], 12);
    }

    #[test]
    fn test_aarch64_thread_cannot_execute() {
        let mut thread = SimThread::new(1, Arch::AArch64);
        assert_eq!(
            thread.execute(&InstrList::new()),
            Err(EmulationError::ArchMismatch("aarch64"))
        );
    }

    #[test]
    fn test_tls_replace() {
        let mut thread = SimThread::new(1, Arch::X86_64);
        assert!(thread.set_tls_field(TlsSlot(3), Some(Box::new(9u32))).is_none());
        assert_eq!(
            thread.tls_field(TlsSlot(3)).and_then(|v| v.downcast_ref::<u32>()),
            Some(&9)
        );
        assert!(thread.tls_field(TlsSlot(0)).is_none());
        assert!(thread.set_tls_field(TlsSlot(3), None).is_some());
        assert!(thread.tls_field(TlsSlot(3)).is_none());
    }
}
