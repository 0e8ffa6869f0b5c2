// This module is a small x86-64 interpreter used by the reference host to execute blocks
// against a MachineState. It covers the register-only subset that side-effect-free blocks
// and typical instrumentation sequences consist of: moves, integer add/sub/logic/compare
// with full arithmetic flag computation, inc/dec/neg/not, lea, xchg, nop, opmask moves, and
// a handful of 128-bit SSE moves and integer ops. Branches, calls and returns end the block
// and are reported to the caller rather than followed. Anything touching memory, and any
// instruction outside the subset, is rejected with an EmulationError instead of being
// approximated, so a test never passes on made-up semantics.

//! Register-only x86-64 interpreter.

use super::regs::{opmask_index, read_gpr, vector_slot, write_gpr};
use crate::core::machine::MachineState;
use iced_x86::{FlowControl, Instruction, Mnemonic, OpKind, Register};
use thiserror::Error;

pub const CF: u64 = 1 << 0;
pub const PF: u64 = 1 << 2;
pub const AF: u64 = 1 << 4;
pub const ZF: u64 = 1 << 6;
pub const SF: u64 = 1 << 7;
pub const OF: u64 = 1 << 11;

/// Flags written by integer arithmetic.
pub const ARITH_FLAGS: u64 = CF | PF | AF | ZF | SF | OF;

/// Errors raised while interpreting an instruction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmulationError {
    #[error("unsupported instruction: {mnemonic:?}")]
    UnsupportedInstruction { mnemonic: Mnemonic },

    #[error("unsupported operand {index} ({kind:?}) of {mnemonic:?}")]
    UnsupportedOperand {
        mnemonic: Mnemonic,
        index: u32,
        kind: OpKind,
    },

    #[error("unsupported register {0:?}")]
    UnsupportedRegister(Register),

    #[error("cannot execute x86-64 code on a {0} thread")]
    ArchMismatch(&'static str),
}

/// How control leaves a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockExit {
    /// Execution ran off the end of the list.
    FallThrough,
    /// A jump, conditional branch or call; `target` is known for direct ones.
    Branch { target: Option<u64> },
    Return,
}

/// Result of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Exit(BlockExit),
}

type EmuResult<T> = Result<T, EmulationError>;

fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

fn sign_bit(bits: u32) -> u64 {
    1u64 << (bits - 1)
}

/// ZF, SF and PF for a result of the given width.
fn result_flags(r: u64, bits: u32) -> u64 {
    let mut flags = 0;
    if r & mask(bits) == 0 {
        flags |= ZF;
    }
    if r & sign_bit(bits) != 0 {
        flags |= SF;
    }
    if (r as u8).count_ones() % 2 == 0 {
        flags |= PF;
    }
    flags
}

fn add_flags(a: u64, b: u64, bits: u32) -> (u64, u64) {
    let m = mask(bits);
    let (a, b) = (a & m, b & m);
    let r = a.wrapping_add(b) & m;
    let mut flags = result_flags(r, bits);
    if r < a {
        flags |= CF;
    }
    if (a ^ r) & (b ^ r) & sign_bit(bits) != 0 {
        flags |= OF;
    }
    if (a ^ b ^ r) & 0x10 != 0 {
        flags |= AF;
    }
    (r, flags)
}

fn sub_flags(a: u64, b: u64, bits: u32) -> (u64, u64) {
    let m = mask(bits);
    let (a, b) = (a & m, b & m);
    let r = a.wrapping_sub(b) & m;
    let mut flags = result_flags(r, bits);
    if a < b {
        flags |= CF;
    }
    if (a ^ b) & (a ^ r) & sign_bit(bits) != 0 {
        flags |= OF;
    }
    if (a ^ b ^ r) & 0x10 != 0 {
        flags |= AF;
    }
    (r, flags)
}

fn logic_flags(r: u64, bits: u32) -> u64 {
    result_flags(r & mask(bits), bits)
}

fn update_flags(state: &mut MachineState, new: u64, affected: u64) {
    state.flags = (state.flags & !affected) | (new & affected);
}

struct Exec<'a> {
    state: &'a mut MachineState,
    insn: &'a Instruction,
}

impl Exec<'_> {
    fn unsupported_operand(&self, index: u32) -> EmulationError {
        EmulationError::UnsupportedOperand {
            mnemonic: self.insn.mnemonic(),
            index,
            kind: self.insn.op_kind(index),
        }
    }

    /// Register operand `index`, or an error for any other operand kind.
    fn reg(&self, index: u32) -> EmuResult<Register> {
        match self.insn.op_kind(index) {
            OpKind::Register => Ok(self.insn.op_register(index)),
            _ => Err(self.unsupported_operand(index)),
        }
    }

    fn read_reg(&self, reg: Register) -> EmuResult<u64> {
        if let Some(v) = read_gpr(self.state, reg) {
            return Ok(v);
        }
        if let Some(k) = opmask_index(reg) {
            return Ok(self.state.extra[k]);
        }
        Err(EmulationError::UnsupportedRegister(reg))
    }

    fn write_reg(&mut self, reg: Register, value: u64) -> EmuResult<()> {
        if write_gpr(self.state, reg, value) {
            return Ok(());
        }
        if let Some(k) = opmask_index(reg) {
            self.state.extra[k] = value;
            return Ok(());
        }
        Err(EmulationError::UnsupportedRegister(reg))
    }

    fn read_operand(&self, index: u32) -> EmuResult<u64> {
        match self.insn.op_kind(index) {
            OpKind::Register => self.read_reg(self.insn.op_register(index)),
            OpKind::Immediate8
            | OpKind::Immediate16
            | OpKind::Immediate32
            | OpKind::Immediate64
            | OpKind::Immediate8to16
            | OpKind::Immediate8to32
            | OpKind::Immediate8to64
            | OpKind::Immediate32to64 => Ok(self.insn.immediate(index)),
            _ => Err(self.unsupported_operand(index)),
        }
    }

    fn dst_bits(&self) -> EmuResult<(Register, u32)> {
        let dst = self.reg(0)?;
        Ok((dst, (dst.size() * 8) as u32))
    }

    fn mov(&mut self) -> EmuResult<()> {
        let dst = self.reg(0)?;
        let value = self.read_operand(1)?;
        self.write_reg(dst, value)
    }

    fn binary(&mut self, mnemonic: Mnemonic) -> EmuResult<()> {
        let (dst, bits) = self.dst_bits()?;
        let a = self.read_reg(dst)?;
        let b = self.read_operand(1)?;
        let (r, flags, writeback) = match mnemonic {
            Mnemonic::Add => {
                let (r, f) = add_flags(a, b, bits);
                (r, f, true)
            }
            Mnemonic::Sub => {
                let (r, f) = sub_flags(a, b, bits);
                (r, f, true)
            }
            Mnemonic::Cmp => {
                let (r, f) = sub_flags(a, b, bits);
                (r, f, false)
            }
            Mnemonic::And => (a & b, logic_flags(a & b, bits), true),
            Mnemonic::Or => (a | b, logic_flags(a | b, bits), true),
            Mnemonic::Xor => (a ^ b, logic_flags(a ^ b, bits), true),
            Mnemonic::Test => (a & b, logic_flags(a & b, bits), false),
            other => return Err(EmulationError::UnsupportedInstruction { mnemonic: other }),
        };
        update_flags(self.state, flags, ARITH_FLAGS);
        if writeback {
            self.write_reg(dst, r)?;
        }
        Ok(())
    }

    fn unary(&mut self, mnemonic: Mnemonic) -> EmuResult<()> {
        let (dst, bits) = self.dst_bits()?;
        let a = self.read_reg(dst)?;
        let r = match mnemonic {
            Mnemonic::Inc => {
                let (r, f) = add_flags(a, 1, bits);
                update_flags(self.state, f, ARITH_FLAGS & !CF);
                r
            }
            Mnemonic::Dec => {
                let (r, f) = sub_flags(a, 1, bits);
                update_flags(self.state, f, ARITH_FLAGS & !CF);
                r
            }
            Mnemonic::Neg => {
                let (r, f) = sub_flags(0, a, bits);
                update_flags(self.state, f, ARITH_FLAGS);
                r
            }
            Mnemonic::Not => !a,
            other => return Err(EmulationError::UnsupportedInstruction { mnemonic: other }),
        };
        self.write_reg(dst, r)
    }

    fn lea(&mut self) -> EmuResult<()> {
        let dst = self.reg(0)?;
        if self.insn.op_kind(1) != OpKind::Memory || self.insn.is_ip_rel_memory_operand() {
            return Err(self.unsupported_operand(1));
        }
        let base = match self.insn.memory_base() {
            Register::None => 0,
            reg => self.read_reg(reg)?,
        };
        let index = match self.insn.memory_index() {
            Register::None => 0,
            reg => self.read_reg(reg)?,
        };
        let scale = u64::from(self.insn.memory_index_scale());
        let addr = base
            .wrapping_add(index.wrapping_mul(scale))
            .wrapping_add(self.insn.memory_displacement64());
        self.write_reg(dst, addr)
    }

    fn xchg(&mut self) -> EmuResult<()> {
        let a = self.reg(0)?;
        let b = self.reg(1)?;
        let va = self.read_reg(a)?;
        let vb = self.read_reg(b)?;
        self.write_reg(a, vb)?;
        self.write_reg(b, va)
    }

    fn xmm_pair(&self) -> EmuResult<(usize, usize)> {
        let slot = |index: u32| -> EmuResult<usize> {
            let reg = self.reg(index)?;
            match vector_slot(reg) {
                Some((n, 16)) => Ok(n),
                _ => Err(EmulationError::UnsupportedRegister(reg)),
            }
        };
        Ok((slot(0)?, slot(1)?))
    }

    fn vector(&mut self, mnemonic: Mnemonic) -> EmuResult<()> {
        let (dst, src) = self.xmm_pair()?;
        let s: [u8; 16] = low_lane(&self.state.simd[src]);
        let d: [u8; 16] = low_lane(&self.state.simd[dst]);
        let out: [u8; 16] = match mnemonic {
            Mnemonic::Movdqa | Mnemonic::Movdqu | Mnemonic::Movaps | Mnemonic::Movups => s,
            Mnemonic::Pxor | Mnemonic::Xorps => std::array::from_fn(|i| d[i] ^ s[i]),
            Mnemonic::Paddq => {
                let lo = qword(&d, 0).wrapping_add(qword(&s, 0));
                let hi = qword(&d, 1).wrapping_add(qword(&s, 1));
                let mut out = [0u8; 16];
                out[..8].copy_from_slice(&lo.to_le_bytes());
                out[8..].copy_from_slice(&hi.to_le_bytes());
                out
            }
            Mnemonic::Pcmpeqd => {
                let mut out = [0u8; 16];
                for lane in 0..4 {
                    let r = lane * 4..lane * 4 + 4;
                    if d[r.clone()] == s[r.clone()] {
                        out[r].fill(0xff);
                    }
                }
                out
            }
            other => return Err(EmulationError::UnsupportedInstruction { mnemonic: other }),
        };
        // Legacy SSE encodings leave bits 128 and up untouched.
        self.state.simd[dst][..16].copy_from_slice(&out);
        Ok(())
    }
}

fn low_lane(slot: &[u8; 64]) -> [u8; 16] {
    std::array::from_fn(|i| slot[i])
}

fn qword(lane: &[u8; 16], n: usize) -> u64 {
    u64::from_le_bytes(std::array::from_fn(|i| lane[n * 8 + i]))
}

/// Execute a single instruction against `state`.
pub fn step(state: &mut MachineState, insn: &Instruction) -> Result<Step, EmulationError> {
    match insn.flow_control() {
        FlowControl::Next => {}
        FlowControl::Return => return Ok(Step::Exit(BlockExit::Return)),
        FlowControl::UnconditionalBranch | FlowControl::ConditionalBranch | FlowControl::Call => {
            let target = match insn.op_kind(0) {
                OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
                    Some(insn.near_branch_target())
                }
                _ => None,
            };
            return Ok(Step::Exit(BlockExit::Branch { target }));
        }
        FlowControl::IndirectBranch | FlowControl::IndirectCall => {
            return Ok(Step::Exit(BlockExit::Branch { target: None }));
        }
        _ => {
            return Err(EmulationError::UnsupportedInstruction {
                mnemonic: insn.mnemonic(),
            })
        }
    }

    let mut exec = Exec { state, insn };
    let mnemonic = insn.mnemonic();
    match mnemonic {
        Mnemonic::Nop => Ok(()),
        Mnemonic::Mov | Mnemonic::Kmovq => exec.mov(),
        Mnemonic::Add
        | Mnemonic::Sub
        | Mnemonic::Cmp
        | Mnemonic::And
        | Mnemonic::Or
        | Mnemonic::Xor
        | Mnemonic::Test => exec.binary(mnemonic),
        Mnemonic::Inc | Mnemonic::Dec | Mnemonic::Neg | Mnemonic::Not => exec.unary(mnemonic),
        Mnemonic::Lea => exec.lea(),
        Mnemonic::Xchg => exec.xchg(),
        Mnemonic::Movdqa
        | Mnemonic::Movdqu
        | Mnemonic::Movaps
        | Mnemonic::Movups
        | Mnemonic::Pxor
        | Mnemonic::Xorps
        | Mnemonic::Paddq
        | Mnemonic::Pcmpeqd => exec.vector(mnemonic),
        other => Err(EmulationError::UnsupportedInstruction { mnemonic: other }),
    }?;
    Ok(Step::Continue)
}
