// This module maps the x86-64 register file onto MachineState. General-purpose registers
// use iced-x86's register numbering (rax=0, rcx=1, rdx=2, rbx=3, rsp=4, rbp=5, rsi=6,
// rdi=7, r8..r15=8..15) for their snapshot slot, except rsp which lives in the dedicated
// stack-pointer field. Opmask registers k0..k7 use the extra register file and vector
// registers xmm/ymm/zmm 0..31 share one 64-byte slot each. SCHEMA fixes the order in which
// fields are compared: rdi, rsi, rbp, rax, rbx, rcx, rdx, r8..r15, rflags, k0..k7, rsp,
// then zmm0..zmm31. Partial-width accesses follow hardware rules: 32-bit writes zero-extend,
// 16- and 8-bit writes merge, and ah/ch/dh/bh address bits 8..15.

//! x86-64 register schema and register access helpers.

use crate::core::machine::{FieldLoc, MachineState, StateField};
use iced_x86::code_asm::*;
use iced_x86::{Instruction, Register};

/// Slot of rsp in iced-x86 numbering; stored in [`MachineState::sp`].
const RSP_NUMBER: usize = 4;

/// Value written by [`clobber_instruction`] into general-purpose registers.
pub const CLOBBER_PATTERN: i64 = 0x5a5a_5a5a_5a5a_5a5a;

/// 64-bit GP registers by iced-x86 register number.
pub const GP64_REGS: [AsmRegister64; 16] = [
    rax, rcx, rdx, rbx, rsp, rbp, rsi, rdi, r8, r9, r10, r11, r12, r13, r14, r15,
];

const XMM_REGS: [AsmRegisterXmm; 16] = [
    xmm0, xmm1, xmm2, xmm3, xmm4, xmm5, xmm6, xmm7, xmm8, xmm9, xmm10, xmm11, xmm12, xmm13,
    xmm14, xmm15,
];

const K_REGS: [AsmRegisterK; 8] = [k0, k1, k2, k3, k4, k5, k6, k7];

const fn gpr(name: &'static str, number: u8) -> StateField {
    StateField::new(name, FieldLoc::Gpr(number))
}

const fn x64_schema() -> [StateField; 57] {
    const ZMM_NAMES: [&str; 32] = [
        "zmm0", "zmm1", "zmm2", "zmm3", "zmm4", "zmm5", "zmm6", "zmm7", "zmm8", "zmm9", "zmm10",
        "zmm11", "zmm12", "zmm13", "zmm14", "zmm15", "zmm16", "zmm17", "zmm18", "zmm19", "zmm20",
        "zmm21", "zmm22", "zmm23", "zmm24", "zmm25", "zmm26", "zmm27", "zmm28", "zmm29", "zmm30",
        "zmm31",
    ];
    const K_NAMES: [&str; 8] = ["k0", "k1", "k2", "k3", "k4", "k5", "k6", "k7"];

    let mut out = [StateField::new("", FieldLoc::Flags); 57];
    out[0] = gpr("rdi", 7);
    out[1] = gpr("rsi", 6);
    out[2] = gpr("rbp", 5);
    out[3] = gpr("rax", 0);
    out[4] = gpr("rbx", 3);
    out[5] = gpr("rcx", 1);
    out[6] = gpr("rdx", 2);
    out[7] = gpr("r8", 8);
    out[8] = gpr("r9", 9);
    out[9] = gpr("r10", 10);
    out[10] = gpr("r11", 11);
    out[11] = gpr("r12", 12);
    out[12] = gpr("r13", 13);
    out[13] = gpr("r14", 14);
    out[14] = gpr("r15", 15);
    out[15] = StateField::new("rflags", FieldLoc::Flags);
    let mut k = 0;
    while k < 8 {
        out[16 + k] = StateField::new(K_NAMES[k], FieldLoc::Extra(k as u8));
        k += 1;
    }
    out[24] = StateField::new("rsp", FieldLoc::Sp);
    let mut z = 0;
    while z < 32 {
        out[25 + z] = StateField::new(ZMM_NAMES[z], FieldLoc::Simd(z as u8));
        z += 1;
    }
    out
}

/// x86-64 comparison order.
pub static SCHEMA: [StateField; 57] = x64_schema();

fn gpr_slot(state: &mut MachineState, number: usize) -> &mut u64 {
    if number == RSP_NUMBER {
        &mut state.sp
    } else {
        &mut state.gpr[number]
    }
}

fn high_byte(reg: Register) -> bool {
    matches!(reg, Register::AH | Register::CH | Register::DH | Register::BH)
}

fn width_mask(bytes: usize) -> u64 {
    if bytes >= 8 {
        u64::MAX
    } else {
        (1u64 << (bytes * 8)) - 1
    }
}

/// Read a general-purpose register of any width.
pub fn read_gpr(state: &MachineState, reg: Register) -> Option<u64> {
    if !reg.is_gpr() {
        return None;
    }
    let number = reg.full_register().number();
    let raw = if number == RSP_NUMBER {
        state.sp
    } else {
        state.gpr[number]
    };
    let shift = if high_byte(reg) { 8 } else { 0 };
    Some((raw >> shift) & width_mask(reg.size()))
}

/// Write a general-purpose register of any width. Returns false if `reg` is
/// not a general-purpose register.
pub fn write_gpr(state: &mut MachineState, reg: Register, value: u64) -> bool {
    if !reg.is_gpr() {
        return false;
    }
    let number = reg.full_register().number();
    let size = reg.size();
    let slot = gpr_slot(state, number);
    match size {
        8 => *slot = value,
        4 => *slot = value & width_mask(4),
        _ => {
            let shift = if high_byte(reg) { 8 } else { 0 };
            let mask = width_mask(size) << shift;
            *slot = (*slot & !mask) | ((value << shift) & mask);
        }
    }
    true
}

/// Opmask register index for k0..k7.
pub fn opmask_index(reg: Register) -> Option<usize> {
    reg.is_k().then(|| reg.number())
}

/// Vector slot and byte width for xmm/ymm/zmm registers.
pub fn vector_slot(reg: Register) -> Option<(usize, usize)> {
    if reg.is_xmm() || reg.is_ymm() || reg.is_zmm() {
        Some((reg.number(), reg.size()))
    } else {
        None
    }
}

/// Build a meta instruction that overwrites the named schema field.
///
/// General-purpose registers and rsp receive [`CLOBBER_PATTERN`], `rflags` is
/// rewritten by a `cmp` that always sets ZF, opmask registers are loaded from
/// `rax` by `kmovq`, and vector registers get all ones in their low 128 bits.
/// Returns `None` for fields that cannot be targeted.
pub fn clobber_instruction(field: &str) -> Option<Instruction> {
    let field = crate::core::machine::find_field(crate::core::Arch::X86_64, field)?;
    let mut a = CodeAssembler::new(64).ok()?;
    match field.loc {
        FieldLoc::Gpr(n) => a.mov(GP64_REGS[n as usize], CLOBBER_PATTERN).ok()?,
        FieldLoc::Sp => a.mov(rsp, CLOBBER_PATTERN).ok()?,
        FieldLoc::Flags => a.cmp(rax, rax).ok()?,
        FieldLoc::Extra(n) if (n as usize) < K_REGS.len() => {
            a.kmovq(K_REGS[n as usize], rax).ok()?
        }
        FieldLoc::Simd(n) if (n as usize) < XMM_REGS.len() => {
            let reg = XMM_REGS[n as usize];
            a.pcmpeqd(reg, reg).ok()?
        }
        _ => return None,
    }
    a.instructions().first().copied()
}
