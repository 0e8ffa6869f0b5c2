//! Shared proptest strategies: random register files and random
//! side-effect-free blocks built with the code assembler.

#![allow(dead_code)]

use iced_x86::code_asm::*;
use iced_x86::{IcedError, Instruction};
use proptest::collection::vec;
use proptest::prelude::*;
use statecmp::core::machine::{NUM_EXTRA_SLOTS, NUM_GPR_SLOTS, NUM_SIMD_SLOTS, SIMD_SLOT_BYTES};
use statecmp::core::MachineState;
use statecmp::x64::regs::GP64_REGS;

const XMM: [AsmRegisterXmm; 8] = [xmm0, xmm1, xmm2, xmm3, xmm4, xmm5, xmm6, xmm7];
const K: [AsmRegisterK; 8] = [k0, k1, k2, k3, k4, k5, k6, k7];

/// GP64 register numbers, rsp excluded.
const GPR: [usize; 15] = [0, 1, 2, 3, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Register file with every slot random.
pub fn machine_state() -> impl Strategy<Value = MachineState> {
    (
        vec(any::<u64>(), NUM_GPR_SLOTS),
        any::<u64>(),
        vec(any::<u64>(), NUM_EXTRA_SLOTS),
        any::<u64>(),
        vec(any::<u8>(), NUM_SIMD_SLOTS * SIMD_SLOT_BYTES),
    )
        .prop_map(|(gpr, flags, extra, sp_value, simd)| {
            let mut state = MachineState::zeroed();
            state.gpr.copy_from_slice(&gpr);
            state.flags = flags;
            state.extra.copy_from_slice(&extra);
            state.sp = sp_value;
            for (slot, bytes) in state.simd.iter_mut().zip(simd.chunks(SIMD_SLOT_BYTES)) {
                slot.copy_from_slice(bytes);
            }
            state
        })
}

#[derive(Debug, Clone, Copy)]
pub enum Alu {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Cmp,
    Test,
}

#[derive(Debug, Clone, Copy)]
pub enum Unary {
    Inc,
    Dec,
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy)]
pub enum Simd {
    Movdqa,
    Paddq,
    Pxor,
    Pcmpeqd,
}

/// One register-only application instruction.
#[derive(Debug, Clone, Copy)]
pub enum Op {
    Mov(usize, usize),
    MovImm(usize, i64),
    Alu(Alu, usize, usize),
    AddImm(usize, i32),
    Unary(Unary, usize),
    Lea(usize, usize, usize, i32),
    Xchg(usize, usize),
    Simd(Simd, usize, usize),
    KmovTo(usize, usize),
    KmovFrom(usize, usize),
}

/// Control transfer ending a block, if any.
#[derive(Debug, Clone, Copy)]
pub enum Exit {
    FallThrough,
    Ret,
    Jmp,
    Jne,
}

fn gpr() -> impl Strategy<Value = usize> {
    prop::sample::select(GPR.to_vec())
}

fn xmm() -> impl Strategy<Value = usize> {
    0..XMM.len()
}

fn opmask() -> impl Strategy<Value = usize> {
    0..K.len()
}

fn alu() -> impl Strategy<Value = Alu> {
    prop_oneof![
        Just(Alu::Add),
        Just(Alu::Sub),
        Just(Alu::And),
        Just(Alu::Or),
        Just(Alu::Xor),
        Just(Alu::Cmp),
        Just(Alu::Test),
    ]
}

fn unary() -> impl Strategy<Value = Unary> {
    prop_oneof![
        Just(Unary::Inc),
        Just(Unary::Dec),
        Just(Unary::Neg),
        Just(Unary::Not),
    ]
}

fn simd() -> impl Strategy<Value = Simd> {
    prop_oneof![
        Just(Simd::Movdqa),
        Just(Simd::Paddq),
        Just(Simd::Pxor),
        Just(Simd::Pcmpeqd),
    ]
}

pub fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (gpr(), gpr()).prop_map(|(d, s)| Op::Mov(d, s)),
        (gpr(), any::<i64>()).prop_map(|(d, imm)| Op::MovImm(d, imm)),
        (alu(), gpr(), gpr()).prop_map(|(k, d, s)| Op::Alu(k, d, s)),
        (gpr(), any::<i32>()).prop_map(|(d, imm)| Op::AddImm(d, imm)),
        (unary(), gpr()).prop_map(|(k, d)| Op::Unary(k, d)),
        (gpr(), gpr(), gpr(), any::<i32>()).prop_map(|(d, b, i, disp)| Op::Lea(d, b, i, disp)),
        (gpr(), gpr()).prop_map(|(a, b)| Op::Xchg(a, b)),
        (simd(), xmm(), xmm()).prop_map(|(k, d, s)| Op::Simd(k, d, s)),
        (opmask(), gpr()).prop_map(|(k, s)| Op::KmovTo(k, s)),
        (gpr(), opmask()).prop_map(|(d, k)| Op::KmovFrom(d, k)),
    ]
}

pub fn exit() -> impl Strategy<Value = Exit> {
    prop_oneof![
        Just(Exit::FallThrough),
        Just(Exit::Ret),
        Just(Exit::Jmp),
        Just(Exit::Jne),
    ]
}

fn emit(a: &mut CodeAssembler, op: Op) -> Result<(), IcedError> {
    let r = |n: usize| GP64_REGS[n];
    match op {
        Op::Mov(d, s) => a.mov(r(d), r(s)),
        Op::MovImm(d, imm) => a.mov(r(d), imm),
        Op::Alu(kind, d, s) => match kind {
            Alu::Add => a.add(r(d), r(s)),
            Alu::Sub => a.sub(r(d), r(s)),
            Alu::And => a.and(r(d), r(s)),
            Alu::Or => a.or(r(d), r(s)),
            Alu::Xor => a.xor(r(d), r(s)),
            Alu::Cmp => a.cmp(r(d), r(s)),
            Alu::Test => a.test(r(d), r(s)),
        },
        Op::AddImm(d, imm) => a.add(r(d), imm),
        Op::Unary(kind, d) => match kind {
            Unary::Inc => a.inc(r(d)),
            Unary::Dec => a.dec(r(d)),
            Unary::Neg => a.neg(r(d)),
            Unary::Not => a.not(r(d)),
        },
        Op::Lea(d, b, i, disp) => a.lea(r(d), ptr(r(b) + r(i) * 2 + disp)),
        Op::Xchg(x, y) => a.xchg(r(x), r(y)),
        Op::Simd(kind, d, s) => match kind {
            Simd::Movdqa => a.movdqa(XMM[d], XMM[s]),
            Simd::Paddq => a.paddq(XMM[d], XMM[s]),
            Simd::Pxor => a.pxor(XMM[d], XMM[s]),
            Simd::Pcmpeqd => a.pcmpeqd(XMM[d], XMM[s]),
        },
        Op::KmovTo(k, s) => a.kmovq(K[k], r(s)),
        Op::KmovFrom(d, k) => a.kmovq(r(d), K[k]),
    }
}

/// Assemble `ops` followed by `exit`.
pub fn assemble_block(ops: &[Op], exit: Exit) -> Vec<Instruction> {
    let mut a = CodeAssembler::new(64).unwrap();
    for &op in ops {
        emit(&mut a, op).unwrap();
    }
    match exit {
        Exit::FallThrough => {}
        Exit::Ret => a.ret().unwrap(),
        Exit::Jmp => a.jmp(0x402000u64).unwrap(),
        Exit::Jne => a.jne(0x403000u64).unwrap(),
    }
    a.instructions().to_vec()
}

/// A side-effect-free block of one to `max_ops` instructions plus an optional
/// terminator.
pub fn block(max_ops: usize) -> impl Strategy<Value = Vec<Instruction>> {
    (vec(op(), 1..=max_ops), exit()).prop_map(|(ops, exit)| assemble_block(&ops, exit))
}
