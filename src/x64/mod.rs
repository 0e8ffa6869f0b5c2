//! x86-64 architecture-specific components.
//!
//! This module contains all x86-64 specific code:
//! - Instruction attribute queries over iced-x86 decoded instructions
//! - The register schema used for snapshot comparison
//! - A register-only interpreter used by the reference host
//! - NASM-syntax listings of instruction lists

pub mod classify;
pub mod emu;
pub mod format;
pub mod regs;

pub use emu::{BlockExit, EmulationError, Step};
pub use regs::{clobber_instruction, SCHEMA};
