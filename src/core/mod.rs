// This module holds the architecture-neutral part of the state comparison checker. It
// defines the instruction list model the checker transforms (instr, ilist), the structural
// markers that tag the regions of a duplicated block (markers), the register file model and
// its per-architecture comparison schema (machine), the side-effect classifier (classify),
// the block duplicator (duplicate), the per-thread snapshot store (store), the runtime
// save/restore/compare protocol (protocol), the host collaborator traits (host), and the
// checker context plus its reference-counted activation controller (checker, runtime).
// Instruction-level decoding details live in crate::x64.

//! Core checker infrastructure.
//!
//! # Key Components
//!
//! ## Block model (`instr`, `ilist`, `markers`)
//! - Instructions are application or meta, carry a stable [`InstrId`], and may hold a [`Note`]
//! - Markers are meta labels whose note lies in a range reserved from the host
//!
//! ## Transformation (`classify`, `duplicate`, `protocol`)
//! - Only blocks free of memory writes, interrupts and system calls are duplicated
//! - The duplicate is tagged `ORIG_BB` / `COPY_BB` / `TERM` and receives clean calls
//!
//! ## Runtime (`store`, `machine`)
//! - Two register file snapshots per thread
//! - Schema-driven comparison in a fixed field order
//!
//! ## Lifecycle (`checker`, `runtime`, `host`)
//! - [`StateCmp`] owns everything one active checker needs
//! - [`StateCmpRuntime`] counts activations and tears down on the last release

pub mod checker;
pub mod classify;
pub mod config;
pub mod duplicate;
pub mod error;
pub mod host;
pub mod ilist;
pub mod instr;
pub mod machine;
pub mod markers;
pub mod protocol;
pub mod runtime;
pub mod store;

pub use checker::{BlockOutcome, StateCmp};
pub use classify::{classify, is_side_effect_free, Eligibility, SideEffect};
pub use config::Config;
pub use duplicate::{duplicate_block, DuplicatedBlockLayout};
pub use error::{SetupError, SetupResult, StateMismatch};
pub use host::{EmitFlags, Host, PipelineClient, Priority, ThreadContext, TlsSlot, TlsValue};
pub use ilist::InstrList;
pub use instr::{Instr, InstrId, InstrKind, Note, RuntimeCall};
pub use machine::{compare_states, Arch, FieldLoc, FieldValue, MachineState, StateField};
pub use markers::{MarkerKind, MarkerRegistry};
pub use runtime::{StateCmpRuntime, Status};
pub use store::SnapshotPair;
