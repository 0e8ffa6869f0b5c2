//! statecmp - runtime state comparison for dynamic binary instrumentation.
//!
//! The checker duplicates every side-effect-free basic block. At run time the
//! instrumented original executes first, the register file is rewound, and the
//! uninstrumented copy re-executes. Any difference in the resulting machine
//! state was introduced by instrumentation and aborts with a diagnostic naming
//! the first differing register.
//!
//! # Primary Usage
//!
//! ```ignore
//! use statecmp::core::{Config, StateCmpRuntime, Status};
//! use statecmp::sim::SimHost;
//! use std::sync::Arc;
//!
//! let host = Arc::new(SimHost::new());
//! let runtime = StateCmpRuntime::new(host.clone(), Config::default());
//! assert_eq!(runtime.activate(), Status::Success);
//!
//! let mut thread = host.spawn_thread(Arch::X86_64);
//! host.process_block(&mut thread, &mut bb, false, false);
//! thread.execute(&bb)?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Block model, transformation, protocol and lifecycle
//! - [`x64`] - x86-64 instruction queries, register schema and emulator
//! - [`sim`] - Reference host used by the command-line driver and tests

pub mod core;
pub mod sim;
pub mod x64;

pub use self::core::{
    BlockOutcome, Config, Host, InstrList, MachineState, PipelineClient, StateCmp,
    StateCmpRuntime, StateMismatch, Status, ThreadContext,
};
pub use self::sim::{SimHost, SimThread};
