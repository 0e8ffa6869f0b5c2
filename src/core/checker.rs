// This module defines StateCmp, the owning context of one active checker. It bundles the
// process-wide state the block transform needs (the reserved marker notes, the TLS slot of
// the per-thread snapshot store, the registration priority) and is handed by reference to
// every callback instead of living in globals, so independent checkers can coexist in one
// process. StateCmp::register performs the one-time host registrations and undoes partial
// work on failure; StateCmp::unregister reverses them. As a PipelineClient it allocates and
// frees snapshot stores on thread events and transforms every block after instrumentation:
// side-effect-free blocks are duplicated and get the protocol installed, all others pass
// through unchecked.

//! The checker context and its per-block entry point.

use super::classify::{classify, Eligibility};
use super::config::Config;
use super::duplicate::{duplicate_block, DuplicatedBlockLayout};
use super::error::{SetupError, SetupResult};
use super::host::{EmitFlags, Host, PipelineClient, Priority, ThreadContext, TlsSlot};
use super::ilist::InstrList;
use super::machine::Arch;
use super::markers::MarkerRegistry;
use super::{protocol, store};
use std::fmt::Write as _;
use std::sync::Arc;

/// Outcome of processing one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Duplicated and instrumented with the protocol.
    Checked(DuplicatedBlockLayout),
    /// Passed through unchecked because of a side effect.
    SideEffects(Eligibility),
    /// Nothing to duplicate.
    Empty,
}

/// One active state comparison checker.
#[derive(Debug)]
pub struct StateCmp {
    markers: MarkerRegistry,
    slot: TlsSlot,
    priority: Priority,
    arch: Arch,
}

impl StateCmp {
    /// Perform all host registrations and return the live context.
    pub fn register(host: &dyn Host, config: &Config) -> SetupResult<Arc<StateCmp>> {
        let slot = host
            .register_tls_field()
            .ok_or(SetupError::TlsSlotUnavailable)?;

        let markers = match MarkerRegistry::reserve(host) {
            Ok(markers) => markers,
            Err(e) => {
                host.unregister_tls_field(slot);
                return Err(e);
            }
        };

        let checker = Arc::new(StateCmp {
            markers,
            slot,
            priority: config.priority,
            arch: config.arch,
        });

        if !host.register_client(checker.clone(), config.priority) {
            host.unregister_tls_field(slot);
            return Err(SetupError::ClientRegistration {
                name: config.priority.name,
            });
        }

        log::info!(
            "statecmp registered: tls slot {}, notes from {:#x}, priority {} ({})",
            slot.0,
            markers.base().0,
            config.priority.name,
            config.priority.value
        );
        Ok(checker)
    }

    /// Reverse [`StateCmp::register`].
    pub fn unregister(&self, host: &dyn Host) -> SetupResult<()> {
        if !host.unregister_client(self.priority.name) {
            return Err(SetupError::Unregistration {
                what: "pipeline client",
            });
        }
        if !host.unregister_tls_field(self.slot) {
            return Err(SetupError::Unregistration { what: "tls slot" });
        }
        log::info!("statecmp unregistered");
        Ok(())
    }

    pub fn markers(&self) -> &MarkerRegistry {
        &self.markers
    }

    pub fn tls_slot(&self) -> TlsSlot {
        self.slot
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// Classify `bb` and, when eligible, duplicate it and install the protocol.
    pub fn process_block(&self, bb: &mut InstrList) -> BlockOutcome {
        match classify(bb) {
            Eligibility::Eligible => {}
            side_effects @ Eligibility::SideEffects { effect, .. } => {
                // Blocks with side effects are not checked yet.
                log::debug!("block passes through unchecked: {effect}");
                return BlockOutcome::SideEffects(side_effects);
            }
        }

        let Some(layout) = duplicate_block(&self.markers, bb) else {
            return BlockOutcome::Empty;
        };
        if protocol::install(bb, &layout, self.slot, self.arch).is_none() {
            log::error!("duplicated block lost its markers; protocol not installed");
            return BlockOutcome::Empty;
        }
        log::debug!("block checked: {} instructions after transform", bb.len());
        BlockOutcome::Checked(layout)
    }

    /// Listing of `bb` with markers named.
    pub fn describe(&self, bb: &InstrList) -> String {
        let mut out = String::new();
        for instr in bb.iter() {
            match self.markers.kind_of(instr) {
                Some(kind) => {
                    let _ = writeln!(out, "{}:", kind.name());
                }
                None => {
                    let _ = writeln!(out, "    {}", crate::x64::format::display(instr));
                }
            }
        }
        out
    }
}

impl PipelineClient for StateCmp {
    fn thread_init(&self, thread: &mut dyn ThreadContext) {
        store::thread_init(thread, self.slot);
    }

    fn thread_exit(&self, thread: &mut dyn ThreadContext) {
        store::thread_exit(thread, self.slot);
    }

    fn bb_post_instrumentation(
        &self,
        _thread: &mut dyn ThreadContext,
        bb: &mut InstrList,
        _for_trace: bool,
        _translating: bool,
    ) -> EmitFlags {
        self.process_block(bb);
        EmitFlags::Default
    }
}
