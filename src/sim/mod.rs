// This module provides SimHost, an in-process reference implementation of the host traits.
// It hands out note ranges and TLS slots from bounded pools, keeps registered pipeline
// clients sorted by priority, and drives them the way an instrumentation engine would:
// thread start and exit events, then one post-instrumentation callback per block. Together
// with SimThread, which executes a transformed block on the register-only x86-64
// interpreter, it lets the checker run end to end without a real engine. Capacities and a
// client rejection switch are configurable so setup failures can be provoked.

//! Reference host.

mod clobber;
mod random;
mod thread;

pub use clobber::ClobberClient;
pub use random::{random_state, SplitMix64};
pub use thread::SimThread;

use crate::core::host::{Host, PipelineClient, Priority, TlsSlot};
use crate::core::ilist::InstrList;
use crate::core::instr::Note;
use crate::core::machine::Arch;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// First note value handed out by a fresh host.
pub const NOTE_BASE: usize = 0x1000;

struct Registered {
    priority: Priority,
    client: Arc<dyn PipelineClient>,
}

struct HostState {
    next_note: usize,
    note_end: usize,
    tls_in_use: Vec<bool>,
    clients: Vec<Registered>,
    reject_clients: bool,
}

pub struct SimHost {
    state: Mutex<HostState>,
    next_thread: AtomicU64,
}

impl SimHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState {
                next_note: NOTE_BASE,
                note_end: usize::MAX,
                tls_in_use: vec![false; 64],
                clients: Vec::new(),
                reject_clients: false,
            }),
            next_thread: AtomicU64::new(1),
        }
    }

    /// Limit the total number of notes that can ever be reserved.
    pub fn with_note_capacity(self, count: usize) -> Self {
        {
            let mut state = self.lock();
            state.note_end = state.next_note.saturating_add(count);
        }
        self
    }

    pub fn with_tls_capacity(self, count: usize) -> Self {
        self.lock().tls_in_use = vec![false; count];
        self
    }

    /// Make every subsequent client registration fail.
    pub fn rejecting_clients(self) -> Self {
        self.lock().reject_clients = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the registered clients in callback order.
    ///
    /// Callbacks run on the snapshot so they may re-enter the host.
    fn clients(&self) -> Vec<Arc<dyn PipelineClient>> {
        self.lock().clients.iter().map(|r| r.client.clone()).collect()
    }

    pub fn client_names(&self) -> Vec<&'static str> {
        self.lock().clients.iter().map(|r| r.priority.name).collect()
    }

    pub fn tls_slots_in_use(&self) -> usize {
        self.lock().tls_in_use.iter().filter(|&&used| used).count()
    }

    /// Start a thread and deliver the thread-init event to every client.
    pub fn spawn_thread(&self, arch: Arch) -> SimThread {
        let id = self.next_thread.fetch_add(1, Ordering::Relaxed);
        let mut thread = SimThread::new(id, arch);
        for client in self.clients() {
            client.thread_init(&mut thread);
        }
        log::debug!("thread {id} started ({})", arch.name());
        thread
    }

    /// Deliver the thread-exit event to every client.
    pub fn exit_thread(&self, thread: &mut SimThread) {
        for client in self.clients() {
            client.thread_exit(thread);
        }
        log::debug!("thread {} exited", thread.id());
    }

    /// Run every client's post-instrumentation callback over `bb`.
    pub fn process_block(
        &self,
        thread: &mut SimThread,
        bb: &mut InstrList,
        for_trace: bool,
        translating: bool,
    ) {
        for client in self.clients() {
            client.bb_post_instrumentation(thread, bb, for_trace, translating);
        }
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for SimHost {
    fn reserve_note_range(&self, count: usize) -> Option<Note> {
        let mut state = self.lock();
        let start = state.next_note;
        let end = start.checked_add(count).filter(|&end| end <= state.note_end)?;
        state.next_note = end;
        Some(Note(start))
    }

    fn register_tls_field(&self) -> Option<TlsSlot> {
        let mut state = self.lock();
        let index = state.tls_in_use.iter().position(|&used| !used)?;
        state.tls_in_use[index] = true;
        Some(TlsSlot(index))
    }

    fn unregister_tls_field(&self, slot: TlsSlot) -> bool {
        let mut state = self.lock();
        match state.tls_in_use.get_mut(slot.0) {
            Some(used) if *used => {
                *used = false;
                true
            }
            _ => false,
        }
    }

    fn register_client(&self, client: Arc<dyn PipelineClient>, priority: Priority) -> bool {
        let mut state = self.lock();
        if state.reject_clients || state.clients.iter().any(|r| r.priority.name == priority.name) {
            return false;
        }
        let at = state
            .clients
            .iter()
            .position(|r| r.priority.value > priority.value)
            .unwrap_or(state.clients.len());
        state.clients.insert(at, Registered { priority, client });
        true
    }

    fn unregister_client(&self, name: &str) -> bool {
        let mut state = self.lock();
        let before = state.clients.len();
        state.clients.retain(|r| r.priority.name != name);
        state.clients.len() != before
    }
}
