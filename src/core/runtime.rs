// This module is the host-facing activation controller. A StateCmpRuntime pairs a host with
// an activation count and the live checker context. The first activate() performs the
// one-time registration and later ones only bump the count and report that the checker is
// already initialized. deactivate() decrements; the call that reaches zero tears the
// checker down and reports success, other calls report not-initialized, and the count never
// drops below zero. Every count change happens under the lock guarding the live context, so
// a registration or teardown in progress is never observed half done by another caller.
// Setup failures are surfaced as Status::Error after rolling back the partial registrations;
// the count is left untouched.

//! Reference-counted activation.

use super::checker::StateCmp;
use super::config::Config;
use super::host::Host;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Result of [`StateCmpRuntime::activate`] and [`StateCmpRuntime::deactivate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    /// Activation found the checker already set up; only the count changed.
    AlreadyInitialized,
    /// Deactivation did not tear the checker down.
    NotInitialized,
    /// A registration step failed.
    Error,
}

/// Owner of one checker's activation lifecycle on one host.
pub struct StateCmpRuntime<H: Host> {
    host: Arc<H>,
    config: Config,
    init_count: AtomicUsize,
    active: Mutex<Option<Arc<StateCmp>>>,
}

impl<H: Host> StateCmpRuntime<H> {
    pub fn new(host: Arc<H>, config: Config) -> Self {
        Self {
            host,
            config,
            init_count: AtomicUsize::new(0),
            active: Mutex::new(None),
        }
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<StateCmp>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The live checker, if activated.
    pub fn checker(&self) -> Option<Arc<StateCmp>> {
        self.slot().clone()
    }

    pub fn activation_count(&self) -> usize {
        self.init_count.load(Ordering::Acquire)
    }

    pub fn activate(&self) -> Status {
        let mut active = self.slot();
        let previous = self.init_count.load(Ordering::Acquire);
        if previous != 0 {
            self.init_count.store(previous + 1, Ordering::Release);
            return Status::AlreadyInitialized;
        }

        match StateCmp::register(self.host.as_ref(), &self.config) {
            Ok(checker) => {
                *active = Some(checker);
                self.init_count.store(1, Ordering::Release);
                Status::Success
            }
            Err(e) => {
                log::error!("statecmp activation failed: {e}");
                Status::Error
            }
        }
    }

    pub fn deactivate(&self) -> Status {
        let mut active = self.slot();
        let Some(remaining) = self.init_count.load(Ordering::Acquire).checked_sub(1) else {
            return Status::NotInitialized;
        };
        self.init_count.store(remaining, Ordering::Release);
        if remaining != 0 {
            return Status::NotInitialized;
        }

        let Some(checker) = active.take() else {
            return Status::NotInitialized;
        };
        match checker.unregister(self.host.as_ref()) {
            Ok(()) => Status::Success,
            Err(e) => {
                log::error!("statecmp teardown failed: {e}");
                Status::Error
            }
        }
    }
}
