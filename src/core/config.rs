//! Checker configuration.

use super::host::Priority;
use super::machine::Arch;

/// Name under which the checker registers its pipeline callbacks.
pub const PRIORITY_NAME: &str = "statecmp";

/// Runs after every other post-instrumentation client, so the checker sees
/// the final instrumented block.
pub const PRIORITY_VALUE: i32 = 7500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Register schema used for comparisons.
    pub arch: Arch,
    pub priority: Priority,
}

impl Config {
    pub fn new(arch: Arch) -> Self {
        Self {
            arch,
            priority: Priority::new(PRIORITY_NAME, PRIORITY_VALUE),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Arch::host())
    }
}
