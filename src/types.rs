// src/types.rs

use std::fmt;

/// What to do with the task's containers once the run stage is over.
///
/// - `Cleanup`: stop and remove everything that was created (default).
/// - `DontCleanup`: leave containers behind for inspection and report the
///   commands needed to remove them by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOption {
    Cleanup,
    DontCleanup,
}

impl Default for CleanupOption {
    fn default() -> Self {
        CleanupOption::Cleanup
    }
}

/// Kind of containers the runtime daemon runs. Decides the network driver
/// used for the task network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuntimeType {
    Linux,
    Windows,
}

impl RuntimeType {
    pub fn network_driver(self) -> &'static str {
        match self {
            RuntimeType::Linux => "bridge",
            RuntimeType::Windows => "nat",
        }
    }
}

impl Default for RuntimeType {
    fn default() -> Self {
        RuntimeType::Linux
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeType::Linux => f.write_str("linux"),
            RuntimeType::Windows => f.write_str("windows"),
        }
    }
}

/// Host operating system, used to phrase manual cleanup instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingSystem {
    Windows,
    Other,
}

impl OperatingSystem {
    pub fn current() -> Self {
        if cfg!(windows) {
            OperatingSystem::Windows
        } else {
            OperatingSystem::Other
        }
    }
}
