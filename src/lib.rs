//! Attach a debugger, in a new terminal, to a process at the moment it crashes.
//!
//! When a watched signal arrives the process forks. The parent allows any process to
//! ptrace it and stops itself; the child execs `xterm -e "gdb _dummy_process_name_ 0x<pid>"`
//! against the parent. Build with the `preload` feature to get a library that arms itself
//! via `LD_PRELOAD`, configured by `JITGDB_*` environment variables.

pub mod command;
pub mod diagnostic;
pub mod error;
pub mod handler;
pub mod install;
pub mod launch;
pub mod policy;

pub use diagnostic::Diagnostic;
pub use error::{Error, Result};
pub use install::{init, install, Installation};
pub use launch::Launcher;
pub use policy::{Override, Policy, Signal, SignalDescriptor};
