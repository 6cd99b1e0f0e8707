//! Startup: read configuration, then register the crash handler.

use std::io::{self, Write};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::handler::{self, on_signal};
use crate::launch::Launcher;
use crate::diagnostic::Diagnostic;
use crate::policy::{Policy, Signal};

/// Result of registering handlers for a policy's watched signals.
#[derive(Debug, Default)]
pub struct Installation {
    installed: Vec<Signal>,
    failed: Vec<Error>,
}

impl Installation {
    /// Signals now routed to the crash handler.
    pub fn installed(&self) -> &[Signal] {
        &self.installed
    }

    /// Watched signals the OS would not let us handle. They keep their prior disposition.
    pub fn failed(&self) -> &[Error] {
        &self.failed
    }
}

/// Freeze `policy` and `launcher`, and register the crash handler for every watched
/// signal.
///
/// May only succeed once per process. Handlers are one-shot: a signal's disposition reverts
/// to the default after its first delivery, so a fault that repeats after an attach attempt
/// terminates the process normally.
pub fn install(policy: Policy, launcher: Launcher) -> Result<Installation> {
    let armed = handler::arm(policy, launcher).ok_or(Error::AlreadyInstalled)?;

    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::SA_RESETHAND | SaFlags::SA_ONSTACK,
        SigSet::empty(),
    );

    let mut installation = Installation::default();

    for desc in armed.policy.watched() {
        let signal = desc.signal();

        // Safety: `on_signal` restricts itself to async-signal-safe calls.
        match unsafe { sigaction(signal, &action) } {
            Ok(_) => {
                info!(signal = desc.name(), "installed crash handler");
                installation.installed.push(signal);
            },
            Err(source) => {
                warn!(signal = desc.name(), %source, "could not install crash handler");
                installation.failed.push(Error::Install { signal, source });
            },
        }
    }

    Ok(installation)
}

/// Configure from the environment, report to stderr, and install.
pub fn init() -> Result<Installation> {
    let (policy, mut diagnostics) = Policy::from_env();
    let (launcher, rejected) = Launcher::from_env()?;
    diagnostics.extend(rejected);

    report(&diagnostics);

    install(policy, launcher)
}

fn report(diagnostics: &[Diagnostic]) {
    let stderr = io::stderr();
    let mut stderr = stderr.lock();

    for diagnostic in diagnostics {
        let _ = writeln!(stderr, "{diagnostic}");
    }
}

#[cfg(feature = "preload")]
#[ctor::ctor]
unsafe fn preload() {
    if let Err(err) = init() {
        let _ = writeln!(io::stderr(), "jitgdb: {err}");
    }
}
