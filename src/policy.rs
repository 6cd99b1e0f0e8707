//! Which signals trigger a debugger attach, and how the environment adjusts that.

use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

use tracing::{debug, info, warn};

use crate::diagnostic::Diagnostic;

/// POSIX signal.
pub use nix::sys::signal::Signal;

/// Prefix of the per-signal override variables, e.g. `JITGDB_SIGSEGV`.
pub const ENV_PREFIX: &str = "JITGDB_";

/// Number of signals in the policy table.
pub const SIGNAL_COUNT: usize = 12;

macro_rules! descriptor {
    ($signal: ident, $watched: expr) => {
        SignalDescriptor {
            signal: Signal::$signal,
            var: concat!("JITGDB_", stringify!($signal)),
            watched: $watched,
        }
    };
}

/// Compiled-in policy. Only the signals that usually mean memory or state corruption are
/// watched by default; the rest are available to opt in to.
const DEFAULT_TABLE: [SignalDescriptor; SIGNAL_COUNT] = [
    descriptor!(SIGSEGV, true),
    descriptor!(SIGABRT, true),
    descriptor!(SIGHUP, false),
    descriptor!(SIGINT, false),
    descriptor!(SIGQUIT, false),
    descriptor!(SIGILL, false),
    descriptor!(SIGFPE, false),
    descriptor!(SIGPIPE, false),
    descriptor!(SIGALRM, false),
    descriptor!(SIGTERM, false),
    descriptor!(SIGUSR1, false),
    descriptor!(SIGUSR2, false),
];

/// One entry of the policy table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SignalDescriptor {
    signal: Signal,

    /// Name of the environment variable that overrides `watched`.
    var: &'static str,

    watched: bool,
}

impl SignalDescriptor {
    pub fn signal(&self) -> Signal {
        self.signal
    }

    /// Symbolic name of the signal, e.g. `SIGSEGV`.
    pub fn name(&self) -> &'static str {
        self.signal.as_str()
    }

    pub fn var(&self) -> &'static str {
        self.var
    }

    pub fn watched(&self) -> bool {
        self.watched
    }

    fn raw(&self) -> libc::c_int {
        self.signal as libc::c_int
    }
}

/// Interpretation of a single override variable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Override {
    /// Variable absent, keep the default.
    Unset,

    /// Leading `t` or `T`.
    Watch,

    /// Leading `f` or `F`.
    Unwatch,

    /// Anything else. Holds the offending value, lossily decoded.
    Unrecognized(String),
}

impl Override {
    /// Only the first character is significant, case-insensitively, so `true`, `T`, and
    /// `Totally` all watch.
    pub fn parse(value: Option<&OsStr>) -> Self {
        let value = match value {
            Some(value) => value,
            None => return Override::Unset,
        };

        match value.as_bytes().first() {
            Some(b't') | Some(b'T') => Override::Watch,
            Some(b'f') | Some(b'F') => Override::Unwatch,
            _ => Override::Unrecognized(value.to_string_lossy().into_owned()),
        }
    }
}

/// Fixed, ordered table of signal descriptors.
///
/// The same value is used to register handlers and, once frozen by
/// [`install()`](crate::install), to decide inside the handler whether a delivered signal
/// is ours.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Policy {
    descriptors: [SignalDescriptor; SIGNAL_COUNT],
}

impl Default for Policy {
    fn default() -> Self {
        Self { descriptors: DEFAULT_TABLE }
    }
}

impl Policy {
    /// Compiled-in defaults adjusted by the process environment.
    pub fn from_env() -> (Self, Vec<Diagnostic>) {
        let mut policy = Self::default();
        let diagnostics = policy.configure(|var| std::env::var_os(var));
        (policy, diagnostics)
    }

    /// Apply the override variable of every descriptor, as found by `lookup`.
    pub fn configure<F>(&mut self, lookup: F) -> Vec<Diagnostic>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let mut diagnostics = vec![];

        for desc in self.descriptors.iter_mut() {
            let value = lookup(desc.var);

            match Override::parse(value.as_deref()) {
                Override::Unset => {
                    debug!(var = desc.var, watched = desc.watched, "no override, keeping default");
                },
                Override::Watch => {
                    info!(var = desc.var, "watching signal");
                    desc.watched = true;
                    diagnostics.push(Diagnostic::Watched { var: desc.var });
                },
                Override::Unwatch => {
                    info!(var = desc.var, "not watching signal");
                    desc.watched = false;
                    diagnostics.push(Diagnostic::Unwatched { var: desc.var });
                },
                Override::Unrecognized(value) => {
                    warn!(var = desc.var, %value, "unrecognized override, keeping default");
                    diagnostics.push(Diagnostic::Unrecognized { var: desc.var, value });
                },
            }
        }

        diagnostics
    }

    pub fn descriptors(&self) -> &[SignalDescriptor] {
        &self.descriptors
    }

    pub fn watched(&self) -> impl Iterator<Item = &SignalDescriptor> {
        self.descriptors.iter().filter(|d| d.watched)
    }

    /// Descriptor for a raw OS signal number.
    ///
    /// Called from signal context: scans the fixed array in place and never allocates.
    pub fn lookup(&self, signo: libc::c_int) -> Option<&SignalDescriptor> {
        self.descriptors.iter().find(|d| d.raw() == signo)
    }

    /// Whether `signo` is in the table and marked watched.
    pub fn is_watched(&self, signo: libc::c_int) -> bool {
        self.lookup(signo).map_or(false, |d| d.watched)
    }

    /// Set the watched flag of `signal`. Returns `false` if the table has no such signal.
    pub fn set_watched(&mut self, signal: Signal, watched: bool) -> bool {
        match self.descriptors.iter_mut().find(|d| d.signal == signal) {
            Some(desc) => {
                desc.watched = watched;
                true
            },
            None => false,
        }
    }
}
