//! The signal handler: fork, let the parent be traced and stop, exec a debugger in the child.
//!
//! Nothing in this module may allocate, lock, log, or format once a signal has been
//! delivered. The process may have crashed inside the allocator or stdio, and re-entering
//! either would hang or corrupt it further. Every failure therefore ends the attempt
//! quietly.

use std::sync::OnceLock;

use nix::{
    sys::signal::{raise, Signal},
    unistd::{fork, getppid, ForkResult},
};

use crate::command::AttachCommand;
use crate::launch::Launcher;
use crate::policy::Policy;

/// Exit status of the forked child when neither program could be exec'd.
pub const EXEC_FAILED_STATUS: libc::c_int = 127;

/// `prctl(PR_SET_PTRACER)` argument allowing any process to attach.
const PR_SET_PTRACER_ANY: libc::c_ulong = !0;

/// Configuration frozen at install time, read-only for the life of the process.
static ARMED: OnceLock<Armed> = OnceLock::new();

#[derive(Debug)]
pub(crate) struct Armed {
    pub(crate) policy: Policy,
    pub(crate) launcher: Launcher,
}

/// Store the configuration the handler will read. Returns `None` if already armed.
pub(crate) fn arm(policy: Policy, launcher: Launcher) -> Option<&'static Armed> {
    ARMED.set(Armed { policy, launcher }).ok()?;
    ARMED.get()
}

/// Which side of `fork()` the caller is on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fork {
    Parent { child: libc::pid_t },
    Child,
}

/// How a call to [`handle()`] ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Not a watched signal; nothing was done.
    Ignored,

    /// No child could be created; nothing else was done.
    ForkFailed,

    /// In the parent, after being resumed from its self-stop.
    Resumed,

    /// In the child, after the exec returned. The caller must exit.
    ExecFailed,
}

/// Process-control primitives used by the handler.
///
/// Implementations must be async-signal-safe.
pub trait Process {
    fn fork(&mut self) -> Option<Fork>;

    /// Let any process ptrace the caller.
    fn allow_any_ptracer(&mut self);

    /// Stop the caller until it is continued externally.
    fn stop_self(&mut self);

    fn parent_pid(&mut self) -> libc::pid_t;

    /// Replace the process image. Only returns on failure.
    fn exec(&mut self, launcher: &Launcher, command: &AttachCommand);
}

/// The running process, driven through raw system calls.
#[derive(Clone, Copy, Debug, Default)]
pub struct Os;

impl Process for Os {
    fn fork(&mut self) -> Option<Fork> {
        // Safety: the child only makes the async-signal-safe calls in this impl.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => Some(Fork::Parent { child: child.as_raw() }),
            Ok(ForkResult::Child) => Some(Fork::Child),
            Err(_) => None,
        }
    }

    fn allow_any_ptracer(&mut self) {
        // Fails without Yama, where any same-uid process may attach anyway.
        unsafe {
            let unused: libc::c_ulong = 0;
            libc::prctl(libc::PR_SET_PTRACER, PR_SET_PTRACER_ANY, unused, unused, unused);
        }
    }

    fn stop_self(&mut self) {
        let _ = raise(Signal::SIGSTOP);
    }

    fn parent_pid(&mut self) -> libc::pid_t {
        getppid().as_raw()
    }

    fn exec(&mut self, launcher: &Launcher, command: &AttachCommand) {
        // Use `libc` directly: the `nix` exec wrappers collect their arguments into a `Vec`.
        let argv = launcher.argv(command);

        unsafe {
            if launcher.is_resolved() {
                libc::execv(argv[0], argv.as_ptr());
            } else {
                // Deliberately breaks the no-lookup rule: `execvp` reads `PATH` here. Only
                // reached when the terminal was not found at startup, and still the best
                // remaining chance of launching it.
                libc::execvp(argv[0], argv.as_ptr());
            }
        }
    }
}

/// Run the attach sequence for `signo` against `process`.
///
/// Unwatched signals return [`Outcome::Ignored`] before any call on `process`.
pub fn handle<P: Process>(
    process: &mut P,
    policy: &Policy,
    launcher: &Launcher,
    signo: libc::c_int,
) -> Outcome {
    if !policy.is_watched(signo) {
        return Outcome::Ignored;
    }

    match process.fork() {
        None => Outcome::ForkFailed,
        Some(Fork::Parent { .. }) => {
            process.allow_any_ptracer();

            // Wait here for the debugger started by the child.
            process.stop_self();

            Outcome::Resumed
        },
        Some(Fork::Child) => {
            let target = process.parent_pid();
            let command = launcher.template().render(target);

            process.exec(launcher, &command);

            Outcome::ExecFailed
        },
    }
}

/// Signal handler registered by [`install()`](crate::install).
pub(crate) extern "C" fn on_signal(signo: libc::c_int) {
    let armed = match ARMED.get() {
        Some(armed) => armed,
        None => return,
    };

    if handle(&mut Os, &armed.policy, &armed.launcher, signo) == Outcome::ExecFailed {
        // Skip atexit handlers and stdio flushing in the forked copy.
        unsafe { libc::_exit(EXEC_FAILED_STATUS) };
    }
}
