//! The terminal emulator and debugger started on a crash.
//!
//! All lookups (environment, `PATH`, string validation) happen here, at startup, so the
//! crash path can exec from pre-built, NUL-terminated storage.

use std::env;
use std::ffi::{CString, OsStr, OsString};
use std::fs;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::command::{AttachCommand, CommandTemplate};
use crate::error::{Error, Result};
use crate::diagnostic::Diagnostic;

pub const TERMINAL_VAR: &str = "JITGDB_TERMINAL";
pub const DEBUGGER_VAR: &str = "JITGDB_DEBUGGER";

pub const DEFAULT_TERMINAL: &str = "xterm";
pub const DEFAULT_DEBUGGER: &str = "gdb";

/// Terminal emulator option that runs the rest of the command line.
const EXEC_FLAG: &[u8] = b"-e\0";

/// Argument vector for `execv()`, NULL-terminated.
pub type Argv = [*const libc::c_char; 4];

#[derive(Clone, Debug)]
pub struct Launcher {
    /// Absolute path if the terminal was found at startup, else the name as given.
    terminal: CString,

    /// Whether `terminal` is a path to exec directly, rather than a name to search for.
    resolved: bool,

    template: CommandTemplate,
}

impl Launcher {
    /// Launcher for the given programs, resolving `terminal` against the current `PATH`.
    pub fn new(terminal: impl AsRef<OsStr>, debugger: impl AsRef<OsStr>) -> Result<Self> {
        let path = env::var_os("PATH");
        Self::build(terminal.as_ref(), debugger.as_ref(), path.as_deref())
    }

    /// Defaults adjusted by `JITGDB_TERMINAL` and `JITGDB_DEBUGGER` from the process
    /// environment.
    pub fn from_env() -> Result<(Self, Vec<Diagnostic>)> {
        Self::configure(|var| env::var_os(var))
    }

    /// Like [`from_env()`](Self::from_env), reading variables (`PATH` included) through
    /// `lookup`. An unusable override is reported and its default kept.
    pub fn configure<F>(lookup: F) -> Result<(Self, Vec<Diagnostic>)>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let mut diagnostics = vec![];

        let mut terminal = OsString::from(DEFAULT_TERMINAL);
        let mut debugger = OsString::from(DEFAULT_DEBUGGER);

        if let Some(value) = lookup(TERMINAL_VAR) {
            match check_program(&value) {
                Ok(()) => terminal = value,
                Err(reason) => diagnostics.push(rejected(TERMINAL_VAR, &value, reason)),
            }
        }

        if let Some(value) = lookup(DEBUGGER_VAR) {
            match CommandTemplate::new(value.as_bytes()) {
                Ok(_) => debugger = value,
                Err(reason) => diagnostics.push(rejected(DEBUGGER_VAR, &value, reason)),
            }
        }

        let path = lookup("PATH");
        let launcher = Self::build(&terminal, &debugger, path.as_deref())?;

        Ok((launcher, diagnostics))
    }

    fn build(terminal: &OsStr, debugger: &OsStr, path: Option<&OsStr>) -> Result<Self> {
        let template = CommandTemplate::new(debugger.as_bytes())
            .map_err(|reason| invalid("debugger", debugger, reason))?;

        check_program(terminal).map_err(|reason| invalid("terminal", terminal, reason))?;

        let (program, resolved) = match resolve(terminal, path) {
            Some(found) => {
                debug!(?found, "resolved terminal emulator");
                (found.into_os_string(), true)
            },
            None => {
                warn!(
                    terminal = %terminal.to_string_lossy(),
                    "terminal emulator not found, deferring search to crash time"
                );
                (terminal.to_owned(), false)
            },
        };

        let terminal = CString::new(program.into_vec())
            .map_err(|_| invalid("terminal", terminal, "contains a NUL byte"))?;

        info!(
            terminal = %terminal.to_string_lossy(),
            debugger = %debugger.to_string_lossy(),
            "prepared launcher"
        );

        Ok(Self { terminal, resolved, template })
    }

    pub fn terminal(&self) -> &CString {
        &self.terminal
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn template(&self) -> &CommandTemplate {
        &self.template
    }

    /// `[terminal, "-e", command, NULL]`. Pointers borrow from `self` and `command`.
    ///
    /// Async-signal-safe.
    pub fn argv(&self, command: &AttachCommand) -> Argv {
        [
            self.terminal.as_ptr(),
            EXEC_FLAG.as_ptr().cast(),
            command.as_c_str().as_ptr(),
            std::ptr::null(),
        ]
    }
}

fn check_program(program: &OsStr) -> std::result::Result<(), &'static str> {
    let bytes = program.as_bytes();

    if bytes.is_empty() {
        return Err("program name is empty");
    }

    if bytes.contains(&0) {
        return Err("program name contains a NUL byte");
    }

    Ok(())
}

fn rejected(var: &'static str, value: &OsStr, reason: &'static str) -> Diagnostic {
    let value = value.to_string_lossy().into_owned();
    warn!(var, %value, reason, "ignoring launcher override");
    Diagnostic::Rejected { var, value, reason }
}

fn invalid(setting: &'static str, value: &OsStr, reason: &'static str) -> Error {
    let value = value.to_string_lossy().into_owned();
    Error::Launcher { setting, value, reason }
}

/// Search `path` for `program` the way `execvp()` would, so the crash path need not.
fn resolve(program: &OsStr, path: Option<&OsStr>) -> Option<PathBuf> {
    if program.as_bytes().contains(&b'/') {
        let candidate = Path::new(program);
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    env::split_paths(path?)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
