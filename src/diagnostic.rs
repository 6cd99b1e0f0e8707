//! Notes about configuration, printed to stderr by [`init()`](crate::init).

use std::fmt;

/// Human-readable note produced while reading configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Diagnostic {
    /// A signal override switched watching on.
    Watched { var: &'static str },

    /// A signal override switched watching off.
    Unwatched { var: &'static str },

    /// A signal override that is neither true nor false. The default was kept.
    Unrecognized { var: &'static str, value: String },

    /// A launcher setting that could not be used. The default was kept.
    Rejected { var: &'static str, value: String, reason: &'static str },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Watched { var } => write!(f, "Setting {var} to watched."),
            Diagnostic::Unwatched { var } => write!(f, "Setting {var} to unwatched."),
            Diagnostic::Unrecognized { var, value } => write!(
                f,
                "Unrecognized option for environment variable {var}={value}. Only accepts True/False."
            ),
            Diagnostic::Rejected { var, value, reason } => {
                write!(f, "Ignoring environment variable {var}={value}: {reason}.")
            },
        }
    }
}
