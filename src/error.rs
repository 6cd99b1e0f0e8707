use std::io;

use crate::policy::Signal;


pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Could not install crash handler for signal = {signal}")]
    Install {
        signal: Signal,
        source: nix::Error,
    },

    #[error("Crash handler is already installed")]
    AlreadyInstalled,

    #[error("Unusable {setting} = {value:?}: {reason}")]
    Launcher {
        setting: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Input/output error")]
    IO(#[from] io::Error),

    #[error("OS error")]
    OS(#[from] nix::Error),
}
