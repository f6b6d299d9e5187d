use std::{io, path::PathBuf};

use hashrecover_commons::ConfigError;
use thiserror::Error;

use crate::event::Status;

pub type CrackResult<T> = std::result::Result<T, CrackError>;

#[derive(Error, Debug)]
pub enum CrackError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("A dictionary attack needs at least one wordlist")]
    NoWordlist,

    #[error("A brute-force or mask attack does not read wordlists")]
    UnexpectedWordlist,

    #[error("A mask or hybrid attack needs a mask")]
    NoMask,

    #[error("The accelerator only accepts ASCII charsets, but {0:?} is not ASCII")]
    AcceleratorCharset(char),

    #[error("Unable to read the wordlist at {}", path.display())]
    Wordlist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("The accelerator program {} could not be found", .0.display())]
    AcceleratorMissing(PathBuf),

    #[error("Failed to launch the accelerator")]
    Spawn(#[source] io::Error),

    #[error("The accelerator exited unexpectedly ({code}): {diagnostic}")]
    ProcessExit { code: String, diagnostic: String },

    #[error("Cannot {action} a session that is {status}")]
    InvalidState { status: Status, action: &'static str },

    #[error("The attack worker stopped unexpectedly")]
    WorkerPanic,

    #[error("Unable to access a file or a pipe")]
    Io(#[from] io::Error),
}

/// The broad category of an error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before the attack starts.
    Configuration,
    /// A file or a program is unavailable.
    Resource,
    /// The accelerator process misbehaved.
    Process,
    /// The requested transition is not allowed.
    State,
}

impl CrackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_)
            | Self::NoWordlist
            | Self::UnexpectedWordlist
            | Self::NoMask
            | Self::AcceleratorCharset(_) => ErrorKind::Configuration,
            Self::Wordlist { .. } | Self::AcceleratorMissing(_) | Self::Io(_) => {
                ErrorKind::Resource
            }
            Self::Spawn(_) | Self::ProcessExit { .. } | Self::WorkerPanic => ErrorKind::Process,
            Self::InvalidState { .. } => ErrorKind::State,
        }
    }

    /// The message and all its sources, on a single line.
    pub fn diagnostic(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);

        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }

        message
    }
}
