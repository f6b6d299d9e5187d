use thiserror::Error;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A configuration rejected before any attack starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("The charset is empty")]
    EmptyCharset,

    #[error("The charset contains the symbol {0:?} more than once")]
    DuplicateSymbol(char),

    #[error("Unknown charset preset {0:?}")]
    UnknownPreset(String),

    #[error("Passwords longer than {0} characters are not supported")]
    MaxLengthExceeded(u8),

    #[error("Keyspaces are limited to 2^128 candidates, this one needs at least 2^{0}")]
    Space(u32),

    #[error("The mask is empty")]
    EmptyMask,

    #[error("Unknown mask placeholder {0:?}, use ?? for a literal question mark")]
    MaskPlaceholder(String),

    #[error("Unknown hash algorithm {0:?}")]
    UnknownAlgorithm(String),

    #[error("A {algorithm} digest is {expected} hexadecimal characters long, got {actual}")]
    DigestLength {
        algorithm: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("The digest is not valid hexadecimal")]
    DigestNotHex,
}
