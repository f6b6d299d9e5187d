mod charset;
mod error;
mod hash;
mod identify;
mod mask;

pub use charset::{
    Charset, Keyspace, DEFAULT_CHARSET, DEFAULT_MAX_PASSWORD_LENGTH, DIGITS, LOWERCASE,
    MAX_PASSWORD_LENGTH_ALLOWED, PRESETS, SPECIAL, UPPERCASE,
};
pub use error::{ConfigError, ConfigResult};
pub use hash::{Algorithm, Digest, Target, MAX_DIGEST_LENGTH_ALLOWED};
pub use identify::{identify, HashKind};
pub use mask::{Mask, MASK_PLACEHOLDERS};
