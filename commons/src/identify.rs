use std::fmt::Display;

use serde::Serialize;

use crate::Algorithm;

/// A hash format that can be recognized from its shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum HashKind {
    Md5,
    Ntlm,
    Sha1,
    Sha256,
    Sha512,
    Bcrypt,
    Pbkdf2Sha256,
    Argon2,
}

impl HashKind {
    /// The algorithm able to attack this kind of hash, if it is supported.
    pub fn algorithm(&self) -> Option<Algorithm> {
        match self {
            Self::Md5 => Some(Algorithm::Md5),
            Self::Sha1 => Some(Algorithm::Sha1),
            Self::Sha256 => Some(Algorithm::Sha256),
            Self::Sha512 => Some(Algorithm::Sha512),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5 (128-bit)",
            Self::Ntlm => "NTLM (same length as MD5)",
            Self::Sha1 => "SHA-1 (160-bit)",
            Self::Sha256 => "SHA-256 (256-bit)",
            Self::Sha512 => "SHA-512 (512-bit)",
            Self::Bcrypt => "bcrypt",
            Self::Pbkdf2Sha256 => "PBKDF2-SHA256 (iterations$salt$hash)",
            Self::Argon2 => "Argon2",
        }
    }
}

impl Display for HashKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Lists the hash kinds a string could be, most likely first.
///
/// Plain hexadecimal digests are ranked by length. A 32 characters digest is
/// either MD5 or NTLM: NTLM comes first when the digest is written in
/// uppercase, as Windows tooling does. Unrecognized input gives an empty list.
pub fn identify(hash: &str) -> Vec<HashKind> {
    let hash = hash.trim();

    if is_hex(hash) {
        let uppercase = hash.bytes().any(|b| b.is_ascii_uppercase())
            && !hash.bytes().any(|b| b.is_ascii_lowercase());

        return match hash.len() {
            32 if uppercase => vec![HashKind::Ntlm, HashKind::Md5],
            32 => vec![HashKind::Md5, HashKind::Ntlm],
            40 => vec![HashKind::Sha1],
            64 => vec![HashKind::Sha256],
            128 => vec![HashKind::Sha512],
            _ => Vec::new(),
        };
    }

    if hash.len() == 60 && ["$2a$", "$2b$", "$2y$"].iter().any(|p| hash.starts_with(p)) {
        return vec![HashKind::Bcrypt];
    }

    if hash.starts_with("$argon2") {
        return vec![HashKind::Argon2];
    }

    let mut parts = hash.split('$');
    if let (Some(iterations), Some(salt), Some(digest), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    {
        if !iterations.is_empty()
            && iterations.bytes().all(|b| b.is_ascii_digit())
            && is_hex(salt)
            && is_hex(digest)
        {
            return vec![HashKind::Pbkdf2Sha256];
        }
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_lengths() {
        assert_eq!(
            identify("098f6bcd4621d373cade4e832627b4f6"),
            [HashKind::Md5, HashKind::Ntlm]
        );
        assert_eq!(
            identify("a94a8fe5ccb19ba61c4c0873d391e987982fbbd3"),
            [HashKind::Sha1]
        );
        assert_eq!(identify(&"ab".repeat(32)), [HashKind::Sha256]);
        assert_eq!(identify(&"ab".repeat(64)), [HashKind::Sha512]);
    }

    #[test]
    fn test_uppercase_favors_ntlm() {
        assert_eq!(
            identify("0CB6948805F797BF2A82807973B89537"),
            [HashKind::Ntlm, HashKind::Md5]
        );
        // digits only carry no case hint
        assert_eq!(identify(&"1".repeat(32))[0], HashKind::Md5);
    }

    #[test]
    fn test_structured_formats() {
        assert_eq!(
            identify("$2b$12$R9h/cIPz0gi.URNNX3kh2OPST9/PgBkqquzi.Ss7KIUgO2t0jWMUW"),
            [HashKind::Bcrypt]
        );
        assert_eq!(
            identify("$argon2id$v=19$m=65536,t=3,p=4$c2FsdA$aGFzaA"),
            [HashKind::Argon2]
        );
        assert_eq!(identify("100000$abcd$0123ef"), [HashKind::Pbkdf2Sha256]);
    }

    #[test]
    fn test_unmatched() {
        assert!(identify("").is_empty());
        assert!(identify("hello world").is_empty());
        assert!(identify(&"a".repeat(33)).is_empty());
        assert!(identify("$$$").is_empty());
        assert!(identify("12$zz$00").is_empty());
    }

    #[test]
    fn test_crackable() {
        let crackable = identify("098f6bcd4621d373cade4e832627b4f6")
            .into_iter()
            .filter_map(|kind| kind.algorithm())
            .collect::<Vec<_>>();

        assert_eq!(crackable, [Algorithm::Md5]);
    }
}
