use std::{fmt::Display, str::FromStr};

use arrayvec::ArrayVec;
use digest::Digest as _;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::error::{ConfigError, ConfigResult};

/// The maximum digest size allowed, in bytes.
pub const MAX_DIGEST_LENGTH_ALLOWED: usize = 64;

/// A digest stored in a stack-allocated vector.
pub type Digest = ArrayVec<u8, MAX_DIGEST_LENGTH_ALLOWED>;

/// All the supported hash functions.
#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl Algorithm {
    /// Every supported algorithm, in increasing digest size.
    pub const ALL: [Algorithm; 4] = [
        Algorithm::Md5,
        Algorithm::Sha1,
        Algorithm::Sha256,
        Algorithm::Sha512,
    ];

    /// Hashes a byte slice using the right hash function.
    #[inline]
    pub fn digest(&self, data: &[u8]) -> Digest {
        match self {
            Self::Md5 => Md5::digest(data).into_iter().collect(),
            Self::Sha1 => Sha1::digest(data).into_iter().collect(),
            Self::Sha256 => Sha256::digest(data).into_iter().collect(),
            Self::Sha512 => Sha512::digest(data).into_iter().collect(),
        }
    }

    /// Hashes a candidate and returns the lowercase hexadecimal digest.
    pub fn hash(&self, candidate: &str) -> String {
        hex::encode(self.digest(candidate.as_bytes()))
    }

    /// Compares a candidate digest against the target digest.
    /// Both must have the length of this algorithm; case is ignored.
    pub fn matches(&self, candidate_hash: &str, target_hash: &str) -> bool {
        candidate_hash.len() == self.hex_len()
            && target_hash.len() == self.hex_len()
            && candidate_hash.eq_ignore_ascii_case(target_hash)
    }

    /// Gets the digest size in bytes.
    pub fn digest_size(&self) -> usize {
        match self {
            Self::Md5 => Md5::output_size(),
            Self::Sha1 => Sha1::output_size(),
            Self::Sha256 => Sha256::output_size(),
            Self::Sha512 => Sha512::output_size(),
        }
    }

    /// Gets the length of the hexadecimal digest.
    pub fn hex_len(&self) -> usize {
        self.digest_size() * 2
    }

    /// Finds the algorithm producing hexadecimal digests of this length.
    pub fn from_hex_len(len: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|algorithm| algorithm.hex_len() == len)
    }

    /// The conventional name of the algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        }
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Algorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], "");

        match normalized.as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" | "sha2256" => Ok(Self::Sha256),
            "sha512" | "sha2512" => Ok(Self::Sha512),
            _ => Err(ConfigError::UnknownAlgorithm(s.to_owned())),
        }
    }
}

/// A validated target digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    algorithm: Algorithm,
    hex: String,
    digest: Digest,
}

impl Target {
    /// Parses a hexadecimal digest for the given algorithm.
    /// Surrounding whitespace is ignored and the stored form is lowercase.
    pub fn parse(algorithm: Algorithm, hex: &str) -> ConfigResult<Self> {
        let hex = hex.trim().to_ascii_lowercase();

        if hex.len() != algorithm.hex_len() {
            return Err(ConfigError::DigestLength {
                algorithm: algorithm.name(),
                expected: algorithm.hex_len(),
                actual: hex.len(),
            });
        }

        let digest = hex::decode(&hex)
            .map_err(|_| ConfigError::DigestNotHex)?
            .into_iter()
            .collect();

        Ok(Self {
            algorithm,
            hex,
            digest,
        })
    }

    /// The algorithm of the digest.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The lowercase hexadecimal digest.
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Hashes the candidate and checks it against the target.
    #[inline]
    pub fn is_hit(&self, candidate: &str) -> bool {
        self.algorithm.digest(candidate.as_bytes()) == self.digest
    }
}

#[cfg(test)]
mod tests {
    use crate::{Algorithm, ConfigError, Target};

    const TEST_VECTORS: [(Algorithm, &str); 4] = [
        (Algorithm::Md5, "098f6bcd4621d373cade4e832627b4f6"),
        (Algorithm::Sha1, "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3"),
        (
            Algorithm::Sha256,
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
        ),
        (
            Algorithm::Sha512,
            "ee26b0dd4af7e749aa1a8ee3c10ae9923f618980772e473f8819a5d4940e0db27ac185f8a0e1d5f84f88bc887fd67b143732c304cc5fa9ad8e6f57f50028a8ff",
        ),
    ];

    #[test]
    fn test_known_answers() {
        for (algorithm, expected) in TEST_VECTORS {
            assert_eq!(algorithm.hash("test"), expected, "{algorithm}");
            assert_eq!(algorithm.hex_len(), expected.len());
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(Algorithm::Md5.hash(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_matches_ignores_case() {
        let upper = TEST_VECTORS[2].1.to_ascii_uppercase();

        assert!(Algorithm::Sha256.matches(&Algorithm::Sha256.hash("test"), &upper));
        assert!(!Algorithm::Sha256.matches(&Algorithm::Sha256.hash("tesT"), &upper));
    }

    #[test]
    fn test_matches_rejects_wrong_length() {
        let md5 = Algorithm::Md5.hash("test");

        assert!(!Algorithm::Sha1.matches(&md5, &md5));
        assert!(!Algorithm::Md5.matches(&md5[..31], &md5[..31]));
    }

    #[test]
    fn test_from_hex_len() {
        assert_eq!(Algorithm::from_hex_len(32), Some(Algorithm::Md5));
        assert_eq!(Algorithm::from_hex_len(128), Some(Algorithm::Sha512));
        assert_eq!(Algorithm::from_hex_len(60), None);
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("SHA-256".parse::<Algorithm>(), Ok(Algorithm::Sha256));
        assert_eq!("md5".parse::<Algorithm>(), Ok(Algorithm::Md5));
        assert!("whirlpool".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_target() {
        let target = Target::parse(Algorithm::Sha1, &TEST_VECTORS[1].1.to_uppercase()).unwrap();

        assert_eq!(target.hex(), TEST_VECTORS[1].1);
        assert!(target.is_hit("test"));
        assert!(!target.is_hit("Test"));
    }

    #[test]
    fn test_target_validation() {
        assert_eq!(
            Target::parse(Algorithm::Md5, "abcd"),
            Err(ConfigError::DigestLength {
                algorithm: "MD5",
                expected: 32,
                actual: 4
            })
        );
        assert_eq!(
            Target::parse(Algorithm::Md5, &"z".repeat(32)),
            Err(ConfigError::DigestNotHex)
        );
    }
}
