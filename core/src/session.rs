use std::{
    fmt::Display,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use hashrecover_commons::{
    Algorithm, Charset, Keyspace, Mask, Target, DEFAULT_MAX_PASSWORD_LENGTH,
};
use serde::Serialize;

use crate::{
    candidate::{BruteForceSource, CandidateSource, DictionarySource, HybridSource, MaskSource},
    error::{CrackError, CrackResult},
    wordlist::count_words,
};

/// Progress is published every this many attempts in dictionary mode.
pub const DICTIONARY_PUBLISH_CADENCE: u64 = 10;

/// Progress is published every this many attempts in brute-force mode.
pub const BRUTE_FORCE_PUBLISH_CADENCE: u64 = 5;

/// Where the mask goes around each word of a hybrid attack.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Affix {
    Prefix,
    Suffix,
}

/// How candidates are produced.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum AttackMode {
    /// The words of the wordlists.
    Dictionary,
    /// Every string over a charset, shortest first.
    BruteForce,
    /// Every string matching a mask.
    Mask,
    /// Each word of the wordlists combined with every string matching a mask.
    Hybrid(Affix),
}

impl AttackMode {
    /// The number of attempts between two published snapshots.
    pub fn publish_cadence(&self) -> u64 {
        match self {
            Self::Dictionary | Self::Hybrid(_) => DICTIONARY_PUBLISH_CADENCE,
            Self::BruteForce | Self::Mask => BRUTE_FORCE_PUBLISH_CADENCE,
        }
    }

    /// Returns true if the candidates come from wordlists.
    pub fn reads_wordlists(&self) -> bool {
        matches!(self, Self::Dictionary | Self::Hybrid(_))
    }
}

impl Display for AttackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dictionary => write!(f, "dictionary"),
            Self::BruteForce => write!(f, "bruteforce"),
            Self::Mask => write!(f, "mask"),
            Self::Hybrid(_) => write!(f, "hybrid"),
        }
    }
}

/// Where the hashing happens.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Strategy {
    /// In this process, on a single worker thread.
    #[default]
    Cpu,
    /// In the accelerator process, on GPUs only.
    Accelerator,
    /// In the accelerator process, on GPUs and CPUs.
    Mixed,
    /// On the best ranked device, as chosen by [`crate::DeviceManager::select_strategy`].
    /// A session that still asks for it when it starts runs on the CPU.
    Auto,
}

impl Strategy {
    pub fn uses_accelerator(&self) -> bool {
        matches!(self, Self::Accelerator | Self::Mixed)
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_session_id(created_at: SystemTime) -> String {
    let millis = created_at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let n = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("{millis:x}-{n:04x}")
}

/// A builder for an attack session.
#[derive(Clone)]
pub struct AttackSessionBuilder {
    algorithm: Algorithm,
    digest: String,
    mode: AttackMode,
    wordlists: Vec<PathBuf>,
    charset: Charset,
    max_password_length: u8,
    mask: Option<Mask>,
    strategy: Strategy,
}

impl Default for AttackSessionBuilder {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Md5,
            digest: String::new(),
            mode: AttackMode::BruteForce,
            wordlists: Vec::new(),
            charset: Charset::default(),
            max_password_length: DEFAULT_MAX_PASSWORD_LENGTH,
            mask: None,
            strategy: Strategy::Cpu,
        }
    }
}

impl AttackSessionBuilder {
    /// Creates a new AttackSessionBuilder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the digest to recover, in hexadecimal, and its algorithm.
    pub fn target(mut self, algorithm: Algorithm, digest: &str) -> Self {
        self.algorithm = algorithm;
        self.digest = digest.to_owned();

        self
    }

    /// Switches to a dictionary attack over the given wordlists, read in order.
    pub fn dictionary<I, P>(mut self, wordlists: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.mode = AttackMode::Dictionary;
        self.wordlists = wordlists.into_iter().map(Into::into).collect();

        self
    }

    /// Switches to a brute-force attack.
    pub fn brute_force(mut self) -> Self {
        self.mode = AttackMode::BruteForce;
        self.wordlists.clear();

        self
    }

    /// Sets the charset of a brute-force attack.
    /// The order of the symbols is the enumeration order.
    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = charset;

        self
    }

    /// Sets the maximum password length of a brute-force attack.
    pub fn max_password_length(mut self, max_password_length: u8) -> Self {
        self.max_password_length = max_password_length;

        self
    }

    /// Switches to a mask attack.
    pub fn mask(mut self, mask: Mask) -> Self {
        self.mode = AttackMode::Mask;
        self.mask = Some(mask);
        self.wordlists.clear();

        self
    }

    /// Switches to a hybrid attack: every word of the wordlists, read in order, gets
    /// each candidate of the mask as a prefix or a suffix.
    pub fn hybrid<I, P>(mut self, wordlists: I, mask: Mask, affix: Affix) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.mode = AttackMode::Hybrid(affix);
        self.wordlists = wordlists.into_iter().map(Into::into).collect();
        self.mask = Some(mask);

        self
    }

    /// Sets where the attack should run.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;

        self
    }

    /// Builds an AttackSession with the specified parameters.
    pub fn build(self) -> CrackResult<AttackSession> {
        let target = Target::parse(self.algorithm, &self.digest)?;
        let keyspace = Keyspace::new(self.charset, self.max_password_length)?;

        if self.mode.reads_wordlists() && self.wordlists.is_empty() {
            return Err(CrackError::NoWordlist);
        }
        if !self.mode.reads_wordlists() && !self.wordlists.is_empty() {
            return Err(CrackError::UnexpectedWordlist);
        }

        let mask = match self.mode {
            AttackMode::Mask | AttackMode::Hybrid(_) => {
                Some(self.mask.ok_or(CrackError::NoMask)?)
            }
            AttackMode::Dictionary | AttackMode::BruteForce => None,
        };

        let created_at = SystemTime::now();

        Ok(AttackSession {
            id: next_session_id(created_at),
            target,
            mode: self.mode,
            wordlists: self.wordlists,
            keyspace,
            mask,
            strategy: self.strategy,
            created_at,
        })
    }
}

/// Everything needed to run an attack. It never changes once built.
#[derive(Clone, Debug)]
pub struct AttackSession {
    id: String,
    target: Target,
    mode: AttackMode,
    wordlists: Vec<PathBuf>,
    keyspace: Keyspace,
    mask: Option<Mask>,
    strategy: Strategy,
    created_at: SystemTime,
}

impl AttackSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn algorithm(&self) -> Algorithm {
        self.target.algorithm()
    }

    pub fn mode(&self) -> AttackMode {
        self.mode
    }

    /// The wordlists of a dictionary or hybrid attack. Empty otherwise.
    pub fn wordlists(&self) -> &[PathBuf] {
        &self.wordlists
    }

    /// The candidates of a brute-force attack.
    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    /// The mask of a mask or hybrid attack.
    pub fn mask(&self) -> Option<&Mask> {
        self.mask.as_ref()
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Moves the session to another execution strategy.
    /// This is meant to be done before the attack starts, typically after
    /// [`crate::DeviceManager::select_strategy`].
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;

        self
    }

    /// Counts the candidates of the attack. Wordlists are read entirely.
    pub fn count_candidates(&self) -> CrackResult<u128> {
        let words = || {
            self.wordlists
                .iter()
                .try_fold(0u128, |n, path| Ok::<_, CrackError>(n + count_words(path)? as u128))
        };

        Ok(match (self.mode, &self.mask) {
            (AttackMode::Dictionary, _) => words()?,
            (AttackMode::Hybrid(_), Some(mask)) => words()?.saturating_mul(mask.size()),
            (AttackMode::Mask, Some(mask)) => mask.size(),
            _ => self.keyspace.size(),
        })
    }

    /// Creates the in-process candidate source of this session, positioned at the start.
    pub fn candidate_source(&self) -> Box<dyn CandidateSource> {
        let words = || DictionarySource::new(self.wordlists.clone());

        match (self.mode, &self.mask) {
            (AttackMode::Dictionary, _) => Box::new(words()),
            (AttackMode::Mask, Some(mask)) => Box::new(MaskSource::new(mask.clone())),
            (AttackMode::Hybrid(affix), Some(mask)) => {
                Box::new(HybridSource::new(words(), mask.clone(), affix))
            }
            _ => Box::new(BruteForceSource::new(self.keyspace.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use hashrecover_commons::{Algorithm, Charset, ConfigError, Mask};

    use crate::{Affix, AttackMode, AttackSessionBuilder, CrackError, ErrorKind, Strategy};

    const MD5_TEST: &str = "098f6bcd4621d373cade4e832627b4f6";

    #[test]
    fn test_build_brute_force() {
        let session = AttackSessionBuilder::new()
            .target(Algorithm::Md5, MD5_TEST)
            .charset(Charset::new("ab").unwrap())
            .max_password_length(2)
            .build()
            .unwrap();

        assert_eq!(session.mode(), AttackMode::BruteForce);
        assert_eq!(session.keyspace().size(), 6);
        assert_eq!(session.strategy(), Strategy::Cpu);
        assert!(session.wordlists().is_empty());
    }

    #[test]
    fn test_unique_ids() {
        let builder = AttackSessionBuilder::new().target(Algorithm::Md5, MD5_TEST);
        let a = builder.clone().build().unwrap();
        let b = builder.build().unwrap();

        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_configuration_errors() {
        let wrong_length = AttackSessionBuilder::new()
            .target(Algorithm::Sha1, MD5_TEST)
            .build()
            .unwrap_err();
        assert_eq!(wrong_length.kind(), ErrorKind::Configuration);

        let too_long = AttackSessionBuilder::new()
            .target(Algorithm::Md5, MD5_TEST)
            .max_password_length(17)
            .build()
            .unwrap_err();
        assert!(matches!(
            too_long,
            CrackError::Config(ConfigError::MaxLengthExceeded(16))
        ));

        let no_wordlist = AttackSessionBuilder::new()
            .target(Algorithm::Md5, MD5_TEST)
            .dictionary(Vec::<String>::new())
            .build()
            .unwrap_err();
        assert!(matches!(no_wordlist, CrackError::NoWordlist));
    }

    #[test]
    fn test_build_mask() {
        let session = AttackSessionBuilder::new()
            .target(Algorithm::Md5, MD5_TEST)
            .mask(Mask::parse("?l?l?d").unwrap())
            .build()
            .unwrap();

        assert_eq!(session.mode(), AttackMode::Mask);
        assert_eq!(session.mode().to_string(), "mask");
        assert_eq!(session.count_candidates().unwrap(), 26 * 26 * 10);
    }

    #[test]
    fn test_build_hybrid() {
        let path = std::env::temp_dir().join(format!(
            "hashrecover-session-{}-hybrid.txt",
            std::process::id()
        ));
        std::fs::write(&path, "abc\ntest\nxyz\n").unwrap();

        let session = AttackSessionBuilder::new()
            .target(Algorithm::Md5, MD5_TEST)
            .hybrid([&path], Mask::parse("?d?d").unwrap(), Affix::Suffix)
            .build()
            .unwrap();
        let count = session.count_candidates();
        std::fs::remove_file(path).unwrap();

        assert_eq!(session.mode(), AttackMode::Hybrid(Affix::Suffix));
        assert_eq!(count.unwrap(), 300);

        let no_wordlist = AttackSessionBuilder::new()
            .target(Algorithm::Md5, MD5_TEST)
            .hybrid(Vec::<String>::new(), Mask::parse("?d").unwrap(), Affix::Prefix)
            .build()
            .unwrap_err();
        assert!(matches!(no_wordlist, CrackError::NoWordlist));
    }

    #[test]
    fn test_publish_cadence() {
        assert_eq!(AttackMode::Dictionary.publish_cadence(), 10);
        assert_eq!(AttackMode::Hybrid(Affix::Prefix).publish_cadence(), 10);
        assert_eq!(AttackMode::BruteForce.publish_cadence(), 5);
        assert_eq!(AttackMode::Mask.publish_cadence(), 5);
    }

    #[test]
    fn test_auto_strategy_stays_off_the_accelerator() {
        assert!(!Strategy::Auto.uses_accelerator());
        assert!(!Strategy::Cpu.uses_accelerator());
        assert!(Strategy::Mixed.uses_accelerator());
    }
}
