//! Recovers the plaintext of a digest by hashing candidates until one matches,
//! either in process or through an external accelerator.

pub mod accelerator;
mod candidate;
mod device;
mod engine;
mod error;
mod event;
mod report;
mod session;
mod wordlist;

pub use accelerator::{AcceleratorSupervisor, SupervisorConfig, DEFAULT_ACCELERATOR_PROGRAM};
pub use candidate::{
    BruteForceSource, Candidate, CandidateSource, DictionarySource, HybridSource, MaskSource,
};
pub use device::{
    benchmark_cpu, choose_strategy, cpu_device, estimate_duration, Device, DeviceManager,
    DeviceType, DiagnosticRow, Tier, TierThresholds, CPU_ATTACK_THREADS,
    DEFAULT_BENCHMARK_DURATION,
};
pub use engine::AttackEngine;
pub use error::{CrackError, CrackResult, ErrorKind};
pub use event::{AttackResult, Event, ProgressSnapshot, Status, Termination};
pub use report::AttackReport;
pub use session::{
    Affix, AttackMode, AttackSession, AttackSessionBuilder, Strategy, BRUTE_FORCE_PUBLISH_CADENCE,
    DICTIONARY_PUBLISH_CADENCE,
};
pub use wordlist::{count_words, default_wordlists, WordReader, WordlistInfo, DEFAULT_WORDLISTS};

pub use hashrecover_commons::{
    identify, Algorithm, Charset, ConfigError, HashKind, Keyspace, Mask, Target, DEFAULT_CHARSET,
    DEFAULT_MAX_PASSWORD_LENGTH, MASK_PLACEHOLDERS, MAX_PASSWORD_LENGTH_ALLOWED, PRESETS,
};
