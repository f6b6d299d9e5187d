mod crack;
mod inspect;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{value_parser, ArgAction, Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use hashrecover_core::{
    Algorithm, Mask, Strategy, DEFAULT_ACCELERATOR_PROGRAM, DEFAULT_MAX_PASSWORD_LENGTH,
    MAX_PASSWORD_LENGTH_ALLOWED,
};

use crack::crack;
use inspect::{benchmark, devices, hash, identify, wordlist};

/// All the hash types supported.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum AlgorithmArg {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Md5 => Algorithm::Md5,
            AlgorithmArg::Sha1 => Algorithm::Sha1,
            AlgorithmArg::Sha256 => Algorithm::Sha256,
            AlgorithmArg::Sha512 => Algorithm::Sha512,
        }
    }
}

/// Where the candidates are hashed.
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum DeviceArg {
    /// On the best ranked device: the GPUs if the accelerator has a fast one, else the CPU.
    Auto,
    /// In this process.
    Cpu,
    /// On the GPUs, through the accelerator.
    Accelerator,
    /// On the GPUs and the CPU, through the accelerator.
    Mixed,
}

impl From<DeviceArg> for Strategy {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Auto => Strategy::Auto,
            DeviceArg::Cpu => Strategy::Cpu,
            DeviceArg::Accelerator => Strategy::Accelerator,
            DeviceArg::Mixed => Strategy::Mixed,
        }
    }
}

/// Recovers passwords from MD5 and SHA digests, on the CPU or with hashcat.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Logs more details. Repeat for even more.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Crack(Crack),
    Identify(Identify),
    Hash(Hash),
    Devices(Devices),
    Benchmark(Benchmark),
    Wordlist(Wordlist),
}

/// Find the password producing a certain hash digest.
/// Without wordlists, every candidate of the charset or of the mask is tried.
#[derive(Args)]
pub struct Crack {
    /// The digest to attack, in hexadecimal.
    #[arg(value_parser = check_hex)]
    digest: String,

    /// The type of the hash. Guessed from the digest when omitted.
    #[arg(short, long)]
    algorithm: Option<AlgorithmArg>,

    /// A wordlist to try. Can be repeated.
    #[arg(short, long = "wordlist")]
    wordlists: Vec<PathBuf>,

    /// Tries the usual wordlists found in this directory.
    #[arg(long, value_name = "DIR")]
    all_wordlists: Option<PathBuf>,

    /// The charset to use for brute force.
    #[arg(short, long, value_parser = check_charset, conflicts_with = "preset")]
    charset: Option<String>,

    /// A named charset to use for brute force.
    #[arg(short, long, value_parser = check_preset)]
    preset: Option<String>,

    /// The maximum password length for brute force.
    #[arg(
        short = 'l',
        long,
        value_parser = value_parser!(u8).range(1..=MAX_PASSWORD_LENGTH_ALLOWED as i64),
        default_value_t = DEFAULT_MAX_PASSWORD_LENGTH
    )]
    max_length: u8,

    /// A mask such as `?u?l?l?d`, one charset per position: ?l ?u ?d ?s ?a ?h ?H.
    /// Any other character is a literal, `??` is a question mark.
    /// With wordlists, the mask is appended to every word.
    #[arg(short, long, value_parser = check_mask, conflicts_with_all = ["charset", "preset"])]
    mask: Option<String>,

    /// Puts the mask in front of every word instead.
    #[arg(long, requires = "mask")]
    prefix: bool,

    /// Where the candidates are hashed.
    /// The accelerator is only used when it runs faster than the CPU.
    #[arg(short, long, value_enum, default_value_t = DeviceArg::Auto)]
    device: DeviceArg,

    /// The accelerator program, a path or a name looked up in PATH.
    #[arg(long, env = "HASHRECOVER_ACCELERATOR", default_value = DEFAULT_ACCELERATOR_PROGRAM)]
    accelerator: PathBuf,

    /// Prints a JSON report instead of the password.
    #[arg(long)]
    json: bool,
}

/// List the hash types a digest could be.
#[derive(Args)]
pub struct Identify {
    /// The hash to identify.
    hash: String,
}

/// Compute the digest of a text.
#[derive(Args)]
pub struct Hash {
    /// The type of the hash.
    algorithm: AlgorithmArg,

    /// The text to hash.
    text: String,
}

/// List the devices able to run an attack.
#[derive(Args)]
pub struct Devices {
    /// Measures the hash rate of every device for this algorithm.
    #[arg(short, long)]
    benchmark: Option<AlgorithmArg>,

    /// The accelerator program, a path or a name looked up in PATH.
    #[arg(long, env = "HASHRECOVER_ACCELERATOR", default_value = DEFAULT_ACCELERATOR_PROGRAM)]
    accelerator: PathBuf,
}

/// Measure the CPU hash rate of every supported algorithm.
#[derive(Args)]
pub struct Benchmark {
    /// How long each algorithm is measured, in seconds.
    #[arg(short, long, value_parser = check_seconds, default_value_t = 1.)]
    seconds: f64,
}

/// Show statistics about wordlists.
#[derive(Args)]
pub struct Wordlist {
    /// The wordlists to inspect.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

/// Checks if the charset is made of ASCII characters.
fn check_charset(charset: &str) -> Result<String> {
    if !charset.is_ascii() {
        bail!("The charset can only contain ASCII characters");
    }

    Ok(charset.to_owned())
}

/// Checks if the preset is known.
fn check_preset(name: &str) -> Result<String> {
    hashrecover_core::Charset::preset(name)?;
    Ok(name.to_owned())
}

/// Checks if the mask can be parsed.
fn check_mask(mask: &str) -> Result<String> {
    Mask::parse(mask)?;
    Ok(mask.to_owned())
}

/// Checks if the digest is valid hexadecimal.
fn check_hex(hex: &str) -> Result<String> {
    hex::decode(hex).context("The digest is not valid hexadecimal")?;
    Ok(hex.to_owned())
}

/// Checks if the duration is a positive number of seconds.
fn check_seconds(seconds: &str) -> Result<f64> {
    let seconds = seconds
        .parse::<f64>()
        .context("The duration should be a number")?;

    if !(seconds > 0. && seconds.is_finite()) {
        bail!("The duration should be positive");
    }

    Ok(seconds)
}

/// Logs to stderr so stdout only carries results.
/// `RUST_LOG` is used unless `-v` is given.
fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.commands {
        Commands::Crack(args) => crack(args)?,
        Commands::Identify(args) => identify(args),
        Commands::Hash(args) => hash(args),
        Commands::Devices(args) => devices(args),
        Commands::Benchmark(args) => benchmark(args),
        Commands::Wordlist(args) => wordlist(args)?,
    }

    Ok(())
}
