use std::ffi::OsString;

use hashrecover_commons::{Algorithm, Charset, Mask, DIGITS, LOWERCASE, UPPERCASE};

use crate::{
    accelerator::SupervisorConfig,
    error::{CrackError, CrackResult},
    session::{Affix, AttackMode, AttackSession, Strategy},
};

/// The accelerator charsets that enumerate the same symbols as ours.
const BUILTIN_CHARSETS: [(&str, &str); 5] = [
    (LOWERCASE, "?l"),
    (UPPERCASE, "?u"),
    (DIGITS, "?d"),
    ("0123456789abcdef", "?h"),
    ("0123456789ABCDEF", "?H"),
];

/// The hash mode understood by the accelerator for an algorithm.
pub fn hash_mode(algorithm: Algorithm) -> u32 {
    match algorithm {
        Algorithm::Md5 => 0,
        Algorithm::Sha1 => 100,
        Algorithm::Sha256 => 1400,
        Algorithm::Sha512 => 1700,
    }
}

/// Escapes a charset so that it can be passed as a custom accelerator charset.
fn custom_charset(charset: &Charset) -> CrackResult<String> {
    let mut escaped = String::with_capacity(charset.len());

    for &c in charset.symbols() {
        if !c.is_ascii() {
            return Err(CrackError::AcceleratorCharset(c));
        }

        if c == '?' {
            escaped.push('?');
        }
        escaped.push(c);
    }

    Ok(escaped)
}

/// Translates a mask for the accelerator: the custom charsets it needs, then the mask itself.
///
/// Positions matching a builtin accelerator charset use it. `?s` and `?a` become the
/// custom charsets `-1` and `-2`, as the accelerator's own ones hold other symbols.
fn accelerator_mask(mask: &Mask) -> CrackResult<(Vec<String>, String)> {
    let mut customs: Vec<&Charset> = Vec::new();
    let mut pattern = String::new();

    for charset in mask.positions() {
        if let [c] = charset.symbols() {
            if !c.is_ascii() {
                return Err(CrackError::AcceleratorCharset(*c));
            }
            if *c == '?' {
                pattern.push('?');
            }
            pattern.push(*c);
            continue;
        }

        let symbols = charset.to_string();
        if let Some((_, builtin)) = BUILTIN_CHARSETS.iter().find(|(s, _)| *s == symbols) {
            pattern.push_str(builtin);
            continue;
        }

        let slot = match customs.iter().position(|custom| *custom == charset) {
            Some(slot) => slot,
            None => {
                customs.push(charset);
                customs.len() - 1
            }
        };
        pattern.push('?');
        pattern.push_str(&(slot + 1).to_string());
    }

    let customs = customs
        .into_iter()
        .map(custom_charset)
        .collect::<CrackResult<Vec<_>>>()?;

    Ok((customs, pattern))
}

/// Builds the arguments of an accelerator run for the session.
///
/// The status report is requested so that progress can be followed, the potfile is disabled
/// so that a digest recovered by a previous run is recovered again, and brute-force
/// attacks go through every length up to the maximum.
pub fn build_args(
    session: &AttackSession,
    config: &SupervisorConfig,
) -> CrackResult<Vec<OsString>> {
    let mut args: Vec<OsString> = Vec::new();
    let mut push = |arg: &dyn AsRef<std::ffi::OsStr>| args.push(arg.as_ref().to_owned());

    let attack_mode = match session.mode() {
        AttackMode::Dictionary => "0",
        AttackMode::BruteForce | AttackMode::Mask => "3",
        AttackMode::Hybrid(Affix::Suffix) => "6",
        AttackMode::Hybrid(Affix::Prefix) => "7",
    };

    push(&"-m");
    push(&hash_mode(session.algorithm()).to_string());
    push(&"-a");
    push(&attack_mode);
    push(&"-w");
    push(&config.workload_profile.to_string());

    if config.optimized_kernel {
        push(&"-O");
    }

    push(&"--status");
    push(&"--status-timer");
    push(&config.status_timer.max(1).to_string());
    if config.status_json {
        push(&"--status-json");
    }
    push(&"--potfile-disable");

    push(&"-D");
    push(&match session.strategy() {
        Strategy::Mixed => "1,2",
        Strategy::Cpu | Strategy::Accelerator | Strategy::Auto => "2",
    });

    if !config.device_ids.is_empty() {
        let ids = config
            .device_ids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        push(&"-d");
        push(&ids);
    }

    for arg in &config.extra_args {
        push(arg);
    }

    match session.mode() {
        AttackMode::Dictionary => {
            push(&session.target().hex());
            for wordlist in session.wordlists() {
                push(wordlist);
            }
        }
        AttackMode::BruteForce => {
            let keyspace = session.keyspace();
            let max_length = keyspace.max_length();

            push(&"-1");
            push(&custom_charset(keyspace.charset())?);
            push(&"--increment");
            push(&"--increment-min");
            push(&"1");
            push(&"--increment-max");
            push(&max_length.to_string());
            push(&session.target().hex());
            push(&"?1".repeat(max_length as usize));
        }
        AttackMode::Mask | AttackMode::Hybrid(_) => {
            let mask = session.mask().ok_or(CrackError::NoMask)?;
            let (customs, pattern) = accelerator_mask(mask)?;

            for (slot, custom) in customs.iter().enumerate() {
                push(&format!("-{}", slot + 1));
                push(custom);
            }
            push(&session.target().hex());

            match session.mode() {
                AttackMode::Hybrid(Affix::Prefix) => {
                    push(&pattern);
                    for wordlist in session.wordlists() {
                        push(wordlist);
                    }
                }
                AttackMode::Hybrid(Affix::Suffix) => {
                    for wordlist in session.wordlists() {
                        push(wordlist);
                    }
                    push(&pattern);
                }
                _ => push(&pattern),
            }
        }
    }

    Ok(args)
}
