//! Turns the text printed by the accelerator into events.
//!
//! The accelerator prints a status block every few seconds, made of `Key.....: value` fields,
//! and `digest:plaintext` when it recovers a digest. With `--status-json`, each status
//! block is replaced by a single JSON object.

use serde::Deserialize;

use crate::device::DeviceType;

/// Something the accelerator reported.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputEvent {
    /// The state of the run (`Running`, `Exhausted`, `Cracked`...).
    Status(String),
    /// The progress of the current step.
    Progress { done: u64, total: u64 },
    /// The position of the current step among all the steps, from 1.
    Queue { position: u64, count: u64 },
    /// The speed of a device, or of all devices when `device` is `None`.
    Speed {
        device: Option<u32>,
        hashes_per_second: f64,
    },
    /// The candidates currently tried, as displayed by the accelerator.
    Candidates(String),
    /// A whole JSON status report.
    Report {
        done: u64,
        total: u64,
        hashes_per_second: f64,
    },
    /// The plaintext of the target digest.
    Found(String),
}

/// Splits a `Key.Name.....: value` status field.
/// The key must be followed by at least one dot, which excludes `digest:plaintext` lines.
fn split_field(line: &str) -> Option<(&str, &str)> {
    let (key_part, value) = line.split_once(':')?;
    let key = key_part.trim_end_matches('.');

    let well_formed = key.len() < key_part.len()
        && key.starts_with(|c: char| c.is_ascii_uppercase())
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '#' | '*' | '(' | ')' | '_'));

    well_formed.then(|| (key, value.trim()))
}

/// Parses `12345.6 MH/s (52.43ms) @ Accel:...` into hashes per second.
pub fn parse_speed(value: &str) -> Option<f64> {
    let mut tokens = value.split_whitespace();
    let number: f64 = tokens.next()?.parse().ok()?;

    let multiplier = match tokens.next()? {
        "H/s" => 1.,
        "kH/s" => 1e3,
        "MH/s" => 1e6,
        "GH/s" => 1e9,
        "TH/s" => 1e12,
        "PH/s" => 1e15,
        _ => return None,
    };

    Some(number * multiplier)
}

/// Parses `1234/5678 (21.73%)`.
fn parse_progress(value: &str) -> Option<(u64, u64)> {
    let (done, total) = value.split_whitespace().next()?.split_once('/')?;

    Some((done.parse().ok()?, total.parse().ok()?))
}

/// Parses the device part of a `Speed.#1` key. `#*` is the aggregate of every device.
fn parse_device_suffix(key: &str) -> Option<Option<u32>> {
    match key.rsplit_once(".#")?.1 {
        "*" => Some(None),
        id => id.parse().ok().map(Some),
    }
}

/// Decodes the `$HEX[...]` notation used for plaintexts that cannot be printed as is.
fn decode_plaintext(plain: &str) -> String {
    plain
        .strip_prefix("$HEX[")
        .and_then(|rest| rest.strip_suffix(']'))
        .and_then(|encoded| hex::decode(encoded).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| plain.to_owned())
}

/// Returns the plaintext if the line reports the recovery of `target`.
fn parse_found(line: &str, target: &str) -> Option<String> {
    let head = line.get(..target.len())?;
    if !head.eq_ignore_ascii_case(target) {
        return None;
    }

    let rest = &line[target.len()..];
    if let Some(plain) = rest.strip_prefix(':') {
        return Some(decode_plaintext(plain));
    }

    // some versions print the digest and the plaintext in columns
    if rest.starts_with(char::is_whitespace) {
        return rest.split_whitespace().last().map(decode_plaintext);
    }

    None
}

#[derive(Deserialize)]
struct JsonStatus {
    progress: Option<[u64; 2]>,
    #[serde(default)]
    devices: Vec<JsonDevice>,
}

#[derive(Deserialize)]
struct JsonDevice {
    #[serde(default)]
    speed: f64,
}

fn parse_report(line: &str) -> Option<OutputEvent> {
    let status: JsonStatus = serde_json::from_str(line).ok()?;
    let [done, total] = status.progress?;

    Some(OutputEvent::Report {
        done,
        total,
        hashes_per_second: status.devices.iter().map(|device| device.speed).sum(),
    })
}

/// Removes the interactive prompt the accelerator may print in front of a line.
fn strip_prompt(line: &str) -> &str {
    match line.split_once("[q]uit =>") {
        Some((_, rest)) => rest.trim_start(),
        None => line,
    }
}

/// Parses a line of the accelerator's standard output.
/// `target` is the digest of the attack, in hexadecimal.
///
/// Lines that carry nothing useful, such as banners and warnings, give `None`.
pub fn parse_line(line: &str, target: &str) -> Option<OutputEvent> {
    let line = strip_prompt(line);
    let trimmed = line.trim();

    if trimmed.starts_with('{') {
        return parse_report(trimmed);
    }

    if let Some((key, value)) = split_field(trimmed) {
        let family = key.split(".#").next().unwrap_or(key);

        return match family {
            "Status" => Some(OutputEvent::Status(value.to_owned())),
            "Progress" => {
                parse_progress(value).map(|(done, total)| OutputEvent::Progress { done, total })
            }
            "Guess.Queue" => parse_progress(value)
                .map(|(position, count)| OutputEvent::Queue { position, count }),
            "Speed" => Some(OutputEvent::Speed {
                device: parse_device_suffix(key)?,
                hashes_per_second: parse_speed(value)?,
            }),
            "Candidates" => Some(OutputEvent::Candidates(value.to_owned())),
            _ => None,
        };
    }

    parse_found(line.trim_start(), target).map(OutputEvent::Found)
}

/// Turns the per-step progress of the accelerator into a monotonic attempt count.
///
/// Incremental brute-force attacks and multi-wordlist attacks run in steps, and the
/// progress restarts at zero with each step. The queue position tells when a step
/// begins. Without it, a step is assumed to begin when the total changes or the
/// progress goes backwards.
#[derive(Clone, Debug, Default)]
pub struct ProgressFold {
    /// The candidates of the steps already finished.
    completed: u64,
    last_done: u64,
    last_total: u64,
    queue: Option<u64>,
    attempts: u64,
}

impl ProgressFold {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the queue position of the current step.
    pub fn enter_step(&mut self, position: u64) {
        if self.queue.is_some_and(|current| current != position) {
            self.completed = self.completed.saturating_add(self.last_total);
            self.last_done = 0;
            self.last_total = 0;
        }

        self.queue = Some(position);
    }

    /// Records the progress of the current step and returns the attempts so far.
    pub fn update(&mut self, done: u64, total: u64) -> u64 {
        let new_step = self.queue.is_none()
            && ((self.last_total != 0 && total != self.last_total) || done < self.last_done);
        if new_step {
            self.completed = self.completed.saturating_add(self.last_total);
        }

        self.last_done = done;
        self.last_total = total;
        self.attempts = self.attempts.max(self.completed.saturating_add(done));

        self.attempts
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }
}

/// A device as listed by the accelerator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListedDevice {
    pub id: u32,
    pub kind: DeviceType,
    pub name: String,
    pub memory_bytes: u64,
    pub compute_units: u32,
}

/// Parses `Backend Device ID #3 (Alias: #1)` into the id and its alias.
fn parse_device_header(line: &str) -> Option<(u32, Option<u32>)> {
    let rest = line.strip_prefix("Backend Device ID #")?;
    let (id, rest) = match rest.split_once(char::is_whitespace) {
        Some((id, rest)) => (id, rest),
        None => (rest, ""),
    };

    let alias = rest
        .trim()
        .strip_prefix("(Alias: #")
        .and_then(|alias| alias.strip_suffix(')'))
        .and_then(|alias| alias.parse().ok());

    Some((id.parse().ok()?, alias))
}

/// Parses the device listing of the accelerator.
///
/// A device seen through several backends is listed several times with aliases,
/// and only its first listing is kept.
pub fn parse_device_listing(text: &str) -> Vec<ListedDevice> {
    let mut devices: Vec<ListedDevice> = Vec::new();
    let mut current: Option<ListedDevice> = None;

    fn flush(current: &mut Option<ListedDevice>, devices: &mut Vec<ListedDevice>) {
        devices.extend(current.take());
    }

    let mut aliases_of_kept = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }

        if let Some((id, alias)) = parse_device_header(line) {
            flush(&mut current, &mut devices);

            if aliases_of_kept.contains(&id) {
                continue;
            }
            aliases_of_kept.extend(alias);

            current = Some(ListedDevice {
                id,
                kind: DeviceType::Gpu,
                name: String::new(),
                memory_bytes: 0,
                compute_units: 0,
            });
            continue;
        }

        let Some((key, value)) = split_field(line) else {
            // any other line, such as a platform header, ends the device block
            flush(&mut current, &mut devices);
            continue;
        };

        let Some(device) = current.as_mut() else {
            continue;
        };

        match key {
            "Name" => device.name = value.to_owned(),
            "Type" => {
                device.kind = if value.eq_ignore_ascii_case("CPU") {
                    DeviceType::Cpu
                } else {
                    DeviceType::Gpu
                }
            }
            "Memory.Total" | "Global.Memory" => {
                if let Some(mb) = value
                    .split_whitespace()
                    .next()
                    .and_then(|mb| mb.parse::<u64>().ok())
                {
                    device.memory_bytes = mb * 1024 * 1024;
                }
            }
            "Processor(s)" => device.compute_units = value.parse().unwrap_or_default(),
            _ => (),
        }
    }

    flush(&mut current, &mut devices);

    devices
}
