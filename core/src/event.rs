use std::{fmt::Display, time::Duration};

use serde::Serialize;

/// The state of an attack.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Status {
    Idle,
    Running,
    Paused,
    Found,
    Exhausted,
    Stopped,
    Failed,
}

impl Status {
    /// Returns true if no transition can leave this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Found | Self::Exhausted | Self::Stopped | Self::Failed
        )
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Found => "found",
            Self::Exhausted => "exhausted",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };

        write!(f, "{name}")
    }
}

/// Why an attack ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Termination {
    Found,
    Exhausted,
    Stopped,
    Failed,
}

impl From<Termination> for Status {
    fn from(termination: Termination) -> Self {
        match termination {
            Termination::Found => Status::Found,
            Termination::Exhausted => Status::Exhausted,
            Termination::Stopped => Status::Stopped,
            Termination::Failed => Status::Failed,
        }
    }
}

/// The progress of an attack at some point in time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgressSnapshot {
    /// The number of candidates hashed so far.
    pub attempts_done: u64,
    /// The time spent running, pauses excluded.
    pub elapsed: Duration,
    /// A recently tried candidate. It may lag behind `attempts_done`.
    pub current_candidate: Option<String>,
    pub speed_per_second: f64,
    /// The estimated remaining time, when the number of candidates is known.
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    /// Creates a snapshot, deriving the ETA from the speed and the total number of candidates.
    pub fn new(
        attempts_done: u64,
        elapsed: Duration,
        current_candidate: Option<String>,
        speed_per_second: f64,
        total: Option<u128>,
    ) -> Self {
        let eta = total.and_then(|total| {
            let remaining = total.saturating_sub(attempts_done as u128);
            remaining_time(remaining, speed_per_second)
        });

        Self {
            attempts_done,
            elapsed,
            current_candidate,
            speed_per_second,
            eta,
        }
    }

    /// Creates a snapshot whose speed is the average since the start.
    pub fn measure(
        attempts_done: u64,
        elapsed: Duration,
        current_candidate: Option<String>,
        total: Option<u128>,
    ) -> Self {
        let speed = if elapsed.is_zero() {
            0.
        } else {
            attempts_done as f64 / elapsed.as_secs_f64()
        };

        Self::new(attempts_done, elapsed, current_candidate, speed, total)
    }

    pub fn elapsed_nanos(&self) -> u128 {
        self.elapsed.as_nanos()
    }

    pub fn eta_nanos(&self) -> Option<u128> {
        self.eta.map(|eta| eta.as_nanos())
    }
}

/// The time needed to try `remaining` candidates at the given speed.
pub(crate) fn remaining_time(remaining: u128, speed_per_second: f64) -> Option<Duration> {
    if speed_per_second <= 0. || !speed_per_second.is_finite() {
        return None;
    }

    Duration::try_from_secs_f64(remaining as f64 / speed_per_second).ok()
}

/// The outcome of an attack.
#[derive(Clone, Debug, PartialEq)]
pub struct AttackResult {
    pub found: bool,
    /// The recovered plaintext, present iff `found` is true.
    pub password: Option<String>,
    pub attempts_total: u64,
    pub duration: Duration,
    pub termination: Termination,
    /// A human-readable explanation. Failures carry their diagnostic here.
    pub reason: String,
}

impl AttackResult {
    pub fn found(password: String, attempts_total: u64, duration: Duration) -> Self {
        Self {
            found: true,
            reason: format!("Password recovered after {attempts_total} attempts"),
            password: Some(password),
            attempts_total,
            duration,
            termination: Termination::Found,
        }
    }

    pub fn exhausted(attempts_total: u64, duration: Duration) -> Self {
        Self::not_found(
            Termination::Exhausted,
            format!("All {attempts_total} candidates were tried without a match"),
            attempts_total,
            duration,
        )
    }

    pub fn stopped(attempts_total: u64, duration: Duration) -> Self {
        Self::not_found(
            Termination::Stopped,
            format!("Stopped by request after {attempts_total} attempts"),
            attempts_total,
            duration,
        )
    }

    pub fn failed(diagnostic: String, attempts_total: u64, duration: Duration) -> Self {
        Self::not_found(Termination::Failed, diagnostic, attempts_total, duration)
    }

    fn not_found(
        termination: Termination,
        reason: String,
        attempts_total: u64,
        duration: Duration,
    ) -> Self {
        Self {
            found: false,
            password: None,
            attempts_total,
            duration,
            termination,
            reason,
        }
    }

    pub fn duration_nanos(&self) -> u128 {
        self.duration.as_nanos()
    }
}

/// An event to track an attack.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// The attack entered a new state.
    Status(Status),
    /// New progress was made.
    Progress(ProgressSnapshot),
    /// The worker suspended itself after exactly `attempts_done` attempts.
    Paused { attempts_done: u64 },
    /// Something went wrong without stopping the attack.
    Warning(String),
    /// The attack is over. This is always the last event.
    Finished(AttackResult),
}
