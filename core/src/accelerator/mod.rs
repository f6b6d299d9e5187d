//! Runs attacks in an external accelerator process (hashcat) and follows its output.

mod args;
mod parser;
mod process;

use std::{
    collections::BTreeMap,
    ffi::OsString,
    path::PathBuf,
    process::{Child, ChildStdin, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::RecvTimeoutError;
use tracing::{debug, info, warn};

pub use args::{build_args, hash_mode};
pub use parser::{
    parse_device_listing, parse_line, parse_speed, ListedDevice, OutputEvent, ProgressFold,
};
pub use process::{resolve_program, run_captured, Captured};

use crate::{
    error::{CrackError, CrackResult},
    session::AttackSession,
};
use process::{display_command, spawn_line_reader, spawn_tail_reader, Tail, POLL_INTERVAL};

/// The program launched when none is configured.
pub const DEFAULT_ACCELERATOR_PROGRAM: &str = "hashcat";

/// The number of diagnostic lines kept from the accelerator's output.
const DIAGNOSTIC_LINES: usize = 20;

/// How an accelerator is launched.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// The program, either a path or a name looked up in `PATH`.
    pub program: PathBuf,
    /// Arguments placed before the generated ones, for launchers and wrappers.
    pub leading_args: Vec<OsString>,
    /// From 1 (low) to 4 (nightmare).
    pub workload_profile: u8,
    /// Uses the optimized kernels, which limit the password length.
    pub optimized_kernel: bool,
    /// The number of seconds between two status reports.
    pub status_timer: u32,
    /// Requests the status reports in JSON.
    pub status_json: bool,
    /// The devices to use. Empty means every device of the selected types.
    pub device_ids: Vec<u32>,
    /// How long the accelerator has to quit before being killed.
    pub stop_timeout: Duration,
    /// Arguments added after the generated options.
    pub extra_args: Vec<OsString>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_ACCELERATOR_PROGRAM),
            leading_args: Vec::new(),
            workload_profile: 4,
            optimized_kernel: true,
            status_timer: 1,
            status_json: false,
            device_ids: Vec::new(),
            stop_timeout: Duration::from_secs(2),
            extra_args: Vec::new(),
        }
    }
}

/// The progress reported by the accelerator.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgressUpdate {
    pub attempts_done: u64,
    pub total: Option<u128>,
    pub hashes_per_second: f64,
    pub current_candidate: Option<String>,
}

/// How an accelerator run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Found(String),
    Exhausted,
    Stopped,
}

/// Everything learned from the output of a run.
struct OutputTracker {
    target: String,
    known_total: Option<u128>,
    fold: ProgressFold,
    device_speeds: BTreeMap<u32, f64>,
    aggregate_speed: Option<f64>,
    candidate: Option<String>,
    found: Option<String>,
    unrecognized: Tail,
}

impl OutputTracker {
    fn new(target: &str, known_total: Option<u128>) -> Self {
        Self {
            target: target.to_owned(),
            known_total,
            fold: ProgressFold::new(),
            device_speeds: BTreeMap::new(),
            aggregate_speed: None,
            candidate: None,
            found: None,
            unrecognized: Tail::new(DIAGNOSTIC_LINES),
        }
    }

    fn speed(&self) -> f64 {
        self.aggregate_speed
            .unwrap_or_else(|| self.device_speeds.values().sum())
    }

    fn update(&self) -> ProgressUpdate {
        ProgressUpdate {
            attempts_done: self.fold.attempts(),
            total: self.known_total,
            hashes_per_second: self.speed(),
            current_candidate: self.candidate.clone(),
        }
    }

    /// Records a line of output, and returns new progress if the line carried some.
    fn consume(&mut self, line: &str) -> Option<ProgressUpdate> {
        let Some(event) = parse_line(line, &self.target) else {
            self.unrecognized.push(line.to_owned());
            return None;
        };

        match event {
            OutputEvent::Found(password) => {
                info!("the accelerator recovered the digest");
                self.found.get_or_insert(password);
            }
            OutputEvent::Status(status) => debug!(status, "accelerator status"),
            OutputEvent::Speed {
                device: Some(device),
                hashes_per_second,
            } => {
                self.device_speeds.insert(device, hashes_per_second);
            }
            OutputEvent::Speed {
                device: None,
                hashes_per_second,
            } => self.aggregate_speed = Some(hashes_per_second),
            OutputEvent::Candidates(candidates) => self.candidate = Some(candidates),
            OutputEvent::Queue { position, count } => {
                debug!(position, count, "accelerator step");
                self.fold.enter_step(position);
            }
            OutputEvent::Progress { done, total } => {
                self.fold.update(done, total);
                return Some(self.update());
            }
            OutputEvent::Report {
                done,
                total,
                hashes_per_second,
            } => {
                self.aggregate_speed = Some(hashes_per_second);
                self.fold.update(done, total);
                return Some(self.update());
            }
        }

        None
    }

    /// The last lines of the error output, or of the unrecognized output if there is none.
    fn diagnostic(&self, stderr: Vec<String>) -> String {
        let lines = if stderr.is_empty() {
            self.unrecognized.to_vec()
        } else {
            stderr
        };

        match lines.len() {
            0 => "no output".to_owned(),
            n => lines[n.saturating_sub(5)..].join(" | "),
        }
    }
}

/// Asks the accelerator to quit, as its `q` key does.
#[cfg(unix)]
fn request_quit(child: &Child, _stdin: Option<&mut ChildStdin>) {
    let Ok(pid) = libc::pid_t::try_from(child.id()) else {
        return;
    };

    // SAFETY: the child has not been waited for yet, so its pid cannot have been reused
    if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
        debug!(
            "unable to signal the accelerator: {}",
            std::io::Error::last_os_error()
        );
    }
}

/// Asks the accelerator to quit by pressing its `q` key.
#[cfg(not(unix))]
fn request_quit(_child: &Child, stdin: Option<&mut ChildStdin>) {
    use std::io::Write;

    if let Some(stdin) = stdin {
        if let Err(err) = stdin.write_all(b"q\n").and_then(|_| stdin.flush()) {
            debug!("unable to write to the accelerator: {err}");
        }
    }
}

/// Launches the accelerator and follows it until it exits.
#[derive(Clone, Debug, Default)]
pub struct AcceleratorSupervisor {
    config: SupervisorConfig,
}

impl AcceleratorSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// The full path of the accelerator program.
    pub fn locate(&self) -> CrackResult<PathBuf> {
        resolve_program(&self.config.program)
    }

    pub fn is_available(&self) -> bool {
        self.locate().is_ok()
    }

    /// Runs the attack of the session to completion.
    ///
    /// `should_stop` is polled while the accelerator runs. Once it returns true, the
    /// accelerator is asked to quit (SIGTERM on unix), then killed after the stop timeout.
    /// `on_progress` is called each time the accelerator reports its progress.
    ///
    /// The candidates are counted before the launch, reading the wordlists entirely,
    /// so that the progress carries the total of the whole attack.
    pub fn run(
        &self,
        session: &AttackSession,
        should_stop: impl Fn() -> bool,
        on_progress: impl FnMut(&ProgressUpdate),
    ) -> CrackResult<Outcome> {
        let args = build_args(session, &self.config)?;
        let total = session.count_candidates()?;
        debug!(total, "candidates counted");

        self.run_args(
            &args,
            OutputTracker::new(session.target().hex(), Some(total)),
            should_stop,
            on_progress,
        )
    }

    fn run_args(
        &self,
        args: &[OsString],
        mut tracker: OutputTracker,
        should_stop: impl Fn() -> bool,
        mut on_progress: impl FnMut(&ProgressUpdate),
    ) -> CrackResult<Outcome> {
        let program = self.locate()?;

        let mut all_args = self.config.leading_args.clone();
        all_args.extend_from_slice(args);

        info!(program = %program.display(), "launching the accelerator");
        debug!("{}", display_command(&program, &all_args));

        let mut child = Command::new(&program)
            .args(&all_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(CrackError::Spawn)?;

        let mut stdin = child.stdin.take();
        let (sender, lines) = crossbeam_channel::unbounded();
        let stdout_reader = child.stdout.take().map(|s| spawn_line_reader(s, sender));
        let stderr_reader = child
            .stderr
            .take()
            .map(|s| spawn_tail_reader(s, DIAGNOSTIC_LINES));

        let mut exit_status: Option<ExitStatus> = None;
        let mut stdout_open = stdout_reader.is_some();
        let mut stop_requested = false;
        let mut kill_deadline: Option<Instant> = None;

        while exit_status.is_none() || stdout_open {
            if stdout_open {
                match lines.recv_timeout(POLL_INTERVAL) {
                    Ok(line) => {
                        if let Some(update) = tracker.consume(&line) {
                            on_progress(&update);
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => (),
                    Err(RecvTimeoutError::Disconnected) => stdout_open = false,
                }
            } else {
                thread::sleep(POLL_INTERVAL);
            }

            if exit_status.is_some() {
                continue;
            }

            match child.try_wait() {
                Ok(status) => exit_status = status,
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(err.into());
                }
            }

            if exit_status.is_some() {
                continue;
            }

            if !stop_requested && should_stop() {
                stop_requested = true;
                info!("asking the accelerator to quit");

                request_quit(&child, stdin.as_mut());
                kill_deadline = Some(Instant::now() + self.config.stop_timeout);
            }

            if kill_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!("the accelerator did not quit in time, killing it");
                let _ = child.kill();
                kill_deadline = None;
            }
        }

        drop(stdin);

        if let Some(reader) = stdout_reader {
            reader.join().map_err(|_| CrackError::WorkerPanic)?;
        }
        let stderr = match stderr_reader {
            Some(reader) => reader.join().map_err(|_| CrackError::WorkerPanic)?,
            None => Vec::new(),
        };

        let code = exit_status.and_then(|status| status.code());
        debug!(?code, "the accelerator exited");

        if let Some(password) = tracker.found.take() {
            return Ok(Outcome::Found(password));
        }

        if stop_requested {
            return Ok(Outcome::Stopped);
        }

        match code {
            Some(1) => Ok(Outcome::Exhausted),
            Some(0) => {
                warn!("the accelerator reported a success without printing the plaintext");
                Ok(Outcome::Exhausted)
            }
            _ => Err(CrackError::ProcessExit {
                code: code.map_or_else(
                    || "killed by a signal".to_owned(),
                    |code| format!("exit code {code}"),
                ),
                diagnostic: tracker.diagnostic(stderr),
            }),
        }
    }

    /// Lists the devices of the accelerator.
    pub fn list_devices(&self, timeout: Duration) -> CrackResult<Vec<ListedDevice>> {
        let program = self.locate()?;
        let mut args = self.config.leading_args.clone();
        args.push("-I".into());

        let captured = run_captured(&program, &args, timeout)?;
        Ok(parse_device_listing(&captured.stdout))
    }

    /// Measures the hashing rate of a device, in hashes per second.
    pub fn benchmark_device(
        &self,
        hash_mode: u32,
        device_id: u32,
        timeout: Duration,
    ) -> CrackResult<Option<f64>> {
        let program = self.locate()?;
        let mut args = self.config.leading_args.clone();
        args.extend(
            [
                "-b".to_owned(),
                "-m".to_owned(),
                hash_mode.to_string(),
                "-d".to_owned(),
                device_id.to_string(),
            ]
            .map(OsString::from),
        );

        let captured = run_captured(&program, &args, timeout)?;
        if captured.timed_out {
            warn!(device_id, "the benchmark timed out");
        }

        // the aggregate line comes last when there are several devices
        let speed = captured
            .stdout
            .lines()
            .filter_map(|line| match parse_line(line, "") {
                Some(OutputEvent::Speed {
                    hashes_per_second, ..
                }) => Some(hashes_per_second),
                _ => None,
            })
            .last();

        Ok(speed)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::PathBuf,
        sync::atomic::{AtomicBool, Ordering},
        time::{Duration, Instant},
    };

    use hashrecover_commons::{Algorithm, Charset};

    use crate::{
        accelerator::{AcceleratorSupervisor, OutputTracker, Outcome, SupervisorConfig},
        AttackSession, AttackSessionBuilder, CrackError, ErrorKind, Strategy,
    };

    const MD5_BA: &str = "07159c47ee1b19ae4fb9c40d480856c4";

    fn session() -> AttackSession {
        AttackSessionBuilder::new()
            .target(Algorithm::Md5, MD5_BA)
            .charset(Charset::new("ab").unwrap())
            .max_password_length(2)
            .strategy(Strategy::Accelerator)
            .build()
            .unwrap()
    }

    /// A supervisor running a shell script instead of the accelerator.
    /// The generated arguments become the positional parameters of the script.
    fn scripted(script: &str) -> AcceleratorSupervisor {
        AcceleratorSupervisor::new(SupervisorConfig {
            program: PathBuf::from("/bin/sh"),
            leading_args: vec!["-c".into(), script.into(), "accelerator".into()],
            stop_timeout: Duration::from_millis(500),
            ..Default::default()
        })
    }

    #[test]
    fn test_tracker_progress() {
        let mut tracker = OutputTracker::new(MD5_BA, None);

        assert_eq!(tracker.consume("Speed.#1.........: 100.0 H/s"), None);
        assert_eq!(tracker.consume("Speed.#2.........: 50.0 H/s"), None);
        assert_eq!(tracker.consume("Candidates.#1....: aa -> bb"), None);

        let update = tracker.consume("Progress.........: 3/4 (75.00%)").unwrap();
        assert_eq!(update.attempts_done, 3);
        assert_eq!(update.total, Some(4));
        assert_eq!(update.hashes_per_second, 150.);
        assert_eq!(update.current_candidate.as_deref(), Some("aa -> bb"));

        tracker.consume("Speed.#*.........: 160.0 H/s");
        let update = tracker.consume("Progress.........: 4/4 (100.00%)").unwrap();
        assert_eq!(update.hashes_per_second, 160.);
    }

    #[test]
    fn test_tracker_total_spans_every_wordlist() {
        // two wordlists of 10 words, the first one half read
        let mut tracker = OutputTracker::new(MD5_BA, Some(20));

        tracker.consume("Guess.Queue......: 1/2 (50.00%)");
        tracker.consume("Speed.#*.........: 1.0 H/s");
        let update = tracker.consume("Progress.........: 5/10 (50.00%)").unwrap();

        assert_eq!(update.attempts_done, 5);
        assert_eq!(update.total, Some(20));
        assert_eq!(
            crate::event::remaining_time(20 - 5, update.hashes_per_second),
            Some(Duration::from_secs(15))
        );

        tracker.consume("Guess.Queue......: 2/2 (100.00%)");
        let update = tracker.consume("Progress.........: 4/10 (40.00%)").unwrap();
        assert_eq!(update.attempts_done, 14);
        assert_eq!(update.total, Some(20));
    }

    #[test]
    fn test_tracker_without_total() {
        let mut tracker = OutputTracker::new(MD5_BA, None);
        let update = tracker.consume("Progress.........: 5/10 (50.00%)").unwrap();

        assert_eq!(update.total, None);
    }

    #[test]
    fn test_tracker_diagnostic() {
        let mut tracker = OutputTracker::new(MD5_BA, None);
        assert_eq!(tracker.diagnostic(Vec::new()), "no output");

        tracker.consume("hashcat (v6.2.6) starting");
        tracker.consume("No devices found/left.");
        assert_eq!(
            tracker.diagnostic(Vec::new()),
            "hashcat (v6.2.6) starting | No devices found/left."
        );
        assert_eq!(
            tracker.diagnostic(vec!["out of memory".to_owned()]),
            "out of memory"
        );
    }

    #[test]
    fn test_missing_accelerator() {
        let supervisor = AcceleratorSupervisor::new(SupervisorConfig {
            program: PathBuf::from("/nonexistent/hashcat"),
            ..Default::default()
        });

        let err = supervisor.run(&session(), || false, |_| ()).unwrap_err();

        assert!(!supervisor.is_available());
        assert_eq!(err.kind(), ErrorKind::Resource);
    }

    #[cfg(unix)]
    #[test]
    fn test_found() {
        let supervisor = scripted(&format!(
            "echo 'Progress.........: 2/2 (100.00%)'; \
             echo 'Progress.........: 3/4 (75.00%)'; \
             echo '{MD5_BA}:ba'; exit 0"
        ));

        let mut updates = Vec::new();
        let outcome = supervisor
            .run(&session(), || false, |update| updates.push(update.attempts_done))
            .unwrap();

        assert_eq!(outcome, Outcome::Found("ba".to_owned()));
        assert_eq!(updates, [2, 5]);
    }

    #[cfg(unix)]
    #[test]
    fn test_dictionary_progress_total() {
        let wordlists: Vec<PathBuf> = (1..=2)
            .map(|n| {
                let path = std::env::temp_dir().join(format!(
                    "hashrecover-accelerator-{}-total-{n}.txt",
                    std::process::id()
                ));
                let words: String = (0..10).map(|i| format!("word{i}\n")).collect();
                std::fs::write(&path, words).unwrap();
                path
            })
            .collect();

        let session = AttackSessionBuilder::new()
            .target(Algorithm::Md5, MD5_BA)
            .dictionary(wordlists.clone())
            .strategy(Strategy::Accelerator)
            .build()
            .unwrap();

        let mut updates = Vec::new();
        let outcome = scripted(
            "echo 'Guess.Queue......: 1/2 (50.00%)'; \
             echo 'Progress.........: 5/10 (50.00%)'; exit 1",
        )
        .run(&session, || false, |update| updates.push(update.clone()));

        for path in wordlists {
            std::fs::remove_file(path).unwrap();
        }

        assert_eq!(outcome.unwrap(), Outcome::Exhausted);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].attempts_done, 5);
        assert_eq!(updates[0].total, Some(20));
    }

    #[cfg(unix)]
    #[test]
    fn test_exhausted() {
        let outcome = scripted("echo 'Status...........: Exhausted'; exit 1")
            .run(&session(), || false, |_| ())
            .unwrap();

        assert_eq!(outcome, Outcome::Exhausted);
    }

    #[cfg(unix)]
    #[test]
    fn test_arguments_are_forwarded() {
        // the digest comes right before the mask
        let outcome = scripted(&format!(
            "for arg; do last=$prev; prev=$arg; done; \
             [ \"$prev\" = '?1?1' ] && [ \"$last\" = '{MD5_BA}' ] && exit 1; exit 7"
        ))
        .run(&session(), || false, |_| ())
        .unwrap();

        assert_eq!(outcome, Outcome::Exhausted);
    }

    #[cfg(unix)]
    #[test]
    fn test_unexpected_exit() {
        let err = scripted("echo 'clGetPlatformIDs(): CL_PLATFORM_NOT_FOUND_KHR' >&2; exit 255")
            .run(&session(), || false, |_| ())
            .unwrap_err();

        match err {
            CrackError::ProcessExit { code, diagnostic } => {
                assert_eq!(code, "exit code 255");
                assert!(diagnostic.contains("CL_PLATFORM_NOT_FOUND_KHR"));
            }
            err => panic!("unexpected error: {err}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_graceful_stop() {
        let supervisor = scripted(
            "trap 'exit 2' TERM; echo 'Status...........: Running'; \
             while :; do sleep 0.05; done",
        );
        let stop = AtomicBool::new(false);

        let start = Instant::now();
        let outcome = supervisor
            .run(
                &session(),
                || {
                    stop.store(true, Ordering::Relaxed);
                    true
                },
                |_| (),
            )
            .unwrap();

        assert_eq!(outcome, Outcome::Stopped);
        assert!(stop.load(Ordering::Relaxed));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_forced_stop() {
        // ignores the request to quit, so it has to be killed
        let supervisor = scripted("trap '' TERM; while :; do sleep 0.2; done");

        let start = Instant::now();
        let outcome = supervisor.run(&session(), || true, |_| ()).unwrap();

        assert_eq!(outcome, Outcome::Stopped);
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
