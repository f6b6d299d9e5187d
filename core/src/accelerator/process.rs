use std::{
    collections::VecDeque,
    ffi::{OsStr, OsString},
    io::{BufRead, BufReader, Read},
    path::{Component, Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::Sender;
use tracing::debug;

use crate::error::{CrackError, CrackResult};

/// How often a running process is polled.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Finds a program, either from its path or by searching `PATH`.
pub fn resolve_program(program: &Path) -> CrackResult<PathBuf> {
    if program.is_file() {
        return Ok(program.to_path_buf());
    }

    if is_path_like(program) {
        return Err(CrackError::AcceleratorMissing(program.to_path_buf()));
    }

    let path = std::env::var_os("PATH")
        .ok_or_else(|| CrackError::AcceleratorMissing(program.to_path_buf()))?;
    let names = candidate_program_names(program);

    std::env::split_paths(&path)
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|full| full.is_file())
        .ok_or_else(|| CrackError::AcceleratorMissing(program.to_path_buf()))
}

fn is_path_like(program: &Path) -> bool {
    program.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::CurDir | Component::RootDir | Component::Prefix(_)
        )
    }) || program.as_os_str().to_string_lossy().contains(['/', std::path::MAIN_SEPARATOR])
}

fn candidate_program_names(program: &Path) -> Vec<OsString> {
    let Some(file_name) = program.file_name() else {
        return Vec::new();
    };

    #[allow(unused_mut)]
    let mut names = vec![file_name.to_os_string()];

    #[cfg(windows)]
    if program.extension().is_none() {
        let pathext =
            std::env::var_os("PATHEXT").unwrap_or_else(|| OsString::from(".EXE;.CMD;.BAT;.COM"));
        for ext in pathext.to_string_lossy().split(';').filter(|s| !s.is_empty()) {
            let mut name = file_name.to_os_string();
            name.push(ext);
            names.push(name);
        }
    }

    names
}

/// Calls `on_line` with every line of the stream, without its line terminator.
/// Invalid UTF-8 is replaced rather than rejected. Stops early if `on_line` returns false.
fn for_each_line<R: Read>(stream: R, mut on_line: impl FnMut(String) -> bool) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }

                if !on_line(String::from_utf8_lossy(&buf).into_owned()) {
                    break;
                }
            }
            Err(err) => {
                debug!("stopped reading a process stream: {err}");
                break;
            }
        }
    }
}

/// Forwards every line of the stream to `sender` from a dedicated thread.
/// The channel disconnects when the stream is closed.
pub(crate) fn spawn_line_reader<R: Read + Send + 'static>(
    stream: R,
    sender: Sender<String>,
) -> JoinHandle<()> {
    thread::spawn(move || for_each_line(stream, |line| sender.send(line).is_ok()))
}

/// Keeps the last lines of the stream from a dedicated thread.
pub(crate) fn spawn_tail_reader<R: Read + Send + 'static>(
    stream: R,
    max_lines: usize,
) -> JoinHandle<Vec<String>> {
    thread::spawn(move || {
        let mut tail = Tail::new(max_lines);
        for_each_line(stream, |line| {
            tail.push(line);
            true
        });

        tail.into_lines()
    })
}

/// The last non-empty lines of some output.
#[derive(Debug)]
pub(crate) struct Tail {
    lines: VecDeque<String>,
    max_lines: usize,
}

impl Tail {
    pub(crate) fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(max_lines),
            max_lines,
        }
    }

    pub(crate) fn push(&mut self, line: String) {
        if line.trim().is_empty() || self.max_lines == 0 {
            return;
        }

        if self.lines.len() == self.max_lines {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub(crate) fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub(crate) fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }
}

/// The output of a process run to completion.
#[derive(Debug)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    /// True if the process was killed because it ran for too long.
    pub timed_out: bool,
}

/// Runs a program and captures its output, killing it after `timeout`.
pub fn run_captured(
    program: &Path,
    args: &[OsString],
    timeout: Duration,
) -> CrackResult<Captured> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("running {command:?}");
    let mut child = command.spawn().map_err(CrackError::Spawn)?;

    let stdout = child.stdout.take().map(|s| spawn_reader(s));
    let stderr = child.stderr.take().map(|s| spawn_reader(s));

    let (status, timed_out) = wait_with_timeout(&mut child, timeout)?;

    let join = |handle: Option<JoinHandle<String>>| {
        handle
            .map(|h| h.join().map_err(|_| CrackError::WorkerPanic))
            .transpose()
            .map(Option::unwrap_or_default)
    };

    Ok(Captured {
        status,
        stdout: join(stdout)?,
        stderr: join(stderr)?,
        timed_out,
    })
}

fn spawn_reader<R: Read + Send + 'static>(stream: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut lines = Vec::new();
        for_each_line(stream, |line| {
            lines.push(line);
            true
        });

        lines.join("\n")
    })
}

/// Waits for the process to exit, killing it once `timeout` has elapsed.
/// Returns the exit status and true if the process was killed.
pub(crate) fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> CrackResult<(ExitStatus, bool)> {
    let start = Instant::now();

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }

        if start.elapsed() >= timeout {
            let _ = child.kill();
            let status = child.wait()?;
            return Ok((status, true));
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// Joins `args` into a single printable command line.
pub(crate) fn display_command(program: &Path, args: &[OsString]) -> String {
    std::iter::once(program.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}
