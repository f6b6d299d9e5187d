use std::{
    sync::{
        atomic::{AtomicU64, AtomicU8, Ordering},
        Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::{
    accelerator::{build_args, AcceleratorSupervisor, Outcome, SupervisorConfig},
    error::{CrackError, CrackResult},
    event::{AttackResult, Event, ProgressSnapshot, Status},
    session::{AttackMode, AttackSession},
};

const RUN: u8 = 0;
const PAUSE: u8 = 1;
const STOP: u8 = 2;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Measures the running time of an attack, pauses excluded.
#[derive(Debug)]
struct Stopwatch {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl Stopwatch {
    fn start() -> Self {
        Self {
            accumulated: Duration::ZERO,
            running_since: Some(Instant::now()),
        }
    }

    fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    fn resume(&mut self) {
        self.running_since.get_or_insert_with(Instant::now);
    }

    fn elapsed(&self) -> Duration {
        self.accumulated + self.running_since.map_or(Duration::ZERO, |since| since.elapsed())
    }
}

/// The state shared between the engine and its worker.
struct Shared {
    session: AttackSession,
    /// What the worker should do, written under the status lock.
    control: AtomicU8,
    status: Mutex<Status>,
    /// Signaled when the control changes and when the attack ends.
    wake: Condvar,
    attempts: AtomicU64,
    snapshot: Mutex<ProgressSnapshot>,
    result: OnceLock<AttackResult>,
    subscribers: Mutex<Vec<Sender<Event>>>,
}

impl Shared {
    fn control(&self) -> u8 {
        self.control.load(Ordering::Acquire)
    }

    fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Acquire)
    }

    fn broadcast(&self, event: Event) {
        lock(&self.subscribers).retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn publish(&self, snapshot: ProgressSnapshot) {
        *lock(&self.snapshot) = snapshot.clone();
        self.broadcast(Event::Progress(snapshot));
    }

    /// Suspends the worker while the attack is paused.
    /// Returns false if the attack was stopped.
    fn park(&self, attempts_done: u64) -> bool {
        let mut status = lock(&self.status);

        if self.control() == PAUSE {
            debug!(attempts_done, "worker parked");
            self.broadcast(Event::Paused { attempts_done });

            while self.control() == PAUSE {
                status = self
                    .wake
                    .wait(status)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }

        self.control() != STOP
    }

    /// Records the result and moves to its terminal state. Only the first result is kept.
    fn finish(&self, result: AttackResult) {
        let mut status = lock(&self.status);
        if self.result.set(result.clone()).is_err() {
            return;
        }

        *status = result.termination.into();
        self.control.store(STOP, Ordering::Release);

        if *status == Status::Failed {
            error!(reason = %result.reason, "attack failed");
        } else {
            info!(
                status = %*status,
                attempts = result.attempts_total,
                "attack finished"
            );
        }

        self.broadcast(Event::Status(*status));
        self.broadcast(Event::Finished(result));
        // receivers see the end of the stream once the last event is read
        lock(&self.subscribers).clear();

        self.wake.notify_all();
    }
}

/// Drives an attack session from start to finish.
///
/// The attack runs on a worker thread, either by hashing candidates in process
/// or by supervising the accelerator. Every method returns immediately, except
/// [`AttackEngine::join`] and [`AttackEngine::stop`].
pub struct AttackEngine {
    shared: Arc<Shared>,
    supervisor: AcceleratorSupervisor,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AttackEngine {
    pub fn new(session: AttackSession) -> Self {
        Self {
            shared: Arc::new(Shared {
                session,
                control: AtomicU8::new(RUN),
                status: Mutex::new(Status::Idle),
                wake: Condvar::new(),
                attempts: AtomicU64::new(0),
                snapshot: Mutex::new(ProgressSnapshot::default()),
                result: OnceLock::new(),
                subscribers: Mutex::new(Vec::new()),
            }),
            supervisor: AcceleratorSupervisor::default(),
            worker: Mutex::new(None),
        }
    }

    /// Sets how the accelerator is launched, for sessions that use it.
    pub fn with_supervisor(mut self, config: SupervisorConfig) -> Self {
        self.supervisor = AcceleratorSupervisor::new(config);
        self
    }

    pub fn session(&self) -> &AttackSession {
        &self.shared.session
    }

    pub fn status(&self) -> Status {
        *lock(&self.shared.status)
    }

    /// A copy of the latest published progress.
    pub fn snapshot(&self) -> ProgressSnapshot {
        lock(&self.shared.snapshot).clone()
    }

    /// The number of candidates hashed so far.
    pub fn attempts(&self) -> u64 {
        self.shared.attempts()
    }

    /// The result, once the attack is over.
    pub fn result(&self) -> Option<AttackResult> {
        self.shared.result.get().cloned()
    }

    /// Returns a receiver of every event from now on.
    /// The channel is disconnected after the [`Event::Finished`] event.
    pub fn subscribe(&self) -> Receiver<Event> {
        let (sender, receiver) = crossbeam_channel::unbounded();

        let status = lock(&self.shared.status);
        match self.shared.result.get() {
            Some(result) => {
                let _ = sender.send(Event::Status(*status));
                let _ = sender.send(Event::Finished(result.clone()));
            }
            None => lock(&self.shared.subscribers).push(sender),
        }

        receiver
    }

    /// Starts the attack.
    ///
    /// Fails if the attack was already started. A session the accelerator cannot run
    /// is rejected and stays idle.
    pub fn start(&self) -> CrackResult<()> {
        let session = &self.shared.session;

        {
            let mut status = lock(&self.shared.status);
            if *status != Status::Idle {
                return Err(CrackError::InvalidState {
                    status: *status,
                    action: "start",
                });
            }

            if session.strategy().uses_accelerator() {
                build_args(session, self.supervisor.config())?;
            }

            *status = Status::Running;
            info!(
                session = session.id(),
                mode = %session.mode(),
                strategy = %session.strategy(),
                algorithm = %session.algorithm(),
                "attack started"
            );
            self.shared.broadcast(Event::Status(Status::Running));
        }

        let shared = Arc::clone(&self.shared);
        let supervisor = self.supervisor.clone();

        let spawned = thread::Builder::new()
            .name("attack-worker".to_owned())
            .spawn(move || {
                let result = if shared.session.strategy().uses_accelerator() {
                    run_accelerator(&shared, &supervisor)
                } else {
                    run_cpu(&shared)
                };

                shared.finish(result);
            });

        match spawned {
            Ok(handle) => {
                *lock(&self.worker) = Some(handle);
                Ok(())
            }
            Err(err) => {
                let err = CrackError::Io(err);
                self.shared
                    .finish(AttackResult::failed(err.diagnostic(), 0, Duration::ZERO));
                Err(err)
            }
        }
    }

    /// Suspends the attack after the candidate being hashed.
    ///
    /// The accelerator cannot be suspended, so pausing an attack it runs only
    /// emits a warning.
    pub fn pause(&self) -> CrackResult<()> {
        let mut status = lock(&self.shared.status);
        if *status != Status::Running {
            return Err(CrackError::InvalidState {
                status: *status,
                action: "pause",
            });
        }

        if self.shared.session.strategy().uses_accelerator() {
            let message = "The accelerator cannot be paused, the attack keeps running";
            warn!("{message}");
            self.shared.broadcast(Event::Warning(message.to_owned()));
            return Ok(());
        }

        self.shared.control.store(PAUSE, Ordering::Release);
        *status = Status::Paused;
        info!(attempts = self.shared.attempts(), "attack paused");
        self.shared.broadcast(Event::Status(Status::Paused));

        Ok(())
    }

    /// Resumes a paused attack right after the last hashed candidate.
    pub fn resume(&self) -> CrackResult<()> {
        let mut status = lock(&self.shared.status);
        if *status != Status::Paused {
            return Err(CrackError::InvalidState {
                status: *status,
                action: "resume",
            });
        }

        self.shared.control.store(RUN, Ordering::Release);
        *status = Status::Running;
        info!(attempts = self.shared.attempts(), "attack resumed");
        self.shared.broadcast(Event::Status(Status::Running));
        self.shared.wake.notify_all();

        Ok(())
    }

    /// Stops the attack and waits for its result.
    pub fn stop(&self) -> CrackResult<AttackResult> {
        {
            let status = lock(&self.shared.status);
            if !matches!(*status, Status::Running | Status::Paused) {
                return Err(CrackError::InvalidState {
                    status: *status,
                    action: "stop",
                });
            }

            info!("stopping the attack");
            self.shared.control.store(STOP, Ordering::Release);
            self.shared.wake.notify_all();
        }

        self.join()
    }

    /// Waits for the attack to end and returns its result.
    pub fn join(&self) -> CrackResult<AttackResult> {
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                let err = CrackError::WorkerPanic;
                let elapsed = lock(&self.shared.snapshot).elapsed;
                self.shared.finish(AttackResult::failed(
                    err.to_string(),
                    self.shared.attempts(),
                    elapsed,
                ));

                return Err(err);
            }
        }

        let mut status = lock(&self.shared.status);
        loop {
            if let Some(result) = self.shared.result.get() {
                return Ok(result.clone());
            }

            if *status == Status::Idle {
                return Err(CrackError::InvalidState {
                    status: *status,
                    action: "join",
                });
            }

            status = self
                .shared
                .wake
                .wait(status)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Drop for AttackEngine {
    fn drop(&mut self) {
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            {
                let _status = lock(&self.shared.status);
                self.shared.control.store(STOP, Ordering::Release);
                self.shared.wake.notify_all();
            }

            let _ = handle.join();
        }
    }
}

/// Hashes every candidate of the session in this process.
fn run_cpu(shared: &Shared) -> AttackResult {
    let session = &shared.session;
    let target = session.target();
    let cadence = session.mode().publish_cadence();

    let mut source = session.candidate_source();
    let mut clock = Stopwatch::start();
    let mut candidate: Option<String> = None;
    let mut published = 0;

    let publish = |attempts: u64, candidate: &Option<String>, clock: &Stopwatch, total| {
        shared.publish(ProgressSnapshot::measure(
            attempts,
            clock.elapsed(),
            candidate.clone(),
            total,
        ));
    };

    loop {
        match shared.control() {
            STOP => {
                let attempts = shared.attempts();
                if attempts != published {
                    publish(attempts, &candidate, &clock, source.total());
                }

                return AttackResult::stopped(attempts, clock.elapsed());
            }
            PAUSE => {
                clock.pause();
                let resumed = shared.park(shared.attempts());
                clock.resume();

                if resumed {
                    let attempts = shared.attempts();
                    debug!(attempts, "seeking after a pause");

                    if let Err(err) = source.seek(attempts as u128) {
                        return AttackResult::failed(err.diagnostic(), attempts, clock.elapsed());
                    }
                }

                continue;
            }
            _ => (),
        }

        let next = match source.next() {
            Ok(Some(next)) => next,
            Ok(None) => {
                let attempts = shared.attempts();
                if attempts != published {
                    publish(attempts, &candidate, &clock, source.total());
                }

                return AttackResult::exhausted(attempts, clock.elapsed());
            }
            Err(err) => {
                return AttackResult::failed(err.diagnostic(), shared.attempts(), clock.elapsed())
            }
        };

        let hit = target.is_hit(&next.value);
        let attempts = shared.attempts.fetch_add(1, Ordering::AcqRel) + 1;

        if hit {
            publish(attempts, &Some(next.value.clone()), &clock, source.total());
            return AttackResult::found(next.value, attempts, clock.elapsed());
        }

        candidate = Some(next.value);
        if attempts % cadence == 0 {
            publish(attempts, &candidate, &clock, source.total());
            published = attempts;
        }
    }
}

/// Hands the whole session to the accelerator and follows its progress.
fn run_accelerator(shared: &Shared, supervisor: &AcceleratorSupervisor) -> AttackResult {
    let session = &shared.session;
    let clock = Stopwatch::start();

    if session.mode() == AttackMode::BruteForce && session.keyspace().size() == 0 {
        return AttackResult::exhausted(0, clock.elapsed());
    }

    let outcome = supervisor.run(
        session,
        || shared.control() == STOP,
        |update| {
            let attempts = shared
                .attempts
                .fetch_max(update.attempts_done, Ordering::AcqRel)
                .max(update.attempts_done);

            shared.publish(ProgressSnapshot::new(
                attempts,
                clock.elapsed(),
                update.current_candidate.clone(),
                update.hashes_per_second,
                update.total,
            ));
        },
    );

    let attempts = shared.attempts();
    match outcome {
        Ok(Outcome::Found(password)) => AttackResult::found(password, attempts, clock.elapsed()),
        Ok(Outcome::Exhausted) => AttackResult::exhausted(attempts, clock.elapsed()),
        Ok(Outcome::Stopped) => AttackResult::stopped(attempts, clock.elapsed()),
        Err(err) => AttackResult::failed(err.diagnostic(), attempts, clock.elapsed()),
    }
}
