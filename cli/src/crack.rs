use std::{
    io::{self, IsTerminal, Write},
    path::PathBuf,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use crossterm::{
    cursor::MoveToColumn,
    event::{self, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{self, Clear, ClearType},
};
use human_repr::{HumanCount, HumanDuration, HumanThroughput};
use tracing::{debug, info, warn};

use hashrecover_core::{
    default_wordlists, estimate_duration, identify, Affix, Algorithm, AttackEngine, AttackReport,
    AttackResult, AttackSession, AttackSessionBuilder, Charset, DeviceManager, Event, Mask,
    ProgressSnapshot, Status, SupervisorConfig, Termination,
};

use crate::Crack;

const TICK: Duration = Duration::from_millis(100);

/// How long the CPU is measured before an attack.
const CPU_BENCHMARK: Duration = Duration::from_millis(250);

/// Puts the terminal in raw mode until dropped, so single key presses can be read.
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode().context("Unable to read the keyboard")?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Guesses the algorithm from the shape of the digest.
fn detect_algorithm(digest: &str) -> Result<Algorithm> {
    let kinds = identify(digest);

    match kinds.iter().find_map(|kind| kind.algorithm()) {
        Some(algorithm) => {
            info!(%algorithm, "algorithm guessed from the digest");
            Ok(algorithm)
        }
        None if kinds.is_empty() => bail!("Unable to guess the algorithm of this digest"),
        None => bail!(
            "This digest looks like {}, which is not supported",
            kinds[0].description()
        ),
    }
}

fn build_session(args: &Crack) -> Result<AttackSession> {
    let algorithm = match args.algorithm {
        Some(algorithm) => algorithm.into(),
        None => detect_algorithm(&args.digest)?,
    };

    let mut wordlists: Vec<PathBuf> = args.wordlists.clone();
    if let Some(dir) = &args.all_wordlists {
        let found = default_wordlists(dir);
        if found.is_empty() {
            bail!("No usual wordlist found in {}", dir.display());
        }

        wordlists.extend(found);
    }

    let builder = AttackSessionBuilder::new()
        .target(algorithm, &args.digest)
        .strategy(args.device.into());

    let mask = args.mask.as_deref().map(Mask::parse).transpose()?;
    let affix = if args.prefix {
        Affix::Prefix
    } else {
        Affix::Suffix
    };

    let builder = match mask {
        Some(mask) if wordlists.is_empty() => builder.mask(mask),
        Some(mask) => builder.hybrid(wordlists, mask, affix),
        None if wordlists.is_empty() => {
            let charset = match (&args.charset, &args.preset) {
                (Some(symbols), _) => Charset::new(symbols)?,
                (None, Some(name)) => Charset::preset(name)?,
                (None, None) => Charset::default(),
            };

            builder
                .brute_force()
                .charset(charset)
                .max_password_length(args.max_length)
        }
        None => {
            if args.charset.is_some() || args.preset.is_some() {
                warn!("the charset is ignored when wordlists are given");
            }

            builder.dictionary(wordlists)
        }
    };

    Ok(builder.build()?)
}

fn render_progress(snapshot: &ProgressSnapshot) -> Result<()> {
    let eta = snapshot
        .eta
        .map(|eta| eta.as_secs().human_duration().to_string())
        .unwrap_or_else(|| "unknown".to_owned());

    let mut stderr = io::stderr();
    execute!(stderr, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    write!(
        stderr,
        "{} tried | {} | elapsed {} | remaining {} | {}",
        snapshot.attempts_done.human_count_bare(),
        snapshot.speed_per_second.human_throughput("H"),
        snapshot.elapsed.as_secs().human_duration(),
        eta,
        snapshot.current_candidate.as_deref().unwrap_or_default(),
    )?;
    stderr.flush()?;

    Ok(())
}

fn clear_progress() -> Result<()> {
    execute!(io::stderr(), MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    Ok(())
}

/// Pauses, resumes or stops the attack according to the key pressed.
fn handle_user_events(engine: &AttackEngine) -> Result<()> {
    if !event::poll(TICK)? {
        return Ok(());
    }

    let crossterm::event::Event::Key(key_event) = event::read()? else {
        return Ok(());
    };

    if key_event.kind != KeyEventKind::Press {
        return Ok(());
    }

    let action = match key_event.code {
        KeyCode::Char('p') => engine.pause(),
        KeyCode::Char('r') => engine.resume(),
        KeyCode::Char('q') | KeyCode::Esc => engine.stop().map(drop),
        KeyCode::Char('c') if key_event.modifiers.contains(KeyModifiers::CONTROL) => {
            engine.stop().map(drop)
        }
        _ => Ok(()),
    };

    if let Err(err) = action {
        debug!("ignored key: {err}");
    }

    Ok(())
}

/// Renders the events of the attack until it is over.
fn watch(
    engine: &AttackEngine,
    events: &Receiver<Event>,
    interactive: bool,
) -> Result<AttackResult> {
    let _raw_mode = interactive.then(RawMode::enable).transpose()?;

    loop {
        let event = if interactive {
            handle_user_events(engine)?;
            events.try_recv().map_err(|_| RecvTimeoutError::Timeout)
        } else {
            events.recv_timeout(TICK)
        };

        match event {
            Ok(Event::Progress(snapshot)) => render_progress(&snapshot)?,
            Ok(Event::Paused { attempts_done }) => {
                clear_progress()?;
                eprint!("Paused after {attempts_done} attempts, press r to resume");
            }
            Ok(Event::Status(Status::Running)) => clear_progress()?,
            Ok(Event::Status(_)) => (),
            Ok(Event::Warning(warning)) => {
                clear_progress()?;
                warn!("{warning}");
            }
            Ok(Event::Finished(result)) => {
                clear_progress()?;
                return Ok(result);
            }
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => return Ok(engine.join()?),
        }
    }
}

/// Logs how many candidates the attack has and how long trying them all should take.
fn announce_estimate(manager: &mut DeviceManager, session: &AttackSession) -> Result<()> {
    let candidates = session
        .count_candidates()
        .context("Unable to count the candidates")?;
    let count = (candidates as f64).human_count_bare();

    let rate = manager.expected_rate(session.algorithm(), session.strategy());
    match rate.and_then(|rate| Some((rate, estimate_duration(candidates, rate)?))) {
        Some((rate, duration)) => info!(
            "{count} candidates, at most {} at {}",
            duration.as_secs().human_duration(),
            rate.human_throughput("H")
        ),
        None => info!("{count} candidates"),
    }

    Ok(())
}

/// Runs an attack against a digest and prints the outcome.
pub fn crack(args: Crack) -> Result<()> {
    let session = build_session(&args)?;

    let config = SupervisorConfig {
        program: args.accelerator.clone(),
        ..Default::default()
    };

    let mut manager = DeviceManager::new(config.clone()).with_benchmark_duration(CPU_BENCHMARK);
    let strategy = manager.select_strategy(&session);
    let session = session.with_strategy(strategy);
    announce_estimate(&mut manager, &session)?;

    info!(
        id = session.id(),
        mode = %session.mode(),
        algorithm = %session.algorithm(),
        %strategy,
        "starting the attack"
    );

    let engine = AttackEngine::new(session).with_supervisor(config);
    let events = engine.subscribe();
    engine.start()?;

    let interactive = io::stdin().is_terminal() && io::stderr().is_terminal();
    if interactive {
        eprintln!("Press p to pause, r to resume and q to stop.");
    }

    let result = watch(&engine, &events, interactive)?;

    if args.json {
        let report = AttackReport::new(engine.session(), &result);
        println!("{}", report.to_json()?);
        return Ok(());
    }

    match result.termination {
        Termination::Found => {
            println!("{}", result.password.as_deref().unwrap_or_default());
            info!(
                "{} in {}",
                result.reason,
                result.duration.as_secs().human_duration()
            );
        }
        Termination::Failed => bail!("The attack failed: {}", result.reason),
        Termination::Exhausted | Termination::Stopped => warn!("{}", result.reason),
    }

    Ok(())
}
