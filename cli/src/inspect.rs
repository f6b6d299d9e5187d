use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_BORDERS_ONLY, Cell, Color, Table};
use human_repr::{HumanCount, HumanThroughput};

use hashrecover_core::{
    benchmark_cpu, identify as identify_hash, Algorithm, DeviceManager, SupervisorConfig,
    WordlistInfo, CPU_ATTACK_THREADS,
};

use crate::{Benchmark, Devices, Hash, Identify, Wordlist};

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(header);
    table
}

/// Lists the hash kinds the input could be, most likely first.
pub fn identify(args: Identify) {
    let kinds = identify_hash(&args.hash);

    if kinds.is_empty() {
        println!("Unknown hash format");
        return;
    }

    let mut table = new_table(vec!["Kind", "Description", "Supported"]);

    for kind in kinds {
        let supported = match kind.algorithm() {
            Some(algorithm) => Cell::new(format!("yes ({algorithm})")).fg(Color::Green),
            None => Cell::new("no").fg(Color::Grey),
        };

        table.add_row(vec![
            Cell::new(kind),
            Cell::new(kind.description()),
            supported,
        ]);
    }

    println!("{table}");
}

/// Prints the digest of a text, in hexadecimal.
pub fn hash(args: Hash) {
    let algorithm: Algorithm = args.algorithm.into();
    println!("{}", algorithm.hash(&args.text));
}

/// Lists the CPU and the accelerator devices, measuring them if asked.
pub fn devices(args: Devices) {
    let config = SupervisorConfig {
        program: args.accelerator,
        ..Default::default()
    };
    let mut manager = DeviceManager::new(config);

    if let Some(algorithm) = args.benchmark {
        manager.benchmark(algorithm.into());
    }

    let mut table = new_table(vec![
        "Type",
        "Name",
        "Memory",
        "Compute units",
        "Algorithm",
        "Rate",
        "Tier",
    ]);

    for row in manager.diagnostics() {
        let (algorithm, rate) = match (row.algorithm, row.rate) {
            (Some(algorithm), Some(rate)) => (
                Cell::new(algorithm),
                Cell::new(rate.human_throughput("H")).fg(Color::Green),
            ),
            _ => (Cell::new("-"), Cell::new("-").fg(Color::Grey)),
        };

        table.add_row(vec![
            Cell::new(row.kind),
            Cell::new(row.name),
            Cell::new(row.memory_bytes.human_count_bytes()),
            Cell::new(row.compute_units),
            algorithm,
            rate,
            Cell::new(row.tier),
        ]);
    }

    println!("{table}");
}

/// Measures how fast the CPU hashes with every algorithm.
/// The in-process attack hashes on a single thread, the accelerator can use every core.
pub fn benchmark(args: Benchmark) {
    let duration = Duration::from_secs_f64(args.seconds);
    let threads = rayon::current_num_threads();
    let mut table = new_table(vec![
        "Algorithm",
        "Attack rate",
        &format!("Rate on {threads} threads"),
    ]);

    for algorithm in Algorithm::ALL {
        let single = benchmark_cpu(algorithm, duration, CPU_ATTACK_THREADS);
        let all = benchmark_cpu(algorithm, duration, threads);
        table.add_row(vec![
            Cell::new(algorithm),
            Cell::new(single.human_throughput("H")).fg(Color::Green),
            Cell::new(all.human_throughput("H")),
        ]);
    }

    println!("{table}");
}

/// Prints statistics about each wordlist.
pub fn wordlist(args: Wordlist) -> Result<()> {
    let mut table = new_table(vec![
        "Path",
        "Words",
        "Size",
        "Lengths",
        "Average length",
        "Malformed lines",
    ]);

    for path in &args.paths {
        let info = WordlistInfo::inspect(path)
            .with_context(|| format!("Unable to inspect {}", path.display()))?;

        let lengths = if info.word_count == 0 {
            "-".to_owned()
        } else {
            format!("{}..={}", info.min_length, info.max_length)
        };

        let malformed = if info.malformed_lines == 0 {
            Cell::new(0)
        } else {
            Cell::new(info.malformed_lines).fg(Color::Yellow)
        };

        table.add_row(vec![
            Cell::new(info.path.display()),
            Cell::new(info.word_count.human_count_bare()),
            Cell::new(info.file_size.human_count_bytes()),
            Cell::new(lengths),
            Cell::new(format!("{:.1}", info.avg_length)),
            malformed,
        ]);
    }

    println!("{table}");

    Ok(())
}
