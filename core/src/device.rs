use std::{
    cmp::Ordering,
    fmt::Display,
    hint::black_box,
    time::{Duration, Instant},
};

use hashrecover_commons::Algorithm;
use rayon::prelude::*;
use serde::Serialize;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::{debug, info, warn};

use crate::{
    accelerator::{hash_mode, AcceleratorSupervisor, SupervisorConfig},
    session::{AttackSession, Strategy},
};

/// The default duration of a CPU benchmark.
pub const DEFAULT_BENCHMARK_DURATION: Duration = Duration::from_secs(1);

/// How long the accelerator may take to list or benchmark devices.
const ACCELERATOR_TIMEOUT: Duration = Duration::from_secs(60);

const GIB: u64 = 1024 * 1024 * 1024;

/// The kind of a device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DeviceType {
    Cpu,
    Gpu,
}

impl Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "CPU"),
            Self::Gpu => write!(f, "GPU"),
        }
    }
}

/// A coarse performance class.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Tier {
    Low,
    Mid,
    High,
}

impl Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Mid => write!(f, "MID"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// A device able to hash candidates.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Device {
    pub kind: DeviceType,
    /// The id of the device for the accelerator. The CPU of this process has none.
    pub accelerator_id: Option<u32>,
    pub name: String,
    pub memory_bytes: u64,
    /// Logical cores for a CPU, compute units for a GPU.
    pub compute_units: u32,
    /// The measured rates, in hashes per second.
    pub rates: Vec<(Algorithm, f64)>,
    pub tier: Tier,
}

impl Device {
    /// The measured rate for an algorithm.
    pub fn rate(&self, algorithm: Algorithm) -> Option<f64> {
        self.rates
            .iter()
            .find(|(a, _)| *a == algorithm)
            .map(|(_, rate)| *rate)
    }

    /// The best measured rate, whatever the algorithm.
    pub fn best_rate(&self) -> Option<f64> {
        self.rates
            .iter()
            .map(|(_, rate)| *rate)
            .max_by(f64::total_cmp)
    }

    fn set_rate(&mut self, algorithm: Algorithm, rate: f64) {
        match self.rates.iter_mut().find(|(a, _)| *a == algorithm) {
            Some((_, r)) => *r = rate,
            None => self.rates.push((algorithm, rate)),
        }
    }
}

/// The limits between tiers. A device reaching either the memory (or core)
/// limit or the rate limit of a tier belongs to it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TierThresholds {
    pub gpu_high_memory: u64,
    pub gpu_high_rate: f64,
    pub gpu_mid_memory: u64,
    pub gpu_mid_rate: f64,
    pub cpu_high_cores: u32,
    pub cpu_high_rate: f64,
    pub cpu_mid_cores: u32,
    pub cpu_mid_rate: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            gpu_high_memory: 8 * GIB,
            gpu_high_rate: 10e9,
            gpu_mid_memory: 4 * GIB,
            gpu_mid_rate: 1e9,
            cpu_high_cores: 16,
            cpu_high_rate: 100e6,
            cpu_mid_cores: 8,
            cpu_mid_rate: 20e6,
        }
    }
}

impl TierThresholds {
    /// Classifies a device from its resources and its best rate.
    pub fn classify(&self, device: &Device) -> Tier {
        let rate = device.best_rate().unwrap_or(0.);

        let (high, mid) = match device.kind {
            DeviceType::Gpu => (
                device.memory_bytes >= self.gpu_high_memory || rate >= self.gpu_high_rate,
                device.memory_bytes >= self.gpu_mid_memory || rate >= self.gpu_mid_rate,
            ),
            DeviceType::Cpu => (
                device.compute_units >= self.cpu_high_cores || rate >= self.cpu_high_rate,
                device.compute_units >= self.cpu_mid_cores || rate >= self.cpu_mid_rate,
            ),
        };

        if high {
            Tier::High
        } else if mid {
            Tier::Mid
        } else {
            Tier::Low
        }
    }
}

/// Describes the CPU running this process.
pub fn cpu_device() -> Device {
    let system = System::new_with_specifics(
        RefreshKind::new()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything()),
    );

    let name = system
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_owned())
        .filter(|brand| !brand.is_empty())
        .unwrap_or_else(|| "CPU".to_owned());

    let compute_units = match system.cpus().len() {
        0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
        n => n,
    };

    Device {
        kind: DeviceType::Cpu,
        accelerator_id: None,
        name,
        memory_bytes: system.total_memory(),
        compute_units: compute_units as u32,
        rates: Vec::new(),
        tier: Tier::Low,
    }
}

/// Moves to the next candidate of a keyspace over `a..=z`.
fn increment(candidate: &mut [u8]) {
    for byte in candidate.iter_mut().rev() {
        if *byte < b'z' {
            *byte += 1;
            return;
        }
        *byte = b'a';
    }
}

/// The number of threads the in-process attack hashes on.
pub const CPU_ATTACK_THREADS: usize = 1;

/// Measures how many candidates per second the CPU hashes on `threads` threads.
/// [`CPU_ATTACK_THREADS`] gives the rate of an in-process attack.
pub fn benchmark_cpu(algorithm: Algorithm, duration: Duration, threads: usize) -> f64 {
    const BATCH: u64 = 1024;

    let start = Instant::now();

    let attempts: u64 = (0..threads.max(1))
        .into_par_iter()
        .map(|thread| {
            // each thread gets its own slice of the keyspace
            let mut candidate = *b"aaaaaaaa";
            candidate[0] = b'a' + (thread % 26) as u8;
            let mut attempts: u64 = 0;

            loop {
                for _ in 0..BATCH {
                    increment(&mut candidate[1..]);
                    black_box(algorithm.digest(black_box(&candidate)));
                }
                attempts += BATCH;

                if start.elapsed() >= duration {
                    break;
                }
            }

            attempts
        })
        .sum();

    let elapsed = start.elapsed().as_secs_f64();
    if elapsed == 0. {
        0.
    } else {
        attempts as f64 / elapsed
    }
}

/// The time needed to go through `candidates` at the given rate.
pub fn estimate_duration(candidates: u128, hashes_per_second: f64) -> Option<Duration> {
    crate::event::remaining_time(candidates, hashes_per_second)
}

/// Chooses where a session runs among the given devices.
///
/// A session that asks for the CPU stays on the CPU. Otherwise, devices are ranked
/// by tier, then GPUs before CPUs, then by rate for the algorithm of the session.
/// The accelerator is kept only if the best device is a GPU it benchmarked.
/// [`Strategy::Auto`] then becomes [`Strategy::Accelerator`].
pub fn choose_strategy(devices: &[Device], algorithm: Algorithm, requested: Strategy) -> Strategy {
    if requested == Strategy::Cpu {
        return Strategy::Cpu;
    }

    let rate = |device: &Device| device.rate(algorithm).unwrap_or(0.);
    let best = devices.iter().max_by(|a, b| {
        (a.tier, a.kind)
            .cmp(&(b.tier, b.kind))
            .then_with(|| rate(a).partial_cmp(&rate(b)).unwrap_or(Ordering::Equal))
    });

    match best {
        Some(device) if device.kind == DeviceType::Gpu && rate(device) > 0. => {
            info!(device = %device.name, %requested, "running on the accelerator");
            match requested {
                Strategy::Auto => Strategy::Accelerator,
                _ => requested,
            }
        }
        _ if requested == Strategy::Auto => {
            info!("no accelerator device ranks first, running on the CPU");
            Strategy::Cpu
        }
        _ => {
            warn!(%requested, "no usable accelerator device, running on the CPU instead");
            Strategy::Cpu
        }
    }
}

/// A row of the device diagnostics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiagnosticRow {
    pub kind: DeviceType,
    pub name: String,
    pub memory_bytes: u64,
    pub compute_units: u32,
    pub algorithm: Option<Algorithm>,
    pub rate: Option<f64>,
    pub tier: Tier,
}

/// Finds the devices able to run an attack, measures them and picks the best strategy.
pub struct DeviceManager {
    supervisor: AcceleratorSupervisor,
    thresholds: TierThresholds,
    benchmark_duration: Duration,
    devices: Option<Vec<Device>>,
}

impl DeviceManager {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            supervisor: AcceleratorSupervisor::new(config),
            thresholds: TierThresholds::default(),
            benchmark_duration: DEFAULT_BENCHMARK_DURATION,
            devices: None,
        }
    }

    pub fn with_thresholds(mut self, thresholds: TierThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Sets how long the CPU is benchmarked.
    pub fn with_benchmark_duration(mut self, duration: Duration) -> Self {
        self.benchmark_duration = duration;
        self
    }

    /// Lists the CPU and the GPUs of the accelerator, if it is installed.
    pub fn devices(&mut self) -> &[Device] {
        let thresholds = self.thresholds;
        let supervisor = &self.supervisor;

        self.devices.get_or_insert_with(|| {
            let mut devices = vec![cpu_device()];

            match supervisor.list_devices(ACCELERATOR_TIMEOUT) {
                Ok(listed) => devices.extend(
                    listed
                        .into_iter()
                        .filter(|device| device.kind == DeviceType::Gpu)
                        .map(|device| Device {
                            kind: device.kind,
                            accelerator_id: Some(device.id),
                            name: device.name,
                            memory_bytes: device.memory_bytes,
                            compute_units: device.compute_units,
                            rates: Vec::new(),
                            tier: Tier::Low,
                        }),
                ),
                Err(err) => debug!("no accelerator devices: {}", err.diagnostic()),
            }

            for device in &mut devices {
                device.tier = thresholds.classify(device);
            }

            devices
        })
    }

    /// Measures every device for an algorithm, unless it was already measured.
    pub fn benchmark(&mut self, algorithm: Algorithm) -> &[Device] {
        self.devices();

        let thresholds = self.thresholds;
        let duration = self.benchmark_duration;
        let supervisor = &self.supervisor;

        for device in self.devices.iter_mut().flatten() {
            if device.rate(algorithm).is_some() {
                continue;
            }

            let rate = match device.accelerator_id {
                None => Some(benchmark_cpu(algorithm, duration, CPU_ATTACK_THREADS)),
                Some(id) => {
                    match supervisor.benchmark_device(hash_mode(algorithm), id, ACCELERATOR_TIMEOUT)
                    {
                        Ok(rate) => rate,
                        Err(err) => {
                            warn!(device = %device.name, "benchmark failed: {}", err.diagnostic());
                            None
                        }
                    }
                }
            };

            match rate {
                Some(rate) => {
                    debug!(device = %device.name, %algorithm, rate, "benchmarked");
                    device.set_rate(algorithm, rate);
                }
                None => warn!(device = %device.name, %algorithm, "no benchmark result"),
            }

            device.tier = thresholds.classify(device);
        }

        self.devices.as_deref().unwrap_or_default()
    }

    /// Chooses where the session should run, measuring the devices if needed.
    /// Sessions asking for the CPU are not measured.
    pub fn select_strategy(&mut self, session: &AttackSession) -> Strategy {
        if session.strategy() == Strategy::Cpu {
            return Strategy::Cpu;
        }

        let devices = self.benchmark(session.algorithm());
        choose_strategy(devices, session.algorithm(), session.strategy())
    }

    /// The rate a strategy is expected to reach, from the devices measured so far.
    /// The CPU is measured on its own when needed, without listing the accelerator devices.
    pub fn expected_rate(&mut self, algorithm: Algorithm, strategy: Strategy) -> Option<f64> {
        if strategy.uses_accelerator() {
            let rate: f64 = self
                .benchmark(algorithm)
                .iter()
                .filter(|device| strategy == Strategy::Mixed || device.kind == DeviceType::Gpu)
                .filter_map(|device| device.rate(algorithm))
                .sum();

            return (rate > 0.).then_some(rate);
        }

        let measured = self
            .devices
            .iter()
            .flatten()
            .find(|device| device.accelerator_id.is_none())
            .and_then(|device| device.rate(algorithm));

        Some(measured.unwrap_or_else(|| {
            benchmark_cpu(algorithm, self.benchmark_duration, CPU_ATTACK_THREADS)
        }))
    }

    /// One row per device and measured algorithm.
    pub fn diagnostics(&mut self) -> Vec<DiagnosticRow> {
        let mut rows = Vec::new();

        for device in self.devices() {
            let row = |algorithm, rate| DiagnosticRow {
                kind: device.kind,
                name: device.name.clone(),
                memory_bytes: device.memory_bytes,
                compute_units: device.compute_units,
                algorithm,
                rate,
                tier: device.tier,
            };

            if device.rates.is_empty() {
                rows.push(row(None, None));
            }

            for (algorithm, rate) in &device.rates {
                rows.push(row(Some(*algorithm), Some(*rate)));
            }
        }

        rows
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hashrecover_commons::Algorithm;

    use super::*;

    fn device(kind: DeviceType, memory_gib: u64, units: u32, rate: Option<f64>) -> Device {
        let mut device = Device {
            kind,
            accelerator_id: (kind == DeviceType::Gpu).then_some(1),
            name: format!("{kind}"),
            memory_bytes: memory_gib * GIB,
            compute_units: units,
            rates: rate.map(|rate| vec![(Algorithm::Md5, rate)]).unwrap_or_default(),
            tier: Tier::Low,
        };
        device.tier = TierThresholds::default().classify(&device);

        device
    }

    #[test]
    fn test_gpu_tiers() {
        assert_eq!(device(DeviceType::Gpu, 8, 1, None).tier, Tier::High);
        assert_eq!(device(DeviceType::Gpu, 2, 1, Some(20e9)).tier, Tier::High);
        assert_eq!(device(DeviceType::Gpu, 4, 1, None).tier, Tier::Mid);
        assert_eq!(device(DeviceType::Gpu, 2, 1, Some(2e9)).tier, Tier::Mid);
        assert_eq!(device(DeviceType::Gpu, 2, 1, Some(1e8)).tier, Tier::Low);
    }

    #[test]
    fn test_cpu_tiers() {
        assert_eq!(device(DeviceType::Cpu, 64, 16, None).tier, Tier::High);
        assert_eq!(device(DeviceType::Cpu, 64, 4, Some(150e6)).tier, Tier::High);
        assert_eq!(device(DeviceType::Cpu, 64, 8, None).tier, Tier::Mid);
        assert_eq!(device(DeviceType::Cpu, 64, 4, Some(30e6)).tier, Tier::Mid);
        assert_eq!(device(DeviceType::Cpu, 64, 4, Some(1e6)).tier, Tier::Low);
    }

    #[test]
    fn test_choose_strategy() {
        let cpu = device(DeviceType::Cpu, 16, 8, Some(30e6));
        let gpu = device(DeviceType::Gpu, 10, 68, Some(50e9));
        let small_gpu = device(DeviceType::Gpu, 2, 8, Some(1e8));
        let broken_gpu = device(DeviceType::Gpu, 10, 68, None);

        let devices = [cpu.clone(), gpu];
        assert_eq!(
            choose_strategy(&devices, Algorithm::Md5, Strategy::Accelerator),
            Strategy::Accelerator
        );
        assert_eq!(
            choose_strategy(&devices, Algorithm::Md5, Strategy::Mixed),
            Strategy::Mixed
        );
        assert_eq!(
            choose_strategy(&devices, Algorithm::Md5, Strategy::Cpu),
            Strategy::Cpu
        );

        // a MID CPU ranks before a LOW GPU
        assert_eq!(
            choose_strategy(&[cpu.clone(), small_gpu], Algorithm::Md5, Strategy::Accelerator),
            Strategy::Cpu
        );

        // a GPU the accelerator could not benchmark is never chosen
        assert_eq!(
            choose_strategy(&[cpu, broken_gpu], Algorithm::Md5, Strategy::Accelerator),
            Strategy::Cpu
        );
        assert_eq!(choose_strategy(&[], Algorithm::Md5, Strategy::Mixed), Strategy::Cpu);
    }

    #[test]
    fn test_auto_strategy_follows_ranking() {
        let cpu = device(DeviceType::Cpu, 16, 8, Some(30e6));
        let gpu = device(DeviceType::Gpu, 10, 68, Some(50e9));
        let small_gpu = device(DeviceType::Gpu, 2, 8, Some(1e8));

        assert_eq!(
            choose_strategy(&[cpu.clone(), gpu], Algorithm::Md5, Strategy::Auto),
            Strategy::Accelerator
        );
        assert_eq!(
            choose_strategy(&[cpu.clone(), small_gpu], Algorithm::Md5, Strategy::Auto),
            Strategy::Cpu
        );
        assert_eq!(choose_strategy(&[cpu], Algorithm::Md5, Strategy::Auto), Strategy::Cpu);
    }

    #[test]
    fn test_estimate_duration() {
        assert_eq!(estimate_duration(6, 2.), Some(Duration::from_secs(3)));
        assert_eq!(estimate_duration(6, 0.), None);
    }

    #[test]
    fn test_increment() {
        let mut candidate = *b"az";
        increment(&mut candidate);
        assert_eq!(&candidate, b"ba");

        let mut candidate = *b"zz";
        increment(&mut candidate);
        assert_eq!(&candidate, b"aa");
    }

    #[test]
    fn test_benchmark_cpu() {
        let single = benchmark_cpu(Algorithm::Md5, Duration::from_millis(50), CPU_ATTACK_THREADS);
        assert!(single > 0.);

        let threads = rayon::current_num_threads();
        let all = benchmark_cpu(Algorithm::Md5, Duration::from_millis(50), threads);
        assert!(all > 0.);
    }

    #[test]
    fn test_cpu_device() {
        let cpu = cpu_device();

        assert_eq!(cpu.kind, DeviceType::Cpu);
        assert!(cpu.compute_units > 0);
        assert_eq!(cpu.accelerator_id, None);
    }

    #[test]
    fn test_manager_without_accelerator() {
        let mut manager = DeviceManager::new(SupervisorConfig {
            program: "/nonexistent/hashcat".into(),
            ..Default::default()
        })
        .with_benchmark_duration(Duration::from_millis(20));

        let session = crate::AttackSessionBuilder::new()
            .target(Algorithm::Md5, "098f6bcd4621d373cade4e832627b4f6")
            .strategy(Strategy::Accelerator)
            .build()
            .unwrap();

        assert_eq!(manager.select_strategy(&session), Strategy::Cpu);
        assert_eq!(
            manager.select_strategy(&session.clone().with_strategy(Strategy::Auto)),
            Strategy::Cpu
        );

        let devices = manager.devices();
        assert_eq!(devices.len(), 1);
        let cpu_rate = devices[0].rate(Algorithm::Md5);
        assert!(cpu_rate.is_some());
        assert_eq!(manager.diagnostics().len(), 1);

        // the measured CPU rate is reused, the accelerator has none
        assert_eq!(manager.expected_rate(Algorithm::Md5, Strategy::Cpu), cpu_rate);
        assert_eq!(manager.expected_rate(Algorithm::Md5, Strategy::Accelerator), None);
    }
}
