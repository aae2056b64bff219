// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.
mod workload;
use workload::Workload;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use steer_sched::MonotonicClock;
use steer_sched::Priority;
use steer_sched::SchedContext;
use steer_sched::SteeringConfig;
use steer_utils::CpuMask;
use steer_utils::CpuTopology;
use steer_utils::SysfsFreqMonitor;
use tracing::debug;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// steerd: a hybrid real-time / fair scheduler with big/little CPU steering
///
/// Threads at priority 70 and above are real-time: they run strictly
/// before everything else, FIFO within a priority level. Threads below 70
/// share the remaining time by virtual runtime.
///
/// Each transaction is steered before its handler thread is woken. Critical
/// work goes to the fastest CPU, background work to a little CPU and the
/// rest to the least busy CPU. A little CPU loaded above 95% hands the
/// transaction to the fastest CPU when that one is below 80%.
///
/// steerd drives the scheduler with a synthetic workload over a synthetic
/// or sysfs-discovered topology and periodically reports statistics.
#[derive(Debug, Parser)]
struct Opts {
    /// Number of CPUs of the synthetic topology. Ignored with --sysfs.
    #[clap(short = 'n', long, default_value = "8")]
    nr_cpus: usize,

    /// High-performance CPUs of the synthetic topology as a cpulist, e.g.
    /// "4-7". An empty list describes a homogeneous system.
    #[clap(short = 'b', long, default_value = "4-7")]
    big_cpus: String,

    /// Discover the topology and read CPU frequencies below this sysfs
    /// root instead of using a synthetic topology.
    #[clap(long, env = "STEERD_SYSFS")]
    sysfs: Option<PathBuf>,

    /// Scheduling slice duration in microseconds.
    #[clap(short = 's', long, default_value = "4000")]
    slice_us: u64,

    /// Scheduler tick interval in microseconds.
    #[clap(short = 't', long, default_value = "1000")]
    tick_us: u64,

    /// Transactions at or above this priority go to the fastest CPU.
    #[clap(long, default_value = "70")]
    critical_prio: u8,

    /// Transactions below this priority go to a little CPU.
    #[clap(long, default_value = "50")]
    normal_prio: u8,

    /// Number of real-time handler threads.
    #[clap(long, default_value = "4")]
    rt_threads: u64,

    /// Number of fair handler threads.
    #[clap(long, default_value = "8")]
    fair_threads: u64,

    /// Number of background threads.
    #[clap(long, default_value = "4")]
    bg_threads: u64,

    /// How long a real-time thread sleeps after each run, in microseconds.
    #[clap(long, default_value = "8000")]
    rt_period_us: u64,

    /// Transactions dispatched per tick.
    #[clap(long, default_value = "2")]
    tx_per_tick: u32,

    /// Statistics and telemetry refresh interval in seconds.
    #[clap(short = 'i', long, default_value = "2.0")]
    interval: f64,

    /// Exit after this many seconds. 0 runs until interrupted.
    #[clap(short = 'd', long, default_value = "0")]
    duration: f64,

    /// Enable verbose output. Specify multiple times to increase
    /// verbosity. RUST_LOG takes precedence when set.
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn build_topology(opts: &Opts) -> Result<CpuTopology> {
    if let Some(root) = &opts.sysfs {
        return CpuTopology::from_sysfs(root)
            .with_context(|| format!("Failed to discover topology under {:?}", root));
    }
    let big = if opts.big_cpus.trim().is_empty() {
        CpuMask::empty()
    } else {
        CpuMask::from_cpulist(&opts.big_cpus)
            .with_context(|| format!("Invalid big CPU list {:?}", &opts.big_cpus))?
    };
    CpuTopology::with_big_cpus(opts.nr_cpus, &big)
}

struct Steerd {
    ctx: SchedContext,
    workload: Workload,
    monitor: SysfsFreqMonitor,
    tick_interval: Duration,
    report_interval: Duration,
    nr_ticks: u64,
}

impl Steerd {
    fn init(opts: &Opts) -> Result<Self> {
        if opts.critical_prio < opts.normal_prio {
            bail!(
                "Critical priority {} is below normal priority {}",
                opts.critical_prio,
                opts.normal_prio
            );
        }
        if opts.tick_us == 0 {
            bail!("Tick interval must be positive");
        }

        let topology = build_topology(opts)?;
        let nr_cpus = topology.nr_cpus();
        info!(
            nr_cpus,
            big = %topology.big_span(),
            little = %topology.little_span(),
            "topology"
        );

        let workload = Workload::new(
            opts.rt_threads,
            opts.fair_threads,
            opts.bg_threads,
            Duration::from_micros(opts.rt_period_us),
            opts.tx_per_tick,
        );
        let mut builder = SchedContext::builder(topology)
            .slice_ns(opts.slice_us.saturating_mul(1000))
            .clock(Arc::new(MonotonicClock::new()))
            .steering(SteeringConfig {
                critical_priority: Priority::new(opts.critical_prio),
                normal_priority: Priority::new(opts.normal_prio),
                dispatch_thread: Some(workload.dispatcher()),
            });
        for td in workload.threads() {
            builder = builder.thread(td);
        }
        let ctx = builder.build()?;

        let sysfs = opts.sysfs.clone().unwrap_or_else(|| PathBuf::from("/sys"));
        Ok(Self {
            ctx,
            workload,
            monitor: SysfsFreqMonitor::new(sysfs, nr_cpus),
            tick_interval: Duration::from_micros(opts.tick_us),
            report_interval: Duration::from_secs_f64(opts.interval.max(0.01)),
            nr_ticks: 0,
        })
    }

    fn tick(&mut self) -> Result<()> {
        self.workload.tick(&self.ctx)?;
        self.nr_ticks += 1;
        Ok(())
    }

    fn report(&mut self) -> Result<()> {
        let refreshed = self.ctx.refresh_telemetry(&mut self.monitor);
        let opt = self.ctx.optimizer().stats();
        info!(
            "ticks={} optimized={} promoted={} apply_failed={} telemetry={}",
            self.nr_ticks, opt.nr_optimized, opt.nr_promoted, opt.nr_apply_failed, refreshed
        );

        let mut buf = Vec::new();
        self.ctx.scheduler().stats().format(&mut buf)?;
        for line in String::from_utf8_lossy(&buf).lines() {
            info!("{}", line);
        }

        let telemetry = self.ctx.telemetry();
        for cpu in 0..telemetry.nr_cpus() {
            if let Some(sample) = telemetry.sample(cpu) {
                debug!(
                    cpu,
                    freq_mhz = sample.freq_mhz,
                    load = sample.load_percent,
                    completions = self.ctx.steering().completions(cpu),
                    "telemetry"
                );
            }
        }
        Ok(())
    }

    fn run(&mut self, shutdown: Arc<AtomicBool>, duration: Option<Duration>) -> Result<()> {
        let start = Instant::now();
        let mut next_tick_at = start + self.tick_interval;
        let mut next_report_at = start + self.report_interval;

        while !shutdown.load(Ordering::Relaxed) {
            let now = Instant::now();
            if duration.is_some_and(|d| now.duration_since(start) >= d) {
                break;
            }

            if now >= next_tick_at {
                self.tick()?;
                next_tick_at += self.tick_interval;
                if next_tick_at < now {
                    next_tick_at = now + self.tick_interval;
                }
            }

            if now >= next_report_at {
                self.report()?;
                next_report_at += self.report_interval;
                if next_report_at < now {
                    next_report_at = now + self.report_interval;
                }
            }

            std::thread::sleep(
                next_tick_at
                    .min(next_report_at)
                    .saturating_duration_since(Instant::now()),
            );
        }

        self.report()?;
        info!("steerd exiting after {} ticks", self.nr_ticks);
        Ok(())
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let opts = Opts::parse();
    init_tracing(opts.verbose);

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::Relaxed);
    })
    .context("Error setting Ctrl-C handler")?;

    let duration = (opts.duration > 0.0).then(|| Duration::from_secs_f64(opts.duration));
    let mut steerd = Steerd::init(&opts)?;
    steerd.run(shutdown, duration)
}
