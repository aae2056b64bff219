//! Boot-time wiring of the scheduling subsystems.
//!
//! A [`SchedContext`] owns one instance of every subsystem and is passed
//! by reference to whoever needs it. There is no global state, so tests
//! build a fresh context each.

use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use steer_utils::{CpuMonitor, CpuTelemetryCache, CpuTopology};
use tracing::info;

use crate::clock::{Clock, MonotonicClock};
use crate::optimizer::AffinityOptimizer;
use crate::sched::{SchedConfig, Scheduler, DEFAULT_SLICE_NS};
use crate::steering::{SteeringConfig, SteeringPolicy};
use crate::thread::ThreadDescriptor;
use crate::types::{Priority, ThreadId, TimeNs};

pub struct SchedContext {
    topology: Arc<CpuTopology>,
    telemetry: Arc<CpuTelemetryCache>,
    sched: Arc<Scheduler>,
    steering: Arc<SteeringPolicy>,
    optimizer: AffinityOptimizer,
}

/// Builder for [`SchedContext`].
pub struct ContextBuilder {
    topology: CpuTopology,
    slice_ns: TimeNs,
    clock: Option<Arc<dyn Clock>>,
    steering: SteeringConfig,
    threads: Vec<ThreadDescriptor>,
}

impl SchedContext {
    pub fn builder(topology: CpuTopology) -> ContextBuilder {
        ContextBuilder {
            topology,
            slice_ns: DEFAULT_SLICE_NS,
            clock: None,
            steering: SteeringConfig::default(),
            threads: Vec::new(),
        }
    }

    pub fn topology(&self) -> &CpuTopology {
        &self.topology
    }

    pub fn telemetry(&self) -> &CpuTelemetryCache {
        &self.telemetry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    pub fn steering(&self) -> &SteeringPolicy {
        &self.steering
    }

    pub fn optimizer(&self) -> &AffinityOptimizer {
        &self.optimizer
    }

    /// Steer `tid` for one transaction at `prio`. Returns the chosen CPU.
    pub fn optimize(&self, tid: ThreadId, prio: Priority) -> usize {
        self.optimizer.optimize(tid, prio)
    }

    pub fn complete_transaction(&self, cpu: usize) {
        self.steering.notify_transaction_complete(cpu);
    }

    /// Publish fresh telemetry. Frequencies come from `hw`. Loads come from
    /// `hw` where it has them and from the scheduler's own accounting
    /// otherwise, which also starts a new load window.
    pub fn refresh_telemetry(&self, hw: &mut dyn CpuMonitor) -> usize {
        let mut monitor = SchedLoadOverlay {
            hw,
            loads: self.sched.sample_cpu_load(),
        };
        self.telemetry.refresh_from(&mut monitor)
    }
}

impl ContextBuilder {
    /// Set the scheduler time slice in nanoseconds.
    pub fn slice_ns(mut self, slice_ns: TimeNs) -> Self {
        self.slice_ns = slice_ns;
        self
    }

    /// Use `clock` instead of wall-clock time.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn steering(mut self, cfg: SteeringConfig) -> Self {
        self.steering = cfg;
        self
    }

    /// Admit `td` before steering is initialized, so that it can be the
    /// configured dispatch thread.
    pub fn thread(mut self, td: ThreadDescriptor) -> Self {
        self.threads.push(td);
        self
    }

    pub fn build(self) -> Result<SchedContext> {
        let topology = Arc::new(self.topology);
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let cfg = SchedConfig::new(topology.nr_cpus()).slice_ns(self.slice_ns);
        let sched = Arc::new(Scheduler::new(cfg, clock).context("Failed to create scheduler")?);

        for td in self.threads {
            let tid = td.id();
            sched
                .add_thread(td)
                .with_context(|| format!("Failed to admit thread {tid}"))?;
        }

        let telemetry = Arc::new(CpuTelemetryCache::for_topology(&topology));
        let steering = Arc::new(SteeringPolicy::new(
            topology.clone(),
            sched.clone(),
            self.steering,
        ));
        let preferred = steering
            .initialize()
            .context("Failed to initialize steering")?;
        let optimizer = AffinityOptimizer::new(steering.clone(), telemetry.clone(), sched.clone());

        info!(
            nr_cpus = topology.nr_cpus(),
            nr_threads = sched.nr_threads(),
            preferred,
            "scheduling context ready"
        );
        Ok(SchedContext {
            topology,
            telemetry,
            sched,
            steering,
            optimizer,
        })
    }
}

struct SchedLoadOverlay<'a> {
    hw: &'a mut dyn CpuMonitor,
    loads: Vec<u8>,
}

impl CpuMonitor for SchedLoadOverlay<'_> {
    fn frequency_mhz(&mut self, cpu: usize) -> Option<u32> {
        self.hw.frequency_mhz(cpu)
    }

    fn load_percent(&mut self, cpu: usize) -> Option<u8> {
        self.hw
            .load_percent(cpu)
            .or_else(|| self.loads.get(cpu).copied())
    }
}
