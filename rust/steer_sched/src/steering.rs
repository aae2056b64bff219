// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! CPU steering policy.
//!
//! At boot the policy picks a preferred high-performance CPU. Afterwards it
//! maps a transaction's priority to a target CPU:
//!
//! - critical work goes to the preferred CPU,
//! - background work goes to a representative little CPU,
//! - everything else goes to the least busy CPU according to the scheduler.
//!
//! The preferred CPU is written only by [`SteeringPolicy::initialize`] and
//! read lock-free by every dispatcher.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use steer_utils::{CpuMask, CpuTopology};
use tracing::{info, trace, warn};

use crate::affinity;
use crate::error::SchedError;
use crate::sched::Scheduler;
use crate::types::{Priority, ThreadId};

const NO_CPU: usize = usize::MAX;

#[derive(Debug, Clone)]
pub struct SteeringConfig {
    /// Priorities at or above this go to the preferred CPU.
    pub critical_priority: Priority,
    /// Priorities below this go to a little CPU when there is one.
    pub normal_priority: Priority,
    /// Thread bound to the preferred CPU at initialization, typically the
    /// transaction dispatcher itself.
    pub dispatch_thread: Option<ThreadId>,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            critical_priority: Priority::INTERACTIVE,
            normal_priority: Priority::NORMAL,
            dispatch_thread: None,
        }
    }
}

pub struct SteeringPolicy {
    topology: Arc<CpuTopology>,
    sched: Arc<Scheduler>,
    cfg: SteeringConfig,
    preferred: AtomicUsize,
    completions: Box<[AtomicU64]>,
}

impl SteeringPolicy {
    pub fn new(topology: Arc<CpuTopology>, sched: Arc<Scheduler>, cfg: SteeringConfig) -> Self {
        let completions = (0..topology.nr_cpus()).map(|_| AtomicU64::new(0)).collect();
        Self {
            topology,
            sched,
            cfg,
            preferred: AtomicUsize::new(NO_CPU),
            completions,
        }
    }

    /// Pick the preferred CPU: the highest-performance CPU if there are big
    /// cores, CPU 0 otherwise. The dispatch thread, if configured, is bound
    /// to it. Fails only for a topology without CPUs.
    pub fn initialize(&self) -> Result<usize, SchedError> {
        if self.topology.nr_cpus() == 0 {
            return Err(SchedError::EmptyTopology);
        }

        let preferred = if self.topology.has_big_cores() {
            self.topology.highest_perf_cpu().unwrap_or(0)
        } else {
            0
        };
        self.preferred.store(preferred, Ordering::Release);
        info!(
            preferred,
            big = %self.topology.big_span(),
            little = %self.topology.little_span(),
            "steering initialized"
        );

        if let Some(tid) = self.cfg.dispatch_thread {
            if let Err(e) = affinity::apply(&self.sched, tid, CpuMask::single(preferred)) {
                warn!(tid = tid.0, preferred, "failed to bind dispatch thread: {e}");
            }
        }
        Ok(preferred)
    }

    /// Preferred CPU, `None` before a successful [`Self::initialize`].
    pub fn preferred_cpu(&self) -> Option<usize> {
        match self.preferred.load(Ordering::Acquire) {
            NO_CPU => None,
            cpu => Some(cpu),
        }
    }

    /// Target CPU for work at `prio`. `None` only if the scheduler has no
    /// CPU to offer.
    pub fn select_target_cpu(&self, prio: Priority) -> Option<usize> {
        self.select(None, prio)
    }

    /// Target CPU for `tid` running work at `prio`. Differs from
    /// [`Self::select_target_cpu`] only on the least busy fallback, where
    /// `tid` itself is not counted as load.
    pub fn select_target_cpu_for(&self, tid: ThreadId, prio: Priority) -> Option<usize> {
        self.select(Some(tid), prio)
    }

    fn select(&self, tid: Option<ThreadId>, prio: Priority) -> Option<usize> {
        if prio >= self.cfg.critical_priority {
            if let Some(cpu) = self.preferred_cpu() {
                trace!(prio = prio.get(), cpu, "critical, preferred cpu");
                return Some(cpu);
            }
        }
        if prio < self.cfg.normal_priority && self.topology.has_little_cores() {
            let cpu = self.topology.first_little_cpu();
            trace!(prio = prio.get(), ?cpu, "background, little cpu");
            return cpu;
        }
        let cpu = match tid {
            Some(tid) => self.sched.least_busy_cpu_for(tid),
            None => self.sched.least_busy_cpu(),
        };
        trace!(prio = prio.get(), ?cpu, "least busy cpu");
        cpu
    }

    /// Record that a transaction finished on `cpu`.
    pub fn notify_transaction_complete(&self, cpu: usize) {
        let Some(count) = self.completions.get(cpu) else {
            warn!(cpu, "transaction completion on invalid cpu");
            return;
        };
        count.fetch_add(1, Ordering::Relaxed);
        self.sched.report_work_finished(cpu);
    }

    /// Transactions completed on `cpu` so far.
    pub fn completions(&self, cpu: usize) -> u64 {
        self.completions
            .get(cpu)
            .map_or(0, |count| count.load(Ordering::Relaxed))
    }

    pub fn topology(&self) -> &CpuTopology {
        &self.topology
    }

    pub fn config(&self) -> &SteeringConfig {
        &self.cfg
    }
}
