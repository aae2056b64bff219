// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Transaction affinity optimizer.
//!
//! Called right before a server thread is woken to handle one
//! latency-sensitive transaction. The steering policy proposes a CPU, live
//! telemetry may promote an overloaded little CPU to the preferred big one,
//! and the thread is pinned to the result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use steer_utils::{CpuMask, CpuTelemetryCache};
use tracing::{debug, trace, warn};

use crate::affinity;
use crate::sched::Scheduler;
use crate::steering::SteeringPolicy;
use crate::types::{Priority, ThreadId};

/// A little CPU loaded above this is a promotion candidate.
pub const PROMOTE_LITTLE_LOAD: u8 = 95;
/// Promotion only happens if the preferred CPU is loaded below this.
pub const PROMOTE_PREFERRED_MAX_LOAD: u8 = 80;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizerStats {
    pub nr_optimized: u64,
    pub nr_promoted: u64,
    pub nr_apply_failed: u64,
}

pub struct AffinityOptimizer {
    policy: Arc<SteeringPolicy>,
    telemetry: Arc<CpuTelemetryCache>,
    sched: Arc<Scheduler>,
    nr_optimized: AtomicU64,
    nr_promoted: AtomicU64,
    nr_apply_failed: AtomicU64,
}

impl AffinityOptimizer {
    pub fn new(
        policy: Arc<SteeringPolicy>,
        telemetry: Arc<CpuTelemetryCache>,
        sched: Arc<Scheduler>,
    ) -> Self {
        Self {
            policy,
            telemetry,
            sched,
            nr_optimized: AtomicU64::new(0),
            nr_promoted: AtomicU64::new(0),
            nr_apply_failed: AtomicU64::new(0),
        }
    }

    /// Pin `tid` to the best CPU for a transaction at `prio` and return
    /// that CPU. Calling it again with unchanged telemetry and scheduler
    /// state yields the same CPU.
    pub fn optimize(&self, tid: ThreadId, prio: Priority) -> usize {
        let mut target = match self.policy.select_target_cpu_for(tid, prio) {
            Some(cpu) => cpu,
            None => self.sched.current_cpu(tid).unwrap_or(0),
        };

        let freq = self.telemetry.read_frequency(target);
        let load = self.telemetry.read_load(target);
        trace!(tid = tid.0, target, freq, load, "steering target");

        if self.policy.topology().is_little(target) && load > PROMOTE_LITTLE_LOAD {
            if let Some(preferred) = self.policy.preferred_cpu() {
                let preferred_load = self.telemetry.read_load(preferred);
                if preferred_load < PROMOTE_PREFERRED_MAX_LOAD {
                    debug!(
                        tid = tid.0,
                        from = target,
                        to = preferred,
                        load,
                        preferred_load,
                        "promoting to preferred cpu"
                    );
                    self.nr_promoted.fetch_add(1, Ordering::Relaxed);
                    target = preferred;
                }
            }
        }

        if let Err(e) = affinity::apply(&self.sched, tid, CpuMask::single(target)) {
            warn!(tid = tid.0, target, "failed to apply affinity: {e}");
            self.nr_apply_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.nr_optimized.fetch_add(1, Ordering::Relaxed);
        target
    }

    pub fn stats(&self) -> OptimizerStats {
        OptimizerStats {
            nr_optimized: self.nr_optimized.load(Ordering::Relaxed),
            nr_promoted: self.nr_promoted.load(Ordering::Relaxed),
            nr_apply_failed: self.nr_apply_failed.load(Ordering::Relaxed),
        }
    }
}
