// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Synthetic workload driven through a scheduling context.
//!
//! One emergency-priority dispatcher plus real-time, fair and background
//! handler threads. Real-time threads behave periodically: after running
//! for a tick they sleep for their period. Every tick a fixed number of
//! transactions is handed to the handlers in round-robin order, each one
//! steered by the optimizer and completed on the CPU it was steered to.

use std::time::Duration;

use steer_sched::Priority;
use steer_sched::SchedContext;
use steer_sched::SchedError;
use steer_sched::ThreadDescriptor;
use steer_sched::ThreadId;
use tracing::trace;

const RT_PRIOS: [Priority; 3] = [Priority::AUDIO, Priority::VSYNC, Priority::INTERACTIVE];

pub struct Workload {
    dispatcher: ThreadId,
    handlers: Vec<(ThreadId, Priority)>,
    rt_period: Duration,
    tx_per_tick: u32,
    next_tx: usize,
    /// Thread seen on each CPU at the previous tick.
    prev: Vec<Option<ThreadId>>,
}

impl Workload {
    pub fn new(
        nr_rt: u64,
        nr_fair: u64,
        nr_bg: u64,
        rt_period: Duration,
        tx_per_tick: u32,
    ) -> Self {
        let mut handlers = vec![];
        let mut next_id = 2;
        let mut push = |prio: Priority| {
            handlers.push((ThreadId(next_id), prio));
            next_id += 1;
        };
        for i in 0..nr_rt {
            push(RT_PRIOS[i as usize % RT_PRIOS.len()]);
        }
        for i in 0..nr_fair {
            push(if i % 4 == 3 {
                Priority::LOWEST
            } else {
                Priority::NORMAL
            });
        }
        for _ in 0..nr_bg {
            push(Priority::BACKGROUND);
        }

        Self {
            dispatcher: ThreadId(1),
            handlers,
            rt_period,
            tx_per_tick,
            next_tx: 0,
            prev: vec![],
        }
    }

    /// The transaction dispatcher, bound to the preferred CPU at boot.
    pub fn dispatcher(&self) -> ThreadId {
        self.dispatcher
    }

    /// Descriptors of every thread to admit at boot.
    pub fn threads(&self) -> Vec<ThreadDescriptor> {
        std::iter::once(ThreadDescriptor::new(self.dispatcher, Priority::EMERGENCY))
            .chain(
                self.handlers
                    .iter()
                    .map(|&(tid, prio)| ThreadDescriptor::new(tid, prio)),
            )
            .collect()
    }

    /// Tick every CPU, put real-time threads that used up their run to
    /// sleep, then dispatch this tick's transactions.
    pub fn tick(&mut self, ctx: &SchedContext) -> Result<(), SchedError> {
        let sched = ctx.scheduler();
        self.prev.resize(sched.nr_cpus(), None);

        for cpu in 0..sched.nr_cpus() {
            let running = sched.tick(cpu)?;
            let ran_before = running.is_some() && running == self.prev[cpu];
            let is_rt = running
                .and_then(|tid| sched.thread(tid))
                .is_some_and(|snap| snap.priority.is_rt());
            if ran_before && is_rt {
                let tid = sched.sleep(cpu, self.rt_period)?;
                trace!(cpu, tid = tid.0, "periodic thread done");
                self.prev[cpu] = None;
            } else {
                self.prev[cpu] = running;
            }
        }

        if self.handlers.is_empty() {
            return Ok(());
        }
        for _ in 0..self.tx_per_tick {
            let (tid, prio) = self.handlers[self.next_tx % self.handlers.len()];
            self.next_tx += 1;
            let cpu = ctx.optimize(tid, prio);
            ctx.complete_transaction(cpu);
        }
        Ok(())
    }
}
