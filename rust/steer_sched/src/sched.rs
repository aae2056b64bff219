// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Hybrid real-time / fair scheduler core.
//!
//! All runqueue state lives behind one spin lock that is only ever held for
//! bounded, non-blocking work. Per-CPU reschedule flags and completion
//! counters are atomics outside the lock so that other subsystems can poke
//! them without contending with dispatch.
//!
//! A single pair of runqueues is shared by every CPU. `schedule(cpu)` picks
//! the best thread whose affinity allows `cpu`:
//!
//! 1. Real-time levels 99 down to 70, FIFO within a level.
//! 2. Only if no real-time thread is eligible, the fair thread with the
//!    lowest virtual runtime.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use steer_utils::{CpuMask, MAX_CPUS};
use tracing::{debug, trace, warn};

use crate::clock::Clock;
use crate::error::SchedError;
use crate::runqueue::{FairRunqueue, RtRunqueue};
use crate::thread::{QueueSlot, ThreadDescriptor, ThreadSnapshot, ThreadState};
use crate::timer::{TimerId, TimerKind, TimerTable};
use crate::types::{Priority, SchedClass, ThreadId, TimeNs};

/// Default time slice.
pub const DEFAULT_SLICE_NS: TimeNs = 4_000_000;

#[derive(Debug, Clone)]
pub struct SchedConfig {
    pub nr_cpus: usize,
    /// How long a thread runs before its CPU is asked to reschedule.
    pub slice_ns: TimeNs,
}

impl SchedConfig {
    pub fn new(nr_cpus: usize) -> Self {
        Self {
            nr_cpus,
            slice_ns: DEFAULT_SLICE_NS,
        }
    }

    pub fn slice_ns(mut self, slice_ns: TimeNs) -> Self {
        self.slice_ns = slice_ns;
        self
    }
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self::new(1)
    }
}

#[derive(Debug, Default)]
struct CpuState {
    current: Option<ThreadId>,
    /// Last time the running thread was charged for its runtime.
    last_account_ns: TimeNs,
    /// Busy time since `window_start_ns`, for load sampling.
    busy_ns: TimeNs,
    window_start_ns: TimeNs,
    slice_timer: Option<TimerId>,
}

#[derive(Debug, Default)]
struct Counters {
    nr_dispatches: u64,
    nr_switches: u64,
    nr_wakeups: u64,
}

#[derive(Debug)]
struct RunState {
    threads: HashMap<ThreadId, ThreadDescriptor>,
    rt: RtRunqueue,
    fair: FairRunqueue,
    cpus: Vec<CpuState>,
    timers: TimerTable,
    counters: Counters,
}

/// Point-in-time scheduler statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedStats {
    pub nr_threads: usize,
    pub nr_rt_queued: usize,
    pub nr_fair_queued: usize,
    pub nr_dispatches: u64,
    pub nr_switches: u64,
    pub nr_wakeups: u64,
    pub nr_pending_timers: usize,
    /// Currently running thread per CPU.
    pub running: Vec<Option<ThreadId>>,
    /// Completed transactions per CPU.
    pub completed: Vec<u64>,
}

impl SchedStats {
    pub fn format<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        writeln!(
            w,
            "threads={} rt_q={} fair_q={} dispatch={} switch={} wakeup={} timers={}",
            self.nr_threads,
            self.nr_rt_queued,
            self.nr_fair_queued,
            self.nr_dispatches,
            self.nr_switches,
            self.nr_wakeups,
            self.nr_pending_timers,
        )?;
        for (cpu, (running, completed)) in self.running.iter().zip(&self.completed).enumerate() {
            let running = running.map_or_else(|| "idle".to_string(), |tid| tid.to_string());
            writeln!(w, "  cpu{cpu:<3} running={running:<8} completed={completed}")?;
        }
        Ok(())
    }
}

pub struct Scheduler {
    state: spin::Mutex<RunState>,
    need_resched: Box<[AtomicBool]>,
    completed: Box<[AtomicU64]>,
    online: CpuMask,
    slice_ns: TimeNs,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    /// Create a scheduler for CPUs `0..cfg.nr_cpus`.
    pub fn new(cfg: SchedConfig, clock: Arc<dyn Clock>) -> Result<Self, SchedError> {
        if cfg.nr_cpus > MAX_CPUS {
            return Err(SchedError::InvalidCpu(cfg.nr_cpus));
        }
        let now = clock.now_ns();
        let cpus = (0..cfg.nr_cpus)
            .map(|_| CpuState {
                last_account_ns: now,
                window_start_ns: now,
                ..Default::default()
            })
            .collect();
        Ok(Self {
            state: spin::Mutex::new(RunState {
                threads: HashMap::new(),
                rt: RtRunqueue::new(),
                fair: FairRunqueue::new(),
                cpus,
                timers: TimerTable::new(),
                counters: Counters::default(),
            }),
            need_resched: (0..cfg.nr_cpus).map(|_| AtomicBool::new(false)).collect(),
            completed: (0..cfg.nr_cpus).map(|_| AtomicU64::new(0)).collect(),
            online: CpuMask::first_n(cfg.nr_cpus),
            slice_ns: cfg.slice_ns,
            clock,
        })
    }

    pub fn nr_cpus(&self) -> usize {
        self.need_resched.len()
    }

    pub fn now_ns(&self) -> TimeNs {
        self.clock.now_ns()
    }

    fn check_cpu(&self, cpu: usize) -> Result<(), SchedError> {
        if cpu >= self.nr_cpus() {
            return Err(SchedError::InvalidCpu(cpu));
        }
        Ok(())
    }

    fn request_resched(&self, cpu: usize) {
        if let Some(flag) = self.need_resched.get(cpu) {
            flag.store(true, Ordering::Release);
        }
    }

    /// Whether `cpu` has a pending reschedule request.
    pub fn need_resched(&self, cpu: usize) -> bool {
        self.need_resched
            .get(cpu)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Admit a thread. Its runtime accounting starts from zero and it is
    /// queued on the runqueue matching its priority. The affinity is
    /// narrowed to the CPUs this scheduler runs.
    pub fn add_thread(&self, mut td: ThreadDescriptor) -> Result<(), SchedError> {
        let affinity = td.affinity.and(&self.online);
        if affinity.is_empty() {
            return Err(SchedError::NoOnlineCpu(td.affinity));
        }

        let mut state = self.state.lock();
        if state.threads.contains_key(&td.id) {
            return Err(SchedError::DuplicateThread(td.id));
        }
        td.vruntime = Default::default();
        td.last_dispatch_ns = 0;
        td.runtime_ns = 0;
        td.affinity = affinity;
        td.state = ThreadState::Ready;
        td.queue = None;
        td.last_cpu = None;
        td.wake_timer = None;

        let tid = td.id;
        debug!(tid = tid.0, prio = td.priority.get(), "add thread");
        state.threads.insert(tid, td);
        enqueue(&mut state, tid);
        self.kick_for(&state, tid);
        Ok(())
    }

    /// Remove a thread for good. It leaves its runqueue, its pending wake-up
    /// is cancelled and a CPU running it is asked to reschedule.
    pub fn remove_thread(&self, tid: ThreadId) -> Result<ThreadSnapshot, SchedError> {
        let mut state = self.state.lock();
        let now = self.clock.now_ns();
        if !state.threads.contains_key(&tid) {
            return Err(SchedError::UnknownThread(tid));
        }
        let running_on = match state.threads[&tid].state {
            ThreadState::Running { cpu } => Some(cpu),
            _ => None,
        };
        if let Some(cpu) = running_on {
            account_current(&mut state, cpu, now);
            state.cpus[cpu].current = None;
            if let Some(timer) = state.cpus[cpu].slice_timer.take() {
                state.timers.cancel(timer);
            }
            self.request_resched(cpu);
        }
        dequeue(&mut state, tid);

        let Some(mut td) = state.threads.remove(&tid) else {
            return Err(SchedError::UnknownThread(tid));
        };
        if let Some(timer) = td.wake_timer.take() {
            state.timers.cancel(timer);
        }
        td.state = ThreadState::Terminated;
        debug!(tid = tid.0, runtime_ns = td.runtime_ns, "remove thread");
        Ok(td.snapshot())
    }

    /// Run the dispatch loop for `cpu`.
    ///
    /// The running thread is charged for the time since it was last
    /// accounted and, if still runnable, goes back to the tail of its
    /// runqueue. Then the best eligible thread is dispatched. Returns the
    /// thread now running on `cpu`, `None` if it is idle.
    ///
    /// # Panics
    /// Panics if a runqueue holds a thread that is not registered or that is
    /// already on another runqueue.
    pub fn schedule(&self, cpu: usize) -> Result<Option<ThreadId>, SchedError> {
        self.check_cpu(cpu)?;
        let mut state = self.state.lock();
        let now = self.clock.now_ns();
        self.need_resched[cpu].store(false, Ordering::Release);

        let prev = state.cpus[cpu].current;
        if let Some(prev) = prev {
            account_current(&mut state, cpu, now);
            let td = state
                .threads
                .get_mut(&prev)
                .unwrap_or_else(|| panic!("cpu {cpu} runs unregistered thread {prev}"));
            if td.state == (ThreadState::Running { cpu }) {
                td.state = ThreadState::Ready;
                let stays = td.affinity.is_set(cpu);
                enqueue(&mut state, prev);
                if !stays {
                    self.kick_for(&state, prev);
                }
            }
        } else {
            state.cpus[cpu].last_account_ns = now;
        }

        let next = pick_next(&mut state, cpu);
        state.cpus[cpu].current = next;
        if let Some(timer) = state.cpus[cpu].slice_timer.take() {
            state.timers.cancel(timer);
        }

        let Some(next) = next else {
            trace!(cpu, "idle");
            return Ok(None);
        };

        let td = state
            .threads
            .get_mut(&next)
            .unwrap_or_else(|| panic!("runqueue holds unregistered thread {next}"));
        td.state = ThreadState::Running { cpu };
        td.last_cpu = Some(cpu);
        if prev != Some(next) {
            td.last_dispatch_ns = now;
            state.counters.nr_switches += 1;
            debug!(
                cpu,
                prev = prev.map(|tid| tid.0),
                next = next.0,
                "context switch"
            );
        }
        state.counters.nr_dispatches += 1;
        let timer = state
            .timers
            .arm(now.saturating_add(self.slice_ns), TimerKind::SliceEnd { cpu });
        state.cpus[cpu].slice_timer = Some(timer);
        Ok(Some(next))
    }

    /// Timer tick for `cpu`: fire expired timers, then run the dispatch loop
    /// if a reschedule is pending or the CPU is idle.
    pub fn tick(&self, cpu: usize) -> Result<Option<ThreadId>, SchedError> {
        self.check_cpu(cpu)?;
        self.dispatch_timers();
        if self.need_resched(cpu) || self.current(cpu).is_none() {
            return self.schedule(cpu);
        }
        Ok(self.current(cpu))
    }

    /// Fire every timer whose deadline has passed. Returns how many fired.
    pub fn dispatch_timers(&self) -> usize {
        let mut state = self.state.lock();
        let now = self.clock.now_ns();
        let fired = state.timers.expire(now);
        for &(id, kind) in fired.iter() {
            match kind {
                TimerKind::Wake(tid) => {
                    if let Some(td) = state.threads.get_mut(&tid) {
                        if td.wake_timer == Some(id) {
                            td.wake_timer = None;
                        }
                    }
                    self.wake_locked(&mut state, tid);
                }
                TimerKind::SliceEnd { cpu } => {
                    if state.cpus[cpu].slice_timer == Some(id) {
                        state.cpus[cpu].slice_timer = None;
                    }
                    trace!(cpu, "slice expired");
                    self.request_resched(cpu);
                }
            }
        }
        fired.len()
    }

    /// Change a thread's priority, moving it to the matching runqueue. A
    /// raised priority asks every CPU the thread may run on to reschedule.
    pub fn set_thread_priority(&self, tid: ThreadId, prio: Priority) -> Result<(), SchedError> {
        let mut state = self.state.lock();
        let td = state
            .threads
            .get(&tid)
            .ok_or(SchedError::UnknownThread(tid))?;
        let old = td.priority;
        let queued = td.queue.is_some();
        let affinity = td.affinity;
        let running_on = match td.state {
            ThreadState::Running { cpu } => Some(cpu),
            _ => None,
        };

        if queued {
            dequeue(&mut state, tid);
        }
        if let Some(td) = state.threads.get_mut(&tid) {
            td.priority = prio;
        }
        if queued {
            enqueue(&mut state, tid);
        }
        debug!(tid = tid.0, old = old.get(), new = prio.get(), "set priority");

        if prio > old {
            for cpu in affinity.iter().chain(running_on) {
                self.request_resched(cpu);
            }
        }
        Ok(())
    }

    /// Give up `cpu`. A fair thread is charged for its runtime so far before
    /// the reschedule request.
    pub fn yield_now(&self, cpu: usize) -> Result<(), SchedError> {
        self.check_cpu(cpu)?;
        let mut state = self.state.lock();
        let now = self.clock.now_ns();
        let Some(tid) = state.cpus[cpu].current else {
            return Ok(());
        };
        if state.threads[&tid].priority.class() == SchedClass::Fair {
            account_current(&mut state, cpu, now);
        }
        trace!(cpu, tid = tid.0, "yield");
        self.request_resched(cpu);
        Ok(())
    }

    /// Put the thread running on `cpu` to sleep for `duration`. It leaves
    /// the CPU immediately and is requeued by [`Self::dispatch_timers`] once
    /// the deadline passes, or earlier by [`Self::wake`].
    pub fn sleep(&self, cpu: usize, duration: Duration) -> Result<ThreadId, SchedError> {
        self.check_cpu(cpu)?;
        let mut state = self.state.lock();
        let now = self.clock.now_ns();
        let tid = state.cpus[cpu]
            .current
            .ok_or(SchedError::NoCurrentThread(cpu))?;

        account_current(&mut state, cpu, now);
        state.cpus[cpu].current = None;
        if let Some(timer) = state.cpus[cpu].slice_timer.take() {
            state.timers.cancel(timer);
        }

        let delay = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        let timer = state
            .timers
            .arm(now.saturating_add(delay), TimerKind::Wake(tid));
        let td = state
            .threads
            .get_mut(&tid)
            .unwrap_or_else(|| panic!("cpu {cpu} runs unregistered thread {tid}"));
        assert!(td.queue.is_none(), "running thread {tid} is on a runqueue");
        td.state = ThreadState::Blocked;
        td.wake_timer = Some(timer);

        debug!(cpu, tid = tid.0, delay_ns = delay, "sleep");
        self.request_resched(cpu);
        Ok(tid)
    }

    /// Make a blocked thread runnable. Returns false if it was not blocked.
    pub fn wake(&self, tid: ThreadId) -> Result<bool, SchedError> {
        let mut state = self.state.lock();
        let td = state
            .threads
            .get_mut(&tid)
            .ok_or(SchedError::UnknownThread(tid))?;
        if let Some(timer) = td.wake_timer.take() {
            state.timers.cancel(timer);
        }
        Ok(self.wake_locked(&mut state, tid))
    }

    fn wake_locked(&self, state: &mut RunState, tid: ThreadId) -> bool {
        match state.threads.get_mut(&tid) {
            Some(td) if td.state == ThreadState::Blocked => td.state = ThreadState::Ready,
            _ => return false,
        }
        trace!(tid = tid.0, "wake");
        state.counters.nr_wakeups += 1;
        enqueue(state, tid);
        self.kick_for(state, tid);
        true
    }

    /// Restrict the CPUs `tid` may run on. The mask is narrowed to the CPUs
    /// this scheduler runs and must keep at least one. A thread running
    /// outside the new mask is moved on its CPU's next reschedule.
    pub fn set_affinity(&self, tid: ThreadId, mask: CpuMask) -> Result<(), SchedError> {
        if mask.is_empty() {
            return Err(SchedError::EmptyMask);
        }
        let affinity = mask.and(&self.online);
        if affinity.is_empty() {
            return Err(SchedError::NoOnlineCpu(mask));
        }

        let mut state = self.state.lock();
        let td = state
            .threads
            .get_mut(&tid)
            .ok_or(SchedError::UnknownThread(tid))?;
        if td.affinity == affinity {
            return Ok(());
        }
        td.affinity = affinity;
        let thread_state = td.state;
        trace!(tid = tid.0, %affinity, "set affinity");

        match thread_state {
            ThreadState::Running { cpu } if !affinity.is_set(cpu) => {
                debug!(tid = tid.0, cpu, "migrating off cpu");
                self.request_resched(cpu);
            }
            ThreadState::Ready => self.kick_for(&state, tid),
            _ => {}
        }
        Ok(())
    }

    /// Ask CPUs that could run `tid` right away to reschedule: idle ones and
    /// ones running a lower-priority thread.
    fn kick_for(&self, state: &RunState, tid: ThreadId) {
        let Some(td) = state.threads.get(&tid) else {
            return;
        };
        for cpu in td.affinity.iter() {
            let preempt = match state.cpus.get(cpu).and_then(|c| c.current) {
                None => true,
                Some(cur) => state
                    .threads
                    .get(&cur)
                    .is_some_and(|cur| cur.priority < td.priority),
            };
            if preempt {
                self.request_resched(cpu);
            }
        }
    }

    /// Thread running on `cpu`.
    pub fn current(&self, cpu: usize) -> Option<ThreadId> {
        self.state.lock().cpus.get(cpu).and_then(|c| c.current)
    }

    /// CPU `tid` is on: where it runs, else where it last ran if still
    /// allowed, else its first allowed CPU.
    pub fn current_cpu(&self, tid: ThreadId) -> Option<usize> {
        self.state.lock().threads.get(&tid).and_then(|td| td.home_cpu())
    }

    pub fn thread(&self, tid: ThreadId) -> Option<ThreadSnapshot> {
        self.state.lock().threads.get(&tid).map(|td| td.snapshot())
    }

    pub fn nr_threads(&self) -> usize {
        self.state.lock().threads.len()
    }

    /// Threads at `prio` waiting on the real-time runqueue, head first.
    pub fn rt_queue(&self, prio: Priority) -> Vec<ThreadId> {
        self.state.lock().rt.level(prio)
    }

    /// Fair threads in dispatch order.
    pub fn fair_queue(&self) -> Vec<ThreadId> {
        self.state.lock().fair.ordered()
    }

    /// CPU with the fewest runnable threads homed on it, lowest id first.
    pub fn least_busy_cpu(&self) -> Option<usize> {
        self.least_busy(None)
    }

    /// Like [`Self::least_busy_cpu`], but `tid` does not count against any
    /// CPU. Steering a thread by this is stable: pinning it does not change
    /// the answer for it.
    pub fn least_busy_cpu_for(&self, tid: ThreadId) -> Option<usize> {
        self.least_busy(Some(tid))
    }

    fn least_busy(&self, exclude: Option<ThreadId>) -> Option<usize> {
        let state = self.state.lock();
        let mut nr_running = vec![0usize; state.cpus.len()];
        for td in state.threads.values() {
            if Some(td.id) == exclude {
                continue;
            }
            if !matches!(td.state, ThreadState::Ready | ThreadState::Running { .. }) {
                continue;
            }
            if let Some(slot) = td.home_cpu().and_then(|cpu| nr_running.get_mut(cpu)) {
                *slot += 1;
            }
        }
        nr_running
            .iter()
            .enumerate()
            .min_by_key(|&(cpu, nr)| (*nr, cpu))
            .map(|(cpu, _)| cpu)
    }

    /// Share of time `cpu` was busy since the last [`Self::sample_cpu_load`],
    /// in percent.
    pub fn cpu_load_percent(&self, cpu: usize) -> Option<u8> {
        let state = self.state.lock();
        let now = self.clock.now_ns();
        state.cpus.get(cpu).map(|c| window_load(c, now))
    }

    /// Load of every CPU over the current window, then start a new window.
    pub fn sample_cpu_load(&self) -> Vec<u8> {
        let mut state = self.state.lock();
        let now = self.clock.now_ns();
        state
            .cpus
            .iter_mut()
            .map(|c| {
                let load = window_load(c, now);
                c.busy_ns = 0;
                c.window_start_ns = now;
                load
            })
            .collect()
    }

    /// Record that a transaction finished on `cpu`.
    pub fn report_work_finished(&self, cpu: usize) {
        match self.completed.get(cpu) {
            Some(count) => {
                count.fetch_add(1, Ordering::Relaxed);
            }
            None => warn!(cpu, "work finished on invalid cpu"),
        }
    }

    pub fn completed(&self, cpu: usize) -> u64 {
        self.completed
            .get(cpu)
            .map_or(0, |count| count.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> SchedStats {
        let state = self.state.lock();
        SchedStats {
            nr_threads: state.threads.len(),
            nr_rt_queued: state.rt.len(),
            nr_fair_queued: state.fair.len(),
            nr_dispatches: state.counters.nr_dispatches,
            nr_switches: state.counters.nr_switches,
            nr_wakeups: state.counters.nr_wakeups,
            nr_pending_timers: state.timers.len(),
            running: state.cpus.iter().map(|c| c.current).collect(),
            completed: self
                .completed
                .iter()
                .map(|count| count.load(Ordering::Relaxed))
                .collect(),
        }
    }
}

/// Queue `tid` on the runqueue matching its priority.
///
/// # Panics
/// Panics if `tid` is unregistered or already on a runqueue.
fn enqueue(state: &mut RunState, tid: ThreadId) {
    let RunState {
        threads, rt, fair, ..
    } = state;
    let td = threads
        .get_mut(&tid)
        .unwrap_or_else(|| panic!("enqueue of unregistered thread {tid}"));
    assert!(
        td.queue.is_none(),
        "thread {tid} is already on a runqueue ({:?})",
        td.queue
    );
    td.queue = Some(match td.priority.class() {
        SchedClass::Rt => {
            rt.push_back(td.priority, tid);
            QueueSlot::Rt(td.priority)
        }
        SchedClass::Fair => QueueSlot::Fair {
            vruntime: td.vruntime,
            seq: fair.insert(tid, td.vruntime),
        },
    });
}

/// Take `tid` off whatever runqueue holds it. No-op if it is on none.
///
/// # Panics
/// Panics if the runqueue does not hold `tid` where its membership says.
fn dequeue(state: &mut RunState, tid: ThreadId) {
    let RunState {
        threads, rt, fair, ..
    } = state;
    let Some(td) = threads.get_mut(&tid) else {
        return;
    };
    let found = match td.queue.take() {
        None => return,
        Some(QueueSlot::Rt(prio)) => rt.remove(prio, tid),
        Some(QueueSlot::Fair { vruntime, seq }) => fair.remove(vruntime, seq) == Some(tid),
    };
    assert!(found, "thread {tid} missing from its runqueue");
}

/// Pop the best thread allowed on `cpu`: real-time first, then fair.
fn pick_next(state: &mut RunState, cpu: usize) -> Option<ThreadId> {
    let RunState {
        threads, rt, fair, ..
    } = state;
    let eligible = |tid: ThreadId| threads.get(&tid).is_some_and(|td| td.affinity.is_set(cpu));
    let tid = rt.pick(eligible).or_else(|| fair.pick(eligible))?;

    let td = threads
        .get_mut(&tid)
        .unwrap_or_else(|| panic!("runqueue holds unregistered thread {tid}"));
    assert!(td.queue.take().is_some(), "thread {tid} picked without runqueue membership");
    Some(tid)
}

/// Charge the thread running on `cpu` for the time since it was last
/// charged, and count that time as busy for load sampling.
fn account_current(state: &mut RunState, cpu: usize, now: TimeNs) {
    let c = &mut state.cpus[cpu];
    let delta = now.saturating_sub(c.last_account_ns);
    let in_window = now.saturating_sub(c.last_account_ns.max(c.window_start_ns));
    c.last_account_ns = now;
    let Some(tid) = c.current else {
        return;
    };
    c.busy_ns += in_window;

    if let Some(td) = state.threads.get_mut(&tid) {
        td.runtime_ns += delta;
        if td.priority.class() == SchedClass::Fair {
            td.vruntime = td.vruntime.charge(delta, td.priority.vruntime_weight());
        }
        trace!(cpu, tid = tid.0, delta, vruntime = td.vruntime.0, "account");
    }
}

fn window_load(c: &CpuState, now: TimeNs) -> u8 {
    let window = now.saturating_sub(c.window_start_ns);
    if window == 0 {
        return 0;
    }
    let pending = match c.current {
        Some(_) => now.saturating_sub(c.last_account_ns.max(c.window_start_ns)),
        None => 0,
    };
    let busy = (c.busy_ns + pending).min(window);
    (busy.saturating_mul(100) / window) as u8
}
