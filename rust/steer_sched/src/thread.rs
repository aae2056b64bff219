//! Thread model for the scheduler.

use steer_utils::{CpuMask, MAX_CPUS};

use crate::timer::TimerId;
use crate::types::{Priority, ThreadId, TimeNs, Vruntime};

/// The state a thread can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Waiting on a runqueue.
    Ready,
    /// Executing on the given CPU.
    Running { cpu: usize },
    /// Sleeping or waiting; on no runqueue.
    Blocked,
    /// Removed from the scheduler. Absorbing.
    Terminated,
}

/// Which runqueue currently owns a thread, with the key needed to find it
/// there again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueSlot {
    Rt(Priority),
    Fair { vruntime: Vruntime, seq: u64 },
}

/// A thread admitted to the scheduler.
#[derive(Debug, Clone)]
pub struct ThreadDescriptor {
    pub(crate) id: ThreadId,
    pub(crate) priority: Priority,
    pub(crate) vruntime: Vruntime,
    /// When the thread was last switched in.
    pub(crate) last_dispatch_ns: TimeNs,
    /// Total time spent running.
    pub(crate) runtime_ns: TimeNs,
    pub(crate) affinity: CpuMask,
    pub(crate) state: ThreadState,
    /// Runqueue membership. At most one at any time.
    pub(crate) queue: Option<QueueSlot>,
    /// CPU the thread last ran on.
    pub(crate) last_cpu: Option<usize>,
    /// Pending wake-up while blocked in `sleep`.
    pub(crate) wake_timer: Option<TimerId>,
}

impl ThreadDescriptor {
    /// Describe a new thread eligible to run on every CPU.
    pub fn new(id: ThreadId, priority: Priority) -> Self {
        Self {
            id,
            priority,
            vruntime: Vruntime(0),
            last_dispatch_ns: 0,
            runtime_ns: 0,
            affinity: CpuMask::first_n(MAX_CPUS),
            state: ThreadState::Ready,
            queue: None,
            last_cpu: None,
            wake_timer: None,
        }
    }

    /// Restrict the CPUs the thread may start on.
    pub fn with_affinity(mut self, affinity: CpuMask) -> Self {
        self.affinity = affinity;
        self
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// CPU a thread counts against for load accounting: where it runs,
    /// else where it last ran if still allowed, else its first allowed CPU.
    pub(crate) fn home_cpu(&self) -> Option<usize> {
        match self.state {
            ThreadState::Running { cpu } => Some(cpu),
            _ => match self.last_cpu {
                Some(cpu) if self.affinity.is_set(cpu) => Some(cpu),
                _ => self.affinity.first_set(),
            },
        }
    }

    pub(crate) fn snapshot(&self) -> ThreadSnapshot {
        ThreadSnapshot {
            id: self.id,
            priority: self.priority,
            vruntime: self.vruntime,
            last_dispatch_ns: self.last_dispatch_ns,
            runtime_ns: self.runtime_ns,
            affinity: self.affinity,
            state: self.state,
            last_cpu: self.last_cpu,
        }
    }
}

/// Read-only copy of a thread's scheduling state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub id: ThreadId,
    pub priority: Priority,
    pub vruntime: Vruntime,
    pub last_dispatch_ns: TimeNs,
    pub runtime_ns: TimeNs,
    pub affinity: CpuMask,
    pub state: ThreadState,
    pub last_cpu: Option<usize>,
}
