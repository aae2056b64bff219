#![allow(dead_code)]

use std::sync::Arc;

use steer_sched::*;
use steer_utils::CpuTopology;

/// Initialize tracing from `RUST_LOG`. `try_init()` is idempotent: the
/// first call in the process wins and later ones are ignored.
pub fn setup_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A scheduler over `nr_cpus` CPUs whose time only moves via the returned
/// clock.
pub fn manual_sched(nr_cpus: usize) -> (Arc<ManualClock>, Scheduler) {
    let clock = Arc::new(ManualClock::new());
    let sched = Scheduler::new(SchedConfig::new(nr_cpus), clock.clone()).unwrap();
    (clock, sched)
}

pub fn add(sched: &Scheduler, tid: u64, prio: Priority) -> ThreadId {
    let tid = ThreadId(tid);
    sched.add_thread(ThreadDescriptor::new(tid, prio)).unwrap();
    tid
}

/// Four little CPUs (0-3) followed by two big ones (4-5).
pub fn big_little() -> CpuTopology {
    CpuTopology::from_capacities(&[446, 446, 446, 446, 1024, 1024]).unwrap()
}

pub const LITTLE_CPU: usize = 0;
pub const PREFERRED_CPU: usize = 4;

/// Context over [`big_little`] with a manual clock and `threads` admitted
/// at boot.
pub fn big_little_ctx(threads: &[(u64, Priority)]) -> (Arc<ManualClock>, SchedContext) {
    let clock = Arc::new(ManualClock::new());
    let mut builder = SchedContext::builder(big_little()).clock(clock.clone());
    for &(tid, prio) in threads {
        builder = builder.thread(ThreadDescriptor::new(ThreadId(tid), prio));
    }
    (clock, builder.build().unwrap())
}
