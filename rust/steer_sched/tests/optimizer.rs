use std::sync::Arc;

use steer_sched::*;
use steer_utils::{CpuMask, CpuMonitor, CpuTopology};

mod common;
use common::{big_little, big_little_ctx, LITTLE_CPU, PREFERRED_CPU};

/// Reports a fixed frequency for every CPU and no loads.
struct FreqOnly(u32);

impl CpuMonitor for FreqOnly {
    fn frequency_mhz(&mut self, _cpu: usize) -> Option<u32> {
        Some(self.0)
    }

    fn load_percent(&mut self, _cpu: usize) -> Option<u8> {
        None
    }
}

/// Reports a load for one CPU only.
struct LoadOn {
    cpu: usize,
    load: u8,
}

impl CpuMonitor for LoadOn {
    fn frequency_mhz(&mut self, _cpu: usize) -> Option<u32> {
        None
    }

    fn load_percent(&mut self, cpu: usize) -> Option<u8> {
        (cpu == self.cpu).then_some(self.load)
    }
}

/// An overloaded little CPU hands its transaction to an idle enough
/// preferred CPU.
#[test]
fn test_promotion() {
    common::setup_test();
    let (_clock, ctx) = big_little_ctx(&[(1, Priority::BACKGROUND)]);
    ctx.telemetry().update(LITTLE_CPU, 1800, 97);
    ctx.telemetry().update(PREFERRED_CPU, 2400, 60);

    assert_eq!(ctx.optimize(ThreadId(1), Priority::BACKGROUND), PREFERRED_CPU);
    assert_eq!(
        ctx.scheduler().thread(ThreadId(1)).unwrap().affinity,
        CpuMask::single(PREFERRED_CPU)
    );
    assert_eq!(
        ctx.optimizer().stats(),
        OptimizerStats {
            nr_optimized: 1,
            nr_promoted: 1,
            nr_apply_failed: 0,
        }
    );
}

/// Promotion needs the little CPU strictly above 95% and the preferred CPU
/// strictly below 80%.
#[test]
fn test_promotion_thresholds() {
    common::setup_test();
    let (_clock, ctx) = big_little_ctx(&[(1, Priority::BACKGROUND)]);

    ctx.telemetry().update(LITTLE_CPU, 1800, 97);
    ctx.telemetry().update(PREFERRED_CPU, 2400, 80);
    assert_eq!(ctx.optimize(ThreadId(1), Priority::BACKGROUND), LITTLE_CPU);

    ctx.telemetry().update(LITTLE_CPU, 1800, 95);
    ctx.telemetry().update(PREFERRED_CPU, 2400, 10);
    assert_eq!(ctx.optimize(ThreadId(1), Priority::BACKGROUND), LITTLE_CPU);

    assert_eq!(
        ctx.scheduler().thread(ThreadId(1)).unwrap().affinity,
        CpuMask::single(LITTLE_CPU)
    );
    assert_eq!(ctx.optimizer().stats().nr_promoted, 0);
}

/// Big CPUs are never promoted, whatever their load.
#[test]
fn test_no_promotion_from_big() {
    common::setup_test();
    let (_clock, ctx) = big_little_ctx(&[(1, Priority::AUDIO)]);
    ctx.telemetry().update(PREFERRED_CPU, 2400, 100);

    assert_eq!(ctx.optimize(ThreadId(1), Priority::AUDIO), PREFERRED_CPU);
    assert_eq!(ctx.optimizer().stats().nr_promoted, 0);
}

/// Same telemetry and scheduler state, same answer.
#[test]
fn test_idempotent() {
    common::setup_test();
    let (_clock, ctx) = big_little_ctx(&[(1, Priority::AUDIO), (2, Priority::BACKGROUND)]);
    ctx.telemetry().update(LITTLE_CPU, 1800, 99);
    ctx.telemetry().update(PREFERRED_CPU, 2400, 20);

    let first = ctx.optimize(ThreadId(1), Priority::AUDIO);
    assert_eq!(ctx.optimize(ThreadId(1), Priority::AUDIO), first);

    let first = ctx.optimize(ThreadId(2), Priority::BACKGROUND);
    assert_eq!(ctx.optimize(ThreadId(2), Priority::BACKGROUND), first);
    assert_eq!(first, PREFERRED_CPU);
}

/// On the least busy fallback the steered thread does not count as load,
/// so pinning it does not move the next answer.
#[test]
fn test_idempotent_least_busy() {
    common::setup_test();
    let topology = CpuTopology::from_capacities(&[1024; 3]).unwrap();
    let ctx = SchedContext::builder(topology)
        .clock(Arc::new(ManualClock::new()))
        .thread(ThreadDescriptor::new(ThreadId(1), Priority::NORMAL))
        .build()
        .unwrap();

    let targets: Vec<usize> = (0..3)
        .map(|_| ctx.optimize(ThreadId(1), Priority::NORMAL))
        .collect();
    assert_eq!(targets, vec![0, 0, 0]);
    assert_eq!(
        ctx.scheduler().thread(ThreadId(1)).unwrap().affinity,
        CpuMask::single(0)
    );
}

/// Other threads still count: the steered thread avoids the loaded CPU and
/// stays put once there.
#[test]
fn test_least_busy_skips_loaded_cpu() {
    common::setup_test();
    let (_clock, ctx) = big_little_ctx(&[(1, Priority::NORMAL)]);
    ctx.scheduler()
        .add_thread(
            ThreadDescriptor::new(ThreadId(2), Priority::NORMAL)
                .with_affinity(CpuMask::single(0)),
        )
        .unwrap();

    for _ in 0..3 {
        assert_eq!(ctx.optimize(ThreadId(1), Priority::NORMAL), 1);
    }
    assert_eq!(ctx.optimizer().stats().nr_promoted, 0);
}

/// A failed pin is logged and counted; the target is still returned.
#[test]
fn test_unknown_thread() {
    common::setup_test();
    let (_clock, ctx) = big_little_ctx(&[]);

    assert_eq!(ctx.optimize(ThreadId(99), Priority::AUDIO), PREFERRED_CPU);
    let stats = ctx.optimizer().stats();
    assert_eq!(stats.nr_optimized, 1);
    assert_eq!(stats.nr_apply_failed, 1);
}

/// A pinned thread runs on the CPU it was steered to.
#[test]
fn test_pinned_thread_migrates() {
    common::setup_test();
    let (_clock, ctx) = big_little_ctx(&[(1, Priority::AUDIO)]);
    let sched = ctx.scheduler();
    assert_eq!(sched.schedule(0).unwrap(), Some(ThreadId(1)));

    assert_eq!(ctx.optimize(ThreadId(1), Priority::AUDIO), PREFERRED_CPU);
    assert!(sched.need_resched(0));
    assert_eq!(sched.schedule(0).unwrap(), None);
    assert_eq!(sched.schedule(PREFERRED_CPU).unwrap(), Some(ThreadId(1)));
}

/// Hardware frequencies are combined with the scheduler's own load when the
/// monitor has no load readings, and the result drives promotion.
#[test]
fn test_refresh_from_sched_load() {
    common::setup_test();
    let clock = Arc::new(ManualClock::new());
    let ctx = SchedContext::builder(big_little())
        .clock(clock.clone())
        .thread(
            ThreadDescriptor::new(ThreadId(1), Priority::AUDIO)
                .with_affinity(CpuMask::single(LITTLE_CPU)),
        )
        .thread(ThreadDescriptor::new(ThreadId(2), Priority::BACKGROUND))
        .build()
        .unwrap();
    assert_eq!(ctx.scheduler().schedule(LITTLE_CPU).unwrap(), Some(ThreadId(1)));

    clock.advance(1_000_000);
    assert_eq!(ctx.refresh_telemetry(&mut FreqOnly(1500)), 6);
    assert_eq!(ctx.telemetry().read_load(LITTLE_CPU), 100);
    assert_eq!(ctx.telemetry().read_load(PREFERRED_CPU), 0);
    assert_eq!(ctx.telemetry().read_frequency(PREFERRED_CPU), 1500);

    assert_eq!(ctx.optimize(ThreadId(2), Priority::BACKGROUND), PREFERRED_CPU);
}

/// Loads the monitor does report take precedence.
#[test]
fn test_refresh_prefers_hw_load() {
    common::setup_test();
    let (clock, ctx) = big_little_ctx(&[]);
    ctx.telemetry().update(PREFERRED_CPU, 2400, 0);

    clock.advance(1_000_000);
    let refreshed = ctx.refresh_telemetry(&mut LoadOn {
        cpu: PREFERRED_CPU,
        load: 90,
    });
    assert_eq!(refreshed, 6);
    assert_eq!(ctx.telemetry().read_load(PREFERRED_CPU), 90);
    assert_eq!(ctx.telemetry().read_frequency(PREFERRED_CPU), 2400);
    assert_eq!(ctx.telemetry().read_load(LITTLE_CPU), 0);
}
