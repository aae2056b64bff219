use std::sync::Arc;

use steer_sched::affinity;
use steer_sched::*;
use steer_utils::CpuMask;

mod common;
use common::manual_sched;

const NR_CPUS: usize = 4;
const NR_PER_CPU: u64 = 40;
const NR_ROUNDS: u64 = 50;

/// Every admitted thread is either on exactly one runqueue or running on
/// exactly one CPU.
fn assert_single_membership(sched: &Scheduler, expected: &[ThreadId]) {
    assert_eq!(sched.nr_threads(), expected.len());

    let stats = sched.stats();
    let running: Vec<ThreadId> = stats.running.iter().flatten().copied().collect();
    assert_eq!(
        stats.nr_rt_queued + stats.nr_fair_queued + running.len(),
        expected.len(),
        "stats: {stats:?}"
    );

    let mut seen = sched.fair_queue();
    for prio in Priority::RT_MIN..=Priority::MAX {
        seen.extend(sched.rt_queue(Priority::new(prio)));
    }
    seen.extend(running);
    seen.sort();
    assert_eq!(seen, expected);
}

/// Admission, priority changes, mask application, dispatch and removal
/// racing from one thread per CPU leave the runqueues consistent.
#[test]
fn test_concurrent_operations() {
    common::setup_test();
    let (clock, sched) = manual_sched(NR_CPUS);
    let sched = Arc::new(sched);

    let workers: Vec<_> = (0..NR_CPUS)
        .map(|cpu| {
            let sched = sched.clone();
            let clock = clock.clone();
            std::thread::spawn(move || {
                let base = cpu as u64 * 1000;
                for i in 0..NR_PER_CPU {
                    let prio = Priority::new((i * 13 % 99 + 1) as u8);
                    sched
                        .add_thread(ThreadDescriptor::new(ThreadId(base + i), prio))
                        .unwrap();
                    sched.schedule(cpu).unwrap();
                }

                for round in 0..NR_ROUNDS {
                    for i in 0..NR_PER_CPU {
                        let tid = ThreadId(base + i);
                        let prio = Priority::new(((i + round) * 7 % 99 + 1) as u8);
                        sched.set_thread_priority(tid, prio).unwrap();
                        let other = (cpu + round as usize) % NR_CPUS;
                        affinity::apply(&sched, tid, CpuMask::single(cpu).set(other)).unwrap();
                    }
                    clock.advance(1000);
                    sched.tick(cpu).unwrap();
                    sched.schedule(cpu).unwrap();
                }

                for i in (0..NR_PER_CPU).step_by(5) {
                    sched.remove_thread(ThreadId(base + i)).unwrap();
                }
                sched.schedule(cpu).unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let mut expected: Vec<ThreadId> = (0..NR_CPUS as u64)
        .flat_map(|cpu| {
            (0..NR_PER_CPU)
                .filter(|i| i % 5 != 0)
                .map(move |i| ThreadId(cpu * 1000 + i))
        })
        .collect();
    expected.sort();
    assert_single_membership(&sched, &expected);

    // Single-threaded dispatch afterwards still finds every thread once.
    for cpu in 0..NR_CPUS {
        sched.schedule(cpu).unwrap();
    }
    assert_single_membership(&sched, &expected);
}

/// Concurrent admission of the same ids lets exactly one caller win each.
#[test]
fn test_concurrent_duplicate_admission() {
    common::setup_test();
    let (_clock, sched) = manual_sched(NR_CPUS);
    let sched = Arc::new(sched);

    let workers: Vec<_> = (0..NR_CPUS)
        .map(|_| {
            let sched = sched.clone();
            std::thread::spawn(move || {
                (0..NR_PER_CPU)
                    .filter(|&i| {
                        sched
                            .add_thread(ThreadDescriptor::new(ThreadId(i), Priority::NORMAL))
                            .is_ok()
                    })
                    .count()
            })
        })
        .collect();
    let admitted: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();

    assert_eq!(admitted, NR_PER_CPU as usize);
    let expected: Vec<ThreadId> = (0..NR_PER_CPU).map(ThreadId).collect();
    assert_single_membership(&sched, &expected);
}
