//! Ready-thread runqueues.
//!
//! Real-time threads live in one FIFO per priority level (70..=99) with an
//! occupancy bitmap, so finding the highest non-empty level is a single
//! bit scan. Fair threads live in a tree ordered by virtual runtime, with
//! an insertion sequence number breaking ties in arrival order.
//!
//! Both queues support picking the first entry that satisfies a predicate.
//! The scheduler uses this to skip threads whose affinity excludes the CPU
//! it is dispatching for.

use std::collections::{BTreeMap, VecDeque};

use crate::types::{Priority, ThreadId, Vruntime};

const NR_RT_LEVELS: usize = (Priority::MAX - Priority::RT_MIN + 1) as usize;

fn rt_level(prio: Priority) -> usize {
    assert!(prio.is_rt(), "priority {prio} is not real-time");
    (prio.get() - Priority::RT_MIN) as usize
}

/// Per-level FIFO queues for real-time threads.
#[derive(Debug)]
pub struct RtRunqueue {
    levels: [VecDeque<ThreadId>; NR_RT_LEVELS],
    /// Bit `n` is set iff level `RT_MIN + n` is non-empty.
    occupied: u32,
}

impl RtRunqueue {
    pub fn new() -> Self {
        RtRunqueue {
            levels: std::array::from_fn(|_| VecDeque::new()),
            occupied: 0,
        }
    }

    /// Append `tid` to the tail of its level.
    ///
    /// # Panics
    /// Panics if `prio` is not a real-time priority.
    pub fn push_back(&mut self, prio: Priority, tid: ThreadId) {
        let level = rt_level(prio);
        self.levels[level].push_back(tid);
        self.occupied |= 1 << level;
    }

    /// Remove and return the first thread, scanning levels from 99 down to
    /// 70 and each level head to tail, for which `eligible` holds.
    pub fn pick(&mut self, mut eligible: impl FnMut(ThreadId) -> bool) -> Option<ThreadId> {
        let mut bits = self.occupied;
        while bits != 0 {
            let level = (u32::BITS - 1 - bits.leading_zeros()) as usize;
            bits &= !(1 << level);

            let queue = &mut self.levels[level];
            if let Some(pos) = queue.iter().position(|&tid| eligible(tid)) {
                let tid = queue.remove(pos);
                if queue.is_empty() {
                    self.occupied &= !(1 << level);
                }
                return tid;
            }
        }
        None
    }

    /// Remove a specific thread from its level. Returns true if found.
    pub fn remove(&mut self, prio: Priority, tid: ThreadId) -> bool {
        let level = rt_level(prio);
        let queue = &mut self.levels[level];
        let Some(pos) = queue.iter().position(|&t| t == tid) else {
            return false;
        };
        queue.remove(pos);
        if queue.is_empty() {
            self.occupied &= !(1 << level);
        }
        true
    }

    /// Highest non-empty level.
    pub fn highest(&self) -> Option<Priority> {
        if self.occupied == 0 {
            return None;
        }
        let level = u32::BITS - 1 - self.occupied.leading_zeros();
        Some(Priority::new(Priority::RT_MIN + level as u8))
    }

    /// Threads queued at `prio`, head first.
    pub fn level(&self, prio: Priority) -> Vec<ThreadId> {
        if !prio.is_rt() {
            return vec![];
        }
        self.levels[rt_level(prio)].iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }
}

impl Default for RtRunqueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Fair threads ordered by (vruntime, insertion sequence).
#[derive(Debug, Default)]
pub struct FairRunqueue {
    tree: BTreeMap<(Vruntime, u64), ThreadId>,
    seq: u64,
}

impl FairRunqueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `tid` keyed by `vruntime`. Returns the sequence number needed
    /// to remove it again.
    pub fn insert(&mut self, tid: ThreadId, vruntime: Vruntime) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        self.tree.insert((vruntime, seq), tid);
        seq
    }

    /// Remove and return the lowest-vruntime thread for which `eligible`
    /// holds.
    pub fn pick(&mut self, mut eligible: impl FnMut(ThreadId) -> bool) -> Option<ThreadId> {
        let key = self
            .tree
            .iter()
            .find_map(|(&key, &tid)| eligible(tid).then_some(key))?;
        self.tree.remove(&key)
    }

    /// Remove the entry inserted with `vruntime` and `seq`.
    pub fn remove(&mut self, vruntime: Vruntime, seq: u64) -> Option<ThreadId> {
        self.tree.remove(&(vruntime, seq))
    }

    /// Lowest queued vruntime.
    pub fn min_vruntime(&self) -> Option<Vruntime> {
        self.tree.keys().next().map(|&(vruntime, _)| vruntime)
    }

    /// All queued threads in dispatch order.
    pub fn ordered(&self) -> Vec<ThreadId> {
        self.tree.values().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rt_highest_level_first() {
        let mut rq = RtRunqueue::new();
        rq.push_back(Priority::INTERACTIVE, ThreadId(1));
        rq.push_back(Priority::EMERGENCY, ThreadId(2));
        rq.push_back(Priority::VSYNC, ThreadId(3));
        assert_eq!(rq.highest(), Some(Priority::EMERGENCY));
        assert_eq!(rq.len(), 3);

        assert_eq!(rq.pick(|_| true), Some(ThreadId(2)));
        assert_eq!(rq.pick(|_| true), Some(ThreadId(3)));
        assert_eq!(rq.pick(|_| true), Some(ThreadId(1)));
        assert_eq!(rq.pick(|_| true), None);
        assert!(rq.is_empty());
    }

    #[test]
    fn test_rt_fifo_and_eligibility() {
        let mut rq = RtRunqueue::new();
        for tid in 1..=3 {
            rq.push_back(Priority::AUDIO, ThreadId(tid));
        }
        rq.push_back(Priority::INTERACTIVE, ThreadId(9));
        assert_eq!(rq.level(Priority::AUDIO), vec![ThreadId(1), ThreadId(2), ThreadId(3)]);

        // Skipping ineligible threads keeps the others in order.
        assert_eq!(rq.pick(|tid| tid != ThreadId(1)), Some(ThreadId(2)));
        assert_eq!(rq.pick(|tid| tid == ThreadId(9)), Some(ThreadId(9)));
        assert_eq!(rq.highest(), Some(Priority::AUDIO));
        assert!(rq.remove(Priority::AUDIO, ThreadId(3)));
        assert!(!rq.remove(Priority::AUDIO, ThreadId(3)));
        assert_eq!(rq.pick(|_| true), Some(ThreadId(1)));
        assert_eq!(rq.highest(), None);
    }

    #[test]
    #[should_panic(expected = "not real-time")]
    fn test_rt_rejects_fair_priority() {
        RtRunqueue::new().push_back(Priority::NORMAL, ThreadId(1));
    }

    #[test]
    fn test_fair_min_vruntime_order() {
        let mut rq = FairRunqueue::new();
        rq.insert(ThreadId(1), Vruntime(300));
        let seq = rq.insert(ThreadId(2), Vruntime(100));
        rq.insert(ThreadId(3), Vruntime(100));
        assert_eq!(rq.min_vruntime(), Some(Vruntime(100)));
        assert_eq!(rq.ordered(), vec![ThreadId(2), ThreadId(3), ThreadId(1)]);

        assert_eq!(rq.pick(|tid| tid != ThreadId(2)), Some(ThreadId(3)));
        assert_eq!(rq.remove(Vruntime(100), seq), Some(ThreadId(2)));
        assert_eq!(rq.pick(|_| true), Some(ThreadId(1)));
        assert!(rq.is_empty());
    }
}
