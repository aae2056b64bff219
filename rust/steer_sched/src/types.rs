//! Newtype wrappers and type aliases for scheduling concepts.
//!
//! Thread ids, priorities and virtual runtime get newtypes so they cannot
//! be mixed up with each other or with CPU ids, which stay plain `usize`
//! like the rest of the CPU mask and topology API.

use std::fmt;

/// Monotonic time in nanoseconds.
pub type TimeNs = u64;

/// Thread identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling class a priority falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedClass {
    /// Dispatched strictly before any fair thread, FIFO within a level.
    Rt,
    /// Dispatched by minimum virtual runtime.
    Fair,
}

/// Thread priority in `1..=99`, higher is more urgent. Values at or above
/// [`Priority::RT_MIN`] are real-time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Priority(u8);

impl Priority {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 99;
    pub const RT_MIN: u8 = 70;

    pub const EMERGENCY: Priority = Priority(99);
    pub const AUDIO: Priority = Priority(90);
    pub const VSYNC: Priority = Priority(85);
    pub const INTERACTIVE: Priority = Priority(70);
    pub const NORMAL: Priority = Priority(50);
    pub const BACKGROUND: Priority = Priority(20);
    pub const LOWEST: Priority = Priority(1);

    /// Build a priority, clamping `prio` into `1..=99`.
    pub const fn new(prio: u8) -> Priority {
        if prio < Self::MIN {
            Priority(Self::MIN)
        } else if prio > Self::MAX {
            Priority(Self::MAX)
        } else {
            Priority(prio)
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub const fn is_rt(self) -> bool {
        self.0 >= Self::RT_MIN
    }

    pub const fn class(self) -> SchedClass {
        if self.is_rt() {
            SchedClass::Rt
        } else {
            SchedClass::Fair
        }
    }

    /// Factor applied to runtime when charging virtual runtime. Only the
    /// lowest priority is charged extra.
    pub const fn vruntime_weight(self) -> u64 {
        if self.0 == Self::LOWEST.0 {
            4
        } else {
            1
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Virtual runtime in weighted nanoseconds. Never decreases for a thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vruntime(pub u64);

impl Vruntime {
    /// Charge `runtime_ns` of execution at `weight`, saturating at the top.
    pub fn charge(self, runtime_ns: TimeNs, weight: u64) -> Vruntime {
        Vruntime(self.0.saturating_add(runtime_ns.saturating_mul(weight)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_bands() {
        assert!(Priority::INTERACTIVE.is_rt());
        assert!(!Priority::new(69).is_rt());
        assert_eq!(Priority::EMERGENCY.class(), SchedClass::Rt);
        assert_eq!(Priority::NORMAL.class(), SchedClass::Fair);
        assert_eq!(Priority::new(0), Priority::LOWEST);
        assert_eq!(Priority::new(200), Priority::EMERGENCY);
    }

    #[test]
    fn test_vruntime_weight() {
        assert_eq!(Priority::LOWEST.vruntime_weight(), 4);
        assert_eq!(Priority::new(2).vruntime_weight(), 1);
        assert_eq!(Priority::BACKGROUND.vruntime_weight(), 1);
        assert_eq!(Vruntime(10).charge(5, 4), Vruntime(30));
        assert_eq!(Vruntime(u64::MAX - 1).charge(5, 1), Vruntime(u64::MAX));
    }
}
