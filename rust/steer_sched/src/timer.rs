//! Timer registration table.
//!
//! Every pending timer is registered under a [`TimerId`] with a typed
//! [`TimerKind`] describing what has to happen when it expires. Nothing
//! fires on its own: the owner polls [`TimerTable::expire`] with the
//! current time and dispatches each returned entry itself.

use std::collections::{BTreeMap, HashMap};

use crate::types::{ThreadId, TimeNs};

/// Handle for cancelling a registered timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// What an expired timer asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// A sleeping thread reached its wake deadline.
    Wake(ThreadId),
    /// The time slice of whatever runs on `cpu` is used up.
    SliceEnd { cpu: usize },
}

#[derive(Debug, Default)]
pub struct TimerTable {
    /// Pending timers ordered by (deadline, id). The id breaks ties in
    /// registration order.
    queue: BTreeMap<(TimeNs, TimerId), TimerKind>,
    deadlines: HashMap<TimerId, TimeNs>,
    next_id: u64,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `kind` to fire once `deadline` has been reached.
    pub fn arm(&mut self, deadline: TimeNs, kind: TimerKind) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.queue.insert((deadline, id), kind);
        self.deadlines.insert(id, deadline);
        id
    }

    /// Remove a pending timer. Returns what it would have fired, or `None`
    /// if it already expired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> Option<TimerKind> {
        let deadline = self.deadlines.remove(&id)?;
        self.queue.remove(&(deadline, id))
    }

    /// Remove and return every timer whose deadline is at or before `now`,
    /// earliest first.
    pub fn expire(&mut self, now: TimeNs) -> Vec<(TimerId, TimerKind)> {
        let mut fired = vec![];
        while let Some(entry) = self.queue.first_entry() {
            let (deadline, id) = *entry.key();
            if deadline > now {
                break;
            }
            let kind = entry.remove();
            self.deadlines.remove(&id);
            fired.push((id, kind));
        }
        fired
    }

    pub fn next_deadline(&self) -> Option<TimeNs> {
        self.queue.keys().next().map(|&(deadline, _)| deadline)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
