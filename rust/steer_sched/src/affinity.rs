//! Applying CPU masks to threads.

use steer_utils::CpuMask;
use tracing::trace;

use crate::error::SchedError;
use crate::sched::Scheduler;
use crate::types::ThreadId;

/// Restrict `tid` to the CPUs in `mask`. An empty mask is rejected and
/// leaves the thread's current affinity in place. A thread that is running
/// outside the new mask migrates on its CPU's next reschedule.
pub fn apply(sched: &Scheduler, tid: ThreadId, mask: CpuMask) -> Result<(), SchedError> {
    if mask.is_empty() {
        return Err(SchedError::EmptyMask);
    }
    trace!(tid = tid.0, %mask, "apply cpu mask");
    sched.set_affinity(tid, mask)
}
