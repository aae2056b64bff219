// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

use steer_utils::CpuMask;

use crate::types::ThreadId;

/// Recoverable scheduling errors. Callers are expected to fall back (to the
/// current CPU, to the least busy CPU) rather than fail the operation that
/// triggered them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedError {
    #[error("unknown thread {0}")]
    UnknownThread(ThreadId),
    #[error("thread {0} is already registered")]
    DuplicateThread(ThreadId),
    #[error("empty cpu mask")]
    EmptyMask,
    #[error("cpu mask {0} has no online cpu")]
    NoOnlineCpu(CpuMask),
    #[error("invalid cpu {0}")]
    InvalidCpu(usize),
    #[error("no thread is running on cpu {0}")]
    NoCurrentThread(usize),
    #[error("topology reports no cpus")]
    EmptyTopology,
}
