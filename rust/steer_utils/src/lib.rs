// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # Host utilities for the steering scheduler
//!
//! Building blocks shared by the scheduling core and its drivers:
//!
//! - [`CpuMask`]: a fixed-width, copyable set of CPU ids.
//! - [`CpuTopology`]: the immutable big/little description of the CPUs,
//!   built synthetically or discovered from sysfs.
//! - [`CpuTelemetryCache`]: lock-free per-CPU frequency and load, fed by a
//!   [`CpuMonitor`] such as [`SysfsFreqMonitor`].

mod cpumask;
pub use cpumask::read_cpulist;
pub use cpumask::CpuMask;
pub use cpumask::MAX_CPUS;

mod topology;
pub use topology::CoreType;
pub use topology::Cpu;
pub use topology::CpuTopology;

pub mod telemetry;
pub use telemetry::CpuMonitor;
pub use telemetry::CpuSample;
pub use telemetry::CpuTelemetryCache;

mod freq;
pub use freq::SysfsFreqMonitor;
