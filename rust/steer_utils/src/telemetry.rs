// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # CPU Telemetry
//!
//! A lock-free, per-CPU snapshot of the current clock frequency and load.
//!
//! The cache is written by a periodic monitor and read by steering code on
//! the transaction dispatch path. Each field is an independent atomic:
//! writers publish with `Release` stores and readers observe with `Acquire`
//! loads, so a reader never blocks and never sees a torn value. A reader
//! may see a frequency and a load taken at slightly different instants.
//!
//! Readers asking about a CPU that does not exist get a frequency of 0 and
//! a load of 100%, so that a bogus CPU id never looks attractive.

use crate::CpuTopology;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use tracing::trace;
use tracing::warn;

/// Load reported for CPUs that do not exist.
pub const INVALID_CPU_LOAD: u8 = 100;

/// One CPU's frequency and load as last published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuSample {
    pub freq_mhz: u32,
    pub load_percent: u8,
}

/// Source of per-CPU hardware readings. Implementations return `None` for
/// CPUs or readings they cannot provide.
pub trait CpuMonitor {
    fn frequency_mhz(&mut self, cpu: usize) -> Option<u32>;
    fn load_percent(&mut self, cpu: usize) -> Option<u8>;
}

#[derive(Debug, Default)]
struct CpuSlot {
    freq_mhz: AtomicU32,
    load_percent: AtomicU8,
}

#[derive(Debug)]
pub struct CpuTelemetryCache {
    cpus: Box<[CpuSlot]>,
}

impl CpuTelemetryCache {
    /// Create a cache for `nr_cpus` CPUs with every sample zeroed.
    pub fn new(nr_cpus: usize) -> Self {
        Self {
            cpus: (0..nr_cpus).map(|_| CpuSlot::default()).collect(),
        }
    }

    pub fn for_topology(topo: &CpuTopology) -> Self {
        Self::new(topo.nr_cpus())
    }

    pub fn nr_cpus(&self) -> usize {
        self.cpus.len()
    }

    /// Publish a new sample for `cpu`. Loads above 100% are clamped.
    /// Returns false, without touching the cache, if `cpu` is invalid.
    pub fn update(&self, cpu: usize, freq_mhz: u32, load_percent: u8) -> bool {
        let Some(slot) = self.cpus.get(cpu) else {
            warn!(cpu, nr_cpus = self.cpus.len(), "telemetry update for invalid cpu");
            return false;
        };
        slot.freq_mhz.store(freq_mhz, Ordering::Release);
        slot.load_percent
            .store(load_percent.min(100), Ordering::Release);
        true
    }

    /// Current frequency of `cpu` in MHz, 0 if `cpu` is invalid.
    pub fn read_frequency(&self, cpu: usize) -> u32 {
        self.cpus
            .get(cpu)
            .map_or(0, |slot| slot.freq_mhz.load(Ordering::Acquire))
    }

    /// Current load of `cpu` in percent, 100 if `cpu` is invalid.
    pub fn read_load(&self, cpu: usize) -> u8 {
        self.cpus.get(cpu).map_or(INVALID_CPU_LOAD, |slot| {
            slot.load_percent.load(Ordering::Acquire)
        })
    }

    pub fn sample(&self, cpu: usize) -> Option<CpuSample> {
        self.cpus.get(cpu).map(|slot| CpuSample {
            freq_mhz: slot.freq_mhz.load(Ordering::Acquire),
            load_percent: slot.load_percent.load(Ordering::Acquire),
        })
    }

    /// Poll `monitor` for every CPU and publish the readings. A reading the
    /// monitor cannot provide keeps its previous value. Returns the number
    /// of CPUs that got at least one fresh reading.
    pub fn refresh_from(&self, monitor: &mut dyn CpuMonitor) -> usize {
        let mut refreshed = 0;
        for cpu in 0..self.cpus.len() {
            let freq = monitor.frequency_mhz(cpu);
            let load = monitor.load_percent(cpu);
            if freq.is_none() && load.is_none() {
                continue;
            }
            self.update(
                cpu,
                freq.unwrap_or_else(|| self.read_frequency(cpu)),
                load.unwrap_or_else(|| self.read_load(cpu)),
            );
            refreshed += 1;
        }
        trace!(refreshed, "telemetry refreshed");
        refreshed
    }
}
