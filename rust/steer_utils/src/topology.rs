// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # CPU Topology
//!
//! An immutable description of the CPUs the scheduler may steer work onto,
//! with every CPU classified as a high-performance ("big") or
//! high-efficiency ("little") core.
//!
//! Classification follows the kernel's `cpu_capacity` attribute: CPUs with
//! the maximum capacity on the system are big, all others are little. On a
//! homogeneous system every CPU is big and there are no little cores.
//!
//! Creating a Topology
//! -------------------
//!
//! Topologies are built once at boot, either synthetically or from sysfs:
//!
//!```
//!     use steer_utils::CpuTopology;
//!     let top = CpuTopology::from_capacities(&[512, 512, 1024, 1024]).unwrap();
//!     assert_eq!(top.highest_perf_cpu(), Some(2));
//!     assert_eq!(top.first_little_cpu(), Some(0));
//!```
//!
//!```no_run
//!     use steer_utils::CpuTopology;
//!     let top = CpuTopology::from_sysfs("/sys").unwrap();
//!```
//!
//! If the host topology changes (e.g. due to hotplug), a new CpuTopology
//! must be created.

use crate::cpumask::MAX_CPUS;
use crate::CpuMask;
use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use glob::glob;
use sscanf::sscanf;
use std::path::Path;

/// Capacity the kernel reports when a system has no asymmetric CPUs.
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreType {
    Big,
    Little,
}

#[derive(Debug, Clone)]
pub struct Cpu {
    id: usize,
    capacity: usize,
    max_freq: usize,
    core_type: CoreType,
}

impl Cpu {
    /// Get the ID of this Cpu
    pub fn id(&self) -> usize {
        self.id
    }

    /// Relative compute capacity, 1024 being the fastest CPU
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Maximum frequency in kHz, 0 if unknown
    pub fn max_freq(&self) -> usize {
        self.max_freq
    }

    pub fn core_type(&self) -> CoreType {
        self.core_type
    }
}

#[derive(Debug, Clone)]
pub struct CpuTopology {
    cpus: Vec<Cpu>,
    span: CpuMask,
    big_span: CpuMask,
    little_span: CpuMask,
    highest_perf_cpu: Option<usize>,
}

impl CpuTopology {
    /// Build a topology from per-CPU capacities, indexed by CPU id. Maximum
    /// frequencies are unknown.
    pub fn from_capacities(capacities: &[usize]) -> Result<CpuTopology> {
        let cpus: Vec<(usize, usize)> = capacities.iter().map(|&cap| (cap, 0)).collect();
        Self::from_parts(&cpus)
    }

    /// Build a topology of `nr_cpus` CPUs where the CPUs in `big` are the
    /// high-performance cores. An empty `big` mask describes a homogeneous
    /// system.
    pub fn with_big_cpus(nr_cpus: usize, big: &CpuMask) -> Result<CpuTopology> {
        if let Some(cpu) = big.iter().find(|&cpu| cpu >= nr_cpus) {
            bail!("Big CPU {} is outside of the {} CPUs", cpu, nr_cpus);
        }
        let capacities: Vec<usize> = (0..nr_cpus)
            .map(|cpu| {
                if big.is_empty() || big.is_set(cpu) {
                    DEFAULT_CAPACITY
                } else {
                    DEFAULT_CAPACITY / 2
                }
            })
            .collect();
        Self::from_capacities(&capacities)
    }

    /// Discover the topology of the online CPUs below `root`, which is
    /// normally "/sys". Online CPU ids must be contiguous from 0.
    pub fn from_sysfs(root: impl AsRef<Path>) -> Result<CpuTopology> {
        let cpu_root = root.as_ref().join("devices/system/cpu");
        let online_path = cpu_root.join("online");
        let online = std::fs::read_to_string(&online_path)
            .with_context(|| format!("Failed to read {:?}", &online_path))?;
        let online = CpuMask::from_cpulist(&online)?;

        let mut found = CpuMask::empty();
        let mut cpus = vec![(DEFAULT_CAPACITY, 0); online.weight()];
        let pattern = cpu_root.join("cpu[0-9]*");
        for cpu_path in glob(pattern.to_string_lossy().as_ref())?.filter_map(Result::ok) {
            let name = match cpu_path.file_name().and_then(|name| name.to_str()) {
                Some(name) => name,
                None => continue,
            };
            let cpu_id = match sscanf!(name, "cpu{usize}") {
                Ok(val) => val,
                Err(_) => bail!("Failed to parse cpu ID {}", name),
            };
            if !online.is_set(cpu_id) {
                continue;
            }
            if cpu_id >= cpus.len() {
                bail!("Online CPU ids are not contiguous (found cpu{})", cpu_id);
            }

            // Kernels without asymmetric capacity or cpufreq support lack
            // these files.
            let capacity =
                read_file_usize(&cpu_path.join("cpu_capacity")).unwrap_or(DEFAULT_CAPACITY);
            let max_freq =
                read_file_usize(&cpu_path.join("cpufreq/cpuinfo_max_freq")).unwrap_or(0);
            cpus[cpu_id] = (capacity, max_freq);
            found.set_cpu(cpu_id)?;
        }

        if found != online {
            bail!("Online CPUs {} have no sysfs entry (found {})", online, found);
        }
        Self::from_parts(&cpus)
    }

    fn from_parts(parts: &[(usize, usize)]) -> Result<CpuTopology> {
        if parts.len() > MAX_CPUS {
            bail!("{} CPUs exceeds the supported maximum of {}", parts.len(), MAX_CPUS);
        }

        let max_capacity = parts.iter().map(|&(cap, _)| cap).max().unwrap_or(0);
        let mut topo = CpuTopology {
            cpus: Vec::with_capacity(parts.len()),
            span: CpuMask::empty(),
            big_span: CpuMask::empty(),
            little_span: CpuMask::empty(),
            highest_perf_cpu: None,
        };
        for (id, &(capacity, max_freq)) in parts.iter().enumerate() {
            let core_type = if capacity == max_capacity {
                topo.big_span.set_cpu(id)?;
                CoreType::Big
            } else {
                topo.little_span.set_cpu(id)?;
                CoreType::Little
            };
            topo.span.set_cpu(id)?;
            topo.cpus.push(Cpu {
                id,
                capacity,
                max_freq,
                core_type,
            });
        }

        // Highest capacity wins, then highest frequency, then lowest id.
        topo.highest_perf_cpu = topo
            .cpus
            .iter()
            .max_by(|a, b| {
                (a.capacity, a.max_freq)
                    .cmp(&(b.capacity, b.max_freq))
                    .then(b.id.cmp(&a.id))
            })
            .map(|cpu| cpu.id);

        Ok(topo)
    }

    /// Get the number of CPUs
    pub fn nr_cpus(&self) -> usize {
        self.cpus.len()
    }

    /// Get a slice of all CPUs, indexed by id
    pub fn cpus(&self) -> &[Cpu] {
        &self.cpus
    }

    pub fn cpu(&self, cpu: usize) -> Option<&Cpu> {
        self.cpus.get(cpu)
    }

    /// Classification of `cpu`, `None` if it does not exist
    pub fn core_type(&self, cpu: usize) -> Option<CoreType> {
        self.cpu(cpu).map(|cpu| cpu.core_type)
    }

    pub fn is_little(&self, cpu: usize) -> bool {
        self.core_type(cpu) == Some(CoreType::Little)
    }

    pub fn has_big_cores(&self) -> bool {
        !self.big_span.is_empty()
    }

    pub fn has_little_cores(&self) -> bool {
        !self.little_span.is_empty()
    }

    /// The fastest CPU, `None` only for an empty topology
    pub fn highest_perf_cpu(&self) -> Option<usize> {
        self.highest_perf_cpu
    }

    /// Lowest-numbered little CPU
    pub fn first_little_cpu(&self) -> Option<usize> {
        self.little_span.first_set()
    }

    /// Get a CpuMask of all CPUs
    pub fn span(&self) -> CpuMask {
        self.span
    }

    pub fn big_span(&self) -> CpuMask {
        self.big_span
    }

    pub fn little_span(&self) -> CpuMask {
        self.little_span
    }
}

fn read_file_usize(path: &Path) -> Result<usize> {
    let val = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open or read file {:?}", path))?;

    match val.trim().parse::<usize>() {
        Ok(parsed) => Ok(parsed),
        Err(_) => {
            bail!("Failed to parse {}", val);
        }
    }
}
