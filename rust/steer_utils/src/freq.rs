// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Current CPU frequency from cpufreq sysfs attributes.

use crate::telemetry::CpuMonitor;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;

/// Reads `cpuN/cpufreq/scaling_cur_freq` for CPUs below `nr_cpus`. Loads
/// are not available from cpufreq and are left to another source.
#[derive(Debug, Clone)]
pub struct SysfsFreqMonitor {
    cpu_root: PathBuf,
    nr_cpus: usize,
}

impl SysfsFreqMonitor {
    pub fn new(root: impl AsRef<Path>, nr_cpus: usize) -> Self {
        Self {
            cpu_root: root.as_ref().join("devices/system/cpu"),
            nr_cpus,
        }
    }
}

impl CpuMonitor for SysfsFreqMonitor {
    fn frequency_mhz(&mut self, cpu: usize) -> Option<u32> {
        if cpu >= self.nr_cpus {
            return None;
        }
        let path = self
            .cpu_root
            .join(format!("cpu{cpu}/cpufreq/scaling_cur_freq"));
        let khz = match std::fs::read_to_string(&path) {
            Ok(val) => val.trim().parse::<u64>().ok()?,
            Err(e) => {
                debug!(cpu, path = %path.display(), "no cpufreq reading: {e}");
                return None;
            }
        };
        u32::try_from(khz / 1000).ok()
    }

    fn load_percent(&mut self, _cpu: usize) -> Option<u8> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_reads_scaling_cur_freq() {
        let dir = tempfile::tempdir().unwrap();
        let freq_dir = dir.path().join("devices/system/cpu/cpu1/cpufreq");
        fs::create_dir_all(&freq_dir).unwrap();
        fs::write(freq_dir.join("scaling_cur_freq"), "1804800\n").unwrap();

        let mut mon = SysfsFreqMonitor::new(dir.path(), 2);
        assert_eq!(mon.frequency_mhz(1), Some(1804));
        assert_eq!(mon.frequency_mhz(0), None);
        assert_eq!(mon.frequency_mhz(2), None);
        assert_eq!(mon.load_percent(1), None);
    }
}
