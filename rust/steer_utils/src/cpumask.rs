// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # CPU masks
//!
//! A fixed-width set of CPU ids, used both for thread affinity and for
//! describing topology spans.
//!
//! CpuMask
//! -------
//!
//! A CpuMask is a `Copy` value backed by a bitvec array wide enough for
//! [`MAX_CPUS`] CPUs. There is no shared state behind it: every operation
//! either returns a new mask or mutates the caller's own copy.
//!
//!```rust
//!     use steer_utils::CpuMask;
//!     let mask = CpuMask::empty().set(5);
//!     assert!(mask.is_set(5));
//!     assert!(!mask.clear(5).is_set(5));
//!     assert_eq!(CpuMask::empty().set(2).set(7).first_set(), Some(2));
//!```
//!
//! Masks can also be parsed from a hexadecimal string or from a kernel
//! style cpulist, and accept the special values "none" and "all":
//!
//!```
//!     use steer_utils::CpuMask;
//!     let from_hex = CpuMask::from_str("0xf0").unwrap();
//!     let from_list = CpuMask::from_cpulist("4-7").unwrap();
//!     assert_eq!(from_hex, from_list);
//!     assert!(CpuMask::from_str("none").unwrap().is_empty());
//!```
//!
//! Out-of-range CPU ids never panic. The pure mutators ignore them and the
//! queries report "not set" or `None`. The `*_cpu` mutators report them as
//! errors for callers that want to know.

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use bitvec::prelude::*;
use sscanf::sscanf;
use std::fmt;
use std::ops::BitAndAssign;
use std::ops::BitOrAssign;
use tracing::trace;

/// Maximum number of CPUs a mask can describe.
pub const MAX_CPUS: usize = 64;

type MaskBits = BitArr!(for MAX_CPUS, in u64, Lsb0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuMask {
    mask: MaskBits,
}

impl Default for CpuMask {
    fn default() -> Self {
        Self::empty()
    }
}

impl CpuMask {
    fn check_cpu(cpu: usize) -> Result<()> {
        if cpu >= MAX_CPUS {
            bail!("Invalid CPU {} passed, max {}", cpu, MAX_CPUS);
        }

        Ok(())
    }

    /// Build a mask with no CPU set.
    pub const fn empty() -> CpuMask {
        CpuMask {
            mask: MaskBits::ZERO,
        }
    }

    /// Build a mask with exactly one CPU set. An out-of-range CPU yields an
    /// empty mask.
    pub fn single(cpu: usize) -> CpuMask {
        Self::empty().set(cpu)
    }

    /// Build a mask spanning CPUs `0..nr_cpus`, capped at [`MAX_CPUS`].
    pub fn first_n(nr_cpus: usize) -> CpuMask {
        let mut mask = Self::empty();
        mask.mask[..nr_cpus.min(MAX_CPUS)].fill(true);
        mask
    }

    /// Build a mask from the low bits of a raw word.
    pub fn from_raw(raw: u64) -> CpuMask {
        CpuMask {
            mask: BitArray::new([raw]),
        }
    }

    /// Raw word whose bits reflect the mask.
    pub fn as_raw(&self) -> u64 {
        self.mask.into_inner()[0]
    }

    /// Build a CpuMask object from a hexadecimal string.
    pub fn from_str(cpumask: &str) -> Result<CpuMask> {
        match cpumask {
            "none" => return Ok(Self::empty()),
            "all" => return Ok(Self::first_n(MAX_CPUS)),
            _ => {}
        }
        let hex_str = {
            let mut tmp_str = cpumask
                .strip_prefix("0x")
                .unwrap_or(cpumask)
                .replace(['_', ','], "");
            if tmp_str.len() % 2 != 0 {
                tmp_str = "0".to_string() + &tmp_str;
            }
            tmp_str
        };
        let byte_vec =
            hex::decode(&hex_str).with_context(|| format!("Failed to parse cpumask: {cpumask}"))?;

        let mut mask = Self::empty();
        for (index, &val) in byte_vec.iter().rev().enumerate() {
            let mut v = val;
            while v != 0 {
                let lsb = v.trailing_zeros() as usize;
                v &= !(1 << lsb);
                let cpu = index * 8 + lsb;
                if cpu >= MAX_CPUS {
                    bail!(
                        "Found cpu ({}) in cpumask ({}) beyond the supported maximum ({})",
                        cpu,
                        cpumask,
                        MAX_CPUS
                    );
                }
                mask.mask.set(cpu, true);
            }
        }

        Ok(mask)
    }

    /// Build a CpuMask object from a cpulist such as "0-3,6".
    pub fn from_cpulist(cpulist: &str) -> Result<CpuMask> {
        let mut mask = Self::empty();
        for cpu in read_cpulist(cpulist)? {
            mask.set_cpu(cpu)?;
        }

        Ok(mask)
    }

    /// Return a copy of the mask with `cpu` set.
    pub fn set(mut self, cpu: usize) -> CpuMask {
        if self.set_cpu(cpu).is_err() {
            trace!(cpu, "ignoring out-of-range cpu in set");
        }
        self
    }

    /// Return a copy of the mask with `cpu` cleared.
    pub fn clear(mut self, cpu: usize) -> CpuMask {
        if self.clear_cpu(cpu).is_err() {
            trace!(cpu, "ignoring out-of-range cpu in clear");
        }
        self
    }

    /// Test whether `cpu` is in the mask. Out-of-range CPUs are never set.
    pub fn is_set(&self, cpu: usize) -> bool {
        match self.mask.get(cpu) {
            Some(bit) => *bit,
            None => false,
        }
    }

    /// Lowest CPU in the mask, or `None` if the mask is empty.
    pub fn first_set(&self) -> Option<usize> {
        self.mask.first_one()
    }

    /// Set a bit in place. Returns an error if `cpu` exceeds [`MAX_CPUS`].
    pub fn set_cpu(&mut self, cpu: usize) -> Result<()> {
        Self::check_cpu(cpu)?;
        self.mask.set(cpu, true);
        Ok(())
    }

    /// Clear a bit in place. Returns an error if `cpu` exceeds [`MAX_CPUS`].
    pub fn clear_cpu(&mut self, cpu: usize) -> Result<()> {
        Self::check_cpu(cpu)?;
        self.mask.set(cpu, false);
        Ok(())
    }

    /// Count the number of CPUs in the mask.
    pub fn weight(&self) -> usize {
        self.mask.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.not_any()
    }

    /// Create a CpuMask that is the AND of the current mask and another.
    pub fn and(&self, other: &CpuMask) -> CpuMask {
        let mut new = *self;
        new &= other;
        new
    }

    /// Create a CpuMask that is the OR of the current mask and another.
    pub fn or(&self, other: &CpuMask) -> CpuMask {
        let mut new = *self;
        new |= other;
        new
    }

    /// Iterate over the CPUs in the mask in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.mask.iter_ones()
    }

    fn fmt_with(&self, f: &mut fmt::Formatter<'_>, case: char) -> fmt::Result {
        let raw = self.as_raw();
        let (hi, lo) = ((raw >> 32) as u32, raw as u32);
        match case {
            'x' => write!(f, "{hi:08x},{lo:08x}"),
            'X' => write!(f, "{hi:08X},{lo:08X}"),
            _ => unreachable!(),
        }
    }
}

/// Expand a kernel cpulist ("0-3,8,10-11") into individual CPU ids.
pub fn read_cpulist(cpulist: &str) -> Result<Vec<usize>> {
    let cpulist = cpulist.trim_end_matches('\0').trim();
    if cpulist.is_empty() {
        return Ok(vec![]);
    }
    let mut cpu_ids = vec![];
    for group in cpulist.split(',') {
        let (min, max) = match sscanf!(group.trim(), "{usize}-{usize}") {
            Ok((x, y)) => (x, y),
            Err(_) => match sscanf!(group.trim(), "{usize}") {
                Ok(x) => (x, x),
                Err(_) => {
                    bail!("Failed to parse cpulist {}", group.trim());
                }
            },
        };
        if min > max {
            bail!("Invalid cpulist range {}", group.trim());
        }
        cpu_ids.extend(min..=max);
    }

    Ok(cpu_ids)
}

impl fmt::Display for CpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with(f, 'x')
    }
}

impl fmt::LowerHex for CpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with(f, 'x')
    }
}

impl fmt::UpperHex for CpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with(f, 'X')
    }
}

impl BitAndAssign<&Self> for CpuMask {
    fn bitand_assign(&mut self, rhs: &Self) {
        self.mask &= rhs.mask.as_bitslice();
    }
}

impl BitOrAssign<&Self> for CpuMask {
    fn bitor_assign(&mut self, rhs: &Self) {
        self.mask |= rhs.mask.as_bitslice();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_clear_first() {
        assert!(CpuMask::empty().set(5).is_set(5));
        assert!(!CpuMask::empty().set(5).clear(5).is_set(5));
        assert_eq!(CpuMask::empty().set(2).set(7).first_set(), Some(2));
        assert_eq!(CpuMask::empty().first_set(), None);
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let mask = CpuMask::empty().set(MAX_CPUS).set(1000);
        assert!(mask.is_empty());
        assert!(!mask.is_set(MAX_CPUS));
        assert_eq!(CpuMask::single(3).clear(MAX_CPUS + 1), CpuMask::single(3));

        let mut mask = CpuMask::empty();
        assert!(mask.set_cpu(MAX_CPUS).is_err());
        assert!(mask.clear_cpu(MAX_CPUS).is_err());
        assert!(mask.set_cpu(MAX_CPUS - 1).is_ok());
        assert_eq!(mask.first_set(), Some(MAX_CPUS - 1));
    }

    #[test]
    fn test_from_str() {
        let mask = CpuMask::from_str("0xf0").unwrap();
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![4, 5, 6, 7]);
        assert_eq!(CpuMask::from_str("all").unwrap().weight(), MAX_CPUS);
        assert!(CpuMask::from_str("none").unwrap().is_empty());
        assert_eq!(CpuMask::from_str("1_0000_0001").unwrap().as_raw(), 0x1_0000_0001);
        assert!(CpuMask::from_str("0xzz").is_err());
        assert!(CpuMask::from_str("0x1_0000_0000_0000_0000").is_err());
    }

    #[test]
    fn test_cpulist() {
        assert_eq!(read_cpulist("0-3,6\n").unwrap(), vec![0, 1, 2, 3, 6]);
        assert_eq!(read_cpulist("").unwrap(), Vec::<usize>::new());
        assert!(read_cpulist("3-1").is_err());
        assert!(read_cpulist("a-b").is_err());

        let mask = CpuMask::from_cpulist("4-5,7").unwrap();
        assert_eq!(mask.weight(), 3);
        assert!(CpuMask::from_cpulist("63-64").is_err());
    }

    #[test]
    fn test_algebra_and_display() {
        let a = CpuMask::first_n(4);
        let b = CpuMask::from_cpulist("2-5").unwrap();
        assert_eq!(a.and(&b).iter().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(a.or(&b).weight(), 6);
        assert_eq!(CpuMask::first_n(200).weight(), MAX_CPUS);
        assert_eq!(format!("{}", CpuMask::from_raw(0xf0)), "00000000,000000f0");
        assert_eq!(format!("{:X}", CpuMask::from_raw(1 << 40)), "00000100,00000000");
    }
}
