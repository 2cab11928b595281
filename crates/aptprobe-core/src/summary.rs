//! The fixed-layout upgrade summary record.
//!
//! Consumers on the far side of the C ABI read this record by offset, so its
//! size and field order are frozen. New information goes into a reserved
//! slot; nothing is ever inserted or reordered.
//!
//! | offset | field       |
//! |--------|-------------|
//! | 0      | `upgrade`   |
//! | 8      | `remove`    |
//! | 16     | `install`   |
//! | 24     | `broken`    |
//! | 32     | `bad`       |
//! | 40..128| `reserved`  |

use serde::{Deserialize, Serialize};

/// Bumped only when a reserved slot gains a meaning.
pub const UPGRADE_SUMMARY_ABI_VERSION: u32 = 1;
pub const UPGRADE_SUMMARY_SIZE: usize = 128;
pub const RESERVED_SLOTS: usize = 11;

const FIELD_SIZE: usize = std::mem::size_of::<u64>();
const COUNTER_FIELDS: usize = 5;

/// The five aggregate counters read off a resolved package graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Installed packages that stay at their current version.
    pub upgrade: u64,
    /// Packages marked for removal.
    pub remove: u64,
    /// Packages that would be installed, including version changes.
    pub install: u64,
    /// Packages left with unsatisfiable dependencies.
    pub broken: u64,
    /// Packages otherwise flagged as problematic.
    pub bad: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpgradeSummary {
    pub upgrade: u64,
    pub remove: u64,
    pub install: u64,
    pub broken: u64,
    pub bad: u64,
    /// Always zero when produced by this crate.
    pub reserved: [u64; RESERVED_SLOTS],
}

const _: () = assert!(std::mem::size_of::<UpgradeSummary>() == UPGRADE_SUMMARY_SIZE);
const _: () = assert!(std::mem::align_of::<UpgradeSummary>() == FIELD_SIZE);

impl UpgradeSummary {
    pub fn from_counters(counters: Counters) -> Self {
        Self {
            upgrade: counters.upgrade,
            remove: counters.remove,
            install: counters.install,
            broken: counters.broken,
            bad: counters.bad,
            reserved: [0; RESERVED_SLOTS],
        }
    }

    pub fn counters(&self) -> Counters {
        Counters {
            upgrade: self.upgrade,
            remove: self.remove,
            install: self.install,
            broken: self.broken,
            bad: self.bad,
        }
    }

    /// Sum of the five counters, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        [self.upgrade, self.remove, self.install, self.broken, self.bad]
            .iter()
            .fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    /// No package would change state and nothing is broken.
    pub fn is_clean(&self) -> bool {
        self.remove == 0 && self.install == 0 && self.broken == 0 && self.bad == 0
    }

    pub fn reserved_is_zero(&self) -> bool {
        self.reserved.iter().all(|slot| *slot == 0)
    }

    /// Little-endian wire image, independent of host byte order.
    pub fn to_le_bytes(&self) -> [u8; UPGRADE_SUMMARY_SIZE] {
        let mut out = [0u8; UPGRADE_SUMMARY_SIZE];
        let fields = [self.upgrade, self.remove, self.install, self.broken, self.bad];
        for (i, value) in fields.iter().chain(self.reserved.iter()).enumerate() {
            out[i * FIELD_SIZE..(i + 1) * FIELD_SIZE].copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Decode a wire image. Reserved slots are ignored and come back zero.
    pub fn from_le_bytes(bytes: &[u8; UPGRADE_SUMMARY_SIZE]) -> Self {
        let mut fields = [0u64; COUNTER_FIELDS];
        for (i, field) in fields.iter_mut().enumerate() {
            let mut word = [0u8; FIELD_SIZE];
            word.copy_from_slice(&bytes[i * FIELD_SIZE..(i + 1) * FIELD_SIZE]);
            *field = u64::from_le_bytes(word);
        }
        Self::from_counters(Counters {
            upgrade: fields[0],
            remove: fields[1],
            install: fields[2],
            broken: fields[3],
            bad: fields[4],
        })
    }
}

impl From<Counters> for UpgradeSummary {
    fn from(counters: Counters) -> Self {
        Self::from_counters(counters)
    }
}
