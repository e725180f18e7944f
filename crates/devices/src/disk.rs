// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{DatastoreRef, UnknownVariant};

/// Persistence mode of a virtual disk
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskMode {
    /// Changes are appended to a redo log
    Append,
    /// Not affected by snapshots, changes discarded on power off
    IndependentNonpersistent,
    /// Not affected by snapshots, changes written immediately
    IndependentPersistent,
    /// Changes discarded on power off
    Nonpersistent,
    /// Changes written immediately
    #[default]
    Persistent,
    /// Changes kept in a redo log until committed or discarded
    Undoable,
}

impl fmt::Display for DiskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => f.write_str("append"),
            Self::IndependentNonpersistent => f.write_str("independent_nonpersistent"),
            Self::IndependentPersistent => f.write_str("independent_persistent"),
            Self::Nonpersistent => f.write_str("nonpersistent"),
            Self::Persistent => f.write_str("persistent"),
            Self::Undoable => f.write_str("undoable"),
        }
    }
}

impl FromStr for DiskMode {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "append" => Ok(Self::Append),
            "independent_nonpersistent" => Ok(Self::IndependentNonpersistent),
            "independent_persistent" => Ok(Self::IndependentPersistent),
            "nonpersistent" => Ok(Self::Nonpersistent),
            "persistent" => Ok(Self::Persistent),
            "undoable" => Ok(Self::Undoable),
            _ => Err(UnknownVariant(value.to_owned())),
        }
    }
}

/// Physical realization of a virtual disk
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backing {
    pub disk_mode: DiskMode,
    /// Split into 2GB extents rather than one monolithic file
    pub split: bool,
    /// Zero the whole file at creation time
    pub eagerly_scrub: bool,
    #[serde(default)]
    pub thin_provisioned: bool,
    #[serde(default)]
    pub write_through: bool,
    /// Datastore relative path, e.g. `[ds0] vm/vm.vmdk`
    pub file_name: String,
    #[serde(default)]
    pub datastore: Option<DatastoreRef>,
}

/// A virtual disk attached to a controller
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    /// Device key, negative while the disk is only a pending change
    pub key: i32,
    /// Key of the owning controller
    pub controller_key: i32,
    /// Address on the owning controller
    pub unit_number: u32,
    pub capacity_kb: u64,
    pub backing: Backing,
    #[serde(default)]
    pub label: Option<String>,
}

impl Disk {
    /// Returns the capacity of the disk in bytes.
    pub fn size(&self) -> u64 {
        self.capacity_kb.saturating_mul(1024)
    }

    /// Whether this disk sits at the given address
    pub fn is_at(&self, controller_key: i32, unit_number: u32) -> bool {
        self.controller_key == controller_key && self.unit_number == unit_number
    }
}

impl fmt::Display for Disk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gib = self.size() as f64 / 1_073_741_824.0;

        write!(
            f,
            "{} ({:.2} GiB) at {}:{}",
            self.label.as_deref().unwrap_or("disk"),
            gib,
            self.controller_key,
            self.unit_number
        )?;

        if !self.backing.file_name.is_empty() {
            write!(f, " - {}", self.backing.file_name)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_disk_mode_names() {
        for mode in [
            DiskMode::Append,
            DiskMode::IndependentNonpersistent,
            DiskMode::IndependentPersistent,
            DiskMode::Nonpersistent,
            DiskMode::Persistent,
            DiskMode::Undoable,
        ] {
            assert_eq!(mode.to_string().parse(), Ok(mode));
        }
        assert_eq!(DiskMode::default(), DiskMode::Persistent);
        assert!("persistant".parse::<DiskMode>().is_err());
    }

    fn disk() -> Disk {
        Disk {
            key: 2000,
            controller_key: 1000,
            unit_number: 1,
            capacity_kb: 20 * 1024 * 1024,
            backing: Backing {
                disk_mode: DiskMode::Persistent,
                split: false,
                eagerly_scrub: true,
                thin_provisioned: false,
                write_through: false,
                file_name: "[ds0] vm/vm_1.vmdk".to_owned(),
                datastore: None,
            },
            label: Some("Hard disk 2".to_owned()),
        }
    }

    #[test]
    fn test_display() {
        let disk = disk();
        assert_eq!(disk.to_string(), "Hard disk 2 (20.00 GiB) at 1000:1 - [ds0] vm/vm_1.vmdk");
        assert!(disk.is_at(1000, 1));
        assert!(!disk.is_at(1000, 0));
    }

    #[test]
    fn test_size_saturates() {
        assert_eq!(disk().size(), 20 * 1024 * 1024 * 1024);
        let huge = Disk {
            capacity_kb: u64::MAX / 2,
            ..disk()
        };
        assert_eq!(huge.size(), u64::MAX);
    }
}
