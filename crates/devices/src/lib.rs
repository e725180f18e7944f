// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Hardware inventory of a remotely managed virtual machine
//!
//! The remote system hands back a flat list of mixed devices. This crate models
//! that list as a tagged [`Device`] enum so consumers can match on capability
//! rather than inspecting types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod change;
mod controller;
mod disk;

pub use change::{DeviceChange, FileOperation, Operation};
pub use controller::{Controller, ControllerKind};
pub use disk::{Backing, Disk, DiskMode};

/// Smallest disk capacity, in KiB, the remote system will accept
pub const MIN_CAPACITY_KB: u64 = 1024;

/// Error returned when parsing an enumerated value from a string
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);

/// Opaque handle to a virtual machine owned by the remote system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VirtualMachineRef(String);

impl VirtualMachineRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the remote identifier of the machine
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VirtualMachineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A storage location on the remote system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreRef {
    /// Human readable datastore name (e.g. ds0)
    pub name: String,
    /// Remote handle of the datastore
    pub handle: String,
}

impl DatastoreRef {
    pub fn new(name: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: handle.into(),
        }
    }

    /// Returns the bracketed form of the name, e.g. `[ds0]`
    ///
    /// Used as a backing file name this leaves the concrete path up to the
    /// remote system.
    pub fn bracketed_name(&self) -> String {
        format!("[{}]", self.name)
    }
}

/// An entry in a virtual machine's hardware inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Device {
    /// A bus controller that other devices attach to
    Controller(Controller),
    /// A virtual disk
    Disk(Disk),
    /// Any device this crate has no use for (NICs, video cards, ...)
    #[serde(other)]
    Other,
}

impl Device {
    /// Returns the device as a controller with the storage-controller capability
    pub fn as_storage_controller(&self) -> Option<&Controller> {
        match self {
            Device::Controller(controller) if controller.kind.is_scsi() => Some(controller),
            _ => None,
        }
    }

    /// Returns the device as a disk
    pub fn as_disk(&self) -> Option<&Disk> {
        match self {
            Device::Disk(disk) => Some(disk),
            _ => None,
        }
    }
}

/// Iterate all disks in an inventory
pub fn disks(devices: &[Device]) -> impl Iterator<Item = &Disk> {
    devices.iter().filter_map(Device::as_disk)
}

/// Iterate all storage controllers in an inventory
pub fn storage_controllers(devices: &[Device]) -> impl Iterator<Item = &Controller> {
    devices.iter().filter_map(Device::as_storage_controller)
}
