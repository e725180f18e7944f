// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Storage controller discovery and creation
//!
//! At most one storage controller per virtual machine is supported. When one
//! exists it is always reused, whatever kind the caller asked for.

use devices::{Controller, ControllerKind, Device, DeviceChange};

use crate::Error;

/// The first controller with the storage-controller capability in `inventory`
pub fn find_storage_controller(inventory: &[Device]) -> Option<&Controller> {
    devices::storage_controllers(inventory).next()
}

/// Fail unless `kind` is a controller disks can attach to
pub(crate) fn check_kind(kind: ControllerKind) -> Result<(), Error> {
    if !kind.is_scsi() {
        return Err(Error::InvalidArgument(format!(
            "{kind} controllers are not supported, use a SCSI controller kind"
        )));
    }
    Ok(())
}

/// Build the single-device change that adds a new storage controller
///
/// The controller takes the lowest bus number not used by another SCSI
/// controller.
pub fn build_controller_change(key: i32, kind: ControllerKind, inventory: &[Device]) -> Result<DeviceChange, Error> {
    check_kind(kind)?;

    let bus_number = (0..)
        .find(|bus| !devices::storage_controllers(inventory).any(|c| c.bus_number == *bus))
        .unwrap_or(0);

    Ok(DeviceChange::add_controller(Controller::placeholder(key, bus_number, kind)))
}
