// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use devices::{Backing, Controller, DatastoreRef, DeviceChange, Disk, DiskMode, MIN_CAPACITY_KB};

use crate::Error;

/// Fail unless `capacity_kb` is at least [`MIN_CAPACITY_KB`]
pub(crate) fn check_capacity(capacity_kb: u64) -> Result<(), Error> {
    if capacity_kb < MIN_CAPACITY_KB {
        return Err(Error::InvalidArgument(format!(
            "capacity must be at least {MIN_CAPACITY_KB} KB, got {capacity_kb} KB"
        )));
    }
    Ok(())
}

/// Build the change that creates an eagerly scrubbed disk
///
/// The disk is thick provisioned and zeroed in full at creation time. Its
/// backing file name is the bracketed datastore name, so the remote system
/// chooses the concrete path.
pub fn build_disk_change(
    key: i32,
    capacity_kb: u64,
    mode: DiskMode,
    split: bool,
    datastore: &DatastoreRef,
    controller: &Controller,
    unit_number: u32,
) -> Result<DeviceChange, Error> {
    check_capacity(capacity_kb)?;

    let disk = Disk {
        key,
        controller_key: controller.key,
        unit_number,
        capacity_kb,
        backing: Backing {
            disk_mode: mode,
            split,
            eagerly_scrub: true,
            thin_provisioned: false,
            write_through: false,
            file_name: datastore.bracketed_name(),
            datastore: Some(datastore.clone()),
        },
        label: None,
    };

    Ok(DeviceChange::create_disk(disk))
}
