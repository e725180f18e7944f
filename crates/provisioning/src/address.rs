// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::collections::BTreeSet;

use devices::{Controller, Device};
use log::trace;

/// Lowest unit number not taken by a disk on `controller`
///
/// Gaps are reused. No upper bound is applied here, the remote system rejects
/// addresses beyond the controller's slot count.
pub fn next_unit_number(controller: &Controller, inventory: &[Device]) -> u32 {
    if controller.devices.is_empty() {
        return 0;
    }

    let taken: BTreeSet<u32> = devices::disks(inventory)
        .filter(|d| d.controller_key == controller.key)
        .map(|d| d.unit_number)
        .collect();

    let unit = (0..).find(|n| !taken.contains(n)).unwrap_or(0);
    trace!("Units {taken:?} taken on {controller}, allocating {unit}");
    unit
}
