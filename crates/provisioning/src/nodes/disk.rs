// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use devices::{ControllerKind, DiskMode, VirtualMachineRef};

use crate::{
    get_kdl_property, get_property_bool, get_property_str, kdl_value_to_storage_size, Context, DiskOptions,
    FromKdlProperty,
};

/// A disk to provision, as declared in a request file
#[derive(Debug, Clone, PartialEq)]
pub struct DiskRequest {
    /// The target virtual machine
    pub vm: VirtualMachineRef,

    /// Name of the datastore to place the backing file on
    pub datastore: String,

    pub options: DiskOptions,
}

/// Parse `disk vm=... datastore=... capacity=(unit)N [controller=...] [mode=...] [split=#bool] [async=#bool]`
pub(crate) fn parse(context: Context<'_>) -> Result<super::Node, crate::ConfigError> {
    let node = context.node;
    let vm = get_property_str(node, "vm")?;
    let datastore = get_property_str(node, "datastore")?;

    let capacity = get_kdl_property(node, "capacity")?;
    let bytes = kdl_value_to_storage_size(capacity, "capacity")?;
    if bytes % 1024 != 0 {
        return Err(crate::UnsupportedValue {
            at: capacity.span(),
            advice: Some(format!("capacity must be a whole number of KiB, {bytes} bytes is not")),
        }
        .into());
    }

    let controller = match node.entry("controller") {
        Some(entry) => Some(ControllerKind::from_kdl_property(entry)?),
        None => None,
    };
    let mode = match node.entry("mode") {
        Some(entry) => DiskMode::from_kdl_property(entry)?,
        None => DiskMode::default(),
    };

    let options = DiskOptions {
        capacity_kb: bytes / 1024,
        controller,
        mode,
        split: get_property_bool(node, "split", false)?,
        run_async: get_property_bool(node, "async", false)?,
    };

    Ok(super::Node::Disk(Box::new(DiskRequest {
        vm: VirtualMachineRef::new(vm),
        datastore,
        options,
    })))
}
