// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{Controller, Device, Disk};

/// What to do with the device in a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Add,
}

/// What to do with the device's backing file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperation {
    Create,
}

/// One unit of a configuration change submitted to the remote system
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceChange {
    pub operation: Operation,
    #[serde(default)]
    pub file_operation: Option<FileOperation>,
    pub device: Device,
}

impl DeviceChange {
    /// Add a controller. Controllers have no backing file.
    pub fn add_controller(controller: Controller) -> Self {
        Self {
            operation: Operation::Add,
            file_operation: None,
            device: Device::Controller(controller),
        }
    }

    /// Add a disk and create its backing file
    pub fn create_disk(disk: Disk) -> Self {
        Self {
            operation: Operation::Add,
            file_operation: Some(FileOperation::Create),
            device: Device::Disk(disk),
        }
    }
}
