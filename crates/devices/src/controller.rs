// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::UnknownVariant;

/// The model of a bus controller
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerKind {
    /// IDE controller
    #[serde(rename = "ide")]
    Ide,
    /// AHCI/SATA controller
    #[serde(rename = "sata")]
    Sata,
    /// Generic SCSI controller, the remote system picks the model
    #[default]
    #[serde(rename = "scsi")]
    Scsi,
    /// BusLogic parallel SCSI
    #[serde(rename = "buslogic")]
    BusLogic,
    /// LSI Logic parallel SCSI
    #[serde(rename = "lsilogic")]
    LsiLogic,
    /// LSI Logic SAS
    #[serde(rename = "lsilogic-sas")]
    LsiLogicSas,
    /// Paravirtual SCSI
    #[serde(rename = "pvscsi")]
    ParaVirtual,
}

impl ControllerKind {
    /// Whether disks provisioned here may attach to this kind of controller
    pub fn is_scsi(&self) -> bool {
        !matches!(self, Self::Ide | Self::Sata)
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ide => f.write_str("ide"),
            Self::Sata => f.write_str("sata"),
            Self::Scsi => f.write_str("scsi"),
            Self::BusLogic => f.write_str("buslogic"),
            Self::LsiLogic => f.write_str("lsilogic"),
            Self::LsiLogicSas => f.write_str("lsilogic-sas"),
            Self::ParaVirtual => f.write_str("pvscsi"),
        }
    }
}

impl FromStr for ControllerKind {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ide" => Ok(Self::Ide),
            "sata" => Ok(Self::Sata),
            "scsi" => Ok(Self::Scsi),
            "buslogic" => Ok(Self::BusLogic),
            "lsilogic" => Ok(Self::LsiLogic),
            "lsilogic-sas" => Ok(Self::LsiLogicSas),
            "pvscsi" => Ok(Self::ParaVirtual),
            _ => Err(UnknownVariant(value.to_owned())),
        }
    }
}

/// A bus controller in the inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controller {
    /// Device key, negative while the controller is only a pending change
    pub key: i32,
    /// Bus number among controllers of the same family
    pub bus_number: u32,
    /// Controller model
    pub kind: ControllerKind,
    /// Keys of the devices currently attached
    #[serde(default)]
    pub devices: Vec<i32>,
}

impl Controller {
    /// A new, not yet created controller carrying a placeholder key
    pub fn placeholder(key: i32, bus_number: u32, kind: ControllerKind) -> Self {
        Self {
            key,
            bus_number,
            kind,
            devices: Vec::new(),
        }
    }
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} controller {} (key {})", self.kind, self.bus_number, self.key)
    }
}
