// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::fmt;

use devices::{ControllerKind, DiskMode};
use kdl::KdlEntry;

use crate::{kdl_value_to_string, ConfigError, UnsupportedValue};

mod units;
pub use units::*;

/// The type of a KDL value
#[derive(Debug)]
pub enum KdlType {
    /// A boolean value
    Boolean,
    /// A string value
    String,
    /// An integer value
    Integer,
}

impl fmt::Display for KdlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KdlType::Boolean => f.write_str("boolean"),
            KdlType::String => f.write_str("string"),
            KdlType::Integer => f.write_str("int"),
        }
    }
}

/// Conversion of a string property into an enumerated value
pub trait FromKdlProperty<'a>: Sized {
    fn from_kdl_property(entry: &'a KdlEntry) -> Result<Self, ConfigError>;
}

impl FromKdlProperty<'_> for ControllerKind {
    fn from_kdl_property(entry: &KdlEntry) -> Result<Self, ConfigError> {
        let value = kdl_value_to_string(entry, "controller")?;
        let v = value.parse().map_err(|_| UnsupportedValue {
            at: entry.span(),
            advice: Some("'scsi', 'buslogic', 'lsilogic', 'lsilogic-sas' and 'pvscsi' are supported".into()),
        })?;
        Ok(v)
    }
}

impl FromKdlProperty<'_> for DiskMode {
    fn from_kdl_property(entry: &KdlEntry) -> Result<Self, ConfigError> {
        let value = kdl_value_to_string(entry, "mode")?;
        let v = value.parse().map_err(|_| UnsupportedValue {
            at: entry.span(),
            advice: Some(
                "'append', 'independent_nonpersistent', 'independent_persistent', 'nonpersistent', \
                 'persistent' and 'undoable' are supported"
                    .into(),
            ),
        })?;
        Ok(v)
    }
}
