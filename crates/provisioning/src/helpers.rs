// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use kdl::{KdlEntry, KdlNode};

use crate::{ConfigError, FromKdlType, InvalidType, KdlType, MissingProperty, StorageUnit, UnsupportedValue};

// Get a mandatory named property from a node
pub(crate) fn get_kdl_property<'a>(node: &'a KdlNode, name: &'static str) -> Result<&'a KdlEntry, ConfigError> {
    Ok(node.entry(name).ok_or_else(|| MissingProperty {
        at: node.span(),
        id: name,
        advice: Some(format!("add {name}=... to the {} node", node.name().value())),
    })?)
}

// Get a string value from an entry
pub(crate) fn kdl_value_to_string(entry: &KdlEntry, id: &'static str) -> Result<String, ConfigError> {
    let value = entry.value().as_string().ok_or(InvalidType {
        at: entry.span(),
        id,
        expected_type: KdlType::String,
    })?;

    Ok(value.to_owned())
}

// Get a mandatory string property from a node
pub(crate) fn get_property_str(node: &KdlNode, name: &'static str) -> Result<String, ConfigError> {
    kdl_value_to_string(get_kdl_property(node, name)?, name)
}

// Get an optional boolean property, falling back to `default`
pub(crate) fn get_property_bool(node: &KdlNode, name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match node.entry(name) {
        None => Ok(default),
        Some(entry) => Ok(entry.value().as_bool().ok_or(InvalidType {
            at: entry.span(),
            id: name,
            expected_type: KdlType::Boolean,
        })?),
    }
}

// Get an optional non-negative integer property
pub(crate) fn get_property_u64(node: &KdlNode, name: &'static str) -> Result<Option<u64>, ConfigError> {
    let Some(entry) = node.entry(name) else {
        return Ok(None);
    };
    kdl_value_to_u64(entry, name).map(Some)
}

fn kdl_value_to_u64(entry: &KdlEntry, id: &'static str) -> Result<u64, ConfigError> {
    let value = entry.value().as_integer().ok_or(InvalidType {
        at: entry.span(),
        id,
        expected_type: KdlType::Integer,
    })?;

    Ok(u64::try_from(value).map_err(|_| UnsupportedValue {
        at: entry.span(),
        advice: Some(format!("{id} must be a non-negative integer")),
    })?)
}

// Convert a unit-annotated integer entry into bytes
pub(crate) fn kdl_value_to_storage_size(entry: &KdlEntry, id: &'static str) -> Result<u64, ConfigError> {
    let value = kdl_value_to_u64(entry, id)?;
    let unit = StorageUnit::from_kdl_type(entry)?;

    Ok(value.checked_mul(unit.bytes()).ok_or_else(|| UnsupportedValue {
        at: entry.span(),
        advice: Some(format!("{id} is too large")),
    })?)
}
