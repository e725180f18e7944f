// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::fmt;

use kdl::KdlEntry;

use crate::{ConfigError, UnsupportedValue};

/// Storage unit used to annotate sizes, e.g. `capacity=(gib)20`
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum StorageUnit {
    #[default]
    Bytes = 1,

    Kilobytes = 1000,
    Megabytes = 1_000_000,
    Gigabytes = 1_000_000_000,
    Terabytes = 1_000_000_000_000,

    Kibibytes = 1024,
    Mebibytes = 1024 * 1024,
    Gibibytes = 1024 * 1024 * 1024,
    Tebibytes = 1024 * 1024 * 1024 * 1024,
}

/// Map of type annotations to storage units
static UNITS: phf::Map<&'static str, StorageUnit> = phf::phf_map! {
    "b" => StorageUnit::Bytes,
    "kb" => StorageUnit::Kilobytes,
    "mb" => StorageUnit::Megabytes,
    "gb" => StorageUnit::Gigabytes,
    "tb" => StorageUnit::Terabytes,
    "kib" => StorageUnit::Kibibytes,
    "mib" => StorageUnit::Mebibytes,
    "gib" => StorageUnit::Gibibytes,
    "tib" => StorageUnit::Tebibytes,
};

impl StorageUnit {
    /// Look up a unit by its (case insensitive) annotation
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        UNITS.get(suffix.to_lowercase().as_str()).copied()
    }

    /// Number of bytes in one of this unit
    pub fn bytes(self) -> u64 {
        self as u64
    }
}

impl fmt::Display for StorageUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = UNITS
            .entries()
            .find_map(|(k, v)| (v == self).then_some(*k))
            .unwrap_or("b");
        f.write_str(suffix)
    }
}

/// Conversion from a KDL type annotation
pub trait FromKdlType<'a>: Sized {
    fn from_kdl_type(entry: &'a KdlEntry) -> Result<Self, ConfigError>;
}

impl FromKdlType<'_> for StorageUnit {
    fn from_kdl_type(entry: &KdlEntry) -> Result<Self, ConfigError> {
        let Some(ty) = entry.ty() else {
            return Ok(Self::Bytes);
        };

        Ok(Self::from_suffix(ty.value()).ok_or_else(|| UnsupportedValue {
            at: entry.span(),
            advice: Some("'b', 'kb', 'mb', 'gb', 'tb', 'kib', 'mib', 'gib', 'tib' are supported".into()),
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_suffixes() {
        assert_eq!(StorageUnit::from_suffix("GiB"), Some(StorageUnit::Gibibytes));
        assert_eq!(StorageUnit::from_suffix("kb").map(StorageUnit::bytes), Some(1000));
        assert_eq!(StorageUnit::from_suffix("blocks"), None);
        assert_eq!(StorageUnit::Mebibytes.to_string(), "mib");
    }
}
