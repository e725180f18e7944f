// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{fs, path::Path, sync::Arc};

use itertools::{Either, Itertools};
use kdl::{KdlDocument, KdlNode};
use miette::NamedSource;

mod errors;
pub use errors::*;

mod helpers;
use helpers::*;

mod types;
pub use types::*;

mod nodes;
use nodes::*;
pub use nodes::{DiskRequest, ServerConfig};

mod address;
pub use address::next_unit_number;

mod controller;
pub use controller::{build_controller_change, find_storage_controller};
use controller::check_kind;

mod disk_spec;
pub use disk_spec::build_disk_change;
use disk_spec::check_capacity;

mod keys;
pub use keys::PlaceholderKeys;

mod task;
pub use task::{progress_of, TaskTracker, DEFAULT_POLL_INTERVAL};

mod provisioner;
pub use provisioner::{DiskOptions, Provisioned, Provisioner};

/// Parsing context for a single node
pub(crate) struct Context<'a> {
    pub node: &'a KdlNode,
}

/// A parsed request file
#[derive(Debug, Default)]
pub struct Config {
    /// Connection settings, if the file has a `server` node
    pub server: Option<ServerConfig>,

    /// Disks to provision, in file order
    pub disks: Vec<DiskRequest>,
}

impl Config {
    /// Load a request file from a path
    pub fn new_for_path<P>(file: P) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
    {
        let file = file.as_ref();
        let name = file.to_string_lossy();
        let txt = fs::read_to_string(file)?;
        Self::new(name.to_string(), txt)
    }

    /// Parse a request file from a string
    pub fn new(name: String, contents: String) -> Result<Self, ConfigError> {
        let source = Arc::new(contents);
        let ns = NamedSource::new(name, source.clone()).with_language("KDL");
        let d = KdlDocument::parse_v2(source.as_str())?;

        // Collect all failures in this document
        let (parsed, mut errors): (Vec<_>, Vec<_>) =
            d.nodes()
                .iter()
                .partition_map(|node| match parse_node(Context { node }) {
                    Ok(parsed) => Either::Left((node, parsed)),
                    Err(e) => Either::Right(e),
                });

        let mut config = Self::default();
        for (node, parsed) in parsed {
            match parsed {
                Node::Server(_) if config.server.is_some() => {
                    errors.push(
                        DuplicateNode {
                            at: node.span(),
                            name: "server",
                        }
                        .into(),
                    );
                }
                Node::Server(server) => config.server = Some(*server),
                Node::Disk(disk) => config.disks.push(*disk),
            }
        }

        if !errors.is_empty() {
            return Err(ParseError {
                src: ns,
                diagnostics: errors,
            })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use devices::{ControllerKind, DiskMode};

    use super::*;
    use test_log::test;

    fn parse(text: &str) -> Result<Config, ConfigError> {
        Config::new("test.kdl".into(), text.into())
    }

    fn diagnostics(err: ConfigError) -> Vec<ConfigError> {
        match err {
            ConfigError::Parse(e) => e.diagnostics,
            e => panic!("expected a parse error, got {e:?}"),
        }
    }

    #[test]
    fn test_full_request() {
        let config = parse(
            r#"
            server "10.0.0.5:8989" poll-interval-ms=250 timeout-ms=10000
            disk vm="vm-42" datastore="ds0" capacity=(gib)20 controller="pvscsi" mode="independent_persistent" split=#true async=#true
            disk vm="vm-43" datastore="ds1" capacity=1048576
            "#,
        )
        .unwrap();

        let server = config.server.unwrap();
        assert_eq!(server.address, "10.0.0.5:8989");
        assert_eq!(server.poll_interval, Some(Duration::from_millis(250)));
        assert_eq!(server.timeout, Some(Duration::from_secs(10)));

        assert_eq!(config.disks.len(), 2);
        let first = &config.disks[0];
        assert_eq!(first.vm.id(), "vm-42");
        assert_eq!(first.datastore, "ds0");
        assert_eq!(first.options.capacity_kb, 20_971_520);
        assert_eq!(first.options.controller, Some(ControllerKind::ParaVirtual));
        assert_eq!(first.options.mode, DiskMode::IndependentPersistent);
        assert!(first.options.split);
        assert!(first.options.run_async);

        // Bare integers are bytes, everything else defaults
        assert_eq!(config.disks[1].options, DiskOptions::new(1024));
    }

    #[test]
    fn test_unknown_node() {
        let errors = diagnostics(parse("find-disk root").unwrap_err());
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ConfigError::UnsupportedNode(_)));
    }

    #[test]
    fn test_collects_all_errors() {
        let errors = diagnostics(
            parse(
                r#"
                disk datastore="ds0" capacity=(mib)1
                disk vm="vm" datastore="ds0" capacity=1000
                disk vm="vm" datastore="ds0" capacity=(parsecs)1
                disk vm="vm" datastore=1 capacity=(mib)1
                disk vm="vm" datastore="ds0" capacity=(mib)1 mode="sometimes"
                "#,
            )
            .unwrap_err(),
        );
        assert_eq!(errors.len(), 5);
        assert!(matches!(errors[0], ConfigError::MissingProperty(_)));
        assert!(matches!(errors[1], ConfigError::UnsupportedValue(_)));
        assert!(matches!(errors[2], ConfigError::UnsupportedValue(_)));
        assert!(matches!(errors[3], ConfigError::InvalidType(_)));
        assert!(matches!(errors[4], ConfigError::UnsupportedValue(_)));
    }

    #[test]
    fn test_server_arguments() {
        let errors = diagnostics(parse("server\nserver \"a:1\" \"b:2\"").unwrap_err());
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, ConfigError::InvalidArguments(_))));

        let errors = diagnostics(parse("server \"a:1\"\nserver \"b:2\"").unwrap_err());
        assert!(matches!(errors[..], [ConfigError::DuplicateNode(_)]));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(parse("disk vm=\"unterminated"), Err(ConfigError::Kdl(_))));
    }

    #[test]
    fn test_rendered_diagnostic() {
        let err = parse("disk vm=\"vm\" datastore=\"ds0\"").unwrap_err();
        let report = miette::Report::new(err);
        let rendered = format!("{report:?}");
        assert!(rendered.contains("missing property: capacity"));
    }
}
