// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use crate::Context;

mod disk;
mod server;

pub use disk::DiskRequest;
pub use server::ServerConfig;

/// A top level node of a request file
#[derive(Debug)]
pub enum Node {
    Server(Box<ServerConfig>),
    Disk(Box<DiskRequest>),
}

/// Node parsing function
type NodeParse = for<'a> fn(Context<'a>) -> Result<Node, crate::ConfigError>;

/// Map of node names to functions
static NODES: phf::Map<&'static str, NodeParse> = phf::phf_map! {
    "server" => server::parse,
    "disk" => disk::parse,
};

/// Parse a node if possible
pub(crate) fn parse_node(context: Context<'_>) -> Result<Node, crate::ConfigError> {
    let name = context.node.name().value();
    let func = NODES.get(name).ok_or_else(|| crate::UnsupportedNode {
        at: context.node.span(),
        name: name.into(),
    })?;

    func(context)
}
