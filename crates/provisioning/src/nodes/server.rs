// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::time::Duration;

use itertools::Itertools;

use crate::{get_property_u64, Context};

/// Connection settings for the management service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// host:port of the service
    pub address: String,

    /// Delay between task status refreshes
    pub poll_interval: Option<Duration>,

    /// Read/write timeout for each request
    pub timeout: Option<Duration>,
}

/// Parse `server "<address>" [poll-interval-ms=N] [timeout-ms=N]`
pub(crate) fn parse(context: Context<'_>) -> Result<super::Node, crate::ConfigError> {
    let arguments = context
        .node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .collect_vec();

    let address = match arguments.len() {
        0 => {
            return Err(crate::InvalidArguments {
                at: context.node.span(),
                advice: Some("server <address> - provide the host:port of the management service".into()),
            }
            .into())
        }
        1 => arguments[0].value().as_string().ok_or(crate::InvalidType {
            at: arguments[0].span(),
            id: "address",
            expected_type: crate::KdlType::String,
        })?,
        _ => {
            return Err(crate::InvalidArguments {
                at: context.node.span(),
                advice: Some("server <address> - only one positional argument supported".into()),
            }
            .into())
        }
    };

    let poll_interval = get_property_u64(context.node, "poll-interval-ms")?.map(Duration::from_millis);
    let timeout = get_property_u64(context.node, "timeout-ms")?.map(Duration::from_millis);

    Ok(super::Node::Server(Box::new(ServerConfig {
        address: address.to_owned(),
        poll_interval,
        timeout,
    })))
}
