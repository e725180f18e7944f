// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{fmt, io, sync::Arc};

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::KdlType;

/// The workflow step a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Creating the storage controller
    Controller,
    /// Creating the disk itself
    Disk,
    /// Locating the created disk afterwards
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Controller => f.write_str("controller"),
            Stage::Disk => f.write_str("disk"),
            Stage::Verify => f.write_str("verify"),
        }
    }
}

/// Error type for the provisioning workflow
#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    /// Rejected before anything was sent to the remote system
    #[error("invalid argument: {0}")]
    #[diagnostic(code(provisioning::invalid_argument))]
    InvalidArgument(String),

    /// A submitted task failed, or its result could not be found
    #[error("provisioning failed during {stage} stage: {message}")]
    #[diagnostic(
        code(provisioning::failed),
        help("the change was not retried; inspect the task on the management service")
    )]
    ProvisioningFailed { stage: Stage, message: String },

    #[error("remote service unavailable: {0}")]
    #[diagnostic(code(provisioning::remote_unavailable))]
    RemoteUnavailable(#[from] remote::Error),
}

impl Error {
    pub(crate) fn failed(stage: Stage, message: impl Into<String>) -> Self {
        Self::ProvisioningFailed {
            stage,
            message: message.into(),
        }
    }
}

/// Error type for request and configuration files
#[derive(Diagnostic, Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    IO(#[from] io::Error),

    #[diagnostic(transparent)]
    #[error(transparent)]
    Kdl(#[from] kdl::KdlError),

    #[diagnostic(transparent)]
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[diagnostic(transparent)]
    #[error(transparent)]
    InvalidArguments(#[from] InvalidArguments),

    #[diagnostic(transparent)]
    #[error(transparent)]
    InvalidType(#[from] InvalidType),

    #[diagnostic(transparent)]
    #[error(transparent)]
    UnsupportedNode(#[from] UnsupportedNode),

    #[diagnostic(transparent)]
    #[error(transparent)]
    DuplicateNode(#[from] DuplicateNode),

    #[diagnostic(transparent)]
    #[error(transparent)]
    MissingProperty(#[from] MissingProperty),

    #[diagnostic(transparent)]
    #[error(transparent)]
    UnsupportedValue(#[from] UnsupportedValue),
}

/// Merged error for parsing failures
/// Returns a list of diagnostics for the user
#[derive(Debug, Diagnostic, Error)]
#[error("failed to parse KDL")]
#[diagnostic(severity(error))]
pub struct ParseError {
    #[source_code]
    pub src: NamedSource<Arc<String>>,
    #[related]
    pub diagnostics: Vec<ConfigError>,
}

/// Error for invalid types
#[derive(Debug, Diagnostic, Error)]
#[error("invalid type for {id}, expected {expected_type}")]
#[diagnostic(severity(error))]
pub struct InvalidType {
    #[label]
    pub at: SourceSpan,

    pub id: &'static str,

    /// The expected type
    pub expected_type: KdlType,
}

/// Error for missing mandatory properties
#[derive(Debug, Diagnostic, Error)]
#[error("missing property: {id}")]
#[diagnostic(severity(error))]
pub struct MissingProperty {
    #[label]
    pub at: SourceSpan,

    pub id: &'static str,

    #[help]
    pub advice: Option<String>,
}

/// Error for unsupported node types
#[derive(Debug, Diagnostic, Error)]
#[error("unsupported node: {name}")]
#[diagnostic(severity(error), help("only 'server' and 'disk' nodes are supported"))]
pub struct UnsupportedNode {
    #[label]
    pub at: SourceSpan,

    pub name: String,
}

/// Error for nodes that may only appear once
#[derive(Debug, Diagnostic, Error)]
#[error("duplicate node: {name}")]
#[diagnostic(severity(error))]
pub struct DuplicateNode {
    #[label("declared again here")]
    pub at: SourceSpan,

    pub name: &'static str,
}

/// Error for unsupported values
#[derive(Debug, Diagnostic, Error)]
#[error("unsupported value")]
#[diagnostic(severity(error))]
pub struct UnsupportedValue {
    #[label]
    pub at: SourceSpan,

    #[help]
    pub advice: Option<String>,
}

/// Error for invalid arguments
#[derive(Debug, Diagnostic, Error)]
#[error("invalid arguments")]
#[diagnostic(severity(error))]
pub struct InvalidArguments {
    #[label]
    pub at: SourceSpan,

    #[help]
    pub advice: Option<String>,
}
