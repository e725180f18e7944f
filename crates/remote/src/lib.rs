// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Access to the remote virtual machine management service
//!
//! The [`Session`] trait is the whole surface the provisioning workflow needs:
//! reading a machine's device inventory, submitting configuration changes and
//! refreshing the status of the long running tasks those changes produce.

use std::{fmt, io};

use devices::{DatastoreRef, Device, DeviceChange, VirtualMachineRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod http;
pub mod mock;

/// Transport level failures talking to the remote system
#[derive(Debug, Error)]
pub enum Error {
    /// Connecting to, reading from or writing to the service failed
    #[error("transport: {0}")]
    Io(#[from] io::Error),

    /// The HTTP exchange with the service failed
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    /// The service sent a response the client cannot use
    #[error("malformed response: {0}")]
    Protocol(String),

    /// The service answered with a non-success status
    #[error("server responded with status {code}{}", status_detail(.body))]
    Status { code: u16, body: Option<String> },

    /// A request or response body could not be encoded or decoded
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// The referenced object does not exist on the remote system
    #[error("no such object: {0}")]
    UnknownObject(String),
}

fn status_detail(body: &Option<String>) -> String {
    body.as_deref().map(|b| format!(": {b}")).unwrap_or_default()
}

/// Lifecycle state of a remote task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error,
}

impl TaskState {
    /// Whether the task will not change state again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => f.write_str("queued"),
            Self::Running => f.write_str("running"),
            Self::Success => f.write_str("success"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Handle to a long running operation on the remote system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// A snapshot of a task's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub state: TaskState,
    /// Percent complete, if the remote system reports it
    pub progress: Option<u8>,
    /// Localized failure message when `state` is [`TaskState::Error`]
    pub error: Option<String>,
}

impl TaskInfo {
    pub fn new(state: TaskState, progress: Option<u8>) -> Self {
        Self {
            state,
            progress,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: TaskState::Error,
            progress: None,
            error: Some(message.into()),
        }
    }
}

/// The remote management API as seen by the provisioning workflow
pub trait Session {
    /// Returns the ordered device inventory of `vm`.
    ///
    /// Reflects the latest committed configuration once a task has reached
    /// [`TaskState::Success`].
    fn device_inventory(&self, vm: &VirtualMachineRef) -> Result<Vec<Device>, Error>;

    /// Submits a configuration change against `vm` and returns the task tracking it
    fn submit_config_change(&self, vm: &VirtualMachineRef, changes: &[DeviceChange]) -> Result<Task, Error>;

    /// Fetches the current status of `task`
    fn refresh_status(&self, task: &Task) -> Result<TaskInfo, Error>;

    /// Resolves a datastore by its human readable name
    fn lookup_datastore(&self, name: &str) -> Result<DatastoreRef, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_terminal_states() {
        assert!(!TaskState::Queued.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Success.is_terminal());
        assert!(TaskState::Error.is_terminal());
    }

    #[test]
    fn test_status_message() {
        let err = Error::Status {
            code: 503,
            body: Some("maintenance".into()),
        };
        assert_eq!(err.to_string(), "server responded with status 503: maintenance");
        let err = Error::Status { code: 500, body: None };
        assert_eq!(err.to_string(), "server responded with status 500");
    }
}
