// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! JSON over HTTP implementation of [`Session`]

use std::time::Duration;

use devices::{DatastoreRef, Device, DeviceChange, VirtualMachineRef};
use log::{debug, trace};
use reqwest::{
    blocking::{self, RequestBuilder},
    header::ACCEPT,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{Error, Session, Task, TaskInfo, TaskState};

const API_PREFIX: &str = "/api/v1";

/// Default timeout for a single request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A blocking client for the management service
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    http: blocking::Client,
}

#[derive(Serialize)]
struct ReconfigureRequest<'a> {
    device_change: &'a [DeviceChange],
}

/// Task payload as sent by the server. Progress may be any JSON value.
#[derive(Deserialize)]
struct WireTask {
    id: String,
    state: TaskState,
    #[serde(default)]
    progress: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

impl From<WireTask> for TaskInfo {
    fn from(task: WireTask) -> Self {
        let progress = task
            .progress
            .as_f64()
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 100.0) as u8);
        Self {
            state: task.state,
            progress,
            error: task.error,
        }
    }
}

impl Client {
    /// Create a client for the service at `address`
    ///
    /// A bare `host:port` is reached over plain http.
    pub fn new(address: &str, timeout: Duration) -> Result<Self, Error> {
        let base_url = if address.contains("://") {
            address.trim_end_matches('/').to_owned()
        } else {
            format!("http://{}", address.trim_end_matches('/'))
        };
        let http = blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.base_url)
    }

    fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, Error> {
        let response = request.header(ACCEPT, "application/json").send()?;
        let status = response.status();
        trace!("{} -> {status}", response.url());

        if !status.is_success() {
            let body = response.text().ok().filter(|b| !b.is_empty());
            return Err(Error::Status {
                code: status.as_u16(),
                body,
            });
        }

        let body = response.text()?;
        if body.is_empty() {
            return Err(Error::Protocol("response has no body".into()));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

impl Session for Client {
    fn device_inventory(&self, vm: &VirtualMachineRef) -> Result<Vec<Device>, Error> {
        let url = self.url(&format!("/vms/{}/devices", urlencoding::encode(vm.id())));
        debug!("GET {url}");
        self.call(self.http.get(url))
    }

    fn submit_config_change(&self, vm: &VirtualMachineRef, changes: &[DeviceChange]) -> Result<Task, Error> {
        let url = self.url(&format!("/vms/{}/reconfigure", urlencoding::encode(vm.id())));
        debug!("POST {url} with {} change(s)", changes.len());
        let task: WireTask = self.call(self.http.post(url).json(&ReconfigureRequest { device_change: changes }))?;
        Ok(Task { id: task.id })
    }

    fn refresh_status(&self, task: &Task) -> Result<TaskInfo, Error> {
        let url = self.url(&format!("/tasks/{}", urlencoding::encode(&task.id)));
        debug!("GET {url}");
        let task: WireTask = self.call(self.http.get(url))?;
        Ok(task.into())
    }

    fn lookup_datastore(&self, name: &str) -> Result<DatastoreRef, Error> {
        let url = self.url(&format!("/datastores/{}", urlencoding::encode(name)));
        debug!("GET {url}");
        self.call(self.http.get(url))
    }
}
