// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Submission and tracking of remote tasks
//!
//! A configuration change becomes a [`Task`] on the remote system. Synchronous
//! callers block in [`TaskTracker::await_completion`], which refreshes the
//! task status every poll interval until it reaches a terminal state.
//! Asynchronous callers take the [`Task`] from [`TaskTracker::submit_and_forget`]
//! and poll on their own.

use std::{thread, time::Duration};

use devices::{DeviceChange, VirtualMachineRef};
use log::{debug, info, trace, warn};
use remote::{Session, Task, TaskInfo, TaskState};

use crate::{Error, Stage};

/// Delay between two status refreshes of the same task
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Submits configuration changes and waits on the resulting tasks
#[derive(Debug)]
pub struct TaskTracker<'a, S: ?Sized> {
    session: &'a S,
    poll_interval: Duration,
}

/// Progress to report for a status snapshot, 0 when unknown
pub fn progress_of(info: &TaskInfo) -> u8 {
    info.progress.unwrap_or(0).min(100)
}

impl<'a, S: Session + ?Sized> TaskTracker<'a, S> {
    pub fn new(session: &'a S) -> Self {
        Self {
            session,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the delay between status refreshes
    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        Self { poll_interval, ..self }
    }

    /// Submit `changes` against `vm`, returning the task that tracks them
    pub fn submit(&self, vm: &VirtualMachineRef, changes: &[DeviceChange]) -> Result<Task, Error> {
        if changes.is_empty() {
            return Err(Error::InvalidArgument("a configuration change needs at least one device".into()));
        }

        debug!("Submitting {} device change(s) to {vm}", changes.len());
        let task = self.session.submit_config_change(vm, changes)?;
        info!("Submitted task {task} for {vm}");
        Ok(task)
    }

    /// Submit `changes` and hand the live task back without waiting on it
    ///
    /// Nothing further is tracked. The caller owns any later polling and, if
    /// needed, cancellation through the remote system.
    pub fn submit_and_forget(&self, vm: &VirtualMachineRef, changes: &[DeviceChange]) -> Result<Task, Error> {
        let task = self.submit(vm, changes)?;
        debug!("Not waiting on task {task}");
        Ok(task)
    }

    /// Block until `task` is terminal, reporting progress after every refresh
    ///
    /// A task ending in [`TaskState::Error`] becomes
    /// [`Error::ProvisioningFailed`] tagged with `stage`. Nothing is retried.
    pub fn await_completion<F>(&self, task: &Task, stage: Stage, mut on_progress: F) -> Result<TaskInfo, Error>
    where
        F: FnMut(u8),
    {
        loop {
            let info = self.session.refresh_status(task)?;
            trace!("Task {task} is {} ({:?}%)", info.state, info.progress);
            on_progress(progress_of(&info));

            match info.state {
                TaskState::Success => {
                    info!("Task {task} completed");
                    return Ok(info);
                }
                TaskState::Error => {
                    let message = info
                        .error
                        .unwrap_or_else(|| "task failed without a message".to_owned());
                    warn!("Task {task} failed: {message}");
                    return Err(Error::failed(stage, message));
                }
                TaskState::Queued | TaskState::Running => thread::sleep(self.poll_interval),
            }
        }
    }
}
