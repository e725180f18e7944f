// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Mock management service for testing.
//!
//! [`MockSession`] keeps virtual machines, datastores and tasks in memory and
//! behaves like the remote system closely enough to drive the provisioning
//! workflow end to end: submitted changes only land in the inventory once their
//! task reaches [`TaskState::Success`], and real keys and file names are
//! assigned at that point. Every call is recorded for later inspection.

use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::{Mutex, MutexGuard, PoisonError},
};

use devices::{DatastoreRef, Device, DeviceChange, VirtualMachineRef};
use log::trace;

use crate::{Error, Session, Task, TaskInfo, TaskState};

const FIRST_CONTROLLER_KEY: i32 = 1000;
const FIRST_DISK_KEY: i32 = 2000;

/// A call made against the mock
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Inventory(VirtualMachineRef),
    Submit(VirtualMachineRef, Vec<DeviceChange>),
    Refresh(Task),
    LookupDatastore(String),
}

#[derive(Debug)]
struct MockTask {
    vm: VirtualMachineRef,
    changes: Vec<DeviceChange>,
    refreshes: u32,
    failure: Option<String>,
    finished: Option<TaskInfo>,
}

#[derive(Debug)]
struct State {
    machines: HashMap<VirtualMachineRef, Vec<Device>>,
    datastores: Vec<DatastoreRef>,
    tasks: HashMap<String, MockTask>,
    next_task: u32,
    next_controller_key: i32,
    next_disk_key: i32,
    polls_per_task: u32,
    failures: VecDeque<String>,
    offline: bool,
    calls: Vec<Call>,
}

/// In-memory stand-in for the remote management service
#[derive(Debug)]
pub struct MockSession {
    state: Mutex<State>,
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSession {
    /// Creates an empty mock where every task needs two non-terminal refreshes
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                machines: HashMap::new(),
                datastores: Vec::new(),
                tasks: HashMap::new(),
                next_task: 1,
                next_controller_key: FIRST_CONTROLLER_KEY,
                next_disk_key: FIRST_DISK_KEY,
                polls_per_task: 2,
                failures: VecDeque::new(),
                offline: false,
                calls: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a machine with the given inventory
    pub fn with_machine(self, vm: &VirtualMachineRef, devices: Vec<Device>) -> Self {
        self.state().machines.insert(vm.clone(), devices);
        self
    }

    /// Add a datastore that can be looked up by name
    pub fn with_datastore(self, datastore: DatastoreRef) -> Self {
        self.state().datastores.push(datastore);
        self
    }

    /// Number of refreshes a task reports as queued/running before it finishes
    pub fn set_polls_per_task(&self, polls: u32) {
        self.state().polls_per_task = polls;
    }

    /// Make the next submitted task fail with `message`
    pub fn fail_next_task(&self, message: impl Into<String>) {
        self.state().failures.push_back(message.into());
    }

    /// Simulate the service being unreachable
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Every submitted change set, in order
    pub fn submissions(&self) -> Vec<Vec<DeviceChange>> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Submit(_, changes) => Some(changes.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of status refreshes issued for `task`
    pub fn refresh_count(&self, task: &Task) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Refresh(t) if t == task))
            .count()
    }

    /// Current committed inventory of `vm`
    pub fn devices(&self, vm: &VirtualMachineRef) -> Vec<Device> {
        self.state().machines.get(vm).cloned().unwrap_or_default()
    }
}

impl State {
    fn record(&mut self, call: Call) -> Result<(), Error> {
        self.calls.push(call);
        if self.offline {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "mock service offline").into())
        } else {
            Ok(())
        }
    }

    /// Commit a finished task's changes to the inventory
    fn apply(&mut self, vm: &VirtualMachineRef, changes: &[DeviceChange]) -> Result<(), String> {
        let mut placeholders = HashMap::new();
        let mut inventory = self.machines.get(vm).cloned().ok_or("virtual machine vanished")?;

        for change in changes {
            match &change.device {
                Device::Controller(controller) => {
                    let mut controller = controller.clone();
                    let key = self.next_controller_key;
                    self.next_controller_key += 1;
                    placeholders.insert(controller.key, key);
                    controller.key = key;
                    controller.devices.clear();
                    inventory.push(Device::Controller(controller));
                }
                Device::Disk(disk) => {
                    let mut disk = disk.clone();
                    disk.controller_key = placeholders.get(&disk.controller_key).copied().unwrap_or(disk.controller_key);

                    let existing: Vec<_> = devices::disks(&inventory).collect();
                    if existing.iter().any(|d| d.is_at(disk.controller_key, disk.unit_number)) {
                        return Err(format!(
                            "device address {}:{} is already in use",
                            disk.controller_key, disk.unit_number
                        ));
                    }

                    let prefix = format!("{} ", disk.backing.file_name);
                    if disk.backing.file_name.ends_with(']') {
                        let siblings = existing
                            .iter()
                            .filter(|d| d.backing.file_name.starts_with(&prefix))
                            .count();
                        disk.backing.file_name = match siblings {
                            0 => format!("{prefix}{vm}/{vm}.vmdk"),
                            n => format!("{prefix}{vm}/{vm}_{n}.vmdk"),
                        };
                    }
                    disk.label = Some(format!("Hard disk {}", existing.len() + 1));
                    disk.key = self.next_disk_key;
                    self.next_disk_key += 1;

                    let controller = inventory
                        .iter_mut()
                        .find_map(|d| match d {
                            Device::Controller(c) if c.key == disk.controller_key => Some(c),
                            _ => None,
                        })
                        .ok_or_else(|| format!("controller {} does not exist", disk.controller_key))?;
                    controller.devices.push(disk.key);
                    inventory.push(Device::Disk(disk));
                }
                Device::Other => return Err("unsupported device in change".into()),
            }
        }

        self.machines.insert(vm.clone(), inventory);
        Ok(())
    }
}

impl Session for MockSession {
    fn device_inventory(&self, vm: &VirtualMachineRef) -> Result<Vec<Device>, Error> {
        let mut state = self.state();
        state.record(Call::Inventory(vm.clone()))?;
        state
            .machines
            .get(vm)
            .cloned()
            .ok_or_else(|| Error::UnknownObject(vm.to_string()))
    }

    fn submit_config_change(&self, vm: &VirtualMachineRef, changes: &[DeviceChange]) -> Result<Task, Error> {
        let mut state = self.state();
        state.record(Call::Submit(vm.clone(), changes.to_vec()))?;
        if !state.machines.contains_key(vm) {
            return Err(Error::UnknownObject(vm.to_string()));
        }

        let task = Task {
            id: format!("task-{}", state.next_task),
        };
        state.next_task += 1;
        let failure = state.failures.pop_front();
        trace!("mock: {task} created for {vm} with {} change(s)", changes.len());
        state.tasks.insert(
            task.id.clone(),
            MockTask {
                vm: vm.clone(),
                changes: changes.to_vec(),
                refreshes: 0,
                failure,
                finished: None,
            },
        );
        Ok(task)
    }

    fn refresh_status(&self, task: &Task) -> Result<TaskInfo, Error> {
        let mut state = self.state();
        state.record(Call::Refresh(task.clone()))?;
        let polls = state.polls_per_task;

        let entry = state
            .tasks
            .get_mut(&task.id)
            .ok_or_else(|| Error::UnknownObject(task.id.clone()))?;
        if let Some(finished) = &entry.finished {
            return Ok(finished.clone());
        }

        entry.refreshes += 1;
        if entry.refreshes <= polls {
            return Ok(match entry.refreshes {
                1 => TaskInfo::new(TaskState::Queued, None),
                n => TaskInfo::new(TaskState::Running, Some((n * 100 / (polls + 1)) as u8)),
            });
        }

        let failure = entry.failure.take();
        let vm = entry.vm.clone();
        let changes = std::mem::take(&mut entry.changes);

        let finished = match failure {
            Some(message) => TaskInfo::failed(message),
            None => match state.apply(&vm, &changes) {
                Ok(()) => TaskInfo::new(TaskState::Success, Some(100)),
                Err(message) => TaskInfo::failed(message),
            },
        };
        trace!("mock: {task} finished as {}", finished.state);

        if let Some(entry) = state.tasks.get_mut(&task.id) {
            entry.finished = Some(finished.clone());
        }
        Ok(finished)
    }

    fn lookup_datastore(&self, name: &str) -> Result<DatastoreRef, Error> {
        let mut state = self.state();
        state.record(Call::LookupDatastore(name.to_owned()))?;
        state
            .datastores
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| Error::UnknownObject(name.to_owned()))
    }
}
