// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
// SPDX-FileCopyrightText: Copyright © 2025 AerynOS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::time::Duration;

use devices::{Controller, ControllerKind, DatastoreRef, Device, Disk, DiskMode, VirtualMachineRef};
use log::{debug, info, trace};
use remote::{Session, Task};

use crate::{
    build_controller_change, build_disk_change, check_capacity, check_kind, find_storage_controller,
    next_unit_number, Error, PlaceholderKeys, Stage, TaskTracker,
};

/// Caller choices for a new disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskOptions {
    /// Size of the disk in KiB, at least 1024
    pub capacity_kb: u64,

    /// Controller kind to create if the machine has none
    pub controller: Option<ControllerKind>,

    /// Persistence mode of the disk
    pub mode: DiskMode,

    /// Split the backing into extents rather than one monolithic file
    pub split: bool,

    /// Return as soon as the disk task is submitted
    pub run_async: bool,
}

impl DiskOptions {
    /// Defaults: generic SCSI controller, persistent, monolithic, synchronous
    pub fn new(capacity_kb: u64) -> Self {
        Self {
            capacity_kb,
            controller: None,
            mode: DiskMode::default(),
            split: false,
            run_async: false,
        }
    }

    /// Check the options without contacting the remote system
    pub fn validate(&self) -> Result<(), Error> {
        check_capacity(self.capacity_kb)?;
        check_kind(self.controller.unwrap_or_default())
    }
}

/// Result of a provisioning run
#[derive(Debug, Clone, PartialEq)]
pub enum Provisioned {
    /// The disk task completed, this is the disk as the remote system reports it
    Created(Disk),
    /// The disk task was submitted and is left running
    Submitted(Task),
}

/// Provisioner
pub struct Provisioner<'a, S: ?Sized> {
    session: &'a S,
    tracker: TaskTracker<'a, S>,
    keys: PlaceholderKeys,
}

impl<'a, S: Session + ?Sized> Provisioner<'a, S> {
    /// Create a new provisioner
    pub fn new(session: &'a S) -> Self {
        debug!("Creating new provisioner");
        Self {
            session,
            tracker: TaskTracker::new(session),
            keys: PlaceholderKeys::new(),
        }
    }

    /// Set the delay between task status refreshes
    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        Self {
            tracker: self.tracker.with_poll_interval(poll_interval),
            ..self
        }
    }

    /// Find the machine's storage controller, creating one if there is none
    ///
    /// `requested` only matters when a controller has to be created. Creation
    /// always blocks until its task is terminal.
    pub fn resolve_or_create_controller<F>(
        &self,
        vm: &VirtualMachineRef,
        requested: Option<ControllerKind>,
        on_progress: F,
    ) -> Result<Controller, Error>
    where
        F: FnMut(u8),
    {
        self.resolve_controller(vm, requested, on_progress)
            .map(|(controller, _)| controller)
    }

    // Resolve the controller along with the inventory it was found in
    fn resolve_controller<F>(
        &self,
        vm: &VirtualMachineRef,
        requested: Option<ControllerKind>,
        on_progress: F,
    ) -> Result<(Controller, Vec<Device>), Error>
    where
        F: FnMut(u8),
    {
        let kind = requested.unwrap_or_default();
        check_kind(kind)?;

        let inventory = self.session.device_inventory(vm)?;
        if let Some(controller) = find_storage_controller(&inventory) {
            if requested.is_some_and(|r| r != controller.kind) {
                debug!("Keeping existing {controller}, ignoring requested {kind}");
            }
            info!("Using existing {controller} on {vm}");
            return Ok((controller.clone(), inventory));
        }

        info!("No storage controller on {vm}, adding a {kind} controller");
        let change = build_controller_change(self.keys.next_key(), kind, &inventory)?;
        let task = self.tracker.submit(vm, &[change])?;
        self.tracker.await_completion(&task, Stage::Controller, on_progress)?;

        let inventory = self.session.device_inventory(vm)?;
        let controller = find_storage_controller(&inventory)
            .cloned()
            .ok_or_else(|| Error::failed(Stage::Controller, format!("task {task} succeeded but {vm} has no controller")))?;
        info!("Created {controller} on {vm}");
        Ok((controller, inventory))
    }

    /// Provision an eagerly scrubbed disk on `vm`
    ///
    /// The controller step always runs to completion first, even when
    /// `options.run_async` is set. In that case the disk task is left running
    /// and returned as [`Provisioned::Submitted`]. Otherwise the created disk is
    /// looked up again and returned as [`Provisioned::Created`].
    ///
    /// `on_progress` receives the stage and percentage after every task refresh.
    pub fn create_eager_zero_disk<F>(
        &self,
        vm: &VirtualMachineRef,
        datastore: &DatastoreRef,
        options: &DiskOptions,
        mut on_progress: F,
    ) -> Result<Provisioned, Error>
    where
        F: FnMut(Stage, u8),
    {
        options.validate()?;

        let (controller, inventory) =
            self.resolve_controller(vm, options.controller, |p| on_progress(Stage::Controller, p))?;

        let unit_number = next_unit_number(&controller, &inventory);
        debug!("Placing disk at {}:{} on {vm}", controller.key, unit_number);

        let change = build_disk_change(
            self.keys.next_key(),
            options.capacity_kb,
            options.mode,
            options.split,
            datastore,
            &controller,
            unit_number,
        )?;
        trace!("Disk change: {change:?}");

        if options.run_async {
            let task = self.tracker.submit_and_forget(vm, &[change])?;
            return Ok(Provisioned::Submitted(task));
        }

        let task = self.tracker.submit(vm, &[change])?;
        self.tracker
            .await_completion(&task, Stage::Disk, |p| on_progress(Stage::Disk, p))?;

        let inventory = self.session.device_inventory(vm)?;
        let disk = devices::disks(&inventory)
            .find(|d| d.is_at(controller.key, unit_number))
            .cloned()
            .ok_or_else(|| {
                Error::failed(
                    Stage::Verify,
                    format!("no disk at {}:{unit_number} on {vm} after task {task}", controller.key),
                )
            })?;

        info!("Created {disk}");
        Ok(Provisioned::Created(disk))
    }
}

#[cfg(test)]
mod tests {
    use devices::{Backing, FileOperation};
    use remote::{
        mock::{Call, MockSession},
        TaskState,
    };

    use super::*;
    use test_log::test;

    const GIB_20: u64 = 20 * 1024 * 1024;

    fn datastore() -> DatastoreRef {
        DatastoreRef::new("ds0", "datastore-11")
    }

    fn setup(inventory: Vec<Device>) -> (VirtualMachineRef, MockSession) {
        let vm = VirtualMachineRef::new("vm-42");
        let mock = MockSession::new().with_machine(&vm, inventory).with_datastore(datastore());
        (vm, mock)
    }

    fn existing_disk(key: i32, controller_key: i32, unit_number: u32) -> Device {
        Device::Disk(Disk {
            key,
            controller_key,
            unit_number,
            capacity_kb: 8 * 1024 * 1024,
            backing: Backing {
                disk_mode: DiskMode::Persistent,
                split: false,
                eagerly_scrub: false,
                thin_provisioned: true,
                write_through: false,
                file_name: "[ds0] vm-42/vm-42.vmdk".into(),
                datastore: None,
            },
            label: Some("Hard disk 1".into()),
        })
    }

    fn expect_disk(outcome: Provisioned) -> Disk {
        match outcome {
            Provisioned::Created(disk) => disk,
            Provisioned::Submitted(task) => panic!("expected a disk, got task {task}"),
        }
    }

    #[test]
    fn test_small_capacity_makes_no_calls() {
        let (vm, mock) = setup(vec![]);
        let provisioner = Provisioner::new(&mock).with_poll_interval(Duration::ZERO);

        for capacity_kb in [0, 512, 1023] {
            let result = provisioner.create_eager_zero_disk(&vm, &datastore(), &DiskOptions::new(capacity_kb), |_, _| {});
            assert!(matches!(result, Err(Error::InvalidArgument(_))));
        }
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_ide_request_makes_no_calls() {
        let (vm, mock) = setup(vec![]);
        let provisioner = Provisioner::new(&mock);
        let options = DiskOptions {
            controller: Some(ControllerKind::Ide),
            ..DiskOptions::new(GIB_20)
        };

        let result = provisioner.create_eager_zero_disk(&vm, &datastore(), &options, |_, _| {});
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_validate() {
        assert!(DiskOptions::new(1024).validate().is_ok());
        assert!(matches!(DiskOptions::new(1023).validate(), Err(Error::InvalidArgument(_))));
        let sata = DiskOptions {
            controller: Some(ControllerKind::Sata),
            ..DiskOptions::new(GIB_20)
        };
        assert!(matches!(sata.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_end_to_end_without_controller() {
        let (vm, mock) = setup(vec![]);
        let provisioner = Provisioner::new(&mock).with_poll_interval(Duration::ZERO);

        let mut progress = vec![];
        let outcome = provisioner
            .create_eager_zero_disk(&vm, &datastore(), &DiskOptions::new(GIB_20), |stage, p| {
                progress.push((stage, p))
            })
            .unwrap();

        let submissions = mock.submissions();
        assert_eq!(submissions.len(), 2);

        // Controller first, on its own
        assert_eq!(submissions[0].len(), 1);
        let Device::Controller(controller) = &submissions[0][0].device else {
            panic!("expected a controller change");
        };
        assert_eq!(controller.kind, ControllerKind::Scsi);
        assert!(controller.key < 0);

        // Then the disk
        assert_eq!(submissions[1].len(), 1);
        assert_eq!(submissions[1][0].file_operation, Some(FileOperation::Create));
        let Device::Disk(requested) = &submissions[1][0].device else {
            panic!("expected a disk change");
        };
        assert!(requested.key < 0);
        assert_ne!(requested.key, controller.key);
        assert_eq!(requested.unit_number, 0);
        assert_eq!(requested.capacity_kb, 20_971_520);
        assert!(requested.backing.eagerly_scrub);
        assert_eq!(requested.backing.disk_mode, DiskMode::Persistent);
        assert!(!requested.backing.split);
        assert_eq!(requested.backing.file_name, "[ds0]");

        let disk = expect_disk(outcome);
        assert!(disk.key > 0);
        assert_eq!(disk.unit_number, 0);
        assert_eq!(disk.capacity_kb, 20_971_520);
        assert!(disk.backing.eagerly_scrub);
        assert_eq!(disk.backing.disk_mode, DiskMode::Persistent);
        assert_eq!(disk.backing.file_name, "[ds0] vm-42/vm-42.vmdk");

        // Controller progress all arrives before disk progress
        let first_disk = progress.iter().position(|(s, _)| *s == Stage::Disk).unwrap();
        assert!(progress[..first_disk].iter().all(|(s, _)| *s == Stage::Controller));
        assert_eq!(progress.last(), Some(&(Stage::Disk, 100)));
    }

    #[test]
    fn test_existing_controller_is_reused() {
        let inventory = vec![
            Device::Controller(Controller {
                key: 1000,
                bus_number: 0,
                kind: ControllerKind::LsiLogic,
                devices: vec![2000, 2001],
            }),
            existing_disk(2000, 1000, 1),
            existing_disk(2001, 1000, 2),
        ];
        let (vm, mock) = setup(inventory);
        let provisioner = Provisioner::new(&mock).with_poll_interval(Duration::ZERO);
        let options = DiskOptions {
            controller: Some(ControllerKind::ParaVirtual),
            mode: DiskMode::IndependentPersistent,
            ..DiskOptions::new(4096)
        };

        let disk = expect_disk(
            provisioner
                .create_eager_zero_disk(&vm, &datastore(), &options, |_, _| {})
                .unwrap(),
        );

        let submissions = mock.submissions();
        assert_eq!(submissions.len(), 1);
        assert!(matches!(submissions[0][0].device, Device::Disk(_)));

        assert_eq!(disk.controller_key, 1000);
        assert_eq!(disk.unit_number, 0);
        assert_eq!(disk.backing.disk_mode, DiskMode::IndependentPersistent);
        assert!(disk.backing.eagerly_scrub);
        assert_eq!(disk.backing.file_name, "[ds0] vm-42/vm-42_2.vmdk");
    }

    #[test]
    fn test_resolver_never_creates_second_controller() {
        let inventory = vec![Device::Controller(Controller::placeholder(1000, 0, ControllerKind::BusLogic))];
        let (vm, mock) = setup(inventory);
        let provisioner = Provisioner::new(&mock);

        for kind in [None, Some(ControllerKind::Scsi), Some(ControllerKind::LsiLogicSas)] {
            let controller = provisioner.resolve_or_create_controller(&vm, kind, |_| {}).unwrap();
            assert_eq!(controller.key, 1000);
        }
        assert!(mock.submissions().is_empty());
    }

    #[test]
    fn test_requested_kind_used_when_creating() {
        let (vm, mock) = setup(vec![]);
        let provisioner = Provisioner::new(&mock).with_poll_interval(Duration::ZERO);

        let controller = provisioner
            .resolve_or_create_controller(&vm, Some(ControllerKind::ParaVirtual), |_| {})
            .unwrap();
        assert_eq!(controller.kind, ControllerKind::ParaVirtual);
        assert!(controller.key > 0);
        assert_eq!(mock.submissions().len(), 1);
    }

    #[test]
    fn test_controller_failure() {
        let (vm, mock) = setup(vec![]);
        mock.fail_next_task("controller limit reached");
        let provisioner = Provisioner::new(&mock).with_poll_interval(Duration::ZERO);

        let err = provisioner
            .create_eager_zero_disk(&vm, &datastore(), &DiskOptions::new(GIB_20), |_, _| {})
            .unwrap_err();
        match err {
            Error::ProvisioningFailed { stage, message } => {
                assert_eq!(stage, Stage::Controller);
                assert_eq!(message, "controller limit reached");
            }
            e => panic!("unexpected error: {e:?}"),
        }
        // The disk was never submitted
        assert_eq!(mock.submissions().len(), 1);
    }

    #[test]
    fn test_disk_failure_is_not_silent() {
        let inventory = vec![Device::Controller(Controller::placeholder(1000, 0, ControllerKind::Scsi))];
        let (vm, mock) = setup(inventory);
        mock.fail_next_task("X");
        let provisioner = Provisioner::new(&mock).with_poll_interval(Duration::ZERO);

        let err = provisioner
            .create_eager_zero_disk(&vm, &datastore(), &DiskOptions::new(GIB_20), |_, _| {})
            .unwrap_err();
        match err {
            Error::ProvisioningFailed { stage, message } => {
                assert_eq!(stage, Stage::Disk);
                assert_eq!(message, "X");
            }
            e => panic!("unexpected error: {e:?}"),
        }
        assert!(devices::disks(&mock.devices(&vm)).next().is_none());
    }

    #[test]
    fn test_async_returns_live_task() {
        let (vm, mock) = setup(vec![]);
        let provisioner = Provisioner::new(&mock).with_poll_interval(Duration::ZERO);
        let options = DiskOptions {
            run_async: true,
            ..DiskOptions::new(GIB_20)
        };

        let outcome = provisioner
            .create_eager_zero_disk(&vm, &datastore(), &options, |_, _| {})
            .unwrap();
        let Provisioned::Submitted(task) = outcome else {
            panic!("expected a submitted task");
        };

        // The controller still completed before the disk went in
        assert!(find_storage_controller(&mock.devices(&vm)).is_some());
        assert_eq!(mock.submissions().len(), 2);
        assert_eq!(mock.refresh_count(&task), 0);

        let calls = mock.calls();
        assert!(matches!(calls.last(), Some(Call::Submit(_, _))));

        // Sampled right away the task is still in flight
        assert_eq!(mock.refresh_status(&task).unwrap().state, TaskState::Queued);
    }

    #[test]
    fn test_transport_failure() {
        let (vm, mock) = setup(vec![]);
        mock.set_offline(true);
        let provisioner = Provisioner::new(&mock);

        let err = provisioner
            .create_eager_zero_disk(&vm, &datastore(), &DiskOptions::new(GIB_20), |_, _| {})
            .unwrap_err();
        assert!(matches!(err, Error::RemoteUnavailable(_)));
        assert_eq!(mock.calls().len(), 1);
    }
}
