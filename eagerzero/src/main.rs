// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{path::PathBuf, time::Duration};

use clap::{ArgAction, Args, Parser, Subcommand};
use devices::{ControllerKind, Disk, DiskMode, VirtualMachineRef};
use log::{debug, info};
use miette::miette;
use provisioning::{Config, DiskOptions, Provisioned, Provisioner, ServerConfig, Stage, DEFAULT_POLL_INTERVAL};
use remote::{http, Session};

/// Provision eagerly scrubbed virtual disks on remotely managed virtual machines
#[derive(Debug, Parser)]
#[command(name = "eagerzero", version)]
struct Cli {
    /// host:port of the management service
    #[arg(long, env = "EAGERZERO_SERVER", global = true)]
    server: Option<String>,

    /// Delay between task status refreshes, in milliseconds
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    /// Timeout for each request to the management service, in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// KDL file with a `server` node to read connection settings from
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Add one eagerly scrubbed disk to a virtual machine
    Create(CreateArgs),
    /// Provision every disk declared in a KDL request file
    Apply(ApplyArgs),
}

#[derive(Debug, Args)]
struct CreateArgs {
    /// Identifier of the virtual machine
    #[arg(long)]
    vm: String,

    /// Name of the datastore for the backing file
    #[arg(long)]
    datastore: String,

    /// Disk capacity in KB, at least 1024
    #[arg(long)]
    capacity_kb: u64,

    /// Controller kind to add if the machine has no storage controller
    #[arg(long)]
    controller: Option<ControllerKind>,

    /// Persistence mode of the disk
    #[arg(long, default_value_t = DiskMode::Persistent)]
    mode: DiskMode,

    /// Split the backing file into extents
    #[arg(long)]
    split: bool,

    /// Return once the disk task is submitted instead of waiting on it
    #[arg(long = "async")]
    run_async: bool,
}

#[derive(Debug, Args)]
struct ApplyArgs {
    /// Request file with `disk` nodes
    file: PathBuf,
}

/// Logs each distinct progress value once
#[derive(Default)]
struct ProgressLog {
    last: Option<(Stage, u8)>,
}

impl ProgressLog {
    fn report(&mut self, stage: Stage, progress: u8) {
        if self.last != Some((stage, progress)) {
            info!("{stage}: {progress}%");
            self.last = Some((stage, progress));
        }
    }
}

impl Cli {
    /// Merge command line flags over a `server` node, flags win
    fn server_settings(&self, file: Option<ServerConfig>) -> miette::Result<ServerConfig> {
        let address = self
            .server
            .clone()
            .or_else(|| file.as_ref().map(|s| s.address.clone()))
            .ok_or_else(|| miette!(help = "pass --server, set EAGERZERO_SERVER or add a server node", "no management service address"))?;

        Ok(ServerConfig {
            address,
            poll_interval: self
                .poll_interval_ms
                .map(Duration::from_millis)
                .or(file.as_ref().and_then(|s| s.poll_interval)),
            timeout: self
                .timeout_ms
                .map(Duration::from_millis)
                .or(file.as_ref().and_then(|s| s.timeout)),
        })
    }
}

fn print_disk(disk: &Disk) {
    println!("Created {disk}");
    println!("  capacity:      {} KB", disk.capacity_kb);
    println!("  persistence:   {}", disk.backing.disk_mode);
    println!("  eagerly scrub: {}", disk.backing.eagerly_scrub);
    println!("  file name:     {}", disk.backing.file_name);
}

/// Look up the datastore and run one provisioning workflow
fn provision<S: Session>(
    provisioner: &Provisioner<'_, S>,
    session: &S,
    vm: &VirtualMachineRef,
    datastore: &str,
    options: &DiskOptions,
) -> miette::Result<()> {
    options.validate()?;
    let datastore = session
        .lookup_datastore(datastore)
        .map_err(provisioning::Error::from)?;
    debug!("Resolved datastore {} to {}", datastore.name, datastore.handle);

    let mut progress = ProgressLog::default();
    match provisioner.create_eager_zero_disk(vm, &datastore, options, |stage, p| progress.report(stage, p))? {
        Provisioned::Created(disk) => print_disk(&disk),
        Provisioned::Submitted(task) => println!("Submitted task {task}"),
    }
    Ok(())
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    pretty_env_logger::formatted_timed_builder()
        .filter_level(level)
        .parse_default_env()
        .init();

    let file_server = match &cli.config {
        Some(path) => Config::new_for_path(path)?.server,
        None => None,
    };

    let requests = match &cli.command {
        Command::Create(args) => {
            let options = DiskOptions {
                capacity_kb: args.capacity_kb,
                controller: args.controller,
                mode: args.mode,
                split: args.split,
                run_async: args.run_async,
            };
            vec![(VirtualMachineRef::new(&args.vm), args.datastore.clone(), options)]
        }
        Command::Apply(args) => {
            let config = Config::new_for_path(&args.file)?;
            if config.disks.is_empty() {
                return Err(miette!("{} declares no disk nodes", args.file.display()));
            }
            config
                .disks
                .into_iter()
                .map(|d| (d.vm, d.datastore, d.options))
                .collect()
        }
    };

    let settings = cli.server_settings(file_server)?;
    info!("Using management service at {}", settings.address);

    let client = http::Client::new(&settings.address, settings.timeout.unwrap_or(http::DEFAULT_TIMEOUT))
        .map_err(provisioning::Error::from)?;
    let provisioner =
        Provisioner::new(&client).with_poll_interval(settings.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL));

    for (vm, datastore, options) in &requests {
        info!("Provisioning {} KB disk on {vm}", options.capacity_kb);
        provision(&provisioner, &client, vm, datastore, options)?;
    }

    Ok(())
}
