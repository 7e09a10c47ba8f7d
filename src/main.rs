//! Device Driver Manager
//!
//! Finds graphics cards, Broadcom wireless chips and PAE capable kernels,
//! shows which proprietary driver is currently active, and runs the installer
//! scripts needed to switch:
//! - Does NOT install drivers itself (delegates to install-* scripts)
//! - Does NOT keep state between runs (every scan is a fresh snapshot)

mod config;
mod hardware;
mod installer;
mod plan;
mod runner;
mod selection;

use crate::config::Config;
use crate::hardware::{HardwareCatalog, ScanReport};
use crate::installer::{HttpConnectivity, InstallError, InstallStatus};
use crate::runner::ShellRunner;
use crate::selection::{Selection, SelectionError};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use sysinfo::System;

/// Device Driver Manager - proprietary drivers for your hardware
#[derive(Parser)]
#[command(name = "ddm")]
#[command(version)]
#[command(about = "Install proprietary drivers for graphics, wireless and PAE kernels")]
struct Cli {
    /// Show debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the hardware and list available drivers (default)
    Scan {
        /// Print the scan as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Select or deselect drivers by row number and run the installers
    Apply {
        /// Row to install the driver for (repeatable)
        #[arg(long = "enable", value_name = "ROW")]
        enable: Vec<usize>,

        /// Row to remove the driver for (repeatable)
        #[arg(long = "disable", value_name = "ROW")]
        disable: Vec<usize>,

        /// Show the planned commands without running them
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Show configuration path and effective settings
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load()?;

    match cli.command.unwrap_or(Commands::Scan { json: false }) {
        Commands::Scan { json } => run_scan(&config, json)?,
        Commands::Apply {
            enable,
            disable,
            dry_run,
        } => run_apply(&config, &enable, &disable, dry_run)?,
        Commands::Config => show_config(&config)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .ok();
}

fn scan(config: &Config) -> ScanReport {
    HardwareCatalog::new(&ShellRunner, config).scan()
}

fn run_scan(config: &Config, json: bool) -> Result<()> {
    let report = scan(config);

    if json {
        let out = serde_json::to_string_pretty(&report).context("Failed to serialize scan")?;
        println!("{out}");
        return Ok(());
    }

    print_report(&report);
    Ok(())
}

fn print_report(report: &ScanReport) {
    let os = System::name().unwrap_or_else(|| "Unknown".to_string());
    let os_line = match (System::os_version(), System::kernel_version()) {
        (Some(version), Some(kernel)) => format!("{os} {version} (kernel {kernel})"),
        (Some(version), None) => format!("{os} {version}"),
        (None, Some(kernel)) => format!("{os} (kernel {kernel})"),
        (None, None) => os,
    };
    println!("{} {}", "System:".bright_cyan(), os_line);
    println!("{}", report.display());

    if !report.not_supported.is_empty() {
        println!();
        println!(
            "{}",
            "There are no available drivers for your hardware:".bright_yellow()
        );
        for description in &report.not_supported {
            println!("  - {description}");
        }
    } else if !report.has_supported_hardware() {
        println!();
        println!("{}", "DDM did not find any supported hardware.".bright_white());
    }
}

fn run_apply(config: &Config, enable: &[usize], disable: &[usize], dry_run: bool) -> Result<()> {
    let report = scan(config);
    print_report(&report);

    if !report.has_supported_hardware() {
        return Ok(());
    }

    let mut selection = Selection::from_scan(&report);
    let toggles = enable
        .iter()
        .map(|row| (*row, true))
        .chain(disable.iter().map(|row| (*row, false)));
    for (row, selected) in toggles {
        match selection.set_selected(row, selected) {
            Ok(()) => {}
            Err(err @ SelectionError::BootedKernel) => {
                println!("{} {}", "Remove kernel:".bright_yellow(), err.to_string().bright_yellow());
            }
            Err(err @ SelectionError::UnknownRow(_)) => return Err(err.into()),
        }
    }

    let action_plan = plan::plan(&report.entries, selection.entries());
    if action_plan.is_noop() {
        println!("{}", "Nothing to change.".bright_white());
        return Ok(());
    }

    println!();
    for (item, entry) in action_plan.items.iter().zip(report.devices()) {
        if item.operation != plan::Operation::NoChange {
            println!("  {:<10} {}", item.operation.to_string().bright_cyan(), entry.label);
        }
    }

    let Some(command) = action_plan.composite_command() else {
        println!("{}", "No installer available for the selected changes.".bright_white());
        return Ok(());
    };

    if dry_run {
        println!("{} {}", "Command to execute:".bright_cyan(), command);
        return Ok(());
    }

    let connectivity = HttpConnectivity::new(&config.network)?;
    let rt = tokio::runtime::Runtime::new()?;
    println!("{}", "Running installer, this may take a while...".bright_white());

    let outcome = match rt.block_on(installer::execute(&action_plan, &connectivity)) {
        Ok(outcome) => outcome,
        Err(err @ InstallError::NoInternetConnection) => {
            println!("{}", err.to_string().bright_yellow());
            anyhow::bail!("install aborted: no internet connection");
        }
        Err(err) => return Err(err.into()),
    };

    let Some(install) = outcome else {
        return Ok(());
    };

    match install.status {
        InstallStatus::Failed => {
            if !install.output.is_empty() {
                println!("{}", install.output);
            }
            println!(
                "{}",
                "There was an error during the installation.\nPlease, run 'sudo apt-get -f install' in a terminal."
                    .bright_red()
            );
            anyhow::bail!(
                "installer '{}' exited with {:?}",
                install.command,
                install.exit_code
            );
        }
        InstallStatus::Succeeded => {
            println!("{}", "The software has been successfully installed.".bright_green());
        }
        InstallStatus::Ignored => {}
    }

    println!("{}", "You will need to restart your system.".bright_green());
    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    let path = Config::config_path()?;
    println!("{} {}", "Config file:".bright_cyan(), path.display());
    if !path.exists() {
        println!("{}", "(not present, using defaults)".bright_white());
    }
    println!();
    println!("{}", config.to_toml()?);
    Ok(())
}
