// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Updraft.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Updraft Extractor - Archive update helper
//!
//! Runs as a separate process after the host application shuts down:
//! waits for every instance of the target executable to exit, unpacks the
//! update archive over the application directory, and relaunches the
//! target with its original arguments.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use sysinfo::{ProcessesToUpdate, System};
use tracing::{info, warn};

/// Upper bound on waiting for the target application to exit before
/// attempting extraction anyway.
const EXIT_WAIT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "updraft-extractor", about = "Unpacks an update archive over an application")]
struct Args {
    /// Update archive to unpack.
    archive: PathBuf,
    /// Executable whose directory receives the archive contents; it is
    /// relaunched afterwards.
    target: PathBuf,
    /// Arguments passed to the relaunched target.
    #[arg(trailing_var_arg = true)]
    target_args: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("updraft_extractor=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!(
        "updating {} from {}",
        args.target.display(),
        args.archive.display()
    );

    wait_for_target_exit(&args.target);

    let target_dir = args
        .target
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .context("target executable has no parent directory")?;
    extract_over(&args.archive, target_dir)?;
    info!("archive unpacked into {}", target_dir.display());

    std::process::Command::new(&args.target)
        .args(&args.target_args)
        .spawn()
        .with_context(|| format!("failed to relaunch {}", args.target.display()))?;
    info!("relaunched {}", args.target.display());
    Ok(())
}

/// Block until no process is running the target image, within bounds. A
/// lingering process only produces a warning; extraction will then fail
/// on its own if files are still locked.
fn wait_for_target_exit(target: &Path) {
    let mut system = System::new_all();
    let deadline = Instant::now() + EXIT_WAIT;
    loop {
        let running = system
            .processes()
            .values()
            .any(|process| process.exe() == Some(target));
        if !running {
            return;
        }
        if Instant::now() >= deadline {
            warn!("target still running after {EXIT_WAIT:?}, extracting anyway");
            return;
        }
        std::thread::sleep(POLL_INTERVAL);
        system.refresh_processes(ProcessesToUpdate::All, true);
    }
}

/// Unpack `archive` into `dir`, overwriting existing files.
fn extract_over(archive: &Path, dir: &Path) -> Result<()> {
    let file =
        File::open(archive).with_context(|| format!("cannot open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file)
        .with_context(|| format!("{} is not a valid archive", archive.display()))?;
    if zip.is_empty() {
        bail!("{} contains no entries", archive.display());
    }
    zip.extract(dir)
        .with_context(|| format!("failed to unpack into {}", dir.display()))?;
    Ok(())
}
