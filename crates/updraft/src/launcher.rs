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

//! Installer launch strategies
//!
//! The strategy is resolved once from the artifact's extension into a
//! tagged [`InstallerKind`]; plan construction is pure so every strategy is
//! testable without spawning anything.

use crate::error::{Result, UpdateError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Token in installer args replaced with the running application's
/// directory.
const PATH_TOKEN: &str = "%path%";

/// How long to watch a just-spawned elevation front-end for an immediate
/// "user dismissed the prompt" exit.
const ELEVATION_PROBE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerKind {
    /// Directly runnable installer; launched with the manifest's args.
    Executable,
    /// Archive unpacked over the application directory by the extractor
    /// helper.
    Archive,
    /// Platform package handed to the system package installer front-end.
    PlatformPackage,
}

impl InstallerKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        match ext.as_deref() {
            Some("zip") => Self::Archive,
            Some("msi") => Self::PlatformPackage,
            _ => Self::Executable,
        }
    }
}

/// Identity of the running process, captured once so plan construction
/// stays pure.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub app_exe: PathBuf,
    pub app_args: Vec<String>,
}

impl LaunchContext {
    pub fn current() -> Result<Self> {
        let app_exe = std::env::current_exe()
            .map_err(|e| UpdateError::Launch(format!("cannot resolve current executable: {e}")))?;
        let app_args = std::env::args().skip(1).collect();
        Ok(Self { app_exe, app_args })
    }
}

/// Fully resolved launch command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub kind: InstallerKind,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub elevate: bool,
}

/// Build the launch command for a downloaded artifact.
///
/// `installer_args` is whitespace-split into argv entries; the `%path%`
/// token inside any entry expands to the running application's directory.
pub fn build_plan(
    artifact: &Path,
    installer_args: &str,
    unattended: bool,
    elevate: bool,
    package_installer: &str,
    extractor: &Path,
    context: &LaunchContext,
) -> LaunchPlan {
    let kind = InstallerKind::from_path(artifact);
    let app_dir = context
        .app_exe
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_string_lossy()
        .into_owned();

    let (program, args) = match kind {
        InstallerKind::Executable => {
            let args = installer_args
                .split_whitespace()
                .map(|arg| arg.replace(PATH_TOKEN, &app_dir))
                .collect();
            (artifact.to_path_buf(), args)
        }
        InstallerKind::Archive => {
            let mut args = vec![
                artifact.to_string_lossy().into_owned(),
                context.app_exe.to_string_lossy().into_owned(),
            ];
            args.extend(context.app_args.iter().cloned());
            (extractor.to_path_buf(), args)
        }
        InstallerKind::PlatformPackage => {
            let mut args = vec!["/i".to_owned()];
            if unattended {
                args.push("/passive".to_owned());
            }
            args.push(artifact.to_string_lossy().into_owned());
            (PathBuf::from(package_installer), args)
        }
    };

    LaunchPlan {
        kind,
        program,
        args,
        elevate,
    }
}

/// Default extractor location: `updraft-extractor` next to the running
/// executable.
pub fn default_extractor_path(context: &LaunchContext) -> PathBuf {
    let name = if cfg!(windows) {
        "updraft-extractor.exe"
    } else {
        "updraft-extractor"
    };
    context
        .app_exe
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Launched,
    /// The user declined the elevation prompt. Benign abort, not a
    /// failure.
    ElevationDeclined,
}

#[async_trait]
pub trait UpdateLauncher: Send + Sync {
    async fn launch(&self, plan: &LaunchPlan) -> Result<LaunchOutcome>;
}

/// Spawns the installer as a detached process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

#[async_trait]
impl UpdateLauncher for ProcessLauncher {
    async fn launch(&self, plan: &LaunchPlan) -> Result<LaunchOutcome> {
        #[cfg(unix)]
        if plan.kind == InstallerKind::Executable {
            make_executable(&plan.program)?;
        }

        let mut command = effective_command(plan);
        tracing::info!("launching installer: {:?}", command);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if is_elevation_declined_error(&e) => {
                tracing::info!("elevation prompt declined by user");
                return Ok(LaunchOutcome::ElevationDeclined);
            }
            Err(e) => {
                return Err(UpdateError::Launch(format!(
                    "failed to spawn {}: {e}",
                    plan.program.display()
                )));
            }
        };

        // An elevation front-end that the user dismisses exits almost
        // immediately with a distinctive code; watch for that briefly
        // before declaring the launch done.
        if plan.elevate && cfg!(unix) {
            let probe_until = std::time::Instant::now() + ELEVATION_PROBE;
            while std::time::Instant::now() < probe_until {
                match child.try_wait() {
                    Ok(Some(status)) if status.code() == Some(126) => {
                        tracing::info!("elevation prompt declined by user");
                        return Ok(LaunchOutcome::ElevationDeclined);
                    }
                    Ok(Some(status)) if !status.success() => {
                        return Err(UpdateError::Launch(format!(
                            "installer exited immediately with {status}"
                        )));
                    }
                    Ok(Some(_)) => return Ok(LaunchOutcome::Launched),
                    Ok(None) => tokio::time::sleep(Duration::from_millis(100)).await,
                    Err(e) => {
                        return Err(UpdateError::Launch(format!(
                            "error waiting for installer: {e}"
                        )));
                    }
                }
            }
        }

        Ok(LaunchOutcome::Launched)
    }
}

fn effective_command(plan: &LaunchPlan) -> std::process::Command {
    if plan.elevate && cfg!(unix) {
        let mut command = std::process::Command::new("pkexec");
        command.arg(&plan.program).args(&plan.args);
        command
    } else {
        let mut command = std::process::Command::new(&plan.program);
        command.args(&plan.args);
        command
    }
}

/// Windows reports a dismissed elevation prompt as OS error 1223
/// (ERROR_CANCELLED) from the spawn itself.
fn is_elevation_declined_error(e: &std::io::Error) -> bool {
    cfg!(windows) && e.raw_os_error() == Some(1223)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}
