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

//! Application shutdown after an installer launch
//!
//! Once the installer is running the application has to get out of its
//! way. The host can take over entirely via an exit hook; otherwise every
//! other process running the same executable image is asked to terminate,
//! given a bounded grace period, force-killed if it lingers, and finally
//! the current process exits.

use crate::settings::ExitHook;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};

/// Upper bound on waiting for sibling processes to terminate gracefully.
const GRACEFUL_WAIT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(500);

type ExitFn = Arc<dyn Fn() + Send + Sync>;

pub struct ExitCoordinator {
    hook: Option<ExitHook>,
    sweep_fn: ExitFn,
    exit_fn: ExitFn,
}

impl std::fmt::Debug for ExitCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitCoordinator")
            .field("hook", &self.hook.is_some())
            .finish_non_exhaustive()
    }
}

impl ExitCoordinator {
    pub fn new(hook: Option<ExitHook>) -> Self {
        Self {
            hook,
            sweep_fn: Arc::new(close_sibling_instances),
            exit_fn: Arc::new(|| std::process::exit(0)),
        }
    }

    /// Replaces the sibling-instance sweep. Tests use this so a run never
    /// signals real processes.
    pub fn with_sweep_fn(mut self, sweep_fn: ExitFn) -> Self {
        self.sweep_fn = sweep_fn;
        self
    }

    /// Replaces the final process exit. Tests use this to observe the
    /// coordinator without dying.
    pub fn with_exit_fn(mut self, exit_fn: ExitFn) -> Self {
        self.exit_fn = exit_fn;
        self
    }

    /// Runs the shutdown sequence. Returns only when the hook reported
    /// that it handled the exit itself.
    pub fn run(&self) {
        if let Some(hook) = &self.hook {
            tracing::info!("invoking application exit hook");
            if hook() {
                tracing::debug!("exit hook handled shutdown");
                return;
            }
        }
        (self.sweep_fn)();
        tracing::info!("exiting for installer");
        (self.exit_fn)();
    }
}

/// Other processes running the same executable image. Thread entries are
/// excluded; on Linux the process table lists every thread of the current
/// process with the same image path, and those must never be signalled.
fn sibling_pids(system: &System, current_pid: Pid, current_exe: &Path) -> Vec<Pid> {
    system
        .processes()
        .iter()
        .filter(|(pid, process)| {
            **pid != current_pid
                && process.thread_kind().is_none()
                && process.exe() == Some(current_exe)
        })
        .map(|(pid, _)| *pid)
        .collect()
}

/// Terminates every other process running the same executable image as
/// the current process.
fn close_sibling_instances() {
    let Ok(current_exe) = std::env::current_exe() else {
        tracing::warn!("cannot resolve current executable, skipping sibling shutdown");
        return;
    };
    let Ok(current_pid) = sysinfo::get_current_pid() else {
        tracing::warn!("cannot resolve current pid, skipping sibling shutdown");
        return;
    };

    let mut system = System::new_all();
    let siblings = sibling_pids(&system, current_pid, &current_exe);
    if siblings.is_empty() {
        return;
    }
    tracing::info!("asking {} sibling instance(s) to terminate", siblings.len());

    for pid in &siblings {
        if let Some(process) = system.process(*pid)
            && process.kill_with(Signal::Term).is_none()
        {
            // Platform without signal support, go straight to kill.
            process.kill();
        }
    }

    let deadline = Instant::now() + GRACEFUL_WAIT;
    let mut remaining = siblings;
    while !remaining.is_empty() && Instant::now() < deadline {
        std::thread::sleep(POLL_INTERVAL);
        system.refresh_processes(ProcessesToUpdate::Some(&remaining), true);
        remaining.retain(|pid| system.process(*pid).is_some());
    }

    for pid in &remaining {
        if let Some(process) = system.process(*pid) {
            tracing::warn!("force killing lingering instance {pid}");
            process.kill();
        }
    }
}
