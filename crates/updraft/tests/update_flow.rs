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

//! End-to-end update flow tests
//!
//! These run the full pipeline against a local HTTP server: feed
//! retrieval, parsing, decision, artifact download, checksum
//! verification, and launch dispatch, with only the process spawn and
//! the final exit replaced by recording stubs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use updraft::engine::CheckOutcome;
use updraft::error::{Result, UpdateError};
use updraft::exit::ExitCoordinator;
use updraft::launcher::{InstallerKind, LaunchOutcome, LaunchPlan, UpdateLauncher};
use updraft::store::MemoryStore;
use updraft::{UpdateSettings, Updater};

// sha256 of the literal installer body served below.
const INSTALLER_BODY: &str = "installer-bytes";
const INSTALLER_SHA256: &str = "204676736cea68d6411da9d3aa3fab0a5e70b023ba30cd560cfa9c8e7250f4df";

#[derive(Default)]
struct RecordingLauncher {
    plans: Mutex<Vec<LaunchPlan>>,
}

#[async_trait]
impl UpdateLauncher for RecordingLauncher {
    async fn launch(&self, plan: &LaunchPlan) -> Result<LaunchOutcome> {
        self.plans.lock().push(plan.clone());
        Ok(LaunchOutcome::Launched)
    }
}

fn feed_xml(server_url: &str, checksum: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<item>
    <version>2.0.0.0</version>
    <url>{server_url}/setup.msi</url>
    <checksum algorithm="SHA256">{checksum}</checksum>
</item>"#
    )
}

struct Harness {
    updater: Updater,
    launcher: Arc<RecordingLauncher>,
    exits: Arc<AtomicUsize>,
    download_dir: tempfile::TempDir,
}

fn harness(server_url: &str, installed: &str, unattended: bool) -> Harness {
    let download_dir = tempfile::tempdir().unwrap();
    let mut settings = UpdateSettings::new(format!("{server_url}/feed.xml"))
        .with_app_title("Widget")
        .with_installed_version(installed.parse().unwrap())
        .with_download_dir(download_dir.path());
    if unattended {
        settings = settings.unattended();
    }

    let launcher = Arc::new(RecordingLauncher::default());
    let exits = Arc::new(AtomicUsize::new(0));
    let exits_seen = Arc::clone(&exits);
    let updater = Updater::builder(settings)
        .with_store(Arc::new(MemoryStore::new()))
        .with_launcher(launcher.clone())
        .with_exit_coordinator(
            ExitCoordinator::new(None)
                .with_sweep_fn(Arc::new(|| {}))
                .with_exit_fn(Arc::new(move || {
                    exits_seen.fetch_add(1, Ordering::SeqCst);
                })),
        )
        .build()
        .unwrap();

    Harness {
        updater,
        launcher,
        exits,
        download_dir,
    }
}

#[tokio::test]
async fn test_unattended_update_downloads_verifies_and_launches() {
    let mut server = mockito::Server::new_async().await;
    let feed = server
        .mock("GET", "/feed.xml")
        .with_body(feed_xml(&server.url(), INSTALLER_SHA256))
        .create_async()
        .await;
    let artifact = server
        .mock("GET", "/setup.msi")
        .with_body(INSTALLER_BODY)
        .create_async()
        .await;

    let h = harness(&server.url(), "1.0.0.0", true);
    let outcome = h.updater.check().await;

    assert!(matches!(outcome, CheckOutcome::Launched), "{outcome:?}");
    feed.assert_async().await;
    artifact.assert_async().await;
    assert_eq!(h.exits.load(Ordering::SeqCst), 1);

    let plans = h.launcher.plans.lock();
    assert_eq!(plans.len(), 1);
    let plan = &plans[0];
    assert_eq!(plan.kind, InstallerKind::PlatformPackage);
    assert_eq!(plan.program.to_string_lossy(), "msiexec");
    assert!(plan.args.contains(&"/passive".to_owned()));

    let downloaded = h.download_dir.path().join("setup.msi");
    assert_eq!(std::fs::read_to_string(&downloaded).unwrap(), INSTALLER_BODY);
}

#[tokio::test]
async fn test_checksum_mismatch_aborts_before_launch() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/feed.xml")
        .with_body(feed_xml(&server.url(), &"0".repeat(64)))
        .create_async()
        .await;
    server
        .mock("GET", "/setup.msi")
        .with_body(INSTALLER_BODY)
        .create_async()
        .await;

    let h = harness(&server.url(), "1.0.0.0", true);
    let outcome = h.updater.check().await;

    assert!(matches!(
        outcome,
        CheckOutcome::Failed(UpdateError::ChecksumMismatch { .. })
    ));
    assert!(h.launcher.plans.lock().is_empty());
    assert_eq!(h.exits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stale_feed_downloads_nothing() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/feed.xml")
        .with_body(feed_xml(&server.url(), INSTALLER_SHA256))
        .create_async()
        .await;
    let artifact = server
        .mock("GET", "/setup.msi")
        .expect(0)
        .create_async()
        .await;

    let h = harness(&server.url(), "4.0.0.0", true);
    let outcome = h.updater.check().await;

    assert!(matches!(outcome, CheckOutcome::NoUpdate));
    artifact.assert_async().await;
    assert!(h.launcher.plans.lock().is_empty());
}

#[tokio::test]
async fn test_unreachable_feed_fails_the_check() {
    let server = mockito::Server::new_async().await;
    let url = server.url();
    drop(server);

    let h = harness(&url, "1.0.0.0", true);
    let outcome = h.updater.check().await;
    assert!(matches!(
        outcome,
        CheckOutcome::Failed(UpdateError::Retrieval(_))
    ));
}

#[tokio::test]
async fn test_relative_download_url_resolves_against_feed() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/updates/feed.xml")
        .with_body(format!(
            r#"<?xml version="1.0"?>
<item>
    <version>2.0.0.0</version>
    <url>setup.msi</url>
    <checksum algorithm="SHA256">{INSTALLER_SHA256}</checksum>
</item>"#
        ))
        .create_async()
        .await;
    let artifact = server
        .mock("GET", "/updates/setup.msi")
        .with_body(INSTALLER_BODY)
        .create_async()
        .await;

    let download_dir = tempfile::tempdir().unwrap();
    let settings = UpdateSettings::new(format!("{}/updates/feed.xml", server.url()))
        .with_app_title("Widget")
        .with_installed_version("1.0.0.0".parse().unwrap())
        .with_download_dir(download_dir.path())
        .unattended();
    let launcher = Arc::new(RecordingLauncher::default());
    let updater = Updater::builder(settings)
        .with_store(Arc::new(MemoryStore::new()))
        .with_launcher(launcher.clone())
        .with_exit_coordinator(
            ExitCoordinator::new(None)
                .with_sweep_fn(Arc::new(|| {}))
                .with_exit_fn(Arc::new(|| {})),
        )
        .build()
        .unwrap();

    let outcome = updater.check().await;
    assert!(matches!(outcome, CheckOutcome::Launched), "{outcome:?}");
    artifact.assert_async().await;
}
