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

//! Update decision engine
//!
//! [`Updater`] drives one complete check: retrieve the manifest feed,
//! parse and validate it, honor persisted skip and remind-later choices,
//! then either prompt, delegate, or apply the update unattended. At most
//! one check runs at a time; every entry path resolves to exactly one
//! [`CheckOutcome`].

use crate::app_info::InstalledAppInfo;
use crate::clock::{Clock, SystemClock};
use crate::download::Downloader;
use crate::error::{Result, UpdateError};
use crate::exit::ExitCoordinator;
use crate::launcher::{
    LaunchContext, LaunchOutcome, ProcessLauncher, UpdateLauncher, build_plan,
    default_extractor_path,
};
use crate::manifest::{ItemFeedParser, Manifest, ManifestParser};
use crate::retriever::{HttpRetriever, ManifestRetriever};
use crate::settings::UpdateSettings;
use crate::store::{
    DecisionStore, JsonFileStore, clear_skip, read_decision, write_remind_later, write_skip,
};
use crate::ui::{NullPrompt, ProgressSink, PromptChoice, PromptRequest, ReportLevel, UpdatePrompt};
use crate::version::Version;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CHECK_FAILED_CAPTION: &str = "Update check failed";
const NO_UPDATE_CAPTION: &str = "No update available";

/// What one check resolved to.
#[derive(Debug)]
pub enum CheckOutcome {
    /// Another check was already running or a reminder is pending.
    Ignored,
    /// The feed's version is not newer than the installed one.
    NoUpdate,
    /// A remind-later choice defers the decision until the given instant.
    Reminder(DateTime<Utc>),
    /// The available version falls within a persisted skip choice, or the
    /// user skipped it just now.
    Skipped,
    /// The update was handed to the custom decision handler.
    Delegated,
    /// The user dismissed the prompt, cancelled the download, or declined
    /// elevation.
    Cancelled,
    /// The download page was opened in the browser and shutdown started.
    DownloadPageOpened,
    /// The installer was launched and shutdown started.
    Launched,
    Failed(UpdateError),
}

/// Snapshot handed to a custom decision handler instead of the built-in
/// prompt-and-apply flow.
#[derive(Debug, Clone)]
pub struct UpdateInfo {
    pub manifest: Manifest,
    pub installed_version: Version,
    pub is_update_available: bool,
}

/// Custom decision handler. When set, an available update is handed off
/// here and the engine stops; a handler failure is logged, never fatal.
pub type UpdateCheckDelegate =
    Arc<dyn Fn(UpdateInfo) -> std::result::Result<(), String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckReason {
    Manual,
    TimerFired,
}

/// Pending reminder timer. The generation guards the handle slot against
/// a timer that fires while a replacement is being scheduled.
#[derive(Default)]
struct ReminderSlot {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

struct Inner {
    settings: UpdateSettings,
    retriever: Arc<dyn ManifestRetriever>,
    parser: Arc<dyn ManifestParser>,
    store: Arc<dyn DecisionStore>,
    prompt: Arc<dyn UpdatePrompt>,
    launcher: Arc<dyn UpdateLauncher>,
    clock: Arc<dyn Clock>,
    downloader: Downloader,
    exit: ExitCoordinator,
    progress: Option<ProgressSink>,
    delegate: Option<UpdateCheckDelegate>,
    running: AtomicBool,
    reminder: Mutex<ReminderSlot>,
    last_manifest: Mutex<Option<Manifest>>,
    cancel: Mutex<CancellationToken>,
}

/// The update orchestrator. Cheap to clone; all clones share one engine.
#[derive(Clone)]
pub struct Updater {
    inner: Arc<Inner>,
}

/// Assembles an [`Updater`], letting embedders and tests swap any
/// collaborator.
pub struct UpdaterBuilder {
    settings: UpdateSettings,
    retriever: Option<Arc<dyn ManifestRetriever>>,
    parser: Option<Arc<dyn ManifestParser>>,
    store: Option<Arc<dyn DecisionStore>>,
    prompt: Option<Arc<dyn UpdatePrompt>>,
    launcher: Option<Arc<dyn UpdateLauncher>>,
    clock: Option<Arc<dyn Clock>>,
    downloader: Option<Downloader>,
    exit: Option<ExitCoordinator>,
    progress: Option<ProgressSink>,
    delegate: Option<UpdateCheckDelegate>,
}

impl UpdaterBuilder {
    pub fn with_retriever(mut self, retriever: Arc<dyn ManifestRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn ManifestParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn DecisionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn UpdatePrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn UpdateLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = Some(downloader);
        self
    }

    pub fn with_exit_coordinator(mut self, exit: ExitCoordinator) -> Self {
        self.exit = Some(exit);
        self
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_update_delegate(mut self, delegate: UpdateCheckDelegate) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn build(self) -> Result<Updater> {
        let settings = self.settings;
        let retriever = match self.retriever {
            Some(retriever) => retriever,
            None => Arc::new(HttpRetriever::new(settings.proxy.clone())),
        };
        let parser = match self.parser {
            Some(parser) => parser,
            None => settings
                .parser
                .clone()
                .unwrap_or_else(|| Arc::new(ItemFeedParser)),
        };
        let store: Arc<dyn DecisionStore> = match self.store {
            Some(store) => store,
            None => Arc::new(JsonFileStore::open_default()?),
        };
        let downloader = self
            .downloader
            .unwrap_or_else(|| Downloader::new(settings.proxy.clone()));
        let exit = self
            .exit
            .unwrap_or_else(|| ExitCoordinator::new(settings.exit_hook.clone()));

        Ok(Updater {
            inner: Arc::new(Inner {
                retriever,
                parser,
                store,
                prompt: self.prompt.unwrap_or_else(|| Arc::new(NullPrompt)),
                launcher: self.launcher.unwrap_or_else(|| Arc::new(ProcessLauncher)),
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                downloader,
                exit,
                progress: self.progress,
                delegate: self.delegate,
                running: AtomicBool::new(false),
                reminder: Mutex::new(ReminderSlot::default()),
                last_manifest: Mutex::new(None),
                cancel: Mutex::new(CancellationToken::new()),
                settings,
            }),
        })
    }
}

/// Releases the single-run guard exactly once, on every exit path.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Updater {
    /// Engine with default collaborators: HTTP retrieval, the item-feed
    /// parser, the JSON file store, no prompt.
    pub fn new(settings: UpdateSettings) -> Result<Self> {
        Self::builder(settings).build()
    }

    pub fn builder(settings: UpdateSettings) -> UpdaterBuilder {
        UpdaterBuilder {
            settings,
            retriever: None,
            parser: None,
            store: None,
            prompt: None,
            launcher: None,
            clock: None,
            downloader: None,
            exit: None,
            progress: None,
            delegate: None,
        }
    }

    /// Run one update check to completion.
    pub async fn check(&self) -> CheckOutcome {
        self.check_inner(self.inner.settings.mandatory, CheckReason::Manual)
            .await
    }

    /// Run one check treating the update as mandatory regardless of
    /// settings or manifest. Cancels a pending reminder.
    pub async fn check_mandatory(&self) -> CheckOutcome {
        self.check_inner(true, CheckReason::Manual).await
    }

    /// Fire-and-forget variant of [`check`](Self::check).
    pub fn spawn_check(&self) -> JoinHandle<CheckOutcome> {
        let updater = self.clone();
        tokio::spawn(async move { updater.check().await })
    }

    /// Cancel an in-flight artifact download.
    pub fn cancel_download(&self) {
        self.inner.cancel.lock().cancel();
    }

    /// Manifest of the most recent successfully parsed check.
    pub fn last_manifest(&self) -> Option<Manifest> {
        self.inner.last_manifest.lock().clone()
    }

    pub fn reminder_pending(&self) -> bool {
        self.inner.reminder.lock().handle.is_some()
    }

    async fn check_inner(&self, mandatory_requested: bool, reason: CheckReason) -> CheckOutcome {
        {
            let mut slot = self.inner.reminder.lock();
            if slot.handle.is_some() {
                if mandatory_requested {
                    slot.generation += 1;
                    if let Some(handle) = slot.handle.take() {
                        handle.abort();
                    }
                    tracing::debug!("mandatory check cancels pending reminder");
                } else if reason == CheckReason::Manual {
                    tracing::debug!("check ignored, reminder pending");
                    return CheckOutcome::Ignored;
                }
            }
        }

        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("check ignored, another check is running");
            return CheckOutcome::Ignored;
        }
        let _guard = RunGuard(&self.inner.running);

        let cancel = CancellationToken::new();
        *self.inner.cancel.lock() = cancel.clone();

        self.run_check(mandatory_requested, cancel).await
    }

    async fn run_check(&self, mandatory_requested: bool, cancel: CancellationToken) -> CheckOutcome {
        let settings = &self.inner.settings;

        let info = match InstalledAppInfo::resolve(settings) {
            Ok(info) => info,
            Err(e) => {
                tracing::error!("cannot resolve application identity: {e}");
                return CheckOutcome::Failed(e);
            }
        };
        tracing::info!(
            title = %info.title,
            installed = %info.installed_version,
            "checking for updates"
        );

        let feed = match self.inner.retriever.retrieve(&settings.feed_url).await {
            Ok(feed) => feed,
            Err(e) => {
                tracing::error!("manifest retrieval failed: {e}");
                self.report(
                    ReportLevel::Error,
                    CHECK_FAILED_CAPTION,
                    &format!(
                        "There was a problem reaching the update server. Please check your \
                         connection and try again later. ({e})"
                    ),
                );
                return CheckOutcome::Failed(e);
            }
        };

        let raw = match self.inner.parser.parse(&feed.body) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!("manifest parse failed: {e}");
                return CheckOutcome::Failed(e);
            }
        };

        let manifest = match Manifest::from_raw(raw, feed.base_url.as_ref()) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::error!("manifest validation failed: {e}");
                self.report(
                    ReportLevel::Error,
                    CHECK_FAILED_CAPTION,
                    &format!("The update information is invalid. ({e})"),
                );
                return CheckOutcome::Failed(e);
            }
        };
        *self.inner.last_manifest.lock() = Some(manifest.clone());

        let mandatory = mandatory_requested || manifest.mandatory;

        if !mandatory {
            let decision = match read_decision(self.inner.store.as_ref(), &info.persistence_key) {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::error!("decision store read failed: {e}");
                    return CheckOutcome::Failed(e);
                }
            };

            if decision.skip_versions {
                if manifest.version <= decision.minimal_version {
                    tracing::info!(
                        available = %manifest.version,
                        floor = %decision.minimal_version,
                        "available version is within the skipped range"
                    );
                    return CheckOutcome::Skipped;
                }
                // The feed moved past the skipped floor; the record is
                // reset, not merely ignored.
                if let Err(e) =
                    clear_skip(self.inner.store.as_ref(), &info.persistence_key, manifest.version)
                {
                    tracing::error!("decision store write failed: {e}");
                    return CheckOutcome::Failed(e);
                }
            }

            if let Some(at) = decision.remind_later_at
                && self.inner.clock.now() < at
            {
                tracing::info!(%at, "remind-later pending, deferring check");
                self.schedule_reminder(at);
                return CheckOutcome::Reminder(at);
            }
        }

        let available = manifest.version > info.installed_version;
        if !available {
            tracing::info!(
                available = %manifest.version,
                "no newer version available"
            );
            self.report(
                ReportLevel::Info,
                NO_UPDATE_CAPTION,
                &format!(
                    "You are already using the latest version of {}.",
                    info.title
                ),
            );
            return CheckOutcome::NoUpdate;
        }

        if let Some(delegate) = &self.inner.delegate {
            tracing::debug!("handing update off to the custom decision handler");
            let update = UpdateInfo {
                manifest: manifest.clone(),
                installed_version: info.installed_version,
                is_update_available: true,
            };
            if let Err(e) = delegate(update) {
                tracing::warn!("custom decision handler failed: {e}");
            }
            return CheckOutcome::Delegated;
        }

        if settings.unattended {
            return self.apply_update(&manifest, &cancel).await;
        }

        let request = PromptRequest {
            app_title: info.title.clone(),
            available_version: manifest.version,
            installed_version: info.installed_version,
            show_skip: settings.show_skip && !mandatory,
            show_remind_later: settings.show_remind_later && !mandatory,
            changelog_url: manifest.changelog_url.clone(),
        };
        let choice = match self.inner.prompt.choose(request).await {
            Ok(choice) => choice,
            Err(e) => {
                tracing::error!("update prompt failed: {e}");
                return CheckOutcome::Failed(e);
            }
        };

        match choice {
            PromptChoice::Update => {
                if settings.open_download_page {
                    if let Err(e) = open::that(&manifest.download_url) {
                        tracing::error!("cannot open download page: {e}");
                        return CheckOutcome::Failed(UpdateError::Launch(format!(
                            "failed to open download page: {e}"
                        )));
                    }
                    self.inner.exit.run();
                    CheckOutcome::DownloadPageOpened
                } else {
                    self.apply_update(&manifest, &cancel).await
                }
            }
            PromptChoice::Skip => {
                if let Err(e) =
                    write_skip(self.inner.store.as_ref(), &info.persistence_key, manifest.version)
                {
                    tracing::error!("decision store write failed: {e}");
                    return CheckOutcome::Failed(e);
                }
                tracing::info!(version = %manifest.version, "user skipped this version");
                CheckOutcome::Skipped
            }
            PromptChoice::RemindLater { chosen } => {
                let (interval, span) =
                    chosen.unwrap_or((settings.remind_interval, settings.remind_span));
                let at = self.inner.clock.now() + span.duration(interval);
                if let Err(e) = write_remind_later(
                    self.inner.store.as_ref(),
                    &info.persistence_key,
                    manifest.version,
                    at,
                ) {
                    tracing::error!("decision store write failed: {e}");
                    return CheckOutcome::Failed(e);
                }
                tracing::info!(%at, "user deferred the update");
                self.schedule_reminder(at);
                CheckOutcome::Reminder(at)
            }
            PromptChoice::Cancelled => {
                tracing::info!("user dismissed the update prompt");
                CheckOutcome::Cancelled
            }
        }
    }

    async fn apply_update(&self, manifest: &Manifest, cancel: &CancellationToken) -> CheckOutcome {
        let settings = &self.inner.settings;
        let dest_dir = settings
            .download_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);

        let artifact = match self
            .inner
            .downloader
            .download(
                &manifest.download_url,
                &dest_dir,
                self.inner.progress.clone(),
                cancel,
            )
            .await
        {
            Ok(path) => path,
            Err(UpdateError::Cancelled) => {
                tracing::info!("artifact download cancelled");
                return CheckOutcome::Cancelled;
            }
            Err(e) => {
                tracing::error!("artifact download failed: {e}");
                return CheckOutcome::Failed(e);
            }
        };

        if let Err(e) = crate::integrity::verify(manifest, &artifact) {
            tracing::error!("artifact integrity verification failed: {e}");
            return CheckOutcome::Failed(e);
        }

        let context = match LaunchContext::current() {
            Ok(context) => context,
            Err(e) => {
                tracing::error!("cannot resolve launch context: {e}");
                return CheckOutcome::Failed(e);
            }
        };
        let extractor = settings
            .extractor_path
            .clone()
            .unwrap_or_else(|| default_extractor_path(&context));
        let plan = build_plan(
            &artifact,
            &manifest.installer_args,
            settings.unattended,
            settings.elevate,
            &settings.package_installer,
            &extractor,
            &context,
        );

        match self.inner.launcher.launch(&plan).await {
            Ok(LaunchOutcome::Launched) => {
                self.inner.exit.run();
                CheckOutcome::Launched
            }
            Ok(LaunchOutcome::ElevationDeclined) => {
                tracing::info!("user declined elevation, leaving the application running");
                CheckOutcome::Cancelled
            }
            Err(e) => {
                tracing::error!("installer launch failed: {e}");
                CheckOutcome::Failed(e)
            }
        }
    }

    fn schedule_reminder(&self, at: DateTime<Utc>) {
        let delay = (at - self.inner.clock.now()).to_std().unwrap_or_default();

        // The slot lock is held across spawn and store, so even a
        // zero-delay timer cannot observe the slot before its own handle
        // is in it.
        let mut slot = self.inner.reminder.lock();
        slot.generation += 1;
        let generation = slot.generation;
        if let Some(old) = slot.handle.take() {
            old.abort();
        }

        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else { return };
            let updater = Updater { inner };
            {
                let mut slot = updater.inner.reminder.lock();
                if slot.generation != generation {
                    // Superseded while firing; the replacement owns the
                    // slot now.
                    return;
                }
                slot.handle = None;
            }
            let outcome = updater
                .check_inner(updater.inner.settings.mandatory, CheckReason::TimerFired)
                .await;
            tracing::debug!(?outcome, "reminder check finished");
        });
        slot.handle = Some(handle);
    }

    /// User-visible notices, gated by the report settings and suppressed
    /// entirely in unattended mode.
    fn report(&self, level: ReportLevel, caption: &str, message: &str) {
        let settings = &self.inner.settings;
        if settings.unattended {
            return;
        }
        let enabled = match level {
            ReportLevel::Info => settings.report_infos,
            ReportLevel::Error => settings.report_errors,
        };
        if enabled {
            self.inner.prompt.report(level, caption, message);
        }
    }
}

impl std::fmt::Debug for Updater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Updater")
            .field("settings", &self.inner.settings)
            .field("running", &self.inner.running.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::retriever::RetrievedFeed;
    use crate::settings::RemindSpan;
    use crate::store::{MemoryStore, read_decision, write_skip};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn feed(version: &str, extra: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<item>
    <version>{version}</version>
    <url>https://downloads.example.com/setup.msi</url>
    {extra}
</item>"#
        )
    }

    struct StaticRetriever {
        body: String,
        calls: AtomicUsize,
    }

    impl StaticRetriever {
        fn new(body: impl Into<String>) -> Arc<Self> {
            Arc::new(Self {
                body: body.into(),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ManifestRetriever for StaticRetriever {
        async fn retrieve(&self, _url: &str) -> Result<RetrievedFeed> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RetrievedFeed {
                body: self.body.clone(),
                base_url: None,
            })
        }
    }

    /// Retriever that parks until released, to exercise the single-run
    /// guard.
    struct BlockingRetriever {
        body: String,
        release: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ManifestRetriever for BlockingRetriever {
        async fn retrieve(&self, _url: &str) -> Result<RetrievedFeed> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(RetrievedFeed {
                body: self.body.clone(),
                base_url: None,
            })
        }
    }

    struct ChoicePrompt {
        choice: Mutex<PromptChoice>,
        requests: Mutex<Vec<PromptRequest>>,
        reports: Mutex<Vec<(ReportLevel, String)>>,
    }

    impl ChoicePrompt {
        fn new(choice: PromptChoice) -> Arc<Self> {
            Arc::new(Self {
                choice: Mutex::new(choice),
                requests: Mutex::new(Vec::new()),
                reports: Mutex::new(Vec::new()),
            })
        }

        fn set_choice(&self, choice: PromptChoice) {
            *self.choice.lock() = choice;
        }

        fn requests(&self) -> Vec<PromptRequest> {
            self.requests.lock().clone()
        }

        fn reports(&self) -> Vec<(ReportLevel, String)> {
            self.reports.lock().clone()
        }
    }

    #[async_trait]
    impl UpdatePrompt for ChoicePrompt {
        async fn choose(&self, request: PromptRequest) -> Result<PromptChoice> {
            self.requests.lock().push(request);
            Ok(*self.choice.lock())
        }

        fn report(&self, level: ReportLevel, caption: &str, _message: &str) {
            self.reports.lock().push((level, caption.to_owned()));
        }
    }

    fn settings(installed: &str) -> UpdateSettings {
        UpdateSettings::new("https://updates.example.com/feed.xml")
            .with_app_title("Widget")
            .with_installed_version(installed.parse().unwrap())
    }

    fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ))
    }

    fn updater(
        settings: UpdateSettings,
        retriever: Arc<dyn ManifestRetriever>,
        store: Arc<dyn DecisionStore>,
        prompt: Arc<dyn UpdatePrompt>,
        clock: Arc<dyn Clock>,
    ) -> Updater {
        Updater::builder(settings)
            .with_retriever(retriever)
            .with_store(store)
            .with_prompt(prompt)
            .with_clock(clock)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_no_update_when_feed_is_not_newer() {
        let retriever = StaticRetriever::new(feed("2.0.0.0", ""));
        let store = Arc::new(MemoryStore::new());
        let prompt = ChoicePrompt::new(PromptChoice::Update);
        let u = updater(
            settings("4.0.0.0"),
            retriever.clone(),
            store.clone(),
            prompt.clone(),
            manual_clock(),
        );

        let outcome = u.check().await;
        assert!(matches!(outcome, CheckOutcome::NoUpdate));
        assert!(prompt.requests().is_empty());
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_skip_choice_suppresses_following_checks() {
        let retriever = StaticRetriever::new(feed("2.0.0.0", ""));
        let store = Arc::new(MemoryStore::new());
        let prompt = ChoicePrompt::new(PromptChoice::Skip);
        let u = updater(
            settings("1.0.0.0"),
            retriever.clone(),
            store.clone(),
            prompt.clone(),
            manual_clock(),
        );

        let outcome = u.check().await;
        assert!(matches!(outcome, CheckOutcome::Skipped));
        assert_eq!(prompt.requests().len(), 1);

        // The persisted floor now suppresses the same version silently.
        let outcome = u.check().await;
        assert!(matches!(outcome, CheckOutcome::Skipped));
        assert_eq!(prompt.requests().len(), 1);
        assert_eq!(retriever.calls(), 2);
    }

    #[tokio::test]
    async fn test_skip_floor_resets_when_feed_advances() {
        let store = Arc::new(MemoryStore::new());
        write_skip(
            store.as_ref(),
            "Widget\\AutoUpdater",
            "2.0.0.0".parse().unwrap(),
        )
        .unwrap();

        let retriever = StaticRetriever::new(feed("3.0.0.0", ""));
        let prompt = ChoicePrompt::new(PromptChoice::Cancelled);
        let u = updater(
            settings("1.0.0.0"),
            retriever,
            store.clone(),
            prompt.clone(),
            manual_clock(),
        );

        let outcome = u.check().await;
        assert!(matches!(outcome, CheckOutcome::Cancelled));
        assert_eq!(prompt.requests().len(), 1);

        let decision = read_decision(store.as_ref(), "Widget\\AutoUpdater").unwrap();
        assert!(!decision.skip_versions);
        assert_eq!(decision.minimal_version, "3.0.0.0".parse().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remind_later_defers_then_rechecks_once() {
        let retriever = StaticRetriever::new(feed("2.0.0.0", ""));
        let store = Arc::new(MemoryStore::new());
        let prompt = ChoicePrompt::new(PromptChoice::RemindLater {
            chosen: Some((10, RemindSpan::Minutes)),
        });
        let clock = manual_clock();
        let u = updater(
            settings("1.0.0.0"),
            retriever.clone(),
            store.clone(),
            prompt.clone(),
            clock.clone(),
        );

        let outcome = u.check().await;
        let CheckOutcome::Reminder(at) = outcome else {
            panic!("expected a reminder, got {outcome:?}");
        };
        assert_eq!(at, clock.now() + chrono::Duration::minutes(10));
        assert!(u.reminder_pending());

        // Manual checks yield while the reminder is pending.
        assert!(matches!(u.check().await, CheckOutcome::Ignored));
        assert_eq!(retriever.calls(), 1);

        // Let the wall clock pass the reminder, then let the timer fire.
        clock.advance(chrono::Duration::minutes(11));
        prompt.set_choice(PromptChoice::Cancelled);
        tokio::time::sleep(Duration::from_secs(11 * 60)).await;

        assert_eq!(retriever.calls(), 2);
        assert_eq!(prompt.requests().len(), 2);
        assert!(!u.reminder_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_reminder_releases_the_slot() {
        let retriever = StaticRetriever::new(feed("2.0.0.0", ""));
        let prompt = ChoicePrompt::new(PromptChoice::RemindLater {
            chosen: Some((0, RemindSpan::Minutes)),
        });
        let u = updater(
            settings("1.0.0.0"),
            retriever.clone(),
            Arc::new(MemoryStore::new()),
            prompt.clone(),
            manual_clock(),
        );

        // A zero-length interval fires the timer as soon as it is set.
        assert!(matches!(u.check().await, CheckOutcome::Reminder(_)));
        prompt.set_choice(PromptChoice::Cancelled);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The fired timer released the slot, so manual checks proceed.
        assert!(!u.reminder_pending());
        assert!(matches!(u.check().await, CheckOutcome::Cancelled));
        assert_eq!(retriever.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mandatory_check_cancels_pending_reminder() {
        let retriever = StaticRetriever::new(feed("2.0.0.0", ""));
        let store = Arc::new(MemoryStore::new());
        let prompt = ChoicePrompt::new(PromptChoice::RemindLater { chosen: None });
        let u = updater(
            settings("1.0.0.0"),
            retriever.clone(),
            store,
            prompt.clone(),
            manual_clock(),
        );

        assert!(matches!(u.check().await, CheckOutcome::Reminder(_)));
        assert!(u.reminder_pending());

        prompt.set_choice(PromptChoice::Cancelled);
        let outcome = u.check_mandatory().await;
        assert!(matches!(outcome, CheckOutcome::Cancelled));
        assert!(!u.reminder_pending());

        // Mandatory prompts never offer skip or remind-later.
        let requests = prompt.requests();
        assert_eq!(requests.len(), 2);
        assert!(!requests[1].show_skip);
        assert!(!requests[1].show_remind_later);
    }

    #[tokio::test]
    async fn test_concurrent_checks_have_a_single_winner() {
        let retriever = Arc::new(BlockingRetriever {
            body: feed("2.0.0.0", ""),
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let prompt = ChoicePrompt::new(PromptChoice::Cancelled);
        let u = updater(
            settings("4.0.0.0"),
            retriever.clone(),
            Arc::new(MemoryStore::new()),
            prompt,
            manual_clock(),
        );

        let first = u.spawn_check();
        // Wait until the first check is parked inside retrieval.
        while retriever.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(matches!(u.check().await, CheckOutcome::Ignored));

        retriever.release.notify_one();
        let outcome = first.await.unwrap();
        assert!(matches!(outcome, CheckOutcome::NoUpdate));
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_manifest_mandatory_hides_skip_and_remind() {
        let retriever =
            StaticRetriever::new(feed("2.0.0.0", "<mandatory>true</mandatory>"));
        let prompt = ChoicePrompt::new(PromptChoice::Cancelled);
        let u = updater(
            settings("1.0.0.0"),
            retriever,
            Arc::new(MemoryStore::new()),
            prompt.clone(),
            manual_clock(),
        );

        assert!(matches!(u.check().await, CheckOutcome::Cancelled));
        let requests = prompt.requests();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].show_skip);
        assert!(!requests[0].show_remind_later);
    }

    #[tokio::test]
    async fn test_validation_failure_is_reported() {
        let retriever = StaticRetriever::new(
            r#"<?xml version="1.0"?><item><url>https://x.example/y.msi</url></item>"#,
        );
        let prompt = ChoicePrompt::new(PromptChoice::Cancelled);
        let u = updater(
            settings("1.0.0.0").report_all(),
            retriever,
            Arc::new(MemoryStore::new()),
            prompt.clone(),
            manual_clock(),
        );

        let outcome = u.check().await;
        assert!(matches!(
            outcome,
            CheckOutcome::Failed(UpdateError::Validation(_))
        ));
        let reports = prompt.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, ReportLevel::Error);
    }

    #[tokio::test]
    async fn test_delegate_takes_over_available_updates() {
        let retriever = StaticRetriever::new(feed("5.0.0.0", ""));
        let prompt = ChoicePrompt::new(PromptChoice::Update);
        let seen: Arc<Mutex<Vec<UpdateInfo>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_in_delegate = Arc::clone(&seen);

        let u = Updater::builder(settings("1.0.0.0"))
            .with_retriever(retriever)
            .with_store(Arc::new(MemoryStore::new()))
            .with_prompt(prompt.clone())
            .with_clock(manual_clock())
            .with_update_delegate(Arc::new(move |update| {
                seen_in_delegate.lock().push(update);
                Ok(())
            }))
            .build()
            .unwrap();

        assert!(matches!(u.check().await, CheckOutcome::Delegated));
        assert!(prompt.requests().is_empty());

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_update_available);
        assert_eq!(seen[0].manifest.version, "5.0.0.0".parse().unwrap());
    }

    #[tokio::test]
    async fn test_last_manifest_is_retained() {
        let retriever = StaticRetriever::new(feed("2.0.0.0", ""));
        let u = updater(
            settings("4.0.0.0"),
            retriever,
            Arc::new(MemoryStore::new()),
            ChoicePrompt::new(PromptChoice::Cancelled),
            manual_clock(),
        );

        assert!(u.last_manifest().is_none());
        u.check().await;
        let manifest = u.last_manifest().unwrap();
        assert_eq!(manifest.version, "2.0.0.0".parse().unwrap());
    }
}
