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

//! Orchestrator configuration

use crate::manifest::ManifestParser;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Unit of the remind-later interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemindSpan {
    Minutes,
    Hours,
    #[default]
    Days,
}

impl RemindSpan {
    pub fn duration(self, interval: u32) -> chrono::Duration {
        let interval = i64::from(interval);
        match self {
            Self::Minutes => chrono::Duration::minutes(interval),
            Self::Hours => chrono::Duration::hours(interval),
            Self::Days => chrono::Duration::days(interval),
        }
    }
}

/// Closure resolving the installed version at check time. Takes precedence
/// over [`UpdateSettings::installed_version`].
pub type InstalledVersionProvider = Arc<dyn Fn() -> Version + Send + Sync>;

/// Hook invoked after a successful installer launch. Returning `true` means
/// the embedder fully handled application exit and the default exit
/// sequence is skipped.
pub type ExitHook = Arc<dyn Fn() -> bool + Send + Sync>;

/// Configuration for one [`Updater`](crate::engine::Updater). Defaults match
/// an attended desktop application: skip and remind-later offered, installer
/// elevated, one-day remind interval.
#[derive(Clone)]
pub struct UpdateSettings {
    /// Location of the manifest feed. Required.
    pub feed_url: String,
    /// Application title shown to the user and used for store scoping.
    /// Falls back to the current executable's name.
    pub app_title: Option<String>,
    /// Company name, the outer namespace of the persistence key.
    pub company: Option<String>,
    pub installed_version: Option<Version>,
    pub installed_version_provider: Option<InstalledVersionProvider>,
    /// Where update artifacts are downloaded. Defaults to the system temp
    /// directory.
    pub download_dir: Option<PathBuf>,
    pub show_skip: bool,
    pub show_remind_later: bool,
    pub remind_interval: u32,
    pub remind_span: RemindSpan,
    /// Treat the update as mandatory regardless of what the manifest says.
    pub mandatory: bool,
    /// No prompts; decisions are made automatically.
    pub unattended: bool,
    /// Hand the download URL to the default browser instead of downloading.
    pub open_download_page: bool,
    /// Request elevated privileges for the installer launch.
    pub elevate: bool,
    pub report_infos: bool,
    pub report_errors: bool,
    pub proxy: Option<String>,
    /// Front-end executable for platform packages.
    pub package_installer: String,
    /// Path of the archive-extraction helper used for archive artifacts.
    /// Defaults to `updraft-extractor` next to the running executable.
    pub extractor_path: Option<PathBuf>,
    /// Custom feed parser replacing the default item-feed markup parser.
    pub parser: Option<Arc<dyn ManifestParser>>,
    pub exit_hook: Option<ExitHook>,
}

impl UpdateSettings {
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self {
            feed_url: feed_url.into(),
            app_title: None,
            company: None,
            installed_version: None,
            installed_version_provider: None,
            download_dir: None,
            show_skip: true,
            show_remind_later: true,
            remind_interval: 1,
            remind_span: RemindSpan::Days,
            mandatory: false,
            unattended: false,
            open_download_page: false,
            elevate: true,
            report_infos: false,
            report_errors: false,
            proxy: None,
            package_installer: "msiexec".into(),
            extractor_path: None,
            parser: None,
            exit_hook: None,
        }
    }

    pub fn with_app_title(mut self, title: impl Into<String>) -> Self {
        self.app_title = Some(title.into());
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_installed_version(mut self, version: Version) -> Self {
        self.installed_version = Some(version);
        self
    }

    pub fn with_installed_version_provider(mut self, provider: InstalledVersionProvider) -> Self {
        self.installed_version_provider = Some(provider);
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    pub fn without_skip_option(mut self) -> Self {
        self.show_skip = false;
        self
    }

    pub fn without_remind_later_option(mut self) -> Self {
        self.show_remind_later = false;
        self
    }

    pub fn with_remind_interval(mut self, interval: u32, span: RemindSpan) -> Self {
        self.remind_interval = interval;
        self.remind_span = span;
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn unattended(mut self) -> Self {
        self.unattended = true;
        self
    }

    pub fn open_download_page(mut self) -> Self {
        self.open_download_page = true;
        self
    }

    pub fn without_elevation(mut self) -> Self {
        self.elevate = false;
        self
    }

    pub fn report_all(mut self) -> Self {
        self.report_infos = true;
        self.report_errors = true;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_package_installer(mut self, program: impl Into<String>) -> Self {
        self.package_installer = program.into();
        self
    }

    pub fn with_extractor_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.extractor_path = Some(path.into());
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn ManifestParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_exit_hook(mut self, hook: ExitHook) -> Self {
        self.exit_hook = Some(hook);
        self
    }
}

impl fmt::Debug for UpdateSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateSettings")
            .field("feed_url", &self.feed_url)
            .field("app_title", &self.app_title)
            .field("company", &self.company)
            .field("installed_version", &self.installed_version)
            .field("mandatory", &self.mandatory)
            .field("unattended", &self.unattended)
            .field("open_download_page", &self.open_download_page)
            .field("elevate", &self.elevate)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = UpdateSettings::new("https://example.com/feed.xml");
        assert!(settings.show_skip);
        assert!(settings.show_remind_later);
        assert!(settings.elevate);
        assert!(!settings.mandatory);
        assert!(!settings.unattended);
        assert_eq!(settings.remind_interval, 1);
        assert_eq!(settings.remind_span, RemindSpan::Days);
        assert_eq!(settings.package_installer, "msiexec");
    }

    #[test]
    fn test_remind_span_durations() {
        assert_eq!(
            RemindSpan::Minutes.duration(30),
            chrono::Duration::minutes(30)
        );
        assert_eq!(RemindSpan::Hours.duration(2), chrono::Duration::hours(2));
        assert_eq!(RemindSpan::Days.duration(1), chrono::Duration::days(1));
    }
}
