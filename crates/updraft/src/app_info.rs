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

//! Installed application identity

use crate::error::{Result, UpdateError};
use crate::settings::UpdateSettings;
use crate::version::Version;

/// Identity of the running application, resolved once per check and
/// immutable afterward. The persistence key scopes the decision store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledAppInfo {
    pub title: String,
    pub installed_version: Version,
    pub persistence_key: String,
}

impl InstalledAppInfo {
    /// Resolve from settings. The version provider closure wins over the
    /// configured version; an unresolvable title or version is a fatal
    /// check abort.
    pub fn resolve(settings: &UpdateSettings) -> Result<Self> {
        let title = match settings.app_title.clone() {
            Some(title) => title,
            None => executable_name()
                .ok_or_else(|| UpdateError::AppInfo("no application title".into()))?,
        };

        let installed_version = settings
            .installed_version_provider
            .as_ref()
            .map(|provider| provider())
            .or(settings.installed_version)
            .ok_or_else(|| UpdateError::AppInfo("no installed version".into()))?;

        let persistence_key = match settings.company.as_deref() {
            Some(company) if !company.is_empty() => format!("{company}\\{title}\\AutoUpdater"),
            _ => format!("{title}\\AutoUpdater"),
        };

        Ok(Self {
            title,
            installed_version,
            persistence_key,
        })
    }
}

fn executable_name() -> Option<String> {
    std::env::current_exe()
        .ok()?
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}
