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

//! Persisted skip / remind-later decisions
//!
//! The store itself is a narrow key-value contract; the typed view lives
//! here. Keys are scoped under the application's persistence key
//! (`{company}\{title}\AutoUpdater`), holding `skip` (0/1), `version`
//! (the skip floor) and `remindlater` (formatted timestamp).

use crate::error::{Result, UpdateError};
use crate::version::Version;
use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;

const KEY_SKIP: &str = "skip";
const KEY_VERSION: &str = "version";
const KEY_REMIND_LATER: &str = "remindlater";

/// Timestamp format of the persisted `remindlater` value.
pub const REMIND_LATER_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Key-value persistence boundary. A multi-key write is all-or-nothing;
/// a partially applied decision must never be observable.
pub trait DecisionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set_all(&self, entries: &[(String, String)]) -> Result<()>;
}

/// Typed view over the persisted decision, read at the start of every check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisteredDecision {
    pub skip_versions: bool,
    pub minimal_version: Version,
    pub remind_later_at: Option<DateTime<Utc>>,
}

fn scoped(scope: &str, field: &str) -> String {
    format!("{scope}\\{field}")
}

/// Read the persisted decision. Malformed values degrade to their defaults;
/// only a failing store surfaces as an error.
pub fn read_decision(store: &dyn DecisionStore, scope: &str) -> Result<RegisteredDecision> {
    let mut decision = RegisteredDecision::default();

    let skip = store.get(&scoped(scope, KEY_SKIP))?;
    let version = store.get(&scoped(scope, KEY_VERSION))?;
    if let (Some(skip), Some(version)) = (skip, version) {
        decision.skip_versions = skip == "1";
        if let Ok(version) = version.parse::<Version>() {
            decision.minimal_version = version;
        }
    }

    if let Some(remind) = store.get(&scoped(scope, KEY_REMIND_LATER))?
        && let Ok(naive) = NaiveDateTime::parse_from_str(&remind, REMIND_LATER_FORMAT)
    {
        decision.remind_later_at = Some(naive.and_utc());
    }

    Ok(decision)
}

/// User chose "skip this version": suppress prompts up to `floor`.
pub fn write_skip(store: &dyn DecisionStore, scope: &str, floor: Version) -> Result<()> {
    store.set_all(&[
        (scoped(scope, KEY_VERSION), floor.to_string()),
        (scoped(scope, KEY_SKIP), "1".into()),
    ])
}

/// The server-reported version moved past the skipped floor: the skip
/// record is reset, not merely ignored.
pub fn clear_skip(store: &dyn DecisionStore, scope: &str, current: Version) -> Result<()> {
    store.set_all(&[
        (scoped(scope, KEY_VERSION), current.to_string()),
        (scoped(scope, KEY_SKIP), "0".into()),
    ])
}

/// User chose "remind me later" at `at`; clears any skip choice.
pub fn write_remind_later(
    store: &dyn DecisionStore,
    scope: &str,
    current: Version,
    at: DateTime<Utc>,
) -> Result<()> {
    store.set_all(&[
        (scoped(scope, KEY_VERSION), current.to_string()),
        (scoped(scope, KEY_SKIP), "0".into()),
        (
            scoped(scope, KEY_REMIND_LATER),
            at.format(REMIND_LATER_FORMAT).to_string(),
        ),
    ])
}

/// JSON-file backed store with atomic temp-then-rename writes.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Default per-user location under the platform config directory.
    pub fn open_default() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| UpdateError::Store("no config directory available".into()))?
            .join("updraft");
        std::fs::create_dir_all(&dir)?;
        Self::open(dir.join("decisions.json"))
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let temp_path = self.path.with_extension("tmp");
        let content = serde_json::to_string_pretty(entries)?;

        // Atomic write
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }
}

impl DecisionStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set_all(&self, new: &[(String, String)]) -> Result<()> {
        let mut entries = self.entries.lock();
        for (key, value) in new {
            entries.insert(key.clone(), value.clone());
        }
        self.save(&entries)
    }
}

/// In-memory store, counts writes. Used by tests and embedders that manage
/// persistence elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set_all` calls so far.
    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }
}

impl DecisionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set_all(&self, new: &[(String, String)]) -> Result<()> {
        let mut entries = self.entries.lock();
        for (key, value) in new {
            entries.insert(key.clone(), value.clone());
        }
        *self.writes.lock() += 1;
        Ok(())
    }
}
