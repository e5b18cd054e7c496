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

//! User-facing collaborator boundary
//!
//! The engine runs its checks on a background task and never touches UI
//! state itself. Implementations of [`UpdatePrompt`] own the hop onto
//! their UI context (dispatcher, main-thread channel, whatever the toolkit
//! requires); from the engine's side the prompt is just an `.await` point.

use crate::error::Result;
use crate::settings::RemindSpan;
use crate::version::Version;
use async_trait::async_trait;

/// What the user picked in the update dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    Update,
    Skip,
    /// Optionally carries a user-selected interval overriding the
    /// configured one.
    RemindLater {
        chosen: Option<(u32, RemindSpan)>,
    },
    Cancelled,
}

/// Everything the update dialog needs to render the three-way choice.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub app_title: String,
    pub available_version: Version,
    pub installed_version: Version,
    pub show_skip: bool,
    pub show_remind_later: bool,
    pub changelog_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Info,
    Error,
}

#[async_trait]
pub trait UpdatePrompt: Send + Sync {
    /// Present the modal update choice. A failing prompt terminates the
    /// check with a prompt error, it does not crash the engine.
    async fn choose(&self, request: PromptRequest) -> Result<PromptChoice>;

    /// Surface a user-visible notice (retrieval/validation failures, the
    /// no-update message). Default implementations may drop these.
    fn report(&self, _level: ReportLevel, _caption: &str, _message: &str) {}
}

/// Prompt that never shows anything and always cancels. The default for
/// unattended embedders.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPrompt;

#[async_trait]
impl UpdatePrompt for NullPrompt {
    async fn choose(&self, _request: PromptRequest) -> Result<PromptChoice> {
        Ok(PromptChoice::Cancelled)
    }
}

/// Progress callback fed `(bytes_received, total_bytes)` during downloads.
pub type ProgressSink = std::sync::Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;
