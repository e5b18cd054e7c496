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

//! Updraft - Self-update orchestration for desktop applications
//!
//! This crate checks a remote manifest feed for a newer version, honors
//! persisted per-user skip and remind-later decisions, downloads and
//! verifies the installer artifact, launches it by kind, and coordinates
//! application shutdown so the installer can replace the running binary.

pub mod app_info;
pub mod clock;
pub mod download;
pub mod engine;
pub mod error;
pub mod exit;
pub mod integrity;
pub mod launcher;
pub mod manifest;
pub mod retriever;
pub mod settings;
pub mod store;
pub mod ui;
pub mod version;

pub use engine::{CheckOutcome, UpdateInfo, Updater};
pub use error::{Result, UpdateError};
pub use manifest::{Manifest, ManifestParser};
pub use settings::{RemindSpan, UpdateSettings};
pub use ui::{PromptChoice, PromptRequest, UpdatePrompt};
pub use version::Version;
