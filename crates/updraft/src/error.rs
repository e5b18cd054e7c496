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

//! Error types for the updater crate

use thiserror::Error;

/// Every failure an update check can terminate with. Each variant maps to
/// exactly one terminal outcome; none of these crosses the check boundary as
/// a panic or an unhandled fault.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("manifest retrieval failed: {0}")]
    Retrieval(String),

    #[error("manifest parse failed: {0}")]
    Parse(String),

    #[error("manifest validation failed: {0}")]
    Validation(String),

    #[error("no resolvable application identity: {0}")]
    AppInfo(String),

    #[error("version parse error: {0}")]
    VersionParse(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("download cancelled")]
    Cancelled,

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("installer launch failed: {0}")]
    Launch(String),

    #[error("update prompt failed: {0}")]
    Prompt(String),

    #[error("decision store error: {0}")]
    Store(String),

    #[error("state persistence error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, UpdateError>;
