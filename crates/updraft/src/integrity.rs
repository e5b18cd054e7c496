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

//! Artifact integrity verification

use crate::error::{Result, UpdateError};
use crate::manifest::Manifest;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Supported checksum algorithms. An unrecognized manifest algorithm name
/// is a distinct, reported failure, never a silent pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumAlgorithm {
    /// Default when the manifest declares a checksum without naming an
    /// algorithm.
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl FromStr for ChecksumAlgorithm {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "").as_str() {
            "SHA256" => Ok(Self::Sha256),
            "SHA384" => Ok(Self::Sha384),
            "SHA512" => Ok(Self::Sha512),
            _ => Err(UpdateError::UnsupportedAlgorithm(s.to_owned())),
        }
    }
}

fn hash_file(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = [0u8; 64 * 1024];

    // Dispatch once, stream in either case.
    macro_rules! digest {
        ($hasher:expr) => {{
            let mut hasher = $hasher;
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            hex::encode(hasher.finalize())
        }};
    }

    Ok(match algorithm {
        ChecksumAlgorithm::Sha256 => digest!(Sha256::new()),
        ChecksumAlgorithm::Sha384 => digest!(Sha384::new()),
        ChecksumAlgorithm::Sha512 => digest!(Sha512::new()),
    })
}

/// Verify a downloaded artifact against the checksum the manifest declared.
/// No declared checksum passes trivially. Hex comparison is
/// case-insensitive.
pub fn verify(manifest: &Manifest, path: &Path) -> Result<()> {
    let Some(ref expected) = manifest.checksum else {
        return Ok(());
    };

    let algorithm = match manifest.hash_algorithm.as_deref() {
        Some(name) => name.parse::<ChecksumAlgorithm>()?,
        None => ChecksumAlgorithm::default(),
    };

    let actual = hash_file(path, algorithm)?;
    if actual.eq_ignore_ascii_case(expected) {
        tracing::debug!("checksum verified ({algorithm:?})");
        Ok(())
    } else {
        Err(UpdateError::ChecksumMismatch {
            expected: expected.to_lowercase(),
            actual,
        })
    }
}
