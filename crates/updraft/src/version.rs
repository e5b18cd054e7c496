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

//! Version parsing and comparison module
//!
//! Update manifests carry up to four numeric components
//! (`major.minor.build.revision`). Missing components compare as zero, so
//! `2.0` == `2.0.0.0` and `2.0.1` > `2.0`.

use crate::error::{Result, UpdateError};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub build: u64,
    pub revision: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, build: u64, revision: u64) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }
}

impl FromStr for Version {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().trim_start_matches('v').trim_start_matches('V');
        if s.is_empty() {
            return Err(UpdateError::VersionParse("empty version string".into()));
        }

        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() > 4 {
            return Err(UpdateError::VersionParse(format!(
                "too many components in version: {s}"
            )));
        }

        let mut components = [0u64; 4];
        for (i, part) in parts.iter().enumerate() {
            components[i] = part.parse::<u64>().map_err(|_| {
                UpdateError::VersionParse(format!("invalid version component: {part}"))
            })?;
        }

        Ok(Self {
            major: components[0],
            minor: components[1],
            build: components[2],
            revision: components[3],
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}
