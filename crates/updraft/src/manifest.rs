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

//! Manifest model and the default item-feed parser
//!
//! A manifest describes one available release. The default feed format is a
//! small item-based markup:
//!
//! ```xml
//! <item>
//!     <version>2.0.0.0</version>
//!     <url>installer_v2.0.0.msi</url>
//!     <changelog>https://example.com/changelog.html</changelog>
//!     <mandatory>false</mandatory>
//!     <args>/qn</args>
//!     <checksum algorithm="SHA256">ab12...</checksum>
//! </item>
//! ```
//!
//! Field extraction is tolerant: unknown tags are ignored and malformed
//! values leave the field unset. Validation happens once, at this boundary;
//! a [`Manifest`] handed to the decision engine always has a parseable
//! version and a non-empty download URL.

use crate::error::{Result, UpdateError};
use crate::version::Version;
use quick_xml::events::Event;
use url::Url;

/// Descriptor of the latest available release, validated and with URLs
/// resolved against the feed's base location.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub version: Version,
    pub download_url: String,
    pub changelog_url: Option<String>,
    pub mandatory: bool,
    pub installer_args: String,
    pub checksum: Option<String>,
    pub hash_algorithm: Option<String>,
}

/// Raw field set produced by a parser, before validation. Custom parsers
/// fill this shape from whatever format the feed uses.
#[derive(Debug, Clone, Default)]
pub struct RawManifest {
    pub version: Option<String>,
    pub download_url: Option<String>,
    pub changelog_url: Option<String>,
    pub mandatory: bool,
    pub installer_args: Option<String>,
    pub checksum: Option<String>,
    pub hash_algorithm: Option<String>,
}

/// Pluggable feed parser. The default is [`ItemFeedParser`]; embedders with
/// a custom feed format supply their own and receive the raw feed text.
pub trait ManifestParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<RawManifest>;
}

impl Manifest {
    /// Validate a raw manifest and resolve its URLs against the location
    /// the feed was actually served from.
    pub fn from_raw(raw: RawManifest, base: Option<&Url>) -> Result<Self> {
        let version: Version = raw
            .version
            .as_deref()
            .ok_or_else(|| UpdateError::Validation("manifest is missing a version".into()))?
            .parse()
            .map_err(|e| UpdateError::Validation(format!("manifest version: {e}")))?;

        let download_url = match raw.download_url {
            Some(url) if !url.trim().is_empty() => url,
            _ => {
                return Err(UpdateError::Validation(
                    "manifest is missing a download url".into(),
                ));
            }
        };

        Ok(Self {
            version,
            download_url: resolve_url(base, download_url),
            changelog_url: raw.changelog_url.map(|u| resolve_url(base, u)),
            mandatory: raw.mandatory,
            installer_args: raw.installer_args.unwrap_or_default(),
            checksum: raw.checksum.filter(|c| !c.trim().is_empty()),
            hash_algorithm: raw.hash_algorithm,
        })
    }
}

/// Absolute URLs pass through untouched; relative ones are joined onto the
/// base location when one is known.
fn resolve_url(base: Option<&Url>, url: String) -> String {
    if Url::parse(&url).is_ok() {
        return url;
    }
    match base {
        Some(base) => match base.join(&url) {
            Ok(joined) => joined.to_string(),
            Err(_) => url,
        },
        None => url,
    }
}

/// Default parser for the `<item>` feed markup.
#[derive(Debug, Default, Clone, Copy)]
pub struct ItemFeedParser;

impl ManifestParser for ItemFeedParser {
    fn parse(&self, raw: &str) -> Result<RawManifest> {
        let mut reader = quick_xml::Reader::from_str(raw);
        reader.config_mut().trim_text(true);

        let mut manifest = RawManifest::default();
        let mut in_item = false;
        let mut current_tag: Option<String> = None;
        let mut saw_item = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                    if tag == "item" {
                        in_item = true;
                        saw_item = true;
                    } else if in_item {
                        if tag == "checksum" {
                            manifest.hash_algorithm = find_attribute(e, "algorithm");
                        }
                        current_tag = Some(tag);
                    }
                }
                Ok(Event::End(ref e)) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                    if tag == "item" {
                        in_item = false;
                    }
                    current_tag = None;
                }
                Ok(Event::Text(ref e)) => {
                    if let (true, Some(tag)) = (in_item, current_tag.as_deref())
                        && let Ok(text) = e.xml_content()
                    {
                        apply_field(&mut manifest, tag, text.trim());
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(UpdateError::Parse(format!("malformed feed markup: {e}")));
                }
                Ok(_) => {}
            }
        }

        if !saw_item {
            return Err(UpdateError::Parse("feed contains no <item> element".into()));
        }

        Ok(manifest)
    }
}

fn apply_field(manifest: &mut RawManifest, tag: &str, text: &str) {
    if text.is_empty() {
        return;
    }
    match tag {
        "version" => manifest.version = Some(text.to_owned()),
        "url" => manifest.download_url = Some(text.to_owned()),
        "changelog" => manifest.changelog_url = Some(text.to_owned()),
        "mandatory" => manifest.mandatory = text.parse::<bool>().unwrap_or(false),
        "args" => manifest.installer_args = Some(text.to_owned()),
        "checksum" => manifest.checksum = Some(text.to_owned()),
        _ => {}
    }
}

fn find_attribute(e: &quick_xml::events::BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        if attr.key.as_ref().eq_ignore_ascii_case(name.as_bytes()) {
            attr.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}
