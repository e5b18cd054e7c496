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

//! Streaming artifact download
//!
//! Artifacts are streamed into a uniquely named temp file inside the
//! destination directory and only renamed into place once the transfer
//! completed, so a half-written file is never observable under its final
//! name. Cancellation is cooperative and honored only after a short grace
//! period, giving the transfer time to establish its response context.

use crate::error::{Result, UpdateError};
use crate::ui::ProgressSink;
use futures_util::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const USER_AGENT: &str = concat!("updraft/", env!("CARGO_PKG_VERSION"));
const DEFAULT_CANCEL_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub struct Downloader {
    proxy: Option<String>,
    cancel_grace: Duration,
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Downloader {
    pub fn new(proxy: Option<String>) -> Self {
        Self {
            proxy,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }

    /// Mostly for tests: shrink or stretch the window during which
    /// cancellation requests are deferred.
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    fn client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(ref proxy) = self.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| UpdateError::Download(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| UpdateError::Download(format!("failed to build HTTP client: {e}")))
    }

    /// Stream `url` into `dest_dir`, reporting progress as
    /// `(bytes_received, total_bytes)`. Returns the final artifact path.
    /// On failure or cancellation no file is left at the destination.
    pub async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(dest_dir)?;

        let started = Instant::now();
        let response = self
            .client()?
            .get(url)
            .header(reqwest::header::CACHE_CONTROL, "no-cache, no-store")
            .send()
            .await
            .map_err(|e| UpdateError::Download(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(UpdateError::Download(format!(
                "download failed with status: {}",
                response.status()
            )));
        }

        let file_name = derive_file_name(&response);
        let total_bytes = response.content_length();

        // The temp file cleans itself up on every early return.
        let mut temp = tempfile::Builder::new()
            .prefix(".updraft-")
            .suffix(".part")
            .tempfile_in(dest_dir)?;

        let mut received: u64 = 0;
        let mut stream = response.bytes_stream();
        loop {
            // Cancellation races the next chunk rather than being checked
            // between chunks, so a stalled transfer still resolves. The
            // grace period defers it, never drops it.
            let next = tokio::select! {
                biased;
                () = async {
                    tokio::time::sleep(self.cancel_grace.saturating_sub(started.elapsed())).await;
                    cancel.cancelled().await;
                } => {
                    tracing::info!("download cancelled after {received} bytes");
                    return Err(UpdateError::Cancelled);
                }
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };

            let chunk =
                chunk.map_err(|e| UpdateError::Download(format!("transfer failed: {e}")))?;
            temp.write_all(&chunk)?;
            received += chunk.len() as u64;

            if let Some(ref progress) = progress {
                progress(received, total_bytes);
            }
        }
        temp.flush()?;

        let final_path = dest_dir.join(&file_name);
        if final_path.exists() {
            std::fs::remove_file(&final_path)?;
        }
        temp.persist(&final_path)
            .map_err(|e| UpdateError::Download(format!("failed to move into place: {e}")))?;

        tracing::info!("downloaded {received} bytes to {}", final_path.display());
        Ok(final_path)
    }
}

/// Final artifact name: the server-declared one from Content-Disposition
/// when present, the URL's last path segment otherwise.
fn derive_file_name(response: &reqwest::Response) -> String {
    let from_header = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_content_disposition);

    let name = from_header.unwrap_or_else(|| {
        response
            .url()
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .unwrap_or("update.bin")
            .to_owned()
    });

    // Keep only the terminal component; a server must not direct writes
    // outside the destination directory.
    Path::new(&name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "update.bin".to_owned())
}

fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(name) = find_file_name(header, "filename=") {
        return Some(name);
    }
    // RFC 5987 extended form carries a percent-encoded value.
    let encoded = find_file_name(header, "filename*=UTF-8''")?;
    match percent_encoding::percent_decode_str(&encoded).decode_utf8() {
        Ok(decoded) => Some(decoded.into_owned()),
        Err(_) => Some(encoded),
    }
}

fn find_file_name(header: &str, marker: &str) -> Option<String> {
    let lower = header.to_ascii_lowercase();
    let index = lower.find(&marker.to_ascii_lowercase())?;
    let mut value = &header[index + marker.len()..];
    if let Some(end) = value.find(';') {
        value = &value[..end];
    }
    let value = value.trim().trim_matches('"').trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_owned())
    }
}
