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

//! Manifest feed retrieval over HTTP

use crate::error::{Result, UpdateError};
use async_trait::async_trait;
use url::Url;

const USER_AGENT: &str = concat!("updraft/", env!("CARGO_PKG_VERSION"));

/// Raw feed text plus the location it was actually served from (after
/// redirects), which relative download URLs resolve against.
#[derive(Debug, Clone)]
pub struct RetrievedFeed {
    pub body: String,
    pub base_url: Option<Url>,
}

/// Transport boundary for fetching the manifest feed. The default is
/// [`HttpRetriever`]; tests and embedders with exotic transports supply
/// their own.
#[async_trait]
pub trait ManifestRetriever: Send + Sync {
    async fn retrieve(&self, url: &str) -> Result<RetrievedFeed>;
}

/// Fetches the feed with caching disabled so every check sees the current
/// manifest, never a stale intermediary copy.
#[derive(Debug, Default)]
pub struct HttpRetriever {
    proxy: Option<String>,
}

impl HttpRetriever {
    pub fn new(proxy: Option<String>) -> Self {
        Self { proxy }
    }

    fn client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(ref proxy) = self.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| UpdateError::Retrieval(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| UpdateError::Retrieval(format!("failed to build HTTP client: {e}")))
    }
}

#[async_trait]
impl ManifestRetriever for HttpRetriever {
    async fn retrieve(&self, url: &str) -> Result<RetrievedFeed> {
        let response = self
            .client()?
            .get(url)
            .header(reqwest::header::CACHE_CONTROL, "no-cache, no-store")
            .header(reqwest::header::PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|e| UpdateError::Retrieval(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(UpdateError::Retrieval(format!(
                "feed fetch failed with status: {}",
                response.status()
            )));
        }

        let base_url = Some(response.url().clone());
        let body = response
            .text()
            .await
            .map_err(|e| UpdateError::Retrieval(format!("failed to read feed body: {e}")))?;

        Ok(RetrievedFeed { body, base_url })
    }
}
