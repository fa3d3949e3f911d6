// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The three caching strategies.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheStorage, CachedResponse};
use crate::network::{FetchRequest, Fetcher};
use crate::route::Strategy;

pub const NETWORK_ERROR_BODY: &str = "Network error";
pub const OFFLINE_BODY: &str = "Offline and no cache available";

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Cache,
    Network,
    OfflinePage,
    /// Generated locally because nothing else was available.
    Synthetic,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Network => "network",
            Self::OfflinePage => "offline-page",
            Self::Synthetic => "synthetic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub response: CachedResponse,
    pub source: Source,
}

impl Served {
    fn new(response: CachedResponse, source: Source) -> Self {
        Self { response, source }
    }
}

/// Strategy runner bound to one cache namespace.
#[derive(Clone)]
pub struct Strategies {
    cache: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
    namespace: String,
    offline_key: String,
}

impl Strategies {
    pub fn new(
        cache: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
        namespace: impl Into<String>,
        offline_key: impl Into<String>,
    ) -> Self {
        Self { cache, fetcher, namespace: namespace.into(), offline_key: offline_key.into() }
    }

    pub async fn serve(&self, strategy: Strategy, req: &FetchRequest) -> Served {
        match strategy {
            Strategy::CacheFirst => self.cache_first(req).await,
            Strategy::NetworkFirst => self.network_first(req).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(req).await,
        }
    }

    fn store_if_ok(&self, req: &FetchRequest, resp: &CachedResponse) {
        if resp.is_ok() {
            self.cache.put(&self.namespace, req.key(), resp.clone());
        }
    }

    pub async fn cache_first(&self, req: &FetchRequest) -> Served {
        if let Some(hit) = self.cache.match_any(req.key()) {
            return Served::new(hit, Source::Cache);
        }
        match self.fetcher.fetch(req).await {
            Ok(resp) => {
                self.store_if_ok(req, &resp);
                Served::new(resp, Source::Network)
            }
            Err(e) => {
                debug!(url = %req.url, kind = e.code.as_str(), "cache-first fetch failed");
                Served::new(CachedResponse::text(408, NETWORK_ERROR_BODY), Source::Synthetic)
            }
        }
    }

    pub async fn network_first(&self, req: &FetchRequest) -> Served {
        match self.fetcher.fetch(req).await {
            Ok(resp) => {
                self.store_if_ok(req, &resp);
                return Served::new(resp, Source::Network);
            }
            Err(e) => {
                debug!(url = %req.url, kind = e.code.as_str(), "network failed, trying cache");
            }
        }
        if let Some(hit) = self.cache.match_any(req.key()) {
            return Served::new(hit, Source::Cache);
        }
        if req.accepts_html() {
            if let Some(page) = self.cache.match_any(&self.offline_key) {
                return Served::new(page, Source::OfflinePage);
            }
        }
        Served::new(CachedResponse::text(503, OFFLINE_BODY), Source::Synthetic)
    }

    /// Serve the cached copy at once and refresh it in the background.
    ///
    /// Without a cached copy the network response is awaited.
    pub async fn stale_while_revalidate(&self, req: &FetchRequest) -> Served {
        let Some(hit) = self.cache.match_any(req.key()) else {
            return match self.revalidate(req, None).await {
                Some(resp) => Served::new(resp, Source::Network),
                None => Served::new(CachedResponse::text(503, OFFLINE_BODY), Source::Synthetic),
            };
        };
        let this = self.clone();
        let req = req.clone();
        let previous = hit.digest();
        tokio::spawn(async move {
            this.revalidate(&req, Some(previous)).await;
        });
        Served::new(hit, Source::Cache)
    }

    async fn revalidate(&self, req: &FetchRequest, previous: Option<String>) -> Option<CachedResponse> {
        match self.fetcher.fetch(req).await {
            Ok(resp) => {
                self.store_if_ok(req, &resp);
                if let Some(previous) = previous {
                    let changed = resp.is_ok() && resp.digest() != previous;
                    debug!(url = %req.url, status = resp.status, changed, "revalidated");
                }
                Some(resp)
            }
            Err(e) => {
                if previous.is_none() {
                    warn!(url = %req.url, kind = e.code.as_str(), "offline with nothing cached");
                }
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "strategy_tests.rs"]
mod tests;
