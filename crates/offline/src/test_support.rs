// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for unit and end-to-end tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use reqwest::Url;

use rudlive::error::{ErrorCode, FetchError};

use crate::cache::CachedResponse;
use crate::network::{FetchRequest, Fetcher};

/// Scripted [`Fetcher`]: answers from a URL table while online, fails every
/// request while offline. Unknown URLs answer 404.
pub struct FakeFetcher {
    routes: Mutex<HashMap<String, CachedResponse>>,
    calls: Mutex<Vec<String>>,
    online: AtomicBool,
}

impl Default for FakeFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            online: AtomicBool::new(true),
        }
    }

    pub fn route(&self, url: &str, response: CachedResponse) {
        self.routes.lock().insert(url.to_owned(), response);
    }

    /// Serve `body` as a 200 HTML page.
    pub fn page(&self, url: &str, body: &'static str) {
        self.route(url, html(body));
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// URLs requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|u| *u == url).count()
    }
}

impl Fetcher for FakeFetcher {
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> BoxFuture<'a, Result<CachedResponse, FetchError>> {
        Box::pin(async move {
            let key = request.url.as_str().to_owned();
            self.calls.lock().push(key.clone());
            if !self.online.load(Ordering::SeqCst) {
                return Err(FetchError::new(ErrorCode::Network, "offline"));
            }
            Ok(self
                .routes
                .lock()
                .get(&key)
                .cloned()
                .unwrap_or_else(|| CachedResponse::text(404, "not found")))
        })
    }
}

pub fn html(body: &'static str) -> CachedResponse {
    CachedResponse::new(200, vec![("content-type".into(), "text/html".into())], body)
}

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap_or_else(|e| unreachable!("bad test url {s}: {e}"))
}

/// A GET for an HTML document, as a browser navigation sends it.
pub fn navigation(s: &str) -> FetchRequest {
    FetchRequest::get(url(s)).with_header(reqwest::header::ACCEPT, "text/html,*/*;q=0.8")
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

/// Convert any `Display` error into `anyhow::Error`.
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}
