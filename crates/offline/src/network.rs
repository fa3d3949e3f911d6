// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound fetches to the origin and third-party hosts.

use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderName, ACCEPT, HOST};
use reqwest::{Client, Method, Url};

use rudlive::error::FetchError;

use crate::cache::CachedResponse;

/// Headers that describe one hop and never travel with a forwarded message.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// A request as intercepted from a page.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self { method: Method::GET, url, headers: HeaderMap::new(), body: Bytes::new() }
    }

    pub fn with_header(mut self, name: HeaderName, value: &'static str) -> Self {
        self.headers.insert(name, reqwest::header::HeaderValue::from_static(value));
        self
    }

    /// Whether the page asked for an HTML document.
    pub fn accepts_html(&self) -> bool {
        self.headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.contains("text/html"))
    }

    /// Cache key: the full URL.
    pub fn key(&self) -> &str {
        self.url.as_str()
    }
}

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Performs network fetches for the cache strategies.
///
/// Any response the server produced, whatever its status, is `Ok`; `Err`
/// means no response arrived at all.
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(&'a self, request: &'a FetchRequest)
        -> BoxFuture<'a, Result<CachedResponse, FetchError>>;
}

/// reqwest-backed fetcher with a per-request deadline.
pub struct OriginFetcher {
    client: Client,
}

impl OriginFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn send(&self, request: &FetchRequest) -> Result<CachedResponse, FetchError> {
        let mut headers = request.headers.clone();
        headers.remove(HOST);
        for name in HOP_BY_HOP {
            headers.remove(*name);
        }

        let resp = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| {
                let err = FetchError::from_reqwest(&e);
                tracing::debug!(url = %request.url, kind = err.code.as_str(), err = %e, "fetch failed");
                err
            })?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_owned(), v.to_owned()))
            })
            .collect();
        let body = resp.bytes().await?;
        Ok(CachedResponse::new(status, headers, body))
    }
}

impl Fetcher for OriginFetcher {
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> BoxFuture<'a, Result<CachedResponse, FetchError>> {
        Box::pin(self.send(request))
    }
}

#[cfg(test)]
#[path = "network_tests.rs"]
mod tests;
