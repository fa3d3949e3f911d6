// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the site's JSON endpoints.

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::error::{ErrorCode, FetchError};
use crate::notify::msg::{CountsResponse, UserProfile, UserResponse};

pub const COUNTS_PATH: &str = "/blog/api/notifications/count/";

pub fn user_path(username: &str) -> String {
    format!("/blog/api/user/{username}/")
}

/// The site endpoints the notification client depends on.
pub trait SiteApi: Send + Sync {
    /// Fetch unread counts and the most recent notifications.
    fn fetch_counts(&self) -> BoxFuture<'_, Result<CountsResponse, FetchError>>;

    /// Look up a user's public profile. `Ok(None)` when the site reports no such user.
    fn fetch_user<'a>(&'a self, username: &'a str)
        -> BoxFuture<'a, Result<Option<UserProfile>, FetchError>>;
}

/// Authenticated client for one site.
pub struct SiteClient {
    base_url: String,
    client: Client,
}

impl SiteClient {
    pub fn new(base_url: &str, cookie: Option<&str>, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        if let Some(cookie) = cookie {
            headers.insert(COOKIE, HeaderValue::from_str(cookie)?);
        }
        let client = Client::builder().timeout(timeout).default_headers(headers).build()?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_owned(), client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let resp = self.client.get(self.url(path)).send().await.map_err(|e| {
            let err = FetchError::from_reqwest(&e);
            tracing::debug!(path, kind = err.code.as_str(), err = %e, "request failed");
            err
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::new(ErrorCode::BadStatus, format!("{path} returned {status}")));
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::new(ErrorCode::Malformed, format!("{path}: {e}")))
    }
}

impl SiteApi for SiteClient {
    fn fetch_counts(&self) -> BoxFuture<'_, Result<CountsResponse, FetchError>> {
        Box::pin(self.get_json(COUNTS_PATH))
    }

    fn fetch_user<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, Result<Option<UserProfile>, FetchError>> {
        Box::pin(async move {
            let resp: UserResponse = self.get_json(&user_path(username)).await?;
            Ok(if resp.success { resp.user } else { None })
        })
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
