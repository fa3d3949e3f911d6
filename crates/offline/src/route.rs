// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request classification: which caching strategy, if any, handles a request.

use std::sync::LazyLock;

use axum::http::Method;
use regex::Regex;
use reqwest::Url;
use serde::Serialize;

const STATIC_EXTENSIONS: &[&str] =
    &[".css", ".js", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".woff", ".woff2", ".ttf", ".eot"];

const STATIC_PREFIXES: &[&str] = &["/static/", "/media/"];

static ARTICLE_PAGE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"/blog/articles/\d+/").ok());

/// What kind of resource a URL names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    Static,
    Article,
    Listing,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

/// Why a request is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bypass {
    NonGet,
    WebSocket,
    /// API path other than article content.
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Bypass(Bypass),
    Handle { class: ResourceClass, strategy: Strategy },
}

impl ResourceClass {
    pub fn of(url: &Url) -> Self {
        let path = url.path();
        if is_static(path) {
            Self::Static
        } else if ARTICLE_PAGE.as_ref().is_some_and(|re| re.is_match(path)) {
            Self::Article
        } else if path == "/" || path == "/blog/" {
            Self::Listing
        } else {
            Self::Other
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Static => Strategy::CacheFirst,
            Self::Article | Self::Other => Strategy::NetworkFirst,
            Self::Listing => Strategy::StaleWhileRevalidate,
        }
    }
}

fn is_static(path: &str) -> bool {
    STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
        || STATIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Decide how an intercepted request is served.
pub fn classify(method: &Method, url: &Url) -> Route {
    if method != Method::GET {
        return Route::Bypass(Bypass::NonGet);
    }
    if matches!(url.scheme(), "ws" | "wss") {
        return Route::Bypass(Bypass::WebSocket);
    }
    let path = url.path();
    if path.starts_with("/blog/api/") && !path.contains("/articles/") {
        return Route::Bypass(Bypass::Api);
    }
    let class = ResourceClass::of(url);
    Route::Handle { class, strategy: class.strategy() }
}

#[cfg(test)]
#[path = "route_tests.rs"]
mod tests;
