// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use reqwest::Url;

use crate::persist::is_storable;

/// Site shell and libraries cached at install time, relative to the origin
/// unless absolute.
pub const DEFAULT_MANIFEST: &[&str] = &[
    "/",
    "/blog/",
    "/static/css/base.css",
    "/static/blog/css/real-time-notifications.css",
    "/static/blog/css/instant-chat.css",
    "/static/blog/css/chat-center.css",
    "/static/blog/css/mention-autocomplete.css",
    "/static/blog/js/real-time-notifications.js",
    "/static/blog/js/instant-chat.js",
    "/static/blog/js/chat-center.js",
    "/static/blog/js/markdown-preview.js",
    "/static/blog/images/大頭綠.JPG",
    "https://cdn.jsdelivr.net/npm/marked@11.1.1/marked.min.js",
    "https://cdn.jsdelivr.net/gh/highlightjs/cdn-release@11.9.0/build/highlight.min.js",
    "https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/katex.min.js",
    "https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/katex.min.css",
    "https://cdn.jsdelivr.net/npm/mermaid@10.6.1/dist/mermaid.min.js",
];

/// Local caching proxy that applies the site's offline cache rules.
#[derive(Debug, Clone, Parser)]
#[command(name = "rudlive-offline", version, about)]
pub struct OfflineConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "RUDLIVE_OFFLINE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9810, env = "RUDLIVE_OFFLINE_PORT")]
    pub port: u16,

    /// Upstream site the proxy fronts.
    #[arg(long, default_value = "http://127.0.0.1:8000", env = "RUDLIVE_OFFLINE_ORIGIN")]
    pub origin: String,

    /// Cache namespace prefix.
    #[arg(long, default_value = "rudjango", env = "RUDLIVE_OFFLINE_CACHE_PREFIX")]
    pub cache_prefix: String,

    /// Cache version. Changing it discards every older namespace on activation.
    #[arg(long, default_value = "v1.0.0", env = "RUDLIVE_OFFLINE_CACHE_VERSION")]
    pub cache_version: String,

    /// Page served to HTML navigations when offline with nothing cached.
    #[arg(long, default_value = "/offline/", env = "RUDLIVE_OFFLINE_URL")]
    pub offline_url: String,

    /// JSON file with a list of URLs replacing the built-in install manifest.
    #[arg(long, env = "RUDLIVE_OFFLINE_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// Directory the caches persist in across restarts.
    #[arg(long, default_value = ".rudlive-offline", env = "RUDLIVE_OFFLINE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Deadline for each upstream request in milliseconds.
    #[arg(long, default_value_t = 10000, env = "RUDLIVE_OFFLINE_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Log format (json or text).
    #[arg(long, default_value = "text", env = "RUDLIVE_OFFLINE_LOG_FORMAT")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "RUDLIVE_OFFLINE_LOG_LEVEL")]
    pub log_level: String,
}

impl OfflineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let origin = self.origin_url()?;
        if !matches!(origin.scheme(), "http" | "https") {
            anyhow::bail!("--origin must be an http:// or https:// URL");
        }
        if self.cache_prefix.is_empty() || self.cache_version.is_empty() {
            anyhow::bail!("--cache-prefix and --cache-version must not be empty");
        }
        if !is_storable(&self.namespace()) {
            anyhow::bail!("--cache-prefix and --cache-version must not contain path separators");
        }
        if !self.offline_url.starts_with('/') {
            anyhow::bail!("--offline-url must be a path starting with '/'");
        }
        if self.request_timeout_ms == 0 {
            anyhow::bail!("--request-timeout-ms must be greater than zero");
        }
        Ok(())
    }

    /// Versioned cache namespace, e.g. `rudjango-v1.0.0`.
    pub fn namespace(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.cache_version)
    }

    pub fn origin_url(&self) -> anyhow::Result<Url> {
        Ok(Url::parse(&self.origin)?)
    }

    pub fn offline_page(&self) -> anyhow::Result<Url> {
        Ok(self.origin_url()?.join(&self.offline_url)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Install manifest resolved against the origin.
    ///
    /// The offline page is always included so the fallback is available
    /// after a successful install.
    pub fn load_manifest(&self) -> anyhow::Result<Vec<Url>> {
        let entries: Vec<String> = match &self.manifest {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                serde_json::from_str(&contents)?
            }
            None => DEFAULT_MANIFEST.iter().map(|s| (*s).to_owned()).collect(),
        };
        let origin = self.origin_url()?;
        let mut urls = entries
            .iter()
            .map(|entry| origin.join(entry))
            .collect::<Result<Vec<_>, _>>()?;
        let offline = self.offline_page()?;
        if !urls.contains(&offline) {
            urls.push(offline);
        }
        Ok(urls)
    }

    /// Defaults suitable for tests.
    pub fn test() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            origin: "http://site.test".into(),
            cache_prefix: "rudjango".into(),
            cache_version: "v1.0.0".into(),
            offline_url: "/offline/".into(),
            manifest: None,
            cache_dir: None,
            request_timeout_ms: 2000,
            log_format: "text".into(),
            log_level: "debug".into(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
