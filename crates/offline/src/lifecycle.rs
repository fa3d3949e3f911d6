// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker lifecycle: install the manifest, activate the current namespace,
//! then route intercepted requests to a strategy.

use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::Mutex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use rudlive::error::{ErrorCode, FetchError};

use crate::cache::{CacheStorage, NamespaceInfo};
use crate::network::{FetchRequest, Fetcher};
use crate::route::{classify, Route};
use crate::strategy::{Served, Strategies};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Installing,
    /// Installed and waiting to activate.
    Installed,
    Activating,
    Activated,
}

/// Messages a page may post to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    SkipWaiting,
    CacheUrls {
        #[serde(default)]
        urls: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MessageOutcome {
    Activated { deleted: Vec<String> },
    AlreadyActive,
    Cached { count: usize },
    CacheFailed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub namespace: String,
    pub caches: Vec<NamespaceInfo>,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub origin: Url,
    pub namespace: String,
    pub offline_page: Url,
    pub manifest: Vec<Url>,
}

pub struct Worker {
    settings: WorkerSettings,
    cache: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
    strategies: Strategies,
    state: Mutex<WorkerState>,
}

impl Worker {
    pub fn new(settings: WorkerSettings, cache: CacheStorage, fetcher: Arc<dyn Fetcher>) -> Self {
        let strategies = Strategies::new(
            cache.clone(),
            Arc::clone(&fetcher),
            settings.namespace.clone(),
            settings.offline_page.as_str(),
        );
        Self { settings, cache, fetcher, strategies, state: Mutex::new(WorkerState::Installing) }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
        debug!(?state, namespace = %self.settings.namespace, "worker state");
    }

    pub fn namespace(&self) -> &str {
        &self.settings.namespace
    }

    pub fn cache(&self) -> &CacheStorage {
        &self.cache
    }

    /// Fetch and store every URL, or store none of them.
    pub async fn add_all(&self, urls: &[Url]) -> Result<usize, FetchError> {
        let fetches = urls.iter().map(|url| async move {
            let req = FetchRequest::get(url.clone());
            let resp = self.fetcher.fetch(&req).await?;
            if !(200..300).contains(&resp.status) {
                return Err(FetchError::new(
                    ErrorCode::BadStatus,
                    format!("{url} returned {}", resp.status),
                ));
            }
            Ok((url.as_str().to_owned(), resp))
        });
        let entries = join_all(fetches).await.into_iter().collect::<Result<Vec<_>, _>>()?;
        let count = entries.len();
        self.cache.put_all(&self.settings.namespace, entries);
        Ok(count)
    }

    /// Precache the manifest. A failed install is logged and the worker
    /// still moves on, so the site keeps working online.
    pub async fn install(&self) {
        self.set_state(WorkerState::Installing);
        self.cache.open(&self.settings.namespace);
        match self.add_all(&self.settings.manifest).await {
            Ok(count) => info!(count, namespace = %self.settings.namespace, "precached manifest"),
            Err(e) => error!(kind = e.code.as_str(), err = %e, "cache installation failed"),
        }
        self.set_state(WorkerState::Installed);
    }

    /// Delete every namespace except the current one. Returns the deleted names.
    pub fn activate(&self) -> Vec<String> {
        self.set_state(WorkerState::Activating);
        let deleted: Vec<String> = self
            .cache
            .names()
            .into_iter()
            .filter(|name| *name != self.settings.namespace)
            .filter(|name| self.cache.delete(name))
            .collect();
        for name in &deleted {
            info!(namespace = %name, "deleted old cache");
        }
        self.set_state(WorkerState::Activated);
        deleted
    }

    /// Install then activate at once. Waiting is always skipped.
    pub async fn start(&self) -> Vec<String> {
        self.install().await;
        self.activate()
    }

    /// Serve an intercepted request. `None` means the request is not
    /// intercepted and goes to the network untouched.
    pub async fn handle(&self, req: &FetchRequest) -> Option<Served> {
        if self.state() != WorkerState::Activated {
            return None;
        }
        match classify(&req.method, &req.url) {
            Route::Bypass(reason) => {
                debug!(url = %req.url, ?reason, "bypass");
                None
            }
            Route::Handle { class, strategy } => {
                let served = self.strategies.serve(strategy, req).await;
                debug!(
                    url = %req.url,
                    ?class,
                    ?strategy,
                    status = served.response.status,
                    source = served.source.as_str(),
                    "served"
                );
                Some(served)
            }
        }
    }

    pub async fn on_message(&self, message: WorkerMessage) -> MessageOutcome {
        debug!(?message, "message received");
        match message {
            WorkerMessage::SkipWaiting => match self.state() {
                WorkerState::Installed => MessageOutcome::Activated { deleted: self.activate() },
                _ => MessageOutcome::AlreadyActive,
            },
            WorkerMessage::CacheUrls { urls } => {
                let resolved = urls
                    .iter()
                    .map(|u| self.settings.origin.join(u))
                    .collect::<Result<Vec<_>, _>>();
                let resolved = match resolved {
                    Ok(resolved) => resolved,
                    Err(e) => return MessageOutcome::CacheFailed { error: e.to_string() },
                };
                match self.add_all(&resolved).await {
                    Ok(count) => MessageOutcome::Cached { count },
                    Err(e) => {
                        error!(err = %e, "caching requested urls failed");
                        MessageOutcome::CacheFailed { error: e.to_string() }
                    }
                }
            }
        }
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            state: self.state(),
            namespace: self.settings.namespace.clone(),
            caches: self.cache.summary(),
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
