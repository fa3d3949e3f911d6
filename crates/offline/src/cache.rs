// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named caches keyed by request URL, optionally mirrored to disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use ring::digest;
use serde::Serialize;
use tracing::{info, warn};

use crate::persist;

/// A stored response. Served byte-for-byte as it was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        Self { status, headers, body: body.into() }
    }

    /// Plain-text response produced locally rather than by the origin.
    pub fn text(status: u16, body: &'static str) -> Self {
        Self::new(
            status,
            vec![("content-type".to_owned(), "text/plain; charset=utf-8".to_owned())],
            Bytes::from_static(body.as_bytes()),
        )
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Hex SHA-256 of the body.
    pub fn digest(&self) -> String {
        hex_sha256(&self.body)
    }
}

pub(crate) fn hex_sha256(data: &[u8]) -> String {
    let hash = digest::digest(&digest::SHA256, data);
    hash.as_ref().iter().map(|b| format!("{b:02x}")).collect()
}

pub type Namespace = BTreeMap<String, CachedResponse>;

/// Named cache namespaces, shared between the worker and background
/// revalidation tasks.
///
/// A persistent storage writes every change through to its directory while
/// holding the write lock, so the disk never lags behind a reader. Write
/// failures are logged; memory stays authoritative for this process.
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    inner: Arc<RwLock<BTreeMap<String, Namespace>>>,
    dir: Option<Arc<PathBuf>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceInfo {
    pub name: String,
    pub entries: usize,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage backed by `dir`, starting from whatever earlier runs left there.
    pub fn persistent(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        let namespaces = persist::load_all(&dir)?;
        info!(dir = %dir.display(), namespaces = namespaces.len(), "loaded caches");
        Ok(Self { inner: Arc::new(RwLock::new(namespaces)), dir: Some(Arc::new(dir)) })
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref().map(PathBuf::as_path)
    }

    fn save(&self, namespace: &str, ns: &Namespace, changed: &[String]) {
        let Some(dir) = &self.dir else { return };
        if !persist::is_storable(namespace) {
            warn!(namespace = %namespace, "namespace name cannot be stored on disk");
            return;
        }
        if let Err(e) = persist::save(dir, namespace, ns, changed) {
            warn!(namespace = %namespace, err = %e, "cache write failed");
        }
    }

    /// Create the namespace if missing.
    pub fn open(&self, namespace: &str) {
        let mut guard = self.inner.write();
        if !guard.contains_key(namespace) {
            let ns = guard.entry(namespace.to_owned()).or_default();
            self.save(namespace, ns, &[]);
        }
    }

    pub fn has(&self, namespace: &str) -> bool {
        self.inner.read().contains_key(namespace)
    }

    /// Drop a namespace and everything in it. Returns whether it existed.
    pub fn delete(&self, namespace: &str) -> bool {
        let mut guard = self.inner.write();
        let existed = guard.remove(namespace).is_some();
        if let (true, Some(dir)) = (existed, &self.dir) {
            if persist::is_storable(namespace) {
                if let Err(e) = persist::remove(dir, namespace) {
                    warn!(namespace = %namespace, err = %e, "cache removal failed");
                }
            }
        }
        existed
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    pub fn put(&self, namespace: &str, key: &str, response: CachedResponse) {
        let mut guard = self.inner.write();
        let ns = guard.entry(namespace.to_owned()).or_default();
        ns.insert(key.to_owned(), response);
        self.save(namespace, ns, &[key.to_owned()]);
    }

    /// Store every entry under one lock so readers never observe a partial batch.
    pub fn put_all(&self, namespace: &str, entries: Vec<(String, CachedResponse)>) {
        let changed: Vec<String> = entries.iter().map(|(key, _)| key.clone()).collect();
        let mut guard = self.inner.write();
        let ns = guard.entry(namespace.to_owned()).or_default();
        ns.extend(entries);
        self.save(namespace, ns, &changed);
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<CachedResponse> {
        self.inner.read().get(namespace)?.get(key).cloned()
    }

    /// Look a key up across every namespace, oldest name first.
    pub fn match_any(&self, key: &str) -> Option<CachedResponse> {
        self.inner.read().values().find_map(|ns| ns.get(key).cloned())
    }

    pub fn keys(&self, namespace: &str) -> Vec<String> {
        self.inner
            .read()
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, namespace: &str) -> usize {
        self.inner.read().get(namespace).map_or(0, BTreeMap::len)
    }

    pub fn summary(&self) -> Vec<NamespaceInfo> {
        self.inner
            .read()
            .iter()
            .map(|(name, ns)| NamespaceInfo { name: name.clone(), entries: ns.len() })
            .collect()
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
