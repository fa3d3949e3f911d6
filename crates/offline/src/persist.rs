// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk cache layout: one directory per namespace holding an
//! `entries.json` index and one body file per entry.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::{hex_sha256, CachedResponse, Namespace};

const INDEX: &str = "entries.json";

#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    key: String,
    status: u16,
    #[serde(default)]
    headers: Vec<(String, String)>,
    body: String,
}

/// Whether a namespace name can be used as a directory name.
pub fn is_storable(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Body file for a cache key. Derived from the key, never read from the index.
fn body_file(key: &str) -> String {
    format!("{}.body", hex_sha256(key.as_bytes()))
}

/// Load every namespace under `dir`, creating `dir` if missing.
///
/// An unreadable namespace is skipped with a warning; a missing body drops
/// only its entry.
pub fn load_all(dir: &Path) -> anyhow::Result<BTreeMap<String, Namespace>> {
    std::fs::create_dir_all(dir)?;
    let mut namespaces = BTreeMap::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else { continue };
        match load_namespace(&entry.path()) {
            Ok(ns) => {
                namespaces.insert(name, ns);
            }
            Err(e) => warn!(namespace = %name, err = %e, "skipping unreadable cache"),
        }
    }
    Ok(namespaces)
}

fn load_namespace(path: &Path) -> anyhow::Result<Namespace> {
    let index: Vec<IndexEntry> = match std::fs::read_to_string(path.join(INDEX)) {
        Ok(contents) => serde_json::from_str(&contents)?,
        Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    let mut ns = Namespace::new();
    for entry in index {
        let file = body_file(&entry.key);
        if entry.body != file {
            warn!(key = %entry.key, "cache index names a foreign body file");
            continue;
        }
        match std::fs::read(path.join(&file)) {
            Ok(body) => {
                ns.insert(entry.key, CachedResponse::new(entry.status, entry.headers, body));
            }
            Err(e) => warn!(key = %entry.key, err = %e, "cache body missing"),
        }
    }
    Ok(ns)
}

/// Write the bodies of `changed`, then the full index of `ns`.
pub fn save(dir: &Path, name: &str, ns: &Namespace, changed: &[String]) -> anyhow::Result<()> {
    let path = dir.join(name);
    std::fs::create_dir_all(&path)?;
    for key in changed {
        if let Some(resp) = ns.get(key) {
            write_atomic(&path.join(body_file(key)), &resp.body)?;
        }
    }
    let index: Vec<IndexEntry> = ns
        .iter()
        .map(|(key, resp)| IndexEntry {
            key: key.clone(),
            status: resp.status,
            headers: resp.headers.clone(),
            body: body_file(key),
        })
        .collect();
    write_atomic(&path.join(INDEX), serde_json::to_string(&index)?.as_bytes())
}

pub fn remove(dir: &Path, name: &str) -> anyhow::Result<()> {
    match std::fs::remove_dir_all(dir.join(name)) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Write tmp + rename. The temp name is unique per process and call.
fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("{}.{seq}.tmp", std::process::id()));
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
