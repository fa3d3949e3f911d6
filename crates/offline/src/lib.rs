// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod cache;
pub mod config;
pub mod lifecycle;
pub mod network;
pub mod persist;
pub mod proxy;
pub mod push;
pub mod route;
pub mod strategy;
pub mod test_support;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::CacheStorage;
use crate::config::OfflineConfig;
use crate::lifecycle::{Worker, WorkerSettings};
use crate::network::{Fetcher, OriginFetcher};
use crate::proxy::{build_router, ProxyState};

/// Install and activate the worker, then serve the caching proxy until shutdown.
pub async fn run(config: OfflineConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    rudlive::spawn_signal_handler(shutdown.clone());

    let origin = config.origin_url()?;
    let settings = WorkerSettings {
        origin: origin.clone(),
        namespace: config.namespace(),
        offline_page: config.offline_page()?,
        manifest: config.load_manifest()?,
    };
    let fetcher: Arc<dyn Fetcher> = Arc::new(OriginFetcher::new(config.request_timeout())?);
    let cache = match &config.cache_dir {
        Some(dir) => CacheStorage::persistent(dir)?,
        None => {
            info!("no cache directory, caches last only as long as this process");
            CacheStorage::new()
        }
    };
    let worker = Worker::new(settings, cache, Arc::clone(&fetcher));
    worker.start().await;

    let state = Arc::new(ProxyState { worker, fetcher, origin });
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, origin = %config.origin, namespace = %config.namespace(), "offline proxy listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
