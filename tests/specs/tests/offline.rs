// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The offline proxy in front of the fake site: precache, browse online,
//! then lose the network.

use std::sync::Arc;

use reqwest::header::ACCEPT;
use reqwest::Url;

use rudlive_offline::cache::CacheStorage;
use rudlive_offline::lifecycle::{Worker, WorkerSettings};
use rudlive_offline::proxy::{build_router, ProxyState, SOURCE_HEADER};
use rudlive_specs::{ensure_crypto, wait_for, FakeSite, Unpluggable};

struct Proxy {
    base: String,
    fetcher: Arc<Unpluggable>,
    cache: CacheStorage,
    client: reqwest::Client,
}

impl Proxy {
    async fn get(&self, path: &str, html: bool) -> anyhow::Result<(u16, String, String)> {
        let mut req = self.client.get(format!("{}{path}", self.base));
        if html {
            req = req.header(ACCEPT, "text/html,application/xhtml+xml,*/*;q=0.8");
        }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let source = resp
            .headers()
            .get(SOURCE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        Ok((status, source, resp.text().await?))
    }
}

async fn start(site: &FakeSite, namespace: &str, cache: CacheStorage) -> anyhow::Result<Proxy> {
    ensure_crypto();
    let origin = Url::parse(&site.base_url())?;
    let manifest = ["/", "/blog/", "/static/css/base.css", "/offline/"]
        .iter()
        .map(|p| origin.join(p))
        .collect::<Result<Vec<_>, _>>()?;
    let settings = WorkerSettings {
        origin: origin.clone(),
        namespace: namespace.to_owned(),
        offline_page: origin.join("/offline/")?,
        manifest,
    };
    let fetcher = Arc::new(Unpluggable::new()?);
    let worker = Worker::new(settings, cache.clone(), fetcher.clone());
    worker.start().await;

    let state = Arc::new(ProxyState { worker, fetcher: fetcher.clone(), origin });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, build_router(state)).await;
    });
    Ok(Proxy { base: format!("http://{addr}"), fetcher, cache, client: reqwest::Client::new() })
}

fn site_pages(site: &FakeSite) {
    site.add_page("/", "<h1>home</h1>");
    site.add_page("/blog/", "<h1>articles</h1>");
    site.add_page("/static/css/base.css", "body { color: #333; }");
    site.add_page("/offline/", "<h1>offline</h1>");
    site.add_page("/blog/articles/1/", "<h1>first article</h1>");
    site.add_page("/blog/articles/2/", "<h1>second article</h1>");
}

#[tokio::test]
async fn reading_survives_losing_the_network() -> anyhow::Result<()> {
    let site = FakeSite::start().await?;
    site_pages(&site);
    let proxy = start(&site, "rudjango-v1.0.0", CacheStorage::new()).await?;
    assert_eq!(proxy.cache.len("rudjango-v1.0.0"), 4);

    let (status, source, online_css) = proxy.get("/static/css/base.css", false).await?;
    assert_eq!((status, source.as_str()), (200, "cache"));

    let (status, source, _) = proxy.get("/blog/articles/1/", true).await?;
    assert_eq!((status, source.as_str()), (200, "network"));

    proxy.fetcher.unplug();

    let (status, _, offline_css) = proxy.get("/static/css/base.css", false).await?;
    assert_eq!(status, 200);
    assert_eq!(offline_css, online_css);

    let (status, source, body) = proxy.get("/blog/articles/1/", true).await?;
    assert_eq!((status, source.as_str(), body.as_str()), (200, "cache", "<h1>first article</h1>"));

    let (status, source, body) = proxy.get("/blog/articles/2/", true).await?;
    assert_eq!((status, source.as_str(), body.as_str()), (200, "offline-page", "<h1>offline</h1>"));

    let (status, source, body) = proxy.get("/blog/", true).await?;
    assert_eq!((status, source.as_str(), body.as_str()), (200, "cache", "<h1>articles</h1>"));

    let (status, source, _) = proxy.get("/blog/api/notifications/count/", false).await?;
    assert_eq!((status, source.as_str()), (502, ""));
    Ok(())
}

#[tokio::test]
async fn listing_is_refreshed_in_the_background() -> anyhow::Result<()> {
    let site = FakeSite::start().await?;
    site_pages(&site);
    let proxy = start(&site, "rudjango-v1.0.0", CacheStorage::new()).await?;

    site.add_page("/blog/", "<h1>articles, updated</h1>");
    let (_, source, body) = proxy.get("/blog/", true).await?;
    assert_eq!((source.as_str(), body.as_str()), ("cache", "<h1>articles</h1>"));

    let key = format!("{}/blog/", site.base_url());
    wait_for("revalidated listing", || {
        proxy
            .cache
            .get("rudjango-v1.0.0", &key)
            .is_some_and(|r| &r.body[..] == b"<h1>articles, updated</h1>")
    })
    .await?;
    let (_, _, body) = proxy.get("/blog/", true).await?;
    assert_eq!(body, "<h1>articles, updated</h1>");
    Ok(())
}

#[tokio::test]
async fn new_version_discards_old_caches() -> anyhow::Result<()> {
    let site = FakeSite::start().await?;
    site_pages(&site);
    let cache = CacheStorage::new();
    let _v1 = start(&site, "rudjango-v1.0.0", cache.clone()).await?;
    assert!(cache.has("rudjango-v1.0.0"));

    let v2 = start(&site, "rudjango-v1.1.0", cache.clone()).await?;
    assert_eq!(cache.names(), vec!["rudjango-v1.1.0".to_owned()]);

    let status: serde_json::Value =
        reqwest::get(format!("{}/__offline/status", v2.base)).await?.json().await?;
    assert_eq!(status["state"], "activated");
    assert_eq!(status["caches"][0]["name"], "rudjango-v1.1.0");
    assert_eq!(status["caches"][0]["entries"], 4);
    Ok(())
}

#[tokio::test]
async fn failed_precache_stores_nothing_but_still_serves() -> anyhow::Result<()> {
    let site = FakeSite::start().await?;
    site.add_page("/", "<h1>home</h1>");
    site.add_page("/blog/articles/1/", "<h1>first article</h1>");
    let proxy = start(&site, "rudjango-v1.0.0", CacheStorage::new()).await?;
    assert_eq!(proxy.cache.len("rudjango-v1.0.0"), 0);

    let (status, source, _) = proxy.get("/blog/articles/1/", true).await?;
    assert_eq!((status, source.as_str()), (200, "network"));
    Ok(())
}
