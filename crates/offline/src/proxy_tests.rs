// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::http::header::{ACCEPT, UPGRADE};
use axum::http::{HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};

use super::*;
use crate::cache::CacheStorage;
use crate::lifecycle::{WorkerSettings, WorkerState};
use crate::test_support::{url, AnyhowExt, FakeFetcher};

const CSS: &str = "http://s.test/static/css/base.css";
const OFFLINE: &str = "http://s.test/offline/";

async fn server() -> anyhow::Result<(TestServer, Arc<ProxyState>, Arc<FakeFetcher>)> {
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.route(CSS, CachedResponse::new(200, vec![("content-type".into(), "text/css".into())], "a{}"));
    fetcher.page(OFFLINE, "offline");

    let settings = WorkerSettings {
        origin: url("http://s.test/"),
        namespace: "rudjango-v1.0.0".into(),
        offline_page: url(OFFLINE),
        manifest: vec![url(CSS), url(OFFLINE)],
    };
    let worker = Worker::new(settings, CacheStorage::new(), fetcher.clone());
    worker.start().await;

    let state = Arc::new(ProxyState { worker, fetcher: fetcher.clone(), origin: url("http://s.test/") });
    let server = TestServer::new(build_router(Arc::clone(&state))).anyhow()?;
    Ok((server, state, fetcher))
}

fn source(resp: &axum_test::TestResponse) -> Option<String> {
    resp.headers().get(SOURCE_HEADER).and_then(|v| v.to_str().ok()).map(str::to_owned)
}

#[tokio::test]
async fn status_reports_activated_namespace() -> anyhow::Result<()> {
    let (server, state, _) = server().await?;
    assert_eq!(state.worker.state(), WorkerState::Activated);

    let resp = server.get("/__offline/status").await;
    resp.assert_status(StatusCode::OK);
    let body: Value = resp.json();
    assert_eq!(body["state"], "activated");
    assert_eq!(body["namespace"], "rudjango-v1.0.0");
    assert_eq!(body["caches"][0]["entries"], 2);
    Ok(())
}

#[tokio::test]
async fn static_assets_served_from_cache_offline() -> anyhow::Result<()> {
    let (server, _, fetcher) = server().await?;
    fetcher.set_online(false);

    let resp = server.get("/static/css/base.css").await;
    resp.assert_status(StatusCode::OK);
    assert_eq!(resp.text(), "a{}");
    assert_eq!(source(&resp).as_deref(), Some("cache"));
    assert_eq!(resp.headers().get("content-type").and_then(|v| v.to_str().ok()), Some("text/css"));
    Ok(())
}

#[tokio::test]
async fn uncached_navigation_offline_gets_offline_page() -> anyhow::Result<()> {
    let (server, _, fetcher) = server().await?;
    fetcher.set_online(false);

    let resp = server
        .get("/blog/articles/42/")
        .add_header(ACCEPT, HeaderValue::from_static("text/html"))
        .await;
    resp.assert_status(StatusCode::OK);
    assert_eq!(resp.text(), "offline");
    assert_eq!(source(&resp).as_deref(), Some("offline-page"));

    let api = server.get("/blog/articles/42/").await;
    api.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn api_requests_pass_through() -> anyhow::Result<()> {
    let (server, state, fetcher) = server().await?;
    let counts = "http://s.test/blog/api/notifications/count/";
    fetcher.route(counts, CachedResponse::new(200, vec![], r#"{"success":true}"#));

    let resp = server.get("/blog/api/notifications/count/").await;
    resp.assert_status(StatusCode::OK);
    assert_eq!(source(&resp).as_deref(), Some("passthrough"));
    assert_eq!(state.worker.cache().get("rudjango-v1.0.0", counts), None);

    fetcher.set_online(false);
    let down = server.get("/blog/api/notifications/count/").await;
    down.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(down.json::<Value>()["error"]["code"], "NETWORK");
    Ok(())
}

#[tokio::test]
async fn posts_are_forwarded_uncached() -> anyhow::Result<()> {
    let (server, state, fetcher) = server().await?;
    let resp = server.post("/blog/articles/1/like/").text("x").await;
    assert_eq!(source(&resp).as_deref(), Some("passthrough"));
    assert!(fetcher.calls().contains(&"http://s.test/blog/articles/1/like/".to_owned()));
    assert_eq!(state.worker.cache().len("rudjango-v1.0.0"), 2);
    Ok(())
}

#[tokio::test]
async fn upgrades_are_refused() -> anyhow::Result<()> {
    let (server, _, _) = server().await?;
    let resp = server
        .get("/ws/notifications/")
        .add_header(UPGRADE, HeaderValue::from_static("websocket"))
        .await;
    resp.assert_status(StatusCode::NOT_IMPLEMENTED);
    Ok(())
}

#[tokio::test]
async fn cache_urls_message() -> anyhow::Result<()> {
    let (server, state, fetcher) = server().await?;
    fetcher.page("http://s.test/blog/articles/8/", "eight");

    let resp = server
        .post("/__offline/message")
        .json(&json!({"type": "CACHE_URLS", "urls": ["/blog/articles/8/"]}))
        .await;
    resp.assert_status(StatusCode::OK);
    assert_eq!(resp.json::<Value>(), json!({"result": "cached", "count": 1}));
    assert!(state.worker.cache().get("rudjango-v1.0.0", "http://s.test/blog/articles/8/").is_some());

    let skip = server.post("/__offline/message").json(&json!({"type": "SKIP_WAITING"})).await;
    assert_eq!(skip.json::<Value>(), json!({"result": "already_active"}));
    Ok(())
}

#[tokio::test]
async fn push_and_click_endpoints() -> anyhow::Result<()> {
    let (server, _, _) = server().await?;

    let garbage = server.post("/__offline/push").text("not json").await;
    assert_eq!(garbage.json::<Value>()["title"], "RuDjango");

    let shown = server.post("/__offline/push").json(&json!({"message": "hi", "url": "/x/"})).await;
    let body: Value = shown.json();
    assert_eq!(body["body"], "hi");
    assert_eq!(body["url"], "/x/");

    let click = server
        .post("/__offline/click")
        .json(&json!({"url": "/x/", "clients": [{"id": "w1", "url": "/x/"}]}))
        .await;
    assert_eq!(click.json::<Value>(), json!({"action": "focus", "id": "w1"}));

    let open = server.post("/__offline/click").json(&json!({})).await;
    assert_eq!(open.json::<Value>(), json!({"action": "open", "url": "/blog/notifications/"}));
    Ok(())
}

#[tokio::test]
async fn scheme_relative_target_stays_on_origin() -> anyhow::Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (_, state, fetcher) = server().await?;
    fetcher.route("http://evil.test/secret", CachedResponse::text(200, "secret"));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, build_router(state)).await;
    });

    let mut stream = tokio::net::TcpStream::connect(addr).await?;
    stream
        .write_all(b"GET //evil.test/secret HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n")
        .await?;
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await?;

    assert!(!raw.contains("\r\n\r\nsecret"), "foreign body served: {raw}");
    assert!(fetcher.calls().iter().all(|u| u.starts_with("http://s.test/")), "{:?}", fetcher.calls());
    assert_eq!(fetcher.call_count("http://s.test//evil.test/secret"), 1);
    Ok(())
}
