// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local caching proxy: runs every request through the worker, forwards
//! what it does not intercept.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, UPGRADE};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::cache::CachedResponse;
use crate::lifecycle::{Worker, WorkerMessage};
use crate::network::{is_hop_by_hop, FetchRequest, Fetcher};
use crate::push::{click_target, parse_push, ClientWindow};

/// Largest request body forwarded upstream.
const MAX_BODY: usize = 8 * 1024 * 1024;

pub const SOURCE_HEADER: &str = "x-offline-source";

pub struct ProxyState {
    pub worker: Worker,
    pub fetcher: Arc<dyn Fetcher>,
    pub origin: Url,
}

pub fn build_router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/__offline/status", get(status))
        .route("/__offline/message", post(message))
        .route("/__offline/push", post(push))
        .route("/__offline/click", post(click))
        .fallback(proxy)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ClickRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub clients: Vec<ClientWindow>,
}

/// `GET /__offline/status`
async fn status(State(s): State<Arc<ProxyState>>) -> impl IntoResponse {
    Json(s.worker.status())
}

/// `POST /__offline/message`: a page posting to the worker.
async fn message(
    State(s): State<Arc<ProxyState>>,
    Json(msg): Json<WorkerMessage>,
) -> impl IntoResponse {
    Json(s.worker.on_message(msg).await)
}

/// `POST /__offline/push`: raw push payload in, notification out.
async fn push(body: Bytes) -> impl IntoResponse {
    Json(parse_push(Some(&body)))
}

/// `POST /__offline/click`
async fn click(Json(req): Json<ClickRequest>) -> impl IntoResponse {
    Json(click_target(req.url.as_deref(), &req.clients))
}

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": { "code": code, "message": message.into() } }))).into_response()
}

fn into_response(cached: CachedResponse, source: &'static str) -> Response {
    let mut resp = Response::new(Body::from(cached.body));
    *resp.status_mut() = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let headers = resp.headers_mut();
    for (name, value) in &cached.headers {
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case(CONTENT_LENGTH.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) =
            (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value))
        {
            headers.append(name, value);
        }
    }
    headers.insert(SOURCE_HEADER, HeaderValue::from_static(source));
    resp
}

/// Fallback for every other path.
async fn proxy(State(s): State<Arc<ProxyState>>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    if parts.headers.contains_key(UPGRADE) {
        warn!(uri = %parts.uri, "connection upgrades are not tunneled");
        return error_response(
            StatusCode::NOT_IMPLEMENTED,
            "UPGRADE_UNSUPPORTED",
            "connect WebSockets to the origin directly",
        );
    }

    // Only path and query come from the request; a scheme-relative target
    // must not move the request to another host.
    let mut url = s.origin.clone();
    url.set_path(parts.uri.path());
    url.set_query(parts.uri.query());
    let body = match to_bytes(body, MAX_BODY).await {
        Ok(body) => body,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, "BAD_REQUEST", e.to_string()),
    };
    let fetch = FetchRequest { method: parts.method, url, headers: parts.headers, body };

    if let Some(served) = s.worker.handle(&fetch).await {
        return into_response(served.response, served.source.as_str());
    }

    debug!(method = %fetch.method, url = %fetch.url, "forwarding");
    match s.fetcher.fetch(&fetch).await {
        Ok(resp) => into_response(resp, "passthrough"),
        Err(e) => {
            warn!(url = %fetch.url, kind = e.code.as_str(), err = %e, "upstream unreachable");
            error_response(StatusCode::BAD_GATEWAY, e.code.as_str(), e.message)
        }
    }
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;
