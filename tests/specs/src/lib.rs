// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end scenarios.
//!
//! Serves an in-process fake of the blogging site (chat and notification
//! WebSockets, the JSON endpoints, a few pages) and runs the live client and
//! the offline proxy against it over real sockets.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use rudlive::error::{ErrorCode, FetchError};
use rudlive_offline::cache::CachedResponse;
use rudlive_offline::network::{FetchRequest, Fetcher, OriginFetcher};

pub use rudlive::test_support::ensure_crypto;

pub const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct SiteInner {
    history: HashMap<String, Vec<Value>>,
    received: Vec<(String, String)>,
    chat_connects: HashMap<String, usize>,
    chat_open: HashMap<String, usize>,
    unread: (u32, u32),
    recent: Vec<Value>,
    users: HashMap<String, Value>,
    notify_socket_down: bool,
    refreshes: usize,
    count_polls: usize,
    pages: HashMap<String, String>,
    next_id: u64,
}

struct SiteState {
    inner: Mutex<SiteInner>,
    pushes: broadcast::Sender<String>,
}

/// A running fake site. The server task stops with the runtime.
pub struct FakeSite {
    addr: SocketAddr,
    state: Arc<SiteState>,
}

impl FakeSite {
    pub async fn start() -> anyhow::Result<Self> {
        let (pushes, _) = broadcast::channel(16);
        let state = Arc::new(SiteState { inner: Mutex::new(SiteInner::default()), pushes });
        let app = Router::new()
            .route("/ws/chat/{peer}/", get(chat_ws))
            .route("/ws/notifications/", get(notify_ws))
            .route("/blog/api/notifications/count/", get(counts))
            .route("/blog/api/user/{username}/", get(user))
            .fallback(page)
            .with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self { addr, state })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Messages the conversation replays on connect, oldest first.
    pub fn set_history(&self, peer: &str, messages: &[(&str, &str)]) {
        let mut inner = self.state.inner.lock();
        let wire = messages
            .iter()
            .map(|(sender, content)| {
                inner.next_id += 1;
                json!({"id": inner.next_id, "sender": sender, "content": content,
                       "timestamp": "2026-10-18T09:00:00Z"})
            })
            .collect();
        inner.history.insert(peer.to_owned(), wire);
    }

    pub fn set_counts(&self, notifications: u32, messages: u32) {
        self.state.inner.lock().unread = (notifications, messages);
    }

    /// Newest first, as the counts endpoint returns them.
    pub fn set_recent(&self, recent: Vec<Value>) {
        self.state.inner.lock().recent = recent;
    }

    pub fn add_user(&self, username: &str, id: u64, display_name: &str) {
        let user = json!({"id": id, "username": username, "display_name": display_name,
                          "avatar_url": format!("/media/avatars/{username}.png")});
        self.state.inner.lock().users.insert(username.to_owned(), user);
    }

    pub fn add_page(&self, path: &str, body: &str) {
        self.state.inner.lock().pages.insert(path.to_owned(), body.to_owned());
    }

    /// Refuse notification socket upgrades from now on.
    pub fn take_notification_socket_down(&self) {
        self.state.inner.lock().notify_socket_down = true;
    }

    /// Push a `notification` frame to every connected notification socket.
    pub fn push_notification(&self, message: &str, link: Option<&str>) {
        let frame = json!({
            "type": "notification",
            "notification": {"icon": "bell", "message": message, "time_since": "just now", "link": link}
        });
        let _ = self.state.pushes.send(frame.to_string());
    }

    /// Chat messages received, as `(peer, content)`.
    pub fn received(&self) -> Vec<(String, String)> {
        self.state.inner.lock().received.clone()
    }

    pub fn open_chat_sockets(&self, peer: &str) -> usize {
        self.state.inner.lock().chat_open.get(peer).copied().unwrap_or(0)
    }

    pub fn chat_connects(&self, peer: &str) -> usize {
        self.state.inner.lock().chat_connects.get(peer).copied().unwrap_or(0)
    }

    pub fn refreshes(&self) -> usize {
        self.state.inner.lock().refreshes
    }

    pub fn count_polls(&self) -> usize {
        self.state.inner.lock().count_polls
    }
}

fn initial_frame(inner: &SiteInner) -> String {
    json!({
        "type": "initial",
        "unread_count": inner.unread.0,
        "unread_messages_count": inner.unread.1,
        "recent_notifications": inner.recent,
    })
    .to_string()
}

async fn chat_ws(
    State(s): State<Arc<SiteState>>,
    Path(peer): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| chat_session(s, peer, socket))
}

async fn chat_session(s: Arc<SiteState>, peer: String, mut socket: WebSocket) {
    let history = {
        let mut inner = s.inner.lock();
        *inner.chat_connects.entry(peer.clone()).or_default() += 1;
        *inner.chat_open.entry(peer.clone()).or_default() += 1;
        inner.history.get(&peer).cloned().unwrap_or_default()
    };
    let frame = json!({"type": "chat_history", "messages": history}).to_string();
    if socket.send(Message::Text(frame.into())).await.is_ok() {
        while let Some(Ok(msg)) = socket.recv().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else { continue };
            if value["type"] != "chat_message" {
                continue;
            }
            let content = value["message"].as_str().unwrap_or_default().to_owned();
            let echo = {
                let mut inner = s.inner.lock();
                inner.next_id += 1;
                inner.received.push((peer.clone(), content.clone()));
                json!({"type": "chat_message", "message": {"id": inner.next_id, "sender": "me",
                       "content": content, "timestamp": "2026-10-18T09:01:00Z"}})
            };
            if socket.send(Message::Text(echo.to_string().into())).await.is_err() {
                break;
            }
        }
    }
    if let Some(open) = s.inner.lock().chat_open.get_mut(&peer) {
        *open = open.saturating_sub(1);
    }
}

async fn notify_ws(State(s): State<Arc<SiteState>>, ws: WebSocketUpgrade) -> Response {
    if s.inner.lock().notify_socket_down {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| notify_session(s, socket))
}

async fn notify_session(s: Arc<SiteState>, mut socket: WebSocket) {
    let mut pushes = s.pushes.subscribe();
    let initial = initial_frame(&s.inner.lock());
    if socket.send(Message::Text(initial.into())).await.is_err() {
        return;
    }
    loop {
        tokio::select! {
            push = pushes.recv() => {
                let Ok(frame) = push else { break };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                let value: Value = serde_json::from_str(text.as_str()).unwrap_or_default();
                let reply = match value["action"].as_str() {
                    Some("ping") => json!({"type": "pong"}).to_string(),
                    Some("refresh") => {
                        let mut inner = s.inner.lock();
                        inner.refreshes += 1;
                        initial_frame(&inner)
                    }
                    _ => continue,
                };
                if socket.send(Message::Text(reply.into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn counts(State(s): State<Arc<SiteState>>) -> Json<Value> {
    let mut inner = s.inner.lock();
    inner.count_polls += 1;
    Json(json!({
        "success": true,
        "unread_count": inner.unread.0,
        "unread_messages_count": inner.unread.1,
        "recent_notifications": inner.recent,
    }))
}

async fn user(State(s): State<Arc<SiteState>>, Path(username): Path<String>) -> Json<Value> {
    match s.inner.lock().users.get(&username) {
        Some(user) => Json(json!({"success": true, "user": user})),
        None => Json(json!({"success": false, "error": "User not found"})),
    }
}

async fn page(State(s): State<Arc<SiteState>>, uri: axum::http::Uri) -> Response {
    match s.inner.lock().pages.get(uri.path()) {
        Some(body) if uri.path().ends_with(".css") => {
            ([("content-type", "text/css")], body.clone()).into_response()
        }
        Some(body) => Html(body.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

/// Real origin fetcher that can be unplugged to simulate losing the network.
pub struct Unpluggable {
    inner: OriginFetcher,
    online: AtomicBool,
}

impl Unpluggable {
    pub fn new() -> anyhow::Result<Self> {
        ensure_crypto();
        Ok(Self { inner: OriginFetcher::new(Duration::from_secs(2))?, online: AtomicBool::new(true) })
    }

    pub fn unplug(&self) {
        self.online.store(false, Ordering::SeqCst);
    }
}

impl Fetcher for Unpluggable {
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> BoxFuture<'a, Result<CachedResponse, FetchError>> {
        if self.online.load(Ordering::SeqCst) {
            self.inner.fetch(request)
        } else {
            Box::pin(async { Err(FetchError::new(ErrorCode::Network, "unplugged")) })
        }
    }
}

/// Poll `check` until it holds or [`TIMEOUT`] passes.
pub async fn wait_for(what: &str, mut check: impl FnMut() -> bool) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !check() {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}

/// Receive broadcast items until one matches, skipping the rest.
pub async fn next_matching<T: Clone>(
    rx: &mut broadcast::Receiver<T>,
    mut pred: impl FnMut(&T) -> bool,
) -> anyhow::Result<T> {
    let fut = async {
        loop {
            match rx.recv().await {
                Ok(item) if pred(&item) => return Ok(item),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => anyhow::bail!("update channel closed"),
            }
        }
    };
    tokio::time::timeout(TIMEOUT, fut).await?
}
