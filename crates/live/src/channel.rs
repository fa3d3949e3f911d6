// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection controller: one reconnecting WebSocket per logical scope.
//!
//! A [`Channel`] is the owner-facing handle. Inbound frames and status
//! transitions are delivered to the owner as [`ScopedEvent`]s over an mpsc
//! sender, in transport order. Sends are never buffered: while the transport
//! is not open, [`Channel::send`] returns `false` and the payload is dropped.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

/// Liveness probe sent on every open channel.
pub const PROBE: &str = r#"{"action":"ping"}"#;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one logical channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    /// The global notification stream.
    Notifications,
    /// A one-to-one conversation with the named peer.
    Chat(String),
}

impl ScopeKey {
    /// Server path for this scope, relative to the WebSocket base.
    pub fn path(&self) -> String {
        match self {
            Self::Notifications => "/ws/notifications/".to_owned(),
            Self::Chat(peer) => format!("/ws/chat/{peer}/"),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notifications => f.write_str("notifications"),
            Self::Chat(peer) => write!(f, "chat:{peer}"),
        }
    }
}

/// Transport state as seen by the owner.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    #[default]
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Status transitions reported to the owning component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Connecting,
    Open,
    /// Transport closed; a reconnect may follow.
    Closed,
    /// Transport failed; a reconnect may follow.
    Error,
    /// Reconnect budget spent. Terminal until the owner reopens.
    Exhausted,
}

impl ChannelStatus {
    /// Short text for a connection indicator.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "online",
            Self::Closed => "offline",
            Self::Error => "connection error",
            Self::Exhausted => "disconnected",
        }
    }
}

/// Something that happened on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Status(ChannelStatus),
    /// A text frame, undecoded.
    Message(String),
}

/// A [`ChannelEvent`] tagged with its source.
///
/// `channel_id` distinguishes a reopened scope from a previous channel on the
/// same scope, so late events from a closed channel can be discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedEvent {
    pub scope: ScopeKey,
    pub channel_id: u64,
    pub event: ChannelEvent,
}

pub type EventTx = mpsc::UnboundedSender<ScopedEvent>;

/// Reconnect and liveness settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPolicy {
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub ping_interval: Duration,
    pub connect_timeout: Duration,
}

impl ChannelPolicy {
    /// Delay before reconnect attempt `attempt` (1-based), or `None` once the
    /// budget is spent.
    pub fn reconnect_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_reconnect_attempts {
            return None;
        }
        Some(self.reconnect_delay)
    }
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(3),
            max_reconnect_attempts: 5,
            ping_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Snapshot of a channel's bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelInfo {
    pub state: TransportState,
    pub reconnect_attempt: u32,
    pub last_activity: Option<Instant>,
    pub exhausted: bool,
}

/// Owner-facing handle for one channel. Dropping it closes the channel.
pub struct Channel {
    scope: ScopeKey,
    id: u64,
    info: Arc<Mutex<ChannelInfo>>,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl Channel {
    /// Create a channel whose transport side is returned as a [`ChannelLink`].
    ///
    /// Openers hand the link to whatever task drives the transport.
    pub fn new(scope: ScopeKey, events: EventTx) -> (Self, ChannelLink) {
        let id = NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed);
        let info = Arc::new(Mutex::new(ChannelInfo::default()));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let link = ChannelLink {
            scope: scope.clone(),
            id,
            info: Arc::clone(&info),
            events,
            outbound: outbound_rx,
            cancel: cancel.clone(),
        };
        (Self { scope, id, info, outbound, cancel }, link)
    }

    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TransportState {
        self.info.lock().state
    }

    pub fn info(&self) -> ChannelInfo {
        *self.info.lock()
    }

    /// Queue a text frame. Returns `false` if the transport is not open.
    pub fn send_text(&self, text: String) -> bool {
        if self.cancel.is_cancelled() || self.state() != TransportState::Open {
            return false;
        }
        self.outbound.send(text).is_ok()
    }

    /// Serialize and queue a JSON payload.
    pub fn send<T: Serialize>(&self, payload: &T) -> bool {
        match serde_json::to_string(payload) {
            Ok(text) => self.send_text(text),
            Err(e) => {
                tracing::warn!(scope = %self.scope, err = %e, "failed to encode outbound payload");
                false
            }
        }
    }

    /// Close the transport and cancel any pending reconnect.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel").field("scope", &self.scope).field("id", &self.id).finish()
    }
}

/// Transport-side half of a [`Channel`].
pub struct ChannelLink {
    scope: ScopeKey,
    id: u64,
    info: Arc<Mutex<ChannelInfo>>,
    events: EventTx,
    outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
}

impl ChannelLink {
    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Deliver an event to the owner. Ignored once the owner has gone.
    pub fn emit(&self, event: ChannelEvent) {
        let _ = self.events.send(ScopedEvent {
            scope: self.scope.clone(),
            channel_id: self.id,
            event,
        });
    }

    pub fn set_state(&self, state: TransportState) {
        self.info.lock().state = state;
    }

    /// Record a state change and report it.
    pub fn transition(&self, state: TransportState, status: ChannelStatus) {
        self.set_state(state);
        self.emit(ChannelEvent::Status(status));
    }

    /// Mark the transport open and reset the retry counter.
    pub fn opened(&self) {
        {
            let mut info = self.info.lock();
            info.state = TransportState::Open;
            info.reconnect_attempt = 0;
            info.last_activity = Some(Instant::now());
        }
        self.emit(ChannelEvent::Status(ChannelStatus::Open));
    }

    /// Deliver an inbound text frame.
    pub fn inbound(&self, text: String) {
        self.info.lock().last_activity = Some(Instant::now());
        self.emit(ChannelEvent::Message(text));
    }

    /// Count one more failed connection; returns the new attempt number.
    pub fn bump_attempt(&self) -> u32 {
        let mut info = self.info.lock();
        info.reconnect_attempt += 1;
        info.reconnect_attempt
    }

    pub fn exhausted(&self) {
        {
            let mut info = self.info.lock();
            info.state = TransportState::Closed;
            info.exhausted = true;
        }
        self.emit(ChannelEvent::Status(ChannelStatus::Exhausted));
    }

    /// Take the next outbound frame, if any is already queued.
    pub fn try_next_outbound(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }

    /// Drain every queued outbound frame.
    pub fn drain_outbound(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Some(frame) = self.try_next_outbound() {
            frames.push(frame);
        }
        frames
    }
}

/// Factory seam between owners and the transport.
pub trait ChannelOpener: Send + Sync {
    fn open(&self, scope: ScopeKey, events: EventTx) -> Channel;
}

/// Opens real WebSocket channels against the site.
#[derive(Debug, Clone)]
pub struct WsOpener {
    ws_base: String,
    cookie: Option<String>,
    policy: ChannelPolicy,
}

impl WsOpener {
    pub fn new(site_url: &str, cookie: Option<String>, policy: ChannelPolicy) -> Self {
        Self { ws_base: ws_base_url(site_url), cookie, policy }
    }

    pub fn url_for(&self, scope: &ScopeKey) -> String {
        format!("{}{}", self.ws_base, scope.path())
    }
}

impl ChannelOpener for WsOpener {
    fn open(&self, scope: ScopeKey, events: EventTx) -> Channel {
        let url = self.url_for(&scope);
        let (channel, link) = Channel::new(scope, events);
        tokio::spawn(run_socket(url, self.cookie.clone(), self.policy, link));
        channel
    }
}

/// Convert an HTTP base URL into the matching WebSocket base.
pub fn ws_base_url(site_url: &str) -> String {
    let base = site_url.trim_end_matches('/');
    if base.starts_with("https://") {
        base.replacen("https://", "wss://", 1)
    } else {
        base.replacen("http://", "ws://", 1)
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(url: &str, cookie: Option<&str>) -> anyhow::Result<WsStream> {
    let mut request = url.into_client_request()?;
    if let Some(cookie) = cookie {
        request.headers_mut().insert(header::COOKIE, HeaderValue::from_str(cookie)?);
    }
    let (stream, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

/// How a connected session ended.
enum SessionEnd {
    Cancelled,
    Closed,
    Failed,
}

/// Drive one channel until it is closed by the owner or exhausts its retries.
async fn run_socket(url: String, cookie: Option<String>, policy: ChannelPolicy, mut link: ChannelLink) {
    let cancel = link.cancel_token().clone();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        link.transition(TransportState::Connecting, ChannelStatus::Connecting);
        let attempt = tokio::time::timeout(policy.connect_timeout, connect(&url, cookie.as_deref()));
        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = attempt => outcome,
        };

        let failed = match outcome {
            Ok(Ok(stream)) => {
                tracing::debug!(scope = %link.scope(), "channel open");
                link.opened();
                match pump(stream, &policy, &mut link).await {
                    SessionEnd::Cancelled => break,
                    SessionEnd::Closed => false,
                    SessionEnd::Failed => true,
                }
            }
            Ok(Err(e)) => {
                tracing::debug!(scope = %link.scope(), err = %e, kind = "network", "channel connect failed");
                true
            }
            Err(_) => {
                tracing::debug!(scope = %link.scope(), kind = "timeout", "channel connect timed out");
                true
            }
        };

        session_ended(&mut link, failed);

        let attempt = link.bump_attempt();
        match policy.reconnect_after(attempt) {
            Some(delay) => {
                tracing::debug!(
                    scope = %link.scope(),
                    attempt,
                    max = policy.max_reconnect_attempts,
                    "reconnecting in {delay:?}"
                );
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => {
                tracing::warn!(scope = %link.scope(), "reconnect attempts exhausted");
                link.exhausted();
                return;
            }
        }
    }

    link.set_state(TransportState::Closed);
}

/// Report the end of a session and drop frames it never wrote.
///
/// Sends are not buffered across connections; returns how many were dropped.
fn session_ended(link: &mut ChannelLink, failed: bool) -> usize {
    let status = if failed { ChannelStatus::Error } else { ChannelStatus::Closed };
    link.transition(TransportState::Closed, status);
    let dropped = link.drain_outbound().len();
    if dropped > 0 {
        tracing::debug!(scope = %link.scope(), dropped, "discarding unsent frames");
    }
    dropped
}

/// Shuttle frames between the socket and the owner while connected.
async fn pump(stream: WsStream, policy: &ChannelPolicy, link: &mut ChannelLink) -> SessionEnd {
    let cancel = link.cancel_token().clone();
    let (mut write, mut read) = stream.split();
    let mut probe =
        tokio::time::interval_at(Instant::now() + policy.ping_interval, policy.ping_interval);
    probe.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                link.set_state(TransportState::Closing);
                let _ = write.send(Message::Close(None)).await;
                return SessionEnd::Cancelled;
            }
            Some(text) = link.outbound.recv() => {
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    tracing::debug!(scope = %link.scope(), err = %e, "channel write failed");
                    return SessionEnd::Failed;
                }
            }
            _ = probe.tick() => {
                if let Err(e) = write.send(Message::Text(PROBE.into())).await {
                    tracing::debug!(scope = %link.scope(), err = %e, "liveness probe failed");
                    return SessionEnd::Failed;
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => link.inbound(text.to_string()),
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(scope = %link.scope(), "channel closed by server");
                        return SessionEnd::Closed;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(scope = %link.scope(), err = %e, "channel read error");
                        return SessionEnd::Failed;
                    }
                    _ => {} // ping/pong/binary ignored
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
