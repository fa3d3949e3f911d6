// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for unit and end-to-end tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use crate::channel::{Channel, ChannelLink, ChannelOpener, EventTx, ScopeKey};
use crate::error::{ErrorCode, FetchError};
use crate::http::SiteApi;
use crate::notify::msg::{CountsResponse, UserProfile};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls. Only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// In-memory [`ChannelOpener`] that records every open.
///
/// Each opened channel's transport half is kept so tests can drive it:
/// mark it open, inject frames, and read what the owner sent.
#[derive(Default)]
pub struct FakeOpener {
    opened: Mutex<Vec<ScopeKey>>,
    links: Mutex<Vec<ChannelLink>>,
    auto_open: bool,
}

impl FakeOpener {
    /// Channels start in `Connecting` until a test calls [`open_link`](Self::open_link).
    pub fn new() -> Self {
        Self::default()
    }

    /// Channels report `Open` as soon as they are created.
    pub fn auto_open() -> Self {
        Self { auto_open: true, ..Self::default() }
    }

    /// Every scope opened so far, in order.
    pub fn opened(&self) -> Vec<ScopeKey> {
        self.opened.lock().clone()
    }

    pub fn open_count(&self, scope: &ScopeKey) -> usize {
        self.opened.lock().iter().filter(|s| *s == scope).count()
    }

    /// Run `f` against the most recent link for `scope`.
    pub fn with_link<R>(&self, scope: &ScopeKey, f: impl FnOnce(&mut ChannelLink) -> R) -> Option<R> {
        let mut links = self.links.lock();
        links.iter_mut().rev().find(|l| l.scope() == scope).map(f)
    }

    pub fn open_link(&self, scope: &ScopeKey) {
        self.with_link(scope, |link| link.opened());
    }

    /// Deliver an inbound text frame on the most recent link for `scope`.
    pub fn inject(&self, scope: &ScopeKey, text: &str) {
        self.with_link(scope, |link| link.inbound(text.to_owned()));
    }

    /// Drain frames the owner sent on the most recent link for `scope`.
    pub fn sent(&self, scope: &ScopeKey) -> Vec<String> {
        self.with_link(scope, |link| link.drain_outbound()).unwrap_or_default()
    }

    /// Whether the most recent link for `scope` was closed by its owner.
    pub fn is_closed(&self, scope: &ScopeKey) -> bool {
        self.with_link(scope, |link| link.is_cancelled()).unwrap_or(true)
    }
}

impl ChannelOpener for FakeOpener {
    fn open(&self, scope: ScopeKey, events: EventTx) -> Channel {
        let (channel, link) = Channel::new(scope.clone(), events);
        if self.auto_open {
            link.opened();
        }
        self.opened.lock().push(scope);
        self.links.lock().push(link);
        channel
    }
}

/// In-memory [`SiteApi`] with scripted responses.
///
/// Queued count responses are served in order; once the queue is empty the
/// last one repeats. Unknown users resolve to `Ok(None)`.
#[derive(Default)]
pub struct FakeSite {
    counts: Mutex<VecDeque<Result<CountsResponse, FetchError>>>,
    last_counts: Mutex<Option<Result<CountsResponse, FetchError>>>,
    users: Mutex<HashMap<String, UserProfile>>,
    count_calls: AtomicUsize,
    user_calls: AtomicUsize,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_counts(&self, unread: u32, messages: u32) {
        self.counts.lock().push_back(Ok(CountsResponse {
            success: true,
            unread_count: unread,
            unread_messages_count: messages,
            recent_notifications: vec![],
        }));
    }

    pub fn push_response(&self, response: Result<CountsResponse, FetchError>) {
        self.counts.lock().push_back(response);
    }

    pub fn add_user(&self, profile: UserProfile) {
        self.users.lock().insert(profile.username.clone(), profile);
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub fn user_calls(&self) -> usize {
        self.user_calls.load(Ordering::SeqCst)
    }
}

impl SiteApi for FakeSite {
    fn fetch_counts(&self) -> BoxFuture<'_, Result<CountsResponse, FetchError>> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.counts.lock().pop_front();
        let response = match next {
            Some(response) => {
                *self.last_counts.lock() = Some(response.clone());
                response
            }
            None => self
                .last_counts
                .lock()
                .clone()
                .unwrap_or_else(|| Err(FetchError::new(ErrorCode::Network, "no scripted response"))),
        };
        Box::pin(async move { response })
    }

    fn fetch_user<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, Result<Option<UserProfile>, FetchError>> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        let user = self.users.lock().get(username).cloned();
        Box::pin(async move { Ok(user) })
    }
}

/// Assert that a `Result` is `Err` and its message contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
