// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded registry of open chat windows, one channel per peer.
//!
//! Uses `IndexMap` for insertion-ordered storage: the oldest-opened window is
//! at the front and is evicted first. Focusing a window does not move it.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::time::Instant;

use crate::channel::{
    Channel, ChannelEvent, ChannelOpener, ChannelStatus, EventTx, ScopeKey, ScopedEvent,
};
use crate::chat::msg::{self, ChatOutbound};
use crate::chat::window::{ChatWindow, PeerInfo, WindowEffect};

/// A window and the channel that feeds it.
pub struct ChatSession {
    pub window: ChatWindow,
    pub channel: Channel,
}

/// Result of [`ChatRegistry::open_window`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The peer already had a window; it was focused.
    Focused,
    /// A new window was created, possibly evicting the oldest one.
    Opened { evicted: Option<String> },
}

/// What an inbound channel event did to a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Status(ChannelStatus),
    Frame(Vec<WindowEffect>),
}

pub struct ChatRegistry {
    sessions: IndexMap<String, ChatSession>,
    max_windows: usize,
    typing_timeout: Duration,
    opener: Arc<dyn ChannelOpener>,
    events: EventTx,
}

impl ChatRegistry {
    pub fn new(
        opener: Arc<dyn ChannelOpener>,
        events: EventTx,
        max_windows: usize,
        typing_timeout: Duration,
    ) -> Self {
        let max_windows = max_windows.max(1);
        Self {
            sessions: IndexMap::with_capacity(max_windows),
            max_windows,
            typing_timeout,
            opener,
            events,
        }
    }

    pub fn max_windows(&self) -> usize {
        self.max_windows
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Open peers, oldest first.
    pub fn peers(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    pub fn get(&self, peer_id: &str) -> Option<&ChatSession> {
        self.sessions.get(peer_id)
    }

    pub fn get_mut(&mut self, peer_id: &str) -> Option<&mut ChatSession> {
        self.sessions.get_mut(peer_id)
    }

    /// Open a window for `peer`, or focus the existing one.
    pub fn open_window(&mut self, peer: PeerInfo) -> (OpenOutcome, Vec<WindowEffect>) {
        if let Some(session) = self.sessions.get_mut(&peer.peer_id) {
            return (OpenOutcome::Focused, session.window.focus());
        }

        let mut evicted = None;
        while self.sessions.len() >= self.max_windows {
            let Some((peer_id, session)) = self.sessions.shift_remove_index(0) else { break };
            tracing::debug!(peer = %peer_id, "evicting oldest chat window");
            shut(session);
            evicted = Some(peer_id);
        }

        let scope = ScopeKey::Chat(peer.peer_id.clone());
        let channel = self.opener.open(scope, self.events.clone());
        let peer_id = peer.peer_id.clone();
        let window = ChatWindow::new(peer, self.typing_timeout);
        self.sessions.insert(peer_id, ChatSession { window, channel });
        (OpenOutcome::Opened { evicted }, vec![WindowEffect::FocusInput])
    }

    /// Close a window and its channel. Unknown peers are a no-op.
    pub fn close_window(&mut self, peer_id: &str) -> bool {
        match self.sessions.shift_remove(peer_id) {
            Some(session) => {
                shut(session);
                true
            }
            None => false,
        }
    }

    pub fn focus(&mut self, peer_id: &str) -> Vec<WindowEffect> {
        match self.sessions.get_mut(peer_id) {
            Some(session) => session.window.focus(),
            None => vec![],
        }
    }

    /// Replace an exhausted channel with a fresh one.
    ///
    /// Automatic retries stop once a channel is exhausted; this is the
    /// explicit reopen. Returns `false` if the peer has no window or its
    /// channel is still live.
    pub fn reconnect(&mut self, peer_id: &str) -> bool {
        let Some(session) = self.sessions.get_mut(peer_id) else { return false };
        if !session.channel.info().exhausted {
            return false;
        }
        let scope = ScopeKey::Chat(peer_id.to_owned());
        session.channel = self.opener.open(scope, self.events.clone());
        session.window.set_connection(ChannelStatus::Connecting);
        true
    }

    /// Apply an inbound channel event to its window.
    ///
    /// Events from channels that are no longer current (closed, evicted, or
    /// replaced) are discarded. Undecodable frames are logged and dropped.
    pub fn handle_event(&mut self, event: ScopedEvent) -> Option<(String, EventOutcome)> {
        let ScopeKey::Chat(peer_id) = event.scope else { return None };
        let session = self.sessions.get_mut(&peer_id)?;
        if session.channel.id() != event.channel_id {
            return None;
        }

        match event.event {
            ChannelEvent::Status(status) => {
                session.window.set_connection(status);
                Some((peer_id, EventOutcome::Status(status)))
            }
            ChannelEvent::Message(text) => match msg::decode(&text) {
                Some(frame) => {
                    let effects = session.window.apply(frame);
                    let effects = perform(session, effects);
                    Some((peer_id, EventOutcome::Frame(effects)))
                }
                None => {
                    tracing::warn!(peer = %peer_id, len = text.len(), "dropping malformed chat frame");
                    None
                }
            },
        }
    }

    /// Run a window operation and carry out its effects on the channel.
    ///
    /// Returns the effects left for the renderer.
    pub fn with_window(
        &mut self,
        peer_id: &str,
        op: impl FnOnce(&mut ChatWindow) -> Vec<WindowEffect>,
    ) -> Vec<WindowEffect> {
        match self.sessions.get_mut(peer_id) {
            Some(session) => {
                let effects = op(&mut session.window);
                perform(session, effects)
            }
            None => vec![],
        }
    }

    /// Earliest armed typing countdown across all windows.
    pub fn next_typing_deadline(&self) -> Option<Instant> {
        self.sessions.values().filter_map(|s| s.window.typing_deadline()).min()
    }

    /// Fire elapsed typing countdowns. Returns the peers that were affected.
    pub fn poll_typing(&mut self, now: Instant) -> Vec<String> {
        let mut fired = Vec::new();
        for (peer_id, session) in self.sessions.iter_mut() {
            let effects = session.window.poll_typing(now);
            if !effects.is_empty() {
                perform(session, effects);
                fired.push(peer_id.clone());
            }
        }
        fired
    }

    /// Close every window.
    pub fn close_all(&mut self) {
        for (_, session) in self.sessions.drain(..) {
            shut(session);
        }
    }
}

fn shut(mut session: ChatSession) {
    session.window.close();
    session.channel.close();
}

/// Send frames on the session's channel; return the renderer's share.
///
/// A failed message send is fed back into the window so it can release its
/// pending guard and report the failure.
fn perform(session: &mut ChatSession, effects: Vec<WindowEffect>) -> Vec<WindowEffect> {
    let mut pending = std::collections::VecDeque::from(effects);
    let mut remaining = Vec::new();
    while let Some(effect) = pending.pop_front() {
        match effect {
            WindowEffect::Send(frame) => {
                let is_message = matches!(frame, ChatOutbound::ChatMessage { .. });
                let delivered = session.channel.send(&frame);
                if is_message {
                    pending.extend(session.window.on_send_result(delivered));
                } else if !delivered {
                    tracing::debug!(scope = %session.channel.scope(), "typing signal dropped");
                }
            }
            other => remaining.push(other),
        }
    }
    remaining
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
