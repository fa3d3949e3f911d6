// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-peer chat window state machine.
//!
//! The window performs no I/O. Every input returns the effects the driver must
//! carry out (frames to send, scroll and focus hints). Sent messages are never
//! echoed locally; they appear only when the server delivers them back.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::channel::ChannelStatus;
use crate::chat::msg::{ChatInbound, ChatOutbound, Message};

/// Identity and presentation data for a chat peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Username; the registry key and the chat channel scope.
    pub peer_id: String,
    pub user_id: Option<String>,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl PeerInfo {
    pub fn new(peer_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            user_id: None,
            display_name: display_name.into(),
            avatar_url: None,
        }
    }

    /// Avatar URL, or the first letter of the display name as a placeholder.
    pub fn avatar_or_initial(&self) -> String {
        match &self.avatar_url {
            Some(url) => url.clone(),
            None => self.display_name.chars().next().map(String::from).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Open,
    Minimized,
    /// Terminal.
    Closed,
}

/// What the message pane is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pane {
    /// Waiting for the first history payload.
    Loading,
    /// History arrived and was empty.
    Empty,
    Messages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypingState {
    Idle,
    PeerTyping,
}

/// Work the driver must carry out after an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEffect {
    /// Send a frame on this window's channel.
    Send(ChatOutbound),
    /// A submission could not be sent; tell the user.
    SendFailed,
    ScrollToNewest,
    FocusInput,
    /// History replaced the message list; the server marked it read.
    HistoryLoaded,
}

/// State for one open conversation.
#[derive(Debug, Clone)]
pub struct ChatWindow {
    peer: PeerInfo,
    visibility: Visibility,
    pane: Pane,
    messages: Vec<Message>,
    typing_state: TypingState,
    connection: ChannelStatus,
    draft: String,
    composing: bool,
    send_pending: bool,
    typing_timeout: Duration,
    typing_deadline: Option<Instant>,
}

impl ChatWindow {
    pub fn new(peer: PeerInfo, typing_timeout: Duration) -> Self {
        Self {
            peer,
            visibility: Visibility::Open,
            pane: Pane::Loading,
            messages: Vec::new(),
            typing_state: TypingState::Idle,
            connection: ChannelStatus::Connecting,
            draft: String::new(),
            composing: false,
            send_pending: false,
            typing_timeout,
            typing_deadline: None,
        }
    }

    pub fn peer(&self) -> &PeerInfo {
        &self.peer
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_minimized(&self) -> bool {
        self.visibility == Visibility::Minimized
    }

    pub fn is_closed(&self) -> bool {
        self.visibility == Visibility::Closed
    }

    pub fn pane(&self) -> Pane {
        self.pane
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn typing_state(&self) -> TypingState {
        self.typing_state
    }

    pub fn connection(&self) -> ChannelStatus {
        self.connection
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn is_composing(&self) -> bool {
        self.composing
    }

    pub fn send_pending(&self) -> bool {
        self.send_pending
    }

    /// When the local typing countdown fires, if armed.
    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing_deadline
    }

    // -- window chrome ----------------------------------------------------------

    pub fn toggle_minimize(&mut self) -> Vec<WindowEffect> {
        match self.visibility {
            Visibility::Open => {
                self.visibility = Visibility::Minimized;
                vec![]
            }
            Visibility::Minimized => {
                self.visibility = Visibility::Open;
                vec![WindowEffect::FocusInput]
            }
            Visibility::Closed => vec![],
        }
    }

    /// Bring the window forward, restoring it if minimized.
    pub fn focus(&mut self) -> Vec<WindowEffect> {
        if self.is_closed() {
            return vec![];
        }
        self.visibility = Visibility::Open;
        vec![WindowEffect::FocusInput]
    }

    pub fn close(&mut self) {
        self.visibility = Visibility::Closed;
        self.typing_deadline = None;
        self.send_pending = false;
    }

    pub fn set_connection(&mut self, status: ChannelStatus) {
        self.connection = status;
    }

    // -- composing ----------------------------------------------------------------

    /// The input text changed. Signals typing and re-arms the idle countdown
    /// on every keystroke.
    pub fn on_input(&mut self, draft: &str, now: Instant) -> Vec<WindowEffect> {
        if self.is_closed() {
            return vec![];
        }
        self.draft = draft.to_owned();
        self.typing_deadline = Some(now + self.typing_timeout);
        vec![WindowEffect::Send(ChatOutbound::Typing { is_typing: true })]
    }

    pub fn composition_start(&mut self) {
        self.composing = true;
    }

    pub fn composition_end(&mut self) {
        self.composing = false;
    }

    /// Enter key. Submits unless Shift is held or an IME composition is active.
    pub fn on_enter(&mut self, shift: bool) -> Vec<WindowEffect> {
        if shift || self.composing {
            return vec![];
        }
        self.submit()
    }

    /// Send the current draft. No local echo: the message is shown once the
    /// server delivers it back on the channel.
    pub fn submit(&mut self) -> Vec<WindowEffect> {
        if self.is_closed() || self.send_pending {
            return vec![];
        }
        let message = self.draft.trim();
        if message.is_empty() {
            return vec![];
        }
        self.send_pending = true;
        vec![WindowEffect::Send(ChatOutbound::ChatMessage { message: message.to_owned() })]
    }

    /// Outcome of the send started by [`submit`](Self::submit).
    pub fn on_send_result(&mut self, delivered: bool) -> Vec<WindowEffect> {
        if !self.send_pending {
            return vec![];
        }
        self.send_pending = false;
        if !delivered {
            return vec![WindowEffect::SendFailed];
        }
        self.draft.clear();
        match self.typing_deadline.take() {
            Some(_) => vec![WindowEffect::Send(ChatOutbound::Typing { is_typing: false })],
            None => vec![],
        }
    }

    /// Fire the typing countdown if it has elapsed.
    pub fn poll_typing(&mut self, now: Instant) -> Vec<WindowEffect> {
        match self.typing_deadline {
            Some(deadline) if deadline <= now => {
                self.typing_deadline = None;
                vec![WindowEffect::Send(ChatOutbound::Typing { is_typing: false })]
            }
            _ => vec![],
        }
    }

    // -- inbound ------------------------------------------------------------------

    /// Apply a frame delivered by the server.
    pub fn apply(&mut self, frame: ChatInbound) -> Vec<WindowEffect> {
        if self.is_closed() {
            return vec![];
        }
        match frame {
            ChatInbound::ChatHistory { messages } => {
                self.messages = messages.into_iter().map(Message::from).collect();
                if self.messages.is_empty() {
                    self.pane = Pane::Empty;
                    return vec![];
                }
                self.pane = Pane::Messages;
                vec![WindowEffect::ScrollToNewest, WindowEffect::HistoryLoaded]
            }
            ChatInbound::ChatMessage { message } => {
                let message = Message::from(message);
                if !message.sender_is_self {
                    self.typing_state = TypingState::Idle;
                }
                self.messages.push(message);
                self.pane = Pane::Messages;
                vec![WindowEffect::ScrollToNewest]
            }
            ChatInbound::Typing { is_typing } => {
                let next = if is_typing { TypingState::PeerTyping } else { TypingState::Idle };
                let appeared = next == TypingState::PeerTyping && self.typing_state == TypingState::Idle;
                self.typing_state = next;
                if appeared {
                    vec![WindowEffect::ScrollToNewest]
                } else {
                    vec![]
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "window_tests.rs"]
mod tests;
