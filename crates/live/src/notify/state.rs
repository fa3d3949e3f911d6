// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification counters and the reconciliation rules for both delivery modes.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::notify::msg::{CountsResponse, NotificationPayload, NotifyInbound};

static CHAT_LINK: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"/chat/([^/]+)/").ok());

/// Unread counts shown in the header badges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub unread_notifications: u32,
    pub unread_messages: u32,
}

impl Counters {
    pub fn notification_badge(&self) -> Option<String> {
        badge_label(self.unread_notifications)
    }

    pub fn message_badge(&self) -> Option<String> {
        badge_label(self.unread_messages)
    }
}

/// Badge text for a count: hidden at zero, capped at `99+`.
pub fn badge_label(count: u32) -> Option<String> {
    match count {
        0 => None,
        1..=99 => Some(count.to_string()),
        _ => Some("99+".to_owned()),
    }
}

/// Extract the chat peer from a notification link such as `/blog/chat/alice/`.
pub fn chat_peer_from_link(link: &str) -> Option<String> {
    let re = CHAT_LINK.as_ref()?;
    re.captures(link).and_then(|c| c.get(1)).map(|m| m.as_str().to_owned())
}

/// A transient notification display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub icon: String,
    pub message: String,
    pub time_since: String,
    pub link: Option<String>,
}

/// What activating a toast does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToastAction {
    /// Open the peer's chat window instead of navigating.
    OpenChat(String),
    Navigate(String),
    None,
}

impl Toast {
    pub fn chat_peer(&self) -> Option<String> {
        self.link.as_deref().and_then(chat_peer_from_link)
    }

    pub fn action(&self) -> ToastAction {
        if let Some(peer) = self.chat_peer() {
            return ToastAction::OpenChat(peer);
        }
        match &self.link {
            Some(link) => ToastAction::Navigate(link.clone()),
            None => ToastAction::None,
        }
    }
}

impl From<NotificationPayload> for Toast {
    fn from(payload: NotificationPayload) -> Self {
        Self {
            icon: payload.icon,
            message: payload.message,
            time_since: payload.time_since,
            link: payload.link,
        }
    }
}

/// Work the driver must carry out after an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyEffect {
    /// Publish new counters. Both values change together.
    Badge(Counters),
    Toast(Toast),
    /// A notification targets a chat; open that peer's window.
    OpenChat(String),
}

/// Counter state plus what the polling path remembers between polls.
#[derive(Debug, Clone, Default)]
pub struct NotificationState {
    counters: Counters,
    last_polled: Option<u32>,
}

impl NotificationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Apply a frame pushed over the notification channel.
    ///
    /// `initial` and `count_update` overwrite both counters, even downward.
    /// A `notification` bumps the unread count until the server's next
    /// authoritative update.
    pub fn apply_push(&mut self, frame: NotifyInbound) -> Vec<NotifyEffect> {
        match frame {
            NotifyInbound::Initial { unread_count, unread_messages_count, .. }
            | NotifyInbound::CountUpdate { unread_count, unread_messages_count } => {
                self.counters = Counters {
                    unread_notifications: unread_count,
                    unread_messages: unread_messages_count,
                };
                vec![NotifyEffect::Badge(self.counters)]
            }
            NotifyInbound::Notification { notification } => {
                self.counters.unread_notifications =
                    self.counters.unread_notifications.saturating_add(1);
                let mut effects = vec![NotifyEffect::Badge(self.counters)];
                effects.extend(toast_effects(Toast::from(notification)));
                effects
            }
            NotifyInbound::Pong => vec![],
        }
    }

    /// Apply one polling response.
    ///
    /// Counters always take the polled values. A toast for the newest
    /// notification is shown only when the unread count rose since the
    /// previous poll; the first poll after load never toasts.
    pub fn apply_poll(&mut self, response: CountsResponse) -> Vec<NotifyEffect> {
        if !response.success {
            return vec![];
        }
        let previous = self.last_polled.replace(response.unread_count);
        self.counters = Counters {
            unread_notifications: response.unread_count,
            unread_messages: response.unread_messages_count,
        };
        let mut effects = vec![NotifyEffect::Badge(self.counters)];

        let rose = previous.is_some_and(|prev| response.unread_count > prev);
        if rose {
            if let Some(newest) = response.recent_notifications.into_iter().next() {
                effects.extend(toast_effects(Toast::from(NotificationPayload::from(newest))));
            }
        }
        effects
    }
}

fn toast_effects(toast: Toast) -> Vec<NotifyEffect> {
    let peer = toast.chat_peer();
    let mut effects = vec![NotifyEffect::Toast(toast)];
    if let Some(peer) = peer {
        effects.push(NotifyEffect::OpenChat(peer));
    }
    effects
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
