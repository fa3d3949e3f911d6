// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification delivery task.
//!
//! Exactly one delivery mode is active at a time. In `auto` mode the task
//! starts on the notification WebSocket and falls back to polling for the
//! rest of the session once that channel exhausts its reconnect budget.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::channel::{Channel, ChannelEvent, ChannelOpener, ChannelStatus, ScopeKey, ScopedEvent};
use crate::chat::ChatHandle;
use crate::config::{Config, DeliveryMode};
use crate::http::SiteApi;
use crate::notify::msg::{self, ClientAction};
use crate::notify::state::{Counters, NotificationState, NotifyEffect, Toast, ToastAction};

/// Changes other than counters, broadcast to renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyUpdate {
    Toast { toast: Toast, ttl_ms: u64 },
    /// The active delivery path changed.
    Delivery { mode: DeliveryMode },
    Connection { status: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyCommand {
    /// Page visibility changed. Polling pauses while hidden.
    SetVisible(bool),
    /// Ask for fresh counters now.
    Refresh,
    /// Resolve a chat peer and open its window.
    OpenChat(String),
}

/// Cloneable front door to the notification task.
#[derive(Debug, Clone)]
pub struct NotificationHandle {
    commands: mpsc::UnboundedSender<NotifyCommand>,
    counters: watch::Receiver<Counters>,
    updates: broadcast::Sender<NotifyUpdate>,
}

/// Receiving half handed to [`NotificationClient::new`].
pub struct NotifyInbox {
    pub(crate) commands: mpsc::UnboundedReceiver<NotifyCommand>,
    counters: watch::Sender<Counters>,
    updates: broadcast::Sender<NotifyUpdate>,
}

impl NotificationHandle {
    pub fn new() -> (Self, NotifyInbox) {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (counters_tx, counters) = watch::channel(Counters::default());
        let (updates, _) = broadcast::channel(64);
        (
            Self { commands, counters, updates: updates.clone() },
            NotifyInbox { commands: commands_rx, counters: counters_tx, updates },
        )
    }

    /// Latest published counters.
    pub fn counters(&self) -> Counters {
        *self.counters.borrow()
    }

    pub fn watch_counters(&self) -> watch::Receiver<Counters> {
        self.counters.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotifyUpdate> {
        self.updates.subscribe()
    }

    pub fn set_visible(&self, visible: bool) -> bool {
        self.commands.send(NotifyCommand::SetVisible(visible)).is_ok()
    }

    pub fn refresh(&self) -> bool {
        self.commands.send(NotifyCommand::Refresh).is_ok()
    }

    /// Activate a toast. Chat toasts open the peer's window; anything else
    /// is returned for the caller to navigate to.
    pub fn activate(&self, toast: &Toast) -> ToastAction {
        let action = toast.action();
        if let ToastAction::OpenChat(peer) = &action {
            let _ = self.commands.send(NotifyCommand::OpenChat(peer.clone()));
        }
        action
    }
}

/// Timing and mode settings for the notification task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifySettings {
    pub mode: DeliveryMode,
    pub poll_interval: Duration,
    pub toast_ttl: Duration,
}

impl NotifySettings {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            mode: config.delivery_mode()?,
            poll_interval: config.poll_interval(),
            toast_ttl: config.toast_ttl(),
        })
    }
}

/// The path currently delivering notifications.
enum Delivery {
    Socket(Channel),
    Polling,
}

pub struct NotificationClient {
    settings: NotifySettings,
    opener: Arc<dyn ChannelOpener>,
    site: Arc<dyn SiteApi>,
    chat: Option<ChatHandle>,
    inbox: NotifyInbox,
    state: NotificationState,
    visible: bool,
}

impl NotificationClient {
    pub fn new(
        inbox: NotifyInbox,
        settings: NotifySettings,
        opener: Arc<dyn ChannelOpener>,
        site: Arc<dyn SiteApi>,
        chat: Option<ChatHandle>,
    ) -> Self {
        Self {
            settings,
            opener,
            site,
            chat,
            inbox,
            state: NotificationState::new(),
            visible: true,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let mut delivery = match self.settings.mode {
            DeliveryMode::Polling => Delivery::Polling,
            DeliveryMode::Auto | DeliveryMode::WebSocket => {
                Delivery::Socket(self.opener.open(ScopeKey::Notifications, events_tx.clone()))
            }
        };
        tracing::info!(mode = %self.settings.mode, "notification delivery started");
        let mut poll = poll_interval(self.settings.poll_interval);

        loop {
            let polling = matches!(delivery, Delivery::Polling) && self.visible;
            tokio::select! {
                _ = cancel.cancelled() => break,
                cmd = self.inbox.commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.handle_command(cmd, &delivery, &mut poll).await;
                }
                Some(event) = events.recv() => {
                    if let Some(next) = self.handle_event(event, &delivery) {
                        delivery = next;
                        poll = poll_interval(self.settings.poll_interval);
                    }
                }
                _ = poll.tick(), if polling => self.poll_once().await,
            }
        }

        if let Delivery::Socket(channel) = &delivery {
            channel.close();
        }
        tracing::debug!("notification client stopped");
    }

    async fn handle_command(&mut self, cmd: NotifyCommand, delivery: &Delivery, poll: &mut Interval) {
        match cmd {
            NotifyCommand::SetVisible(visible) => {
                let was_visible = std::mem::replace(&mut self.visible, visible);
                // Coming back into view polls immediately, then resumes the period.
                if visible && !was_visible && matches!(delivery, Delivery::Polling) {
                    self.poll_once().await;
                    poll.reset();
                }
            }
            NotifyCommand::Refresh => match delivery {
                Delivery::Socket(channel) => {
                    if !channel.send(&ClientAction::Refresh) {
                        tracing::debug!("refresh skipped: notification channel not open");
                    }
                }
                Delivery::Polling => {
                    self.poll_once().await;
                    poll.reset();
                }
            },
            NotifyCommand::OpenChat(peer) => self.open_chat(peer),
        }
    }

    /// Apply a channel event. Returns the new delivery path on fallback.
    fn handle_event(&mut self, event: ScopedEvent, delivery: &Delivery) -> Option<Delivery> {
        let Delivery::Socket(channel) = delivery else { return None };
        if channel.id() != event.channel_id {
            return None;
        }

        match event.event {
            ChannelEvent::Status(status) => {
                self.publish(NotifyUpdate::Connection { status: status.label().to_owned() });
                if status != ChannelStatus::Exhausted {
                    return None;
                }
                if self.settings.mode == DeliveryMode::Auto {
                    tracing::warn!("notification channel exhausted, falling back to polling");
                    self.publish(NotifyUpdate::Delivery { mode: DeliveryMode::Polling });
                    return Some(Delivery::Polling);
                }
                tracing::warn!("notification channel exhausted");
                None
            }
            ChannelEvent::Message(text) => {
                match msg::decode(&text) {
                    Some(frame) => {
                        let effects = self.state.apply_push(frame);
                        self.perform(effects);
                    }
                    None => {
                        tracing::warn!(len = text.len(), "dropping malformed notification frame");
                    }
                }
                None
            }
        }
    }

    async fn poll_once(&mut self) {
        match self.site.fetch_counts().await {
            Ok(response) => {
                if !response.success {
                    tracing::debug!("counts endpoint reported failure");
                }
                let effects = self.state.apply_poll(response);
                self.perform(effects);
            }
            Err(e) => {
                tracing::debug!(kind = e.code.as_str(), err = %e, "notification poll failed");
            }
        }
    }

    fn perform(&self, effects: Vec<NotifyEffect>) {
        for effect in effects {
            match effect {
                NotifyEffect::Badge(counters) => {
                    self.inbox.counters.send_replace(counters);
                }
                NotifyEffect::Toast(toast) => {
                    let ttl_ms = millis(self.settings.toast_ttl);
                    self.publish(NotifyUpdate::Toast { toast, ttl_ms });
                }
                NotifyEffect::OpenChat(peer) => self.open_chat(peer),
            }
        }
    }

    fn publish(&self, update: NotifyUpdate) {
        let _ = self.inbox.updates.send(update);
    }

    /// Look up the peer's profile off the task, then open the chat window.
    fn open_chat(&self, peer: String) {
        let Some(chat) = self.chat.clone() else { return };
        let site = Arc::clone(&self.site);
        tokio::spawn(async move {
            match site.fetch_user(&peer).await {
                Ok(Some(user)) => {
                    let user_id = user.id.map(|id| match id {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    });
                    chat.open_chat_window(&user.username, user_id, user.display_name, user.avatar_url);
                }
                Ok(None) => tracing::warn!(peer = %peer, "chat peer not found"),
                Err(e) => {
                    tracing::warn!(peer = %peer, kind = e.code.as_str(), err = %e, "chat peer lookup failed");
                }
            }
        });
    }
}

/// Interval whose first tick fires immediately.
fn poll_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now(), period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Spawn the notification task and return its join handle.
pub fn spawn(
    inbox: NotifyInbox,
    settings: NotifySettings,
    opener: Arc<dyn ChannelOpener>,
    site: Arc<dyn SiteApi>,
    chat: Option<ChatHandle>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let client = NotificationClient::new(inbox, settings, opener, site, chat);
    tokio::spawn(client.run(cancel))
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
