// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat manager task.
//!
//! A single task owns the [`ChatRegistry`] and processes commands, channel
//! events and typing countdowns one at a time. Front-ends talk to it through a
//! cloneable [`ChatHandle`] and observe it through [`ChatUpdate`] broadcasts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::channel::{ChannelOpener, ScopeKey, ScopedEvent};
use crate::chat::msg::Message;
use crate::chat::registry::{ChatRegistry, EventOutcome, OpenOutcome};
use crate::chat::window::{Pane, PeerInfo, TypingState, Visibility, WindowEffect};
use crate::config::Config;
use crate::notify::NotificationHandle;

// -- Wire-format updates --------------------------------------------------------

/// Renderer-facing changes, broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatUpdate {
    Opened {
        peer: String,
        display_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        evicted: Option<String>,
    },
    Closed { peer: String },
    Visibility { peer: String, visibility: Visibility },
    Connection { peer: String, status: String },
    /// The message list was replaced by a history payload.
    History { peer: String, messages: Vec<Message> },
    Message { peer: String, message: Message },
    PeerTyping { peer: String, typing: bool },
    SendFailed { peer: String },
    FocusInput { peer: String },
}

/// Point-in-time view of one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub peer: PeerInfo,
    pub visibility: Visibility,
    pub pane: Pane,
    pub connection: String,
    pub messages: usize,
    pub peer_typing: bool,
    pub draft: String,
}

// -- Commands -------------------------------------------------------------------

#[derive(Debug)]
pub enum ChatCommand {
    Open(PeerInfo),
    Close(String),
    ToggleMinimize(String),
    Focus(String),
    Input { peer: String, draft: String },
    CompositionStart(String),
    CompositionEnd(String),
    Enter { peer: String, shift: bool },
    Submit(String),
    Reconnect(String),
    Snapshot(oneshot::Sender<Vec<WindowSnapshot>>),
}

/// Cloneable front door to the chat manager task.
#[derive(Debug, Clone)]
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<ChatCommand>,
    updates: broadcast::Sender<ChatUpdate>,
}

/// Receiving half handed to [`ChatManager::new`].
pub struct ChatInbox {
    pub(crate) commands: mpsc::UnboundedReceiver<ChatCommand>,
    updates: broadcast::Sender<ChatUpdate>,
}

impl ChatHandle {
    /// Create the handle before the manager so other components can hold it.
    pub fn new() -> (Self, ChatInbox) {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(256);
        (Self { commands, updates: updates.clone() }, ChatInbox { commands: commands_rx, updates })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatUpdate> {
        self.updates.subscribe()
    }

    /// Queue a command. Returns `false` once the manager has stopped.
    pub fn command(&self, command: ChatCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Open (or focus) a chat window for `peer_id`.
    pub fn open_chat_window(
        &self,
        peer_id: &str,
        user_id: Option<String>,
        display_name: Option<String>,
        avatar_url: Option<String>,
    ) -> bool {
        let peer = PeerInfo {
            peer_id: peer_id.to_owned(),
            user_id,
            display_name: display_name.unwrap_or_else(|| peer_id.to_owned()),
            avatar_url,
        };
        self.command(ChatCommand::Open(peer))
    }

    pub fn close_chat_window(&self, peer_id: &str) -> bool {
        self.command(ChatCommand::Close(peer_id.to_owned()))
    }

    pub fn toggle_minimize(&self, peer_id: &str) -> bool {
        self.command(ChatCommand::ToggleMinimize(peer_id.to_owned()))
    }

    pub fn focus(&self, peer_id: &str) -> bool {
        self.command(ChatCommand::Focus(peer_id.to_owned()))
    }

    /// Type `text` into the peer's input and submit it.
    pub fn send_message(&self, peer_id: &str, text: &str) -> bool {
        self.command(ChatCommand::Input { peer: peer_id.to_owned(), draft: text.to_owned() })
            && self.command(ChatCommand::Submit(peer_id.to_owned()))
    }

    pub fn reconnect(&self, peer_id: &str) -> bool {
        self.command(ChatCommand::Reconnect(peer_id.to_owned()))
    }

    /// Current windows, oldest first. `None` once the manager has stopped.
    pub async fn snapshot(&self) -> Option<Vec<WindowSnapshot>> {
        let (tx, rx) = oneshot::channel();
        if !self.command(ChatCommand::Snapshot(tx)) {
            return None;
        }
        rx.await.ok()
    }
}

// -- Manager --------------------------------------------------------------------

pub struct ChatManager {
    registry: ChatRegistry,
    commands: mpsc::UnboundedReceiver<ChatCommand>,
    events: mpsc::UnboundedReceiver<ScopedEvent>,
    updates: broadcast::Sender<ChatUpdate>,
    notifications: Option<NotificationHandle>,
}

impl ChatManager {
    pub fn new(
        inbox: ChatInbox,
        opener: Arc<dyn ChannelOpener>,
        config: &Config,
        notifications: Option<NotificationHandle>,
    ) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let registry =
            ChatRegistry::new(opener, events_tx, config.max_windows, config.typing_timeout());
        Self {
            registry,
            commands: inbox.commands,
            events,
            updates: inbox.updates,
            notifications,
        }
    }

    /// Process commands and events until cancelled or every handle is dropped.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let deadline = self.registry.next_typing_deadline();
            tokio::select! {
                _ = cancel.cancelled() => break,
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(event) = self.events.recv() => self.handle_event(event),
                _ = typing_timer(deadline) => {
                    self.registry.poll_typing(Instant::now());
                }
            }
        }
        self.registry.close_all();
        tracing::debug!("chat manager stopped");
    }

    fn publish(&self, update: ChatUpdate) {
        let _ = self.updates.send(update);
    }

    fn handle_command(&mut self, cmd: ChatCommand) {
        match cmd {
            ChatCommand::Open(peer) => {
                let peer_id = peer.peer_id.clone();
                let display_name = peer.display_name.clone();
                let (outcome, effects) = self.registry.open_window(peer);
                match outcome {
                    OpenOutcome::Focused => {
                        self.publish(ChatUpdate::Visibility {
                            peer: peer_id.clone(),
                            visibility: Visibility::Open,
                        });
                    }
                    OpenOutcome::Opened { evicted } => {
                        if let Some(old) = &evicted {
                            self.publish(ChatUpdate::Closed { peer: old.clone() });
                        }
                        tracing::info!(peer = %peer_id, "chat window opened");
                        self.publish(ChatUpdate::Opened {
                            peer: peer_id.clone(),
                            display_name,
                            evicted,
                        });
                    }
                }
                self.render(&peer_id, effects);
            }
            ChatCommand::Close(peer) => {
                if self.registry.close_window(&peer) {
                    self.publish(ChatUpdate::Closed { peer });
                }
            }
            ChatCommand::ToggleMinimize(peer) => {
                let effects = self.registry.with_window(&peer, |w| w.toggle_minimize());
                if let Some(session) = self.registry.get(&peer) {
                    let visibility = session.window.visibility();
                    self.publish(ChatUpdate::Visibility { peer: peer.clone(), visibility });
                }
                self.render(&peer, effects);
            }
            ChatCommand::Focus(peer) => {
                let effects = self.registry.focus(&peer);
                self.render(&peer, effects);
            }
            ChatCommand::Input { peer, draft } => {
                let now = Instant::now();
                let effects = self.registry.with_window(&peer, |w| w.on_input(&draft, now));
                self.render(&peer, effects);
            }
            ChatCommand::CompositionStart(peer) => {
                self.registry.with_window(&peer, |w| {
                    w.composition_start();
                    vec![]
                });
            }
            ChatCommand::CompositionEnd(peer) => {
                self.registry.with_window(&peer, |w| {
                    w.composition_end();
                    vec![]
                });
            }
            ChatCommand::Enter { peer, shift } => {
                let effects = self.registry.with_window(&peer, |w| w.on_enter(shift));
                self.render(&peer, effects);
            }
            ChatCommand::Submit(peer) => {
                let effects = self.registry.with_window(&peer, |w| w.submit());
                self.render(&peer, effects);
            }
            ChatCommand::Reconnect(peer) => {
                if self.registry.reconnect(&peer) {
                    tracing::info!(peer = %peer, "chat channel reopened");
                }
            }
            ChatCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn handle_event(&mut self, event: ScopedEvent) {
        let ScopeKey::Chat(peer) = &event.scope else { return };
        let before = self.registry.get(peer).map(|s| {
            (s.window.pane(), s.window.messages().len(), s.window.typing_state())
        });
        let Some((peer, outcome)) = self.registry.handle_event(event) else { return };

        match outcome {
            EventOutcome::Status(status) => {
                self.publish(ChatUpdate::Connection {
                    peer,
                    status: status.label().to_owned(),
                });
            }
            EventOutcome::Frame(effects) => {
                self.publish_frame_changes(&peer, before, &effects);
                self.render(&peer, effects);
            }
        }
    }

    /// Translate the state change caused by one inbound frame into updates.
    fn publish_frame_changes(
        &self,
        peer: &str,
        before: Option<(Pane, usize, TypingState)>,
        effects: &[WindowEffect],
    ) {
        let (Some((pane_before, len_before, typing_before)), Some(session)) =
            (before, self.registry.get(peer))
        else {
            return;
        };
        let window = &session.window;

        let history = effects.contains(&WindowEffect::HistoryLoaded)
            || (window.pane() == Pane::Empty && pane_before != Pane::Empty);
        if history {
            self.publish(ChatUpdate::History {
                peer: peer.to_owned(),
                messages: window.messages().to_vec(),
            });
        } else if window.messages().len() > len_before {
            if let Some(message) = window.messages().last() {
                self.publish(ChatUpdate::Message { peer: peer.to_owned(), message: message.clone() });
            }
        }

        if window.typing_state() != typing_before {
            self.publish(ChatUpdate::PeerTyping {
                peer: peer.to_owned(),
                typing: window.typing_state() == TypingState::PeerTyping,
            });
        }
    }

    /// Carry out the renderer's share of window effects.
    fn render(&self, peer: &str, effects: Vec<WindowEffect>) {
        for effect in effects {
            match effect {
                WindowEffect::SendFailed => {
                    tracing::warn!(peer = %peer, "chat message not sent: channel not open");
                    self.publish(ChatUpdate::SendFailed { peer: peer.to_owned() });
                }
                WindowEffect::FocusInput => {
                    self.publish(ChatUpdate::FocusInput { peer: peer.to_owned() });
                }
                WindowEffect::HistoryLoaded => {
                    // Loading history marks the conversation read on the server.
                    if let Some(notifications) = &self.notifications {
                        notifications.refresh();
                    }
                }
                WindowEffect::ScrollToNewest | WindowEffect::Send(_) => {}
            }
        }
    }

    fn snapshot(&self) -> Vec<WindowSnapshot> {
        self.registry
            .peers()
            .iter()
            .filter_map(|peer| self.registry.get(peer))
            .map(|session| {
                let window = &session.window;
                WindowSnapshot {
                    peer: window.peer().clone(),
                    visibility: window.visibility(),
                    pane: window.pane(),
                    connection: window.connection().label().to_owned(),
                    messages: window.messages().len(),
                    peer_typing: window.typing_state() == TypingState::PeerTyping,
                    draft: window.draft().to_owned(),
                }
            })
            .collect()
    }
}

async fn typing_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Spawn the manager task and return its join handle.
pub fn spawn(
    inbox: ChatInbox,
    opener: Arc<dyn ChannelOpener>,
    config: &Config,
    notifications: Option<NotificationHandle>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let manager = ChatManager::new(inbox, opener, config, notifications);
    tokio::spawn(manager.run(cancel))
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
