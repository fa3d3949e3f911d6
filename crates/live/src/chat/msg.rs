// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat channel wire types.

use serde::{Deserialize, Serialize};

/// Frames the server sends on a chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatInbound {
    /// Full conversation replay, oldest first. Sent once per connection.
    ChatHistory { messages: Vec<WireMessage> },
    /// One delivered message, including echoes of our own sends.
    ChatMessage { message: WireMessage },
    /// The peer started or stopped typing.
    Typing { is_typing: bool },
}

/// Frames the client sends on a chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatOutbound {
    ChatMessage { message: String },
    Typing { is_typing: bool },
}

/// A message as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// `"me"` for our own messages, anything else for the peer.
    pub sender: String,
    pub content: String,
    /// ISO-8601 timestamp as sent by the server.
    #[serde(default)]
    pub timestamp: String,
}

/// A delivered chat message. Immutable once appended to a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Option<u64>,
    pub sender_is_self: bool,
    pub content: String,
    pub timestamp: String,
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        Self {
            id: wire.id,
            sender_is_self: wire.sender == "me",
            content: wire.content,
            timestamp: wire.timestamp,
        }
    }
}

/// Decode an inbound chat frame. `None` means the frame should be dropped.
pub fn decode(text: &str) -> Option<ChatInbound> {
    serde_json::from_str(text).ok()
}
