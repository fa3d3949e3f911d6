// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification channel and polling wire types.

use serde::{Deserialize, Serialize};

/// Frames the server pushes on the notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyInbound {
    /// Sent on connect and in answer to a refresh.
    Initial {
        unread_count: u32,
        #[serde(default)]
        unread_messages_count: u32,
        #[serde(default)]
        recent_notifications: Vec<serde_json::Value>,
    },
    Notification { notification: NotificationPayload },
    CountUpdate {
        unread_count: u32,
        #[serde(default)]
        unread_messages_count: u32,
    },
    Pong,
}

/// Display data for one notification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default)]
    pub icon: String,
    pub message: String,
    #[serde(default)]
    pub time_since: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Actions the client sends on the notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    Ping,
    /// Ask the server to resend the `initial` payload.
    Refresh,
}

/// Body of the polling counts endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountsResponse {
    pub success: bool,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub unread_messages_count: u32,
    /// Most recent unread notifications, newest first.
    #[serde(default)]
    pub recent_notifications: Vec<RecentNotification>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentNotification {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub icon: String,
    pub message: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub time_since: String,
    #[serde(default)]
    pub created_at: String,
}

impl From<RecentNotification> for NotificationPayload {
    fn from(recent: RecentNotification) -> Self {
        Self {
            icon: recent.icon,
            message: recent.message,
            time_since: recent.time_since,
            link: recent.link,
        }
    }
}

/// Profile lookup used to open a chat from a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: Option<UserProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Decode an inbound notification frame. `None` means the frame should be dropped.
pub fn decode(text: &str) -> Option<NotifyInbound> {
    serde_json::from_str(text).ok()
}
