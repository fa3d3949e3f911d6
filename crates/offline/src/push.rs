// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Push payloads and notification clicks.

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_TITLE: &str = "RuDjango";
pub const DEFAULT_BODY: &str = "您有新的通知";
pub const DEFAULT_ICON: &str = "/static/blog/images/icons/icon-192x192.png";
pub const DEFAULT_BADGE: &str = "/static/blog/images/icons/badge-72x72.png";
pub const DEFAULT_TAG: &str = "notification";
pub const DEFAULT_URL: &str = "/blog/notifications/";

/// A notification ready to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub require_interaction: bool,
    pub url: String,
}

impl Default for PushNotification {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_owned(),
            body: DEFAULT_BODY.to_owned(),
            icon: DEFAULT_ICON.to_owned(),
            badge: DEFAULT_BADGE.to_owned(),
            tag: DEFAULT_TAG.to_owned(),
            require_interaction: false,
            url: DEFAULT_URL.to_owned(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushPayload {
    title: Option<String>,
    body: Option<String>,
    message: Option<String>,
    icon: Option<String>,
    badge: Option<String>,
    tag: Option<String>,
    #[serde(default)]
    require_interaction: bool,
    url: Option<String>,
}

/// Empty strings count as missing.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Build the notification for a push event. Missing or malformed payloads
/// produce the defaults.
pub fn parse_push(data: Option<&[u8]>) -> PushNotification {
    let Some(data) = data.filter(|d| !d.is_empty()) else {
        return PushNotification::default();
    };
    let payload: PushPayload = match serde_json::from_slice(data) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(err = %e, "failed to parse push data");
            return PushNotification::default();
        }
    };
    let defaults = PushNotification::default();
    PushNotification {
        title: present(payload.title).unwrap_or(defaults.title),
        body: present(payload.body).or(present(payload.message)).unwrap_or(defaults.body),
        icon: present(payload.icon).unwrap_or(defaults.icon),
        badge: present(payload.badge).unwrap_or(defaults.badge),
        tag: present(payload.tag).unwrap_or(defaults.tag),
        require_interaction: payload.require_interaction,
        url: present(payload.url).unwrap_or(defaults.url),
    }
}

/// A window the worker controls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientWindow {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClickAction {
    Focus { id: String },
    Open { url: String },
}

/// Decide what a click on a notification does: focus a window already
/// showing the target, else open a new one.
pub fn click_target(url: Option<&str>, clients: &[ClientWindow]) -> ClickAction {
    let target = url.filter(|u| !u.is_empty()).unwrap_or(DEFAULT_URL);
    match clients.iter().find(|c| c.url == target) {
        Some(client) => ClickAction::Focus { id: client.id.clone() },
        None => ClickAction::Open { url: target.to_owned() },
    }
}

#[cfg(test)]
#[path = "push_tests.rs"]
mod tests;
