// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::channel::ChannelPolicy;

/// Which transport delivers notification counts and events.
///
/// Exactly one mode is active at a time. `Auto` starts on the WebSocket and
/// switches to polling for good once the socket gives up reconnecting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    #[default]
    Auto,
    WebSocket,
    Polling,
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::WebSocket => f.write_str("websocket"),
            Self::Polling => f.write_str("polling"),
        }
    }
}

impl std::str::FromStr for DeliveryMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "websocket" | "ws" => Ok(Self::WebSocket),
            "polling" | "poll" => Ok(Self::Polling),
            other => anyhow::bail!("invalid delivery mode: {other}"),
        }
    }
}

/// Real-time chat and notification client for a RuDjango site.
#[derive(Debug, Clone, Parser)]
#[command(name = "rudlive", version, about)]
pub struct Config {
    /// Base HTTP URL of the site.
    #[arg(long, env = "RUDLIVE_SITE_URL", default_value = "http://127.0.0.1:8000")]
    pub site_url: String,

    /// Raw `Cookie` header carrying the authenticated session.
    #[arg(long, env = "RUDLIVE_SESSION_COOKIE")]
    pub session_cookie: Option<String>,

    /// Maximum number of concurrently open chat windows.
    #[arg(long, env = "RUDLIVE_MAX_WINDOWS", default_value_t = 3)]
    pub max_windows: usize,

    /// Delay before each reconnect attempt in milliseconds.
    #[arg(long, env = "RUDLIVE_RECONNECT_DELAY_MS", default_value_t = 3000)]
    pub reconnect_delay_ms: u64,

    /// Reconnect attempts before a channel is reported as exhausted.
    #[arg(long, env = "RUDLIVE_MAX_RECONNECT_ATTEMPTS", default_value_t = 5)]
    pub max_reconnect_attempts: u32,

    /// Liveness probe interval in milliseconds.
    #[arg(long, env = "RUDLIVE_PING_INTERVAL_MS", default_value_t = 30000)]
    pub ping_interval_ms: u64,

    /// Idle time after the last keystroke before `typing:false` is sent.
    #[arg(long, env = "RUDLIVE_TYPING_TIMEOUT_MS", default_value_t = 3000)]
    pub typing_timeout_ms: u64,

    /// Notification poll interval in milliseconds (polling mode).
    #[arg(long, env = "RUDLIVE_POLL_INTERVAL_MS", default_value_t = 30000)]
    pub poll_interval_ms: u64,

    /// Deadline for every outbound HTTP request and WebSocket handshake.
    #[arg(long, env = "RUDLIVE_REQUEST_TIMEOUT_MS", default_value_t = 10000)]
    pub request_timeout_ms: u64,

    /// How long a notification toast stays visible.
    #[arg(long, env = "RUDLIVE_TOAST_TTL_MS", default_value_t = 5000)]
    pub toast_ttl_ms: u64,

    /// Notification delivery mode (auto, websocket, polling).
    #[arg(long, env = "RUDLIVE_DELIVERY", default_value = "auto")]
    pub delivery: String,

    /// Log format (json or text).
    #[arg(long, env = "RUDLIVE_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "RUDLIVE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate flag combinations that clap cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.site_url.starts_with("http://") && !self.site_url.starts_with("https://") {
            anyhow::bail!("--site-url must start with http:// or https://");
        }
        if self.max_windows == 0 {
            anyhow::bail!("--max-windows must be at least 1");
        }
        let intervals = [
            ("--ping-interval-ms", self.ping_interval_ms),
            ("--typing-timeout-ms", self.typing_timeout_ms),
            ("--poll-interval-ms", self.poll_interval_ms),
            ("--request-timeout-ms", self.request_timeout_ms),
        ];
        for (flag, value) in intervals {
            if value == 0 {
                anyhow::bail!("{flag} must be greater than zero");
            }
        }
        self.delivery_mode()?;
        Ok(())
    }

    pub fn delivery_mode(&self) -> anyhow::Result<DeliveryMode> {
        self.delivery.parse()
    }

    /// Site URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn toast_ttl(&self) -> Duration {
        Duration::from_millis(self.toast_ttl_ms)
    }

    /// Reconnect and liveness settings shared by every channel.
    pub fn channel_policy(&self) -> ChannelPolicy {
        ChannelPolicy {
            reconnect_delay: self.reconnect_delay(),
            max_reconnect_attempts: self.max_reconnect_attempts,
            ping_interval: self.ping_interval(),
            connect_timeout: self.request_timeout(),
        }
    }

    /// Defaults suitable for tests: short timers, fixed site URL.
    pub fn test() -> Self {
        Self {
            site_url: "http://127.0.0.1:8000".into(),
            session_cookie: None,
            max_windows: 3,
            reconnect_delay_ms: 50,
            max_reconnect_attempts: 5,
            ping_interval_ms: 30000,
            typing_timeout_ms: 3000,
            poll_interval_ms: 30000,
            request_timeout_ms: 2000,
            toast_ttl_ms: 5000,
            delivery: "auto".into(),
            log_format: "text".into(),
            log_level: "debug".into(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
