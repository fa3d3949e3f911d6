// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod channel;
pub mod chat;
pub mod config;
pub mod console;
pub mod error;
pub mod http;
pub mod notify;
pub mod test_support;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::channel::{ChannelOpener, WsOpener};
use crate::chat::ChatHandle;
use crate::config::Config;
use crate::http::{SiteApi, SiteClient};
use crate::notify::{NotificationHandle, NotifySettings};

/// Initialize the global tracing subscriber. Later calls are ignored.
pub fn init_tracing(log_level: &str, log_format: &str) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match log_format {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Cancel `shutdown` on SIGTERM or SIGINT.
pub fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
                shutdown.cancel();
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
                shutdown.cancel();
            }
            _ = shutdown.cancelled() => {}
        }
    });
}

/// Connect to the site and run the terminal front-end until it exits.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let settings = NotifySettings::from_config(&config)?;

    let opener: Arc<dyn ChannelOpener> = Arc::new(WsOpener::new(
        config.base_url(),
        config.session_cookie.clone(),
        config.channel_policy(),
    ));
    let site: Arc<dyn SiteApi> = Arc::new(SiteClient::new(
        config.base_url(),
        config.session_cookie.as_deref(),
        config.request_timeout(),
    )?);

    // The chat handle exists before either task so each can hold the other's handle.
    let (chat, chat_inbox) = ChatHandle::new();
    let (notify, notify_inbox) = NotificationHandle::new();
    let notify_task = notify::client::spawn(
        notify_inbox,
        settings,
        Arc::clone(&opener),
        site,
        Some(chat.clone()),
        shutdown.clone(),
    );
    let chat_task =
        chat::manager::spawn(chat_inbox, opener, &config, Some(notify.clone()), shutdown.clone());

    spawn_signal_handler(shutdown.clone());
    info!(site = %config.base_url(), mode = %settings.mode, "rudlive started; /help for commands");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let result = console::run_console(stdin, chat, notify, shutdown.clone()).await;

    shutdown.cancel();
    let _ = tokio::join!(notify_task, chat_task);
    result
}
