// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios for the chat manager and notification client
//! against the fake site over real WebSockets.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use rudlive::channel::{ChannelOpener, WsOpener};
use rudlive::chat::{self, ChatHandle, ChatUpdate};
use rudlive::config::{Config, DeliveryMode};
use rudlive::http::{SiteApi, SiteClient};
use rudlive::notify::{self, Counters, NotificationHandle, NotifySettings, NotifyUpdate};
use rudlive_specs::{ensure_crypto, next_matching, wait_for, FakeSite, TIMEOUT};

struct Live {
    chat: ChatHandle,
    notify: NotificationHandle,
    shutdown: CancellationToken,
}

impl Drop for Live {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn config(site: &FakeSite) -> Config {
    Config { site_url: site.base_url(), ..Config::test() }
}

/// Wire both tasks the way the binary does.
fn start(config: &Config) -> anyhow::Result<Live> {
    ensure_crypto();
    let shutdown = CancellationToken::new();
    let opener: Arc<dyn ChannelOpener> =
        Arc::new(WsOpener::new(config.base_url(), None, config.channel_policy()));
    let site: Arc<dyn SiteApi> =
        Arc::new(SiteClient::new(config.base_url(), None, config.request_timeout())?);

    let (chat, chat_inbox) = ChatHandle::new();
    let (notify, notify_inbox) = NotificationHandle::new();
    notify::client::spawn(
        notify_inbox,
        NotifySettings::from_config(config)?,
        Arc::clone(&opener),
        site,
        Some(chat.clone()),
        shutdown.clone(),
    );
    chat::manager::spawn(chat_inbox, opener, config, Some(notify.clone()), shutdown.clone());
    Ok(Live { chat, notify, shutdown })
}

async fn wait_counters(notify: &NotificationHandle, expected: Counters) -> anyhow::Result<()> {
    let mut rx = notify.watch_counters();
    tokio::time::timeout(TIMEOUT, rx.wait_for(|c| *c == expected)).await??;
    Ok(())
}

fn counters(unread_notifications: u32, unread_messages: u32) -> Counters {
    Counters { unread_notifications, unread_messages }
}

#[tokio::test]
async fn sent_message_appears_once_from_echo() -> anyhow::Result<()> {
    let site = FakeSite::start().await?;
    site.set_history("alice", &[("other", "hello there")]);
    let live = start(&config(&site))?;
    let mut updates = live.chat.subscribe();

    live.chat.open_chat_window("alice", Some("7".into()), Some("Alice".into()), None);
    let history = next_matching(&mut updates, |u| matches!(u, ChatUpdate::History { .. })).await?;
    let ChatUpdate::History { messages, .. } = history else { anyhow::bail!("not history") };
    assert_eq!(messages.len(), 1);
    assert!(!messages[0].sender_is_self);

    live.chat.send_message("alice", "hi");
    let echoed = next_matching(&mut updates, |u| matches!(u, ChatUpdate::Message { .. })).await?;
    let ChatUpdate::Message { peer, message } = echoed else { anyhow::bail!("not a message") };
    assert_eq!(peer, "alice");
    assert_eq!(message.content, "hi");
    assert!(message.sender_is_self);

    let windows = live.chat.snapshot().await.unwrap_or_default();
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].messages, 2);
    assert_eq!(windows[0].draft, "");
    assert_eq!(site.received(), vec![("alice".to_owned(), "hi".to_owned())]);
    Ok(())
}

#[tokio::test]
async fn fourth_window_evicts_oldest_and_closes_its_socket() -> anyhow::Result<()> {
    let site = FakeSite::start().await?;
    let live = start(&config(&site))?;
    let mut updates = live.chat.subscribe();

    for peer in ["bob", "carol", "dave"] {
        live.chat.open_chat_window(peer, None, None, None);
    }
    wait_for("three chat sockets", || {
        ["bob", "carol", "dave"].iter().all(|p| site.open_chat_sockets(p) == 1)
    })
    .await?;

    live.chat.open_chat_window("erin", None, None, None);
    let opened = next_matching(&mut updates, |u| {
        matches!(u, ChatUpdate::Opened { peer, .. } if peer == "erin")
    })
    .await?;
    assert_eq!(
        opened,
        ChatUpdate::Opened { peer: "erin".into(), display_name: "erin".into(), evicted: Some("bob".into()) }
    );
    wait_for("bob's socket to close", || site.open_chat_sockets("bob") == 0).await?;

    let peers: Vec<String> = live
        .chat
        .snapshot()
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|w| w.peer.peer_id)
        .collect();
    assert_eq!(peers.len(), 3);
    assert!(!peers.contains(&"bob".to_owned()));
    assert_eq!(site.chat_connects("bob"), 1);
    Ok(())
}

#[tokio::test]
async fn reopening_a_window_does_not_reconnect() -> anyhow::Result<()> {
    let site = FakeSite::start().await?;
    let live = start(&config(&site))?;

    live.chat.open_chat_window("alice", None, None, None);
    wait_for("alice's socket", || site.open_chat_sockets("alice") == 1).await?;
    live.chat.open_chat_window("alice", None, None, None);
    live.chat.focus("alice");

    let windows = live.chat.snapshot().await.unwrap_or_default();
    assert_eq!(windows.len(), 1);
    assert_eq!(site.chat_connects("alice"), 1);
    Ok(())
}

#[tokio::test]
async fn counters_arrive_over_socket_and_pushes_bump_them() -> anyhow::Result<()> {
    let site = FakeSite::start().await?;
    site.set_counts(3, 1);
    let live = start(&config(&site))?;
    let mut updates = live.notify.subscribe();

    wait_counters(&live.notify, counters(3, 1)).await?;

    site.push_notification("bob liked your article", Some("/blog/articles/4/"));
    let toast = next_matching(&mut updates, |u| matches!(u, NotifyUpdate::Toast { .. })).await?;
    let NotifyUpdate::Toast { toast, ttl_ms } = toast else { anyhow::bail!("not a toast") };
    assert_eq!(toast.message, "bob liked your article");
    assert_eq!(ttl_ms, 5000);
    wait_counters(&live.notify, counters(4, 1)).await?;
    assert_eq!(site.count_polls(), 0);
    Ok(())
}

#[tokio::test]
async fn chat_notification_opens_the_peer_window() -> anyhow::Result<()> {
    let site = FakeSite::start().await?;
    site.add_user("alice", 7, "Alice");
    site.set_counts(1, 0);
    let live = start(&config(&site))?;
    let mut chat_updates = live.chat.subscribe();

    // Pushes reach only sockets that are already subscribed; the initial
    // payload is sent after subscribing.
    wait_counters(&live.notify, counters(1, 0)).await?;
    site.push_notification("alice sent you a message", Some("/blog/chat/alice/"));

    let opened = next_matching(&mut chat_updates, |u| matches!(u, ChatUpdate::Opened { .. })).await?;
    assert_eq!(
        opened,
        ChatUpdate::Opened { peer: "alice".into(), display_name: "Alice".into(), evicted: None }
    );
    wait_for("alice's socket", || site.open_chat_sockets("alice") == 1).await?;
    Ok(())
}

#[tokio::test]
async fn loading_history_refreshes_counters() -> anyhow::Result<()> {
    let site = FakeSite::start().await?;
    site.set_counts(0, 2);
    site.set_history("alice", &[("other", "unread one"), ("other", "unread two")]);
    let live = start(&config(&site))?;
    wait_counters(&live.notify, counters(0, 2)).await?;

    // The site marks the conversation read when it replays history.
    site.set_counts(0, 0);
    live.chat.open_chat_window("alice", None, None, None);
    wait_for("a refresh request", || site.refreshes() >= 1).await?;
    wait_counters(&live.notify, counters(0, 0)).await?;
    Ok(())
}

#[tokio::test]
async fn falls_back_to_polling_when_socket_is_unavailable() -> anyhow::Result<()> {
    let site = FakeSite::start().await?;
    site.take_notification_socket_down();
    site.set_counts(5, 0);
    site.set_recent(vec![serde_json::json!({
        "id": 1, "type": "comment", "icon": "c", "message": "new comment",
        "link": "/blog/articles/1/", "time_since": "1 minute ago"
    })]);
    let config = Config {
        max_reconnect_attempts: 1,
        reconnect_delay_ms: 20,
        poll_interval_ms: 100,
        ..config(&site)
    };
    let live = start(&config)?;
    let mut updates = live.notify.subscribe();

    let switched = next_matching(&mut updates, |u| matches!(u, NotifyUpdate::Delivery { .. })).await?;
    assert_eq!(switched, NotifyUpdate::Delivery { mode: DeliveryMode::Polling });
    wait_counters(&live.notify, counters(5, 0)).await?;

    site.set_counts(6, 0);
    let toast = next_matching(&mut updates, |u| matches!(u, NotifyUpdate::Toast { .. })).await?;
    let NotifyUpdate::Toast { toast, .. } = toast else { anyhow::bail!("not a toast") };
    assert_eq!(toast.message, "new comment");
    wait_for("repeated polls", || site.count_polls() >= 3).await?;
    Ok(())
}

#[tokio::test]
async fn hidden_page_stops_polling() -> anyhow::Result<()> {
    let site = FakeSite::start().await?;
    let config = Config { delivery: "polling".into(), poll_interval_ms: 50, ..config(&site) };
    let live = start(&config)?;

    wait_for("first poll", || site.count_polls() >= 1).await?;
    live.notify.set_visible(false);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let paused_at = site.count_polls();
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert_eq!(site.count_polls(), paused_at);

    live.notify.set_visible(true);
    wait_for("poll on return", || site.count_polls() > paused_at).await?;
    Ok(())
}
