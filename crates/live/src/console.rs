// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-oriented terminal front-end.
//!
//! Reads slash commands from stdin and renders chat and notification updates
//! as log lines.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chat::manager::WindowSnapshot;
use crate::chat::window::Visibility;
use crate::chat::{ChatHandle, ChatUpdate};
use crate::notify::state::ToastAction;
use crate::notify::{Counters, NotificationHandle, NotifyUpdate};

const HELP: &str = "commands: /open <user>, /close <user>, /min <user>, /focus <user>, \
/msg <user> <text>, /reconnect <user>, /windows, /refresh, /hide, /show, /quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Open(String),
    Close(String),
    Minimize(String),
    Focus(String),
    Message { peer: String, text: String },
    Reconnect(String),
    Windows,
    Refresh,
    /// Page hidden: polling pauses.
    Hide,
    Show,
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> anyhow::Result<Option<ConsoleCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        anyhow::bail!("expected a command starting with '/'; try /help");
    };
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let user = |args: &str| -> anyhow::Result<String> {
        match args.split_whitespace().collect::<Vec<_>>().as_slice() {
            [user] => Ok((*user).to_owned()),
            _ => anyhow::bail!("/{name} takes exactly one username"),
        }
    };

    let cmd = match name {
        "open" => ConsoleCommand::Open(user(args)?),
        "close" => ConsoleCommand::Close(user(args)?),
        "min" => ConsoleCommand::Minimize(user(args)?),
        "focus" => ConsoleCommand::Focus(user(args)?),
        "reconnect" => ConsoleCommand::Reconnect(user(args)?),
        "msg" => {
            let Some((peer, text)) = args.split_once(char::is_whitespace) else {
                anyhow::bail!("usage: /msg <user> <text>");
            };
            ConsoleCommand::Message { peer: peer.to_owned(), text: text.trim().to_owned() }
        }
        "windows" => ConsoleCommand::Windows,
        "refresh" => ConsoleCommand::Refresh,
        "hide" => ConsoleCommand::Hide,
        "show" => ConsoleCommand::Show,
        "help" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => anyhow::bail!("unknown command: /{other}"),
    };
    Ok(Some(cmd))
}

/// Header badges, e.g. `notifications 3 | messages 99+`.
pub fn badge_line(counters: &Counters) -> String {
    let show = |label: Option<String>| label.unwrap_or_else(|| "-".to_owned());
    format!(
        "notifications {} | messages {}",
        show(counters.notification_badge()),
        show(counters.message_badge())
    )
}

pub fn describe_chat(update: &ChatUpdate) -> Option<String> {
    let line = match update {
        ChatUpdate::Opened { peer, display_name, evicted: Some(old) } => {
            format!("[{peer}] opened chat with {display_name} (closed {old})")
        }
        ChatUpdate::Opened { peer, display_name, evicted: None } => {
            format!("[{peer}] opened chat with {display_name}")
        }
        ChatUpdate::Closed { peer } => format!("[{peer}] closed"),
        ChatUpdate::Visibility { peer, visibility } => {
            let label = match visibility {
                Visibility::Open => "open",
                Visibility::Minimized => "minimized",
                Visibility::Closed => "closed",
            };
            format!("[{peer}] {label}")
        }
        ChatUpdate::Connection { peer, status } => format!("[{peer}] {status}"),
        ChatUpdate::History { peer, messages } if messages.is_empty() => {
            format!("[{peer}] no messages yet")
        }
        ChatUpdate::History { peer, messages } => {
            let body: Vec<String> = messages
                .iter()
                .map(|m| format!("  {} {}", if m.sender_is_self { ">" } else { "<" }, m.content))
                .collect();
            format!("[{peer}] history ({}):\n{}", messages.len(), body.join("\n"))
        }
        ChatUpdate::Message { peer, message } if message.sender_is_self => {
            format!("[{peer}] > {}", message.content)
        }
        ChatUpdate::Message { peer, message } => format!("[{peer}] < {}", message.content),
        ChatUpdate::PeerTyping { peer, typing: true } => format!("[{peer}] is typing..."),
        ChatUpdate::PeerTyping { .. } | ChatUpdate::FocusInput { .. } => return None,
        ChatUpdate::SendFailed { peer } => format!("[{peer}] message not sent: not connected"),
    };
    Some(line)
}

pub fn describe_notify(update: &NotifyUpdate) -> String {
    match update {
        NotifyUpdate::Toast { toast, .. } => {
            let target = match toast.action() {
                ToastAction::OpenChat(peer) => format!(" (chat with {peer})"),
                ToastAction::Navigate(link) => format!(" ({link})"),
                ToastAction::None => String::new(),
            };
            format!("{} {} {}{target}", toast.icon, toast.message, toast.time_since)
        }
        NotifyUpdate::Delivery { mode } => format!("notifications now delivered by {mode}"),
        NotifyUpdate::Connection { status } => format!("notifications {status}"),
    }
}

fn describe_window(w: &WindowSnapshot) -> String {
    let typing = if w.peer_typing { ", typing" } else { "" };
    format!(
        "{} ({}): {:?}, {}, {} messages{typing}",
        w.peer.peer_id, w.peer.display_name, w.visibility, w.connection, w.messages
    )
}

/// Carry out one command. Returns `false` when the console should exit.
async fn dispatch(cmd: ConsoleCommand, chat: &ChatHandle, notify: &NotificationHandle) -> bool {
    match cmd {
        ConsoleCommand::Open(peer) => {
            chat.open_chat_window(&peer, None, None, None);
        }
        ConsoleCommand::Close(peer) => {
            chat.close_chat_window(&peer);
        }
        ConsoleCommand::Minimize(peer) => {
            chat.toggle_minimize(&peer);
        }
        ConsoleCommand::Focus(peer) => {
            chat.focus(&peer);
        }
        ConsoleCommand::Message { peer, text } => {
            chat.send_message(&peer, &text);
        }
        ConsoleCommand::Reconnect(peer) => {
            chat.reconnect(&peer);
        }
        ConsoleCommand::Windows => {
            let windows = chat.snapshot().await.unwrap_or_default();
            if windows.is_empty() {
                info!("no open chat windows");
            }
            for w in &windows {
                info!("{}", describe_window(w));
            }
        }
        ConsoleCommand::Refresh => {
            notify.refresh();
        }
        ConsoleCommand::Hide => {
            notify.set_visible(false);
        }
        ConsoleCommand::Show => {
            notify.set_visible(true);
        }
        ConsoleCommand::Help => info!("{HELP}"),
        ConsoleCommand::Quit => return false,
    }
    true
}

/// Run the console until `/quit`, end of input, or cancellation.
pub async fn run_console<R>(
    input: R,
    chat: ChatHandle,
    notify: NotificationHandle,
    cancel: CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut chat_updates = chat.subscribe();
    let mut notify_updates = notify.subscribe();
    let mut counters = notify.watch_counters();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_line(&line) {
                    Ok(Some(cmd)) => {
                        if !dispatch(cmd, &chat, &notify).await {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("{e}"),
                }
            }
            Ok(update) = chat_updates.recv() => {
                if let Some(line) = describe_chat(&update) {
                    info!("{line}");
                }
            }
            Ok(update) = notify_updates.recv() => info!("{}", describe_notify(&update)),
            Ok(()) = counters.changed() => {
                let current = *counters.borrow_and_update();
                info!("{}", badge_line(&current));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "console_tests.rs"]
mod tests;
