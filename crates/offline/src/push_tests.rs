// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    no_data = { None },
    empty = { Some(b"".as_slice()) },
    not_json = { Some(b"hello".as_slice()) },
    wrong_shape = { Some(b"[1,2]".as_slice()) },
)]
fn defaults_when_unusable(data: Option<&[u8]>) {
    assert_eq!(parse_push(data), PushNotification::default());
}

#[test]
fn payload_overrides_defaults() {
    let n = parse_push(Some(
        br#"{"title":"New reply","body":"alice replied","tag":"reply-9",
             "requireInteraction":true,"url":"/blog/articles/9/"}"#,
    ));
    assert_eq!(n.title, "New reply");
    assert_eq!(n.body, "alice replied");
    assert_eq!(n.tag, "reply-9");
    assert!(n.require_interaction);
    assert_eq!(n.url, "/blog/articles/9/");
    assert_eq!(n.icon, DEFAULT_ICON);
    assert_eq!(n.badge, DEFAULT_BADGE);
}

#[yare::parameterized(
    body_wins = { r#"{"body":"b","message":"m"}"#, "b" },
    message_fallback = { r#"{"message":"m"}"#, "m" },
    empty_body = { r#"{"body":"","message":"m"}"#, "m" },
    neither = { r#"{"title":"t"}"#, DEFAULT_BODY },
)]
fn body_selection(json: &str, expected: &str) {
    assert_eq!(parse_push(Some(json.as_bytes())).body, expected);
}

#[test]
fn empty_strings_fall_back() {
    let n = parse_push(Some(br#"{"title":"","url":""}"#));
    assert_eq!(n.title, DEFAULT_TITLE);
    assert_eq!(n.url, DEFAULT_URL);
}

#[test]
fn serializes_for_display() -> anyhow::Result<()> {
    let value = serde_json::to_value(PushNotification::default())?;
    assert_eq!(value["requireInteraction"], false);
    assert_eq!(value["url"], DEFAULT_URL);
    Ok(())
}

fn window(id: &str, url: &str) -> ClientWindow {
    ClientWindow { id: id.into(), url: url.into() }
}

#[test]
fn click_focuses_matching_window() {
    let clients = [window("a", "/blog/"), window("b", "/blog/notifications/")];
    assert_eq!(click_target(None, &clients), ClickAction::Focus { id: "b".into() });
    assert_eq!(click_target(Some("/blog/"), &clients), ClickAction::Focus { id: "a".into() });
}

#[test]
fn click_opens_when_no_window_matches() {
    let clients = [window("a", "/blog/")];
    assert_eq!(
        click_target(Some("/blog/articles/1/"), &clients),
        ClickAction::Open { url: "/blog/articles/1/".into() }
    );
    assert_eq!(click_target(Some(""), &[]), ClickAction::Open { url: DEFAULT_URL.into() });
}
