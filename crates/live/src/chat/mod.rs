// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instant chat: per-peer windows over their own channels.

pub mod manager;
pub mod msg;
pub mod registry;
pub mod window;

pub use manager::{ChatHandle, ChatManager, ChatUpdate};
pub use window::PeerInfo;
