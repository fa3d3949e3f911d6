// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification delivery: live channel, polling fallback, badges and toasts.

pub mod client;
pub mod msg;
pub mod state;

pub use client::{NotificationClient, NotificationHandle, NotifySettings, NotifyUpdate};
pub use state::{Counters, Toast};
