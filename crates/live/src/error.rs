// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure classes shared by the live client and the offline engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Transport is not open (send while disconnected, or reconnects exhausted).
    Disconnected,
    /// A bounded request deadline elapsed.
    Timeout,
    /// Connection-level failure before any response arrived.
    Network,
    /// Server answered with a non-success status.
    BadStatus,
    /// Payload could not be decoded.
    Malformed,
    /// Network unavailable and nothing cached to answer with.
    Offline,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Timeout => "TIMEOUT",
            Self::Network => "NETWORK",
            Self::BadStatus => "BAD_STATUS",
            Self::Malformed => "MALFORMED",
            Self::Offline => "OFFLINE",
        }
    }

    /// Whether the failure should be presented to the user as a network error.
    ///
    /// Timeouts are logged separately but look identical to the user.
    pub fn is_network_like(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Timeout | Self::Network | Self::Offline)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by outbound HTTP fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub code: ErrorCode,
    pub message: String,
}

impl FetchError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// Map a reqwest failure onto the shared taxonomy.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            ErrorCode::Timeout
        } else if err.is_status() {
            ErrorCode::BadStatus
        } else if err.is_decode() {
            ErrorCode::Malformed
        } else {
            ErrorCode::Network
        };
        Self::new(code, err.to_string())
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::from_reqwest(&err)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
