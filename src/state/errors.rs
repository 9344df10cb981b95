//! User-scoped error notices pushed by the server.

use crate::models::{ErrorNotice, Notification};

/// Substrings that mark a message as an authorization failure.
const AUTH_FAILURE_MARKERS: [&str; 6] = [
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "access is denied",
    "token",
];

/// Returns `true` if `text` reports a rejected or expired credential.
///
/// Shared by the error queue and by connection failures so both end in
/// the same re-authentication path.
pub fn is_auth_failure(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    AUTH_FAILURE_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

/// What the supervisor must do after an error notice was surfaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Nothing beyond showing the notice.
    Surface,
    /// The credential is no longer accepted.
    Reauthenticate(String),
}

/// Turns frames from the error queue into notifications.
#[derive(Debug, Default)]
pub struct ErrorChannelHandler {
    surfaced: u64,
}

impl ErrorChannelHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `{ "message": … }`, falling back to the raw payload text.
    pub fn on_error_frame(&mut self, payload: &str) -> (Notification, ErrorDisposition) {
        let message = serde_json::from_str::<ErrorNotice>(payload)
            .map(|notice| notice.message)
            .unwrap_or_else(|_| payload.to_string());

        self.surfaced += 1;

        let disposition = if is_auth_failure(&message) {
            ErrorDisposition::Reauthenticate(message.clone())
        } else {
            ErrorDisposition::Surface
        };

        (Notification::error(format!("Error: {message}")), disposition)
    }

    /// Number of notices surfaced this session.
    pub fn surfaced(&self) -> u64 {
        self.surfaced
    }
}
