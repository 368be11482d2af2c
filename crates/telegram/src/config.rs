use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Worker-wide Telegram settings. Per-actor credentials live in the actor
/// repository, not here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot API base URL, for self-hosted Bot API servers. Defaults to
    /// `https://api.telegram.org/`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Maximum updates per `getUpdates` call (1..=100).
    pub poll_limit: u8,

    /// Long-poll wait in seconds.
    pub poll_timeout_secs: u32,

    /// HTTP client timeout in seconds. Must exceed `poll_timeout_secs` or
    /// every idle long poll is cut off client-side.
    pub request_timeout_secs: u64,

    /// Parent directory for per-transfer scratch directories. Defaults to
    /// the system temp dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

impl TelegramConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            poll_limit: 100,
            poll_timeout_secs: 30,
            request_timeout_secs: 45,
            scratch_dir: None,
        }
    }
}
