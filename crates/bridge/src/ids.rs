use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// One bridged bot credential, provisioned outside the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub i64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Telegram user (or sender chat) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteUserId(pub i64);

impl fmt::Display for RemoteUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Telegram message identifier. Only unique within its chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteMessageId(pub i32);

impl fmt::Display for RemoteMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Telegram chat, addressed either numerically or by public channel username.
///
/// Serialized as `{"id": 42}` or `{"channel_username": "@news"}`; the textual
/// form is `42` or `@news`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteRoomId {
    Id(i64),
    ChannelUsername(String),
}

impl RemoteRoomId {
    /// Numeric chat id, when the room is addressed by one.
    #[must_use]
    pub fn as_id(&self) -> Option<i64> {
        match self {
            Self::Id(id) => Some(*id),
            Self::ChannelUsername(_) => None,
        }
    }
}

impl fmt::Display for RemoteRoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::ChannelUsername(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for RemoteRoomId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(name) = s.strip_prefix('@') {
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                return Err(Error::invalid_input(format!("bad channel username: {s}")));
            }
            return Ok(Self::ChannelUsername(s.to_string()));
        }
        Ok(Self::Id(s.parse()?))
    }
}

/// Matrix user id (`@localpart:server`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: impl Into<String>) -> crate::Result<Self> {
        let raw = raw.into();
        let valid = raw
            .strip_prefix('@')
            .and_then(|rest| rest.split_once(':'))
            .is_some_and(|(localpart, server)| {
                !localpart.is_empty()
                    && !server.is_empty()
                    && !raw.chars().any(char::is_whitespace)
            });
        if valid {
            Ok(Self(raw))
        } else {
            Err(Error::invalid_input(format!("malformed matrix user id: {raw}")))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Matrix room event id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference into the room-message media store (an `mxc://` URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(String);

impl MediaRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_parses_numeric_and_username() {
        assert_eq!("-100123".parse::<RemoteRoomId>().unwrap(), RemoteRoomId::Id(-100123));
        assert_eq!(
            "@news".parse::<RemoteRoomId>().unwrap(),
            RemoteRoomId::ChannelUsername("@news".into())
        );
        assert!("@".parse::<RemoteRoomId>().is_err());
        assert!("news".parse::<RemoteRoomId>().is_err());
    }

    #[test]
    fn room_id_serde_shape() {
        let json = serde_json::to_value(RemoteRoomId::Id(42)).unwrap();
        assert_eq!(json, serde_json::json!({ "id": 42 }));

        let json = serde_json::to_value(RemoteRoomId::ChannelUsername("@news".into())).unwrap();
        assert_eq!(json, serde_json::json!({ "channel_username": "@news" }));

        let back: RemoteRoomId =
            serde_json::from_value(serde_json::json!({ "channel_username": "@x" })).unwrap();
        assert_eq!(back, RemoteRoomId::ChannelUsername("@x".into()));
    }

    #[test]
    fn room_id_display_matches_parse() {
        for raw in ["42", "-100999", "@chan"] {
            assert_eq!(raw.parse::<RemoteRoomId>().unwrap().to_string(), raw);
        }
    }

    #[test]
    fn user_id_validation() {
        assert!(UserId::parse("@alice:example.org").is_ok());
        assert!(UserId::parse("alice:example.org").is_err());
        assert!(UserId::parse("@alice").is_err());
        assert!(UserId::parse("@:example.org").is_err());
        assert!(UserId::parse("@alice:").is_err());
        assert!(UserId::parse("@al ice:example.org").is_err());
    }

    #[test]
    fn user_id_rejects_malformed_on_deserialize() {
        let ok: UserId = serde_json::from_str("\"@bob:matrix.org\"").unwrap();
        assert_eq!(ok.as_str(), "@bob:matrix.org");
        assert!(serde_json::from_str::<UserId>("\"bob\"").is_err());
    }
}
