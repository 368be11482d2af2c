//! Typed shape of `relaygram.toml`.

use std::collections::BTreeMap;

use {
    relaygram_bridge::{ActorId, ActorSessionData, UserId},
    relaygram_telegram::TelegramConfig,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelaygramConfig {
    /// Worker-wide Telegram tuning.
    pub telegram: TelegramConfig,
    /// Actors the deployment expects to exist. Reconciled into the actor
    /// repository by `relaygram sync-actors`.
    pub actors: Vec<ActorConfig>,
}

/// One `[[actors]]` entry.
#[derive(Clone, Deserialize)]
pub struct ActorConfig {
    pub id: ActorId,
    pub token: Secret<String>,
    /// Matrix user allowed to bridge chats through this bot. Kept as a raw
    /// string so validation can point at the offending entry.
    pub admin: String,
}

impl std::fmt::Debug for ActorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorConfig")
            .field("id", &self.id)
            .field("token", &"[REDACTED]")
            .field("admin", &self.admin)
            .finish()
    }
}

impl RelaygramConfig {
    /// Configured actors keyed by id, in the form the actor repository stores.
    ///
    /// Fails on the first malformed admin id. Later duplicates of an id
    /// replace earlier ones; `validate` reports them.
    pub fn actor_sessions(&self) -> relaygram_bridge::Result<BTreeMap<ActorId, ActorSessionData>> {
        self.actors
            .iter()
            .map(|actor| {
                let admin = UserId::parse(actor.admin.as_str())?;
                Ok((
                    actor.id,
                    ActorSessionData::new(actor.token.expose_secret().clone(), admin),
                ))
            })
            .collect()
    }
}
