use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::{
    Error, Result,
    ids::{ActorId, UserId},
};

/// Credentials of one actor: the bot token and the Matrix user administering it.
#[derive(Clone, Serialize, Deserialize)]
pub struct ActorSessionData {
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,
    pub admin: UserId,
}

impl ActorSessionData {
    pub fn new(token: impl Into<String>, admin: UserId) -> Self {
        Self {
            token: Secret::new(token.into()),
            admin,
        }
    }
}

impl PartialEq for ActorSessionData {
    fn eq(&self, other: &Self) -> bool {
        self.admin == other.admin && self.token.expose_secret() == other.token.expose_secret()
    }
}

impl Eq for ActorSessionData {}

impl std::fmt::Debug for ActorSessionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSessionData")
            .field("token", &"[REDACTED]")
            .field("admin", &self.admin)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Persistent actor storage, owned by the framework.
#[async_trait]
pub trait ActorRepository: Send + Sync {
    async fn get_actor_data(&self, actor_id: ActorId) -> Result<ActorSessionData>;
    async fn list_actors(&self) -> Result<Vec<(ActorId, ActorSessionData)>>;
    async fn add_actor(&self, actor_id: ActorId, data: ActorSessionData) -> Result<()>;
    async fn update_actor(&self, actor_id: ActorId, data: ActorSessionData) -> Result<()>;
    async fn remove_actor(&self, actor_id: ActorId) -> Result<()>;
}

/// Process-local repository, used by the CLI and tests.
#[derive(Default)]
pub struct MemoryActorRepository {
    actors: RwLock<HashMap<ActorId, ActorSessionData>>,
}

impl MemoryActorRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actors(actors: impl IntoIterator<Item = (ActorId, ActorSessionData)>) -> Self {
        Self {
            actors: RwLock::new(actors.into_iter().collect()),
        }
    }
}

#[async_trait]
impl ActorRepository for MemoryActorRepository {
    async fn get_actor_data(&self, actor_id: ActorId) -> Result<ActorSessionData> {
        let actors = self.actors.read().unwrap_or_else(PoisonError::into_inner);
        actors
            .get(&actor_id)
            .cloned()
            .ok_or_else(|| Error::unknown_actor(actor_id))
    }

    async fn list_actors(&self) -> Result<Vec<(ActorId, ActorSessionData)>> {
        let actors = self.actors.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<_> = actors.iter().map(|(id, d)| (*id, d.clone())).collect();
        list.sort_by_key(|(id, _)| *id);
        Ok(list)
    }

    async fn add_actor(&self, actor_id: ActorId, data: ActorSessionData) -> Result<()> {
        let mut actors = self.actors.write().unwrap_or_else(PoisonError::into_inner);
        if actors.contains_key(&actor_id) {
            return Err(Error::invalid_input(format!(
                "actor {actor_id} already exists"
            )));
        }
        actors.insert(actor_id, data);
        Ok(())
    }

    async fn update_actor(&self, actor_id: ActorId, data: ActorSessionData) -> Result<()> {
        let mut actors = self.actors.write().unwrap_or_else(PoisonError::into_inner);
        match actors.get_mut(&actor_id) {
            Some(slot) => {
                *slot = data;
                Ok(())
            },
            None => Err(Error::unknown_actor(actor_id)),
        }
    }

    async fn remove_actor(&self, actor_id: ActorId) -> Result<()> {
        let mut actors = self.actors.write().unwrap_or_else(PoisonError::into_inner);
        actors
            .remove(&actor_id)
            .map(|_| ())
            .ok_or_else(|| Error::unknown_actor(actor_id))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> UserId {
        UserId::parse("@admin:example.org").unwrap()
    }

    #[test]
    fn debug_redacts_token() {
        let data = ActorSessionData::new("123:SECRET", admin());
        let dbg = format!("{data:?}");
        assert!(!dbg.contains("SECRET"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn equality_compares_token() {
        let a = ActorSessionData::new("t1", admin());
        assert_eq!(a, ActorSessionData::new("t1", admin()));
        assert_ne!(a, ActorSessionData::new("t2", admin()));
    }

    #[test]
    fn serialize_roundtrip_keeps_token() {
        let data = ActorSessionData::new("tok", admin());
        let json = serde_json::to_string(&data).unwrap();
        let back: ActorSessionData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
    }

    #[tokio::test]
    async fn memory_repository_lifecycle() {
        let repo = MemoryActorRepository::new();
        let id = ActorId(7);
        assert!(matches!(
            repo.get_actor_data(id).await,
            Err(Error::UnknownActor { .. })
        ));

        repo.add_actor(id, ActorSessionData::new("a", admin()))
            .await
            .unwrap();
        assert!(repo.add_actor(id, ActorSessionData::new("b", admin())).await.is_err());

        repo.update_actor(id, ActorSessionData::new("b", admin()))
            .await
            .unwrap();
        assert_eq!(
            repo.get_actor_data(id).await.unwrap().token.expose_secret(),
            "b"
        );

        repo.remove_actor(id).await.unwrap();
        assert!(repo.list_actors().await.unwrap().is_empty());
        assert!(repo.remove_actor(id).await.is_err());
    }
}
