//! Actor-level commands: token probes and configuration reconciliation.

use std::{collections::BTreeMap, path::Path, sync::Arc};

use {
    anyhow::{Context, Result, bail},
    async_trait::async_trait,
    relaygram_bridge::{
        ActorId, ActorSessionData, BridgeApi, ByteStream, EventId, MediaDownload, MediaRef,
        MediaStore, MemoryActorRepository, RemoteMessageId, RemoteRoomId,
    },
    relaygram_config::load_or_discover,
    relaygram_telegram::{TelegramWorker, reconcile_actors},
    tracing::info,
};

/// Framework stand-in for commands that never touch rooms: nothing is
/// bridged and media is unreachable.
struct Detached;

#[async_trait]
impl BridgeApi for Detached {
    async fn is_room_bridged(&self, _room_id: &RemoteRoomId) -> relaygram_bridge::Result<bool> {
        Ok(false)
    }

    async fn get_message_event_id(
        &self,
        _room_id: &RemoteRoomId,
        _message_id: RemoteMessageId,
    ) -> relaygram_bridge::Result<Option<EventId>> {
        Ok(None)
    }

    async fn get_remote_message_id(
        &self,
        _room_id: &RemoteRoomId,
        _event_id: &EventId,
    ) -> relaygram_bridge::Result<Option<RemoteMessageId>> {
        Ok(None)
    }

    async fn link_message_id(
        &self,
        _room_id: &RemoteRoomId,
        _event_id: &EventId,
        _message_id: RemoteMessageId,
    ) -> relaygram_bridge::Result<()> {
        Err(relaygram_bridge::Error::unavailable("no bridge attached"))
    }
}

#[async_trait]
impl MediaStore for Detached {
    async fn download(&self, _media: &MediaRef) -> relaygram_bridge::Result<MediaDownload> {
        Err(relaygram_bridge::Error::unavailable("no media store attached"))
    }

    async fn upload(
        &self,
        _body: ByteStream,
        _content_type: Option<&str>,
        _file_name: Option<&str>,
        _length: Option<u64>,
    ) -> relaygram_bridge::Result<MediaRef> {
        Err(relaygram_bridge::Error::unavailable("no media store attached"))
    }
}

pub async fn probe(config_path: Option<&Path>, only: Option<ActorId>, json: bool) -> Result<()> {
    let (config, _) = load_or_discover(config_path)?;
    let actors = config.actor_sessions()?;

    let targets: Vec<ActorId> = match only {
        Some(id) if actors.contains_key(&id) => vec![id],
        Some(id) => bail!("actor {id} is not configured"),
        None => actors.keys().copied().collect(),
    };
    if targets.is_empty() {
        eprintln!("No actors configured.");
        return Ok(());
    }

    let repository = Arc::new(MemoryActorRepository::with_actors(actors));
    let detached = Arc::new(Detached);
    let worker = TelegramWorker::new(
        config.telegram,
        repository,
        Arc::clone(&detached) as Arc<dyn BridgeApi>,
        detached,
    );

    let mut failed = 0;
    for actor_id in targets {
        let snapshot = worker.probe(actor_id).await;
        if !snapshot.connected {
            failed += 1;
        }
        if json {
            println!("{}", serde_json::to_string(&snapshot)?);
        } else {
            let state = if snapshot.connected {
                "ok"
            } else {
                "FAILED"
            };
            let details = snapshot.details.as_deref().unwrap_or("");
            println!("actor {actor_id}: {state} {details}");
        }
    }

    if failed > 0 {
        bail!("{failed} actor(s) failed the probe");
    }
    Ok(())
}

pub async fn sync(config_path: Option<&Path>, existing: Option<&Path>, json: bool) -> Result<()> {
    let (config, _) = load_or_discover(config_path)?;
    let configured = config.actor_sessions()?;

    let persisted = match existing {
        Some(path) => load_existing(path)?,
        None => BTreeMap::new(),
    };
    let repository = MemoryActorRepository::with_actors(persisted);

    let report = reconcile_actors(&repository, &configured).await?;
    info!(
        added = report.added.len(),
        updated = report.updated.len(),
        removed = report.removed.len(),
        "actor reconciliation planned"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.is_empty() {
        println!("Actors already in sync.");
    } else {
        for (label, ids) in [
            ("add", &report.added),
            ("update", &report.updated),
            ("remove", &report.removed),
        ] {
            for id in ids {
                println!("{label} {id}");
            }
        }
    }
    Ok(())
}

fn load_existing(path: &Path) -> Result<BTreeMap<ActorId, ActorSessionData>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid actor snapshot {}", path.display()))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, relaygram_bridge::UserId};

    #[test]
    fn existing_snapshot_keyed_by_numeric_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actors.json");
        std::fs::write(
            &path,
            r#"{"4": {"token": "4:abc", "admin": "@ops:example.org"}}"#,
        )
        .unwrap();
        let actors = load_existing(&path).unwrap();
        assert_eq!(
            actors[&ActorId(4)],
            ActorSessionData::new("4:abc", UserId::parse("@ops:example.org").unwrap())
        );
    }

    #[test]
    fn existing_snapshot_rejects_bad_admin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actors.json");
        std::fs::write(&path, r#"{"4": {"token": "t", "admin": "ops"}}"#).unwrap();
        assert!(load_existing(&path).is_err());
    }

    #[tokio::test]
    async fn probe_unknown_actor_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relaygram.toml");
        std::fs::write(&path, "").unwrap();
        let err = probe(Some(path.as_path()), Some(ActorId(9)), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[tokio::test]
    async fn sync_with_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("relaygram.toml");
        std::fs::write(
            &config,
            "[[actors]]\nid = 1\ntoken = \"1:a\"\nadmin = \"@a:example.org\"\n",
        )
        .unwrap();
        let existing = dir.path().join("actors.json");
        std::fs::write(
            &existing,
            r#"{"2": {"token": "2:b", "admin": "@b:example.org"}}"#,
        )
        .unwrap();
        sync(Some(config.as_path()), Some(existing.as_path()), true).await.unwrap();
    }
}
