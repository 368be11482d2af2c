use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::{Duration, Instant},
};

use {
    relaygram_bridge::{
        ActorId, ActorRepository, BridgeApi, MediaStore, RemoteMessageId, RemoteRoom,
        RemoteRoomId, RemoteUser, RemoteUserId, RoomEvent,
    },
    tracing::info,
};

use crate::{
    config::TelegramConfig,
    error::Result,
    inbound::InboundContext,
    lookup::{self, HealthSnapshot},
    media::MediaPipeline,
    outbound::TelegramOutbound,
    poller::{self, EventStream},
    session::SessionManager,
};

/// Cache TTL for probe results.
const PROBE_CACHE_TTL: Duration = Duration::from_secs(30);

/// Entry point the bridging framework drives: outbound delivery, inbound
/// event streams and remote lookups, all sharing one session registry.
pub struct TelegramWorker {
    config: TelegramConfig,
    sessions: Arc<SessionManager>,
    api: Arc<dyn BridgeApi>,
    media: Arc<MediaPipeline>,
    outbound: TelegramOutbound,
    probe_cache: RwLock<HashMap<ActorId, (HealthSnapshot, Instant)>>,
}

impl TelegramWorker {
    pub fn new(
        config: TelegramConfig,
        repository: Arc<dyn ActorRepository>,
        api: Arc<dyn BridgeApi>,
        store: Arc<dyn MediaStore>,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(repository, config.clone()));
        let media = Arc::new(MediaPipeline::new(store, config.scratch_dir()));
        let outbound = TelegramOutbound {
            sessions: Arc::clone(&sessions),
            api: Arc::clone(&api),
            media: Arc::clone(&media),
        };
        Self {
            config,
            sessions,
            api,
            media,
            outbound,
            probe_cache: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Deliver one room event. See [`TelegramOutbound::handle_event`].
    pub async fn handle_event(
        &self,
        actor_id: ActorId,
        room_id: &RemoteRoomId,
        event: &RoomEvent,
    ) -> Result<Option<RemoteMessageId>> {
        self.outbound.handle_event(actor_id, room_id, event).await
    }

    /// Start the actor's inbound event stream with a fresh cursor.
    pub async fn poll_events(&self, actor_id: ActorId) -> Result<EventStream> {
        let session = self.sessions.get_session(actor_id).await?;
        let ctx = InboundContext {
            session,
            api: Arc::clone(&self.api),
            media: Arc::clone(&self.media),
        };
        poller::poll_events(Arc::clone(&self.sessions), ctx, &self.config)
    }

    /// Stop bridging for an actor. Its event stream ends; outbound calls
    /// already running finish on the session they hold.
    pub fn stop_actor(&self, actor_id: ActorId) -> bool {
        let stopped = self.sessions.close(actor_id);
        if stopped {
            info!(%actor_id, "actor stopped");
        }
        stopped
    }

    pub async fn get_user(&self, actor_id: ActorId, user_id: RemoteUserId) -> Result<RemoteUser> {
        let session = self.sessions.get_session(actor_id).await?;
        lookup::get_user(&session, user_id).await
    }

    pub async fn get_room(&self, actor_id: ActorId, room_id: &RemoteRoomId) -> Result<RemoteRoom> {
        let session = self.sessions.get_session(actor_id).await?;
        lookup::get_room(&session, room_id).await
    }

    pub async fn get_room_members(
        &self,
        actor_id: ActorId,
        room_id: &RemoteRoomId,
    ) -> Result<Vec<RemoteUser>> {
        let session = self.sessions.get_session(actor_id).await?;
        lookup::get_room_members(&session, room_id).await
    }

    /// Check that the actor's bot token works. Results are cached briefly.
    pub async fn probe(&self, actor_id: ActorId) -> HealthSnapshot {
        {
            let cache = self.probe_cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some((snapshot, at)) = cache.get(&actor_id)
                && at.elapsed() < PROBE_CACHE_TTL
            {
                return snapshot.clone();
            }
        }

        let snapshot = match self.sessions.get_session(actor_id).await {
            Ok(session) => lookup::probe(&session).await,
            Err(e) => HealthSnapshot {
                actor_id,
                connected: false,
                details: Some(e.to_string()),
            },
        };

        self.probe_cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(actor_id, (snapshot.clone(), Instant::now()));
        snapshot
    }
}
