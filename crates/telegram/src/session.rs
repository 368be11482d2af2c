use std::{
    collections::HashMap,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use {
    relaygram_bridge::{ActorId, ActorRepository, UserId},
    secrecy::ExposeSecret,
    teloxide::Bot,
    tokio::sync::OnceCell,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info},
};

use crate::{
    config::TelegramConfig,
    error::{Error, Result},
};

/// One live Bot API session for an actor.
///
/// A session is closed exactly once, by [`SessionManager::evict`] or
/// [`SessionManager::close`]; clones of the `Arc` held by in-flight outbound
/// calls keep working until they finish.
pub struct Session {
    generation: u64,
    actor_id: ActorId,
    admin: UserId,
    bot: Bot,
    closed: CancellationToken,
    polling: AtomicBool,
}

impl Session {
    #[must_use]
    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    /// Matrix user allowed to bridge chats through this actor.
    #[must_use]
    pub fn admin(&self) -> &UserId {
        &self.admin
    }

    #[must_use]
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled when the session is closed.
    #[must_use]
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Claim the single poller slot. Returns `false` if a poller already runs.
    pub(crate) fn try_start_polling(&self) -> bool {
        self.polling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn stop_polling(&self) {
        self.polling.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("actor_id", &self.actor_id)
            .field("generation", &self.generation)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

type SessionSlot = Arc<OnceCell<Arc<Session>>>;

/// Registry of live sessions, one per actor.
///
/// The lock guards only map mutation. Sessions are opened inside a per-actor
/// [`OnceCell`] outside the lock, so concurrent misses for one actor share a
/// single open while other actors are not blocked.
pub struct SessionManager {
    repository: Arc<dyn ActorRepository>,
    config: TelegramConfig,
    sessions: RwLock<HashMap<ActorId, SessionSlot>>,
    generations: AtomicU64,
}

impl SessionManager {
    pub fn new(repository: Arc<dyn ActorRepository>, config: TelegramConfig) -> Self {
        Self {
            repository,
            config,
            sessions: RwLock::new(HashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    /// Return the actor's live session, opening it on first use.
    pub async fn get_session(&self, actor_id: ActorId) -> Result<Arc<Session>> {
        if let Some(session) = self.cached(actor_id) {
            return Ok(session);
        }

        let slot = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            let slot = sessions.entry(actor_id).or_default();
            // Evicted concurrently but not yet removed.
            if slot.get().is_some_and(|s| s.is_closed()) {
                *slot = SessionSlot::default();
            }
            Arc::clone(slot)
        };

        match slot.get_or_try_init(|| self.open(actor_id)).await {
            Ok(session) => Ok(Arc::clone(session)),
            Err(e) => {
                self.discard_empty_slot(actor_id, &slot);
                Err(e)
            },
        }
    }

    /// Drop a slot whose open failed so unknown actors do not accumulate.
    ///
    /// Slots are only cloned under the write lock, so a strong count of two
    /// (the map and `slot`) means no other caller is waiting on it.
    fn discard_empty_slot(&self, actor_id: ActorId, slot: &SessionSlot) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let unused = sessions.get(&actor_id).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && current.get().is_none() && Arc::strong_count(slot) == 2
        });
        if unused {
            sessions.remove(&actor_id);
        }
    }

    fn cached(&self, actor_id: ActorId) -> Option<Arc<Session>> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(&actor_id)
            .and_then(|slot| slot.get())
            .filter(|session| !session.is_closed())
            .map(Arc::clone)
    }

    async fn open(&self, actor_id: ActorId) -> Result<Arc<Session>> {
        let data = self
            .repository
            .get_actor_data(actor_id)
            .await
            .map_err(|e| Error::session(actor_id, e))?;

        // Client timeout must outlast the long-poll wait.
        let client = teloxide::net::default_reqwest_settings()
            .timeout(self.config.request_timeout())
            .build()
            .map_err(|e| Error::session(actor_id, e))?;
        let mut bot = Bot::with_client(data.token.expose_secret(), client);
        if let Some(api_url) = &self.config.api_url {
            let url = reqwest::Url::parse(api_url).map_err(|e| Error::session(actor_id, e))?;
            bot = bot.set_api_url(url);
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        info!(%actor_id, generation, "telegram session opened");
        Ok(Arc::new(Session {
            generation,
            actor_id,
            admin: data.admin,
            bot,
            closed: CancellationToken::new(),
            polling: AtomicBool::new(false),
        }))
    }

    /// Close `session` and drop it from the registry if it is still the
    /// registered one. A newer session for the same actor is left alone.
    pub fn evict(&self, session: &Arc<Session>) -> bool {
        session.closed.cancel();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let registered = sessions
            .get(&session.actor_id)
            .and_then(|slot| slot.get())
            .is_some_and(|current| Arc::ptr_eq(current, session));
        if registered {
            sessions.remove(&session.actor_id);
            info!(actor_id = %session.actor_id, generation = session.generation, "telegram session evicted");
        } else {
            debug!(actor_id = %session.actor_id, generation = session.generation, "stale session already evicted");
        }
        registered
    }

    /// Close whatever session the actor has. Returns `false` if none was open.
    pub fn close(&self, actor_id: ActorId) -> bool {
        let slot = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            sessions.remove(&actor_id)
        };
        match slot.as_ref().and_then(|slot| slot.get()) {
            Some(session) => {
                session.closed.cancel();
                info!(%actor_id, generation = session.generation, "telegram session closed");
                true
            },
            None => false,
        }
    }

    /// Actors with a live session, sorted.
    #[must_use]
    pub fn active_actors(&self) -> Vec<ActorId> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<ActorId> = sessions
            .iter()
            .filter(|(_, slot)| slot.get().is_some_and(|s| !s.is_closed()))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn config(&self) -> &TelegramConfig {
        &self.config
    }
}
