use {relaygram_bridge::ActorId, thiserror::Error};

use crate::normalize::KnownApiError;

/// Everything the worker can fail with, after remote responses have been
/// normalized. Callers branch on the variant, never on the message text.
#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP exchange with the Bot API failed (connect, timeout, non-JSON
    /// status). `status` is the HTTP status when one was received.
    #[error("telegram transport error: {description}")]
    Transport {
        status: Option<u16>,
        description: String,
    },

    /// The Bot API answered `ok: false`.
    #[error("telegram API error {code}: {description}")]
    Application {
        code: u16,
        known: KnownApiError,
        description: String,
    },

    #[error("malformed telegram response: {description}")]
    MalformedResponse { description: String },

    /// The event is well-formed but cannot be replicated to Telegram.
    #[error("unsupported event: {reason}")]
    Unsupported { reason: String },

    /// The event violates an invariant of the event model.
    #[error("invalid event: {reason}")]
    InvalidEvent { reason: String },

    /// Opening the actor's session failed (repository lookup or client setup).
    #[error("cannot open session for actor {actor_id}: {source}")]
    Session {
        actor_id: ActorId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("actor {actor_id} already has an active event stream")]
    AlreadyPolling { actor_id: ActorId },

    #[error(transparent)]
    Bridge(#[from] relaygram_bridge::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn invalid_event(reason: impl Into<String>) -> Self {
        Self::InvalidEvent {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn session(
        actor_id: ActorId,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Session {
            actor_id,
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Known Bot API condition behind this error, if it is an application error.
    #[must_use]
    pub fn known_api_error(&self) -> Option<KnownApiError> {
        match self {
            Self::Application { known, .. } => Some(*known),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
