use std::error::Error as StdError;

use crate::ids::ActorId;

/// Crate-wide result type for bridge collaborator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors shared across the collaborator traits.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid.
    #[error("invalid bridge input: {message}")]
    InvalidInput { message: String },

    /// The actor has not been provisioned.
    #[error("unknown actor: {actor_id}")]
    UnknownActor { actor_id: ActorId },

    /// Operation is currently unavailable (not configured/ready).
    #[error("bridge operation unavailable: {message}")]
    Unavailable { message: String },

    /// Wrapped source error from an external dependency.
    #[error("bridge operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    /// Integer parsing failed.
    #[error(transparent)]
    ParseInt(#[from] std::num::ParseIntError),
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unknown_actor(actor_id: ActorId) -> Self {
        Self::UnknownActor { actor_id }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
