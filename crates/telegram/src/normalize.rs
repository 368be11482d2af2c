//! Collapses teloxide request results into one closed outcome type.
//!
//! Every remote call goes through [`normalize`] so the rest of the worker
//! branches on [`ApiOutcome`] variants instead of teloxide error internals.

use teloxide::{ApiError, RequestError};

use crate::error::{Error, Result};

/// Bot API error conditions the worker reacts to specifically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownApiError {
    MessageToDeleteNotFound,
    MessageCantBeDeleted,
    MessageNotModified,
    MessageToEditNotFound,
    MessageCantBeEdited,
    /// Another client is long-polling with the same token (HTTP 409).
    ConflictingPoller,
    InvalidToken,
    BotBlocked,
    ChatNotFound,
    RateLimited,
    ChatMigrated,
    Other,
}

impl KnownApiError {
    /// HTTP status the Bot API reports for this condition.
    #[must_use]
    pub fn status_code(self) -> u16 {
        match self {
            Self::InvalidToken => 401,
            Self::BotBlocked => 403,
            Self::ConflictingPoller => 409,
            Self::RateLimited => 429,
            Self::MessageToDeleteNotFound
            | Self::MessageCantBeDeleted
            | Self::MessageNotModified
            | Self::MessageToEditNotFound
            | Self::MessageCantBeEdited
            | Self::ChatNotFound
            | Self::ChatMigrated
            | Self::Other => 400,
        }
    }
}

impl From<&ApiError> for KnownApiError {
    fn from(error: &ApiError) -> Self {
        match error {
            ApiError::MessageToDeleteNotFound => Self::MessageToDeleteNotFound,
            ApiError::MessageCantBeDeleted => Self::MessageCantBeDeleted,
            ApiError::MessageNotModified => Self::MessageNotModified,
            ApiError::MessageToEditNotFound => Self::MessageToEditNotFound,
            ApiError::MessageCantBeEdited => Self::MessageCantBeEdited,
            ApiError::TerminatedByOtherGetUpdates => Self::ConflictingPoller,
            ApiError::InvalidToken => Self::InvalidToken,
            ApiError::BotBlocked => Self::BotBlocked,
            ApiError::ChatNotFound => Self::ChatNotFound,
            _ => Self::Other,
        }
    }
}

/// Result of one remote call.
#[derive(Debug)]
pub enum ApiOutcome<T> {
    Success(T),
    TransportError {
        status: Option<u16>,
        description: String,
    },
    ApplicationError {
        code: u16,
        known: KnownApiError,
        description: String,
    },
    MalformedResponse {
        description: String,
    },
    Unknown(Box<dyn std::error::Error + Send + Sync>),
}

impl<T> ApiOutcome<T> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether this is the application error `known`.
    #[must_use]
    pub fn is(&self, known: KnownApiError) -> bool {
        matches!(self, Self::ApplicationError { known: k, .. } if *k == known)
    }

    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Success(value) => Ok(value),
            Self::TransportError {
                status,
                description,
            } => Err(Error::Transport {
                status,
                description,
            }),
            Self::ApplicationError {
                code,
                known,
                description,
            } => Err(Error::Application {
                code,
                known,
                description,
            }),
            Self::MalformedResponse { description } => Err(Error::MalformedResponse { description }),
            Self::Unknown(source) => Err(Error::External {
                context: "unexpected telegram failure".into(),
                source,
            }),
        }
    }
}

/// Classify a teloxide request result.
pub fn normalize<T>(result: std::result::Result<T, RequestError>) -> ApiOutcome<T> {
    match result {
        Ok(value) => ApiOutcome::Success(value),
        Err(error) => classify(error),
    }
}

fn classify<T>(error: RequestError) -> ApiOutcome<T> {
    match error {
        RequestError::Api(api) => {
            let known = KnownApiError::from(&api);
            ApiOutcome::ApplicationError {
                code: known.status_code(),
                known,
                description: api.to_string(),
            }
        },
        RequestError::RetryAfter(wait) => ApiOutcome::ApplicationError {
            code: KnownApiError::RateLimited.status_code(),
            known: KnownApiError::RateLimited,
            description: format!("Too Many Requests: retry after {}s", wait.duration().as_secs()),
        },
        RequestError::MigrateToChatId(chat) => ApiOutcome::ApplicationError {
            code: KnownApiError::ChatMigrated.status_code(),
            known: KnownApiError::ChatMigrated,
            description: format!("group migrated to supergroup {chat:?}"),
        },
        RequestError::Network(e) => ApiOutcome::TransportError {
            status: e.status().map(|s| s.as_u16()),
            description: e.to_string(),
        },
        RequestError::InvalidJson { source, .. } => ApiOutcome::MalformedResponse {
            description: source.to_string(),
        },
        other => ApiOutcome::Unknown(Box::new(other)),
    }
}
