//! Telegram side of the relaygram bridge.
//!
//! Translates Bot API updates into canonical events for the bridging
//! framework and replicates room events back through the Bot API, using
//! teloxide for transport.

pub mod config;
pub mod error;
mod inbound;
mod lookup;
pub mod media;
pub mod normalize;
pub mod outbound;
pub mod poller;
pub mod provision;
pub mod session;
pub mod worker;

pub use {
    config::TelegramConfig,
    error::{Error, Result},
    lookup::HealthSnapshot,
    normalize::{ApiOutcome, KnownApiError},
    poller::{EventStream, InboundEvent},
    provision::{ReconcileReport, reconcile_actors},
    worker::TelegramWorker,
};
