//! Per-actor long-poll loop.
//!
//! Each call to [`poll_events`] spawns one task that owns the actor's
//! cursor and pushes translated events onto a bounded channel. The task ends
//! on a fatal remote error, when the stream is dropped, or when the session
//! is closed, and evicts the session on its way out.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use {
    futures::Stream,
    relaygram_bridge::{ActorId, RemoteEvent},
    teloxide::{
        payloads::setters::*,
        prelude::{Request, Requester},
        types::{AllowedUpdate, Update},
    },
    tokio::sync::{mpsc, oneshot},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    config::TelegramConfig,
    error::{Error, Result},
    inbound::{InboundContext, translate_update},
    normalize::normalize,
    session::SessionManager,
};

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Position in the remote update stream. Volatile; a new poller starts unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    next: Option<i32>,
}

impl Cursor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset for the next `getUpdates`, `None` before the first batch.
    #[must_use]
    pub fn offset(&self) -> Option<i32> {
        self.next
    }

    /// Move past a processed batch. Never moves backwards.
    pub fn advance_past<'a>(&mut self, batch: impl IntoIterator<Item = &'a Update>) {
        if let Some(highest) = batch.into_iter().map(|u| u.id.as_offset()).max() {
            self.next = Some(self.next.map_or(highest, |next| next.max(highest)));
        }
    }
}

/// One event handed to the consumer.
///
/// The poller does not translate the next update until this value is dropped
/// (or [`InboundEvent::into_event`] is called), so message links recorded
/// while handling it are visible to later edits and replies.
#[derive(Debug)]
pub struct InboundEvent {
    event: RemoteEvent,
    _delivered: oneshot::Sender<()>,
}

impl InboundEvent {
    #[must_use]
    pub fn event(&self) -> &RemoteEvent {
        &self.event
    }

    /// Take the event, acknowledging delivery.
    #[must_use]
    pub fn into_event(self) -> RemoteEvent {
        self.event
    }
}

/// Ordered stream of one actor's inbound events. Ends after a fatal error.
///
/// An update that fails to translate (for example because the bridge
/// framework was briefly unreachable) is yielded as an `Err` item and the
/// stream keeps going. Dropping the stream stops the poller.
pub struct EventStream {
    actor_id: ActorId,
    rx: mpsc::Receiver<Result<InboundEvent>>,
    cancel: CancellationToken,
}

impl EventStream {
    #[must_use]
    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    pub async fn next_event(&mut self) -> Option<Result<InboundEvent>> {
        self.rx.recv().await
    }

    /// Stop the poller; already queued events can still be drained.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Stream for EventStream {
    type Item = Result<InboundEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("actor_id", &self.actor_id)
            .field("closed", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Start polling for `ctx.session`'s actor.
pub(crate) fn poll_events(
    sessions: Arc<SessionManager>,
    ctx: InboundContext,
    config: &TelegramConfig,
) -> Result<EventStream> {
    let session = Arc::clone(&ctx.session);
    let actor_id = session.actor_id();
    if !session.try_start_polling() {
        return Err(Error::AlreadyPolling { actor_id });
    }

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let cancel = session.closed_token().child_token();
    let limits = PollLimits {
        limit: config.poll_limit,
        timeout_secs: config.poll_timeout_secs,
    };

    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        info!(%actor_id, "starting telegram polling loop");
        let outcome = run_poll_loop(&ctx, limits, &task_cancel, &tx).await;
        match outcome {
            Ok(()) => info!(%actor_id, "telegram polling stopped"),
            Err(e) => {
                error!(%actor_id, error = %e, "telegram polling failed");
                let _ = tx.send(Err(e)).await;
            },
        }
        sessions.evict(&session);
        session.stop_polling();
    });

    Ok(EventStream {
        actor_id,
        rx,
        cancel,
    })
}

#[derive(Debug, Clone, Copy)]
struct PollLimits {
    limit: u8,
    timeout_secs: u32,
}

async fn run_poll_loop(
    ctx: &InboundContext,
    limits: PollLimits,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<Result<InboundEvent>>,
) -> Result<()> {
    let actor_id = ctx.session.actor_id();
    let bot = ctx.session.bot();
    let mut cursor = Cursor::new();

    loop {
        let mut request = bot
            .get_updates()
            .limit(limits.limit)
            .timeout(limits.timeout_secs)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::EditedMessage]);
        if let Some(offset) = cursor.offset() {
            request = request.offset(offset);
        }

        let result = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            result = request.send() => result,
        };
        let updates = normalize(result).into_result()?;
        if updates.is_empty() {
            continue;
        }
        debug!(%actor_id, count = updates.len(), offset = ?cursor.offset(), "got telegram updates");

        for update in &updates {
            let update_id = update.id.0;
            let event = match translate_update(ctx, update.clone()).await {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    // Hand the failure to the consumer and keep polling.
                    warn!(%actor_id, update_id, error = %e, "failed to translate telegram update");
                    tokio::select! {
                        () = cancel.cancelled() => return Ok(()),
                        sent = tx.send(Err(e)) => {
                            if sent.is_err() {
                                return Ok(());
                            }
                        },
                    }
                    continue;
                },
            };

            let (delivered_tx, delivered_rx) = oneshot::channel();
            let item = InboundEvent {
                event,
                _delivered: delivered_tx,
            };
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                sent = tx.send(Ok(item)) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                },
            }
            // Resolves when the consumer drops the event.
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                _ = delivered_rx => {},
            }
        }

        cursor.advance_past(&updates);
    }
}
