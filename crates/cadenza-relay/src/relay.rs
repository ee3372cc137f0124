//! Outbox relay: worker pool, LISTEN/NOTIFY or polling, retry, and
//! dead-lettering.
//!
//! Shutdown: [`EventRelay::shutdown`] signals the pool to stop; it does
//! not wait for in-flight dispatches. Rows left in `delivering` by a hard
//! stop are reaped back to `pending` on the next run.

use async_trait::async_trait;
use cadenza_core::EventEnvelope;
use cadenza_db::{OutboxEvent, OutboxRepository, OUTBOX_NOTIFY_CHANNEL};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;

use crate::handler::HandlerRegistry;

/// Maximum delay in seconds before redelivering a failed event. Caps
/// exponential backoff so that high attempt counts do not produce
/// excessively long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Computes backoff in seconds for a given attempt count (exponential with cap).
#[inline]
pub(crate) fn compute_retry_backoff_seconds(attempts: i32) -> u64 {
    (2_u64.pow(attempts.max(0) as u32)).min(MAX_RETRY_BACKOFF_SECS)
}

/// Invoked when an event exhausts its delivery attempts. Gives the wiring
/// a place to publish a compensating event (e.g. a processing-failed
/// event for a dead media-uploaded delivery).
#[async_trait]
pub trait DeadLetterHandler: Send + Sync {
    async fn on_dead(&self, envelope: &EventEnvelope, error: &str);
}

#[derive(Clone)]
pub struct RelayConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    /// Delivery attempts before an event is dead-lettered.
    pub max_attempts: i32,
    /// Interval in seconds between runs of the stale delivery reaper.
    pub reap_interval_secs: u64,
    /// Age in seconds after which a `delivering` row counts as stale.
    pub delivering_grace_secs: i64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            max_attempts: 5,
            reap_interval_secs: 60,
            delivering_grace_secs: 300,
        }
    }
}

pub struct EventRelay {
    shutdown_tx: mpsc::Sender<()>,
}

impl EventRelay {
    /// Start the relay worker pool.
    ///
    /// If `pool` is `Some`, the relay uses PostgreSQL LISTEN/NOTIFY to
    /// wake immediately when events are enqueued, in addition to polling
    /// at `poll_interval_ms`. If `pool` is `None`, only polling is used.
    pub fn start(
        outbox: OutboxRepository,
        registry: Arc<HandlerRegistry>,
        config: RelayConfig,
        pool: Option<sqlx::PgPool>,
        dead_letter: Option<Arc<dyn DeadLetterHandler>>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            Self::worker_pool(outbox, registry, config, shutdown_rx, pool, dead_letter).await;
        });

        Self { shutdown_tx }
    }

    async fn worker_pool(
        outbox: OutboxRepository,
        registry: Arc<HandlerRegistry>,
        config: RelayConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
        pool: Option<sqlx::PgPool>,
        dead_letter: Option<Arc<dyn DeadLetterHandler>>,
    ) {
        let use_listen = pool.is_some();
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            max_attempts = config.max_attempts,
            listen_notify = use_listen,
            "Outbox relay started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        // Channel to wake the main loop when LISTEN receives a NOTIFY
        // (avoids blocking on recv when no pool).
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        if let Some(pool) = pool {
            let tx = notify_tx.clone();
            tokio::spawn(async move {
                loop {
                    match sqlx::postgres::PgListener::connect_with(&pool).await {
                        Ok(mut listener) => {
                            if let Err(e) = listener.listen(OUTBOX_NOTIFY_CHANNEL).await {
                                tracing::warn!(error = %e, "LISTEN failed, will retry");
                                tokio::time::sleep(Duration::from_secs(5)).await;
                                continue;
                            }
                            while listener.recv().await.is_ok() {
                                let _ = tx.send(()).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "PgListener connect failed, will retry");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            });
        }

        // Spawn stale delivery reaper (if interval > 0)
        let (reaper_shutdown_tx, mut reaper_shutdown_rx) = mpsc::channel::<()>(1);
        if config.reap_interval_secs > 0 {
            let outbox_for_reaper = outbox.clone();
            let reap_interval = Duration::from_secs(config.reap_interval_secs);
            let grace = config.delivering_grace_secs;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(reap_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            match outbox_for_reaper.reap_stale_delivering(grace).await {
                                Ok(0) => {}
                                Ok(n) => tracing::warn!(reaped = n, "Returned stale deliveries to pending"),
                                Err(e) => tracing::error!(error = %e, "Stale delivery reaper failed"),
                            }
                        }
                        _ = reaper_shutdown_rx.recv() => break,
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Outbox relay shutting down");
                    let _ = reaper_shutdown_tx.send(()).await;
                    break;
                }
                _ = notify_rx.recv() => {
                    Self::claim_and_dispatch_one(
                        &outbox,
                        &registry,
                        &semaphore,
                        &config,
                        dead_letter.clone(),
                    ).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch_one(
                        &outbox,
                        &registry,
                        &semaphore,
                        &config,
                        dead_letter.clone(),
                    ).await;
                }
            }
        }

        tracing::info!("Outbox relay stopped");
    }

    async fn claim_and_dispatch_one(
        outbox: &OutboxRepository,
        registry: &Arc<HandlerRegistry>,
        semaphore: &Arc<Semaphore>,
        config: &RelayConfig,
        dead_letter: Option<Arc<dyn DeadLetterHandler>>,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No relay workers available, skipping claim");
                return;
            }
        };

        match outbox.claim_next().await {
            Ok(Some(event)) => {
                let outbox = outbox.clone();
                let registry = registry.clone();
                let max_attempts = config.max_attempts;

                tokio::spawn(async move {
                    let _permit = permit;
                    dispatch_event(event, outbox, registry, max_attempts, dead_letter).await;
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No deliverable events in outbox");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim event from outbox");
            }
        }
    }

    /// Signals the worker pool to stop claiming new events and exit the
    /// main loop. Returns immediately; in-flight dispatches finish on
    /// their own.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating outbox relay shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Claim and dispatch a single due event inline. Returns whether an event
/// was claimed. Used by the worker pool and by tests that drain the
/// outbox deterministically.
pub async fn process_next(
    outbox: &OutboxRepository,
    registry: &Arc<HandlerRegistry>,
    max_attempts: i32,
    dead_letter: Option<Arc<dyn DeadLetterHandler>>,
) -> Result<bool, cadenza_core::AppError> {
    match outbox.claim_next().await? {
        Some(event) => {
            dispatch_event(
                event,
                outbox.clone(),
                registry.clone(),
                max_attempts,
                dead_letter,
            )
            .await;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[tracing::instrument(
    skip(event, outbox, registry, dead_letter),
    fields(event.id = %event.id, event.kind = %event.event_type)
)]
async fn dispatch_event(
    event: OutboxEvent,
    outbox: OutboxRepository,
    registry: Arc<HandlerRegistry>,
    max_attempts: i32,
    dead_letter: Option<Arc<dyn DeadLetterHandler>>,
) {
    let envelope = match event.envelope() {
        Ok(envelope) => envelope,
        Err(e) => {
            // Undeserializable payloads can never be handled.
            tracing::error!(error = %e, "Outbox payload no longer deserializes, dead-lettering");
            if let Err(e) = outbox.mark_dead(event.id, &e.to_string()).await {
                tracing::error!(error = %e, "Failed to mark event dead");
            }
            return;
        }
    };

    let handlers = registry.handlers_for(envelope.kind());
    if handlers.is_empty() {
        tracing::debug!("No subscribers for event kind, marking delivered");
    }

    // Every subscriber sees the event; a transient failure in any of
    // them reschedules the whole delivery. Handlers that already
    // succeeded will see the event again; idempotency is their
    // contract.
    let mut transient_error: Option<String> = None;
    for handler in handlers {
        match handler.handle(&envelope).await {
            Ok(()) => {
                tracing::debug!(handler = handler.name(), "Handler completed");
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    handler = handler.name(),
                    error = %e,
                    attempts = event.attempts,
                    "Handler failed transiently"
                );
                transient_error = Some(format!("{}: {}", handler.name(), e));
                break;
            }
            Err(e) => {
                // Permanent: redelivery cannot help. Log and move on.
                tracing::error!(
                    handler = handler.name(),
                    error = %e,
                    "Handler failed permanently, dropping for this subscriber"
                );
            }
        }
    }

    match transient_error {
        None => {
            if let Err(e) = outbox.mark_delivered(event.id).await {
                tracing::error!(error = %e, "Failed to mark event delivered");
            }
        }
        Some(error) => {
            let next_attempt = event.attempts + 1;
            if next_attempt >= max_attempts {
                tracing::error!(
                    attempts = next_attempt,
                    error = %error,
                    "Event exhausted delivery attempts, dead-lettering"
                );
                if let Err(e) = outbox.mark_dead(event.id, &error).await {
                    tracing::error!(error = %e, "Failed to mark event dead");
                }
                if let Some(hook) = dead_letter {
                    hook.on_dead(&envelope, &error).await;
                }
            } else {
                let backoff = compute_retry_backoff_seconds(event.attempts);
                tracing::info!(
                    attempts = next_attempt,
                    backoff_seconds = backoff,
                    "Rescheduling event delivery"
                );
                if let Err(e) = outbox.reschedule(event.id, &error, backoff).await {
                    tracing::error!(error = %e, "Failed to reschedule event");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_exponential_then_capped() {
        assert_eq!(compute_retry_backoff_seconds(0), 1);
        assert_eq!(compute_retry_backoff_seconds(1), 2);
        assert_eq!(compute_retry_backoff_seconds(2), 4);
        assert_eq!(compute_retry_backoff_seconds(8), 256);
        assert_eq!(compute_retry_backoff_seconds(9), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(compute_retry_backoff_seconds(10), MAX_RETRY_BACKOFF_SECS);
    }

    #[test]
    fn negative_attempts_do_not_panic() {
        assert_eq!(compute_retry_backoff_seconds(-1), 1);
    }
}
