//! Broadcast coordinator - recompute-and-push orchestration.
//!
//! The coordinator reacts to four inputs: a session connecting, a session
//! changing its partition key, the change feed signalling, and a session
//! disconnecting. Each reaction resolves to "recompute the aggregate for
//! some set of sessions and push each result to its session only".
//!
//! Per session the recompute flight is single-flight: a trigger landing
//! while a flight is running is absorbed into one pending follow-up, and
//! the follow-up reads the partition key fresh, so a key set mid-flight is
//! never lost. Across sessions, flights run concurrently on the runtime's
//! worker pool, bounded by a semaphore so a burst of sessions cannot
//! monopolize the database.
//!
//! Failures stay per-session: a compute error is logged with the session
//! id and partition key and the session keeps its stale aggregate; a push
//! to a channel that closed mid-flight is logged and dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Semaphore};

use crate::config::EngineConfig;
use crate::domain::{AggregateResult, AggregateUpdate, PartitionKey, SessionId};
use crate::ports::{AggregateSource, TransportSink};

use super::registry::{FlightOutcome, RecomputeClaim, RegistryError, SessionRegistry};

/// Orchestrates aggregate recomputation and push-out for all sessions.
pub struct BroadcastCoordinator {
    registry: Arc<SessionRegistry>,
    source: Arc<dyn AggregateSource>,
    transport: Arc<dyn TransportSink>,

    /// Bounds concurrent aggregate computations across all sessions.
    recompute_slots: Semaphore,

    /// Count of running flights, watched by shutdown for draining.
    in_flight: watch::Sender<usize>,

    shutting_down: AtomicBool,
}

impl BroadcastCoordinator {
    /// Creates a coordinator wired to its collaborators.
    pub fn new(
        registry: Arc<SessionRegistry>,
        source: Arc<dyn AggregateSource>,
        transport: Arc<dyn TransportSink>,
        config: &EngineConfig,
    ) -> Arc<Self> {
        let (in_flight, _) = watch::channel(0);
        Arc::new(Self {
            registry,
            source,
            transport,
            recompute_slots: Semaphore::new(config.max_concurrent_recomputes),
            in_flight,
            shutting_down: AtomicBool::new(false),
        })
    }

    /// The registry this coordinator manages sessions through.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// A session connected: push its first aggregate (empty partition key).
    pub fn on_connect(self: &Arc<Self>, id: SessionId) {
        tracing::debug!(session_id = %id, "Session connected");
        self.trigger(id);
    }

    /// A session picked a new partition key: recompute for it alone.
    ///
    /// A no-op key update still triggers a recompute. An unknown session
    /// lost a race with its own disconnect; logged and ignored.
    pub fn on_partition_key_change(self: &Arc<Self>, id: SessionId, key: PartitionKey) {
        match self.registry.set_partition_key(id, key) {
            Ok(previous) => {
                tracing::debug!(
                    session_id = %id,
                    previous_key = %previous,
                    "Partition key changed"
                );
                self.trigger(id);
            }
            Err(RegistryError::UnknownSession(_)) => {
                tracing::debug!(session_id = %id, "Key change for unknown session, ignoring");
            }
        }
    }

    /// The data changed: fan out a recompute to every live session.
    pub fn on_change_signal(self: &Arc<Self>) {
        let live = self.registry.live_sessions();
        tracing::debug!(sessions = live.len(), "Change signal, fanning out");
        for id in live {
            self.trigger(id);
        }
    }

    /// A session disconnected: remove it and discard any in-flight result.
    pub fn on_disconnect(self: &Arc<Self>, id: SessionId) {
        match self.registry.unregister(id) {
            Ok(()) => tracing::debug!(session_id = %id, "Session disconnected"),
            Err(RegistryError::UnknownSession(_)) => {
                tracing::debug!(session_id = %id, "Disconnect for unknown session, ignoring");
            }
        }
    }

    /// Waits for all running flights to settle, then refuses new ones.
    ///
    /// Called before transport teardown so nothing pushes to a channel the
    /// process is closing underneath it.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        // Wake queued flights so they settle without computing.
        self.recompute_slots.close();

        let mut in_flight = self.in_flight.subscribe();
        let _ = in_flight.wait_for(|count| *count == 0).await;
        tracing::info!("All recompute flights drained");
    }

    /// Requests a recompute-and-push for one session, honoring the
    /// single-flight rule.
    fn trigger(self: &Arc<Self>, id: SessionId) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        let key = match self.registry.claim_recompute(id) {
            Ok(RecomputeClaim::Started(key)) => key,
            // The running flight re-triggers on settle.
            Ok(RecomputeClaim::AlreadyInFlight) => return,
            Err(RegistryError::UnknownSession(_)) => {
                tracing::trace!(session_id = %id, "Trigger for unknown session, ignoring");
                return;
            }
        };

        let coordinator = Arc::clone(self);
        self.in_flight.send_modify(|count| *count += 1);
        tokio::spawn(async move {
            coordinator.run_flight(id, key).await;
            coordinator.in_flight.send_modify(|count| *count -= 1);
        });
    }

    /// Runs one claimed flight, then any follow-ups owed to absorbed
    /// triggers, re-reading the partition key each round.
    async fn run_flight(&self, id: SessionId, mut key: PartitionKey) {
        loop {
            let sent = self.recompute_and_push(id, &key).await;
            match self.registry.settle_recompute(id, sent) {
                FlightOutcome::Settled => return,
                FlightOutcome::Retrigger => {
                    if self.shutting_down.load(Ordering::SeqCst) {
                        return;
                    }
                    match self.registry.claim_recompute(id) {
                        Ok(RecomputeClaim::Started(next_key)) => key = next_key,
                        // Someone else claimed between settle and here;
                        // their flight covers the follow-up.
                        Ok(RecomputeClaim::AlreadyInFlight) => return,
                        Err(RegistryError::UnknownSession(_)) => return,
                    }
                }
            }
        }
    }

    /// Computes the aggregate for `key` and pushes it to `id` if the
    /// session is still live.
    ///
    /// Returns the result a push was attempted for, or `None` when the
    /// computation failed or the session was gone at push time.
    async fn recompute_and_push(
        &self,
        id: SessionId,
        key: &PartitionKey,
    ) -> Option<AggregateResult> {
        let result = {
            let _slot = match self.recompute_slots.acquire().await {
                Ok(permit) => permit,
                // Semaphore closed: shutdown won the race.
                Err(_) => return None,
            };
            match self.source.compute(key).await {
                Ok(result) => result,
                Err(err) => {
                    tracing::warn!(
                        session_id = %id,
                        partition_key = %key,
                        error = %err,
                        "Aggregate recompute failed, keeping previous aggregate"
                    );
                    return None;
                }
            }
        };

        if !self.registry.is_live(id) {
            tracing::debug!(
                session_id = %id,
                partition_key = %key,
                "Session gone before push, discarding aggregate"
            );
            return None;
        }

        let update = AggregateUpdate::new(key.clone(), result.clone());
        if let Err(err) = self.transport.push(id, update).await {
            // A disconnect may race any push; the channel owner cleans up.
            tracing::debug!(session_id = %id, error = %err, "Push failed");
        }
        Some(result)
    }
}
