//! Session registry - the owned, lifecycle-managed table of live sessions.
//!
//! Each connected client gets one session: an id assigned at connect time,
//! a mutable partition key (empty until set), and the last aggregate that
//! was dispatched to it. Session state is owned exclusively by this
//! registry; nothing is ever attached to transport objects.
//!
//! The registry also arbitrates the per-session single-flight rule: a
//! session is either `Idle` or `Computing`, and triggers that arrive while
//! a recompute is in flight collapse into a single pending follow-up.
//!
//! # Thread Safety
//!
//! Guarded by a `std::sync::RwLock` with short critical sections that never
//! span an await point. Iteration works on a snapshot taken under the read
//! lock and released before any caller code runs, so a visitor may call
//! back into the registry without deadlocking.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::{AggregateResult, PartitionKey, SessionId};

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The session was unregistered between trigger and handling. A race,
    /// not a fault; callers treat it as a no-op.
    #[error("Unknown session {0}")]
    UnknownSession(SessionId),
}

/// Per-session recompute state machine: `Idle -> Computing -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Flight {
    #[default]
    Idle,
    /// A recompute is running. `pending` records that another trigger
    /// arrived mid-flight and one follow-up is owed.
    Computing { pending: bool },
}

#[derive(Debug, Default)]
struct SessionState {
    partition_key: PartitionKey,
    last_sent: Option<AggregateResult>,
    flight: Flight,
}

/// Result of trying to claim the recompute flight for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecomputeClaim {
    /// The caller now owns the flight; compute with this key.
    Started(PartitionKey),
    /// Another flight is running; it has been marked to re-trigger.
    AlreadyInFlight,
}

/// Result of settling a completed flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlightOutcome {
    /// A trigger arrived mid-flight; run one follow-up recompute.
    Retrigger,
    /// Nothing further owed for this session.
    Settled,
}

/// Tracks connected subscriber sessions and their recompute flights.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionState>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Lock for reading, recovering from poison if necessary.
    ///
    /// Session bookkeeping stays consistent under poison recovery since
    /// every write either fully inserts, fully removes, or flips a flag.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, SessionState>> {
        self.sessions.read().unwrap_or_else(|poisoned| {
            tracing::warn!("Session registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Lock for writing, recovering from poison if necessary.
    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, SessionState>> {
        self.sessions.write().unwrap_or_else(|poisoned| {
            tracing::warn!("Session registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Creates a session with an empty partition key and returns its id.
    pub fn register(&self) -> SessionId {
        let id = SessionId::new();
        self.write().insert(id, SessionState::default());
        id
    }

    /// Updates a session's partition key, returning the previous key.
    pub fn set_partition_key(
        &self,
        id: SessionId,
        key: PartitionKey,
    ) -> Result<PartitionKey, RegistryError> {
        let mut sessions = self.write();
        let state = sessions
            .get_mut(&id)
            .ok_or(RegistryError::UnknownSession(id))?;
        Ok(std::mem::replace(&mut state.partition_key, key))
    }

    /// Removes a session, releasing any in-flight recompute claim.
    ///
    /// A flight that is still running completes against the source, but its
    /// settle call finds no session and its result is discarded.
    pub fn unregister(&self, id: SessionId) -> Result<(), RegistryError> {
        self.write()
            .remove(&id)
            .map(|_| ())
            .ok_or(RegistryError::UnknownSession(id))
    }

    /// True while the session is registered.
    pub fn is_live(&self, id: SessionId) -> bool {
        self.read().contains_key(&id)
    }

    /// Snapshot of the sessions live at call time.
    ///
    /// Sessions registered or unregistered after the snapshot is taken are
    /// not reflected.
    pub fn live_sessions(&self) -> Vec<SessionId> {
        self.read().keys().copied().collect()
    }

    /// Applies `f` to a stable snapshot of currently live sessions.
    ///
    /// The lock is released before `f` runs, so `f` may register or
    /// unregister sessions; such changes are not visited in this pass.
    pub fn for_each_live<F: FnMut(SessionId)>(&self, mut f: F) {
        for id in self.live_sessions() {
            f(id);
        }
    }

    /// The session's current partition key.
    pub fn partition_key(&self, id: SessionId) -> Result<PartitionKey, RegistryError> {
        self.read()
            .get(&id)
            .map(|s| s.partition_key.clone())
            .ok_or(RegistryError::UnknownSession(id))
    }

    /// The last aggregate dispatched to the session, if any.
    pub fn last_sent(&self, id: SessionId) -> Option<AggregateResult> {
        self.read().get(&id).and_then(|s| s.last_sent.clone())
    }

    /// Tries to claim the recompute flight for `id`.
    ///
    /// Returns `Started` with the current partition key when the session
    /// was idle. When a flight is already running the trigger is absorbed:
    /// the flight is marked pending and `AlreadyInFlight` comes back.
    pub fn claim_recompute(&self, id: SessionId) -> Result<RecomputeClaim, RegistryError> {
        let mut sessions = self.write();
        let state = sessions
            .get_mut(&id)
            .ok_or(RegistryError::UnknownSession(id))?;
        match state.flight {
            Flight::Idle => {
                state.flight = Flight::Computing { pending: false };
                Ok(RecomputeClaim::Started(state.partition_key.clone()))
            }
            Flight::Computing { .. } => {
                state.flight = Flight::Computing { pending: true };
                Ok(RecomputeClaim::AlreadyInFlight)
            }
        }
    }

    /// Settles a completed flight for `id`.
    ///
    /// `sent` is the aggregate for which a push was attempted, or `None`
    /// when the computation failed or the session was gone at push time;
    /// last-sent is only overwritten in the former case. Returns
    /// `Retrigger` when a trigger arrived mid-flight, in which case the
    /// caller claims again and runs one follow-up. A session unregistered
    /// mid-flight settles silently.
    pub fn settle_recompute(&self, id: SessionId, sent: Option<AggregateResult>) -> FlightOutcome {
        let mut sessions = self.write();
        let Some(state) = sessions.get_mut(&id) else {
            return FlightOutcome::Settled;
        };
        if let Some(result) = sent {
            state.last_sent = Some(result);
        }
        match std::mem::take(&mut state.flight) {
            Flight::Computing { pending: true } => FlightOutcome::Retrigger,
            _ => FlightOutcome::Settled,
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// True when no sessions are connected.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
