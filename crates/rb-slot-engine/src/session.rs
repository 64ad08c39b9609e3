//! Game sessions: per-session state, the external session store contract
//! and the one-spin-in-flight guard

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bonus::BonusState;
use crate::error::{SpinError, StoreError};
use crate::ledger::UserId;
use crate::spin::SpinResult;

/// Identifier of one game session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State owned by one game session. Created at session start, replaced
/// only by a successful spin, discarded at session end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub bonus: BonusState,
    /// Settled spins, free spins included
    pub spins_played: u64,
    /// Most recent settled spin, replayed verbatim when its id comes back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_spin: Option<SpinResult>,
}

impl SessionState {
    pub fn new(user_id: UserId) -> Self {
        Self::with_id(SessionId::new(), user_id)
    }

    pub fn with_id(session_id: SessionId, user_id: UserId) -> Self {
        Self {
            session_id,
            user_id,
            bonus: BonusState::default(),
            spins_played: 0,
            last_spin: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Persistence for session state, keyed by session id
pub trait SessionStore: Send + Sync {
    fn load(&self, id: &SessionId) -> Result<Option<SessionState>, StoreError>;
    fn save(&self, state: &SessionState) -> Result<(), StoreError>;
    fn remove(&self, id: &SessionId) -> Result<Option<SessionState>, StoreError>;
}

/// Process-local store with bounded lock waits
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionState>>,
    timeout: Duration,
}

impl InMemorySessionStore {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(250);

    pub fn new() -> Self {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self, id: &SessionId) -> Result<Option<SessionState>, StoreError> {
        let sessions = self
            .sessions
            .try_read_for(self.timeout)
            .ok_or(StoreError::Timeout { operation: "load" })?;
        Ok(sessions.get(id).cloned())
    }

    fn save(&self, state: &SessionState) -> Result<(), StoreError> {
        let mut sessions = self
            .sessions
            .try_write_for(self.timeout)
            .ok_or(StoreError::Timeout { operation: "save" })?;
        sessions.insert(state.session_id.clone(), state.clone());
        Ok(())
    }

    fn remove(&self, id: &SessionId) -> Result<Option<SessionState>, StoreError> {
        let mut sessions = self
            .sessions
            .try_write_for(self.timeout)
            .ok_or(StoreError::Timeout { operation: "remove" })?;
        Ok(sessions.remove(id))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SPIN SERIALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Sessions and spin ids with a spin in flight.
///
/// Acquisition never waits: a second spin for a busy session is rejected
/// straight away with [`SpinError::ConcurrencySerialization`], a spin id
/// already being played by another session with [`SpinError::SpinIdConflict`].
#[derive(Debug, Default)]
pub struct SessionLocks {
    in_flight: Mutex<HashSet<SessionId>>,
    spins: Mutex<HashSet<String>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, id: &SessionId) -> Result<SessionGuard<'_>, SpinError> {
        if !self.in_flight.lock().insert(id.clone()) {
            log::debug!("rejecting concurrent spin for session {}", id);
            return Err(SpinError::ConcurrencySerialization(id.clone()));
        }
        Ok(SessionGuard {
            locks: self,
            id: id.clone(),
        })
    }

    pub fn is_locked(&self, id: &SessionId) -> bool {
        self.in_flight.lock().contains(id)
    }

    pub fn try_claim_spin(&self, spin_id: &str) -> Result<SpinClaim<'_>, SpinError> {
        if !self.spins.lock().insert(spin_id.to_string()) {
            log::debug!("spin id {} is already in flight", spin_id);
            return Err(SpinError::SpinIdConflict(spin_id.to_string()));
        }
        Ok(SpinClaim {
            locks: self,
            spin_id: spin_id.to_string(),
        })
    }
}

/// Releases the session when dropped
#[derive(Debug)]
pub struct SessionGuard<'a> {
    locks: &'a SessionLocks,
    id: SessionId,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.locks.in_flight.lock().remove(&self.id);
    }
}

/// Releases the spin id when dropped
#[derive(Debug)]
pub struct SpinClaim<'a> {
    locks: &'a SessionLocks,
    spin_id: String,
}

impl Drop for SpinClaim<'_> {
    fn drop(&mut self) {
        self.locks.spins.lock().remove(&self.spin_id);
    }
}
