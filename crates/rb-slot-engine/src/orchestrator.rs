//! Spin orchestration: bet validation, ledger settlement, session persistence
//!
//! One spin, in order:
//!
//! 1. claim the session and the spin id (a second in-flight spin is
//!    rejected at once)
//! 2. answer replays of an already settled spin id from the replay cache
//! 3. validate the bet and load the stored session state
//! 4. answer a replay of the session's last spin; refuse any other id the
//!    ledger already knows
//! 5. debit the stake (zero on free spins)
//! 6. run the pure [`SlotEngine`] pipeline
//! 7. credit the win, persist the new session state with the result
//!
//! Ledger and store calls get one retry on timeout. If a step after the
//! debit cannot complete, every ledger entry of the spin is voided and the
//! caller's session state is left as it was.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::SlotEngine;
use crate::error::{LedgerError, SpinError, StoreError};
use crate::ledger::{BalanceLedger, UserId};
use crate::rng::{CryptoSource, RandomSource};
use crate::session::{SessionId, SessionLocks, SessionState, SessionStore};
use crate::spin::SpinResult;

/// Idempotency key of one spin request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpinId(String);

impl SpinId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SpinId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SpinId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SpinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinRequest {
    pub spin_id: SpinId,
    pub bet_sats: u64,
}

impl SpinRequest {
    /// Request with a fresh spin id
    pub fn new(bet_sats: u64) -> Self {
        Self::with_id(SpinId::new(), bet_sats)
    }

    pub fn with_id(spin_id: SpinId, bet_sats: u64) -> Self {
        Self { spin_id, bet_sats }
    }
}

/// Retry behaviour for ledger and session store calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after a timeout
    pub retries: u32,
    /// Pause before each retry
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            backoff: Duration::from_millis(10),
        }
    }
}

/// Settled results by spin id, oldest evicted first
struct ReplayCache {
    capacity: usize,
    order: VecDeque<SpinId>,
    results: HashMap<SpinId, SpinResult>,
}

impl ReplayCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            results: HashMap::new(),
        }
    }

    fn get(&self, id: &SpinId) -> Option<&SpinResult> {
        self.results.get(id)
    }

    fn insert(&mut self, id: SpinId, result: SpinResult) {
        if self.capacity == 0 {
            return;
        }
        while self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.results.remove(&evicted);
            }
        }
        self.order.push_back(id.clone());
        self.results.insert(id, result);
    }
}

/// Builds a fresh random source when every pooled one is checked out
pub type RngFactory = Arc<dyn Fn() -> Box<dyn RandomSource> + Send + Sync>;

pub struct SpinOrchestrator<L, S> {
    engine: SlotEngine,
    ledger: Arc<L>,
    store: Arc<S>,
    locks: Arc<SessionLocks>,
    /// Idle random sources. A spin checks one out and plays without holding
    /// this lock.
    rngs: Mutex<Vec<Box<dyn RandomSource>>>,
    make_rng: RngFactory,
    replays: Mutex<ReplayCache>,
    retry: RetryPolicy,
}

impl<L: BalanceLedger, S: SessionStore> SpinOrchestrator<L, S> {
    pub const DEFAULT_REPLAY_CAPACITY: usize = 10_000;

    /// Orchestrator drawing from OS-seeded ChaCha20 streams
    pub fn new(engine: SlotEngine, ledger: Arc<L>, store: Arc<S>) -> Self {
        Self {
            engine,
            ledger,
            store,
            locks: Arc::new(SessionLocks::new()),
            rngs: Mutex::new(Vec::new()),
            make_rng: Arc::new(|| -> Box<dyn RandomSource> { Box::new(CryptoSource::secure()) }),
            replays: Mutex::new(ReplayCache::new(Self::DEFAULT_REPLAY_CAPACITY)),
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the pooled random sources with `rng`. Spins that find it
    /// checked out draw from a source built by the rng factory.
    pub fn with_rng(mut self, rng: impl RandomSource + 'static) -> Self {
        self.rngs = Mutex::new(vec![Box::new(rng)]);
        self
    }

    pub fn with_rng_factory(
        mut self,
        factory: impl Fn() -> Box<dyn RandomSource> + Send + Sync + 'static,
    ) -> Self {
        self.make_rng = Arc::new(factory);
        self
    }

    /// Share in-flight tracking with other orchestrators serving the same
    /// sessions
    pub fn with_session_locks(mut self, locks: Arc<SessionLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_replay_capacity(mut self, capacity: usize) -> Self {
        self.replays = Mutex::new(ReplayCache::new(capacity));
        self
    }

    pub fn engine(&self) -> &SlotEngine {
        &self.engine
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn session_locks(&self) -> &Arc<SessionLocks> {
        &self.locks
    }

    /// Start a session with a fresh bonus state and persist it
    pub fn open_session(&self, user: UserId) -> Result<SessionState, SpinError> {
        let state = SessionState::new(user);
        self.retrying("session save", is_store_timeout, || self.store.save(&state))?;
        log::info!("opened session {} for {}", state.session_id, state.user_id);
        Ok(state)
    }

    pub fn resume_session(&self, id: &SessionId) -> Result<Option<SessionState>, SpinError> {
        Ok(self.retrying("session load", is_store_timeout, || self.store.load(id))?)
    }

    /// Discard a session's state. Refused while a spin is in flight.
    pub fn close_session(&self, id: &SessionId) -> Result<Option<SessionState>, SpinError> {
        let _guard = self.locks.try_acquire(id)?;
        let removed = self.retrying("session remove", is_store_timeout, || self.store.remove(id))?;
        if let Some(state) = &removed {
            if state.bonus.bonus_active {
                log::warn!(
                    "session {} closed with {} free spins unplayed",
                    id,
                    state.bonus.bonus_spins_remaining
                );
            }
        }
        Ok(removed)
    }

    /// Play one spin.
    ///
    /// Only `session.session_id` is read from the caller's copy: user, bonus
    /// state and spin count come from the store, and a session the store does
    /// not know is refused with [`SpinError::UnknownSession`]. On success
    /// `session` is replaced by the new state. On failure nothing changes.
    ///
    /// A repeated spin id gets the settled result back, from the replay cache
    /// or from the session's stored last spin. An id the ledger already holds
    /// entries for is never played again.
    pub fn spin(&self, session: &mut SessionState, request: SpinRequest) -> Result<SpinResult, SpinError> {
        let _guard = self.locks.try_acquire(&session.session_id)?;
        let _claim = self.locks.try_claim_spin(request.spin_id.as_str())?;

        let cached = self.replays.lock().get(&request.spin_id).cloned();
        if let Some(previous) = cached {
            return replay(previous, &session.session_id, &request);
        }

        let bet = request.bet_sats;
        self.engine.validate_bet(bet)?;

        let current = self
            .retrying("session load", is_store_timeout, || self.store.load(&session.session_id))?
            .ok_or_else(|| SpinError::UnknownSession(session.session_id.clone()))?;

        if let Some(previous) = current.last_spin.as_ref() {
            if previous.spin_id == request.spin_id.as_str() {
                return replay(previous.clone(), &current.session_id, &request);
            }
        }

        let spin_id = request.spin_id.as_str();
        let settled = self.retrying("settled check", is_ledger_timeout, || self.ledger.is_settled(spin_id))?;
        if settled {
            log::warn!("spin id {} is already on the books, refusing to play it again", spin_id);
            return Err(SpinError::SpinIdConflict(spin_id.to_string()));
        }

        let user = &current.user_id;
        let free_spin = current.bonus.is_free_spin();
        // free spins post a zero stake so every settled id is on the books
        let stake = if free_spin { 0 } else { bet };
        let debited = self.retrying("debit", is_ledger_timeout, || self.ledger.debit(user, spin_id, stake));
        let mut balance_sats = match debited {
            Ok(after) => after,
            Err(err @ LedgerError::Timeout { .. }) => {
                return Err(self.rollback(&request.spin_id, err.into()));
            }
            Err(err) => return Err(err.into()),
        };

        let outcome = {
            let mut rng = self.checkout_rng();
            let outcome = self.engine.play(&current.bonus, bet, &mut *rng);
            self.rngs.lock().push(rng);
            outcome
        };

        let total = outcome.payout.total_win_sats;
        if total > 0 {
            match self.retrying("credit", is_ledger_timeout, || self.ledger.credit(user, spin_id, total)) {
                Ok(after) => balance_sats = after,
                Err(err) => return Err(self.rollback(&request.spin_id, err.into())),
            }
        }

        let result = SpinResult {
            spin_id: request.spin_id.to_string(),
            session_id: current.session_id.clone(),
            bet_sats: bet,
            debited_sats: stake,
            free_spin,
            grid_source: outcome.grid_source,
            initial_grid: outcome.initial_grid,
            final_grid: outcome.final_grid,
            cascades: outcome.cascades,
            win_events: outcome.win_events,
            scatter_count: outcome.scatter_count,
            multiplier: outcome.payout.multiplier,
            base_win_sats: outcome.payout.base_win_sats,
            total_win_sats: total,
            capped: outcome.payout.capped,
            win_tier: outcome.payout.tier,
            bonus: outcome.bonus,
            bonus_transition: outcome.bonus_transition,
            balance_sats,
            warnings: outcome.warnings,
        };

        let next = SessionState {
            bonus: result.bonus,
            spins_played: current.spins_played + 1,
            last_spin: Some(result.clone()),
            ..current
        };
        if let Err(err) = self.retrying("session save", is_store_timeout, || self.store.save(&next)) {
            return Err(self.rollback(&request.spin_id, err.into()));
        }

        log::info!(
            "spin {} session {}: bet {} won {} balance {}{}",
            result.spin_id,
            result.session_id,
            bet,
            total,
            balance_sats,
            if free_spin { " [free]" } else { "" }
        );

        self.replays.lock().insert(request.spin_id, result.clone());
        *session = next;
        Ok(result)
    }

    fn checkout_rng(&self) -> Box<dyn RandomSource> {
        let idle = self.rngs.lock().pop();
        idle.unwrap_or_else(|| (self.make_rng)())
    }

    /// Void the spin's ledger entries and hand back the original failure
    fn rollback(&self, spin_id: &SpinId, cause: SpinError) -> SpinError {
        match self.retrying("void", is_ledger_timeout, || self.ledger.void(spin_id.as_str())) {
            Ok(()) => log::warn!("spin {} rolled back: {}", spin_id, cause),
            Err(err) => log::error!("spin {} rollback failed: {} (cause: {})", spin_id, err, cause),
        }
        cause
    }

    fn retrying<T, E: fmt::Display>(
        &self,
        operation: &'static str,
        is_transient: fn(&E) -> bool,
        mut call: impl FnMut() -> Result<T, E>,
    ) -> Result<T, E> {
        let mut attempt = 0;
        loop {
            match call() {
                Err(err) if is_transient(&err) && attempt < self.retry.retries => {
                    attempt += 1;
                    log::warn!(
                        "{} failed ({}), retry {}/{}",
                        operation,
                        err,
                        attempt,
                        self.retry.retries
                    );
                    if !self.retry.backoff.is_zero() {
                        std::thread::sleep(self.retry.backoff);
                    }
                }
                other => return other,
            }
        }
    }
}

/// Hand back an already settled result for a repeated spin id. The id is
/// bound to the session and bet it was first played with.
fn replay(previous: SpinResult, session_id: &SessionId, request: &SpinRequest) -> Result<SpinResult, SpinError> {
    if previous.session_id != *session_id || previous.bet_sats != request.bet_sats {
        return Err(SpinError::SpinIdConflict(request.spin_id.to_string()));
    }
    log::debug!("replaying settled spin {}", request.spin_id);
    Ok(previous)
}

fn is_ledger_timeout(err: &LedgerError) -> bool {
    matches!(err, LedgerError::Timeout { .. })
}

fn is_store_timeout(err: &StoreError) -> bool {
    matches!(err, StoreError::Timeout { .. })
}
