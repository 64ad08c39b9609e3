//! Balance ledger contract and an in-memory implementation
//!
//! The engine never holds balances itself. It asks a [`BalanceLedger`] to
//! debit the stake and credit the win, each as one atomic read-verify-write
//! keyed by the spin id, and to void a spin's entries when the spin cannot
//! be completed.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Owner of a balance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Debit,
    Credit,
    /// Reversal of a voided debit or credit
    Reversal,
}

/// One journal line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub spin_id: String,
    pub user_id: UserId,
    pub kind: EntryKind,
    pub amount_sats: u64,
    /// Account balance right after this entry
    pub balance_after: u64,
}

/// Atomic, idempotent balance operations.
///
/// `debit` and `credit` are keyed by spin id: repeating a call with the same
/// spin id and amount applies nothing and returns the current balance; the
/// same spin id with a different amount is a [`LedgerError::Conflict`].
pub trait BalanceLedger: Send + Sync {
    fn balance(&self, user: &UserId) -> Result<u64, LedgerError>;

    /// Take `amount` sats, failing with `InsufficientBalance` rather than
    /// going negative. Returns the new balance.
    fn debit(&self, user: &UserId, spin_id: &str, amount: u64) -> Result<u64, LedgerError>;

    /// Add `amount` sats. Returns the new balance.
    fn credit(&self, user: &UserId, spin_id: &str, amount: u64) -> Result<u64, LedgerError>;

    /// Reverse every entry recorded for `spin_id`, all or nothing. Voiding
    /// an unknown or already voided spin is a no-op.
    fn void(&self, spin_id: &str) -> Result<(), LedgerError>;

    /// Whether `spin_id` has a live (not voided) entry. A spin id that is
    /// settled must never be played again.
    fn is_settled(&self, spin_id: &str) -> Result<bool, LedgerError>;
}

#[derive(Debug, Default)]
struct Book {
    accounts: HashMap<UserId, u64>,
    /// Live entries by spin id and kind
    applied: HashMap<(String, EntryKind), LedgerEntry>,
    journal: Vec<LedgerEntry>,
}

impl Book {
    fn post(&mut self, user: &UserId, spin_id: &str, kind: EntryKind, amount: u64) -> Result<u64, LedgerError> {
        let key = (spin_id.to_string(), kind);
        if let Some(existing) = self.applied.get(&key) {
            if existing.amount_sats != amount || &existing.user_id != user {
                return Err(LedgerError::Conflict(format!(
                    "{kind:?} for spin {spin_id} already recorded with {} sats",
                    existing.amount_sats
                )));
            }
            return self.balance(user);
        }

        let balance = self
            .accounts
            .get_mut(user)
            .ok_or_else(|| LedgerError::UnknownAccount(user.to_string()))?;
        let next = match kind {
            EntryKind::Debit => balance.checked_sub(amount).ok_or(LedgerError::InsufficientBalance {
                required: amount,
                available: *balance,
            })?,
            _ => balance
                .checked_add(amount)
                .ok_or_else(|| LedgerError::Overflow(user.to_string()))?,
        };
        *balance = next;

        let entry = LedgerEntry {
            spin_id: spin_id.to_string(),
            user_id: user.clone(),
            kind,
            amount_sats: amount,
            balance_after: next,
        };
        self.journal.push(entry.clone());
        self.applied.insert(key, entry);
        Ok(next)
    }

    fn balance(&self, user: &UserId) -> Result<u64, LedgerError> {
        self.accounts
            .get(user)
            .copied()
            .ok_or_else(|| LedgerError::UnknownAccount(user.to_string()))
    }
}

/// Ledger kept in process memory. Every operation waits at most `timeout`
/// for the book lock and reports [`LedgerError::Timeout`] otherwise.
pub struct InMemoryLedger {
    book: Mutex<Book>,
    timeout: Duration,
}

impl InMemoryLedger {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(250);

    pub fn new() -> Self {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            book: Mutex::new(Book::default()),
            timeout,
        }
    }

    /// Create or top up an account outside of any spin
    pub fn deposit(&self, user: &UserId, amount: u64) -> Result<u64, LedgerError> {
        let mut book = self.lock("deposit")?;
        let balance = book.accounts.entry(user.clone()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(user.to_string()))?;
        Ok(*balance)
    }

    /// Journal entries for one spin, reversals included
    pub fn entries_for(&self, spin_id: &str) -> Vec<LedgerEntry> {
        let book = self.book.lock();
        book.journal
            .iter()
            .filter(|e| e.spin_id == spin_id)
            .cloned()
            .collect()
    }

    /// Full journal in posting order
    pub fn journal(&self) -> Vec<LedgerEntry> {
        self.book.lock().journal.clone()
    }

    /// Sum of every account balance
    pub fn total_balance(&self) -> u64 {
        self.book.lock().accounts.values().sum()
    }

    fn lock(&self, operation: &'static str) -> Result<parking_lot::MutexGuard<'_, Book>, LedgerError> {
        self.book.try_lock_for(self.timeout).ok_or_else(|| {
            log::warn!("ledger {} timed out after {:?}", operation, self.timeout);
            LedgerError::Timeout { operation }
        })
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl BalanceLedger for InMemoryLedger {
    fn balance(&self, user: &UserId) -> Result<u64, LedgerError> {
        self.lock("balance")?.balance(user)
    }

    fn debit(&self, user: &UserId, spin_id: &str, amount: u64) -> Result<u64, LedgerError> {
        self.lock("debit")?.post(user, spin_id, EntryKind::Debit, amount)
    }

    fn credit(&self, user: &UserId, spin_id: &str, amount: u64) -> Result<u64, LedgerError> {
        self.lock("credit")?.post(user, spin_id, EntryKind::Credit, amount)
    }

    fn void(&self, spin_id: &str) -> Result<(), LedgerError> {
        let mut book = self.lock("void")?;

        // Check every reversal against a scratch copy of the balances before
        // anything is touched.
        let mut scratch: HashMap<UserId, u64> = HashMap::new();
        let mut reversals = Vec::new();
        for kind in [EntryKind::Credit, EntryKind::Debit] {
            let key = (spin_id.to_string(), kind);
            let Some(entry) = book.applied.get(&key) else {
                continue;
            };
            let current = match scratch.get(&entry.user_id) {
                Some(&balance) => balance,
                None => book.balance(&entry.user_id)?,
            };
            let next = match kind {
                EntryKind::Debit => current
                    .checked_add(entry.amount_sats)
                    .ok_or_else(|| LedgerError::Overflow(entry.user_id.to_string()))?,
                _ => current.checked_sub(entry.amount_sats).ok_or_else(|| {
                    LedgerError::Conflict(format!(
                        "cannot reverse credit of {} sats for spin {spin_id}",
                        entry.amount_sats
                    ))
                })?,
            };
            scratch.insert(entry.user_id.clone(), next);
            reversals.push((key, next));
        }

        for (key, next) in reversals {
            let Some(entry) = book.applied.remove(&key) else {
                continue;
            };
            book.accounts.insert(entry.user_id.clone(), next);
            log::info!(
                "voided {:?} of {} sats for spin {}",
                key.1,
                entry.amount_sats,
                spin_id
            );
            book.journal.push(LedgerEntry {
                kind: EntryKind::Reversal,
                balance_after: next,
                ..entry
            });
        }
        Ok(())
    }

    fn is_settled(&self, spin_id: &str) -> Result<bool, LedgerError> {
        let book = self.lock("is_settled")?;
        Ok([EntryKind::Debit, EntryKind::Credit]
            .into_iter()
            .any(|kind| book.applied.contains_key(&(spin_id.to_string(), kind))))
    }
}
