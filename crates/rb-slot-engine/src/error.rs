//! Error types for the slot engine

use thiserror::Error;

use crate::session::SessionId;
use crate::symbols::SymbolId;

/// Rejection of a game configuration at `configure()` time.
///
/// Every variant is fatal: no engine is built for a config that fails
/// validation, so no spin can ever run against it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(String),

    #[error("config io error: {0}")]
    Io(String),

    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    #[error("duplicate symbol id {0}")]
    DuplicateSymbol(SymbolId),

    #[error("unknown symbol id {id} referenced by {context}")]
    UnknownSymbol { id: SymbolId, context: String },

    #[error("invalid pay value for symbol {symbol}: {detail}")]
    InvalidPayValue { symbol: SymbolId, detail: String },

    #[error("invalid cluster payout key {key:?} for symbol {symbol}")]
    InvalidClusterKey { symbol: SymbolId, key: String },

    #[error("payline {line} is empty")]
    EmptyPayline { line: usize },

    #[error("payline {line} cell ({column}, {row}) is outside the grid")]
    PaylineOutOfBounds { line: usize, column: u8, row: u8 },

    #[error("expected {expected} reel strips, found {found}")]
    ReelStripCount { expected: usize, found: usize },

    #[error("reel strip {column} is empty")]
    EmptyReelStrip { column: usize },

    #[error("invalid symbol weights: {0}")]
    InvalidWeights(String),

    #[error("invalid bet limits: {0}")]
    InvalidBetLimits(String),

    #[error("invalid bonus rules: {0}")]
    InvalidBonusRules(String),

    #[error("invalid cascade rules: {0}")]
    InvalidCascadeRules(String),

    #[error("invalid max win: {0}")]
    InvalidMaxWin(String),

    #[error("wild and scatter must be different symbols (both {0})")]
    WildIsScatter(SymbolId),

    #[error("config has no win mechanism: define paylines or min_symbols_to_match")]
    NoWinMechanism,

    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
}

/// Failure reported by a [`BalanceLedger`](crate::ledger::BalanceLedger).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance: required {required} sats, available {available} sats")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("ledger {operation} timed out")]
    Timeout { operation: &'static str },

    #[error("unknown account {0}")]
    UnknownAccount(String),

    #[error("balance overflow on account {0}")]
    Overflow(String),

    #[error("ledger entry conflict: {0}")]
    Conflict(String),
}

/// Failure reported by a [`SessionStore`](crate::session::SessionStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("session store {operation} timed out")]
    Timeout { operation: &'static str },

    #[error("session store failure: {0}")]
    Backend(String),
}

/// Failure of a single spin. A failed spin never leaves partial state behind.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpinError {
    #[error("invalid bet {bet} sats: allowed range is {min}..={max}")]
    InvalidBet { bet: u64, min: u64, max: u64 },

    #[error("insufficient balance: required {required} sats, available {available} sats")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("a spin is already in flight for session {0}")]
    ConcurrencySerialization(SessionId),

    #[error("ledger {operation} timed out, spin rolled back")]
    LedgerTimeout { operation: &'static str },

    #[error("ledger failure: {0}")]
    Ledger(LedgerError),

    #[error("session store failure: {0}")]
    SessionStore(#[from] StoreError),

    #[error("spin id {0} is already settled or in flight elsewhere")]
    SpinIdConflict(String),

    #[error("unknown session {0}: open it before spinning")]
    UnknownSession(SessionId),
}

impl SpinError {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SpinError::ConcurrencySerialization(_)
                | SpinError::LedgerTimeout { .. }
                | SpinError::SessionStore(StoreError::Timeout { .. })
        )
    }
}

impl From<LedgerError> for SpinError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance { required, available } => {
                SpinError::InsufficientBalance { required, available }
            }
            LedgerError::Timeout { operation } => SpinError::LedgerTimeout { operation },
            other => SpinError::Ledger(other),
        }
    }
}

/// Result type alias for configuration
pub type ConfigResult<T> = Result<T, ConfigError>;
