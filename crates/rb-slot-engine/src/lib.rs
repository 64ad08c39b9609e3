//! # rb-slot-engine — Slot Outcome and Payout Engine
//!
//! Draws fair symbol grids, evaluates every win rule of a validated game
//! config and settles the result against an external balance ledger.
//!
//! ## Features
//!
//! - **Reel Strips**: true physical-reel odds, weighted per-cell fallback
//! - **Win Rules**: paylines, match-N clusters, wilds, scatter pays
//! - **Cascades**: remove, drop and refill until no win, with an iteration cap
//! - **Free Spins**: per-session bonus state with configurable retriggers
//! - **Settlement**: idempotent debit/credit per spin id, one spin in flight
//!   per session, full rollback on ledger or store timeout
//!
//! ## Architecture
//!
//! ```text
//! SpinOrchestrator
//!     │
//!     ├── SessionLocks (one in-flight spin per session)
//!     ├── BalanceLedger (debit / credit / void)
//!     ├── SessionStore (BonusState persistence)
//!     └── SlotEngine (pure)
//!           │
//!           ├── ReelGenerator
//!           ├── CascadeController ── PaylineEvaluator, ClusterEvaluator
//!           ├── WildScatterResolver
//!           ├── PayoutAggregator
//!           └── BonusStateMachine
//!                 │
//!                 v
//!           SpinResult
//! ```
//!
//! All money is integer satoshis; pay multiples are fixed-point
//! [`PayFactor`]s and every product is floored.

pub mod bonus;
pub mod cascade;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod grid;
pub mod ledger;
pub mod orchestrator;
pub mod payline;
pub mod payout;
pub mod reels;
pub mod resolver;
pub mod rng;
pub mod session;
pub mod spin;
pub mod symbols;

pub use bonus::*;
pub use cascade::*;
pub use cluster::*;
pub use config::*;
pub use engine::*;
pub use error::*;
pub use grid::*;
pub use ledger::*;
pub use orchestrator::*;
pub use payline::*;
pub use payout::*;
pub use reels::*;
pub use resolver::*;
pub use rng::*;
pub use session::*;
pub use spin::*;
pub use symbols::*;
