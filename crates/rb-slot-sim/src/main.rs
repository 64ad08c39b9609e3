//! ReelBank slot simulator
//!
//! Usage:
//!   rb-slot-sim games/classic-5x3.yaml --check
//!   rb-slot-sim games/classic-5x3.yaml --spins 100000 --sessions 8 --seed 42
//!
//! Every session runs through the full settlement path (ledger debit and
//! credit, session store, bonus state) on its own worker thread. The merged
//! statistics are printed as JSON.

mod stats;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use rayon::prelude::*;
use rb_slot_engine::{
    CryptoSource, InMemoryLedger, InMemorySessionStore, RandomSource, SessionLocks, SlotEngine,
    SpinError, SpinOrchestrator, SpinRequest, UserId,
};
use serde::Serialize;

use crate::stats::SimulationStats;

#[derive(Parser, Debug)]
#[command(name = "rb-slot-sim", about = "ReelBank slot simulator and config checker")]
struct Cli {
    /// Game config (.json, .yaml or .yml)
    config: PathBuf,

    /// Spins per session
    #[arg(long, default_value_t = 100_000)]
    spins: u64,

    /// Parallel sessions
    #[arg(long, default_value_t = 8)]
    sessions: u64,

    /// Base seed; session `i` uses `seed + i`. OS entropy when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Stake per spin in sats (defaults to the config minimum)
    #[arg(long)]
    bet: Option<u64>,

    /// Starting balance per session in sats
    #[arg(long, default_value_t = 1_000_000_000_000)]
    balance: u64,

    /// Only validate the config
    #[arg(long)]
    check: bool,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    game: &'a str,
    seed: Option<u64>,
    sessions: u64,
    spins_per_session: u64,
    bet_sats: u64,
    rtp_percent: f64,
    hit_rate_percent: f64,
    elapsed_ms: u128,
    stats: &'a SimulationStats,
}

/// Shared settlement backends for all sessions
struct Backends {
    ledger: Arc<InMemoryLedger>,
    store: Arc<InMemorySessionStore>,
    locks: Arc<SessionLocks>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let engine = SlotEngine::load(&cli.config)
        .with_context(|| format!("invalid game config {}", cli.config.display()))?;

    if cli.check {
        let config = engine.config();
        println!(
            "{}: ok ({}x{}, {} symbols, {} paylines, strips: {}, cascades: {})",
            config.name,
            config.layout.columns,
            config.layout.rows,
            config.symbols.len(),
            config.paylines.len(),
            config.uses_reel_strips(),
            config.cascade.enabled
        );
        return Ok(());
    }

    if cli.sessions == 0 || cli.spins == 0 {
        bail!("--sessions and --spins must be positive");
    }
    let bet = cli.bet.unwrap_or(engine.config().bet.min_sats);
    engine.validate_bet(bet)?;

    let backends = Backends {
        ledger: Arc::new(InMemoryLedger::new()),
        store: Arc::new(InMemorySessionStore::new()),
        locks: Arc::new(SessionLocks::new()),
    };

    log::info!(
        "simulating {} sessions x {} spins of '{}' at {} sats",
        cli.sessions,
        cli.spins,
        engine.config().name,
        bet
    );
    let started = Instant::now();

    let per_session: Vec<SimulationStats> = (0..cli.sessions)
        .into_par_iter()
        .map(|index| run_session(&engine, &backends, &cli, index, bet))
        .collect::<Result<_>>()?;

    let mut stats = SimulationStats::default();
    for session in &per_session {
        stats.merge(session);
    }

    let report = Report {
        game: &engine.config().name,
        seed: cli.seed,
        sessions: cli.sessions,
        spins_per_session: cli.spins,
        bet_sats: bet,
        rtp_percent: stats.rtp(),
        hit_rate_percent: stats.hit_rate(),
        elapsed_ms: started.elapsed().as_millis(),
        stats: &stats,
    };
    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");
    Ok(())
}

fn run_session(engine: &SlotEngine, backends: &Backends, cli: &Cli, index: u64, bet: u64) -> Result<SimulationStats> {
    let user = UserId::from(format!("sim-{index}"));
    backends
        .ledger
        .deposit(&user, cli.balance)
        .with_context(|| format!("funding {user}"))?;

    let rng: Box<dyn RandomSource> = match cli.seed {
        Some(seed) => Box::new(CryptoSource::seeded(seed.wrapping_add(index))),
        None => Box::new(CryptoSource::secure()),
    };
    let orchestrator = SpinOrchestrator::new(
        engine.clone(),
        Arc::clone(&backends.ledger),
        Arc::clone(&backends.store),
    )
    .with_session_locks(Arc::clone(&backends.locks))
    .with_replay_capacity(0)
    .with_rng(rng);

    let mut session = orchestrator.open_session(user)?;
    let mut stats = SimulationStats::default();

    for _ in 0..cli.spins {
        match orchestrator.spin(&mut session, SpinRequest::new(bet)) {
            Ok(result) => stats.record(&result),
            Err(SpinError::InsufficientBalance { available, .. }) => {
                log::warn!("session {} out of funds at {} sats", session.session_id, available);
                stats.busted_sessions += 1;
                break;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("session {} failed", session.session_id));
            }
        }
    }

    orchestrator.close_session(&session.session_id)?;
    log::debug!(
        "session {} done: {} spins, rtp {:.2}%",
        session.session_id,
        stats.total_spins,
        stats.rtp()
    );
    Ok(stats)
}
