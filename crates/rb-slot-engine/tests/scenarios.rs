//! End-to-end spin scenarios
//!
//! Tests cover:
//! - Line, cluster, scatter and cascade payouts on pinned grids
//! - Free spins not being debited
//! - One spin in flight per session
//! - Retries answered from stored state after a restart
//! - Balance conservation, determinism and the max-win cap over seeded runs

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use rb_slot_engine::{
    BalanceLedger, BonusState, CryptoSource, EntryKind, GameConfig, Grid, InMemoryLedger,
    InMemorySessionStore, LedgerError, RandomSource, RetryPolicy, ScriptedSource, SessionState,
    SlotEngine, SpinError, SpinId, SpinOrchestrator, SpinRequest, SpinWarning, UserId, WinKind,
};

// ═══════════════════════════════════════════════════════════════════════════════
// TEST FIXTURES
// ═══════════════════════════════════════════════════════════════════════════════

fn game_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../games")
        .join(name)
}

fn alice() -> UserId {
    UserId::from("alice")
}

fn funded_ledger(amount: u64) -> InMemoryLedger {
    let ledger = InMemoryLedger::new();
    ledger.deposit(&alice(), amount).unwrap();
    ledger
}

fn orchestrator<L: BalanceLedger>(
    engine: SlotEngine,
    ledger: L,
    rng: impl RandomSource + 'static,
) -> SpinOrchestrator<L, InMemorySessionStore> {
    SpinOrchestrator::new(engine, Arc::new(ledger), Arc::new(InMemorySessionStore::new()))
        .with_rng(rng)
        .with_retry_policy(RetryPolicy {
            retries: 1,
            backoff: Duration::ZERO,
        })
}

// ═══════════════════════════════════════════════════════════════════════════════
// PINNED SCENARIOS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_single_payline_three_of_a_kind() {
    let engine = SlotEngine::from_json_str(
        r#"{
            "layout": { "rows": 1, "columns": 3 },
            "symbols": [ { "id": 1, "name": "A", "pays": { "3": 5 } }, { "id": 2, "name": "B" } ],
            "paylines": [[[0, 0], [1, 0], [2, 0]]],
            "bet": { "min_sats": 1, "max_sats": 1000 }
        }"#,
    )
    .unwrap();
    let outcome = engine.play_grid(
        &BonusState::default(),
        Grid::from_rows(&[vec![1, 1, 1]]),
        10,
        &mut ScriptedSource::new(vec![0]),
    );

    assert_eq!(outcome.win_events.len(), 1);
    let win = &outcome.win_events[0];
    assert_eq!(win.kind, WinKind::Payline);
    assert_eq!(win.symbol_id, 1);
    assert_eq!(win.count, 3);
    assert_eq!(win.payout_sats, 50);
    assert_eq!(outcome.payout.total_win_sats, 50);
}

#[test]
fn test_cluster_of_five_pays_total_bet() {
    let engine = SlotEngine::from_json_str(
        r#"{
            "layout": { "rows": 3, "columns": 4 },
            "symbols": [
                { "id": 1, "name": "A" },
                { "id": 2, "name": "B", "cluster_payouts": { "5": 1.0 } },
                { "id": 3, "name": "C" }
            ],
            "min_symbols_to_match": 5,
            "bet": { "min_sats": 1, "max_sats": 1000 }
        }"#,
    )
    .unwrap();
    let grid = Grid::from_rows(&[vec![2, 1, 2, 3], vec![1, 2, 3, 1], vec![2, 3, 1, 2]]);
    let outcome = engine.play_grid(&BonusState::default(), grid, 100, &mut ScriptedSource::new(vec![0]));

    assert_eq!(outcome.payout.total_win_sats, 100);
    assert_eq!(outcome.win_events.len(), 1);
    assert_eq!(outcome.win_events[0].kind, WinKind::Cluster);
    assert_eq!(outcome.win_events[0].count, 5);
}

#[test]
fn test_scatter_trigger_grants_undebited_free_spins() {
    let engine = SlotEngine::from_json_str(
        r#"{
            "layout": { "rows": 1, "columns": 3 },
            "symbols": [
                { "id": 1, "name": "A", "pays": { "3": 5 } },
                { "id": 2, "name": "B" },
                { "id": 10, "name": "SCATTER" }
            ],
            "paylines": [[[0, 0], [1, 0], [2, 0]]],
            "reel_strips": [[1, 2, 10], [1, 2, 10], [1, 2, 10]],
            "scatter_symbol_id": 10,
            "bonus": { "trigger_count": 3, "free_spins": 10, "multiplier": 2 },
            "bet": { "min_sats": 10, "max_sats": 1000 }
        }"#,
    )
    .unwrap();
    // stop 2 everywhere shows three scatters; stops 0,1,0 show A B A
    let mut script = vec![2, 2, 2];
    for _ in 0..11 {
        script.extend([0, 1, 0]);
    }
    let orch = orchestrator(engine, funded_ledger(1_000), ScriptedSource::new(script));
    let mut session = orch.open_session(alice()).unwrap();

    let trigger = orch.spin(&mut session, SpinRequest::new(10)).unwrap();
    assert_eq!(trigger.scatter_count, 3);
    assert!(session.bonus.bonus_active);
    assert_eq!(session.bonus.bonus_spins_remaining, 10);
    assert_eq!(session.bonus.bonus_multiplier.as_f64(), 2.0);
    assert_eq!(trigger.balance_sats, 990);

    for played in 1..=10u32 {
        let result = orch.spin(&mut session, SpinRequest::new(10)).unwrap();
        assert!(result.free_spin, "free spin {played}");
        assert_eq!(result.debited_sats, 0);
        assert_eq!(result.balance_sats, 990);
        assert_eq!(session.bonus.bonus_spins_remaining, 10 - played);
    }
    assert!(!session.bonus.bonus_active);
    assert_eq!(session.bonus.bonus_multiplier.as_f64(), 1.0);

    let paid = orch.spin(&mut session, SpinRequest::new(10)).unwrap();
    assert!(!paid.free_spin);
    assert_eq!(paid.balance_sats, 980);
}

#[test]
fn test_cascade_pays_every_pass() {
    let engine = SlotEngine::from_json_str(
        r#"{
            "layout": { "rows": 1, "columns": 3 },
            "symbols": [
                { "id": 1, "name": "A", "cluster_payouts": { "3": 1.5 } },
                { "id": 2, "name": "B" },
                { "id": 3, "name": "C" },
                { "id": 4, "name": "D" }
            ],
            "min_symbols_to_match": 3,
            "cascade": { "enabled": true },
            "bet": { "min_sats": 10, "max_sats": 1000 }
        }"#,
    )
    .unwrap();
    // initial draw A A A, first refill A A A, second refill B C D
    let script = vec![0, 0, 0, 0, 0, 0, 1, 2, 3];
    let orch = orchestrator(engine, funded_ledger(1_000), ScriptedSource::new(script));
    let mut session = orch.open_session(alice()).unwrap();
    let result = orch.spin(&mut session, SpinRequest::new(100)).unwrap();

    assert_eq!(result.cascades.len(), 2);
    assert_eq!(result.cascade_depth(), 2);
    let per_pass: Vec<u64> = result.cascades.iter().map(|s| s.total_sats()).collect();
    assert_eq!(per_pass, vec![150, 150]);
    assert_eq!(result.total_win_sats, 300);
    assert_eq!(result.final_grid, Grid::from_rows(&[vec![2, 3, 4]]));
    assert!(!result.guard_tripped());
    assert_eq!(result.warnings, vec![SpinWarning::WeightedFallbackDraw]);
    assert_eq!(result.balance_sats, 1_000 - 100 + 300);
}

/// Wraps an in-memory ledger; the first debit signals `entered` and then
/// waits for `release`
struct GatedLedger {
    inner: InMemoryLedger,
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl BalanceLedger for GatedLedger {
    fn balance(&self, user: &UserId) -> Result<u64, LedgerError> {
        self.inner.balance(user)
    }

    fn debit(&self, user: &UserId, spin_id: &str, amount: u64) -> Result<u64, LedgerError> {
        let gate = self.entered.lock().take();
        if let Some(entered) = gate {
            entered.send(()).unwrap();
            self.release.lock().recv_timeout(Duration::from_secs(10)).unwrap();
        }
        self.inner.debit(user, spin_id, amount)
    }

    fn credit(&self, user: &UserId, spin_id: &str, amount: u64) -> Result<u64, LedgerError> {
        self.inner.credit(user, spin_id, amount)
    }

    fn void(&self, spin_id: &str) -> Result<(), LedgerError> {
        self.inner.void(spin_id)
    }

    fn is_settled(&self, spin_id: &str) -> Result<bool, LedgerError> {
        self.inner.is_settled(spin_id)
    }
}

#[test]
fn test_concurrent_spins_on_one_session() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let ledger = GatedLedger {
        inner: funded_ledger(1_000),
        entered: Mutex::new(Some(entered_tx)),
        release: Mutex::new(release_rx),
    };
    let engine = SlotEngine::load(game_path("classic-5x3.yaml")).unwrap();
    let orch = Arc::new(orchestrator(engine, ledger, CryptoSource::seeded(11)));
    let session = orch.open_session(alice()).unwrap();

    let first = {
        let orch = Arc::clone(&orch);
        let mut session = session.clone();
        thread::spawn(move || orch.spin(&mut session, SpinRequest::new(100)))
    };
    entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();

    let mut second_copy = session.clone();
    let err = orch.spin(&mut second_copy, SpinRequest::new(100)).unwrap_err();
    assert_eq!(err, SpinError::ConcurrencySerialization(session.session_id.clone()));
    assert!(err.is_retryable());
    assert_eq!(second_copy, session);

    release_tx.send(()).unwrap();
    let result = first.join().unwrap().unwrap();

    let journal = orch.ledger().inner.journal();
    let debits = journal.iter().filter(|e| e.kind == EntryKind::Debit).count();
    assert_eq!(debits, 1);
    let balance = orch.ledger().balance(&alice()).unwrap();
    assert_eq!(balance, 1_000 - 100 + result.total_win_sats);
    assert_eq!(result.balance_sats, balance);
}

#[test]
fn test_retry_after_restart_is_replayed() {
    let ledger = Arc::new(funded_ledger(100_000));
    let store = Arc::new(InMemorySessionStore::new());
    let worker = |seed: u64| {
        let engine = SlotEngine::load(game_path("classic-5x3.yaml")).unwrap();
        SpinOrchestrator::new(engine, Arc::clone(&ledger), Arc::clone(&store))
            .with_rng(CryptoSource::seeded(seed))
    };

    let before_restart = worker(5);
    let mut session = before_restart.open_session(alice()).unwrap();
    let request = SpinRequest::with_id(SpinId::from("round-1"), 100);
    let settled = before_restart.spin(&mut session, request.clone()).unwrap();
    let balance = ledger.balance(&alice()).unwrap();
    drop(before_restart);

    let after_restart = worker(6);
    let mut resumed = after_restart.resume_session(&session.session_id).unwrap().unwrap();
    assert_eq!(after_restart.spin(&mut resumed, request).unwrap(), settled);
    assert_eq!(ledger.balance(&alice()).unwrap(), balance);
    assert_eq!(resumed.spins_played, 1);
}

#[test]
fn test_spin_on_unopened_session_is_refused() {
    let engine = SlotEngine::load(game_path("classic-5x3.yaml")).unwrap();
    let orch = orchestrator(engine, funded_ledger(1_000), CryptoSource::seeded(2));
    let mut stray = SessionState::new(alice());
    let err = orch.spin(&mut stray, SpinRequest::new(100)).unwrap_err();
    assert_eq!(err, SpinError::UnknownSession(stray.session_id.clone()));
    assert!(orch.ledger().journal().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPERTIES
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_bet_below_minimum_leaves_balance() {
    let engine = SlotEngine::load(game_path("classic-5x3.yaml")).unwrap();
    let orch = orchestrator(engine, funded_ledger(10_000), CryptoSource::seeded(1));
    let mut session = orch.open_session(alice()).unwrap();

    for bet in [0, 1, 99] {
        let err = orch.spin(&mut session, SpinRequest::new(bet)).unwrap_err();
        assert!(matches!(err, SpinError::InvalidBet { .. }), "bet {bet}");
    }
    assert!(matches!(
        orch.spin(&mut session, SpinRequest::new(100_001)),
        Err(SpinError::InvalidBet { .. })
    ));
    assert_eq!(orch.ledger().balance(&alice()).unwrap(), 10_000);
    assert_eq!(session.spins_played, 0);
}

#[test]
fn test_balance_is_conserved() {
    for game in ["classic-5x3.yaml", "cluster-cascade.json"] {
        for seed in 0..4u64 {
            let engine = SlotEngine::load(game_path(game)).unwrap();
            let orch = orchestrator(engine, funded_ledger(200_000), CryptoSource::seeded(seed));
            let mut session = orch.open_session(alice()).unwrap();
            let mut bets = CryptoSource::seeded(seed + 1_000);

            for _ in 0..150 {
                let bet = 100 + 100 * bets.next_index(20) as u64;
                let before = orch.ledger().balance(&alice()).unwrap();
                let free = session.bonus.is_free_spin();
                match orch.spin(&mut session, SpinRequest::new(bet)) {
                    Ok(result) => {
                        assert_eq!(result.free_spin, free);
                        assert_eq!(result.debited_sats, if free { 0 } else { bet });
                        assert_eq!(
                            result.balance_sats,
                            before - result.debited_sats + result.total_win_sats,
                            "{game} seed {seed}"
                        );
                    }
                    Err(SpinError::InsufficientBalance { .. }) => {
                        assert_eq!(orch.ledger().balance(&alice()).unwrap(), before);
                    }
                    Err(other) => panic!("unexpected failure: {other}"),
                }
            }
        }
    }
}

#[test]
fn test_same_seed_same_spins() {
    let play = |seed: u64| {
        let engine = SlotEngine::load(game_path("cluster-cascade.json")).unwrap();
        let orch = orchestrator(engine, funded_ledger(1_000_000), CryptoSource::seeded(seed));
        let mut session = orch.open_session(alice()).unwrap();
        (0..40)
            .map(|_| {
                let r = orch.spin(&mut session, SpinRequest::new(500)).unwrap();
                (r.initial_grid, r.final_grid, r.win_events, r.total_win_sats, r.bonus)
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(play(42), play(42));
    assert_ne!(play(42), play(43));
}

#[test]
fn test_wins_never_exceed_cap() {
    let config = GameConfig::load(game_path("cluster-cascade.json")).unwrap();
    let engine = SlotEngine::new(config);
    let cap = engine.config().win_cap(100).unwrap();
    let mut rng = CryptoSource::seeded(7);
    let mut bonus = BonusState::default();

    for _ in 0..2_000 {
        let outcome = engine.play(&bonus, 100, &mut rng);
        assert!(outcome.payout.total_win_sats <= cap);
        if outcome.payout.capped {
            assert_eq!(outcome.payout.total_win_sats, cap);
        }
        assert!(outcome.cascades.len() <= 20);
        assert!(outcome
            .final_grid
            .cells()
            .all(|(_, s)| engine.config().symbols.contains(s)));
        bonus = outcome.bonus;
    }
}

#[test]
fn test_tiny_cap_clamps_every_win() {
    let mut doc: rb_slot_engine::GameConfigDocument =
        serde_yml::from_str(&std::fs::read_to_string(game_path("classic-5x3.yaml")).unwrap()).unwrap();
    doc.max_win = Some(0.5);
    let engine = rb_slot_engine::configure(doc).unwrap();
    let mut rng = CryptoSource::seeded(3);
    let mut capped = 0;
    for _ in 0..500 {
        let outcome = engine.play(&BonusState::default(), 1_000, &mut rng);
        assert!(outcome.payout.total_win_sats <= 500);
        if outcome.payout.capped {
            capped += 1;
            assert_eq!(outcome.payout.total_win_sats, 500);
        }
    }
    assert!(capped > 0);
}
