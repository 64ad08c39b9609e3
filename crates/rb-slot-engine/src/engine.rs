//! Pure spin pipeline over one validated game config
//!
//! ```text
//! ReelGenerator ─▶ CascadeController ─┬─▶ WildScatterResolver (final grid)
//!                  (paylines+clusters) │
//!                                      └─▶ PayoutAggregator ─▶ BonusStateMachine
//! ```
//!
//! Nothing here touches balances or sessions. Given the same config, bonus
//! state and draw sequence, [`SlotEngine::play`] always returns the same
//! [`SpinOutcome`].

use std::path::Path;
use std::sync::Arc;

use crate::bonus::{BonusState, BonusStateMachine, BonusTransition};
use crate::cascade::CascadeController;
use crate::config::{GameConfig, GameConfigDocument};
use crate::error::{ConfigResult, SpinError};
use crate::grid::Grid;
use crate::payout::{Payout, PayoutAggregator};
use crate::reels::{GridSource, ReelGenerator};
use crate::resolver::WildScatterResolver;
use crate::rng::RandomSource;
use crate::spin::{CascadeStep, SpinWarning, WinEvent};

/// Validate a config document and build an engine for it
pub fn configure(doc: GameConfigDocument) -> ConfigResult<SlotEngine> {
    GameConfig::validate(doc).map(SlotEngine::new)
}

/// Everything one spin produced, before any money moved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpinOutcome {
    pub free_spin: bool,
    pub grid_source: GridSource,
    pub initial_grid: Grid,
    pub final_grid: Grid,
    pub cascades: Vec<CascadeStep>,
    /// Cascade wins in order, then the scatter pay
    pub win_events: Vec<WinEvent>,
    pub scatter_count: u32,
    pub payout: Payout,
    /// Bonus state after this spin
    pub bonus: BonusState,
    pub bonus_transition: Option<BonusTransition>,
    pub warnings: Vec<SpinWarning>,
}

/// Cheap to clone; the config is shared
#[derive(Debug, Clone)]
pub struct SlotEngine {
    config: Arc<GameConfig>,
}

impl SlotEngine {
    pub fn new(config: GameConfig) -> Self {
        log::info!(
            "configured game '{}': {}x{}, {} symbols, {} paylines",
            config.name,
            config.layout.columns,
            config.layout.rows,
            config.symbols.len(),
            config.paylines.len()
        );
        Self {
            config: Arc::new(config),
        }
    }

    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        GameConfig::from_json_str(json).map(Self::new)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        GameConfig::load(path).map(Self::new)
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn validate_bet(&self, bet: u64) -> Result<(), SpinError> {
        let limits = self.config.bet;
        if limits.allows(bet) {
            Ok(())
        } else {
            Err(SpinError::InvalidBet {
                bet,
                min: limits.min_sats,
                max: limits.max_sats,
            })
        }
    }

    /// Draw a grid and resolve the whole spin
    pub fn play(&self, bonus: &BonusState, bet: u64, rng: &mut dyn RandomSource) -> SpinOutcome {
        let reels = ReelGenerator::new(&self.config);
        let generated = reels.generate(rng);
        self.resolve(&reels, bonus, generated.grid, generated.source, bet, rng)
    }

    /// Resolve a spin from a fixed starting grid; cascade refills still
    /// draw from `rng`
    pub fn play_grid(
        &self,
        bonus: &BonusState,
        grid: Grid,
        bet: u64,
        rng: &mut dyn RandomSource,
    ) -> SpinOutcome {
        let reels = ReelGenerator::new(&self.config);
        let source = reels.source();
        self.resolve(&reels, bonus, grid, source, bet, rng)
    }

    fn resolve(
        &self,
        reels: &ReelGenerator<'_>,
        bonus: &BonusState,
        grid: Grid,
        source: GridSource,
        bet: u64,
        rng: &mut dyn RandomSource,
    ) -> SpinOutcome {
        let config = self.config.as_ref();
        let free_spin = bonus.is_free_spin();
        let multiplier = bonus.active_multiplier();

        let mut warnings = Vec::new();
        if source == GridSource::WeightedFallback {
            warnings.push(SpinWarning::WeightedFallbackDraw);
        }

        let cascade = CascadeController::new(config, reels).run(grid.clone(), bet, rng);
        warnings.extend(cascade.warning.clone());

        // Scatters survive every cascade, so the final grid holds them all
        let resolver = WildScatterResolver::new(config);
        let resolution = resolver.resolve(&cascade.final_grid);
        let last_step = cascade.passes.saturating_sub(1);
        let scatter = resolver
            .scatter_win(&resolution, bet)
            .map(|w| w.at_step(last_step));

        let payout = PayoutAggregator::new(config).aggregate(&cascade.steps, scatter.as_ref(), multiplier, bet);
        let update = BonusStateMachine::new(config.bonus.as_ref()).advance(bonus, resolution.triggers_bonus);

        let mut win_events: Vec<WinEvent> = cascade.wins().cloned().collect();
        win_events.extend(scatter);

        log::debug!(
            "spin resolved: bet {} sats, {} wins, {} sats paid{}",
            bet,
            win_events.len(),
            payout.total_win_sats,
            if free_spin { " (free spin)" } else { "" }
        );

        SpinOutcome {
            free_spin,
            grid_source: source,
            initial_grid: grid,
            final_grid: cascade.final_grid,
            cascades: cascade.steps,
            win_events,
            scatter_count: resolution.scatter_count,
            payout,
            bonus: update.state,
            bonus_transition: update.transition,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{CryptoSource, ScriptedSource};
    use crate::symbols::PayFactor;

    const GAME: &str = r#"{
        "name": "three-by-three",
        "layout": { "rows": 3, "columns": 3 },
        "symbols": [
            { "id": 1, "name": "A", "pays": { "3": 5 } },
            { "id": 2, "name": "B", "pays": { "3": 2 } },
            { "id": 9, "name": "WILD" },
            { "id": 10, "name": "SCATTER", "pays": { "3": 1 } }
        ],
        "paylines": [[[0, 1], [1, 1], [2, 1]]],
        "reel_strips": [[1, 2, 9, 10, 2], [2, 1, 10, 2, 9], [10, 1, 2, 2, 1]],
        "wild_symbol_id": 9,
        "scatter_symbol_id": 10,
        "bonus": { "trigger_count": 3, "free_spins": 10, "multiplier": 2 },
        "max_win": 100,
        "bet": { "min_sats": 10, "max_sats": 1000 }
    }"#;

    #[test]
    fn test_bet_validation() {
        let engine = SlotEngine::from_json_str(GAME).unwrap();
        assert!(engine.validate_bet(10).is_ok());
        assert!(engine.validate_bet(1000).is_ok());
        assert_eq!(
            engine.validate_bet(9),
            Err(SpinError::InvalidBet {
                bet: 9,
                min: 10,
                max: 1000
            })
        );
        assert!(engine.validate_bet(0).is_err());
        assert!(engine.validate_bet(1001).is_err());
    }

    #[test]
    fn test_line_win_from_fixed_grid() {
        let engine = SlotEngine::from_json_str(GAME).unwrap();
        let grid = Grid::from_rows(&[vec![2, 2, 1], vec![1, 9, 1], vec![2, 1, 2]]);
        let outcome = engine.play_grid(&BonusState::default(), grid, 10, &mut ScriptedSource::new(vec![0]));
        assert!(!outcome.free_spin);
        assert_eq!(outcome.win_events.len(), 1);
        assert_eq!(outcome.payout.total_win_sats, 50);
        assert_eq!(outcome.bonus, BonusState::default());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_scatter_trigger_pays_and_starts_bonus() {
        let engine = SlotEngine::from_json_str(GAME).unwrap();
        let grid = Grid::from_rows(&[vec![10, 2, 1], vec![1, 10, 2], vec![2, 1, 10]]);
        let outcome = engine.play_grid(&BonusState::default(), grid, 10, &mut ScriptedSource::new(vec![0]));
        assert_eq!(outcome.scatter_count, 3);
        assert_eq!(outcome.payout.total_win_sats, 10);
        assert!(outcome.bonus.bonus_active);
        assert_eq!(outcome.bonus.bonus_spins_remaining, 10);
        assert!(matches!(
            outcome.bonus_transition,
            Some(BonusTransition::Triggered { free_spins: 10, .. })
        ));
    }

    #[test]
    fn test_free_spin_applies_multiplier() {
        let engine = SlotEngine::from_json_str(GAME).unwrap();
        let bonus = BonusState {
            bonus_active: true,
            bonus_spins_remaining: 4,
            bonus_multiplier: PayFactor::from_f64(2.0).unwrap(),
        };
        let grid = Grid::from_rows(&[vec![2, 2, 1], vec![1, 1, 1], vec![2, 1, 2]]);
        let outcome = engine.play_grid(&bonus, grid, 10, &mut ScriptedSource::new(vec![0]));
        assert!(outcome.free_spin);
        assert_eq!(outcome.payout.base_win_sats, 50);
        assert_eq!(outcome.payout.total_win_sats, 100);
        assert_eq!(outcome.bonus.bonus_spins_remaining, 3);
    }

    #[test]
    fn test_same_draws_same_outcome() {
        let engine = SlotEngine::from_json_str(GAME).unwrap();
        for seed in 0..20 {
            let a = engine.play(&BonusState::default(), 100, &mut CryptoSource::seeded(seed));
            let b = engine.play(&BonusState::default(), 100, &mut CryptoSource::seeded(seed));
            assert_eq!(a, b);
            assert_eq!(a.grid_source, GridSource::ReelStrips);
            assert!(a.payout.total_win_sats <= 100 * 100);
        }
    }

    #[test]
    fn test_configure_rejects_bad_document() {
        let doc: GameConfigDocument = serde_json::from_str(
            r#"{
                "layout": { "rows": 1, "columns": 3 },
                "symbols": [ { "id": 1, "pays": { "3": 1 } } ],
                "paylines": [[[0, 0], [1, 0], [5, 0]]],
                "bet": { "min_sats": 1, "max_sats": 10 }
            }"#,
        )
        .unwrap();
        assert!(configure(doc).is_err());
    }
}
