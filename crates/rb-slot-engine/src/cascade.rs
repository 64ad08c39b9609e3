//! Cascade (avalanche) controller
//!
//! ```text
//!   ┌────────────┐ wins  ┌──────────┐      ┌───────────┐
//!   │ Evaluating │──────▶│ Removing │─────▶│ Refilling │──┐
//!   └────────────┘       └──────────┘      └───────────┘  │
//!     │    ▲                                              │
//!     │    └──────────────────────────────────────────────┘
//!     │ no wins / cascades off / iteration cap
//!     ▼
//!   Done
//! ```
//!
//! Winning cells are cleared, survivors fall to the bottom of their column
//! in their original order and vacated top cells are refilled from the
//! [`ReelGenerator`]. Scatters are never part of a line or cluster win, so
//! they survive every pass.

use std::collections::BTreeSet;

use crate::cluster::ClusterEvaluator;
use crate::config::GameConfig;
use crate::grid::{Grid, Position};
use crate::payline::PaylineEvaluator;
use crate::reels::ReelGenerator;
use crate::rng::RandomSource;
use crate::spin::{CascadeStep, SpinWarning, WinEvent};
use crate::symbols::SymbolId;

/// Loop state; each variant carries what the next phase needs
enum Phase {
    Evaluating(Grid),
    Removing(Grid, Vec<Position>),
    Refilling(Vec<Vec<Option<SymbolId>>>),
    Done(Grid),
}

/// Everything one cascade run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeOutcome {
    /// Passes that produced wins, in order
    pub steps: Vec<CascadeStep>,
    /// Grid left on screen when the loop stopped
    pub final_grid: Grid,
    /// Evaluation passes run, including the final empty one
    pub passes: u32,
    pub warning: Option<SpinWarning>,
}

impl CascadeOutcome {
    pub fn wins(&self) -> impl Iterator<Item = &WinEvent> {
        self.steps.iter().flat_map(|s| s.wins.iter())
    }

    pub fn guard_tripped(&self) -> bool {
        matches!(self.warning, Some(SpinWarning::CascadeGuardTripped { .. }))
    }
}

pub struct CascadeController<'a> {
    config: &'a GameConfig,
    reels: &'a ReelGenerator<'a>,
    paylines: PaylineEvaluator<'a>,
    clusters: ClusterEvaluator<'a>,
}

impl<'a> CascadeController<'a> {
    pub fn new(config: &'a GameConfig, reels: &'a ReelGenerator<'a>) -> Self {
        Self {
            config,
            reels,
            paylines: PaylineEvaluator::new(config),
            clusters: ClusterEvaluator::new(config),
        }
    }

    /// Evaluation pass cap. One pass when cascades are off.
    pub fn max_passes(&self) -> u32 {
        if self.config.cascade.enabled {
            self.config.cascade.max_iterations.max(1)
        } else {
            1
        }
    }

    /// Line and cluster wins on one grid
    pub fn evaluate(&self, grid: &Grid, bet: u64) -> Vec<WinEvent> {
        let mut wins = self.paylines.evaluate(grid, bet);
        if self.clusters.is_active() {
            wins.extend(self.clusters.evaluate(grid, bet));
        }
        wins
    }

    /// Run the loop from `grid` until no pass wins or the cap is hit.
    pub fn run(&self, grid: Grid, bet: u64, rng: &mut dyn RandomSource) -> CascadeOutcome {
        let enabled = self.config.cascade.enabled;
        let max_passes = self.max_passes();
        let mut steps: Vec<CascadeStep> = Vec::new();
        let mut passes = 0u32;
        let mut warning = None;
        let mut phase = Phase::Evaluating(grid);

        let final_grid = loop {
            phase = match phase {
                Phase::Evaluating(grid) => {
                    passes += 1;
                    let index = steps.len() as u32;
                    let wins: Vec<WinEvent> = self
                        .evaluate(&grid, bet)
                        .into_iter()
                        .map(|w| w.at_step(index))
                        .collect();

                    if wins.is_empty() {
                        Phase::Done(grid)
                    } else if !enabled {
                        steps.push(CascadeStep {
                            index,
                            grid: grid.clone(),
                            wins,
                            removed: Vec::new(),
                        });
                        Phase::Done(grid)
                    } else {
                        let removed = winning_cells(&wins);
                        steps.push(CascadeStep {
                            index,
                            grid: grid.clone(),
                            wins,
                            removed: removed.clone(),
                        });
                        if passes >= max_passes {
                            log::warn!(
                                "cascade guard tripped after {} passes on '{}', chain truncated",
                                passes,
                                self.config.name
                            );
                            warning = Some(SpinWarning::CascadeGuardTripped { iterations: passes });
                            Phase::Done(grid)
                        } else {
                            Phase::Removing(grid, removed)
                        }
                    }
                }
                Phase::Removing(grid, removed) => {
                    let mut cells: Vec<Vec<Option<SymbolId>>> = grid
                        .columns()
                        .iter()
                        .map(|column| column.iter().copied().map(Some).collect())
                        .collect();
                    for (column, row) in removed {
                        if let Some(cell) = cells
                            .get_mut(column as usize)
                            .and_then(|c| c.get_mut(row as usize))
                        {
                            *cell = None;
                        }
                    }
                    Phase::Refilling(cells)
                }
                Phase::Refilling(cells) => Phase::Evaluating(self.refill(cells, rng)),
                Phase::Done(grid) => break grid,
            };
        };

        log::trace!("cascade finished: {} passes, {} winning", passes, steps.len());
        CascadeOutcome {
            steps,
            final_grid,
            passes,
            warning,
        }
    }

    /// Gravity then refill; columns left to right, new cells top to bottom
    fn refill(&self, cells: Vec<Vec<Option<SymbolId>>>, rng: &mut dyn RandomSource) -> Grid {
        let columns = cells
            .into_iter()
            .enumerate()
            .map(|(c, column)| {
                let rows = column.len();
                let survivors: Vec<SymbolId> = column.into_iter().flatten().collect();
                let vacated = rows - survivors.len();
                let mut refilled: Vec<SymbolId> =
                    (0..vacated).map(|_| self.reels.refill(c, rng)).collect();
                refilled.extend(survivors);
                refilled
            })
            .collect();
        Grid::from_columns(columns)
    }
}

/// Union of every win's cells, sorted
fn winning_cells(wins: &[WinEvent]) -> Vec<Position> {
    wins.iter()
        .flat_map(|w| w.positions.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::ScriptedSource;

    /// 3x1 grid of four equally weighted symbols; three A's pay 2x
    fn avalanche(enabled: bool, max_iterations: u32) -> GameConfig {
        GameConfig::from_json_str(&format!(
            r#"{{
                "layout": {{ "rows": 1, "columns": 3 }},
                "symbols": [
                    {{ "id": 1, "name": "A", "cluster_payouts": {{ "3": 2.0 }} }},
                    {{ "id": 2, "name": "B" }},
                    {{ "id": 3, "name": "C" }},
                    {{ "id": 4, "name": "D" }}
                ],
                "min_symbols_to_match": 3,
                "cascade": {{ "enabled": {enabled}, "max_iterations": {max_iterations} }},
                "bet": {{ "min_sats": 1, "max_sats": 1000 }}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_chain_until_no_wins() {
        let config = avalanche(true, 20);
        let reels = ReelGenerator::new(&config);
        let controller = CascadeController::new(&config, &reels);
        // refill A A A, then B C D
        let mut rng = ScriptedSource::new(vec![0, 0, 0, 1, 2, 3]);
        let outcome = controller.run(Grid::from_rows(&[vec![1, 1, 1]]), 100, &mut rng);

        assert_eq!(outcome.steps.len(), 2);
        assert_eq!(outcome.passes, 3);
        assert_eq!(outcome.steps[0].wins[0].payout_sats, 200);
        assert_eq!(outcome.steps[1].wins[0].cascade_step, 1);
        assert_eq!(outcome.wins().map(|w| w.payout_sats).sum::<u64>(), 400);
        assert_eq!(outcome.final_grid, Grid::from_rows(&[vec![2, 3, 4]]));
        assert_eq!(outcome.warning, None);
        assert_eq!(rng.consumed(), 6);
    }

    #[test]
    fn test_disabled_runs_one_pass() {
        let config = avalanche(false, 20);
        let reels = ReelGenerator::new(&config);
        let controller = CascadeController::new(&config, &reels);
        let mut rng = ScriptedSource::new(vec![0]);
        let grid = Grid::from_rows(&[vec![1, 1, 1]]);
        let outcome = controller.run(grid.clone(), 100, &mut rng);

        assert_eq!(outcome.steps.len(), 1);
        assert!(outcome.steps[0].removed.is_empty());
        assert_eq!(outcome.final_grid, grid);
        assert_eq!(rng.consumed(), 0);
    }

    #[test]
    fn test_guard_trips_at_cap() {
        let config = avalanche(true, 5);
        let reels = ReelGenerator::new(&config);
        let controller = CascadeController::new(&config, &reels);
        // every refill draws A: the chain never ends on its own
        let mut rng = ScriptedSource::new(vec![0]);
        let outcome = controller.run(Grid::from_rows(&[vec![1, 1, 1]]), 100, &mut rng);

        assert_eq!(outcome.steps.len(), 5);
        assert_eq!(outcome.passes, 5);
        assert!(outcome.guard_tripped());
        assert_eq!(
            outcome.warning,
            Some(SpinWarning::CascadeGuardTripped { iterations: 5 })
        );
        assert_eq!(outcome.wins().map(|w| w.payout_sats).sum::<u64>(), 1_000);
    }

    #[test]
    fn test_gravity_preserves_order() {
        let config = GameConfig::from_json_str(
            r#"{
                "layout": { "rows": 3, "columns": 3 },
                "symbols": [
                    { "id": 1, "pays": { "3": 1 } },
                    { "id": 2 },
                    { "id": 3 },
                    { "id": 4 }
                ],
                "paylines": [[[0, 1], [1, 1], [2, 1]]],
                "cascade": { "enabled": true },
                "bet": { "min_sats": 1, "max_sats": 1000 }
            }"#,
        )
        .unwrap();
        let reels = ReelGenerator::new(&config);
        let controller = CascadeController::new(&config, &reels);
        let grid = Grid::from_rows(&[vec![2, 3, 4], vec![1, 1, 1], vec![4, 2, 3]]);
        // one refill per column, all symbol 4
        let mut rng = ScriptedSource::new(vec![3]);
        let outcome = controller.run(grid, 30, &mut rng);

        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.steps[0].removed, vec![(0, 1), (1, 1), (2, 1)]);
        assert_eq!(
            outcome.final_grid,
            Grid::from_rows(&[vec![4, 4, 4], vec![2, 3, 4], vec![4, 2, 3]])
        );
    }

    #[test]
    fn test_no_win_grid_is_untouched() {
        let config = avalanche(true, 20);
        let reels = ReelGenerator::new(&config);
        let controller = CascadeController::new(&config, &reels);
        let mut rng = ScriptedSource::new(vec![0]);
        let grid = Grid::from_rows(&[vec![1, 2, 1]]);
        let outcome = controller.run(grid.clone(), 100, &mut rng);
        assert!(outcome.steps.is_empty());
        assert_eq!(outcome.passes, 1);
        assert_eq!(outcome.final_grid, grid);
    }
}
