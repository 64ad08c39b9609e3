//! Spin outcome types

use serde::{Deserialize, Serialize};

use crate::bonus::{BonusState, BonusTransition};
use crate::grid::{Grid, Position};
use crate::payout::WinTier;
use crate::reels::GridSource;
use crate::session::SessionId;
use crate::symbols::{PayFactor, SymbolId};

/// Which rule produced a win
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinKind {
    Payline,
    Cluster,
    Scatter,
}

/// A single win found during evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinEvent {
    pub kind: WinKind,
    pub symbol_id: SymbolId,
    /// Cells that form the win, wilds included
    pub positions: Vec<Position>,
    /// Run length, cluster size or scatter count
    pub count: u32,
    /// Payout before any bonus multiplier
    pub payout_sats: u64,
    /// Payline index for line wins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_index: Option<usize>,
    /// Cascade pass that produced the win (0 = initial grid)
    #[serde(default)]
    pub cascade_step: u32,
}

impl WinEvent {
    pub fn payline(
        line_index: usize,
        symbol_id: SymbolId,
        positions: Vec<Position>,
        payout_sats: u64,
    ) -> Self {
        Self {
            kind: WinKind::Payline,
            symbol_id,
            count: positions.len() as u32,
            positions,
            payout_sats,
            line_index: Some(line_index),
            cascade_step: 0,
        }
    }

    pub fn cluster(symbol_id: SymbolId, positions: Vec<Position>, payout_sats: u64) -> Self {
        Self {
            kind: WinKind::Cluster,
            symbol_id,
            count: positions.len() as u32,
            positions,
            payout_sats,
            line_index: None,
            cascade_step: 0,
        }
    }

    pub fn scatter(symbol_id: SymbolId, positions: Vec<Position>, payout_sats: u64) -> Self {
        Self {
            kind: WinKind::Scatter,
            symbol_id,
            count: positions.len() as u32,
            positions,
            payout_sats,
            line_index: None,
            cascade_step: 0,
        }
    }

    pub fn at_step(mut self, step: u32) -> Self {
        self.cascade_step = step;
        self
    }
}

/// One evaluation pass of the cascade loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeStep {
    pub index: u32,
    /// Grid the pass evaluated
    pub grid: Grid,
    pub wins: Vec<WinEvent>,
    /// Cells cleared after the pass (sorted, unique)
    pub removed: Vec<Position>,
}

impl CascadeStep {
    pub fn total_sats(&self) -> u64 {
        self.wins
            .iter()
            .fold(0u64, |acc, w| acc.saturating_add(w.payout_sats))
    }
}

/// Non-fatal conditions worth monitoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpinWarning {
    /// The cascade iteration cap stopped a chain that still had wins
    CascadeGuardTripped { iterations: u32 },
    /// The grid came from the weighted per-cell fallback
    WeightedFallbackDraw,
}

/// Complete result of a settled spin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinResult {
    pub spin_id: String,
    pub session_id: SessionId,
    pub bet_sats: u64,
    /// Amount taken from the balance (0 on a free spin)
    pub debited_sats: u64,
    pub free_spin: bool,
    pub grid_source: GridSource,
    pub initial_grid: Grid,
    pub final_grid: Grid,
    pub cascades: Vec<CascadeStep>,
    /// Every win across all cascade steps plus scatter pays
    pub win_events: Vec<WinEvent>,
    pub scatter_count: u32,
    /// Bonus multiplier applied to this spin
    pub multiplier: PayFactor,
    /// Sum of win events before the multiplier
    pub base_win_sats: u64,
    pub total_win_sats: u64,
    /// Whether the max-win cap reduced the total
    pub capped: bool,
    pub win_tier: WinTier,
    pub bonus: BonusState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonus_transition: Option<BonusTransition>,
    pub balance_sats: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<SpinWarning>,
}

impl SpinResult {
    pub fn is_win(&self) -> bool {
        self.total_win_sats > 0
    }

    /// Number of evaluation passes that produced wins
    pub fn cascade_depth(&self) -> usize {
        self.cascades.iter().filter(|s| !s.wins.is_empty()).count()
    }

    pub fn guard_tripped(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, SpinWarning::CascadeGuardTripped { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_win_event_constructors() {
        let win = WinEvent::payline(2, 7, vec![(0, 1), (1, 1), (2, 1)], 50).at_step(1);
        assert_eq!(win.kind, WinKind::Payline);
        assert_eq!(win.count, 3);
        assert_eq!(win.line_index, Some(2));
        assert_eq!(win.cascade_step, 1);

        let cluster = WinEvent::cluster(4, vec![(0, 0); 5], 100);
        assert_eq!(cluster.count, 5);
        assert_eq!(cluster.line_index, None);
    }

    #[test]
    fn test_cascade_step_total() {
        let step = CascadeStep {
            index: 0,
            grid: Grid::from_rows(&[vec![1, 1, 1]]),
            wins: vec![
                WinEvent::cluster(1, vec![(0, 0)], 30),
                WinEvent::payline(0, 1, vec![(0, 0)], 12),
            ],
            removed: vec![(0, 0)],
        };
        assert_eq!(step.total_sats(), 42);
    }

    #[test]
    fn test_warning_serialization() {
        let json = serde_json::to_string(&SpinWarning::CascadeGuardTripped { iterations: 20 }).unwrap();
        assert_eq!(json, r#"{"type":"cascade_guard_tripped","iterations":20}"#);
    }
}
