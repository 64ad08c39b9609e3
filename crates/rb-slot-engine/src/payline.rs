//! Payline evaluation

use crate::config::{GameConfig, Payline, WildLinePolicy};
use crate::grid::Grid;
use crate::spin::WinEvent;
use crate::symbols::{PayFactor, Symbol, SymbolId};

/// Scans every configured payline for a left-anchored run
pub struct PaylineEvaluator<'a> {
    config: &'a GameConfig,
}

impl<'a> PaylineEvaluator<'a> {
    pub fn new(config: &'a GameConfig) -> Self {
        Self { config }
    }

    /// Evaluate all lines. `bet` is the total stake; each line gets an
    /// equal share of it.
    pub fn evaluate(&self, grid: &Grid, bet: u64) -> Vec<WinEvent> {
        let line_count = self.config.paylines.len() as u64;
        self.config
            .paylines
            .iter()
            .filter_map(|line| self.evaluate_line(grid, line, bet, line_count))
            .collect()
    }

    fn evaluate_line(&self, grid: &Grid, line: &Payline, bet: u64, line_count: u64) -> Option<WinEvent> {
        let symbols = &self.config.symbols;
        let cells: Vec<SymbolId> = line
            .cells
            .iter()
            .map(|&pos| grid.get(pos))
            .collect::<Option<_>>()?;

        // First non-wild cell decides what the line is paying for. A
        // scatter there leaves only the leading wilds as a run.
        let target = cells
            .iter()
            .copied()
            .find(|&s| !symbols.is_wild(s))
            .filter(|&s| !symbols.is_scatter(s));

        let run = cells
            .iter()
            .take_while(|&&s| symbols.is_wild(s) || Some(s) == target)
            .count();
        if run == 0 {
            return None;
        }

        let (symbol_id, length, factor) = match target {
            Some(id) => {
                let symbol = symbols.get(id)?;
                let (length, factor) = longest_paying_prefix(symbol, run)?;
                (id, length, factor)
            }
            None => self.wild_line(run)?,
        };

        let payout = factor.apply_fraction(bet, line_count);
        if payout == 0 {
            return None;
        }
        let positions = line.cells[..length].to_vec();
        Some(WinEvent::payline(line.index, symbol_id, positions, payout))
    }

    /// Pay an all-wild run per the configured policy
    fn wild_line(&self, run: usize) -> Option<(SymbolId, usize, PayFactor)> {
        let symbols = &self.config.symbols;
        match self.config.wild_line_policy {
            WildLinePolicy::NoPay => None,
            WildLinePolicy::WildSymbolValue => {
                let wild = symbols.get(symbols.wild_id()?)?;
                let (length, factor) = longest_paying_prefix(wild, run)?;
                Some((wild.id, length, factor))
            }
            WildLinePolicy::BestPayingSymbol => (1..=run).rev().find_map(|length| {
                let length_u8 = u8::try_from(length).ok()?;
                symbols
                    .best_line_pay(length_u8)
                    .map(|(id, factor)| (id, length, factor))
            }),
        }
    }
}

/// Longest prefix `L <= run` the symbol has a value for
fn longest_paying_prefix(symbol: &Symbol, run: usize) -> Option<(usize, PayFactor)> {
    (1..=run).rev().find_map(|length| {
        let factor = symbol.line_pay(u8::try_from(length).ok()?)?;
        Some((length, factor))
    })
}
