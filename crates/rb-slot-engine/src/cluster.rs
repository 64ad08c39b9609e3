//! Cluster ("match N anywhere") evaluation

use crate::config::GameConfig;
use crate::grid::{Grid, Position};
use crate::spin::WinEvent;
use crate::symbols::{PayFactor, Symbol};

/// Counts every regular symbol across the whole grid
pub struct ClusterEvaluator<'a> {
    config: &'a GameConfig,
}

struct Candidate<'s> {
    symbol: &'s Symbol,
    positions: Vec<Position>,
    pay: Option<PayFactor>,
}

impl<'a> ClusterEvaluator<'a> {
    pub fn new(config: &'a GameConfig) -> Self {
        Self { config }
    }

    pub fn is_active(&self) -> bool {
        self.config.min_symbols_to_match.is_some()
    }

    /// Evaluate cluster wins; payouts are multiples of the total bet.
    pub fn evaluate(&self, grid: &Grid, bet: u64) -> Vec<WinEvent> {
        let Some(threshold) = self.config.min_symbols_to_match else {
            return Vec::new();
        };
        let symbols = &self.config.symbols;
        let wilds = symbols
            .wild_id()
            .map(|id| grid.positions_of(id))
            .unwrap_or_default();

        let mut candidates: Vec<Candidate<'_>> = symbols
            .regular()
            .map(|symbol| {
                let positions = grid.positions_of(symbol.id);
                let pay = pay_for(symbol, positions.len() as u32, threshold);
                Candidate {
                    symbol,
                    positions,
                    pay,
                }
            })
            .collect();

        // All wilds go to the one symbol that gains the most from them
        if !wilds.is_empty() {
            let wild_count = wilds.len() as u32;
            let best = candidates
                .iter()
                .enumerate()
                .filter_map(|(i, c)| {
                    let boosted = pay_for(c.symbol, c.positions.len() as u32 + wild_count, threshold)?;
                    let base = c.pay.unwrap_or_default();
                    (boosted > base).then(|| (i, boosted.basis_points() - base.basis_points()))
                })
                .fold(None::<(usize, u64)>, |best, (i, gain)| match best {
                    Some((_, g)) if g >= gain => best,
                    _ => Some((i, gain)),
                });

            if let Some((i, _)) = best {
                let candidate = &mut candidates[i];
                candidate.positions.extend(wilds.iter().copied());
                candidate.positions.sort_unstable();
                candidate.pay = pay_for(candidate.symbol, candidate.positions.len() as u32, threshold);
            }
        }

        candidates
            .into_iter()
            .filter_map(|c| {
                let payout = c.pay?.apply(bet);
                (payout > 0).then(|| WinEvent::cluster(c.symbol.id, c.positions, payout))
            })
            .collect()
    }
}

/// Exact-count lookup; counts without a key pay nothing
fn pay_for(symbol: &Symbol, count: u32, threshold: u32) -> Option<PayFactor> {
    if count < threshold {
        return None;
    }
    symbol.cluster_pay(count)
}
