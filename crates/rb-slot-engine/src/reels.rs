//! Reel generator: draws symbol grids from strips or symbol weights

use serde::{Deserialize, Serialize};

use crate::config::GameConfig;
use crate::grid::Grid;
use crate::rng::RandomSource;
use crate::symbols::SymbolId;

/// Where a grid's symbols came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridSource {
    /// Random stop position on each physical reel strip
    ReelStrips,
    /// Independent weighted draw per cell (degraded accuracy)
    WeightedFallback,
}

/// A freshly drawn grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedGrid {
    pub grid: Grid,
    pub source: GridSource,
    /// Strip stop index per column (reel strips only)
    pub stops: Vec<usize>,
}

/// Draws grids for one validated config
pub struct ReelGenerator<'a> {
    config: &'a GameConfig,
    /// Cumulative weights for the fallback draw, in symbol table order
    cumulative: Vec<(u64, SymbolId)>,
}

impl<'a> ReelGenerator<'a> {
    pub fn new(config: &'a GameConfig) -> Self {
        let mut total = 0u64;
        let cumulative = config
            .symbols
            .iter()
            .filter(|s| s.weight > 0)
            .map(|s| {
                total += s.weight as u64;
                (total, s.id)
            })
            .collect();
        Self { config, cumulative }
    }

    pub fn source(&self) -> GridSource {
        if self.config.uses_reel_strips() {
            GridSource::ReelStrips
        } else {
            GridSource::WeightedFallback
        }
    }

    /// Draw a full grid, columns left to right
    pub fn generate(&self, rng: &mut dyn RandomSource) -> GeneratedGrid {
        let rows = self.config.layout.rows as usize;
        let columns = self.config.layout.columns as usize;

        match &self.config.reel_strips {
            Some(strips) => {
                let mut stops = Vec::with_capacity(columns);
                let grid = strips
                    .iter()
                    .map(|strip| {
                        let stop = rng.next_index(strip.len());
                        stops.push(stop);
                        strip.window(stop, rows)
                    })
                    .collect();
                GeneratedGrid {
                    grid: Grid::from_columns(grid),
                    source: GridSource::ReelStrips,
                    stops,
                }
            }
            None => {
                let grid = (0..columns)
                    .map(|_| (0..rows).map(|_| self.weighted(rng)).collect())
                    .collect();
                GeneratedGrid {
                    grid: Grid::from_columns(grid),
                    source: GridSource::WeightedFallback,
                    stops: Vec::new(),
                }
            }
        }
    }

    /// Draw one replacement symbol for a cascade refill.
    ///
    /// Strip position is not tracked after the first drop: a strip column
    /// refills from a uniform position on its strip (the strip's own symbol
    /// frequencies), a weighted game from the symbol weights.
    pub fn refill(&self, column: usize, rng: &mut dyn RandomSource) -> SymbolId {
        match self.config.reel_strips.as_ref().and_then(|s| s.get(column)) {
            Some(strip) => {
                let position = rng.next_index(strip.len());
                strip.symbols[position]
            }
            None => self.weighted(rng),
        }
    }

    fn weighted(&self, rng: &mut dyn RandomSource) -> SymbolId {
        let total = self.cumulative.last().map(|&(t, _)| t).unwrap_or(0);
        let draw = rng.next_index(total as usize) as u64;
        self.cumulative
            .iter()
            .find(|&&(upper, _)| draw < upper)
            .or(self.cumulative.last())
            .map(|&(_, id)| id)
            .unwrap_or_default()
    }
}
