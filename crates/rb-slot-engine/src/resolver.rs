//! Wild and scatter resolution

use crate::config::GameConfig;
use crate::grid::{Grid, Position};
use crate::spin::WinEvent;

/// Wild/scatter annotations for one grid
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub wild_positions: Vec<Position>,
    pub scatter_positions: Vec<Position>,
    pub scatter_count: u32,
    /// Scatter count reached the bonus trigger threshold
    pub triggers_bonus: bool,
}

impl Resolution {
    pub fn is_wild(&self, position: Position) -> bool {
        self.wild_positions.contains(&position)
    }
}

/// Marks wild and scatter cells and decides bonus triggers
pub struct WildScatterResolver<'a> {
    config: &'a GameConfig,
}

impl<'a> WildScatterResolver<'a> {
    pub fn new(config: &'a GameConfig) -> Self {
        Self { config }
    }

    pub fn resolve(&self, grid: &Grid) -> Resolution {
        let wild_positions = self
            .config
            .symbols
            .wild_id()
            .map(|id| grid.positions_of(id))
            .unwrap_or_default();
        let scatter_positions = self
            .config
            .symbols
            .scatter_id()
            .map(|id| grid.positions_of(id))
            .unwrap_or_default();
        let scatter_count = scatter_positions.len() as u32;
        let triggers_bonus = self
            .config
            .bonus
            .is_some_and(|rules| scatter_count >= rules.trigger_count);

        Resolution {
            wild_positions,
            scatter_positions,
            scatter_count,
            triggers_bonus,
        }
    }

    /// Scatter pay for a resolved grid: `pays[count] × total bet`
    pub fn scatter_win(&self, resolution: &Resolution, bet: u64) -> Option<WinEvent> {
        let scatter_id = self.config.symbols.scatter_id()?;
        let count = u8::try_from(resolution.scatter_count).ok()?;
        let factor = self.config.symbols.get(scatter_id)?.line_pay(count)?;
        let payout = factor.apply(bet);
        (payout > 0).then(|| WinEvent::scatter(scatter_id, resolution.scatter_positions.clone(), payout))
    }
}
