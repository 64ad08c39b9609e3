//! Payout aggregation: totals, bonus multiplier, max-win cap and win tier

use serde::{Deserialize, Serialize};

use crate::config::{GameConfig, MultiplierMode};
use crate::spin::{CascadeStep, WinEvent};
use crate::symbols::PayFactor;

// ═══════════════════════════════════════════════════════════════════════════════
// WIN TIER
// ═══════════════════════════════════════════════════════════════════════════════

/// Presentation tier of a win, by multiple of the bet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinTier {
    #[default]
    None,
    Small,
    Medium,
    Big,
    Mega,
    Epic,
    Ultra,
}

impl WinTier {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::None => "No Win",
            Self::Small => "Small Win",
            Self::Medium => "Medium Win",
            Self::Big => "Big Win",
            Self::Mega => "Mega Win",
            Self::Epic => "Epic Win",
            Self::Ultra => "Ultra Win",
        }
    }

    /// Standard thresholds: 5x, 15x, 25x, 50x, 100x
    pub fn classify(win_sats: u64, bet_sats: u64) -> Self {
        if win_sats == 0 {
            return Self::None;
        }
        if bet_sats == 0 {
            return Self::Ultra;
        }
        let ratio = win_sats / bet_sats;
        match ratio {
            r if r >= 100 => Self::Ultra,
            r if r >= 50 => Self::Epic,
            r if r >= 25 => Self::Mega,
            r if r >= 15 => Self::Big,
            r if r >= 5 => Self::Medium,
            _ => Self::Small,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AGGREGATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Final money figures of one spin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Sum of every win event, before the multiplier
    pub base_win_sats: u64,
    pub multiplier: PayFactor,
    /// Paid amount after multiplier and cap
    pub total_win_sats: u64,
    /// The cap reduced the total
    pub capped: bool,
    pub tier: WinTier,
}

pub struct PayoutAggregator<'a> {
    config: &'a GameConfig,
}

impl<'a> PayoutAggregator<'a> {
    pub fn new(config: &'a GameConfig) -> Self {
        Self { config }
    }

    /// Total the cascade steps plus the scatter win.
    ///
    /// With [`MultiplierMode::OnTotal`] the multiplier is applied once to the
    /// grand total; with [`MultiplierMode::PerCascadeStep`] each step's
    /// subtotal (and the scatter pay) is multiplied and floored on its own.
    pub fn aggregate(
        &self,
        steps: &[CascadeStep],
        scatter: Option<&WinEvent>,
        multiplier: PayFactor,
        bet: u64,
    ) -> Payout {
        let scatter_sats = scatter.map(|w| w.payout_sats).unwrap_or(0);
        let base_win_sats = steps
            .iter()
            .fold(scatter_sats, |acc, step| acc.saturating_add(step.total_sats()));

        let multiplied = match self.config.multiplier_mode {
            MultiplierMode::OnTotal => multiplier.apply(base_win_sats),
            MultiplierMode::PerCascadeStep => steps
                .iter()
                .fold(multiplier.apply(scatter_sats), |acc, step| {
                    acc.saturating_add(multiplier.apply(step.total_sats()))
                }),
        };

        let (total_win_sats, capped) = match self.config.win_cap(bet) {
            Some(cap) if multiplied > cap => {
                log::info!("win of {} sats capped to {} sats", multiplied, cap);
                (cap, true)
            }
            _ => (multiplied, false),
        };

        Payout {
            base_win_sats,
            multiplier,
            total_win_sats,
            capped,
            tier: WinTier::classify(total_win_sats, bet),
        }
    }
}
