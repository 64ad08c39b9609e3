//! Bonus / free-spin state machine
//!
//! ```text
//!            scatter trigger                 last free spin
//!  Normal ───────────────────▶ BonusActive ─────────────────▶ BonusExhausted ──▶ Normal
//!                                 │   ▲
//!                                 └───┘ retrigger (per RetriggerPolicy)
//! ```
//!
//! The state is owned by one game session and travels with it; the machine
//! itself is stateless and only computes the next state.

use serde::{Deserialize, Serialize};

use crate::config::{BonusRules, RetriggerPolicy};
use crate::symbols::PayFactor;

/// Per-session bonus state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusState {
    pub bonus_active: bool,
    pub bonus_spins_remaining: u32,
    pub bonus_multiplier: PayFactor,
}

impl Default for BonusState {
    fn default() -> Self {
        Self {
            bonus_active: false,
            bonus_spins_remaining: 0,
            bonus_multiplier: PayFactor::ONE,
        }
    }
}

impl BonusState {
    pub fn phase(&self) -> BonusPhase {
        match (self.bonus_active, self.bonus_spins_remaining) {
            (false, _) => BonusPhase::Normal,
            (true, 0) => BonusPhase::BonusExhausted,
            (true, _) => BonusPhase::BonusActive,
        }
    }

    /// The next spin is free: no debit, bonus multiplier applies
    pub fn is_free_spin(&self) -> bool {
        self.phase() == BonusPhase::BonusActive
    }

    /// Multiplier the next spin pays with
    pub fn active_multiplier(&self) -> PayFactor {
        if self.is_free_spin() {
            self.bonus_multiplier
        } else {
            PayFactor::ONE
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusPhase {
    Normal,
    BonusActive,
    BonusExhausted,
}

/// Bonus state change caused by one spin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BonusTransition {
    Triggered { free_spins: u32, multiplier: PayFactor },
    Retriggered { added_spins: u32, multiplier: PayFactor },
    Exhausted,
}

/// Next state plus what happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BonusUpdate {
    pub state: BonusState,
    pub transition: Option<BonusTransition>,
}

/// Computes bonus transitions for one game's rules
#[derive(Debug, Clone, Copy)]
pub struct BonusStateMachine<'a> {
    rules: Option<&'a BonusRules>,
}

impl<'a> BonusStateMachine<'a> {
    pub fn new(rules: Option<&'a BonusRules>) -> Self {
        Self { rules }
    }

    /// Advance after a spin has been resolved.
    ///
    /// `state` is the state the spin started from; `triggered` says whether
    /// the spin's scatters reached the trigger count.
    pub fn advance(&self, state: &BonusState, triggered: bool) -> BonusUpdate {
        let rules = match self.rules {
            Some(rules) => rules,
            None => {
                return BonusUpdate {
                    state: BonusState::default(),
                    transition: None,
                };
            }
        };

        if !state.is_free_spin() {
            if triggered {
                let next = BonusState {
                    bonus_active: true,
                    bonus_spins_remaining: rules.free_spins,
                    bonus_multiplier: rules.multiplier,
                };
                log::info!(
                    "bonus triggered: {} free spins at {}",
                    rules.free_spins,
                    rules.multiplier
                );
                return BonusUpdate {
                    state: next,
                    transition: Some(BonusTransition::Triggered {
                        free_spins: rules.free_spins,
                        multiplier: rules.multiplier,
                    }),
                };
            }
            return BonusUpdate {
                state: BonusState::default(),
                transition: None,
            };
        }

        let mut next = *state;
        let mut transition = None;

        if triggered && rules.retrigger != RetriggerPolicy::None {
            let before = next.bonus_spins_remaining;
            next.bonus_spins_remaining = match rules.retrigger {
                RetriggerPolicy::Additive => before.saturating_add(rules.free_spins),
                RetriggerPolicy::Reset => before.max(rules.free_spins),
                RetriggerPolicy::None => before,
            };
            if rules.stack_multiplier {
                let stacked = next.bonus_multiplier.saturating_add(rules.multiplier);
                next.bonus_multiplier = match rules.max_multiplier {
                    Some(cap) => stacked.min(cap),
                    None => stacked,
                };
            }
            transition = Some(BonusTransition::Retriggered {
                added_spins: next.bonus_spins_remaining - before,
                multiplier: next.bonus_multiplier,
            });
        }

        next.bonus_spins_remaining = next.bonus_spins_remaining.saturating_sub(1);
        if next.bonus_spins_remaining == 0 {
            log::info!("bonus exhausted, back to normal play");
            return BonusUpdate {
                state: BonusState::default(),
                transition: Some(BonusTransition::Exhausted),
            };
        }

        BonusUpdate {
            state: next,
            transition,
        }
    }
}
