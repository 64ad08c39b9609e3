//! Aggregate statistics over simulated spins

use std::collections::BTreeMap;

use rb_slot_engine::{BonusTransition, SpinResult, WinTier};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationStats {
    pub total_spins: u64,
    pub paid_spins: u64,
    pub free_spins: u64,
    pub total_bet_sats: u64,
    pub total_win_sats: u64,
    pub wins: u64,
    pub bonus_triggers: u64,
    pub retriggers: u64,
    pub cascade_chains: u64,
    pub max_cascade_depth: usize,
    pub guard_trips: u64,
    pub capped_wins: u64,
    pub max_win_sats: u64,
    /// Sessions stopped early for lack of funds
    pub busted_sessions: u64,
    pub tiers: BTreeMap<WinTier, u64>,
}

impl SimulationStats {
    pub fn record(&mut self, result: &SpinResult) {
        self.total_spins += 1;
        if result.free_spin {
            self.free_spins += 1;
        } else {
            self.paid_spins += 1;
        }
        self.total_bet_sats = self.total_bet_sats.saturating_add(result.debited_sats);
        self.total_win_sats = self.total_win_sats.saturating_add(result.total_win_sats);

        if result.is_win() {
            self.wins += 1;
            *self.tiers.entry(result.win_tier).or_default() += 1;
        }
        match result.bonus_transition {
            Some(BonusTransition::Triggered { .. }) => self.bonus_triggers += 1,
            Some(BonusTransition::Retriggered { .. }) => self.retriggers += 1,
            _ => {}
        }

        let depth = result.cascade_depth();
        if depth > 1 {
            self.cascade_chains += 1;
        }
        self.max_cascade_depth = self.max_cascade_depth.max(depth);
        if result.guard_tripped() {
            self.guard_trips += 1;
        }
        if result.capped {
            self.capped_wins += 1;
        }
        self.max_win_sats = self.max_win_sats.max(result.total_win_sats);
    }

    pub fn merge(&mut self, other: &SimulationStats) {
        self.total_spins += other.total_spins;
        self.paid_spins += other.paid_spins;
        self.free_spins += other.free_spins;
        self.total_bet_sats = self.total_bet_sats.saturating_add(other.total_bet_sats);
        self.total_win_sats = self.total_win_sats.saturating_add(other.total_win_sats);
        self.wins += other.wins;
        self.bonus_triggers += other.bonus_triggers;
        self.retriggers += other.retriggers;
        self.cascade_chains += other.cascade_chains;
        self.max_cascade_depth = self.max_cascade_depth.max(other.max_cascade_depth);
        self.guard_trips += other.guard_trips;
        self.capped_wins += other.capped_wins;
        self.max_win_sats = self.max_win_sats.max(other.max_win_sats);
        self.busted_sessions += other.busted_sessions;
        for (tier, count) in &other.tiers {
            *self.tiers.entry(*tier).or_default() += count;
        }
    }

    /// Calculate RTP (percent of staked sats paid back)
    pub fn rtp(&self) -> f64 {
        if self.total_bet_sats > 0 {
            (self.total_win_sats as f64 / self.total_bet_sats as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Calculate hit rate (percent of spins that paid anything)
    pub fn hit_rate(&self) -> f64 {
        if self.total_spins > 0 {
            (self.wins as f64 / self.total_spins as f64) * 100.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_on_empty_stats() {
        let stats = SimulationStats::default();
        assert_eq!(stats.rtp(), 0.0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_merge_sums_and_maxes() {
        let mut a = SimulationStats {
            total_spins: 10,
            paid_spins: 10,
            total_bet_sats: 1_000,
            total_win_sats: 900,
            wins: 3,
            max_win_sats: 400,
            ..Default::default()
        };
        a.tiers.insert(WinTier::Small, 3);
        let mut b = SimulationStats {
            total_spins: 10,
            paid_spins: 8,
            free_spins: 2,
            total_bet_sats: 800,
            total_win_sats: 900,
            wins: 5,
            max_win_sats: 600,
            ..Default::default()
        };
        b.tiers.insert(WinTier::Small, 4);
        b.tiers.insert(WinTier::Big, 1);

        a.merge(&b);
        assert_eq!(a.total_spins, 20);
        assert_eq!(a.total_bet_sats, 1_800);
        assert_eq!(a.max_win_sats, 600);
        assert_eq!(a.tiers[&WinTier::Small], 7);
        assert_eq!(a.tiers[&WinTier::Big], 1);
        assert_eq!(a.rtp(), 100.0);
        assert_eq!(a.hit_rate(), 40.0);
    }
}
