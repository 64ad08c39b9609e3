//! Symbol definitions, pay factors and reel strips

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Symbol identifier as used in configs, strips and grids
pub type SymbolId = u32;

/// A non-negative pay multiple stored in basis points (1/10 000).
///
/// Configs declare multiples as decimals; all payout math runs on the
/// integer form so satoshi amounts never pass through floating point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayFactor(u64);

impl PayFactor {
    /// Basis points per 1.0
    pub const SCALE: u64 = 10_000;
    pub const ZERO: PayFactor = PayFactor(0);
    pub const ONE: PayFactor = PayFactor(Self::SCALE);
    /// Largest multiple accepted from a config (one million times)
    pub const MAX_MULTIPLE: f64 = 1_000_000.0;

    /// Convert a decimal multiple, rounding to the nearest basis point.
    /// Returns `None` for negative, non-finite or absurdly large values.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 || value > Self::MAX_MULTIPLE {
            return None;
        }
        Some(Self((value * Self::SCALE as f64).round() as u64))
    }

    pub const fn from_basis_points(bp: u64) -> Self {
        Self(bp)
    }

    pub fn basis_points(self) -> u64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// `sats × self`, floored to whole satoshis
    pub fn apply(self, sats: u64) -> u64 {
        self.apply_fraction(sats, 1)
    }

    /// `sats × self / divisor`, floored to whole satoshis
    pub fn apply_fraction(self, sats: u64, divisor: u64) -> u64 {
        let divisor = divisor.max(1) as u128;
        let value = sats as u128 * self.0 as u128 / (Self::SCALE as u128 * divisor);
        u64::try_from(value).unwrap_or(u64::MAX)
    }
}

impl fmt::Display for PayFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.as_f64())
    }
}

/// Role a symbol plays during evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// Regular paying symbol
    Regular,
    /// Wild - substitutes for every non-scatter symbol
    Wild,
    /// Scatter - pays and triggers by total count
    Scatter,
}

/// A validated symbol definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    /// Line value per run length (scatter: per total count)
    pub pays: BTreeMap<u8, PayFactor>,
    /// Cluster value per exact count, multiple of total bet
    pub cluster_payouts: BTreeMap<u32, PayFactor>,
    /// Relative weight for the fallback draw
    pub weight: u32,
}

impl Symbol {
    /// Line value for a run of `length`, `None` when undefined or zero
    pub fn line_pay(&self, length: u8) -> Option<PayFactor> {
        self.pays.get(&length).copied().filter(|p| !p.is_zero())
    }

    /// Cluster value for an exact `count`, `None` when the key is absent
    pub fn cluster_pay(&self, count: u32) -> Option<PayFactor> {
        self.cluster_payouts
            .get(&count)
            .copied()
            .filter(|p| !p.is_zero())
    }

    pub fn is_regular(&self) -> bool {
        self.kind == SymbolKind::Regular
    }
}

/// All symbols of one game, indexed by id
#[derive(Debug, Clone)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    index: HashMap<SymbolId, usize>,
    wild_id: Option<SymbolId>,
    scatter_id: Option<SymbolId>,
}

impl SymbolTable {
    /// Build a table. Ids must be unique; the caller validates that.
    pub(crate) fn new(symbols: Vec<Symbol>) -> Self {
        let index = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id, i))
            .collect();
        let wild_id = symbols
            .iter()
            .find(|s| s.kind == SymbolKind::Wild)
            .map(|s| s.id);
        let scatter_id = symbols
            .iter()
            .find(|s| s.kind == SymbolKind::Scatter)
            .map(|s| s.id);
        Self {
            symbols,
            index,
            wild_id,
            scatter_id,
        }
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.index.get(&id).map(|&i| &self.symbols[i])
    }

    pub fn contains(&self, id: SymbolId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn wild_id(&self) -> Option<SymbolId> {
        self.wild_id
    }

    pub fn scatter_id(&self) -> Option<SymbolId> {
        self.scatter_id
    }

    pub fn is_wild(&self, id: SymbolId) -> bool {
        self.wild_id == Some(id)
    }

    pub fn is_scatter(&self, id: SymbolId) -> bool {
        self.scatter_id == Some(id)
    }

    /// Regular symbols in declaration order
    pub fn regular(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| s.is_regular())
    }

    /// Best line value any regular symbol offers for a run of `length`
    pub fn best_line_pay(&self, length: u8) -> Option<(SymbolId, PayFactor)> {
        self.regular()
            .filter_map(|s| s.line_pay(length).map(|p| (s.id, p)))
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
    }
}

/// A physical reel strip for one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReelStrip {
    /// Column this strip spins on
    pub column: u8,
    /// Symbol ids in strip order
    pub symbols: Vec<SymbolId>,
}

impl ReelStrip {
    pub fn new(column: u8, symbols: Vec<SymbolId>) -> Self {
        Self { column, symbols }
    }

    /// Symbol at `position`, wrapping around the strip
    pub fn symbol_at(&self, position: usize) -> Option<SymbolId> {
        if self.symbols.is_empty() {
            return None;
        }
        Some(self.symbols[position % self.symbols.len()])
    }

    /// Read `rows` consecutive symbols starting at `start`, wrapping
    pub fn window(&self, start: usize, rows: usize) -> Vec<SymbolId> {
        (0..rows)
            .filter_map(|offset| self.symbol_at(start + offset))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
