//! Game configuration: loosely typed document in, validated config out
//!
//! A [`GameConfigDocument`] mirrors the JSON/YAML that the platform's config
//! loader hands over. Unknown fields are rejected at parse time. Validation
//! turns the document into an immutable [`GameConfig`] with every symbol
//! reference resolved and every pay value converted to a [`PayFactor`].

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::grid::Position;
use crate::symbols::{PayFactor, ReelStrip, Symbol, SymbolId, SymbolKind, SymbolTable};

// ═══════════════════════════════════════════════════════════════════════════════
// DOCUMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Raw game config as delivered by the external loader
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameConfigDocument {
    #[serde(default)]
    pub name: Option<String>,
    pub layout: Layout,
    pub symbols: Vec<SymbolDocument>,
    #[serde(default)]
    pub paylines: Vec<Vec<[u8; 2]>>,
    #[serde(default)]
    pub reel_strips: Option<Vec<Vec<SymbolId>>>,
    #[serde(default)]
    pub wild_symbol_id: Option<SymbolId>,
    #[serde(default)]
    pub scatter_symbol_id: Option<SymbolId>,
    #[serde(default)]
    pub min_symbols_to_match: Option<u32>,
    #[serde(default)]
    pub bonus: Option<BonusRulesDocument>,
    #[serde(default)]
    pub cascade: CascadeRules,
    pub bet: BetLimits,
    #[serde(default)]
    pub max_win: Option<f64>,
    #[serde(default)]
    pub wild_line_policy: WildLinePolicy,
    #[serde(default)]
    pub multiplier_mode: MultiplierMode,
}

/// One symbol as declared in the document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymbolDocument {
    pub id: SymbolId,
    #[serde(default)]
    pub name: Option<String>,
    /// Line value per run length
    #[serde(default)]
    pub pays: BTreeMap<u8, f64>,
    /// Cluster value keyed by exact count string
    #[serde(default)]
    pub cluster_payouts: BTreeMap<String, f64>,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Bonus rules as declared in the document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BonusRulesDocument {
    pub trigger_count: u32,
    pub free_spins: u32,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub retrigger: RetriggerPolicy,
    #[serde(default)]
    pub stack_multiplier: bool,
    #[serde(default)]
    pub max_multiplier: Option<f64>,
}

fn default_multiplier() -> f64 {
    1.0
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED SETTINGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Grid dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Layout {
    pub rows: u8,
    pub columns: u8,
}

impl Layout {
    pub fn new(columns: u8, rows: u8) -> Self {
        Self { rows, columns }
    }

    pub fn contains(&self, (column, row): Position) -> bool {
        column < self.columns && row < self.rows
    }

    pub fn total_positions(&self) -> usize {
        self.rows as usize * self.columns as usize
    }
}

/// Allowed stake per spin, in satoshis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BetLimits {
    pub min_sats: u64,
    pub max_sats: u64,
}

impl BetLimits {
    pub fn allows(&self, bet: u64) -> bool {
        bet > 0 && bet >= self.min_sats && bet <= self.max_sats
    }
}

/// Cascade (avalanche) settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CascadeRules {
    #[serde(default)]
    pub enabled: bool,
    /// Maximum evaluation passes per spin
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_max_iterations() -> u32 {
    CascadeRules::DEFAULT_MAX_ITERATIONS
}

impl CascadeRules {
    pub const DEFAULT_MAX_ITERATIONS: u32 = 20;
}

impl Default for CascadeRules {
    fn default() -> Self {
        Self {
            enabled: false,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// What a scatter retrigger during free spins does to the spin count
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetriggerPolicy {
    /// Add the configured free spins to the remaining count
    #[default]
    Additive,
    /// Top the remaining count back up to the configured free spins
    Reset,
    /// Retriggers are ignored
    None,
}

/// How a line made only of wilds is paid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WildLinePolicy {
    /// Use the wild symbol's own line values
    #[default]
    WildSymbolValue,
    /// Pay as the best regular symbol for that run length
    BestPayingSymbol,
    /// All-wild runs never pay
    NoPay,
}

/// When the bonus multiplier is applied to cascade wins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiplierMode {
    /// Once, to the total of every cascade step
    #[default]
    OnTotal,
    /// To each cascade step's subtotal before summing
    PerCascadeStep,
}

/// Validated bonus rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusRules {
    pub trigger_count: u32,
    pub free_spins: u32,
    pub multiplier: PayFactor,
    pub retrigger: RetriggerPolicy,
    pub stack_multiplier: bool,
    pub max_multiplier: Option<PayFactor>,
}

/// A validated payline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payline {
    pub index: usize,
    /// Cells in evaluation order
    pub cells: Vec<Position>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIMITS
// ═══════════════════════════════════════════════════════════════════════════════

/// Size limits applied while validating a document
#[derive(Debug, Clone)]
pub struct ConfigLimits {
    pub max_rows: u8,
    pub max_columns: u8,
    pub max_symbols: usize,
    pub max_paylines: usize,
    pub max_strip_length: usize,
    pub max_cascade_iterations: u32,
}

impl Default for ConfigLimits {
    fn default() -> Self {
        Self {
            max_rows: 10,
            max_columns: 10,
            max_symbols: 64,
            max_paylines: 200,
            max_strip_length: 10_000,
            max_cascade_iterations: 100,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATED CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Immutable, validated game configuration
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub name: String,
    pub layout: Layout,
    pub symbols: SymbolTable,
    pub paylines: Vec<Payline>,
    /// `None` means grids are drawn from symbol weights
    pub reel_strips: Option<Vec<ReelStrip>>,
    pub min_symbols_to_match: Option<u32>,
    pub bonus: Option<BonusRules>,
    pub cascade: CascadeRules,
    pub bet: BetLimits,
    pub max_win: Option<PayFactor>,
    pub wild_line_policy: WildLinePolicy,
    pub multiplier_mode: MultiplierMode,
}

impl GameConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let doc: GameConfigDocument =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::validate(doc)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let doc: GameConfigDocument =
            serde_yml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::validate(doc)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            _ => Self::from_json_str(&text),
        }
    }

    /// Validate with default limits
    pub fn validate(doc: GameConfigDocument) -> ConfigResult<Self> {
        Self::validate_with_limits(doc, &ConfigLimits::default())
    }

    pub fn validate_with_limits(doc: GameConfigDocument, limits: &ConfigLimits) -> ConfigResult<Self> {
        let layout = validate_layout(doc.layout, limits)?;

        if doc.symbols.is_empty() {
            return Err(ConfigError::LimitExceeded("at least one symbol is required".into()));
        }
        if doc.symbols.len() > limits.max_symbols {
            return Err(ConfigError::LimitExceeded(format!(
                "too many symbols: {} > {}",
                doc.symbols.len(),
                limits.max_symbols
            )));
        }

        let declared: HashSet<SymbolId> = doc.symbols.iter().map(|s| s.id).collect();
        let require = |id: SymbolId, context: &str| -> ConfigResult<SymbolId> {
            if declared.contains(&id) {
                Ok(id)
            } else {
                Err(ConfigError::UnknownSymbol {
                    id,
                    context: context.to_string(),
                })
            }
        };

        let wild = doc
            .wild_symbol_id
            .map(|id| require(id, "wild_symbol_id"))
            .transpose()?;
        let scatter = doc
            .scatter_symbol_id
            .map(|id| require(id, "scatter_symbol_id"))
            .transpose()?;
        if let (Some(w), Some(s)) = (wild, scatter) {
            if w == s {
                return Err(ConfigError::WildIsScatter(w));
            }
        }

        let mut seen = HashSet::new();
        let mut symbols = Vec::with_capacity(doc.symbols.len());
        for sym in doc.symbols {
            if !seen.insert(sym.id) {
                return Err(ConfigError::DuplicateSymbol(sym.id));
            }
            let kind = if Some(sym.id) == wild {
                SymbolKind::Wild
            } else if Some(sym.id) == scatter {
                SymbolKind::Scatter
            } else {
                SymbolKind::Regular
            };
            symbols.push(validate_symbol(sym, kind)?);
        }
        let symbols = SymbolTable::new(symbols);

        let paylines = validate_paylines(&doc.paylines, layout, limits)?;

        let reel_strips = match doc.reel_strips {
            Some(strips) => Some(validate_strips(strips, layout, &symbols, limits)?),
            None => {
                if symbols.iter().all(|s| s.weight == 0) {
                    return Err(ConfigError::InvalidWeights(
                        "weighted draw needs at least one positive weight".into(),
                    ));
                }
                None
            }
        };

        if let Some(threshold) = doc.min_symbols_to_match {
            if threshold == 0 || threshold as usize > layout.total_positions() {
                return Err(ConfigError::InvalidLayout(format!(
                    "min_symbols_to_match {threshold} must be within 1..={}",
                    layout.total_positions()
                )));
            }
        }
        if paylines.is_empty() && doc.min_symbols_to_match.is_none() {
            return Err(ConfigError::NoWinMechanism);
        }

        let bonus = doc
            .bonus
            .map(|b| validate_bonus(b, scatter.is_some()))
            .transpose()?;

        if doc.cascade.max_iterations == 0 || doc.cascade.max_iterations > limits.max_cascade_iterations {
            return Err(ConfigError::InvalidCascadeRules(format!(
                "max_iterations {} must be within 1..={}",
                doc.cascade.max_iterations, limits.max_cascade_iterations
            )));
        }

        let bet = doc.bet;
        if bet.min_sats == 0 || bet.min_sats > bet.max_sats {
            return Err(ConfigError::InvalidBetLimits(format!(
                "min {} max {}: need 0 < min <= max",
                bet.min_sats, bet.max_sats
            )));
        }

        let max_win = match doc.max_win {
            Some(v) => {
                let factor = PayFactor::from_f64(v)
                    .filter(|f| !f.is_zero())
                    .ok_or_else(|| ConfigError::InvalidMaxWin(format!("{v} is not a positive multiple")))?;
                Some(factor)
            }
            None => None,
        };

        let name = doc.name.unwrap_or_else(|| "unnamed".to_string());
        if reel_strips.is_none() {
            log::warn!(
                "game '{}' has no reel strips: grids use the weighted per-cell fallback",
                name
            );
        }

        Ok(Self {
            name,
            layout,
            symbols,
            paylines,
            reel_strips,
            min_symbols_to_match: doc.min_symbols_to_match,
            bonus,
            cascade: doc.cascade,
            bet,
            max_win,
            wild_line_policy: doc.wild_line_policy,
            multiplier_mode: doc.multiplier_mode,
        })
    }

    /// Whether grids come from physical reel strips
    pub fn uses_reel_strips(&self) -> bool {
        self.reel_strips.is_some()
    }

    /// Largest win allowed for `bet`, if capped
    pub fn win_cap(&self, bet: u64) -> Option<u64> {
        self.max_win.map(|f| f.apply(bet))
    }
}

fn validate_layout(layout: Layout, limits: &ConfigLimits) -> ConfigResult<Layout> {
    if layout.rows == 0 || layout.columns == 0 {
        return Err(ConfigError::InvalidLayout(format!(
            "{}x{} grid has no cells",
            layout.columns, layout.rows
        )));
    }
    if layout.rows > limits.max_rows || layout.columns > limits.max_columns {
        return Err(ConfigError::InvalidLayout(format!(
            "{}x{} exceeds {}x{}",
            layout.columns, layout.rows, limits.max_columns, limits.max_rows
        )));
    }
    Ok(layout)
}

fn validate_symbol(doc: SymbolDocument, kind: SymbolKind) -> ConfigResult<Symbol> {
    let id = doc.id;
    let factor = |value: f64, what: String| -> ConfigResult<PayFactor> {
        PayFactor::from_f64(value).ok_or_else(|| ConfigError::InvalidPayValue {
            symbol: id,
            detail: format!("{what} = {value}"),
        })
    };

    let mut pays = BTreeMap::new();
    for (length, value) in doc.pays {
        if length == 0 {
            return Err(ConfigError::InvalidPayValue {
                symbol: id,
                detail: "run length 0".into(),
            });
        }
        pays.insert(length, factor(value, format!("pays[{length}]"))?);
    }

    let mut cluster_payouts = BTreeMap::new();
    for (key, value) in doc.cluster_payouts {
        let count = parse_count_key(&key).ok_or_else(|| ConfigError::InvalidClusterKey {
            symbol: id,
            key: key.clone(),
        })?;
        cluster_payouts.insert(count, factor(value, format!("cluster_payouts[{key}]"))?);
    }

    Ok(Symbol {
        id,
        name: doc.name.unwrap_or_else(|| format!("S{id}")),
        kind,
        pays,
        cluster_payouts,
        weight: doc.weight,
    })
}

/// Cluster keys are exact, canonical decimal counts ("5", never "05" or "5.0")
fn parse_count_key(key: &str) -> Option<u32> {
    let count: u32 = key.parse().ok()?;
    (count > 0 && count.to_string() == key).then_some(count)
}

fn validate_paylines(
    lines: &[Vec<[u8; 2]>],
    layout: Layout,
    limits: &ConfigLimits,
) -> ConfigResult<Vec<Payline>> {
    if lines.len() > limits.max_paylines {
        return Err(ConfigError::LimitExceeded(format!(
            "too many paylines: {} > {}",
            lines.len(),
            limits.max_paylines
        )));
    }
    lines
        .iter()
        .enumerate()
        .map(|(index, cells)| {
            if cells.is_empty() {
                return Err(ConfigError::EmptyPayline { line: index });
            }
            let cells = cells
                .iter()
                .map(|&[column, row]| {
                    if layout.contains((column, row)) {
                        Ok((column, row))
                    } else {
                        Err(ConfigError::PaylineOutOfBounds {
                            line: index,
                            column,
                            row,
                        })
                    }
                })
                .collect::<ConfigResult<Vec<_>>>()?;
            Ok(Payline { index, cells })
        })
        .collect()
}

fn validate_strips(
    strips: Vec<Vec<SymbolId>>,
    layout: Layout,
    symbols: &SymbolTable,
    limits: &ConfigLimits,
) -> ConfigResult<Vec<ReelStrip>> {
    if strips.len() != layout.columns as usize {
        return Err(ConfigError::ReelStripCount {
            expected: layout.columns as usize,
            found: strips.len(),
        });
    }
    strips
        .into_iter()
        .enumerate()
        .map(|(column, strip)| {
            if strip.is_empty() {
                return Err(ConfigError::EmptyReelStrip { column });
            }
            if strip.len() > limits.max_strip_length {
                return Err(ConfigError::LimitExceeded(format!(
                    "reel strip {column} has {} symbols > {}",
                    strip.len(),
                    limits.max_strip_length
                )));
            }
            if let Some(&id) = strip.iter().find(|&&id| !symbols.contains(id)) {
                return Err(ConfigError::UnknownSymbol {
                    id,
                    context: format!("reel strip {column}"),
                });
            }
            Ok(ReelStrip::new(column as u8, strip))
        })
        .collect()
}

fn validate_bonus(doc: BonusRulesDocument, has_scatter: bool) -> ConfigResult<BonusRules> {
    if !has_scatter {
        return Err(ConfigError::InvalidBonusRules(
            "bonus rules need a scatter_symbol_id".into(),
        ));
    }
    if doc.trigger_count == 0 {
        return Err(ConfigError::InvalidBonusRules("trigger_count must be positive".into()));
    }
    if doc.free_spins == 0 {
        return Err(ConfigError::InvalidBonusRules("free_spins must be positive".into()));
    }
    let multiplier = PayFactor::from_f64(doc.multiplier)
        .filter(|m| *m >= PayFactor::ONE)
        .ok_or_else(|| {
            ConfigError::InvalidBonusRules(format!("multiplier {} must be >= 1.0", doc.multiplier))
        })?;
    let max_multiplier = match doc.max_multiplier {
        Some(v) => Some(
            PayFactor::from_f64(v)
                .filter(|m| *m >= multiplier)
                .ok_or_else(|| {
                    ConfigError::InvalidBonusRules(format!(
                        "max_multiplier {v} must be >= multiplier {}",
                        doc.multiplier
                    ))
                })?,
        ),
        None => None,
    };
    Ok(BonusRules {
        trigger_count: doc.trigger_count,
        free_spins: doc.free_spins,
        multiplier,
        retrigger: doc.retrigger,
        stack_multiplier: doc.stack_multiplier,
        max_multiplier,
    })
}
