//! Configuration types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::common::types::{Direction, InstrumentSpec, Timeframe};
use crate::engine::sizer::SizeRounding;
use crate::engine::types::{ReactionDelayPolicy, RiskBudget, TrailingRule};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// The trade to run
    pub plan: PlanConfig,
    /// Instrument the plan trades
    pub instrument: InstrumentConfig,
    /// Starting account of the paper gateway
    #[serde(default)]
    pub paper: PaperAccountConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

/// User-defined trade parameters
///
/// Signed integers are kept signed so a negative value is reported by the
/// validator instead of failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    pub entry_price: Decimal,
    pub stop_loss_price: Decimal,
    pub direction: Direction,
    #[serde(default = "default_risk_reward_ratio")]
    pub risk_reward_ratio: Decimal,
    #[serde(default)]
    pub risk: RiskBudget,
    #[serde(default = "default_before_entry_fraction")]
    pub before_entry_fraction: Decimal,
    #[serde(default)]
    pub trailing: TrailingConfig,
    #[serde(default = "default_min_reaction_delay")]
    pub min_reaction_delay_minutes: i64,
    #[serde(default)]
    pub reaction_delay_policy: ReactionDelayPolicy,
    #[serde(default)]
    pub size_rounding: SizeRounding,
    #[serde(default = "default_max_open_trades")]
    pub max_open_trades: i64,
    /// Optional expiration in `YYYY/MM/DD` format
    #[serde(default)]
    pub expiration_date: Option<String>,
}

impl PlanConfig {
    /// Plan with every optional field at its default
    pub fn new(entry_price: Decimal, stop_loss_price: Decimal, direction: Direction) -> Self {
        Self {
            entry_price,
            stop_loss_price,
            direction,
            risk_reward_ratio: default_risk_reward_ratio(),
            risk: RiskBudget::default(),
            before_entry_fraction: default_before_entry_fraction(),
            trailing: TrailingConfig::default(),
            min_reaction_delay_minutes: default_min_reaction_delay(),
            reaction_delay_policy: ReactionDelayPolicy::default(),
            size_rounding: SizeRounding::default(),
            max_open_trades: default_max_open_trades(),
            expiration_date: None,
        }
    }

    /// Trailing rules in effect (empty when trailing is disabled)
    pub fn trailing_rules(&self) -> &[TrailingRule] {
        if self.trailing.enabled {
            &self.trailing.levels
        } else {
            &[]
        }
    }
}

fn default_risk_reward_ratio() -> Decimal {
    dec!(1.5)
}

fn default_before_entry_fraction() -> Decimal {
    dec!(0.33)
}

fn default_min_reaction_delay() -> i64 {
    60
}

fn default_max_open_trades() -> i64 {
    1
}

/// Trailing stop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingConfig {
    #[serde(default = "default_trailing_enabled")]
    pub enabled: bool,
    #[serde(default = "default_trailing_levels")]
    pub levels: Vec<TrailingRule>,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            enabled: default_trailing_enabled(),
            levels: default_trailing_levels(),
        }
    }
}

fn default_trailing_enabled() -> bool {
    true
}

fn default_trailing_levels() -> Vec<TrailingRule> {
    vec![
        TrailingRule::new(dec!(0.5), dec!(-0.8)),
        TrailingRule::new(dec!(0.7), dec!(0.0)),
    ]
}

/// Instrument configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Symbol name used for orders and market data
    pub symbol: String,
    #[serde(flatten)]
    pub spec: InstrumentSpec,
}

/// Paper account configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperAccountConfig {
    #[serde(default = "default_paper_funds")]
    pub equity: Decimal,
    #[serde(default = "default_paper_funds")]
    pub balance: Decimal,
}

impl Default for PaperAccountConfig {
    fn default() -> Self {
        Self {
            equity: default_paper_funds(),
            balance: default_paper_funds(),
        }
    }
}

fn default_paper_funds() -> Decimal {
    dec!(10000)
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Bar timeframe the plan is evaluated on
    #[serde(default)]
    pub timeframe: Timeframe,
    /// Where to persist plan state between restarts (disabled when unset)
    #[serde(default)]
    pub state_file: Option<String>,
    /// Close an open position when the bot is stopped
    #[serde(default)]
    pub close_position_on_stop: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            timeframe: Timeframe::default(),
            state_file: None,
            close_position_on_stop: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
