//! Turns a user configuration into a validated, immutable trade plan

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::common::errors::{EngineError, Result};
use crate::common::types::{CorrelationId, InstrumentSpec};
use crate::config::PlanConfig;
use crate::engine::levels::{LevelCalculator, LevelInputs};
use crate::engine::sizer::RiskSizer;
use crate::engine::types::TradePlan;
use crate::engine::validator::{
    parse_expiration_date, validate_computed, validate_inputs, Violation,
};

/// Account figures the builder needs at startup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountSnapshot {
    pub equity: Decimal,
    pub balance: Decimal,
}

pub struct PlanBuilder<'a> {
    config: &'a PlanConfig,
    symbol: &'a str,
    instrument: &'a InstrumentSpec,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(config: &'a PlanConfig, symbol: &'a str, instrument: &'a InstrumentSpec) -> Self {
        Self {
            config,
            symbol,
            instrument,
        }
    }

    /// Validate, derive every level, size the position and mint a correlation id
    ///
    /// Fails with `InputValidation` before anything is computed, or with
    /// `ComputedValue` once sizing or the margin check rejects the result.
    pub fn build(&self, account: AccountSnapshot, now: DateTime<Utc>) -> Result<TradePlan> {
        let config = self.config;

        info!("Validate of user defined properties");
        let violations = validate_inputs(config, self.instrument);
        if !violations.is_empty() {
            for violation in &violations {
                warn!("{}", violation);
            }
            return Err(EngineError::InputValidation(violations));
        }

        let risk_budget = config
            .risk
            .resolve(account.equity)
            .ok_or_else(|| out_of_range("risk per trade"))?;
        let levels = LevelCalculator::compute(&LevelInputs {
            entry_price: config.entry_price,
            stop_loss_price: config.stop_loss_price,
            direction: config.direction,
            risk_reward_ratio: config.risk_reward_ratio,
            before_entry_fraction: config.before_entry_fraction,
            trailing_rules: config.trailing_rules(),
        })
        .ok_or_else(|| out_of_range("price level"))?;

        let sizer = RiskSizer::new(self.instrument.clone(), config.size_rounding);
        let raw_size = sizer.raw_size(risk_budget, levels.price_move);
        let sized = sizer.size(risk_budget, levels.price_move);

        info!(
            risk_per_trade = %risk_budget,
            stop_loss_pips = ?sizer.stop_distance_in_pips(levels.price_move),
            raw_size = ?raw_size,
            size = ?sized,
            "Computed position size"
        );

        info!("Validate of computed properties");
        let violations = validate_computed(sized.clone(), &sizer, config.entry_price, account.balance);
        let position_size = match (violations.is_empty(), sized) {
            (true, Ok(size)) => size,
            _ => {
                for violation in &violations {
                    warn!("{}", violation);
                }
                return Err(EngineError::ComputedValue(violations));
            }
        };

        let expiration_deadline = config
            .expiration_date
            .as_deref()
            .and_then(parse_expiration_date);

        // Pass (a) already bounded this to 1..=u32::MAX
        let max_open_trades = u32::try_from(config.max_open_trades)
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        Ok(TradePlan {
            correlation_id: CorrelationId::new(),
            symbol: self.symbol.to_string(),
            direction: config.direction,
            entry_price: config.entry_price,
            stop_loss_price: config.stop_loss_price,
            risk_budget,
            price_move: levels.price_move,
            before_entry_price: levels.before_entry_price,
            take_profit_price: levels.take_profit_price,
            trailing_levels: levels.trailing_levels,
            position_size,
            expiration_deadline,
            min_reaction_delay_minutes: config.min_reaction_delay_minutes,
            reaction_delay_policy: config.reaction_delay_policy,
            max_open_trades,
            created_at: now,
        })
    }
}

fn out_of_range(what: &'static str) -> EngineError {
    let violation = Violation::ValueOutOfRange(what);
    warn!("{}", violation);
    EngineError::ComputedValue(vec![violation])
}

/// Log every computed property of a plan, one line each
pub fn log_plan(plan: &TradePlan) {
    info!("Computed properties");
    info!("CorrelationId: {}", plan.correlation_id);
    info!("Direction: {} {}", plan.direction, plan.symbol);
    info!("Move: {}", plan.price_move);
    info!("Take profit price: {}", plan.take_profit_price);
    info!("Risk per trade: {}", plan.risk_budget);
    info!("Position size: {}", plan.position_size);
    info!("Before-entry price: {}", plan.before_entry_price);
    for (i, level) in plan.trailing_levels.iter().enumerate() {
        info!(
            "Trailing level {}: trigger {} -> stop {}",
            i + 1,
            level.trigger_price,
            level.new_stop_price
        );
    }
    match plan.expiration_deadline {
        Some(deadline) => info!("Expiration: {}", deadline),
        None => info!("Expiration: none"),
    }
}
