use rust_decimal::Decimal;

use crate::common::types::Direction;
use crate::engine::types::{TrailingLevel, TrailingRule};

/// Inputs of the level calculation
#[derive(Debug, Clone)]
pub struct LevelInputs<'a> {
    pub entry_price: Decimal,
    pub stop_loss_price: Decimal,
    pub direction: Direction,
    pub risk_reward_ratio: Decimal,
    pub before_entry_fraction: Decimal,
    pub trailing_rules: &'a [TrailingRule],
}

/// Absolute price levels derived from entry and stop
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLevels {
    /// entry - stop (signed)
    pub price_move: Decimal,
    pub before_entry_price: Decimal,
    pub take_profit_price: Decimal,
    pub trailing_levels: Vec<TrailingLevel>,
}

/// Derives every absolute price level of a plan
///
/// All outputs are `entry + move * fraction`, so the sign of `move` carries the
/// direction and no per-direction branch is needed. A zero move never gets
/// here: the validator rejects `entry == stop` first.
///
/// Returns `None` when a level does not fit in a `Decimal`.
pub struct LevelCalculator;

impl LevelCalculator {
    pub fn compute(inputs: &LevelInputs<'_>) -> Option<PriceLevels> {
        let price_move = inputs.entry_price.checked_sub(inputs.stop_loss_price)?;
        debug_assert_eq!(Direction::from_move(price_move), Some(inputs.direction));

        let at = |fraction: Decimal| {
            price_move
                .checked_mul(fraction)
                .and_then(|offset| inputs.entry_price.checked_add(offset))
        };

        let trailing_levels = inputs
            .trailing_rules
            .iter()
            .map(|rule| {
                Some(TrailingLevel {
                    trigger_price: at(rule.trigger_fraction)?,
                    new_stop_price: at(rule.stop_fraction)?,
                })
            })
            .collect::<Option<Vec<_>>>()?;

        Some(PriceLevels {
            price_move,
            before_entry_price: at(inputs.before_entry_fraction)?,
            take_profit_price: at(inputs.risk_reward_ratio)?,
            trailing_levels,
        })
    }
}
