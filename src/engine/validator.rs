//! Startup validation
//!
//! Both passes accumulate every problem they find so the operator can fix the
//! whole configuration in one go.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::common::types::{Direction, InstrumentSpec};
use crate::config::PlanConfig;
use crate::engine::sizer::{RiskSizer, SizingError};
use crate::engine::types::RiskBudget;

/// A single configuration or computed-value problem
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Violation {
    #[error("EntryPrice must be greater than 0. [EntryPrice: {0}]")]
    NonPositiveEntryPrice(Decimal),

    #[error("StopLossPrice must be greater than 0. [StopLossPrice: {0}]")]
    NonPositiveStopLossPrice(Decimal),

    #[error("EntryPrice must be on the profit side of StopLossPrice for {direction} direction. [EntryPrice: {entry}, StopLossPrice: {stop}]")]
    DirectionMismatch {
        direction: Direction,
        entry: Decimal,
        stop: Decimal,
    },

    #[error("RiskRewardRatio must be greater or equal 1. [RiskRewardRatio: {0}]")]
    RiskRewardBelowOne(Decimal),

    #[error("RiskPercentage must be greater than 0. [RiskPercentage: {0}]")]
    NonPositiveRiskPercentage(Decimal),

    #[error("RiskAmount must be greater than 0. [RiskAmount: {0}]")]
    NonPositiveRiskAmount(Decimal),

    #[error("MinReactionDelayMinutes must not be negative. [MinReactionDelayMinutes: {0}]")]
    NegativeReactionDelay(i64),

    #[error("MaxOpenTrades must be greater than 0. [MaxOpenTrades: {0}]")]
    NonPositiveMaxOpenTrades(i64),

    #[error("ExpirationDate must contain a valid date in format YYYY/MM/DD example 2000/01/01. [ExpirationDate: {0}]")]
    InvalidExpirationDate(String),

    #[error("BeforeEntryFraction must be between 0.0 and 1.0 (exclusive). [BeforeEntryFraction: {0}]")]
    BeforeEntryFractionOutOfRange(Decimal),

    #[error("Trailing level {index} trigger must be between 0 and RiskRewardRatio. [TriggerFraction: {trigger}, RiskRewardRatio: {ratio}]")]
    TrailingTriggerOutOfRange {
        index: usize,
        trigger: Decimal,
        ratio: Decimal,
    },

    #[error("Trailing level {index} trigger must be greater than the previous one. [TriggerFraction: {trigger}, Previous: {previous}]")]
    TrailingTriggersNotIncreasing {
        index: usize,
        trigger: Decimal,
        previous: Decimal,
    },

    #[error("Trailing level {index} stop must be between -1.0 and its trigger. [StopFraction: {stop}, TriggerFraction: {trigger}]")]
    TrailingStopOutOfRange {
        index: usize,
        stop: Decimal,
        trigger: Decimal,
    },

    #[error("Trailing level {index} stop must not loosen the previous one. [StopFraction: {stop}, Previous: {previous}]")]
    TrailingStopsLoosening {
        index: usize,
        stop: Decimal,
        previous: Decimal,
    },

    #[error("Last trailing level must move the stop to breakeven or better. [StopFraction: {0}]")]
    TrailingFinalStopBelowBreakeven(Decimal),

    #[error("Instrument {field} is invalid. [{field}: {value}]")]
    InvalidInstrument { field: &'static str, value: Decimal },

    #[error("Computed {0} is out of the representable price range")]
    ValueOutOfRange(&'static str),

    #[error("{0}")]
    Size(#[from] SizingError),

    #[error("Expected margin is greater than account balance. [ExpectedMargin: {margin}, AccountBalance: {balance}]")]
    MarginExceedsBalance { margin: Decimal, balance: Decimal },
}

/// Pass (a): raw parameters, before anything is derived from them
pub fn validate_inputs(plan: &PlanConfig, instrument: &InstrumentSpec) -> Vec<Violation> {
    let mut violations = Vec::new();

    if plan.entry_price <= Decimal::ZERO {
        violations.push(Violation::NonPositiveEntryPrice(plan.entry_price));
    }
    if plan.stop_loss_price <= Decimal::ZERO {
        violations.push(Violation::NonPositiveStopLossPrice(plan.stop_loss_price));
    }
    let price_move = plan.entry_price.checked_sub(plan.stop_loss_price);
    if price_move.and_then(Direction::from_move) != Some(plan.direction) {
        violations.push(Violation::DirectionMismatch {
            direction: plan.direction,
            entry: plan.entry_price,
            stop: plan.stop_loss_price,
        });
    }
    if plan.risk_reward_ratio < Decimal::ONE {
        violations.push(Violation::RiskRewardBelowOne(plan.risk_reward_ratio));
    }
    match plan.risk {
        RiskBudget::Percentage(pct) if pct <= Decimal::ZERO => {
            violations.push(Violation::NonPositiveRiskPercentage(pct));
        }
        RiskBudget::Amount(amount) if amount <= Decimal::ZERO => {
            violations.push(Violation::NonPositiveRiskAmount(amount));
        }
        _ => {}
    }
    if plan.min_reaction_delay_minutes < 0 {
        violations.push(Violation::NegativeReactionDelay(plan.min_reaction_delay_minutes));
    }
    if plan.max_open_trades <= 0 || plan.max_open_trades > i64::from(u32::MAX) {
        violations.push(Violation::NonPositiveMaxOpenTrades(plan.max_open_trades));
    }
    if let Some(raw) = &plan.expiration_date {
        if parse_expiration_date(raw).is_none() {
            violations.push(Violation::InvalidExpirationDate(raw.clone()));
        }
    }
    if plan.before_entry_fraction <= Decimal::ZERO || plan.before_entry_fraction >= Decimal::ONE {
        violations.push(Violation::BeforeEntryFractionOutOfRange(plan.before_entry_fraction));
    }

    check_trailing(plan, &mut violations);
    check_instrument(instrument, &mut violations);

    violations
}

fn check_trailing(plan: &PlanConfig, violations: &mut Vec<Violation>) {
    let rules = plan.trailing_rules();

    for (index, rule) in rules.iter().enumerate() {
        if rule.trigger_fraction <= Decimal::ZERO || rule.trigger_fraction >= plan.risk_reward_ratio {
            violations.push(Violation::TrailingTriggerOutOfRange {
                index,
                trigger: rule.trigger_fraction,
                ratio: plan.risk_reward_ratio,
            });
        }
        if rule.stop_fraction <= Decimal::NEGATIVE_ONE || rule.stop_fraction >= rule.trigger_fraction {
            violations.push(Violation::TrailingStopOutOfRange {
                index,
                stop: rule.stop_fraction,
                trigger: rule.trigger_fraction,
            });
        }
        if let Some(previous) = index.checked_sub(1).map(|i| rules[i]) {
            if rule.trigger_fraction <= previous.trigger_fraction {
                violations.push(Violation::TrailingTriggersNotIncreasing {
                    index,
                    trigger: rule.trigger_fraction,
                    previous: previous.trigger_fraction,
                });
            }
            if rule.stop_fraction < previous.stop_fraction {
                violations.push(Violation::TrailingStopsLoosening {
                    index,
                    stop: rule.stop_fraction,
                    previous: previous.stop_fraction,
                });
            }
        }
    }

    if let Some(last) = rules.last() {
        if last.stop_fraction < Decimal::ZERO {
            violations.push(Violation::TrailingFinalStopBelowBreakeven(last.stop_fraction));
        }
    }
}

fn check_instrument(spec: &InstrumentSpec, violations: &mut Vec<Violation>) {
    for (field, value) in [
        ("PipSize", spec.pip_size),
        ("PipValue", spec.pip_value),
        ("VolumeStep", spec.volume_step),
        ("Leverage", spec.leverage),
    ] {
        if value <= Decimal::ZERO {
            violations.push(Violation::InvalidInstrument { field, value });
        }
    }
    if spec.min_volume < Decimal::ZERO {
        violations.push(Violation::InvalidInstrument {
            field: "MinVolume",
            value: spec.min_volume,
        });
    }
    if spec.max_volume < spec.min_volume {
        violations.push(Violation::InvalidInstrument {
            field: "MaxVolume",
            value: spec.max_volume,
        });
    }
}

/// Pass (b): the sizer's verdict plus the margin check
///
/// `sized` is what [`RiskSizer::size`] returned; the margin check only runs
/// when a size could be computed.
pub fn validate_computed(
    sized: Result<Decimal, SizingError>,
    sizer: &RiskSizer,
    entry_price: Decimal,
    balance: Decimal,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    let size = match sized {
        Ok(size) => size,
        Err(err) => {
            violations.push(err.into());
            return violations;
        }
    };

    let margin = match sizer.expected_margin(size, entry_price) {
        Ok(margin) => margin,
        Err(err) => {
            violations.push(err.into());
            return violations;
        }
    };
    if margin > balance {
        violations.push(Violation::MarginExceedsBalance { margin, balance });
    }

    violations
}

/// Parse a strict `YYYY/MM/DD` date into midnight UTC of that day
pub fn parse_expiration_date(raw: &str) -> Option<DateTime<Utc>> {
    let bytes = raw.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'/' || bytes[7] != b'/' {
        return None;
    }
    let date = NaiveDate::parse_from_str(raw, "%Y/%m/%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sizer::SizeRounding;
    use crate::engine::types::TrailingRule;
    use rust_decimal_macros::dec;

    fn instrument() -> InstrumentSpec {
        InstrumentSpec {
            pip_size: dec!(1),
            pip_value: dec!(1),
            volume_step: dec!(0.01),
            min_volume: dec!(0.01),
            max_volume: dec!(100),
            leverage: dec!(10),
        }
    }

    fn long_plan() -> PlanConfig {
        PlanConfig::new(dec!(100), dec!(90), Direction::Long)
    }

    #[test]
    fn test_valid_plan_has_no_violations() {
        assert!(validate_inputs(&long_plan(), &instrument()).is_empty());

        let short = PlanConfig::new(dec!(100), dec!(110), Direction::Short);
        assert!(validate_inputs(&short, &instrument()).is_empty());
    }

    #[test]
    fn test_violations_accumulate() {
        let mut plan = PlanConfig::new(dec!(0), dec!(-5), Direction::Long);
        plan.risk_reward_ratio = dec!(0.5);
        plan.min_reaction_delay_minutes = -1;
        plan.expiration_date = Some("2024-01-01".into());

        let violations = validate_inputs(&plan, &instrument());

        assert!(violations.contains(&Violation::NonPositiveEntryPrice(dec!(0))));
        assert!(violations.contains(&Violation::NonPositiveStopLossPrice(dec!(-5))));
        assert!(violations.contains(&Violation::RiskRewardBelowOne(dec!(0.5))));
        assert!(violations.contains(&Violation::NegativeReactionDelay(-1)));
        assert!(violations.contains(&Violation::InvalidExpirationDate("2024-01-01".into())));
        assert!(violations.len() >= 5);
    }

    #[test]
    fn test_direction_mismatch_includes_equal_prices() {
        for (entry, stop, direction) in [
            (dec!(90), dec!(100), Direction::Long),
            (dec!(110), dec!(100), Direction::Short),
            (dec!(100), dec!(100), Direction::Long),
            (dec!(100), dec!(100), Direction::Short),
        ] {
            let violations = validate_inputs(&PlanConfig::new(entry, stop, direction), &instrument());
            assert!(
                violations
                    .iter()
                    .any(|v| matches!(v, Violation::DirectionMismatch { .. })),
                "{direction} {entry}/{stop} should be rejected"
            );
        }
    }

    #[test]
    fn test_zero_delay_is_allowed() {
        let mut plan = long_plan();
        plan.min_reaction_delay_minutes = 0;
        assert!(validate_inputs(&plan, &instrument()).is_empty());
    }

    #[test]
    fn test_risk_budget_must_be_positive() {
        let mut plan = long_plan();
        plan.risk = RiskBudget::Amount(dec!(0));
        assert_eq!(
            validate_inputs(&plan, &instrument()),
            vec![Violation::NonPositiveRiskAmount(dec!(0))]
        );

        plan.risk = RiskBudget::Percentage(dec!(-1));
        assert_eq!(
            validate_inputs(&plan, &instrument()),
            vec![Violation::NonPositiveRiskPercentage(dec!(-1))]
        );
    }

    #[test]
    fn test_max_open_trades_must_be_positive() {
        let mut plan = long_plan();
        plan.max_open_trades = 0;
        assert_eq!(
            validate_inputs(&plan, &instrument()),
            vec![Violation::NonPositiveMaxOpenTrades(0)]
        );
    }

    #[test]
    fn test_before_entry_fraction_bounds() {
        for fraction in [dec!(0), dec!(1), dec!(1.2), dec!(-0.1)] {
            let mut plan = long_plan();
            plan.before_entry_fraction = fraction;
            assert_eq!(
                validate_inputs(&plan, &instrument()),
                vec![Violation::BeforeEntryFractionOutOfRange(fraction)]
            );
        }
    }

    #[test]
    fn test_trailing_rules_are_checked() {
        let mut plan = long_plan();
        plan.trailing.levels = vec![
            TrailingRule::new(dec!(0.7), dec!(0)),
            TrailingRule::new(dec!(0.5), dec!(-0.8)),
        ];
        let violations = validate_inputs(&plan, &instrument());
        assert!(violations
            .iter()
            .any(|v| matches!(v, Violation::TrailingTriggersNotIncreasing { index: 1, .. })));
        assert!(violations
            .iter()
            .any(|v| matches!(v, Violation::TrailingStopsLoosening { index: 1, .. })));
        assert!(violations
            .iter()
            .any(|v| matches!(v, Violation::TrailingFinalStopBelowBreakeven(_))));
    }

    #[test]
    fn test_trailing_trigger_beyond_target_is_rejected() {
        let mut plan = long_plan();
        plan.trailing.levels = vec![TrailingRule::new(dec!(1.5), dec!(0))];
        let violations = validate_inputs(&plan, &instrument());
        assert!(matches!(
            violations.as_slice(),
            [Violation::TrailingTriggerOutOfRange { index: 0, .. }]
        ));
    }

    #[test]
    fn test_disabled_trailing_skips_rule_checks() {
        let mut plan = long_plan();
        plan.trailing.enabled = false;
        plan.trailing.levels = vec![TrailingRule::new(dec!(-1), dec!(-2))];
        assert!(validate_inputs(&plan, &instrument()).is_empty());
    }

    #[test]
    fn test_instrument_sanity() {
        let mut spec = instrument();
        spec.pip_size = dec!(0);
        spec.max_volume = dec!(0.001);
        let violations = validate_inputs(&long_plan(), &spec);
        assert!(violations.contains(&Violation::InvalidInstrument {
            field: "PipSize",
            value: dec!(0)
        }));
        assert!(violations.contains(&Violation::InvalidInstrument {
            field: "MaxVolume",
            value: dec!(0.001)
        }));
    }

    #[test]
    fn test_computed_pass_reports_size_and_margin() {
        let mut spec = instrument();
        spec.max_volume = dec!(1.5);
        let sizer = RiskSizer::new(spec, SizeRounding::Floor);

        let violations = validate_computed(sizer.size(dec!(100), dec!(50)), &sizer, dec!(100), dec!(1000));
        assert_eq!(
            violations,
            vec![Violation::Size(SizingError::SizeAboveMaximum {
                size: dec!(2),
                max: dec!(1.5)
            })]
        );

        // 1.0 * 100 / 10 = 10 > 5
        let violations = validate_computed(Ok(dec!(1.0)), &sizer, dec!(100), dec!(5));
        assert_eq!(
            violations,
            vec![Violation::MarginExceedsBalance {
                margin: dec!(10),
                balance: dec!(5)
            }]
        );

        assert!(validate_computed(Ok(dec!(1.0)), &sizer, dec!(100), dec!(10)).is_empty());
    }

    #[test]
    fn test_parse_expiration_date() {
        let deadline = parse_expiration_date("2024/03/15").unwrap();
        assert_eq!(deadline, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());

        for bad in ["2024/3/15", "2024-03-15", "15/03/2024", "2024/02/30", "", "2024/03/15 "] {
            assert_eq!(parse_expiration_date(bad), None, "{bad:?} should not parse");
        }
    }
}
