//! Common test utilities and fixtures

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use level_trader::common::types::{Bar, Direction, InstrumentSpec, PositionId, PositionOpened};
use level_trader::config::{
    AppConfig, AppSettings, InstrumentConfig, PaperAccountConfig, PlanConfig,
};
use level_trader::engine::{AccountSnapshot, PlanBuilder, RiskBudget, StepContext, TradeMachine};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const SYMBOL: &str = "US500";

/// One pip per point, one unit of currency per pip and unit of volume
pub fn sample_instrument() -> InstrumentSpec {
    InstrumentSpec {
        pip_size: dec!(1),
        pip_value: dec!(1),
        volume_step: dec!(0.01),
        min_volume: dec!(0.01),
        max_volume: dec!(100),
        leverage: dec!(100),
    }
}

/// LONG 100 / 90 with ratio 1
///
/// Levels: before-entry 103.3, target 110, trailing 105 -> 92 and 107 -> 100.
/// Risking 20 over 10 pips sizes the position at 2.
pub fn long_plan_config() -> PlanConfig {
    let mut plan = PlanConfig::new(dec!(100), dec!(90), Direction::Long);
    plan.risk_reward_ratio = dec!(1);
    plan.risk = RiskBudget::Amount(dec!(20));
    plan
}

/// SHORT 100 / 110, the mirror image of [`long_plan_config`]
///
/// Levels: before-entry 96.7, target 90, trailing 95 -> 108 and 93 -> 100.
pub fn short_plan_config() -> PlanConfig {
    let mut plan = PlanConfig::new(dec!(100), dec!(110), Direction::Short);
    plan.risk_reward_ratio = dec!(1);
    plan.risk = RiskBudget::Amount(dec!(20));
    plan
}

pub fn sample_app_config(plan: PlanConfig) -> AppConfig {
    AppConfig {
        plan,
        instrument: InstrumentConfig {
            symbol: SYMBOL.to_string(),
            spec: sample_instrument(),
        },
        paper: PaperAccountConfig {
            equity: dec!(1000),
            balance: dec!(1000),
        },
        settings: AppSettings::default(),
    }
}

/// 2024-03-04 at the given time, UTC
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, hour, minute, 0).unwrap()
}

pub fn bar(high: Decimal, low: Decimal, timestamp: DateTime<Utc>) -> Bar {
    Bar::new(low, high, low, high, timestamp)
}

pub fn ctx(now: DateTime<Utc>) -> StepContext {
    StepContext {
        now,
        open_trade_count: 0,
    }
}

pub fn build_machine(config: &PlanConfig) -> TradeMachine {
    let plan = PlanBuilder::new(config, SYMBOL, &sample_instrument())
        .build(
            AccountSnapshot {
                equity: dec!(1000),
                balance: dec!(1000),
            },
            at(8, 0),
        )
        .expect("fixture plan should validate");
    TradeMachine::new(plan)
}

pub fn opened_for(machine: &TradeMachine, position_id: &str) -> PositionOpened {
    PositionOpened {
        position_id: PositionId::new(position_id),
        correlation_tag: machine.correlation_id().to_string(),
        entry_price: machine.plan().entry_price,
    }
}

/// Sample feed lines for replay tests
pub mod feed_lines {
    pub const ARM: &str =
        r#"{"type":"bar","open":"109","high":"111","low":"109","close":"110","timestamp":"2024-03-04T09:00:00Z"}"#;
    pub const PULLBACK: &str =
        r#"{"type":"bar","open":"105","high":"106","low":"103","close":"104","timestamp":"2024-03-04T10:30:00Z"}"#;
    pub const FILL: &str =
        r#"{"type":"bar","open":"101","high":"102","low":"99.5","close":"101","timestamp":"2024-03-04T10:45:00Z"}"#;
    pub const RALLY: &str =
        r#"{"type":"tick","price":"105.5","timestamp":"2024-03-04T11:00:00Z"}"#;
    pub const SHUTDOWN: &str = r#"{"type":"shutdown"}"#;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_levels() {
        let machine = build_machine(&long_plan_config());
        let plan = machine.plan();
        assert_eq!(plan.before_entry_price, dec!(103.3));
        assert_eq!(plan.take_profit_price, dec!(110));
        assert_eq!(plan.position_size, dec!(2));
    }
}
