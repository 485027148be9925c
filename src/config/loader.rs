//! Configuration loader

use config::{Config, Environment, File, FileFormat};
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{EngineError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with APP_, nested with `__`)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("APP")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| EngineError::Configuration(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| EngineError::Configuration(e.to_string()))
}

/// Load configuration from an in-memory TOML document
pub fn load_from_toml_str(toml: &str) -> Result<AppConfig> {
    Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()
        .and_then(|config| config.try_deserialize())
        .map_err(|e| EngineError::Configuration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Direction;
    use crate::engine::types::{ReactionDelayPolicy, RiskBudget};
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"
        [plan]
        entry_price = 100
        stop_loss_price = 90
        direction = "LONG"
        risk_reward_ratio = 2
        risk = { amount = 50 }
        min_reaction_delay_minutes = 30
        reaction_delay_policy = "disabled"
        expiration_date = "2030/01/15"

        [plan.trailing]
        enabled = true
        levels = [
            { trigger_fraction = 0.5, stop_fraction = 0 },
        ]

        [instrument]
        symbol = "XAUUSD"
        pip_size = 0.01
        pip_value = 0.01
        volume_step = 1
        min_volume = 1
        max_volume = 1000
        leverage = 20
    "#;

    #[test]
    fn test_load_from_toml() {
        let config = load_from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.plan.entry_price, dec!(100));
        assert_eq!(config.plan.direction, Direction::Long);
        assert_eq!(config.plan.risk, RiskBudget::Amount(dec!(50)));
        assert_eq!(config.plan.reaction_delay_policy, ReactionDelayPolicy::Disabled);
        assert_eq!(config.plan.trailing.levels.len(), 1);
        assert_eq!(config.plan.expiration_date.as_deref(), Some("2030/01/15"));
        assert_eq!(config.instrument.symbol, "XAUUSD");
        assert_eq!(config.instrument.spec.leverage, dec!(20));
        assert_eq!(config.settings.log_level, "info");
    }

    #[test]
    fn test_missing_plan_is_configuration_error() {
        let result = load_from_toml_str("[settings]\nlog_level = \"debug\"\n");
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }
}
