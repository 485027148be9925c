//! Error types for the application

use thiserror::Error;

use crate::engine::validator::Violation;

/// Result type alias using our EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type alias for collaborator calls
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Main error type for the engine and the bot
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed or out-of-range configuration, fatal at startup
    #[error("Input validation failed: {}", join_violations(.0))]
    InputValidation(Vec<Violation>),

    /// Size out of tradable bounds or insufficient margin, fatal at startup
    #[error("Computed value validation failed: {}", join_violations(.0))]
    ComputedValue(Vec<Violation>),

    /// Order, modify or cancel rejected; the plan stays in its current phase
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Lifecycle event referencing a correlation id no plan owns
    #[error("Stale correlation id: {0}")]
    StaleCorrelation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// State file could not be read or written
    #[error("State persistence error: {0}")]
    Persistence(String),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Channel send errors
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Violations carried by a validation failure
    pub fn violations(&self) -> &[Violation] {
        match self {
            EngineError::InputValidation(v) | EngineError::ComputedValue(v) => v,
            _ => &[],
        }
    }

    /// True for errors that prevent the bot from starting
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::InputValidation(_)
                | EngineError::ComputedValue(_)
                | EngineError::Configuration(_)
        )
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Persistence(err.to_string())
    }
}

/// Failure reported by an order gateway or market data source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The platform refused the request
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Order or position does not exist (anymore)
    #[error("not found: {0}")]
    NotFound(String),

    /// Platform could not be reached
    #[error("unavailable: {0}")]
    Unavailable(String),
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validation_error_lists_every_violation() {
        let err = EngineError::InputValidation(vec![
            Violation::NonPositiveEntryPrice(dec!(0)),
            Violation::RiskRewardBelowOne(dec!(0.5)),
        ]);
        let message = err.to_string();
        assert!(message.contains("EntryPrice"));
        assert!(message.contains("RiskRewardRatio"));
        assert_eq!(err.violations().len(), 2);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_gateway_error_is_not_fatal() {
        let err = EngineError::from(GatewayError::Rejected("no liquidity".into()));
        assert!(!err.is_fatal());
        assert!(err.violations().is_empty());
    }
}
