//! Trait definitions for the collaborators the engine is injected with

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use super::errors::GatewayResult;
use super::types::{Bar, LimitOrderRequest, OrderId, PositionId, PositionOpened, Timeframe};

/// Trait for order/position gateways (a broker API, the paper gateway, ...)
///
/// Every failure is reported as a `GatewayError`; implementations must never
/// panic on a rejected request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Stage a limit order, returning the platform's order id
    async fn place_limit_order(&self, request: &LimitOrderRequest) -> GatewayResult<OrderId>;

    /// Cancel a pending order; `NotFound` if it already filled or vanished
    async fn cancel_order(&self, order_id: &OrderId) -> GatewayResult<()>;

    /// Move the protective stop of an open position
    async fn modify_stop_loss(&self, position_id: &PositionId, new_stop: Decimal)
        -> GatewayResult<()>;

    /// Close an open position at market
    async fn close_position(&self, position_id: &PositionId) -> GatewayResult<()>;

    /// Open position whose order carried `correlation_tag`, if any
    async fn find_position(&self, correlation_tag: &str) -> GatewayResult<Option<PositionOpened>>;

    /// Current account equity
    async fn account_equity(&self) -> GatewayResult<Decimal>;

    /// Current account balance (used for the margin check)
    async fn account_balance(&self) -> GatewayResult<Decimal>;

    /// Open positions plus pending orders across the whole account
    async fn open_trade_count(&self) -> GatewayResult<u32>;
}

/// Trait for market data sources
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Most recent completed bar for an instrument
    async fn latest_bar(&self, symbol: &str, timeframe: Timeframe) -> GatewayResult<Bar>;
}

/// Source of "now", injectable for deterministic tests and replays
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
///
/// Clones share the same time, so a replay driver can keep one handle and
/// hand another to the bot.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    /// Move forward by a duration
    pub fn advance(&self, by: chrono::Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}
