//! LevelTrader Library
//!
//! A staged price-level trade activation and trailing-stop engine: waits for
//! price to reach a profit target, pull back to a before-entry level, stages a
//! limit order at the entry price and then ratchets the stop through fixed
//! protective levels.

pub mod bot;
pub mod common;
pub mod config;
pub mod engine;

// Re-export commonly used types
pub use common::errors::{EngineError, GatewayError, GatewayResult, Result};
pub use common::traits::{Clock, ManualClock, MarketDataSource, OrderGateway, SystemClock};
pub use common::types::{
    Bar, BotEvent, CorrelationId, Direction, InstrumentSpec, LimitOrderRequest, OrderId,
    PositionClosed, PositionEvent, PositionId, PositionOpened, Tick, Timeframe,
};
pub use config::types::AppConfig;

// Engine types
pub use engine::{
    AbortReason, Action, LevelCalculator, Phase, PlanBuilder, PlanRegistry, PlanSnapshot,
    RiskSizer, TradeMachine, TradePlan, TradeState, TrailingStopManager, Violation,
};

// Host runtime
pub use bot::{BotReport, LevelTrader, PaperGateway, StateStore};
