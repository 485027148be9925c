//! Unified types shared by the engine, the gateways and the event feed

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a trade plan, fixed for the lifetime of the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for LONG, -1 for SHORT
    ///
    /// Multiplying a price difference by the sign turns every "reached in the
    /// direction of profit" comparison into a single `>= 0` test.
    pub fn sign(self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
        }
    }

    /// Direction implied by a signed entry-to-stop move, `None` when the move is zero
    pub fn from_move(price_move: Decimal) -> Option<Self> {
        if price_move > Decimal::ZERO {
            Some(Direction::Long)
        } else if price_move < Decimal::ZERO {
            Some(Direction::Short)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Bar timeframe requested from a market data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    #[default]
    Minute,
    Hour,
    Day,
}

/// OHLC price bar for a single instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Bar open time
    pub timestamp: DateTime<Utc>,
}

impl Bar {
    pub fn new(
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            open,
            high,
            low,
            close,
            timestamp,
        }
    }

    /// Extreme of the bar in the direction of profit (high for LONG, low for SHORT)
    pub fn favorable_extreme(&self, direction: Direction) -> Decimal {
        match direction {
            Direction::Long => self.high,
            Direction::Short => self.low,
        }
    }

    /// Extreme of the bar against the direction of profit (low for LONG, high for SHORT)
    pub fn adverse_extreme(&self, direction: Direction) -> Decimal {
        match direction {
            Direction::Long => self.low,
            Direction::Short => self.high,
        }
    }

    /// True when the bar traded at or beyond `level` in the direction of profit
    ///
    /// LONG: `high >= level`. SHORT: `low <= level`.
    pub fn extends_to(&self, level: Decimal, direction: Direction) -> bool {
        (self.favorable_extreme(direction) - level) * direction.sign() >= Decimal::ZERO
    }

    /// True when the bar pulled back to `level` from the profit side
    ///
    /// LONG: `low <= level`. SHORT: `high >= level`.
    pub fn retraces_to(&self, level: Decimal, direction: Direction) -> bool {
        (level - self.adverse_extreme(direction)) * direction.sign() >= Decimal::ZERO
    }
}

/// A single trade print
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl From<&Tick> for Bar {
    fn from(tick: &Tick) -> Self {
        Bar::new(tick.price, tick.price, tick.price, tick.price, tick.timestamp)
    }
}

/// Opaque token stamped on every order and position a plan creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a tag received from the gateway, `None` if it is not one of ours
    pub fn parse(tag: &str) -> Option<Self> {
        Uuid::parse_str(tag.trim()).ok().map(Self)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Gateway-assigned pending order identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Gateway-assigned position identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub String);

impl PositionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for PositionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tradable properties of an instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Minimum price increment counted as one pip
    pub pip_size: Decimal,
    /// Account-currency value of one pip per unit of volume
    pub pip_value: Decimal,
    /// Volume must be a multiple of this step
    pub volume_step: Decimal,
    /// Minimum tradable volume
    pub min_volume: Decimal,
    /// Maximum tradable volume
    pub max_volume: Decimal,
    /// Leverage of the first margin tier
    pub leverage: Decimal,
}

/// Limit order staged by a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderRequest {
    pub correlation_id: CorrelationId,
    pub symbol: String,
    pub direction: Direction,
    pub size: Decimal,
    pub limit_price: Decimal,
    pub stop_price: Decimal,
    pub target_price: Decimal,
}

/// Gateway notification that a pending order became a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionOpened {
    pub position_id: PositionId,
    /// Free-form tag copied from the originating order
    pub correlation_tag: String,
    pub entry_price: Decimal,
}

/// Gateway notification that a position was closed (stop, target or manual)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionClosed {
    pub position_id: PositionId,
    pub correlation_tag: String,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
}

/// Position lifecycle notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PositionEvent {
    Opened(PositionOpened),
    Closed(PositionClosed),
}

impl PositionEvent {
    /// Tag the event carries
    pub fn correlation_tag(&self) -> &str {
        match self {
            PositionEvent::Opened(opened) => &opened.correlation_tag,
            PositionEvent::Closed(closed) => &closed.correlation_tag,
        }
    }
}

/// Every input the bot reacts to, in one total order
#[derive(Debug, Clone, PartialEq)]
pub enum BotEvent {
    /// A completed price bar
    Bar(Bar),
    /// A single trade print
    Tick(Tick),
    /// Position lifecycle notification from the gateway
    Position(PositionEvent),
    /// User asked the bot to stop
    Shutdown,
}

impl From<PositionEvent> for BotEvent {
    fn from(event: PositionEvent) -> Self {
        BotEvent::Position(event)
    }
}
