use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::types::{CorrelationId, Direction, LimitOrderRequest, OrderId, PositionId};

/// Risk budget as configured
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBudget {
    /// Percentage of account equity (5 => 5%)
    Percentage(Decimal),
    /// Fixed amount in account currency
    Amount(Decimal),
}

impl RiskBudget {
    /// Absolute amount at risk given the current equity, `None` on overflow
    pub fn resolve(&self, equity: Decimal) -> Option<Decimal> {
        match self {
            RiskBudget::Percentage(pct) => (*pct / Decimal::ONE_HUNDRED).checked_mul(equity),
            RiskBudget::Amount(amount) => Some(*amount),
        }
    }
}

impl Default for RiskBudget {
    fn default() -> Self {
        RiskBudget::Percentage(Decimal::from(5))
    }
}

/// One configured trailing step, both values expressed as fractions of the move
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingRule {
    /// Trigger = entry + move * trigger_fraction
    pub trigger_fraction: Decimal,
    /// New stop = entry + move * stop_fraction (0 => breakeven)
    pub stop_fraction: Decimal,
}

impl TrailingRule {
    pub fn new(trigger_fraction: Decimal, stop_fraction: Decimal) -> Self {
        Self {
            trigger_fraction,
            stop_fraction,
        }
    }
}

/// Absolute trailing step derived from a [`TrailingRule`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingLevel {
    pub trigger_price: Decimal,
    pub new_stop_price: Decimal,
}

/// How the "moved too fast" guard measures elapsed time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionDelayPolicy {
    /// Time from the profit-target touch to the before-entry touch
    #[default]
    SinceProfitTarget,
    /// Never abort for speed
    Disabled,
}

/// Immutable parameters of one trade, computed and validated once at start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub correlation_id: CorrelationId,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub stop_loss_price: Decimal,
    /// Absolute currency amount at risk
    pub risk_budget: Decimal,
    /// entry - stop, positive for LONG, negative for SHORT
    pub price_move: Decimal,
    pub before_entry_price: Decimal,
    pub take_profit_price: Decimal,
    pub trailing_levels: Vec<TrailingLevel>,
    pub position_size: Decimal,
    pub expiration_deadline: Option<DateTime<Utc>>,
    pub min_reaction_delay_minutes: i64,
    pub reaction_delay_policy: ReactionDelayPolicy,
    pub max_open_trades: u32,
    pub created_at: DateTime<Utc>,
}

impl TradePlan {
    /// Saturates instead of panicking on absurdly large values
    pub fn min_reaction_delay(&self) -> Duration {
        Duration::try_minutes(self.min_reaction_delay_minutes).unwrap_or(Duration::MAX)
    }

    /// True once `now` is strictly past the deadline
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_deadline
            .map(|deadline| now > deadline)
            .unwrap_or(false)
    }

    /// The limit order this plan stages when the before-entry price is touched
    pub fn limit_order(&self) -> LimitOrderRequest {
        LimitOrderRequest {
            correlation_id: self.correlation_id,
            symbol: self.symbol.clone(),
            direction: self.direction,
            size: self.position_size,
            limit_price: self.entry_price,
            stop_price: self.stop_loss_price,
            target_price: self.take_profit_price,
        }
    }
}

impl std::fmt::Display for TradePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} @ {} (stop {}, target {}, before-entry {}, size {})",
            self.correlation_id,
            self.direction,
            self.symbol,
            self.entry_price,
            self.stop_loss_price,
            self.take_profit_price,
            self.before_entry_price,
            self.position_size
        )
    }
}

/// Lifecycle phase of a plan
///
/// Variant order is the only allowed direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    AwaitingProfitTarget,
    AwaitingBeforeEntry,
    PendingOrderPlaced,
    PositionActive,
    Closed,
    Aborted,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Closed | Phase::Aborted)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::AwaitingProfitTarget => write!(f, "AWAITING_PROFIT_TARGET"),
            Phase::AwaitingBeforeEntry => write!(f, "AWAITING_BEFORE_ENTRY"),
            Phase::PendingOrderPlaced => write!(f, "PENDING_ORDER_PLACED"),
            Phase::PositionActive => write!(f, "POSITION_ACTIVE"),
            Phase::Closed => write!(f, "CLOSED"),
            Phase::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Why a plan ended without (or by giving up) a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AbortReason {
    /// Too many positions/orders already open on the account
    MaxOpenTradesReached { open: u32, max: u32 },
    /// Price moved from profit target to before-entry faster than allowed
    ReactionTooFast { elapsed_minutes: i64, required_minutes: i64 },
    /// Price returned to the profit target before the order filled
    EarlyReaction,
    /// Expiration deadline passed with no position open
    Expired,
    /// Bot was stopped by the user
    UserStopped,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::MaxOpenTradesReached { open, max } => {
                write!(f, "max allowed trades already open ({open}/{max})")
            }
            AbortReason::ReactionTooFast {
                elapsed_minutes,
                required_minutes,
            } => write!(
                f,
                "movement to level too fast ({elapsed_minutes} < {required_minutes} minutes)"
            ),
            AbortReason::EarlyReaction => {
                write!(f, "price reached profit target again before fill")
            }
            AbortReason::Expired => write!(f, "trade expired"),
            AbortReason::UserStopped => write!(f, "stopped by user"),
        }
    }
}

/// Why a plan that held a position finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CloseReason {
    /// Gateway reported the position closed
    PositionClosed { exit_price: Decimal, realized_pnl: Decimal },
    /// Last trailing level applied, stop sits at breakeven or better
    TrailingComplete,
}

/// How a plan ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanOutcome {
    Aborted(AbortReason),
    Closed(CloseReason),
}

/// Live position owned by a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePosition {
    pub position_id: PositionId,
    pub entry_price: Decimal,
}

/// Mutable progress of one plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeState {
    pub(crate) phase: Phase,
    pub(crate) reached_profit_target_at: Option<DateTime<Utc>>,
    pub(crate) reached_before_entry_at: Option<DateTime<Utc>>,
    pub(crate) pending_order_id: Option<OrderId>,
    pub(crate) position: Option<ActivePosition>,
    pub(crate) trailing_index: Option<usize>,
    pub(crate) current_stop_price: Decimal,
    pub(crate) outcome: Option<PlanOutcome>,
}

impl TradeState {
    pub fn new(plan: &TradePlan) -> Self {
        Self {
            phase: Phase::AwaitingProfitTarget,
            reached_profit_target_at: None,
            reached_before_entry_at: None,
            pending_order_id: None,
            position: None,
            trailing_index: None,
            current_stop_price: plan.stop_loss_price,
            outcome: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn reached_profit_target_at(&self) -> Option<DateTime<Utc>> {
        self.reached_profit_target_at
    }

    pub fn reached_before_entry_at(&self) -> Option<DateTime<Utc>> {
        self.reached_before_entry_at
    }

    pub fn pending_order_id(&self) -> Option<&OrderId> {
        self.pending_order_id.as_ref()
    }

    pub fn position(&self) -> Option<&ActivePosition> {
        self.position.as_ref()
    }

    /// Index of the highest trailing level already applied
    pub fn trailing_index(&self) -> Option<usize> {
        self.trailing_index
    }

    pub fn current_stop_price(&self) -> Decimal {
        self.current_stop_price
    }

    pub fn outcome(&self) -> Option<&PlanOutcome> {
        self.outcome.as_ref()
    }
}

/// Inputs for one evaluation step besides the bar itself
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepContext {
    pub now: DateTime<Utc>,
    /// Open positions plus pending orders on the account
    pub open_trade_count: u32,
}

/// Single action emitted by the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    PlaceLimitOrder(LimitOrderRequest),
    CancelOrder {
        order_id: OrderId,
        reason: AbortReason,
    },
    ModifyStopLoss {
        position_id: PositionId,
        new_stop_price: Decimal,
        level_index: usize,
    },
    ClosePosition {
        position_id: PositionId,
    },
    /// Plan ended without anything to tell the gateway
    StopTrading(AbortReason),
}

impl Action {
    /// Returns true if executing this action requires a gateway call
    pub fn needs_gateway(&self) -> bool {
        !matches!(self, Action::StopTrading(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_risk_budget_resolution() {
        assert_eq!(RiskBudget::Percentage(dec!(5)).resolve(dec!(2000)), Some(dec!(100)));
        assert_eq!(RiskBudget::Amount(dec!(10)).resolve(dec!(2000)), Some(dec!(10)));
        assert_eq!(RiskBudget::Percentage(dec!(500)).resolve(Decimal::MAX), None);
    }

    #[test]
    fn test_phase_order_is_lifecycle_order() {
        assert!(Phase::AwaitingProfitTarget < Phase::AwaitingBeforeEntry);
        assert!(Phase::AwaitingBeforeEntry < Phase::PendingOrderPlaced);
        assert!(Phase::PendingOrderPlaced < Phase::PositionActive);
        assert!(Phase::PositionActive < Phase::Closed);
        assert!(Phase::Closed.is_terminal() && Phase::Aborted.is_terminal());
        assert!(!Phase::PositionActive.is_terminal());
    }

    #[test]
    fn test_stop_trading_needs_no_gateway() {
        assert!(!Action::StopTrading(AbortReason::Expired).needs_gateway());
        assert!(Action::ClosePosition {
            position_id: PositionId::new("p1")
        }
        .needs_gateway());
    }
}
