//! Trade state machine
//!
//! One machine owns one plan. It is pure: every method takes the inputs it
//! needs (a bar, the time, the account's open trade count) and returns the
//! action the host should execute. Transitions that depend on a gateway call
//! are committed only through the `confirm_*` methods, so a rejected call
//! leaves the phase untouched and the same bar condition fires again next time.

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::common::types::{Bar, CorrelationId, OrderId, PositionClosed, PositionOpened};
use crate::engine::trailing::TrailingStopManager;
use crate::engine::types::{
    AbortReason, Action, ActivePosition, CloseReason, Phase, PlanOutcome, ReactionDelayPolicy,
    StepContext, TradePlan, TradeState,
};

#[derive(Debug, Clone)]
pub struct TradeMachine {
    plan: TradePlan,
    state: TradeState,
}

impl TradeMachine {
    pub fn new(plan: TradePlan) -> Self {
        let state = TradeState::new(&plan);
        Self { plan, state }
    }

    /// Resume a machine from a persisted snapshot
    pub fn restore(plan: TradePlan, state: TradeState) -> Self {
        Self { plan, state }
    }

    pub fn plan(&self) -> &TradePlan {
        &self.plan
    }

    pub fn state(&self) -> &TradeState {
        &self.state
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.plan.correlation_id
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.state.phase.is_terminal()
    }

    /// Evaluate one bar
    ///
    /// Checks run in a fixed order (expiration, early reaction, progression,
    /// trailing) and the first one producing an action wins the bar.
    pub fn on_bar(&mut self, bar: &Bar, ctx: &StepContext) -> Option<Action> {
        if self.is_terminal() {
            return None;
        }

        let action = self
            .check_expiration(ctx)
            .or_else(|| self.check_early_reaction(bar))
            .or_else(|| self.progress(bar, ctx))
            .or_else(|| self.check_trailing(bar));

        debug!(
            correlation_id = %self.plan.correlation_id,
            phase = %self.state.phase,
            high = %bar.high,
            low = %bar.low,
            reached_profit_target_at = ?self.state.reached_profit_target_at,
            reached_before_entry_at = ?self.state.reached_before_entry_at,
            trailing_index = ?self.state.trailing_index,
            action = ?action,
            "Finished bar step"
        );

        action
    }

    fn check_expiration(&mut self, ctx: &StepContext) -> Option<Action> {
        if self.state.phase >= Phase::PositionActive || !self.plan.has_expired(ctx.now) {
            return None;
        }

        if let Some(order_id) = self.state.pending_order_id.clone() {
            info!(correlation_id = %self.plan.correlation_id, "Time of trade expired, cancelling pending order");
            return Some(Action::CancelOrder {
                order_id,
                reason: AbortReason::Expired,
            });
        }

        self.abort(AbortReason::Expired);
        Some(Action::StopTrading(AbortReason::Expired))
    }

    fn check_early_reaction(&mut self, bar: &Bar) -> Option<Action> {
        if self.state.phase != Phase::PendingOrderPlaced
            || !bar.extends_to(self.plan.take_profit_price, self.plan.direction)
        {
            return None;
        }

        info!(
            correlation_id = %self.plan.correlation_id,
            "Price reached profit target after before-entry price, cancelling pending order"
        );
        let order_id = self.state.pending_order_id.clone()?;
        Some(Action::CancelOrder {
            order_id,
            reason: AbortReason::EarlyReaction,
        })
    }

    fn progress(&mut self, bar: &Bar, ctx: &StepContext) -> Option<Action> {
        let direction = self.plan.direction;

        if self.state.phase == Phase::AwaitingProfitTarget
            && bar.retraces_to(self.plan.take_profit_price, direction)
        {
            info!(correlation_id = %self.plan.correlation_id, "Price reached profit target price");
            self.state.reached_profit_target_at = Some(ctx.now);
            self.advance(Phase::AwaitingBeforeEntry);
        }

        if self.state.phase != Phase::AwaitingBeforeEntry
            || !bar.retraces_to(self.plan.before_entry_price, direction)
        {
            return None;
        }

        let touched_at = *self.state.reached_before_entry_at.get_or_insert(ctx.now);
        info!(correlation_id = %self.plan.correlation_id, "Price reached before-entry price");

        if ctx.open_trade_count >= self.plan.max_open_trades {
            let reason = AbortReason::MaxOpenTradesReached {
                open: ctx.open_trade_count,
                max: self.plan.max_open_trades,
            };
            self.abort(reason.clone());
            return Some(Action::StopTrading(reason));
        }

        if self.plan.reaction_delay_policy == ReactionDelayPolicy::SinceProfitTarget {
            // Arming always precedes this point, so the timestamp is set.
            let armed_at = self.state.reached_profit_target_at.unwrap_or(touched_at);
            let elapsed = touched_at - armed_at;
            if elapsed < self.plan.min_reaction_delay() {
                let reason = AbortReason::ReactionTooFast {
                    elapsed_minutes: elapsed.num_minutes(),
                    required_minutes: self.plan.min_reaction_delay_minutes,
                };
                self.abort(reason.clone());
                return Some(Action::StopTrading(reason));
            }
        }

        info!(correlation_id = %self.plan.correlation_id, "Placing limit order");
        Some(Action::PlaceLimitOrder(self.plan.limit_order()))
    }

    fn check_trailing(&self, bar: &Bar) -> Option<Action> {
        if self.state.phase != Phase::PositionActive {
            return None;
        }

        let manager = self.trailing();
        let index = manager.evaluate(bar)?;
        let level = manager.level(index)?;
        let position = self.state.position.as_ref()?;

        info!(
            correlation_id = %self.plan.correlation_id,
            level = index + 1,
            trigger = %level.trigger_price,
            new_stop = %level.new_stop_price,
            "Price reached trailing stop level"
        );

        Some(Action::ModifyStopLoss {
            position_id: position.position_id.clone(),
            new_stop_price: level.new_stop_price,
            level_index: index,
        })
    }

    fn trailing(&self) -> TrailingStopManager<'_> {
        TrailingStopManager::new(
            &self.plan.trailing_levels,
            self.plan.direction,
            self.state.trailing_index,
        )
    }

    /// The gateway accepted the limit order
    pub fn confirm_order_placed(&mut self, order_id: OrderId) -> bool {
        if self.state.phase != Phase::AwaitingBeforeEntry {
            warn!(
                correlation_id = %self.plan.correlation_id,
                phase = %self.state.phase,
                %order_id,
                "Order placement confirmed in unexpected phase"
            );
            return false;
        }
        info!(correlation_id = %self.plan.correlation_id, %order_id, "Pending order placed");
        self.state.pending_order_id = Some(order_id);
        self.advance(Phase::PendingOrderPlaced)
    }

    /// The gateway cancelled the pending order (or it no longer exists)
    pub fn confirm_order_cancelled(&mut self, reason: AbortReason) -> bool {
        if self.state.phase != Phase::PendingOrderPlaced {
            return false;
        }
        self.state.pending_order_id = None;
        self.abort(reason);
        true
    }

    /// The gateway moved the stop to trailing level `level_index`
    pub fn confirm_stop_modified(&mut self, level_index: usize) -> bool {
        if self.state.phase != Phase::PositionActive {
            return false;
        }

        let mut manager = TrailingStopManager::new(
            &self.plan.trailing_levels,
            self.plan.direction,
            self.state.trailing_index,
        );
        if !manager.commit(level_index) {
            warn!(
                correlation_id = %self.plan.correlation_id,
                level_index,
                applied = ?manager.applied(),
                "Refusing to move trailing index backwards"
            );
            return false;
        }

        self.state.trailing_index = manager.applied();
        self.state.current_stop_price = manager.current_stop(self.plan.stop_loss_price);
        info!(
            correlation_id = %self.plan.correlation_id,
            stop = %self.state.current_stop_price,
            "Stop loss moved"
        );

        let complete = manager.is_complete();
        if complete {
            info!(correlation_id = %self.plan.correlation_id, "Last trailing level applied, plan finished");
            self.close(CloseReason::TrailingComplete);
        }
        true
    }

    /// Pending order became a position
    pub fn on_position_opened(&mut self, event: &PositionOpened) -> bool {
        if self.state.phase != Phase::PendingOrderPlaced {
            warn!(
                correlation_id = %self.plan.correlation_id,
                phase = %self.state.phase,
                position_id = %event.position_id,
                "Ignoring position opened in unexpected phase"
            );
            return false;
        }

        info!(
            correlation_id = %self.plan.correlation_id,
            position_id = %event.position_id,
            entry_price = %event.entry_price,
            "Pending order was converted to position"
        );
        self.state.pending_order_id = None;
        self.state.position = Some(ActivePosition {
            position_id: event.position_id.clone(),
            entry_price: event.entry_price,
        });
        self.advance(Phase::PositionActive)
    }

    /// Position closed by stop, target or an external close
    pub fn on_position_closed(&mut self, event: &PositionClosed) -> bool {
        let owns_position = match (&self.state.phase, &self.state.position) {
            (Phase::PositionActive, Some(position)) => position.position_id == event.position_id,
            // fill and close reported back to back
            (Phase::PendingOrderPlaced, None) => true,
            _ => false,
        };
        if !owns_position {
            warn!(
                correlation_id = %self.plan.correlation_id,
                phase = %self.state.phase,
                position_id = %event.position_id,
                "Ignoring position closed that this plan does not hold"
            );
            return false;
        }

        let result = if event.realized_pnl >= Decimal::ZERO {
            "profit"
        } else {
            "loss"
        };
        info!(
            correlation_id = %self.plan.correlation_id,
            position_id = %event.position_id,
            exit_price = %event.exit_price,
            realized_pnl = %event.realized_pnl,
            "Position closed with {}",
            result
        );
        self.state.pending_order_id = None;
        self.close(CloseReason::PositionClosed {
            exit_price: event.exit_price,
            realized_pnl: event.realized_pnl,
        });
        true
    }

    /// User stop: terminal immediately, returns best-effort cleanup actions
    pub fn stop(&mut self, close_position: bool) -> Vec<Action> {
        if self.is_terminal() {
            return Vec::new();
        }

        let mut cleanup = Vec::new();
        if let Some(order_id) = self.state.pending_order_id.take() {
            cleanup.push(Action::CancelOrder {
                order_id,
                reason: AbortReason::UserStopped,
            });
        }
        if close_position {
            if let Some(position) = &self.state.position {
                cleanup.push(Action::ClosePosition {
                    position_id: position.position_id.clone(),
                });
            }
        }

        self.abort(AbortReason::UserStopped);
        cleanup
    }

    fn abort(&mut self, reason: AbortReason) {
        info!(correlation_id = %self.plan.correlation_id, %reason, "Plan aborted");
        if self.advance(Phase::Aborted) {
            self.state.outcome = Some(PlanOutcome::Aborted(reason));
        }
    }

    fn close(&mut self, reason: CloseReason) {
        if self.advance(Phase::Closed) {
            self.state.outcome = Some(PlanOutcome::Closed(reason));
        }
    }

    /// Move forward to `next`; never backwards and never out of a terminal phase
    fn advance(&mut self, next: Phase) -> bool {
        let current = self.state.phase;
        if current.is_terminal() || next <= current {
            warn!(
                correlation_id = %self.plan.correlation_id,
                from = %current,
                to = %next,
                "Refusing phase transition"
            );
            return false;
        }
        debug!(correlation_id = %self.plan.correlation_id, from = %current, to = %next, "Phase transition");
        self.state.phase = next;
        true
    }
}
