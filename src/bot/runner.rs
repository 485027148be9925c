//! Host runtime: drives the trade machines through an order gateway

use tracing::{debug, error, info, instrument, warn};

use crate::bot::store::StateStore;
use crate::common::errors::{EngineError, GatewayError, Result};
use crate::common::traits::{Clock, MarketDataSource, OrderGateway};
use crate::common::types::{
    Bar, BotEvent, PositionClosed, PositionEvent, PositionOpened, Tick, Timeframe,
};
use crate::config::AppConfig;
use crate::engine::machine::TradeMachine;
use crate::engine::plan::{log_plan, AccountSnapshot, PlanBuilder};
use crate::engine::registry::PlanRegistry;
use crate::engine::types::{Action, Phase, StepContext};

/// What one event caused
#[derive(Debug, Default)]
pub struct BotReport {
    /// Actions whose gateway call succeeded (or needed none)
    pub executed: Vec<Action>,
    /// Non-fatal failures; the affected plans stay in their current phase
    pub errors: Vec<EngineError>,
}

impl BotReport {
    fn merge(&mut self, other: BotReport) {
        self.executed.extend(other.executed);
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.executed.is_empty() && self.errors.is_empty()
    }
}

/// The level trading bot
///
/// Events are handled one at a time to completion, so the machines never see
/// overlapping evaluations.
pub struct LevelTrader<G: OrderGateway, C: Clock> {
    gateway: G,
    clock: C,
    plans: PlanRegistry,
    symbol: String,
    timeframe: Timeframe,
    close_position_on_stop: bool,
    store: Option<StateStore>,
}

impl<G: OrderGateway, C: Clock> LevelTrader<G, C> {
    /// Resume persisted plans or build a fresh one from the configuration
    ///
    /// Fails when the configuration or the computed plan does not validate, or
    /// when the account cannot be queried.
    #[instrument(skip_all, fields(symbol = %config.instrument.symbol))]
    pub async fn start(config: &AppConfig, gateway: G, clock: C) -> Result<Self> {
        info!("Start LevelTrader");
        info!(
            entry_price = %config.plan.entry_price,
            stop_loss_price = %config.plan.stop_loss_price,
            direction = %config.plan.direction,
            risk_reward_ratio = %config.plan.risk_reward_ratio,
            risk = ?config.plan.risk,
            min_reaction_delay_minutes = config.plan.min_reaction_delay_minutes,
            max_open_trades = config.plan.max_open_trades,
            expiration_date = ?config.plan.expiration_date,
            trailing_enabled = config.plan.trailing.enabled,
            "User defined properties"
        );

        let store = config.settings.state_file.as_ref().map(StateStore::new);
        let mut plans = PlanRegistry::new();

        if let Some(store) = &store {
            if let Some(snapshots) = store.load().await? {
                for snapshot in snapshots {
                    if snapshot.state.phase().is_terminal() {
                        debug!(correlation_id = %snapshot.plan.correlation_id, "Skipping finished plan");
                        continue;
                    }
                    info!(
                        correlation_id = %snapshot.plan.correlation_id,
                        phase = %snapshot.state.phase(),
                        "Resuming plan from state file"
                    );
                    plans.insert(snapshot.into());
                }
            }
        }

        if plans.is_empty() {
            let account = AccountSnapshot {
                equity: gateway.account_equity().await?,
                balance: gateway.account_balance().await?,
            };
            let plan = PlanBuilder::new(
                &config.plan,
                &config.instrument.symbol,
                &config.instrument.spec,
            )
            .build(account, clock.now())?;
            log_plan(&plan);
            plans.insert(TradeMachine::new(plan));
        }

        let trader = Self {
            gateway,
            clock,
            plans,
            symbol: config.instrument.symbol.clone(),
            timeframe: config.settings.timeframe,
            close_position_on_stop: config.settings.close_position_on_stop,
            store,
        };
        trader.persist().await;
        info!("Register listeners");
        Ok(trader)
    }

    pub fn plans(&self) -> &PlanRegistry {
        &self.plans
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// True once every plan reached a terminal phase
    pub fn is_finished(&self) -> bool {
        self.plans.all_terminal()
    }

    /// Route one event and persist the resulting state
    pub async fn handle_event(&mut self, event: BotEvent) -> BotReport {
        let report = match event {
            BotEvent::Bar(bar) => self.on_bar(&bar).await,
            BotEvent::Tick(tick) => self.on_tick(&tick).await,
            BotEvent::Position(PositionEvent::Opened(opened)) => {
                Self::lifecycle_report(self.on_position_opened(&opened))
            }
            BotEvent::Position(PositionEvent::Closed(closed)) => {
                Self::lifecycle_report(self.on_position_closed(&closed))
            }
            BotEvent::Shutdown => self.shutdown().await,
        };
        self.persist().await;
        report
    }

    fn lifecycle_report(result: Result<()>) -> BotReport {
        let mut report = BotReport::default();
        if let Err(e) = result {
            report.errors.push(e);
        }
        report
    }

    /// Evaluate every running plan against one bar
    #[instrument(skip_all, fields(timestamp = %bar.timestamp))]
    pub async fn on_bar(&mut self, bar: &Bar) -> BotReport {
        let mut report = BotReport::default();
        info!("Start onBar step");

        let open_trade_count = if self.needs_open_trade_count() {
            match self.gateway.open_trade_count().await {
                Ok(count) => count,
                Err(e) => {
                    // Without the count the before-entry check cannot run safely.
                    error!("Failed to query open trades, skipping bar: {}", e);
                    report.errors.push(e.into());
                    return report;
                }
            }
        } else {
            0
        };

        let ctx = StepContext {
            now: self.clock.now(),
            open_trade_count,
        };

        for machine in self.plans.iter_mut() {
            if let Err(e) = reconcile_fill(&self.gateway, machine).await {
                error!(correlation_id = %machine.correlation_id(), "Failed to look up position, skipping plan: {}", e);
                report.errors.push(e);
                continue;
            }
            let Some(action) = machine.on_bar(bar, &ctx) else {
                continue;
            };
            match execute_action(&self.gateway, machine, &action).await {
                Ok(()) => report.executed.push(action),
                Err(e) => {
                    error!(correlation_id = %machine.correlation_id(), "Action failed: {}", e);
                    report.errors.push(e);
                }
            }
        }

        info!(at = %ctx.now, "Finished onBar step");
        report
    }

    /// A tick is evaluated as a bar with a single price
    pub async fn on_tick(&mut self, tick: &Tick) -> BotReport {
        self.on_bar(&Bar::from(tick)).await
    }

    /// Pull the latest bar from a market data source and evaluate it
    pub async fn poll_market<M: MarketDataSource>(&mut self, source: &M) -> BotReport {
        match source.latest_bar(&self.symbol, self.timeframe).await {
            Ok(bar) => {
                let report = self.on_bar(&bar).await;
                self.persist().await;
                report
            }
            Err(e) => {
                warn!(symbol = %self.symbol, "Failed to fetch latest bar: {}", e);
                BotReport {
                    executed: Vec::new(),
                    errors: vec![e.into()],
                }
            }
        }
    }

    /// Gateway reported a position opened
    ///
    /// Unknown tags yield `StaleCorrelation`, which is logged and otherwise ignored.
    pub fn on_position_opened(&mut self, event: &PositionOpened) -> Result<()> {
        match self.plans.route(&event.correlation_tag) {
            Ok(machine) => {
                machine.on_position_opened(event);
                Ok(())
            }
            Err(e) => {
                warn!(position_id = %event.position_id, "Position opened for unknown plan: {}", e);
                Err(e)
            }
        }
    }

    /// Gateway reported a position closed
    pub fn on_position_closed(&mut self, event: &PositionClosed) -> Result<()> {
        match self.plans.route(&event.correlation_tag) {
            Ok(machine) => {
                machine.on_position_closed(event);
                Ok(())
            }
            Err(e) => {
                warn!(position_id = %event.position_id, "Position closed for unknown plan: {}", e);
                Err(e)
            }
        }
    }

    /// Stop every plan and persist the result
    ///
    /// Cleanup is best effort and failures are only logged.
    #[instrument(skip_all)]
    pub async fn shutdown(&mut self) -> BotReport {
        let mut report = BotReport::default();

        for machine in self.plans.iter_mut() {
            for action in machine.stop(self.close_position_on_stop) {
                let mut step = BotReport::default();
                match execute_action(&self.gateway, machine, &action).await {
                    Ok(()) => step.executed.push(action),
                    Err(e) => {
                        warn!(correlation_id = %machine.correlation_id(), "Cleanup failed: {}", e);
                        step.errors.push(e);
                    }
                }
                report.merge(step);
            }
        }

        info!("Finished LevelTrader");
        self.persist().await;
        report
    }

    fn needs_open_trade_count(&self) -> bool {
        self.plans
            .iter()
            .any(|m| m.phase() < Phase::PendingOrderPlaced)
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(&self.plans.snapshots()).await {
            error!(path = %store.path().display(), "Failed to persist state: {}", e);
        }
    }
}

/// Adopt a fill whose opened event never arrived
///
/// Only plans waiting on a pending order ask the gateway; the lookup matches
/// the correlation tag the order was stamped with.
async fn reconcile_fill<G: OrderGateway>(gateway: &G, machine: &mut TradeMachine) -> Result<()> {
    if machine.phase() != Phase::PendingOrderPlaced {
        return Ok(());
    }
    let tag = machine.correlation_id().to_string();
    if let Some(opened) = gateway.find_position(&tag).await? {
        warn!(
            correlation_id = %tag,
            position_id = %opened.position_id,
            "Pending order filled without an opened event, adopting position"
        );
        machine.on_position_opened(&opened);
    }
    Ok(())
}

/// Run one action against the gateway and confirm it on success
async fn execute_action<G: OrderGateway>(
    gateway: &G,
    machine: &mut TradeMachine,
    action: &Action,
) -> Result<()> {
    match action {
        Action::PlaceLimitOrder(request) => {
            let order_id = gateway.place_limit_order(request).await?;
            info!(%order_id, size = %request.size, limit = %request.limit_price, "Response PlaceLimitOrder");
            machine.confirm_order_placed(order_id);
        }
        Action::CancelOrder { order_id, reason } => {
            match gateway.cancel_order(order_id).await {
                Ok(()) => info!(%order_id, "Pending order cancelled"),
                Err(GatewayError::NotFound(detail)) => {
                    warn!(%order_id, "Pending order does not exist: {}", detail);
                }
                Err(e) => return Err(e.into()),
            }
            machine.confirm_order_cancelled(reason.clone());
        }
        Action::ModifyStopLoss {
            position_id,
            new_stop_price,
            level_index,
        } => {
            gateway.modify_stop_loss(position_id, *new_stop_price).await?;
            info!(%position_id, stop = %new_stop_price, "Stop loss modified");
            machine.confirm_stop_modified(*level_index);
        }
        Action::ClosePosition { position_id } => {
            gateway.close_position(position_id).await?;
            info!(%position_id, "Position close requested");
        }
        Action::StopTrading(reason) => {
            info!(correlation_id = %machine.correlation_id(), %reason, "Bot will stop");
        }
    }
    Ok(())
}
