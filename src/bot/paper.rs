//! In-memory order gateway for replays and tests
//!
//! Orders fill at their limit price when a bar trades through it, positions
//! close at their stop or target, and realized PnL is booked into the account.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::common::errors::{GatewayError, GatewayResult};
use crate::common::traits::OrderGateway;
use crate::common::types::{
    Bar, Direction, InstrumentSpec, LimitOrderRequest, OrderId, PositionClosed, PositionEvent,
    PositionId, PositionOpened,
};
use crate::config::PaperAccountConfig;

/// Pending limit order held by the paper book
#[derive(Debug, Clone, PartialEq)]
pub struct PaperOrder {
    pub order_id: OrderId,
    pub request: LimitOrderRequest,
}

/// Open position held by the paper book
#[derive(Debug, Clone, PartialEq)]
pub struct PaperPosition {
    pub position_id: PositionId,
    pub correlation_tag: String,
    pub direction: Direction,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    pub target_price: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl PaperPosition {
    /// Exit price if the bar hits the stop or the target; the stop wins a tie
    fn exit_on(&self, bar: &Bar) -> Option<Decimal> {
        if bar.retraces_to(self.stop_price, self.direction) {
            Some(self.stop_price)
        } else if bar.extends_to(self.target_price, self.direction) {
            Some(self.target_price)
        } else {
            None
        }
    }
}

#[derive(Debug)]
struct PaperBook {
    equity: Decimal,
    balance: Decimal,
    next_id: u64,
    orders: Vec<PaperOrder>,
    positions: Vec<PaperPosition>,
    last_price: Option<Decimal>,
    /// Closed by `close_position`, reported on the next settle
    outbox: Vec<PositionEvent>,
    /// Returned by the next mutating call instead of executing it
    injected_failure: Option<GatewayError>,
}

impl PaperBook {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn take_failure(&mut self) -> GatewayResult<()> {
        match self.injected_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn close(&mut self, index: usize, exit_price: Decimal, spec: &InstrumentSpec) -> PositionEvent {
        let position = self.positions.remove(index);
        let pips = (exit_price - position.entry_price) * position.direction.sign() / spec.pip_size;
        let realized_pnl = pips * spec.pip_value * position.size;
        self.equity += realized_pnl;
        self.balance += realized_pnl;

        info!(
            position_id = %position.position_id,
            %exit_price,
            %realized_pnl,
            "Paper position closed"
        );

        PositionEvent::Closed(PositionClosed {
            position_id: position.position_id,
            correlation_tag: position.correlation_tag,
            exit_price,
            realized_pnl,
        })
    }
}

/// Paper trading gateway; clones share the same book
#[derive(Debug, Clone)]
pub struct PaperGateway {
    book: Arc<Mutex<PaperBook>>,
    spec: Arc<InstrumentSpec>,
}

impl PaperGateway {
    pub fn new(account: &PaperAccountConfig, spec: InstrumentSpec) -> Self {
        Self {
            book: Arc::new(Mutex::new(PaperBook {
                equity: account.equity,
                balance: account.balance,
                next_id: 0,
                orders: Vec::new(),
                positions: Vec::new(),
                last_price: None,
                outbox: Vec::new(),
                injected_failure: None,
            })),
            spec: Arc::new(spec),
        }
    }

    /// Make the next order, cancel, modify or close call fail with `err`
    pub async fn fail_next_call(&self, err: GatewayError) {
        self.book.lock().await.injected_failure = Some(err);
    }

    pub async fn pending_orders(&self) -> Vec<PaperOrder> {
        self.book.lock().await.orders.clone()
    }

    pub async fn positions(&self) -> Vec<PaperPosition> {
        self.book.lock().await.positions.clone()
    }

    /// Apply a bar to the book and report what happened
    ///
    /// Positions opened before this bar are checked for stop/target first, then
    /// pending orders are filled. A position filled on this bar is not closed on
    /// the same bar.
    pub async fn settle(&self, bar: &Bar) -> Vec<PositionEvent> {
        let mut book = self.book.lock().await;
        let mut events = std::mem::take(&mut book.outbox);
        book.last_price = Some(bar.close);

        let mut index = 0;
        while index < book.positions.len() {
            let exit = book.positions[index].exit_on(bar);
            match exit {
                Some(exit_price) => events.push(book.close(index, exit_price, &self.spec)),
                None => index += 1,
            }
        }

        let (filled, resting): (Vec<PaperOrder>, Vec<PaperOrder>) =
            std::mem::take(&mut book.orders).into_iter().partition(|order| {
                bar.retraces_to(order.request.limit_price, order.request.direction)
            });
        book.orders = resting;

        for order in filled {
            let position_id = PositionId::new(book.next_id("pos"));
            let request = order.request;
            info!(
                order_id = %order.order_id,
                %position_id,
                entry_price = %request.limit_price,
                "Paper order filled"
            );
            book.positions.push(PaperPosition {
                position_id: position_id.clone(),
                correlation_tag: request.correlation_id.to_string(),
                direction: request.direction,
                size: request.size,
                entry_price: request.limit_price,
                stop_price: request.stop_price,
                target_price: request.target_price,
                opened_at: bar.timestamp,
            });
            events.push(PositionEvent::Opened(PositionOpened {
                position_id,
                correlation_tag: request.correlation_id.to_string(),
                entry_price: request.limit_price,
            }));
        }

        debug!(events = events.len(), "Paper book settled");
        events
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn place_limit_order(&self, request: &LimitOrderRequest) -> GatewayResult<OrderId> {
        let mut book = self.book.lock().await;
        book.take_failure()?;
        if request.size <= Decimal::ZERO {
            return Err(GatewayError::Rejected(format!("invalid size {}", request.size)));
        }
        let order_id = OrderId::new(book.next_id("ord"));
        book.orders.push(PaperOrder {
            order_id: order_id.clone(),
            request: request.clone(),
        });
        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: &OrderId) -> GatewayResult<()> {
        let mut book = self.book.lock().await;
        book.take_failure()?;
        let index = book
            .orders
            .iter()
            .position(|o| &o.order_id == order_id)
            .ok_or_else(|| GatewayError::NotFound(format!("order {}", order_id)))?;
        book.orders.remove(index);
        Ok(())
    }

    async fn modify_stop_loss(&self, position_id: &PositionId, new_stop: Decimal) -> GatewayResult<()> {
        let mut book = self.book.lock().await;
        book.take_failure()?;
        let position = book
            .positions
            .iter_mut()
            .find(|p| &p.position_id == position_id)
            .ok_or_else(|| GatewayError::NotFound(format!("position {}", position_id)))?;
        position.stop_price = new_stop;
        Ok(())
    }

    async fn close_position(&self, position_id: &PositionId) -> GatewayResult<()> {
        let mut book = self.book.lock().await;
        book.take_failure()?;
        let index = book
            .positions
            .iter()
            .position(|p| &p.position_id == position_id)
            .ok_or_else(|| GatewayError::NotFound(format!("position {}", position_id)))?;
        let exit_price = book
            .last_price
            .unwrap_or(book.positions[index].entry_price);
        let event = book.close(index, exit_price, &self.spec);
        book.outbox.push(event);
        Ok(())
    }

    async fn find_position(&self, correlation_tag: &str) -> GatewayResult<Option<PositionOpened>> {
        let book = self.book.lock().await;
        Ok(book
            .positions
            .iter()
            .find(|p| p.correlation_tag == correlation_tag)
            .map(|p| PositionOpened {
                position_id: p.position_id.clone(),
                correlation_tag: p.correlation_tag.clone(),
                entry_price: p.entry_price,
            }))
    }

    async fn account_equity(&self) -> GatewayResult<Decimal> {
        Ok(self.book.lock().await.equity)
    }

    async fn account_balance(&self) -> GatewayResult<Decimal> {
        Ok(self.book.lock().await.balance)
    }

    async fn open_trade_count(&self) -> GatewayResult<u32> {
        let book = self.book.lock().await;
        u32::try_from(book.orders.len() + book.positions.len())
            .map_err(|e| GatewayError::Unavailable(e.to_string()))
    }
}
