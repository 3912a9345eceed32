//! Simulated venue for paper trading and engine tests.
//!
//! Order books, fill latency, and failures are all scriptable so the
//! execution paths (timeouts, cooldowns, hedge failures, forced closes) can
//! be exercised without a live venue.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::error::{GatewayError, GatewayResult};
use super::profile::{VenueId, VenueProfile};
use super::traits::ExchangeGateway;
use super::types::{
    LivePosition, MarginMode, OrderHandle, OrderKind, OrderRequest, OrderSide, OrderState,
};

/// An order resting on the simulated venue.
#[derive(Debug, Clone)]
struct MockOrder {
    handle: OrderHandle,
    /// Status queries remaining before a limit order reports closed.
    /// `u32::MAX` never fills.
    polls_until_fill: u32,
}

#[derive(Debug)]
struct MockState {
    /// Scripted best prices, consumed one per `best_price` call; the last
    /// entry repeats forever.
    prices: VecDeque<Decimal>,
    top_volume: Decimal,
    /// Next N price fetches fail with a transient error.
    price_fetch_failures: u32,
    /// Next N status queries fail with a transient error.
    status_poll_failures: u32,
    /// Status queries before a limit order fills (market orders fill at once).
    fill_after_polls: u32,
    /// Fraction of the requested amount that actually fills.
    fill_fraction: Decimal,
    fail_margin_config: bool,
    fail_placement: bool,
    position: Option<LivePosition>,
    orders: HashMap<String, MockOrder>,
    placed: Vec<OrderRequest>,
    /// Placement calls including ones that failed.
    placement_attempts: u32,
    canceled: Vec<String>,
    margin_calls: Vec<(String, u8, MarginMode)>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            prices: VecDeque::new(),
            top_volume: Decimal::ZERO,
            price_fetch_failures: 0,
            status_poll_failures: 0,
            fill_after_polls: 1,
            fill_fraction: Decimal::ONE,
            fail_margin_config: false,
            fail_placement: false,
            position: None,
            orders: HashMap::new(),
            placed: Vec::new(),
            placement_attempts: 0,
            canceled: Vec::new(),
            margin_calls: Vec::new(),
        }
    }
}

/// Scriptable in-memory venue.
pub struct MockGateway {
    venue: VenueId,
    profile: VenueProfile,
    state: Arc<RwLock<MockState>>,
    order_id_counter: AtomicU64,
}

impl MockGateway {
    pub fn new(venue: VenueId) -> Self {
        Self {
            venue,
            profile: VenueProfile::for_venue(venue),
            state: Arc::new(RwLock::new(MockState::default())),
            order_id_counter: AtomicU64::new(1),
        }
    }

    /// Convenience constructor: static book, fills on the first status poll.
    pub async fn with_market(venue: VenueId, price: Decimal, top_volume: Decimal) -> Self {
        let gateway = Self::new(venue);
        gateway.script_prices(vec![price]).await;
        gateway.set_top_volume(top_volume).await;
        gateway
    }

    // ==================== Scripting ====================

    pub async fn script_prices(&self, prices: Vec<Decimal>) {
        self.state.write().await.prices = prices.into();
    }

    pub async fn set_top_volume(&self, volume: Decimal) {
        self.state.write().await.top_volume = volume;
    }

    pub async fn fail_next_price_fetches(&self, count: u32) {
        self.state.write().await.price_fetch_failures = count;
    }

    pub async fn fail_next_status_polls(&self, count: u32) {
        self.state.write().await.status_poll_failures = count;
    }

    pub async fn set_fill_after_polls(&self, polls: u32) {
        self.state.write().await.fill_after_polls = polls;
    }

    /// Limit orders never fill until canceled.
    pub async fn never_fill(&self) {
        self.state.write().await.fill_after_polls = u32::MAX;
    }

    pub async fn set_fill_fraction(&self, fraction: Decimal) {
        self.state.write().await.fill_fraction = fraction;
    }

    pub async fn set_fail_margin_config(&self, fail: bool) {
        self.state.write().await.fail_margin_config = fail;
    }

    pub async fn set_fail_placement(&self, fail: bool) {
        self.state.write().await.fail_placement = fail;
    }

    pub async fn set_position(&self, position: Option<LivePosition>) {
        self.state.write().await.position = position;
    }

    // ==================== Inspection ====================

    pub async fn placed_orders(&self) -> Vec<OrderRequest> {
        self.state.read().await.placed.clone()
    }

    pub async fn placement_attempts(&self) -> u32 {
        self.state.read().await.placement_attempts
    }

    pub async fn canceled_ids(&self) -> Vec<String> {
        self.state.read().await.canceled.clone()
    }

    pub async fn margin_calls(&self) -> Vec<(String, u8, MarginMode)> {
        self.state.read().await.margin_calls.clone()
    }

    fn next_order_id(&self) -> String {
        self.order_id_counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    fn venue(&self) -> VenueId {
        self.venue
    }

    fn profile(&self) -> &VenueProfile {
        &self.profile
    }

    async fn best_price(&self, symbol: &str, _side: OrderSide) -> GatewayResult<Decimal> {
        let mut state = self.state.write().await;
        if state.price_fetch_failures > 0 {
            state.price_fetch_failures -= 1;
            return Err(GatewayError::Transient("simulated price fetch failure".into()));
        }
        match state.prices.len() {
            0 => Err(GatewayError::NoMarketData {
                symbol: symbol.to_string(),
            }),
            1 => Ok(state.prices[0]),
            _ => Ok(state.prices.pop_front().expect("non-empty")),
        }
    }

    async fn top_of_book_volume(&self, symbol: &str, _side: OrderSide) -> GatewayResult<Decimal> {
        let state = self.state.read().await;
        if state.top_volume <= Decimal::ZERO {
            return Err(GatewayError::NoMarketData {
                symbol: symbol.to_string(),
            });
        }
        Ok(state.top_volume)
    }

    async fn place_order(&self, request: &OrderRequest) -> GatewayResult<OrderHandle> {
        let mut state = self.state.write().await;
        state.placement_attempts += 1;
        if state.fail_placement {
            return Err(GatewayError::Transient("simulated placement failure".into()));
        }

        let id = self.next_order_id();
        state.placed.push(request.clone());

        let handle = match request.kind {
            // Market orders fill instantly at the current best price.
            OrderKind::Market => OrderHandle {
                id: id.clone(),
                symbol: request.symbol.clone(),
                side: request.side,
                state: OrderState::Closed,
                amount: request.amount,
                filled: request.amount,
                avg_price: state.prices.front().copied(),
            },
            OrderKind::Limit => OrderHandle {
                id: id.clone(),
                symbol: request.symbol.clone(),
                side: request.side,
                state: OrderState::Open,
                amount: request.amount,
                filled: Decimal::ZERO,
                avg_price: None,
            },
        };

        debug!(venue = %self.venue, id = %id, kind = ?request.kind, amount = %request.amount, "mock order placed");

        let polls_until_fill = state.fill_after_polls;
        state.orders.insert(
            id,
            MockOrder {
                handle: handle.clone(),
                polls_until_fill,
            },
        );
        Ok(handle)
    }

    async fn cancel_order(&self, id: &str, _symbol: &str) -> GatewayResult<()> {
        let mut state = self.state.write().await;
        state.canceled.push(id.to_string());
        match state.orders.get_mut(id) {
            Some(order) => {
                if order.handle.state == OrderState::Open {
                    order.handle.state = OrderState::Canceled;
                }
                Ok(())
            }
            None => Err(GatewayError::Permanent(format!("unknown order {id}"))),
        }
    }

    async fn order_status(&self, id: &str, _symbol: &str) -> GatewayResult<OrderHandle> {
        let mut state = self.state.write().await;
        if state.status_poll_failures > 0 {
            state.status_poll_failures -= 1;
            return Err(GatewayError::Transient("simulated status poll failure".into()));
        }
        let fill_fraction = state.fill_fraction;
        let fill_price = state.prices.front().copied();
        let order = state
            .orders
            .get_mut(id)
            .ok_or_else(|| GatewayError::Permanent(format!("unknown order {id}")))?;

        if order.handle.state == OrderState::Open {
            if order.polls_until_fill == 0 {
                order.handle.state = OrderState::Closed;
                order.handle.filled = (order.handle.amount * fill_fraction).normalize();
                order.handle.avg_price = fill_price;
            } else if order.polls_until_fill != u32::MAX {
                order.polls_until_fill -= 1;
                if order.polls_until_fill == 0 {
                    order.handle.state = OrderState::Closed;
                    order.handle.filled = (order.handle.amount * fill_fraction).normalize();
                    order.handle.avg_price = fill_price;
                }
            }
        }
        Ok(order.handle.clone())
    }

    async fn live_position(&self, _symbol: &str) -> GatewayResult<Option<LivePosition>> {
        Ok(self.state.read().await.position)
    }

    async fn set_leverage_and_margin(
        &self,
        symbol: &str,
        leverage: u8,
        mode: MarginMode,
    ) -> GatewayResult<()> {
        let mut state = self.state.write().await;
        if state.fail_margin_config {
            return Err(GatewayError::Transient(
                "simulated margin configuration failure".into(),
            ));
        }
        state.margin_calls.push((symbol.to_string(), leverage, mode));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::types::MarginParams;
    use rust_decimal_macros::dec;

    fn limit_order(amount: Decimal, price: Decimal) -> OrderRequest {
        OrderRequest {
            symbol: "DOGEUSDT".into(),
            side: OrderSide::Buy,
            kind: OrderKind::Limit,
            amount,
            price: Some(price),
            margin: MarginParams::isolated(3),
        }
    }

    #[tokio::test]
    async fn test_limit_order_fills_after_scripted_polls() {
        let gateway = MockGateway::with_market(VenueId::Bitget, dec!(0.1), dec!(500)).await;
        gateway.set_fill_after_polls(2).await;

        let handle = gateway.place_order(&limit_order(dec!(10), dec!(0.1))).await.unwrap();
        assert_eq!(handle.state, OrderState::Open);

        let first = gateway.order_status(&handle.id, "DOGEUSDT").await.unwrap();
        assert_eq!(first.state, OrderState::Open);

        let second = gateway.order_status(&handle.id, "DOGEUSDT").await.unwrap();
        assert_eq!(second.state, OrderState::Closed);
        assert_eq!(second.filled, dec!(10));
    }

    #[tokio::test]
    async fn test_market_order_fills_instantly() {
        let gateway = MockGateway::with_market(VenueId::Bitget, dec!(0.1), dec!(500)).await;
        let request = OrderRequest {
            kind: OrderKind::Market,
            price: None,
            ..limit_order(dec!(5), dec!(0.1))
        };
        let handle = gateway.place_order(&request).await.unwrap();
        assert!(handle.is_filled());
        assert_eq!(handle.filled, dec!(5));
    }

    #[tokio::test]
    async fn test_scripted_price_sequence_repeats_last() {
        let gateway = MockGateway::new(VenueId::Bitget);
        gateway.script_prices(vec![dec!(1), dec!(2)]).await;

        assert_eq!(gateway.best_price("X", OrderSide::Buy).await.unwrap(), dec!(1));
        assert_eq!(gateway.best_price("X", OrderSide::Buy).await.unwrap(), dec!(2));
        assert_eq!(gateway.best_price("X", OrderSide::Buy).await.unwrap(), dec!(2));
    }

    #[tokio::test]
    async fn test_price_fetch_failure_injection() {
        let gateway = MockGateway::with_market(VenueId::Bitget, dec!(1), dec!(10)).await;
        gateway.fail_next_price_fetches(1).await;

        assert!(gateway.best_price("X", OrderSide::Buy).await.is_err());
        assert!(gateway.best_price("X", OrderSide::Buy).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_keeps_partial_fill() {
        let gateway = MockGateway::with_market(VenueId::Bitget, dec!(1), dec!(10)).await;
        gateway.never_fill().await;

        let handle = gateway.place_order(&limit_order(dec!(10), dec!(1))).await.unwrap();
        gateway.cancel_order(&handle.id, "DOGEUSDT").await.unwrap();

        let status = gateway.order_status(&handle.id, "DOGEUSDT").await.unwrap();
        assert_eq!(status.state, OrderState::Canceled);
        assert_eq!(status.filled, Decimal::ZERO);
    }
}
