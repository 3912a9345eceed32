//! Chase limit orders: track a moving best price toward a target.
//!
//! Used when the caller's target price is strictly better than the current
//! best: the order stays pinned to the moving best price (capturing fills on
//! the way), and the moment the book crosses the target the original plan — a
//! single resting order at the target — takes over.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ExecutionConfig;
use crate::gateway::{
    ExchangeGateway, MarginParams, OrderHandle, OrderKind, OrderRequest, OrderSide, OrderState,
};

/// Keeps one limit order pinned to the moving best price.
pub struct ChaseOrderController {
    gateway: Arc<dyn ExchangeGateway>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl ChaseOrderController {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, config: &ExecutionConfig) -> Self {
        Self {
            gateway,
            poll_interval: config.chase_poll_interval(),
            max_attempts: config.chase_max_attempts,
        }
    }

    /// Chase the best price until the order fills, the target is crossed, or
    /// the attempt budget runs out.
    ///
    /// Always resolves to the most recent known order (filled or not), or
    /// `None` when no order could be placed at all.
    pub async fn run(
        &self,
        symbol: &str,
        side: OrderSide,
        target: Decimal,
        amount: Decimal,
        margin: MarginParams,
    ) -> Option<OrderHandle> {
        let mut pinned: Option<OrderHandle> = None;
        let mut pinned_price: Option<Decimal> = None;

        for attempt in 0..self.max_attempts {
            let best = match self.gateway.best_price(symbol, side).await {
                Ok(price) => price,
                Err(e) => {
                    debug!(%symbol, attempt, error = %e, "chase price fetch failed");
                    sleep(self.poll_interval).await;
                    continue;
                }
            };

            if pinned_price == Some(best) {
                // Book has not moved: keep the resting order and just poll it.
                if let Some(filled) = self.poll_pinned(&mut pinned, symbol).await {
                    return Some(filled);
                }
                sleep(self.poll_interval).await;
                continue;
            }

            if Self::short_of_target(side, best, target) {
                // Still on the unfavorable side: re-pin at the new best.
                self.cancel_pinned(&mut pinned, symbol).await;
                pinned_price = None;
                if let Some(handle) = self.place_limit(symbol, side, amount, best, margin).await {
                    debug!(%symbol, %best, %target, "chase order re-pinned");
                    pinned_price = Some(best);
                    pinned = Some(handle);
                }
            } else if best == target {
                // Reached the target exactly: rest there once and hold.
                if pinned_price != Some(target) {
                    self.cancel_pinned(&mut pinned, symbol).await;
                    pinned_price = None;
                    if let Some(handle) =
                        self.place_limit(symbol, side, amount, target, margin).await
                    {
                        pinned_price = Some(target);
                        pinned = Some(handle);
                    }
                }
            } else {
                // Crossed past the target in our favor: back to the original
                // plan, a single order at the target price.
                info!(%symbol, %best, %target, "best price crossed target, placing at target");
                self.cancel_pinned(&mut pinned, symbol).await;
                return match self.place_limit(symbol, side, amount, target, margin).await {
                    Some(handle) => Some(handle),
                    None => pinned,
                };
            }

            if let Some(filled) = self.poll_pinned(&mut pinned, symbol).await {
                return Some(filled);
            }
            sleep(self.poll_interval).await;
        }

        // Attempt budget exhausted: fall back to the last known order rather
        // than failing outright.
        match pinned {
            Some(handle) => {
                warn!(%symbol, order_id = %handle.id, "chase attempts exhausted, returning last order");
                self.gateway
                    .order_status(&handle.id, symbol)
                    .await
                    .ok()
                    .or(Some(handle))
            }
            None => None,
        }
    }

    /// Whether the best price has not yet reached the target.
    fn short_of_target(side: OrderSide, best: Decimal, target: Decimal) -> bool {
        match side {
            OrderSide::Buy => best > target,
            OrderSide::Sell => best < target,
        }
    }

    async fn place_limit(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
        margin: MarginParams,
    ) -> Option<OrderHandle> {
        let request = OrderRequest {
            symbol: symbol.to_string(),
            side,
            kind: OrderKind::Limit,
            amount,
            price: Some(price),
            margin,
        };
        match self.gateway.place_order(&request).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(%symbol, %price, error = %e, "chase order placement failed");
                None
            }
        }
    }

    async fn cancel_pinned(&self, pinned: &mut Option<OrderHandle>, symbol: &str) {
        if let Some(handle) = pinned.take() {
            if let Err(e) = self.gateway.cancel_order(&handle.id, symbol).await {
                debug!(order_id = %handle.id, error = %e, "chase cancel failed");
            }
        }
    }

    /// Poll the resting order; a closed order ends the chase.
    async fn poll_pinned(
        &self,
        pinned: &mut Option<OrderHandle>,
        symbol: &str,
    ) -> Option<OrderHandle> {
        let handle = pinned.as_ref()?;
        match self.gateway.order_status(&handle.id, symbol).await {
            Ok(status) => {
                if status.state == OrderState::Closed {
                    return Some(status);
                }
                *pinned = Some(status);
                None
            }
            Err(e) => {
                debug!(order_id = %handle.id, error = %e, "chase status poll failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MockGateway, VenueId};
    use rust_decimal_macros::dec;

    const SYMBOL: &str = "DOGE/USDT:USDT";

    fn fast_config() -> ExecutionConfig {
        ExecutionConfig {
            chase_poll_interval_ms: 1,
            chase_max_attempts: 5,
            ..ExecutionConfig::default()
        }
    }

    fn controller(gateway: Arc<MockGateway>) -> ChaseOrderController {
        ChaseOrderController::new(gateway, &fast_config())
    }

    #[tokio::test]
    async fn test_terminates_and_returns_last_order_when_never_filled() {
        let gateway = Arc::new(MockGateway::with_market(VenueId::Bitget, dec!(1.05), dec!(100)).await);
        gateway.never_fill().await;

        let handle = controller(gateway.clone())
            .run(SYMBOL, OrderSide::Buy, dec!(1.00), dec!(10), MarginParams::isolated(3))
            .await
            .expect("an order was pinned");

        assert_eq!(handle.state, OrderState::Open);
        // Price never moved, so the order was pinned exactly once.
        assert_eq!(gateway.placed_orders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_returns_filled_order() {
        let gateway = Arc::new(MockGateway::with_market(VenueId::Bitget, dec!(1.05), dec!(100)).await);
        gateway.set_fill_after_polls(1).await;

        let handle = controller(gateway.clone())
            .run(SYMBOL, OrderSide::Buy, dec!(1.00), dec!(10), MarginParams::isolated(3))
            .await
            .expect("filled");

        assert_eq!(handle.state, OrderState::Closed);
        assert_eq!(handle.filled, dec!(10));
    }

    #[tokio::test]
    async fn test_crossing_target_places_at_target() {
        let gateway = Arc::new(MockGateway::new(VenueId::Bitget));
        // Buy chasing down toward 1.00: book crosses below on the 2nd look.
        gateway.script_prices(vec![dec!(1.05), dec!(0.99)]).await;
        gateway.set_top_volume(dec!(100)).await;
        gateway.never_fill().await;

        let handle = controller(gateway.clone())
            .run(SYMBOL, OrderSide::Buy, dec!(1.00), dec!(10), MarginParams::isolated(3))
            .await
            .expect("fallback order at target");

        let placed = gateway.placed_orders().await;
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[0].price, Some(dec!(1.05)));
        assert_eq!(placed[1].price, Some(dec!(1.00)));
        // The pinned order was canceled before the target order went out.
        assert_eq!(gateway.canceled_ids().await.len(), 1);
        assert_eq!(handle.amount, dec!(10));
    }

    #[tokio::test]
    async fn test_holds_single_order_at_target_price() {
        let gateway = Arc::new(MockGateway::with_market(VenueId::Bitget, dec!(1.00), dec!(100)).await);
        gateway.never_fill().await;

        controller(gateway.clone())
            .run(SYMBOL, OrderSide::Buy, dec!(1.00), dec!(10), MarginParams::isolated(3))
            .await;

        // Best price sat at the target the whole time: one order, no churn.
        assert_eq!(gateway.placed_orders().await.len(), 1);
        assert!(gateway.canceled_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_sell_side_chases_upward() {
        let gateway = Arc::new(MockGateway::new(VenueId::Bitget));
        // Sell with target 1.10 above the book: ask rises through the target.
        gateway.script_prices(vec![dec!(1.05), dec!(1.12)]).await;
        gateway.set_top_volume(dec!(100)).await;
        gateway.never_fill().await;

        controller(gateway.clone())
            .run(SYMBOL, OrderSide::Sell, dec!(1.10), dec!(10), MarginParams::isolated(3))
            .await;

        let placed = gateway.placed_orders().await;
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[0].price, Some(dec!(1.05)));
        assert_eq!(placed[1].price, Some(dec!(1.10)));
    }
}
