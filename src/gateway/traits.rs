//! Venue-agnostic gateway trait.
//!
//! The execution engine consumes this capability interface and never talks to
//! a venue API directly. Implementations are long-lived: one gateway per
//! venue, constructed at startup and shared behind `Arc`.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::error::GatewayResult;
use super::profile::{VenueId, VenueProfile};
use super::types::{LivePosition, MarginMode, OrderHandle, OrderRequest, OrderSide};

/// Per-venue trading capability.
///
/// All operations are suspension points; none blocks. Failures are classified
/// by `GatewayError` so the engine can decide between retry and skip.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Returns the venue identifier.
    fn venue(&self) -> VenueId;

    /// Static quirks table for this venue.
    fn profile(&self) -> &VenueProfile;

    /// Best resting price on the side a new order would join:
    /// best bid for a buy, best ask for a sell.
    async fn best_price(&self, symbol: &str, side: OrderSide) -> GatewayResult<Decimal>;

    /// Visible volume at that best price level.
    async fn top_of_book_volume(&self, symbol: &str, side: OrderSide) -> GatewayResult<Decimal>;

    /// Submit an order. Limit orders must carry a price.
    async fn place_order(&self, request: &OrderRequest) -> GatewayResult<OrderHandle>;

    /// Cancel a resting order.
    async fn cancel_order(&self, id: &str, symbol: &str) -> GatewayResult<()>;

    /// Query current order state via the path this venue supports
    /// (see `VenueProfile::status_query`).
    async fn order_status(&self, id: &str, symbol: &str) -> GatewayResult<OrderHandle>;

    /// Live position for the symbol, or `None` when flat.
    async fn live_position(&self, symbol: &str) -> GatewayResult<Option<LivePosition>>;

    /// Configure margin mode and leverage before trading the symbol.
    async fn set_leverage_and_margin(
        &self,
        symbol: &str,
        leverage: u8,
        mode: MarginMode,
    ) -> GatewayResult<()>;
}
