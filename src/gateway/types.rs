//! Shared order and position types for venue gateways.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The opposite side, used for hedge dispatch and unwinds.
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// Order kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Limit,
    Market,
}

/// Venue-reported order state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Open,
    Closed,
    Canceled,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Closed | OrderState::Canceled)
    }
}

/// Margin mode for a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    Isolated,
    Cross,
}

/// Direction of a live position as reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// The order side that shrinks this position.
    pub fn closing_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }
}

/// Margin-related parameters attached to every order.
///
/// The concrete gateway translates these into whatever parameter names its
/// venue requires (see `VenueProfile`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarginParams {
    pub mode: MarginMode,
    pub leverage: u8,
    /// Reduce-only orders can only shrink an existing position, never flip it.
    pub reduce_only: bool,
}

impl MarginParams {
    pub fn isolated(leverage: u8) -> Self {
        Self {
            mode: MarginMode::Isolated,
            leverage,
            reduce_only: false,
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }
}

/// A new order to submit to a venue.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub amount: Decimal,
    /// Required for limit orders, ignored for market orders.
    pub price: Option<Decimal>,
    pub margin: MarginParams,
}

/// Venue-assigned handle for a submitted order.
///
/// Transient: destroyed once a terminal state has been observed and the fill
/// reconciled into the position.
#[derive(Debug, Clone)]
pub struct OrderHandle {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub state: OrderState,
    /// Originally requested amount.
    pub amount: Decimal,
    /// Cumulative filled amount observed so far.
    pub filled: Decimal,
    /// Average fill price, if anything filled.
    pub avg_price: Option<Decimal>,
}

impl OrderHandle {
    pub fn is_filled(&self) -> bool {
        self.state == OrderState::Closed && self.filled > Decimal::ZERO
    }
}

/// Live position snapshot from a venue.
#[derive(Debug, Clone, Copy)]
pub struct LivePosition {
    pub side: PositionSide,
    pub size: Decimal,
    pub margin_mode: MarginMode,
    pub leverage: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_opposite_side() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
    }

    #[test]
    fn test_closing_side_inverts_position() {
        assert_eq!(PositionSide::Long.closing_side(), OrderSide::Sell);
        assert_eq!(PositionSide::Short.closing_side(), OrderSide::Buy);
    }

    #[test]
    fn test_handle_filled() {
        let handle = OrderHandle {
            id: "1".into(),
            symbol: "DOGEUSDT".into(),
            side: OrderSide::Buy,
            state: OrderState::Closed,
            amount: dec!(10),
            filled: dec!(10),
            avg_price: Some(dec!(0.1)),
        };
        assert!(handle.is_filled());

        let unfilled = OrderHandle {
            filled: Decimal::ZERO,
            ..handle
        };
        assert!(!unfilled.is_filled());
    }
}
