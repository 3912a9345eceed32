//! Position bookkeeping for one open/close cycle.

use rust_decimal::Decimal;
use std::collections::HashSet;

use crate::gateway::{MarginMode, OrderKind, OrderSide, VenueId};
use crate::utils::decimal::weighted_average;

/// Caller-supplied description of one leg of an arbitrage pair.
///
/// Immutable; exactly two of these (primary + hedge) define a position pair.
#[derive(Debug, Clone)]
pub struct TradeLegSpec {
    pub venue: VenueId,
    pub side: OrderSide,
    pub symbol: String,
    pub kind: OrderKind,
    /// Total amount to execute, in base units.
    pub amount: Decimal,
    /// Optional price the caller wants to improve on via chasing.
    pub target_price: Option<Decimal>,
    pub leverage: u8,
}

/// Mutable position state, owned exclusively by the executor for the
/// duration of one open or close cycle.
#[derive(Debug, Clone)]
pub struct Position {
    pub initial_amount: Decimal,
    pub remaining_amount: Decimal,
    pub filled_amount: Decimal,
    /// Weighted average entry price across all reconciled fills.
    pub avg_entry_price: Decimal,
    pub leverage: u8,
    pub margin_mode: MarginMode,
}

impl Position {
    pub fn new(initial_amount: Decimal, leverage: u8, margin_mode: MarginMode) -> Self {
        Self {
            initial_amount,
            remaining_amount: initial_amount,
            filled_amount: Decimal::ZERO,
            avg_entry_price: Decimal::ZERO,
            leverage,
            margin_mode,
        }
    }

    /// Fold a confirmed fill into the position.
    ///
    /// Fills beyond `remaining_amount` are clamped: a venue can report at
    /// most what was asked for, but duplicated observations must not push
    /// the position negative.
    pub fn apply_fill(&mut self, amount: Decimal, price: Decimal) {
        let amount = amount.min(self.remaining_amount);
        if amount <= Decimal::ZERO {
            return;
        }
        self.avg_entry_price = weighted_average(&[
            (self.avg_entry_price, self.filled_amount),
            (price, amount),
        ]);
        self.filled_amount += amount;
        self.remaining_amount -= amount;
        debug_assert_eq!(
            self.remaining_amount + self.filled_amount,
            self.initial_amount
        );
    }

    pub fn is_flat(&self) -> bool {
        self.remaining_amount <= Decimal::ZERO
    }
}

/// Orders already reconciled, keyed by (venue, venue-assigned id).
///
/// Polling can observe the same terminal order many times; a fill must be
/// counted exactly once.
#[derive(Debug, Default)]
pub struct ProcessedOrderRegistry {
    seen: HashSet<(VenueId, String)>,
}

impl ProcessedOrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an order as reconciled. Returns `false` when it was already
    /// present, in which case the caller must skip reconciliation.
    pub fn mark(&mut self, venue: VenueId, order_id: &str) -> bool {
        self.seen.insert((venue, order_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fill_preserves_amount_invariant() {
        let mut position = Position::new(dec!(100), 3, MarginMode::Isolated);

        position.apply_fill(dec!(20), dec!(0.10));
        assert_eq!(position.filled_amount, dec!(20));
        assert_eq!(position.remaining_amount, dec!(80));
        assert_eq!(
            position.remaining_amount + position.filled_amount,
            position.initial_amount
        );

        position.apply_fill(dec!(80), dec!(0.12));
        assert!(position.is_flat());
        assert_eq!(
            position.remaining_amount + position.filled_amount,
            position.initial_amount
        );
    }

    #[test]
    fn test_weighted_entry_price() {
        let mut position = Position::new(dec!(30), 1, MarginMode::Isolated);
        position.apply_fill(dec!(10), dec!(1.0));
        position.apply_fill(dec!(20), dec!(1.3));
        // (10*1.0 + 20*1.3) / 30 = 1.2
        assert_eq!(position.avg_entry_price, dec!(1.2));
    }

    #[test]
    fn test_overfill_is_clamped() {
        let mut position = Position::new(dec!(10), 1, MarginMode::Isolated);
        position.apply_fill(dec!(15), dec!(1));
        assert!(position.is_flat());
        assert_eq!(position.filled_amount, dec!(10));
    }

    #[test]
    fn test_registry_is_idempotent() {
        let mut registry = ProcessedOrderRegistry::new();
        assert!(registry.mark(VenueId::Bitget, "order-1"));
        assert!(!registry.mark(VenueId::Bitget, "order-1"));
        // Same id on a different venue is a different order.
        assert!(registry.mark(VenueId::Bybit, "order-1"));
        assert_eq!(registry.len(), 2);
    }
}
