//! Slice sizing against visible liquidity and venue minimums.

use rust_decimal::Decimal;

use crate::config::ExecutionConfig;

/// Computes a safe order size for one slice.
///
/// A slice never consumes more than a fraction of the visible top-of-book
/// volume (market impact), and never goes below the venue's minimum notional
/// (guaranteed reject). When the minimum-notional floor exceeds what remains,
/// the whole remainder goes out in one slice.
#[derive(Debug, Clone)]
pub struct SliceSizer {
    depth_fraction: Decimal,
    min_notional: Decimal,
}

impl SliceSizer {
    pub fn new(config: &ExecutionConfig) -> Self {
        Self {
            depth_fraction: config.depth_fraction,
            min_notional: config.min_notional,
        }
    }

    /// Slice amount for the next order, in base units.
    ///
    /// `max(min(remaining, top_volume * depth_fraction), ceil(min_notional / price))`
    pub fn size(&self, remaining: Decimal, top_volume: Decimal, price: Decimal) -> Decimal {
        if price <= Decimal::ZERO || remaining <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let liquidity_cap = remaining.min(top_volume * self.depth_fraction);
        let min_trade_amount = (self.min_notional / price).ceil();
        liquidity_cap.max(min_trade_amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sizer() -> SliceSizer {
        SliceSizer::new(&ExecutionConfig::default()) // min_notional 10, depth 0.5
    }

    #[test]
    fn test_liquidity_capped_slice() {
        // remaining=100, volume=40, price=1 -> max(min(100, 20), 10) = 20
        assert_eq!(sizer().size(dec!(100), dec!(40), dec!(1)), dec!(20));
    }

    #[test]
    fn test_min_notional_floor_dominates() {
        // price=0.1 -> min trade amount = ceil(10 / 0.1) = 100, above the
        // liquidity cap of 20: the whole remainder goes out in one slice.
        assert_eq!(sizer().size(dec!(100), dec!(40), dec!(0.1)), dec!(100));
    }

    #[test]
    fn test_floor_may_exceed_remaining() {
        // remaining=5 but the venue minimum forces 100 units at this price.
        assert_eq!(sizer().size(dec!(5), dec!(40), dec!(0.1)), dec!(100));
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(sizer().size(dec!(0), dec!(40), dec!(1)), Decimal::ZERO);
        assert_eq!(sizer().size(dec!(100), dec!(40), dec!(0)), Decimal::ZERO);
    }
}
