//! Hold/unwind signal evaluation.
//!
//! The executor never decides whether a position is worth keeping; it only
//! reacts to readings from a `SignalOracle` supplied by the caller. The
//! caller polls the oracle on its own fixed interval (30s recommended) and
//! hands it to `close()` for per-iteration re-checks.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::SignalConfig;
use crate::gateway::{ExchangeGateway, OrderSide};
use crate::utils::decimal::safe_div;

/// Tri-state reading from the signal oracle.
///
/// `AbortClose` is only meaningful mid-unwind: the condition that triggered
/// the unwind has reversed, so no further close orders should go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalReading {
    /// Keep the position; nothing to do.
    Hold,
    /// Begin (or continue) unwinding both legs.
    BeginClose,
    /// Stop a running unwind without placing further orders.
    AbortClose,
}

/// External judgment on whether the position pair should keep existing.
#[async_trait]
pub trait SignalOracle: Send + Sync {
    async fn evaluate(&self) -> SignalReading;
}

/// Price-premium oracle over the two legs' venues.
///
/// Computes `(primary - secondary) / secondary` from best prices and maps it
/// onto the tri-state reading: above the entry premium the position holds;
/// once the premium decays below the exit threshold the unwind begins; a
/// recovery back above entry mid-unwind aborts further closing.
pub struct PremiumOracle {
    primary: Arc<dyn ExchangeGateway>,
    secondary: Arc<dyn ExchangeGateway>,
    primary_symbol: String,
    secondary_symbol: String,
    config: SignalConfig,
    last: Mutex<SignalReading>,
}

impl PremiumOracle {
    pub fn new(
        primary: Arc<dyn ExchangeGateway>,
        secondary: Arc<dyn ExchangeGateway>,
        primary_symbol: impl Into<String>,
        secondary_symbol: impl Into<String>,
        config: SignalConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            primary_symbol: primary_symbol.into(),
            secondary_symbol: secondary_symbol.into(),
            config,
            last: Mutex::new(SignalReading::Hold),
        }
    }

    async fn premium(&self) -> Option<Decimal> {
        let primary = self
            .primary
            .best_price(&self.primary_symbol, OrderSide::Sell)
            .await;
        let secondary = self
            .secondary
            .best_price(&self.secondary_symbol, OrderSide::Sell)
            .await;
        match (primary, secondary) {
            (Ok(p), Ok(s)) => Some(safe_div(p - s, s)),
            (primary, secondary) => {
                warn!(
                    primary_err = primary.is_err(),
                    secondary_err = secondary.is_err(),
                    "premium evaluation skipped, price fetch failed"
                );
                None
            }
        }
    }
}

#[async_trait]
impl SignalOracle for PremiumOracle {
    async fn evaluate(&self) -> SignalReading {
        let mut last = self.last.lock().await;

        // A failed evaluation repeats the previous reading rather than
        // inventing a transition.
        let Some(premium) = self.premium().await else {
            return *last;
        };

        let reading = if premium >= self.config.entry_premium {
            match *last {
                // The unwind condition reversed while closing.
                SignalReading::BeginClose | SignalReading::AbortClose => SignalReading::AbortClose,
                SignalReading::Hold => SignalReading::Hold,
            }
        } else if premium < self.config.exit_premium {
            SignalReading::BeginClose
        } else {
            *last
        };

        debug!(%premium, ?reading, "signal evaluated");
        *last = reading;
        reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MockGateway, VenueId};
    use rust_decimal_macros::dec;

    async fn oracle_with_prices(primary: Decimal, secondary: Decimal) -> PremiumOracle {
        let p = MockGateway::with_market(VenueId::Bitget, primary, dec!(100)).await;
        let s = MockGateway::with_market(VenueId::Bybit, secondary, dec!(100)).await;
        PremiumOracle::new(
            Arc::new(p),
            Arc::new(s),
            "DOGE/USDT:USDT",
            "DOGE/USDT:USDT",
            SignalConfig::default(), // entry 0.002, exit 0.0005
        )
    }

    #[tokio::test]
    async fn test_wide_premium_holds() {
        let oracle = oracle_with_prices(dec!(1.01), dec!(1.0)).await;
        assert_eq!(oracle.evaluate().await, SignalReading::Hold);
    }

    #[tokio::test]
    async fn test_collapsed_premium_begins_close() {
        let oracle = oracle_with_prices(dec!(1.0), dec!(1.0)).await;
        assert_eq!(oracle.evaluate().await, SignalReading::BeginClose);
    }

    #[tokio::test]
    async fn test_recovery_mid_unwind_aborts() {
        let primary = MockGateway::new(VenueId::Bitget);
        // Premium collapses, then recovers past the entry threshold.
        primary.script_prices(vec![dec!(1.0), dec!(1.01)]).await;
        let secondary = MockGateway::with_market(VenueId::Bybit, dec!(1.0), dec!(100)).await;
        let oracle = PremiumOracle::new(
            Arc::new(primary),
            Arc::new(secondary),
            "DOGE/USDT:USDT",
            "DOGE/USDT:USDT",
            SignalConfig::default(),
        );

        assert_eq!(oracle.evaluate().await, SignalReading::BeginClose);
        assert_eq!(oracle.evaluate().await, SignalReading::AbortClose);
    }

    #[tokio::test]
    async fn test_failed_fetch_repeats_last_reading() {
        let primary = Arc::new(MockGateway::with_market(VenueId::Bitget, dec!(1.0), dec!(100)).await);
        let secondary = Arc::new(MockGateway::with_market(VenueId::Bybit, dec!(1.0), dec!(100)).await);
        let oracle = PremiumOracle::new(
            primary.clone(),
            secondary.clone(),
            "DOGE/USDT:USDT",
            "DOGE/USDT:USDT",
            SignalConfig::default(),
        );

        assert_eq!(oracle.evaluate().await, SignalReading::BeginClose);

        primary.fail_next_price_fetches(1).await;
        assert_eq!(oracle.evaluate().await, SignalReading::BeginClose);
    }
}
