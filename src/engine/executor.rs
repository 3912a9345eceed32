//! Position executor: the open and close life cycles.
//!
//! One executor owns one position pair for one cycle. Slices go out strictly
//! sequentially on the primary venue; every confirmed fill is mirrored on the
//! secondary venue before the next slice is sized, so the hedge amount is
//! always evaluated against a stable filled amount.

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::config::ExecutionConfig;
use crate::engine::chase::ChaseOrderController;
use crate::engine::position::{Position, ProcessedOrderRegistry, TradeLegSpec};
use crate::engine::signal::{SignalOracle, SignalReading};
use crate::engine::sizer::SliceSizer;
use crate::gateway::{
    ExchangeGateway, LivePosition, MarginMode, MarginParams, OrderHandle, OrderKind, OrderRequest,
    OrderSide,
};

/// Life-cycle state of one position pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Opening,
    SlicePending,
    SliceFilled,
    Open,
    Closing,
    UnwindPending,
    UnwindFilled,
    Closed,
    /// Margin configuration could not be confirmed; trading never started.
    Aborted,
}

/// Outcome of an open cycle.
#[derive(Debug, Clone)]
pub struct OpenReport {
    pub has_filled_order: bool,
    pub filled_amount: Decimal,
    pub remaining_amount: Decimal,
    pub avg_entry_price: Decimal,
    /// Primary fills whose hedge order failed. Anything above zero needs
    /// manual intervention; the engine does not retry hedges blindly.
    pub unhedged_amount: Decimal,
    pub aborted: bool,
}

/// Outcome of a close cycle.
#[derive(Debug, Clone)]
pub struct CloseReport {
    pub closed_amount: Decimal,
    /// Amount still open when the loop ended (0 = fully closed).
    pub remaining_amount: Decimal,
    pub unhedged_amount: Decimal,
    /// The signal reverted mid-unwind and the loop stopped early.
    pub aborted_by_signal: bool,
    /// The wall-clock ceiling fired and both legs were market-closed.
    pub force_closed: bool,
    pub aborted: bool,
}

/// Drives one arbitrage position pair through open and close.
pub struct PositionExecutor {
    primary: Arc<dyn ExchangeGateway>,
    secondary: Arc<dyn ExchangeGateway>,
    config: ExecutionConfig,
    sizer: SliceSizer,
    registry: ProcessedOrderRegistry,
    state: ExecutorState,
}

impl PositionExecutor {
    pub fn new(
        primary: Arc<dyn ExchangeGateway>,
        secondary: Arc<dyn ExchangeGateway>,
        config: ExecutionConfig,
    ) -> Self {
        let sizer = SliceSizer::new(&config);
        Self {
            primary,
            secondary,
            config,
            sizer,
            registry: ProcessedOrderRegistry::new(),
            state: ExecutorState::Idle,
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Open the position pair: sliced limit orders on the primary venue, each
    /// confirmed fill hedged immediately on the secondary venue.
    ///
    /// Never returns an error for expected trading conditions; the report
    /// says what happened.
    pub async fn open(
        &mut self,
        primary_spec: &TradeLegSpec,
        secondary_spec: &TradeLegSpec,
    ) -> OpenReport {
        self.state = ExecutorState::Opening;
        info!(
            primary = %self.primary.venue(),
            secondary = %self.secondary.venue(),
            symbol = %primary_spec.symbol,
            side = ?primary_spec.side,
            amount = %primary_spec.amount,
            "opening position pair"
        );

        // Never trade with unconfirmed margin mode.
        if !self
            .configure_margin(&primary_spec.symbol, primary_spec.leverage)
            .await
        {
            self.state = ExecutorState::Aborted;
            warn!(
                symbol = %primary_spec.symbol,
                "margin configuration unconfirmed, aborting before any order"
            );
            return OpenReport {
                has_filled_order: false,
                filled_amount: Decimal::ZERO,
                remaining_amount: primary_spec.amount,
                avg_entry_price: Decimal::ZERO,
                unhedged_amount: Decimal::ZERO,
                aborted: true,
            };
        }

        let mut position =
            Position::new(primary_spec.amount, primary_spec.leverage, MarginMode::Isolated);
        let mut unhedged = Decimal::ZERO;
        let mut failures: u32 = 0;

        while !position.is_flat() {
            self.cooldown_if_needed(&mut failures).await;

            let (best, volume) = match self
                .market_snapshot(&primary_spec.symbol, primary_spec.side)
                .await
            {
                Ok(snapshot) => snapshot,
                Err(failure) => {
                    debug!(error = %failure, "market snapshot failed");
                    failures += 1;
                    sleep(self.config.retry_delay()).await;
                    continue;
                }
            };

            let slice = self.sizer.size(position.remaining_amount, volume, best);
            if slice <= Decimal::ZERO {
                warn!("slice size fell to zero, stopping the open loop");
                break;
            }

            self.state = ExecutorState::SlicePending;
            let notional = slice * best;
            info!(
                symbol = %primary_spec.symbol,
                side = ?primary_spec.side,
                %slice,
                price = %best,
                %notional,
                "submitting slice"
            );

            let margin = MarginParams::isolated(primary_spec.leverage);
            let handle = match self
                .submit_slice(
                    primary_spec,
                    primary_spec.side,
                    primary_spec.target_price,
                    slice,
                    best,
                    margin,
                )
                .await
            {
                Some(handle) => handle,
                None => {
                    failures += 1;
                    sleep(self.config.retry_delay()).await;
                    continue;
                }
            };

            match self.settle_slice(handle, &primary_spec.symbol).await {
                Some(settled) if settled.filled > Decimal::ZERO => {
                    if !self.registry.mark(self.primary.venue(), &settled.id) {
                        debug!(order_id = %settled.id, "order already reconciled, skipping");
                        continue;
                    }
                    let price = settled.avg_price.unwrap_or(best);
                    position.apply_fill(settled.filled, price);
                    self.state = ExecutorState::SliceFilled;
                    failures = 0;
                    info!(
                        filled = %settled.filled,
                        %price,
                        remaining = %position.remaining_amount,
                        "slice filled"
                    );
                    // Hedge sized to the exact filled amount, never the
                    // requested slice.
                    if let Err(amount) = self
                        .dispatch_hedge(
                            secondary_spec,
                            primary_spec.side.opposite(),
                            settled.filled,
                            false,
                        )
                        .await
                    {
                        unhedged += amount;
                    }
                }
                _ => {
                    failures += 1;
                }
            }
        }

        let has_filled_order = position.filled_amount > Decimal::ZERO;
        self.state = if has_filled_order {
            ExecutorState::Open
        } else {
            ExecutorState::Idle
        };
        info!(
            filled = %position.filled_amount,
            remaining = %position.remaining_amount,
            avg_price = %position.avg_entry_price,
            %unhedged,
            "open cycle finished"
        );

        OpenReport {
            has_filled_order,
            filled_amount: position.filled_amount,
            remaining_amount: position.remaining_amount,
            avg_entry_price: position.avg_entry_price,
            unhedged_amount: unhedged,
            aborted: false,
        }
    }

    /// Unwind both legs. The close direction comes from the live position as
    /// the venue reports it, not from what the open request assumed.
    pub async fn close(
        &mut self,
        primary_spec: &TradeLegSpec,
        secondary_spec: &TradeLegSpec,
        oracle: &dyn SignalOracle,
    ) -> CloseReport {
        self.state = ExecutorState::Closing;
        let mut report = CloseReport {
            closed_amount: Decimal::ZERO,
            remaining_amount: Decimal::ZERO,
            unhedged_amount: Decimal::ZERO,
            aborted_by_signal: false,
            force_closed: false,
            aborted: false,
        };

        if !self
            .configure_margin(&primary_spec.symbol, primary_spec.leverage)
            .await
        {
            self.state = ExecutorState::Aborted;
            warn!(
                symbol = %primary_spec.symbol,
                "margin configuration unconfirmed, aborting close"
            );
            report.aborted = true;
            return report;
        }

        let live = match self.query_live_position(&primary_spec.symbol).await {
            Ok(Some(live)) => live,
            Ok(None) => {
                info!(symbol = %primary_spec.symbol, "no live position to close");
                self.state = ExecutorState::Closed;
                return report;
            }
            Err(()) => {
                // Unknown position state: closing blind could flip the
                // position instead of shrinking it.
                warn!(symbol = %primary_spec.symbol, "live position unknown, aborting close");
                self.state = ExecutorState::Aborted;
                report.aborted = true;
                return report;
            }
        };

        let close_side = live.side.closing_side();
        info!(
            symbol = %primary_spec.symbol,
            live_side = ?live.side,
            close_side = ?close_side,
            size = %live.size,
            "closing live position"
        );

        let mut position = Position::new(live.size, live.leverage, live.margin_mode);
        let deadline = Instant::now() + self.config.close_ceiling();
        let mut failures: u32 = 0;

        while !position.is_flat() {
            // The signal can revert mid-unwind; stop without further orders.
            if oracle.evaluate().await == SignalReading::AbortClose {
                info!(
                    remaining = %position.remaining_amount,
                    "signal reverted mid-unwind, halting close"
                );
                report.aborted_by_signal = true;
                break;
            }

            if Instant::now() >= deadline {
                warn!(
                    remaining = %position.remaining_amount,
                    "close ceiling reached, force liquidating both legs at market"
                );
                let unhedged = self
                    .force_close(primary_spec, secondary_spec, close_side, &mut position)
                    .await;
                report.unhedged_amount += unhedged;
                report.force_closed = true;
                break;
            }

            self.cooldown_if_needed(&mut failures).await;

            let (best, volume) = match self
                .market_snapshot(&primary_spec.symbol, close_side)
                .await
            {
                Ok(snapshot) => snapshot,
                Err(failure) => {
                    debug!(error = %failure, "market snapshot failed");
                    failures += 1;
                    sleep(self.config.retry_delay()).await;
                    continue;
                }
            };

            let slice = self.sizer.size(position.remaining_amount, volume, best);
            if slice <= Decimal::ZERO {
                warn!("slice size fell to zero, stopping the close loop");
                break;
            }

            self.state = ExecutorState::UnwindPending;
            info!(
                symbol = %primary_spec.symbol,
                side = ?close_side,
                %slice,
                price = %best,
                "submitting unwind slice"
            );

            // Close orders may only shrink the position.
            let margin = self.closing_margin(position.leverage);
            let handle = match self
                .submit_slice(primary_spec, close_side, None, slice, best, margin)
                .await
            {
                Some(handle) => handle,
                None => {
                    failures += 1;
                    sleep(self.config.retry_delay()).await;
                    continue;
                }
            };

            match self.settle_slice(handle, &primary_spec.symbol).await {
                Some(settled) if settled.filled > Decimal::ZERO => {
                    if !self.registry.mark(self.primary.venue(), &settled.id) {
                        debug!(order_id = %settled.id, "order already reconciled, skipping");
                        continue;
                    }
                    let price = settled.avg_price.unwrap_or(best);
                    position.apply_fill(settled.filled, price);
                    self.state = ExecutorState::UnwindFilled;
                    failures = 0;
                    info!(
                        filled = %settled.filled,
                        remaining = %position.remaining_amount,
                        "unwind slice filled"
                    );
                    if let Err(amount) = self
                        .dispatch_hedge(
                            secondary_spec,
                            close_side.opposite(),
                            settled.filled,
                            true,
                        )
                        .await
                    {
                        report.unhedged_amount += amount;
                    }
                }
                _ => {
                    failures += 1;
                }
            }
        }

        report.closed_amount = position.filled_amount;
        report.remaining_amount = position.remaining_amount;

        if report.aborted_by_signal {
            self.state = ExecutorState::Open;
        } else {
            self.state = ExecutorState::Closed;
            if report.remaining_amount > Decimal::ZERO {
                warn!(
                    remaining = %report.remaining_amount,
                    "position not fully closed"
                );
            } else {
                info!(closed = %report.closed_amount, "position fully closed");
            }
        }

        report
    }

    // ==================== Slice plumbing ====================

    /// Bounded degradation: after too many consecutive failures, sleep out a
    /// cooldown window and start counting again. Never aborts the loop.
    async fn cooldown_if_needed(&self, failures: &mut u32) {
        if *failures >= self.config.max_consecutive_failures {
            warn!(
                failures = *failures,
                cooldown_secs = self.config.failure_cooldown_secs,
                "too many consecutive failures, cooling down"
            );
            sleep(self.config.failure_cooldown()).await;
            *failures = 0;
        }
    }

    /// Best price and top-of-book volume for the side, as one snapshot.
    async fn market_snapshot(
        &self,
        symbol: &str,
        side: OrderSide,
    ) -> Result<(Decimal, Decimal), crate::gateway::GatewayError> {
        let best = self.primary.best_price(symbol, side).await?;
        let volume = self.primary.top_of_book_volume(symbol, side).await?;
        Ok((best, volume))
    }

    /// Submit one slice: a limit order at the best price, or a chase when the
    /// caller's target is strictly better than the current best.
    async fn submit_slice(
        &self,
        spec: &TradeLegSpec,
        side: OrderSide,
        target: Option<Decimal>,
        amount: Decimal,
        best: Decimal,
        margin: MarginParams,
    ) -> Option<OrderHandle> {
        if let Some(target) = target {
            if Self::strictly_better(side, target, best) {
                let chase = ChaseOrderController::new(self.primary.clone(), &self.config);
                return chase.run(&spec.symbol, side, target, amount, margin).await;
            }
        }

        let request = OrderRequest {
            symbol: spec.symbol.clone(),
            side,
            kind: spec.kind,
            amount,
            price: (spec.kind == OrderKind::Limit).then_some(best),
            margin,
        };
        match self.primary.place_order(&request).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(symbol = %spec.symbol, error = %e, "slice placement failed");
                None
            }
        }
    }

    /// A target price the trader would prefer over the current best.
    fn strictly_better(side: OrderSide, target: Decimal, best: Decimal) -> bool {
        match side {
            OrderSide::Buy => target < best,
            OrderSide::Sell => target > best,
        }
    }

    /// Margin parameters for a primary-leg close order, with reduce-only
    /// intent where the venue accepts the flag.
    fn closing_margin(&self, leverage: u8) -> MarginParams {
        let margin = MarginParams::isolated(leverage);
        if self.primary.profile().supports_reduce_only {
            margin.reduce_only()
        } else {
            margin
        }
    }

    /// Poll an order to a terminal state within the timeout; cancel on
    /// timeout. The returned handle carries any partial fill observed.
    /// Transient status failures keep polling until the deadline; a permanent
    /// failure cannot resolve, so the order is canceled and `None` returned.
    async fn settle_slice(&self, handle: OrderHandle, symbol: &str) -> Option<OrderHandle> {
        if handle.state.is_terminal() {
            return Some(handle);
        }
        let deadline = Instant::now() + self.config.order_timeout();
        loop {
            sleep(self.config.status_poll_interval()).await;
            match self.primary.order_status(&handle.id, symbol).await {
                Ok(status) if status.state.is_terminal() => return Some(status),
                Ok(status) => {
                    if Instant::now() >= deadline {
                        info!(
                            order_id = %handle.id,
                            filled = %status.filled,
                            "order not filled within timeout, canceling"
                        );
                        if let Err(e) = self.primary.cancel_order(&handle.id, symbol).await {
                            // Cancellation errors are logged, not fatal.
                            warn!(order_id = %handle.id, error = %e, "cancel failed");
                        }
                        return Some(status);
                    }
                }
                Err(e) if e.is_retryable() && Instant::now() < deadline => {
                    warn!(order_id = %handle.id, error = %e, "status poll failed, retrying");
                }
                Err(e) => {
                    warn!(order_id = %handle.id, error = %e, "status poll failed, canceling order");
                    if let Err(cancel_err) = self.primary.cancel_order(&handle.id, symbol).await {
                        warn!(order_id = %handle.id, error = %cancel_err, "cancel after failed poll also failed");
                    }
                    return None;
                }
            }
        }
    }

    /// Mirror a confirmed primary fill on the secondary venue with a market
    /// order. Returns the unhedged amount on failure; hedges are not retried
    /// blindly since that compounds unhedged exposure.
    async fn dispatch_hedge(
        &self,
        spec: &TradeLegSpec,
        side: OrderSide,
        amount: Decimal,
        reduce_only: bool,
    ) -> Result<(), Decimal> {
        let mut margin = MarginParams::isolated(spec.leverage);
        if reduce_only && self.secondary.profile().supports_reduce_only {
            margin = margin.reduce_only();
        }
        let request = OrderRequest {
            symbol: spec.symbol.clone(),
            side,
            kind: OrderKind::Market,
            amount,
            price: None,
            margin,
        };
        match self.secondary.place_order(&request).await {
            Ok(handle) => {
                info!(
                    venue = self.secondary.venue().short_code(),
                    order_id = %handle.id,
                    %amount,
                    side = ?side,
                    "hedge leg dispatched"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    venue = self.secondary.venue().short_code(),
                    %amount,
                    error = %e,
                    "hedge leg failed: primary fill is UNHEDGED, manual intervention required"
                );
                Err(amount)
            }
        }
    }

    /// One market order per leg for the whole remaining amount, regardless of
    /// price. Returns the unhedged amount if the secondary leg failed.
    async fn force_close(
        &mut self,
        primary_spec: &TradeLegSpec,
        secondary_spec: &TradeLegSpec,
        close_side: OrderSide,
        position: &mut Position,
    ) -> Decimal {
        let amount = position.remaining_amount;
        let margin = self.closing_margin(position.leverage);
        let request = OrderRequest {
            symbol: primary_spec.symbol.clone(),
            side: close_side,
            kind: OrderKind::Market,
            amount,
            price: None,
            margin,
        };

        match self.primary.place_order(&request).await {
            Ok(handle) => {
                if self.registry.mark(self.primary.venue(), &handle.id) && handle.filled > Decimal::ZERO
                {
                    let price = handle.avg_price.unwrap_or(Decimal::ZERO);
                    position.apply_fill(handle.filled, price);
                }
            }
            Err(e) => {
                error!(
                    symbol = %primary_spec.symbol,
                    error = %e,
                    "force close failed on the primary leg"
                );
            }
        }

        match self
            .dispatch_hedge(secondary_spec, close_side.opposite(), amount, true)
            .await
        {
            Ok(()) => Decimal::ZERO,
            Err(unhedged) => unhedged,
        }
    }

    /// Retry the margin-mode + leverage call a bounded number of times.
    async fn configure_margin(&self, symbol: &str, leverage: u8) -> bool {
        for attempt in 1..=self.config.margin_config_retries {
            match self
                .primary
                .set_leverage_and_margin(symbol, leverage, MarginMode::Isolated)
                .await
            {
                Ok(()) => {
                    info!(%symbol, leverage, "isolated margin configured");
                    return true;
                }
                Err(e) => {
                    warn!(
                        %symbol,
                        attempt,
                        max = self.config.margin_config_retries,
                        error = %e,
                        "margin configuration failed"
                    );
                    if attempt < self.config.margin_config_retries {
                        sleep(self.config.retry_delay()).await;
                    }
                }
            }
        }
        false
    }

    /// Live position, retried through transient errors a bounded number of
    /// times. `Err` means the position state could not be determined at all.
    async fn query_live_position(&self, symbol: &str) -> Result<Option<LivePosition>, ()> {
        for attempt in 1..=self.config.margin_config_retries {
            match self.primary.live_position(symbol).await {
                Ok(live) => return Ok(live),
                Err(e) => {
                    warn!(%symbol, attempt, error = %e, "live position query failed");
                    sleep(self.config.retry_delay()).await;
                }
            }
        }
        Err(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MockGateway, PositionSide, VenueId};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    const SYMBOL: &str = "DOGE/USDT:USDT";

    /// Oracle with a scripted sequence of readings; the last repeats.
    struct ScriptedOracle {
        readings: Mutex<VecDeque<SignalReading>>,
    }

    impl ScriptedOracle {
        fn always(reading: SignalReading) -> Self {
            Self {
                readings: Mutex::new(VecDeque::from([reading])),
            }
        }
    }

    #[async_trait]
    impl SignalOracle for ScriptedOracle {
        async fn evaluate(&self) -> SignalReading {
            let mut readings = self.readings.lock().await;
            if readings.len() > 1 {
                readings.pop_front().expect("non-empty")
            } else {
                *readings.front().expect("non-empty")
            }
        }
    }

    fn fast_config() -> ExecutionConfig {
        ExecutionConfig {
            retry_delay_ms: 1,
            status_poll_interval_ms: 1,
            order_timeout_ms: 5,
            failure_cooldown_secs: 0,
            chase_poll_interval_ms: 1,
            chase_max_attempts: 3,
            ..ExecutionConfig::default()
        }
    }

    fn leg(venue: VenueId, side: OrderSide, amount: Decimal) -> TradeLegSpec {
        TradeLegSpec {
            venue,
            side,
            symbol: SYMBOL.to_string(),
            kind: OrderKind::Limit,
            amount,
            target_price: None,
            leverage: 3,
        }
    }

    async fn venues() -> (Arc<MockGateway>, Arc<MockGateway>) {
        let primary = Arc::new(MockGateway::with_market(VenueId::Bitget, dec!(1), dec!(40)).await);
        primary.set_fill_after_polls(0).await;
        let secondary = Arc::new(MockGateway::with_market(VenueId::Bybit, dec!(1), dec!(40)).await);
        (primary, secondary)
    }

    fn executor(primary: &Arc<MockGateway>, secondary: &Arc<MockGateway>) -> PositionExecutor {
        PositionExecutor::new(primary.clone(), secondary.clone(), fast_config())
    }

    #[tokio::test]
    async fn test_open_slices_and_hedges_every_fill() {
        let (primary, secondary) = venues().await;
        let mut executor = executor(&primary, &secondary);

        // price 1, volume 40 -> 20-unit slices; 100 units = 5 slices.
        let report = executor
            .open(
                &leg(VenueId::Bitget, OrderSide::Buy, dec!(100)),
                &leg(VenueId::Bybit, OrderSide::Sell, dec!(100)),
            )
            .await;

        assert!(report.has_filled_order);
        assert_eq!(report.filled_amount, dec!(100));
        assert_eq!(report.remaining_amount, Decimal::ZERO);
        assert_eq!(report.unhedged_amount, Decimal::ZERO);
        assert_eq!(executor.state(), ExecutorState::Open);

        let hedges = secondary.placed_orders().await;
        assert_eq!(hedges.len(), 5);
        for hedge in &hedges {
            // Hedge mirrors the filled amount with the opposite side.
            assert_eq!(hedge.amount, dec!(20));
            assert_eq!(hedge.side, OrderSide::Sell);
            assert_eq!(hedge.kind, OrderKind::Market);
        }

        // Isolated margin was configured before the first order.
        let margin_calls = primary.margin_calls().await;
        assert_eq!(margin_calls.len(), 1);
        assert_eq!(margin_calls[0].2, MarginMode::Isolated);
    }

    #[tokio::test]
    async fn test_open_aborts_when_margin_unconfirmed() {
        let (primary, secondary) = venues().await;
        primary.set_fail_margin_config(true).await;
        let mut executor = executor(&primary, &secondary);

        let report = executor
            .open(
                &leg(VenueId::Bitget, OrderSide::Buy, dec!(100)),
                &leg(VenueId::Bybit, OrderSide::Sell, dec!(100)),
            )
            .await;

        assert!(report.aborted);
        assert!(!report.has_filled_order);
        assert_eq!(executor.state(), ExecutorState::Aborted);
        // Failing closed: not a single order went out.
        assert!(primary.placed_orders().await.is_empty());
        assert!(secondary.placed_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_cancels_and_skips_hedge() {
        let (primary, secondary) = venues().await;
        primary.never_fill().await;
        let mut executor = executor(&primary, &secondary);

        // The loop keeps repricing forever without fills; a short deadline is
        // enough to observe the cancel-without-hedge behavior.
        let _ = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            executor.open(
                &leg(VenueId::Bitget, OrderSide::Buy, dec!(20)),
                &leg(VenueId::Bybit, OrderSide::Sell, dec!(20)),
            ),
        )
        .await;

        assert!(!primary.canceled_ids().await.is_empty());
        assert!(secondary.placed_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_price_fetch_failures_degrade_but_do_not_abort() {
        let (primary, secondary) = venues().await;
        primary.fail_next_price_fetches(3).await;
        let mut executor = executor(&primary, &secondary);

        let report = executor
            .open(
                &leg(VenueId::Bitget, OrderSide::Buy, dec!(20)),
                &leg(VenueId::Bybit, OrderSide::Sell, dec!(20)),
            )
            .await;

        // Three straight failures cross the cooldown threshold, then the
        // loop resumes and completes.
        assert!(report.has_filled_order);
        assert_eq!(report.remaining_amount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_transient_status_failure_keeps_polling() {
        let (primary, secondary) = venues().await;
        primary.set_fill_after_polls(2).await;
        primary.fail_next_status_polls(1).await;
        let mut config = fast_config();
        config.order_timeout_ms = 50;
        let mut executor = PositionExecutor::new(primary.clone(), secondary.clone(), config);

        let report = executor
            .open(
                &leg(VenueId::Bitget, OrderSide::Buy, dec!(20)),
                &leg(VenueId::Bybit, OrderSide::Sell, dec!(20)),
            )
            .await;

        // The transient poll failure is retried within the timeout; the
        // order is never canceled and the slice still fills.
        assert!(report.has_filled_order);
        assert!(primary.canceled_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_fills_hedge_exactly_what_filled() {
        let (primary, secondary) = venues().await;
        primary.set_fill_fraction(dec!(0.5)).await;
        let mut executor = executor(&primary, &secondary);

        let report = executor
            .open(
                &leg(VenueId::Bitget, OrderSide::Buy, dec!(20)),
                &leg(VenueId::Bybit, OrderSide::Sell, dec!(20)),
            )
            .await;

        assert_eq!(report.filled_amount, dec!(20));
        let primary_fills: Vec<Decimal> = primary
            .placed_orders()
            .await
            .iter()
            .map(|o| o.amount)
            .collect();
        let hedge_amounts: Vec<Decimal> = secondary
            .placed_orders()
            .await
            .iter()
            .map(|o| o.amount)
            .collect();
        // 20-unit slice half-fills to 10; then 10 -> 5, 10 -> 5.
        assert_eq!(hedge_amounts, vec![dec!(10), dec!(5), dec!(5)]);
        // Hedges mirror fills, not requested slice sizes.
        assert_ne!(primary_fills, hedge_amounts);
    }

    #[tokio::test]
    async fn test_hedge_failure_is_surfaced_not_retried() {
        let (primary, secondary) = venues().await;
        secondary.set_fail_placement(true).await;
        let mut executor = executor(&primary, &secondary);

        let report = executor
            .open(
                &leg(VenueId::Bitget, OrderSide::Buy, dec!(20)),
                &leg(VenueId::Bybit, OrderSide::Sell, dec!(20)),
            )
            .await;

        assert!(report.has_filled_order);
        assert_eq!(report.unhedged_amount, dec!(20));
        // Exactly one hedge attempt per fill; no blind retries.
        assert_eq!(secondary.placement_attempts().await, 1);
    }

    #[tokio::test]
    async fn test_close_side_comes_from_live_position() {
        let (primary, secondary) = venues().await;
        // The open request said Buy, but the venue reports a short position:
        // the unwind must buy it back.
        primary
            .set_position(Some(LivePosition {
                side: PositionSide::Short,
                size: dec!(30),
                margin_mode: MarginMode::Isolated,
                leverage: 3,
            }))
            .await;
        let mut executor = executor(&primary, &secondary);
        let oracle = ScriptedOracle::always(SignalReading::BeginClose);

        let report = executor
            .close(
                &leg(VenueId::Bitget, OrderSide::Buy, dec!(30)),
                &leg(VenueId::Bybit, OrderSide::Sell, dec!(30)),
                &oracle,
            )
            .await;

        assert_eq!(report.remaining_amount, Decimal::ZERO);
        assert_eq!(report.closed_amount, dec!(30));
        assert!(!report.aborted_by_signal);
        assert_eq!(executor.state(), ExecutorState::Closed);

        let closes = primary.placed_orders().await;
        assert!(!closes.is_empty());
        for order in &closes {
            assert_eq!(order.side, OrderSide::Buy);
            // Every close order carries reduce-only intent.
            assert!(order.margin.reduce_only);
        }
        // Hedge unwinds mirror with the opposite side.
        for hedge in secondary.placed_orders().await {
            assert_eq!(hedge.side, OrderSide::Sell);
            assert!(hedge.margin.reduce_only);
        }
    }

    #[tokio::test]
    async fn test_abort_close_places_no_orders() {
        let (primary, secondary) = venues().await;
        primary
            .set_position(Some(LivePosition {
                side: PositionSide::Long,
                size: dec!(30),
                margin_mode: MarginMode::Isolated,
                leverage: 3,
            }))
            .await;
        let mut executor = executor(&primary, &secondary);
        let oracle = ScriptedOracle::always(SignalReading::AbortClose);

        let report = executor
            .close(
                &leg(VenueId::Bitget, OrderSide::Buy, dec!(30)),
                &leg(VenueId::Bybit, OrderSide::Sell, dec!(30)),
                &oracle,
            )
            .await;

        assert!(report.aborted_by_signal);
        assert_eq!(report.remaining_amount, dec!(30));
        assert!(primary.placed_orders().await.is_empty());
        assert!(secondary.placed_orders().await.is_empty());
        // The position still exists.
        assert_eq!(executor.state(), ExecutorState::Open);
    }

    #[tokio::test]
    async fn test_close_ceiling_forces_market_orders_on_both_legs() {
        let (primary, secondary) = venues().await;
        primary
            .set_position(Some(LivePosition {
                side: PositionSide::Long,
                size: dec!(30),
                margin_mode: MarginMode::Isolated,
                leverage: 3,
            }))
            .await;
        let mut config = fast_config();
        config.close_ceiling_secs = 0; // the deadline has already passed
        let mut executor = PositionExecutor::new(primary.clone(), secondary.clone(), config);
        let oracle = ScriptedOracle::always(SignalReading::BeginClose);

        let report = executor
            .close(
                &leg(VenueId::Bitget, OrderSide::Buy, dec!(30)),
                &leg(VenueId::Bybit, OrderSide::Sell, dec!(30)),
                &oracle,
            )
            .await;

        assert!(report.force_closed);
        assert_eq!(report.remaining_amount, Decimal::ZERO);

        let primary_orders = primary.placed_orders().await;
        let secondary_orders = secondary.placed_orders().await;
        assert_eq!(primary_orders.len(), 1);
        assert_eq!(secondary_orders.len(), 1);
        assert_eq!(primary_orders[0].kind, OrderKind::Market);
        assert_eq!(primary_orders[0].amount, dec!(30));
        assert!(primary_orders[0].margin.reduce_only);
        assert_eq!(secondary_orders[0].kind, OrderKind::Market);
        assert_eq!(secondary_orders[0].amount, dec!(30));
    }

    #[tokio::test]
    async fn test_close_with_no_live_position_is_a_no_op() {
        let (primary, secondary) = venues().await;
        let mut executor = executor(&primary, &secondary);
        let oracle = ScriptedOracle::always(SignalReading::BeginClose);

        let report = executor
            .close(
                &leg(VenueId::Bitget, OrderSide::Buy, dec!(30)),
                &leg(VenueId::Bybit, OrderSide::Sell, dec!(30)),
                &oracle,
            )
            .await;

        assert_eq!(report.closed_amount, Decimal::ZERO);
        assert!(primary.placed_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_open_uses_chase_when_target_is_better_than_best() {
        let (primary, secondary) = venues().await;
        let mut executor = executor(&primary, &secondary);

        // Buy with a target below the current best: the slice goes through
        // the chase controller, which pins at the best price.
        let mut spec = leg(VenueId::Bitget, OrderSide::Buy, dec!(20));
        spec.target_price = Some(dec!(0.95));

        let report = executor
            .open(&spec, &leg(VenueId::Bybit, OrderSide::Sell, dec!(20)))
            .await;

        assert!(report.has_filled_order);
        let placed = primary.placed_orders().await;
        assert_eq!(placed[0].price, Some(dec!(1)));
    }
}
