//! Signed REST gateway.
//!
//! One long-lived HTTP client per venue, authenticated with HMAC-SHA256
//! request signing. Venue quirks (symbol format, status-query path, margin
//! parameter names) come from the `VenueProfile`, never from probing.

use hmac::{Hmac, Mac};
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

use super::error::{GatewayError, GatewayResult};
use super::profile::{StatusQuery, VenueId, VenueProfile};
use super::traits::ExchangeGateway;
use super::types::{
    LivePosition, MarginMode, OrderHandle, OrderKind, OrderRequest, OrderSide, OrderState,
    PositionSide,
};
use crate::config::VenueConfig;
use async_trait::async_trait;

/// REST-backed venue gateway.
pub struct RestGateway {
    http: Client,
    venue: VenueId,
    profile: VenueProfile,
    api_key: String,
    secret_key: String,
    passphrase: Option<String>,
    base_url: String,
}

impl RestGateway {
    /// Create a gateway from venue configuration.
    pub fn new(venue: VenueId, config: &VenueConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            venue,
            profile: VenueProfile::for_venue(venue),
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            passphrase: config.passphrase.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Generate HMAC-SHA256 signature for authenticated requests.
    fn sign(&self, query_string: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Current timestamp in milliseconds.
    fn timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis() as u64
    }

    fn signed_url(&self, path: &str, params: &[(String, String)]) -> String {
        let mut params = params.to_vec();
        params.push(("timestamp".to_string(), Self::timestamp().to_string()));
        let query_string: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let signature = self.sign(&query_string);
        format!("{}{}?{}&signature={}", self.base_url, path, query_string, signature)
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("X-API-KEY", &self.api_key);
        match &self.passphrase {
            Some(passphrase) => request.header("X-PASSPHRASE", passphrase),
            None => request,
        }
    }

    /// Classify a non-success response into the gateway error taxonomy.
    async fn check(response: Response) -> GatewayResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(GatewayError::Transient(format!("{status}: {body}")))
        } else {
            Err(GatewayError::Permanent(format!("{status}: {body}")))
        }
    }

    async fn fetch_book(&self, symbol: &str) -> GatewayResult<WireOrderBook> {
        let native = self.profile.format_symbol(symbol);
        let url = format!("{}/api/v1/market/book?symbol={}", self.base_url, native);
        let response = Self::check(self.http.get(&url).send().await?).await?;
        let book: WireOrderBook = response
            .json()
            .await
            .map_err(|e| GatewayError::Transient(format!("bad book payload: {e}")))?;
        if book.bids.is_empty() || book.asks.is_empty() {
            return Err(GatewayError::NoMarketData {
                symbol: symbol.to_string(),
            });
        }
        Ok(book)
    }

    /// Margin parameters in this venue's spelling.
    fn margin_params(&self, request: &OrderRequest) -> Vec<(String, String)> {
        let mode = match request.margin.mode {
            MarginMode::Isolated => "isolated",
            MarginMode::Cross => "cross",
        };
        let mut params = vec![
            ("marginMode".to_string(), mode.to_string()),
            ("leverage".to_string(), request.margin.leverage.to_string()),
        ];
        if self.profile.requires_margin_coin {
            params.push(("marginCoin".to_string(), "USDT".to_string()));
        }
        if self.profile.per_side_leverage {
            params.push(("buyLeverage".to_string(), request.margin.leverage.to_string()));
            params.push(("sellLeverage".to_string(), request.margin.leverage.to_string()));
        }
        if request.margin.reduce_only && self.profile.supports_reduce_only {
            params.push(("reduceOnly".to_string(), "true".to_string()));
        }
        params
    }

    async fn fetch_order(&self, path: &str, id: &str, symbol: &str) -> GatewayResult<Response> {
        let native = self.profile.format_symbol(symbol);
        let params = vec![
            ("orderId".to_string(), id.to_string()),
            ("symbol".to_string(), native),
        ];
        let url = self.signed_url(path, &params);
        Self::check(self.auth(self.http.get(&url)).send().await?).await
    }
}

#[async_trait]
impl ExchangeGateway for RestGateway {
    fn venue(&self) -> VenueId {
        self.venue
    }

    fn profile(&self) -> &VenueProfile {
        &self.profile
    }

    #[instrument(skip(self))]
    async fn best_price(&self, symbol: &str, side: OrderSide) -> GatewayResult<Decimal> {
        let book = self.fetch_book(symbol).await?;
        let (price, _) = match side {
            OrderSide::Buy => book.bids[0],
            OrderSide::Sell => book.asks[0],
        };
        debug!(%symbol, ?side, %price, "best price");
        Ok(price)
    }

    #[instrument(skip(self))]
    async fn top_of_book_volume(&self, symbol: &str, side: OrderSide) -> GatewayResult<Decimal> {
        let book = self.fetch_book(symbol).await?;
        let (_, volume) = match side {
            OrderSide::Buy => book.bids[0],
            OrderSide::Sell => book.asks[0],
        };
        Ok(volume)
    }

    #[instrument(skip(self, request), fields(symbol = %request.symbol, side = ?request.side, amount = %request.amount))]
    async fn place_order(&self, request: &OrderRequest) -> GatewayResult<OrderHandle> {
        let native = self.profile.format_symbol(&request.symbol);
        let kind = match request.kind {
            OrderKind::Limit => "limit",
            OrderKind::Market => "market",
        };

        let mut params = vec![
            ("symbol".to_string(), native),
            ("side".to_string(), request.side.as_str().to_string()),
            ("type".to_string(), kind.to_string()),
            ("quantity".to_string(), request.amount.to_string()),
        ];
        if request.kind == OrderKind::Limit {
            let price = request.price.ok_or_else(|| {
                GatewayError::Permanent("limit order without a price".to_string())
            })?;
            params.push(("price".to_string(), price.to_string()));
        }
        params.extend(self.margin_params(request));

        let url = self.signed_url("/api/v1/trade/order", &params);
        let response = Self::check(self.auth(self.http.post(&url)).send().await?).await?;
        let wire: WireOrder = response
            .json()
            .await
            .map_err(|e| GatewayError::Transient(format!("bad order payload: {e}")))?;

        debug!(order_id = %wire.order_id, "order placed");
        Ok(wire.into_handle(&request.symbol))
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, id: &str, symbol: &str) -> GatewayResult<()> {
        let native = self.profile.format_symbol(symbol);
        let params = vec![
            ("orderId".to_string(), id.to_string()),
            ("symbol".to_string(), native),
        ];
        let url = self.signed_url("/api/v1/trade/order", &params);
        Self::check(self.auth(self.http.delete(&url)).send().await?).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn order_status(&self, id: &str, symbol: &str) -> GatewayResult<OrderHandle> {
        let response = match self.profile.status_query {
            StatusQuery::Unified => self.fetch_order("/api/v1/trade/order", id, symbol).await?,
            StatusQuery::SplitOpenClosed => {
                // Resting orders answer on the open endpoint; once gone from
                // there the order has reached the closed endpoint.
                match self.fetch_order("/api/v1/trade/openOrder", id, symbol).await {
                    Ok(response) => response,
                    Err(GatewayError::Permanent(_)) => {
                        self.fetch_order("/api/v1/trade/closedOrder", id, symbol).await?
                    }
                    Err(other) => return Err(other),
                }
            }
        };

        let wire: WireOrder = response
            .json()
            .await
            .map_err(|e| GatewayError::Transient(format!("bad status payload: {e}")))?;
        Ok(wire.into_handle(symbol))
    }

    #[instrument(skip(self))]
    async fn live_position(&self, symbol: &str) -> GatewayResult<Option<LivePosition>> {
        let native = self.profile.format_symbol(symbol);
        let params = vec![("symbol".to_string(), native)];
        let url = self.signed_url("/api/v1/account/position", &params);
        let response = Self::check(self.auth(self.http.get(&url)).send().await?).await?;
        let wire: WirePosition = response
            .json()
            .await
            .map_err(|e| GatewayError::Transient(format!("bad position payload: {e}")))?;
        Ok(wire.into_live())
    }

    #[instrument(skip(self))]
    async fn set_leverage_and_margin(
        &self,
        symbol: &str,
        leverage: u8,
        mode: MarginMode,
    ) -> GatewayResult<()> {
        let native = self.profile.format_symbol(symbol);
        let mode_str = match mode {
            MarginMode::Isolated => "isolated",
            MarginMode::Cross => "cross",
        };
        let mut params = vec![
            ("symbol".to_string(), native),
            ("leverage".to_string(), leverage.to_string()),
            ("marginMode".to_string(), mode_str.to_string()),
        ];
        if self.profile.requires_margin_coin {
            params.push(("marginCoin".to_string(), "USDT".to_string()));
        }
        let url = self.signed_url("/api/v1/account/leverage", &params);
        Self::check(self.auth(self.http.post(&url)).send().await?).await?;
        Ok(())
    }
}

// ==================== Wire types ====================

#[derive(Debug, Deserialize)]
struct WireOrderBook {
    bids: Vec<(Decimal, Decimal)>,
    asks: Vec<(Decimal, Decimal)>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOrder {
    order_id: String,
    status: String,
    side: String,
    #[serde(with = "rust_decimal::serde::str")]
    orig_qty: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    executed_qty: Decimal,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    avg_price: Option<Decimal>,
}

impl WireOrder {
    fn into_handle(self, symbol: &str) -> OrderHandle {
        let state = match self.status.as_str() {
            "filled" | "closed" => OrderState::Closed,
            "canceled" | "expired" => OrderState::Canceled,
            _ => OrderState::Open,
        };
        let side = match self.side.as_str() {
            "sell" => OrderSide::Sell,
            _ => OrderSide::Buy,
        };
        OrderHandle {
            id: self.order_id,
            symbol: symbol.to_string(),
            side,
            state,
            amount: self.orig_qty,
            filled: self.executed_qty,
            avg_price: self.avg_price.filter(|p| *p > Decimal::ZERO),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePosition {
    side: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    size: Decimal,
    margin_mode: Option<String>,
    leverage: Option<u8>,
}

impl WirePosition {
    fn into_live(self) -> Option<LivePosition> {
        if self.size <= Decimal::ZERO {
            return None;
        }
        let side = match self.side.as_deref() {
            Some("long") => PositionSide::Long,
            Some("short") => PositionSide::Short,
            _ => return None,
        };
        let margin_mode = match self.margin_mode.as_deref() {
            Some("cross") => MarginMode::Cross,
            _ => MarginMode::Isolated,
        };
        Some(LivePosition {
            side,
            size: self.size,
            margin_mode,
            leverage: self.leverage.unwrap_or(1),
        })
    }
}
