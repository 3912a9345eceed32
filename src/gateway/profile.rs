//! Static per-venue quirks.
//!
//! Venues differ in symbol formats, in which order-status query actually
//! works, and in which margin parameters an order must carry. Instead of
//! probing capabilities by catching failed calls, every gateway consults its
//! `VenueProfile` before choosing a call path.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Venue identifier for multi-venue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueId {
    Binance,
    Bybit,
    Bitget,
    GateIo,
    Hyperliquid,
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VenueId::Binance => write!(f, "Binance"),
            VenueId::Bybit => write!(f, "Bybit"),
            VenueId::Bitget => write!(f, "Bitget"),
            VenueId::GateIo => write!(f, "GateIo"),
            VenueId::Hyperliquid => write!(f, "Hyperliquid"),
        }
    }
}

impl FromStr for VenueId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(VenueId::Binance),
            "bybit" => Ok(VenueId::Bybit),
            "bitget" => Ok(VenueId::Bitget),
            "gateio" => Ok(VenueId::GateIo),
            "hyperliquid" => Ok(VenueId::Hyperliquid),
            other => Err(format!("unknown venue: {other}")),
        }
    }
}

impl VenueId {
    /// Short code for display (2-3 chars).
    pub fn short_code(&self) -> &'static str {
        match self {
            VenueId::Binance => "BN",
            VenueId::Bybit => "BB",
            VenueId::Bitget => "BG",
            VenueId::GateIo => "GT",
            VenueId::Hyperliquid => "HL",
        }
    }
}

/// Which order-status query the venue supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusQuery {
    /// One unified endpoint answers for open and closed orders alike.
    Unified,
    /// Open and closed orders live behind separate endpoints; query open
    /// first, then closed.
    SplitOpenClosed,
}

/// How the venue spells a perpetual symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolStyle {
    /// Base and quote concatenated: "DOGE/USDT:USDT" -> "DOGEUSDT".
    BaseQuote,
    /// Base asset only: "DOGE/USDT:USDT" -> "DOGE".
    BaseOnly,
}

/// Static capability table for one venue.
#[derive(Debug, Clone)]
pub struct VenueProfile {
    pub venue: VenueId,
    pub status_query: StatusQuery,
    pub symbol_style: SymbolStyle,
    /// Whether orders must name the settlement coin ("marginCoin").
    pub requires_margin_coin: bool,
    /// Whether leverage must be re-sent per side ("buy_leverage"/"sell_leverage").
    pub per_side_leverage: bool,
    /// Whether the venue accepts a reduce-only flag on close orders.
    pub supports_reduce_only: bool,
}

impl VenueProfile {
    /// The capability table. New venues get a row here, not a try/except.
    pub fn for_venue(venue: VenueId) -> Self {
        match venue {
            VenueId::Bitget => Self {
                venue,
                status_query: StatusQuery::Unified,
                symbol_style: SymbolStyle::BaseQuote,
                requires_margin_coin: true,
                per_side_leverage: false,
                supports_reduce_only: true,
            },
            VenueId::Bybit => Self {
                venue,
                status_query: StatusQuery::SplitOpenClosed,
                symbol_style: SymbolStyle::BaseQuote,
                requires_margin_coin: false,
                per_side_leverage: true,
                supports_reduce_only: true,
            },
            VenueId::Binance | VenueId::GateIo => Self {
                venue,
                status_query: StatusQuery::SplitOpenClosed,
                symbol_style: SymbolStyle::BaseQuote,
                requires_margin_coin: false,
                per_side_leverage: false,
                supports_reduce_only: true,
            },
            VenueId::Hyperliquid => Self {
                venue,
                status_query: StatusQuery::Unified,
                symbol_style: SymbolStyle::BaseOnly,
                requires_margin_coin: false,
                per_side_leverage: false,
                supports_reduce_only: true,
            },
        }
    }

    /// Convert a unified symbol ("DOGE/USDT:USDT") to the venue's native form.
    ///
    /// Already-native symbols pass through unchanged.
    pub fn format_symbol(&self, unified: &str) -> String {
        let spot_part = unified.split(':').next().unwrap_or(unified);
        match self.symbol_style {
            SymbolStyle::BaseQuote => spot_part.replace('/', ""),
            SymbolStyle::BaseOnly => spot_part
                .split('/')
                .next()
                .unwrap_or(spot_part)
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_parse_and_display() {
        assert_eq!("bitget".parse::<VenueId>().unwrap(), VenueId::Bitget);
        assert_eq!("Bybit".parse::<VenueId>().unwrap(), VenueId::Bybit);
        assert!("kraken".parse::<VenueId>().is_err());
        assert_eq!(VenueId::Bitget.to_string(), "Bitget");
        assert_eq!(VenueId::Hyperliquid.short_code(), "HL");
    }

    #[test]
    fn test_symbol_formatting() {
        let bitget = VenueProfile::for_venue(VenueId::Bitget);
        assert_eq!(bitget.format_symbol("DOGE/USDT:USDT"), "DOGEUSDT");
        assert_eq!(bitget.format_symbol("DOGEUSDT"), "DOGEUSDT");

        let hl = VenueProfile::for_venue(VenueId::Hyperliquid);
        assert_eq!(hl.format_symbol("DOGE/USDT:USDT"), "DOGE");
    }

    #[test]
    fn test_status_query_selection() {
        // Bitget exposes only the unified query; Bybit splits open/closed.
        assert_eq!(
            VenueProfile::for_venue(VenueId::Bitget).status_query,
            StatusQuery::Unified
        );
        assert_eq!(
            VenueProfile::for_venue(VenueId::Bybit).status_query,
            StatusQuery::SplitOpenClosed
        );
    }
}
