//! Error taxonomy for venue gateway calls.
//!
//! Every gateway operation fails in one of three ways, and the executor's
//! retry behavior depends on which:
//! - `Transient`: network, auth, or rate-limit trouble; the same call may
//!   succeed if retried.
//! - `Permanent`: the venue rejected the request itself; retrying cannot help.
//! - `NoMarketData`: the venue answered but the order book was empty or
//!   unusable; the current iteration is skipped.

use thiserror::Error;

/// Classified failure from a venue gateway call.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Retryable: network, auth, rate limit, venue-side 5xx.
    #[error("transient venue error: {0}")]
    Transient(String),

    /// Not retryable: the venue rejected the request parameters.
    #[error("permanent venue error: {0}")]
    Permanent(String),

    /// The venue returned no usable order book for the symbol.
    #[error("no usable market data for {symbol}")]
    NoMarketData { symbol: String },
}

impl GatewayError {
    /// Whether the same call may succeed if repeated. Permanent rejections
    /// must not be retried inside the poll/cancel helpers.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GatewayError::Permanent(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        // Request never produced a usable venue response: retryable.
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return GatewayError::Transient(err.to_string());
        }
        match err.status() {
            Some(status) if status.is_client_error() => {
                GatewayError::Permanent(err.to_string())
            }
            _ => GatewayError::Transient(err.to_string()),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_is_not_retryable() {
        assert!(!GatewayError::Permanent("bad symbol".into()).is_retryable());
        assert!(GatewayError::Transient("timeout".into()).is_retryable());
        assert!(GatewayError::NoMarketData {
            symbol: "DOGEUSDT".into()
        }
        .is_retryable());
    }
}
