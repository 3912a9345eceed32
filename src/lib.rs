//! # Cross-Venue Executor
//!
//! Executes cross-venue arbitrage positions: opens a position on a primary
//! venue in price-aware slices, mirrors every confirmed fill as an immediate
//! hedge on a secondary venue, and unwinds both legs when the signal turns.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `gateway`: Venue capability layer (REST gateway, mock venue, profiles)
//! - `engine`: Position executor, slice sizing, chase orders, signals
//! - `utils`: Shared decimal arithmetic

pub mod config;
pub mod engine;
pub mod gateway;
pub mod utils;

pub use config::Config;
