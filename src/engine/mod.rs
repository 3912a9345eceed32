//! Position execution engine.
//!
//! Contains the core logic for:
//! - Slice sizing against visible liquidity and venue minimums
//! - Chase-limit-order pricing toward a target
//! - The open/close state machine with fill reconciliation
//! - Hedge dispatch on the secondary venue
//! - Signal-driven unwinding

mod chase;
mod executor;
mod position;
mod signal;
mod sizer;

pub use chase::ChaseOrderController;
pub use executor::{CloseReport, ExecutorState, OpenReport, PositionExecutor};
pub use position::{Position, ProcessedOrderRegistry, TradeLegSpec};
pub use signal::{PremiumOracle, SignalOracle, SignalReading};
pub use sizer::SliceSizer;
