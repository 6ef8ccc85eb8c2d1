//! Parallel bookkeeping: communication backends and the size exchange.

pub mod communicator;
pub mod size_exchange;
pub mod wire;
