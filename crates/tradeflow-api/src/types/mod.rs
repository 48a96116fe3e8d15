//! Data types and models for TradeFlow API payloads.

mod common;
mod market;
mod orderflow;
mod websocket;

pub use common::*;
pub use market::*;
pub use orderflow::*;
pub use websocket::*;
