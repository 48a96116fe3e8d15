//! # TradeFlow API Client Library
//!
//! Client for the TradeFlow market-data backend.
//!
//! ## Features
//!
//! - **Market data**: historical bars and the latest bar for poll fallback
//! - **Order flow**: cumulative delta, footprint, imbalances, volume profile
//! - **Streaming**: one WebSocket connection lifecycle with typed messages
//!
//! Reconnection is deliberately not handled here; the caller owns retry
//! policy and drives [`StreamSocket`] through connect/close cycles.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tradeflow_api::{TradeflowClient, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tradeflow_api::Error> {
//!     let client = TradeflowClient::new(Config::default())?;
//!     let bars = client.bars("XAUUSD", "1m", 500).await?;
//!     println!("loaded {} bars", bars.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Streaming
//!
//! ```rust,ignore
//! use tradeflow_api::{ClientMessage, StreamEvent, StreamSocket, WsConfig};
//!
//! let mut socket = StreamSocket::new(WsConfig::default());
//! let mut rx = socket.connect().await?;
//! socket.send(ClientMessage::subscribe(["XAUUSD"])).await?;
//!
//! while let Some(event) = rx.recv().await {
//!     if let StreamEvent::Message(msg) = event {
//!         println!("{msg:?}");
//!     }
//! }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod types;
pub mod websocket;

pub use client::TradeflowClient;
pub use config::{Config, WsConfig};
pub use error::{ApiError, Error, Result};
pub use types::{
    BarRecord, ClientMessage, CvdRecord, FootprintRecord, ImbalanceRecord, PriceLevelRecord,
    ServerMessage, VolumeProfileRecord, WireTime,
};
pub use websocket::{ConnectionState, StreamEvent, StreamSocket};

/// Default base URL for the REST API.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default WebSocket URL for the push stream.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/api/v1/ws/stream";

/// WebSocket close code for a normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;
