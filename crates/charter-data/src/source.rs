//! Data source trait definitions.
//!
//! These traits use `anyhow::Result` for flexible error handling. The
//! backend implementations live in [`crate::tradeflow`]; tests substitute
//! in-memory fakes.

use async_trait::async_trait;
use charter_core::{Bar, BarImbalances, CvdDatum, FootprintBar, Timeframe, VolumeProfile};
use tokio::sync::mpsc;
use tradeflow_api::{ClientMessage, StreamEvent};

/// Loads history for a chart.
#[async_trait]
pub trait HistoricalSource: Send + Sync {
    /// Up to `limit` most recent bars, in any order.
    async fn load_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> anyhow::Result<Vec<Bar>>;

    /// Cumulative delta, oldest first.
    async fn load_cvd(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> anyhow::Result<Vec<CvdDatum>>;

    /// Per-bar footprints.
    async fn load_footprint(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> anyhow::Result<Vec<FootprintBar>>;

    /// Diagonal imbalances per bar time.
    async fn load_imbalances(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
        ratio: f64,
    ) -> anyhow::Result<Vec<BarImbalances>>;

    async fn load_volume_profile(&self, symbol: &str) -> anyhow::Result<VolumeProfile>;
}

/// Fetches the latest bar while push is unavailable.
#[async_trait]
pub trait PollSource: Send + Sync {
    async fn latest_bar(&self, symbol: &str, timeframe: Timeframe) -> anyhow::Result<Option<Bar>>;
}

/// One push connection at a time.
///
/// `connect` resolves once the handshake completes (or fails). The returned
/// receiver yields [`StreamEvent::Opened`] first and ends with
/// [`StreamEvent::Closed`].
#[async_trait]
pub trait PushTransport: Send {
    async fn connect(&mut self) -> anyhow::Result<mpsc::Receiver<StreamEvent>>;

    async fn send(&mut self, message: ClientMessage) -> anyhow::Result<()>;

    /// Close with a normal-closure frame. Closing an idle transport is a no-op.
    async fn close(&mut self);
}
