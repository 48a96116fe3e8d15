//! TradeFlow backend data source.

use anyhow::Context;
use async_trait::async_trait;
use charter_core::{
    Bar, BarImbalances, CvdDatum, FootprintBar, Imbalance, ImbalanceSide, PriceLevel, Timeframe,
    VolumeProfile,
};
use tokio::sync::mpsc;
use tradeflow_api::types::{ImbalanceKind, ImbalanceRecord};
use tradeflow_api::{
    BarRecord, ClientMessage, ConnectionState, CvdRecord, FootprintRecord, PriceLevelRecord,
    StreamEvent, StreamSocket, TradeflowClient, VolumeProfileRecord,
};

use crate::source::{HistoricalSource, PollSource, PushTransport};
use crate::validation;

/// TradeFlow REST source for history and poll fallback.
#[derive(Debug, Clone)]
pub struct TradeflowSource {
    client: TradeflowClient,
}

impl TradeflowSource {
    pub fn new(client: TradeflowClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &TradeflowClient {
        &self.client
    }
}

#[async_trait]
impl HistoricalSource for TradeflowSource {
    async fn load_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> anyhow::Result<Vec<Bar>> {
        let records = self
            .client
            .bars(symbol, timeframe.label(), limit)
            .await
            .with_context(|| format!("loading {symbol} {timeframe} bars"))?;

        let total = records.len();
        let bars: Vec<Bar> = records.iter().filter_map(bar_from_record).collect();
        if bars.len() < total {
            log::warn!(
                "Dropped {} invalid bars for {} {}",
                total - bars.len(),
                symbol,
                timeframe
            );
        }
        log::info!("Loaded {} {} {} bars", bars.len(), symbol, timeframe);
        Ok(bars)
    }

    async fn load_cvd(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> anyhow::Result<Vec<CvdDatum>> {
        let records = self
            .client
            .cvd(symbol, timeframe.label(), limit)
            .await
            .with_context(|| format!("loading {symbol} {timeframe} cvd"))?;
        Ok(records.iter().filter_map(cvd_from_record).collect())
    }

    async fn load_footprint(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> anyhow::Result<Vec<FootprintBar>> {
        let records = self
            .client
            .footprint(symbol, timeframe.label(), limit)
            .await
            .with_context(|| format!("loading {symbol} {timeframe} footprint"))?;
        Ok(records.iter().filter_map(footprint_from_record).collect())
    }

    async fn load_imbalances(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
        ratio: f64,
    ) -> anyhow::Result<Vec<BarImbalances>> {
        let records = self
            .client
            .imbalances(symbol, timeframe.label(), limit, ratio)
            .await
            .with_context(|| format!("loading {symbol} {timeframe} imbalances"))?;
        Ok(records.iter().filter_map(imbalances_from_record).collect())
    }

    async fn load_volume_profile(&self, symbol: &str) -> anyhow::Result<VolumeProfile> {
        let record = self
            .client
            .volume_profile(symbol)
            .await
            .with_context(|| format!("loading {symbol} volume profile"))?;
        Ok(volume_profile_from_record(&record))
    }
}

#[async_trait]
impl PollSource for TradeflowSource {
    async fn latest_bar(&self, symbol: &str, timeframe: Timeframe) -> anyhow::Result<Option<Bar>> {
        let record = self.client.latest_bar(symbol, timeframe.label()).await?;
        Ok(record.as_ref().and_then(bar_from_record))
    }
}

#[async_trait]
impl PushTransport for StreamSocket {
    async fn connect(&mut self) -> anyhow::Result<mpsc::Receiver<StreamEvent>> {
        Ok(StreamSocket::connect(self).await?)
    }

    async fn send(&mut self, message: ClientMessage) -> anyhow::Result<()> {
        let state = self.state().await;
        if state != ConnectionState::Open {
            anyhow::bail!("stream is {state:?}");
        }
        Ok(StreamSocket::send(self, &message).await?)
    }

    async fn close(&mut self) {
        let state = self.state().await;
        if matches!(state, ConnectionState::Idle | ConnectionState::Closed) {
            log::debug!("Stream already {state:?}; nothing to close");
            return;
        }
        if let Err(e) = StreamSocket::close(self).await {
            log::warn!("Closing stream failed: {e}");
        }
    }
}

/// Convert a wire bar, rejecting unparseable times and invalid prices.
pub fn bar_from_record(record: &BarRecord) -> Option<Bar> {
    let time = record.time.unix_seconds()?;
    let mut bar = Bar::new(
        time,
        record.open,
        record.high,
        record.low,
        record.close,
        record.volume,
    );
    bar.bid_volume = record.bid_volume;
    bar.ask_volume = record.ask_volume;
    bar.trade_count = record.number_of_trades;
    validation::validate_bar(&bar).then_some(bar)
}

pub fn cvd_from_record(record: &CvdRecord) -> Option<CvdDatum> {
    let datum = CvdDatum {
        time: record.timestamp.unix_seconds()?,
        delta: record.delta,
        cumulative_delta: record.cumulative_delta,
    };
    validation::validate_cvd(&datum).then_some(datum)
}

fn level_from_record(record: &PriceLevelRecord) -> Option<PriceLevel> {
    let bid = record.bid.unwrap_or(0.0);
    let ask = record.ask.unwrap_or(0.0);
    let mut level = PriceLevel::new(record.price, bid, ask);
    // Profile rows may carry volume without a side split.
    level.volume = record.volume;
    validation::validate_level(&level).then_some(level)
}

pub fn footprint_from_record(record: &FootprintRecord) -> Option<FootprintBar> {
    let time = record.timestamp.unix_seconds()?;
    let levels = record.levels.iter().filter_map(level_from_record).collect();
    Some(FootprintBar::new(time, levels))
}

fn imbalances_from_record(record: &ImbalanceRecord) -> Option<BarImbalances> {
    let time = record.timestamp.unix_seconds()?;
    let imbalances = record
        .imbalances
        .iter()
        .map(|entry| Imbalance {
            side: match entry.kind {
                ImbalanceKind::Buy => ImbalanceSide::Buy,
                ImbalanceKind::Sell => ImbalanceSide::Sell,
            },
            price: entry.price,
            volume: entry.volume,
            compared_to: entry.compared_to,
        })
        .collect();
    Some(BarImbalances { time, imbalances })
}

/// Rebuilds the profile locally so POC and value area always agree with the levels.
pub fn volume_profile_from_record(record: &VolumeProfileRecord) -> VolumeProfile {
    let levels = record.profile.iter().filter_map(level_from_record).collect();
    let profile = VolumeProfile::from_levels(levels);
    if (profile.poc - record.poc).abs() > f64::EPSILON {
        log::debug!(
            "Volume profile POC differs from backend ({} vs {})",
            profile.poc,
            record.poc
        );
    }
    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeflow_api::WireTime;

    fn record(time: WireTime, high: f64) -> BarRecord {
        BarRecord {
            time,
            open: 100.0,
            high,
            low: 99.0,
            close: 100.5,
            volume: 10.0,
            bid_volume: Some(4.0),
            ask_volume: Some(6.0),
            number_of_trades: Some(3),
            symbol: None,
            timeframe: None,
        }
    }

    #[test]
    fn test_bar_from_record() {
        let bar = bar_from_record(&record(WireTime::Text("1970-01-01T00:01:00Z".into()), 101.0))
            .unwrap();
        assert_eq!(bar.time, 60);
        assert_eq!(bar.delta(), 2.0);
        assert_eq!(bar.trade_count, Some(3));
    }

    #[test]
    fn test_bar_from_record_rejects_bad_input() {
        assert!(bar_from_record(&record(WireTime::Text("soon".into()), 101.0)).is_none());
        assert!(bar_from_record(&record(WireTime::Integer(60), 98.0)).is_none());
    }

    #[test]
    fn test_volume_profile_from_record() {
        let json = r#"{
            "profile": [
                {"price": 101.0, "volume": 60, "bid": 30, "ask": 30},
                {"price": 100.0, "volume": 40, "bid": 10, "ask": 30}
            ],
            "poc": 101.0, "vah": 101.0, "val": 100.0, "total_volume": 100
        }"#;
        let record: VolumeProfileRecord = serde_json::from_str(json).unwrap();
        let profile = volume_profile_from_record(&record);
        assert_eq!(profile.poc, 101.0);
        assert_eq!(profile.total_volume, 100.0);
        assert_eq!(profile.levels[1].delta, 20.0);
    }
}
