//! HTTP client for the TradeFlow REST API.

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{ApiError, Error, Result};
use crate::types::{
    BarRecord, BarsQuery, CvdRecord, FootprintRecord, ImbalanceRecord, OrderFlowRequest,
    VolumeProfileRecord,
};

const USER_AGENT: &str = concat!("tradeflow-api-rust/", env!("CARGO_PKG_VERSION"));

/// HTTP client for making requests to the TradeFlow backend.
#[derive(Debug, Clone)]
pub struct TradeflowClient {
    config: Arc<Config>,
    http: Client,
}

impl TradeflowClient {
    /// Create a new client with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        url::Url::parse(&config.base_url)?;

        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/api/v1{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint
        )
    }

    /// Fetch up to `limit` bars. The backend returns newest first.
    pub async fn bars(&self, symbol: &str, timeframe: &str, limit: u32) -> Result<Vec<BarRecord>> {
        let query = BarsQuery {
            symbol,
            timeframe,
            limit,
        };
        let request = self.http.get(self.url("/market-data/bars")).query(&query);
        self.execute(request).await
    }

    /// Fetch the most recent bar, used by the poll fallback.
    pub async fn latest_bar(&self, symbol: &str, timeframe: &str) -> Result<Option<BarRecord>> {
        let mut bars = self.bars(symbol, timeframe, 1).await?;
        Ok(if bars.is_empty() {
            None
        } else {
            Some(bars.swap_remove(0))
        })
    }

    /// Fetch cumulative volume delta, oldest first.
    pub async fn cvd(&self, symbol: &str, timeframe: &str, limit: u32) -> Result<Vec<CvdRecord>> {
        self.post_order_flow("/orderflow/cvd", symbol, timeframe, limit, None)
            .await
    }

    /// Fetch per-bar footprints.
    pub async fn footprint(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
    ) -> Result<Vec<FootprintRecord>> {
        self.post_order_flow("/orderflow/footprint", symbol, timeframe, limit, None)
            .await
    }

    /// Fetch diagonal imbalances detected with `ratio`.
    pub async fn imbalances(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
        ratio: f64,
    ) -> Result<Vec<ImbalanceRecord>> {
        self.post_order_flow("/orderflow/imbalances", symbol, timeframe, limit, Some(ratio))
            .await
    }

    /// Fetch the volume profile for the backend's default range (last 24h).
    pub async fn volume_profile(&self, symbol: &str) -> Result<VolumeProfileRecord> {
        let request = self
            .http
            .get(self.url("/market-data/volume-profile"))
            .query(&[("symbol", symbol)]);
        self.execute(request).await
    }

    async fn post_order_flow<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        symbol: &str,
        timeframe: &str,
        limit: u32,
        ratio: Option<f64>,
    ) -> Result<T> {
        let body = OrderFlowRequest {
            symbol,
            timeframe,
            limit,
            ratio,
        };
        let request = self.http.post(self.url(endpoint)).json(&body);
        self.execute(request).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Handle the API response.
    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| match e.detail {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or_else(|_| format!("HTTP {status}: {body}"));
            return Err(Error::Api(ApiError::new(status.as_u16(), message)));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse response: {}", body);
            Error::Json(e)
        })
    }
}

/// Error body produced by the backend framework.
#[derive(Debug, serde::Deserialize)]
struct ErrorResponse {
    detail: serde_json::Value,
}
