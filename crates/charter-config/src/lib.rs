//! Configuration management for charter.
//!
//! Loads configuration from TOML files and converts each section into the
//! typed settings the runtime crates take.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use charter_core::{SeriesKey, SeriesStore, Timeframe};
use charter_data::{LiveConfig, SupervisorConfig};
use charter_render::{ChartLayout, Viewport};

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub api: ApiConfig,
    pub stream: StreamConfig,
    pub chart: ChartConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from default locations.
    ///
    /// Searches in order:
    /// 1. `./config.toml`
    /// 2. `~/.config/charter/config.toml`
    ///
    /// Returns default config if no file found.
    pub fn load_default() -> Self {
        if let Ok(config) = Self::load("config.toml") {
            return config;
        }

        if let Some(path) = Self::default_path() {
            if let Ok(config) = Self::load(&path) {
                return config;
            }
        }

        Self::default()
    }

    /// Save configuration to a file path.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path in the user config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("charter").join("config.toml"))
    }

    /// The configured default timeframe.
    pub fn timeframe(&self) -> Result<Timeframe, ConfigError> {
        self.general
            .default_timeframe
            .parse()
            .map_err(|e: charter_core::ParseTimeframeError| ConfigError::InvalidValue {
                field: "general.default_timeframe",
                message: e.to_string(),
            })
    }

    /// Live session settings for the default symbol and timeframe.
    pub fn live_config(&self) -> Result<LiveConfig, ConfigError> {
        Ok(LiveConfig::new(self.timeframe()?)
            .with_symbols([self.general.default_symbol.clone()])
            .with_supervisor(self.stream.supervisor())
            .with_throttle(self.stream.throttle()))
    }

    /// Empty store for the default series with the configured retention.
    pub fn series_store(&self) -> Result<SeriesStore, ConfigError> {
        let key = SeriesKey::new(self.general.default_symbol.clone(), self.timeframe()?);
        Ok(SeriesStore::with_retention(key, self.chart.retention))
    }
}

/// General settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default trading symbol.
    pub default_symbol: String,
    /// Default timeframe label, e.g. "1m" or "15s".
    pub default_timeframe: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_symbol: "XAUUSD".to_string(),
            default_timeframe: "1m".to_string(),
        }
    }
}

/// Backend endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// REST base URL.
    pub base_url: String,
    /// Push stream URL.
    pub ws_url: String,
    /// Bars requested for the initial history load.
    pub history_limit: u32,
    /// REST request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: tradeflow_api::DEFAULT_BASE_URL.to_string(),
            ws_url: tradeflow_api::DEFAULT_WS_URL.to_string(),
            history_limit: 500,
            request_timeout_ms: 10_000,
        }
    }
}

impl ApiConfig {
    pub fn client_config(&self) -> tradeflow_api::Config {
        tradeflow_api::Config::new(self.base_url.clone())
            .with_timeout(Duration::from_millis(self.request_timeout_ms))
    }
}

/// Push stream resilience settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Time allowed for the push connection before falling back to polling.
    pub connect_deadline_ms: u64,
    /// First reconnect delay; doubles per attempt.
    pub backoff_base_ms: u64,
    /// Reconnect attempts before polling for the rest of the session.
    pub max_reconnect_attempts: u32,
    /// Minimum spacing between tick or bar updates per symbol.
    pub throttle_ms: u64,
    /// Keepalive ping interval.
    pub ping_interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_deadline_ms: 5000,
            backoff_base_ms: 1000,
            max_reconnect_attempts: 5,
            throttle_ms: 100,
            ping_interval_ms: 30_000,
        }
    }
}

impl StreamConfig {
    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            connect_deadline: Duration::from_millis(self.connect_deadline_ms),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    /// Socket settings; the handshake timeout matches the connect deadline.
    pub fn ws_config(&self, api: &ApiConfig) -> tradeflow_api::WsConfig {
        tradeflow_api::WsConfig::new(api.ws_url.clone())
            .with_ping_interval(Duration::from_millis(self.ping_interval_ms))
            .with_connect_timeout(Duration::from_millis(self.connect_deadline_ms))
    }
}

/// Chart display settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Bars kept per series.
    pub retention: usize,
    /// Initial pixels per bar.
    pub bar_spacing: f64,
    /// Share of the price range added above and below.
    pub price_padding: f64,
    pub price_axis_width: f64,
    pub time_axis_height: f64,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            retention: charter_core::DEFAULT_RETENTION,
            bar_spacing: charter_render::DEFAULT_BAR_SPACING,
            price_padding: charter_render::PRICE_PADDING,
            price_axis_width: charter_render::PRICE_AXIS_WIDTH,
            time_axis_height: charter_render::TIME_AXIS_HEIGHT,
        }
    }
}

impl ChartConfig {
    pub fn layout(&self, width: f64, height: f64) -> ChartLayout {
        ChartLayout::new(width, height).with_axes(self.price_axis_width, self.time_axis_height)
    }

    /// Viewport sized to the plot area of `layout`.
    pub fn viewport(&self, layout: &ChartLayout) -> Viewport {
        let plot = layout.plot();
        Viewport::new(plot.width, plot.height)
            .with_bar_spacing(self.bar_spacing)
            .with_price_padding(self.price_padding)
    }
}
