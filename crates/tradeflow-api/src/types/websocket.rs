//! WebSocket message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::WireTime;
use super::market::{BarRecord, TickData};
use super::orderflow::{CvdRecord, FootprintRecord};

/// Client request action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientAction {
    /// Start receiving pushes for symbols.
    Subscribe,
    /// Stop receiving pushes for symbols.
    Unsubscribe,
}

/// Message sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientMessage {
    /// Action to perform.
    pub action: ClientAction,
    /// Symbols the action applies to.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<String>,
}

impl ClientMessage {
    /// Create a subscribe request.
    pub fn subscribe<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            action: ClientAction::Subscribe,
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an unsubscribe request.
    pub fn unsubscribe<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            action: ClientAction::Unsubscribe,
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }
}

/// Message received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Real-time trade/price update.
    Tick {
        /// Symbol.
        symbol: Option<String>,
        /// Tick payload.
        data: TickData,
        /// Server send time.
        timestamp: Option<WireTime>,
    },
    /// Completed or in-progress bar.
    Bar {
        /// Symbol.
        symbol: Option<String>,
        /// Bar payload.
        data: BarRecord,
        /// Server send time.
        timestamp: Option<WireTime>,
    },
    /// Cumulative delta samples.
    Cvd {
        /// Symbol.
        symbol: Option<String>,
        /// Samples in chronological order.
        data: Vec<CvdRecord>,
    },
    /// Incremental footprint for one bar.
    Footprint {
        /// Symbol.
        symbol: Option<String>,
        /// Footprint payload.
        data: FootprintRecord,
    },
    /// Server-reported error.
    Error {
        /// Error description.
        message: String,
    },
    /// Server acknowledged the session.
    Connected,
    /// Server is about to drop the session.
    Disconnected {
        /// Optional reason.
        reason: Option<String>,
    },
    /// Subscription acknowledgement (`{"status": "subscribed", ...}`).
    Ack {
        /// Status string.
        status: String,
        /// Symbols the ack refers to.
        symbols: Vec<String>,
    },
    /// Keepalive reply some servers send unprompted.
    Pong,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Tagged {
    Tick {
        #[serde(default)]
        symbol: Option<String>,
        data: TickData,
        #[serde(default)]
        timestamp: Option<WireTime>,
    },
    Bar {
        #[serde(default)]
        symbol: Option<String>,
        data: BarRecord,
        #[serde(default)]
        timestamp: Option<WireTime>,
    },
    Cvd {
        #[serde(default)]
        symbol: Option<String>,
        data: Vec<CvdRecord>,
    },
    Footprint {
        #[serde(default)]
        symbol: Option<String>,
        data: FootprintRecord,
    },
    Error {
        #[serde(default)]
        data: Option<Value>,
        #[serde(default)]
        message: Option<String>,
    },
    Connected,
    Disconnected {
        #[serde(default)]
        data: Option<Value>,
    },
    Pong,
}

impl From<Tagged> for ServerMessage {
    fn from(tagged: Tagged) -> Self {
        match tagged {
            Tagged::Tick {
                symbol,
                data,
                timestamp,
            } => ServerMessage::Tick {
                symbol,
                data,
                timestamp,
            },
            Tagged::Bar {
                symbol,
                data,
                timestamp,
            } => ServerMessage::Bar {
                symbol,
                data,
                timestamp,
            },
            Tagged::Cvd { symbol, data } => ServerMessage::Cvd { symbol, data },
            Tagged::Footprint { symbol, data } => ServerMessage::Footprint { symbol, data },
            Tagged::Error { data, message } => ServerMessage::Error {
                message: message
                    .or_else(|| data.as_ref().map(value_text))
                    .unwrap_or_default(),
            },
            Tagged::Connected => ServerMessage::Connected,
            Tagged::Disconnected { data } => ServerMessage::Disconnected {
                reason: data.as_ref().map(value_text),
            },
            Tagged::Pong => ServerMessage::Pong,
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl ServerMessage {
    /// Parse a text frame.
    ///
    /// Acks and bare `{"error": ...}` replies carry no `type` field and are
    /// recognized by their keys. Anything else must be a known tagged type.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(text)?;

        if value.get("type").is_none() {
            if let Some(status) = value.get("status").and_then(Value::as_str) {
                let symbols = value
                    .get("symbols")
                    .and_then(Value::as_array)
                    .map(|list| {
                        list.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                return Ok(ServerMessage::Ack {
                    status: status.to_string(),
                    symbols,
                });
            }
            if let Some(error) = value.get("error") {
                return Ok(ServerMessage::Error {
                    message: value_text(error),
                });
            }
        }

        serde_json::from_value::<Tagged>(value).map(Into::into)
    }

    /// Symbol the message refers to, if any.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            ServerMessage::Tick { symbol, .. }
            | ServerMessage::Bar { symbol, .. }
            | ServerMessage::Cvd { symbol, .. }
            | ServerMessage::Footprint { symbol, .. } => symbol.as_deref(),
            _ => None,
        }
    }
}
