//! WebSocket client for the real-time push stream.
//!
//! [`StreamSocket`] covers exactly one connection lifecycle:
//! `Idle -> Connecting -> Open -> Closing -> Closed`. It never reconnects on
//! its own; callers observe [`StreamEvent::Closed`] and decide what to do.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::WsConfig;
use crate::error::{Error, Result};
use crate::types::{ClientMessage, ServerMessage};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// WebSocket connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected.
    Idle,
    /// Handshake in progress.
    Connecting,
    /// Connected and ready.
    Open,
    /// Normal closure requested locally.
    Closing,
    /// Connection ended, locally or remotely.
    Closed,
}

/// Events delivered to the owner of a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Handshake completed.
    Opened,
    /// A well-formed server message.
    Message(ServerMessage),
    /// The connection ended. `code` is the close code, if a close frame was seen.
    Closed {
        /// WebSocket close code.
        code: Option<u16>,
    },
}

/// Internal commands for the WebSocket connection.
#[derive(Debug)]
enum WsCommand {
    Send(String),
    Close,
}

/// WebSocket client for the push stream.
#[derive(Debug)]
pub struct StreamSocket {
    config: WsConfig,
    state: Arc<Mutex<ConnectionState>>,
    command_tx: Option<mpsc::Sender<WsCommand>>,
}

impl StreamSocket {
    /// Create a new socket with the given configuration.
    pub fn new(config: WsConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(ConnectionState::Idle)),
            command_tx: None,
        }
    }

    /// Connect to the WebSocket server.
    ///
    /// Returns a receiver for stream events. The first event is
    /// [`StreamEvent::Opened`]; the last is always [`StreamEvent::Closed`].
    pub async fn connect(&mut self) -> Result<mpsc::Receiver<StreamEvent>> {
        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(WsCommand::Close).await;
        }

        url::Url::parse(&self.config.url)?;
        self.set_state(ConnectionState::Connecting).await;

        let handshake = tokio::time::timeout(
            self.config.connect_timeout,
            connect_async(self.config.url.as_str()),
        )
        .await;
        let stream = match handshake {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => {
                tracing::warn!("WebSocket connection failed: {}", e);
                self.set_state(ConnectionState::Closed).await;
                return Err(e.into());
            }
            Err(_) => {
                tracing::warn!("WebSocket handshake timed out");
                self.set_state(ConnectionState::Closed).await;
                return Err(Error::Timeout);
            }
        };

        tracing::info!("WebSocket connected to {}", self.config.url);
        self.set_state(ConnectionState::Open).await;

        let (command_tx, command_rx) = mpsc::channel(100);
        let (event_tx, event_rx) = mpsc::channel(self.config.channel_buffer_size);
        self.command_tx = Some(command_tx);

        let _ = event_tx.send(StreamEvent::Opened).await;

        let ping_interval = self.config.ping_interval;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            run_connection(stream, ping_interval, state, command_rx, event_tx).await;
        });

        Ok(event_rx)
    }

    /// Send a protocol message.
    pub async fn send(&self, message: &ClientMessage) -> Result<()> {
        let tx = self.command_tx.as_ref().ok_or(Error::NotConnected)?;
        let json = serde_json::to_string(message)?;
        tx.send(WsCommand::Send(json))
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// Close the connection with a normal-closure frame.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(tx) = self.command_tx.take() {
            let mut state = self.state.lock().await;
            if *state == ConnectionState::Open {
                *state = ConnectionState::Closing;
            }
            drop(state);
            let _ = tx.send(WsCommand::Close).await;
        }
        Ok(())
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.lock().await = state;
    }
}

/// Run one connection until it closes.
async fn run_connection(
    stream: Socket,
    ping_every: Duration,
    state: Arc<Mutex<ConnectionState>>,
    mut command_rx: mpsc::Receiver<WsCommand>,
    event_tx: mpsc::Sender<StreamEvent>,
) {
    let (mut write, mut read) = stream.split();
    let mut ping_interval = interval_at(Instant::now() + ping_every, ping_every);

    let close_code = loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match ServerMessage::parse(&text) {
                        Ok(message) => {
                            if event_tx.send(StreamEvent::Message(message)).await.is_err() {
                                tracing::warn!("Event receiver dropped");
                                let _ = write.send(Message::Close(Some(normal_close()))).await;
                                break Some(CloseCode::Normal.into());
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Dropping malformed message ({}): {}", e, text);
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map(|f| u16::from(f.code));
                        tracing::info!("WebSocket closed by server (code {:?})", code);
                        break code;
                    }
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error: {}", e);
                        break None;
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        break None;
                    }
                    _ => {}
                }
            }

            cmd = command_rx.recv() => {
                match cmd {
                    Some(WsCommand::Send(json)) => {
                        if let Err(e) = write.send(Message::Text(json)).await {
                            tracing::warn!("WebSocket send failed: {}", e);
                            break None;
                        }
                    }
                    Some(WsCommand::Close) | None => {
                        let _ = write.send(Message::Close(Some(normal_close()))).await;
                        tracing::info!("WebSocket closed by client");
                        break Some(CloseCode::Normal.into());
                    }
                }
            }

            _ = ping_interval.tick() => {
                if write.send(Message::Ping(Vec::new())).await.is_err() {
                    tracing::warn!("Failed to send ping");
                    break None;
                }
            }
        }
    };

    *state.lock().await = ConnectionState::Closed;
    let _ = event_tx.send(StreamEvent::Closed { code: close_code }).await;
}

fn normal_close() -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    }
}
