//! Integration tests for the TradeFlow API client.
//!
//! Stream tests run against an in-process WebSocket server on localhost.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tradeflow_api::{
    ClientMessage, Config, ConnectionState, ServerMessage, StreamEvent, StreamSocket,
    TradeflowClient, WsConfig,
};

/// Test creating a client.
#[test]
fn test_create_client() {
    let client = TradeflowClient::new(Config::default());
    assert!(client.is_ok());
    assert_eq!(client.unwrap().config().base_url, "http://localhost:8000");
}

/// Test configuration builder.
#[test]
fn test_config_builder() {
    let config = Config::new("http://backend:9000").with_timeout(Duration::from_secs(3));
    assert_eq!(config.base_url, "http://backend:9000");
    assert_eq!(config.timeout, Duration::from_secs(3));
}

/// Test WebSocket configuration.
#[test]
fn test_ws_config() {
    let config = WsConfig::new("ws://custom.example.com/ws")
        .with_ping_interval(Duration::from_secs(60))
        .with_connect_timeout(Duration::from_secs(2));

    assert_eq!(config.url, "ws://custom.example.com/ws");
    assert_eq!(config.ping_interval, Duration::from_secs(60));
    assert_eq!(config.connect_timeout, Duration::from_secs(2));
    assert_eq!(config.channel_buffer_size, 1000);
}

async fn local_server() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn next_event(rx: &mut tokio::sync::mpsc::Receiver<StreamEvent>) -> StreamEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for stream event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_stream_delivers_messages_and_drops_malformed() {
    let (listener, url) = local_server().await;

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        let request = ws.next().await.unwrap().unwrap().into_text().unwrap();
        assert_eq!(request, r#"{"action":"subscribe","symbols":["XAUUSD"]}"#);

        for frame in [
            r#"{"status":"subscribed","symbols":["XAUUSD"]}"#,
            "{broken",
            r#"{"type":"tick","symbol":"XAUUSD","data":{"price":2650.5,"size":1}}"#,
        ] {
            ws.send(Message::Text(frame.to_string())).await.unwrap();
        }
        ws.close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "restart".into(),
        }))
        .await
        .unwrap();
        // Drain until the client acknowledges the close.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut socket = StreamSocket::new(WsConfig::new(url));
    assert_eq!(socket.state().await, ConnectionState::Idle);

    let mut rx = socket.connect().await.unwrap();
    assert_eq!(next_event(&mut rx).await, StreamEvent::Opened);
    assert_eq!(socket.state().await, ConnectionState::Open);

    socket
        .send(&ClientMessage::subscribe(["XAUUSD"]))
        .await
        .unwrap();

    assert!(matches!(
        next_event(&mut rx).await,
        StreamEvent::Message(ServerMessage::Ack { .. })
    ));
    assert!(matches!(
        next_event(&mut rx).await,
        StreamEvent::Message(ServerMessage::Tick { .. })
    ));
    assert_eq!(
        next_event(&mut rx).await,
        StreamEvent::Closed { code: Some(1001) }
    );
    assert_eq!(socket.state().await, ConnectionState::Closed);

    server.await.unwrap();
}

#[tokio::test]
async fn test_close_sends_normal_closure() {
    let (listener, url) = local_server().await;
    let (code_tx, code_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Close(frame) = msg {
                let _ = code_tx.send(frame.map(|f| u16::from(f.code)));
                break;
            }
        }
    });

    let mut socket = StreamSocket::new(WsConfig::new(url));
    let mut rx = socket.connect().await.unwrap();
    assert_eq!(next_event(&mut rx).await, StreamEvent::Opened);

    socket.close().await.unwrap();
    assert_eq!(
        next_event(&mut rx).await,
        StreamEvent::Closed { code: Some(1000) }
    );

    let code = tokio::time::timeout(Duration::from_secs(5), code_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(code, Some(1000));
    assert!(socket
        .send(&ClientMessage::subscribe(["XAUUSD"]))
        .await
        .is_err());
}

#[tokio::test]
async fn test_connect_failure_leaves_socket_closed() {
    // Bind then drop to get a port with nothing listening.
    let (listener, url) = local_server().await;
    drop(listener);

    let mut socket = StreamSocket::new(WsConfig::new(url));
    assert!(socket.connect().await.is_err());
    assert_eq!(socket.state().await, ConnectionState::Closed);
    assert!(socket
        .send(&ClientMessage::subscribe(["XAUUSD"]))
        .await
        .is_err());
}
