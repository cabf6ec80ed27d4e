#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

pub type ServerSocket = WebSocketStream<TcpStream>;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Start a local WebSocket server; every accepted connection runs `handler`
///
/// Returns the `ws://` base URL of the server.
pub async fn spawn_ws_server<F, Fut>(handler: F) -> String
where
    F: Fn(ServerSocket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(socket) = accept_async(stream).await {
                tokio::spawn(handler(socket));
            }
        }
    });

    format!("ws://{}", addr)
}

/// Next text frame as JSON, skipping control frames
pub async fn next_json(socket: &mut ServerSocket) -> Option<Value> {
    while let Some(Ok(message)) = socket.next().await {
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).ok();
        }
    }
    None
}

pub async fn send_text(socket: &mut ServerSocket, text: impl Into<String>) {
    socket.send(Message::Text(text.into())).await.unwrap();
}

/// Wait until the client closes; true if a close frame was seen
pub async fn wait_for_close(socket: &mut ServerSocket) -> bool {
    while let Some(message) = socket.next().await {
        match message {
            Ok(Message::Close(_)) => return true,
            Ok(_) => continue,
            Err(_) => return false,
        }
    }
    false
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
