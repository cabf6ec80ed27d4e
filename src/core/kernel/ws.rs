use crate::core::errors::ExchangeError;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Lifecycle of a [`WsConnection`]
///
/// `Closed` is terminal; a new connection is needed to talk to the server again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WsState {
    Disconnected = 0,
    Connecting = 1,
    Open = 2,
    Closing = 3,
    Closed = 4,
}

impl WsState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Open,
            3 => Self::Closing,
            4 => Self::Closed,
            _ => Self::Disconnected,
        }
    }
}

#[derive(Debug)]
struct SharedState(AtomicU8);

impl SharedState {
    fn new(state: WsState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn get(&self) -> WsState {
        WsState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: WsState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: WsState, to: WsState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Inbound side of a connection, handed to exactly one consumer
///
/// `messages` carries every data frame in wire order. `errors` receives at
/// most one read error, after which both channels are closed.
#[derive(Debug)]
pub struct WsReceivers {
    pub messages: mpsc::UnboundedReceiver<Vec<u8>>,
    pub errors: mpsc::UnboundedReceiver<ExchangeError>,
}

/// One persistent WebSocket connection
///
/// A background receive loop, started by [`WsConnection::connect`], is the
/// sole reader of the socket and the sole writer of the inbound channels.
/// Control frames are handled here: pings are answered, pongs dropped.
pub struct WsConnection {
    url: String,
    state: Arc<SharedState>,
    writer: Arc<Mutex<WsWriter>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("url", &self.url)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl WsConnection {
    /// Open a connection and start its receive loop
    ///
    /// # Arguments
    /// * `url` - WebSocket endpoint
    /// * `cancel` - Aborts the handshake, and later stops the receive loop
    ///
    /// # Returns
    /// The connection handle and the receivers for its inbound frames
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<(Self, WsReceivers), ExchangeError> {
        let state = Arc::new(SharedState::new(WsState::Connecting));

        let (stream, _) = tokio::select! {
            () = cancel.cancelled() => return Err(ExchangeError::Cancelled),
            result = connect_async(url) => result.map_err(|e| {
                ExchangeError::NetworkError(format!("WebSocket connection failed: {}", e))
            })?,
        };

        let (write, read) = stream.split();
        let writer = Arc::new(Mutex::new(write));
        let shutdown = cancel.child_token();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();

        state.set(WsState::Open);
        debug!("WebSocket connected");

        tokio::spawn(receive_loop(
            read,
            Arc::clone(&writer),
            Arc::clone(&state),
            shutdown.clone(),
            message_tx,
            error_tx,
        ));

        let connection = Self {
            url: url.to_string(),
            state,
            writer,
            shutdown,
        };
        let receivers = WsReceivers {
            messages: message_rx,
            errors: error_rx,
        };

        Ok((connection, receivers))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> WsState {
        self.state.get()
    }

    pub fn is_open(&self) -> bool {
        self.state() == WsState::Open
    }

    /// Write one text frame; only valid while `Open`
    #[instrument(skip(self, text), fields(url = %self.url))]
    pub async fn send(&self, text: String) -> Result<(), ExchangeError> {
        if !self.is_open() {
            return Err(ExchangeError::ConnectionClosed(format!(
                "WebSocket not open (state: {:?})",
                self.state()
            )));
        }

        self.writer
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| {
                ExchangeError::NetworkError(format!("Failed to send WebSocket message: {}", e))
            })
    }

    /// Close the connection
    ///
    /// Idempotent: a connection that is already closing or closed is left
    /// alone. Must not be called from the receive loop.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn close(&self) -> Result<(), ExchangeError> {
        if !self.state.transition(WsState::Open, WsState::Closing) {
            return Ok(());
        }

        self.shutdown.cancel();
        send_close(&self.writer).await;
        self.state.set(WsState::Closed);
        Ok(())
    }
}

async fn send_close(writer: &Mutex<WsWriter>) {
    let mut writer = writer.lock().await;
    if let Err(e) = writer.send(Message::Close(None)).await {
        debug!("Close frame not delivered: {}", e);
    }
    if let Err(e) = writer.close().await {
        debug!("Failed to close WebSocket sink: {}", e);
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn receive_loop(
    mut read: WsReader,
    writer: Arc<Mutex<WsWriter>>,
    state: Arc<SharedState>,
    shutdown: CancellationToken,
    messages: mpsc::UnboundedSender<Vec<u8>>,
    errors: mpsc::UnboundedSender<ExchangeError>,
) {
    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => {
                // cancellation is reported by the consumer, not on the error channel
                debug!("Receive loop cancelled");
                if state.transition(WsState::Open, WsState::Closing) {
                    send_close(&writer).await;
                    state.set(WsState::Closed);
                }
                return;
            }
            next = read.next() => next,
        };

        let failure = match next {
            Some(Ok(Message::Text(text))) => {
                if messages.send(text.into_bytes()).is_err() {
                    debug!("Message receiver dropped, stopping receive loop");
                    return;
                }
                continue;
            }
            Some(Ok(Message::Binary(data))) => {
                if messages.send(data).is_err() {
                    debug!("Message receiver dropped, stopping receive loop");
                    return;
                }
                continue;
            }
            Some(Ok(Message::Ping(data))) => {
                if let Err(e) = writer.lock().await.send(Message::Pong(data)).await {
                    warn!("Failed to send pong response: {}", e);
                }
                continue;
            }
            Some(Ok(Message::Pong(_) | Message::Frame(_))) => continue,
            Some(Ok(Message::Close(frame))) => ExchangeError::ConnectionClosed(
                frame.map_or_else(|| "closed by server".to_string(), |f| f.to_string()),
            ),
            Some(Err(e)) => ExchangeError::NetworkError(format!("WebSocket error: {}", e)),
            None => ExchangeError::ConnectionClosed("stream ended".to_string()),
        };

        // a consumer-initiated close also ends the stream; that is not an error
        if state.get() == WsState::Closing || shutdown.is_cancelled() {
            return;
        }

        warn!("WebSocket receive loop terminated: {}", failure);
        state.set(WsState::Closed);
        let _ = errors.send(failure);
        return;
    }
}
