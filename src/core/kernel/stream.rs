use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{StreamCodec, StreamDecoder, StreamItem, StreamMode};
use crate::core::kernel::ws::{WsConnection, WsReceivers};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

const DEFAULT_BUFFER: usize = 1024;

/// URL of a single raw stream: `<base>/ws/<stream>`
pub fn raw_stream_url(base: &str, stream: &str) -> String {
    format!("{}/ws/{}", base.trim_end_matches('/'), stream)
}

/// URL of a combined stream connection: `<base>/stream?streams=a/b/c`
pub fn combined_stream_url(base: &str, streams: &[impl AsRef<str>]) -> String {
    let streams: Vec<&str> = streams.iter().map(AsRef::as_ref).collect();
    format!(
        "{}/stream?streams={}",
        base.trim_end_matches('/'),
        streams.join("/")
    )
}

/// Receiving side of a running stream
///
/// `events` yields decoded events in wire order. `errors` yields decode
/// failures, which do not end the stream, and at most one connection error,
/// which does. Both channels close once the stream has ended.
#[derive(Debug)]
pub struct StreamSubscription<E> {
    pub events: mpsc::Receiver<StreamItem<E>>,
    pub errors: mpsc::Receiver<ExchangeError>,
}

/// Decodes one stream connection into a typed event channel
#[derive(Debug, Clone)]
pub struct StreamRouter<C> {
    url: String,
    decoder: StreamDecoder<C>,
    buffer: usize,
}

impl<C: StreamCodec> StreamRouter<C> {
    pub fn new(url: impl Into<String>, mode: StreamMode, codec: C) -> Self {
        Self {
            url: url.into(),
            decoder: StreamDecoder::new(mode, codec),
            buffer: DEFAULT_BUFFER,
        }
    }

    /// Capacity of the event channel; a full channel pauses reading
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub const fn mode(&self) -> StreamMode {
        self.decoder.mode()
    }

    /// Connect and start routing
    ///
    /// Connection errors are returned here. Once this returns, the stream
    /// runs until the server closes it, a read fails, or `cancel` fires.
    #[instrument(skip_all, fields(url = %self.url, mode = ?self.decoder.mode()))]
    pub async fn subscribe(
        self,
        cancel: &CancellationToken,
    ) -> Result<StreamSubscription<C::Event>, ExchangeError> {
        let (connection, receivers) = WsConnection::connect(&self.url, cancel).await?;

        let (event_tx, event_rx) = mpsc::channel(self.buffer);
        let (error_tx, error_rx) = mpsc::channel(self.buffer);

        tokio::spawn(route_stream(
            connection,
            receivers,
            self.decoder,
            cancel.clone(),
            event_tx,
            error_tx,
        ));

        Ok(StreamSubscription {
            events: event_rx,
            errors: error_rx,
        })
    }
}

async fn route_stream<C: StreamCodec>(
    connection: WsConnection,
    mut receivers: WsReceivers,
    decoder: StreamDecoder<C>,
    cancel: CancellationToken,
    events: mpsc::Sender<StreamItem<C::Event>>,
    errors: mpsc::Sender<ExchangeError>,
) {
    loop {
        tokio::select! {
            biased;
            frame = receivers.messages.recv() => {
                let Some(frame) = frame else { break };
                match decoder.decode_frame(&frame) {
                    Ok(item) => {
                        let sent = tokio::select! {
                            () = cancel.cancelled() => break,
                            sent = events.send(item) => sent,
                        };
                        if sent.is_err() {
                            debug!("Event receiver dropped, stopping stream");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to decode stream frame: {}", e);
                        let sent = tokio::select! {
                            () = cancel.cancelled() => break,
                            sent = errors.send(e) => sent,
                        };
                        if sent.is_err() {
                            debug!("Error receiver dropped, stopping stream");
                            break;
                        }
                    }
                }
            }
            error = receivers.errors.recv() => {
                if let Some(error) = error {
                    tokio::select! {
                        () = cancel.cancelled() => {}
                        _ = errors.send(error) => {}
                    }
                    break;
                }
            }
            () = cancel.cancelled() => {
                debug!("Stream cancelled");
                break;
            }
        }
    }

    if let Err(e) = connection.close().await {
        debug!("Failed to close stream connection: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_stream_url() {
        assert_eq!(
            raw_stream_url("wss://stream.binance.com:9443", "btcusdt@trade"),
            "wss://stream.binance.com:9443/ws/btcusdt@trade"
        );
        assert_eq!(
            raw_stream_url("wss://fstream.binance.com/", "abc"),
            "wss://fstream.binance.com/ws/abc"
        );
    }

    #[test]
    fn test_combined_stream_url() {
        assert_eq!(
            combined_stream_url(
                "wss://stream.binance.com:9443",
                &["btcusdt@trade", "ethusdt@bookTicker"]
            ),
            "wss://stream.binance.com:9443/stream?streams=btcusdt@trade/ethusdt@bookTicker"
        );
    }
}
