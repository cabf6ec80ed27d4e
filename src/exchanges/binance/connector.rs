use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{
    combined_stream_url, raw_stream_url, RequestEnvelope, RestClient, StreamCodec, StreamMode,
    StreamRouter, WsApiClient, WsEnvelope,
};
use crate::core::types::SubscriptionType;
use crate::exchanges::binance::codec::{
    create_binance_stream_identifiers, BinanceMarketCodec, BinanceUserDataCodec,
};
use crate::exchanges::binance::rest::BinanceRestClient;
use tokio_util::sync::CancellationToken;

/// Binance spot connector: REST, WebSocket API and stream entry points
#[derive(Debug, Clone)]
pub struct BinanceConnector<R: RestClient> {
    rest: BinanceRestClient<R>,
    ws_api: WsApiClient,
    stream_url: String,
    config: ExchangeConfig,
}

impl<R: RestClient> BinanceConnector<R> {
    pub fn new(rest: R, ws_api: WsApiClient, stream_url: String, config: ExchangeConfig) -> Self {
        Self {
            rest: BinanceRestClient::new(rest),
            ws_api,
            stream_url,
            config,
        }
    }

    pub const fn rest(&self) -> &BinanceRestClient<R> {
        &self.rest
    }

    pub const fn ws_api(&self) -> &WsApiClient {
        &self.ws_api
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    pub const fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn can_authenticate(&self) -> bool {
        self.config.has_credentials()
    }

    /// Send one request over the WebSocket API on a dedicated connection
    pub async fn ws_api_request(
        &self,
        envelope: RequestEnvelope,
        cancel: &CancellationToken,
    ) -> Result<WsEnvelope, ExchangeError> {
        self.ws_api.request(envelope, cancel).await
    }

    /// Combined market stream over every symbol and subscription type
    pub fn market_streams(
        &self,
        symbols: &[String],
        subscription_types: &[SubscriptionType],
    ) -> StreamRouter<BinanceMarketCodec> {
        let streams = create_binance_stream_identifiers(symbols, subscription_types);
        StreamRouter::new(
            combined_stream_url(&self.stream_url, &streams),
            StreamMode::Combined,
            BinanceMarketCodec,
        )
    }

    /// Single raw stream decoded with a caller-supplied codec
    pub fn raw_stream<C: StreamCodec>(&self, stream: &str, codec: C) -> StreamRouter<C> {
        StreamRouter::new(
            raw_stream_url(&self.stream_url, stream),
            StreamMode::Raw,
            codec,
        )
    }

    /// User data stream for a listen key obtained through
    /// [`BinanceRestClient::create_listen_key`]
    pub fn user_data_stream(&self, listen_key: &str) -> StreamRouter<BinanceUserDataCodec> {
        self.raw_stream(listen_key, BinanceUserDataCodec)
    }
}
