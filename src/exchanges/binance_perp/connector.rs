use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{
    combined_stream_url, raw_stream_url, RequestEnvelope, RestClient, StreamCodec, StreamMode,
    StreamRouter, WsApiClient, WsEnvelope,
};
use crate::core::types::SubscriptionType;
use crate::exchanges::binance::codec::create_binance_stream_identifiers;
use crate::exchanges::binance_perp::codec::{BinancePerpMarketCodec, BinancePerpUserDataCodec};
use crate::exchanges::binance_perp::rest::BinancePerpRestClient;
use tokio_util::sync::CancellationToken;

/// Binance USDⓈ-M futures connector
#[derive(Debug, Clone)]
pub struct BinancePerpConnector<R: RestClient> {
    rest: BinancePerpRestClient<R>,
    ws_api: WsApiClient,
    stream_url: String,
    config: ExchangeConfig,
}

impl<R: RestClient> BinancePerpConnector<R> {
    pub fn new(rest: R, ws_api: WsApiClient, stream_url: String, config: ExchangeConfig) -> Self {
        Self {
            rest: BinancePerpRestClient::new(rest),
            ws_api,
            stream_url,
            config,
        }
    }

    pub const fn rest(&self) -> &BinancePerpRestClient<R> {
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

    pub async fn ws_api_request(
        &self,
        envelope: RequestEnvelope,
        cancel: &CancellationToken,
    ) -> Result<WsEnvelope, ExchangeError> {
        self.ws_api.request(envelope, cancel).await
    }

    pub fn market_streams(
        &self,
        symbols: &[String],
        subscription_types: &[SubscriptionType],
    ) -> StreamRouter<BinancePerpMarketCodec> {
        let streams = create_binance_stream_identifiers(symbols, subscription_types);
        StreamRouter::new(
            combined_stream_url(&self.stream_url, &streams),
            StreamMode::Combined,
            BinancePerpMarketCodec,
        )
    }

    pub fn raw_stream<C: StreamCodec>(&self, stream: &str, codec: C) -> StreamRouter<C> {
        StreamRouter::new(
            raw_stream_url(&self.stream_url, stream),
            StreamMode::Raw,
            codec,
        )
    }

    pub fn user_data_stream(&self, listen_key: &str) -> StreamRouter<BinancePerpUserDataCodec> {
        self.raw_stream(listen_key, BinancePerpUserDataCodec)
    }
}
