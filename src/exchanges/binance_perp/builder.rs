use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{
    Credentials, ReqwestRest, RestClientBuilder, RestClientConfig, WsApiClient,
};
use crate::exchanges::binance_perp::connector::BinancePerpConnector;

pub const REST_URL: &str = "https://fapi.binance.com";
pub const WS_API_URL: &str = "wss://ws-fapi.binance.com/ws-fapi/v1";
pub const STREAM_URL: &str = "wss://fstream.binance.com";

pub const TESTNET_REST_URL: &str = "https://testnet.binancefuture.com";
pub const TESTNET_WS_API_URL: &str = "wss://testnet.binancefuture.com/ws-fapi/v1";
pub const TESTNET_STREAM_URL: &str = "wss://fstream.binancefuture.com";

/// Create a Binance USDⓈ-M futures connector
pub fn build_connector(
    config: ExchangeConfig,
) -> Result<BinancePerpConnector<ReqwestRest>, ExchangeError> {
    let (rest_default, ws_api_default, stream_default) = if config.testnet {
        (TESTNET_REST_URL, TESTNET_WS_API_URL, TESTNET_STREAM_URL)
    } else {
        (REST_URL, WS_API_URL, STREAM_URL)
    };

    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| rest_default.to_string());
    let ws_api_url = config
        .ws_api_url
        .clone()
        .unwrap_or_else(|| ws_api_default.to_string());
    let stream_url = config
        .stream_url
        .clone()
        .unwrap_or_else(|| stream_default.to_string());

    let credentials = config
        .has_credentials()
        .then(|| Credentials::from_config(&config));

    let rest_config = RestClientConfig::new(base_url, "binance_perp".to_string())
        .with_recv_window(config.recv_window);
    let mut rest_builder = RestClientBuilder::new(rest_config);
    if let Some(credentials) = credentials.clone() {
        rest_builder = rest_builder.with_credentials(credentials);
    }
    let rest = rest_builder.build()?;

    let ws_api = WsApiClient::new(ws_api_url, credentials).with_recv_window(config.recv_window);

    Ok(BinancePerpConnector::new(rest, ws_api, stream_url, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SubscriptionType;

    #[test]
    fn test_futures_defaults() {
        let connector = build_connector(ExchangeConfig::read_only()).unwrap();
        assert_eq!(connector.rest().inner().config().base_url, REST_URL);
        assert_eq!(connector.ws_api().url(), WS_API_URL);

        let router = connector.market_streams(
            &["BTCUSDT".to_string()],
            &[SubscriptionType::MarkPrice, SubscriptionType::BookTicker],
        );
        assert_eq!(
            router.url(),
            "wss://fstream.binance.com/stream?streams=btcusdt@markPrice/btcusdt@bookTicker"
        );
    }

    #[test]
    fn test_recv_window_reaches_rest_config() {
        let config = ExchangeConfig::new("key".to_string(), "secret".to_string())
            .testnet(true)
            .recv_window(5000);
        let connector = build_connector(config).unwrap();
        assert_eq!(connector.rest().inner().config().recv_window, Some(5000));
        assert_eq!(connector.ws_api().url(), TESTNET_WS_API_URL);
    }
}
