use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{
    Credentials, ReqwestRest, RestClientBuilder, RestClientConfig, WsApiClient,
};
use crate::exchanges::binance::connector::BinanceConnector;

pub const REST_URL: &str = "https://api.binance.com";
pub const WS_API_URL: &str = "wss://ws-api.binance.com:443/ws-api/v3";
pub const STREAM_URL: &str = "wss://stream.binance.com:9443";

pub const TESTNET_REST_URL: &str = "https://testnet.binance.vision";
pub const TESTNET_WS_API_URL: &str = "wss://ws-api.testnet.binance.vision/ws-api/v3";
pub const TESTNET_STREAM_URL: &str = "wss://stream.testnet.binance.vision";

fn resolve(custom: Option<&String>, testnet: bool, mainnet: &str, test: &str) -> String {
    custom.cloned().unwrap_or_else(|| {
        if testnet {
            test.to_string()
        } else {
            mainnet.to_string()
        }
    })
}

/// Create a Binance spot connector
///
/// Explicit URLs in `config` win over the mainnet/testnet defaults.
/// Credentials are attached only when both key and secret are present.
pub fn build_connector(
    config: ExchangeConfig,
) -> Result<BinanceConnector<ReqwestRest>, ExchangeError> {
    let base_url = resolve(
        config.base_url.as_ref(),
        config.testnet,
        REST_URL,
        TESTNET_REST_URL,
    );
    let ws_api_url = resolve(
        config.ws_api_url.as_ref(),
        config.testnet,
        WS_API_URL,
        TESTNET_WS_API_URL,
    );
    let stream_url = resolve(
        config.stream_url.as_ref(),
        config.testnet,
        STREAM_URL,
        TESTNET_STREAM_URL,
    );

    let credentials = config
        .has_credentials()
        .then(|| Credentials::from_config(&config));

    let rest_config = RestClientConfig::new(base_url, "binance".to_string())
        .with_recv_window(config.recv_window);
    let mut rest_builder = RestClientBuilder::new(rest_config);
    if let Some(credentials) = credentials.clone() {
        rest_builder = rest_builder.with_credentials(credentials);
    }
    let rest = rest_builder.build()?;

    let ws_api = WsApiClient::new(ws_api_url, credentials).with_recv_window(config.recv_window);

    Ok(BinanceConnector::new(rest, ws_api, stream_url, config))
}
