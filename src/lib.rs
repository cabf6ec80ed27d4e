pub mod core;
pub mod exchanges;

pub use crate::core::config::ExchangeConfig;
pub use crate::core::errors::ExchangeError;
pub use crate::core::kernel::{
    AuthRequirement, Credentials, RequestEnvelope, RestClient, SigningAlgorithm, StreamMode,
    StreamRouter, WsApiClient,
};
pub use crate::core::types::*;
pub use crate::exchanges::binance::BinanceConnector;
pub use crate::exchanges::binance_perp::BinancePerpConnector;
