use crate::core::errors::ExchangeError;
use crate::core::kernel::{AuthRequirement, RequestEnvelope, RestClient};
use crate::exchanges::binance::types::{BinanceListenKey, BinanceServerTime};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// REST API operations for Binance USDⓈ-M futures
#[derive(Debug, Clone)]
pub struct BinancePerpRestClient<R: RestClient> {
    rest: R,
}

impl<R: RestClient> BinancePerpRestClient<R> {
    pub const fn new(rest: R) -> Self {
        Self { rest }
    }

    pub const fn inner(&self) -> &R {
        &self.rest
    }

    #[instrument(skip(self, cancel), fields(exchange = "binance_perp"))]
    pub async fn get_server_time(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BinanceServerTime, ExchangeError> {
        let envelope = RequestEnvelope::get("/fapi/v1/time", AuthRequirement::None);
        self.rest.invoke_json(envelope, cancel).await
    }

    /// Mark price and funding for one symbol, or all symbols when `None`
    #[instrument(skip(self, cancel), fields(exchange = "binance_perp"))]
    pub async fn get_premium_index(
        &self,
        symbol: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Value, ExchangeError> {
        let mut envelope = RequestEnvelope::get("/fapi/v1/premiumIndex", AuthRequirement::None);
        if let Some(symbol) = symbol {
            envelope.set("symbol", symbol);
        }
        self.rest.invoke_json(envelope, cancel).await
    }

    #[instrument(skip(self, cancel), fields(exchange = "binance_perp"))]
    pub async fn get_balance(&self, cancel: &CancellationToken) -> Result<Value, ExchangeError> {
        let envelope = RequestEnvelope::get("/fapi/v3/balance", AuthRequirement::Signed);
        self.rest.invoke_json(envelope, cancel).await
    }

    /// Start a user data stream; an existing key is returned and extended if one is active
    #[instrument(skip(self, cancel), fields(exchange = "binance_perp"))]
    pub async fn create_listen_key(
        &self,
        cancel: &CancellationToken,
    ) -> Result<String, ExchangeError> {
        let envelope = RequestEnvelope::post("/fapi/v1/listenKey", AuthRequirement::ApiKeyOnly);
        let key: BinanceListenKey = self.rest.invoke_json(envelope, cancel).await?;
        Ok(key.listen_key)
    }

    #[instrument(skip(self, cancel), fields(exchange = "binance_perp"))]
    pub async fn keepalive_listen_key(&self, cancel: &CancellationToken) -> Result<(), ExchangeError> {
        let envelope = RequestEnvelope::put("/fapi/v1/listenKey", AuthRequirement::ApiKeyOnly);
        self.rest.invoke(envelope, cancel).await.map(|_| ())
    }

    #[instrument(skip(self, cancel), fields(exchange = "binance_perp"))]
    pub async fn close_listen_key(&self, cancel: &CancellationToken) -> Result<(), ExchangeError> {
        let envelope = RequestEnvelope::delete("/fapi/v1/listenKey", AuthRequirement::ApiKeyOnly);
        self.rest.invoke(envelope, cancel).await.map(|_| ())
    }
}
