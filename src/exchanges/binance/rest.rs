use crate::core::errors::ExchangeError;
use crate::core::kernel::{AuthRequirement, RequestEnvelope, RestClient};
use crate::exchanges::binance::types::{BinanceAccountInfo, BinanceListenKey, BinanceServerTime};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// REST API operations for Binance spot
#[derive(Debug, Clone)]
pub struct BinanceRestClient<R: RestClient> {
    rest: R,
}

impl<R: RestClient> BinanceRestClient<R> {
    pub const fn new(rest: R) -> Self {
        Self { rest }
    }

    /// Underlying transport, for endpoints without a typed wrapper
    pub const fn inner(&self) -> &R {
        &self.rest
    }

    #[instrument(skip(self, cancel), fields(exchange = "binance"))]
    pub async fn ping(&self, cancel: &CancellationToken) -> Result<(), ExchangeError> {
        let envelope = RequestEnvelope::get("/api/v3/ping", AuthRequirement::None);
        self.rest.invoke(envelope, cancel).await.map(|_| ())
    }

    #[instrument(skip(self, cancel), fields(exchange = "binance"))]
    pub async fn get_server_time(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BinanceServerTime, ExchangeError> {
        let envelope = RequestEnvelope::get("/api/v3/time", AuthRequirement::None);
        self.rest.invoke_json(envelope, cancel).await
    }

    #[instrument(skip(self, cancel), fields(exchange = "binance"))]
    pub async fn get_exchange_info(
        &self,
        symbols: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Value, ExchangeError> {
        let mut envelope = RequestEnvelope::get("/api/v3/exchangeInfo", AuthRequirement::None);
        if !symbols.is_empty() {
            envelope.set("symbols", symbols);
        }
        self.rest.invoke_json(envelope, cancel).await
    }

    #[instrument(skip(self, cancel), fields(exchange = "binance"))]
    pub async fn get_account(
        &self,
        omit_zero_balances: bool,
        cancel: &CancellationToken,
    ) -> Result<BinanceAccountInfo, ExchangeError> {
        let envelope = RequestEnvelope::get("/api/v3/account", AuthRequirement::Signed)
            .with("omitZeroBalances", &omit_zero_balances);
        self.rest.invoke_json(envelope, cancel).await
    }

    /// Open a user data stream and return its listen key
    #[instrument(skip(self, cancel), fields(exchange = "binance"))]
    pub async fn create_listen_key(
        &self,
        cancel: &CancellationToken,
    ) -> Result<String, ExchangeError> {
        let envelope = RequestEnvelope::post("/api/v3/userDataStream", AuthRequirement::ApiKeyOnly);
        let key: BinanceListenKey = self.rest.invoke_json(envelope, cancel).await?;
        Ok(key.listen_key)
    }

    /// Extend a listen key's validity by 60 minutes
    #[instrument(skip(self, listen_key, cancel), fields(exchange = "binance"))]
    pub async fn keepalive_listen_key(
        &self,
        listen_key: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ExchangeError> {
        let envelope = RequestEnvelope::put("/api/v3/userDataStream", AuthRequirement::ApiKeyOnly)
            .with("listenKey", listen_key);
        self.rest.invoke(envelope, cancel).await.map(|_| ())
    }

    #[instrument(skip(self, listen_key, cancel), fields(exchange = "binance"))]
    pub async fn close_listen_key(
        &self,
        listen_key: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ExchangeError> {
        let envelope =
            RequestEnvelope::delete("/api/v3/userDataStream", AuthRequirement::ApiKeyOnly)
                .with("listenKey", listen_key);
        self.rest.invoke(envelope, cancel).await.map(|_| ())
    }
}
