use crate::core::errors::ExchangeError;
use crate::core::kernel::request::{timestamp_ms, AuthRequirement, RequestEnvelope};
use crate::core::kernel::signer::Credentials;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace};

/// REST client trait for invoking request envelopes
///
/// One call is one attempt: there are no retries and no backoff. Callers
/// express deadlines and cancellation through the token.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Finalize, sign and send one envelope
    ///
    /// # Arguments
    /// * `envelope` - The request to send; consumed by the call
    /// * `cancel` - Aborts the in-flight request when triggered
    ///
    /// # Returns
    /// The raw response for 2xx replies. Non-2xx replies become
    /// `ExchangeError::ApiError` carrying the raw body.
    async fn invoke(
        &self,
        envelope: RequestEnvelope,
        cancel: &CancellationToken,
    ) -> Result<RestResponse, ExchangeError>;

    /// Invoke and decode the body into `T`
    async fn invoke_json<T: DeserializeOwned>(
        &self,
        envelope: RequestEnvelope,
        cancel: &CancellationToken,
    ) -> Result<T, ExchangeError> {
        self.invoke(envelope, cancel).await?.json()
    }

    /// Response captured by the most recent completed exchange with the server
    fn last_response(&self) -> Option<RestResponse>;
}

/// Raw HTTP reply: status, headers and body exactly as received
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

impl RestResponse {
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Decode the body into `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ExchangeError> {
        serde_json::from_str(&self.body).map_err(|e| {
            ExchangeError::DeserializationError(format!("Failed to deserialize JSON: {}", e))
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Request weight consumed in the current minute, as reported by the exchange
    pub fn used_weight(&self) -> Option<u64> {
        self.header("x-mbx-used-weight-1m")
            .and_then(|value| value.parse().ok())
    }

    /// Application error for a non-2xx reply
    ///
    /// Uses the exchange's `{code, msg}` body when present, otherwise the HTTP
    /// status and the raw body.
    pub fn to_api_error(&self) -> ExchangeError {
        let (code, message) = match serde_json::from_str::<ApiErrorBody>(&self.body) {
            Ok(parsed) => (parsed.code, parsed.msg),
            Err(_) => (i64::from(self.status), self.body.clone()),
        };

        ExchangeError::ApiError {
            status: self.status,
            code,
            message,
            body: self.body.clone(),
        }
    }
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Exchange name for logging and tracing
    pub exchange_name: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string to include in requests
    pub user_agent: String,
    /// `recvWindow` added to signed requests that do not set one
    pub recv_window: Option<u64>,
}

impl RestClientConfig {
    /// Create a new configuration
    ///
    /// # Arguments
    /// * `base_url` - Base URL for the API
    /// * `exchange_name` - Name of the exchange
    pub fn new(base_url: String, exchange_name: String) -> Self {
        Self {
            base_url,
            exchange_name,
            timeout_seconds: 30,
            user_agent: concat!("binance-connector-rust/", env!("CARGO_PKG_VERSION")).to_string(),
            recv_window: None,
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_recv_window(mut self, recv_window: Option<u64>) -> Self {
        self.recv_window = recv_window;
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    config: RestClientConfig,
    credentials: Option<Credentials>,
}

impl RestClientBuilder {
    /// Create a new builder with the given configuration
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            credentials: None,
        }
    }

    /// Set the credentials for authenticated requests
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Build the REST client
    pub fn build(self) -> Result<ReqwestRest, ExchangeError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(self.config.timeout_seconds))
            .user_agent(&self.config.user_agent)
            .build()
            .map_err(|e| ExchangeError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(ReqwestRest {
            client,
            config: self.config,
            credentials: self.credentials,
            last_response: Arc::new(Mutex::new(None)),
        })
    }
}

/// Implementation of `RestClient` using reqwest
#[derive(Clone)]
pub struct ReqwestRest {
    client: Client,
    config: RestClientConfig,
    credentials: Option<Credentials>,
    last_response: Arc<Mutex<Option<RestResponse>>>,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .field("has_credentials", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}

impl ReqwestRest {
    /// Create a new `ReqwestRest` instance with default settings
    pub fn new(
        base_url: String,
        exchange_name: String,
        credentials: Option<Credentials>,
    ) -> Result<Self, ExchangeError> {
        let mut builder = RestClientBuilder::new(RestClientConfig::new(base_url, exchange_name));
        if let Some(credentials) = credentials {
            builder = builder.with_credentials(credentials);
        }
        builder.build()
    }

    pub const fn config(&self) -> &RestClientConfig {
        &self.config
    }

    fn store_response(&self, response: Option<RestResponse>) {
        *self
            .last_response
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = response;
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    #[instrument(
        skip(self, envelope, cancel),
        fields(exchange = %self.config.exchange_name, method = %envelope.method(), path = %envelope.path())
    )]
    async fn invoke(
        &self,
        mut envelope: RequestEnvelope,
        cancel: &CancellationToken,
    ) -> Result<RestResponse, ExchangeError> {
        self.store_response(None);

        if envelope.auth() == AuthRequirement::Signed {
            if let Some(recv_window) = self.config.recv_window {
                envelope.set_default("recvWindow", &recv_window);
            }
        }

        // timestamp is taken right before signing
        let finalized = envelope.finalize(self.credentials.as_ref(), timestamp_ms()?)?;
        let url = finalized.url(&self.config.base_url);
        trace!("Request URL: {}", url);

        let mut request = self.client.request(finalized.method, &url);
        for (key, value) in &finalized.headers {
            request = request.header(key, value);
        }
        if let Some(body) = finalized.body {
            request = request.body(body);
        }

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(ExchangeError::Cancelled),
            result = request.send() => result
                .map_err(|e| ExchangeError::NetworkError(format!("Request failed: {}", e)))?,
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = tokio::select! {
            () = cancel.cancelled() => return Err(ExchangeError::Cancelled),
            result = response.text() => result.map_err(|e| {
                ExchangeError::NetworkError(format!("Failed to read response body: {}", e))
            })?,
        };

        trace!(status = status.as_u16(), "Response body: {}", body);

        let response = RestResponse {
            status: status.as_u16(),
            headers,
            body,
        };
        self.store_response(Some(response.clone()));

        if response.is_success() {
            Ok(response)
        } else {
            Err(response.to_api_error())
        }
    }

    fn last_response(&self) -> Option<RestResponse> {
        self.last_response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
