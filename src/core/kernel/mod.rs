/// Connector kernel - signing pipeline and transports
///
/// The kernel knows nothing about individual endpoints. It turns request
/// envelopes into signed HTTP requests or WebSocket API frames, and turns
/// stream frames into typed events.
///
/// # Architecture
///
/// ## Signing
/// - `Signer`: one implementation per algorithm (HMAC-SHA256, RSA, Ed25519)
/// - `Credentials`: API key, secret material and the selected signer
/// - `RequestEnvelope`: method, path, auth requirement and sorted parameters
///
/// ## Transport
/// - `RestClient` / `ReqwestRest`: one HTTP attempt per envelope
/// - `WsConnection`: one WebSocket with a background receive loop
/// - `WsApiCorrelator` / `WsApiClient`: request/response over a WebSocket
/// - `StreamRouter`: push streams decoded through a `StreamCodec`
///
/// # Example
/// ```rust,no_run
/// use binance_connector::core::kernel::*;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), binance_connector::core::errors::ExchangeError> {
/// let credentials = Credentials::new(
///     "api_key".to_string(),
///     "secret_key".to_string(),
///     SigningAlgorithm::HmacSha256,
/// );
/// let rest = ReqwestRest::new(
///     "https://api.binance.com".to_string(),
///     "binance".to_string(),
///     Some(credentials),
/// )?;
///
/// let envelope = RequestEnvelope::get("/api/v3/account", AuthRequirement::Signed)
///     .with("omitZeroBalances", &true);
/// let account: serde_json::Value = rest
///     .invoke_json(envelope, &CancellationToken::new())
///     .await?;
/// # Ok(())
/// # }
/// ```
pub mod codec;
pub mod request;
pub mod rest;
pub mod signer;
pub mod stream;
pub mod ws;
pub mod ws_api;

pub use codec::{
    decode_payload, EventHeader, StreamCodec, StreamDecoder, StreamItem, StreamMode, TypedCodec,
};
pub use request::{
    encode_params, timestamp_ms, AuthRequirement, FinalizedRequest, QueryValue, RequestEnvelope,
    API_KEY_HEADER,
};
pub use rest::{ReqwestRest, RestClient, RestClientBuilder, RestClientConfig, RestResponse};
pub use signer::{
    Credentials, Ed25519Signer, HmacSigner, RsaSigner, Signer, SigningAlgorithm,
};
pub use stream::{combined_stream_url, raw_stream_url, StreamRouter, StreamSubscription};
pub use ws::{WsConnection, WsReceivers, WsState};
pub use ws_api::{
    RateLimit, WsApiClient, WsApiCorrelator, WsApiError, WsApiSession, WsEnvelope,
};
