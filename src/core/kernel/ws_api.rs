use crate::core::errors::ExchangeError;
use crate::core::kernel::request::{timestamp_ms, AuthRequirement, RequestEnvelope};
use crate::core::kernel::signer::Credentials;
use crate::core::kernel::ws::{WsConnection, WsReceivers};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Reply frame of the WebSocket API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsEnvelope {
    #[serde(default)]
    pub id: Value,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WsApiError>,
    #[serde(rename = "rateLimits", default, skip_serializing_if = "Option::is_none")]
    pub rate_limits: Option<Vec<RateLimit>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsApiError {
    pub code: i64,
    pub msg: String,
}

/// Rate-limit usage snapshot attached to a WS API reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    pub rate_limit_type: String,
    pub interval: String,
    pub interval_num: u32,
    pub limit: u64,
    #[serde(default)]
    pub count: Option<u64>,
}

impl WsEnvelope {
    /// Correlation key; ids may come back as strings or numbers
    pub fn id_key(&self) -> Option<String> {
        match &self.id {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    /// Map a populated `error` to `ExchangeError::ApiError`, otherwise decode `result`
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, ExchangeError> {
        if let Some(error) = &self.error {
            return Err(ExchangeError::ApiError {
                status: self.status,
                code: error.code,
                message: error.msg.clone(),
                body: serde_json::to_string(&self).unwrap_or_default(),
            });
        }

        serde_json::from_value(self.result.unwrap_or(Value::Null)).map_err(|e| {
            ExchangeError::DeserializationError(format!("Failed to deserialize result: {}", e))
        })
    }
}

type Reply = Result<WsEnvelope, ExchangeError>;
type PendingCalls = Arc<Mutex<HashMap<String, oneshot::Sender<Reply>>>>;

fn lock_pending(
    pending: &PendingCalls,
) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<Reply>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Request/response multiplexer over one WebSocket API connection
///
/// Every call gets a fresh id; a router task matches each reply's `id` to
/// the waiting caller, so any number of calls may be in flight at once and
/// replies may arrive in any order.
pub struct WsApiCorrelator {
    connection: WsConnection,
    pending: PendingCalls,
}

impl std::fmt::Debug for WsApiCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsApiCorrelator")
            .field("connection", &self.connection)
            .field("pending", &lock_pending(&self.pending).len())
            .finish()
    }
}

impl WsApiCorrelator {
    /// Take ownership of a connection and start routing its replies
    pub fn new(connection: WsConnection, receivers: WsReceivers) -> Self {
        let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(route_replies(receivers, Arc::clone(&pending)));
        Self {
            connection,
            pending,
        }
    }

    pub async fn connect(url: &str, cancel: &CancellationToken) -> Result<Self, ExchangeError> {
        let (connection, receivers) = WsConnection::connect(url, cancel).await?;
        Ok(Self::new(connection, receivers))
    }

    pub const fn connection(&self) -> &WsConnection {
        &self.connection
    }

    /// Send one `{id, method, params}` frame and wait for its reply
    ///
    /// Resolves on the matching reply, on a connection error, or on
    /// cancellation, whichever comes first.
    #[instrument(skip(self, params, cancel), fields(url = %self.connection.url()))]
    pub async fn call(
        &self,
        method: &str,
        params: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<WsEnvelope, ExchangeError> {
        let id = Uuid::new_v4().to_string();
        let (reply_tx, reply_rx) = oneshot::channel();
        lock_pending(&self.pending).insert(id.clone(), reply_tx);

        let frame = if params.is_empty() {
            json!({ "id": id, "method": method })
        } else {
            json!({ "id": id, "method": method, "params": params })
        };

        if let Err(e) = self.connection.send(frame.to_string()).await {
            self.forget(&id);
            return Err(e);
        }
        debug!(id = %id, "WebSocket API request sent");

        tokio::select! {
            () = cancel.cancelled() => {
                self.forget(&id);
                Err(ExchangeError::Cancelled)
            }
            reply = reply_rx => reply.unwrap_or_else(|_| {
                Err(ExchangeError::ConnectionClosed(
                    "WebSocket API connection closed before reply".to_string(),
                ))
            }),
        }
    }

    pub async fn close(&self) -> Result<(), ExchangeError> {
        self.connection.close().await
    }

    fn forget(&self, id: &str) {
        lock_pending(&self.pending).remove(id);
    }
}

async fn route_replies(mut receivers: WsReceivers, pending: PendingCalls) {
    loop {
        tokio::select! {
            biased;
            frame = receivers.messages.recv() => match frame {
                Some(frame) => deliver(&pending, &frame),
                None => break,
            },
            error = receivers.errors.recv() => {
                if let Some(error) = error {
                    fail_all(&pending, &error);
                    return;
                }
            }
        }
    }

    if let Ok(error) = receivers.errors.try_recv() {
        fail_all(&pending, &error);
    } else {
        fail_all(
            &pending,
            &ExchangeError::ConnectionClosed("WebSocket API connection closed".to_string()),
        );
    }
}

fn deliver(pending: &PendingCalls, frame: &[u8]) {
    let reply: Reply = serde_json::from_slice::<WsEnvelope>(frame).map_err(|e| {
        ExchangeError::DeserializationError(format!("Failed to parse WebSocket API reply: {}", e))
    });

    let id = match &reply {
        Ok(envelope) => envelope.id_key(),
        // still route a malformed reply when its id is readable
        Err(_) => serde_json::from_slice::<Value>(frame)
            .ok()
            .and_then(|value| match value.get("id") {
                Some(Value::String(id)) => Some(id.clone()),
                Some(Value::Number(id)) => Some(id.to_string()),
                _ => None,
            }),
    };

    let mut waiting = lock_pending(pending);
    let Some(id) = id else {
        // replies to unparseable requests carry `"id": null`
        if waiting.len() == 1 {
            if let Some(waiter) = waiting.drain().next().map(|(_, waiter)| waiter) {
                let _ = waiter.send(reply);
            }
            return;
        }
        warn!("Dropping WebSocket API frame without id: {}", String::from_utf8_lossy(frame));
        return;
    };

    match waiting.remove(&id) {
        Some(waiter) => {
            let _ = waiter.send(reply);
        }
        None => debug!(id = %id, "No pending call for WebSocket API reply"),
    }
}

fn fail_all(pending: &PendingCalls, error: &ExchangeError) {
    for (_, waiter) in lock_pending(pending).drain() {
        let _ = waiter.send(Err(replicate(error)));
    }
}

// ExchangeError is not Clone; connection failures are string-backed
fn replicate(error: &ExchangeError) -> ExchangeError {
    match error {
        ExchangeError::NetworkError(msg) => ExchangeError::NetworkError(msg.clone()),
        ExchangeError::ConnectionClosed(msg) => ExchangeError::ConnectionClosed(msg.clone()),
        ExchangeError::Cancelled => ExchangeError::Cancelled,
        other => ExchangeError::NetworkError(other.to_string()),
    }
}

/// WebSocket API client
///
/// Signs envelopes exactly like the REST path, except that parameters travel
/// as an inline object. `request` opens a connection per call and always
/// closes it; `connect` keeps one connection for many calls.
#[derive(Debug, Clone)]
pub struct WsApiClient {
    url: String,
    credentials: Option<Credentials>,
    recv_window: Option<u64>,
}

impl WsApiClient {
    pub fn new(url: String, credentials: Option<Credentials>) -> Self {
        Self {
            url,
            credentials,
            recv_window: None,
        }
    }

    pub fn with_recv_window(mut self, recv_window: Option<u64>) -> Self {
        self.recv_window = recv_window;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn prepare(&self, mut envelope: RequestEnvelope) -> Result<(String, Map<String, Value>), ExchangeError> {
        if envelope.auth() == AuthRequirement::Signed {
            if let Some(recv_window) = self.recv_window {
                envelope.set_default("recvWindow", &recv_window);
            }
        }
        let params = envelope.finalize_ws_params(self.credentials.as_ref(), timestamp_ms()?)?;
        Ok((envelope.path().to_string(), params))
    }

    /// One request on a dedicated connection
    ///
    /// Signing happens before connecting, so bad key material never causes
    /// network I/O. The connection is closed on every outcome.
    #[instrument(skip(self, envelope, cancel), fields(url = %self.url, method = %envelope.path()))]
    pub async fn request(
        &self,
        envelope: RequestEnvelope,
        cancel: &CancellationToken,
    ) -> Result<WsEnvelope, ExchangeError> {
        let (method, params) = self.prepare(envelope)?;
        let correlator = WsApiCorrelator::connect(&self.url, cancel).await?;

        let result = correlator.call(&method, params, cancel).await;
        if let Err(e) = correlator.close().await {
            debug!("Failed to close WebSocket API connection: {}", e);
        }
        result
    }

    /// [`Self::request`] followed by [`WsEnvelope::into_result`]
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        envelope: RequestEnvelope,
        cancel: &CancellationToken,
    ) -> Result<T, ExchangeError> {
        self.request(envelope, cancel).await?.into_result()
    }

    /// Open a long-lived session for concurrent requests
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<WsApiSession, ExchangeError> {
        let correlator = WsApiCorrelator::connect(&self.url, cancel).await?;
        Ok(WsApiSession {
            client: self.clone(),
            correlator,
        })
    }
}

/// Persistent WebSocket API connection shared by many calls
#[derive(Debug)]
pub struct WsApiSession {
    client: WsApiClient,
    correlator: WsApiCorrelator,
}

impl WsApiSession {
    pub async fn request(
        &self,
        envelope: RequestEnvelope,
        cancel: &CancellationToken,
    ) -> Result<WsEnvelope, ExchangeError> {
        let (method, params) = self.client.prepare(envelope)?;
        self.correlator.call(&method, params, cancel).await
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        envelope: RequestEnvelope,
        cancel: &CancellationToken,
    ) -> Result<T, ExchangeError> {
        self.request(envelope, cancel).await?.into_result()
    }

    pub const fn correlator(&self) -> &WsApiCorrelator {
        &self.correlator
    }

    pub async fn close(&self) -> Result<(), ExchangeError> {
        self.correlator.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_with_result() {
        let raw = r#"{
            "id": "922bcc6e-9de8-440d-9e84-7c80933a8d0d",
            "status": 200,
            "result": {"serverTime": 1656400526260},
            "rateLimits": [
                {"rateLimitType": "REQUEST_WEIGHT", "interval": "MINUTE", "intervalNum": 1, "limit": 6000, "count": 1}
            ]
        }"#;
        let envelope: WsEnvelope = serde_json::from_str(raw).unwrap();

        assert_eq!(
            envelope.id_key().as_deref(),
            Some("922bcc6e-9de8-440d-9e84-7c80933a8d0d")
        );
        let limits = envelope.rate_limits.clone().unwrap();
        assert_eq!(limits[0].rate_limit_type, "REQUEST_WEIGHT");
        assert_eq!(limits[0].count, Some(1));

        let result: Value = envelope.into_result().unwrap();
        assert_eq!(result["serverTime"], 1_656_400_526_260_u64);
    }

    #[test]
    fn test_envelope_error_maps_to_api_error() {
        let raw = r#"{"id": 3, "status": 400, "error": {"code": -1102, "msg": "Mandatory parameter 'symbol' was not sent"}}"#;
        let envelope: WsEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.id_key().as_deref(), Some("3"));

        let err = envelope.into_result::<Value>().unwrap_err();
        assert_eq!(err.api_code(), Some(-1102));
        assert!(err.to_string().contains("symbol"));
        assert!(err.raw_body().unwrap().contains("-1102"));
    }

    #[test]
    fn test_deliver_routes_by_id() {
        let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
        let (first_tx, mut first_rx) = oneshot::channel();
        let (second_tx, mut second_rx) = oneshot::channel();
        lock_pending(&pending).insert("a".to_string(), first_tx);
        lock_pending(&pending).insert("b".to_string(), second_tx);

        deliver(&pending, br#"{"id":"b","status":200,"result":2}"#);
        deliver(&pending, br#"{"id":"a","status":200,"result":1}"#);

        assert_eq!(first_rx.try_recv().unwrap().unwrap().result, Some(Value::from(1)));
        assert_eq!(second_rx.try_recv().unwrap().unwrap().result, Some(Value::from(2)));
        assert!(lock_pending(&pending).is_empty());
    }

    #[test]
    fn test_malformed_reply_reaches_caller() {
        let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
        let (tx, mut rx) = oneshot::channel();
        lock_pending(&pending).insert("a".to_string(), tx);

        deliver(&pending, br#"{"id":"a","status":"not-a-number"}"#);

        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(ExchangeError::DeserializationError(_))
        ));
    }
}
