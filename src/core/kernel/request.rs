use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::Credentials;
use reqwest::Method;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use url::form_urlencoded;

pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Authentication level declared by an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuthRequirement {
    None,
    ApiKeyOnly,
    Signed,
}

/// Conversion of a parameter value into its wire string form
///
/// String lists are rendered as `["a","b"]`, the exchange's convention for
/// array parameters. Everything else uses its `Display` form.
pub trait QueryValue {
    fn to_query_value(&self) -> String;
}

macro_rules! display_query_value {
    ($($t:ty),* $(,)?) => {
        $(
            impl QueryValue for $t {
                fn to_query_value(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

display_query_value!(
    str,
    String,
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    rust_decimal::Decimal,
);

impl<T: QueryValue + ?Sized> QueryValue for &T {
    fn to_query_value(&self) -> String {
        (**self).to_query_value()
    }
}

fn bracketed_list<S: AsRef<str>>(items: &[S]) -> String {
    let quoted: Vec<String> = items
        .iter()
        .map(|item| format!("\"{}\"", item.as_ref()))
        .collect();
    format!("[{}]", quoted.join(","))
}

impl QueryValue for [String] {
    fn to_query_value(&self) -> String {
        bracketed_list(self)
    }
}

impl QueryValue for [&str] {
    fn to_query_value(&self) -> String {
        bracketed_list(self)
    }
}

impl QueryValue for Vec<String> {
    fn to_query_value(&self) -> String {
        bracketed_list(self)
    }
}

impl QueryValue for Vec<&str> {
    fn to_query_value(&self) -> String {
        bracketed_list(self)
    }
}

impl<const N: usize> QueryValue for [&str; N] {
    fn to_query_value(&self) -> String {
        bracketed_list(self)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn timestamp_ms() -> Result<u64, ExchangeError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .map_err(|e| ExchangeError::Other(format!("System time error: {}", e)))
}

/// Form-encode a parameter map in key order
pub fn encode_params(params: &BTreeMap<String, String>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

fn encode_component(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// One outgoing call before transport
///
/// Query and form parameters are kept in ordered maps: keys are unique,
/// the last write wins, and encoding is always in key order.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    method: Method,
    path: String,
    auth: AuthRequirement,
    query: BTreeMap<String, String>,
    form: BTreeMap<String, String>,
    headers: Vec<(String, String)>,
}

/// Transport-ready output of [`RequestEnvelope::finalize`]
#[derive(Debug, Clone)]
pub struct FinalizedRequest {
    pub method: Method,
    /// `path` plus the encoded query string, without the endpoint
    pub path_and_query: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl FinalizedRequest {
    /// Fully qualified URL against a base endpoint
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}", endpoint.trim_end_matches('/'), self.path_and_query)
    }
}

impl RequestEnvelope {
    pub fn new(method: Method, path: impl Into<String>, auth: AuthRequirement) -> Self {
        Self {
            method,
            path: path.into(),
            auth,
            query: BTreeMap::new(),
            form: BTreeMap::new(),
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>, auth: AuthRequirement) -> Self {
        Self::new(Method::GET, path, auth)
    }

    pub fn post(path: impl Into<String>, auth: AuthRequirement) -> Self {
        Self::new(Method::POST, path, auth)
    }

    pub fn put(path: impl Into<String>, auth: AuthRequirement) -> Self {
        Self::new(Method::PUT, path, auth)
    }

    pub fn delete(path: impl Into<String>, auth: AuthRequirement) -> Self {
        Self::new(Method::DELETE, path, auth)
    }

    pub const fn auth(&self) -> AuthRequirement {
        self.auth
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub const fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    pub const fn form(&self) -> &BTreeMap<String, String> {
        &self.form
    }

    /// Upsert a query parameter
    pub fn set<V: QueryValue + ?Sized>(&mut self, key: impl Into<String>, value: &V) -> &mut Self {
        self.query.insert(key.into(), value.to_query_value());
        self
    }

    /// Builder form of [`Self::set`]
    pub fn with<V: QueryValue + ?Sized>(mut self, key: impl Into<String>, value: &V) -> Self {
        self.set(key, value);
        self
    }

    /// Upsert a form-body parameter
    pub fn set_form<V: QueryValue + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &V,
    ) -> &mut Self {
        self.form.insert(key.into(), value.to_query_value());
        self
    }

    /// Override or add a request header
    pub fn header(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&key));
        self.headers.push((key, value.into()));
        self
    }

    /// Set a query parameter only if it is absent
    pub fn set_default<V: QueryValue + ?Sized>(&mut self, key: &str, value: &V) -> &mut Self {
        if !self.query.contains_key(key) {
            self.query.insert(key.to_string(), value.to_query_value());
        }
        self
    }

    /// Bytes covered by the signature: `urlencode(query) + urlencode(form)`
    pub fn canonical_payload(
        query: &BTreeMap<String, String>,
        form: &BTreeMap<String, String>,
    ) -> String {
        let mut payload = encode_params(query);
        payload.push_str(&encode_params(form));
        payload
    }

    fn require_api_key(credentials: Option<&Credentials>) -> Result<&Credentials, ExchangeError> {
        match credentials {
            Some(credentials) if !credentials.api_key().is_empty() => Ok(credentials),
            _ => Err(ExchangeError::AuthError(
                "Authentication required but no credentials provided".to_string(),
            )),
        }
    }

    /// Attach authentication and produce the transport payload
    ///
    /// `now_ms` must be taken immediately before this call. The envelope is
    /// not modified, so every call yields a fresh timestamp and signature.
    pub fn finalize(
        &self,
        credentials: Option<&Credentials>,
        now_ms: u64,
    ) -> Result<FinalizedRequest, ExchangeError> {
        let mut headers = self.headers.clone();
        let mut query = self.query.clone();
        let mut signature = None;

        if self.auth >= AuthRequirement::ApiKeyOnly {
            let credentials = Self::require_api_key(credentials)?;
            headers.push((API_KEY_HEADER.to_string(), credentials.api_key().to_string()));

            if self.auth == AuthRequirement::Signed {
                query.insert("timestamp".to_string(), now_ms.to_string());
                let payload = Self::canonical_payload(&query, &self.form);
                signature = Some(credentials.sign(payload.as_bytes())?);
            }
        }

        let mut query_string = encode_params(&query);
        if let Some(signature) = signature {
            if !query_string.is_empty() {
                query_string.push('&');
            }
            query_string.push_str("signature=");
            query_string.push_str(&encode_component(&signature));
        }

        let path_and_query = if query_string.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, query_string)
        };

        let body = if self.form.is_empty() {
            None
        } else {
            headers.push(("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()));
            Some(encode_params(&self.form))
        };

        Ok(FinalizedRequest {
            method: self.method.clone(),
            path_and_query,
            headers,
            body,
        })
    }

    /// WS API variant of [`Self::finalize`]: parameters are returned as an
    /// inline object instead of a query string
    ///
    /// For keyed requests `apiKey` becomes a parameter; signed requests
    /// cover every parameter (including `apiKey` and `timestamp`) in key order.
    pub fn finalize_ws_params(
        &self,
        credentials: Option<&Credentials>,
        now_ms: u64,
    ) -> Result<Map<String, Value>, ExchangeError> {
        let mut params = self.query.clone();
        params.extend(self.form.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut signature = None;
        if self.auth >= AuthRequirement::ApiKeyOnly {
            let credentials = Self::require_api_key(credentials)?;
            params.insert("apiKey".to_string(), credentials.api_key().to_string());

            if self.auth == AuthRequirement::Signed {
                params.insert("timestamp".to_string(), now_ms.to_string());
                let payload = encode_params(&params);
                signature = Some(credentials.sign(payload.as_bytes())?);
            }
        }

        let mut object: Map<String, Value> = params
            .into_iter()
            .map(|(k, v)| (k, ws_param_value(v)))
            .collect();
        if let Some(signature) = signature {
            object.insert("signature".to_string(), Value::String(signature));
        }

        Ok(object)
    }
}

// Bracketed lists, booleans and integers travel as JSON values on the WS API,
// but only when the JSON text is exactly the signed string
fn ws_param_value(value: String) -> Value {
    match value.as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if value.starts_with('[') {
        if let Ok(parsed @ Value::Array(_)) = serde_json::from_str::<Value>(&value) {
            if parsed.to_string() == value {
                return parsed;
            }
        }
    }
    if let Ok(number) = value.parse::<i64>() {
        if number.to_string() == value {
            return Value::from(number);
        }
    }
    Value::String(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kernel::signer::{HmacSigner, Signer, SigningAlgorithm};

    fn credentials() -> Credentials {
        Credentials::new(
            "api-key".to_string(),
            "secret".to_string(),
            SigningAlgorithm::HmacSha256,
        )
    }

    fn query_param(path_and_query: &str, key: &str) -> Option<String> {
        let (_, query) = path_and_query.split_once('?')?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_set_is_upsert() {
        let mut envelope = RequestEnvelope::get("/api/v3/order", AuthRequirement::None);
        envelope.set("symbol", "BTCUSDT").set("symbol", "ETHUSDT").set("limit", &5);

        assert_eq!(envelope.query().len(), 2);
        assert_eq!(envelope.query()["symbol"], "ETHUSDT");
        assert_eq!(envelope.query()["limit"], "5");
    }

    #[test]
    fn test_string_lists_are_bracketed() {
        let envelope = RequestEnvelope::get("/api/v3/ticker", AuthRequirement::None)
            .with("symbols", &vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()])
            .with("permissions", &["SPOT"]);

        assert_eq!(envelope.query()["symbols"], r#"["BTCUSDT","ETHUSDT"]"#);
        assert_eq!(envelope.query()["permissions"], r#"["SPOT"]"#);
    }

    #[test]
    fn test_unauthenticated_request() {
        let envelope = RequestEnvelope::get("/api/v3/depth", AuthRequirement::None)
            .with("symbol", "BTCUSDT");
        let finalized = envelope.finalize(Some(&credentials()), 1).unwrap();

        assert_eq!(finalized.path_and_query, "/api/v3/depth?symbol=BTCUSDT");
        assert!(finalized.headers.is_empty());
        assert!(finalized.body.is_none());
        assert_eq!(
            finalized.url("https://api.binance.com/"),
            "https://api.binance.com/api/v3/depth?symbol=BTCUSDT"
        );
    }

    #[test]
    fn test_api_key_only_has_header_but_no_signature() {
        let envelope = RequestEnvelope::post("/api/v3/userDataStream", AuthRequirement::ApiKeyOnly);
        let finalized = envelope.finalize(Some(&credentials()), 1).unwrap();

        assert_eq!(finalized.path_and_query, "/api/v3/userDataStream");
        assert!(finalized
            .headers
            .contains(&(API_KEY_HEADER.to_string(), "api-key".to_string())));
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let envelope = RequestEnvelope::get("/api/v3/account", AuthRequirement::Signed);
        let empty = Credentials::new(String::new(), "s".to_string(), SigningAlgorithm::HmacSha256);
        assert!(matches!(
            envelope.finalize(Some(&empty), 1),
            Err(ExchangeError::AuthError(_))
        ));
        assert!(matches!(
            envelope.finalize(None, 1),
            Err(ExchangeError::AuthError(_))
        ));
    }

    #[test]
    fn test_canonicalization_order() {
        let mut envelope = RequestEnvelope::post("/api/v3/order", AuthRequirement::Signed);
        envelope.set("b", &2).set("a", &1).set_form("c", &3);
        let now = 1_700_000_000_000_u64;

        let finalized = envelope.finalize(Some(&credentials()), now).unwrap();

        let expected_payload = format!("a=1&b=2&timestamp={}c=3", now);
        let expected_signature = HmacSigner.sign("secret", expected_payload.as_bytes()).unwrap();
        assert_eq!(
            finalized.path_and_query,
            format!("/api/v3/order?a=1&b=2&timestamp={}&signature={}", now, expected_signature)
        );
        assert_eq!(finalized.body.as_deref(), Some("c=3"));
        assert!(finalized
            .headers
            .contains(&("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string())));
    }

    #[test]
    fn test_canonical_payload_concatenates_without_separator() {
        let mut query = BTreeMap::new();
        query.insert("b".to_string(), "2".to_string());
        query.insert("a".to_string(), "1".to_string());
        let mut form = BTreeMap::new();
        form.insert("c".to_string(), "3".to_string());

        assert_eq!(RequestEnvelope::canonical_payload(&query, &form), "a=1&b=2c=3");
    }

    #[test]
    fn test_signature_on_empty_query() {
        let envelope = RequestEnvelope::get("/api/v3/account", AuthRequirement::Signed);
        let finalized = envelope.finalize(Some(&credentials()), 42).unwrap();

        let expected = HmacSigner.sign("secret", b"timestamp=42").unwrap();
        assert_eq!(
            finalized.path_and_query,
            format!("/api/v3/account?timestamp=42&signature={}", expected)
        );
    }

    #[test]
    fn test_timestamp_freshness() {
        let envelope = RequestEnvelope::get("/api/v3/openOrders", AuthRequirement::Signed)
            .with("symbol", "BTCUSDT");

        let first = envelope.finalize(Some(&credentials()), 1_000).unwrap();
        let second = envelope.finalize(Some(&credentials()), 2_000).unwrap();

        assert_eq!(query_param(&first.path_and_query, "timestamp").unwrap(), "1000");
        assert_eq!(query_param(&second.path_and_query, "timestamp").unwrap(), "2000");
        assert_ne!(
            query_param(&first.path_and_query, "signature"),
            query_param(&second.path_and_query, "signature")
        );
        // the envelope itself never caches a timestamp
        assert!(!envelope.query().contains_key("timestamp"));
    }

    #[test]
    fn test_values_are_percent_encoded() {
        let envelope = RequestEnvelope::get("/api/v3/order", AuthRequirement::None)
            .with("newClientOrderId", "a b&c");
        let finalized = envelope.finalize(Some(&credentials()), 1).unwrap();
        assert_eq!(finalized.path_and_query, "/api/v3/order?newClientOrderId=a+b%26c");
    }

    #[test]
    fn test_ws_params_inline_signature() {
        let envelope = RequestEnvelope::get("account.status", AuthRequirement::Signed)
            .with("omitZeroBalances", &true);
        let params = envelope.finalize_ws_params(Some(&credentials()), 7).unwrap();

        let expected = HmacSigner
            .sign("secret", b"apiKey=api-key&omitZeroBalances=true&timestamp=7")
            .unwrap();
        assert_eq!(params["apiKey"], "api-key");
        assert_eq!(params["timestamp"], 7);
        assert_eq!(params["omitZeroBalances"], true);
        assert_eq!(params["signature"], expected.as_str());
    }

    #[test]
    fn test_ws_params_lists_become_arrays() {
        let envelope = RequestEnvelope::get("ticker.price", AuthRequirement::None)
            .with("symbols", &["BTCUSDT", "ETHUSDT"]);
        let params = envelope.finalize_ws_params(Some(&credentials()), 7).unwrap();

        assert_eq!(params["symbols"], serde_json::json!(["BTCUSDT", "ETHUSDT"]));
        assert!(!params.contains_key("apiKey"));
        assert!(!params.contains_key("signature"));
    }

    #[test]
    fn test_ws_params_keep_non_canonical_numbers_as_strings() {
        let envelope = RequestEnvelope::post("order.test", AuthRequirement::Signed)
            .with("newClientOrderId", "0123")
            .with("price", "+5")
            .with("quantity", "-0")
            .with("orderId", &42u64);
        let params = envelope.finalize_ws_params(Some(&credentials()), 7).unwrap();

        assert_eq!(params["newClientOrderId"], "0123");
        assert_eq!(params["price"], "+5");
        assert_eq!(params["quantity"], "-0");
        assert_eq!(params["orderId"], 42);

        // the server re-encodes what it received; that must match what was signed
        let mut received = BTreeMap::new();
        for (key, value) in &params {
            if key == "signature" {
                continue;
            }
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            received.insert(key.clone(), value);
        }
        let expected = HmacSigner
            .sign("secret", encode_params(&received).as_bytes())
            .unwrap();
        assert_eq!(params["signature"], expected.as_str());
    }
}
