use crate::core::kernel::signer::SigningAlgorithm;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub api_key: Secret<String>,
    /// HMAC secret, or PEM / base64 private key for RSA and Ed25519
    pub secret_key: Secret<String>,
    pub signing_algorithm: SigningAlgorithm,
    pub testnet: bool,
    pub base_url: Option<String>,
    pub ws_api_url: Option<String>,
    pub stream_url: Option<String>,
    pub recv_window: Option<u64>,
}

// Custom Serialize implementation - never expose secrets in serialization
impl Serialize for ExchangeConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ExchangeConfig", 8)?;
        state.serialize_field("api_key", "[REDACTED]")?;
        state.serialize_field("secret_key", "[REDACTED]")?;
        state.serialize_field("signing_algorithm", &self.signing_algorithm)?;
        state.serialize_field("testnet", &self.testnet)?;
        state.serialize_field("base_url", &self.base_url)?;
        state.serialize_field("ws_api_url", &self.ws_api_url)?;
        state.serialize_field("stream_url", &self.stream_url)?;
        state.serialize_field("recv_window", &self.recv_window)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ExchangeConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ExchangeConfigHelper {
            api_key: String,
            secret_key: String,
            #[serde(default)]
            signing_algorithm: SigningAlgorithm,
            #[serde(default)]
            testnet: bool,
            base_url: Option<String>,
            ws_api_url: Option<String>,
            stream_url: Option<String>,
            recv_window: Option<u64>,
        }

        let helper = ExchangeConfigHelper::deserialize(deserializer)?;
        Ok(Self {
            api_key: Secret::new(helper.api_key),
            secret_key: Secret::new(helper.secret_key),
            signing_algorithm: helper.signing_algorithm,
            testnet: helper.testnet,
            base_url: helper.base_url,
            ws_api_url: helper.ws_api_url,
            stream_url: helper.stream_url,
            recv_window: helper.recv_window,
        })
    }
}

impl ExchangeConfig {
    /// Create a new configuration with API credentials, signing with HMAC-SHA256
    #[must_use]
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            signing_algorithm: SigningAlgorithm::default(),
            testnet: false,
            base_url: None,
            ws_api_url: None,
            stream_url: None,
            recv_window: None,
        }
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{EXCHANGE}_API_KEY` (e.g., `BINANCE_API_KEY`)
    /// - `{EXCHANGE}_SECRET_KEY`, or `{EXCHANGE}_PRIVATE_KEY_PATH` pointing at a PEM file
    /// - `{EXCHANGE}_SIGNING_ALGORITHM` (optional: `hmac`, `rsa`, `ed25519`; defaults to `hmac`)
    /// - `{EXCHANGE}_TESTNET` (optional, defaults to false)
    /// - `{EXCHANGE}_BASE_URL`, `{EXCHANGE}_WS_API_URL`, `{EXCHANGE}_STREAM_URL` (optional)
    /// - `{EXCHANGE}_RECV_WINDOW` (optional, milliseconds)
    pub fn from_env(exchange_prefix: &str) -> Result<Self, ConfigError> {
        let prefix = exchange_prefix.to_uppercase();
        let api_key_var = format!("{}_API_KEY", prefix);
        let secret_key_var = format!("{}_SECRET_KEY", prefix);
        let key_path_var = format!("{}_PRIVATE_KEY_PATH", prefix);
        let algorithm_var = format!("{}_SIGNING_ALGORITHM", prefix);
        let testnet_var = format!("{}_TESTNET", prefix);
        let base_url_var = format!("{}_BASE_URL", prefix);

        let api_key = env::var(&api_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(api_key_var))?;

        let secret_key = match env::var(&key_path_var) {
            Ok(path) => read_key_file(&path)?,
            Err(_) => env::var(&secret_key_var)
                .map_err(|_| ConfigError::MissingEnvironmentVariable(secret_key_var))?,
        };

        let signing_algorithm = match env::var(&algorithm_var) {
            Ok(value) => value.parse()?,
            Err(_) => SigningAlgorithm::default(),
        };

        let testnet = env::var(&testnet_var)
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let base_url = env::var(&base_url_var).ok();
        let ws_api_url = env::var(format!("{}_WS_API_URL", prefix)).ok();
        let stream_url = env::var(format!("{}_STREAM_URL", prefix)).ok();

        let recv_window_var = format!("{}_RECV_WINDOW", prefix);
        let recv_window = match env::var(&recv_window_var) {
            Ok(value) => Some(value.parse::<u64>().map_err(|e| {
                ConfigError::InvalidConfiguration(format!("{}: {}", recv_window_var, e))
            })?),
            Err(_) => None,
        };

        Ok(Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            signing_algorithm,
            testnet,
            base_url,
            ws_api_url,
            stream_url,
            recv_window,
        })
    }

    /// Create configuration from .env file and environment variables
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(exchange_prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(exchange_prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(
        exchange_prefix: &str,
        env_file_path: &str,
    ) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(_) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                // no file, fall back to the process environment
            }
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(exchange_prefix)
    }

    /// Create configuration for read-only operations (market data only)
    #[must_use]
    pub fn read_only() -> Self {
        Self::new(String::new(), String::new())
    }

    /// Check if this configuration has valid credentials for authenticated operations
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.expose_secret().is_empty() && !self.secret_key.expose_secret().is_empty()
    }

    /// Set testnet mode
    #[must_use]
    pub const fn testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    /// Set custom REST base URL
    #[must_use]
    pub fn base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Set custom WebSocket API URL
    #[must_use]
    pub fn ws_api_url(mut self, ws_api_url: String) -> Self {
        self.ws_api_url = Some(ws_api_url);
        self
    }

    /// Set custom market/user-data stream base URL
    #[must_use]
    pub fn stream_url(mut self, stream_url: String) -> Self {
        self.stream_url = Some(stream_url);
        self
    }

    /// Attach `recvWindow` to every signed request
    #[must_use]
    pub const fn recv_window(mut self, recv_window_ms: u64) -> Self {
        self.recv_window = Some(recv_window_ms);
        self
    }

    #[must_use]
    pub const fn signing_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.signing_algorithm = algorithm;
        self
    }

    /// Replace the secret with private key material read from a PEM file
    pub fn with_private_key_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        self.secret_key = Secret::new(read_key_file(path)?);
        Ok(self)
    }

    /// Get API key (use carefully - exposes secret)
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Get secret key (use carefully - exposes secret)
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

fn read_key_file(path: impl AsRef<Path>) -> Result<String, ConfigError> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|e| ConfigError::KeyFile {
        path: path.display().to_string(),
        source: e,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to read key file '{path}': {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_redacts_secrets() {
        let config = ExchangeConfig::new("key".to_string(), "secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("[REDACTED]"));
        assert!(!json.contains("\"secret\""));
    }

    #[test]
    fn test_deserialize_defaults_to_hmac() {
        let config: ExchangeConfig =
            serde_json::from_str(r#"{"api_key":"k","secret_key":"s"}"#).unwrap();
        assert_eq!(config.signing_algorithm, SigningAlgorithm::HmacSha256);
        assert!(!config.testnet);
        assert!(config.has_credentials());
    }

    #[test]
    fn test_read_only_has_no_credentials() {
        assert!(!ExchangeConfig::read_only().has_credentials());
    }

    #[test]
    fn test_missing_key_file() {
        let result = ExchangeConfig::read_only().with_private_key_file("/nonexistent/key.pem");
        assert!(matches!(result, Err(ConfigError::KeyFile { .. })));
    }
}
