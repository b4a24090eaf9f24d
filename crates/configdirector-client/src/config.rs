//! Client options and their environment-driven defaults.
//!
//! Options can be built in code, or derived from the process environment with
//! [`ClientOptions::from_os_env`]. Missing, empty or unparseable variables fall
//! back to the defaults.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use reqwest::Url;
use tokio::sync::watch;

use crate::error::ClientError;
use crate::telemetry::Visibility;
use crate::types::MetaContext;

/// Environment variable overriding the service base URL.
const ENV_URL: &str = "CONFIGDIRECTOR_URL";
/// Environment variable setting the connect timeout in milliseconds.
const ENV_TIMEOUT_MS: &str = "CONFIGDIRECTOR_TIMEOUT_MS";
/// Environment variable toggling the streaming transport.
const ENV_STREAMING: &str = "CONFIGDIRECTOR_STREAMING";
const ENV_APP_NAME: &str = "CONFIGDIRECTOR_APP_NAME";
const ENV_APP_VERSION: &str = "CONFIGDIRECTOR_APP_VERSION";

pub const DEFAULT_BASE_URL: &str = "https://client-sdk-api.configdirector.com";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(3_000);

pub(crate) const STREAM_ENDPOINT: &str = "sse/v1";
pub(crate) const PULL_ENDPOINT: &str = "pull/v1";
pub(crate) const TELEMETRY_ENDPOINT: &str = "telemetry/v1";

/// Version reported to the service in the meta context.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// How the client reaches the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Base URL override. Defaults to [`DEFAULT_BASE_URL`].
    pub url: Option<String>,
    /// Budget for each connect cycle before the client gives up waiting.
    pub timeout: Duration,
    /// Use the long-lived stream (`true`) or one request per connect (`false`).
    pub streaming: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            url: None,
            timeout: DEFAULT_CONNECT_TIMEOUT,
            streaming: true,
        }
    }
}

impl ConnectionOptions {
    /// Parses the configured base URL, normalised to end with `/` so endpoint
    /// paths are joined below any path prefix.
    pub fn base_url(&self) -> Result<Url, ClientError> {
        let raw = self.url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let mut url = Url::parse(raw).map_err(|e| {
            ClientError::Validation(format!("Invalid base URL '{raw}'. Parsing failed: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::Validation(format!(
                "Invalid base URL '{raw}'. Only http and https are supported."
            )));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

/// Resolves an endpoint path against a normalised base URL.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, ClientError> {
    base.join(path)
        .map_err(|e| ClientError::Validation(format!("Invalid endpoint '{path}': {e}")))
}

/// Application identity forwarded in the meta context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppMetadata {
    pub app_name: Option<String>,
    pub app_version: Option<String>,
}

impl AppMetadata {
    pub(crate) fn meta_context(&self) -> MetaContext {
        MetaContext {
            sdk_version: SDK_VERSION.to_string(),
            user_agent: user_agent(),
            app_name: self.app_name.clone(),
            app_version: self.app_version.clone(),
        }
    }
}

pub(crate) fn user_agent() -> String {
    format!("configdirector-rust-client/{SDK_VERSION}")
}

/// Tuning of the usage telemetry pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryOptions {
    pub enabled: bool,
    pub queue_capacity: usize,
    pub initial_flush_delay: Duration,
    pub flush_interval: Duration,
    /// Per-request timeout of a telemetry report.
    pub request_timeout: Duration,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: crate::telemetry::queue::DEFAULT_QUEUE_CAPACITY,
            initial_flush_delay: Duration::from_secs(5),
            flush_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Options accepted by [`crate::create_client`].
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub connection: ConnectionOptions,
    pub metadata: AppMetadata,
    /// Optional host visibility source; a switch to hidden flushes telemetry.
    pub visibility: Option<watch::Receiver<Visibility>>,
    pub telemetry: TelemetryOptions,
}

impl ClientOptions {
    /// Builds options from the current process environment.
    pub fn from_os_env() -> Self {
        Self::from_env_iter(env::vars())
    }

    /// Builds options from an iterator of key/value pairs.
    pub fn from_env_iter<I, K, V>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let url = map.get(ENV_URL).and_then(|value| sanitize_non_empty(value));
        let timeout = map
            .get(ENV_TIMEOUT_MS)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_millis);
        let streaming = parse_bool(map.get(ENV_STREAMING).map(String::as_str), true);

        Self {
            connection: ConnectionOptions {
                url,
                timeout,
                streaming,
            },
            metadata: AppMetadata {
                app_name: map.get(ENV_APP_NAME).and_then(|v| sanitize_non_empty(v)),
                app_version: map.get(ENV_APP_VERSION).and_then(|v| sanitize_non_empty(v)),
            },
            visibility: None,
            telemetry: TelemetryOptions::default(),
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.connection.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connection.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.connection.streaming = streaming;
        self
    }

    #[must_use]
    pub fn with_visibility(mut self, visibility: watch::Receiver<Visibility>) -> Self {
        self.visibility = Some(visibility);
        self
    }
}

fn sanitize_non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(|s| s.trim().to_ascii_lowercase()) {
        Some(ref v) if ["1", "true", "t", "yes", "y"].contains(&v.as_str()) => true,
        Some(ref v) if ["0", "false", "f", "no", "n"].contains(&v.as_str()) => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_environment() {
        let options = ClientOptions::from_env_iter::<Vec<(String, String)>, _, _>(vec![]);
        assert_eq!(options.connection, ConnectionOptions::default());
        assert_eq!(options.connection.timeout, Duration::from_millis(3_000));
        assert!(options.connection.streaming);
        assert_eq!(options.metadata, AppMetadata::default());
        assert!(options.telemetry.enabled);
        assert_eq!(options.telemetry.queue_capacity, 1_000);
    }

    #[test]
    fn environment_overrides_are_applied() {
        let options = ClientOptions::from_env_iter(vec![
            (ENV_URL, " http://localhost:8080/api "),
            (ENV_TIMEOUT_MS, "1500"),
            (ENV_STREAMING, "no"),
            (ENV_APP_NAME, "checkout"),
            (ENV_APP_VERSION, ""),
        ]);
        assert_eq!(options.connection.url.as_deref(), Some("http://localhost:8080/api"));
        assert_eq!(options.connection.timeout, Duration::from_millis(1_500));
        assert!(!options.connection.streaming);
        assert_eq!(options.metadata.app_name.as_deref(), Some("checkout"));
        assert_eq!(options.metadata.app_version, None);
    }

    #[test]
    fn invalid_environment_values_fall_back() {
        let options = ClientOptions::from_env_iter(vec![
            (ENV_TIMEOUT_MS, "soon"),
            (ENV_STREAMING, "maybe"),
        ]);
        assert_eq!(options.connection.timeout, DEFAULT_CONNECT_TIMEOUT);
        assert!(options.connection.streaming);
    }

    #[test]
    fn parse_bool_permits_common_variants() {
        assert!(parse_bool(Some("Yes"), false));
        assert!(parse_bool(Some("1"), false));
        assert!(!parse_bool(Some("FALSE"), true));
        assert!(parse_bool(None, true));
    }

    #[test]
    fn endpoints_preserve_base_path_prefix() {
        let options = ConnectionOptions {
            url: Some("https://proxy.example.com/configdirector".into()),
            ..ConnectionOptions::default()
        };
        let base = options.base_url().unwrap();
        assert_eq!(
            endpoint(&base, STREAM_ENDPOINT).unwrap().as_str(),
            "https://proxy.example.com/configdirector/sse/v1"
        );

        let base = ConnectionOptions::default().base_url().unwrap();
        assert_eq!(
            endpoint(&base, TELEMETRY_ENDPOINT).unwrap().as_str(),
            "https://client-sdk-api.configdirector.com/telemetry/v1"
        );
    }

    #[test]
    fn invalid_base_urls_are_rejected() {
        for url in ["not a url", "ftp://example.com"] {
            let options = ConnectionOptions {
                url: Some(url.into()),
                ..ConnectionOptions::default()
            };
            assert!(matches!(options.base_url(), Err(ClientError::Validation(_))));
        }
    }

    #[test]
    fn meta_context_carries_sdk_identity() {
        let meta = AppMetadata {
            app_name: Some("checkout".into()),
            app_version: None,
        }
        .meta_context();
        assert_eq!(meta.sdk_version, SDK_VERSION);
        assert_eq!(meta.user_agent, format!("configdirector-rust-client/{SDK_VERSION}"));
        assert_eq!(meta.app_name.as_deref(), Some("checkout"));
    }
}
