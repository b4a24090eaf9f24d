//! Error taxonomy for the client SDK.
//!
//! Validation failures are surfaced synchronously to the caller. Connection and
//! parse failures are produced by the transports and are logged by the client
//! core; they never escape `initialize`/`update_context`.

/// Returns `true` when an HTTP status must never be retried (`400..500`).
///
/// Shared by both transport strategies and by the telemetry reporter.
pub fn is_status_fatal(status: u16) -> bool {
    (400..500).contains(&status)
}

/// Errors raised by the ConfigDirector client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A caller-supplied argument was rejected (bad default value, bad base URL).
    #[error("validation error: {0}")]
    Validation(String),

    /// The transport failed to reach the service or the service refused the request.
    #[error("connection error: {message}")]
    Connection {
        /// HTTP status returned by the server, when a response was received.
        status: Option<u16>,
        message: String,
        /// Whether the failure disables further connection attempts.
        permanent: bool,
    },

    /// A payload received from the service could not be decoded.
    #[error("failed to parse server payload: {0}")]
    Parse(String),

    /// The HTTP client could not be constructed.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    /// Builds the permanent error raised when the service answers with a 4xx status.
    pub(crate) fn fatal_status(status: u16, body: &str, retry_hint: &str) -> Self {
        let body = body.trim();
        let server_body = if body.is_empty() {
            String::new()
        } else {
            format!(" ({body})")
        };
        ClientError::Connection {
            status: Some(status),
            message: format!(
                "Connection failed with status: {status}{server_body}. This is an unrecoverable error, {retry_hint}."
            ),
            permanent: true,
        }
    }

    /// Builds a retryable connection error.
    pub(crate) fn transient(status: Option<u16>, message: impl Into<String>) -> Self {
        ClientError::Connection {
            status,
            message: message.into(),
            permanent: false,
        }
    }

    /// Returns `true` if this error disables any further attempts.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ClientError::Connection {
                permanent: true,
                ..
            }
        )
    }

    /// Returns the HTTP status attached to a connection error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Connection { status, .. } => *status,
            _ => None,
        }
    }
}
