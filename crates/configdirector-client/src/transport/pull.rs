//! One request per `connect`, answered with a single config set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{parse_config_set, ConfigSetReceived, TransportEvents, TransportOptions};
use crate::config::{endpoint, PULL_ENDPOINT};
use crate::emitter::Emitter;
use crate::error::{is_status_fatal, ClientError};
use crate::lock;
use crate::types::{ConfigSet, Context};

const RETRY_HINT: &str = "retry attempts will be ignored";

#[derive(Debug)]
pub struct PullTransport {
    options: TransportOptions,
    url: Url,
    events: Arc<Emitter<TransportEvents>>,
    /// Latched by the first unrecoverable failure.
    fatal: AtomicBool,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl PullTransport {
    pub fn new(options: TransportOptions) -> Result<Self, ClientError> {
        let url = endpoint(&options.base_url, PULL_ENDPOINT)?;
        Ok(Self {
            options,
            url,
            events: Arc::new(Emitter::new()),
            fatal: AtomicBool::new(false),
            in_flight: Mutex::new(None),
        })
    }

    pub fn events(&self) -> &Arc<Emitter<TransportEvents>> {
        &self.events
    }

    pub fn has_fatal_error(&self) -> bool {
        self.fatal.load(Ordering::Acquire)
    }

    /// Fetches the config set for `context`, giving the request `budget` to
    /// complete. Does nothing after an unrecoverable failure.
    pub async fn connect(&self, context: &Context, budget: Duration) -> Result<(), ClientError> {
        if self.has_fatal_error() {
            warn!("[PullTransport] There was a prior unrecoverable error. Ignoring attempt to reconnect.");
            return Ok(());
        }

        let cancel = CancellationToken::new();
        if let Some(previous) = lock(&self.in_flight).replace(cancel.clone()) {
            previous.cancel();
        }

        let config_set = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("[PullTransport] Request aborted");
                return Err(ClientError::transient(None, "Connection aborted before completion"));
            }
            result = self.fetch(context, budget) => result?,
        };
        self.events.emit::<ConfigSetReceived>(&config_set);
        Ok(())
    }

    /// Aborts the request in flight, if any.
    pub fn close(&self) {
        if let Some(cancel) = lock(&self.in_flight).take() {
            cancel.cancel();
        }
    }

    pub fn dispose(&self) {
        self.close();
        self.events.clear();
    }

    async fn fetch(&self, context: &Context, budget: Duration) -> Result<ConfigSet, ClientError> {
        let response = self
            .options
            .http
            .post(self.url.clone())
            .timeout(budget)
            .json(&self.options.request(context))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let status = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            if is_status_fatal(status) {
                self.fatal.store(true, Ordering::Release);
                return Err(ClientError::fatal_status(status, &body, RETRY_HINT));
            }
            return Err(ClientError::transient(
                Some(status),
                format!("Connection failed with status: {status}"),
            ));
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;
        parse_config_set(&body)
    }

    /// A request that could not be built is unrecoverable; timeouts and
    /// network failures are left for the caller to retry.
    fn classify(&self, error: reqwest::Error) -> ClientError {
        if error.is_builder() {
            self.fatal.store(true, Ordering::Release);
            return ClientError::Connection {
                status: None,
                message: format!(
                    "Connection failed with fatal error: {error}. This is an unrecoverable error, {RETRY_HINT}."
                ),
                permanent: true,
            };
        }
        if error.is_timeout() {
            return ClientError::transient(None, format!("Connection timed out: {error}"));
        }
        ClientError::transient(None, format!("Connection failed with error: {error}."))
    }
}

impl Drop for PullTransport {
    fn drop(&mut self) {
        self.close();
    }
}
