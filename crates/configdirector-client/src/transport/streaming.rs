//! Long-lived event stream with automatic reconnects.
//!
//! `connect` posts the context to `sse/v1` and keeps the response open on a
//! background task. Transient failures are retried forever with capped
//! exponential backoff; a 4xx answer ends the session for good.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Client, Response, Url};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn, Instrument};

use super::backoff::{BackoffConfig, BackoffState};
use super::sse::SseDecoder;
use super::{parse_config_set, ConfigSetReceived, TransportEvents, TransportOptions};
use crate::config::{endpoint, STREAM_ENDPOINT};
use crate::emitter::Emitter;
use crate::error::{is_status_fatal, ClientError};
use crate::lock;
use crate::types::Context;

const RETRY_HINT: &str = "will not attempt to reconnect";

type ReadySender = oneshot::Sender<Result<(), ClientError>>;

#[derive(Debug)]
pub struct StreamingTransport {
    options: TransportOptions,
    url: Url,
    events: Arc<Emitter<TransportEvents>>,
    backoff: BackoffConfig,
    session: Mutex<Option<CancellationToken>>,
}

impl StreamingTransport {
    pub fn new(options: TransportOptions) -> Result<Self, ClientError> {
        let url = endpoint(&options.base_url, STREAM_ENDPOINT)?;
        Ok(Self {
            options,
            url,
            events: Arc::new(Emitter::new()),
            backoff: BackoffConfig::default(),
            session: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn events(&self) -> &Arc<Emitter<TransportEvents>> {
        &self.events
    }

    /// Starts a new session for `context`, replacing any previous one.
    ///
    /// Returns once the stream is established, when a fatal status is
    /// received, or when `budget` runs out; in the last case the session keeps
    /// retrying in the background.
    pub async fn connect(&self, context: &Context, budget: Duration) -> Result<(), ClientError> {
        self.close();

        let body = serde_json::to_vec(&self.options.request(context))
            .map_err(|e| ClientError::Validation(format!("Unable to encode connect request: {e}")))?;
        let cancel = CancellationToken::new();
        *lock(&self.session) = Some(cancel.clone());

        let (ready_tx, ready_rx) = oneshot::channel();
        let session = StreamSession {
            http: self.options.http.clone(),
            url: self.url.clone(),
            body,
            events: Arc::clone(&self.events),
            cancel,
        };
        tokio::spawn(session.run(self.backoff, ready_tx).in_current_span());

        match tokio::time::timeout(budget, ready_rx).await {
            Ok(Ok(outcome)) => outcome,
            // The session was cancelled before it could report.
            Ok(Err(_)) => Ok(()),
            Err(_) => {
                debug!(
                    budget_ms = budget.as_millis() as u64,
                    "[StreamingTransport] Stream not established yet, still retrying in the background"
                );
                Ok(())
            }
        }
    }

    /// Tears down the current session, if any.
    pub fn close(&self) {
        if let Some(cancel) = lock(&self.session).take() {
            cancel.cancel();
            debug!("[StreamingTransport] Disconnected");
        }
    }

    pub fn dispose(&self) {
        self.close();
        self.events.clear();
    }
}

impl Drop for StreamingTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// State owned by the background task of one `connect` call.
struct StreamSession {
    http: Client,
    url: Url,
    body: Vec<u8>,
    events: Arc<Emitter<TransportEvents>>,
    cancel: CancellationToken,
}

impl StreamSession {
    async fn run(self, backoff: BackoffConfig, ready_tx: ReadySender) {
        let mut ready = Some(ready_tx);
        let mut backoff = BackoffState::new(backoff);

        loop {
            let attempt = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                attempt = self.open() => attempt,
            };

            match attempt {
                Ok(response) => {
                    backoff.reset();
                    debug!(
                        status = response.status().as_u16(),
                        "[StreamingTransport] Connected"
                    );
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Ok(()));
                    }

                    let mut decoder = SseDecoder::new();
                    let outcome = self.read(response, &mut decoder).await;
                    if self.cancel.is_cancelled() {
                        return;
                    }
                    if let Some(retry) = decoder.retry() {
                        backoff.set_base(retry);
                    }
                    match outcome {
                        Ok(()) => debug!("[StreamingTransport] Stream ended by the server"),
                        Err(e) => debug!(error = %e, "[StreamingTransport] Stream interrupted"),
                    }
                }
                Err(e) if e.is_permanent() => {
                    self.cancel.cancel();
                    match ready.take() {
                        Some(tx) => {
                            let _ = tx.send(Err(e));
                        }
                        None => error!(error = %e, "[StreamingTransport] Giving up on the stream"),
                    }
                    return;
                }
                Err(e) => {
                    warn!(
                        status = e.status(),
                        error = %e,
                        "[StreamingTransport] Connection attempt failed"
                    );
                }
            }

            let delay = backoff.register_error();
            debug!(
                delay_ms = delay.as_millis() as u64,
                "[StreamingTransport] Scheduling reconnect"
            );
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn open(&self) -> Result<Response, ClientError> {
        let response = self
            .http
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .body(self.body.clone())
            .send()
            .await
            .map_err(|e| ClientError::transient(None, format!("Connection failed with error: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let status = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        if is_status_fatal(status) {
            Err(ClientError::fatal_status(status, &body, RETRY_HINT))
        } else {
            Err(ClientError::transient(
                Some(status),
                format!("Connection failed with status: {status}"),
            ))
        }
    }

    /// Pumps the response body through `decoder` until it ends or the
    /// session is cancelled.
    async fn read(&self, response: Response, decoder: &mut SseDecoder) -> Result<(), ClientError> {
        let mut stream = response.bytes_stream();
        loop {
            let chunk = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(()),
                chunk = stream.next() => chunk,
            };
            match chunk {
                None => return Ok(()),
                Some(Err(e)) => {
                    return Err(ClientError::transient(None, format!("Stream read failed: {e}")))
                }
                Some(Ok(bytes)) => {
                    for event in decoder.feed(&bytes) {
                        // A superseded session must not leak its payloads.
                        if self.cancel.is_cancelled() {
                            return Ok(());
                        }
                        self.dispatch(&event.data);
                    }
                }
            }
        }
    }

    fn dispatch(&self, data: &str) {
        match parse_config_set(data) {
            Ok(config_set) => self.events.emit::<ConfigSetReceived>(&config_set),
            Err(e) => error!(
                error = %e,
                "[StreamingTransport] Error parsing and dispatching config data update"
            ),
        }
    }
}
