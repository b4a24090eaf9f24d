//! The public client: connect cycles, config state, watchers and reads.
//!
//! Config sets arrive on transport tasks. Each one is merged and its watchers
//! notified while holding a single delivery guard, so two payloads are never
//! interleaved. Reads take the state lock briefly and never hold it while user
//! callbacks run.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use reqwest::Client;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{endpoint, user_agent, ClientOptions, TELEMETRY_ENDPOINT};
use crate::emitter::{Emitter, Event, HandlerId};
use crate::error::ClientError;
use crate::lock;
use crate::resolver::resolve;
use crate::telemetry::{EvaluationRecord, EventReporter, ReporterResponse, TelemetryEventCollector};
use crate::transport::{Transport, TransportOptions};
use crate::types::{ConfigSet, ConfigState, Context, SetKind};
use crate::value::ConfigValue;

/// Event set of [`ConfigDirectorClient`].
pub struct ClientEvents;

/// Fired after every received config set with the keys it carried.
pub struct ConfigsUpdated;

/// Fired when a connect cycle observed its first payload within the timeout.
pub struct ClientReady;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigsUpdatedEvent {
    /// Keys present in the received payload, sorted.
    pub keys: Vec<String>,
}

/// What started the connect cycle that became ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAction {
    Initialization,
    ContextUpdate,
}

impl ConnectAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectAction::Initialization => "initialization",
            ConnectAction::ContextUpdate => "context update",
        }
    }
}

impl fmt::Display for ConnectAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientReadyEvent {
    pub action: ConnectAction,
}

impl Event<ClientEvents> for ConfigsUpdated {
    type Payload = ConfigsUpdatedEvent;
    const NAME: &'static str = "configsUpdated";
}

impl Event<ClientEvents> for ClientReady {
    type Payload = ClientReadyEvent;
    const NAME: &'static str = "clientReady";
}

/// Identifies one watch callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

type WatchCallback = Arc<dyn Fn(&ConfigValue) + Send + Sync>;

struct Watcher {
    id: WatcherId,
    default: ConfigValue,
    callback: WatchCallback,
}

#[derive(Default)]
struct ClientState {
    config_set: Option<ConfigSet>,
    watchers: HashMap<String, Vec<Watcher>>,
}

struct ClientInner {
    state: Mutex<ClientState>,
    /// Serialises merge and notification of one payload.
    delivery: Mutex<()>,
    events: Emitter<ClientEvents>,
    transport: Transport,
    telemetry: Option<TelemetryEventCollector>,
    timeout: Duration,
    /// Id of the context of the latest connect cycle, attached to evaluations.
    context_id: Mutex<Option<String>>,
    ready: AtomicBool,
    ready_signal: Mutex<Option<oneshot::Sender<()>>>,
    next_watcher_id: AtomicU64,
    connect_lock: tokio::sync::Mutex<()>,
}

impl ClientInner {
    fn handle_config_set(&self, config_set: &ConfigSet) {
        let _delivery = lock(&self.delivery);

        let keys = config_set.sorted_keys();
        let mut notifications: Vec<(WatchCallback, ConfigValue)> = Vec::new();
        {
            let mut state = lock(&self.state);
            match (&mut state.config_set, config_set.kind) {
                (Some(current), SetKind::Delta) => {
                    current.merge(config_set.clone());
                    debug!(keys = ?keys, "Merged the incoming config set");
                }
                (current, kind) => {
                    *current = Some(config_set.clone());
                    debug!(keys = ?keys, kind = ?kind, "Replaced the entire config set");
                }
            }

            for key in &keys {
                let Some(watchers) = state.watchers.get(key) else {
                    continue;
                };
                let config_state = config_set.configs.get(key);
                for watcher in watchers {
                    let value = self.evaluate(key, config_state, &watcher.default);
                    notifications.push((Arc::clone(&watcher.callback), value));
                }
            }
        }

        for (callback, value) in notifications {
            callback(&value);
        }
        self.events
            .emit::<ConfigsUpdated>(&ConfigsUpdatedEvent { keys });

        // Waiters only wake once the payload is readable.
        self.ready.store(true, Ordering::Release);
        if let Some(signal) = lock(&self.ready_signal).take() {
            let _ = signal.send(());
        }
    }

    /// Resolves one value and records the evaluation.
    fn evaluate(&self, key: &str, state: Option<&ConfigState>, default: &ConfigValue) -> ConfigValue {
        let resolution = resolve(state, default);
        if state.is_none() {
            debug!(key, default = %default, "No config state found, returning default value");
        }
        if let Some(telemetry) = &self.telemetry {
            telemetry.evaluated_config(EvaluationRecord {
                key: key.to_string(),
                config_type: state.map(|s| s.config_type),
                default_value: default.clone(),
                requested_type: resolution.requested_type,
                evaluated_value: resolution.value.clone(),
                used_default: resolution.used_default,
                reason: resolution.reason,
                context_id: lock(&self.context_id).clone(),
            });
        }
        resolution.value
    }

    fn close(&self) {
        self.transport.close();
        self.ready.store(false, Ordering::Release);
        lock(&self.ready_signal).take();
        if let Some(telemetry) = &self.telemetry {
            telemetry.close();
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.transport.dispose();
        if let Some(telemetry) = &self.telemetry {
            telemetry.dispose();
        }
    }
}

/// Client resolving live config values for one SDK key.
///
/// Cloning is cheap; clones share the same connection and state.
#[derive(Clone)]
pub struct ConfigDirectorClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for ConfigDirectorClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigDirectorClient")
            .field("ready", &self.is_ready())
            .field("transport", &self.inner.transport)
            .finish()
    }
}

impl ConfigDirectorClient {
    /// Builds a client. Nothing is sent until [`initialize`](Self::initialize).
    ///
    /// Telemetry flushing is scheduled on the current tokio runtime when one
    /// is available.
    pub fn new(sdk_key: impl Into<String>, options: ClientOptions) -> Result<Self, ClientError> {
        let sdk_key = sdk_key.into();
        let base_url = options.connection.base_url()?;
        let http = Client::builder().user_agent(user_agent()).build()?;

        let transport = Transport::new(
            TransportOptions {
                client_sdk_key: sdk_key.clone(),
                base_url: base_url.clone(),
                meta_context: options.metadata.meta_context(),
                http: http.clone(),
            },
            options.connection.streaming,
        )?;

        let telemetry = if options.telemetry.enabled {
            let reporter = EventReporter::new(
                http,
                endpoint(&base_url, TELEMETRY_ENDPOINT)?,
                sdk_key,
                options.telemetry.request_timeout,
            );
            Some(TelemetryEventCollector::new(
                Arc::new(reporter),
                &options.telemetry,
                options.visibility,
            ))
        } else {
            None
        };

        let inner = Arc::new_cyclic(|weak: &Weak<ClientInner>| {
            let weak = weak.clone();
            transport.on_config_set(move |config_set| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_config_set(config_set);
                }
            });
            ClientInner {
                state: Mutex::new(ClientState::default()),
                delivery: Mutex::new(()),
                events: Emitter::new(),
                transport,
                telemetry,
                timeout: options.connection.timeout,
                context_id: Mutex::new(None),
                ready: AtomicBool::new(false),
                ready_signal: Mutex::new(None),
                next_watcher_id: AtomicU64::new(1),
                connect_lock: tokio::sync::Mutex::new(()),
            }
        });

        Ok(Self { inner })
    }

    /// Connects with `context` (an empty context when `None`).
    ///
    /// Resolves once the first payload arrived or the connect timeout elapsed.
    /// Failures are logged and never returned.
    pub async fn initialize(&self, context: Option<Context>) {
        self.connect_cycle(context.unwrap_or_default(), ConnectAction::Initialization)
            .await;
    }

    /// Reconnects with a new context; the server re-evaluates targeting.
    pub async fn update_context(&self, context: Context) {
        self.connect_cycle(context, ConnectAction::ContextUpdate).await;
    }

    async fn connect_cycle(&self, context: Context, action: ConnectAction) {
        let inner = &self.inner;
        let _cycle = inner.connect_lock.lock().await;

        *lock(&inner.context_id) = context.id.clone();
        inner.ready.store(false, Ordering::Release);
        let (signal_tx, signal_rx) = oneshot::channel();
        *lock(&inner.ready_signal) = Some(signal_tx);
        let deadline = Instant::now() + inner.timeout;

        match tokio::time::timeout_at(deadline, inner.transport.connect(&context, inner.timeout)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                lock(&inner.ready_signal).take();
                error!(error = %e, "An error occurred during {action}");
                return;
            }
            Err(_) => debug!("Transport did not connect within the timeout"),
        }

        match tokio::time::timeout_at(deadline, signal_rx).await {
            Ok(Ok(())) => {
                info!(action = action.as_str(), "Client ready");
                inner
                    .events
                    .emit::<ClientReady>(&ClientReadyEvent { action });
            }
            Ok(Err(_)) => debug!("Connect cycle was superseded or closed"),
            Err(_) => {
                lock(&inner.ready_signal).take();
                let timeout_ms = inner.timeout.as_millis() as u64;
                match inner.transport {
                    Transport::Streaming(_) => warn!(
                        timeout_ms,
                        "Timed out waiting for {action} after {timeout_ms}ms. The client will continue to retry since there were no fatal errors detected."
                    ),
                    Transport::Pull(_) => warn!(
                        timeout_ms,
                        "Timed out waiting for {action} after {timeout_ms}ms."
                    ),
                }
            }
        }
    }

    /// Returns the current value of `key`, or `default` when no usable value
    /// is known. Fails only when `default` carries no value.
    pub fn get_value(
        &self,
        key: &str,
        default: impl Into<ConfigValue>,
    ) -> Result<ConfigValue, ClientError> {
        let default = default.into();
        default.validate()?;
        let state = lock(&self.inner.state)
            .config_set
            .as_ref()
            .and_then(|set| set.configs.get(key).cloned());
        Ok(self.inner.evaluate(key, state.as_ref(), &default))
    }

    /// Calls `callback` with the resolved value whenever a payload updates `key`.
    pub fn watch<F>(
        &self,
        key: impl Into<String>,
        default: impl Into<ConfigValue>,
        callback: F,
    ) -> Result<WatchHandle, ClientError>
    where
        F: Fn(&ConfigValue) + Send + Sync + 'static,
    {
        let default = default.into();
        default.validate()?;
        let key = key.into();
        let id = WatcherId(self.inner.next_watcher_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.state)
            .watchers
            .entry(key.clone())
            .or_default()
            .push(Watcher {
                id,
                default,
                callback: Arc::new(callback),
            });
        Ok(WatchHandle {
            inner: Arc::downgrade(&self.inner),
            key,
            id,
        })
    }

    /// Removes one watcher of `key`, or all of them when `id` is `None`.
    pub fn unwatch(&self, key: &str, id: Option<WatcherId>) {
        let mut state = lock(&self.inner.state);
        let Some(watchers) = state.watchers.get_mut(key) else {
            return;
        };
        match id {
            Some(id) => watchers.retain(|w| w.id != id),
            None => watchers.clear(),
        }
        if watchers.is_empty() {
            state.watchers.remove(key);
        }
    }

    pub fn unwatch_all(&self) {
        lock(&self.inner.state).watchers.clear();
    }

    pub fn watcher_count(&self, key: &str) -> usize {
        lock(&self.inner.state)
            .watchers
            .get(key)
            .map_or(0, Vec::len)
    }

    pub fn on<E, F>(&self, handler: F) -> HandlerId
    where
        E: Event<ClientEvents>,
        F: Fn(&E::Payload) + Send + Sync + 'static,
    {
        self.inner.events.on::<E, F>(handler)
    }

    pub fn off<E: Event<ClientEvents>>(&self, id: Option<HandlerId>) {
        self.inner.events.off::<E>(id);
    }

    /// Whether a payload has been received since the last connect cycle began.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Ships queued telemetry now instead of waiting for the next window.
    pub async fn flush_telemetry(&self) -> ReporterResponse {
        match &self.inner.telemetry {
            Some(telemetry) => telemetry.flush().await,
            None => ReporterResponse::SUCCESS,
        }
    }

    /// Removes every event handler and watcher.
    pub fn clear(&self) {
        self.inner.events.clear();
        self.unwatch_all();
    }

    /// Closes the connection and stops telemetry. Values already received
    /// stay readable.
    pub fn close(&self) {
        self.inner.close();
    }

    /// [`clear`](Self::clear) followed by [`close`](Self::close).
    pub fn dispose(&self) {
        self.clear();
        self.inner.close();
        self.inner.transport.dispose();
        if let Some(telemetry) = &self.inner.telemetry {
            telemetry.dispose();
        }
    }
}

/// Returned by [`ConfigDirectorClient::watch`]; removes that one watcher.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    inner: Weak<ClientInner>,
    key: String,
    id: WatcherId,
}

impl WatchHandle {
    pub fn id(&self) -> WatcherId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn unwatch(self) {
        if let Some(inner) = self.inner.upgrade() {
            ConfigDirectorClient { inner }.unwatch(&self.key, Some(self.id));
        }
    }
}
