//! Connection strategies to the ConfigDirector service.
//!
//! Both strategies post the same [`ConnectRequest`] and relay each parsed
//! [`ConfigSet`] through a [`ConfigSetReceived`] event. They hold no config
//! state of their own.

pub mod backoff;
pub mod pull;
pub mod sse;
pub mod streaming;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use serde::Serialize;

use crate::emitter::{Emitter, Event, HandlerId};
use crate::error::ClientError;
use crate::types::{ConfigSet, Context, MetaContext};

pub use pull::PullTransport;
pub use streaming::StreamingTransport;

/// Event set emitted by transports.
pub struct TransportEvents;

/// A config payload was received and decoded.
pub struct ConfigSetReceived;

impl Event<TransportEvents> for ConfigSetReceived {
    type Payload = ConfigSet;
    const NAME: &'static str = "configSetReceived";
}

/// Request body shared by the stream and pull endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest<'a> {
    pub given_context: &'a Context,
    pub meta_context: &'a MetaContext,
    pub client_sdk_key: &'a str,
}

/// Settings common to both strategies.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub client_sdk_key: String,
    /// Normalised base URL; endpoints are joined below it.
    pub base_url: Url,
    pub meta_context: MetaContext,
    pub http: Client,
}

impl TransportOptions {
    pub(crate) fn request<'a>(&'a self, context: &'a Context) -> ConnectRequest<'a> {
        ConnectRequest {
            given_context: context,
            meta_context: &self.meta_context,
            client_sdk_key: &self.client_sdk_key,
        }
    }
}

/// Decodes one payload into a [`ConfigSet`].
pub(crate) fn parse_config_set(payload: &str) -> Result<ConfigSet, ClientError> {
    serde_json::from_str(payload).map_err(|e| ClientError::Parse(e.to_string()))
}

/// The strategy selected once at construction.
#[derive(Debug)]
pub enum Transport {
    Streaming(StreamingTransport),
    Pull(PullTransport),
}

impl Transport {
    pub fn new(options: TransportOptions, streaming: bool) -> Result<Self, ClientError> {
        Ok(if streaming {
            Transport::Streaming(StreamingTransport::new(options)?)
        } else {
            Transport::Pull(PullTransport::new(options)?)
        })
    }

    /// Connects with `context`, waiting at most `budget` for the outcome.
    pub async fn connect(&self, context: &Context, budget: Duration) -> Result<(), ClientError> {
        match self {
            Transport::Streaming(t) => t.connect(context, budget).await,
            Transport::Pull(t) => t.connect(context, budget).await,
        }
    }

    pub fn close(&self) {
        match self {
            Transport::Streaming(t) => t.close(),
            Transport::Pull(t) => t.close(),
        }
    }

    pub fn dispose(&self) {
        match self {
            Transport::Streaming(t) => t.dispose(),
            Transport::Pull(t) => t.dispose(),
        }
    }

    pub fn events(&self) -> &Arc<Emitter<TransportEvents>> {
        match self {
            Transport::Streaming(t) => t.events(),
            Transport::Pull(t) => t.events(),
        }
    }

    pub fn on_config_set<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&ConfigSet) + Send + Sync + 'static,
    {
        self.events().on::<ConfigSetReceived, _>(handler)
    }
}
