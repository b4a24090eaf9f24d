//! Client SDK for the ConfigDirector remote config service.
//!
//! A [`ConfigDirectorClient`] connects to the service with a caller context,
//! keeps the received config states in sync, and resolves typed values for
//! application code. Reads never block: until authoritative data arrives
//! every lookup returns the caller's default.
//!
//! ```rust,ignore
//! use configdirector_client::{create_client, ClientOptions, Context};
//!
//! let client = create_client("client-sdk-key", ClientOptions::default())?;
//! client.initialize(Some(Context::new().with_id("user-42"))).await;
//! let greeting = client.get_value("greeting", "Hello")?;
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod client;
pub mod clock;
pub mod config;
pub mod emitter;
pub mod error;
pub mod logger;
pub mod resolver;
pub mod telemetry;
pub mod transport;
pub mod types;
pub mod value;

pub use client::{
    ClientEvents, ClientReady, ClientReadyEvent, ConfigDirectorClient, ConfigsUpdated,
    ConfigsUpdatedEvent, ConnectAction, WatchHandle, WatcherId,
};
pub use config::{AppMetadata, ClientOptions, ConnectionOptions, TelemetryOptions};
pub use emitter::{Emitter, Event, HandlerId};
pub use error::ClientError;
pub use logger::LogLevel;
pub use resolver::{resolve, Resolution};
pub use telemetry::Visibility;
pub use types::{ConfigSet, ConfigState, ConfigType, Context, EvaluationReason, SetKind};
pub use value::{ConfigValue, RequestedType};

/// Builds a client for `sdk_key`. Fails only when the options are invalid.
pub fn create_client(
    sdk_key: impl Into<String>,
    options: ClientOptions,
) -> Result<ConfigDirectorClient, ClientError> {
    ConfigDirectorClient::new(sdk_key, options)
}

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
