//! Wire types exchanged with the ConfigDirector service.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Declared wire type of a config, as computed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    Boolean,
    String,
    Number,
    Enum,
    Url,
    Json,
    #[default]
    #[serde(other)]
    Custom,
}

/// Current wire representation of one config.
///
/// Received states are never edited in place; a newer state replaces the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigState {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    pub key: String,
    #[serde(rename = "type", default)]
    pub config_type: ConfigType,
    #[serde(default)]
    pub value: Option<String>,
}

/// Whether a config set replaces local state or is merged into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetKind {
    Full,
    Delta,
}

/// A batch of config states pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSet {
    #[serde(default, deserialize_with = "string_or_number")]
    pub environment_id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub project_id: String,
    #[serde(default)]
    pub configs: HashMap<String, ConfigState>,
    pub kind: SetKind,
}

impl ConfigSet {
    /// Overwrites local states key-by-key with the ones carried by `delta`.
    ///
    /// States are replaced wholesale; fields are never merged individually.
    pub fn merge(&mut self, delta: ConfigSet) {
        self.configs.extend(delta.configs);
    }

    /// Returns the payload's keys in a stable order.
    pub fn sorted_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.configs.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Caller identity forwarded to the server for targeting.
///
/// The client never interprets it; changing it triggers a new connect cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traits: Option<Map<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a single trait, creating the trait map when needed.
    #[must_use]
    pub fn with_trait(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.traits
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

/// SDK metadata sent alongside the context on every connect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaContext {
    pub sdk_version: String,
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

/// Explains how an evaluated value was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvaluationReason {
    FoundMatch,
    ConfigStateMissing,
    ClientNotReady,
    TypeMismatch,
    ValueMissing,
    InvalidNumber,
    InvalidBoolean,
}

impl EvaluationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationReason::FoundMatch => "found-match",
            EvaluationReason::ConfigStateMissing => "config-state-missing",
            EvaluationReason::ClientNotReady => "client-not-ready",
            EvaluationReason::TypeMismatch => "type-mismatch",
            EvaluationReason::ValueMissing => "value-missing",
            EvaluationReason::InvalidNumber => "invalid-number",
            EvaluationReason::InvalidBoolean => "invalid-boolean",
        }
    }
}

/// Accepts identifiers sent either as JSON strings or JSON numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number identifier, got {other}"
        ))),
    }
}
