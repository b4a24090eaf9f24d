use serde::Serialize;

use crate::types::{ConfigType, EvaluationReason};
use crate::value::{ConfigValue, RequestedType};

/// Longest string form of a value kept in telemetry, in characters.
pub const CONFIG_VALUE_MAX_LENGTH: usize = 500;

/// One evaluation exactly as the client performed it.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRecord {
    pub key: String,
    pub config_type: Option<ConfigType>,
    pub default_value: ConfigValue,
    pub requested_type: RequestedType,
    pub evaluated_value: ConfigValue,
    pub used_default: bool,
    pub reason: EvaluationReason,
    /// Id of the context the client was connected with, if any.
    pub context_id: Option<String>,
}

/// Size-bounded form of an [`EvaluationRecord`] that is queued and reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatedConfigEvent {
    pub key: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub config_type: Option<ConfigType>,
    pub default_value: String,
    pub requested_type: RequestedType,
    pub evaluated_value: String,
    pub used_default: bool,
    pub evaluation_reason: EvaluationReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

impl From<EvaluationRecord> for EvaluatedConfigEvent {
    fn from(record: EvaluationRecord) -> Self {
        EvaluatedConfigEvent {
            default_value: sanitize_value(&record.default_value, record.config_type),
            evaluated_value: sanitize_value(&record.evaluated_value, record.config_type),
            key: record.key,
            config_type: record.config_type,
            requested_type: record.requested_type,
            used_default: record.used_default,
            evaluation_reason: record.reason,
            context_id: record.context_id,
        }
    }
}

/// Hashes `json` values and truncates everything else.
pub fn sanitize_value(value: &ConfigValue, config_type: Option<ConfigType>) -> String {
    if config_type == Some(ConfigType::Json) {
        return djb2_hash(&value.to_json_string());
    }
    value.to_string().chars().take(CONFIG_VALUE_MAX_LENGTH).collect()
}

/// 32-bit djb2 over the UTF-8 bytes of `data`, as 8 lowercase hex digits.
pub fn djb2_hash(data: &str) -> String {
    let hash = data.bytes().fold(5381u32, |hash, byte| {
        (hash << 5).wrapping_add(hash).wrapping_add(u32::from(byte))
    });
    format!("{hash:08x}")
}
