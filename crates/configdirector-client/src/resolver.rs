//! Converts wire-format config values into the type the caller asked for.
//!
//! Resolution is pure: the same state and default always produce the same
//! [`Resolution`].

use crate::types::{ConfigState, ConfigType, EvaluationReason};
use crate::value::{ConfigValue, RequestedType};

/// Outcome of resolving one config against a default.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub value: ConfigValue,
    pub reason: EvaluationReason,
    pub used_default: bool,
    pub requested_type: RequestedType,
}

impl Resolution {
    fn matched(value: ConfigValue, requested_type: RequestedType) -> Self {
        Self {
            value,
            reason: EvaluationReason::FoundMatch,
            used_default: false,
            requested_type,
        }
    }

    fn fallback(default: &ConfigValue, reason: EvaluationReason) -> Self {
        Self {
            value: default.clone(),
            reason,
            used_default: true,
            requested_type: default.requested_type(),
        }
    }
}

/// Resolves `state` against `default`; first matching rule wins.
pub fn resolve(state: Option<&ConfigState>, default: &ConfigValue) -> Resolution {
    let Some(state) = state else {
        return Resolution::fallback(default, EvaluationReason::ConfigStateMissing);
    };
    let raw = match state.value.as_deref() {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Resolution::fallback(default, EvaluationReason::ValueMissing),
    };

    let requested_type = default.requested_type();
    match (requested_type, state.config_type) {
        (RequestedType::String, _) => {
            Resolution::matched(ConfigValue::String(raw.to_string()), requested_type)
        }
        (RequestedType::Boolean, ConfigType::Boolean) => match parse_bool(raw) {
            Some(b) => Resolution::matched(ConfigValue::Boolean(b), requested_type),
            None => Resolution::fallback(default, EvaluationReason::InvalidBoolean),
        },
        (RequestedType::Number, ConfigType::Number) => match parse_number(raw) {
            Some(n) => Resolution::matched(ConfigValue::Number(n), requested_type),
            None => Resolution::fallback(default, EvaluationReason::InvalidNumber),
        },
        // Object-shaped defaults and uncovered mismatches get the raw wire string.
        _ => Resolution::matched(ConfigValue::String(raw.to_string()), requested_type),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}
