// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Event to wire message encoding.
//!
//! Encoding is pure CPU work: no I/O, no locks. Every field except `timestamp` becomes a
//! `(name, content)` pair, with reserved names renamed by the [`KeyNamespacer`]. When JSON
//! flattening is enabled and the message text is a JSON object, its top-level keys are
//! appended as extra fields. Field names are not deduplicated.
//!
//! Malformed input never aborts encoding: problems are reported as [`EncodingError`]s
//! next to the best-effort message.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};

use crate::constants::TIMESTAMP_FIELD;
use crate::error::EncodingError;
use crate::message::{Event, Field, WireMessage};
use crate::namespace::KeyNamespacer;

/// Timestamp used when an event carries no usable `timestamp` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimestampDefault {
    #[default]
    Zero,
    /// Current time in epoch milliseconds.
    Now,
}

impl TimestampDefault {
    fn resolve(self) -> i64 {
        match self {
            TimestampDefault::Zero => 0,
            TimestampDefault::Now => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
                .unwrap_or_default(),
        }
    }
}

/// Result of encoding one event.
#[derive(Debug)]
pub struct Encoded {
    pub message: WireMessage,
    /// Recoverable problems hit while encoding. The message is still usable.
    pub errors: Vec<EncodingError>,
}

#[derive(Debug, Clone, Default)]
pub struct MessageEncoder {
    namespacer: KeyNamespacer,
    flatten_json: bool,
    timestamp_default: TimestampDefault,
}

impl MessageEncoder {
    #[must_use]
    pub fn new(
        namespacer: KeyNamespacer,
        flatten_json: bool,
        timestamp_default: TimestampDefault,
    ) -> Self {
        Self {
            namespacer,
            flatten_json,
            timestamp_default,
        }
    }

    #[must_use]
    pub fn encode(&self, event: &Event) -> Encoded {
        let mut errors = Vec::new();
        let mut timestamp = None;
        let mut fields = Vec::with_capacity(event.fields.len());

        for (key, value) in &event.fields {
            if key == TIMESTAMP_FIELD {
                match timestamp_from_value(value) {
                    Ok(ts) => timestamp = Some(ts),
                    Err(e) => errors.push(e),
                }
            } else {
                fields.push(self.field(key, value));
            }
        }

        if self.flatten_json {
            match serde_json::from_str::<Map<String, Value>>(&event.text) {
                Ok(object) => {
                    fields.extend(object.iter().map(|(key, value)| self.field(key, value)));
                }
                Err(e) => errors.push(EncodingError::InvalidJson(e)),
            }
        }

        Encoded {
            message: WireMessage {
                fields,
                text: event.text.clone(),
                timestamp: timestamp.unwrap_or_else(|| self.timestamp_default.resolve()),
            },
            errors,
        }
    }

    fn field(&self, key: &str, value: &Value) -> Field {
        Field::new(self.namespacer.namespace(key), stringify(value))
    }
}

/// Renders a value the way it should read in Log Insight: strings without quotes,
/// numbers and booleans in their usual form, nested values as compact JSON.
///
/// Floats without a fractional part drop the trailing `.0` (`1.0` renders as `1`).
#[must_use]
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => f.to_string(),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Accepts integers, and strings holding an integer.
fn timestamp_from_value(value: &Value) -> Result<i64, EncodingError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| EncodingError::InvalidTimestamp(value.to_string()))
}
