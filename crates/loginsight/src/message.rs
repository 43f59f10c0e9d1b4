// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Input events and the Log Insight wire message shape.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One record from the event source: untyped fields plus a free-text message.
///
/// The `timestamp` field, when present, carries the epoch timestamp of the event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub fields: HashMap<String, Value>,
    #[serde(default, alias = "msg")]
    pub text: String,
}

impl Event {
    pub fn new(fields: HashMap<String, Value>, text: impl Into<String>) -> Self {
        Self {
            fields,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub content: String,
}

impl Field {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// An event encoded for the ingest endpoint.
///
/// ```json
/// {"fields":[{"name":"space","content":"test_space"}],"text":"hello","timestamp":10}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub fields: Vec<Field>,
    pub text: String,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_message_serialization() {
        let message = WireMessage {
            fields: vec![Field::new("space", "test_space")],
            text: "hello".to_string(),
            timestamp: 10,
        };

        let serialized = serde_json::to_string(&message).unwrap();
        assert_eq!(
            serialized,
            r#"{"fields":[{"name":"space","content":"test_space"}],"text":"hello","timestamp":10}"#
        );
    }

    #[test]
    fn test_event_deserialization() {
        let event: Event =
            serde_json::from_str(r#"{"fields":{"timestamp":10,"space":"s"},"text":"hi"}"#)
                .unwrap();
        assert_eq!(event.text, "hi");
        assert_eq!(event.fields.get("timestamp"), Some(&json!(10)));
        assert_eq!(event.fields.get("space"), Some(&json!("s")));
    }

    #[test]
    fn test_event_deserialization_defaults() {
        let event: Event = serde_json::from_str(r#"{"msg":"only text"}"#).unwrap();
        assert_eq!(event.text, "only text");
        assert!(event.fields.is_empty());
    }
}
