// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching of wire messages.
//!
//! Each worker owns its own [`BatchAssembler`], so batching needs no locking. A batch
//! serializes directly to the ingest request body:
//!
//! ```json
//! {"messages":[{"fields":[...],"text":"...","timestamp":0}]}
//! ```

use serde::Serialize;

use crate::message::WireMessage;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Batch {
    pub messages: Vec<WireMessage>,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Accumulates messages until the configured batch size is reached.
#[derive(Debug)]
pub struct BatchAssembler {
    batch_size: usize,
    messages: Vec<WireMessage>,
}

impl BatchAssembler {
    /// A batch size of 0 is treated as 1.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            messages: Vec::with_capacity(batch_size),
        }
    }

    /// Appends a message. Returns the full batch once it reaches the batch size, leaving
    /// the assembler empty.
    pub fn append(&mut self, message: WireMessage) -> Option<Batch> {
        self.messages.push(message);
        if self.messages.len() >= self.batch_size {
            self.take()
        } else {
            None
        }
    }

    /// Takes whatever is buffered, full or not. `None` when empty.
    pub fn take(&mut self) -> Option<Batch> {
        if self.messages.is_empty() {
            return None;
        }
        let messages = std::mem::replace(&mut self.messages, Vec::with_capacity(self.batch_size));
        Some(Batch { messages })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Field;

    fn message(text: &str) -> WireMessage {
        WireMessage {
            fields: vec![],
            text: text.to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_batch_size_one_flushes_every_append() {
        let mut assembler = BatchAssembler::new(1);
        for i in 0..3 {
            let batch = assembler.append(message(&i.to_string())).unwrap();
            assert_eq!(batch.len(), 1);
            assert!(assembler.is_empty());
        }
    }

    #[test]
    fn test_flushes_exactly_at_batch_size() {
        for batch_size in 1..=16 {
            let mut assembler = BatchAssembler::new(batch_size);
            for i in 0..batch_size - 1 {
                assert!(assembler.append(message(&i.to_string())).is_none());
                assert_eq!(assembler.len(), i + 1);
            }

            let batch = assembler.append(message("last")).unwrap();
            assert_eq!(batch.len(), batch_size);
            assert_eq!(batch.messages.last().unwrap().text, "last");
            assert!(assembler.is_empty());
        }
    }

    #[test]
    fn test_preserves_append_order() {
        let mut assembler = BatchAssembler::new(3);
        assembler.append(message("a"));
        assembler.append(message("b"));
        let batch = assembler.append(message("c")).unwrap();

        let texts: Vec<&str> = batch.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_take_partial_batch() {
        let mut assembler = BatchAssembler::new(5);
        assert!(assembler.take().is_none());

        assembler.append(message("a"));
        assembler.append(message("b"));
        let batch = assembler.take().unwrap();
        assert_eq!(batch.len(), 2);
        assert!(assembler.is_empty());
        assert!(assembler.take().is_none());
    }

    #[test]
    fn test_zero_batch_size_behaves_as_one() {
        let mut assembler = BatchAssembler::new(0);
        assert_eq!(assembler.batch_size(), 1);
        assert!(assembler.append(message("a")).is_some());
    }

    #[test]
    fn test_batch_serialization() {
        let batch = Batch {
            messages: vec![WireMessage {
                fields: vec![Field::new("space", "test_space")],
                text: "hello".to_string(),
                timestamp: 10,
            }],
        };
        assert_eq!(
            serde_json::to_string(&batch).unwrap(),
            r#"{"messages":[{"fields":[{"name":"space","content":"test_space"}],"text":"hello","timestamp":10}]}"#
        );
    }
}
