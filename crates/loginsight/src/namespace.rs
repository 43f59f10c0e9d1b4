// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Output field naming.
//!
//! Log Insight reserves some field names for its own schema. Event fields using one of
//! those names are renamed with a `cf_` prefix before they are sent.

use std::borrow::Cow;
use std::collections::HashSet;

use crate::constants::RESERVED_FIELD_PREFIX;
use crate::error::ConfigError;

/// Renames reserved field names. Immutable after construction, so it can be shared by
/// every worker without synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyNamespacer {
    reserved: HashSet<String>,
}

impl KeyNamespacer {
    pub fn new<I, S>(reserved: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reserved: reserved.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a comma separated list such as `event_type,source`.
    ///
    /// Entries are trimmed. An empty list yields no reserved fields, but an empty entry
    /// inside a non-empty list (`a,,b`, `a,`) or an entry containing whitespace is
    /// rejected.
    pub fn from_list(list: &str) -> Result<Self, ConfigError> {
        if list.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut reserved = HashSet::new();
        for entry in list.split(',') {
            let entry = entry.trim();
            if entry.is_empty() || entry.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidReservedFields(list.to_string()));
            }
            reserved.insert(entry.to_string());
        }
        Ok(Self { reserved })
    }

    #[must_use]
    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }

    /// Returns `cf_<name>` when `name` is reserved, `name` otherwise.
    #[must_use]
    pub fn namespace<'a>(&self, name: &'a str) -> Cow<'a, str> {
        if self.is_reserved(name) {
            Cow::Owned(format!("{RESERVED_FIELD_PREFIX}{name}"))
        } else {
            Cow::Borrowed(name)
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.reserved.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reserved.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::hash_set;
    use proptest::prelude::*;

    #[test]
    fn test_unreserved_name_is_unchanged() {
        let namespacer = KeyNamespacer::new(["reserved"]);
        assert_eq!(namespacer.namespace("hello"), "hello");
        assert!(matches!(namespacer.namespace("hello"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_reserved_name_is_prefixed() {
        let namespacer = KeyNamespacer::new(["reserved"]);
        assert_eq!(namespacer.namespace("reserved"), "cf_reserved");
    }

    #[test]
    fn test_from_list_trims_entries() {
        let namespacer = KeyNamespacer::from_list(" event_type , source ").unwrap();
        assert_eq!(namespacer.len(), 2);
        assert!(namespacer.is_reserved("event_type"));
        assert!(namespacer.is_reserved("source"));
    }

    #[test]
    fn test_from_list_empty() {
        let namespacer = KeyNamespacer::from_list("").unwrap();
        assert!(namespacer.is_empty());
        assert_eq!(namespacer.namespace("event_type"), "event_type");
    }

    #[test]
    fn test_from_list_rejects_malformed_entries() {
        for list in ["a,,b", "a,", ",a", "event type"] {
            assert!(
                matches!(
                    KeyNamespacer::from_list(list),
                    Err(ConfigError::InvalidReservedFields(_))
                ),
                "'{list}' should be rejected"
            );
        }
    }

    proptest! {
        #[test]
        fn prop_prefixed_iff_reserved(
            reserved in hash_set("[a-z_]{1,8}", 0..8),
            name in "[a-z_]{1,8}",
        ) {
            let namespacer = KeyNamespacer::new(reserved.iter().cloned());
            let output = namespacer.namespace(&name);
            if reserved.contains(&name) {
                prop_assert_eq!(output.as_ref(), format!("cf_{name}"));
            } else {
                prop_assert_eq!(output.as_ref(), name.as_str());
            }
        }
    }
}
