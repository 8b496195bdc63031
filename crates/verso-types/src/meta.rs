use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Descriptive metadata carried by every commit.
///
/// Timestamps are stored as milliseconds since the UNIX epoch so that the
/// serialized form (and therefore the commit hash) is stable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMeta {
    pub author: String,
    pub message: String,
    pub committed_at_ms: i64,
    pub properties: BTreeMap<String, String>,
}

impl CommitMeta {
    /// Metadata stamped with the current wall-clock time.
    pub fn new(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self::at(author, message, Utc::now())
    }

    /// Metadata stamped with an explicit time.
    pub fn at(author: impl Into<String>, message: impl Into<String>, when: DateTime<Utc>) -> Self {
        Self {
            author: author.into(),
            message: message.into(),
            committed_at_ms: when.timestamp_millis(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn committed_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.committed_at_ms)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}
