use std::fmt;

use serde::{Deserialize, Serialize};

/// Author, committer or tagger of a revision object.
///
/// The timestamp is milliseconds since the Unix epoch (UTC); `tz_offset` is
/// the local offset in minutes at the time of signing, kept for display.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Person {
    pub name: Option<String>,
    pub email: Option<String>,
    pub timestamp: i64,
    pub tz_offset: i32,
}

impl Person {
    pub fn new(
        name: Option<String>,
        email: Option<String>,
        timestamp: i64,
        tz_offset: i32,
    ) -> Self {
        Self {
            name,
            email,
            timestamp,
            tz_offset,
        }
    }

    /// A person stamped with the current wall-clock time in UTC.
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: Some(email.into()),
            timestamp: chrono::Utc::now().timestamp_millis(),
            tz_offset: 0,
        }
    }

    /// Timestamp as a chrono UTC datetime, if representable.
    pub fn datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(self.timestamp)
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_deref().unwrap_or("unknown");
        match &self.email {
            Some(email) => write!(f, "{name} <{email}>"),
            None => write!(f, "{name}"),
        }
    }
}
