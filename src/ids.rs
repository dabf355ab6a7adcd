//! Task keys.
//!
//! Keys are random ULIDs, or `<prefix>-<n>` sequences counted per prefix when
//! an operation asks for readable keys.

use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identifier of a submitted task.
///
/// Either a ULID string or `<prefix>-<n>` where `n` counts up per prefix.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct TaskKey(String);

impl TaskKey {
    /// Fresh random key backed by a ULID.
    pub fn random() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Wrap an existing key string, e.g. one parsed from a status path.
    pub fn from_string(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TaskKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TaskKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for TaskKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TaskKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Err(serde::de::Error::custom("task key must not be empty"));
        }
        Ok(TaskKey(s))
    }
}

/// Hands out task keys. Prefixed keys use one counter per prefix, starting at 1.
#[derive(Debug, Default)]
pub struct KeyGenerator {
    counters: DashMap<String, AtomicU64>,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn random(&self) -> TaskKey {
        TaskKey::random()
    }

    pub fn prefixed(&self, prefix: &str) -> TaskKey {
        let n = {
            let counter = self
                .counters
                .entry(prefix.to_string())
                .or_insert_with(|| AtomicU64::new(0));
            counter.fetch_add(1, Ordering::Relaxed) + 1
        };
        TaskKey(format!("{prefix}-{n}"))
    }
}
