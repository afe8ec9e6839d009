//! Per-group strings with a default fallback.
//!
//! Used for both the expected secrets and the confirmation strings.

use parking_lot::RwLock;
use std::collections::HashMap;

/// A default value plus per-group overrides.
///
/// Reads vastly outnumber writes once the server is up, so both parts sit
/// behind read-write locks.
#[derive(Debug, Default)]
pub struct GroupStrings {
    default: RwLock<String>,
    groups: RwLock<HashMap<i64, String>>,
}

impl GroupStrings {
    pub fn new(default: impl Into<String>, groups: HashMap<i64, String>) -> Self {
        Self {
            default: RwLock::new(default.into()),
            groups: RwLock::new(groups),
        }
    }

    pub fn default_value(&self) -> String {
        self.default.read().clone()
    }

    pub fn set_default(&self, value: impl Into<String>) {
        *self.default.write() = value.into();
    }

    /// Override the value for one group.
    pub fn set(&self, group_id: i64, value: impl Into<String>) {
        self.groups.write().insert(group_id, value.into());
    }

    pub fn remove(&self, group_id: i64) -> Option<String> {
        self.groups.write().remove(&group_id)
    }

    /// The override registered for `group_id`, if any.
    pub fn get(&self, group_id: i64) -> Option<String> {
        self.groups.read().get(&group_id).cloned()
    }

    /// The override for `group_id`, else the default. Empty means unset.
    pub fn resolve(&self, group_id: i64) -> String {
        self.get(group_id).unwrap_or_else(|| self.default_value())
    }
}

/// Compare a received secret with the expected one in constant time.
pub fn secrets_match(expected: &str, given: &str) -> bool {
    if expected.len() != given.len() {
        return false;
    }

    expected
        .bytes()
        .zip(given.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
