use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::GeneratedCode;

/// One cached generation result, keyed by the fingerprint it was produced for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub fingerprint: String,
    pub entity_id: String,
    pub generated_code: GeneratedCode,
    pub generated_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_accessed_at: DateTime<Utc>,
}

/// Content-addressed store of generated code.
///
/// Implementations should handle storage errors gracefully without panicking:
/// a failed read is a miss, a failed write is logged and dropped.
pub trait CodeCache: Send + Sync {
    /// Look up an entry and record the access.
    ///
    /// # Returns
    /// * `Some(CacheEntry)` - The entry with its access count already bumped
    /// * `None` - If the fingerprint is unknown or retrieval fails
    fn get(&self, fingerprint: &str) -> Option<CacheEntry>;

    /// Store generated code under `fingerprint` and append the fingerprint to
    /// the entity's history.
    fn put(&self, fingerprint: &str, entity_id: &str, code: &GeneratedCode);

    /// Entries generated for an entity, newest first.
    fn history(&self, entity_id: &str) -> Vec<CacheEntry>;

    /// Drop one entry and its history reference.
    fn remove(&self, fingerprint: &str);
}
