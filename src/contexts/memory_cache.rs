use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::data::{CacheEntry, CodeCache, GeneratedCode};

/// Summary of what a [`MemoryCodeCache`] holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_entities: usize,
    pub most_used: Option<CacheEntry>,
    pub recently_generated: Vec<CacheEntry>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    /// entity id -> fingerprints in insertion order
    history: HashMap<String, Vec<String>>,
}

/// Process-wide in-memory [`CodeCache`].
///
/// Share it between sessions by wrapping it in an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryCodeCache {
    inner: Mutex<Inner>,
}

impl MemoryCodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Most recently generated entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<CacheEntry> {
        let inner = self.lock();
        let mut entries: Vec<CacheEntry> = inner.entries.values().cloned().collect();
        entries.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        entries.truncate(limit);
        entries
    }

    pub fn stats(&self) -> CacheStats {
        let recently_generated = self.recent(5);
        let inner = self.lock();
        let most_used = inner
            .entries
            .values()
            .max_by(|a, b| {
                a.access_count
                    .cmp(&b.access_count)
                    .then_with(|| b.fingerprint.cmp(&a.fingerprint))
            })
            .cloned();

        CacheStats {
            total_entries: inner.entries.len(),
            total_entities: inner.history.values().filter(|h| !h.is_empty()).count(),
            most_used,
            recently_generated,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.history.clear();
    }
}

impl CodeCache for MemoryCodeCache {
    fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
        let mut inner = self.lock();
        let entry = inner.entries.get_mut(fingerprint)?;
        entry.access_count += 1;
        entry.last_accessed_at = Utc::now();
        Some(entry.clone())
    }

    fn put(&self, fingerprint: &str, entity_id: &str, code: &GeneratedCode) {
        let now = Utc::now();
        let mut inner = self.lock();
        inner.entries.insert(
            fingerprint.to_string(),
            CacheEntry {
                fingerprint: fingerprint.to_string(),
                entity_id: entity_id.to_string(),
                generated_code: code.clone(),
                generated_at: now,
                access_count: 1,
                last_accessed_at: now,
            },
        );

        let history = inner.history.entry(entity_id.to_string()).or_default();
        if !history.iter().any(|f| f == fingerprint) {
            history.push(fingerprint.to_string());
        }
    }

    fn history(&self, entity_id: &str) -> Vec<CacheEntry> {
        let inner = self.lock();
        let mut entries: Vec<CacheEntry> = inner
            .history
            .get(entity_id)
            .map(|fingerprints| {
                fingerprints
                    .iter()
                    .filter_map(|f| inner.entries.get(f).cloned())
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        entries
    }

    fn remove(&self, fingerprint: &str) {
        let mut inner = self.lock();
        if let Some(entry) = inner.entries.remove(fingerprint) {
            if let Some(history) = inner.history.get_mut(&entry.entity_id) {
                history.retain(|f| f != fingerprint);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FileKind, GeneratedFile, GenerationMetadata};

    fn code(entity_id: &str, content: &str) -> GeneratedCode {
        GeneratedCode {
            files: vec![GeneratedFile {
                path: format!("components/{entity_id}.tsx"),
                content: content.to_string(),
                kind: FileKind::Component,
            }],
            dependency_entity_ids: Vec::new(),
            metadata: GenerationMetadata {
                entity_id: entity_id.to_string(),
                content_fingerprint: "fp".to_string(),
                generated_at: Utc::now(),
                model_identifier: "test-model".to_string(),
            },
        }
    }

    #[test]
    fn get_records_access() {
        let cache = MemoryCodeCache::new();
        assert!(cache.get("missing").is_none());

        cache.put("h1", "p1", &code("p1", "a"));
        assert_eq!(cache.get("h1").unwrap().access_count, 2);
        assert_eq!(cache.get("h1").unwrap().access_count, 3);
    }

    #[test]
    fn history_is_per_entity_and_deduplicated() {
        let cache = MemoryCodeCache::new();
        cache.put("h1", "p1", &code("p1", "a"));
        cache.put("h2", "p1", &code("p1", "b"));
        cache.put("h1", "p1", &code("p1", "a"));
        cache.put("h3", "p2", &code("p2", "c"));

        let history = cache.history("p1");
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|e| e.entity_id == "p1"));
        assert!(cache.history("nope").is_empty());
    }

    #[test]
    fn remove_drops_entry_and_history_reference() {
        let cache = MemoryCodeCache::new();
        cache.put("h1", "p1", &code("p1", "a"));
        cache.put("h2", "p1", &code("p1", "b"));

        cache.remove("h1");

        assert!(cache.get("h1").is_none());
        assert_eq!(cache.history("p1").len(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn stats_report_most_used_entry() {
        let cache = MemoryCodeCache::new();
        cache.put("h1", "p1", &code("p1", "a"));
        cache.put("h2", "p2", &code("p2", "b"));
        cache.get("h2");

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.total_entities, 2);
        assert_eq!(stats.most_used.unwrap().fingerprint, "h2");
        assert_eq!(stats.recently_generated.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().total_entities, 0);
    }
}
