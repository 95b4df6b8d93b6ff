use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::data::{CacheEntry, CodeCache, GeneratedCode};

/// FileCodeCache is an implementation of the CodeCache trait that stores
/// cache entries as JSON files.
///
/// The cache is organized as: `{folder}/{prompt_model_hash}/{fingerprint}.cache`
/// where prompt_model_hash = hash(system_prompt + ":" + model_name), so a new
/// prompt or model starts from an empty cache. Per-entity history is kept in
/// `{folder}/{prompt_model_hash}/history/{entity_id}.json`.
#[derive(Debug, Clone)]
pub struct FileCodeCache {
    /// The root folder path for the cache (defaults to ".specforge")
    folder: PathBuf,
    /// Hash of system prompt + model name (used as subfolder)
    prompt_model_hash: String,
}

impl FileCodeCache {
    /// Creates a new FileCodeCache instance
    ///
    /// # Arguments
    /// * `folder` - Optional root folder path. If None, defaults to ".specforge"
    /// * `prompt_model_hash` - See [`prompt_model_hash`]
    pub fn new(folder: Option<PathBuf>, prompt_model_hash: String) -> Self {
        Self {
            folder: folder.unwrap_or_else(|| PathBuf::from(".specforge")),
            prompt_model_hash,
        }
    }

    /// Gets the directory path for cache files (without the filename)
    fn cache_dir(&self) -> PathBuf {
        self.folder.join(&self.prompt_model_hash)
    }

    /// Path format: `{folder}/{prompt_model_hash}/{fingerprint}.cache`
    ///
    /// Fingerprints are hex strings and already safe for filenames.
    fn entry_path(&self, fingerprint: &str) -> PathBuf {
        self.cache_dir().join(format!("{fingerprint}.cache"))
    }

    fn history_path(&self, entity_id: &str) -> PathBuf {
        self.cache_dir()
            .join("history")
            .join(format!("{}.json", sanitize(entity_id)))
    }

    fn read_entry(&self, fingerprint: &str) -> Option<CacheEntry> {
        let path = self.entry_path(fingerprint);
        // File not found or read error - treat as cache miss
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(entry) => Some(entry),
            Err(e) => {
                error!(path = %path.display(), error = %e, "corrupt cache entry");
                None
            }
        }
    }

    fn read_history(&self, entity_id: &str) -> Vec<String> {
        fs::read_to_string(self.history_path(entity_id))
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default()
    }

    fn write_history(&self, entity_id: &str, fingerprints: &[String]) {
        write_json(&self.history_path(entity_id), &fingerprints);
    }
}

/// Hash of a system prompt and model name, used to partition the cache.
pub fn prompt_model_hash(system_prompt: &str, model_name: &str) -> String {
    let composite = format!("{system_prompt}:{model_name}");
    let mut hasher = Sha256::new();
    hasher.update(composite.as_bytes());
    hex::encode(hasher.finalize())
}

fn sanitize(entity_id: &str) -> String {
    entity_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Creates necessary directories and writes the value. Errors are logged
/// without panicking.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) {
    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir) {
            error!(dir = %dir.display(), error = %e, "failed to create cache directory");
            return;
        }
    }

    let json = match serde_json::to_string_pretty(value) {
        Ok(json) => json,
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to encode cache file");
            return;
        }
    };

    if let Err(e) = fs::write(path, json) {
        error!(path = %path.display(), error = %e, "failed to write cache file");
    }
}

impl CodeCache for FileCodeCache {
    fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
        let mut entry = self.read_entry(fingerprint)?;
        entry.access_count += 1;
        entry.last_accessed_at = Utc::now();
        write_json(&self.entry_path(fingerprint), &entry);
        debug!(fingerprint, entity = %entry.entity_id, "file cache hit");
        Some(entry)
    }

    fn put(&self, fingerprint: &str, entity_id: &str, code: &GeneratedCode) {
        let now = Utc::now();
        let entry = CacheEntry {
            fingerprint: fingerprint.to_string(),
            entity_id: entity_id.to_string(),
            generated_code: code.clone(),
            generated_at: now,
            access_count: 1,
            last_accessed_at: now,
        };
        write_json(&self.entry_path(fingerprint), &entry);

        let mut history = self.read_history(entity_id);
        if !history.iter().any(|f| f == fingerprint) {
            history.push(fingerprint.to_string());
            self.write_history(entity_id, &history);
        }
    }

    fn history(&self, entity_id: &str) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self
            .read_history(entity_id)
            .iter()
            .filter_map(|f| self.read_entry(f))
            .collect();
        entries.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        entries
    }

    fn remove(&self, fingerprint: &str) {
        let Some(entry) = self.read_entry(fingerprint) else {
            return;
        };
        if let Err(e) = fs::remove_file(self.entry_path(fingerprint)) {
            error!(fingerprint, error = %e, "failed to remove cache entry");
        }

        let mut history = self.read_history(&entry.entity_id);
        history.retain(|f| f != fingerprint);
        self.write_history(&entry.entity_id, &history);
    }
}
