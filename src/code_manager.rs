//! In-memory virtual file system for one generation session.
//!
//! Every mutating call appends exactly one [`FileOperation`] to an append-only
//! log, except [`CodeManager::update_file`] with unchanged content, which is a
//! no-op. A path can never be both a file and a directory: adding or moving a
//! file onto a path that is the parent or the child of an existing file is
//! rejected with [`CodeManagerError::PathConflict`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

use crate::data::{FileKind, GeneratedCode};
use crate::error::CodeManagerError;
use crate::fingerprint::hash_content;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedFile {
    pub path: String,
    pub content: String,
    pub content_hash: String,
    pub last_modified_at: DateTime<Utc>,
    pub kind: FileKind,
}

impl ManagedFile {
    fn new(path: &str, content: &str, kind: FileKind) -> Self {
        Self {
            path: path.to_string(),
            content: content.to_string(),
            content_hash: hash_content(content),
            last_modified_at: Utc::now(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FileOperation {
    Add {
        path: String,
        content: String,
    },
    Update {
        path: String,
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    Replace {
        path: String,
        old_content: String,
        new_content: String,
    },
    Delete {
        path: String,
    },
    #[serde(rename_all = "camelCase")]
    Move {
        path: String,
        new_path: String,
    },
}

impl FileOperation {
    /// Path the operation was applied to (the source path for moves).
    pub fn path(&self) -> &str {
        match self {
            FileOperation::Add { path, .. }
            | FileOperation::Update { path, .. }
            | FileOperation::Replace { path, .. }
            | FileOperation::Delete { path }
            | FileOperation::Move { path, .. } => path,
        }
    }
}

/// Display tree of the managed files, keyed by path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeNode {
    #[serde(rename_all = "camelCase")]
    File { content: String, file_kind: FileKind },
    Directory { children: BTreeMap<String, TreeNode> },
}

/// Position in the operation log, see [`CodeManager::marker`].
///
/// Carries the log generation it was taken in, so a marker from before a
/// [`CodeManager::clear_operation_log`] is never mistaken for a position in
/// the new log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogMarker {
    epoch: u64,
    position: usize,
}

/// Cloning yields a fully independent copy, operation log included.
#[derive(Debug, Clone, Default)]
pub struct CodeManager {
    files: BTreeMap<String, ManagedFile>,
    operations: Vec<FileOperation>,
    log_epoch: u64,
}

impl CodeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a manager from previously generated code without logging.
    ///
    /// Entities are applied in id order; when two entries carry the same path
    /// the later one wins. Files whose path conflicts with an already seeded
    /// file/directory are skipped.
    pub fn from_generated(existing: &HashMap<String, GeneratedCode>) -> Self {
        let mut manager = Self::new();
        let mut entity_ids: Vec<&String> = existing.keys().collect();
        entity_ids.sort();

        for entity_id in entity_ids {
            for file in &existing[entity_id].files {
                if let Err(e) = manager.check_tree_conflict(&file.path) {
                    warn!(entity = %entity_id, error = %e, "skipping cached file");
                    continue;
                }
                manager
                    .files
                    .insert(file.path.clone(), ManagedFile::new(&file.path, &file.content, file.kind));
            }
        }
        manager
    }

    pub fn get_file(&self, path: &str) -> Option<&ManagedFile> {
        self.files.get(path)
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// All files ordered by path.
    pub fn list_files(&self) -> Vec<&ManagedFile> {
        self.files.values().collect()
    }

    pub fn files_by_kind(&self, kind: FileKind) -> Vec<&ManagedFile> {
        self.files.values().filter(|f| f.kind == kind).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn add_file(&mut self, path: &str, content: &str, kind: FileKind) -> Result<(), CodeManagerError> {
        if self.files.contains_key(path) {
            return Err(CodeManagerError::DuplicatePath(path.to_string()));
        }
        self.check_tree_conflict(path)?;

        self.files
            .insert(path.to_string(), ManagedFile::new(path, content, kind));
        self.operations.push(FileOperation::Add {
            path: path.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    /// Replace a file's whole content. Identical content is a no-op: no log
    /// entry and no timestamp change.
    pub fn update_file(&mut self, path: &str, content: &str) -> Result<(), CodeManagerError> {
        let file = self
            .files
            .get_mut(path)
            .ok_or_else(|| CodeManagerError::NotFound(path.to_string()))?;

        let new_hash = hash_content(content);
        if file.content_hash == new_hash {
            return Ok(());
        }

        file.content = content.to_string();
        file.content_hash = new_hash;
        file.last_modified_at = Utc::now();
        self.operations.push(FileOperation::Update {
            path: path.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    /// Add the file if absent, update it otherwise.
    pub fn upsert_file(&mut self, path: &str, content: &str, kind: FileKind) -> Result<(), CodeManagerError> {
        if self.has_file(path) {
            self.update_file(path, content)
        } else {
            self.add_file(path, content, kind)
        }
    }

    /// Surgical edit: replace the first occurrence of `old` with `new`.
    pub fn replace_content(&mut self, path: &str, old: &str, new: &str) -> Result<(), CodeManagerError> {
        let file = self
            .files
            .get_mut(path)
            .ok_or_else(|| CodeManagerError::NotFound(path.to_string()))?;

        if !file.content.contains(old) {
            return Err(CodeManagerError::ContentNotFound(path.to_string()));
        }

        file.content = file.content.replacen(old, new, 1);
        file.content_hash = hash_content(&file.content);
        file.last_modified_at = Utc::now();
        self.operations.push(FileOperation::Replace {
            path: path.to_string(),
            old_content: old.to_string(),
            new_content: new.to_string(),
        });
        Ok(())
    }

    pub fn delete_file(&mut self, path: &str) -> Result<(), CodeManagerError> {
        if self.files.remove(path).is_none() {
            return Err(CodeManagerError::NotFound(path.to_string()));
        }
        self.operations.push(FileOperation::Delete {
            path: path.to_string(),
        });
        Ok(())
    }

    pub fn move_file(&mut self, from: &str, to: &str) -> Result<(), CodeManagerError> {
        if !self.files.contains_key(from) {
            return Err(CodeManagerError::NotFound(from.to_string()));
        }
        if self.files.contains_key(to) {
            return Err(CodeManagerError::DuplicatePath(to.to_string()));
        }

        let mut file = self
            .files
            .remove(from)
            .ok_or_else(|| CodeManagerError::NotFound(from.to_string()))?;
        if let Err(e) = self.check_tree_conflict(to) {
            self.files.insert(from.to_string(), file);
            return Err(e);
        }

        file.path = to.to_string();
        file.last_modified_at = Utc::now();
        self.files.insert(to.to_string(), file);
        self.operations.push(FileOperation::Move {
            path: from.to_string(),
            new_path: to.to_string(),
        });
        Ok(())
    }

    pub fn operations(&self) -> &[FileOperation] {
        &self.operations
    }

    /// Current end of the operation log.
    pub fn marker(&self) -> LogMarker {
        LogMarker {
            epoch: self.log_epoch,
            position: self.operations.len(),
        }
    }

    /// Operations recorded after `marker`. A marker taken before the last
    /// clear yields the whole current log.
    pub fn operations_since(&self, marker: LogMarker) -> &[FileOperation] {
        if marker.epoch != self.log_epoch {
            return &self.operations;
        }
        &self.operations[marker.position.min(self.operations.len())..]
    }

    pub fn clear_operation_log(&mut self) {
        self.operations.clear();
        self.log_epoch += 1;
    }

    /// Files still present that were touched since the log was last cleared.
    pub fn changed_files(&self) -> Vec<&ManagedFile> {
        let touched: HashSet<&str> = self
            .operations
            .iter()
            .flat_map(|op| match op {
                FileOperation::Move { path, new_path } => vec![path.as_str(), new_path.as_str()],
                other => vec![other.path()],
            })
            .collect();
        self.files
            .values()
            .filter(|f| touched.contains(f.path.as_str()))
            .collect()
    }

    /// Flat path → content snapshot for the preview sandbox.
    pub fn export_for_sandbox(&self) -> BTreeMap<String, String> {
        self.files
            .iter()
            .map(|(path, file)| (path.clone(), file.content.clone()))
            .collect()
    }

    pub fn file_tree(&self) -> BTreeMap<String, TreeNode> {
        let mut root = BTreeMap::new();

        for file in self.files.values() {
            let segments: Vec<&str> = file.path.split('/').filter(|s| !s.is_empty()).collect();
            insert_tree_node(&mut root, &segments, file);
        }

        root
    }

    fn check_tree_conflict(&self, path: &str) -> Result<(), CodeManagerError> {
        let as_dir = format!("{}/", path.trim_end_matches('/'));
        for existing in self.files.keys() {
            if existing.starts_with(&as_dir) || path.starts_with(&format!("{existing}/")) {
                return Err(CodeManagerError::PathConflict {
                    path: path.to_string(),
                    existing: existing.clone(),
                });
            }
        }
        Ok(())
    }
}

fn insert_tree_node(level: &mut BTreeMap<String, TreeNode>, segments: &[&str], file: &ManagedFile) {
    match segments {
        [] => {}
        [leaf] => {
            level.insert(
                leaf.to_string(),
                TreeNode::File {
                    content: file.content.clone(),
                    file_kind: file.kind,
                },
            );
        }
        [dir, rest @ ..] => {
            let node = level
                .entry(dir.to_string())
                .or_insert_with(|| TreeNode::Directory {
                    children: BTreeMap::new(),
                });
            // A file sitting on a directory segment cannot happen while
            // add/move reject path conflicts.
            if let TreeNode::Directory { children } = node {
                insert_tree_node(children, rest, file);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{GeneratedFile, GenerationMetadata};

    #[test]
    fn add_rejects_duplicate_path() {
        let mut manager = CodeManager::new();
        manager.add_file("x.tsx", "abc", FileKind::Component).unwrap();

        let err = manager.add_file("x.tsx", "def", FileKind::Component).unwrap_err();
        assert_eq!(err, CodeManagerError::DuplicatePath("x.tsx".to_string()));
        assert_eq!(manager.get_file("x.tsx").unwrap().content, "abc");
    }

    #[test]
    fn update_with_identical_content_is_not_logged() {
        let mut manager = CodeManager::new();
        manager.add_file("x.tsx", "abc", FileKind::Component).unwrap();
        let stamp = manager.get_file("x.tsx").unwrap().last_modified_at;

        manager.update_file("x.tsx", "abc").unwrap();

        assert_eq!(manager.operations().len(), 1);
        assert_eq!(manager.get_file("x.tsx").unwrap().last_modified_at, stamp);
    }

    #[test]
    fn update_changes_content_and_hash() {
        let mut manager = CodeManager::new();
        manager.add_file("x.tsx", "abc", FileKind::Component).unwrap();
        let before = manager.get_file("x.tsx").unwrap().content_hash.clone();

        manager.update_file("x.tsx", "abcd").unwrap();

        let file = manager.get_file("x.tsx").unwrap();
        assert_eq!(file.content, "abcd");
        assert_ne!(file.content_hash, before);
        assert!(matches!(manager.operations()[1], FileOperation::Update { .. }));
    }

    #[test]
    fn update_missing_file_fails() {
        let mut manager = CodeManager::new();
        assert_eq!(
            manager.update_file("nope.ts", "x"),
            Err(CodeManagerError::NotFound("nope.ts".to_string()))
        );
        assert!(manager.operations().is_empty());
    }

    #[test]
    fn replace_swaps_first_occurrence_only() {
        let mut manager = CodeManager::new();
        manager.add_file("x.tsx", "abc abc", FileKind::Component).unwrap();

        manager.replace_content("x.tsx", "abc", "xyz").unwrap();

        assert_eq!(manager.get_file("x.tsx").unwrap().content, "xyz abc");
        assert_eq!(
            manager.operations().last(),
            Some(&FileOperation::Replace {
                path: "x.tsx".to_string(),
                old_content: "abc".to_string(),
                new_content: "xyz".to_string(),
            })
        );
    }

    #[test]
    fn replace_of_absent_substring_leaves_content() {
        let mut manager = CodeManager::new();
        manager.add_file("x.tsx", "abc", FileKind::Component).unwrap();

        let err = manager.replace_content("x.tsx", "zzz", "xyz").unwrap_err();

        assert_eq!(err, CodeManagerError::ContentNotFound("x.tsx".to_string()));
        assert_eq!(manager.get_file("x.tsx").unwrap().content, "abc");
        assert_eq!(manager.operations().len(), 1);
    }

    #[test]
    fn replace_on_missing_path_is_not_found() {
        let mut manager = CodeManager::new();
        assert!(matches!(
            manager.replace_content("x.tsx", "a", "b"),
            Err(CodeManagerError::NotFound(_))
        ));
    }

    #[test]
    fn delete_and_move_enforce_presence() {
        let mut manager = CodeManager::new();
        manager.add_file("a.ts", "a", FileKind::Utility).unwrap();
        manager.add_file("b.ts", "b", FileKind::Utility).unwrap();

        assert!(matches!(manager.delete_file("c.ts"), Err(CodeManagerError::NotFound(_))));
        assert!(matches!(manager.move_file("c.ts", "d.ts"), Err(CodeManagerError::NotFound(_))));
        assert!(matches!(manager.move_file("a.ts", "b.ts"), Err(CodeManagerError::DuplicatePath(_))));

        manager.move_file("a.ts", "lib/a.ts").unwrap();
        assert!(!manager.has_file("a.ts"));
        assert_eq!(manager.get_file("lib/a.ts").unwrap().path, "lib/a.ts");

        manager.delete_file("b.ts").unwrap();
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.operations().len(), 4);
    }

    #[test]
    fn file_and_directory_cannot_share_a_path() {
        let mut manager = CodeManager::new();
        manager.add_file("app", "x", FileKind::Config).unwrap();

        assert!(matches!(
            manager.add_file("app/page.tsx", "y", FileKind::Page),
            Err(CodeManagerError::PathConflict { .. })
        ));

        let mut manager = CodeManager::new();
        manager.add_file("app/page.tsx", "y", FileKind::Page).unwrap();
        manager.add_file("other.ts", "z", FileKind::Utility).unwrap();
        assert!(matches!(
            manager.add_file("app", "x", FileKind::Config),
            Err(CodeManagerError::PathConflict { .. })
        ));
        assert!(matches!(
            manager.move_file("other.ts", "app"),
            Err(CodeManagerError::PathConflict { .. })
        ));
        assert!(manager.has_file("other.ts"));
    }

    #[test]
    fn operations_since_marker_and_clear() {
        let mut manager = CodeManager::new();
        manager.add_file("a.ts", "a", FileKind::Utility).unwrap();
        let marker = manager.marker();
        manager.add_file("b.ts", "b", FileKind::Utility).unwrap();
        manager.update_file("a.ts", "aa").unwrap();

        let since: Vec<&str> = manager.operations_since(marker).iter().map(|op| op.path()).collect();
        assert_eq!(since, vec!["b.ts", "a.ts"]);

        manager.clear_operation_log();
        assert!(manager.operations().is_empty());
        assert!(manager.operations_since(marker).is_empty());
        assert!(manager.changed_files().is_empty());

        manager.update_file("b.ts", "bb").unwrap();
        let changed: Vec<&str> = manager.changed_files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(changed, vec!["b.ts"]);
    }

    #[test]
    fn marker_from_before_clear_sees_whole_new_log() {
        let mut manager = CodeManager::new();
        manager.add_file("a.ts", "a", FileKind::Utility).unwrap();
        let stale = manager.marker();

        manager.clear_operation_log();
        manager.add_file("b.ts", "b", FileKind::Utility).unwrap();

        let since: Vec<&str> = manager.operations_since(stale).iter().map(|op| op.path()).collect();
        assert_eq!(since, vec!["b.ts"]);

        let fresh = manager.marker();
        manager.add_file("c.ts", "c", FileKind::Utility).unwrap();
        let since: Vec<&str> = manager.operations_since(fresh).iter().map(|op| op.path()).collect();
        assert_eq!(since, vec!["c.ts"]);
    }

    #[test]
    fn read_accessors_filter_by_kind() {
        let mut manager = CodeManager::new();
        manager.add_file("app/page.tsx", "p", FileKind::Page).unwrap();
        manager.add_file("app/globals.css", "s", FileKind::Style).unwrap();
        manager.add_file("components/nav.tsx", "n", FileKind::Component).unwrap();

        assert_eq!(manager.files_by_kind(FileKind::Style).len(), 1);
        assert_eq!(manager.list_files().len(), 3);
        assert!(manager.has_file("components/nav.tsx"));
        assert!(manager.get_file("components/missing.tsx").is_none());
    }

    #[test]
    fn export_and_tree_reflect_nested_paths() {
        let mut manager = CodeManager::new();
        manager.add_file("app/page.tsx", "home", FileKind::Page).unwrap();
        manager.add_file("app/about/page.tsx", "about", FileKind::Page).unwrap();
        manager.add_file("README.md", "readme", FileKind::Config).unwrap();

        let export = manager.export_for_sandbox();
        assert_eq!(export.len(), 3);
        assert_eq!(export["app/about/page.tsx"], "about");

        let tree = manager.file_tree();
        let TreeNode::Directory { children: app } = &tree["app"] else {
            panic!("app should be a directory");
        };
        let TreeNode::Directory { children: about } = &app["about"] else {
            panic!("about should be a directory");
        };
        assert_eq!(
            about["page.tsx"],
            TreeNode::File {
                content: "about".to_string(),
                file_kind: FileKind::Page
            }
        );
        assert!(matches!(tree["README.md"], TreeNode::File { .. }));
    }

    #[test]
    fn clone_is_independent() {
        let mut original = CodeManager::new();
        original.add_file("a.ts", "a", FileKind::Utility).unwrap();

        let mut copy = original.clone();
        copy.update_file("a.ts", "changed").unwrap();
        copy.add_file("b.ts", "b", FileKind::Utility).unwrap();

        assert_eq!(original.get_file("a.ts").unwrap().content, "a");
        assert!(!original.has_file("b.ts"));
        assert_eq!(original.operations().len(), 1);
        assert_eq!(copy.operations().len(), 3);
    }

    #[test]
    fn seeding_from_generated_code_is_not_logged() {
        let code = GeneratedCode {
            files: vec![GeneratedFile {
                path: "components/nav.tsx".to_string(),
                content: "nav".to_string(),
                kind: FileKind::Component,
            }],
            dependency_entity_ids: vec![],
            metadata: GenerationMetadata {
                entity_id: "nav".to_string(),
                content_fingerprint: "f".to_string(),
                generated_at: Utc::now(),
                model_identifier: "m".to_string(),
            },
        };
        let existing = HashMap::from([("nav".to_string(), code)]);

        let manager = CodeManager::from_generated(&existing);

        assert!(manager.has_file("components/nav.tsx"));
        assert!(manager.operations().is_empty());
    }
}
