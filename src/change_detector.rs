//! Entity-level diffing of two specification snapshots.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::data::{Category, Specification};
use crate::fingerprint::fingerprint_entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub entity_id: String,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_fingerprint: Option<String>,
}

/// Remembers the last fingerprint seen for every entity across calls.
///
/// One detector belongs to one generation session; it is not shared.
#[derive(Debug, Default, Clone)]
pub struct ChangeDetector {
    fingerprints: HashMap<String, String>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff `current` against `previous`.
    ///
    /// Without a previous snapshot every tracked entity is reported as added
    /// and the index is seeded. Otherwise added and modified records come
    /// first, category by category (styles, pages, contexts, assets), then
    /// deletions in the same category order.
    pub fn detect_changes(
        &mut self,
        current: &Specification,
        previous: Option<&Specification>,
    ) -> Vec<ChangeRecord> {
        let Some(previous) = previous else {
            return current
                .all_entities()
                .into_iter()
                .map(|entity| {
                    let fingerprint = fingerprint_entity(entity);
                    self.fingerprints
                        .insert(entity.id().to_string(), fingerprint.clone());
                    ChangeRecord {
                        entity_id: entity.id().to_string(),
                        kind: ChangeKind::Added,
                        previous_fingerprint: None,
                        current_fingerprint: Some(fingerprint),
                    }
                })
                .collect();
        };

        let mut changes = Vec::new();

        for category in Category::TRACKED {
            for entity in current.entities(category) {
                let id = entity.id();
                let current_fingerprint = fingerprint_entity(entity);

                match previous.find_in(category, id) {
                    None => changes.push(ChangeRecord {
                        entity_id: id.to_string(),
                        kind: ChangeKind::Added,
                        previous_fingerprint: None,
                        current_fingerprint: Some(current_fingerprint.clone()),
                    }),
                    Some(previous_entity) => {
                        let previous_fingerprint = self
                            .fingerprints
                            .get(id)
                            .cloned()
                            .unwrap_or_else(|| fingerprint_entity(previous_entity));
                        if previous_fingerprint != current_fingerprint {
                            changes.push(ChangeRecord {
                                entity_id: id.to_string(),
                                kind: ChangeKind::Modified,
                                previous_fingerprint: Some(previous_fingerprint),
                                current_fingerprint: Some(current_fingerprint.clone()),
                            });
                        }
                    }
                }

                self.fingerprints.insert(id.to_string(), current_fingerprint);
            }
        }

        for category in Category::TRACKED {
            let present: HashSet<&str> = current
                .entities(category)
                .iter()
                .map(|entity| entity.id())
                .collect();

            for entity in previous.entities(category) {
                if present.contains(entity.id()) {
                    continue;
                }
                let previous_fingerprint = self
                    .fingerprints
                    .remove(entity.id())
                    .unwrap_or_else(|| fingerprint_entity(entity));
                changes.push(ChangeRecord {
                    entity_id: entity.id().to_string(),
                    kind: ChangeKind::Deleted,
                    previous_fingerprint: Some(previous_fingerprint),
                    current_fingerprint: None,
                });
            }
        }

        debug!(changes = changes.len(), "change detection finished");
        changes
    }

    /// Last fingerprint recorded for an entity.
    pub fn fingerprint_of(&self, entity_id: &str) -> Option<&str> {
        self.fingerprints.get(entity_id).map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.fingerprints.clear();
    }
}
