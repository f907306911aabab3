//
// uid.rs
// dicom-anon
//
// Run-scoped pseudonym maps: original UIDs to generated UIDs, and study UIDs to sequential labels.
//

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

/// Label used when a record carries no StudyInstanceUID.
pub const STUDY_SENTINEL: &str = "STUDY";

/// Generate a UID under the UUID-derived `2.25` root.
pub fn generate_uid() -> String {
    format!("2.25.{}", Uuid::new_v4().as_u128())
}

/// Maps original UIDs to freshly generated ones, consistently for a whole batch.
///
/// The map lives only as long as the batch: a later run assigns new pseudonyms.
#[derive(Debug, Default)]
pub struct UidPseudonymizer {
    map: HashMap<String, String>,
    issued: HashSet<String>,
}

impl UidPseudonymizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pseudonym for `original`. Empty values pass through unchanged.
    pub fn map(&mut self, original: &str) -> String {
        let key = original.trim_end_matches(['\0', ' ']).trim_start();
        if key.is_empty() {
            return original.to_string();
        }
        if let Some(existing) = self.map.get(key) {
            return existing.clone();
        }

        let mut fresh = generate_uid();
        while !self.issued.insert(fresh.clone()) {
            fresh = generate_uid();
        }
        self.map.insert(key.to_string(), fresh.clone());
        fresh
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Assigns `STUDY_nnnn` labels in first-seen order across the whole batch.
#[derive(Debug, Default)]
pub struct StudyLabeler {
    labels: HashMap<String, String>,
}

impl StudyLabeler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label_for(&mut self, study_uid: Option<&str>) -> String {
        let Some(uid) = study_uid.map(str::trim).filter(|u| !u.is_empty()) else {
            return STUDY_SENTINEL.to_string();
        };
        let next = self.labels.len() + 1;
        self.labels
            .entry(uid.to_string())
            .or_insert_with(|| format!("STUDY_{next:04}"))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
