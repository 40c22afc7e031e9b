//! GUID reconciliation between a gather pass and the stored current set.

use std::collections::HashSet;

/// Result of diffing discovered GUIDs against the known current set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuidDiff {
    pub to_create: Vec<String>,
    pub to_update: Vec<String>,
    pub to_delete: Vec<String>,
}

impl GuidDiff {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    pub fn total(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_delete.len()
    }
}

/// Split discovered GUIDs into new / changed / deleted relative to the set
/// of GUIDs with a current, non-deleted harvest object.
///
/// Output vectors are sorted so a gather pass is deterministic regardless
/// of listing order. Duplicate discoveries of the same GUID collapse to
/// one entry.
pub fn diff_guids(discovered: &[String], known: &HashSet<String>) -> GuidDiff {
    let discovered_set: HashSet<&str> = discovered.iter().map(String::as_str).collect();

    let mut to_create: Vec<String> = discovered_set
        .iter()
        .filter(|g| !known.contains(**g))
        .map(|g| g.to_string())
        .collect();
    let mut to_update: Vec<String> = discovered_set
        .iter()
        .filter(|g| known.contains(**g))
        .map(|g| g.to_string())
        .collect();
    let mut to_delete: Vec<String> = known
        .iter()
        .filter(|g| !discovered_set.contains(g.as_str()))
        .cloned()
        .collect();

    to_create.sort();
    to_update.sort();
    to_delete.sort();

    GuidDiff {
        to_create,
        to_update,
        to_delete,
    }
}
