//! Conflict report model.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Scope a proposed structure would occupy, used for conflict detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictProposal {
    pub campus_id: Uuid,
    pub academic_year_id: Uuid,
    pub class_ids: Vec<Uuid>,
    /// `None` proposes a year-wide structure touching every term.
    pub term_id: Option<Uuid>,
}

/// An existing structure a proposal collides with in one term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictingStructure {
    pub structure_id: Uuid,
    pub lineage_id: Uuid,
    pub structure_name: String,
    pub term_id: Uuid,
}

/// All collisions for one class of the proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassConflict {
    pub class_id: Uuid,
    pub structures: Vec<ConflictingStructure>,
}

impl ClassConflict {
    pub fn structure_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for s in &self.structures {
            if !names.contains(&s.structure_name.as_str()) {
                names.push(&s.structure_name);
            }
        }
        names
    }
}

/// Result of conflict detection. Classes appear in proposal order; only
/// classes with at least one collision are listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    pub conflicts: Vec<ClassConflict>,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn class_ids(&self) -> Vec<Uuid> {
        self.conflicts.iter().map(|c| c.class_id).collect()
    }

    pub fn for_class(&self, class_id: Uuid) -> Option<&ClassConflict> {
        self.conflicts.iter().find(|c| c.class_id == class_id)
    }

    /// Distinct conflicting structure ids, in first-seen order.
    pub fn structure_ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for s in self.conflicts.iter().flat_map(|c| &c.structures) {
            if !ids.contains(&s.structure_id) {
                ids.push(s.structure_id);
            }
        }
        ids
    }

    /// Distinct lineages of the conflicting structures, in first-seen order.
    pub fn lineage_ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for s in self.conflicts.iter().flat_map(|c| &c.structures) {
            if !ids.contains(&s.lineage_id) {
                ids.push(s.lineage_id);
            }
        }
        ids
    }

    /// Merge another report in, keeping class order and dropping repeats.
    pub fn extend(&mut self, other: ConflictReport) {
        for incoming in other.conflicts {
            match self
                .conflicts
                .iter_mut()
                .find(|c| c.class_id == incoming.class_id)
            {
                Some(existing) => {
                    for s in incoming.structures {
                        if !existing.structures.contains(&s) {
                            existing.structures.push(s);
                        }
                    }
                }
                None => self.conflicts.push(incoming),
            }
        }
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .conflicts
            .iter()
            .map(|c| format!("class {} collides with [{}]", c.class_id, c.structure_names().join(", ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}
