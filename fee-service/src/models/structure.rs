//! Fee structure model.

use super::{LineItem, Term};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Maximum number of classes a single structure may cover.
pub const MAX_CLASSES_PER_STRUCTURE: usize = 10;

/// Structure status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureStatus {
    Active,
    Inactive,
}

impl StructureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructureStatus::Active => "active",
            StructureStatus::Inactive => "inactive",
        }
    }

    /// A structure is active while it has not been switched off and no newer
    /// version exists in its lineage.
    pub fn derive(deactivated: bool, is_latest_version: bool) -> Self {
        if !deactivated && is_latest_version {
            StructureStatus::Active
        } else {
            StructureStatus::Inactive
        }
    }
}

/// How a structure created over existing ones combines with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Bill the new structure's items alongside the existing ones.
    #[default]
    Merge,
    /// Replace the billing effect of the conflicting structures.
    Override,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::Merge => "merge",
            ResolutionStrategy::Override => "override",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "override" => ResolutionStrategy::Override,
            _ => ResolutionStrategy::Merge,
        }
    }
}

/// Scope of a structure within its academic year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "term_id")]
pub enum StructureScope {
    /// Applies to exactly one term.
    Term(Uuid),
    /// Applies to every term of the academic year.
    Year,
}

/// A persisted, versioned fee structure.
///
/// Rows are append-only: a new version is a new row in the same lineage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeStructure {
    pub structure_id: Uuid,
    pub lineage_id: Uuid,
    pub campus_id: Uuid,
    pub academic_year_id: Uuid,
    pub term_id: Option<Uuid>,
    pub class_ids: Vec<Uuid>,
    pub structure_name: String,
    pub status: StructureStatus,
    pub strategy: ResolutionStrategy,
    pub version: i32,
    /// Lineages whose billing this structure replaced when it was created.
    pub supersedes: Vec<Uuid>,
    pub line_items: Vec<LineItem>,
    pub created_utc: DateTime<Utc>,
    pub deactivated_utc: Option<DateTime<Utc>>,
}

impl FeeStructure {
    pub fn scope(&self) -> StructureScope {
        match self.term_id {
            Some(term_id) => StructureScope::Term(term_id),
            None => StructureScope::Year,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == StructureStatus::Active
    }

    pub fn covers_class(&self, class_id: Uuid) -> bool {
        self.class_ids.contains(&class_id)
    }

    /// Whether the structure's scope includes `term`.
    pub fn applies_to_term(&self, term: &Term) -> bool {
        match self.term_id {
            Some(term_id) => term_id == term.term_id,
            None => self.academic_year_id == term.academic_year_id,
        }
    }

    /// Sum of all line items, unrounded.
    pub fn total(&self) -> Decimal {
        self.line_items.iter().map(|item| item.amount()).sum()
    }
}

/// A structure ready to be inserted.
#[derive(Debug, Clone)]
pub struct NewFeeStructure {
    pub lineage_id: Uuid,
    pub campus_id: Uuid,
    pub academic_year_id: Uuid,
    pub term_id: Option<Uuid>,
    pub class_ids: Vec<Uuid>,
    pub structure_name: String,
    pub strategy: ResolutionStrategy,
    pub version: i32,
    pub supersedes: Vec<Uuid>,
    pub line_items: Vec<LineItem>,
}

impl NewFeeStructure {
    pub fn scope(&self) -> StructureScope {
        match self.term_id {
            Some(term_id) => StructureScope::Term(term_id),
            None => StructureScope::Year,
        }
    }

    /// Materialise with storage-assigned identity and timestamp.
    pub fn into_structure(self, structure_id: Uuid, created_utc: DateTime<Utc>) -> FeeStructure {
        FeeStructure {
            structure_id,
            lineage_id: self.lineage_id,
            campus_id: self.campus_id,
            academic_year_id: self.academic_year_id,
            term_id: self.term_id,
            class_ids: self.class_ids,
            structure_name: self.structure_name,
            status: StructureStatus::Active,
            strategy: self.strategy,
            version: self.version,
            supersedes: self.supersedes,
            line_items: self.line_items,
            created_utc,
            deactivated_utc: None,
        }
    }
}

/// Structure header row as read from `fee_structures`.
#[derive(Debug, Clone, FromRow)]
pub struct FeeStructureRow {
    pub structure_id: Uuid,
    pub lineage_id: Uuid,
    pub campus_id: Uuid,
    pub academic_year_id: Uuid,
    pub term_id: Option<Uuid>,
    pub structure_name: String,
    pub strategy: String,
    pub version: i32,
    pub created_utc: DateTime<Utc>,
    pub deactivated_utc: Option<DateTime<Utc>>,
    pub is_latest_version: bool,
}

impl FeeStructureRow {
    pub fn into_structure(
        self,
        class_ids: Vec<Uuid>,
        supersedes: Vec<Uuid>,
        line_items: Vec<LineItem>,
    ) -> FeeStructure {
        FeeStructure {
            structure_id: self.structure_id,
            lineage_id: self.lineage_id,
            campus_id: self.campus_id,
            academic_year_id: self.academic_year_id,
            term_id: self.term_id,
            class_ids,
            structure_name: self.structure_name,
            status: StructureStatus::derive(self.deactivated_utc.is_some(), self.is_latest_version),
            strategy: ResolutionStrategy::from_string(&self.strategy),
            version: self.version,
            supersedes,
            line_items,
            created_utc: self.created_utc,
            deactivated_utc: self.deactivated_utc,
        }
    }
}

/// Filter parameters for listing structures.
#[derive(Debug, Clone, Default)]
pub struct ListStructuresFilter {
    pub campus_id: Option<Uuid>,
    pub academic_year_id: Option<Uuid>,
    pub class_id: Option<Uuid>,
    pub include_inactive: bool,
}

impl ListStructuresFilter {
    pub fn matches(&self, structure: &FeeStructure) -> bool {
        self.campus_id.map_or(true, |id| structure.campus_id == id)
            && self
                .academic_year_id
                .map_or(true, |id| structure.academic_year_id == id)
            && self.class_id.map_or(true, |id| structure.covers_class(id))
            && (self.include_inactive || structure.is_active())
    }
}
