//! Structure creation requests.

use super::{LineItemInput, ResolutionStrategy, MAX_CLASSES_PER_STRUCTURE};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// How a creation request lays out its line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CreationMode {
    /// One structure for a single term.
    Termly {
        term_id: Uuid,
        items: Vec<LineItemInput>,
    },
    /// Explicit per-term buckets plus once-per-year items.
    Annual {
        #[serde(default)]
        term1_items: Vec<LineItemInput>,
        #[serde(default)]
        term2_items: Vec<LineItemInput>,
        #[serde(default)]
        term3_items: Vec<LineItemInput>,
        #[serde(default)]
        annual_items: Vec<LineItemInput>,
        #[serde(default)]
        one_off_items: Vec<LineItemInput>,
    },
    /// One template repeated for every term of the academic year.
    Yearly { items: Vec<LineItemInput> },
}

impl CreationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreationMode::Termly { .. } => "termly",
            CreationMode::Annual { .. } => "annual",
            CreationMode::Yearly { .. } => "yearly",
        }
    }

    /// Total number of supplied items across all buckets.
    pub fn item_count(&self) -> usize {
        match self {
            CreationMode::Termly { items, .. } | CreationMode::Yearly { items } => items.len(),
            CreationMode::Annual {
                term1_items,
                term2_items,
                term3_items,
                annual_items,
                one_off_items,
            } => {
                term1_items.len()
                    + term2_items.len()
                    + term3_items.len()
                    + annual_items.len()
                    + one_off_items.len()
            }
        }
    }
}

/// Request to create one or more fee structures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateFeeStructure {
    pub campus_id: Uuid,
    pub academic_year_id: Uuid,
    #[validate(custom(function = "validate_class_count"))]
    pub class_ids: Vec<Uuid>,
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub structure_name: String,
    #[serde(flatten)]
    pub mode: CreationMode,
    /// Create even when active structures already cover the same class and term.
    #[serde(default)]
    pub override_conflicts: bool,
    /// How the new structures combine with conflicting ones when overriding.
    /// Falls back to the engine's configured default.
    #[serde(default)]
    pub strategy: Option<ResolutionStrategy>,
}

/// Request to append a new version to an existing structure's lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateStructureVersion {
    pub structure_id: Uuid,
    pub structure_name: Option<String>,
    pub items: Vec<LineItemInput>,
}

fn validate_class_count(class_ids: &[Uuid]) -> Result<(), ValidationError> {
    if class_ids.is_empty() || class_ids.len() > MAX_CLASSES_PER_STRUCTURE {
        let mut err = ValidationError::new("length");
        err.message = Some(
            format!("between 1 and {} classes are required", MAX_CLASSES_PER_STRUCTURE).into(),
        );
        return Err(err);
    }
    Ok(())
}
