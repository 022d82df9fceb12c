//! Persistence port for fee structures, adjustments and annual attribution.

use crate::error::FeeError;
use crate::models::{
    AnnualAttribution, AnnualChargeKey, ConflictReport, CreateAdjustment, FeeAdjustment, FeeStructure,
    ListStructuresFilter, NewFeeStructure, ResolutionStrategy, Term, UpdateAdjustment,
};
use crate::services::conflict::detect_conflicts;
use crate::services::planner::proposal_for;
use async_trait::async_trait;
use uuid::Uuid;

/// Structures from one creation request, written all together or not at all.
#[derive(Debug, Clone)]
pub struct StructureBatch {
    pub structures: Vec<NewFeeStructure>,
    pub override_conflicts: bool,
    /// Terms of the batch's academic year, for conflict detection.
    pub year_terms: Vec<Term>,
}

/// Storage backing the fee engine.
///
/// Writes are atomic. `create_structures` runs conflict detection against
/// what is stored at commit time, so two concurrent batches over the same
/// (class, term) cannot both succeed without `override_conflicts`.
#[async_trait]
pub trait FeeStore: Send + Sync {
    /// Insert a creation batch. Returns the stored structures and the
    /// conflicts that were overridden (empty when there were none).
    async fn create_structures(
        &self,
        batch: StructureBatch,
    ) -> Result<(Vec<FeeStructure>, ConflictReport), FeeError>;

    /// Append the next version to an existing lineage. Fails with
    /// [`FeeError::Transaction`] if another version was appended first.
    async fn append_version(&self, structure: NewFeeStructure) -> Result<FeeStructure, FeeError>;

    async fn get_structure(&self, structure_id: Uuid) -> Result<FeeStructure, FeeError>;

    async fn list_structures(
        &self,
        filter: &ListStructuresFilter,
    ) -> Result<Vec<FeeStructure>, FeeError>;

    /// Every version of a lineage, oldest first.
    async fn structure_history(&self, lineage_id: Uuid) -> Result<Vec<FeeStructure>, FeeError>;

    async fn deactivate_structure(&self, structure_id: Uuid) -> Result<FeeStructure, FeeError>;

    async fn create_adjustment(&self, input: CreateAdjustment) -> Result<FeeAdjustment, FeeError>;

    async fn update_adjustment(
        &self,
        adjustment_id: Uuid,
        input: UpdateAdjustment,
    ) -> Result<FeeAdjustment, FeeError>;

    async fn get_adjustment(
        &self,
        student_id: Uuid,
        term_id: Uuid,
    ) -> Result<Option<FeeAdjustment>, FeeError>;

    /// Attribute each of `charges` to `term_id` unless the student already
    /// has it attributed for the year, and return the attribution that holds
    /// for every requested charge. `charges` must be distinct. The first claim of
    /// a charge wins.
    async fn claim_annual_charges(
        &self,
        student_id: Uuid,
        academic_year_id: Uuid,
        term_id: Uuid,
        charges: &[AnnualChargeKey],
    ) -> Result<Vec<AnnualAttribution>, FeeError>;
}

/// Check a batch against the stored structures of its campus and year.
///
/// Without `override_conflicts` any conflict rejects the whole batch. With
/// it, overriding structures record the lineages they collide with so those
/// stop billing the overlapping cells.
pub(crate) fn apply_conflict_policy(
    batch: StructureBatch,
    existing: &[FeeStructure],
) -> Result<(Vec<NewFeeStructure>, ConflictReport), FeeError> {
    let mut report = ConflictReport::default();
    let mut structures = Vec::with_capacity(batch.structures.len());

    for mut structure in batch.structures {
        let found = detect_conflicts(&proposal_for(&structure), existing, &batch.year_terms);
        if structure.strategy == ResolutionStrategy::Override {
            structure.supersedes = found.lineage_ids();
        }
        report.extend(found);
        structures.push(structure);
    }

    if !report.is_empty() && !batch.override_conflicts {
        return Err(FeeError::Conflict(report));
    }
    Ok((structures, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::resolver::tests::{item, structure, term};

    fn planned(year: Uuid, term_id: Uuid, class_id: Uuid, strategy: ResolutionStrategy) -> NewFeeStructure {
        NewFeeStructure {
            lineage_id: Uuid::new_v4(),
            campus_id: Uuid::nil(),
            academic_year_id: year,
            term_id: Some(term_id),
            class_ids: vec![class_id],
            structure_name: "New".to_string(),
            strategy,
            version: 1,
            supersedes: vec![],
            line_items: vec![item("Tuition", "1000", 1)],
        }
    }

    #[test]
    fn conflict_rejected_without_override() {
        let year = Uuid::new_v4();
        let class = Uuid::new_v4();
        let t1 = term(year, 1);
        let existing = structure(year, Some(t1.term_id), vec![class], "Old", vec![item("Tuition", "1", 1)], 0);
        let batch = StructureBatch {
            structures: vec![planned(year, t1.term_id, class, ResolutionStrategy::Merge)],
            override_conflicts: false,
            year_terms: vec![t1],
        };

        match apply_conflict_policy(batch, &[existing]) {
            Err(FeeError::Conflict(report)) => assert_eq!(report.class_ids(), vec![class]),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn override_records_superseded_lineages() {
        let year = Uuid::new_v4();
        let class = Uuid::new_v4();
        let t1 = term(year, 1);
        let existing = structure(year, Some(t1.term_id), vec![class], "Old", vec![item("Tuition", "1", 1)], 0);
        let lineage = existing.lineage_id;
        let batch = StructureBatch {
            structures: vec![
                planned(year, t1.term_id, class, ResolutionStrategy::Override),
                planned(year, t1.term_id, Uuid::new_v4(), ResolutionStrategy::Override),
            ],
            override_conflicts: true,
            year_terms: vec![t1],
        };

        let (structures, report) = apply_conflict_policy(batch, &[existing]).unwrap();
        assert_eq!(structures[0].supersedes, vec![lineage]);
        assert!(structures[1].supersedes.is_empty());
        assert_eq!(report.lineage_ids(), vec![lineage]);
    }

    #[test]
    fn merge_override_supersedes_nothing() {
        let year = Uuid::new_v4();
        let class = Uuid::new_v4();
        let t1 = term(year, 1);
        let existing = structure(year, Some(t1.term_id), vec![class], "Old", vec![item("Tuition", "1", 1)], 0);
        let batch = StructureBatch {
            structures: vec![planned(year, t1.term_id, class, ResolutionStrategy::Merge)],
            override_conflicts: true,
            year_terms: vec![t1],
        };

        let (structures, report) = apply_conflict_policy(batch, &[existing]).unwrap();
        assert!(structures[0].supersedes.is_empty());
        assert!(!report.is_empty());
    }
}
