//! Conflict detection against the structures that currently bill.

use crate::models::{
    ClassConflict, ConflictProposal, ConflictReport, ConflictingStructure, FeeStructure, Term,
};
use crate::services::resolver::effective_structures;

/// Terms a proposal would bill: its own term, or every term of the year.
pub fn touched_terms<'a>(proposal: &ConflictProposal, year_terms: &'a [Term]) -> Vec<&'a Term> {
    year_terms
        .iter()
        .filter(|t| t.academic_year_id == proposal.academic_year_id)
        .filter(|t| proposal.term_id.map_or(true, |id| t.term_id == id))
        .collect()
}

/// Find the structures already billing any (class, term) cell the proposal
/// would cover.
///
/// Only structures of the proposal's campus and academic year are
/// considered. Whether one bills a cell is decided by
/// [`effective_structures`], so an older version that still bills a closed
/// term is reported even though its status is inactive. Terms are scanned in
/// ordinal order.
pub fn detect_conflicts(
    proposal: &ConflictProposal,
    existing: &[FeeStructure],
    year_terms: &[Term],
) -> ConflictReport {
    let candidates: Vec<FeeStructure> = existing
        .iter()
        .filter(|s| {
            s.campus_id == proposal.campus_id && s.academic_year_id == proposal.academic_year_id
        })
        .cloned()
        .collect();

    let mut terms = touched_terms(proposal, year_terms);
    terms.sort_by_key(|t| t.ordinal);

    let mut report = ConflictReport::default();
    for &class_id in &proposal.class_ids {
        let mut structures: Vec<ConflictingStructure> = Vec::new();
        for term in &terms {
            for s in effective_structures(&candidates, class_id, term) {
                structures.push(ConflictingStructure {
                    structure_id: s.structure_id,
                    lineage_id: s.lineage_id,
                    structure_name: s.structure_name.clone(),
                    term_id: term.term_id,
                });
            }
        }
        if !structures.is_empty() {
            report.conflicts.push(ClassConflict {
                class_id,
                structures,
            });
        }
    }
    report
}
