//! Turns a creation request into the structures it implies.
//!
//! Planning is pure: it validates the request against the academic year's
//! terms and produces unsaved [`NewFeeStructure`]s. Persisting them (with
//! conflict detection) is the store's job.

use crate::error::FeeError;
use crate::models::{
    ConflictProposal, CreateFeeStructure, CreationMode, LineItem, LineItemInput, LineItemKind,
    NewFeeStructure, ResolutionStrategy, Term,
};
use std::collections::HashSet;
use uuid::Uuid;
use validator::Validate;

/// Validate `request` and lay out the structures it creates.
///
/// `year_terms` are the terms of the request's academic year; they decide
/// which term each annual bucket maps to and which terms a yearly template
/// is replicated into.
pub fn plan_structures(
    request: &CreateFeeStructure,
    strategy: ResolutionStrategy,
    year_terms: &[Term],
) -> Result<Vec<NewFeeStructure>, FeeError> {
    validate_request(request)?;

    let mut terms: Vec<&Term> = year_terms
        .iter()
        .filter(|t| t.academic_year_id == request.academic_year_id)
        .collect();
    terms.sort_by_key(|t| t.ordinal);

    let name = request.structure_name.trim();
    let new_structure = |term_id: Option<Uuid>, structure_name: String, line_items: Vec<LineItem>| {
        NewFeeStructure {
            lineage_id: Uuid::new_v4(),
            campus_id: request.campus_id,
            academic_year_id: request.academic_year_id,
            term_id,
            class_ids: request.class_ids.clone(),
            structure_name,
            strategy,
            version: 1,
            supersedes: Vec::new(),
            line_items,
        }
    };

    match &request.mode {
        CreationMode::Termly { term_id, items } => {
            if !terms.iter().any(|t| t.term_id == *term_id) {
                return Err(FeeError::validation(
                    "term_id",
                    "term does not belong to the academic year",
                ));
            }
            let line_items = convert_items(items, "items", 1)?;
            Ok(vec![new_structure(Some(*term_id), name.to_string(), line_items)])
        }
        CreationMode::Annual {
            term1_items,
            term2_items,
            term3_items,
            annual_items,
            one_off_items,
        } => {
            let buckets = [
                (1, "term1_items", term1_items),
                (2, "term2_items", term2_items),
                (3, "term3_items", term3_items),
            ];

            let mut planned = Vec::new();
            for (ordinal, field, items) in buckets {
                if items.is_empty() {
                    continue;
                }
                let term = terms.iter().find(|t| t.ordinal == ordinal).ok_or_else(|| {
                    FeeError::validation(field, format!("academic year has no term {}", ordinal))
                })?;
                require_kind(items, field, LineItemKind::Termly)?;
                let line_items = convert_items(items, field, 1)?;
                planned.push(new_structure(
                    Some(term.term_id),
                    format!("{} - {}", name, term.name),
                    line_items,
                ));
            }

            require_kind(annual_items, "annual_items", LineItemKind::Annual)?;
            require_kind(one_off_items, "one_off_items", LineItemKind::OneOff)?;
            let once_inputs: Vec<(String, LineItemInput)> = annual_items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let mut item = item.clone();
                    item.is_annual = true;
                    (format!("annual_items[{}]", i), item)
                })
                .chain(one_off_items.iter().enumerate().map(|(i, item)| {
                    let mut item = item.clone();
                    item.is_one_off = true;
                    (format!("one_off_items[{}]", i), item)
                }))
                .collect();

            if once_inputs.is_empty() {
                return Ok(planned);
            }

            // Once-per-year items go into the first structure only, or into a
            // year-wide structure when no term bucket was supplied.
            match planned.first_mut() {
                Some(first) => {
                    let start = first.line_items.len() as i32 + 1;
                    for (offset, (field, input)) in once_inputs.into_iter().enumerate() {
                        let item = input.into_line_item(&field, start + offset as i32)?;
                        first.line_items.push(item);
                    }
                }
                None => {
                    let mut line_items = Vec::with_capacity(once_inputs.len());
                    for (offset, (field, input)) in once_inputs.into_iter().enumerate() {
                        line_items.push(input.into_line_item(&field, offset as i32 + 1)?);
                    }
                    planned.push(new_structure(None, name.to_string(), line_items));
                }
            }
            Ok(planned)
        }
        CreationMode::Yearly { items } => {
            if terms.is_empty() {
                return Err(FeeError::validation(
                    "academic_year_id",
                    "academic year has no terms",
                ));
            }
            let line_items = convert_items(items, "items", 1)?;
            Ok(terms
                .iter()
                .map(|term| {
                    new_structure(
                        Some(term.term_id),
                        format!("{} - {}", name, term.name),
                        line_items.clone(),
                    )
                })
                .collect())
        }
    }
}

/// Conflict-detection scope of a planned structure.
pub fn proposal_for(structure: &NewFeeStructure) -> ConflictProposal {
    ConflictProposal {
        campus_id: structure.campus_id,
        academic_year_id: structure.academic_year_id,
        class_ids: structure.class_ids.clone(),
        term_id: structure.term_id,
    }
}

fn validate_request(request: &CreateFeeStructure) -> Result<(), FeeError> {
    request.validate()?;

    if request.structure_name.trim().is_empty() {
        return Err(FeeError::validation("structure_name", "must not be blank"));
    }

    let mut seen = HashSet::new();
    if !request.class_ids.iter().all(|id| seen.insert(*id)) {
        return Err(FeeError::validation("class_ids", "class ids must be distinct"));
    }

    if request.mode.item_count() == 0 {
        return Err(FeeError::validation(
            "items",
            "at least one line item is required",
        ));
    }
    Ok(())
}

/// Reject items whose flags contradict the bucket they were supplied in.
fn require_kind(items: &[LineItemInput], field: &str, kind: LineItemKind) -> Result<(), FeeError> {
    for (i, item) in items.iter().enumerate() {
        let clashes = match kind {
            LineItemKind::Termly => item.kind() != LineItemKind::Termly,
            LineItemKind::Annual => item.is_one_off,
            LineItemKind::OneOff => item.is_annual,
        };
        if clashes {
            return Err(FeeError::validation(
                format!("{}[{}]", field, i),
                format!("items in {} must be {}", field, kind.as_str()),
            ));
        }
    }
    Ok(())
}

fn convert_items(
    items: &[LineItemInput],
    field: &str,
    first_order: i32,
) -> Result<Vec<LineItem>, FeeError> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.clone()
                .into_line_item(&format!("{}[{}]", field, i), first_order + i as i32)
        })
        .collect()
}
