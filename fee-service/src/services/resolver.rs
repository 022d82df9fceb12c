//! Structure resolution: which structures bill a (class, term) cell and the
//! resulting line items.

use crate::models::{FeeStructure, LineItem, ResolutionStrategy, Term};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Structures that bill `class_id` in `term`, ordered by
/// `(created_utc, version, structure_id)`.
///
/// Rules, applied in order:
/// 1. the structure must cover the class and its scope must include the term;
/// 2. for a closed term, structures created after the close that replace
///    something (later versions, overriding structures) are ignored;
/// 3. one structure per lineage: the highest remaining version;
/// 4. a lineage whose chosen version is deactivated bills nothing, so
///    switching off the latest version never hands billing back to an older one;
/// 5. lineages superseded by a remaining overriding structure are dropped.
///
/// This is the single definition of "bills this cell": conflict detection
/// uses it too.
pub fn effective_structures<'a>(
    structures: &'a [FeeStructure],
    class_id: Uuid,
    term: &Term,
) -> Vec<&'a FeeStructure> {
    let mut latest: HashMap<Uuid, &FeeStructure> = HashMap::new();
    for s in structures
        .iter()
        .filter(|s| s.covers_class(class_id) && s.applies_to_term(term))
        .filter(|s| !(is_successor(s) && term.closed_before(s.created_utc)))
    {
        latest
            .entry(s.lineage_id)
            .and_modify(|current| {
                if s.version > current.version {
                    *current = s;
                }
            })
            .or_insert(s);
    }
    latest.retain(|_, s| s.deactivated_utc.is_none());

    let superseded: HashSet<Uuid> = latest
        .values()
        .filter(|s| s.strategy == ResolutionStrategy::Override)
        .flat_map(|s| s.supersedes.iter().copied())
        .collect();

    let mut effective: Vec<&FeeStructure> = latest
        .into_values()
        .filter(|s| !superseded.contains(&s.lineage_id))
        .collect();
    effective.sort_by(|a, b| {
        (a.created_utc, a.version, a.structure_id).cmp(&(b.created_utc, b.version, b.structure_id))
    });
    effective
}

/// Whether a structure replaces billing that existed before it.
fn is_successor(structure: &FeeStructure) -> bool {
    structure.version > 1 || !structure.supersedes.is_empty()
}

/// The de-duplicated, display-ordered line items billable to `class_id` in
/// `term`. An empty result is valid: nothing is configured for the cell.
///
/// With a single applicable structure its items are returned as stored. When
/// several merge, items keep structure order then display order, same-named
/// items are all kept, and display order is renumbered from 1.
pub fn resolve_line_items(structures: &[FeeStructure], class_id: Uuid, term: &Term) -> Vec<LineItem> {
    let effective = effective_structures(structures, class_id, term);

    match effective.as_slice() {
        [] => Vec::new(),
        [single] => sorted_items(single),
        many => many
            .iter()
            .flat_map(|s| sorted_items(s))
            .enumerate()
            .map(|(i, item)| item.with_display_order(i as i32 + 1))
            .collect(),
    }
}

fn sorted_items(structure: &FeeStructure) -> Vec<LineItem> {
    let mut items = structure.line_items.clone();
    items.sort_by_key(|item| item.display_order());
    items
}
