//! Fee summary arithmetic.

use crate::models::{AnnualAttribution, AnnualChargeKey, FeeAdjustment, FeeSummary, LineItem};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Who and what a summary is computed for.
#[derive(Debug, Clone)]
pub struct SummaryContext {
    pub student_id: Uuid,
    pub term_id: Uuid,
    pub class_id: Uuid,
    pub academic_year_id: Uuid,
    pub currency: String,
    pub annual_charges: Vec<AnnualAttribution>,
}

/// Distinct once-per-year charges among the resolved items, in key order.
pub fn annual_charge_keys(items: &[LineItem]) -> Vec<AnnualChargeKey> {
    items
        .iter()
        .filter_map(AnnualChargeKey::of)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Keep termly items, and once-per-year items whose charge is attributed to
/// `term_id`. A charge without an attribution is not billed.
pub fn billable_items(
    resolved: Vec<LineItem>,
    term_id: Uuid,
    attributions: &[AnnualAttribution],
) -> Vec<LineItem> {
    let billed_here: BTreeSet<AnnualChargeKey> = attributions
        .iter()
        .filter(|a| a.term_id == term_id)
        .map(AnnualAttribution::key)
        .collect();
    resolved
        .into_iter()
        .filter(|item| AnnualChargeKey::of(item).map_or(true, |key| billed_here.contains(&key)))
        .collect()
}

/// Compute the unrounded summary from the items billed this term.
pub fn compute_summary(
    ctx: SummaryContext,
    line_items: Vec<LineItem>,
    adjustment: Option<FeeAdjustment>,
    amount_paid: Decimal,
) -> FeeSummary {
    let base_expected_fee: Decimal = line_items.iter().map(|item| item.amount()).sum();
    let adjusted_expected_fee = adjustment
        .as_ref()
        .map_or(base_expected_fee, |adj| adj.apply(base_expected_fee));
    let pending_amount_signed = adjusted_expected_fee - amount_paid;

    FeeSummary {
        student_id: ctx.student_id,
        term_id: ctx.term_id,
        class_id: ctx.class_id,
        academic_year_id: ctx.academic_year_id,
        currency: ctx.currency,
        line_items,
        base_expected_fee,
        adjustment,
        adjusted_expected_fee,
        amount_paid,
        pending_amount_signed,
        pending_amount: pending_amount_signed.max(Decimal::ZERO),
        annual_charges: ctx.annual_charges,
    }
}
