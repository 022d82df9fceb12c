//! Fee summary (derived, never persisted) and annual charge attribution.

use super::{FeeAdjustment, LineItem, LineItemKind};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// What a student owes for one term.
///
/// Amounts are exact; call [`FeeSummary::rounded`] at the display boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeSummary {
    pub student_id: Uuid,
    pub term_id: Uuid,
    pub class_id: Uuid,
    pub academic_year_id: Uuid,
    pub currency: String,
    /// Items actually billed this term (once-per-year items already billed
    /// in another term are left out).
    pub line_items: Vec<LineItem>,
    pub base_expected_fee: Decimal,
    pub adjustment: Option<FeeAdjustment>,
    pub adjusted_expected_fee: Decimal,
    pub amount_paid: Decimal,
    /// `adjusted_expected_fee - amount_paid`; negative when overpaid.
    pub pending_amount_signed: Decimal,
    /// Signed pending amount floored at zero.
    pub pending_amount: Decimal,
    /// Where each once-per-year charge resolved for this term is billed,
    /// whether in this term or an earlier one.
    pub annual_charges: Vec<AnnualAttribution>,
}

impl FeeSummary {
    /// Copy with every amount rounded to two places.
    pub fn rounded(&self) -> Self {
        Self {
            base_expected_fee: round_money(self.base_expected_fee),
            adjusted_expected_fee: round_money(self.adjusted_expected_fee),
            amount_paid: round_money(self.amount_paid),
            pending_amount_signed: round_money(self.pending_amount_signed),
            pending_amount: round_money(self.pending_amount),
            ..self.clone()
        }
    }

    /// Whether any once-per-year charge is billed in this summary's term.
    pub fn bills_annual_charges(&self) -> bool {
        self.annual_charges.iter().any(|a| a.term_id == self.term_id)
    }
}

/// Round a money amount for display: two places, midpoint away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A once-per-year charge as seen across a student's academic year.
///
/// Charges with the same name and kind are the same charge, whichever
/// structure or term they resolve from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AnnualChargeKey {
    pub item_kind: LineItemKind,
    pub item_name: String,
}

impl AnnualChargeKey {
    /// The key of a billed-once item; `None` for termly items.
    pub fn of(item: &LineItem) -> Option<Self> {
        item.kind().bills_once().then(|| Self {
            item_kind: item.kind(),
            item_name: item.name().to_string(),
        })
    }
}

/// Records the term in which one of a student's once-per-year charges is
/// billed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnualAttribution {
    pub student_id: Uuid,
    pub academic_year_id: Uuid,
    pub item_kind: LineItemKind,
    pub item_name: String,
    pub term_id: Uuid,
    pub created_utc: DateTime<Utc>,
}

impl AnnualAttribution {
    pub fn key(&self) -> AnnualChargeKey {
        AnnualChargeKey {
            item_kind: self.item_kind,
            item_name: self.item_name.clone(),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct AnnualAttributionRow {
    pub student_id: Uuid,
    pub academic_year_id: Uuid,
    pub item_kind: String,
    pub item_name: String,
    pub term_id: Uuid,
    pub created_utc: DateTime<Utc>,
}

impl From<AnnualAttributionRow> for AnnualAttribution {
    fn from(row: AnnualAttributionRow) -> Self {
        Self {
            student_id: row.student_id,
            academic_year_id: row.academic_year_id,
            item_kind: LineItemKind::from_string(&row.item_kind),
            item_name: row.item_name,
            term_id: row.term_id,
            created_utc: row.created_utc,
        }
    }
}
