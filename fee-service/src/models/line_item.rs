//! Line item model.

use crate::error::FeeError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

pub const MONEY_SCALE: u32 = 2;

/// Billing recurrence of a line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemKind {
    /// Charged every term the structure applies to.
    Termly,
    /// Charged once per academic year.
    Annual,
    /// Charged once, e.g. an admission fee.
    OneOff,
}

impl LineItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineItemKind::Termly => "termly",
            LineItemKind::Annual => "annual",
            LineItemKind::OneOff => "one_off",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "annual" => LineItemKind::Annual,
            "one_off" => LineItemKind::OneOff,
            _ => LineItemKind::Termly,
        }
    }

    /// Annual and one-off items bill once per student per academic year.
    pub fn bills_once(&self) -> bool {
        !matches!(self, LineItemKind::Termly)
    }
}

/// One named charge inside a fee structure.
///
/// Constructed only through [`LineItem::new`] (or loaded from storage), so the
/// name, amount and flag invariants always hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    name: String,
    amount: Decimal,
    display_order: i32,
    is_annual: bool,
    is_one_off: bool,
}

impl LineItem {
    pub fn new(
        name: impl Into<String>,
        amount: Decimal,
        display_order: i32,
        is_annual: bool,
        is_one_off: bool,
    ) -> Result<Self, FeeError> {
        if is_annual && is_one_off {
            return Err(FeeError::validation(
                "is_one_off",
                "is_annual and is_one_off are mutually exclusive",
            ));
        }
        let name = name.into();
        let input = LineItemInput {
            name,
            amount,
            is_annual,
            is_one_off,
        };
        input.validate()?;
        Ok(Self {
            name: input.name.trim().to_string(),
            amount: input.amount,
            display_order,
            is_annual,
            is_one_off,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn display_order(&self) -> i32 {
        self.display_order
    }

    pub fn is_annual(&self) -> bool {
        self.is_annual
    }

    pub fn is_one_off(&self) -> bool {
        self.is_one_off
    }

    pub fn kind(&self) -> LineItemKind {
        match (self.is_annual, self.is_one_off) {
            (true, _) => LineItemKind::Annual,
            (_, true) => LineItemKind::OneOff,
            _ => LineItemKind::Termly,
        }
    }

    pub(crate) fn with_display_order(mut self, display_order: i32) -> Self {
        self.display_order = display_order;
        self
    }
}

/// Unvalidated line item as supplied by an admin form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LineItemInput {
    #[validate(
        length(min = 1, max = 200, message = "must be 1-200 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,
    #[validate(custom(function = "validate_money"))]
    pub amount: Decimal,
    #[serde(default)]
    pub is_annual: bool,
    #[serde(default)]
    pub is_one_off: bool,
}

impl LineItemInput {
    pub fn termly(name: impl Into<String>, amount: Decimal) -> Self {
        Self {
            name: name.into(),
            amount,
            is_annual: false,
            is_one_off: false,
        }
    }

    pub fn annual(name: impl Into<String>, amount: Decimal) -> Self {
        Self {
            is_annual: true,
            ..Self::termly(name, amount)
        }
    }

    pub fn one_off(name: impl Into<String>, amount: Decimal) -> Self {
        Self {
            is_one_off: true,
            ..Self::termly(name, amount)
        }
    }

    pub fn kind(&self) -> LineItemKind {
        match (self.is_annual, self.is_one_off) {
            (true, _) => LineItemKind::Annual,
            (_, true) => LineItemKind::OneOff,
            _ => LineItemKind::Termly,
        }
    }

    /// Validate and convert, reporting errors under `field` (e.g. `term1_items[2]`).
    pub fn into_line_item(self, field: &str, display_order: i32) -> Result<LineItem, FeeError> {
        LineItem::new(
            self.name,
            self.amount,
            display_order,
            self.is_annual,
            self.is_one_off,
        )
        .map_err(|e| match e {
            FeeError::Validation { field: inner, message } => {
                FeeError::validation(format!("{}.{}", field, inner), message)
            }
            other => other,
        })
    }
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

fn validate_money(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("negative");
        err.message = Some("must be zero or greater".into());
        return Err(err);
    }
    if value.normalize().scale() > MONEY_SCALE {
        let mut err = ValidationError::new("scale");
        err.message = Some("must have at most 2 decimal places".into());
        return Err(err);
    }
    Ok(())
}

/// Line item row as stored in `fee_line_items`.
#[derive(Debug, Clone, FromRow)]
pub struct LineItemRow {
    pub structure_id: Uuid,
    pub name: String,
    pub amount: Decimal,
    pub display_order: i32,
    pub is_annual: bool,
    pub is_one_off: bool,
}

impl From<LineItemRow> for LineItem {
    fn from(row: LineItemRow) -> Self {
        Self {
            name: row.name,
            amount: row.amount,
            display_order: row.display_order,
            is_annual: row.is_annual,
            is_one_off: row.is_one_off,
        }
    }
}
