//! Fee adjustment model.

use crate::error::FeeError;
use crate::models::MONEY_SCALE;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Decimal places a percentage may carry.
pub const PERCENTAGE_SCALE: u32 = 4;

/// Fixed amounts must stay below this (ten integer digits).
const FIXED_AMOUNT_LIMIT: i64 = 10_000_000_000;

/// Adjustment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    FixedAmount,
    Percentage,
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::FixedAmount => "fixed_amount",
            AdjustmentType::Percentage => "percentage",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "percentage" => AdjustmentType::Percentage,
            _ => AdjustmentType::FixedAmount,
        }
    }

    /// Apply the discount to `base`, never going below zero.
    pub fn apply(&self, value: Decimal, base: Decimal) -> Decimal {
        let discount = match self {
            AdjustmentType::FixedAmount => value,
            AdjustmentType::Percentage => base * value / Decimal::ONE_HUNDRED,
        };
        (base - discount).max(Decimal::ZERO)
    }
}

/// Discretionary per-student, per-term discount.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeAdjustment {
    pub adjustment_id: Uuid,
    pub student_id: Uuid,
    pub term_id: Uuid,
    pub adjustment_type: AdjustmentType,
    pub adjustment_value: Decimal,
    pub reason: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl FeeAdjustment {
    pub fn apply(&self, base: Decimal) -> Decimal {
        self.adjustment_type.apply(self.adjustment_value, base)
    }
}

/// Adjustment row as stored in `fee_adjustments`.
#[derive(Debug, Clone, FromRow)]
pub struct FeeAdjustmentRow {
    pub adjustment_id: Uuid,
    pub student_id: Uuid,
    pub term_id: Uuid,
    pub adjustment_type: String,
    pub adjustment_value: Decimal,
    pub reason: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl From<FeeAdjustmentRow> for FeeAdjustment {
    fn from(row: FeeAdjustmentRow) -> Self {
        Self {
            adjustment_id: row.adjustment_id,
            student_id: row.student_id,
            term_id: row.term_id,
            adjustment_type: AdjustmentType::from_string(&row.adjustment_type),
            adjustment_value: row.adjustment_value,
            reason: row.reason,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        }
    }
}

/// Input for recording an adjustment.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAdjustment {
    pub student_id: Uuid,
    pub term_id: Uuid,
    pub adjustment_type: AdjustmentType,
    #[validate(custom(function = "validate_non_negative"))]
    pub adjustment_value: Decimal,
    #[validate(
        length(min = 1, max = 500, message = "must be 1-500 characters"),
        custom(function = "validate_reason")
    )]
    pub reason: String,
}

impl CreateAdjustment {
    /// Field rules plus the per-type range and precision of the value.
    pub fn validate_input(&self) -> Result<(), FeeError> {
        self.validate()?;
        check_value(self.adjustment_type, self.adjustment_value)
    }
}

/// Replacement terms for an existing adjustment. The student and term it
/// targets never change.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateAdjustment {
    pub adjustment_type: AdjustmentType,
    #[validate(custom(function = "validate_non_negative"))]
    pub adjustment_value: Decimal,
    #[validate(
        length(min = 1, max = 500, message = "must be 1-500 characters"),
        custom(function = "validate_reason")
    )]
    pub reason: String,
}

impl UpdateAdjustment {
    pub fn validate_input(&self) -> Result<(), FeeError> {
        self.validate()?;
        check_value(self.adjustment_type, self.adjustment_value)
    }
}

/// Percentages lie in 0..=100 with up to four places. Fixed amounts are
/// money: two places, ten integer digits.
fn check_value(adjustment_type: AdjustmentType, value: Decimal) -> Result<(), FeeError> {
    let scale = value.normalize().scale();
    match adjustment_type {
        AdjustmentType::Percentage => {
            if value > Decimal::ONE_HUNDRED {
                return Err(FeeError::validation(
                    "adjustment_value",
                    "percentage must be between 0 and 100",
                ));
            }
            if scale > PERCENTAGE_SCALE {
                return Err(FeeError::validation(
                    "adjustment_value",
                    format!("percentage must have at most {} decimal places", PERCENTAGE_SCALE),
                ));
            }
        }
        AdjustmentType::FixedAmount => {
            if scale > MONEY_SCALE {
                return Err(FeeError::validation(
                    "adjustment_value",
                    format!("amount must have at most {} decimal places", MONEY_SCALE),
                ));
            }
            if value >= Decimal::from(FIXED_AMOUNT_LIMIT) {
                return Err(FeeError::validation("adjustment_value", "amount is too large"));
            }
        }
    }
    Ok(())
}

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("negative");
        err.message = Some("must be zero or greater".into());
        return Err(err);
    }
    Ok(())
}

fn validate_reason(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some("a reason is required for every adjustment".into());
        return Err(err);
    }
    Ok(())
}
