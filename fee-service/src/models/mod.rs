//! Domain models for fee-service.

mod adjustment;
mod conflict;
mod line_item;
mod request;
mod structure;
mod summary;
mod term;

pub use adjustment::{
    AdjustmentType, CreateAdjustment, FeeAdjustment, FeeAdjustmentRow, UpdateAdjustment,
};
pub use conflict::{ClassConflict, ConflictProposal, ConflictReport, ConflictingStructure};
pub use line_item::{LineItem, LineItemInput, LineItemKind, LineItemRow, MONEY_SCALE};
pub use request::{CreateFeeStructure, CreateStructureVersion, CreationMode};
pub use structure::{
    FeeStructure, FeeStructureRow, ListStructuresFilter, NewFeeStructure, ResolutionStrategy,
    StructureScope, StructureStatus, MAX_CLASSES_PER_STRUCTURE,
};
pub use summary::{
    round_money, AnnualAttribution, AnnualAttributionRow, AnnualChargeKey, FeeSummary,
};
pub use term::Term;
