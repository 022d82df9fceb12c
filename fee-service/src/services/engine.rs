//! The fee engine: every operation the fee subsystem exposes.
//!
//! The engine holds no state of its own. It reads reference data from the
//! [`SchoolDirectory`], payments from the [`PaymentsLedger`], and keeps
//! structures and adjustments in a [`FeeStore`].

use crate::error::FeeError;
use crate::models::{
    ConflictProposal, ConflictReport, CreateAdjustment, CreateFeeStructure,
    CreateStructureVersion, FeeAdjustment, FeeStructure, FeeSummary, LineItem,
    ListStructuresFilter, NewFeeStructure, ResolutionStrategy, UpdateAdjustment,
};
use crate::services::calculator::{self, SummaryContext};
use crate::services::directory::{PaymentsLedger, SchoolDirectory};
use crate::services::metrics::{
    record_adjustment, record_conflict, record_error, record_structures_created, record_summary,
};
use crate::services::store::{FeeStore, StructureBatch};
use crate::services::{conflict, planner, resolver};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Base currency code reported on summaries.
    pub currency: String,
    /// Strategy for creation requests that do not name one.
    pub default_strategy: ResolutionStrategy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            currency: "KES".to_string(),
            default_strategy: ResolutionStrategy::Merge,
        }
    }
}

/// Result of a successful creation request.
#[derive(Debug, Clone, Serialize)]
pub struct StructureCreation {
    pub structures: Vec<FeeStructure>,
    /// Conflicts that `override_conflicts` allowed through. Empty otherwise.
    pub overridden: ConflictReport,
}

#[derive(Clone)]
pub struct FeeEngine {
    store: Arc<dyn FeeStore>,
    directory: Arc<dyn SchoolDirectory>,
    ledger: Arc<dyn PaymentsLedger>,
    settings: EngineSettings,
}

impl FeeEngine {
    pub fn new(
        store: Arc<dyn FeeStore>,
        directory: Arc<dyn SchoolDirectory>,
        ledger: Arc<dyn PaymentsLedger>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            directory,
            ledger,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Create the structures a request implies, atomically.
    ///
    /// Fails with [`FeeError::Conflict`] when existing structures already bill
    /// any (class, term) the request covers, unless `override_conflicts` is
    /// set.
    #[instrument(skip(self, request), fields(mode = request.mode.as_str(), academic_year_id = %request.academic_year_id))]
    pub async fn create_fee_structure(
        &self,
        request: CreateFeeStructure,
    ) -> Result<StructureCreation, FeeError> {
        let result = self.create_fee_structure_inner(&request).await;
        match &result {
            Ok(creation) => {
                record_structures_created(request.mode.as_str(), creation.structures.len());
                record_conflict(if creation.overridden.is_empty() {
                    "clean"
                } else {
                    "overridden"
                });
            }
            Err(FeeError::Conflict(_)) => record_conflict("rejected"),
            Err(e) => record_error("create_fee_structure", e.kind()),
        }
        result
    }

    async fn create_fee_structure_inner(
        &self,
        request: &CreateFeeStructure,
    ) -> Result<StructureCreation, FeeError> {
        let year_terms = self
            .directory
            .terms_for_year(request.academic_year_id)
            .await?;
        let strategy = request.strategy.unwrap_or(self.settings.default_strategy);
        let planned = planner::plan_structures(request, strategy, &year_terms)?;
        self.require_classes(&request.class_ids).await?;

        let (structures, overridden) = self
            .store
            .create_structures(StructureBatch {
                structures: planned,
                override_conflicts: request.override_conflicts,
                year_terms,
            })
            .await?;

        if !overridden.is_empty() {
            tracing::warn!(
                classes = ?overridden.class_ids(),
                strategy = strategy.as_str(),
                "Fee structures created over existing ones"
            );
        }
        Ok(StructureCreation {
            structures,
            overridden,
        })
    }

    async fn require_classes(&self, class_ids: &[Uuid]) -> Result<(), FeeError> {
        for (i, class_id) in class_ids.iter().enumerate() {
            if !self.directory.class_exists(*class_id).await? {
                return Err(FeeError::validation(
                    format!("class_ids[{}]", i),
                    format!("unknown class {}", class_id),
                ));
            }
        }
        Ok(())
    }

    /// Report which structures already bill the cells `proposal` covers.
    #[instrument(skip(self, proposal), fields(academic_year_id = %proposal.academic_year_id))]
    pub async fn detect_conflicts(
        &self,
        proposal: &ConflictProposal,
    ) -> Result<ConflictReport, FeeError> {
        let year_terms = self
            .directory
            .terms_for_year(proposal.academic_year_id)
            .await?;
        let existing = self
            .store
            .list_structures(&ListStructuresFilter {
                campus_id: Some(proposal.campus_id),
                academic_year_id: Some(proposal.academic_year_id),
                class_id: None,
                include_inactive: true,
            })
            .await?;
        Ok(conflict::detect_conflicts(proposal, &existing, &year_terms))
    }

    /// Line items billable to `class_id` in `term_id`, before any
    /// once-per-year attribution.
    #[instrument(skip(self))]
    pub async fn resolve_line_items(
        &self,
        class_id: Uuid,
        term_id: Uuid,
    ) -> Result<Vec<LineItem>, FeeError> {
        let term = self.directory.term(term_id).await?;
        let structures = self
            .store
            .list_structures(&ListStructuresFilter {
                campus_id: None,
                academic_year_id: Some(term.academic_year_id),
                class_id: Some(class_id),
                include_inactive: true,
            })
            .await?;
        Ok(resolver::resolve_line_items(&structures, class_id, &term))
    }

    /// Record the single adjustment for a student's term.
    #[instrument(skip(self, input), fields(student_id = %input.student_id, term_id = %input.term_id))]
    pub async fn create_adjustment(
        &self,
        input: CreateAdjustment,
    ) -> Result<FeeAdjustment, FeeError> {
        input.validate_input()?;
        self.directory.term(input.term_id).await?;

        let adjustment_type = input.adjustment_type;
        let result = self.store.create_adjustment(input).await;
        match &result {
            Ok(_) => record_adjustment(adjustment_type.as_str(), "create"),
            Err(e) => record_error("create_adjustment", e.kind()),
        }
        result
    }

    /// Replace the type, value and reason of an existing adjustment.
    #[instrument(skip(self, input))]
    pub async fn update_adjustment(
        &self,
        adjustment_id: Uuid,
        input: UpdateAdjustment,
    ) -> Result<FeeAdjustment, FeeError> {
        input.validate_input()?;

        let adjustment_type = input.adjustment_type;
        let result = self.store.update_adjustment(adjustment_id, input).await;
        match &result {
            Ok(_) => record_adjustment(adjustment_type.as_str(), "update"),
            Err(e) => record_error("update_adjustment", e.kind()),
        }
        result
    }

    pub async fn get_adjustment(
        &self,
        student_id: Uuid,
        term_id: Uuid,
    ) -> Result<Option<FeeAdjustment>, FeeError> {
        self.store.get_adjustment(student_id, term_id).await
    }

    /// What the student owes for the term, unrounded.
    ///
    /// Each once-per-year charge is attributed to the first term whose
    /// summary contains it; other terms of the same year leave it out.
    #[instrument(skip(self))]
    pub async fn compute_fee_summary(
        &self,
        student_id: Uuid,
        term_id: Uuid,
    ) -> Result<FeeSummary, FeeError> {
        let result = self.compute_fee_summary_inner(student_id, term_id).await;
        match &result {
            Ok(summary) => record_summary(summary.bills_annual_charges()),
            Err(e) => record_error("compute_fee_summary", e.kind()),
        }
        result
    }

    async fn compute_fee_summary_inner(
        &self,
        student_id: Uuid,
        term_id: Uuid,
    ) -> Result<FeeSummary, FeeError> {
        let term = self.directory.term(term_id).await?;
        let class_id = self.directory.class_for_student(student_id, term_id).await?;
        let resolved = self.resolve_line_items(class_id, term_id).await?;

        let annual_charges = self
            .store
            .claim_annual_charges(
                student_id,
                term.academic_year_id,
                term_id,
                &calculator::annual_charge_keys(&resolved),
            )
            .await?;

        let line_items = calculator::billable_items(resolved, term_id, &annual_charges);
        let adjustment = self.store.get_adjustment(student_id, term_id).await?;
        let amount_paid = self.ledger.amount_paid(student_id, term_id).await?;

        Ok(calculator::compute_summary(
            SummaryContext {
                student_id,
                term_id,
                class_id,
                academic_year_id: term.academic_year_id,
                currency: self.settings.currency.clone(),
                annual_charges,
            },
            line_items,
            adjustment,
            amount_paid,
        ))
    }

    /// Append a new version to the lineage of an active structure.
    ///
    /// The new version keeps the scope, classes, strategy and supersessions
    /// of the one it replaces; only the name and line items change.
    #[instrument(skip(self, request), fields(structure_id = %request.structure_id))]
    pub async fn create_structure_version(
        &self,
        request: CreateStructureVersion,
    ) -> Result<FeeStructure, FeeError> {
        let current = self.store.get_structure(request.structure_id).await?;
        if !current.is_active() {
            return Err(FeeError::validation(
                "structure_id",
                "only the active version of a structure can be revised",
            ));
        }

        let structure_name = match &request.structure_name {
            Some(name) => name.trim().to_string(),
            None => current.structure_name.clone(),
        };
        if structure_name.is_empty() || structure_name.chars().count() > 200 {
            return Err(FeeError::validation(
                "structure_name",
                "must be 1-200 characters",
            ));
        }
        if request.items.is_empty() {
            return Err(FeeError::validation(
                "items",
                "at least one line item is required",
            ));
        }

        let mut line_items = Vec::with_capacity(request.items.len());
        for (i, input) in request.items.into_iter().enumerate() {
            line_items.push(input.into_line_item(&format!("items[{}]", i), i as i32 + 1)?);
        }

        let result = self
            .store
            .append_version(NewFeeStructure {
                lineage_id: current.lineage_id,
                campus_id: current.campus_id,
                academic_year_id: current.academic_year_id,
                term_id: current.term_id,
                class_ids: current.class_ids,
                structure_name,
                strategy: current.strategy,
                version: current.version + 1,
                supersedes: current.supersedes,
                line_items,
            })
            .await;
        if let Err(e) = &result {
            record_error("create_structure_version", e.kind());
        }
        result
    }

    /// Every version of a lineage, oldest first.
    pub async fn structure_history(&self, lineage_id: Uuid) -> Result<Vec<FeeStructure>, FeeError> {
        let versions = self.store.structure_history(lineage_id).await?;
        if versions.is_empty() {
            return Err(FeeError::not_found("fee structure lineage", lineage_id));
        }
        Ok(versions)
    }

    pub async fn get_structure(&self, structure_id: Uuid) -> Result<FeeStructure, FeeError> {
        self.store.get_structure(structure_id).await
    }

    pub async fn list_structures(
        &self,
        filter: &ListStructuresFilter,
    ) -> Result<Vec<FeeStructure>, FeeError> {
        self.store.list_structures(filter).await
    }

    /// Switch a structure off. Its rows stay for audit; it stops billing.
    #[instrument(skip(self))]
    pub async fn deactivate_structure(&self, structure_id: Uuid) -> Result<FeeStructure, FeeError> {
        self.store.deactivate_structure(structure_id).await
    }
}
