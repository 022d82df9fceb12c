//! In-process [`FeeStore`].

use crate::error::FeeError;
use crate::models::{
    AnnualAttribution, AnnualChargeKey, ConflictReport, CreateAdjustment, FeeAdjustment, FeeStructure,
    ListStructuresFilter, NewFeeStructure, StructureStatus, UpdateAdjustment,
};
use crate::services::store::{apply_conflict_policy, FeeStore, StructureBatch};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

#[derive(Default)]
struct State {
    /// Stored rows; `status` is derived on read.
    structures: Vec<FeeStructure>,
    adjustments: HashMap<Uuid, FeeAdjustment>,
    /// Keyed by (student, academic year, charge).
    attributions: HashMap<(Uuid, Uuid, AnnualChargeKey), AnnualAttribution>,
}

impl State {
    fn with_status(&self, structure: &FeeStructure) -> FeeStructure {
        let is_latest = !self
            .structures
            .iter()
            .any(|s| s.lineage_id == structure.lineage_id && s.version > structure.version);
        FeeStructure {
            status: StructureStatus::derive(structure.deactivated_utc.is_some(), is_latest),
            ..structure.clone()
        }
    }

    fn find(&self, structure_id: Uuid) -> Result<FeeStructure, FeeError> {
        self.structures
            .iter()
            .find(|s| s.structure_id == structure_id)
            .map(|s| self.with_status(s))
            .ok_or_else(|| FeeError::not_found("fee structure", structure_id))
    }

    fn campus_year(&self, campus_id: Uuid, academic_year_id: Uuid) -> Vec<FeeStructure> {
        self.structures
            .iter()
            .filter(|s| s.campus_id == campus_id && s.academic_year_id == academic_year_id)
            .map(|s| self.with_status(s))
            .collect()
    }
}

/// [`FeeStore`] held in memory behind a single lock. Every write takes the
/// write lock for its whole duration, which serializes them.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeeStore for InMemoryStore {
    #[instrument(skip(self, batch), fields(structures = batch.structures.len()))]
    async fn create_structures(
        &self,
        batch: StructureBatch,
    ) -> Result<(Vec<FeeStructure>, ConflictReport), FeeError> {
        let mut state = self.state.write().await;

        let (campus_id, academic_year_id) = match batch.structures.first() {
            Some(first) => (first.campus_id, first.academic_year_id),
            None => return Ok((Vec::new(), ConflictReport::default())),
        };
        let existing = state.campus_year(campus_id, academic_year_id);
        let (planned, report) = apply_conflict_policy(batch, &existing)?;

        let created_utc = Utc::now();
        let created: Vec<FeeStructure> = planned
            .into_iter()
            .map(|s| s.into_structure(Uuid::new_v4(), created_utc))
            .collect();
        state.structures.extend(created.iter().cloned());

        tracing::info!(count = created.len(), overridden = !report.is_empty(), "Fee structures stored");
        Ok((created, report))
    }

    #[instrument(skip(self, structure), fields(lineage_id = %structure.lineage_id, version = structure.version))]
    async fn append_version(&self, structure: NewFeeStructure) -> Result<FeeStructure, FeeError> {
        let mut state = self.state.write().await;

        let current = state
            .structures
            .iter()
            .filter(|s| s.lineage_id == structure.lineage_id)
            .map(|s| s.version)
            .max()
            .unwrap_or(0);
        if current != structure.version - 1 {
            return Err(FeeError::Transaction(anyhow::anyhow!(
                "lineage {} is at version {}, cannot append version {}",
                structure.lineage_id,
                current,
                structure.version
            )));
        }

        let created = structure.into_structure(Uuid::new_v4(), Utc::now());
        state.structures.push(created.clone());
        Ok(created)
    }

    async fn get_structure(&self, structure_id: Uuid) -> Result<FeeStructure, FeeError> {
        self.state.read().await.find(structure_id)
    }

    async fn list_structures(
        &self,
        filter: &ListStructuresFilter,
    ) -> Result<Vec<FeeStructure>, FeeError> {
        let state = self.state.read().await;
        let mut structures: Vec<FeeStructure> = state
            .structures
            .iter()
            .map(|s| state.with_status(s))
            .filter(|s| filter.matches(s))
            .collect();
        structures.sort_by(|a, b| {
            (a.created_utc, a.version, a.structure_id).cmp(&(b.created_utc, b.version, b.structure_id))
        });
        Ok(structures)
    }

    async fn structure_history(&self, lineage_id: Uuid) -> Result<Vec<FeeStructure>, FeeError> {
        let state = self.state.read().await;
        let mut versions: Vec<FeeStructure> = state
            .structures
            .iter()
            .filter(|s| s.lineage_id == lineage_id)
            .map(|s| state.with_status(s))
            .collect();
        versions.sort_by_key(|s| s.version);
        Ok(versions)
    }

    #[instrument(skip(self))]
    async fn deactivate_structure(&self, structure_id: Uuid) -> Result<FeeStructure, FeeError> {
        let mut state = self.state.write().await;
        let stored = state
            .structures
            .iter_mut()
            .find(|s| s.structure_id == structure_id)
            .ok_or_else(|| FeeError::not_found("fee structure", structure_id))?;
        if stored.deactivated_utc.is_none() {
            stored.deactivated_utc = Some(Utc::now());
        }
        state.find(structure_id)
    }

    #[instrument(skip(self, input), fields(student_id = %input.student_id, term_id = %input.term_id))]
    async fn create_adjustment(&self, input: CreateAdjustment) -> Result<FeeAdjustment, FeeError> {
        let mut state = self.state.write().await;
        if state
            .adjustments
            .values()
            .any(|a| a.student_id == input.student_id && a.term_id == input.term_id)
        {
            return Err(FeeError::AdjustmentExists {
                student_id: input.student_id,
                term_id: input.term_id,
            });
        }

        let now = Utc::now();
        let adjustment = FeeAdjustment {
            adjustment_id: Uuid::new_v4(),
            student_id: input.student_id,
            term_id: input.term_id,
            adjustment_type: input.adjustment_type,
            adjustment_value: input.adjustment_value,
            reason: input.reason.trim().to_string(),
            created_utc: now,
            updated_utc: now,
        };
        state
            .adjustments
            .insert(adjustment.adjustment_id, adjustment.clone());
        Ok(adjustment)
    }

    #[instrument(skip(self, input))]
    async fn update_adjustment(
        &self,
        adjustment_id: Uuid,
        input: UpdateAdjustment,
    ) -> Result<FeeAdjustment, FeeError> {
        let mut state = self.state.write().await;
        let adjustment = state
            .adjustments
            .get_mut(&adjustment_id)
            .ok_or_else(|| FeeError::not_found("fee adjustment", adjustment_id))?;
        adjustment.adjustment_type = input.adjustment_type;
        adjustment.adjustment_value = input.adjustment_value;
        adjustment.reason = input.reason.trim().to_string();
        adjustment.updated_utc = Utc::now();
        Ok(adjustment.clone())
    }

    async fn get_adjustment(
        &self,
        student_id: Uuid,
        term_id: Uuid,
    ) -> Result<Option<FeeAdjustment>, FeeError> {
        Ok(self
            .state
            .read()
            .await
            .adjustments
            .values()
            .find(|a| a.student_id == student_id && a.term_id == term_id)
            .cloned())
    }

    async fn claim_annual_charges(
        &self,
        student_id: Uuid,
        academic_year_id: Uuid,
        term_id: Uuid,
        charges: &[AnnualChargeKey],
    ) -> Result<Vec<AnnualAttribution>, FeeError> {
        let mut state = self.state.write().await;
        let created_utc = Utc::now();
        let attributions = charges
            .iter()
            .map(|key| {
                state
                    .attributions
                    .entry((student_id, academic_year_id, key.clone()))
                    .or_insert_with(|| AnnualAttribution {
                        student_id,
                        academic_year_id,
                        item_kind: key.item_kind,
                        item_name: key.item_name.clone(),
                        term_id,
                        created_utc,
                    })
                    .clone()
            })
            .collect();
        Ok(attributions)
    }
}
