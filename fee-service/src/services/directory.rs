//! Ports to the systems the fee engine reads from but does not own.

use crate::error::FeeError;
use crate::models::Term;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Academic calendar and enrolment lookups.
#[async_trait]
pub trait SchoolDirectory: Send + Sync {
    async fn term(&self, term_id: Uuid) -> Result<Term, FeeError>;

    /// Terms of the academic year ordered by ordinal. Empty for an unknown year.
    async fn terms_for_year(&self, academic_year_id: Uuid) -> Result<Vec<Term>, FeeError>;

    async fn class_exists(&self, class_id: Uuid) -> Result<bool, FeeError>;

    /// The class the student is enrolled in for the term.
    async fn class_for_student(&self, student_id: Uuid, term_id: Uuid) -> Result<Uuid, FeeError>;
}

/// Source of payments already received.
#[async_trait]
pub trait PaymentsLedger: Send + Sync {
    async fn amount_paid(&self, student_id: Uuid, term_id: Uuid) -> Result<Decimal, FeeError>;
}

#[derive(Default)]
struct DirectoryData {
    terms: HashMap<Uuid, Term>,
    classes: HashSet<Uuid>,
    enrolments: HashMap<(Uuid, Uuid), Uuid>,
}

/// In-memory [`SchoolDirectory`].
#[derive(Default)]
pub struct StaticDirectory {
    data: RwLock<DirectoryData>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_term(&self, term: Term) {
        self.data.write().await.terms.insert(term.term_id, term);
    }

    pub async fn add_class(&self, class_id: Uuid) {
        self.data.write().await.classes.insert(class_id);
    }

    /// Enrol a student in a class for one term. The class is registered too.
    pub async fn enrol(&self, student_id: Uuid, term_id: Uuid, class_id: Uuid) {
        let mut data = self.data.write().await;
        data.classes.insert(class_id);
        data.enrolments.insert((student_id, term_id), class_id);
    }

    /// Mark a term's billing as closed.
    pub async fn close_term(
        &self,
        term_id: Uuid,
        closed_utc: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), FeeError> {
        let mut data = self.data.write().await;
        let term = data
            .terms
            .get_mut(&term_id)
            .ok_or_else(|| FeeError::not_found("term", term_id))?;
        term.closed_utc = Some(closed_utc);
        Ok(())
    }
}

#[async_trait]
impl SchoolDirectory for StaticDirectory {
    async fn term(&self, term_id: Uuid) -> Result<Term, FeeError> {
        self.data
            .read()
            .await
            .terms
            .get(&term_id)
            .cloned()
            .ok_or_else(|| FeeError::not_found("term", term_id))
    }

    async fn terms_for_year(&self, academic_year_id: Uuid) -> Result<Vec<Term>, FeeError> {
        let data = self.data.read().await;
        let mut terms: Vec<Term> = data
            .terms
            .values()
            .filter(|t| t.academic_year_id == academic_year_id)
            .cloned()
            .collect();
        terms.sort_by_key(|t| t.ordinal);
        Ok(terms)
    }

    async fn class_exists(&self, class_id: Uuid) -> Result<bool, FeeError> {
        Ok(self.data.read().await.classes.contains(&class_id))
    }

    async fn class_for_student(&self, student_id: Uuid, term_id: Uuid) -> Result<Uuid, FeeError> {
        self.data
            .read()
            .await
            .enrolments
            .get(&(student_id, term_id))
            .copied()
            .ok_or_else(|| FeeError::not_found("enrolment", student_id))
    }
}

/// In-memory [`PaymentsLedger`]. Students with no recorded payment have paid zero.
#[derive(Default)]
pub struct StaticLedger {
    paid: RwLock<HashMap<(Uuid, Uuid), Decimal>>,
}

impl StaticLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a payment on top of whatever was already recorded.
    pub async fn record_payment(&self, student_id: Uuid, term_id: Uuid, amount: Decimal) {
        *self
            .paid
            .write()
            .await
            .entry((student_id, term_id))
            .or_insert(Decimal::ZERO) += amount;
    }
}

#[async_trait]
impl PaymentsLedger for StaticLedger {
    async fn amount_paid(&self, student_id: Uuid, term_id: Uuid) -> Result<Decimal, FeeError> {
        Ok(self
            .paid
            .read()
            .await
            .get(&(student_id, term_id))
            .copied()
            .unwrap_or(Decimal::ZERO))
    }
}
