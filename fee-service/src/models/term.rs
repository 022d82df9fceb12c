//! Academic term reference data, supplied by the school directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A term of an academic year. Owned by the school directory; the fee engine
/// only references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub term_id: Uuid,
    pub academic_year_id: Uuid,
    /// Position within the academic year, starting at 1.
    pub ordinal: i32,
    pub name: String,
    /// Set once billing for the term is closed.
    pub closed_utc: Option<DateTime<Utc>>,
}

impl Term {
    /// Whether something created at `created_utc` came after this term closed.
    pub fn closed_before(&self, created_utc: DateTime<Utc>) -> bool {
        self.closed_utc.is_some_and(|closed| closed < created_utc)
    }
}
