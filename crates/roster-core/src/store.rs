//! Contract with the durable Gallery Store.
//!
//! The core reads enrolled identities through [`GallerySource`] and writes
//! attendance through [`AttendanceStore`]; `roster-store` implements both
//! on SQLite.

use crate::attendance::PeriodKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// An identity row as read from storage, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityRecord {
    pub id: String,
    pub display_name: Option<String>,
    pub values: Vec<f32>,
    /// Vector length recorded alongside the encoding at enrollment time.
    pub declared_len: usize,
}

/// Outcome of an attendance insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOutcome {
    Created,
    AlreadyPresent,
}

/// Read side of the Gallery Store.
pub trait GallerySource: Send + Sync {
    /// Fetch every enrolled identity.
    fn list_identities(&self) -> Result<Vec<IdentityRecord>, StoreError>;
}

/// Write side of the Gallery Store for attendance.
///
/// `insert_record_if_absent` must be atomic in the backing store itself
/// (unique constraint or equivalent): commits may come from several
/// workers or processes at once.
pub trait AttendanceStore: Send + Sync {
    fn period_has_record(&self, identity_id: &str, period: &PeriodKey) -> Result<bool, StoreError>;

    fn insert_record_if_absent(
        &self,
        identity_id: &str,
        period: &PeriodKey,
    ) -> Result<CommitOutcome, StoreError>;
}
