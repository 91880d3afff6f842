//! Idempotent attendance commit.

use crate::store::{AttendanceStore, CommitOutcome, StoreError};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

const PERIOD_FORMAT: &str = "%Y-%m-%d";

/// Attendance bucket: one calendar day, `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodKey(String);

impl PeriodKey {
    pub fn for_date(date: NaiveDate) -> Self {
        Self(date.format(PERIOD_FORMAT).to_string())
    }

    /// Today's key in local time.
    pub fn today() -> Self {
        Self::for_date(Local::now().date_naive())
    }

    pub fn parse(s: &str) -> Result<Self, chrono::ParseError> {
        NaiveDate::parse_from_str(s.trim(), PERIOD_FORMAT).map(Self::for_date)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A committed attendance row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub identity_id: String,
    pub period_key: PeriodKey,
    pub committed_at: DateTime<Utc>,
}

/// Turns confirmations into at-most-once attendance records.
///
/// Uniqueness is enforced by the store, so any number of workers (or
/// processes) may commit the same identity concurrently.
#[derive(Clone)]
pub struct AttendanceCommitter {
    store: Arc<dyn AttendanceStore>,
}

impl AttendanceCommitter {
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self { store }
    }

    pub fn commit(&self, identity_id: &str, period: &PeriodKey) -> Result<CommitOutcome, StoreError> {
        let outcome = match self.store.insert_record_if_absent(identity_id, period) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(identity = identity_id, period = %period, error = %err, "attendance commit failed");
                return Err(err);
            }
        };

        match outcome {
            CommitOutcome::Created => {
                tracing::info!(identity = identity_id, period = %period, "attendance committed");
            }
            CommitOutcome::AlreadyPresent => {
                tracing::info!(identity = identity_id, period = %period, "duplicate attendance ignored");
            }
        }
        Ok(outcome)
    }
}
