//! Creation/modification audit columns shared by audited entities.
//!
//! # Invariants
//! - `created_*` is written once, on insert, and carried across merges.
//! - `last_modified_*` changes on insert and on every flushed update.
//! - Bulk updates bypass auditing.

use crate::db::RowReader;
use crate::error::RepoResult;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) const AUDIT_COLUMNS: [&str; 4] = [
    "created_date",
    "last_modified_date",
    "created_by",
    "last_modified_by",
];

/// Audit state of one row. Dates are Unix epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub created_date: Option<i64>,
    pub last_modified_date: Option<i64>,
    pub created_by: Option<String>,
    pub last_modified_by: Option<String>,
}

/// Who and when, for one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditStamp {
    pub at: i64,
    pub by: String,
}

impl AuditStamp {
    pub fn now(by: impl Into<String>) -> Self {
        Self {
            at: now_epoch_ms(),
            by: by.into(),
        }
    }
}

impl Audit {
    pub fn stamp_created(&mut self, stamp: &AuditStamp) {
        self.created_date = Some(stamp.at);
        self.created_by = Some(stamp.by.clone());
        self.stamp_modified(stamp);
    }

    pub fn stamp_modified(&mut self, stamp: &AuditStamp) {
        self.last_modified_date = Some(stamp.at);
        self.last_modified_by = Some(stamp.by.clone());
    }

    /// Keeps creation data from `stored` when this copy has none.
    pub fn carry_created_from(&mut self, stored: &Audit) {
        if self.created_date.is_none() {
            self.created_date = stored.created_date;
            self.created_by = stored.created_by.clone();
        }
    }

    pub(crate) fn values(&self) -> [Value; 4] {
        [
            self.created_date.into(),
            self.last_modified_date.into(),
            self.created_by.clone().into(),
            self.last_modified_by.clone().into(),
        ]
    }

    pub(crate) fn from_row(row: &RowReader<'_, '_>) -> RepoResult<Self> {
        Ok(Self {
            created_date: row.get("created_date")?,
            last_modified_date: row.get("last_modified_date")?,
            created_by: row.get("created_by")?,
            last_modified_by: row.get("last_modified_by")?,
        })
    }
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
