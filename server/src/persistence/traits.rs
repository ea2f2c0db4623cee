//! The grade store capability shared by both storage backends.
//!
//! [`GradeStore`] is implemented by the SQLite record store and by the XML
//! ledger. Handlers pick one per request from a [`StorageTarget`] and call
//! it through static dispatch.
//!
//! Methods return `impl Future + Send` rather than using `async fn` so that
//! the futures are guaranteed `Send`, which axum handlers require.

use std::future::Future;

use grades::{GradeRecord, LedgerEntry, StoredGrade};
use serde::{Deserialize, Serialize};

use super::PersistenceError;

/// Where a grade is written to, or listed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageTarget {
    #[default]
    #[serde(rename = "db")]
    Database,
    #[serde(rename = "xml")]
    Xml,
}

impl StorageTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Database => "db",
            Self::Xml => "xml",
        }
    }
}

/// A grade as shown in listings from either backend.
///
/// Ledger entries have no id.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GradeListing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub subject: String,
    pub grade: String,
    pub date: String,
    pub teacher: String,
    pub cafedra: String,
}

impl From<StoredGrade> for GradeListing {
    fn from(stored: StoredGrade) -> Self {
        let date = stored.record.date_string();
        let GradeRecord {
            name,
            subject,
            grade,
            teacher,
            cafedra,
            ..
        } = stored.record;
        Self {
            id: Some(stored.id),
            name,
            subject,
            grade,
            date,
            teacher,
            cafedra,
        }
    }
}

impl From<LedgerEntry> for GradeListing {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: None,
            name: entry.name,
            subject: entry.subject,
            grade: entry.grade,
            date: entry.date,
            teacher: entry.teacher,
            cafedra: entry.cafedra,
        }
    }
}

/// Write and list grades in one backend.
pub trait GradeStore: Send + Sync {
    fn save_grade(
        &self,
        record: &GradeRecord,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn list_grades(
        &self,
    ) -> impl Future<Output = Result<Vec<GradeListing>, PersistenceError>> + Send;
}
