//! Grade record types shared by the record store and the XML ledger.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical date format used for storage, search and XML.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single student grade.
///
/// `teacher` and `cafedra` are optional in every input path but are always
/// normalized to an empty string here, never `None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GradeRecord {
    pub name: String,
    pub subject: String,
    pub grade: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub teacher: String,
    #[serde(default)]
    pub cafedra: String,
}

/// The (name, subject, grade, date) tuple that must be unique in the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DuplicateKey<'a> {
    pub name: &'a str,
    pub subject: &'a str,
    pub grade: &'a str,
    pub date: NaiveDate,
}

/// How a search query is matched against each field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    StartsWith,
    Contains,
}

impl GradeRecord {
    pub fn new(
        name: impl Into<String>,
        subject: impl Into<String>,
        grade: impl Into<String>,
        date: NaiveDate,
        teacher: Option<String>,
        cafedra: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            subject: subject.into(),
            grade: grade.into(),
            date,
            teacher: teacher.unwrap_or_default(),
            cafedra: cafedra.unwrap_or_default(),
        }
    }

    pub fn duplicate_key(&self) -> DuplicateKey<'_> {
        DuplicateKey {
            name: &self.name,
            subject: &self.subject,
            grade: &self.grade,
            date: self.date,
        }
    }

    pub fn date_string(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    /// Case-insensitive match of `query` against any of the six fields.
    ///
    /// The date takes part in its `YYYY-MM-DD` form. An empty query matches
    /// every record.
    pub fn matches(&self, query: &str, mode: SearchMode) -> bool {
        if query.is_empty() {
            return true;
        }
        let needle = query.to_lowercase();
        let date = self.date_string();
        let fields = [
            self.name.as_str(),
            self.subject.as_str(),
            self.grade.as_str(),
            date.as_str(),
            self.teacher.as_str(),
            self.cafedra.as_str(),
        ];
        let matched = fields.into_iter().any(|field| {
            let field = field.to_lowercase();
            match mode {
                SearchMode::StartsWith => field.starts_with(&needle),
                SearchMode::Contains => field.contains(&needle),
            }
        });
        matched
    }
}

/// A grade row in the record store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredGrade {
    pub id: i64,
    #[serde(flatten)]
    pub record: GradeRecord,
}

/// A grade read back from the XML ledger. Missing elements are empty strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub name: String,
    pub subject: String,
    pub grade: String,
    pub date: String,
    pub teacher: String,
    pub cafedra: String,
}

impl From<&GradeRecord> for LedgerEntry {
    fn from(record: &GradeRecord) -> Self {
        Self {
            name: record.name.clone(),
            subject: record.subject.clone(),
            grade: record.grade.clone(),
            date: record.date_string(),
            teacher: record.teacher.clone(),
            cafedra: record.cafedra.clone(),
        }
    }
}

/// A grade extracted from an uploaded XML file.
///
/// Only the fields present in the source document are set; absent ones are
/// left out of the serialized form entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedGrade {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cafedra: Option<String>,
}

impl ExtractedGrade {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.subject.is_none()
            && self.grade.is_none()
            && self.date.is_none()
            && self.teacher.is_none()
            && self.cafedra.is_none()
    }
}
