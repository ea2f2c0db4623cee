//! Field validation for incoming grade records.
//!
//! Both storage paths accept a record only after [`GradeForm::validate`] has
//! turned the raw form values into a [`GradeRecord`].

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::record::{GradeRecord, DATE_FORMAT};

pub const NAME_MAX_LEN: usize = 100;
pub const SUBJECT_MAX_LEN: usize = 50;
pub const GRADE_MAX_LEN: usize = 10;
pub const TEACHER_MAX_LEN: usize = 100;
pub const CAFEDRA_MAX_LEN: usize = 100;

/// Pass/fail tokens accepted as grade values (compared lowercased).
const PASS_TOKEN: &str = "зачет";
const FAIL_TOKEN: &str = "незачет";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: this field is required")]
    Required { field: &'static str },
    #[error("{field}: must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("name may only contain letters, spaces, hyphens and periods")]
    InvalidName,
    #[error("invalid grade format")]
    InvalidGrade,
    #[error("date must be a valid YYYY-MM-DD date")]
    InvalidDate,
}

impl ValidationError {
    /// The form field this error belongs to.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Required { field } | Self::TooLong { field, .. } => field,
            Self::InvalidName => "name",
            Self::InvalidGrade => "grade",
            Self::InvalidDate => "date",
        }
    }
}

/// Every field error found in one form submission.
#[derive(Debug, Clone, PartialEq, Eq, Default, thiserror::Error)]
#[error("{}", join_messages(.0))]
pub struct ValidationErrors(Vec<ValidationError>);

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field() == field)
    }

    /// Field name to message, first error per field.
    pub fn by_field(&self) -> BTreeMap<&'static str, String> {
        let mut map = BTreeMap::new();
        for error in &self.0 {
            map.entry(error.field()).or_insert_with(|| error.to_string());
        }
        map
    }

    fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }
}

/// Raw grade values as submitted by a form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradeForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub teacher: Option<String>,
    #[serde(default)]
    pub cafedra: Option<String>,
}

impl GradeForm {
    /// Validate every field and build the normalized record.
    ///
    /// All string values are trimmed. An optional field that is blank after
    /// trimming becomes an empty string.
    pub fn validate(&self) -> Result<GradeRecord, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let name = required(&self.name, "name", NAME_MAX_LEN, &mut errors);
        if let Some(name) = name {
            if !is_valid_name(name) {
                errors.push(ValidationError::InvalidName);
            }
        }

        let subject = required(&self.subject, "subject", SUBJECT_MAX_LEN, &mut errors);

        let grade = required(&self.grade, "grade", GRADE_MAX_LEN, &mut errors);
        if let Some(grade) = grade {
            if !is_valid_grade_value(grade) {
                errors.push(ValidationError::InvalidGrade);
            }
        }

        let date = match self.date.trim() {
            "" => {
                errors.push(ValidationError::Required { field: "date" });
                None
            }
            raw => match NaiveDate::parse_from_str(raw, DATE_FORMAT) {
                Ok(date) => Some(date),
                Err(_) => {
                    errors.push(ValidationError::InvalidDate);
                    None
                }
            },
        };

        let teacher = optional(self.teacher.as_deref(), "teacher", TEACHER_MAX_LEN, &mut errors);
        let cafedra = optional(self.cafedra.as_deref(), "cafedra", CAFEDRA_MAX_LEN, &mut errors);

        match (name, subject, grade, date) {
            (Some(name), Some(subject), Some(grade), Some(date)) if errors.is_empty() => {
                Ok(GradeRecord::new(name, subject, grade, date, teacher, cafedra))
            }
            _ => Err(errors),
        }
    }
}

impl From<&GradeRecord> for GradeForm {
    fn from(record: &GradeRecord) -> Self {
        Self {
            name: record.name.clone(),
            subject: record.subject.clone(),
            grade: record.grade.clone(),
            date: record.date_string(),
            teacher: Some(record.teacher.clone()),
            cafedra: Some(record.cafedra.clone()),
        }
    }
}

fn required<'a>(
    raw: &'a str,
    field: &'static str,
    max: usize,
    errors: &mut ValidationErrors,
) -> Option<&'a str> {
    let value = raw.trim();
    if value.is_empty() {
        errors.push(ValidationError::Required { field });
        return None;
    }
    if value.chars().count() > max {
        errors.push(ValidationError::TooLong { field, max });
    }
    Some(value)
}

fn optional(
    raw: Option<&str>,
    field: &'static str,
    max: usize,
    errors: &mut ValidationErrors,
) -> Option<String> {
    let value = raw.map(str::trim).unwrap_or_default();
    if value.chars().count() > max {
        errors.push(ValidationError::TooLong { field, max });
    }
    Some(value.to_string())
}

/// A student name is made of Latin or Cyrillic letters, whitespace, `-` and `.`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| {
            c.is_ascii_alphabetic()
                || is_cyrillic_letter(c)
                || c.is_whitespace()
                || c == '-'
                || c == '.'
        })
}

fn is_cyrillic_letter(c: char) -> bool {
    matches!(c, '\u{0400}'..='\u{04FF}') && c.is_alphabetic()
}

/// Grade grammar, matched against the lowercased value as a whole:
///
/// ```text
/// grade := [1-5] | digit "-" digit | [a-f] | "зачет" | "незачет"
/// ```
///
/// Anything else, multi-digit numbers included, is rejected.
pub fn is_valid_grade_value(grade: &str) -> bool {
    let lowered = grade.to_lowercase();
    if lowered == PASS_TOKEN || lowered == FAIL_TOKEN {
        return true;
    }
    let chars: Vec<char> = lowered.chars().collect();
    match chars.as_slice() {
        [c] => matches!(c, '1'..='5' | 'a'..='f'),
        [lo, '-', hi] => lo.is_ascii_digit() && hi.is_ascii_digit(),
        _ => false,
    }
}
