//! View contexts returned by the page routes, and conversions into them

use grades::validation::{
    CAFEDRA_MAX_LEN, GRADE_MAX_LEN, NAME_MAX_LEN, SUBJECT_MAX_LEN, TEACHER_MAX_LEN,
};
use grades::{ExtractedGrade, GradeForm, StoredGrade};
use serde::Serialize;

use crate::persistence::{GradeListing, StorageTarget, XmlFileInfo};

/// Shown in place of an empty value in search results.
const EMPTY_PLACEHOLDER: &str = "-";

#[derive(Debug, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub required: bool,
    pub max_length: Option<usize>,
}

const fn field(name: &'static str, required: bool, max_length: Option<usize>) -> FieldSpec {
    FieldSpec {
        name,
        required,
        max_length,
    }
}

/// Fields of the grade entry form, in display order.
pub fn grade_form_fields() -> Vec<FieldSpec> {
    vec![
        field("name", true, Some(NAME_MAX_LEN)),
        field("subject", true, Some(SUBJECT_MAX_LEN)),
        field("grade", true, Some(GRADE_MAX_LEN)),
        field("date", true, None),
        field("teacher", false, Some(TEACHER_MAX_LEN)),
        field("cafedra", false, Some(CAFEDRA_MAX_LEN)),
    ]
}

#[derive(Debug, Serialize)]
pub struct StudentFormPage {
    pub fields: Vec<FieldSpec>,
    pub save_targets: [&'static str; 2],
    pub default_target: &'static str,
}

#[derive(Debug, Serialize)]
pub struct GradesPage {
    pub grades: Vec<GradeListing>,
    pub has_grades: bool,
    pub from_db: bool,
    pub current_source: &'static str,
}

impl GradesPage {
    pub fn new(grades: Vec<GradeListing>, source: StorageTarget) -> Self {
        Self {
            has_grades: !grades.is_empty(),
            grades,
            from_db: source == StorageTarget::Database,
            current_source: source.as_str(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchPage {
    pub query: String,
    pub grades: Vec<GradeListing>,
    pub has_grades: bool,
}

/// One row of the live search results.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AjaxGrade {
    pub id: i64,
    pub name: String,
    pub subject: String,
    pub grade: String,
    pub date: String,
    pub teacher: String,
    pub cafedra: String,
}

fn or_placeholder(value: String) -> String {
    if value.is_empty() {
        EMPTY_PLACEHOLDER.to_string()
    } else {
        value
    }
}

impl From<StoredGrade> for AjaxGrade {
    fn from(stored: StoredGrade) -> Self {
        let date = stored.record.date_string();
        let record = stored.record;
        Self {
            id: stored.id,
            name: or_placeholder(record.name),
            subject: or_placeholder(record.subject),
            grade: or_placeholder(record.grade),
            date,
            teacher: or_placeholder(record.teacher),
            cafedra: or_placeholder(record.cafedra),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AjaxSearchResults {
    pub grades: Vec<AjaxGrade>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EditPage {
    pub grade: GradeListing,
    pub form: GradeForm,
}

impl From<StoredGrade> for EditPage {
    fn from(stored: StoredGrade) -> Self {
        let form = GradeForm::from(&stored.record);
        Self {
            grade: stored.into(),
            form,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeletePage {
    pub grade: GradeListing,
}

#[derive(Debug, Serialize)]
pub struct UploadFormPage {
    pub field: &'static str,
    pub accept: &'static str,
    pub max_bytes: usize,
}

/// An upload directory file with its extracted grades.
#[derive(Debug, Serialize)]
pub struct FileEntry {
    #[serde(flatten)]
    pub info: XmlFileInfo,
    pub grades: Vec<ExtractedGrade>,
    pub grades_count: usize,
}

impl FileEntry {
    pub fn new(info: XmlFileInfo, grades: Vec<ExtractedGrade>) -> Self {
        Self {
            info,
            grades_count: grades.len(),
            grades,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FilesPage {
    pub files_data: Vec<FileEntry>,
    pub has_files: bool,
}

#[derive(Debug, Serialize)]
pub struct FileDetailPage {
    pub filename: String,
    pub grades: Vec<ExtractedGrade>,
    pub has_grades: bool,
}
