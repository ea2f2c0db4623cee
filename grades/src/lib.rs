pub mod record;
pub mod validation;

pub use record::{
    DuplicateKey, ExtractedGrade, GradeRecord, LedgerEntry, SearchMode, StoredGrade, DATE_FORMAT,
};
pub use validation::{
    is_valid_grade_value, is_valid_name, GradeForm, ValidationError, ValidationErrors,
};
