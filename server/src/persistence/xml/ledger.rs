use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use grades::{GradeRecord, LedgerEntry};
use tracing::{info, warn};

use super::tree::{self, Element};
use super::{
    CAFEDRA, DATE, GRADE, GRADE_VALUE, LEDGER_FILE_NAME, ROOT, STUDENT_NAME, SUBJECT, TEACHER,
};
use crate::persistence::traits::{GradeListing, GradeStore};
use crate::persistence::PersistenceError;

/// The cumulative `grades.xml` document.
///
/// Appends rewrite the whole file, so they go through a single writer lock
/// and replace the file atomically. A reader never observes a half-written
/// document and a failed append leaves the previous contents in place.
pub struct XmlLedger {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl XmlLedger {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILE_NAME)
    }

    /// Append `record` as the last `Grade` of the ledger, creating the file
    /// if needed. No duplicate check is made.
    pub fn append(&self, record: &GradeRecord) -> Result<(), PersistenceError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        std::fs::create_dir_all(&self.dir)?;
        let path = self.path();
        let mut root = if path.exists() {
            tree::parse(&std::fs::read(&path)?)?
        } else {
            Element::new(ROOT)
        };

        root.children.push(record_element(record));
        let bytes = tree::to_bytes(&root)?;
        replace_file(&self.dir, &path, &bytes)?;

        info!(
            path = %path.display(),
            records = root.children_named(GRADE).count(),
            "Appended grade to XML ledger"
        );
        Ok(())
    }

    /// Every `Grade` directly under the root, oldest first.
    ///
    /// A missing ledger reads as empty. So does an unreadable or malformed
    /// one; the error is logged and the file is left untouched.
    pub fn read_all(&self) -> Vec<LedgerEntry> {
        let path = self.path();
        if !path.exists() {
            return Vec::new();
        }

        let root = match std::fs::read(&path)
            .map_err(PersistenceError::from)
            .and_then(|bytes| tree::parse(&bytes).map_err(PersistenceError::from))
        {
            Ok(root) => root,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read XML ledger");
                return Vec::new();
            }
        };

        root.children_named(GRADE).map(ledger_entry).collect()
    }
}

fn record_element(record: &GradeRecord) -> Element {
    let mut grade = Element::new(GRADE);
    grade
        .children
        .push(Element::with_text(STUDENT_NAME, record.name.as_str()));
    grade
        .children
        .push(Element::with_text(SUBJECT, record.subject.as_str()));
    grade
        .children
        .push(Element::with_text(GRADE_VALUE, record.grade.as_str()));
    grade
        .children
        .push(Element::with_text(DATE, record.date_string()));
    if !record.teacher.is_empty() {
        grade
            .children
            .push(Element::with_text(TEACHER, record.teacher.as_str()));
    }
    if !record.cafedra.is_empty() {
        grade
            .children
            .push(Element::with_text(CAFEDRA, record.cafedra.as_str()));
    }
    grade
}

fn ledger_entry(grade: &Element) -> LedgerEntry {
    let field = |name: &str| grade.child_text(name).unwrap_or_default().to_string();
    LedgerEntry {
        name: field(STUDENT_NAME),
        subject: field(SUBJECT),
        grade: field(GRADE_VALUE),
        date: field(DATE),
        teacher: field(TEACHER),
        cafedra: field(CAFEDRA),
    }
}

/// Write `bytes` to a temp file in `dir` and rename it over `path`.
fn replace_file(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PersistenceError::Io(e.error))?;
    Ok(())
}

impl GradeStore for XmlLedger {
    async fn save_grade(&self, record: &GradeRecord) -> Result<(), PersistenceError> {
        self.append(record)
    }

    async fn list_grades(&self) -> Result<Vec<GradeListing>, PersistenceError> {
        Ok(self.read_all().into_iter().map(GradeListing::from).collect())
    }
}
