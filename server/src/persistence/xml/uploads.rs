use std::path::{Path, PathBuf};

use grades::ExtractedGrade;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::tree::{self, Element};
use super::{CAFEDRA, DATE, GRADE, GRADE_VALUE, STUDENT_NAME, SUBJECT, TEACHER};
use crate::persistence::PersistenceError;

/// Metadata for one `*.xml` file in the upload directory.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct XmlFileInfo {
    pub filename: String,
    #[serde(rename = "filepath")]
    pub path: PathBuf,
    pub size: u64,
    pub is_valid: bool,
}

/// An uploaded file that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub filename: String,
}

/// Directory holding independently uploaded XML grade documents.
///
/// Every file is self-contained; nothing here is merged with the ledger or
/// the record store. The ledger file itself is listed like any other upload.
#[derive(Debug, Clone)]
pub struct UploadDirectory {
    dir: PathBuf,
}

impl UploadDirectory {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    #[cfg(test)]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<(), PersistenceError> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// All `*.xml` files, sorted by name.
    pub fn list_files(&self) -> Result<Vec<XmlFileInfo>, PersistenceError> {
        self.ensure_dir()?;
        let mut files = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !filename.ends_with(".xml") {
                continue;
            }
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let path = entry.path();
            files.push(XmlFileInfo {
                is_valid: Self::validate(&path),
                filename,
                path,
                size: metadata.len(),
            });
        }

        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }

    /// True iff the file exists and is well-formed XML. Content is not checked.
    pub fn validate(path: &Path) -> bool {
        match std::fs::read(path) {
            Ok(bytes) => match tree::parse(&bytes) {
                Ok(_) => true,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "XML validation failed");
                    false
                }
            },
            Err(_) => false,
        }
    }

    /// Every `Grade` element anywhere in the document, keeping only the
    /// fields that are actually present. Invalid files yield nothing.
    pub fn extract_records(path: &Path) -> Vec<ExtractedGrade> {
        let root = match std::fs::read(path)
            .map_err(PersistenceError::from)
            .and_then(|bytes| tree::parse(&bytes).map_err(PersistenceError::from))
        {
            Ok(root) => root,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read uploaded XML");
                return Vec::new();
            }
        };

        root.descendants_named(GRADE)
            .into_iter()
            .map(extracted_grade)
            .filter(|g| !g.is_empty())
            .collect()
    }

    pub fn remove(path: &Path) -> Result<(), PersistenceError> {
        std::fs::remove_file(path)?;
        info!(path = %path.display(), "Removed XML file");
        Ok(())
    }

    /// `grades_<8 hex chars>.xml`
    pub fn generate_unique_filename() -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("grades_{}.xml", &id[..8])
    }

    /// Map a file name from a request onto a path inside the directory.
    ///
    /// Names that could step outside the directory are rejected. Existence is
    /// not checked.
    pub fn resolve(&self, filename: &str) -> Result<PathBuf, PersistenceError> {
        if filename.is_empty()
            || filename == "."
            || filename.contains("..")
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains('\0')
        {
            return Err(PersistenceError::InvalidFileName(filename.to_string()));
        }
        Ok(self.dir.join(filename))
    }

    /// Open a fresh uniquely named file for an incoming upload.
    pub async fn begin_upload(&self) -> Result<PendingUpload, PersistenceError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let filename = Self::generate_unique_filename();
        let path = self.dir.join(&filename);
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok(PendingUpload {
            filename,
            path,
            file,
            written: 0,
        })
    }
}

/// An upload being streamed to disk chunk by chunk.
pub struct PendingUpload {
    filename: String,
    path: PathBuf,
    file: tokio::fs::File,
    written: u64,
}

impl PendingUpload {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), PersistenceError> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush the file and validate it. An invalid file is removed and
    /// reported as [`PersistenceError::InvalidXml`].
    pub async fn finish(mut self) -> Result<StoredUpload, PersistenceError> {
        self.file.flush().await?;
        drop(self.file);

        if !UploadDirectory::validate(&self.path) {
            UploadDirectory::remove(&self.path)?;
            warn!(filename = %self.filename, bytes = self.written, "Rejected invalid XML upload");
            return Err(PersistenceError::InvalidXml);
        }

        info!(filename = %self.filename, bytes = self.written, "Stored XML upload");
        Ok(StoredUpload {
            filename: self.filename,
        })
    }

    /// Discard a partially written upload.
    pub async fn abort(self) {
        drop(self.file);
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            warn!(path = %self.path.display(), error = %e, "Failed to remove aborted upload");
        }
    }
}

fn extracted_grade(grade: &Element) -> ExtractedGrade {
    let field = |name: &str| grade.child_text(name).map(str::to_string);
    ExtractedGrade {
        name: field(STUDENT_NAME),
        subject: field(SUBJECT),
        grade: field(GRADE_VALUE),
        date: field(DATE),
        teacher: field(TEACHER),
        cafedra: field(CAFEDRA),
    }
}
