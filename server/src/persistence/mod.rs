pub mod sqlite;
pub mod traits;
pub mod xml;

pub use traits::{GradeListing, GradeStore, StorageTarget};
pub use xml::{UploadDirectory, XmlError, XmlFileInfo, XmlLedger};

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("XML error: {0}")]
    Xml(#[from] XmlError),
    #[error("This grade already exists in the database")]
    Duplicate,
    #[error("{0} not found")]
    NotFound(String),
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),
    #[error("The file is not valid XML and was removed")]
    InvalidXml,
    #[error("Invalid data: {0}")]
    InvalidData(String),
}
