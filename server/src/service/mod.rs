//! HTTP service for the gradebook
//!
//! Page routes answer with their view context as JSON. Actions that change
//! stored data answer with an [`Outcome`]; failures go through [`ApiError`].

mod converters;
mod endpoints;
mod error;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::persistence::sqlite::SqliteGradeRepository;
use crate::persistence::{UploadDirectory, XmlLedger};
use endpoints::{files, records};

pub use error::ApiError;

/// Largest accepted request body, uploads included.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Stores shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub grades: SqliteGradeRepository,
    pub ledger: Arc<XmlLedger>,
    pub uploads: UploadDirectory,
}

impl AppState {
    pub fn new(grades: SqliteGradeRepository, ledger: XmlLedger, uploads: UploadDirectory) -> Self {
        Self {
            grades,
            ledger: Arc::new(ledger),
            uploads,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(records::student_form).post(records::submit_grade))
        .route("/grades/", get(records::grades_list))
        .route("/search/", get(records::search))
        .route("/ajax-search/", get(records::ajax_search))
        .route("/edit/{id}/", get(records::edit_form).post(records::edit_grade))
        .route(
            "/delete/{id}/",
            get(records::delete_confirm).post(records::delete_grade),
        )
        .route("/upload/", get(files::upload_form).post(files::upload_xml))
        .route("/files/", get(files::xml_files_list))
        .route("/files/{filename}/", get(files::view_xml_file))
        .route("/download/{filename}/", get(files::download_xml_file))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Result of an action, with the page the client should show next.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Outcome {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl Outcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
            redirect: None,
            filename: None,
        }
    }

    pub fn redirect(mut self, to: &'static str) -> Self {
        self.redirect = Some(to);
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}
