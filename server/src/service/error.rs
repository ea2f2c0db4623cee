use std::collections::BTreeMap;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{FormRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use grades::ValidationErrors;
use serde::Serialize;

use crate::persistence::PersistenceError;

/// Every way a request can fail. Converted into a JSON error body; nothing
/// escapes a handler as a raw fault.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Please correct the errors in the form")]
    Validation(ValidationErrors),
    #[error("{message}")]
    NotFound {
        message: String,
        redirect: Option<&'static str>,
    },
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            redirect: None,
        }
    }

    /// Point the client at `to` when the error is a missing record or file.
    pub fn redirect_to(self, to: &'static str) -> Self {
        match self {
            Self::NotFound { message, .. } => Self::NotFound {
                message,
                redirect: Some(to),
            },
            Self::Persistence(PersistenceError::NotFound(what)) => Self::NotFound {
                message: format!("{what} not found"),
                redirect: Some(to),
            },
            other => other,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Persistence(e) => match e {
                PersistenceError::Duplicate => StatusCode::CONFLICT,
                PersistenceError::NotFound(_) => StatusCode::NOT_FOUND,
                PersistenceError::InvalidFileName(_) => StatusCode::BAD_REQUEST,
                PersistenceError::InvalidXml => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(rejection: MultipartError) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    errors: BTreeMap<&'static str, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
            format!("An unexpected error occurred: {self}")
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
            self.to_string()
        };

        let errors = match &self {
            Self::Validation(errors) => errors.by_field(),
            _ => BTreeMap::new(),
        };
        let redirect = match &self {
            Self::NotFound { redirect, .. } => *redirect,
            _ => None,
        };

        let body = ErrorBody {
            status: "error",
            message,
            errors,
            redirect,
        };
        (status, Json(body)).into_response()
    }
}
