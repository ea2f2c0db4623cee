//! Grade entry, listing, search, edit and delete endpoints

use axum::extract::rejection::{FormRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use grades::{GradeForm, SearchMode};
use serde::Deserialize;
use tracing::info;

use crate::persistence::{GradeListing, GradeStore, StorageTarget};
use crate::service::converters::{
    grade_form_fields, AjaxGrade, AjaxSearchResults, DeletePage, EditPage, GradesPage,
    SearchPage, StudentFormPage,
};
use crate::service::{ApiError, AppState, Outcome};

const GRADES_LIST: &str = "/grades/";
const XHR_HEADER: &str = "x-requested-with";
const XHR_VALUE: &str = "XMLHttpRequest";

/// The entry form plus the chosen storage target.
#[derive(Debug, Deserialize)]
pub struct GradeSubmission {
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
    #[serde(default)]
    pub save_to: StorageTarget,
}

impl GradeSubmission {
    fn into_parts(self) -> (GradeForm, StorageTarget) {
        let form = GradeForm {
            name: self.name,
            subject: self.subject,
            grade: self.grade,
            date: self.date,
            teacher: self.teacher,
            cafedra: self.cafedra,
        };
        (form, self.save_to)
    }
}

#[derive(Debug, Deserialize)]
pub struct SourceParams {
    #[serde(default)]
    pub source: StorageTarget,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

pub async fn student_form() -> Json<StudentFormPage> {
    Json(StudentFormPage {
        fields: grade_form_fields(),
        save_targets: [
            StorageTarget::Database.as_str(),
            StorageTarget::Xml.as_str(),
        ],
        default_target: StorageTarget::default().as_str(),
    })
}

pub async fn submit_grade(
    State(state): State<AppState>,
    form: Result<Form<GradeSubmission>, FormRejection>,
) -> Result<(StatusCode, Json<Outcome>), ApiError> {
    let Form(submission) = form?;
    let (form, target) = submission.into_parts();
    info!(target = target.as_str(), "HTTP submit_grade");

    let record = form.validate().map_err(ApiError::Validation)?;
    let message = match target {
        StorageTarget::Database => {
            state.grades.save_grade(&record).await?;
            "Grade saved to the database"
        }
        StorageTarget::Xml => {
            state.ledger.save_grade(&record).await?;
            "Grade saved to the XML file"
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(Outcome::success(message).redirect(GRADES_LIST)),
    ))
}

pub async fn grades_list(
    State(state): State<AppState>,
    params: Result<Query<SourceParams>, QueryRejection>,
) -> Result<Json<GradesPage>, ApiError> {
    let Query(params) = params?;
    info!(source = params.source.as_str(), "HTTP grades_list");

    let grades: Vec<GradeListing> = match params.source {
        StorageTarget::Database => state.grades.list_grades().await?,
        StorageTarget::Xml => state.ledger.list_grades().await?,
    };

    Ok(Json(GradesPage::new(grades, params.source)))
}

pub async fn search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchPage>, ApiError> {
    let Query(params) = params?;
    let query = params.q.trim().to_string();
    info!(query = %query, "HTTP search");

    let grades: Vec<GradeListing> = state
        .grades
        .search(&query, SearchMode::StartsWith)
        .await?
        .into_iter()
        .map(GradeListing::from)
        .collect();

    Ok(Json(SearchPage {
        has_grades: !grades.is_empty(),
        query,
        grades,
    }))
}

fn is_xhr(headers: &HeaderMap) -> bool {
    headers.get(XHR_HEADER).and_then(|v| v.to_str().ok()) == Some(XHR_VALUE)
}

/// Live search over every field of the record store. Only answers requests
/// marked as XHR.
pub async fn ajax_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    if !is_xhr(&headers) {
        let body = serde_json::json!({ "error": "Invalid request" });
        return Ok((StatusCode::BAD_REQUEST, Json(body)).into_response());
    }

    let Query(params) = params?;
    let query = params.q.trim();
    info!(query = %query, "HTTP ajax_search");

    let grades = state
        .grades
        .search(query, SearchMode::Contains)
        .await?
        .into_iter()
        .map(AjaxGrade::from)
        .collect();

    let results = AjaxSearchResults {
        grades,
        query: (!query.is_empty()).then(|| query.to_string()),
    };
    Ok(Json(results).into_response())
}

pub async fn edit_form(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<EditPage>, ApiError> {
    let Path(id) = id?;
    info!(id, "HTTP edit_form");

    let stored = state
        .grades
        .get(id)
        .await
        .map_err(|e| ApiError::from(e).redirect_to(GRADES_LIST))?;
    Ok(Json(EditPage::from(stored)))
}

pub async fn edit_grade(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    form: Result<Form<GradeForm>, FormRejection>,
) -> Result<Json<Outcome>, ApiError> {
    let Path(id) = id?;
    let Form(form) = form?;
    info!(id, "HTTP edit_grade");

    // A missing record wins over an invalid form.
    state
        .grades
        .get(id)
        .await
        .map_err(|e| ApiError::from(e).redirect_to(GRADES_LIST))?;

    let record = form.validate().map_err(ApiError::Validation)?;
    state
        .grades
        .update(id, &record)
        .await
        .map_err(|e| ApiError::from(e).redirect_to(GRADES_LIST))?;

    Ok(Json(
        Outcome::success("Grade updated").redirect(GRADES_LIST),
    ))
}

pub async fn delete_confirm(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<DeletePage>, ApiError> {
    let Path(id) = id?;
    info!(id, "HTTP delete_confirm");

    let stored = state
        .grades
        .get(id)
        .await
        .map_err(|e| ApiError::from(e).redirect_to(GRADES_LIST))?;
    Ok(Json(DeletePage {
        grade: stored.into(),
    }))
}

pub async fn delete_grade(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Outcome>, ApiError> {
    let Path(id) = id?;
    info!(id, "HTTP delete_grade");

    state
        .grades
        .delete(id)
        .await
        .map_err(|e| ApiError::from(e).redirect_to(GRADES_LIST))?;

    Ok(Json(
        Outcome::success("Grade deleted").redirect(GRADES_LIST),
    ))
}
