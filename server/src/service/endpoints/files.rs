//! XML upload, listing, preview and download endpoints

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::PathRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::info;

use crate::persistence::{PersistenceError, UploadDirectory};
use crate::service::converters::{FileDetailPage, FileEntry, FilesPage, UploadFormPage};
use crate::service::{ApiError, AppState, Outcome, MAX_BODY_BYTES};

const FILES_LIST: &str = "/files/";
const UPLOAD_FIELD: &str = "xml_file";
const XML_CONTENT_TYPE: &str = "application/xml";

pub async fn upload_form() -> Json<UploadFormPage> {
    Json(UploadFormPage {
        field: UPLOAD_FIELD,
        accept: ".xml",
        max_bytes: MAX_BODY_BYTES,
    })
}

/// Stream the `xml_file` field to a freshly named file, then keep it only if
/// it is well-formed XML.
pub async fn upload_xml(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Outcome>), ApiError> {
    let mut multipart = multipart?;

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let original = field.file_name().unwrap_or(UPLOAD_FIELD).to_string();
        info!(original = %original, "HTTP upload_xml");

        let mut pending = state.uploads.begin_upload().await?;
        loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    pending.abort().await;
                    return Err(e.into());
                }
            };
            if let Err(e) = pending.write_chunk(&chunk).await {
                pending.abort().await;
                return Err(e.into());
            }
        }

        let stored = pending.finish().await?;
        let outcome = Outcome::success(format!("File {original} uploaded and validated"))
            .redirect(FILES_LIST)
            .filename(stored.filename);
        return Ok((StatusCode::CREATED, Json(outcome)));
    }

    Err(ApiError::BadRequest(format!(
        "Missing file field '{UPLOAD_FIELD}'"
    )))
}

pub async fn xml_files_list(State(state): State<AppState>) -> Result<Json<FilesPage>, ApiError> {
    info!("HTTP xml_files_list");

    let files_data: Vec<FileEntry> = state
        .uploads
        .list_files()?
        .into_iter()
        .map(|info| {
            let grades = UploadDirectory::extract_records(&info.path);
            FileEntry::new(info, grades)
        })
        .collect();

    Ok(Json(FilesPage {
        has_files: !files_data.is_empty(),
        files_data,
    }))
}

pub async fn view_xml_file(
    State(state): State<AppState>,
    filename: Result<Path<String>, PathRejection>,
) -> Result<Json<FileDetailPage>, ApiError> {
    let Path(filename) = filename?;
    info!(filename = %filename, "HTTP view_xml_file");

    let path = state.uploads.resolve(&filename)?;
    if !path.is_file() {
        return Err(ApiError::not_found("File not found").redirect_to(FILES_LIST));
    }
    if !UploadDirectory::validate(&path) {
        return Err(ApiError::Unprocessable(
            "The file is not valid XML".to_string(),
        ));
    }

    let grades = UploadDirectory::extract_records(&path);
    Ok(Json(FileDetailPage {
        filename,
        has_grades: !grades.is_empty(),
        grades,
    }))
}

pub async fn download_xml_file(
    State(state): State<AppState>,
    filename: Result<Path<String>, PathRejection>,
) -> Result<Response, ApiError> {
    let Path(filename) = filename?;
    info!(filename = %filename, "HTTP download_xml_file");

    let path = state.uploads.resolve(&filename)?;
    if !path.is_file() {
        return Err(ApiError::not_found("File not found").redirect_to(FILES_LIST));
    }
    if !filename.ends_with(".xml") {
        return Err(ApiError::BadRequest("The file is not XML".to_string()));
    }

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(PersistenceError::from)?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        filename.replace('"', "")
    );
    let disposition = HeaderValue::from_bytes(disposition.as_bytes())
        .map_err(|_| ApiError::BadRequest("Invalid file name".to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(XML_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
