use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use super::{router, AppState};
use crate::persistence::sqlite::{Database, SqliteGradeRepository};
use crate::persistence::{UploadDirectory, XmlLedger};

const BOUNDARY: &str = "gradebook-test-boundary";

struct TestApp {
    app: Router,
    dir: TempDir,
    _db: Database,
}

async fn test_app() -> TestApp {
    let db = Database::new_in_memory().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(
        SqliteGradeRepository::new(db.pool().clone()),
        XmlLedger::new(dir.path().to_path_buf()),
        UploadDirectory::new(dir.path().to_path_buf()),
    );
    TestApp {
        app: router(state),
        dir,
        _db: db,
    }
}

fn encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' => (b as char).to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect()
}

fn form_body(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn post_form(uri: &str, pairs: &[(&str, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form_body(pairs)))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn xhr_get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("X-Requested-With", "XMLHttpRequest")
        .body(Body::empty())
        .unwrap()
}

fn multipart_upload(field: &str, filename: &str, content: impl AsRef<[u8]>) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: application/xml\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content.as_ref());
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    Request::builder()
        .method("POST")
        .uri("/upload/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn ivanov() -> Pairs {
    vec![
        ("name", "Иванов Иван"),
        ("subject", "Математика"),
        ("grade", "5"),
        ("date", "2024-01-15"),
        ("teacher", ""),
        ("cafedra", ""),
        ("save_to", "db"),
    ]
}

type Pairs = Vec<(&'static str, &'static str)>;

/// `pairs` with `key` set to `value`.
fn with(pairs: &[(&'static str, &'static str)], key: &str, value: &'static str) -> Pairs {
    pairs
        .iter()
        .map(|&(k, v)| if k == key { (k, value) } else { (k, v) })
        .collect()
}

const VALID_UPLOAD: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
<StudentsGrades><Grade><StudentName>Петров Пётр</StudentName><Subject>Физика</Subject>\
<GradeValue>4</GradeValue><Date>2024-02-01</Date></Grade></StudentsGrades>";

// ---------------------------------------------------------------------------
// Grade entry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_form_description() {
    let t = test_app().await;
    let (status, body) = send(&t.app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["default_target"], "db");
    assert_eq!(body["fields"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_submit_to_database_then_list() {
    let t = test_app().await;

    let (status, body) = send(&t.app, post_form("/", &ivanov())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "success");
    assert_eq!(body["redirect"], "/grades/");

    let (status, body) = send(&t.app, get("/grades/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_grades"], true);
    assert_eq!(body["from_db"], true);
    assert_eq!(body["current_source"], "db");
    assert_eq!(body["grades"][0]["name"], "Иванов Иван");
    assert_eq!(body["grades"][0]["date"], "2024-01-15");
    assert!(body["grades"][0]["id"].is_i64());
}

#[tokio::test]
async fn test_duplicate_submission_is_a_conflict() {
    let t = test_app().await;
    send(&t.app, post_form("/", &ivanov())).await;

    let (status, body) = send(&t.app, post_form("/", &ivanov())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "This grade already exists in the database");
}

#[tokio::test]
async fn test_invalid_submission_reports_field_errors() {
    let t = test_app().await;
    let pairs = with(&with(&ivanov(), "name", "Ivan 2"), "grade", "6");

    let (status, body) = send(&t.app, post_form("/", &pairs)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["name"].is_string());
    assert!(body["errors"]["grade"].is_string());
    assert!(body["errors"].get("subject").is_none());

    let (_, body) = send(&t.app, get("/grades/")).await;
    assert_eq!(body["has_grades"], false);
}

#[tokio::test]
async fn test_submit_to_xml_ledger() {
    let t = test_app().await;
    let pairs = with(&ivanov(), "save_to", "xml");

    let (status, _) = send(&t.app, post_form("/", &pairs)).await;
    assert_eq!(status, StatusCode::CREATED);
    // The ledger does not reject repeats.
    let (status, _) = send(&t.app, post_form("/", &pairs)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(t.dir.path().join("grades.xml").exists());

    let (_, body) = send(&t.app, get("/grades/?source=xml")).await;
    assert_eq!(body["from_db"], false);
    assert_eq!(body["current_source"], "xml");
    let grades = body["grades"].as_array().unwrap();
    assert_eq!(grades.len(), 2);
    assert!(grades[0].get("id").is_none());
    assert_eq!(grades[0]["teacher"], "");

    let (_, body) = send(&t.app, get("/grades/?source=db")).await;
    assert_eq!(body["has_grades"], false);
}

#[tokio::test]
async fn test_unknown_source_is_rejected() {
    let t = test_app().await;
    let (status, body) = send(&t.app, get("/grades/?source=csv")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_ajax_search_requires_xhr_marker() {
    let t = test_app().await;
    let (status, body) = send(&t.app, get("/ajax-search/?q=x")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, serde_json::json!({ "error": "Invalid request" }));
}

#[tokio::test]
async fn test_ajax_search_results() {
    let t = test_app().await;
    send(&t.app, post_form("/", &ivanov())).await;
    let other = with(&with(&ivanov(), "name", "Петров Пётр"), "cafedra", "ВМ");
    send(&t.app, post_form("/", &other)).await;

    let uri = format!("/ajax-search/?q={}", encode("  ИВАН "));
    let (status, body) = send(&t.app, xhr_get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "ИВАН");
    let grades = body["grades"].as_array().unwrap();
    assert_eq!(grades.len(), 1);
    assert_eq!(grades[0]["name"], "Иванов Иван");
    assert_eq!(grades[0]["teacher"], "-");
    assert_eq!(grades[0]["cafedra"], "-");
    assert_eq!(grades[0]["date"], "2024-01-15");

    let (_, body) = send(&t.app, xhr_get("/ajax-search/?q=")).await;
    assert!(body.get("query").is_none());
    assert_eq!(body["grades"].as_array().unwrap().len(), 2);

    let (_, body) = send(&t.app, xhr_get("/ajax-search/?q=01-15")).await;
    assert_eq!(body["grades"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_search_page_matches_prefixes() {
    let t = test_app().await;
    send(&t.app, post_form("/", &ivanov())).await;

    let uri = format!("/search/?q={}", encode("иванов"));
    let (status, body) = send(&t.app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_grades"], true);

    let uri = format!("/search/?q={}", encode("ванов"));
    let (_, body) = send(&t.app, get(&uri)).await;
    assert_eq!(body["has_grades"], false);
}

// ---------------------------------------------------------------------------
// Edit and delete
// ---------------------------------------------------------------------------

async fn first_id(app: &Router) -> i64 {
    let (_, body) = send(app, get("/grades/")).await;
    body["grades"][0]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_edit_record() {
    let t = test_app().await;
    send(&t.app, post_form("/", &ivanov())).await;
    let id = first_id(&t.app).await;

    let (status, body) = send(&t.app, get(&format!("/edit/{id}/"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["form"]["date"], "2024-01-15");

    let pairs = with(&ivanov(), "grade", "4");
    let (status, body) = send(&t.app, post_form(&format!("/edit/{id}/"), &pairs)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["redirect"], "/grades/");

    let (_, body) = send(&t.app, get("/grades/")).await;
    assert_eq!(body["grades"][0]["grade"], "4");
    assert_eq!(body["grades"][0]["id"], id);
}

#[tokio::test]
async fn test_edit_into_existing_record_is_a_conflict() {
    let t = test_app().await;
    send(&t.app, post_form("/", &ivanov())).await;
    let other = with(&ivanov(), "grade", "4");
    send(&t.app, post_form("/", &other)).await;
    // Same date, so the newest record is listed first.
    let other_id = first_id(&t.app).await;

    let (status, _) = send(&t.app, post_form(&format!("/edit/{other_id}/"), &ivanov())).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_edit_missing_record() {
    let t = test_app().await;

    let (status, body) = send(&t.app, get("/edit/99/")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["redirect"], "/grades/");

    // Not found wins over an invalid form.
    let (status, _) = send(&t.app, post_form("/edit/99/", &[("name", "1")])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_edit_rejects_invalid_values() {
    let t = test_app().await;
    send(&t.app, post_form("/", &ivanov())).await;
    let id = first_id(&t.app).await;

    let pairs = with(&ivanov(), "date", "15.01.2024");
    let (status, body) = send(&t.app, post_form(&format!("/edit/{id}/"), &pairs)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["date"].is_string());
}

#[tokio::test]
async fn test_delete_record() {
    let t = test_app().await;
    send(&t.app, post_form("/", &ivanov())).await;
    let id = first_id(&t.app).await;

    let (status, body) = send(&t.app, get(&format!("/delete/{id}/"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["grade"]["name"], "Иванов Иван");

    let (status, _) = send(&t.app, post_form(&format!("/delete/{id}/"), &[])).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&t.app, post_form(&format!("/delete/{id}/"), &[])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&t.app, get("/grades/")).await;
    assert_eq!(body["has_grades"], false);
}

// ---------------------------------------------------------------------------
// Uploaded files
// ---------------------------------------------------------------------------

fn xml_files(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".xml"))
        .collect()
}

#[tokio::test]
async fn test_upload_valid_file() {
    let t = test_app().await;

    let (status, body) = send(
        &t.app,
        multipart_upload("xml_file", "march.xml", VALID_UPLOAD),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["redirect"], "/files/");
    assert!(body["message"].as_str().unwrap().contains("march.xml"));
    let stored = body["filename"].as_str().unwrap().to_string();
    assert!(stored.starts_with("grades_") && stored.ends_with(".xml"));
    assert_eq!(xml_files(t.dir.path()), vec![stored.clone()]);

    let (status, body) = send(&t.app, get("/files/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_files"], true);
    let file = &body["files_data"][0];
    assert_eq!(file["filename"], stored.as_str());
    assert_eq!(file["is_valid"], true);
    assert_eq!(file["grades_count"], 1);
    assert_eq!(file["grades"][0]["name"], "Петров Пётр");
    assert!(file["grades"][0].get("teacher").is_none());
}

#[tokio::test]
async fn test_upload_windows_1251_file_is_accepted() {
    let t = test_app().await;
    let doc = "<?xml version=\"1.0\" encoding=\"windows-1251\"?>\
               <StudentsGrades><Grade><StudentName>Петров Пётр</StudentName>\
               <GradeValue>зачет</GradeValue></Grade></StudentsGrades>";
    let (bytes, _, _) = encoding_rs::WINDOWS_1251.encode(doc);

    let (status, body) = send(
        &t.app,
        multipart_upload("xml_file", "cp1251.xml", &*bytes),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let stored = body["filename"].as_str().unwrap().to_string();
    assert_eq!(xml_files(t.dir.path()), vec![stored.clone()]);

    let (status, body) = send(&t.app, get(&format!("/files/{stored}/"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["grades"][0]["name"], "Петров Пётр");
    assert_eq!(body["grades"][0]["grade"], "зачет");
}

#[tokio::test]
async fn test_upload_invalid_file_is_removed() {
    let t = test_app().await;

    let (status, body) = send(
        &t.app,
        multipart_upload("xml_file", "broken.xml", "<StudentsGrades><Grade>"),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], "error");
    assert!(xml_files(t.dir.path()).is_empty());
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let t = test_app().await;
    let (status, _) = send(
        &t.app,
        multipart_upload("other", "march.xml", VALID_UPLOAD),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(xml_files(t.dir.path()).is_empty());
}

#[tokio::test]
async fn test_view_file() {
    let t = test_app().await;
    std::fs::write(t.dir.path().join("march.xml"), VALID_UPLOAD).unwrap();
    std::fs::write(t.dir.path().join("broken.xml"), "<a><b></a>").unwrap();

    let (status, body) = send(&t.app, get("/files/march.xml/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filename"], "march.xml");
    assert_eq!(body["has_grades"], true);
    assert_eq!(body["grades"][0]["grade"], "4");

    let (status, _) = send(&t.app, get("/files/broken.xml/")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(&t.app, get("/files/absent.xml/")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["redirect"], "/files/");
}

#[tokio::test]
async fn test_download_file() {
    let t = test_app().await;
    std::fs::write(t.dir.path().join("march.xml"), VALID_UPLOAD).unwrap();

    let response = t
        .app
        .clone()
        .oneshot(get("/download/march.xml/"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/xml"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"march.xml\""
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], VALID_UPLOAD.as_bytes());
}

#[tokio::test]
async fn test_download_checks() {
    let t = test_app().await;
    std::fs::write(t.dir.path().join("notes.txt"), "hello").unwrap();

    let (status, _) = send(&t.app, get("/download/absent.xml/")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&t.app, get("/download/notes.txt/")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&t.app, get("/download/..%2Fsecret.xml/")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
