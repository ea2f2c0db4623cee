use std::path::Path;

use grades::GradeRecord;
use tracing::{error, info};

use super::helpers::parse_date;
use super::{Database, SqliteGradeRepository};
use crate::persistence::PersistenceError;

/// Totals for one legacy migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub total: u64,
    pub migrated: u64,
    pub skipped: u64,
    pub errors: u64,
    pub destination_total: u64,
}

impl MigrationReport {
    /// A run succeeds when no row failed; skipped duplicates are fine.
    pub fn is_success(&self) -> bool {
        self.errors == 0
    }
}

/// Row shape of the legacy `studstat` table. The date is read as text so a
/// malformed value fails only its own row.
#[derive(sqlx::FromRow)]
struct LegacyRow {
    name: String,
    subject: String,
    grade: String,
    date: String,
    teacher: Option<String>,
    cafedra: Option<String>,
}

enum RowOutcome {
    Migrated,
    Skipped,
}

/// Copy every row of the legacy database at `legacy_path` into `destination`.
///
/// Rows are processed in insertion order. A row whose duplicate key already
/// exists in the destination is skipped; a row that fails for any other
/// reason is logged and counted, and the run carries on.
pub async fn migrate_legacy_database(
    legacy_path: &Path,
    destination: &SqliteGradeRepository,
) -> Result<MigrationReport, PersistenceError> {
    info!(legacy = %legacy_path.display(), "Starting legacy grade migration");

    let legacy = Database::open_read_only(legacy_path).await?;
    let rows: Vec<LegacyRow> = sqlx::query_as(
        r#"
        SELECT name, subject, grade, CAST(date AS TEXT) AS date, teacher, cafedra
        FROM studstat
        ORDER BY id
        "#,
    )
    .fetch_all(legacy.pool())
    .await?;
    legacy.close().await;

    let total = rows.len();
    let mut report = MigrationReport {
        total: total as u64,
        ..Default::default()
    };

    if total == 0 {
        info!("No legacy rows to migrate");
    } else {
        info!(rows = total, "Loaded legacy rows");
    }

    for (i, row) in rows.into_iter().enumerate() {
        let index = i + 1;
        match migrate_row(row, destination).await {
            Ok(RowOutcome::Migrated) => {
                report.migrated += 1;
                if index % 10 == 0 || index == total {
                    info!(processed = index, total, "Migration progress");
                }
            }
            Ok(RowOutcome::Skipped) => {
                info!(row = index, total, "Duplicate row, skipping");
                report.skipped += 1;
            }
            Err(e) => {
                error!(row = index, error = %e, "Failed to migrate row");
                report.errors += 1;
            }
        }
    }

    report.destination_total = destination.count().await?;

    info!(
        total = report.total,
        migrated = report.migrated,
        skipped = report.skipped,
        errors = report.errors,
        destination_total = report.destination_total,
        "Legacy grade migration completed"
    );

    Ok(report)
}

async fn migrate_row(
    row: LegacyRow,
    destination: &SqliteGradeRepository,
) -> Result<RowOutcome, PersistenceError> {
    let record = GradeRecord::new(
        row.name,
        row.subject,
        row.grade,
        parse_date(&row.date)?,
        row.teacher,
        row.cafedra,
    );

    match destination.create(&record).await {
        Ok(_) => Ok(RowOutcome::Migrated),
        Err(PersistenceError::Duplicate) => Ok(RowOutcome::Skipped),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    type Row<'a> = (&'a str, &'a str, &'a str, &'a str, Option<&'a str>, Option<&'a str>);

    /// Build a legacy database file with the old schema and the given rows.
    async fn write_legacy_db(path: &Path, rows: &[Row<'_>]) {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .unwrap()
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();

        sqlx::query(
            r#"
            CREATE TABLE studstat (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL,
                subject VARCHAR(20) NOT NULL,
                grade VARCHAR(20) NOT NULL,
                date DATE NOT NULL,
                teacher VARCHAR(100) NULL,
                cafedra VARCHAR(100) NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        for &(name, subject, grade, date, teacher, cafedra) in rows {
            sqlx::query(
                "INSERT INTO studstat (name, subject, grade, date, teacher, cafedra) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(name)
            .bind(subject)
            .bind(grade)
            .bind(date)
            .bind(teacher)
            .bind(cafedra)
            .execute(&pool)
            .await
            .unwrap();
        }
        pool.close().await;
    }

    async fn destination() -> (Database, SqliteGradeRepository) {
        let db = Database::new_in_memory().await.unwrap();
        let repo = SqliteGradeRepository::new(db.pool().clone());
        (db, repo)
    }

    fn record(name: &str, grade: &str, date: &str) -> GradeRecord {
        GradeRecord::new(
            name,
            "Математика",
            grade,
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            None,
            None,
        )
    }

    #[tokio::test]
    async fn test_migration_skips_existing_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("db.sqlite3");
        write_legacy_db(
            &legacy,
            &[
                ("Иванов Иван", "Математика", "5", "2024-01-15", None, None),
                ("Петров Пётр", "Математика", "4", "2024-01-16", Some("Сидоров"), None),
                ("Сидорова Анна", "Математика", "3", "2024-01-17", None, Some("ВМ")),
                ("Кузнецов Олег", "Математика", "5", "2024-01-18", None, None),
                ("Смирнова Ольга", "Математика", "зачет", "2024-01-19", None, None),
            ],
        )
        .await;

        let (_db, repo) = destination().await;
        repo.create(&record("Иванов Иван", "5", "2024-01-15"))
            .await
            .unwrap();
        // Teacher differs, key does not: still a duplicate.
        let mut existing = record("Кузнецов Олег", "5", "2024-01-18");
        existing.teacher = "Другой".to_string();
        repo.create(&existing).await.unwrap();

        let report = migrate_legacy_database(&legacy, &repo).await.unwrap();
        assert_eq!(
            report,
            MigrationReport {
                total: 5,
                migrated: 3,
                skipped: 2,
                errors: 0,
                destination_total: 5,
            }
        );
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_migration_coalesces_null_optionals() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("db.sqlite3");
        write_legacy_db(
            &legacy,
            &[("Иванов Иван", "Математика", "5", "2024-01-15", None, Some("ВМ"))],
        )
        .await;

        let (db, repo) = destination().await;
        migrate_legacy_database(&legacy, &repo).await.unwrap();

        let row: (Option<String>, Option<String>) =
            sqlx::query_as("SELECT teacher, cafedra FROM studstat")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(row, (Some(String::new()), Some("ВМ".to_string())));
    }

    #[tokio::test]
    async fn test_bad_row_is_counted_and_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("db.sqlite3");
        write_legacy_db(
            &legacy,
            &[
                ("Иванов Иван", "Математика", "5", "2024-01-15", None, None),
                ("Петров Пётр", "Математика", "4", "15.01.2024", None, None),
                ("Сидорова Анна", "Математика", "3", "2024-01-17", None, None),
            ],
        )
        .await;

        let (_db, repo) = destination().await;
        let report = migrate_legacy_database(&legacy, &repo).await.unwrap();
        assert_eq!(report.migrated, 2);
        assert_eq!(report.errors, 1);
        assert_eq!(report.destination_total, 2);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_empty_legacy_database() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("db.sqlite3");
        write_legacy_db(&legacy, &[]).await;

        let (_db, repo) = destination().await;
        let report = migrate_legacy_database(&legacy, &repo).await.unwrap();
        assert_eq!(report, MigrationReport::default());
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_missing_legacy_database() {
        let dir = tempfile::tempdir().unwrap();
        let (_db, repo) = destination().await;
        let result = migrate_legacy_database(&dir.path().join("db.sqlite3"), &repo).await;
        assert!(matches!(result, Err(PersistenceError::NotFound(_))));
    }
}
