//! SQLite-backed repository for grade records.

use grades::{DuplicateKey, GradeRecord, SearchMode, StoredGrade};
use sqlx::SqlitePool;
use tracing::info;

use super::helpers::{coalesce, map_unique_violation, parse_date};
use crate::persistence::traits::{GradeListing, GradeStore};
use crate::persistence::PersistenceError;

/// Row type for grade queries, mapped via `sqlx::FromRow`.
#[derive(sqlx::FromRow)]
struct GradeRow {
    id: i64,
    name: String,
    subject: String,
    grade: String,
    date: String,
    teacher: Option<String>,
    cafedra: Option<String>,
}

impl TryFrom<GradeRow> for StoredGrade {
    type Error = PersistenceError;

    fn try_from(r: GradeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            record: GradeRecord {
                name: r.name,
                subject: r.subject,
                grade: r.grade,
                date: parse_date(&r.date)?,
                teacher: coalesce(r.teacher),
                cafedra: coalesce(r.cafedra),
            },
        })
    }
}

/// SQLite implementation of [`GradeStore`] over the `studstat` table.
#[derive(Clone)]
pub struct SqliteGradeRepository {
    pool: SqlitePool,
}

impl SqliteGradeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert `record` unless a row with the same duplicate key exists.
    /// Returns the new row id.
    pub async fn create(&self, record: &GradeRecord) -> Result<i64, PersistenceError> {
        if self.exists(record.duplicate_key()).await? {
            return Err(PersistenceError::Duplicate);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO studstat (name, subject, grade, date, teacher, cafedra)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.name)
        .bind(&record.subject)
        .bind(&record.grade)
        .bind(record.date_string())
        .bind(&record.teacher)
        .bind(&record.cafedra)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        let id = result.last_insert_rowid();
        info!(grade_id = id, "Created grade record");
        Ok(id)
    }

    /// Exact (case-sensitive) match on name, subject, grade and date.
    pub async fn exists(&self, key: DuplicateKey<'_>) -> Result<bool, PersistenceError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM studstat
                WHERE name = ? AND subject = ? AND grade = ? AND date = ?
            )
            "#,
        )
        .bind(key.name)
        .bind(key.subject)
        .bind(key.grade)
        .bind(key.date.format(grades::DATE_FORMAT).to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 != 0)
    }

    /// All rows, newest date first.
    pub async fn list_all(&self) -> Result<Vec<StoredGrade>, PersistenceError> {
        let rows: Vec<GradeRow> = sqlx::query_as(
            r#"
            SELECT id, name, subject, grade, date, teacher, cafedra
            FROM studstat
            ORDER BY date DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredGrade::try_from).collect()
    }

    /// Rows where any field matches `query` case-insensitively, newest first.
    /// An empty query returns every row.
    ///
    /// Matching happens here rather than in SQL because SQLite's `LIKE` and
    /// `lower()` only fold ASCII, and names are mostly Cyrillic.
    pub async fn search(
        &self,
        query: &str,
        mode: SearchMode,
    ) -> Result<Vec<StoredGrade>, PersistenceError> {
        let all = self.list_all().await?;
        if query.is_empty() {
            return Ok(all);
        }
        Ok(all
            .into_iter()
            .filter(|g| g.record.matches(query, mode))
            .collect())
    }

    pub async fn get(&self, id: i64) -> Result<StoredGrade, PersistenceError> {
        let row: Option<GradeRow> = sqlx::query_as(
            r#"
            SELECT id, name, subject, grade, date, teacher, cafedra
            FROM studstat
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => StoredGrade::try_from(row),
            None => Err(PersistenceError::NotFound(format!("Grade {id}"))),
        }
    }

    /// Replace all six fields of row `id`.
    ///
    /// Rejected as a duplicate when another row already holds the same six
    /// values, or when the new values collide with another row's unique key.
    pub async fn update(&self, id: i64, record: &GradeRecord) -> Result<(), PersistenceError> {
        self.get(id).await?;

        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM studstat
                WHERE name = ? AND subject = ? AND grade = ? AND date = ?
                  AND COALESCE(teacher, '') = ? AND COALESCE(cafedra, '') = ?
                  AND id != ?
            )
            "#,
        )
        .bind(&record.name)
        .bind(&record.subject)
        .bind(&record.grade)
        .bind(record.date_string())
        .bind(&record.teacher)
        .bind(&record.cafedra)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        if row.0 != 0 {
            return Err(PersistenceError::Duplicate);
        }

        sqlx::query(
            r#"
            UPDATE studstat
            SET name = ?, subject = ?, grade = ?, date = ?, teacher = ?, cafedra = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.name)
        .bind(&record.subject)
        .bind(&record.grade)
        .bind(record.date_string())
        .bind(&record.teacher)
        .bind(&record.cafedra)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        info!(grade_id = id, "Updated grade record");
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), PersistenceError> {
        let result = sqlx::query("DELETE FROM studstat WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(format!("Grade {id}")));
        }
        info!(grade_id = id, "Deleted grade record");
        Ok(())
    }

    pub async fn count(&self) -> Result<u64, PersistenceError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM studstat")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }
}

impl GradeStore for SqliteGradeRepository {
    async fn save_grade(&self, record: &GradeRecord) -> Result<(), PersistenceError> {
        self.create(record).await.map(|_| ())
    }

    async fn list_grades(&self) -> Result<Vec<GradeListing>, PersistenceError> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .map(GradeListing::from)
            .collect())
    }
}
