//! Shared conversions between SQLite values and grade types.

use chrono::NaiveDate;
use grades::DATE_FORMAT;

use crate::persistence::PersistenceError;

/// Map a UNIQUE constraint failure onto [`PersistenceError::Duplicate`].
pub fn map_unique_violation(err: sqlx::Error) -> PersistenceError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return PersistenceError::Duplicate;
        }
    }
    PersistenceError::Sqlx(err)
}

/// Parse a `YYYY-MM-DD` date column read as text.
pub fn parse_date(raw: &str) -> Result<NaiveDate, PersistenceError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|e| PersistenceError::InvalidData(format!("bad date {raw:?}: {e}")))
}

/// Nullable text column to the normalized empty-string form.
pub fn coalesce(value: Option<String>) -> String {
    value.unwrap_or_default()
}
