//! SQLite-backed record store.
//!
//! ## Database setup
//!
//! [`Database`] wraps a `sqlx::SqlitePool` configured with:
//! - **WAL mode**: one writer and multiple concurrent readers.
//! - **Embedded migrations**: `sqlx::migrate!` runs `migrations/001_initial_schema.sql`
//!   automatically when [`Database::open`] is called. The schema is idempotent.
//!
//! ## Repository
//!
//! [`SqliteGradeRepository`] owns a pool clone and implements
//! [`GradeStore`](crate::persistence::GradeStore) on top of the `studstat`
//! table. Dates are stored as `YYYY-MM-DD` text.
//!
//! ## Legacy migration
//!
//! [`migrate_legacy_database`] copies every row of a legacy `studstat` table
//! into the primary store, skipping rows whose duplicate key already exists.
//! It never aborts on a bad row; failures are counted in the report.

mod database;
mod grade_repo;
pub(crate) mod helpers;
mod migrate_legacy;

pub use database::Database;
pub use grade_repo::SqliteGradeRepository;
pub use migrate_legacy::migrate_legacy_database;
