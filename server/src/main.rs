//! Gradebook server entry point.
//!
//! With no subcommand, or with `serve`, runs the HTTP service. `migrate`
//! copies a legacy grade database into the current one and exits non-zero
//! if any row failed.

mod config;
mod persistence;
mod service;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigOverrides};
use persistence::sqlite::{migrate_legacy_database, Database, SqliteGradeRepository};
use persistence::{UploadDirectory, XmlLedger};
use service::AppState;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "gradebook-server", about = "Student grade records over HTTP")]
struct Cli {
    /// Optional subcommand. When omitted, runs the server.
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server.
    Serve(ServeArgs),
    /// Copy every row of a legacy database into the current one.
    Migrate {
        /// Path to the legacy SQLite database.
        #[arg(long)]
        legacy: PathBuf,
        /// Destination database (defaults to the configured one).
        #[arg(long)]
        database: Option<PathBuf>,
    },
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Address to listen on, e.g. 127.0.0.1:8000.
    #[arg(long)]
    addr: Option<SocketAddr>,
    /// Path to the grade database.
    #[arg(long)]
    database: Option<PathBuf>,
    /// Directory holding grades.xml and uploaded XML files.
    #[arg(long)]
    xml_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let _guard = init_tracing();

    match cli.command.unwrap_or(Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => {
            serve(args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Migrate { legacy, database } => migrate(legacy, database).await,
    }
}

/// Log to stdout with span durations, and additionally to a daily rolling
/// file when a log directory is configured.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout = fmt::layer().with_span_events(FmtSpan::CLOSE);

    match config::get_log_dir() {
        Some(log_dir) => {
            std::fs::create_dir_all(&log_dir).ok();
            let file_appender = tracing_appender::rolling::daily(&log_dir, "gradebook-server");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(stdout)
                .with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true)
                        .with_line_number(true),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stdout).init();
            None
        }
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = Config::load(ConfigOverrides {
        database_path: args.database,
        xml_directory: args.xml_dir,
        listen_addr: args.addr,
    })?;

    tracing::info!("Starting gradebook server");
    tracing::info!("Using database: {}", config.database_path.display());
    tracing::info!("Using XML directory: {}", config.xml_directory.display());

    let db = Database::open(&config.database_path).await?;
    let uploads = UploadDirectory::new(config.xml_directory.clone());
    uploads.ensure_dir()?;

    let state = AppState::new(
        SqliteGradeRepository::new(db.pool().clone()),
        XmlLedger::new(config.xml_directory.clone()),
        uploads,
    );

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!("Server listening on {}", config.listen_addr);

    axum::serve(listener, service::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}

async fn migrate(legacy: PathBuf, database: Option<PathBuf>) -> anyhow::Result<ExitCode> {
    let config = Config::load(ConfigOverrides {
        database_path: database,
        ..Default::default()
    })?;

    let db = Database::open(&config.database_path).await?;
    let repo = SqliteGradeRepository::new(db.pool().clone());
    let result = migrate_legacy_database(&legacy, &repo).await;
    db.close().await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "Legacy migration failed");
            eprintln!("Migration failed: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("Migration finished");
    println!("  Rows in legacy database: {}", report.total);
    println!("  Migrated:                {}", report.migrated);
    println!("  Skipped (duplicates):    {}", report.skipped);
    println!("  Errors:                  {}", report.errors);
    println!("  Rows now in database:    {}", report.destination_total);

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
