//! Configuration for the gradebook server
//!
//! Every setting is resolved with the following precedence:
//! 1. Command-line flag
//! 2. Environment variable (`GRADEBOOK_DATABASE`, `GRADEBOOK_XML_DIR`, `GRADEBOOK_ADDR`)
//! 3. A default under the data directory
//!
//! The data directory itself is `GRADEBOOK_DATA_DIR`, else the platform data
//! directory, else `./data` for development.

use std::net::SocketAddr;
use std::path::PathBuf;

const DATA_DIR_ENV: &str = "GRADEBOOK_DATA_DIR";
const DATABASE_ENV: &str = "GRADEBOOK_DATABASE";
const XML_DIR_ENV: &str = "GRADEBOOK_XML_DIR";
const ADDR_ENV: &str = "GRADEBOOK_ADDR";
const LOG_DIR_ENV: &str = "GRADEBOOK_LOG_DIR";

const DEV_DATA_DIR: &str = "./data";
const DATABASE_FILE: &str = "gradebook.db";
const XML_SUBDIR: &str = "grades_xml";
const DEFAULT_ADDR: &str = "127.0.0.1:8000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid listen address {value:?}: {source}")]
    InvalidAddr {
        value: String,
        source: std::net::AddrParseError,
    },
}

/// Settings passed explicitly into the stores and the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_path: PathBuf,
    pub xml_directory: PathBuf,
    pub listen_addr: SocketAddr,
}

/// Values given on the command line, if any.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_path: Option<PathBuf>,
    pub xml_directory: Option<PathBuf>,
    pub listen_addr: Option<SocketAddr>,
}

impl Config {
    /// Resolve the configuration from `overrides` and the process environment.
    pub fn load(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve(overrides, |key| std::env::var(key).ok())
    }

    fn resolve(
        overrides: ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let data_dir = env(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let database_path = overrides
            .database_path
            .or_else(|| env(DATABASE_ENV).map(PathBuf::from))
            .unwrap_or_else(|| data_dir.join(DATABASE_FILE));

        let xml_directory = overrides
            .xml_directory
            .or_else(|| env(XML_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| data_dir.join(XML_SUBDIR));

        let listen_addr = match overrides.listen_addr {
            Some(addr) => addr,
            None => {
                let value = env(ADDR_ENV).unwrap_or_else(|| DEFAULT_ADDR.to_string());
                value
                    .parse::<SocketAddr>()
                    .map_err(|source| ConfigError::InvalidAddr { value, source })?
            }
        };

        Ok(Self {
            database_path,
            xml_directory,
            listen_addr,
        })
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "gradebook")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(DEV_DATA_DIR))
}

/// Directory for rolling log files, when file logging is enabled.
pub fn get_log_dir() -> Option<PathBuf> {
    std::env::var(LOG_DIR_ENV).ok().map(PathBuf::from)
}
