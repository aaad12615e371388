use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::{IngestOptions, OnError};

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Settings read from `booksdb.toml`. Every field is optional; CLI flags win.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BooksDbConfig {
    pub database: Option<String>,
    pub busy_timeout_ms: Option<u64>,
    pub on_error: Option<OnError>,
    /// Publisher assigned to book records that do not name one
    pub default_publisher: Option<String>,
}

impl BooksDbConfig {
    /// Database path: explicit override, then config, then the default
    pub fn database_path(&self, cli_override: Option<&Path>) -> PathBuf {
        cli_override
            .map(Path::to_path_buf)
            .or_else(|| self.database.as_ref().map(PathBuf::from))
            .unwrap_or_else(default_database_path)
    }

    pub fn store_config(&self, cli_override: Option<&Path>) -> StoreConfig {
        StoreConfig::file(self.database_path(cli_override))
            .busy_timeout(Duration::from_millis(self.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS)))
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            on_error: self.on_error.unwrap_or_default(),
            default_publisher: self.default_publisher.clone(),
        }
    }
}

/// Where the store keeps its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

impl std::fmt::Display for DatabaseLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseLocation::File(path) => write!(f, "{}", path.display()),
            DatabaseLocation::Memory => write!(f, ":memory:"),
        }
    }
}

/// Connection parameters handed to [`SqliteStore::connect`](crate::SqliteStore::connect)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub location: DatabaseLocation,
    /// How long a writer waits on a locked database before failing
    pub busy_timeout: Duration,
    pub create_if_missing: bool,
}

impl StoreConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: DatabaseLocation::File(path.into()),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            create_if_missing: true,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: DatabaseLocation::Memory,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            create_if_missing: true,
        }
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("booksdb.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from("books.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<BooksDbConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: BooksDbConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &BooksDbConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
