//! # booksdb - normalized store for scraped bibliographic data
//!
//! Book listings, quotes, authors and tags scraped from a catalogue site are
//! loaded into a relational schema with explicit association tables.
//!
//! booksdb provides:
//! - SQLite-backed storage with referential and uniqueness guarantees
//! - Idempotent upserts keyed by natural identifiers
//! - Normalization helpers for raw scraped text
//! - An ingestion driver with per-record transactions and a run report
//! - The illustrative read queries (books per author, category price stats)

pub mod model;
pub mod storage;
pub mod normalize;
pub mod ingest;
pub mod report;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use config::{BooksDbConfig, StoreConfig};
pub use ingest::{IngestOptions, IngestReport, Ingestor, OnError, RecordSet, Scraped};
pub use model::{AuthorId, BookId, CategoryId, Constraint, NewAuthor, NewBook, NewQuote, PublisherId, QuoteId, Table, TagId};
pub use storage::SqliteStore;

/// Result type alias for booksdb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for booksdb operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("Connection error ({target}): {source}")]
    Connection {
        target: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid value: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Run aborted at {record}: {source}")]
    Aborted {
        record: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// True for violations that only concern the record being written.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Error::Integrity(_))
    }

    /// The violated constraint, when this is an integrity error.
    pub fn constraint(&self) -> Option<Constraint> {
        match self {
            Error::Integrity(e) => Some(e.constraint()),
            Error::Aborted { source, .. } => source.constraint(),
            _ => None,
        }
    }

    /// Errors that must end an ingestion run regardless of policy.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Connection { .. } | Error::Storage(_) | Error::Io(_) | Error::Aborted { .. }
        )
    }
}

/// A constraint of the relational model was violated.
///
/// Each variant names the violated [`Constraint`] and the natural key of the
/// offending record so a failed row can be corrected and re-ingested.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error("referential constraint {constraint} violated by {key}")]
    Referential { constraint: Constraint, key: String },

    #[error("uniqueness constraint {constraint} violated by {key}")]
    Uniqueness { constraint: Constraint, key: String },

    #[error("check constraint {constraint} violated by {key}")]
    Check { constraint: Constraint, key: String },
}

impl IntegrityError {
    pub fn referential(constraint: Constraint, key: impl Into<String>) -> Self {
        IntegrityError::Referential { constraint, key: key.into() }
    }

    pub fn uniqueness(constraint: Constraint, key: impl Into<String>) -> Self {
        IntegrityError::Uniqueness { constraint, key: key.into() }
    }

    pub fn check(constraint: Constraint, key: impl Into<String>) -> Self {
        IntegrityError::Check { constraint, key: key.into() }
    }

    pub fn constraint(&self) -> Constraint {
        match self {
            IntegrityError::Referential { constraint, .. }
            | IntegrityError::Uniqueness { constraint, .. }
            | IntegrityError::Check { constraint, .. } => *constraint,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            IntegrityError::Referential { key, .. }
            | IntegrityError::Uniqueness { key, .. }
            | IntegrityError::Check { key, .. } => key,
        }
    }
}
