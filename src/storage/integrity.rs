//! Mapping of SQLite constraint failures onto [`IntegrityError`]
//!
//! Writes pre-check the constraints they can name precisely; the schema's own
//! constraints remain as a backstop, and their failures are classified here.

use crate::model::Constraint;
use crate::{Error, IntegrityError, Result};
use rusqlite::{ErrorCode, ffi};

/// Attach the constraint a statement guards to its constraint failures.
pub trait ConstraintExt<T> {
    fn or_constraint<K>(self, constraint: Constraint, key: K) -> Result<T>
    where
        K: FnOnce() -> String;
}

impl<T> ConstraintExt<T> for rusqlite::Result<T> {
    fn or_constraint<K>(self, constraint: Constraint, key: K) -> Result<T>
    where
        K: FnOnce() -> String,
    {
        self.map_err(|err| classify(err, constraint, key))
    }
}

/// Extended result code of a constraint failure, if `err` is one
pub fn constraint_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            Some(e.extended_code)
        }
        _ => None,
    }
}

/// Convert a rusqlite error, classifying constraint failures by kind.
pub fn classify<K>(err: rusqlite::Error, constraint: Constraint, key: K) -> Error
where
    K: FnOnce() -> String,
{
    let Some(code) = constraint_code(&err) else {
        return Error::Storage(err);
    };

    let key = key();
    tracing::debug!("constraint failure {} on {}: {}", code, constraint, err);
    let integrity = match code {
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => IntegrityError::referential(constraint, key),
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
            IntegrityError::uniqueness(constraint, key)
        }
        _ => IntegrityError::check(constraint, key),
    };
    Error::Integrity(integrity)
}
