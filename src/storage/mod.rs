//! Storage Layer - SQLite-backed relational store
//!
//! System of record is SQLite with tables:
//! - categories(name), publishers(name), tags(name)
//! - authors(name, external_ref, birth_date, death_date, bio)
//! - books(title, price, availability, stock, description, ..., category_id, publisher_id)
//! - quotes(text, author_id, book_source)
//! - book_authors(book_id, author_id), quote_tags(quote_id, tag_id)

pub mod integrity;
pub mod schema;
pub mod sqlite;
pub mod writer;

pub use sqlite::{DbStats, SqliteStore};
pub use writer::Writer;
