//! Write operations shared by the store and its transactions
//!
//! A [`Writer`] borrows either the store's connection or an open
//! transaction, so the same upserts run standalone or grouped per record.

use rusqlite::{Connection, OptionalExtension, params};

use super::integrity::ConstraintExt;
use crate::normalize::clean_name;
use crate::model::{
    AuthorId, BookId, CategoryId, Constraint, NewAuthor, NewBook, NewQuote, PublisherId, QuoteId, Table, TagId,
};
use crate::{IntegrityError, Result};

/// Upserts and association links over a borrowed connection
pub struct Writer<'c> {
    conn: &'c Connection,
}

impl<'c> Writer<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    // ========== Named Entities ==========

    /// Return the category id for `name`, creating the row if needed
    pub fn upsert_category(&self, name: &str) -> Result<CategoryId> {
        self.upsert_named(Table::Categories, Constraint::CategoryName, name)
            .map(CategoryId)
    }

    /// Return the publisher id for `name`, creating the row if needed
    pub fn upsert_publisher(&self, name: &str) -> Result<PublisherId> {
        self.upsert_named(Table::Publishers, Constraint::PublisherName, name)
            .map(PublisherId)
    }

    /// Return the tag id for `name`, creating the row if needed
    pub fn upsert_tag(&self, name: &str) -> Result<TagId> {
        self.upsert_named(Table::Tags, Constraint::TagName, name).map(TagId)
    }

    /// Insert-or-read on a table with a unique `name` column.
    ///
    /// Names are stored with collapsed whitespace. A concurrent writer
    /// inserting the same name makes our insert a no-op, and the re-read
    /// below returns its row.
    fn upsert_named(&self, table: Table, constraint: Constraint, name: &str) -> Result<i64> {
        let name = clean_name(name);
        let name = name.as_str();
        let key = || format!("{} {:?}", table, name);
        if name.is_empty() {
            return Err(IntegrityError::check(constraint, key()).into());
        }

        let inserted = self
            .conn
            .execute(
                &format!("INSERT INTO {} (name) VALUES (?1) ON CONFLICT(name) DO NOTHING", table),
                [name],
            )
            .or_constraint(constraint, key)?;

        let id: i64 = self
            .conn
            .query_row(&format!("SELECT id FROM {} WHERE name = ?1", table), [name], |row| row.get(0))
            .optional()?
            .ok_or_else(|| IntegrityError::uniqueness(constraint, key()))?;

        if inserted > 0 {
            tracing::debug!("Created {} {:?} (id {})", table, name, id);
        }
        Ok(id)
    }

    // ========== Authors ==========

    /// Upsert an author by name, merging any supplied enrichment fields.
    ///
    /// Fields left `None` keep their stored value. A different non-null
    /// external reference replaces the stored one.
    pub fn upsert_author(&self, author: &NewAuthor) -> Result<AuthorId> {
        author.validate()?;
        let name = clean_name(&author.name);
        let key = || format!("author {:?}", name);

        let previous: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT external_ref FROM authors WHERE name = ?1",
                [&name],
                |row| row.get(0),
            )
            .optional()?;

        if let (Some(Some(old)), Some(new)) = (&previous, non_blank(&author.external_ref)) {
            if old != new {
                tracing::warn!(
                    "External reference for author {:?} changed from {} to {}",
                    name,
                    old,
                    new
                );
            }
        }

        self.conn
            .execute(
                r#"
                INSERT INTO authors (name, external_ref, birth_date, death_date, bio)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(name) DO UPDATE SET
                    external_ref = COALESCE(excluded.external_ref, authors.external_ref),
                    birth_date = COALESCE(excluded.birth_date, authors.birth_date),
                    death_date = COALESCE(excluded.death_date, authors.death_date),
                    bio = COALESCE(excluded.bio, authors.bio),
                    updated_at = CURRENT_TIMESTAMP
                "#,
                params![
                    name,
                    non_blank(&author.external_ref),
                    non_blank(&author.birth_date),
                    non_blank(&author.death_date),
                    non_blank(&author.bio),
                ],
            )
            .or_constraint(Constraint::AuthorName, key)?;

        let id = self
            .conn
            .query_row("SELECT id FROM authors WHERE name = ?1", [&name], |row| row.get(0))?;

        if previous.is_none() {
            tracing::debug!("Created author {:?} (id {})", name, id);
        }
        Ok(AuthorId(id))
    }

    // ========== Books ==========

    /// Upsert a book keyed by (title, publisher_id).
    ///
    /// An existing row takes the new price, category and description.
    /// Stock and availability are replaced together, and only when the stock
    /// is known; other optional columns are only replaced by known values.
    pub fn upsert_book(&self, book: &NewBook) -> Result<BookId> {
        book.validate()?;
        let title = clean_name(&book.title);

        if !self.exists(Table::Categories, book.category_id.get())? {
            return Err(IntegrityError::referential(
                Constraint::BookCategory,
                format!("{} with category {}", book.key(), book.category_id),
            )
            .into());
        }
        if !self.exists(Table::Publishers, book.publisher_id.get())? {
            return Err(IntegrityError::referential(Constraint::BookPublisher, book.key()).into());
        }

        self.conn
            .execute(
                r#"
                INSERT INTO books (title, price, availability, stock, description, rating,
                                   upc, image_url, publication_year, category_id, publisher_id)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(title, publisher_id) DO UPDATE SET
                    price = excluded.price,
                    availability = CASE WHEN ?12 IS NULL THEN books.availability ELSE excluded.availability END,
                    stock = COALESCE(?12, books.stock),
                    description = excluded.description,
                    rating = COALESCE(excluded.rating, books.rating),
                    upc = COALESCE(excluded.upc, books.upc),
                    image_url = COALESCE(excluded.image_url, books.image_url),
                    publication_year = COALESCE(excluded.publication_year, books.publication_year),
                    category_id = excluded.category_id,
                    updated_at = CURRENT_TIMESTAMP
                "#,
                params![
                    title,
                    book.price,
                    non_blank(&book.availability),
                    book.stock.unwrap_or(0),
                    book.description,
                    book.rating,
                    non_blank(&book.upc),
                    non_blank(&book.image_url),
                    book.publication_year,
                    book.category_id,
                    book.publisher_id,
                    book.stock,
                ],
            )
            .or_constraint(Constraint::BookNaturalKey, || book.key())?;

        let id = self.conn.query_row(
            "SELECT id FROM books WHERE title = ?1 AND publisher_id = ?2",
            params![title, book.publisher_id],
            |row| row.get(0),
        )?;
        Ok(BookId(id))
    }

    /// Link a book to an author. Returns `false` if the pair already existed.
    pub fn link_book_author(&self, book_id: BookId, author_id: AuthorId) -> Result<bool> {
        let key = || format!("book {} / author {}", book_id, author_id);
        if !self.exists(Table::Books, book_id.get())? {
            return Err(IntegrityError::referential(Constraint::BookAuthorBook, key()).into());
        }
        if !self.exists(Table::Authors, author_id.get())? {
            return Err(IntegrityError::referential(Constraint::BookAuthorAuthor, key()).into());
        }

        let inserted = self
            .conn
            .execute(
                "INSERT INTO book_authors (book_id, author_id) VALUES (?1, ?2)
                 ON CONFLICT(book_id, author_id) DO NOTHING",
                params![book_id, author_id],
            )
            .or_constraint(Constraint::BookAuthorPair, key)?;
        Ok(inserted > 0)
    }

    // ========== Quotes ==========

    /// Insert a quote, returning the existing id for an identical
    /// (text, author) pair. A known book source is merged in.
    pub fn insert_quote(&self, quote: &NewQuote) -> Result<QuoteId> {
        quote.validate()?;
        let text = quote.text.trim();
        if !self.exists(Table::Authors, quote.author_id.get())? {
            return Err(IntegrityError::referential(Constraint::QuoteAuthor, quote.key()).into());
        }

        self.conn
            .execute(
                r#"
                INSERT INTO quotes (text, author_id, book_source)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(text, author_id) DO UPDATE SET
                    book_source = COALESCE(excluded.book_source, quotes.book_source)
                "#,
                params![text, quote.author_id, non_blank(&quote.book_source)],
            )
            .or_constraint(Constraint::QuoteNaturalKey, || quote.key())?;

        let id = self.conn.query_row(
            "SELECT id FROM quotes WHERE text = ?1 AND author_id = ?2",
            params![text, quote.author_id],
            |row| row.get(0),
        )?;
        Ok(QuoteId(id))
    }

    /// Tag a quote. Returns `false` if the pair already existed.
    pub fn link_quote_tag(&self, quote_id: QuoteId, tag_id: TagId) -> Result<bool> {
        let key = || format!("quote {} / tag {}", quote_id, tag_id);
        if !self.exists(Table::Quotes, quote_id.get())? {
            return Err(IntegrityError::referential(Constraint::QuoteTagQuote, key()).into());
        }
        if !self.exists(Table::Tags, tag_id.get())? {
            return Err(IntegrityError::referential(Constraint::QuoteTagTag, key()).into());
        }

        let inserted = self
            .conn
            .execute(
                "INSERT INTO quote_tags (quote_id, tag_id) VALUES (?1, ?2)
                 ON CONFLICT(quote_id, tag_id) DO NOTHING",
                params![quote_id, tag_id],
            )
            .or_constraint(Constraint::QuoteTagPair, key)?;
        Ok(inserted > 0)
    }

    /// Whether a row with `id` exists in an entity table
    pub fn exists(&self, table: Table, id: i64) -> Result<bool> {
        let found: bool = self.conn.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table),
            [id],
            |row| row.get(0),
        )?;
        Ok(found)
    }
}

/// Blank strings count as missing so they never overwrite stored values
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
