//! SQLite storage implementation

use rusqlite::{Connection, OpenFlags, OptionalExtension, TransactionBehavior, params};
use std::path::Path;

use super::integrity::ConstraintExt;
use super::schema;
use super::writer::Writer;
use crate::config::{DatabaseLocation, StoreConfig};
use crate::normalize::clean_name;
use crate::model::{
    Author, AuthorId, Book, BookAuthor, BookId, Category, CategoryId, Constraint, NewAuthor, NewBook, NewQuote,
    Publisher, PublisherId, Quote, QuoteId, QuoteTag, Table, Tag, TagId,
};
use crate::{Error, IntegrityError, Result};

const BOOK_COLUMNS: &str = "id, title, price, availability, stock, description, rating, upc, image_url, \
                            publication_year, category_id, publisher_id";
const AUTHOR_COLUMNS: &str = "id, name, external_ref, birth_date, death_date, bio";

/// SQLite-backed relational store for books, quotes, authors and tags
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Connect using an explicit configuration.
    ///
    /// The connection lives as long as the store and is released when the
    /// store is dropped or [`close`](Self::close)d.
    pub fn connect(config: &StoreConfig) -> Result<Self> {
        let conn = match &config.location {
            DatabaseLocation::File(path) => {
                let mut flags = OpenFlags::default();
                if !config.create_if_missing {
                    flags.remove(OpenFlags::SQLITE_OPEN_CREATE);
                }
                Connection::open_with_flags(path, flags).map_err(|source| Error::Connection {
                    target: path.display().to_string(),
                    source,
                })?
            }
            DatabaseLocation::Memory => Connection::open_in_memory().map_err(|source| Error::Connection {
                target: ":memory:".to_string(),
                source,
            })?,
        };

        conn.busy_timeout(config.busy_timeout)?;
        let store = Self { conn };
        store.initialize_schema()?;
        tracing::debug!("Opened store at {}", config.location);
        Ok(store)
    }

    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        Self::connect(&StoreConfig::file(path))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::connect(&StoreConfig::in_memory())
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute_batch(schema::PRAGMAS)?;
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    /// Close the connection, surfacing any error SQLite reports on close
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::Storage(e))
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    fn writer(&self) -> Writer<'_> {
        Writer::new(&self.conn)
    }

    // ========== Transactions ==========

    /// Run `f` inside one transaction.
    ///
    /// The write lock is taken up front, so a second writer waits out the
    /// busy timeout instead of failing on a lock upgrade. Commits when `f`
    /// returns `Ok`; any error (or a panic) rolls back every write `f` made.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&Writer<'_>) -> Result<T>,
    {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&Writer::new(&tx))?;
        tx.commit()?;
        Ok(value)
    }

    // ========== Write Operations ==========

    pub fn upsert_category(&self, name: &str) -> Result<CategoryId> {
        self.writer().upsert_category(name)
    }

    pub fn upsert_publisher(&self, name: &str) -> Result<PublisherId> {
        self.writer().upsert_publisher(name)
    }

    pub fn upsert_tag(&self, name: &str) -> Result<TagId> {
        self.writer().upsert_tag(name)
    }

    pub fn upsert_author(&self, author: &NewAuthor) -> Result<AuthorId> {
        self.writer().upsert_author(author)
    }

    pub fn upsert_book(&self, book: &NewBook) -> Result<BookId> {
        self.writer().upsert_book(book)
    }

    pub fn link_book_author(&self, book_id: BookId, author_id: AuthorId) -> Result<bool> {
        self.writer().link_book_author(book_id, author_id)
    }

    pub fn insert_quote(&self, quote: &NewQuote) -> Result<QuoteId> {
        self.writer().insert_quote(quote)
    }

    pub fn link_quote_tag(&self, quote_id: QuoteId, tag_id: TagId) -> Result<bool> {
        self.writer().link_quote_tag(quote_id, tag_id)
    }

    // ========== Lookups ==========

    pub fn find_category(&self, name: &str) -> Result<Option<Category>> {
        self.conn
            .query_row("SELECT id, name FROM categories WHERE name = ?1", [clean_name(name)], |row| {
                Ok(Category { id: row.get(0)?, name: row.get(1)? })
            })
            .optional()
            .map_err(Into::into)
    }

    pub fn find_publisher(&self, name: &str) -> Result<Option<Publisher>> {
        self.conn
            .query_row("SELECT id, name FROM publishers WHERE name = ?1", [clean_name(name)], |row| {
                Ok(Publisher { id: row.get(0)?, name: row.get(1)? })
            })
            .optional()
            .map_err(Into::into)
    }

    pub fn find_tag(&self, name: &str) -> Result<Option<Tag>> {
        self.conn
            .query_row("SELECT id, name FROM tags WHERE name = ?1", [clean_name(name)], |row| {
                Ok(Tag { id: row.get(0)?, name: row.get(1)? })
            })
            .optional()
            .map_err(Into::into)
    }

    pub fn get_author(&self, id: AuthorId) -> Result<Option<Author>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM authors WHERE id = ?1", AUTHOR_COLUMNS),
                [id],
                row_to_author,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn find_author(&self, name: &str) -> Result<Option<Author>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM authors WHERE name = ?1", AUTHOR_COLUMNS),
                [clean_name(name)],
                row_to_author,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn get_book(&self, id: BookId) -> Result<Option<Book>> {
        self.conn
            .query_row(&format!("SELECT {} FROM books WHERE id = ?1", BOOK_COLUMNS), [id], row_to_book)
            .optional()
            .map_err(Into::into)
    }

    /// Look a book up by its natural key
    pub fn find_book(&self, title: &str, publisher_id: PublisherId) -> Result<Option<Book>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM books WHERE title = ?1 AND publisher_id = ?2", BOOK_COLUMNS),
                params![clean_name(title), publisher_id],
                row_to_book,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn get_quote(&self, id: QuoteId) -> Result<Option<Quote>> {
        self.conn
            .query_row(
                "SELECT id, text, author_id, book_source FROM quotes WHERE id = ?1",
                [id],
                |row| {
                    Ok(Quote {
                        id: row.get(0)?,
                        text: row.get(1)?,
                        author_id: row.get(2)?,
                        book_source: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Authors linked to a book, by name
    pub fn authors_of_book(&self, book_id: BookId) -> Result<Vec<Author>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.id, a.name, a.external_ref, a.birth_date, a.death_date, a.bio
             FROM authors a
             JOIN book_authors ba ON ba.author_id = a.id
             WHERE ba.book_id = ?1
             ORDER BY a.name",
        )?;

        let authors = stmt
            .query_map([book_id], row_to_author)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(authors)
    }

    /// Tags attached to a quote, by name
    pub fn tags_of_quote(&self, quote_id: QuoteId) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.name
             FROM tags t
             JOIN quote_tags qt ON qt.tag_id = t.id
             WHERE qt.quote_id = ?1
             ORDER BY t.name",
        )?;

        let tags = stmt
            .query_map([quote_id], |row| Ok(Tag { id: row.get(0)?, name: row.get(1)? }))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    /// Every book-author pair, ordered by book then author
    pub fn book_authors(&self) -> Result<Vec<BookAuthor>> {
        let mut stmt = self
            .conn
            .prepare("SELECT book_id, author_id FROM book_authors ORDER BY book_id, author_id")?;
        let pairs = stmt
            .query_map([], |row| Ok(BookAuthor { book_id: row.get(0)?, author_id: row.get(1)? }))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }

    /// Every quote-tag pair, ordered by quote then tag
    pub fn quote_tags(&self) -> Result<Vec<QuoteTag>> {
        let mut stmt = self
            .conn
            .prepare("SELECT quote_id, tag_id FROM quote_tags ORDER BY quote_id, tag_id")?;
        let pairs = stmt
            .query_map([], |row| Ok(QuoteTag { quote_id: row.get(0)?, tag_id: row.get(1)? }))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }

    /// Count rows in one table
    pub fn count(&self, table: Table) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            categories: self.count(Table::Categories)?,
            publishers: self.count(Table::Publishers)?,
            authors: self.count(Table::Authors)?,
            books: self.count(Table::Books)?,
            quotes: self.count(Table::Quotes)?,
            tags: self.count(Table::Tags)?,
            book_authors: self.count(Table::BookAuthors)?,
            quote_tags: self.count(Table::QuoteTags)?,
        })
    }

    // ========== Deletion ==========

    /// Delete an unreferenced category. Blocked while any book uses it.
    pub fn delete_category(&self, id: CategoryId) -> Result<()> {
        let key = || format!("category {}", id);
        if self.books_referencing("category_id", id.get())? > 0 {
            return Err(IntegrityError::referential(Constraint::CategoryInUse, key()).into());
        }

        let deleted = self
            .conn
            .execute("DELETE FROM categories WHERE id = ?1", [id])
            .or_constraint(Constraint::CategoryInUse, key)?;
        if deleted == 0 {
            return Err(Error::NotFound(key()));
        }
        tracing::info!("Deleted category {}", id);
        Ok(())
    }

    /// Delete an unreferenced publisher. Blocked while any book uses it.
    pub fn delete_publisher(&self, id: PublisherId) -> Result<()> {
        let key = || format!("publisher {}", id);
        if self.books_referencing("publisher_id", id.get())? > 0 {
            return Err(IntegrityError::referential(Constraint::PublisherInUse, key()).into());
        }

        let deleted = self
            .conn
            .execute("DELETE FROM publishers WHERE id = ?1", [id])
            .or_constraint(Constraint::PublisherInUse, key)?;
        if deleted == 0 {
            return Err(Error::NotFound(key()));
        }
        tracing::info!("Deleted publisher {}", id);
        Ok(())
    }

    fn books_referencing(&self, column: &str, id: i64) -> Result<i64> {
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM books WHERE {} = ?1", column),
            [id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete all data, associations first. Returns the number of rows removed.
    pub fn purge(&mut self) -> Result<usize> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut removed = 0;
        for table in Table::all().iter().rev() {
            removed += tx.execute(&format!("DELETE FROM {}", table), [])?;
        }
        tx.commit()?;
        tracing::info!("Purged {} rows", removed);
        Ok(removed)
    }
}

/// Helper to convert a row to an Author
fn row_to_author(row: &rusqlite::Row) -> rusqlite::Result<Author> {
    Ok(Author {
        id: row.get(0)?,
        name: row.get(1)?,
        external_ref: row.get(2)?,
        birth_date: row.get(3)?,
        death_date: row.get(4)?,
        bio: row.get(5)?,
    })
}

/// Helper to convert a row to a Book
fn row_to_book(row: &rusqlite::Row) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        price: row.get(2)?,
        availability: row.get(3)?,
        stock: row.get(4)?,
        description: row.get(5)?,
        rating: row.get(6)?,
        upc: row.get(7)?,
        image_url: row.get(8)?,
        publication_year: row.get(9)?,
        category_id: row.get(10)?,
        publisher_id: row.get(11)?,
    })
}

/// Row counts per table
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DbStats {
    pub categories: usize,
    pub publishers: usize,
    pub authors: usize,
    pub books: usize,
    pub quotes: usize,
    pub tags: usize,
    pub book_authors: usize,
    pub quote_tags: usize,
}

impl DbStats {
    /// (table, rows) pairs in schema order
    pub fn rows(&self) -> [(Table, usize); 8] {
        [
            (Table::Categories, self.categories),
            (Table::Publishers, self.publishers),
            (Table::Authors, self.authors),
            (Table::Books, self.books),
            (Table::Quotes, self.quotes),
            (Table::Tags, self.tags),
            (Table::BookAuthors, self.book_authors),
            (Table::QuoteTags, self.quote_tags),
        ]
    }
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        for (table, rows) in self.rows() {
            writeln!(f, "  {}: {}", table, rows)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        store: SqliteStore,
        fiction: CategoryId,
        pubx: PublisherId,
    }

    fn fixture() -> Fixture {
        let store = SqliteStore::open_in_memory().unwrap();
        let fiction = store.upsert_category("Fiction").unwrap();
        let pubx = store.upsert_publisher("PubX").unwrap();
        Fixture { store, fiction, pubx }
    }

    fn integrity(err: Error) -> IntegrityError {
        match err {
            Error::Integrity(e) => e,
            other => panic!("expected integrity error, got {other:?}"),
        }
    }

    #[test]
    fn test_upsert_category_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.upsert_category("Poetry").unwrap();
        let second = store.upsert_category("Poetry").unwrap();

        assert_eq!(first, second);
        assert_eq!(store.count(Table::Categories).unwrap(), 1);
        assert_eq!(store.find_category("Poetry").unwrap().unwrap().id, first);
    }

    #[test]
    fn test_upsert_publisher_and_tag_are_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.upsert_publisher("Knopf").unwrap(), store.upsert_publisher("Knopf").unwrap());
        assert_eq!(store.upsert_tag("life").unwrap(), store.upsert_tag("life").unwrap());
        assert_eq!(store.count(Table::Publishers).unwrap(), 1);
        assert_eq!(store.count(Table::Tags).unwrap(), 1);
    }

    #[test]
    fn test_blank_name_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = integrity(store.upsert_tag("  ").unwrap_err());
        assert_eq!(err.constraint(), Constraint::TagName);
        assert_eq!(store.count(Table::Tags).unwrap(), 0);
    }

    #[test]
    fn test_book_upsert_updates_on_natural_key() {
        let f = fixture();
        let first = f
            .store
            .upsert_book(&NewBook::new("Title A", 12.50, 3, f.fiction, f.pubx, "first"))
            .unwrap();
        let second = f
            .store
            .upsert_book(&NewBook::new("Title A", 14.00, 5, f.fiction, f.pubx, "second"))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(f.store.count(Table::Books).unwrap(), 1);

        let book = f.store.get_book(first).unwrap().unwrap();
        assert_eq!(book.price, 14.00);
        assert_eq!(book.stock, 5);
        assert_eq!(book.description, "second");
    }

    #[test]
    fn test_same_title_other_publisher_is_new_book() {
        let f = fixture();
        let other = f.store.upsert_publisher("PubY").unwrap();
        let a = f.store.upsert_book(&NewBook::new("Title A", 1.0, 1, f.fiction, f.pubx, "")).unwrap();
        let b = f.store.upsert_book(&NewBook::new("Title A", 1.0, 1, f.fiction, other, "")).unwrap();

        assert_ne!(a, b);
        assert_eq!(f.store.count(Table::Books).unwrap(), 2);
        assert_eq!(f.store.find_book("Title A", other).unwrap().unwrap().id, b);
    }

    #[test]
    fn test_book_upsert_keeps_known_optionals() {
        let f = fixture();
        let id = f
            .store
            .upsert_book(
                &NewBook::new("Title A", 10.0, 1, f.fiction, f.pubx, "")
                    .with_rating(4)
                    .with_upc("a897fe39b1053632"),
            )
            .unwrap();
        f.store.upsert_book(&NewBook::new("Title A", 11.0, 1, f.fiction, f.pubx, "")).unwrap();

        let book = f.store.get_book(id).unwrap().unwrap();
        assert_eq!(book.rating, Some(4));
        assert_eq!(book.upc.as_deref(), Some("a897fe39b1053632"));
    }

    #[test]
    fn test_book_with_missing_category_is_referential_error() {
        let f = fixture();
        let err = f
            .store
            .upsert_book(&NewBook::new("Title A", 1.0, 1, CategoryId(999), f.pubx, ""))
            .unwrap_err();

        let err = integrity(err);
        assert!(matches!(err, IntegrityError::Referential { .. }));
        assert_eq!(err.constraint(), Constraint::BookCategory);
        assert_eq!(f.store.count(Table::Books).unwrap(), 0);
    }

    #[test]
    fn test_book_with_missing_publisher_is_referential_error() {
        let f = fixture();
        let err = f
            .store
            .upsert_book(&NewBook::new("Title A", 1.0, 1, f.fiction, PublisherId(42), ""))
            .unwrap_err();
        assert_eq!(integrity(err).constraint(), Constraint::BookPublisher);
    }

    #[test]
    fn test_negative_price_rejected() {
        let f = fixture();
        let err = f
            .store
            .upsert_book(&NewBook::new("Title A", -0.01, 1, f.fiction, f.pubx, ""))
            .unwrap_err();

        let err = integrity(err);
        assert!(matches!(err, IntegrityError::Check { .. }));
        assert_eq!(err.constraint(), Constraint::BookPrice);
        assert_eq!(f.store.count(Table::Books).unwrap(), 0);
    }

    #[test]
    fn test_link_book_author_is_idempotent() {
        let f = fixture();
        let book = f.store.upsert_book(&NewBook::new("Title A", 1.0, 1, f.fiction, f.pubx, "")).unwrap();
        let author = f.store.upsert_author(&NewAuthor::new("Jane Doe")).unwrap();

        assert!(f.store.link_book_author(book, author).unwrap());
        assert!(!f.store.link_book_author(book, author).unwrap());
        assert_eq!(f.store.count(Table::BookAuthors).unwrap(), 1);
        assert_eq!(f.store.authors_of_book(book).unwrap()[0].name, "Jane Doe");
        assert_eq!(f.store.book_authors().unwrap(), vec![BookAuthor { book_id: book, author_id: author }]);
    }

    #[test]
    fn test_link_to_missing_author_is_referential_error() {
        let f = fixture();
        let book = f.store.upsert_book(&NewBook::new("Title A", 1.0, 1, f.fiction, f.pubx, "")).unwrap();
        let err = integrity(f.store.link_book_author(book, AuthorId(7)).unwrap_err());
        assert_eq!(err.constraint(), Constraint::BookAuthorAuthor);
    }

    #[test]
    fn test_author_merge_never_nulls_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.upsert_author(&NewAuthor::new("Albert Einstein")).unwrap();

        let enriched = NewAuthor::new("Albert Einstein")
            .with_external_ref("/authors/OL22098A")
            .with_birth_date("1879-01-01");
        assert_eq!(store.upsert_author(&enriched).unwrap(), id);

        // A later bare upsert keeps the enrichment
        assert_eq!(store.upsert_author(&NewAuthor::new("Albert Einstein").with_bio("")).unwrap(), id);

        let author = store.get_author(id).unwrap().unwrap();
        assert_eq!(author.external_ref.as_deref(), Some("/authors/OL22098A"));
        assert_eq!(author.birth_date.as_deref(), Some("1879-01-01"));
        assert_eq!(author.bio, None);
        assert_eq!(store.count(Table::Authors).unwrap(), 1);
    }

    #[test]
    fn test_author_external_ref_latest_wins() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_author(&NewAuthor::new("Jane Austen").with_external_ref("/authors/OL1A")).unwrap();
        store.upsert_author(&NewAuthor::new("Jane Austen").with_external_ref("/authors/OL2A")).unwrap();

        let author = store.find_author("Jane Austen").unwrap().unwrap();
        assert_eq!(author.external_ref.as_deref(), Some("/authors/OL2A"));
    }

    #[test]
    fn test_quote_requires_author() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = integrity(store.insert_quote(&NewQuote::new("text1", AuthorId(1))).unwrap_err());
        assert_eq!(err.constraint(), Constraint::QuoteAuthor);
    }

    #[test]
    fn test_quote_and_tags_are_deduplicated() {
        let store = SqliteStore::open_in_memory().unwrap();
        let author = store.upsert_author(&NewAuthor::new("Jane Doe")).unwrap();
        let q1 = store.insert_quote(&NewQuote::new("text1", author)).unwrap();
        let q2 = store
            .insert_quote(&NewQuote::new("text1", author).with_book_source("Title A"))
            .unwrap();
        assert_eq!(q1, q2);

        let tag = store.upsert_tag("wisdom").unwrap();
        assert!(store.link_quote_tag(q1, tag).unwrap());
        assert!(!store.link_quote_tag(q1, tag).unwrap());

        assert_eq!(store.count(Table::Quotes).unwrap(), 1);
        assert_eq!(store.count(Table::QuoteTags).unwrap(), 1);
        assert_eq!(store.get_quote(q1).unwrap().unwrap().book_source.as_deref(), Some("Title A"));
        assert_eq!(store.tags_of_quote(q1).unwrap()[0].name, "wisdom");
        assert_eq!(store.quote_tags().unwrap(), vec![QuoteTag { quote_id: q1, tag_id: tag }]);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let mut f = fixture();
        let fiction = f.fiction;
        let pubx = f.pubx;

        let result = f.store.transaction(|tx| {
            let book = tx.upsert_book(&NewBook::new("Title A", 1.0, 1, fiction, pubx, ""))?;
            tx.link_book_author(book, AuthorId(404))
        });

        assert!(result.is_err());
        assert_eq!(f.store.count(Table::Books).unwrap(), 0);
        assert_eq!(f.store.count(Table::BookAuthors).unwrap(), 0);
    }

    #[test]
    fn test_category_delete_blocked_while_referenced() {
        let f = fixture();
        f.store.upsert_book(&NewBook::new("Title A", 1.0, 1, f.fiction, f.pubx, "")).unwrap();

        let err = integrity(f.store.delete_category(f.fiction).unwrap_err());
        assert_eq!(err.constraint(), Constraint::CategoryInUse);
        let err = integrity(f.store.delete_publisher(f.pubx).unwrap_err());
        assert_eq!(err.constraint(), Constraint::PublisherInUse);

        let unused = f.store.upsert_category("Poetry").unwrap();
        f.store.delete_category(unused).unwrap();
        assert!(matches!(f.store.delete_category(unused), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_purge_empties_every_table() {
        let mut f = fixture();
        let book = f.store.upsert_book(&NewBook::new("Title A", 1.0, 1, f.fiction, f.pubx, "")).unwrap();
        let author = f.store.upsert_author(&NewAuthor::new("Jane Doe")).unwrap();
        f.store.link_book_author(book, author).unwrap();
        let quote = f.store.insert_quote(&NewQuote::new("text1", author)).unwrap();
        let tag = f.store.upsert_tag("life").unwrap();
        f.store.link_quote_tag(quote, tag).unwrap();

        assert_eq!(f.store.purge().unwrap(), 8);
        for (_, rows) in f.store.stats().unwrap().rows() {
            assert_eq!(rows, 0);
        }
    }

    #[test]
    fn test_connect_missing_file_without_create_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::file(dir.path().join("absent.db")).create_if_missing(false);
        assert!(matches!(SqliteStore::connect(&config), Err(Error::Connection { .. })));
    }

    #[test]
    fn test_names_are_stored_canonical() {
        let f = fixture();
        assert_eq!(f.store.upsert_category("Fiction ").unwrap(), f.fiction);
        assert_eq!(f.store.upsert_category("  Fiction").unwrap(), f.fiction);
        assert_eq!(f.store.upsert_publisher("Pub\tX").unwrap(), f.pubx);
        assert_eq!(f.store.count(Table::Categories).unwrap(), 1);
        assert_eq!(f.store.count(Table::Publishers).unwrap(), 1);

        let jane = f.store.upsert_author(&NewAuthor::new("Jane Doe")).unwrap();
        assert_eq!(f.store.upsert_author(&NewAuthor::new("Jane  Doe ")).unwrap(), jane);
        assert_eq!(f.store.find_author(" Jane Doe").unwrap().unwrap().name, "Jane Doe");

        let book = f.store.upsert_book(&NewBook::new("Title A", 1.0, 1, f.fiction, f.pubx, "")).unwrap();
        assert_eq!(f.store.upsert_book(&NewBook::new(" Title  A", 2.0, 1, f.fiction, f.pubx, "")).unwrap(), book);
        assert_eq!(f.store.count(Table::Books).unwrap(), 1);

        let quote = f.store.insert_quote(&NewQuote::new("text1", jane)).unwrap();
        assert_eq!(f.store.insert_quote(&NewQuote::new(" text1\n", jane)).unwrap(), quote);
        assert_eq!(f.store.count(Table::Quotes).unwrap(), 1);
    }

    #[test]
    fn test_unknown_stock_keeps_stock_and_availability() {
        let f = fixture();
        let id = f
            .store
            .upsert_book(
                &NewBook::new("Title A", 10.0, 22, f.fiction, f.pubx, "")
                    .with_availability("In stock (22 available)"),
            )
            .unwrap();
        f.store
            .upsert_book(&NewBook::new("Title A", 11.0, 0, f.fiction, f.pubx, "").without_stock())
            .unwrap();

        let book = f.store.get_book(id).unwrap().unwrap();
        assert_eq!(book.price, 11.0);
        assert_eq!(book.stock, 22);
        assert_eq!(book.availability.as_deref(), Some("In stock (22 available)"));

        // A known count replaces both columns
        f.store.upsert_book(&NewBook::new("Title A", 11.0, 4, f.fiction, f.pubx, "")).unwrap();
        let book = f.store.get_book(id).unwrap().unwrap();
        assert_eq!(book.stock, 4);
        assert_eq!(book.availability, None);

        let fresh = f
            .store
            .upsert_book(&NewBook::new("Title B", 1.0, 9, f.fiction, f.pubx, "").without_stock())
            .unwrap();
        assert_eq!(f.store.get_book(fresh).unwrap().unwrap().stock, 0);
    }

    #[test]
    fn test_transaction_holds_write_lock_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.db");
        let mut first = SqliteStore::open(&path).unwrap();
        let second = SqliteStore::connect(
            &StoreConfig::file(&path).busy_timeout(std::time::Duration::from_millis(50)),
        )
        .unwrap();

        first
            .transaction(|tx| {
                // Nothing written yet, but the other connection must wait
                let err = second.upsert_category("Poetry").unwrap_err();
                assert!(matches!(err, Error::Storage(_)));
                tx.upsert_category("Fiction")
            })
            .unwrap();

        assert_eq!(second.count(Table::Categories).unwrap(), 1);
        assert!(second.find_category("Fiction").unwrap().is_some());
    }
}
