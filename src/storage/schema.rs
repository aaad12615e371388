//! Database schema definitions

/// Connection-level settings applied before any statement runs
pub const PRAGMAS: &str = "PRAGMA foreign_keys = ON;";

/// SQL to create the categories table
pub const CREATE_CATEGORIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (length(trim(name)) > 0),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

/// SQL to create the publishers table
pub const CREATE_PUBLISHERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS publishers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (length(trim(name)) > 0),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

/// SQL to create the authors table
/// Authors are keyed by name; enrichment columns stay NULL until known
pub const CREATE_AUTHORS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS authors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (length(trim(name)) > 0),
    external_ref TEXT,
    birth_date TEXT,
    death_date TEXT,
    bio TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

/// SQL to create the books table
/// Deleting a referenced category or publisher is blocked
pub const CREATE_BOOKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
    price REAL NOT NULL CHECK (price >= 0),
    availability TEXT,
    stock INTEGER NOT NULL DEFAULT 0 CHECK (stock >= 0),
    description TEXT NOT NULL DEFAULT '',
    rating INTEGER CHECK (rating BETWEEN 1 AND 5),
    upc TEXT,
    image_url TEXT,
    publication_year INTEGER,
    category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE RESTRICT,
    publisher_id INTEGER NOT NULL REFERENCES publishers(id) ON DELETE RESTRICT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(title, publisher_id)
)
"#;

/// SQL to create the book_authors association table
pub const CREATE_BOOK_AUTHORS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS book_authors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    author_id INTEGER NOT NULL REFERENCES authors(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(book_id, author_id)
)
"#;

/// SQL to create the tags table
pub const CREATE_TAGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (length(trim(name)) > 0),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

/// SQL to create the quotes table
pub const CREATE_QUOTES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS quotes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL CHECK (length(trim(text)) > 0),
    author_id INTEGER NOT NULL REFERENCES authors(id) ON DELETE RESTRICT,
    book_source TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(text, author_id)
)
"#;

/// SQL to create the quote_tags association table
pub const CREATE_QUOTE_TAGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS quote_tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    quote_id INTEGER NOT NULL REFERENCES quotes(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(quote_id, tag_id)
)
"#;

/// SQL to create indexes on foreign-key columns
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_books_category ON books(category_id)",
    "CREATE INDEX IF NOT EXISTS idx_books_publisher ON books(publisher_id)",
    "CREATE INDEX IF NOT EXISTS idx_quotes_author ON quotes(author_id)",
    "CREATE INDEX IF NOT EXISTS idx_book_authors_book ON book_authors(book_id)",
    "CREATE INDEX IF NOT EXISTS idx_book_authors_author ON book_authors(author_id)",
    "CREATE INDEX IF NOT EXISTS idx_quote_tags_quote ON quote_tags(quote_id)",
    "CREATE INDEX IF NOT EXISTS idx_quote_tags_tag ON quote_tags(tag_id)",
];

/// All schema creation statements, referenced tables first
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_CATEGORIES_TABLE,
        CREATE_PUBLISHERS_TABLE,
        CREATE_AUTHORS_TABLE,
        CREATE_BOOKS_TABLE,
        CREATE_BOOK_AUTHORS_TABLE,
        CREATE_TAGS_TABLE,
        CREATE_QUOTES_TABLE,
        CREATE_QUOTE_TAGS_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
