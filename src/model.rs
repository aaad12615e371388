//! Relational model - entities, associations and their constraints
//!
//! Six entity tables and two association tables:
//! - `Category`, `Publisher`, `Tag`: unique names
//! - `Author`: unique name plus optional enrichment fields
//! - `Book`: natural key (title, publisher), one category, one publisher
//! - `Quote`: natural key (text, author)
//! - `BookAuthor`, `QuoteTag`: many-to-many pairs, unique per pair

use crate::{Error, IntegrityError, Result};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map($name)
            }
        }
    };
}

id_type!(
    /// Row id in `categories`
    CategoryId
);
id_type!(
    /// Row id in `publishers`
    PublisherId
);
id_type!(
    /// Row id in `authors`
    AuthorId
);
id_type!(
    /// Row id in `books`
    BookId
);
id_type!(
    /// Row id in `quotes`
    QuoteId
);
id_type!(
    /// Row id in `tags`
    TagId
);

/// Tables of the persisted schema, in dependency order (referenced first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Categories,
    Publishers,
    Authors,
    Books,
    Quotes,
    Tags,
    BookAuthors,
    QuoteTags,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Categories => "categories",
            Table::Publishers => "publishers",
            Table::Authors => "authors",
            Table::Books => "books",
            Table::Quotes => "quotes",
            Table::Tags => "tags",
            Table::BookAuthors => "book_authors",
            Table::QuoteTags => "quote_tags",
        }
    }

    pub fn all() -> &'static [Table] {
        &[
            Table::Categories,
            Table::Publishers,
            Table::Authors,
            Table::Books,
            Table::Quotes,
            Table::Tags,
            Table::BookAuthors,
            Table::QuoteTags,
        ]
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Table::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s.to_lowercase())
            .ok_or_else(|| Error::Parse(format!("Unknown table: {}", s)))
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Every constraint the store enforces, named the way it is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    CategoryName,
    PublisherName,
    TagName,
    AuthorName,
    BookTitle,
    BookNaturalKey,
    BookPrice,
    BookStock,
    BookRating,
    BookCategory,
    BookPublisher,
    QuoteText,
    QuoteNaturalKey,
    QuoteAuthor,
    BookAuthorPair,
    BookAuthorBook,
    BookAuthorAuthor,
    QuoteTagPair,
    QuoteTagQuote,
    QuoteTagTag,
    /// A category still referenced by books cannot be deleted
    CategoryInUse,
    /// A publisher still referenced by books cannot be deleted
    PublisherInUse,
}

impl Constraint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Constraint::CategoryName => "categories.name",
            Constraint::PublisherName => "publishers.name",
            Constraint::TagName => "tags.name",
            Constraint::AuthorName => "authors.name",
            Constraint::BookTitle => "books.title",
            Constraint::BookNaturalKey => "books(title, publisher_id)",
            Constraint::BookPrice => "books.price >= 0",
            Constraint::BookStock => "books.stock >= 0",
            Constraint::BookRating => "books.rating in 1..=5",
            Constraint::BookCategory => "books.category_id -> categories.id",
            Constraint::BookPublisher => "books.publisher_id -> publishers.id",
            Constraint::QuoteText => "quotes.text",
            Constraint::QuoteNaturalKey => "quotes(text, author_id)",
            Constraint::QuoteAuthor => "quotes.author_id -> authors.id",
            Constraint::BookAuthorPair => "book_authors(book_id, author_id)",
            Constraint::BookAuthorBook => "book_authors.book_id -> books.id",
            Constraint::BookAuthorAuthor => "book_authors.author_id -> authors.id",
            Constraint::QuoteTagPair => "quote_tags(quote_id, tag_id)",
            Constraint::QuoteTagQuote => "quote_tags.quote_id -> quotes.id",
            Constraint::QuoteTagTag => "quote_tags.tag_id -> tags.id",
            Constraint::CategoryInUse => "books.category_id restricts categories delete",
            Constraint::PublisherInUse => "books.publisher_id restricts publishers delete",
        }
    }

    /// Constraints guarding a unique name, where a racing writer should
    /// re-read the existing row instead of failing.
    pub fn is_unique_name(&self) -> bool {
        matches!(
            self,
            Constraint::CategoryName | Constraint::PublisherName | Constraint::TagName | Constraint::AuthorName
        )
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publisher {
    pub id: PublisherId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

/// An author row. Only `name` is required; the rest comes from enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub name: String,
    /// Key in the bibliographic lookup service (e.g. `/authors/OL23919A`)
    pub external_ref: Option<String>,
    pub birth_date: Option<String>,
    pub death_date: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub price: f64,
    pub availability: Option<String>,
    pub stock: u32,
    pub description: String,
    pub rating: Option<u8>,
    pub upc: Option<String>,
    pub image_url: Option<String>,
    pub publication_year: Option<i32>,
    pub category_id: CategoryId,
    pub publisher_id: PublisherId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub text: String,
    pub author_id: AuthorId,
    pub book_source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookAuthor {
    pub book_id: BookId,
    pub author_id: AuthorId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteTag {
    pub quote_id: QuoteId,
    pub tag_id: TagId,
}

/// Input for `upsert_author`. `None` fields never erase stored values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewAuthor {
    pub name: String,
    pub external_ref: Option<String>,
    pub birth_date: Option<String>,
    pub death_date: Option<String>,
    pub bio: Option<String>,
}

impl NewAuthor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }

    pub fn with_birth_date(mut self, date: impl Into<String>) -> Self {
        self.birth_date = Some(date.into());
        self
    }

    pub fn with_death_date(mut self, date: impl Into<String>) -> Self {
        self.death_date = Some(date.into());
        self
    }

    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = Some(bio.into());
        self
    }

    /// True when only the name is known, so a memoized id is as good as an upsert
    pub fn is_bare(&self) -> bool {
        self.external_ref.is_none() && self.birth_date.is_none() && self.death_date.is_none() && self.bio.is_none()
    }

    pub fn validate(&self) -> std::result::Result<(), IntegrityError> {
        if self.name.trim().is_empty() {
            return Err(IntegrityError::check(Constraint::AuthorName, "author with empty name"));
        }
        Ok(())
    }
}

/// Input for `upsert_book`, keyed by (title, publisher_id).
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub price: f64,
    /// Units in stock. `None` keeps the stored count and availability.
    pub stock: Option<u32>,
    pub category_id: CategoryId,
    pub publisher_id: PublisherId,
    pub description: String,
    /// Availability text; replaced together with `stock`
    pub availability: Option<String>,
    pub rating: Option<u8>,
    pub upc: Option<String>,
    pub image_url: Option<String>,
    pub publication_year: Option<i32>,
}

impl NewBook {
    pub fn new(
        title: impl Into<String>,
        price: f64,
        stock: u32,
        category_id: CategoryId,
        publisher_id: PublisherId,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            price,
            stock: Some(stock),
            category_id,
            publisher_id,
            description: description.into(),
            availability: None,
            rating: None,
            upc: None,
            image_url: None,
            publication_year: None,
        }
    }

    pub fn with_availability(mut self, availability: impl Into<String>) -> Self {
        self.availability = Some(availability.into());
        self
    }

    /// Leave the stored stock count and availability as they are
    pub fn without_stock(mut self) -> Self {
        self.stock = None;
        self.availability = None;
        self
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_upc(mut self, upc: impl Into<String>) -> Self {
        self.upc = Some(upc.into());
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_publication_year(mut self, year: i32) -> Self {
        self.publication_year = Some(year);
        self
    }

    /// Natural key rendered for error reports
    pub fn key(&self) -> String {
        format!("book {:?} (publisher {})", self.title, self.publisher_id)
    }

    /// Column checks that do not need the database
    pub fn validate(&self) -> std::result::Result<(), IntegrityError> {
        if self.title.trim().is_empty() {
            return Err(IntegrityError::check(Constraint::BookTitle, self.key()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(IntegrityError::check(
                Constraint::BookPrice,
                format!("{} with price {}", self.key(), self.price),
            ));
        }
        if let Some(rating) = self.rating {
            if !(1..=5).contains(&rating) {
                return Err(IntegrityError::check(
                    Constraint::BookRating,
                    format!("{} with rating {}", self.key(), rating),
                ));
            }
        }
        Ok(())
    }
}

/// Input for `insert_quote`, keyed by (text, author_id).
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuote {
    pub text: String,
    pub author_id: AuthorId,
    pub book_source: Option<String>,
}

impl NewQuote {
    pub fn new(text: impl Into<String>, author_id: AuthorId) -> Self {
        Self {
            text: text.into(),
            author_id,
            book_source: None,
        }
    }

    pub fn with_book_source(mut self, source: impl Into<String>) -> Self {
        self.book_source = Some(source.into());
        self
    }

    pub fn key(&self) -> String {
        let preview: String = self.text.chars().take(40).collect();
        format!("quote {:?} (author {})", preview, self.author_id)
    }

    pub fn validate(&self) -> std::result::Result<(), IntegrityError> {
        if self.text.trim().is_empty() {
            return Err(IntegrityError::check(Constraint::QuoteText, self.key()));
        }
        Ok(())
    }
}
