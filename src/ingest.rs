//! Ingestion driver - loads scraped records into the store
//!
//! Records arrive as JSON produced by an external scraper. Each logical
//! record (a book with its author links, a quote with its tags) is written in
//! one transaction. Integrity failures are local to their record and are
//! skipped or abort the run per [`OnError`]; storage and connection failures
//! always end the run.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::model::{AuthorId, CategoryId, Constraint, NewAuthor, NewBook, NewQuote, PublisherId, TagId};
use crate::normalize;
use crate::storage::{SqliteStore, Writer};
use crate::{Error, IntegrityError, Result};

/// What to do when a record violates a constraint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Report the record and continue with the next one
    #[default]
    Skip,
    /// Stop the run at the first failing record
    Abort,
}

impl OnError {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnError::Skip => "skip",
            OnError::Abort => "abort",
        }
    }
}

impl FromStr for OnError {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "skip" | "continue" => Ok(OnError::Skip),
            "abort" | "stop" => Ok(OnError::Abort),
            _ => Err(Error::Parse(format!("Unknown error policy: {}", s))),
        }
    }
}

impl std::fmt::Display for OnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestOptions {
    pub on_error: OnError,
    pub default_publisher: Option<String>,
}

// ========== Input Records ==========

/// A price as scraped: a number, or listing text like `£51.77`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPrice {
    Amount(f64),
    Text(String),
}

impl RawPrice {
    pub fn value(&self) -> Result<f64> {
        match self {
            RawPrice::Amount(amount) => Ok(*amount),
            RawPrice::Text(text) => normalize::parse_price(text),
        }
    }
}

/// A rating as scraped: a star count, or a class word like `Three`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawRating {
    Stars(u8),
    Text(String),
}

impl RawRating {
    pub fn value(&self) -> Option<u8> {
        match self {
            RawRating::Stars(stars) => Some(*stars),
            RawRating::Text(text) => normalize::parse_rating(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub name: String,
    #[serde(default, alias = "openlibrary_key")]
    pub external_ref: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub death_date: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl AuthorRecord {
    pub fn key(&self) -> String {
        format!("author {:?}", normalize::clean_name(&self.name))
    }

    pub fn to_new_author(&self) -> NewAuthor {
        NewAuthor {
            name: normalize::clean_name(&self.name),
            external_ref: self.external_ref.clone(),
            birth_date: self.birth_date.as_deref().and_then(normalize::normalize_date),
            death_date: self.death_date.as_deref().and_then(normalize::normalize_date),
            bio: self.bio.clone(),
        }
    }
}

/// An author given by name alone or with enrichment fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthorEntry {
    Name(String),
    Record(AuthorRecord),
}

impl AuthorEntry {
    pub fn to_new_author(&self) -> NewAuthor {
        match self {
            AuthorEntry::Name(name) => NewAuthor::new(normalize::clean_name(name)),
            AuthorEntry::Record(record) => record.to_new_author(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub title: String,
    pub price: RawPrice,
    #[serde(default)]
    pub availability: Option<String>,
    /// Explicit unit count; derived from `availability` when absent
    #[serde(default)]
    pub stock: Option<u32>,
    pub category: String,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub authors: Vec<AuthorEntry>,
    #[serde(default)]
    pub rating: Option<RawRating>,
    #[serde(default)]
    pub upc: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub publication_year: Option<i32>,
}

impl BookRecord {
    /// Natural key as scraped, for failure reports
    pub fn key(&self) -> String {
        format!(
            "book {:?} / {}",
            self.title.trim(),
            self.publisher.as_deref().unwrap_or("<default publisher>")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub text: String,
    pub author: AuthorEntry,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub book_source: Option<String>,
}

impl QuoteRecord {
    pub fn key(&self) -> String {
        let preview: String = normalize::clean_quote_text(&self.text).chars().take(40).collect();
        format!("quote {:?} by {}", preview, self.author.to_new_author().name)
    }
}

/// One entry of a records file.
///
/// An entry that does not fit the record shape is kept as raw JSON, so one
/// bad record fails on its own instead of failing the whole file.
#[derive(Debug, Clone, PartialEq)]
pub enum Scraped<T> {
    Record(T),
    Malformed { raw: serde_json::Value, error: String },
}

impl<T> Scraped<T> {
    pub fn record(&self) -> Option<&T> {
        match self {
            Scraped::Record(record) => Some(record),
            Scraped::Malformed { .. } => None,
        }
    }
}

impl<T> From<T> for Scraped<T> {
    fn from(record: T) -> Self {
        Scraped::Record(record)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Scraped<T> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        let parsed = T::deserialize(&raw);
        Ok(match parsed {
            Ok(record) => Scraped::Record(record),
            Err(err) => Scraped::Malformed { raw, error: err.to_string() },
        })
    }
}

impl<T: Serialize> Serialize for Scraped<T> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Scraped::Record(record) => record.serialize(serializer),
            Scraped::Malformed { raw, .. } => raw.serialize(serializer),
        }
    }
}

/// Failure key and error for a malformed entry: position in its list, plus
/// the title, name or text when the raw JSON has one
fn malformed<T>(kind: &str, index: usize, raw: &serde_json::Value, error: &str) -> (String, Result<T>) {
    let hint = ["title", "name", "text"]
        .iter()
        .find_map(|field| raw.get(field).and_then(serde_json::Value::as_str));
    let key = match hint {
        Some(hint) => format!("{} #{} {:?}", kind, index + 1, normalize::clean_name(hint)),
        None => format!("{} #{}", kind, index + 1),
    };
    let err = Error::Parse(format!("malformed {} record: {}", kind, error));
    (key, Err(err))
}

/// Everything one scraper run produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    /// Author enrichment, applied before books and quotes
    #[serde(default)]
    pub authors: Vec<Scraped<AuthorRecord>>,
    #[serde(default)]
    pub books: Vec<Scraped<BookRecord>>,
    #[serde(default)]
    pub quotes: Vec<Scraped<QuoteRecord>>,
}

impl RecordSet {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let records = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(records)
    }

    pub fn len(&self) -> usize {
        self.authors.len() + self.books.len() + self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ========== Run Report ==========

/// A record that was skipped, with enough context to fix and re-run it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub record: String,
    pub constraint: Option<Constraint>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub authors: usize,
    pub books: usize,
    pub quotes: usize,
    pub book_author_links: usize,
    pub quote_tag_links: usize,
    pub failures: Vec<RecordFailure>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl std::fmt::Display for IngestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Ingestion Report:")?;
        writeln!(f, "  Authors: {}", self.authors)?;
        writeln!(f, "  Books: {}", self.books)?;
        writeln!(f, "  Quotes: {}", self.quotes)?;
        writeln!(f, "  New book-author links: {}", self.book_author_links)?;
        writeln!(f, "  New quote-tag links: {}", self.quote_tag_links)?;
        write!(f, "  Failed records: {}", self.failures.len())
    }
}

// ========== Driver ==========

/// Ids resolved during this run, keyed by normalized name
#[derive(Debug, Default)]
struct Memo {
    categories: HashMap<String, CategoryId>,
    publishers: HashMap<String, PublisherId>,
    tags: HashMap<String, TagId>,
    authors: HashMap<String, AuthorId>,
}

impl Memo {
    fn absorb(&mut self, learned: Memo) {
        self.categories.extend(learned.categories);
        self.publishers.extend(learned.publishers);
        self.tags.extend(learned.tags);
        self.authors.extend(learned.authors);
    }

    fn clear(&mut self) {
        *self = Memo::default();
    }
}

/// Resolve `name` from the run memo, or create it and remember it as
/// learned. Learned ids only join the memo once their transaction commits.
fn memoized<I, F>(known: &HashMap<String, I>, learned: &mut HashMap<String, I>, name: &str, create: F) -> Result<I>
where
    I: Copy,
    F: FnOnce() -> Result<I>,
{
    if let Some(id) = known.get(name).or_else(|| learned.get(name)) {
        return Ok(*id);
    }
    let id = create()?;
    learned.insert(name.to_string(), id);
    Ok(id)
}

fn resolve_author(tx: &Writer<'_>, known: &Memo, learned: &mut Memo, author: &NewAuthor) -> Result<AuthorId> {
    if author.is_bare() {
        return memoized(&known.authors, &mut learned.authors, &author.name, || tx.upsert_author(author));
    }
    let id = tx.upsert_author(author)?;
    learned.authors.insert(author.name.clone(), id);
    Ok(id)
}

/// A book record after normalization, ready for the store
struct PreparedBook {
    category: String,
    publisher: String,
    title: String,
    price: f64,
    stock: Option<u32>,
    description: String,
    availability: Option<String>,
    rating: Option<u8>,
    upc: Option<String>,
    image_url: Option<String>,
    publication_year: Option<i32>,
    authors: Vec<NewAuthor>,
}

impl PreparedBook {
    fn from_record(record: &BookRecord, options: &IngestOptions) -> Result<Self> {
        let publisher = record
            .publisher
            .as_deref()
            .map(normalize::clean_name)
            .filter(|name| !name.is_empty())
            .or_else(|| {
                options
                    .default_publisher
                    .as_deref()
                    .map(normalize::clean_name)
                    .filter(|name| !name.is_empty())
            })
            .ok_or_else(|| IntegrityError::referential(Constraint::BookPublisher, record.key()))?;

        let availability = record.availability.as_deref().map(normalize::clean_name);
        // Without either field the stored stock and availability stay as they are
        let stock = record
            .stock
            .or_else(|| availability.as_deref().map(normalize::parse_stock));

        Ok(Self {
            category: normalize::clean_category_name(&record.category),
            publisher,
            title: normalize::clean_name(&record.title),
            price: record.price.value()?,
            stock,
            description: record.description.trim().to_string(),
            availability,
            rating: record.rating.as_ref().and_then(RawRating::value),
            upc: record.upc.clone(),
            image_url: record.image_url.clone(),
            publication_year: record.publication_year,
            authors: record.authors.iter().map(AuthorEntry::to_new_author).collect(),
        })
    }

    fn to_new_book(&self, category_id: CategoryId, publisher_id: PublisherId) -> NewBook {
        NewBook {
            title: self.title.clone(),
            price: self.price,
            stock: self.stock,
            category_id,
            publisher_id,
            description: self.description.clone(),
            availability: self.availability.clone(),
            rating: self.rating,
            upc: self.upc.clone(),
            image_url: self.image_url.clone(),
            publication_year: self.publication_year,
        }
    }
}

/// Drives one ingestion run against a store
pub struct Ingestor<'s> {
    store: &'s mut SqliteStore,
    options: IngestOptions,
    memo: Memo,
    report: IngestReport,
}

impl<'s> Ingestor<'s> {
    pub fn new(store: &'s mut SqliteStore, options: IngestOptions) -> Self {
        Self {
            store,
            options,
            memo: Memo::default(),
            report: IngestReport::default(),
        }
    }

    /// Ingest every record. `Err` means the run stopped early.
    pub fn ingest(&mut self, records: &RecordSet) -> Result<IngestReport> {
        self.ingest_with_progress(records, |_| {})
    }

    /// Like [`ingest`](Self::ingest), calling `on_record` with each record's key
    pub fn ingest_with_progress<P>(&mut self, records: &RecordSet, mut on_record: P) -> Result<IngestReport>
    where
        P: FnMut(&str),
    {
        tracing::info!(
            "Ingesting {} authors, {} books, {} quotes (on error: {})",
            records.authors.len(),
            records.books.len(),
            records.quotes.len(),
            self.options.on_error
        );

        for (index, entry) in records.authors.iter().enumerate() {
            let (key, outcome) = match entry {
                Scraped::Record(record) => (record.key(), self.with_name_retry(|this| this.ingest_author(record))),
                Scraped::Malformed { raw, error } => malformed("author", index, raw, error),
            };
            if self.settle(&key, outcome)?.is_some() {
                self.report.authors += 1;
            }
            on_record(&key);
        }

        for (index, entry) in records.books.iter().enumerate() {
            let (key, outcome) = match entry {
                Scraped::Record(record) => (record.key(), self.with_name_retry(|this| this.ingest_book(record))),
                Scraped::Malformed { raw, error } => malformed("book", index, raw, error),
            };
            if let Some(links) = self.settle(&key, outcome)? {
                self.report.books += 1;
                self.report.book_author_links += links;
            }
            on_record(&key);
        }

        for (index, entry) in records.quotes.iter().enumerate() {
            let (key, outcome) = match entry {
                Scraped::Record(record) => (record.key(), self.with_name_retry(|this| this.ingest_quote(record))),
                Scraped::Malformed { raw, error } => malformed("quote", index, raw, error),
            };
            if let Some(links) = self.settle(&key, outcome)? {
                self.report.quotes += 1;
                self.report.quote_tag_links += links;
            }
            on_record(&key);
        }

        let report = std::mem::take(&mut self.report);
        tracing::info!(
            "Ingested {} books and {} quotes, {} records failed",
            report.books,
            report.quotes,
            report.failures.len()
        );
        Ok(report)
    }

    fn ingest_author(&mut self, record: &AuthorRecord) -> Result<()> {
        let author = record.to_new_author();
        let known = &self.memo;
        let learned = self.store.transaction(|tx| {
            let mut learned = Memo::default();
            resolve_author(tx, known, &mut learned, &author)?;
            Ok(learned)
        })?;
        self.memo.absorb(learned);
        Ok(())
    }

    /// Write a book and its author links; returns the number of new links
    fn ingest_book(&mut self, record: &BookRecord) -> Result<usize> {
        let book = PreparedBook::from_record(record, &self.options)?;
        let known = &self.memo;

        let (links, learned) = self.store.transaction(|tx| {
            let mut learned = Memo::default();
            let category_id = memoized(&known.categories, &mut learned.categories, &book.category, || {
                tx.upsert_category(&book.category)
            })?;
            let publisher_id = memoized(&known.publishers, &mut learned.publishers, &book.publisher, || {
                tx.upsert_publisher(&book.publisher)
            })?;
            let book_id = tx.upsert_book(&book.to_new_book(category_id, publisher_id))?;

            let mut links = 0;
            for author in &book.authors {
                let author_id = resolve_author(tx, known, &mut learned, author)?;
                if tx.link_book_author(book_id, author_id)? {
                    links += 1;
                }
            }
            tracing::debug!("Stored book {:?} (id {})", book.title, book_id);
            Ok((links, learned))
        })?;

        self.memo.absorb(learned);
        Ok(links)
    }

    /// Write a quote and its tags; returns the number of new tag links
    fn ingest_quote(&mut self, record: &QuoteRecord) -> Result<usize> {
        let text = normalize::clean_quote_text(&record.text);
        let author = record.author.to_new_author();
        let mut tags: Vec<String> = record
            .tags
            .iter()
            .map(|tag| normalize::clean_name(tag))
            .filter(|tag| !tag.is_empty())
            .collect();
        tags.sort();
        tags.dedup();

        let known = &self.memo;
        let (links, learned) = self.store.transaction(|tx| {
            let mut learned = Memo::default();
            let author_id = resolve_author(tx, known, &mut learned, &author)?;

            let mut quote = NewQuote::new(text.as_str(), author_id);
            if let Some(source) = &record.book_source {
                quote = quote.with_book_source(source.as_str());
            }
            let quote_id = tx.insert_quote(&quote)?;

            let mut links = 0;
            for tag in &tags {
                let tag_id = memoized(&known.tags, &mut learned.tags, tag, || tx.upsert_tag(tag))?;
                if tx.link_quote_tag(quote_id, tag_id)? {
                    links += 1;
                }
            }
            Ok((links, learned))
        })?;

        self.memo.absorb(learned);
        Ok(links)
    }

    /// Retry once when another writer won the race for a unique name.
    ///
    /// The memo is dropped so the retry re-reads every name from the store.
    fn with_name_retry<T, F>(&mut self, mut op: F) -> Result<T>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        match op(self) {
            Err(Error::Integrity(err @ IntegrityError::Uniqueness { .. })) if err.constraint().is_unique_name() => {
                tracing::warn!("{}; re-reading existing rows", err);
                self.memo.clear();
                op(self)
            }
            outcome => outcome,
        }
    }

    /// Apply the error policy to one record's outcome
    fn settle<T>(&mut self, key: &str, outcome: Result<T>) -> Result<Option<T>> {
        let err = match outcome {
            Ok(value) => return Ok(Some(value)),
            Err(err) => err,
        };

        if err.is_fatal() {
            tracing::error!("Stopping run at {}: {}", key, err);
            return Err(err);
        }

        match self.options.on_error {
            OnError::Skip => {
                tracing::warn!("Skipping {}: {}", key, err);
                self.report.failures.push(RecordFailure {
                    record: key.to_string(),
                    constraint: err.constraint(),
                    error: err.to_string(),
                });
                Ok(None)
            }
            OnError::Abort => {
                tracing::error!("Aborting run at {}: {}", key, err);
                Err(Error::Aborted {
                    record: key.to_string(),
                    source: Box::new(err),
                })
            }
        }
    }
}
