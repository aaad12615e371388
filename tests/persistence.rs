use booksdb::config::{self, BooksDbConfig};
use booksdb::{Constraint, IngestOptions, Ingestor, NewBook, RecordSet, SqliteStore, StoreConfig, Table};

const SCRAPED: &str = r#"{
    "authors": [{"name": "Jane Doe", "birth_date": "March 14, 1879"}],
    "books": [
        {
            "title": "Title A",
            "price": "£12.50",
            "availability": "In stock (3 available)",
            "category": "Fiction 2",
            "publisher": "PubX",
            "authors": ["Jane Doe"]
        },
        {
            "title": "Broken",
            "price": "£-1.00",
            "category": "Fiction",
            "publisher": "PubX"
        }
    ],
    "quotes": [{"text": "“text1”", "author": "Jane Doe", "tags": ["wisdom", "life"]}]
}"#;

#[test]
fn ingest_from_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scraped.json");
    std::fs::write(&input, SCRAPED).unwrap();
    let db_path = dir.path().join("data").join("books.db");
    config::ensure_db_dir(&db_path).unwrap();

    let records = RecordSet::from_path(&input).unwrap();
    assert_eq!(records.len(), 4);

    let mut store = SqliteStore::open(&db_path).unwrap();
    let report = Ingestor::new(&mut store, IngestOptions::default()).ingest(&records).unwrap();
    assert_eq!(report.books, 1);
    assert_eq!(report.quotes, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].constraint, Some(Constraint::BookPrice));
    store.close().unwrap();

    let store = SqliteStore::open(&db_path).unwrap();
    let stats = store.stats().unwrap();
    assert_eq!(stats.books, 1);
    assert_eq!(stats.categories, 1);
    assert_eq!(stats.book_authors, 1);
    assert_eq!(stats.quote_tags, 2);

    let author = store.find_author("Jane Doe").unwrap().unwrap();
    assert_eq!(author.birth_date.as_deref(), Some("1879-01-01"));
    let publisher = store.find_publisher("PubX").unwrap().unwrap();
    let book = store.find_book("Title A", publisher.id).unwrap().unwrap();
    assert_eq!(book.stock, 3);
    assert_eq!(store.authors_of_book(book.id).unwrap()[0].id, author.id);
}

#[test]
fn reingesting_the_same_file_adds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scraped.json");
    std::fs::write(&input, SCRAPED).unwrap();
    let records = RecordSet::from_path(&input).unwrap();

    let mut store = SqliteStore::open(&dir.path().join("books.db")).unwrap();
    Ingestor::new(&mut store, IngestOptions::default()).ingest(&records).unwrap();
    let before = store.stats().unwrap();

    let report = Ingestor::new(&mut store, IngestOptions::default()).ingest(&records).unwrap();
    assert_eq!(report.book_author_links, 0);
    assert_eq!(report.quote_tag_links, 0);
    assert_eq!(store.stats().unwrap(), before);
}

#[test]
fn store_config_without_create_rejects_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.db");

    let err = SqliteStore::connect(&StoreConfig::file(&missing).create_if_missing(false)).unwrap_err();
    assert!(matches!(err, booksdb::Error::Connection { .. }));
    assert!(!missing.exists());
}

#[test]
fn config_file_drives_store_and_ingest_options() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("booksdb.toml");
    std::fs::write(
        &config_path,
        format!(
            "database = {:?}\nbusy_timeout_ms = 100\non_error = \"abort\"\ndefault_publisher = \"Unknown\"\n",
            dir.path().join("books.db").display().to_string()
        ),
    )
    .unwrap();

    let settings: BooksDbConfig = config::load_config(Some(&config_path)).unwrap().unwrap();
    let mut store = SqliteStore::connect(&settings.store_config(None)).unwrap();
    let options = settings.ingest_options();
    assert_eq!(options.default_publisher.as_deref(), Some("Unknown"));

    let records: RecordSet = serde_json::from_str(
        r#"{"books": [{"title": "Orphan", "price": 3.0, "category": "Poetry"}]}"#,
    )
    .unwrap();
    Ingestor::new(&mut store, options).ingest(&records).unwrap();

    let unknown = store.find_publisher("Unknown").unwrap().unwrap();
    assert!(store.find_book("Orphan", unknown.id).unwrap().is_some());

    let category = store.find_category("Poetry").unwrap().unwrap();
    let err = store
        .upsert_book(&NewBook::new("Orphan", 3.0, 0, category.id, booksdb::PublisherId(9_999), ""))
        .unwrap_err();
    assert_eq!(err.constraint(), Some(Constraint::BookPublisher));
    assert_eq!(store.count(Table::Books).unwrap(), 1);
}
