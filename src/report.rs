//! Read-side queries over the relational store
//!
//! The joins used to sanity-check an ingestion run: listings with their
//! category and publisher, books per author, price statistics per category
//! and quotes with their tags.

use rusqlite::types::Type;
use serde::Serialize;
use tabled::Tabled;

use crate::Result;
use crate::storage::SqliteStore;

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct BookListing {
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "Category")]
    pub category: String,
    #[tabled(rename = "Publisher")]
    pub publisher: String,
    #[tabled(rename = "Price", display_with = "display_price")]
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct AuthorBookCount {
    #[tabled(rename = "Author")]
    pub author: String,
    #[tabled(rename = "Books")]
    pub books: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct CategoryStats {
    #[tabled(rename = "Category")]
    pub category: String,
    #[tabled(rename = "Books")]
    pub books: usize,
    /// `None` for a category without books
    #[tabled(rename = "Avg price", display_with = "display_avg_price")]
    pub avg_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct QuoteListing {
    #[tabled(rename = "Quote", display_with = "display_excerpt")]
    pub text: String,
    #[tabled(rename = "Author")]
    pub author: String,
    #[tabled(rename = "Tags", display_with = "display_tags")]
    pub tags: Vec<String>,
}

fn display_price(price: &f64) -> String {
    format!("{:.2}", price)
}

fn display_avg_price(price: &Option<f64>) -> String {
    price.map(|p| format!("{:.2}", p)).unwrap_or_else(|| "-".to_string())
}

fn display_excerpt(text: &str) -> String {
    let excerpt: String = text.chars().take(60).collect();
    if excerpt.len() < text.len() {
        format!("{}...", excerpt)
    } else {
        excerpt
    }
}

fn display_tags(tags: &[String]) -> String {
    if tags.is_empty() {
        "-".to_string()
    } else {
        tags.join(", ")
    }
}

/// First `limit` books in insertion order
pub fn list_books(store: &SqliteStore, limit: usize) -> Result<Vec<BookListing>> {
    let mut stmt = store.connection().prepare(
        "SELECT b.title, c.name, p.name, b.price
         FROM books b
         JOIN categories c ON b.category_id = c.id
         JOIN publishers p ON b.publisher_id = p.id
         ORDER BY b.id
         LIMIT ?1",
    )?;

    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(BookListing {
                title: row.get(0)?,
                category: row.get(1)?,
                publisher: row.get(2)?,
                price: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Book count for every author, including authors with none
pub fn books_per_author(store: &SqliteStore) -> Result<Vec<AuthorBookCount>> {
    let mut stmt = store.connection().prepare(
        "SELECT a.name, COUNT(ba.book_id) AS books
         FROM authors a
         LEFT JOIN book_authors ba ON ba.author_id = a.id
         GROUP BY a.id, a.name
         ORDER BY books DESC, a.name",
    )?;

    let rows = stmt
        .query_map([], |row| {
            let books: i64 = row.get(1)?;
            Ok(AuthorBookCount {
                author: row.get(0)?,
                books: books as usize,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Book count and average price for every category, including empty ones
pub fn category_stats(store: &SqliteStore) -> Result<Vec<CategoryStats>> {
    let mut stmt = store.connection().prepare(
        "SELECT c.name, COUNT(b.id), AVG(b.price)
         FROM categories c
         LEFT JOIN books b ON b.category_id = c.id
         GROUP BY c.id, c.name
         ORDER BY c.name",
    )?;

    let rows = stmt
        .query_map([], |row| {
            let books: i64 = row.get(1)?;
            Ok(CategoryStats {
                category: row.get(0)?,
                books: books as usize,
                avg_price: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// First `limit` quotes with author and sorted tag names
pub fn quotes_with_tags(store: &SqliteStore, limit: usize) -> Result<Vec<QuoteListing>> {
    let mut stmt = store.connection().prepare(
        "SELECT q.text, a.name, json_group_array(t.name) FILTER (WHERE t.name IS NOT NULL)
         FROM quotes q
         JOIN authors a ON q.author_id = a.id
         LEFT JOIN quote_tags qt ON qt.quote_id = q.id
         LEFT JOIN tags t ON qt.tag_id = t.id
         GROUP BY q.id, q.text, a.name
         ORDER BY q.id
         LIMIT ?1",
    )?;

    let rows = stmt
        .query_map([limit as i64], |row| {
            let tags_json: String = row.get(2)?;
            let mut tags: Vec<String> = serde_json::from_str(&tags_json)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
            tags.sort();
            Ok(QuoteListing {
                text: row.get(0)?,
                author: row.get(1)?,
                tags,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewAuthor, NewBook, NewQuote};

    #[test]
    fn test_category_stats_scenario() {
        let store = SqliteStore::open_in_memory().unwrap();
        let fiction = store.upsert_category("Fiction").unwrap();
        store.upsert_category("Poetry").unwrap();
        let pubx = store.upsert_publisher("PubX").unwrap();
        store.upsert_book(&NewBook::new("Title A", 12.50, 3, fiction, pubx, "")).unwrap();

        let stats = category_stats(&store).unwrap();
        assert_eq!(
            stats,
            vec![
                CategoryStats { category: "Fiction".into(), books: 1, avg_price: Some(12.50) },
                CategoryStats { category: "Poetry".into(), books: 0, avg_price: None },
            ]
        );

        let listing = list_books(&store, 10).unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].publisher, "PubX");
    }

    #[test]
    fn test_books_per_author_includes_authors_without_books() {
        let store = SqliteStore::open_in_memory().unwrap();
        let cat = store.upsert_category("Fiction").unwrap();
        let publisher = store.upsert_publisher("PubX").unwrap();
        let jane = store.upsert_author(&NewAuthor::new("Jane Doe")).unwrap();
        store.upsert_author(&NewAuthor::new("John Roe")).unwrap();

        for title in ["One", "Two"] {
            let book = store.upsert_book(&NewBook::new(title, 1.0, 1, cat, publisher, "")).unwrap();
            store.link_book_author(book, jane).unwrap();
        }

        let counts = books_per_author(&store).unwrap();
        assert_eq!(counts[0], AuthorBookCount { author: "Jane Doe".into(), books: 2 });
        assert_eq!(counts[1], AuthorBookCount { author: "John Roe".into(), books: 0 });
    }

    #[test]
    fn test_quotes_with_tags() {
        let store = SqliteStore::open_in_memory().unwrap();
        let jane = store.upsert_author(&NewAuthor::new("Jane Doe")).unwrap();
        let tagged = store.insert_quote(&NewQuote::new("text1", jane)).unwrap();
        store.insert_quote(&NewQuote::new("text2", jane)).unwrap();
        for tag in ["wisdom", "life"] {
            let tag = store.upsert_tag(tag).unwrap();
            store.link_quote_tag(tagged, tag).unwrap();
        }

        let quotes = quotes_with_tags(&store, 5).unwrap();
        assert_eq!(quotes[0].tags, vec!["life".to_string(), "wisdom".to_string()]);
        assert!(quotes[1].tags.is_empty());
        assert_eq!(display_tags(&quotes[1].tags), "-");
    }

    #[test]
    fn test_quote_tags_keep_control_characters() {
        let store = SqliteStore::open_in_memory().unwrap();
        let jane = store.upsert_author(&NewAuthor::new("Jane Doe")).unwrap();
        let quote = store.insert_quote(&NewQuote::new("text1", jane)).unwrap();
        for tag in ["a\u{1F}b", "c,d"] {
            let tag = store.upsert_tag(tag).unwrap();
            store.link_quote_tag(quote, tag).unwrap();
        }

        let quotes = quotes_with_tags(&store, 5).unwrap();
        assert_eq!(quotes[0].tags, vec!["a\u{1F}b".to_string(), "c,d".to_string()]);
    }
}
