//! Document store client for the book catalog.
//!
//! The catalog is a flat collection of book records keyed by a
//! server-generated id. [`BookStore`] is the seam between the HTTP layer and
//! whichever backend holds the records: [`memory::MemoryBookStore`] for
//! tests and local development, [`cosmos::CosmosBookStore`] for the real
//! document database.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub mod cosmos;
pub mod memory;

pub use cosmos::CosmosBookStore;
pub use memory::MemoryBookStore;

/// A catalog record. `id` is assigned by the store at creation and never
/// changes; a record without a cover is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Name of the cover image blob in the storage container. The store does
    /// not check that the referenced blob exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_blob: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

/// Fields supplied by the caller when creating a record.
#[derive(Debug, Clone, Default)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub price: Option<f64>,
    pub cover_blob: Option<String>,
}

/// Partial update of the mutable fields.
///
/// Merge policy: only fields present in the patch are written; omitted
/// fields keep their stored values. A consequence callers must be aware of
/// is that `price` and `cover_blob` cannot be cleared by omitting them.
#[derive(Debug, Clone, Default)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub price: Option<f64>,
    pub cover_blob: Option<String>,
}

impl BookPatch {
    /// Apply the patch to a record and stamp `updated_at`.
    pub(crate) fn apply(self, book: &mut Book, now: OffsetDateTime) {
        if let Some(title) = self.title {
            book.title = title;
        }
        if let Some(author) = self.author {
            book.author = author;
        }
        if let Some(price) = self.price {
            book.price = Some(price);
        }
        if let Some(cover_blob) = self.cover_blob {
            book.cover_blob = Some(cover_blob);
        }
        book.updated_at = Some(now);
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("book {0} not found")]
    NotFound(String),

    #[error("invalid store credential: {0}")]
    Credential(String),

    #[error("document store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("document store rejected request: HTTP {status}: {body}")]
    Backend { status: u16, body: String },
}

/// The four catalog operations plus delete. Thin wrappers over the backing
/// collection: no caching, no retries; a failed upstream call surfaces
/// directly to the caller.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Every record, most-recently-created first.
    async fn list_all(&self) -> Result<Vec<Book>, StoreError>;

    /// The record whose `id` field equals the argument.
    async fn get(&self, id: &str) -> Result<Book, StoreError>;

    /// Assign a fresh id, stamp `createdAt`, persist, and return the stored
    /// record.
    async fn create(&self, new: NewBook) -> Result<Book, StoreError>;

    /// Apply a partial update and stamp `updatedAt`; `NotFound` if the id is
    /// absent.
    async fn update(&self, id: &str, patch: BookPatch) -> Result<Book, StoreError>;

    /// Remove the record. Idempotent: deleting a nonexistent id succeeds.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

pub(crate) fn fresh_id() -> String {
    // v7 ids are time-ordered, which keeps creation order recoverable from
    // the id alone.
    Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn patch_leaves_omitted_fields_alone() {
        let mut book = Book {
            id: "b-1".to_string(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            price: Some(9.99),
            cover_blob: Some("covers/123-dune.png".to_string()),
            created_at: datetime!(2024-01-01 00:00:00 UTC),
            updated_at: None,
        };

        let patch = BookPatch {
            title: Some("Dune Messiah".to_string()),
            ..BookPatch::default()
        };
        patch.apply(&mut book, datetime!(2024-02-01 00:00:00 UTC));

        assert_eq!(book.title, "Dune Messiah");
        assert_eq!(book.author, "Frank Herbert");
        assert_eq!(book.price, Some(9.99));
        assert_eq!(book.cover_blob.as_deref(), Some("covers/123-dune.png"));
        assert_eq!(book.updated_at, Some(datetime!(2024-02-01 00:00:00 UTC)));
    }

    #[test]
    fn book_serializes_camel_case_without_absent_fields() {
        let book = Book {
            id: "b-2".to_string(),
            title: "A".to_string(),
            author: "B".to_string(),
            price: None,
            cover_blob: None,
            created_at: datetime!(2024-01-01 00:00:00 UTC),
            updated_at: None,
        };

        let value = serde_json::to_value(&book).unwrap();
        assert_eq!(value["createdAt"], "2024-01-01T00:00:00Z");
        assert!(value.get("price").is_none());
        assert!(value.get("coverBlob").is_none());
        assert!(value.get("updatedAt").is_none());
    }

    #[test]
    fn fresh_ids_are_unique() {
        assert_ne!(fresh_id(), fresh_id());
    }
}
