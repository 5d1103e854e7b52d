//! In-memory catalog backend.
//!
//! Keeps records in a `RwLock<Vec<_>>` with newest-first insertion, so list
//! order matches the contract without sorting. Serves as the test double for
//! the HTTP layer and as a local-dev backend when no database is configured.

use std::sync::RwLock;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{fresh_id, Book, BookPatch, BookStore, NewBook, StoreError};

#[derive(Default)]
pub struct MemoryBookStore {
    books: RwLock<Vec<Book>>,
}

impl MemoryBookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookStore for MemoryBookStore {
    async fn list_all(&self) -> Result<Vec<Book>, StoreError> {
        let books = self.books.read().expect("book store lock poisoned");
        Ok(books.clone())
    }

    async fn get(&self, id: &str) -> Result<Book, StoreError> {
        let books = self.books.read().expect("book store lock poisoned");
        books
            .iter()
            .find(|book| book.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn create(&self, new: NewBook) -> Result<Book, StoreError> {
        let book = Book {
            id: fresh_id(),
            title: new.title,
            author: new.author,
            price: new.price,
            cover_blob: new.cover_blob,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
        };

        let mut books = self.books.write().expect("book store lock poisoned");
        books.insert(0, book.clone());
        Ok(book)
    }

    async fn update(&self, id: &str, patch: BookPatch) -> Result<Book, StoreError> {
        let mut books = self.books.write().expect("book store lock poisoned");
        let book = books
            .iter_mut()
            .find(|book| book.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        patch.apply(book, OffsetDateTime::now_utc());
        Ok(book.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut books = self.books.write().expect("book store lock poisoned");
        books.retain(|book| book.id != id);
        Ok(())
    }
}
