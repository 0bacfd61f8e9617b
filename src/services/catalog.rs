//! Catalog management service

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{filter_books, validate_isbn},
        Availability, Book, BookInput, LibraryStats,
    },
    repository::{Store, UnitOfWork},
    services::catalog_lookup::CatalogLookup,
};

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    lookup: Arc<dyn CatalogLookup>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, lookup: Arc<dyn CatalogLookup>) -> Self {
        Self { store, lookup }
    }

    /// All books ordered by title, then ISBN
    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        let mut uow = self.store.begin().await?;
        let books = uow.list_books().await?;
        uow.commit().await?;
        Ok(books)
    }

    /// Get a book by ISBN
    pub async fn get_book(&self, isbn: &str) -> AppResult<Book> {
        validate_isbn(isbn)?;
        let mut uow = self.store.begin().await?;
        let book = uow.get_book(isbn).await?;
        uow.commit().await?;
        book.ok_or_else(|| AppError::NotFound("Book not found".to_string()))
    }

    /// Case-insensitive title/ISBN/author search with an availability filter
    pub async fn search_books(&self, query: &str, status: Availability) -> AppResult<Vec<Book>> {
        let books = self.list_books().await?;
        Ok(filter_books(books, query, status))
    }

    pub async fn library_stats(&self) -> AppResult<LibraryStats> {
        let books = self.list_books().await?;
        Ok(LibraryStats::from_books(&books))
    }

    /// Create a book with its authors and genres in one unit of work
    pub async fn create_book(&self, input: &BookInput) -> AppResult<Book> {
        let input = input.validated()?;

        let mut uow = self.store.begin().await?;
        if uow.get_book(&input.isbn).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "A book with ISBN {} already exists",
                input.isbn
            )));
        }
        uow.insert_book(&input.isbn, &input.title, input.copies).await?;
        let book = Self::link_and_reload(&mut *uow, &input).await?;
        uow.commit().await?;

        tracing::info!("Catalog: created book {} with {} copies", book.isbn, book.copies_available);
        Ok(book)
    }

    /// Replace title, copy count, authors and genres of an existing book.
    /// Empty author or genre lists unlink all of them.
    pub async fn update_book(&self, isbn: &str, input: &BookInput) -> AppResult<Book> {
        let mut input = input.clone();
        input.isbn = isbn.to_string();
        let input = input.validated()?;

        let mut uow = self.store.begin().await?;
        if uow.lock_book(&input.isbn).await?.is_none() {
            return Err(AppError::NotFound("Book not found".to_string()));
        }
        uow.update_book(&input.isbn, &input.title, input.copies).await?;
        let book = Self::link_and_reload(&mut *uow, &input).await?;
        uow.commit().await?;

        tracing::info!("Catalog: updated book {}", book.isbn);
        Ok(book)
    }

    /// Delete a book and its finished borrow history.
    /// Refused while any reservation or loan of the book is still open.
    pub async fn delete_book(&self, isbn: &str) -> AppResult<()> {
        validate_isbn(isbn)?;

        let mut uow = self.store.begin().await?;
        if uow.lock_book(isbn).await?.is_none() {
            return Err(AppError::NotFound("Book not found".to_string()));
        }
        let active = uow.count_active_records(isbn).await?;
        if active > 0 {
            return Err(AppError::Conflict(format!(
                "Book {} has {} active reservation(s) or loan(s)",
                isbn, active
            )));
        }
        let history = uow.delete_records_for_book(isbn).await?;
        uow.delete_book(isbn).await?;
        uow.commit().await?;

        tracing::info!("Catalog: deleted book {} ({} history records removed)", isbn, history);
        Ok(())
    }

    /// Create a local book from the external catalog entry for `isbn`
    pub async fn import_from_lookup(&self, isbn: &str, copies: i32) -> AppResult<Book> {
        validate_isbn(isbn)?;

        let remote = self
            .lookup
            .lookup_by_isbn(isbn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No catalog lookup entry for ISBN {}", isbn)))?;

        self.create_book(&remote.to_book_input(isbn, copies)).await
    }

    async fn link_and_reload(uow: &mut dyn UnitOfWork, input: &BookInput) -> AppResult<Book> {
        uow.replace_book_authors(&input.isbn, &input.authors).await?;
        uow.replace_book_genres(&input.isbn, &input.genres).await?;
        uow.get_book(&input.isbn)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Book {} vanished during write", input.isbn)))
    }
}
