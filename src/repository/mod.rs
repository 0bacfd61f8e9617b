//! Repository layer: explicit units of work over the library storage
//!
//! Every service operation opens one [`UnitOfWork`] through [`Store::begin`],
//! performs all of its reads and writes through it and finishes with
//! [`UnitOfWork::commit`]. Dropping a unit of work without committing rolls
//! back everything it wrote.
//!
//! `lock_book` and `lock_record` hold the row until the unit of work ends.
//! Operations touching both rows lock the record first, then the book.

pub mod books;
pub mod borrow_records;
pub mod memory;
pub mod postgres;
pub mod users;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    error::AppResult,
    models::{Book, BorrowRecord, BorrowRecordDetails, NewBorrowRecord, NewUser, RecordScope, User},
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage backend able to open units of work
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>>;
}

/// One atomic storage transaction
#[async_trait]
pub trait UnitOfWork: Send {
    // Catalog

    async fn get_book(&mut self, isbn: &str) -> AppResult<Option<Book>>;

    /// Fetch the book and hold its row lock until the unit of work ends
    async fn lock_book(&mut self, isbn: &str) -> AppResult<Option<Book>>;

    async fn list_books(&mut self) -> AppResult<Vec<Book>>;

    async fn insert_book(&mut self, isbn: &str, title: &str, copies: i32) -> AppResult<()>;

    async fn update_book(&mut self, isbn: &str, title: &str, copies: i32) -> AppResult<()>;

    async fn set_copies(&mut self, isbn: &str, copies: i32) -> AppResult<()>;

    async fn delete_book(&mut self, isbn: &str) -> AppResult<()>;

    /// Upsert authors by exact name and make them the book's whole author set
    async fn replace_book_authors(&mut self, isbn: &str, names: &[String]) -> AppResult<()>;

    /// Upsert genres by exact name and make them the book's whole genre set
    async fn replace_book_genres(&mut self, isbn: &str, names: &[String]) -> AppResult<()>;

    // Identity

    async fn insert_user(&mut self, user: &NewUser) -> AppResult<User>;

    async fn get_user(&mut self, id: i32) -> AppResult<Option<User>>;

    async fn find_user_by_email(&mut self, email: &str) -> AppResult<Option<User>>;

    /// Exact match on email or ticket number
    async fn find_user_by_identifier(&mut self, identifier: &str) -> AppResult<Option<User>>;

    async fn ticket_exists(&mut self, ticket: &str) -> AppResult<bool>;

    // Ledger

    async fn insert_record(&mut self, record: &NewBorrowRecord) -> AppResult<BorrowRecord>;

    async fn get_record(&mut self, id: i32) -> AppResult<Option<BorrowRecord>>;

    /// Fetch the record and hold its row lock until the unit of work ends
    async fn lock_record(&mut self, id: i32) -> AppResult<Option<BorrowRecord>>;

    /// Persist status and the evolving dates of an existing record
    async fn update_record(&mut self, record: &BorrowRecord) -> AppResult<()>;

    /// Records in `scope`, ordered by id, joined with book and reader details
    async fn list_records(&mut self, scope: &RecordScope) -> AppResult<Vec<BorrowRecordDetails>>;

    /// Ids of reserved records whose expiry is before `today`
    async fn expired_reservation_ids(&mut self, today: NaiveDate) -> AppResult<Vec<i32>>;

    /// Reserved or issued records of a book
    async fn count_active_records(&mut self, isbn: &str) -> AppResult<i64>;

    async fn delete_records_for_book(&mut self, isbn: &str) -> AppResult<u64>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}
