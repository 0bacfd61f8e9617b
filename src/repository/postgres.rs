//! Postgres store: one `sqlx` transaction per unit of work

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Pool, Postgres, Transaction};

use super::{books, borrow_records, users, Store, UnitOfWork};
use crate::{
    error::AppResult,
    models::{Book, BorrowRecord, BorrowRecordDetails, NewBorrowRecord, NewUser, RecordScope, User},
};

/// Postgres-backed store holding the connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// Open Postgres transaction; rolled back by `sqlx` when dropped uncommitted
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn get_book(&mut self, isbn: &str) -> AppResult<Option<Book>> {
        books::get(&mut self.tx, isbn).await
    }

    async fn lock_book(&mut self, isbn: &str) -> AppResult<Option<Book>> {
        books::lock(&mut self.tx, isbn).await
    }

    async fn list_books(&mut self) -> AppResult<Vec<Book>> {
        books::list(&mut self.tx).await
    }

    async fn insert_book(&mut self, isbn: &str, title: &str, copies: i32) -> AppResult<()> {
        books::insert(&mut self.tx, isbn, title, copies).await
    }

    async fn update_book(&mut self, isbn: &str, title: &str, copies: i32) -> AppResult<()> {
        books::update(&mut self.tx, isbn, title, copies).await
    }

    async fn set_copies(&mut self, isbn: &str, copies: i32) -> AppResult<()> {
        books::set_copies(&mut self.tx, isbn, copies).await
    }

    async fn delete_book(&mut self, isbn: &str) -> AppResult<()> {
        books::delete(&mut self.tx, isbn).await
    }

    async fn replace_book_authors(&mut self, isbn: &str, names: &[String]) -> AppResult<()> {
        books::replace_authors(&mut self.tx, isbn, names).await
    }

    async fn replace_book_genres(&mut self, isbn: &str, names: &[String]) -> AppResult<()> {
        books::replace_genres(&mut self.tx, isbn, names).await
    }

    async fn insert_user(&mut self, user: &NewUser) -> AppResult<User> {
        users::insert(&mut self.tx, user).await
    }

    async fn get_user(&mut self, id: i32) -> AppResult<Option<User>> {
        users::get_by_id(&mut self.tx, id).await
    }

    async fn find_user_by_email(&mut self, email: &str) -> AppResult<Option<User>> {
        users::get_by_email(&mut self.tx, email).await
    }

    async fn find_user_by_identifier(&mut self, identifier: &str) -> AppResult<Option<User>> {
        users::find_by_identifier(&mut self.tx, identifier).await
    }

    async fn ticket_exists(&mut self, ticket: &str) -> AppResult<bool> {
        users::ticket_exists(&mut self.tx, ticket).await
    }

    async fn insert_record(&mut self, record: &NewBorrowRecord) -> AppResult<BorrowRecord> {
        borrow_records::insert(&mut self.tx, record).await
    }

    async fn get_record(&mut self, id: i32) -> AppResult<Option<BorrowRecord>> {
        borrow_records::get(&mut self.tx, id).await
    }

    async fn lock_record(&mut self, id: i32) -> AppResult<Option<BorrowRecord>> {
        borrow_records::lock(&mut self.tx, id).await
    }

    async fn update_record(&mut self, record: &BorrowRecord) -> AppResult<()> {
        borrow_records::update(&mut self.tx, record).await
    }

    async fn list_records(&mut self, scope: &RecordScope) -> AppResult<Vec<BorrowRecordDetails>> {
        borrow_records::list(&mut self.tx, scope).await
    }

    async fn expired_reservation_ids(&mut self, today: NaiveDate) -> AppResult<Vec<i32>> {
        borrow_records::expired_reservation_ids(&mut self.tx, today).await
    }

    async fn count_active_records(&mut self, isbn: &str) -> AppResult<i64> {
        borrow_records::count_active(&mut self.tx, isbn).await
    }

    async fn delete_records_for_book(&mut self, isbn: &str) -> AppResult<u64> {
        borrow_records::delete_for_book(&mut self.tx, isbn).await
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
