//! In-memory store for development runs and tests
//!
//! A unit of work owns the lock over the whole dataset, so units of work run
//! one at a time. Writes are applied in place and journaled; dropping an
//! uncommitted unit of work replays the journal backwards.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Store, UnitOfWork};
use crate::{
    error::{AppError, AppResult},
    models::{
        Book, BorrowRecord, BorrowRecordDetails, BorrowStatus, NewBorrowRecord, NewUser, RecordScope,
        User,
    },
};

#[derive(Debug, Default)]
struct MemoryState {
    books: BTreeMap<String, Book>,
    authors: BTreeSet<String>,
    genres: BTreeSet<String>,
    users: BTreeMap<i32, User>,
    records: BTreeMap<i32, BorrowRecord>,
    last_user_id: i32,
    last_record_id: i32,
}

/// Previous value of something a unit of work changed
#[derive(Debug)]
enum Undo {
    Book(String, Option<Book>),
    Author(String),
    Genre(String),
    User(i32),
    Record(i32, Option<BorrowRecord>),
}

/// Store keeping the whole library in process memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let state = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryUnitOfWork {
            state,
            journal: Vec::new(),
            committed: false,
        }))
    }
}

pub struct MemoryUnitOfWork {
    state: OwnedMutexGuard<MemoryState>,
    journal: Vec<Undo>,
    committed: bool,
}

impl MemoryUnitOfWork {
    fn put_book(&mut self, isbn: &str, book: Option<Book>) {
        let previous = match book {
            Some(book) => self.state.books.insert(isbn.to_string(), book),
            None => self.state.books.remove(isbn),
        };
        self.journal.push(Undo::Book(isbn.to_string(), previous));
    }

    fn put_record(&mut self, record: BorrowRecord) {
        let previous = self.state.records.insert(record.id, record.clone());
        self.journal.push(Undo::Record(record.id, previous));
    }

    fn stored_book(&self, isbn: &str) -> AppResult<Book> {
        self.state
            .books
            .get(isbn)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", isbn)))
    }

    fn rollback(&mut self) {
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::Book(isbn, Some(book)) => {
                    self.state.books.insert(isbn, book);
                }
                Undo::Book(isbn, None) => {
                    self.state.books.remove(&isbn);
                }
                Undo::Author(name) => {
                    self.state.authors.remove(&name);
                }
                Undo::Genre(name) => {
                    self.state.genres.remove(&name);
                }
                Undo::User(id) => {
                    self.state.users.remove(&id);
                }
                Undo::Record(id, Some(record)) => {
                    self.state.records.insert(id, record);
                }
                Undo::Record(id, None) => {
                    self.state.records.remove(&id);
                }
            }
        }
    }
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

fn sorted_names(names: &[String]) -> Vec<String> {
    let mut names = names.to_vec();
    names.sort();
    names.dedup();
    names
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn get_book(&mut self, isbn: &str) -> AppResult<Option<Book>> {
        Ok(self.state.books.get(isbn).cloned())
    }

    async fn lock_book(&mut self, isbn: &str) -> AppResult<Option<Book>> {
        Ok(self.state.books.get(isbn).cloned())
    }

    async fn list_books(&mut self) -> AppResult<Vec<Book>> {
        let mut books: Vec<Book> = self.state.books.values().cloned().collect();
        books.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.isbn.cmp(&b.isbn)));
        Ok(books)
    }

    async fn insert_book(&mut self, isbn: &str, title: &str, copies: i32) -> AppResult<()> {
        if self.state.books.contains_key(isbn) {
            return Err(AppError::Conflict("ISBN already exists".to_string()));
        }
        let book = Book {
            isbn: isbn.to_string(),
            title: title.to_string(),
            copies_available: copies,
            authors: Vec::new(),
            genres: Vec::new(),
        };
        self.put_book(isbn, Some(book));
        Ok(())
    }

    async fn update_book(&mut self, isbn: &str, title: &str, copies: i32) -> AppResult<()> {
        let mut book = self.stored_book(isbn)?;
        book.title = title.to_string();
        book.copies_available = copies;
        self.put_book(isbn, Some(book));
        Ok(())
    }

    async fn set_copies(&mut self, isbn: &str, copies: i32) -> AppResult<()> {
        if copies < 0 {
            return Err(AppError::Internal(format!(
                "copies_available for {} would become {}",
                isbn, copies
            )));
        }
        let mut book = self.stored_book(isbn)?;
        book.copies_available = copies;
        self.put_book(isbn, Some(book));
        Ok(())
    }

    async fn delete_book(&mut self, isbn: &str) -> AppResult<()> {
        self.put_book(isbn, None);
        Ok(())
    }

    async fn replace_book_authors(&mut self, isbn: &str, names: &[String]) -> AppResult<()> {
        for name in names {
            if self.state.authors.insert(name.clone()) {
                self.journal.push(Undo::Author(name.clone()));
            }
        }
        let mut book = self.stored_book(isbn)?;
        book.authors = sorted_names(names);
        self.put_book(isbn, Some(book));
        Ok(())
    }

    async fn replace_book_genres(&mut self, isbn: &str, names: &[String]) -> AppResult<()> {
        for name in names {
            if self.state.genres.insert(name.clone()) {
                self.journal.push(Undo::Genre(name.clone()));
            }
        }
        let mut book = self.stored_book(isbn)?;
        book.genres = sorted_names(names);
        self.put_book(isbn, Some(book));
        Ok(())
    }

    async fn insert_user(&mut self, user: &NewUser) -> AppResult<User> {
        let duplicate = self.state.users.values().any(|u| {
            u.email == user.email
                || (user.ticket_number.is_some() && u.ticket_number == user.ticket_number)
        });
        if duplicate {
            return Err(AppError::Conflict("Email or ticket number already registered".to_string()));
        }

        self.state.last_user_id += 1;
        let created = User {
            id: self.state.last_user_id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            ticket_number: user.ticket_number.clone(),
            password_hash: user.password_hash.clone(),
            created_at: user.created_at,
            is_active: true,
        };
        self.state.users.insert(created.id, created.clone());
        self.journal.push(Undo::User(created.id));
        Ok(created)
    }

    async fn get_user(&mut self, id: i32) -> AppResult<Option<User>> {
        Ok(self.state.users.get(&id).cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> AppResult<Option<User>> {
        Ok(self.state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_identifier(&mut self, identifier: &str) -> AppResult<Option<User>> {
        Ok(self
            .state
            .users
            .values()
            .find(|u| u.email == identifier || u.ticket_number.as_deref() == Some(identifier))
            .cloned())
    }

    async fn ticket_exists(&mut self, ticket: &str) -> AppResult<bool> {
        Ok(self
            .state
            .users
            .values()
            .any(|u| u.ticket_number.as_deref() == Some(ticket)))
    }

    async fn insert_record(&mut self, record: &NewBorrowRecord) -> AppResult<BorrowRecord> {
        if !self.state.books.contains_key(&record.book_isbn) {
            return Err(AppError::NotFound(format!("Book {} not found", record.book_isbn)));
        }
        if !self.state.users.contains_key(&record.user_id) {
            return Err(AppError::NotFound(format!("User {} not found", record.user_id)));
        }

        self.state.last_record_id += 1;
        let created = BorrowRecord {
            id: self.state.last_record_id,
            book_isbn: record.book_isbn.clone(),
            user_id: record.user_id,
            borrow_date: record.borrow_date,
            reservation_expiry: Some(record.reservation_expiry),
            issue_date: None,
            return_date: None,
            status: BorrowStatus::Reserved,
        };
        self.put_record(created.clone());
        Ok(created)
    }

    async fn get_record(&mut self, id: i32) -> AppResult<Option<BorrowRecord>> {
        Ok(self.state.records.get(&id).cloned())
    }

    async fn lock_record(&mut self, id: i32) -> AppResult<Option<BorrowRecord>> {
        Ok(self.state.records.get(&id).cloned())
    }

    async fn update_record(&mut self, record: &BorrowRecord) -> AppResult<()> {
        let mut stored = self
            .state
            .records
            .get(&record.id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Borrow record {} not found", record.id)))?;
        stored.status = record.status;
        stored.reservation_expiry = record.reservation_expiry;
        stored.issue_date = record.issue_date;
        stored.return_date = record.return_date;
        self.put_record(stored);
        Ok(())
    }

    async fn list_records(&mut self, scope: &RecordScope) -> AppResult<Vec<BorrowRecordDetails>> {
        let state = &*self.state;
        let details = state
            .records
            .values()
            .filter(|r| scope.matches(r))
            .filter_map(|r| {
                let book = state.books.get(&r.book_isbn)?;
                let user = state.users.get(&r.user_id)?;
                Some(BorrowRecordDetails {
                    id: r.id,
                    book_isbn: r.book_isbn.clone(),
                    book_title: book.title.clone(),
                    user_id: r.user_id,
                    user_email: user.email.clone(),
                    user_ticket: user.ticket_number.clone().unwrap_or_else(|| "-".to_string()),
                    user_full_name: user.full_name.clone(),
                    borrow_date: r.borrow_date,
                    reservation_expiry: r.reservation_expiry,
                    issue_date: r.issue_date,
                    return_date: r.return_date,
                    status: r.status,
                })
            })
            .collect();
        Ok(details)
    }

    async fn expired_reservation_ids(&mut self, today: NaiveDate) -> AppResult<Vec<i32>> {
        Ok(self
            .state
            .records
            .values()
            .filter(|r| r.is_expired(today))
            .map(|r| r.id)
            .collect())
    }

    async fn count_active_records(&mut self, isbn: &str) -> AppResult<i64> {
        let count = self
            .state
            .records
            .values()
            .filter(|r| r.book_isbn == isbn && !r.status.is_terminal())
            .count();
        Ok(count as i64)
    }

    async fn delete_records_for_book(&mut self, isbn: &str) -> AppResult<u64> {
        let ids: Vec<i32> = self
            .state
            .records
            .values()
            .filter(|r| r.book_isbn == isbn)
            .map(|r| r.id)
            .collect();
        for id in &ids {
            let previous = self.state.records.remove(id);
            self.journal.push(Undo::Record(*id, previous));
        }
        Ok(ids.len() as u64)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let mut this = self;
        this.committed = true;
        this.journal.clear();
        Ok(())
    }
}
