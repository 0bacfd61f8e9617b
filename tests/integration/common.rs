//! Shared fixtures

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use std::sync::{Arc, Mutex};

use libris_server::{
    config::{AppConfig, PasswordConfig},
    error::{AppError, AppResult},
    models::{
        Book, BookInput, BorrowRecord, BorrowRecordDetails, NewBorrowRecord, NewUser, ReaderInput,
        RecordScope, RemoteBook, User,
    },
    repository::{MemoryStore, Store, UnitOfWork},
    services::{catalog_lookup::CatalogLookup, clock::Clock, Services},
};

pub const ODYSSEY: &str = "9780140449136";

/// Clock the test moves by hand
pub struct TestClock {
    today: Mutex<NaiveDate>,
}

impl TestClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    pub fn advance(&self, days: i64) {
        let mut today = self.today.lock().unwrap();
        *today = *today + Duration::days(days);
    }
}

impl Clock for TestClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap()
    }
}

/// Lookup returning a single known entry
pub struct StubLookup;

impl StubLookup {
    pub fn odyssey() -> RemoteBook {
        RemoteBook {
            isbn: ODYSSEY.to_string(),
            title: "The Odyssey".to_string(),
            authors: vec!["Homer".to_string()],
            categories: vec!["Epic".to_string()],
            publisher: Some("Penguin".to_string()),
            published_date: Some("2003".to_string()),
            description: None,
            page_count: 541,
            thumbnail: None,
        }
    }
}

#[async_trait]
impl CatalogLookup for StubLookup {
    async fn search(&self, _query: &str, _max_results: u32) -> AppResult<Vec<RemoteBook>> {
        Ok(vec![Self::odyssey()])
    }

    async fn lookup_by_isbn(&self, isbn: &str) -> AppResult<Option<RemoteBook>> {
        Ok((isbn == ODYSSEY).then(Self::odyssey))
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Configuration with cheap password hashing and no background sweep
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = "integration-test-secret".to_string();
    config.passwords = PasswordConfig {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    };
    config.lending.sweep_enabled = false;
    config
}

pub struct Harness {
    pub services: Services,
    pub store: Arc<dyn Store>,
    pub clock: Arc<TestClock>,
    pub config: AppConfig,
}

pub fn harness() -> Harness {
    harness_with_store(Arc::new(MemoryStore::new()))
}

pub fn harness_with_store(store: Arc<dyn Store>) -> Harness {
    let config = test_config();
    let clock = Arc::new(TestClock::new(date(2024, 2, 20)));
    let services = Services::new(store.clone(), Arc::new(StubLookup), clock.clone(), &config);
    Harness {
        services,
        store,
        clock,
        config,
    }
}

/// Memory store whose units of work cannot lock one chosen record
pub struct FailingStore {
    inner: MemoryStore,
    broken_record: Arc<Mutex<Option<i32>>>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            broken_record: Arc::new(Mutex::new(None)),
        }
    }

    /// Handle used to choose the failing record once it exists
    pub fn broken_record(&self) -> Arc<Mutex<Option<i32>>> {
        self.broken_record.clone()
    }
}

#[async_trait]
impl Store for FailingStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(FailingUnitOfWork {
            inner: self.inner.begin().await?,
            broken_record: *self.broken_record.lock().unwrap(),
        }))
    }
}

struct FailingUnitOfWork {
    inner: Box<dyn UnitOfWork>,
    broken_record: Option<i32>,
}

#[async_trait]
impl UnitOfWork for FailingUnitOfWork {
    async fn get_book(&mut self, isbn: &str) -> AppResult<Option<Book>> {
        self.inner.get_book(isbn).await
    }

    async fn lock_book(&mut self, isbn: &str) -> AppResult<Option<Book>> {
        self.inner.lock_book(isbn).await
    }

    async fn list_books(&mut self) -> AppResult<Vec<Book>> {
        self.inner.list_books().await
    }

    async fn insert_book(&mut self, isbn: &str, title: &str, copies: i32) -> AppResult<()> {
        self.inner.insert_book(isbn, title, copies).await
    }

    async fn update_book(&mut self, isbn: &str, title: &str, copies: i32) -> AppResult<()> {
        self.inner.update_book(isbn, title, copies).await
    }

    async fn set_copies(&mut self, isbn: &str, copies: i32) -> AppResult<()> {
        self.inner.set_copies(isbn, copies).await
    }

    async fn delete_book(&mut self, isbn: &str) -> AppResult<()> {
        self.inner.delete_book(isbn).await
    }

    async fn replace_book_authors(&mut self, isbn: &str, names: &[String]) -> AppResult<()> {
        self.inner.replace_book_authors(isbn, names).await
    }

    async fn replace_book_genres(&mut self, isbn: &str, names: &[String]) -> AppResult<()> {
        self.inner.replace_book_genres(isbn, names).await
    }

    async fn insert_user(&mut self, user: &NewUser) -> AppResult<User> {
        self.inner.insert_user(user).await
    }

    async fn get_user(&mut self, id: i32) -> AppResult<Option<User>> {
        self.inner.get_user(id).await
    }

    async fn find_user_by_email(&mut self, email: &str) -> AppResult<Option<User>> {
        self.inner.find_user_by_email(email).await
    }

    async fn find_user_by_identifier(&mut self, identifier: &str) -> AppResult<Option<User>> {
        self.inner.find_user_by_identifier(identifier).await
    }

    async fn ticket_exists(&mut self, ticket: &str) -> AppResult<bool> {
        self.inner.ticket_exists(ticket).await
    }

    async fn insert_record(&mut self, record: &NewBorrowRecord) -> AppResult<BorrowRecord> {
        self.inner.insert_record(record).await
    }

    async fn get_record(&mut self, id: i32) -> AppResult<Option<BorrowRecord>> {
        self.inner.get_record(id).await
    }

    async fn lock_record(&mut self, id: i32) -> AppResult<Option<BorrowRecord>> {
        if self.broken_record == Some(id) {
            return Err(AppError::Internal(format!("record {} is locked elsewhere", id)));
        }
        self.inner.lock_record(id).await
    }

    async fn update_record(&mut self, record: &BorrowRecord) -> AppResult<()> {
        self.inner.update_record(record).await
    }

    async fn list_records(&mut self, scope: &RecordScope) -> AppResult<Vec<BorrowRecordDetails>> {
        self.inner.list_records(scope).await
    }

    async fn expired_reservation_ids(&mut self, today: NaiveDate) -> AppResult<Vec<i32>> {
        self.inner.expired_reservation_ids(today).await
    }

    async fn count_active_records(&mut self, isbn: &str) -> AppResult<i64> {
        self.inner.count_active_records(isbn).await
    }

    async fn delete_records_for_book(&mut self, isbn: &str) -> AppResult<u64> {
        self.inner.delete_records_for_book(isbn).await
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.inner.commit().await
    }
}

impl Harness {
    pub async fn add_book(&self, isbn: &str, copies: i32) -> Book {
        self.services
            .catalog
            .create_book(&BookInput {
                isbn: isbn.to_string(),
                title: format!("Book {}", &isbn[9..]),
                copies,
                authors: vec!["Some Author".to_string()],
                genres: Vec::new(),
            })
            .await
            .unwrap()
    }

    pub async fn add_reader(&self, email: &str) -> User {
        let (user, _) = self
            .services
            .users
            .create_reader(&ReaderInput {
                email: email.to_string(),
                full_name: "Test Reader".to_string(),
            })
            .await
            .unwrap();
        user
    }

    pub async fn copies(&self, isbn: &str) -> i32 {
        self.services.catalog.get_book(isbn).await.unwrap().copies_available
    }
}
