//! Reservation and loan lifecycle service
//!
//! Each operation runs in a single unit of work. Transitions lock the record
//! before the book, so concurrent operations on the same record serialize and
//! the first to lock it wins.

use chrono::NaiveDate;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::validate_isbn,
        borrow_record::{filter_records, ProfileData, RecordFilter},
        BorrowEvent, BorrowRecord, BorrowRecordDetails, BorrowStatus, NewBorrowRecord, RecordScope,
    },
    repository::{Store, UnitOfWork},
    services::clock::Clock,
};

/// Returned records shown on a reader's profile
const PROFILE_HISTORY_LEN: usize = 10;

/// Longest reservation a reader may ask for
pub const MAX_RESERVATION_DAYS: i64 = 365;

#[derive(Clone)]
pub struct LoansService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    reservation_days: i64,
}

impl LoansService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, reservation_days: i64) -> Self {
        Self {
            store,
            clock,
            reservation_days,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Reserve one copy of a book for a reader. Returns the new record id.
    pub async fn reserve_book(
        &self,
        isbn: &str,
        user_id: i32,
        reservation_days: Option<i64>,
    ) -> AppResult<i32> {
        let days = self.check_reservation(isbn, user_id, reservation_days)?;

        let mut uow = self.store.begin().await?;
        let record = Self::reserve_in(&mut *uow, isbn, user_id, self.today(), days).await?;
        uow.commit().await?;

        tracing::info!(
            "Loans: user {} reserved {} (record {}, expires {:?})",
            user_id, isbn, record.id, record.reservation_expiry
        );
        Ok(record.id)
    }

    /// Hand a reserved copy to the reader
    pub async fn issue_book(&self, record_id: i32) -> AppResult<BorrowRecord> {
        let record = self.transition(record_id, BorrowEvent::Issue, self.today()).await?;
        tracing::info!("Loans: issued record {} ({})", record.id, record.book_isbn);
        Ok(record)
    }

    /// Reserve and issue in one step, for a reader at the desk
    pub async fn issue_directly(&self, isbn: &str, user_id: i32) -> AppResult<BorrowRecord> {
        let days = self.check_reservation(isbn, user_id, None)?;
        let today = self.today();

        let mut uow = self.store.begin().await?;
        let mut record = Self::reserve_in(&mut *uow, isbn, user_id, today, days).await?;
        Self::finish_transition(&mut *uow, &mut record, BorrowEvent::Issue, today).await?;
        uow.commit().await?;

        tracing::info!("Loans: issued {} directly to user {} (record {})", isbn, user_id, record.id);
        Ok(record)
    }

    pub async fn cancel_reservation(&self, record_id: i32) -> AppResult<BorrowRecord> {
        let record = self
            .transition(record_id, BorrowEvent::CancelReservation, self.today())
            .await?;
        tracing::info!("Loans: cancelled reservation {}", record.id);
        Ok(record)
    }

    /// Revoke an issued loan and put the copy back on the shelf
    pub async fn cancel_issued_book(&self, record_id: i32) -> AppResult<BorrowRecord> {
        let record = self
            .transition(record_id, BorrowEvent::CancelIssued, self.today())
            .await?;
        tracing::info!("Loans: cancelled issued record {}", record.id);
        Ok(record)
    }

    /// Close an issued loan on `return_date` (`YYYY-MM-DD`)
    pub async fn return_book_by_record(&self, record_id: i32, return_date: &str) -> AppResult<BorrowRecord> {
        let returned_on = NaiveDate::parse_from_str(return_date.trim(), "%Y-%m-%d").map_err(|_| {
            AppError::Validation("Return date must be formatted as YYYY-MM-DD".to_string())
        })?;

        let mut uow = self.store.begin().await?;
        let mut record = Self::locked_record(&mut *uow, record_id).await?;
        if record.status == BorrowStatus::Issued {
            if let Some(issued_on) = record.issue_date {
                if returned_on < issued_on {
                    return Err(AppError::Validation(format!(
                        "Return date {} is before issue date {}",
                        returned_on, issued_on
                    )));
                }
            }
        }
        Self::finish_transition(&mut *uow, &mut record, BorrowEvent::Return, returned_on).await?;
        uow.commit().await?;

        tracing::info!("Loans: record {} returned on {}", record.id, returned_on);
        Ok(record)
    }

    /// Return the reader's issued copy of a book, dated today
    pub async fn return_book(&self, isbn: &str, user_id: i32) -> AppResult<BorrowRecord> {
        validate_isbn(isbn)?;

        let mut uow = self.store.begin().await?;
        let scope = RecordScope {
            book_isbn: Some(isbn.to_string()),
            user_id: Some(user_id),
            statuses: vec![BorrowStatus::Issued],
        };
        let record_id = uow
            .list_records(&scope)
            .await?
            .first()
            .map(|r| r.id)
            .ok_or_else(|| AppError::NotFound("No active issued record found".to_string()))?;

        let mut record = Self::locked_record(&mut *uow, record_id).await?;
        Self::finish_transition(&mut *uow, &mut record, BorrowEvent::Return, self.today()).await?;
        uow.commit().await?;

        tracing::info!("Loans: user {} returned {} (record {})", user_id, isbn, record.id);
        Ok(record)
    }

    /// Cancel every reservation past its expiry and put the copies back.
    /// Each record is handled in its own unit of work; one failure does not
    /// stop the sweep. Returns how many reservations were cancelled.
    pub async fn cancel_expired_reservations(&self) -> AppResult<usize> {
        let today = self.today();

        let mut uow = self.store.begin().await?;
        let ids = uow.expired_reservation_ids(today).await?;
        uow.commit().await?;

        let mut cancelled = 0;
        for id in ids {
            match self.expire_one(id, today).await {
                Ok(true) => cancelled += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!("Loans: failed to cancel expired reservation {}: {}", id, e),
            }
        }

        if cancelled > 0 {
            tracing::info!("Loans: cancelled {} expired reservation(s)", cancelled);
        }
        Ok(cancelled)
    }

    pub async fn get_record(&self, record_id: i32) -> AppResult<BorrowRecord> {
        if record_id <= 0 {
            return Err(AppError::Validation("Record id is required".to_string()));
        }
        let mut uow = self.store.begin().await?;
        let record = uow
            .get_record(record_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Borrow record not found".to_string()))?;
        uow.commit().await?;
        Ok(record)
    }

    /// Records of a book, a reader, or both
    pub async fn borrow_history(&self, isbn: Option<&str>, user_id: Option<i32>) -> AppResult<Vec<BorrowRecordDetails>> {
        self.list(RecordScope {
            book_isbn: isbn.map(str::to_string),
            user_id,
            statuses: Vec::new(),
        })
        .await
    }

    /// Reserved and issued records, optionally for one reader
    pub async fn active_borrows(&self, user_id: Option<i32>) -> AppResult<Vec<BorrowRecordDetails>> {
        self.list(RecordScope {
            book_isbn: None,
            user_id,
            statuses: vec![BorrowStatus::Reserved, BorrowStatus::Issued],
        })
        .await
    }

    pub async fn pending_reservations(&self) -> AppResult<Vec<BorrowRecordDetails>> {
        self.list(RecordScope {
            statuses: vec![BorrowStatus::Reserved],
            ..Default::default()
        })
        .await
    }

    pub async fn all_records(&self) -> AppResult<Vec<BorrowRecordDetails>> {
        self.list(RecordScope::default()).await
    }

    /// Management listing filtered by status, reader email and ticket
    pub async fn filter_records(&self, filter: &RecordFilter) -> AppResult<Vec<BorrowRecordDetails>> {
        let records = self.all_records().await?;
        Ok(filter_records(
            records,
            filter.status.as_deref().unwrap_or(""),
            filter.user_email.as_deref().unwrap_or(""),
            filter.user_ticket.as_deref().unwrap_or(""),
        ))
    }

    /// Active records plus the most recent returns of a reader
    pub async fn profile(&self, user_id: i32) -> AppResult<ProfileData> {
        let active_borrows = self.active_borrows(Some(user_id)).await?;

        let mut returned_records = self
            .list(RecordScope {
                book_isbn: None,
                user_id: Some(user_id),
                statuses: vec![BorrowStatus::Returned],
            })
            .await?;
        returned_records.sort_by(|a, b| b.return_date.cmp(&a.return_date).then(b.id.cmp(&a.id)));
        returned_records.truncate(PROFILE_HISTORY_LEN);

        Ok(ProfileData {
            active_borrows,
            returned_records,
        })
    }

    fn check_reservation(&self, isbn: &str, user_id: i32, reservation_days: Option<i64>) -> AppResult<i64> {
        validate_isbn(isbn)?;
        if user_id <= 0 {
            return Err(AppError::Validation("User id is required".to_string()));
        }
        let days = reservation_days.unwrap_or(self.reservation_days);
        if days < 1 {
            return Err(AppError::Validation(
                "Reservation must last at least one day".to_string(),
            ));
        }
        if days > MAX_RESERVATION_DAYS {
            return Err(AppError::Validation(format!(
                "Reservation cannot last more than {} days",
                MAX_RESERVATION_DAYS
            )));
        }
        Ok(days)
    }

    async fn list(&self, scope: RecordScope) -> AppResult<Vec<BorrowRecordDetails>> {
        let mut uow = self.store.begin().await?;
        let records = uow.list_records(&scope).await?;
        uow.commit().await?;
        Ok(records)
    }

    async fn transition(&self, record_id: i32, event: BorrowEvent, on: NaiveDate) -> AppResult<BorrowRecord> {
        let mut uow = self.store.begin().await?;
        let mut record = Self::locked_record(&mut *uow, record_id).await?;
        Self::finish_transition(&mut *uow, &mut record, event, on).await?;
        uow.commit().await?;
        Ok(record)
    }

    /// Cancel one reservation if it is still expired once locked.
    /// `Ok(false)` means something else got to the record first.
    async fn expire_one(&self, record_id: i32, today: NaiveDate) -> AppResult<bool> {
        let mut uow = self.store.begin().await?;
        let mut record = match uow.lock_record(record_id).await? {
            Some(record) if record.is_expired(today) => record,
            _ => return Ok(false),
        };
        Self::finish_transition(&mut *uow, &mut record, BorrowEvent::Expire, today).await?;
        uow.commit().await?;

        tracing::debug!("Loans: reservation {} expired", record_id);
        Ok(true)
    }

    async fn reserve_in(
        uow: &mut dyn UnitOfWork,
        isbn: &str,
        user_id: i32,
        today: NaiveDate,
        days: i64,
    ) -> AppResult<BorrowRecord> {
        if uow.get_user(user_id).await?.is_none() {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        let book = uow
            .lock_book(isbn)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;
        if book.copies_available <= 0 {
            return Err(AppError::Conflict("No copies available".to_string()));
        }

        let remaining = book
            .copies_available
            .checked_sub(1)
            .ok_or_else(|| AppError::Conflict("No copies available".to_string()))?;

        let record = uow
            .insert_record(&NewBorrowRecord::reservation(isbn, user_id, today, days)?)
            .await?;
        uow.set_copies(isbn, remaining).await?;
        Ok(record)
    }

    async fn locked_record(uow: &mut dyn UnitOfWork, record_id: i32) -> AppResult<BorrowRecord> {
        if record_id <= 0 {
            return Err(AppError::Validation("Record id is required".to_string()));
        }
        uow.lock_record(record_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Borrow record not found".to_string()))
    }

    /// Apply `event` to a locked record, adjust the shelf count and persist
    async fn finish_transition(
        uow: &mut dyn UnitOfWork,
        record: &mut BorrowRecord,
        event: BorrowEvent,
        on: NaiveDate,
    ) -> AppResult<()> {
        record.apply(event, on)?;

        if event.restores_copy() {
            let book = uow.lock_book(&record.book_isbn).await?.ok_or_else(|| {
                AppError::Internal(format!("Book {} of record {} is missing", record.book_isbn, record.id))
            })?;
            let restored = book.copies_available.checked_add(1).ok_or_else(|| {
                AppError::Conflict(format!("Shelf count of {} cannot grow any further", book.isbn))
            })?;
            uow.set_copies(&book.isbn, restored).await?;
        }
        uow.update_record(record).await
    }
}
