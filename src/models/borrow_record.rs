//! Borrow record model and the reservation/loan state machine
//!
//! A record starts `reserved` when a copy is taken off the shelf and ends in
//! one of the terminal states `returned` or `cancelled`:
//!
//! ```text
//! reserved --issue--> issued --return--> returned
//!    |                  |
//!    +--cancel/expire---+--cancel-issued--> cancelled
//! ```
//!
//! Every transition except `issue` puts the copy back on the shelf.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, AppResult};

/// Lifecycle status of a borrow record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Reserved,
    Issued,
    Returned,
    Cancelled,
}

impl BorrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Reserved => "reserved",
            BorrowStatus::Issued => "issued",
            BorrowStatus::Returned => "returned",
            BorrowStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BorrowStatus::Returned | BorrowStatus::Cancelled)
    }

    /// Status reached by applying `event`, or the reason it is not allowed
    pub fn next(self, event: BorrowEvent) -> Result<BorrowStatus, TransitionError> {
        let to = match (self, event) {
            (BorrowStatus::Reserved, BorrowEvent::Issue) => BorrowStatus::Issued,
            (BorrowStatus::Reserved, BorrowEvent::CancelReservation) => BorrowStatus::Cancelled,
            (BorrowStatus::Reserved, BorrowEvent::Expire) => BorrowStatus::Cancelled,
            (BorrowStatus::Issued, BorrowEvent::CancelIssued) => BorrowStatus::Cancelled,
            (BorrowStatus::Issued, BorrowEvent::Return) => BorrowStatus::Returned,
            (from, event) => return Err(TransitionError { from, event }),
        };
        Ok(to)
    }
}

impl fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BorrowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserved" => Ok(BorrowStatus::Reserved),
            "issued" => Ok(BorrowStatus::Issued),
            "returned" => Ok(BorrowStatus::Returned),
            "cancelled" => Ok(BorrowStatus::Cancelled),
            other => Err(format!("Unknown borrow status '{}'", other)),
        }
    }
}

/// Events driving a record through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowEvent {
    Issue,
    CancelReservation,
    CancelIssued,
    Return,
    /// System-initiated cancellation of a reservation past its expiry
    Expire,
}

impl BorrowEvent {
    /// Whether the transition puts the copy back on the shelf
    pub fn restores_copy(&self) -> bool {
        !matches!(self, BorrowEvent::Issue)
    }
}

impl fmt::Display for BorrowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BorrowEvent::Issue => "issue",
            BorrowEvent::CancelReservation => "cancel reservation",
            BorrowEvent::CancelIssued => "cancel issued book",
            BorrowEvent::Return => "return",
            BorrowEvent::Expire => "expire",
        };
        f.write_str(label)
    }
}

/// Rejected lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Cannot {event} a record in status {from}")]
pub struct TransitionError {
    pub from: BorrowStatus,
    pub event: BorrowEvent,
}

/// Borrow record as stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BorrowRecord {
    pub id: i32,
    pub book_isbn: String,
    pub user_id: i32,
    /// Date the reservation was created
    pub borrow_date: NaiveDate,
    pub reservation_expiry: Option<NaiveDate>,
    pub issue_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub status: BorrowStatus,
}

impl BorrowRecord {
    /// Apply `event` dated `on`. Only status and the three evolving dates change.
    pub fn apply(&mut self, event: BorrowEvent, on: NaiveDate) -> Result<(), TransitionError> {
        let next = self.status.next(event)?;

        match event {
            BorrowEvent::Issue => self.issue_date = Some(on),
            BorrowEvent::Return => self.return_date = Some(on),
            BorrowEvent::CancelReservation | BorrowEvent::CancelIssued | BorrowEvent::Expire => {}
        }
        // expiry only means something while the copy is held on reservation
        self.reservation_expiry = None;
        self.status = next;
        Ok(())
    }

    /// Reserved and past its expiry date as of `today`
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.status == BorrowStatus::Reserved
            && self.reservation_expiry.map(|d| d < today).unwrap_or(false)
    }
}

/// New reservation to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBorrowRecord {
    pub book_isbn: String,
    pub user_id: i32,
    pub borrow_date: NaiveDate,
    pub reservation_expiry: NaiveDate,
}

impl NewBorrowRecord {
    /// Reservation taken `today`, expiring `reservation_days` later
    pub fn reservation(
        book_isbn: &str,
        user_id: i32,
        today: NaiveDate,
        reservation_days: i64,
    ) -> AppResult<Self> {
        let reservation_expiry = Duration::try_days(reservation_days)
            .and_then(|days| today.checked_add_signed(days))
            .ok_or_else(|| {
                AppError::Validation(format!("Reservation of {} days is out of range", reservation_days))
            })?;

        Ok(Self {
            book_isbn: book_isbn.to_string(),
            user_id,
            borrow_date: today,
            reservation_expiry,
        })
    }
}

/// Borrow record joined with book title and reader contact details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BorrowRecordDetails {
    pub id: i32,
    pub book_isbn: String,
    pub book_title: String,
    pub user_id: i32,
    pub user_email: String,
    /// Ticket number, or `-` when the reader has none
    pub user_ticket: String,
    pub user_full_name: String,
    pub borrow_date: NaiveDate,
    pub reservation_expiry: Option<NaiveDate>,
    pub issue_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub status: BorrowStatus,
}

/// Which records a ledger listing covers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordScope {
    pub book_isbn: Option<String>,
    pub user_id: Option<i32>,
    /// Restrict to these statuses; empty means any
    pub statuses: Vec<BorrowStatus>,
}

impl RecordScope {
    pub fn matches(&self, record: &BorrowRecord) -> bool {
        self.book_isbn.as_ref().map_or(true, |isbn| *isbn == record.book_isbn)
            && self.user_id.map_or(true, |id| id == record.user_id)
            && (self.statuses.is_empty() || self.statuses.contains(&record.status))
    }
}

/// Management listing filter
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct RecordFilter {
    /// `all` or an exact status
    pub status: Option<String>,
    pub user_email: Option<String>,
    pub user_ticket: Option<String>,
}

/// Filter ledger records by exact status and case-insensitive email/ticket substrings
pub fn filter_records(
    records: Vec<BorrowRecordDetails>,
    status_filter: &str,
    user_email: &str,
    user_ticket: &str,
) -> Vec<BorrowRecordDetails> {
    let email = user_email.trim().to_lowercase();
    let ticket = user_ticket.trim().to_lowercase();

    records
        .into_iter()
        .filter(|r| status_filter.is_empty() || status_filter == "all" || r.status.as_str() == status_filter)
        .filter(|r| email.is_empty() || r.user_email.to_lowercase().contains(&email))
        .filter(|r| ticket.is_empty() || r.user_ticket.to_lowercase().contains(&ticket))
        .collect()
}

/// Reader's profile view of the ledger
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProfileData {
    pub active_borrows: Vec<BorrowRecordDetails>,
    pub returned_records: Vec<BorrowRecordDetails>,
}
