//! Borrow records queries for Postgres

use chrono::NaiveDate;
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::{BorrowRecord, BorrowRecordDetails, BorrowStatus, NewBorrowRecord, RecordScope},
};

/// Raw `borrow_records` row; `status` is stored as text
#[derive(Debug, FromRow)]
struct BorrowRecordRow {
    id: i32,
    book_isbn: String,
    user_id: i32,
    borrow_date: NaiveDate,
    reservation_expiry: Option<NaiveDate>,
    issue_date: Option<NaiveDate>,
    return_date: Option<NaiveDate>,
    status: String,
}

impl TryFrom<BorrowRecordRow> for BorrowRecord {
    type Error = AppError;

    fn try_from(row: BorrowRecordRow) -> Result<Self, Self::Error> {
        Ok(BorrowRecord {
            id: row.id,
            book_isbn: row.book_isbn,
            user_id: row.user_id,
            borrow_date: row.borrow_date,
            reservation_expiry: row.reservation_expiry,
            issue_date: row.issue_date,
            return_date: row.return_date,
            status: row.status.parse().map_err(AppError::Internal)?,
        })
    }
}

/// Record joined with `books` and `users`
#[derive(Debug, FromRow)]
struct BorrowRecordDetailsRow {
    id: i32,
    book_isbn: String,
    book_title: String,
    user_id: i32,
    user_email: String,
    user_ticket: Option<String>,
    user_full_name: String,
    borrow_date: NaiveDate,
    reservation_expiry: Option<NaiveDate>,
    issue_date: Option<NaiveDate>,
    return_date: Option<NaiveDate>,
    status: String,
}

impl TryFrom<BorrowRecordDetailsRow> for BorrowRecordDetails {
    type Error = AppError;

    fn try_from(row: BorrowRecordDetailsRow) -> Result<Self, Self::Error> {
        Ok(BorrowRecordDetails {
            id: row.id,
            book_isbn: row.book_isbn,
            book_title: row.book_title,
            user_id: row.user_id,
            user_email: row.user_email,
            user_ticket: row.user_ticket.unwrap_or_else(|| "-".to_string()),
            user_full_name: row.user_full_name,
            borrow_date: row.borrow_date,
            reservation_expiry: row.reservation_expiry,
            issue_date: row.issue_date,
            return_date: row.return_date,
            status: row.status.parse().map_err(AppError::Internal)?,
        })
    }
}

const RECORD_COLUMNS: &str =
    "id, book_isbn, user_id, borrow_date, reservation_expiry, issue_date, return_date, status";

pub async fn insert(conn: &mut PgConnection, record: &NewBorrowRecord) -> AppResult<BorrowRecord> {
    let row = sqlx::query_as::<_, BorrowRecordRow>(&format!(
        r#"
        INSERT INTO borrow_records (book_isbn, user_id, borrow_date, reservation_expiry, status)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {}
        "#,
        RECORD_COLUMNS
    ))
    .bind(&record.book_isbn)
    .bind(record.user_id)
    .bind(record.borrow_date)
    .bind(record.reservation_expiry)
    .bind(BorrowStatus::Reserved.as_str())
    .fetch_one(conn)
    .await?;

    row.try_into()
}

pub async fn get(conn: &mut PgConnection, id: i32) -> AppResult<Option<BorrowRecord>> {
    sqlx::query_as::<_, BorrowRecordRow>(&format!(
        "SELECT {} FROM borrow_records WHERE id = $1",
        RECORD_COLUMNS
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?
    .map(BorrowRecord::try_from)
    .transpose()
}

/// Lock the record row for the rest of the transaction
pub async fn lock(conn: &mut PgConnection, id: i32) -> AppResult<Option<BorrowRecord>> {
    sqlx::query_as::<_, BorrowRecordRow>(&format!(
        "SELECT {} FROM borrow_records WHERE id = $1 FOR UPDATE",
        RECORD_COLUMNS
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?
    .map(BorrowRecord::try_from)
    .transpose()
}

pub async fn update(conn: &mut PgConnection, record: &BorrowRecord) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE borrow_records
        SET status = $2, reservation_expiry = $3, issue_date = $4, return_date = $5
        WHERE id = $1
        "#,
    )
    .bind(record.id)
    .bind(record.status.as_str())
    .bind(record.reservation_expiry)
    .bind(record.issue_date)
    .bind(record.return_date)
    .execute(conn)
    .await?;

    Ok(())
}

/// List records with book and reader details
pub async fn list(conn: &mut PgConnection, scope: &RecordScope) -> AppResult<Vec<BorrowRecordDetails>> {
    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
        r#"
        SELECT r.id, r.book_isbn, b.title AS book_title, r.user_id,
               u.email AS user_email, u.ticket_number AS user_ticket, u.full_name AS user_full_name,
               r.borrow_date, r.reservation_expiry, r.issue_date, r.return_date, r.status
        FROM borrow_records r
        JOIN books b ON b.isbn = r.book_isbn
        JOIN users u ON u.id = r.user_id
        WHERE TRUE
        "#,
    );

    if let Some(ref isbn) = scope.book_isbn {
        query.push(" AND r.book_isbn = ").push_bind(isbn.clone());
    }
    if let Some(user_id) = scope.user_id {
        query.push(" AND r.user_id = ").push_bind(user_id);
    }
    if !scope.statuses.is_empty() {
        let statuses: Vec<String> = scope.statuses.iter().map(|s| s.as_str().to_string()).collect();
        query.push(" AND r.status = ANY(").push_bind(statuses).push(")");
    }
    query.push(" ORDER BY r.id");

    query
        .build_query_as::<BorrowRecordDetailsRow>()
        .fetch_all(conn)
        .await?
        .into_iter()
        .map(BorrowRecordDetails::try_from)
        .collect()
}

pub async fn expired_reservation_ids(conn: &mut PgConnection, today: NaiveDate) -> AppResult<Vec<i32>> {
    let ids: Vec<i32> = sqlx::query_scalar(
        r#"
        SELECT id FROM borrow_records
        WHERE status = $1 AND reservation_expiry < $2
        ORDER BY id
        "#,
    )
    .bind(BorrowStatus::Reserved.as_str())
    .bind(today)
    .fetch_all(conn)
    .await?;

    Ok(ids)
}

pub async fn count_active(conn: &mut PgConnection, isbn: &str) -> AppResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM borrow_records WHERE book_isbn = $1 AND status IN ($2, $3)",
    )
    .bind(isbn)
    .bind(BorrowStatus::Reserved.as_str())
    .bind(BorrowStatus::Issued.as_str())
    .fetch_one(conn)
    .await?;

    Ok(count)
}

pub async fn delete_for_book(conn: &mut PgConnection, isbn: &str) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM borrow_records WHERE book_isbn = $1")
        .bind(isbn)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}
