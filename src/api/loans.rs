//! Reservation and loan endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::AppResult,
    models::{borrow_record::RecordFilter, BorrowRecord, BorrowRecordDetails},
    AppState,
};

use super::AuthenticatedUser;

/// Reserve request. Readers reserve for themselves; admins may name a reader.
#[derive(Deserialize, ToSchema)]
pub struct ReserveRequest {
    pub isbn: String,
    pub user_id: Option<i32>,
    /// Overrides the configured reservation length, from 1 to 365 days
    pub reservation_days: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct ReserveResponse {
    pub record_id: i32,
}

/// Desk request naming a book and a reader
#[derive(Deserialize, ToSchema)]
pub struct BookForReader {
    pub isbn: String,
    pub user_id: i32,
}

#[derive(Deserialize, ToSchema)]
pub struct ReturnRequest {
    /// `YYYY-MM-DD`
    pub return_date: String,
}

#[derive(Deserialize, IntoParams)]
pub struct ActiveQuery {
    pub user_id: Option<i32>,
}

#[derive(Serialize, ToSchema)]
pub struct SweepResponse {
    pub cancelled: usize,
}

/// Reserve a copy
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = ReserveRequest,
    responses(
        (status = 201, description = "Reservation created", body = ReserveResponse),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Book or user not found"),
        (status = 409, description = "No copies available")
    )
)]
pub async fn reserve_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<ReserveRequest>,
) -> AppResult<(StatusCode, Json<ReserveResponse>)> {
    let user_id = request.user_id.unwrap_or(claims.user_id);
    claims.require_self_or_admin(user_id)?;

    let record_id = state
        .services
        .loans
        .reserve_book(&request.isbn, user_id, request.reservation_days)
        .await?;
    Ok((StatusCode::CREATED, Json(ReserveResponse { record_id })))
}

/// Reservations waiting for pickup
#[utoipa::path(
    get,
    path = "/reservations/pending",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Reserved records", body = Vec<BorrowRecordDetails>)
    )
)]
pub async fn pending_reservations(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowRecordDetails>>> {
    claims.require_admin()?;

    let records = state.services.loans.pending_reservations().await?;
    Ok(Json(records))
}

/// Run the expiry sweep now
#[utoipa::path(
    post,
    path = "/reservations/sweep",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Expired reservations cancelled", body = SweepResponse)
    )
)]
pub async fn sweep_expired(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<SweepResponse>> {
    claims.require_admin()?;

    let cancelled = state.services.loans.cancel_expired_reservations().await?;
    Ok(Json(SweepResponse { cancelled }))
}

/// Filtered management listing of all records
#[utoipa::path(
    get,
    path = "/records",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(RecordFilter),
    responses(
        (status = 200, description = "Records ordered by id", body = Vec<BorrowRecordDetails>)
    )
)]
pub async fn list_records(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(filter): Query<RecordFilter>,
) -> AppResult<Json<Vec<BorrowRecordDetails>>> {
    claims.require_admin()?;

    let records = state.services.loans.filter_records(&filter).await?;
    Ok(Json(records))
}

/// Reserved and issued records
#[utoipa::path(
    get,
    path = "/records/active",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(ActiveQuery),
    responses(
        (status = 200, description = "Active records", body = Vec<BorrowRecordDetails>)
    )
)]
pub async fn active_borrows(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<ActiveQuery>,
) -> AppResult<Json<Vec<BorrowRecordDetails>>> {
    claims.require_admin()?;

    let records = state.services.loans.active_borrows(query.user_id).await?;
    Ok(Json(records))
}

/// Get one record
#[utoipa::path(
    get,
    path = "/records/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Record ID")
    ),
    responses(
        (status = 200, description = "Record", body = BorrowRecord),
        (status = 404, description = "Record not found")
    )
)]
pub async fn get_record(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowRecord>> {
    let record = state.services.loans.get_record(id).await?;
    claims.require_self_or_admin(record.user_id)?;
    Ok(Json(record))
}

/// Issue a reserved copy
#[utoipa::path(
    post,
    path = "/records/{id}/issue",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Record ID")
    ),
    responses(
        (status = 200, description = "Record issued", body = BorrowRecord),
        (status = 404, description = "Record not found"),
        (status = 409, description = "Record is not reserved")
    )
)]
pub async fn issue_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowRecord>> {
    claims.require_admin()?;

    let record = state.services.loans.issue_book(id).await?;
    Ok(Json(record))
}

/// Cancel a reservation. Readers may cancel their own.
#[utoipa::path(
    post,
    path = "/records/{id}/cancel",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Record ID")
    ),
    responses(
        (status = 200, description = "Reservation cancelled", body = BorrowRecord),
        (status = 404, description = "Record not found"),
        (status = 409, description = "Record is not reserved")
    )
)]
pub async fn cancel_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowRecord>> {
    if !claims.is_admin() {
        let record = state.services.loans.get_record(id).await?;
        claims.require_self_or_admin(record.user_id)?;
    }

    let record = state.services.loans.cancel_reservation(id).await?;
    Ok(Json(record))
}

/// Cancel an issued loan
#[utoipa::path(
    post,
    path = "/records/{id}/cancel-issued",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Record ID")
    ),
    responses(
        (status = 200, description = "Loan cancelled", body = BorrowRecord),
        (status = 404, description = "Record not found"),
        (status = 409, description = "Record is not issued")
    )
)]
pub async fn cancel_issued_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowRecord>> {
    claims.require_admin()?;

    let record = state.services.loans.cancel_issued_book(id).await?;
    Ok(Json(record))
}

/// Return an issued copy on a given date
#[utoipa::path(
    post,
    path = "/records/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Record ID")
    ),
    request_body = ReturnRequest,
    responses(
        (status = 200, description = "Copy returned", body = BorrowRecord),
        (status = 400, description = "Invalid return date"),
        (status = 404, description = "Record not found"),
        (status = 409, description = "Record is not issued")
    )
)]
pub async fn return_book_by_record(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<ReturnRequest>,
) -> AppResult<Json<BorrowRecord>> {
    claims.require_admin()?;

    let record = state
        .services
        .loans
        .return_book_by_record(id, &request.return_date)
        .await?;
    Ok(Json(record))
}

/// Reserve and issue at the desk in one step
#[utoipa::path(
    post,
    path = "/loans/issue",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = BookForReader,
    responses(
        (status = 201, description = "Copy issued", body = BorrowRecord),
        (status = 404, description = "Book or user not found"),
        (status = 409, description = "No copies available")
    )
)]
pub async fn issue_directly(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<BookForReader>,
) -> AppResult<(StatusCode, Json<BorrowRecord>)> {
    claims.require_admin()?;

    let record = state
        .services
        .loans
        .issue_directly(&request.isbn, request.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Return a reader's issued copy of a book, dated today
#[utoipa::path(
    post,
    path = "/loans/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = BookForReader,
    responses(
        (status = 200, description = "Copy returned", body = BorrowRecord),
        (status = 404, description = "No active issued record found")
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<BookForReader>,
) -> AppResult<Json<BorrowRecord>> {
    claims.require_admin()?;

    let record = state
        .services
        .loans
        .return_book(&request.isbn, request.user_id)
        .await?;
    Ok(Json(record))
}
