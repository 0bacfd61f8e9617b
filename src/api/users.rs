//! Reader management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{AppError, AppResult},
    models::{BorrowRecordDetails, ReaderInput, UserInfo},
    AppState,
};

use super::AuthenticatedUser;

#[derive(Deserialize, IntoParams)]
pub struct FindUserQuery {
    /// Email or ticket number
    pub identifier: String,
}

/// New reader with the one-time temporary password
#[derive(Serialize, ToSchema)]
pub struct CreatedReader {
    pub user: UserInfo,
    pub temporary_password: String,
}

/// Find a user by email or ticket number
#[utoipa::path(
    get,
    path = "/users/lookup",
    tag = "users",
    security(("bearer_auth" = [])),
    params(FindUserQuery),
    responses(
        (status = 200, description = "User found", body = UserInfo),
        (status = 404, description = "No such user")
    )
)]
pub async fn find_user(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<FindUserQuery>,
) -> AppResult<Json<UserInfo>> {
    claims.require_admin()?;

    let user = state
        .services
        .users
        .find_user_by_identifier(&query.identifier)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(user.into()))
}

/// Register a reader at the desk
#[utoipa::path(
    post,
    path = "/users/readers",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = ReaderInput,
    responses(
        (status = 201, description = "Reader created", body = CreatedReader),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn create_reader(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(input): Json<ReaderInput>,
) -> AppResult<(StatusCode, Json<CreatedReader>)> {
    claims.require_admin()?;

    let (user, temporary_password) = state.services.users.create_reader(&input).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedReader {
            user: user.into(),
            temporary_password,
        }),
    ))
}

/// Get user details by ID
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User details", body = UserInfo),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<UserInfo>> {
    claims.require_self_or_admin(id)?;

    let user = state.services.users.get_user(id).await?;
    Ok(Json(user.into()))
}

/// Borrow history of a reader
#[utoipa::path(
    get,
    path = "/users/{id}/history",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "All records of the reader", body = Vec<BorrowRecordDetails>)
    )
)]
pub async fn user_history(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<BorrowRecordDetails>>> {
    claims.require_self_or_admin(id)?;

    let records = state.services.loans.borrow_history(None, Some(id)).await?;
    Ok(Json(records))
}
