//! External catalog lookup endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{AppError, AppResult},
    models::{Book, RemoteBook},
    AppState,
};

use super::AuthenticatedUser;

#[derive(Deserialize, IntoParams)]
pub struct LookupSearchQuery {
    pub query: String,
    pub max_results: Option<u32>,
}

#[derive(Deserialize, ToSchema)]
pub struct ImportRequest {
    pub isbn: String,
    /// Initial shelf count
    #[serde(default = "default_copies")]
    pub copies: i32,
}

fn default_copies() -> i32 {
    1
}

/// Search the external catalog
#[utoipa::path(
    get,
    path = "/lookup/search",
    tag = "lookup",
    security(("bearer_auth" = [])),
    params(LookupSearchQuery),
    responses(
        (status = 200, description = "Remote matches", body = Vec<RemoteBook>),
        (status = 502, description = "Catalog lookup unavailable")
    )
)]
pub async fn search(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<LookupSearchQuery>,
) -> AppResult<Json<Vec<RemoteBook>>> {
    claims.require_admin()?;

    let max_results = query
        .max_results
        .unwrap_or(state.config.catalog_lookup.max_results);
    let books = state.services.lookup.search(&query.query, max_results).await?;
    Ok(Json(books))
}

/// Look up one ISBN in the external catalog
#[utoipa::path(
    get,
    path = "/lookup/isbn/{isbn}",
    tag = "lookup",
    security(("bearer_auth" = [])),
    params(
        ("isbn" = String, Path, description = "ISBN to look up")
    ),
    responses(
        (status = 200, description = "Remote entry", body = RemoteBook),
        (status = 404, description = "No entry for this ISBN"),
        (status = 502, description = "Catalog lookup unavailable")
    )
)]
pub async fn lookup_by_isbn(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(isbn): Path<String>,
) -> AppResult<Json<RemoteBook>> {
    claims.require_admin()?;

    let book = state
        .services
        .lookup
        .lookup_by_isbn(&isbn)
        .await?
        .ok_or_else(|| AppError::NotFound("No catalog lookup entry for this ISBN".to_string()))?;
    Ok(Json(book))
}

/// Create a local book from the external entry
#[utoipa::path(
    post,
    path = "/lookup/import",
    tag = "lookup",
    security(("bearer_auth" = [])),
    request_body = ImportRequest,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 404, description = "No entry for this ISBN"),
        (status = 409, description = "ISBN already cataloged"),
        (status = 502, description = "Catalog lookup unavailable")
    )
)]
pub async fn import_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<ImportRequest>,
) -> AppResult<(StatusCode, Json<Book>)> {
    claims.require_admin()?;

    let book = state
        .services
        .catalog
        .import_from_lookup(&request.isbn, request.copies)
        .await?;
    Ok((StatusCode::CREATED, Json(book)))
}
