//! API handlers for Libris REST endpoints

pub mod auth;
pub mod books;
pub mod catalog_lookup;
pub mod health;
pub mod loans;
pub mod openapi;
pub mod users;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, models::UserClaims, AppState};

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = state.services.users.verify_token(token)?;
        Ok(AuthenticatedUser(claims))
    }
}

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/profile", get(auth::profile))
        // Catalog
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/stats", get(books::library_stats))
        .route(
            "/books/:isbn",
            get(books::get_book).put(books::update_book).delete(books::delete_book),
        )
        .route("/books/:isbn/history", get(books::book_history))
        // Lifecycle
        .route("/reservations", post(loans::reserve_book))
        .route("/reservations/pending", get(loans::pending_reservations))
        .route("/reservations/sweep", post(loans::sweep_expired))
        .route("/records", get(loans::list_records))
        .route("/records/active", get(loans::active_borrows))
        .route("/records/:id", get(loans::get_record))
        .route("/records/:id/issue", post(loans::issue_book))
        .route("/records/:id/cancel", post(loans::cancel_reservation))
        .route("/records/:id/cancel-issued", post(loans::cancel_issued_book))
        .route("/records/:id/return", post(loans::return_book_by_record))
        .route("/loans/issue", post(loans::issue_directly))
        .route("/loans/return", post(loans::return_book))
        // Readers
        .route("/users/lookup", get(users::find_user))
        .route("/users/readers", post(users::create_reader))
        .route("/users/:id", get(users::get_user))
        .route("/users/:id/history", get(users::user_history))
        // Catalog lookup
        .route("/lookup/search", get(catalog_lookup::search))
        .route("/lookup/isbn/:isbn", get(catalog_lookup::lookup_by_isbn))
        .route("/lookup/import", post(catalog_lookup::import_book))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
