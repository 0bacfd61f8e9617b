//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, catalog_lookup, health, loans, users};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Libris API",
        version = "1.0.0",
        description = "Small-library catalog, reservation and loan REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::me,
        auth::profile,
        // Books
        books::list_books,
        books::library_stats,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::book_history,
        // Loans
        loans::reserve_book,
        loans::pending_reservations,
        loans::sweep_expired,
        loans::list_records,
        loans::active_borrows,
        loans::get_record,
        loans::issue_book,
        loans::cancel_reservation,
        loans::cancel_issued_book,
        loans::return_book_by_record,
        loans::issue_directly,
        loans::return_book,
        // Users
        users::find_user,
        users::create_reader,
        users::get_user,
        users::user_history,
        // Catalog lookup
        catalog_lookup::search,
        catalog_lookup::lookup_by_isbn,
        catalog_lookup::import_book,
    ),
    components(
        schemas(
            // Auth
            crate::models::LoginRequest,
            crate::models::LoginResponse,
            crate::models::RegisterInput,
            crate::models::UserInfo,
            crate::models::Role,
            crate::models::borrow_record::ProfileData,
            // Books
            crate::models::Book,
            crate::models::BookInput,
            crate::models::Availability,
            crate::models::LibraryStats,
            // Loans
            crate::models::BorrowRecord,
            crate::models::BorrowRecordDetails,
            crate::models::BorrowStatus,
            loans::ReserveRequest,
            loans::ReserveResponse,
            loans::BookForReader,
            loans::ReturnRequest,
            loans::SweepResponse,
            // Users
            crate::models::ReaderInput,
            users::CreatedReader,
            // Catalog lookup
            crate::models::RemoteBook,
            catalog_lookup::ImportRequest,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "books", description = "Catalog management"),
        (name = "loans", description = "Reservations and loans"),
        (name = "users", description = "Reader management"),
        (name = "lookup", description = "External catalog lookup")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
