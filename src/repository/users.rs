//! Users queries for Postgres

use chrono::NaiveDate;
use sqlx::{FromRow, PgConnection};

use crate::{
    error::{AppError, AppResult},
    models::{NewUser, User},
};

/// Raw `users` row; `role` is stored as text
#[derive(Debug, FromRow)]
struct UserRow {
    id: i32,
    email: String,
    full_name: String,
    role: String,
    ticket_number: Option<String>,
    password_hash: Option<String>,
    created_at: NaiveDate,
    is_active: bool,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            email: row.email,
            full_name: row.full_name,
            role: row.role.parse().map_err(AppError::Internal)?,
            ticket_number: row.ticket_number,
            password_hash: row.password_hash,
            created_at: row.created_at,
            is_active: row.is_active,
        })
    }
}

const USER_COLUMNS: &str =
    "id, email, full_name, role, ticket_number, password_hash, created_at, is_active";

pub async fn insert(conn: &mut PgConnection, user: &NewUser) -> AppResult<User> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        INSERT INTO users (email, full_name, role, ticket_number, password_hash, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(&user.email)
    .bind(&user.full_name)
    .bind(user.role.as_str())
    .bind(&user.ticket_number)
    .bind(&user.password_hash)
    .bind(user.created_at)
    .fetch_one(conn)
    .await
    .map_err(|e| AppError::on_unique_violation(e, "Email or ticket number already registered"))?;

    row.try_into()
}

/// Get user by ID
pub async fn get_by_id(conn: &mut PgConnection, id: i32) -> AppResult<Option<User>> {
    sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
        .bind(id)
        .fetch_optional(conn)
        .await?
        .map(User::try_from)
        .transpose()
}

/// Get user by exact email
pub async fn get_by_email(conn: &mut PgConnection, email: &str) -> AppResult<Option<User>> {
    sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
        .bind(email)
        .fetch_optional(conn)
        .await?
        .map(User::try_from)
        .transpose()
}

/// Get user whose email or ticket number equals `identifier`
pub async fn find_by_identifier(conn: &mut PgConnection, identifier: &str) -> AppResult<Option<User>> {
    sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {} FROM users WHERE email = $1 OR ticket_number = $1 ORDER BY id LIMIT 1",
        USER_COLUMNS
    ))
    .bind(identifier)
    .fetch_optional(conn)
    .await?
    .map(User::try_from)
    .transpose()
}

pub async fn ticket_exists(conn: &mut PgConnection, ticket: &str) -> AppResult<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE ticket_number = $1)")
            .bind(ticket)
            .fetch_one(conn)
            .await?;

    Ok(exists)
}
