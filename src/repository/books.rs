//! Books, authors and genres queries for Postgres

use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    models::Book,
};

const BOOK_COLUMNS: &str = r#"
    b.isbn, b.title, b.copies_available,
    ARRAY(
        SELECT a.name::text FROM book_authors ba
        JOIN authors a ON a.id = ba.author_id
        WHERE ba.book_isbn = b.isbn ORDER BY a.name
    ) AS authors,
    ARRAY(
        SELECT g.name::text FROM book_genres bg
        JOIN genres g ON g.id = bg.genre_id
        WHERE bg.book_isbn = b.isbn ORDER BY g.name
    ) AS genres
"#;

/// Get book by ISBN
pub async fn get(conn: &mut PgConnection, isbn: &str) -> AppResult<Option<Book>> {
    let book = sqlx::query_as::<_, Book>(&format!(
        "SELECT {} FROM books b WHERE b.isbn = $1",
        BOOK_COLUMNS
    ))
    .bind(isbn)
    .fetch_optional(conn)
    .await?;

    Ok(book)
}

/// Lock the book row, then load it with its authors and genres
pub async fn lock(conn: &mut PgConnection, isbn: &str) -> AppResult<Option<Book>> {
    let locked: Option<String> = sqlx::query_scalar("SELECT isbn FROM books WHERE isbn = $1 FOR UPDATE")
        .bind(isbn)
        .fetch_optional(&mut *conn)
        .await?;

    match locked {
        Some(_) => get(conn, isbn).await,
        None => Ok(None),
    }
}

/// List all books ordered by title
pub async fn list(conn: &mut PgConnection) -> AppResult<Vec<Book>> {
    let books = sqlx::query_as::<_, Book>(&format!(
        "SELECT {} FROM books b ORDER BY b.title, b.isbn",
        BOOK_COLUMNS
    ))
    .fetch_all(conn)
    .await?;

    Ok(books)
}

pub async fn insert(conn: &mut PgConnection, isbn: &str, title: &str, copies: i32) -> AppResult<()> {
    sqlx::query("INSERT INTO books (isbn, title, copies_available) VALUES ($1, $2, $3)")
        .bind(isbn)
        .bind(title)
        .bind(copies)
        .execute(conn)
        .await
        .map_err(|e| AppError::on_unique_violation(e, "ISBN already exists"))?;

    Ok(())
}

pub async fn update(conn: &mut PgConnection, isbn: &str, title: &str, copies: i32) -> AppResult<()> {
    sqlx::query("UPDATE books SET title = $2, copies_available = $3 WHERE isbn = $1")
        .bind(isbn)
        .bind(title)
        .bind(copies)
        .execute(conn)
        .await?;

    Ok(())
}

pub async fn set_copies(conn: &mut PgConnection, isbn: &str, copies: i32) -> AppResult<()> {
    sqlx::query("UPDATE books SET copies_available = $2 WHERE isbn = $1")
        .bind(isbn)
        .bind(copies)
        .execute(conn)
        .await?;

    Ok(())
}

/// Delete a book and its author/genre links
pub async fn delete(conn: &mut PgConnection, isbn: &str) -> AppResult<()> {
    sqlx::query("DELETE FROM book_authors WHERE book_isbn = $1")
        .bind(isbn)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM book_genres WHERE book_isbn = $1")
        .bind(isbn)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM books WHERE isbn = $1")
        .bind(isbn)
        .execute(conn)
        .await?;

    Ok(())
}

pub async fn replace_authors(conn: &mut PgConnection, isbn: &str, names: &[String]) -> AppResult<()> {
    sqlx::query("DELETE FROM book_authors WHERE book_isbn = $1")
        .bind(isbn)
        .execute(&mut *conn)
        .await?;

    for name in names {
        let author_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO authors (name) VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;

        sqlx::query(
            "INSERT INTO book_authors (book_isbn, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(isbn)
        .bind(author_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub async fn replace_genres(conn: &mut PgConnection, isbn: &str, names: &[String]) -> AppResult<()> {
    sqlx::query("DELETE FROM book_genres WHERE book_isbn = $1")
        .bind(isbn)
        .execute(&mut *conn)
        .await?;

    for name in names {
        let genre_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO genres (name) VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;

        sqlx::query(
            "INSERT INTO book_genres (book_isbn, genre_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(isbn)
        .bind(genre_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
