//! Book catalog model, field validation and pure search filters

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, AppResult};

pub const MAX_TITLE_LEN: usize = 30;

/// Most copies a single title may have on the shelf
pub const MAX_COPIES: i32 = 10_000;

static ISBN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{13}$").expect("valid ISBN pattern"));

/// Cataloged book with its author and genre names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub isbn: String,
    pub title: String,
    /// Shelf count: copies neither reserved nor loaned out
    pub copies_available: i32,
    pub authors: Vec<String>,
    pub genres: Vec<String>,
}

/// Fields accepted by create and update
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BookInput {
    pub isbn: String,
    pub title: String,
    pub copies: i32,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl BookInput {
    /// Check every field, then return a copy with author and genre names deduplicated
    pub fn validated(&self) -> AppResult<BookInput> {
        if self.isbn.is_empty() || self.title.is_empty() {
            return Err(AppError::Validation("ISBN and title are required".to_string()));
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(AppError::Validation(format!(
                "Title must be {} characters or less",
                MAX_TITLE_LEN
            )));
        }
        if self.copies < 0 {
            return Err(AppError::Validation("Copies available cannot be negative".to_string()));
        }
        if self.copies > MAX_COPIES {
            return Err(AppError::Validation(format!(
                "Copies available cannot exceed {}",
                MAX_COPIES
            )));
        }
        validate_isbn(&self.isbn)?;

        Ok(BookInput {
            isbn: self.isbn.clone(),
            title: self.title.clone(),
            copies: self.copies,
            authors: normalize_names(&self.authors),
            genres: normalize_names(&self.genres),
        })
    }
}

/// ISBN must be present and exactly 13 ASCII digits
pub fn validate_isbn(isbn: &str) -> AppResult<()> {
    if isbn.is_empty() {
        return Err(AppError::Validation("ISBN is required".to_string()));
    }
    if !ISBN_PATTERN.is_match(isbn) {
        return Err(AppError::Validation("ISBN must be 13 digits".to_string()));
    }
    Ok(())
}

/// Drop blank names and duplicates, keeping first-seen order. Matching is case-sensitive.
fn normalize_names(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

/// Availability filter for catalog searches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Unavailable,
    #[default]
    #[serde(other)]
    All,
}

/// Catalog search query
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Case-insensitive substring of title, ISBN or author name
    pub query: Option<String>,
    pub status: Option<Availability>,
}

/// Filter books by free text and availability
pub fn filter_books(books: Vec<Book>, query: &str, status: Availability) -> Vec<Book> {
    let needle = query.trim().to_lowercase();

    books
        .into_iter()
        .filter(|b| {
            needle.is_empty()
                || b.title.to_lowercase().contains(&needle)
                || b.isbn.contains(&needle)
                || b.authors.iter().any(|a| a.to_lowercase().contains(&needle))
        })
        .filter(|b| match status {
            Availability::Available => b.copies_available > 0,
            Availability::Unavailable => b.copies_available == 0,
            Availability::All => true,
        })
        .collect()
}

/// Shelf summary over a list of books
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct LibraryStats {
    pub available: usize,
    pub total: usize,
}

impl LibraryStats {
    pub fn from_books(books: &[Book]) -> Self {
        Self {
            available: books.iter().filter(|b| b.copies_available > 0).count(),
            total: books.len(),
        }
    }
}
