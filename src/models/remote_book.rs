//! Book description returned by the external catalog lookup

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::book::{BookInput, MAX_TITLE_LEN};

/// Remote catalog entry used to pre-fill a new book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RemoteBook {
    pub isbn: String,
    pub title: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub description: Option<String>,
    pub page_count: u32,
    pub thumbnail: Option<String>,
}

impl RemoteBook {
    /// Catalog input for this entry: title cut to the catalog limit, categories become genres
    pub fn to_book_input(&self, isbn: &str, copies: i32) -> BookInput {
        BookInput {
            isbn: isbn.to_string(),
            title: self.title.chars().take(MAX_TITLE_LEN).collect(),
            copies,
            authors: self.authors.clone(),
            genres: self.categories.clone(),
        }
    }
}
