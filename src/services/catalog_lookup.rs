//! External catalog lookup (Google Books volumes API)
//!
//! Used only to pre-fill new catalog entries. Failures surface as
//! `AppError::Upstream` and never touch local state.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::{
    config::CatalogLookupConfig,
    error::{AppError, AppResult},
    models::{book::MAX_TITLE_LEN, RemoteBook},
};

const SEARCH_DESCRIPTION_LEN: usize = 200;
const UNTITLED: &str = "Untitled";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// Free-text search
    async fn search(&self, query: &str, max_results: u32) -> AppResult<Vec<RemoteBook>>;

    /// First match for an ISBN, if any
    async fn lookup_by_isbn(&self, isbn: &str) -> AppResult<Option<RemoteBook>>;
}

#[derive(Debug, Default, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volume {
    #[serde(default)]
    volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    categories: Vec<String>,
    publisher: Option<String>,
    published_date: Option<String>,
    description: Option<String>,
    page_count: Option<u32>,
    #[serde(default)]
    industry_identifiers: Vec<IndustryIdentifier>,
    image_links: Option<ImageLinks>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

#[derive(Debug, Deserialize)]
struct ImageLinks {
    thumbnail: Option<String>,
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

impl VolumeInfo {
    /// ISBN-13, else ISBN-10, else "N/A"
    fn best_isbn(&self) -> String {
        let find = |kind: &str| {
            self.industry_identifiers
                .iter()
                .find(|id| id.kind == kind)
                .map(|id| id.identifier.clone())
        };
        find("ISBN_13")
            .or_else(|| find("ISBN_10"))
            .unwrap_or_else(|| "N/A".to_string())
    }

    fn into_remote(self, isbn: String, description_len: Option<usize>) -> RemoteBook {
        let title = self.title.as_deref().unwrap_or(UNTITLED);
        RemoteBook {
            isbn,
            title: truncate(title, MAX_TITLE_LEN),
            authors: self.authors,
            categories: self.categories,
            publisher: self.publisher,
            published_date: self.published_date,
            description: match description_len {
                Some(len) => self.description.map(|d| truncate(&d, len)),
                None => self.description,
            },
            page_count: self.page_count.unwrap_or(0),
            thumbnail: self.image_links.and_then(|l| l.thumbnail),
        }
    }
}

fn parse_search(response: VolumesResponse) -> Vec<RemoteBook> {
    response
        .items
        .into_iter()
        .map(|v| {
            let isbn = v.volume_info.best_isbn();
            v.volume_info.into_remote(isbn, Some(SEARCH_DESCRIPTION_LEN))
        })
        .collect()
}

fn parse_isbn_lookup(response: VolumesResponse, isbn: &str) -> Option<RemoteBook> {
    response
        .items
        .into_iter()
        .next()
        .map(|v| v.volume_info.into_remote(isbn.to_string(), None))
}

/// HTTP client for a Google-Books-compatible volumes endpoint
#[derive(Clone)]
pub struct GoogleBooksClient {
    client: Client,
    config: CatalogLookupConfig,
}

impl GoogleBooksClient {
    pub fn new(config: CatalogLookupConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn volumes(&self, params: &[(&str, String)]) -> AppResult<VolumesResponse> {
        let response = self
            .client
            .get(&self.config.base_url)
            .query(params)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::Upstream(format!("Error connecting to catalog lookup: {}", e)))?;

        response
            .json::<VolumesResponse>()
            .await
            .map_err(|e| AppError::Upstream(format!("Error processing catalog lookup data: {}", e)))
    }
}

#[async_trait]
impl CatalogLookup for GoogleBooksClient {
    async fn search(&self, query: &str, max_results: u32) -> AppResult<Vec<RemoteBook>> {
        let mut params = vec![
            ("q", query.to_string()),
            ("maxResults", max_results.to_string()),
        ];
        if let Some(ref lang) = self.config.lang_restrict {
            params.push(("langRestrict", lang.clone()));
        }

        let response = self.volumes(&params).await?;
        let books = parse_search(response);
        tracing::debug!(query, results = books.len(), "Catalog lookup search");
        Ok(books)
    }

    async fn lookup_by_isbn(&self, isbn: &str) -> AppResult<Option<RemoteBook>> {
        let response = self.volumes(&[("q", format!("isbn:{}", isbn))]).await?;
        Ok(parse_isbn_lookup(response, isbn))
    }
}
