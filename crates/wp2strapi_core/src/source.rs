use std::fmt;
use std::io::{Cursor, Read};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ResolvedSettings;

pub const TOTAL_PAGES_HEADER: &str = "x-wp-totalpages";
const INVALID_PAGE_CODE: &str = "rest_post_invalid_page_number";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceResource {
    Categories,
    Posts,
    Pages,
}

impl SourceResource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Posts => "posts",
            Self::Pages => "pages",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct Rendered {
    #[serde(default)]
    pub rendered: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SourceCategory {
    pub id: u64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
}

/// A post or page as exposed by the WordPress REST API.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SourcePost {
    pub id: u64,
    #[serde(default)]
    pub title: Rendered,
    pub slug: String,
    #[serde(default)]
    pub content: Rendered,
    #[serde(default)]
    pub excerpt: Rendered,
    #[serde(default)]
    pub categories: Vec<u64>,
    #[serde(default, rename = "_links")]
    pub links: SourceLinks,
}

/// Pages share the post shape; `categories` is always empty for them.
pub type SourcePage = SourcePost;

impl SourcePost {
    pub fn featured_media_href(&self) -> Option<&str> {
        self.links
            .featured_media
            .first()
            .map(|link| link.href.as_str())
            .filter(|href| !href.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct SourceLinks {
    #[serde(default, rename = "wp:featuredmedia")]
    pub featured_media: Vec<LinkHref>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LinkHref {
    pub href: String,
}

#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub items: Vec<Value>,
    pub total_pages: Option<u32>,
}

/// An image body still being read from the source, handed to the upload as-is.
pub struct DownloadedFile {
    pub file_name: String,
    pub content_type: String,
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl DownloadedFile {
    pub fn from_bytes(file_name: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            content_length: Some(bytes.len() as u64),
            body: Box::new(Cursor::new(bytes)),
        }
    }
}

impl fmt::Debug for DownloadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadedFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

pub trait SourceApi {
    fn fetch_batch(
        &mut self,
        resource: SourceResource,
        page: u32,
        per_page: u32,
    ) -> Result<SourceBatch>;
    fn featured_media_url(&mut self, href: &str) -> Result<Option<String>>;
    fn download(&mut self, url: &str) -> Result<DownloadedFile>;
    fn request_count(&self) -> usize;
}

pub struct WordPressClient {
    client: Client,
    api_url: String,
    user_agent: String,
    request_count: usize,
}

impl WordPressClient {
    pub fn new(settings: &ResolvedSettings) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout_ms) = settings.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let client = builder
            .build()
            .context("failed to build WordPress HTTP client")?;

        Ok(Self {
            client,
            api_url: settings.source_api_url.clone(),
            user_agent: settings.source_user_agent.clone(),
            request_count: 0,
        })
    }

    fn get(&mut self, url: Url) -> Result<reqwest::blocking::Response> {
        self.request_count += 1;
        self.client
            .get(url.clone())
            .header("User-Agent", self.user_agent.clone())
            .send()
            .with_context(|| format!("failed to call {url}"))
    }
}

impl SourceApi for WordPressClient {
    fn fetch_batch(
        &mut self,
        resource: SourceResource,
        page: u32,
        per_page: u32,
    ) -> Result<SourceBatch> {
        let endpoint = format!("{}/{}", self.api_url, resource.as_str());
        let mut url = Url::parse(&endpoint)
            .with_context(|| format!("invalid WordPress endpoint: {endpoint}"))?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &per_page.to_string());

        let response = self.get(url)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("{}", describe_wordpress_error(status, &body));
        }

        let total_pages = response
            .headers()
            .get(TOTAL_PAGES_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u32>().ok());
        let items: Vec<Value> = response.json().with_context(|| {
            format!("failed to decode WordPress {} page {page}", resource.as_str())
        })?;

        Ok(SourceBatch { items, total_pages })
    }

    fn featured_media_url(&mut self, href: &str) -> Result<Option<String>> {
        let url =
            Url::parse(href).with_context(|| format!("invalid featured media link: {href}"))?;
        let response = self.get(url)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("{}", describe_wordpress_error(status, &body));
        }
        let media: MediaResponse = response
            .json()
            .context("failed to decode WordPress media response")?;
        Ok(media.source_url.filter(|value| !value.trim().is_empty()))
    }

    fn download(&mut self, url: &str) -> Result<DownloadedFile> {
        let parsed = Url::parse(url).with_context(|| format!("invalid image url: {url}"))?;
        let file_name = file_name_from_url(&parsed);
        let response = self.get(parsed)?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} while downloading {}", status.as_u16(), url);
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let content_length = response.content_length();

        Ok(DownloadedFile {
            file_name,
            content_type,
            content_length,
            body: Box::new(response),
        })
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

/// Fetch every page of `resource`, stopping at the advertised page count, an
/// empty page, or the first API error. Items collected before a failure are
/// kept; items that fail to decode are skipped.
pub fn fetch_all<T, A>(api: &mut A, resource: SourceResource, per_page: u32) -> Vec<T>
where
    T: DeserializeOwned,
    A: SourceApi,
{
    let mut collected = Vec::new();
    let mut page = 1u32;

    loop {
        let batch = match api.fetch_batch(resource, page, per_page) {
            Ok(batch) => batch,
            Err(error) if is_out_of_range_error(&error) => {
                debug!(
                    resource = resource.as_str(),
                    page,
                    "reached end of pagination"
                );
                break;
            }
            Err(error) => {
                warn!(
                    resource = resource.as_str(),
                    page,
                    error = %format!("{error:#}"),
                    "fetch failed; continuing with items collected so far"
                );
                break;
            }
        };

        if batch.items.is_empty() {
            break;
        }
        for (index, item) in batch.items.into_iter().enumerate() {
            match serde_json::from_value::<T>(item) {
                Ok(decoded) => collected.push(decoded),
                Err(error) => warn!(
                    resource = resource.as_str(),
                    page,
                    index,
                    %error,
                    "skipping item that failed to decode"
                ),
            }
        }

        if batch.total_pages.is_some_and(|total| page >= total) {
            break;
        }
        page += 1;
    }

    debug!(
        resource = resource.as_str(),
        count = collected.len(),
        "fetched source items"
    );
    collected
}

pub fn is_out_of_range_error(error: &anyhow::Error) -> bool {
    let message = error.to_string();
    message.contains(INVALID_PAGE_CODE)
        || (message.contains("HTTP 400") && message.contains("invalid_page_number"))
}

fn describe_wordpress_error(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(error) => format!(
            "WordPress API error [{}] HTTP {}: {}",
            error.code.unwrap_or_else(|| "unknown_error".to_string()),
            status.as_u16(),
            error.message.unwrap_or_default()
        ),
        Err(_) => format!("WordPress API request failed with HTTP {}", status.as_u16()),
    }
}

fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .unwrap_or("image")
        .to_string()
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaResponse {
    source_url: Option<String>,
}
