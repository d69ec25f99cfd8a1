use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::ResolvedSettings;
use crate::source::DownloadedFile;

pub const RICH_TEXT_COMPONENT: &str = "shared.rich-text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DestinationCollection {
    Categories,
    Articles,
    Tours,
    Pages,
}

impl DestinationCollection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Articles => "articles",
            Self::Tours => "tours",
            Self::Pages => "pages",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DestinationCategory {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub wp_id: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RichTextBlock {
    #[serde(rename = "__component")]
    pub component: String,
    pub body: String,
}

impl RichTextBlock {
    pub fn new(body: String) -> Self {
        Self {
            component: RICH_TEXT_COMPONENT.to_string(),
            body,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DestinationArticle {
    pub title: String,
    pub slug: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<u64>,
    pub blocks: Vec<RichTextBlock>,
    pub wp_id: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DestinationTour {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured_image: Option<u64>,
    pub duration: String,
    pub distance: String,
    pub wp_id: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DestinationPage {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured_image: Option<u64>,
    pub wp_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEntry {
    pub id: u64,
    pub document_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedAsset {
    pub id: u64,
    pub url: String,
}

pub trait DestinationApi {
    fn create(&mut self, collection: DestinationCollection, data: &Value) -> Result<CreatedEntry>;
    fn upload(&mut self, file: DownloadedFile) -> Result<UploadedAsset>;
    fn request_count(&self) -> usize;
}

pub struct StrapiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    user_agent: String,
    request_count: usize,
}

impl StrapiClient {
    pub fn new(settings: &ResolvedSettings) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout_ms) = settings.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let client = builder
            .build()
            .context("failed to build Strapi HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.destination_url.clone(),
            token: settings.destination_token.clone(),
            user_agent: settings.destination_user_agent.clone(),
            request_count: 0,
        })
    }

    fn post(&mut self, path: &str) -> RequestBuilder {
        self.request_count += 1;
        self.request(path)
    }

    /// Bearer auth is attached only when a token is configured.
    fn request(&self, path: &str) -> RequestBuilder {
        let request = self
            .client
            .post(format!("{}/api/{path}", self.base_url))
            .header(USER_AGENT, self.user_agent.clone());
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl DestinationApi for StrapiClient {
    fn create(&mut self, collection: DestinationCollection, data: &Value) -> Result<CreatedEntry> {
        let response = self
            .post(collection.as_str())
            .json(&json!({ "data": data }))
            .send()
            .with_context(|| {
                format!("failed to call Strapi {} endpoint", collection.as_str())
            })?;

        let status = response.status();
        let body = response
            .text()
            .context("failed to read Strapi response body")?;
        if !status.is_success() {
            bail!(
                "Strapi create {} failed with HTTP {}: {}",
                collection.as_str(),
                status.as_u16(),
                body
            );
        }
        parse_created_entry(&body)
    }

    fn upload(&mut self, file: DownloadedFile) -> Result<UploadedAsset> {
        let file_name = file.file_name.clone();
        let part = match file.content_length {
            Some(length) => Part::reader_with_length(file.body, length),
            None => Part::reader(file.body),
        };
        let part = part
            .file_name(file.file_name)
            .mime_str(&file.content_type)
            .with_context(|| format!("invalid content type for {file_name}"))?;
        let form = Form::new().part("files", part);

        let response = self
            .post("upload")
            .multipart(form)
            .send()
            .with_context(|| format!("failed to upload {file_name} to Strapi"))?;

        let status = response.status();
        let body = response
            .text()
            .context("failed to read Strapi upload response")?;
        if !status.is_success() {
            bail!(
                "Strapi upload of {file_name} failed with HTTP {}: {}",
                status.as_u16(),
                body
            );
        }
        parse_uploaded_asset(&body)
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn parse_created_entry(body: &str) -> Result<CreatedEntry> {
    let parsed: CreateResponse =
        serde_json::from_str(body).context("failed to decode Strapi create response")?;
    let data = parsed
        .data
        .ok_or_else(|| anyhow::anyhow!("missing data in Strapi create response"))?;
    Ok(CreatedEntry {
        id: data.id,
        document_id: data.document_id,
    })
}

fn parse_uploaded_asset(body: &str) -> Result<UploadedAsset> {
    let assets: Vec<UploadResponseItem> =
        serde_json::from_str(body).context("failed to decode Strapi upload response")?;
    let first = assets
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Strapi upload response contained no assets"))?;
    Ok(UploadedAsset {
        id: first.id,
        url: first.url,
    })
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    data: Option<CreatedData>,
}

#[derive(Debug, Deserialize)]
struct CreatedData {
    id: u64,
    #[serde(default, rename = "documentId")]
    document_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponseItem {
    id: u64,
    url: String,
}
