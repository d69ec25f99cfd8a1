use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::destination::DestinationApi;
use crate::source::SourceApi;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    pub source_url: String,
    pub id: u64,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageStats {
    pub uploaded: usize,
    pub cache_hits: usize,
    pub failed: usize,
}

/// Re-uploads source images to the destination, at most once per source URL.
#[derive(Debug, Default)]
pub struct ImageMigrator {
    cache: BTreeMap<String, ImageRecord>,
    stats: ImageStats,
}

impl ImageMigrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &ImageStats {
        &self.stats
    }

    pub fn cached(&self, source_url: &str) -> Option<&ImageRecord> {
        self.cache.get(source_url)
    }

    /// Failures are logged and yield `None`; they are not cached.
    pub fn migrate<S, D>(
        &mut self,
        source_url: &str,
        source: &mut S,
        destination: &mut D,
    ) -> Option<ImageRecord>
    where
        S: SourceApi,
        D: DestinationApi,
    {
        let source_url = source_url.trim();
        if source_url.is_empty() {
            return None;
        }
        if let Some(record) = self.cache.get(source_url) {
            self.stats.cache_hits += 1;
            debug!(source_url, id = record.id, "image cache hit");
            return Some(record.clone());
        }

        let file = match source.download(source_url) {
            Ok(file) => file,
            Err(error) => {
                self.stats.failed += 1;
                warn!(source_url, error = %format!("{error:#}"), "image download failed");
                return None;
            }
        };
        let asset = match destination.upload(file) {
            Ok(asset) => asset,
            Err(error) => {
                self.stats.failed += 1;
                warn!(source_url, error = %format!("{error:#}"), "image upload failed");
                return None;
            }
        };

        let record = ImageRecord {
            source_url: source_url.to_string(),
            id: asset.id,
            url: asset.url,
        };
        info!(source_url, id = record.id, url = %record.url, "uploaded image");
        self.stats.uploaded += 1;
        self.cache.insert(source_url.to_string(), record.clone());
        Some(record)
    }

    /// Follow a featured-media link to its `source_url` and migrate that image.
    pub fn resolve_featured_media<S, D>(
        &mut self,
        href: Option<&str>,
        source: &mut S,
        destination: &mut D,
    ) -> Option<ImageRecord>
    where
        S: SourceApi,
        D: DestinationApi,
    {
        let href = href?;
        let source_url = match source.featured_media_url(href) {
            Ok(Some(url)) => url,
            Ok(None) => {
                debug!(href, "featured media has no source_url");
                return None;
            }
            Err(error) => {
                self.stats.failed += 1;
                warn!(href, error = %format!("{error:#}"), "featured media lookup failed");
                return None;
            }
        };
        self.migrate(&source_url, source, destination)
    }
}
