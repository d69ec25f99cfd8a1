use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILENAME: &str = "wp2strapi.toml";
pub const DEFAULT_USER_AGENT: &str = "wp2strapi/0.2";
pub const DEFAULT_PER_PAGE: u32 = 100;
pub const DEFAULT_ARTICLE_EXCERPT_CHARS: usize = 80;
pub const DEFAULT_STRIP_ATTRIBUTE_PREFIXES: &[&str] = &["data-elementor"];

pub const ENV_SOURCE_API_URL: &str = "WP_API_URL";
pub const ENV_DESTINATION_URL: &str = "STRAPI_URL";
pub const ENV_DESTINATION_TOKEN: &str = "STRAPI_API_TOKEN";
pub const ENV_USER_AGENT: &str = "MIGRATE_USER_AGENT";
pub const ENV_HTTP_TIMEOUT_MS: &str = "MIGRATE_HTTP_TIMEOUT_MS";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MigrateConfig {
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default)]
    pub destination: DestinationSection,
    #[serde(default)]
    pub content: ContentSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SourceSection {
    pub api_url: Option<String>,
    pub per_page: Option<u32>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DestinationSection {
    pub url: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ContentSection {
    pub strip_attribute_prefixes: Option<Vec<String>>,
    pub article_excerpt_chars: Option<usize>,
}

/// Flattened settings after env > config file > default resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub source_api_url: String,
    pub destination_url: String,
    pub destination_token: Option<String>,
    pub source_user_agent: String,
    pub destination_user_agent: String,
    pub timeout_ms: Option<u64>,
    pub per_page: u32,
    pub strip_attribute_prefixes: Vec<String>,
    pub article_excerpt_chars: usize,
}

impl ResolvedSettings {
    pub fn from_process(config: &MigrateConfig) -> Result<Self> {
        Self::resolve(config, |key| env::var(key).ok())
    }

    pub fn resolve<F>(config: &MigrateConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let source_api_url = env_value(ENV_SOURCE_API_URL)
            .or_else(|| config.source.api_url.clone())
            .map(|value| value.trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty());
        let Some(source_api_url) = source_api_url else {
            bail!(
                "source API url is not configured (set {ENV_SOURCE_API_URL} or [source].api_url)"
            );
        };

        let destination_url = env_value(ENV_DESTINATION_URL)
            .or_else(|| config.destination.url.clone())
            .map(|value| value.trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty());
        let Some(destination_url) = destination_url else {
            bail!(
                "destination url is not configured (set {ENV_DESTINATION_URL} or [destination].url)"
            );
        };

        let env_user_agent = env_value(ENV_USER_AGENT);
        let source_user_agent = env_user_agent
            .clone()
            .or_else(|| config.source.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let destination_user_agent = env_user_agent
            .or_else(|| config.destination.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let timeout_ms = match env_value(ENV_HTTP_TIMEOUT_MS) {
            Some(raw) => Some(
                raw.parse::<u64>()
                    .with_context(|| format!("invalid {ENV_HTTP_TIMEOUT_MS}: {raw}"))?,
            ),
            None => None,
        };

        let per_page = config.source.per_page.unwrap_or(DEFAULT_PER_PAGE);
        if per_page == 0 {
            bail!("[source].per_page must be greater than zero");
        }

        Ok(Self {
            source_api_url,
            destination_url,
            destination_token: env_value(ENV_DESTINATION_TOKEN),
            source_user_agent,
            destination_user_agent,
            timeout_ms,
            per_page,
            strip_attribute_prefixes: config
                .content
                .strip_attribute_prefixes
                .clone()
                .unwrap_or_else(|| {
                    DEFAULT_STRIP_ATTRIBUTE_PREFIXES
                        .iter()
                        .map(ToString::to_string)
                        .collect()
                }),
            article_excerpt_chars: config
                .content
                .article_excerpt_chars
                .unwrap_or(DEFAULT_ARTICLE_EXCERPT_CHARS),
        })
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "source_api_url={}\ndestination_url={}\ndestination_token={}\nsource_user_agent={}\ndestination_user_agent={}\ntimeout_ms={}\nper_page={}\nstrip_attribute_prefixes={}\narticle_excerpt_chars={}",
            self.source_api_url,
            self.destination_url,
            if self.destination_token.is_some() {
                "set"
            } else {
                "unset (public write access)"
            },
            self.source_user_agent,
            self.destination_user_agent,
            self.timeout_ms
                .map(|value| value.to_string())
                .unwrap_or_else(|| "client default".to_string()),
            self.per_page,
            self.strip_attribute_prefixes.join(","),
            self.article_excerpt_chars
        )
    }
}

/// Load and parse a MigrateConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<MigrateConfig> {
    if !config_path.exists() {
        return Ok(MigrateConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: MigrateConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}
