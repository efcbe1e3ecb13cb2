//! Configuration loading for rxdigest.
//! Reads rxdigest.toml from the current directory or path in RXDIGEST_CONFIG env var.

use rxdigest_ingestion::filter::KeywordFilterConfig;
use rxdigest_ingestion::query::QueryGroup;
use rxdigest_ingestion::retry::RetryPolicy;
use rxdigest_ingestion::sources::arxiv::ARXIV_API_URL;
use rxdigest_ingestion::sources::biorxiv::BIORXIV_API_URL;
use rxdigest_ingestion::PipelineJob;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const KNOWN_SOURCES: &[&str] = &["arxiv", "biorxiv", "medrxiv", "manual"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub filter: KeywordFilterConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub arxiv: ArxivConfig,
    #[serde(default)]
    pub biorxiv: BioRxivConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub keyword_groups: Vec<QueryGroup>,
    /// 0 = no date restriction.
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,
    #[serde(default)]
    pub concurrent: bool,
    #[serde(default)]
    pub manual_links: Vec<String>,
    pub adapter_timeout_secs: Option<u64>,
}

fn default_days()        -> u32   { 3 }
fn default_max_results() -> usize { 50 }

fn default_sources() -> Vec<String> {
    vec!["arxiv".to_string(), "medrxiv".to_string()]
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            keyword_groups: Vec::new(),
            days: default_days(),
            max_results: default_max_results(),
            sources: default_sources(),
            concurrent: false,
            manual_links: Vec::new(),
            adapter_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

fn default_max_retries() -> u32 { 3 }
fn default_delay_secs()  -> u64 { 5 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: default_max_retries(), delay_secs: default_delay_secs() }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_secs(self.delay_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArxivConfig {
    #[serde(default = "default_arxiv_url")]
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_arxiv_url() -> String { ARXIV_API_URL.to_string() }
fn default_page_size() -> usize  { 100 }

impl Default for ArxivConfig {
    fn default() -> Self {
        Self { base_url: default_arxiv_url(), page_size: default_page_size() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BioRxivConfig {
    #[serde(default = "default_biorxiv_url")]
    pub base_url: String,
}

fn default_biorxiv_url() -> String { BIORXIV_API_URL.to_string() }

impl Default for BioRxivConfig {
    fn default() -> Self {
        Self { base_url: default_biorxiv_url() }
    }
}


impl Config {
    /// Load configuration from rxdigest.toml.
    /// Checks RXDIGEST_CONFIG env var first, then current directory.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("RXDIGEST_CONFIG")
            .unwrap_or_else(|_| "rxdigest.toml".to_string());

        if !Path::new(&path).exists() {
            anyhow::bail!(
                "Config file not found: {}\n\
                 Copy rxdigest.example.toml to rxdigest.toml and edit it.",
                path
            );
        }

        let content = std::fs::read_to_string(&path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// RXDIGEST_SEARCH_DAYS and RXDIGEST_MAX_RESULTS win over the file.
    fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(days) = std::env::var("RXDIGEST_SEARCH_DAYS") {
            self.search.days = days
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("RXDIGEST_SEARCH_DAYS={days}: {e}"))?;
        }
        if let Ok(max) = std::env::var("RXDIGEST_MAX_RESULTS") {
            self.search.max_results = max
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("RXDIGEST_MAX_RESULTS={max}: {e}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.search.max_results == 0 {
            anyhow::bail!("search.max_results must be greater than 0");
        }
        if self.arxiv.page_size == 0 {
            anyhow::bail!("arxiv.page_size must be greater than 0");
        }
        if let Some(unknown) = self
            .search
            .sources
            .iter()
            .find(|s| !KNOWN_SOURCES.contains(&s.as_str()))
        {
            anyhow::bail!(
                "Unknown source '{}' in search.sources (expected one of: {})",
                unknown,
                KNOWN_SOURCES.join(", ")
            );
        }

        for group in &self.search.keyword_groups {
            if !group.is_usable() {
                info!(
                    kind = group.kind(),
                    keywords = ?group.keywords(),
                    "Keyword group has too few keywords and will be ignored"
                );
            }
        }
        if self.search.days == 0
            && self.search.sources.iter().any(|s| s == "biorxiv" || s == "medrxiv")
        {
            warn!("search.days = 0: bioRxiv/medRxiv listings start at the server launch date");
        }
        Ok(())
    }

    pub fn to_job(&self) -> PipelineJob {
        PipelineJob {
            domains: self.search.domains.clone(),
            keyword_groups: self.search.keyword_groups.clone(),
            days: self.search.days,
            max_results: self.search.max_results,
            concurrent: self.search.concurrent,
            adapter_timeout_secs: self.search.adapter_timeout_secs,
            filter: self.filter.clone(),
        }
    }
}
