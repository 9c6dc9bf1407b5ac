//! Search providers
//!
//! A provider is a usenet or torrent indexer that can be searched for
//! releases of a show. Providers are configured in the settings file and kept
//! in a [`ProviderRegistry`] in the configured order.

pub mod newznab;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use thiserror::Error;

use crate::config::{ProviderConfig, ProviderKind};
pub use newznab::NewznabProvider;
pub use types::{ProviderQuery, ProviderSettings, ProviderType, ReleaseInfo, SearchMode};

/// Errors a provider can report
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Bad API key or account problem; retrying will not help
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("invalid response: {0}")]
    Parse(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Http(e.to_string())
    }
}

/// A searchable source of releases
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    fn provider_type(&self) -> ProviderType;

    fn settings(&self) -> &ProviderSettings;

    /// Run a TV search
    async fn search(&self, query: &ProviderQuery) -> Result<Vec<ReleaseInfo>, ProviderError>;

    /// Latest releases from the provider's feed, used by the daily search
    async fn recent(&self) -> Result<Vec<ReleaseInfo>, ProviderError>;

    /// Fetch the NZB or torrent file behind a download link
    async fn download(&self, url: &str) -> Result<Vec<u8>, ProviderError>;

    fn is_active(&self) -> bool {
        self.settings().enabled
    }
}

/// The configured providers in priority order
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn SearchProvider>>,
    randomize: bool,
}

impl ProviderRegistry {
    pub fn new(randomize: bool) -> Self {
        Self {
            providers: Vec::new(),
            randomize,
        }
    }

    /// Build providers from settings entries; broken entries are logged and skipped
    pub fn from_config(configs: &[ProviderConfig], randomize: bool) -> Self {
        let mut registry = Self::new(randomize);

        for config in configs {
            let provider_type = match config.kind {
                ProviderKind::Newznab => ProviderType::Nzb,
                ProviderKind::Torznab => ProviderType::Torrent,
            };

            match NewznabProvider::new(config, provider_type) {
                Ok(provider) => registry.register(Arc::new(provider)),
                Err(e) => {
                    tracing::warn!(provider = %config.name, error = %e, "Failed to create provider");
                }
            }
        }

        registry
    }

    pub fn register(&mut self, provider: Arc<dyn SearchProvider>) {
        self.providers.push(provider);
    }

    pub fn all(&self) -> &[Arc<dyn SearchProvider>] {
        &self.providers
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SearchProvider>> {
        self.providers
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Every enabled provider
    pub fn active_providers(&self) -> Vec<Arc<dyn SearchProvider>> {
        self.select(|p| p.is_active())
    }

    /// Enabled providers with backlog search turned on
    pub fn backlog_providers(&self) -> Vec<Arc<dyn SearchProvider>> {
        self.select(|p| p.is_active() && p.settings().enable_backlog)
    }

    /// Enabled providers with daily search turned on
    pub fn daily_providers(&self) -> Vec<Arc<dyn SearchProvider>> {
        self.select(|p| p.is_active() && p.settings().enable_daily)
    }

    fn select(&self, filter: impl Fn(&dyn SearchProvider) -> bool) -> Vec<Arc<dyn SearchProvider>> {
        let mut selected: Vec<_> = self
            .providers
            .iter()
            .filter(|p| filter(p.as_ref()))
            .cloned()
            .collect();

        if self.randomize {
            selected.shuffle(&mut rand::thread_rng());
        }

        selected
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
