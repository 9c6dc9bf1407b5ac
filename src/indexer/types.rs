//! Core types for the provider system

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// What a provider hands out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Nzb,
    Torrent,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::Nzb => write!(f, "nzb"),
            ProviderType::Torrent => write!(f, "torrent"),
        }
    }
}

/// Whether a provider is searched per episode or per season
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchMode {
    #[default]
    #[serde(rename = "eponly")]
    EpisodeOnly,
    #[serde(rename = "sponly")]
    SeasonOnly,
}

impl SearchMode {
    /// The mode used for a fallback search
    pub fn other(self) -> Self {
        match self {
            SearchMode::EpisodeOnly => SearchMode::SeasonOnly,
            SearchMode::SeasonOnly => SearchMode::EpisodeOnly,
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMode::EpisodeOnly => write!(f, "eponly"),
            SearchMode::SeasonOnly => write!(f, "sponly"),
        }
    }
}

/// Per-provider search behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub enabled: bool,
    pub search_mode: SearchMode,
    pub search_fallback: bool,
    pub enable_daily: bool,
    pub enable_backlog: bool,
    pub anime_only: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            search_mode: SearchMode::EpisodeOnly,
            search_fallback: false,
            enable_daily: true,
            enable_backlog: true,
            anime_only: false,
        }
    }
}

/// A TV search against a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderQuery {
    pub show_name: String,
    pub tvdb_id: Option<i64>,
    pub season: Option<i32>,
    pub episode: Option<i32>,
    pub air_date: Option<NaiveDate>,
    /// Extra words appended to the text query (`PROPER`, `REPACK`)
    pub extra_terms: Option<String>,
}

impl ProviderQuery {
    pub fn episode(show_name: &str, tvdb_id: Option<i64>, season: i32, episode: i32) -> Self {
        Self {
            show_name: show_name.to_string(),
            tvdb_id,
            season: Some(season),
            episode: Some(episode),
            ..Default::default()
        }
    }

    pub fn season(show_name: &str, tvdb_id: Option<i64>, season: i32) -> Self {
        Self {
            show_name: show_name.to_string(),
            tvdb_id,
            season: Some(season),
            ..Default::default()
        }
    }

    /// Free text part of the query
    pub fn search_term(&self) -> String {
        match &self.extra_terms {
            Some(extra) => format!("{} {}", self.show_name, extra),
            None => self.show_name.clone(),
        }
    }
}

/// A release as reported by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    /// Release title
    pub title: String,

    /// Unique identifier (usually the details URL)
    pub guid: String,

    /// Download link (NZB or torrent file)
    pub link: Option<String>,

    /// Magnet URI
    pub magnet_uri: Option<String>,

    /// Publication date
    pub publish_date: DateTime<Utc>,

    /// Newznab category IDs
    pub categories: Vec<i32>,

    /// Size in bytes
    pub size: Option<i64>,

    pub grabs: Option<i32>,
    pub seeders: Option<i32>,
    pub peers: Option<i32>,

    /// TVDB ID reported by the provider
    pub tvdb_id: Option<i64>,

    /// The provider that found this release
    pub provider: String,
}

impl ReleaseInfo {
    /// Create a new release with minimal info
    pub fn new(title: impl Into<String>, provider: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            guid: title.clone(),
            title,
            link: None,
            magnet_uri: None,
            publish_date: Utc::now(),
            categories: vec![],
            size: None,
            grabs: None,
            seeders: None,
            peers: None,
            tvdb_id: None,
            provider: provider.into(),
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Where the release can be fetched from; magnets win over torrent files
    pub fn download_url(&self) -> Option<&str> {
        self.magnet_uri.as_deref().or(self.link.as_deref())
    }
}
