//! Searching providers and deciding what to snatch
//!
//! The flow for a backlog, manual or failed search is
//! [`search_providers`] → [`pick_best_result`] per episode →
//! [`snatch_episode`]. The daily search goes through
//! [`search_for_needed_episodes`] instead, which reads provider feeds rather
//! than issuing queries.

pub mod needed;
pub mod nzb_splitter;
pub mod picker;
pub mod propers;
pub mod providers;
pub mod release_groups;
pub mod snatch;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::clients::DownloadClients;
use crate::common::{CompositeStatus, EpisodeKey, Quality};
use crate::config::SearchSettings;
use crate::db::{Database, EpisodeRecord};
use crate::indexer::{ProviderRegistry, ProviderType, ReleaseInfo, SearchProvider};
use crate::services::{NotificationService, ParsedRelease};

pub use needed::{search_for_needed_episodes, wanted_episodes};
pub use picker::{ResultFilters, WordList, is_final_result, is_first_best_match, pick_best_result};
pub use propers::{find_propers, snatch_propers};
pub use providers::{find_search_results, search_providers, want_episode};
pub use release_groups::BlackAndWhiteList;
pub use snatch::snatch_episode;

static PROPER_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|[. _-])(proper|repack)([. _-]|$)").expect("valid proper regex")
});

/// What a result points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    /// A link to an NZB file
    Nzb,
    /// NZB content held in memory (split out of a season pack)
    NzbData,
    /// A torrent file link or magnet URI
    Torrent,
}

/// A release matched to a show and the episodes it contains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub provider: String,
    pub provider_type: ProviderType,
    /// Release name
    pub name: String,
    pub url: String,
    pub result_type: ResultType,
    pub quality: Quality,
    pub show_id: i64,
    /// Episodes contained in the release; empty for an unexpanded season pack
    pub episodes: Vec<EpisodeKey>,
    pub release_group: Option<String>,
    pub version: i32,
    pub size: Option<i64>,
    #[serde(skip)]
    pub content: Option<Vec<u8>>,
    /// Download client priority: 0 normal, 1 high
    pub priority: i32,
}

impl SearchResult {
    pub fn new(
        provider: impl Into<String>,
        provider_type: ProviderType,
        name: impl Into<String>,
        url: impl Into<String>,
        show_id: i64,
    ) -> Self {
        let result_type = match provider_type {
            ProviderType::Nzb => ResultType::Nzb,
            ProviderType::Torrent => ResultType::Torrent,
        };

        Self {
            provider: provider.into(),
            provider_type,
            name: name.into(),
            url: url.into(),
            result_type,
            quality: Quality::UNKNOWN,
            show_id,
            episodes: Vec::new(),
            release_group: None,
            version: -1,
            size: None,
            content: None,
            priority: 0,
        }
    }

    /// Result for a provider release matched to `episodes` of a show.
    /// `None` when the release has no download link.
    pub fn from_release(
        provider: &dyn SearchProvider,
        release: &ReleaseInfo,
        parsed: &ParsedRelease,
        show_id: i64,
        quality: Quality,
        episodes: Vec<EpisodeKey>,
    ) -> Option<Self> {
        let url = release.download_url()?;
        let mut result = Self::new(
            provider.name(),
            provider.provider_type(),
            release.title.clone(),
            url,
            show_id,
        );
        if result.is_magnet() {
            result.result_type = ResultType::Torrent;
        }
        result.quality = quality;
        result.episodes = episodes;
        result.release_group = parsed.release_group.clone();
        result.version = parsed.version;
        result.size = release.size;
        Some(result)
    }

    /// Whether the release name carries a proper or repack tag
    pub fn is_proper(&self) -> bool {
        PROPER_NAME.is_match(&self.name)
    }

    pub fn is_magnet(&self) -> bool {
        self.url.starts_with("magnet:")
    }

    pub fn covers(&self, key: &EpisodeKey) -> bool {
        self.episodes.contains(key)
    }

    /// Bucket this result belongs to in a [`ResultMap`]
    pub fn result_key(&self) -> ResultKey {
        match self.episodes.as_slice() {
            [] => ResultKey::Season,
            [single] => ResultKey::Episode(*single),
            _ => ResultKey::MultiEp,
        }
    }
}

/// Bucket for search results: one episode, several episodes, or a whole season
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResultKey {
    Episode(EpisodeKey),
    MultiEp,
    Season,
}

/// Results of one provider grouped by bucket
pub type ResultMap = BTreeMap<ResultKey, Vec<SearchResult>>;

/// Every episode of one show, loaded once per search
#[derive(Debug, Clone, Default)]
pub struct EpisodeIndex {
    episodes: BTreeMap<EpisodeKey, EpisodeRecord>,
}

impl EpisodeIndex {
    pub async fn load(db: &Database, show_id: i64) -> Result<Self> {
        let episodes = db.episodes().list_by_show(show_id).await?;
        Ok(Self::from_records(episodes))
    }

    pub fn from_records(records: impl IntoIterator<Item = EpisodeRecord>) -> Self {
        Self {
            episodes: records.into_iter().map(|e| (e.key(), e)).collect(),
        }
    }

    pub fn get(&self, key: &EpisodeKey) -> Option<&EpisodeRecord> {
        self.episodes.get(key)
    }

    pub fn status(&self, key: &EpisodeKey) -> Option<CompositeStatus> {
        self.get(key).map(EpisodeRecord::composite)
    }

    pub fn by_airdate(&self, date: NaiveDate) -> Vec<&EpisodeRecord> {
        self.episodes
            .values()
            .filter(|e| e.airdate == Some(date))
            .collect()
    }

    /// Every known episode of the given seasons
    pub fn in_seasons(&self, seasons: &BTreeSet<i32>) -> Vec<EpisodeKey> {
        self.episodes
            .keys()
            .filter(|k| seasons.contains(&k.season))
            .copied()
            .collect()
    }
}

/// Everything a search needs, shared by all queue items
pub struct SearchContext {
    pub db: Database,
    pub providers: ProviderRegistry,
    pub clients: DownloadClients,
    pub notifications: Arc<NotificationService>,
    pub settings: SearchSettings,
}

impl SearchContext {
    /// Global release filters, loading the failed list when enabled
    pub async fn result_filters(&self) -> Result<ResultFilters> {
        let failed = if self.settings.use_failed_downloads {
            Some(self.db.failed().failed_release_names().await?)
        } else {
            None
        };

        Ok(ResultFilters {
            ignore_words: WordList::new(&self.settings.ignore_words),
            require_words: WordList::new(&self.settings.require_words),
            failed_releases: failed,
        })
    }
}
