//! YAML settings file

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::indexer::SearchMode;

/// Everything the search engine can be tuned with
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub search: SearchSettings,
    pub providers: Vec<ProviderConfig>,
    pub clients: ClientSettings,
}

impl Settings {
    /// Load settings from a YAML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "Settings file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Releases containing any of these words are skipped
    pub ignore_words: Vec<String>,
    /// Releases must contain at least one of these words when set
    pub require_words: Vec<String>,
    /// Track snatches so failed downloads can be retried with another release
    pub use_failed_downloads: bool,
    /// How many days back the scheduled backlog search looks
    pub backlog_days: i64,
    /// A full backlog search runs when the last one is older than this
    pub backlog_cycle_days: i64,
    pub randomize_providers: bool,
    pub download_propers: bool,
    /// Send recently aired episodes to the download client with high priority
    pub allow_high_priority: bool,
    pub daily_search_cron: String,
    pub backlog_search_cron: String,
    pub proper_finder_cron: String,
    pub show_update_cron: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            ignore_words: ["german", "french", "core2hd", "dutch", "swedish", "reenc", "MrLss"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            require_words: Vec::new(),
            use_failed_downloads: false,
            backlog_days: 7,
            backlog_cycle_days: 7,
            randomize_providers: false,
            download_propers: true,
            allow_high_priority: true,
            daily_search_cron: "0 */40 * * * *".to_string(),
            backlog_search_cron: "0 0 */8 * * *".to_string(),
            proper_finder_cron: "0 0 */4 * * *".to_string(),
            show_update_cron: "0 0 3 * * *".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Newznab,
    Torznab,
}

/// One configured newznab/torznab provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub search_mode: SearchMode,
    /// Retry with the other search mode when a search finds nothing
    #[serde(default)]
    pub search_fallback: bool,
    #[serde(default = "default_true")]
    pub enable_daily: bool,
    #[serde(default = "default_true")]
    pub enable_backlog: bool,
    #[serde(default)]
    pub anime_only: bool,
    #[serde(default = "default_categories")]
    pub categories: Vec<u32>,
}

fn default_true() -> bool {
    true
}

fn default_categories() -> Vec<u32> {
    vec![5030, 5040]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NzbMethod {
    #[default]
    Blackhole,
    Sabnzbd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TorrentMethod {
    #[default]
    Blackhole,
    Qbittorrent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub nzb_method: NzbMethod,
    pub torrent_method: TorrentMethod,
    /// Watch directory for `.nzb` files
    pub nzb_dir: PathBuf,
    /// Watch directory for `.torrent` and `.magnet` files
    pub torrent_dir: PathBuf,
    pub sabnzbd: Option<SabnzbdSettings>,
    pub qbittorrent: Option<QbittorrentSettings>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            nzb_method: NzbMethod::Blackhole,
            torrent_method: TorrentMethod::Blackhole,
            nzb_dir: PathBuf::from("./data/blackhole/nzb"),
            torrent_dir: PathBuf::from("./data/blackhole/torrent"),
            sabnzbd: None,
            qbittorrent: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SabnzbdSettings {
    pub host: String,
    pub api_key: String,
    #[serde(default = "default_category")]
    pub category: String,
    /// Use SABnzbd's "force" priority for high priority snatches
    #[serde(default)]
    pub forced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QbittorrentSettings {
    pub host: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_category")]
    pub label: String,
    #[serde(default)]
    pub paused: bool,
}

fn default_category() -> String {
    "tv".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let settings = Settings::from_yaml("{}").unwrap();
        assert_eq!(settings.search.backlog_days, 7);
        assert!(settings.providers.is_empty());
        assert_eq!(settings.clients.nzb_method, NzbMethod::Blackhole);
    }

    #[test]
    fn test_provider_entry() {
        let yaml = r#"
search:
  ignore_words: [german]
  use_failed_downloads: true
providers:
  - name: nzbgeek
    url: https://api.nzbgeek.info
    api_key: secret
    search_mode: sponly
    search_fallback: true
  - name: jackett
    url: http://localhost:9117/api/v2.0/indexers/all/results/torznab
    kind: torznab
    enable_daily: false
clients:
  nzb_method: sabnzbd
  sabnzbd:
    host: http://localhost:8080
    api_key: abc
"#;
        let settings = Settings::from_yaml(yaml).unwrap();

        assert_eq!(settings.search.ignore_words, vec!["german".to_string()]);
        assert!(settings.search.use_failed_downloads);
        assert_eq!(settings.providers.len(), 2);

        let nzbgeek = &settings.providers[0];
        assert_eq!(nzbgeek.kind, ProviderKind::Newznab);
        assert_eq!(nzbgeek.search_mode, SearchMode::SeasonOnly);
        assert!(nzbgeek.search_fallback);
        assert_eq!(nzbgeek.categories, vec![5030, 5040]);

        let jackett = &settings.providers[1];
        assert_eq!(jackett.kind, ProviderKind::Torznab);
        assert!(!jackett.enable_daily);
        assert!(jackett.enable_backlog);

        assert_eq!(settings.clients.nzb_method, NzbMethod::Sabnzbd);
        assert_eq!(
            settings.clients.sabnzbd.as_ref().map(|s| s.category.as_str()),
            Some("tv")
        );
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.yaml")).unwrap();
        assert!(settings.search.download_propers);
    }
}
