//! TVMaze API client for show metadata
//!
//! TVMaze is a free API that doesn't require authentication.
//! Base URL: https://api.tvmaze.com

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Show details needed to track a show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowMetadata {
    pub indexer_id: i64,
    pub name: String,
    pub tvdb_id: Option<i64>,
    pub is_anime: bool,
}

/// One episode as listed by the metadata source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMetadata {
    pub season: i32,
    pub episode: i32,
    pub name: Option<String>,
    pub airdate: Option<NaiveDate>,
}

/// Where show and episode lists come from
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn get_show(&self, indexer_id: i64) -> Result<ShowMetadata>;

    async fn get_episodes(&self, indexer_id: i64) -> Result<Vec<EpisodeMetadata>>;
}

/// TVMaze API client
pub struct TvMazeClient {
    client: Client,
    base_url: String,
}

/// Show details from TVMaze
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvMazeShow {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub show_type: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub status: Option<String>,
    pub externals: Option<TvMazeExternals>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvMazeExternals {
    pub tvrage: Option<u32>,
    pub thetvdb: Option<u32>,
    pub imdb: Option<String>,
}

/// Episode from TVMaze
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvMazeEpisode {
    pub id: u32,
    pub name: Option<String>,
    pub season: u32,
    /// Missing for unnumbered specials
    pub number: Option<u32>,
    pub airdate: Option<String>,
}

impl TvMazeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get show details by TVMaze ID
    pub async fn fetch_show(&self, tvmaze_id: u32) -> Result<TvMazeShow> {
        info!(tvmaze_id = tvmaze_id, "Fetching show from TVMaze");

        let url = format!("{}/shows/{}", self.base_url, tvmaze_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch show from TVMaze")?;

        if !response.status().is_success() {
            anyhow::bail!("TVMaze get show failed with status: {}", response.status());
        }

        let show: TvMazeShow = response
            .json()
            .await
            .context("Failed to parse TVMaze show")?;

        Ok(show)
    }

    /// Get all episodes for a show, specials included
    pub async fn fetch_episodes(&self, tvmaze_id: u32) -> Result<Vec<TvMazeEpisode>> {
        info!(tvmaze_id = tvmaze_id, "Fetching episodes from TVMaze");

        let url = format!("{}/shows/{}/episodes", self.base_url, tvmaze_id);
        let response = self
            .client
            .get(&url)
            .query(&[("specials", "1")])
            .send()
            .await
            .context("Failed to fetch episodes from TVMaze")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "TVMaze get episodes failed with status: {}",
                response.status()
            );
        }

        let episodes: Vec<TvMazeEpisode> = response
            .json()
            .await
            .context("Failed to parse TVMaze episodes")?;

        debug!(count = episodes.len(), "TVMaze returned episodes");
        Ok(episodes)
    }
}

impl Default for TvMazeClient {
    fn default() -> Self {
        Self::new("https://api.tvmaze.com")
    }
}

#[async_trait]
impl MetadataSource for TvMazeClient {
    async fn get_show(&self, indexer_id: i64) -> Result<ShowMetadata> {
        let id = u32::try_from(indexer_id).context("TVMaze IDs are positive 32-bit numbers")?;
        Ok(self.fetch_show(id).await?.into())
    }

    async fn get_episodes(&self, indexer_id: i64) -> Result<Vec<EpisodeMetadata>> {
        let id = u32::try_from(indexer_id).context("TVMaze IDs are positive 32-bit numbers")?;
        Ok(to_episode_metadata(self.fetch_episodes(id).await?))
    }
}

impl TvMazeShow {
    /// Get TVDB ID if available
    pub fn tvdb_id(&self) -> Option<u32> {
        self.externals.as_ref().and_then(|e| e.thetvdb)
    }

    pub fn is_anime(&self) -> bool {
        self.show_type.as_deref() == Some("Animation")
            && self.language.as_deref() == Some("Japanese")
    }
}

impl From<TvMazeShow> for ShowMetadata {
    fn from(show: TvMazeShow) -> Self {
        Self {
            indexer_id: show.id as i64,
            tvdb_id: show.tvdb_id().map(i64::from),
            is_anime: show.is_anime(),
            name: show.name,
        }
    }
}

impl TvMazeEpisode {
    /// Parse air date to NaiveDate
    pub fn air_date(&self) -> Option<NaiveDate> {
        self.airdate
            .as_ref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    }
}

/// Convert TVMaze episodes, numbering unnumbered specials after the numbered ones
fn to_episode_metadata(episodes: Vec<TvMazeEpisode>) -> Vec<EpisodeMetadata> {
    let mut next_special = episodes
        .iter()
        .filter(|e| e.season == 0)
        .filter_map(|e| e.number)
        .max()
        .unwrap_or(0);

    episodes
        .into_iter()
        .map(|e| {
            let number = match e.number {
                Some(n) => n,
                None => {
                    next_special += 1;
                    next_special
                }
            };
            let season = if e.number.is_none() { 0 } else { e.season as i32 };
            EpisodeMetadata {
                season,
                episode: number as i32,
                airdate: e.air_date(),
                name: e.name,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_show_conversion() {
        let show: TvMazeShow = serde_json::from_str(
            r#"{"id": 82, "name": "Game of Thrones", "type": "Scripted", "language": "English",
                "genres": ["Drama"], "status": "Ended",
                "externals": {"tvrage": 24493, "thetvdb": 121361, "imdb": "tt0944947"}}"#,
        )
        .unwrap();

        let meta = ShowMetadata::from(show);
        assert_eq!(meta.indexer_id, 82);
        assert_eq!(meta.tvdb_id, Some(121361));
        assert!(!meta.is_anime);
    }

    #[test]
    fn test_unnumbered_specials_move_to_season_zero() {
        let episodes: Vec<TvMazeEpisode> = serde_json::from_str(
            r#"[
                {"id": 1, "name": "Pilot", "season": 1, "number": 1, "airdate": "2011-04-17"},
                {"id": 2, "name": "Special", "season": 1, "number": null, "airdate": ""},
                {"id": 3, "name": "Bonus", "season": 0, "number": 3, "airdate": "2012-01-01"}
            ]"#,
        )
        .unwrap();

        let meta = to_episode_metadata(episodes);
        assert_eq!(meta[0].season, 1);
        assert_eq!(meta[0].airdate, NaiveDate::from_ymd_opt(2011, 4, 17));
        assert_eq!((meta[1].season, meta[1].episode), (0, 4));
        assert_eq!(meta[1].airdate, None);
        assert_eq!((meta[2].season, meta[2].episode), (0, 3));
    }
}
