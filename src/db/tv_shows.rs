//! TV show database repository

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::sqlite_helpers::{json_to_vec, vec_to_json, vec_to_words, words_to_vec};
use crate::common::{EpisodeStatus, QualityProfile};

/// A tracked show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TvShowRecord {
    pub id: i64,
    /// ID at the metadata indexer (TVMaze)
    pub indexer_id: i64,
    pub tvdb_id: Option<i64>,
    pub name: String,
    /// Alternative (scene) names releases may use
    pub aliases: Vec<String>,
    pub quality: QualityProfile,
    pub paused: bool,
    pub is_anime: bool,
    /// Status given to newly discovered, already aired episodes
    pub default_ep_status: EpisodeStatus,
    pub ignore_words: Vec<String>,
    pub require_words: Vec<String>,
    /// Release groups to accept (empty accepts all)
    pub whitelist: Vec<String>,
    /// Release groups to reject
    pub blacklist: Vec<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct TvShowRow {
    id: i64,
    indexer_id: i64,
    tvdb_id: Option<i64>,
    name: String,
    aliases: String,
    quality: i64,
    paused: bool,
    is_anime: bool,
    default_ep_status: i64,
    rls_ignore_words: String,
    rls_require_words: String,
    release_whitelist: String,
    release_blacklist: String,
}

impl From<TvShowRow> for TvShowRecord {
    fn from(row: TvShowRow) -> Self {
        Self {
            id: row.id,
            indexer_id: row.indexer_id,
            tvdb_id: row.tvdb_id,
            name: row.name,
            aliases: json_to_vec(&row.aliases),
            quality: QualityProfile::split(row.quality as u32),
            paused: row.paused,
            is_anime: row.is_anime,
            default_ep_status: EpisodeStatus::from_code(row.default_ep_status),
            ignore_words: words_to_vec(&row.rls_ignore_words),
            require_words: words_to_vec(&row.rls_require_words),
            whitelist: json_to_vec(&row.release_whitelist),
            blacklist: json_to_vec(&row.release_blacklist),
        }
    }
}

/// Input for creating a show
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTvShow {
    pub indexer_id: i64,
    pub tvdb_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub quality: QualityProfile,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub is_anime: bool,
    pub default_ep_status: Option<EpisodeStatus>,
    #[serde(default)]
    pub ignore_words: Vec<String>,
    #[serde(default)]
    pub require_words: Vec<String>,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, indexer_id, tvdb_id, name, aliases, quality, paused, is_anime,
           default_ep_status, rls_ignore_words, rls_require_words,
           release_whitelist, release_blacklist
    FROM tv_shows
"#;

pub struct TvShowRepository {
    pool: SqlitePool,
}

impl TvShowRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a show by ID
    pub async fn get(&self, id: i64) -> Result<Option<TvShowRecord>> {
        let row = sqlx::query_as::<_, TvShowRow>(&format!("{} WHERE id = ?1", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    /// Get a show by its metadata indexer ID
    pub async fn get_by_indexer_id(&self, indexer_id: i64) -> Result<Option<TvShowRecord>> {
        let row = sqlx::query_as::<_, TvShowRow>(&format!(
            "{} WHERE indexer_id = ?1",
            SELECT_COLUMNS
        ))
        .bind(indexer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// List every show, ordered by name
    pub async fn list(&self) -> Result<Vec<TvShowRecord>> {
        let rows = sqlx::query_as::<_, TvShowRow>(&format!("{} ORDER BY name", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// List shows that are not paused
    pub async fn list_active(&self) -> Result<Vec<TvShowRecord>> {
        let rows = sqlx::query_as::<_, TvShowRow>(&format!(
            "{} WHERE paused = 0 ORDER BY name",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Create a new show
    pub async fn create(&self, input: CreateTvShow) -> Result<TvShowRecord> {
        let default_status = input.default_ep_status.unwrap_or(EpisodeStatus::Skipped);

        let id = sqlx::query(
            r#"
            INSERT INTO tv_shows (
                indexer_id, tvdb_id, name, aliases, quality, paused, is_anime,
                default_ep_status, rls_ignore_words, rls_require_words,
                release_whitelist, release_blacklist
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(input.indexer_id)
        .bind(input.tvdb_id)
        .bind(&input.name)
        .bind(vec_to_json(&input.aliases))
        .bind(input.quality.combine() as i64)
        .bind(input.paused)
        .bind(input.is_anime)
        .bind(default_status.code())
        .bind(vec_to_words(&input.ignore_words))
        .bind(vec_to_words(&input.require_words))
        .bind(vec_to_json(&input.whitelist))
        .bind(vec_to_json(&input.blacklist))
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(TvShowRecord {
            id,
            indexer_id: input.indexer_id,
            tvdb_id: input.tvdb_id,
            name: input.name,
            aliases: input.aliases,
            quality: input.quality,
            paused: input.paused,
            is_anime: input.is_anime,
            default_ep_status: default_status,
            ignore_words: input.ignore_words,
            require_words: input.require_words,
            whitelist: input.whitelist,
            blacklist: input.blacklist,
        })
    }

    /// Update the show name and aliases after a metadata refresh
    pub async fn update_names(&self, id: i64, name: &str, aliases: &[String]) -> Result<()> {
        sqlx::query("UPDATE tv_shows SET name = ?2, aliases = ?3 WHERE id = ?1")
            .bind(id)
            .bind(name)
            .bind(vec_to_json(aliases))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Pause or resume a show
    pub async fn set_paused(&self, id: i64, paused: bool) -> Result<()> {
        sqlx::query("UPDATE tv_shows SET paused = ?2 WHERE id = ?1")
            .bind(id)
            .bind(paused)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a show; its episodes are removed by the foreign key cascade
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tv_shows WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
