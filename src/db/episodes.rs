//! Episode database repository

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::common::{CompositeStatus, EpisodeKey};

/// Episode record from database
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct EpisodeRecord {
    pub id: i64,
    pub show_id: i64,
    pub season: i32,
    pub episode: i32,
    pub name: Option<String>,
    pub airdate: Option<NaiveDate>,
    /// Composite status code, see [`CompositeStatus`]
    pub status: i64,
    pub release_name: Option<String>,
}

impl EpisodeRecord {
    pub fn key(&self) -> EpisodeKey {
        EpisodeKey::new(self.season, self.episode)
    }

    pub fn composite(&self) -> CompositeStatus {
        CompositeStatus::decode(self.status)
    }

    /// `Show Name - S01E02 - Title` used in logs and notifications
    pub fn pretty_name(&self, show_name: &str) -> String {
        match &self.name {
            Some(title) if !title.is_empty() => {
                format!("{} - {} - {}", show_name, self.key(), title)
            }
            _ => format!("{} - {}", show_name, self.key()),
        }
    }

    pub fn has_aired(&self, today: NaiveDate) -> bool {
        self.airdate.is_some_and(|d| d <= today)
    }
}

/// Episode metadata coming from the indexer
#[derive(Debug, Clone)]
pub struct UpsertEpisode {
    pub show_id: i64,
    pub season: i32,
    pub episode: i32,
    pub name: Option<String>,
    pub airdate: Option<NaiveDate>,
    /// Composite status used only when the episode is new
    pub initial_status: i64,
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, show_id, season, episode, name, airdate, status, release_name
    FROM tv_episodes
"#;

pub struct EpisodeRepository {
    pool: SqlitePool,
}

impl EpisodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get all episodes for a TV show
    pub async fn list_by_show(&self, show_id: i64) -> Result<Vec<EpisodeRecord>> {
        let records = sqlx::query_as::<_, EpisodeRecord>(&format!(
            "{} WHERE show_id = ?1 ORDER BY season, episode",
            SELECT_COLUMNS
        ))
        .bind(show_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Get a single episode by season and episode number
    pub async fn get(&self, show_id: i64, key: EpisodeKey) -> Result<Option<EpisodeRecord>> {
        let record = sqlx::query_as::<_, EpisodeRecord>(&format!(
            "{} WHERE show_id = ?1 AND season = ?2 AND episode = ?3",
            SELECT_COLUMNS
        ))
        .bind(show_id)
        .bind(key.season)
        .bind(key.episode)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Episodes of every show that are still `Unaired` but aired on or before `date`
    pub async fn list_unaired_before(&self, date: NaiveDate) -> Result<Vec<EpisodeRecord>> {
        let records = sqlx::query_as::<_, EpisodeRecord>(&format!(
            "{} WHERE status = ?1 AND airdate IS NOT NULL AND airdate <= ?2 ORDER BY show_id, season, episode",
            SELECT_COLUMNS
        ))
        .bind(crate::common::EpisodeStatus::Unaired.code())
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Regular-season episodes of a show that aired strictly after `after`
    pub async fn list_aired_after(&self, show_id: i64, after: NaiveDate) -> Result<Vec<EpisodeRecord>> {
        let records = sqlx::query_as::<_, EpisodeRecord>(&format!(
            "{} WHERE show_id = ?1 AND season > 0 AND airdate IS NOT NULL AND airdate > ?2 ORDER BY season, episode",
            SELECT_COLUMNS
        ))
        .bind(show_id)
        .bind(after)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Episodes of every show that aired on or after `from`
    pub async fn list_aired_since_all(&self, from: NaiveDate) -> Result<Vec<EpisodeRecord>> {
        let records = sqlx::query_as::<_, EpisodeRecord>(&format!(
            "{} WHERE airdate IS NOT NULL AND airdate >= ?1 ORDER BY show_id, season, episode",
            SELECT_COLUMNS
        ))
        .bind(from)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Insert a new episode or refresh the metadata of an existing one.
    ///
    /// The status of an existing episode is never touched. Returns true when
    /// the episode was newly created.
    pub async fn upsert(&self, input: &UpsertEpisode) -> Result<bool> {
        let existing = self
            .get(input.show_id, EpisodeKey::new(input.season, input.episode))
            .await?;

        if let Some(existing) = existing {
            sqlx::query("UPDATE tv_episodes SET name = ?2, airdate = ?3 WHERE id = ?1")
                .bind(existing.id)
                .bind(&input.name)
                .bind(input.airdate)
                .execute(&self.pool)
                .await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO tv_episodes (show_id, season, episode, name, airdate, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(input.show_id)
        .bind(input.season)
        .bind(input.episode)
        .bind(&input.name)
        .bind(input.airdate)
        .bind(input.initial_status)
        .execute(&self.pool)
        .await?;

        Ok(true)
    }

    /// Set the composite status of an episode
    pub async fn update_status(&self, id: i64, status: CompositeStatus) -> Result<()> {
        sqlx::query("UPDATE tv_episodes SET status = ?2 WHERE id = ?1")
            .bind(id)
            .bind(status.encode())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a snatch: new status plus the release that was sent to the client
    pub async fn mark_snatched(
        &self,
        id: i64,
        status: CompositeStatus,
        release_name: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE tv_episodes SET status = ?2, release_name = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status.encode())
            .bind(release_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete every episode of a show
    pub async fn delete_by_show(&self, show_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tv_episodes WHERE show_id = ?1")
            .bind(show_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
