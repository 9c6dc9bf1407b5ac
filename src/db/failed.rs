//! Failed download bookkeeping
//!
//! Snatches are remembered together with the status the episode had before
//! the snatch, so a download that later fails can be reverted and the release
//! excluded from future searches.

use std::collections::HashSet;

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;

use super::episodes::EpisodeRecord;
use super::sqlite_helpers::now_iso8601;
use crate::common::{CompositeStatus, EpisodeKey, EpisodeStatus};

/// Snatch remembered for failed-download handling
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FailedSnatch {
    pub id: i64,
    pub date: String,
    pub release: String,
    pub size: Option<i64>,
    pub provider: String,
    pub show_id: i64,
    pub season: i32,
    pub episode: i32,
    pub old_status: i64,
}

pub struct FailedRepository {
    pool: SqlitePool,
}

impl FailedRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Remember a snatch together with the episode's current status
    pub async fn log_snatch(
        &self,
        episode: &EpisodeRecord,
        release: &str,
        size: Option<i64>,
        provider: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO failed_snatches (date, release, size, provider, show_id, season, episode, old_status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(now_iso8601())
        .bind(release)
        .bind(size)
        .bind(provider)
        .bind(episode.show_id)
        .bind(episode.season)
        .bind(episode.episode)
        .bind(episode.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Latest snatch recorded for an episode. Older duplicates are discarded.
    pub async fn find_release(&self, show_id: i64, key: EpisodeKey) -> Result<Option<FailedSnatch>> {
        let snatches = sqlx::query_as::<_, FailedSnatch>(
            r#"
            SELECT id, date, release, size, provider, show_id, season, episode, old_status
            FROM failed_snatches
            WHERE show_id = ?1 AND season = ?2 AND episode = ?3
            ORDER BY id DESC
            "#,
        )
        .bind(show_id)
        .bind(key.season)
        .bind(key.episode)
        .fetch_all(&self.pool)
        .await?;

        let mut iter = snatches.into_iter();
        let latest = iter.next();

        if let Some(latest) = &latest {
            sqlx::query(
                "DELETE FROM failed_snatches WHERE show_id = ?1 AND season = ?2 AND episode = ?3 AND id <> ?4",
            )
            .bind(show_id)
            .bind(key.season)
            .bind(key.episode)
            .bind(latest.id)
            .execute(&self.pool)
            .await?;
        }

        Ok(latest)
    }

    /// Add a release to the failed list
    pub async fn log_failed(&self, release: &str, size: Option<i64>, provider: &str) -> Result<()> {
        sqlx::query("INSERT INTO failed_releases (release, size, provider) VALUES (?1, ?2, ?3)")
            .bind(release)
            .bind(size)
            .bind(provider)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Whether a release name is on the failed list
    pub async fn has_failed(&self, release: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM failed_releases WHERE lower(release) = lower(?1)")
                .bind(release)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    /// Every failed release name, lowercased
    pub async fn failed_release_names(&self) -> Result<HashSet<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT release FROM failed_releases")
            .fetch_all(&self.pool)
            .await?;
        Ok(names.into_iter().map(|n| n.to_lowercase()).collect())
    }

    /// Flag an episode as failed, keeping the quality it was snatched in
    pub async fn mark_failed(&self, episode: &EpisodeRecord) -> Result<CompositeStatus> {
        let status = CompositeStatus::new(EpisodeStatus::Failed, episode.composite().quality);
        self.set_episode_status(episode.id, status).await?;
        Ok(status)
    }

    /// Restore the status the episode had before its last snatch, or `Wanted`
    /// when no snatch was remembered
    pub async fn revert_episode(&self, episode: &EpisodeRecord) -> Result<CompositeStatus> {
        let old_status: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT old_status FROM failed_snatches
            WHERE show_id = ?1 AND season = ?2 AND episode = ?3
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(episode.show_id)
        .bind(episode.season)
        .bind(episode.episode)
        .fetch_optional(&self.pool)
        .await?;

        let status = match old_status {
            Some(code) => CompositeStatus::decode(code),
            None => CompositeStatus::plain(EpisodeStatus::Wanted),
        };
        self.set_episode_status(episode.id, status).await?;
        Ok(status)
    }

    async fn set_episode_status(&self, id: i64, status: CompositeStatus) -> Result<()> {
        sqlx::query("UPDATE tv_episodes SET status = ?2 WHERE id = ?1")
            .bind(id)
            .bind(status.encode())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
