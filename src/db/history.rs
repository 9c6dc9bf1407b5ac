//! Snatch history repository
//!
//! Every snatch and every failed download leaves one row per episode. The
//! `action` column holds the composite status the episode was moved to.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;

use super::sqlite_helpers::now_iso8601;
use crate::common::{CompositeStatus, EpisodeKey, EpisodeStatus, Quality};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct HistoryRecord {
    pub id: i64,
    pub action: i64,
    pub date: String,
    pub show_id: i64,
    pub season: i32,
    pub episode: i32,
    pub quality: i64,
    pub resource: String,
    pub provider: String,
    pub version: i32,
}

impl HistoryRecord {
    pub fn action(&self) -> CompositeStatus {
        CompositeStatus::decode(self.action)
    }
}

/// A history row about to be written
#[derive(Debug, Clone)]
pub struct NewHistory<'a> {
    pub action: CompositeStatus,
    pub show_id: i64,
    pub key: EpisodeKey,
    pub quality: Quality,
    pub resource: &'a str,
    pub provider: &'a str,
    pub version: i32,
}

pub struct HistoryRepository {
    pool: SqlitePool,
}

impl HistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn log(&self, entry: NewHistory<'_>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO history (action, date, show_id, season, episode, quality, resource, provider, version)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(entry.action.encode())
        .bind(now_iso8601())
        .bind(entry.show_id)
        .bind(entry.key.season)
        .bind(entry.key.episode)
        .bind(entry.quality.bits() as i64)
        .bind(entry.resource)
        .bind(entry.provider)
        .bind(entry.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record that a release for an episode failed to download
    pub async fn log_failed(
        &self,
        show_id: i64,
        key: EpisodeKey,
        release: &str,
        provider: &str,
    ) -> Result<()> {
        self.log(NewHistory {
            action: CompositeStatus::new(EpisodeStatus::Failed, Quality::NONE),
            show_id,
            key,
            quality: Quality::NONE,
            resource: release,
            provider,
            version: -1,
        })
        .await
    }

    /// History of one episode, newest first
    pub async fn list_for_episode(&self, show_id: i64, key: EpisodeKey) -> Result<Vec<HistoryRecord>> {
        let records = sqlx::query_as::<_, HistoryRecord>(
            r#"
            SELECT id, action, date, show_id, season, episode, quality, resource, provider, version
            FROM history
            WHERE show_id = ?1 AND season = ?2 AND episode = ?3
            ORDER BY id DESC
            "#,
        )
        .bind(show_id)
        .bind(key.season)
        .bind(key.episode)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
