//! Fakes shared by the integration tests
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;

use medusa::clients::{DownloadClient, DownloadClients};
use medusa::common::{CompositeStatus, EpisodeStatus, Quality, QualityProfile};
use medusa::config::SearchSettings;
use medusa::db::{CreateTvShow, Database, EpisodeRecord, TvShowRecord, UpsertEpisode};
use medusa::indexer::{
    ProviderError, ProviderQuery, ProviderRegistry, ProviderSettings, ProviderType, ReleaseInfo,
    SearchProvider,
};
use medusa::search::{SearchContext, SearchResult};
use medusa::services::{NotificationService, Notifier};

/// Provider answering every query from a fixed list of release names
pub struct FakeProvider {
    pub name: String,
    pub settings: ProviderSettings,
    pub provider_type: ProviderType,
    pub releases: Vec<String>,
    pub queries: Arc<Mutex<Vec<ProviderQuery>>>,
    /// Body returned for every download
    pub nzb: Vec<u8>,
}

impl FakeProvider {
    pub fn new(name: &str, releases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            settings: ProviderSettings::default(),
            provider_type: ProviderType::Nzb,
            releases: releases.iter().map(|r| r.to_string()).collect(),
            queries: Arc::new(Mutex::new(Vec::new())),
            nzb: b"<nzb/>".to_vec(),
        }
    }

    pub fn with_type(mut self, provider_type: ProviderType) -> Self {
        self.provider_type = provider_type;
        self
    }

    pub fn with_nzb(mut self, nzb: &str) -> Self {
        self.nzb = nzb.as_bytes().to_vec();
        self
    }

    pub fn with_settings(mut self, settings: ProviderSettings) -> Self {
        self.settings = settings;
        self
    }

    fn release(&self, title: &str) -> ReleaseInfo {
        ReleaseInfo::new(title, &self.name).with_link(format!("http://{}/get/{}.nzb", self.name, title))
    }
}

#[async_trait]
impl SearchProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    async fn search(&self, query: &ProviderQuery) -> Result<Vec<ReleaseInfo>, ProviderError> {
        self.queries.lock().push(query.clone());

        let token = match (query.season, query.episode) {
            (Some(s), Some(e)) => format!("S{:02}E{:02}", s, e),
            (Some(s), None) => format!("S{:02}.", s),
            _ => String::new(),
        };

        Ok(self
            .releases
            .iter()
            .filter(|title| title.to_uppercase().contains(&token.to_uppercase()))
            .map(|title| self.release(title))
            .collect())
    }

    async fn recent(&self) -> Result<Vec<ReleaseInfo>, ProviderError> {
        Ok(self.releases.iter().map(|title| self.release(title)).collect())
    }

    async fn download(&self, _url: &str) -> Result<Vec<u8>, ProviderError> {
        Ok(self.nzb.clone())
    }
}

/// Queries a provider saw, as (season, episode) pairs
pub fn searched(queries: &Mutex<Vec<ProviderQuery>>) -> Vec<(Option<i32>, Option<i32>)> {
    queries.lock().iter().map(|q| (q.season, q.episode)).collect()
}

/// Download client that accepts everything and remembers it
#[derive(Default)]
pub struct RecordingClient {
    pub sent: Mutex<Vec<SearchResult>>,
}

impl RecordingClient {
    pub fn names(&self) -> Vec<String> {
        self.sent.lock().iter().map(|r| r.name.clone()).collect()
    }
}

#[async_trait]
impl DownloadClient for RecordingClient {
    fn name(&self) -> &str {
        "recording"
    }

    fn needs_content(&self, _result: &SearchResult) -> bool {
        false
    }

    async fn send(&self, result: &SearchResult) -> Result<bool> {
        self.sent.lock().push(result.clone());
        Ok(true)
    }
}

/// Notifier remembering every snatched episode name
#[derive(Default)]
pub struct RecordingNotifier {
    pub snatched: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify_snatch(&self, ep_name: &str) -> Result<()> {
        self.snatched.lock().push(ep_name.to_string());
        Ok(())
    }
}

pub struct Harness {
    pub ctx: Arc<SearchContext>,
    pub client: Arc<RecordingClient>,
    pub notifier: Arc<RecordingNotifier>,
}

pub async fn harness(providers: Vec<FakeProvider>, settings: SearchSettings) -> Harness {
    let db = Database::in_memory().await.unwrap();
    let mut registry = ProviderRegistry::new(false);
    for provider in providers {
        registry.register(Arc::new(provider));
    }

    let client = Arc::new(RecordingClient::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let ctx = SearchContext {
        db,
        providers: registry,
        clients: DownloadClients::new(client.clone(), client.clone()),
        notifications: Arc::new(NotificationService::new().with_notifier(notifier.clone())),
        settings,
    };

    Harness {
        ctx: Arc::new(ctx),
        client,
        notifier,
    }
}

/// SD and 720p HDTV allowed, nothing preferred
pub fn tv_profile() -> QualityProfile {
    QualityProfile::new(vec![Quality::SDTV, Quality::HDTV], vec![])
}

pub async fn add_show(db: &Database, name: &str, quality: QualityProfile) -> TvShowRecord {
    db.tv_shows()
        .create(CreateTvShow {
            indexer_id: 100,
            name: name.to_string(),
            quality,
            default_ep_status: Some(EpisodeStatus::Wanted),
            ..Default::default()
        })
        .await
        .unwrap()
}

pub async fn add_episode(
    db: &Database,
    show: &TvShowRecord,
    season: i32,
    episode: i32,
    airdate: NaiveDate,
    status: CompositeStatus,
) -> EpisodeRecord {
    db.episodes()
        .upsert(&UpsertEpisode {
            show_id: show.id,
            season,
            episode,
            name: None,
            airdate: Some(airdate),
            initial_status: status.encode(),
        })
        .await
        .unwrap();
    episode_record(db, show, season, episode).await
}

pub async fn episode_record(db: &Database, show: &TvShowRecord, season: i32, episode: i32) -> EpisodeRecord {
    db.episodes()
        .get(show.id, medusa::common::EpisodeKey::new(season, episode))
        .await
        .unwrap()
        .unwrap()
}

pub fn aired() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

pub fn wanted() -> CompositeStatus {
    CompositeStatus::plain(EpisodeStatus::Wanted)
}
