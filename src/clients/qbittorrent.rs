//! qBittorrent WebUI client

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use tracing::{debug, error, info};

use super::DownloadClient;
use crate::config::QbittorrentSettings;
use crate::search::{ResultType, SearchResult};

pub struct QbittorrentClient {
    client: Client,
    settings: QbittorrentSettings,
}

impl QbittorrentClient {
    pub fn new(settings: QbittorrentSettings) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, settings })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v2{}", self.settings.host.trim_end_matches('/'), path)
    }

    /// Log in; the session cookie is kept by the client's cookie store
    async fn login(&self) -> Result<()> {
        if self.settings.username.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(self.url("/auth/login"))
            .form(&[
                ("username", self.settings.username.as_str()),
                ("password", self.settings.password.as_str()),
            ])
            .send()
            .await
            .context("Failed to reach qBittorrent")?;

        if !response.status().is_success() {
            bail!("qBittorrent login failed: {}", response.status());
        }

        let text = response.text().await?;
        if text.trim() != "Ok." {
            bail!("qBittorrent login failed: {}", text);
        }

        debug!("Logged in to qBittorrent");
        Ok(())
    }

    fn add_form(&self, result: &SearchResult) -> Result<Form> {
        let mut form = Form::new()
            .text("category", self.settings.label.clone())
            .text("paused", self.settings.paused.to_string());

        if result.is_magnet() {
            form = form.text("urls", result.url.clone());
        } else {
            let content = result
                .content
                .clone()
                .context("Torrent file content is empty")?;
            let part = Part::bytes(content)
                .file_name(format!("{}.torrent", result.name))
                .mime_str("application/x-bittorrent")?;
            form = form.part("torrents", part);
        }

        Ok(form)
    }
}

#[async_trait]
impl DownloadClient for QbittorrentClient {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    fn needs_content(&self, result: &SearchResult) -> bool {
        !result.is_magnet()
    }

    async fn send(&self, result: &SearchResult) -> Result<bool> {
        if result.result_type != ResultType::Torrent {
            error!(release = %result.name, "qBittorrent only accepts torrents");
            return Ok(false);
        }

        self.login().await?;

        let response = self
            .client
            .post(self.url("/torrents/add"))
            .multipart(self.add_form(result)?)
            .send()
            .await
            .context("Failed to reach qBittorrent")?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() || text.trim() == "Fails." {
            error!(release = %result.name, status = %status, body = %text, "qBittorrent refused the torrent");
            return Ok(false);
        }

        info!(release = %result.name, "Torrent sent to qBittorrent");
        Ok(true)
    }
}
