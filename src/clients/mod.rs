//! Download clients
//!
//! A snatched result is handed to exactly one client: NZB results to the
//! configured NZB method, torrent results to the torrent method.

pub mod blackhole;
pub mod qbittorrent;
pub mod sabnzbd;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::{ClientSettings, NzbMethod, TorrentMethod};
use crate::search::{ResultType, SearchResult};
pub use blackhole::BlackholeClient;
pub use qbittorrent::QbittorrentClient;
pub use sabnzbd::SabnzbdClient;

/// Something that accepts releases for download
#[async_trait]
pub trait DownloadClient: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the NZB/torrent file has to be fetched before [`send`](Self::send)
    fn needs_content(&self, result: &SearchResult) -> bool;

    /// Hand the result over. `Ok(false)` means the client refused it.
    async fn send(&self, result: &SearchResult) -> Result<bool>;
}

/// The NZB and torrent clients in use
#[derive(Clone)]
pub struct DownloadClients {
    pub nzb: Arc<dyn DownloadClient>,
    pub torrent: Arc<dyn DownloadClient>,
}

impl DownloadClients {
    pub fn new(nzb: Arc<dyn DownloadClient>, torrent: Arc<dyn DownloadClient>) -> Self {
        Self { nzb, torrent }
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        let nzb: Arc<dyn DownloadClient> = match settings.nzb_method {
            NzbMethod::Blackhole => Arc::new(BlackholeClient::new(
                settings.nzb_dir.clone(),
                settings.torrent_dir.clone(),
            )),
            NzbMethod::Sabnzbd => {
                let sab = settings
                    .sabnzbd
                    .as_ref()
                    .context("nzb_method is sabnzbd but no sabnzbd section is configured")?;
                Arc::new(SabnzbdClient::new(sab.clone()))
            }
        };

        let torrent: Arc<dyn DownloadClient> = match settings.torrent_method {
            TorrentMethod::Blackhole => Arc::new(BlackholeClient::new(
                settings.nzb_dir.clone(),
                settings.torrent_dir.clone(),
            )),
            TorrentMethod::Qbittorrent => {
                let qb = settings
                    .qbittorrent
                    .as_ref()
                    .context("torrent_method is qbittorrent but no qbittorrent section is configured")?;
                Arc::new(QbittorrentClient::new(qb.clone())?)
            }
        };

        Ok(Self { nzb, torrent })
    }

    /// The client responsible for a result
    pub fn for_result(&self, result: &SearchResult) -> &Arc<dyn DownloadClient> {
        match result.result_type {
            ResultType::Nzb | ResultType::NzbData => &self.nzb,
            ResultType::Torrent => &self.torrent,
        }
    }
}
