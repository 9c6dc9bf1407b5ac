//! Blackhole client: drops NZB and torrent files into watch directories

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use super::DownloadClient;
use crate::search::{ResultType, SearchResult};

pub struct BlackholeClient {
    nzb_dir: PathBuf,
    torrent_dir: PathBuf,
}

impl BlackholeClient {
    pub fn new(nzb_dir: PathBuf, torrent_dir: PathBuf) -> Self {
        Self {
            nzb_dir,
            torrent_dir,
        }
    }

    /// Where a result is written and what goes into the file
    fn target(&self, result: &SearchResult) -> Option<(PathBuf, Vec<u8>)> {
        let base = sanitize_filename::sanitize(&result.name);

        match result.result_type {
            ResultType::Nzb | ResultType::NzbData => {
                let content = result.content.clone()?;
                Some((self.nzb_dir.join(format!("{}.nzb", base)), content))
            }
            ResultType::Torrent if result.is_magnet() => Some((
                self.torrent_dir.join(format!("{}.magnet", base)),
                result.url.clone().into_bytes(),
            )),
            ResultType::Torrent => {
                let content = result.content.clone()?;
                Some((self.torrent_dir.join(format!("{}.torrent", base)), content))
            }
        }
    }
}

async fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[async_trait]
impl DownloadClient for BlackholeClient {
    fn name(&self) -> &str {
        "blackhole"
    }

    fn needs_content(&self, result: &SearchResult) -> bool {
        match result.result_type {
            ResultType::NzbData => false,
            ResultType::Torrent => !result.is_magnet(),
            ResultType::Nzb => true,
        }
    }

    async fn send(&self, result: &SearchResult) -> Result<bool> {
        let Some((path, content)) = self.target(result) else {
            warn!(release = %result.name, "No file content to write to the blackhole");
            return Ok(false);
        };

        write_file(&path, &content).await?;
        info!(release = %result.name, path = %path.display(), "Saved result to blackhole");
        Ok(true)
    }
}
