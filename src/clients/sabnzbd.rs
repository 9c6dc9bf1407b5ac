//! SABnzbd client
//!
//! NZB links are passed with `mode=addurl`; NZBs held in memory (split season
//! packs) are uploaded with `mode=addfile`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, error, info};

use super::DownloadClient;
use crate::config::SabnzbdSettings;
use crate::search::{ResultType, SearchResult};

pub struct SabnzbdClient {
    client: Client,
    settings: SabnzbdSettings,
}

#[derive(Debug, Deserialize)]
struct SabResponse {
    #[serde(default)]
    status: bool,
    error: Option<String>,
}

impl SabnzbdClient {
    pub fn new(settings: SabnzbdSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    fn api_url(&self) -> String {
        let host = self.settings.host.trim_end_matches('/');
        if host.ends_with("/api") {
            host.to_string()
        } else {
            format!("{}/api", host)
        }
    }

    /// Query parameters shared by both upload modes
    fn base_params(&self, result: &SearchResult) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("output", "json".to_string()),
            ("apikey", self.settings.api_key.clone()),
            ("cat", self.settings.category.clone()),
        ];

        if result.priority > 0 {
            let priority = if self.settings.forced { 2 } else { 1 };
            params.push(("priority", priority.to_string()));
        }

        params
    }
}

#[async_trait]
impl DownloadClient for SabnzbdClient {
    fn name(&self) -> &str {
        "sabnzbd"
    }

    fn needs_content(&self, _result: &SearchResult) -> bool {
        false
    }

    async fn send(&self, result: &SearchResult) -> Result<bool> {
        let mut params = self.base_params(result);
        let url = self.api_url();

        let request = match result.result_type {
            ResultType::Nzb => {
                params.push(("mode", "addurl".to_string()));
                params.push(("name", result.url.clone()));
                self.client.get(&url).query(&params)
            }
            ResultType::NzbData => {
                let Some(content) = result.content.clone() else {
                    error!(release = %result.name, "NZB data result has no content");
                    return Ok(false);
                };
                params.push(("mode", "addfile".to_string()));
                let part = Part::bytes(content)
                    .file_name(format!("{}.nzb", result.name))
                    .mime_str("application/x-nzb")?;
                self.client
                    .post(&url)
                    .query(&params)
                    .multipart(Form::new().part("nzbfile", part))
            }
            ResultType::Torrent => {
                error!(release = %result.name, "SABnzbd cannot download torrents");
                return Ok(false);
            }
        };

        debug!(release = %result.name, "Sending NZB to SABnzbd");
        let response = request.send().await.context("Failed to reach SABnzbd")?;

        if !response.status().is_success() {
            error!(status = %response.status(), "SABnzbd rejected the request");
            return Ok(false);
        }

        let body: SabResponse = response
            .json()
            .await
            .context("Failed to parse SABnzbd response")?;

        if body.status {
            info!(release = %result.name, "NZB sent to SABnzbd");
            Ok(true)
        } else {
            error!(
                release = %result.name,
                error = body.error.as_deref().unwrap_or("unknown"),
                "SABnzbd refused the NZB"
            );
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::ProviderType;

    fn client(forced: bool) -> SabnzbdClient {
        SabnzbdClient::new(SabnzbdSettings {
            host: "http://localhost:8080/".into(),
            api_key: "key".into(),
            category: "tv".into(),
            forced,
        })
    }

    #[test]
    fn test_api_url() {
        assert_eq!(client(false).api_url(), "http://localhost:8080/api");
    }

    #[test]
    fn test_priority_param() {
        let mut result = SearchResult::new("p", ProviderType::Nzb, "n", "u", 1);
        let params = client(true).base_params(&result);
        assert!(!params.iter().any(|(k, _)| *k == "priority"));

        result.priority = 1;
        let params = client(true).base_params(&result);
        assert!(params.contains(&("priority", "2".to_string())));
        let params = client(false).base_params(&result);
        assert!(params.contains(&("priority", "1".to_string())));
    }

    #[test]
    fn test_response_parsing() {
        let ok: SabResponse = serde_json::from_str(r#"{"status": true, "nzo_ids": ["SABnzbd_nzo_1"]}"#).unwrap();
        assert!(ok.status);
        let bad: SabResponse = serde_json::from_str(r#"{"status": false, "error": "API Key Incorrect"}"#).unwrap();
        assert_eq!(bad.error.as_deref(), Some("API Key Incorrect"));
    }
}
