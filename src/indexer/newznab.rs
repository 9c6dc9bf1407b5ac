//! Newznab/Torznab provider
//!
//! Newznab is the standard API for usenet indexers (NZBGeek, DrunkenSlug,
//! etc.). Torznab is the same API served by torrent aggregators such as
//! Jackett, with magnet and seeder attributes added.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use reqwest::Client;
use tracing::{debug, info, warn};

use super::{
    ProviderError, ProviderQuery, ProviderSettings, ProviderType, ReleaseInfo, SearchProvider,
};
use crate::config::ProviderConfig;

/// Newznab-compatible provider
pub struct NewznabProvider {
    name: String,
    /// API base URL (e.g., "https://api.nzbgeek.info")
    api_url: String,
    api_key: Option<String>,
    provider_type: ProviderType,
    categories: Vec<u32>,
    settings: ProviderSettings,
    client: Client,
}

impl NewznabProvider {
    pub fn new(config: &ProviderConfig, provider_type: ProviderType) -> anyhow::Result<Self> {
        if config.url.trim().is_empty() {
            return Err(anyhow!("API URL is required for provider {}", config.name));
        }

        let client = Client::builder()
            .gzip(true)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        info!(
            provider = %config.name,
            api_url = %config.url,
            provider_type = %provider_type,
            "Created newznab provider"
        );

        Ok(Self {
            name: config.name.clone(),
            api_url: config.url.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            provider_type,
            categories: config.categories.clone(),
            settings: ProviderSettings {
                enabled: config.enabled,
                search_mode: config.search_mode,
                search_fallback: config.search_fallback,
                enable_daily: config.enable_daily,
                enable_backlog: config.enable_backlog,
                anime_only: config.anime_only,
            },
            client,
        })
    }

    /// Build the API URL with query parameters
    fn build_api_url(&self, params: &[(&str, String)]) -> String {
        let base = self.api_url.trim_end_matches('/');
        let mut url = if base.ends_with("/api") || self.provider_type == ProviderType::Torrent {
            format!("{}?", base)
        } else {
            format!("{}/api?", base)
        };

        let mut first = true;
        if let Some(key) = &self.api_key {
            url.push_str(&format!("apikey={}", urlencoding::encode(key)));
            first = false;
        }

        for (key, value) in params {
            if !first {
                url.push('&');
            }
            url.push_str(&format!("{}={}", key, urlencoding::encode(value)));
            first = false;
        }

        url
    }

    fn category_param(&self) -> String {
        self.categories
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    fn query_params(&self, query: &ProviderQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![("t", "tvsearch".to_string())];

        if !self.categories.is_empty() {
            params.push(("cat", self.category_param()));
        }

        match query.tvdb_id {
            Some(tvdb_id) if query.extra_terms.is_none() => {
                params.push(("tvdbid", tvdb_id.to_string()));
            }
            _ => params.push(("q", query.search_term())),
        }

        if let Some(air_date) = query.air_date {
            params.push(("season", air_date.format("%Y").to_string()));
            params.push(("ep", air_date.format("%m/%d").to_string()));
        } else {
            if let Some(season) = query.season {
                params.push(("season", season.to_string()));
            }
            if let Some(episode) = query.episode {
                params.push(("ep", episode.to_string()));
            }
        }

        params.push(("limit", "100".to_string()));
        params
    }

    async fn fetch_feed(&self, params: &[(&str, String)]) -> Result<Vec<ReleaseInfo>, ProviderError> {
        let url = self.build_api_url(params);

        debug!(provider = %self.name, "Querying newznab API");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ProviderError::Http(format!("HTTP {}", response.status())));
        }

        let body = response.text().await?;
        let releases = parse_feed(&body, &self.name)?;

        debug!(
            provider = %self.name,
            releases_found = releases.len(),
            "Newznab query complete"
        );

        Ok(releases)
    }
}

#[async_trait]
impl SearchProvider for NewznabProvider {
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
        let params = self.query_params(query);
        self.fetch_feed(&params).await
    }

    async fn recent(&self) -> Result<Vec<ReleaseInfo>, ProviderError> {
        let mut params = vec![("t", "tvsearch".to_string())];
        if !self.categories.is_empty() {
            params.push(("cat", self.category_param()));
        }
        params.push(("limit", "100".to_string()));
        self.fetch_feed(&params).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        // Links from our own search results usually carry the API key already
        let download_url = match &self.api_key {
            Some(key) if !url.contains("apikey=") && url.starts_with(&self.api_url) => {
                let sep = if url.contains('?') { '&' } else { '?' };
                format!("{}{}apikey={}", url, sep, urlencoding::encode(key))
            }
            _ => url.to_string(),
        };

        let response = self.client.get(&download_url).send().await?;

        if !response.status().is_success() {
            return Err(ProviderError::Http(format!(
                "download failed: HTTP {}",
                response.status()
            )));
        }

        let bytes = response.bytes().await?;

        if self.provider_type == ProviderType::Nzb {
            let start = String::from_utf8_lossy(&bytes[..bytes.len().min(100)]);
            if !start.contains("<?xml") && !start.contains("<nzb") {
                warn!(
                    provider = %self.name,
                    content_preview = %start,
                    "Downloaded content doesn't look like NZB"
                );
            }
        }

        debug!(provider = %self.name, size = bytes.len(), "Downloaded release file");

        Ok(bytes.to_vec())
    }
}

/// Parse a newznab/torznab RSS response.
///
/// `<error code=".." description=".."/>` responses become errors; codes
/// 100-199 are account problems and map to [`ProviderError::Auth`].
pub fn parse_feed(xml: &str, provider: &str) -> Result<Vec<ReleaseInfo>, ProviderError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut releases = Vec::new();
    let mut current_item: Option<ReleaseInfoBuilder> = None;
    let mut current_tag = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();

                if tag_name == "item" {
                    current_item = Some(ReleaseInfoBuilder::default());
                } else if tag_name == "error" {
                    return Err(api_error(e));
                } else if let Some(item) = current_item.as_mut() {
                    item.apply_element(&tag_name, e);
                }
                current_tag = tag_name;
            }
            Ok(Event::Empty(ref e)) => {
                // Self-closing tags like <newznab:attr ... /> and <enclosure ... />
                let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();

                if tag_name == "error" {
                    return Err(api_error(e));
                }
                if let Some(item) = current_item.as_mut() {
                    item.apply_element(&tag_name, e);
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(item) = current_item.as_mut() {
                    let text = e.unescape().unwrap_or_default().to_string();
                    if !text.is_empty() {
                        item.apply_text(&current_tag, text);
                    }
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(item) = current_item.as_mut() {
                    let text = String::from_utf8_lossy(e).to_string();
                    if !text.is_empty() {
                        item.apply_text(&current_tag, text);
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"item" {
                    if let Some(item) = current_item.take() {
                        if let Some(release) = item.build(provider) {
                            releases.push(release);
                        }
                    }
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ProviderError::Parse(format!("XML parse error: {}", e)));
            }
            _ => {}
        }
    }

    Ok(releases)
}

fn attributes(e: &BytesStart<'_>) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map(|v| v.to_string())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).to_string());
            (key, value)
        })
        .collect()
}

fn api_error(e: &BytesStart<'_>) -> ProviderError {
    let attrs = attributes(e);
    let find = |name: &str| {
        attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };

    let code: i32 = find("code").and_then(|c| c.parse().ok()).unwrap_or(0);
    let description = find("description").unwrap_or_else(|| "unknown API error".to_string());

    if (100..200).contains(&code) {
        ProviderError::Auth(description)
    } else {
        ProviderError::Other(anyhow!("API error {}: {}", code, description))
    }
}

/// Helper to build ReleaseInfo from parsed XML
#[derive(Default)]
struct ReleaseInfoBuilder {
    title: Option<String>,
    guid: Option<String>,
    link: Option<String>,
    magnet_uri: Option<String>,
    pub_date: Option<DateTime<Utc>>,
    size: Option<i64>,
    categories: Vec<i32>,
    seeders: Option<i32>,
    peers: Option<i32>,
    grabs: Option<i32>,
    tvdb_id: Option<i64>,
}

impl ReleaseInfoBuilder {
    fn apply_element(&mut self, tag_name: &str, e: &BytesStart<'_>) {
        match tag_name {
            "newznab:attr" | "torznab:attr" => {
                let attrs = attributes(e);
                let name = attrs.iter().find(|(k, _)| k == "name").map(|(_, v)| v.as_str());
                let value = attrs.iter().find(|(k, _)| k == "value").map(|(_, v)| v.as_str());
                if let (Some(name), Some(value)) = (name, value) {
                    self.set_attr(name, value);
                }
            }
            "enclosure" => {
                for (key, value) in attributes(e) {
                    match key.as_str() {
                        "url" => {
                            if value.starts_with("magnet:") {
                                self.magnet_uri = Some(value);
                            } else {
                                self.link = Some(value);
                            }
                        }
                        "length" => {
                            if let Ok(size) = value.parse::<i64>() {
                                self.size.get_or_insert(size);
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn apply_text(&mut self, tag: &str, text: String) {
        match tag {
            "title" => self.title = Some(text),
            "guid" => {
                self.guid.get_or_insert(text);
            }
            "link" => {
                if self.link.is_none() {
                    self.link = Some(text);
                }
            }
            "pubDate" => self.pub_date = parse_rfc822_date(&text),
            "category" => {
                if let Ok(id) = text.parse() {
                    self.categories.push(id);
                }
            }
            _ => {}
        }
    }

    fn set_attr(&mut self, name: &str, value: &str) {
        match name {
            "size" => {
                if let Ok(size) = value.parse::<i64>() {
                    self.size = Some(size);
                }
            }
            "category" => {
                if let Ok(id) = value.parse() {
                    self.categories.push(id);
                }
            }
            "seeders" => self.seeders = value.parse().ok(),
            "peers" => self.peers = value.parse().ok(),
            "grabs" => self.grabs = value.parse().ok(),
            "tvdbid" | "tvdb" => self.tvdb_id = value.parse().ok(),
            "magneturl" => self.magnet_uri = Some(value.to_string()),
            _ => {
                debug!(attr_name = name, attr_value = value, "Unknown newznab attribute");
            }
        }
    }

    fn build(self, provider: &str) -> Option<ReleaseInfo> {
        let title = self.title?;
        let guid = self.guid.unwrap_or_else(|| title.clone());

        Some(ReleaseInfo {
            title,
            guid,
            link: self.link,
            magnet_uri: self.magnet_uri,
            publish_date: self.pub_date.unwrap_or_else(Utc::now),
            categories: self.categories,
            size: self.size,
            grabs: self.grabs,
            seeders: self.seeders,
            peers: self.peers,
            tvdb_id: self.tvdb_id,
            provider: provider.to_string(),
        })
    }
}

/// Parse RFC 822 date format (common in RSS/Atom feeds)
fn parse_rfc822_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let formats = [
        "%a, %d %b %Y %H:%M:%S %z", // RFC 822
        "%Y-%m-%dT%H:%M:%S%z",      // ISO 8601
    ];

    for format in &formats {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    warn!(date_string = s, "Failed to parse date");
    None
}
