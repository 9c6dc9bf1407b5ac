//! Application configuration management
//!
//! Process-level settings come from the environment (`.env` is honoured);
//! search behaviour, providers and download clients live in a YAML file.

mod settings;

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub use settings::{
    ClientSettings, NzbMethod, ProviderConfig, ProviderKind, QbittorrentSettings,
    SabnzbdSettings, SearchSettings, Settings, TorrentMethod,
};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (for generating URLs)
    pub host: Option<String>,

    /// Server port
    pub port: u16,

    /// SQLite database file
    pub database_path: PathBuf,

    /// YAML settings file
    pub settings_path: PathBuf,

    /// Base directory for runtime data
    pub data_path: PathBuf,

    /// TVMaze API base URL
    pub tvmaze_url: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let data_path = PathBuf::from(env::var("DATA_PATH").unwrap_or_else(|_| "./data".to_string()));

        let database_path = env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_path.join("medusa.db"));

        let settings_path = env::var("SETTINGS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_path.join("settings.yaml"));

        Ok(Self {
            host: env::var("HOST").ok(),

            port: env::var("PORT")
                .unwrap_or_else(|_| "8081".to_string())
                .parse()
                .context("Invalid PORT")?,

            database_path,
            settings_path,
            data_path,

            tvmaze_url: env::var("TVMAZE_URL")
                .unwrap_or_else(|_| "https://api.tvmaze.com".to_string()),
        })
    }

    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host.as_deref().unwrap_or("0.0.0.0"), self.port)
    }
}
