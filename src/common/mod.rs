//! Shared domain vocabulary: qualities, episode statuses, episode keys

pub mod quality;
pub mod status;

use serde::{Deserialize, Serialize};

pub use quality::{Quality, QualityProfile};
pub use status::{CompositeStatus, EpisodeStatus, Overview};

/// Season/episode pair identifying an episode within a show
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EpisodeKey {
    pub season: i32,
    pub episode: i32,
}

impl EpisodeKey {
    pub fn new(season: i32, episode: i32) -> Self {
        Self { season, episode }
    }
}

impl std::fmt::Display for EpisodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{:02}E{:02}", self.season, self.episode)
    }
}
