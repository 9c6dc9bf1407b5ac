//! Episode statuses
//!
//! The database stores an episode's status and the quality it was obtained in
//! as a single composite integer: `status + 100 * quality`.

use serde::{Deserialize, Serialize};

use super::quality::{Quality, QualityProfile};

/// Download state of an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    Unknown,
    Unaired,
    Snatched,
    Wanted,
    Downloaded,
    Skipped,
    Archived,
    Ignored,
    SnatchedProper,
    Subtitled,
    Failed,
    SnatchedBest,
}

impl EpisodeStatus {
    pub fn code(self) -> i64 {
        match self {
            EpisodeStatus::Unknown => -1,
            EpisodeStatus::Unaired => 1,
            EpisodeStatus::Snatched => 2,
            EpisodeStatus::Wanted => 3,
            EpisodeStatus::Downloaded => 4,
            EpisodeStatus::Skipped => 5,
            EpisodeStatus::Archived => 6,
            EpisodeStatus::Ignored => 7,
            EpisodeStatus::SnatchedProper => 9,
            EpisodeStatus::Subtitled => 10,
            EpisodeStatus::Failed => 11,
            EpisodeStatus::SnatchedBest => 12,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => EpisodeStatus::Unaired,
            2 => EpisodeStatus::Snatched,
            3 => EpisodeStatus::Wanted,
            4 => EpisodeStatus::Downloaded,
            5 => EpisodeStatus::Skipped,
            6 => EpisodeStatus::Archived,
            7 => EpisodeStatus::Ignored,
            9 => EpisodeStatus::SnatchedProper,
            10 => EpisodeStatus::Subtitled,
            11 => EpisodeStatus::Failed,
            12 => EpisodeStatus::SnatchedBest,
            _ => EpisodeStatus::Unknown,
        }
    }

    /// Any of the three snatched states
    pub fn is_snatched(self) -> bool {
        matches!(
            self,
            EpisodeStatus::Snatched | EpisodeStatus::SnatchedProper | EpisodeStatus::SnatchedBest
        )
    }

    /// Status an `Unaired` episode moves to once its air date has passed.
    /// Specials are never searched automatically.
    pub fn once_aired(season: i32) -> Self {
        if season > 0 {
            EpisodeStatus::Wanted
        } else {
            EpisodeStatus::Skipped
        }
    }
}

impl std::fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EpisodeStatus::Unknown => "Unknown",
            EpisodeStatus::Unaired => "Unaired",
            EpisodeStatus::Snatched => "Snatched",
            EpisodeStatus::Wanted => "Wanted",
            EpisodeStatus::Downloaded => "Downloaded",
            EpisodeStatus::Skipped => "Skipped",
            EpisodeStatus::Archived => "Archived",
            EpisodeStatus::Ignored => "Ignored",
            EpisodeStatus::SnatchedProper => "Snatched (Proper)",
            EpisodeStatus::Subtitled => "Subtitled",
            EpisodeStatus::Failed => "Failed",
            EpisodeStatus::SnatchedBest => "Snatched (Best)",
        };
        write!(f, "{}", s)
    }
}

/// Status paired with the quality it applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeStatus {
    pub status: EpisodeStatus,
    pub quality: Quality,
}

impl CompositeStatus {
    pub fn new(status: EpisodeStatus, quality: Quality) -> Self {
        Self { status, quality }
    }

    /// A status with no associated quality
    pub fn plain(status: EpisodeStatus) -> Self {
        Self::new(status, Quality::NONE)
    }

    pub fn encode(&self) -> i64 {
        self.status.code() + 100 * self.quality.bits() as i64
    }

    pub fn decode(code: i64) -> Self {
        for quality in Quality::ALL.iter().rev() {
            let offset = 100 * quality.bits() as i64;
            if code > offset {
                return Self::new(EpisodeStatus::from_code(code - offset), *quality);
            }
        }
        Self::new(EpisodeStatus::from_code(code), Quality::NONE)
    }
}

/// Summary bucket used by backlog views and segment selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overview {
    Unaired,
    Wanted,
    /// Has an acceptable quality but an upgrade is still wanted
    Qual,
    Good,
    Skipped,
    Snatched,
    SnatchedProper,
    SnatchedBest,
}

impl QualityProfile {
    /// Classify an episode's composite status against this profile
    pub fn overview(&self, composite: CompositeStatus) -> Overview {
        match composite.status {
            EpisodeStatus::Wanted | EpisodeStatus::Failed => Overview::Wanted,
            EpisodeStatus::Unaired | EpisodeStatus::Unknown => Overview::Unaired,
            EpisodeStatus::Skipped | EpisodeStatus::Ignored => Overview::Skipped,
            EpisodeStatus::Archived => Overview::Good,
            EpisodeStatus::Snatched => Overview::Snatched,
            EpisodeStatus::SnatchedProper => Overview::SnatchedProper,
            EpisodeStatus::SnatchedBest => Overview::SnatchedBest,
            EpisodeStatus::Downloaded | EpisodeStatus::Subtitled => {
                let current = composite.quality;
                if !self.contains(current) {
                    return Overview::Qual;
                }
                match self.max_preferred() {
                    None => Overview::Good,
                    Some(best) if current >= best => Overview::Good,
                    Some(_) => Overview::Qual,
                }
            }
        }
    }
}
