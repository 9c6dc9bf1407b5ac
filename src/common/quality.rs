//! Release quality model
//!
//! Qualities are single bits so a show's wanted qualities can be stored as one
//! integer: the low 16 bits hold the allowed (initial) qualities and the high
//! 16 bits hold the preferred (upgrade) qualities.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A single release quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(pub u32);

impl Quality {
    pub const NONE: Quality = Quality(0);
    pub const SDTV: Quality = Quality(1);
    pub const SDDVD: Quality = Quality(1 << 1);
    pub const HDTV: Quality = Quality(1 << 2);
    /// 720p/1080i MPEG-2 captures
    pub const RAWHDTV: Quality = Quality(1 << 3);
    pub const FULLHDTV: Quality = Quality(1 << 4);
    pub const HDWEBDL: Quality = Quality(1 << 5);
    pub const FULLHDWEBDL: Quality = Quality(1 << 6);
    pub const HDBLURAY: Quality = Quality(1 << 7);
    pub const FULLHDBLURAY: Quality = Quality(1 << 8);
    pub const UHD_4K_TV: Quality = Quality(1 << 9);
    pub const UHD_4K_WEBDL: Quality = Quality(1 << 10);
    pub const UHD_4K_BLURAY: Quality = Quality(1 << 11);
    pub const UHD_8K_TV: Quality = Quality(1 << 12);
    pub const UHD_8K_WEBDL: Quality = Quality(1 << 13);
    pub const UHD_8K_BLURAY: Quality = Quality(1 << 14);
    /// Kept far from the real qualities so it never sorts between them
    pub const UNKNOWN: Quality = Quality(1 << 15);

    /// Every real quality, lowest first
    pub const ALL: [Quality; 16] = [
        Quality::SDTV,
        Quality::SDDVD,
        Quality::HDTV,
        Quality::RAWHDTV,
        Quality::FULLHDTV,
        Quality::HDWEBDL,
        Quality::FULLHDWEBDL,
        Quality::HDBLURAY,
        Quality::FULLHDBLURAY,
        Quality::UHD_4K_TV,
        Quality::UHD_4K_WEBDL,
        Quality::UHD_4K_BLURAY,
        Quality::UHD_8K_TV,
        Quality::UHD_8K_WEBDL,
        Quality::UHD_8K_BLURAY,
        Quality::UNKNOWN,
    ];

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_unknown(self) -> bool {
        self == Quality::UNKNOWN
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Quality::NONE => "N/A",
            Quality::SDTV => "SDTV",
            Quality::SDDVD => "SD DVD",
            Quality::HDTV => "720p HDTV",
            Quality::RAWHDTV => "RawHD",
            Quality::FULLHDTV => "1080p HDTV",
            Quality::HDWEBDL => "720p WEB-DL",
            Quality::FULLHDWEBDL => "1080p WEB-DL",
            Quality::HDBLURAY => "720p BluRay",
            Quality::FULLHDBLURAY => "1080p BluRay",
            Quality::UHD_4K_TV => "4K UHD TV",
            Quality::UHD_4K_WEBDL => "4K UHD WEB-DL",
            Quality::UHD_4K_BLURAY => "4K UHD BluRay",
            Quality::UHD_8K_TV => "8K UHD TV",
            Quality::UHD_8K_WEBDL => "8K UHD WEB-DL",
            Quality::UHD_8K_BLURAY => "8K UHD BluRay",
            _ => "Unknown",
        }
    }

    /// Detect the quality of a scene-style release name
    pub fn from_name(name: &str, anime: bool) -> Quality {
        if anime {
            return anime_quality(name);
        }

        let has = |re: &Regex| re.is_match(name);

        if has(&RES_4320) {
            return pick_uhd(name, Quality::UHD_8K_TV, Quality::UHD_8K_WEBDL, Quality::UHD_8K_BLURAY);
        }
        if has(&RES_2160) {
            return pick_uhd(name, Quality::UHD_4K_TV, Quality::UHD_4K_WEBDL, Quality::UHD_4K_BLURAY);
        }

        if has(&RES_1080) {
            if has(&BLURAY) {
                return Quality::FULLHDBLURAY;
            }
            if has(&WEB) || has(&ITUNES) {
                return Quality::FULLHDWEBDL;
            }
            if has(&RES_1080I) || has(&MPEG2) {
                return Quality::RAWHDTV;
            }
            if has(&HDTV) || has(&CODEC) {
                return Quality::FULLHDTV;
            }
            return Quality::UNKNOWN;
        }

        if has(&RES_720) {
            if has(&MPEG2) {
                return Quality::RAWHDTV;
            }
            if has(&BLURAY) {
                return Quality::HDBLURAY;
            }
            if has(&WEB) || has(&ITUNES) {
                return Quality::HDWEBDL;
            }
            if has(&HDTV) || has(&CODEC) {
                return Quality::HDTV;
            }
            return Quality::UNKNOWN;
        }

        if has(&HR_WS_PDTV) {
            return Quality::HDTV;
        }
        if has(&DVD) {
            return Quality::SDDVD;
        }
        if (has(&SD_TV_SOURCE) || has(&WEB)) && has(&CODEC) {
            return Quality::SDTV;
        }
        if has(&RES_480) {
            return Quality::SDTV;
        }

        Quality::UNKNOWN
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality::NONE
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn pick_uhd(name: &str, tv: Quality, web: Quality, bluray: Quality) -> Quality {
    if BLURAY.is_match(name) {
        bluray
    } else if WEB.is_match(name) {
        web
    } else {
        tv
    }
}

fn anime_quality(name: &str) -> Quality {
    let dvd = ANIME_DVD.is_match(name);
    let bluray = ANIME_BLURAY.is_match(name);
    let sd = ANIME_SD.is_match(name);
    let hd = ANIME_HD.is_match(name);
    let full_hd = ANIME_FULLHD.is_match(name);

    if sd && !bluray && !dvd {
        Quality::SDTV
    } else if dvd {
        Quality::SDDVD
    } else if hd && !bluray && !full_hd {
        Quality::HDTV
    } else if full_hd && !bluray && !hd {
        Quality::FULLHDTV
    } else if bluray && hd && !full_hd {
        Quality::HDBLURAY
    } else if bluray && full_hd && !hd {
        Quality::FULLHDBLURAY
    } else {
        Quality::UNKNOWN
    }
}

macro_rules! token {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($re).expect("valid quality regex"));
    };
}

token!(RES_4320, r"(?i)4320[pi]");
token!(RES_2160, r"(?i)(2160[pi]|\b4k\b|\buhd\b)");
token!(RES_1080, r"(?i)1080[pi]");
token!(RES_1080I, r"(?i)1080i");
token!(RES_720, r"(?i)720p");
token!(RES_480, r"(?i)(480p|576p)");
token!(HDTV, r"(?i)\bhdtv\b");
token!(SD_TV_SOURCE, r"(?i)\b(pdtv|hdtv|dsr|tvrip|sdtv)\b");
token!(HR_WS_PDTV, r"(?i)hr.ws.pdtv.(x26[45]|h.?26[45])");
token!(CODEC, r"(?i)(xvid|divx|x26[45]|h.?26[45]|hevc|avc)");
token!(WEB, r"(?i)\bweb([ ._-]?(dl|rip|mux|hd))?\b");
token!(ITUNES, r"(?i)\bitunes\b");
token!(MPEG2, r"(?i)mpeg-?2");
token!(BLURAY, r"(?i)(blu-?ray|hddvd|b[rd]rip|bdremux)");
token!(DVD, r"(?i)(dvdrip|dvd-?r|\bdvd\b)");
token!(ANIME_DVD, r"(?i)(dvd|dvdrip)");
token!(ANIME_BLURAY, r"(?i)(\bbd\b|blue?-?ray|bdrip)");
token!(ANIME_SD, r"(?i)(360p|480p|848x480|xvid)");
token!(ANIME_HD, r"(?i)(720p|1280x720|960x720)");
token!(ANIME_FULLHD, r"(?i)(1080p|1920x1080)");

/// Allowed and preferred qualities for a show
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityProfile {
    /// Qualities acceptable for a first download
    pub allowed: Vec<Quality>,
    /// Qualities worth upgrading to
    pub preferred: Vec<Quality>,
}

impl QualityProfile {
    pub fn new(allowed: Vec<Quality>, preferred: Vec<Quality>) -> Self {
        Self { allowed, preferred }
    }

    /// Pack into the storage integer
    pub fn combine(&self) -> u32 {
        let allowed = self.allowed.iter().fold(0u32, |acc, q| acc | q.bits());
        let preferred = self.preferred.iter().fold(0u32, |acc, q| acc | q.bits());
        allowed | (preferred << 16)
    }

    /// Unpack a storage integer
    pub fn split(bits: u32) -> Self {
        let allowed = Quality::ALL
            .iter()
            .copied()
            .filter(|q| q.bits() & bits != 0)
            .collect();
        let preferred = Quality::ALL
            .iter()
            .copied()
            .filter(|q| (q.bits() << 16) & bits != 0)
            .collect();
        Self { allowed, preferred }
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty() && self.preferred.is_empty()
    }

    pub fn is_allowed(&self, quality: Quality) -> bool {
        self.allowed.contains(&quality)
    }

    pub fn is_preferred(&self, quality: Quality) -> bool {
        self.preferred.contains(&quality)
    }

    /// Whether the quality appears in either list
    pub fn contains(&self, quality: Quality) -> bool {
        self.is_allowed(quality) || self.is_preferred(quality)
    }

    pub fn max_preferred(&self) -> Option<Quality> {
        self.preferred.iter().copied().max()
    }

    /// Every quality in either list, deduplicated and sorted
    pub fn all(&self) -> Vec<Quality> {
        let mut all: Vec<Quality> = self
            .allowed
            .iter()
            .chain(self.preferred.iter())
            .copied()
            .collect();
        all.sort();
        all.dedup();
        all
    }

    pub fn sd() -> Self {
        Self::new(vec![Quality::SDTV, Quality::SDDVD], vec![])
    }

    pub fn hd() -> Self {
        Self::new(
            vec![
                Quality::HDTV,
                Quality::FULLHDTV,
                Quality::HDWEBDL,
                Quality::FULLHDWEBDL,
                Quality::HDBLURAY,
                Quality::FULLHDBLURAY,
            ],
            vec![],
        )
    }

    pub fn hd720p() -> Self {
        Self::new(vec![Quality::HDTV, Quality::HDWEBDL, Quality::HDBLURAY], vec![])
    }

    pub fn hd1080p() -> Self {
        Self::new(
            vec![Quality::FULLHDTV, Quality::FULLHDWEBDL, Quality::FULLHDBLURAY],
            vec![],
        )
    }

    pub fn any() -> Self {
        Self::new(
            vec![
                Quality::SDTV,
                Quality::SDDVD,
                Quality::HDTV,
                Quality::FULLHDTV,
                Quality::HDWEBDL,
                Quality::FULLHDWEBDL,
                Quality::HDBLURAY,
                Quality::FULLHDBLURAY,
                Quality::UNKNOWN,
            ],
            vec![],
        )
    }

    /// Look up a named preset
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "sd" => Some(Self::sd()),
            "hd" => Some(Self::hd()),
            "hd720p" => Some(Self::hd720p()),
            "hd1080p" => Some(Self::hd1080p()),
            "any" => Some(Self::any()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scene_quality_detection() {
        let cases = [
            ("Show.Name.S01E02.HDTV.XviD-GRP", Quality::SDTV),
            ("Show.Name.S01E02.480p.WEB.x264-GRP", Quality::SDTV),
            ("Show.Name.S01E02.DVDRip.XviD-GRP", Quality::SDDVD),
            ("Show.Name.S01E02.720p.HDTV.x264-GRP", Quality::HDTV),
            ("Show.Name.S01E02.720p.HDTV.MPEG2-GRP", Quality::RAWHDTV),
            ("Show.Name.S01E02.1080i.HDTV.DD5.1.H.264-GRP", Quality::RAWHDTV),
            ("Show.Name.S01E02.1080p.HDTV.x264-GRP", Quality::FULLHDTV),
            ("Show.Name.S01E02.720p.WEB-DL.DD5.1.H.264-GRP", Quality::HDWEBDL),
            ("Show.Name.S01E02.1080p.WEB.h264-GRP", Quality::FULLHDWEBDL),
            ("Show.Name.S01E02.1080p.WEBRip.x264-GRP", Quality::FULLHDWEBDL),
            ("Show.Name.S01E02.720p.BluRay.x264-GRP", Quality::HDBLURAY),
            ("Show.Name.S01E02.1080p.BluRay.x264-GRP", Quality::FULLHDBLURAY),
            ("Show.Name.S01E02.2160p.WEB-DL.HEVC-GRP", Quality::UHD_4K_WEBDL),
            ("Show.Name.S01E02.2160p.UHD.BluRay.x265-GRP", Quality::UHD_4K_BLURAY),
            ("Show.Name.S01E02-GRP", Quality::UNKNOWN),
        ];

        for (name, expected) in cases {
            assert_eq!(Quality::from_name(name, false), expected, "{}", name);
        }
    }

    #[test]
    fn test_anime_quality_detection() {
        assert_eq!(Quality::from_name("[Group] Show - 01 [720p]", true), Quality::HDTV);
        assert_eq!(Quality::from_name("[Group] Show - 01 [1080p]", true), Quality::FULLHDTV);
        assert_eq!(Quality::from_name("[Group] Show - 01 [BD 1080p]", true), Quality::FULLHDBLURAY);
        assert_eq!(Quality::from_name("[Group] Show - 01 [480p]", true), Quality::SDTV);
        assert_eq!(Quality::from_name("[Group] Show - 01", true), Quality::UNKNOWN);
    }

    #[test]
    fn test_profile_combine_split() {
        let profile = QualityProfile::new(
            vec![Quality::SDTV, Quality::HDTV],
            vec![Quality::FULLHDWEBDL, Quality::FULLHDBLURAY],
        );
        let bits = profile.combine();
        assert_eq!(bits, 1 | 4 | ((64 | 256) << 16));
        assert_eq!(QualityProfile::split(bits), profile);
    }

    #[test]
    fn test_unknown_survives_combine() {
        let profile = QualityProfile::new(vec![], vec![Quality::UNKNOWN]);
        assert_eq!(QualityProfile::split(profile.combine()), profile);
    }

    #[test]
    fn test_profile_queries() {
        let profile = QualityProfile::new(vec![Quality::HDTV], vec![Quality::HDWEBDL, Quality::HDBLURAY]);
        assert!(profile.contains(Quality::HDTV));
        assert!(profile.is_preferred(Quality::HDBLURAY));
        assert!(!profile.contains(Quality::SDTV));
        assert_eq!(profile.max_preferred(), Some(Quality::HDBLURAY));
        assert_eq!(
            profile.all(),
            vec![Quality::HDTV, Quality::HDWEBDL, Quality::HDBLURAY]
        );
    }

    #[test]
    fn test_presets() {
        assert_eq!(QualityProfile::preset("HD720p"), Some(QualityProfile::hd720p()));
        assert!(QualityProfile::preset("nonsense").is_none());
        assert!(QualityProfile::any().is_allowed(Quality::UNKNOWN));
    }
}
