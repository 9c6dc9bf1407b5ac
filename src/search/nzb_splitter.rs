//! Splitting season NZBs into per-episode NZBs
//!
//! A season pack NZB lists the files of every episode. When only some of the
//! season is wanted, the files are grouped by the episode their name parses
//! to and each group becomes its own in-memory NZB.
//!
//! ```xml
//! <nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
//!   <file poster="user@example.com" date="1234567890"
//!         subject="[01/20] - &quot;Show.S01E02.720p.HDTV.x264-GRP.part01.rar&quot; yEnc (1/10)">
//!     <groups>...</groups>
//!     <segments>...</segments>
//!   </file>
//! </nzb>
//! ```

use anyhow::{Result, anyhow};
use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use tracing::{debug, info, warn};

use super::providers::want_episode;
use super::{EpisodeIndex, ResultType, SearchResult};
use crate::common::EpisodeKey;
use crate::db::TvShowRecord;
use crate::indexer::SearchProvider;
use crate::services::filename_parser::parse_release;

const NZB_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nzb PUBLIC "-//newzBin//DTD NZB 1.1//EN" "http://www.newzbin.com/DTD/nzb/nzb-1.1.dtd">
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">"#;

static YENC: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)yenc").expect("valid yenc regex"));

static FILE_EXTENSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(part\d+|vol\d+\+\d+|par2|nfo|sfv|srr|nzb|rar|r\d{2,3}|\d{3}|mkv|mp4|avi|ts|jpg|srt|sub|idx)$")
        .expect("valid extension regex")
});

/// One episode's worth of files cut out of a season NZB
#[derive(Debug, Clone, PartialEq)]
pub struct SplitNzb {
    /// Release name shared by the files
    pub name: String,
    pub season: Option<i32>,
    pub episodes: Vec<i32>,
    /// A complete NZB document containing only these files
    pub content: Vec<u8>,
}

/// Extract the filename from a subject line
///
/// Common patterns:
/// - `"filename.ext" yEnc (1/10)`
/// - `[001/100] - "filename.ext" yEnc (1/10)`
/// - `filename.ext (1/10)`
pub fn extract_filename(subject: &str) -> String {
    if let Some(start) = subject.find('"') {
        if let Some(end) = subject[start + 1..].find('"') {
            return subject[start + 1..start + 1 + end].to_string();
        }
    }

    if let Some(yenc) = YENC.find(subject) {
        let before = subject[..yenc.start()].trim();
        if let Some(last_word) = before.split_whitespace().last() {
            if last_word.contains('.') {
                return last_word.to_string();
            }
        }
    }

    subject
        .split_whitespace()
        .find(|w| w.contains('.'))
        .unwrap_or(subject)
        .to_string()
}

/// Drop archive, parity and container extensions (`.part01.rar`, `.vol00+01.par2`)
pub fn release_name_from_file(filename: &str) -> String {
    let mut name = filename.trim().to_string();
    while let Some(m) = FILE_EXTENSION.find(&name) {
        name.truncate(m.start());
    }
    name
}

struct FileEntry<'a> {
    subject: String,
    raw: &'a str,
}

/// Raw `<file>` elements of an NZB with their subjects
fn file_entries(xml: &str) -> Result<Vec<FileEntry<'_>>> {
    let mut reader = Reader::from_str(xml);
    let mut entries = Vec::new();
    let mut current: Option<(usize, String)> = None;

    loop {
        let before = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"file" => {
                let subject = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == b"subject")
                    .map(|a| {
                        a.unescape_value()
                            .map(|v| v.into_owned())
                            .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned())
                    })
                    .unwrap_or_default();
                current = Some((before, subject));
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"file" => {
                if let Some((start, subject)) = current.take() {
                    let end = reader.buffer_position() as usize;
                    entries.push(FileEntry {
                        subject,
                        raw: xml[start..end].trim(),
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("Error parsing NZB XML: {}", e)),
            _ => {}
        }
    }

    Ok(entries)
}

/// Group the files of an NZB by the episode they belong to
pub fn split_nzb(data: &[u8]) -> Result<Vec<SplitNzb>> {
    let xml = String::from_utf8_lossy(data);
    let entries = file_entries(&xml)?;

    if entries.is_empty() {
        return Err(anyhow!("NZB contains no files"));
    }

    let mut groups: Vec<(SplitNzb, Vec<&str>)> = Vec::new();

    for entry in &entries {
        let name = release_name_from_file(&extract_filename(&entry.subject));
        let Some(parsed) = parse_release(&name) else {
            debug!(subject = %entry.subject, "NZB file does not name an episode");
            continue;
        };

        match groups
            .iter_mut()
            .find(|(g, _)| g.season == parsed.season && g.episodes == parsed.episodes)
        {
            Some((_, files)) => files.push(entry.raw),
            None => groups.push((
                SplitNzb {
                    name,
                    season: parsed.season,
                    episodes: parsed.episodes,
                    content: Vec::new(),
                },
                vec![entry.raw],
            )),
        }
    }

    Ok(groups
        .into_iter()
        .map(|(mut split, files)| {
            let mut doc = String::from(NZB_HEADER);
            for file in files {
                doc.push_str("\n  ");
                doc.push_str(file);
            }
            doc.push_str("\n</nzb>\n");
            split.content = doc.into_bytes();
            split
        })
        .collect())
}

/// Download a season NZB and turn it into per-episode results.
///
/// Files belonging to another season, files that are not episodes and
/// episodes the show does not want at the pack's quality are left out.
pub async fn split_result(
    provider: &dyn SearchProvider,
    result: &SearchResult,
    show: &TvShowRecord,
    index: &EpisodeIndex,
) -> Vec<SearchResult> {
    let data = match provider.download(&result.url).await {
        Ok(data) => data,
        Err(e) => {
            warn!(release = %result.name, error = %e, "Failed to download season NZB");
            return Vec::new();
        }
    };

    let Some(season) = parse_release(&result.name).map(|p| p.season.unwrap_or(1)) else {
        warn!(release = %result.name, "Unable to parse season NZB name");
        return Vec::new();
    };

    let splits = match split_nzb(&data) {
        Ok(splits) => splits,
        Err(e) => {
            warn!(release = %result.name, error = %e, "Failed to split season NZB");
            return Vec::new();
        }
    };

    let mut results = Vec::new();
    for split in splits {
        debug!(name = %split.name, release = %result.name, "Split out episode NZB");

        if split.season.unwrap_or(1) != season {
            warn!(name = %split.name, release = %result.name, "Split NZB belongs to another season, ignoring it");
            continue;
        }
        if split.episodes.is_empty() {
            warn!(name = %split.name, release = %result.name, "Split NZB is not a valid episode, ignoring it");
            continue;
        }

        let keys: Vec<EpisodeKey> = split
            .episodes
            .iter()
            .map(|&e| EpisodeKey::new(season, e))
            .collect();
        let wanted = keys
            .iter()
            .all(|k| want_episode(show, index.status(k), result.quality, false, false));
        if !wanted {
            info!(name = %split.name, quality = %result.quality, "Ignoring split NZB, episode not wanted at this quality");
            continue;
        }

        let parsed = parse_release(&split.name);
        let mut episode_result = SearchResult::new(
            result.provider.clone(),
            result.provider_type,
            split.name,
            result.url.clone(),
            result.show_id,
        );
        episode_result.result_type = ResultType::NzbData;
        episode_result.quality = result.quality;
        episode_result.episodes = keys;
        episode_result.release_group = parsed.as_ref().and_then(|p| p.release_group.clone());
        episode_result.version = parsed.map(|p| p.version).unwrap_or(-1);
        episode_result.content = Some(split.content);
        results.push(episode_result);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SEASON_NZB: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nzb PUBLIC "-//newzBin//DTD NZB 1.1//EN" "http://www.newzbin.com/DTD/nzb/nzb-1.1.dtd">
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
  <file poster="a@b.c" date="1609459200" subject="[1/4] - &quot;Show.S01E01.720p.HDTV.x264-GRP.part01.rar&quot; yEnc (1/2)">
    <groups><group>alt.binaries.tv</group></groups>
    <segments><segment bytes="100" number="1">e1p1@news</segment></segments>
  </file>
  <file poster="a@b.c" date="1609459200" subject="[2/4] - &quot;Show.S01E01.720p.HDTV.x264-GRP.vol00+01.par2&quot; yEnc (1/1)">
    <groups><group>alt.binaries.tv</group></groups>
    <segments><segment bytes="10" number="1">e1par@news</segment></segments>
  </file>
  <file poster="a@b.c" date="1609459200" subject="[3/4] - &quot;Show.S01E02.720p.HDTV.x264-GRP.part01.rar&quot; yEnc (1/2)">
    <groups><group>alt.binaries.tv</group></groups>
    <segments><segment bytes="100" number="1">e2p1@news</segment></segments>
  </file>
  <file poster="a@b.c" date="1609459200" subject="[4/4] - &quot;Show.S01.720p.HDTV.x264-GRP.nfo&quot; yEnc (1/1)">
    <groups><group>alt.binaries.tv</group></groups>
    <segments><segment bytes="1" number="1">nfo@news</segment></segments>
  </file>
</nzb>"#;

    #[test]
    fn test_extract_filename() {
        assert_eq!(
            extract_filename(r#"[01/20] - "Show.S01E02.mkv" yEnc (1/10)"#),
            "Show.S01E02.mkv"
        );
        assert_eq!(extract_filename("Show.S01E02.mkv yEnc (1/10)"), "Show.S01E02.mkv");
    }

    #[test]
    fn test_extract_filename_non_ascii_subject() {
        // Lowercasing the Kelvin sign and dotted I changes their byte length
        assert_eq!(extract_filename("\u{fc}\u{212A}yEnc (1/1)"), "\u{fc}\u{212A}yEnc (1/1)");
        assert_eq!(
            extract_filename("\u{130}\u{212A} Show.S01E02.mkv YENC (1/10)"),
            "Show.S01E02.mkv"
        );

        let nzb = "<nzb><file subject=\"\u{fc}\u{212A}yEnc (1/1)\"><segments/></file></nzb>";
        assert!(split_nzb(nzb.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_release_name_strips_extensions() {
        assert_eq!(
            release_name_from_file("Show.S01E01.720p.HDTV.x264-GRP.part01.rar"),
            "Show.S01E01.720p.HDTV.x264-GRP"
        );
        assert_eq!(
            release_name_from_file("Show.S01E01.720p.HDTV.x264-GRP.vol00+01.par2"),
            "Show.S01E01.720p.HDTV.x264-GRP"
        );
    }

    #[test]
    fn test_split_groups_files_by_episode() {
        let splits = split_nzb(SEASON_NZB.as_bytes()).unwrap();

        let names: Vec<_> = splits.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Show.S01E01.720p.HDTV.x264-GRP",
                "Show.S01E02.720p.HDTV.x264-GRP",
                "Show.S01.720p.HDTV.x264-GRP",
            ]
        );
        assert_eq!(splits[0].episodes, vec![1]);
        assert!(splits[2].episodes.is_empty());

        let first = String::from_utf8(splits[0].content.clone()).unwrap();
        assert!(first.contains("e1p1@news"));
        assert!(first.contains("e1par@news"));
        assert!(!first.contains("e2p1@news"));
        assert!(first.trim_end().ends_with("</nzb>"));
    }

    #[test]
    fn test_split_output_is_valid_nzb() {
        let splits = split_nzb(SEASON_NZB.as_bytes()).unwrap();
        let again = split_nzb(&splits[1].content).unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].episodes, vec![2]);
    }

    #[test]
    fn test_empty_nzb_is_an_error() {
        assert!(split_nzb(b"<nzb></nzb>").is_err());
    }
}
