//! Release group black and white lists

use crate::db::TvShowRecord;

/// Release groups a show accepts or rejects
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlackAndWhiteList {
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
}

impl BlackAndWhiteList {
    pub fn new(whitelist: Vec<String>, blacklist: Vec<String>) -> Self {
        Self {
            whitelist,
            blacklist,
        }
    }

    pub fn for_show(show: &TvShowRecord) -> Self {
        Self::new(show.whitelist.clone(), show.blacklist.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.whitelist.is_empty() && self.blacklist.is_empty()
    }

    /// Whether a release from `group` may be used.
    ///
    /// With both lists empty everything passes. Otherwise a release without a
    /// detectable group is rejected, a whitelist admits only its groups and
    /// the blacklist always rejects.
    pub fn is_valid(&self, group: Option<&str>) -> bool {
        if self.is_empty() {
            return true;
        }

        let Some(group) = group.filter(|g| !g.is_empty()) else {
            tracing::debug!("Failed to detect release group, invalid result");
            return false;
        };

        let white = self.whitelist.is_empty()
            || self.whitelist.iter().any(|g| g.eq_ignore_ascii_case(group));
        let black = !self.blacklist.iter().any(|g| g.eq_ignore_ascii_case(group));

        white && black
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(white: &[&str], black: &[&str]) -> BlackAndWhiteList {
        BlackAndWhiteList::new(
            white.iter().map(|s| s.to_string()).collect(),
            black.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_empty_lists_accept_anything() {
        let bwl = BlackAndWhiteList::default();
        assert!(bwl.is_valid(None));
        assert!(bwl.is_valid(Some("GRP")));
    }

    #[test]
    fn test_whitelist_is_case_insensitive() {
        let bwl = list(&["HorribleSubs"], &[]);
        assert!(bwl.is_valid(Some("horriblesubs")));
        assert!(!bwl.is_valid(Some("Other")));
        assert!(!bwl.is_valid(None));
    }

    #[test]
    fn test_blacklist_wins() {
        let bwl = list(&[], &["BadGroup"]);
        assert!(bwl.is_valid(Some("Good")));
        assert!(!bwl.is_valid(Some("BADGROUP")));
    }
}
