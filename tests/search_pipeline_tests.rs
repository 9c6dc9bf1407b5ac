//! Integration tests for the search pipeline: provider search, result
//! reconciliation and snatching, driven through the search queue.

mod common;

use chrono::Utc;
use pretty_assertions::assert_eq;

use common::*;
use medusa::common::{CompositeStatus, EpisodeKey, EpisodeStatus, Quality, QualityProfile};
use medusa::config::SearchSettings;
use medusa::db::NewHistory;
use medusa::indexer::{ProviderSettings, ProviderType, SearchMode};
use medusa::jobs::daily_search::run_daily_search;
use medusa::queue::{ManualSearchState, SearchKind, SearchQueue};
use medusa::search::{ResultType, find_propers, search_providers, snatch_propers};

#[tokio::test]
async fn test_backlog_snatches_best_quality_per_episode() {
    let h = harness(
        vec![FakeProvider::new(
            "indexer",
            &[
                "Show.Name.S01E01.HDTV.x264-LOL",
                "Show.Name.S01E01.720p.HDTV.x264-DIMENSION",
                "Show.Name.S01E02.HDTV.XviD-AFG",
                "Other.Show.S01E02.720p.HDTV.x264-DIMENSION",
            ],
        )],
        SearchSettings::default(),
    )
    .await;
    let db = &h.ctx.db;
    let show = add_show(db, "Show Name", tv_profile()).await;
    let e1 = add_episode(db, &show, 1, 1, aired(), wanted()).await;
    let e2 = add_episode(db, &show, 1, 2, aired(), wanted()).await;

    let queue = SearchQueue::new(h.ctx.clone());
    queue
        .add_item(SearchKind::Backlog {
            show: show.clone(),
            segment: vec![e1, e2],
        })
        .unwrap();
    queue.run_until_idle().await;

    assert_eq!(
        h.client.names(),
        vec![
            "Show.Name.S01E01.720p.HDTV.x264-DIMENSION".to_string(),
            "Show.Name.S01E02.HDTV.XviD-AFG".to_string(),
        ]
    );

    let e1 = episode_record(db, &show, 1, 1).await;
    assert_eq!(
        e1.composite(),
        CompositeStatus::new(EpisodeStatus::Snatched, Quality::HDTV)
    );
    assert_eq!(e1.release_name.as_deref(), Some("Show.Name.S01E01.720p.HDTV.x264-DIMENSION"));

    let history = db.history().list_for_episode(show.id, EpisodeKey::new(1, 2)).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action().status, EpisodeStatus::Snatched);

    assert_eq!(
        *h.notifier.snatched.lock(),
        vec!["Show Name - S01E01".to_string(), "Show Name - S01E02".to_string()]
    );
}

#[tokio::test]
async fn test_paused_show_is_skipped_by_backlog() {
    let h = harness(
        vec![FakeProvider::new("indexer", &["Show.Name.S01E01.720p.HDTV.x264-GRP"])],
        SearchSettings::default(),
    )
    .await;
    let db = &h.ctx.db;
    let show = add_show(db, "Show Name", tv_profile()).await;
    let e1 = add_episode(db, &show, 1, 1, aired(), wanted()).await;
    db.tv_shows().set_paused(show.id, true).await.unwrap();

    let queue = SearchQueue::new(h.ctx.clone());
    queue
        .add_item(SearchKind::Backlog {
            show,
            segment: vec![e1],
        })
        .unwrap();
    queue.run_until_idle().await;

    assert!(h.client.names().is_empty());
}

#[tokio::test]
async fn test_whole_season_pack_when_every_episode_is_wanted() {
    let provider = FakeProvider::new(
        "indexer",
        &[
            "Show.Name.S01.720p.HDTV.x264-GRP",
            "Show.Name.S01E01.HDTV.x264-LOL",
        ],
    )
    .with_settings(ProviderSettings {
        search_mode: SearchMode::SeasonOnly,
        ..Default::default()
    });
    let h = harness(vec![provider], SearchSettings::default()).await;
    let db = &h.ctx.db;
    let show = add_show(db, "Show Name", tv_profile()).await;
    let e1 = add_episode(db, &show, 1, 1, aired(), wanted()).await;
    let e2 = add_episode(db, &show, 1, 2, aired(), wanted()).await;

    let results = search_providers(&h.ctx, &show, &[e1, e2], false, false).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "Show.Name.S01.720p.HDTV.x264-GRP");
    assert_eq!(
        results[0].episodes,
        vec![EpisodeKey::new(1, 1), EpisodeKey::new(1, 2)]
    );
}

#[tokio::test]
async fn test_later_provider_not_searched_once_results_are_final() {
    let first = FakeProvider::new("first", &["Show.Name.S01E01.720p.HDTV.x264-GRP"]);
    let second = FakeProvider::new("second", &["Show.Name.S01E01.HDTV.x264-LOL"]);
    let h = harness(vec![first, second], SearchSettings::default()).await;
    let db = &h.ctx.db;
    let show = add_show(db, "Show Name", tv_profile()).await;
    let e1 = add_episode(db, &show, 1, 1, aired(), wanted()).await;

    let results = search_providers(&h.ctx, &show, &[e1], false, false).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].provider, "first");
}

#[tokio::test]
async fn test_manual_search_records_outcome() {
    let h = harness(
        vec![FakeProvider::new("indexer", &["Show.Name.S01E03.720p.HDTV.x264-GRP"])],
        SearchSettings::default(),
    )
    .await;
    let db = &h.ctx.db;
    let show = add_show(db, "Show Name", tv_profile()).await;
    let skipped = CompositeStatus::plain(EpisodeStatus::Skipped);
    let e3 = add_episode(db, &show, 1, 3, aired(), skipped).await;
    let e4 = add_episode(db, &show, 1, 4, aired(), skipped).await;

    let queue = SearchQueue::new(h.ctx.clone());
    queue
        .add_item(SearchKind::Manual {
            show: show.clone(),
            episode: e3,
            down_cur_quality: false,
        })
        .unwrap();
    queue
        .add_item(SearchKind::Manual {
            show: show.clone(),
            episode: e4,
            down_cur_quality: false,
        })
        .unwrap();
    queue.run_until_idle().await;

    assert_eq!(h.client.names(), vec!["Show.Name.S01E03.720p.HDTV.x264-GRP".to_string()]);

    let status = queue.manual_search_status(show.id);
    assert_eq!(status.len(), 2);
    assert!(status.iter().all(|s| s.state == ManualSearchState::Finished));
    let outcomes: Vec<_> = status.iter().map(|s| (s.episodes[0].episode, s.success)).collect();
    assert_eq!(outcomes, vec![(3, Some(true)), (4, Some(false))]);

    let titles: Vec<_> = h.ctx.notifications.drain().into_iter().map(|n| n.title).collect();
    assert_eq!(titles, vec!["Episode snatched".to_string(), "No downloads were found".to_string()]);
}

#[tokio::test]
async fn test_failed_download_is_retried_with_another_release() {
    let settings = SearchSettings {
        use_failed_downloads: true,
        ..Default::default()
    };
    let h = harness(
        vec![FakeProvider::new(
            "indexer",
            &[
                "Show.Name.S01E01.720p.HDTV.x264-BROKEN",
                "Show.Name.S01E01.HDTV.x264-LOL",
            ],
        )],
        settings,
    )
    .await;
    let db = &h.ctx.db;
    let show = add_show(db, "Show Name", tv_profile()).await;
    let e1 = add_episode(db, &show, 1, 1, aired(), wanted()).await;

    // The first backlog run snatches the 720p release
    let queue = SearchQueue::new(h.ctx.clone());
    queue
        .add_item(SearchKind::Backlog {
            show: show.clone(),
            segment: vec![e1],
        })
        .unwrap();
    queue.run_until_idle().await;
    assert_eq!(h.client.names(), vec!["Show.Name.S01E01.720p.HDTV.x264-BROKEN".to_string()]);

    let snatched = episode_record(db, &show, 1, 1).await;
    queue
        .add_item(SearchKind::Failed {
            show: show.clone(),
            segment: vec![snatched],
        })
        .unwrap();
    queue.run_until_idle().await;

    assert_eq!(
        h.client.names(),
        vec![
            "Show.Name.S01E01.720p.HDTV.x264-BROKEN".to_string(),
            "Show.Name.S01E01.HDTV.x264-LOL".to_string(),
        ]
    );
    assert!(db.failed().has_failed("show.name.s01e01.720p.hdtv.x264-broken").await.unwrap());

    let e1 = episode_record(db, &show, 1, 1).await;
    assert_eq!(
        e1.composite(),
        CompositeStatus::new(EpisodeStatus::Snatched, Quality::SDTV)
    );

    let actions: Vec<_> = db
        .history()
        .list_for_episode(show.id, EpisodeKey::new(1, 1))
        .await
        .unwrap()
        .iter()
        .map(|h| h.action().status)
        .collect();
    assert_eq!(
        actions,
        vec![EpisodeStatus::Snatched, EpisodeStatus::Failed, EpisodeStatus::Snatched]
    );
}

#[tokio::test]
async fn test_daily_search_uses_provider_feed() {
    let h = harness(
        vec![FakeProvider::new(
            "indexer",
            &[
                "Show.Name.S01E05.720p.HDTV.x264-GRP",
                "Show.Name.S01E06.720p.HDTV.x264-GRP",
                "Show.Name.S01.720p.HDTV.x264-GRP",
            ],
        )],
        SearchSettings::default(),
    )
    .await;
    let db = &h.ctx.db;
    let show = add_show(db, "Show Name", tv_profile()).await;
    let yesterday = Utc::now().date_naive() - chrono::Duration::days(1);
    add_episode(db, &show, 1, 5, yesterday, CompositeStatus::plain(EpisodeStatus::Unaired)).await;
    add_episode(db, &show, 1, 6, aired(), CompositeStatus::plain(EpisodeStatus::Skipped)).await;

    let queue = SearchQueue::new(h.ctx.clone());
    let aired_count = run_daily_search(db, &queue).await.unwrap();
    assert_eq!(aired_count, 1);
    assert!(queue.is_dailysearch_in_progress());

    queue.run_until_idle().await;

    assert_eq!(h.client.names(), vec!["Show.Name.S01E05.720p.HDTV.x264-GRP".to_string()]);
    let e5 = episode_record(db, &show, 1, 5).await;
    assert_eq!(e5.composite().status, EpisodeStatus::Snatched);
}

#[tokio::test]
async fn test_proper_replaces_recent_download() {
    let h = harness(
        vec![FakeProvider::new(
            "indexer",
            &[
                "Show.Name.S01E01.PROPER.720p.HDTV.x264-GRP",
                "Show.Name.S01E01.PROPER.HDTV.x264-LOL",
            ],
        )],
        SearchSettings::default(),
    )
    .await;
    let db = &h.ctx.db;
    let show = add_show(db, "Show Name", tv_profile()).await;
    let today = Utc::now().date_naive();
    let downloaded = CompositeStatus::new(EpisodeStatus::Downloaded, Quality::HDTV);
    add_episode(db, &show, 1, 1, today, downloaded).await;
    db.history()
        .log(NewHistory {
            action: CompositeStatus::new(EpisodeStatus::Snatched, Quality::HDTV),
            show_id: show.id,
            key: EpisodeKey::new(1, 1),
            quality: Quality::HDTV,
            resource: "Show.Name.S01E01.720p.HDTV.x264-GRP",
            provider: "indexer",
            version: -1,
        })
        .await
        .unwrap();

    let propers = find_propers(&h.ctx).await.unwrap();
    assert_eq!(propers.len(), 1);
    assert_eq!(propers[0].name, "Show.Name.S01E01.PROPER.720p.HDTV.x264-GRP");

    let snatched = snatch_propers(&h.ctx, propers).await.unwrap();
    assert_eq!(snatched, 1);

    let e1 = episode_record(db, &show, 1, 1).await;
    assert_eq!(
        e1.composite(),
        CompositeStatus::new(EpisodeStatus::SnatchedProper, Quality::HDTV)
    );

    // The episode is no longer a plain download
    let again = find_propers(&h.ctx).await.unwrap();
    assert!(again.is_empty());
}

/// Season NZB holding the first three episodes of season one
const SEASON_NZB: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
  <file poster="a@b.c" date="1609459200" subject="[1/3] - &quot;Show.Name.S01E01.720p.HDTV.x264-GRP.part01.rar&quot; yEnc (1/1)">
    <groups><group>alt.binaries.tv</group></groups>
    <segments><segment bytes="100" number="1">e1@news</segment></segments>
  </file>
  <file poster="a@b.c" date="1609459200" subject="[2/3] - &quot;Show.Name.S01E02.720p.HDTV.x264-GRP.part01.rar&quot; yEnc (1/1)">
    <groups><group>alt.binaries.tv</group></groups>
    <segments><segment bytes="100" number="1">e2@news</segment></segments>
  </file>
  <file poster="a@b.c" date="1609459200" subject="[3/3] - &quot;Show.Name.S01E03.720p.HDTV.x264-GRP.part01.rar&quot; yEnc (1/1)">
    <groups><group>alt.binaries.tv</group></groups>
    <segments><segment bytes="100" number="1">e3@news</segment></segments>
  </file>
</nzb>
"#;

fn season_provider() -> FakeProvider {
    FakeProvider::new("indexer", &["Show.Name.S01.720p.HDTV.x264-GRP"]).with_settings(ProviderSettings {
        search_mode: SearchMode::SeasonOnly,
        ..Default::default()
    })
}

/// Names of the results for a search of the first `count` episodes of season one
async fn multi_episode_search(releases: &[&str], count: i32) -> Vec<String> {
    let h = harness(vec![FakeProvider::new("indexer", releases)], SearchSettings::default()).await;
    let db = &h.ctx.db;
    let show = add_show(db, "Show Name", tv_profile()).await;
    let mut episodes = Vec::new();
    for episode in 1..=count {
        episodes.push(add_episode(db, &show, 1, episode, aired(), wanted()).await);
    }

    search_providers(&h.ctx, &show, &episodes, false, false)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect()
}

#[tokio::test]
async fn test_multi_episode_result_covered_by_singles_is_dropped() {
    let names = multi_episode_search(
        &[
            "Show.Name.S01E01E02.720p.HDTV.x264-GRP",
            "Show.Name.S01E01.720p.HDTV.x264-ONE",
            "Show.Name.S01E02.720p.HDTV.x264-TWO",
        ],
        2,
    )
    .await;

    assert_eq!(
        names,
        vec![
            "Show.Name.S01E01.720p.HDTV.x264-ONE".to_string(),
            "Show.Name.S01E02.720p.HDTV.x264-TWO".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_needed_multi_episode_result_replaces_singles() {
    let names = multi_episode_search(
        &[
            "Show.Name.S01E01E02.720p.HDTV.x264-GRP",
            "Show.Name.S01E01.720p.HDTV.x264-ONE",
        ],
        2,
    )
    .await;

    assert_eq!(names, vec!["Show.Name.S01E01E02.720p.HDTV.x264-GRP".to_string()]);
}

#[tokio::test]
async fn test_multi_episode_result_superseded_by_wider_one() {
    let names = multi_episode_search(
        &[
            "Show.Name.S01E01E02.720p.HDTV.x264-GRP",
            "Show.Name.S01E01E02E03.720p.HDTV.x264-ALL",
        ],
        3,
    )
    .await;

    assert_eq!(names, vec!["Show.Name.S01E01E02E03.720p.HDTV.x264-ALL".to_string()]);
}

#[tokio::test]
async fn test_partial_season_nzb_is_split_into_episodes() {
    let h = harness(vec![season_provider().with_nzb(SEASON_NZB)], SearchSettings::default()).await;
    let db = &h.ctx.db;
    let show = add_show(db, "Show Name", tv_profile()).await;
    let e1 = add_episode(db, &show, 1, 1, aired(), wanted()).await;
    let e2 = add_episode(db, &show, 1, 2, aired(), wanted()).await;
    let downloaded = CompositeStatus::new(EpisodeStatus::Downloaded, Quality::HDTV);
    add_episode(db, &show, 1, 3, aired(), downloaded).await;

    let queue = SearchQueue::new(h.ctx.clone());
    queue
        .add_item(SearchKind::Backlog {
            show: show.clone(),
            segment: vec![e1, e2],
        })
        .unwrap();
    queue.run_until_idle().await;

    let sent = h.client.sent.lock().clone();
    assert_eq!(
        sent.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        vec!["Show.Name.S01E01.720p.HDTV.x264-GRP", "Show.Name.S01E02.720p.HDTV.x264-GRP"]
    );
    assert!(sent.iter().all(|r| r.result_type == ResultType::NzbData));

    let first = String::from_utf8(sent[0].content.clone().unwrap()).unwrap();
    assert!(first.contains("e1@news"));
    assert!(!first.contains("e2@news"));

    let e1 = episode_record(db, &show, 1, 1).await;
    assert_eq!(e1.composite(), CompositeStatus::new(EpisodeStatus::Snatched, Quality::HDTV));
    let e3 = episode_record(db, &show, 1, 3).await;
    assert_eq!(e3.composite(), downloaded);
}

#[tokio::test]
async fn test_partial_season_torrent_becomes_multi_episode_result() {
    let h = harness(
        vec![season_provider().with_type(ProviderType::Torrent)],
        SearchSettings::default(),
    )
    .await;
    let db = &h.ctx.db;
    let show = add_show(db, "Show Name", tv_profile()).await;
    let e1 = add_episode(db, &show, 1, 1, aired(), wanted()).await;
    let e2 = add_episode(db, &show, 1, 2, aired(), wanted()).await;
    let downloaded = CompositeStatus::new(EpisodeStatus::Downloaded, Quality::HDTV);
    add_episode(db, &show, 1, 3, aired(), downloaded).await;

    let results = search_providers(&h.ctx, &show, &[e1, e2], false, false).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "Show.Name.S01.720p.HDTV.x264-GRP");
    assert_eq!(results[0].provider_type, ProviderType::Torrent);
    assert_eq!(
        results[0].episodes,
        vec![EpisodeKey::new(1, 1), EpisodeKey::new(1, 2), EpisodeKey::new(1, 3)]
    );
}

#[tokio::test]
async fn test_fallback_tries_the_other_mode_once() {
    let provider = FakeProvider::new("indexer", &["Show.Name.S01.720p.HDTV.x264-GRP"]).with_settings(
        ProviderSettings {
            search_fallback: true,
            ..Default::default()
        },
    );
    let seen = provider.queries.clone();
    let h = harness(vec![provider], SearchSettings::default()).await;
    let db = &h.ctx.db;
    let show = add_show(db, "Show Name", tv_profile()).await;
    let e1 = add_episode(db, &show, 1, 1, aired(), wanted()).await;
    let e2 = add_episode(db, &show, 1, 2, aired(), wanted()).await;

    let results = search_providers(&h.ctx, &show, &[e1, e2], false, false).await.unwrap();

    assert_eq!(searched(&seen), vec![(Some(1), Some(1)), (Some(1), Some(2)), (Some(1), None)]);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "Show.Name.S01.720p.HDTV.x264-GRP");
}

#[tokio::test]
async fn test_fallback_stops_after_second_mode() {
    let provider = FakeProvider::new("indexer", &[]).with_settings(ProviderSettings {
        search_fallback: true,
        ..Default::default()
    });
    let seen = provider.queries.clone();
    let h = harness(vec![provider], SearchSettings::default()).await;
    let db = &h.ctx.db;
    let show = add_show(db, "Show Name", tv_profile()).await;
    let e1 = add_episode(db, &show, 1, 1, aired(), wanted()).await;
    let e2 = add_episode(db, &show, 1, 2, aired(), wanted()).await;

    let results = search_providers(&h.ctx, &show, &[e1, e2], false, false).await.unwrap();

    assert!(results.is_empty());
    assert_eq!(searched(&seen), vec![(Some(1), Some(1)), (Some(1), Some(2)), (Some(1), None)]);
}

#[tokio::test]
async fn test_anime_only_provider_skipped_for_regular_show() {
    let anime = FakeProvider::new("anime", &["Show.Name.S01E01.720p.HDTV.x264-SUBS"]).with_settings(
        ProviderSettings {
            anime_only: true,
            ..Default::default()
        },
    );
    let anime_seen = anime.queries.clone();
    let regular = FakeProvider::new("regular", &["Show.Name.S01E01.HDTV.x264-LOL"]);
    let h = harness(vec![anime, regular], SearchSettings::default()).await;
    let db = &h.ctx.db;
    let show = add_show(db, "Show Name", tv_profile()).await;
    let e1 = add_episode(db, &show, 1, 1, aired(), wanted()).await;

    let results = search_providers(&h.ctx, &show, &[e1], false, false).await.unwrap();

    assert!(searched(&anime_seen).is_empty());
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].provider, "regular");
}

/// SD and 720p HDTV allowed, 720p WEB-DL preferred
fn upgrade_profile() -> QualityProfile {
    QualityProfile::new(vec![Quality::SDTV, Quality::HDTV], vec![Quality::HDWEBDL])
}

#[tokio::test]
async fn test_later_provider_upgrades_result() {
    let first = FakeProvider::new("first", &["Show.Name.S01E01.HDTV.x264-LOL"]);
    let second = FakeProvider::new("second", &["Show.Name.S01E01.720p.WEB-DL.DD5.1.H.264-GRP"]);
    let h = harness(vec![first, second], SearchSettings::default()).await;
    let db = &h.ctx.db;
    let show = add_show(db, "Show Name", upgrade_profile()).await;
    let e1 = add_episode(db, &show, 1, 1, aired(), wanted()).await;

    let results = search_providers(&h.ctx, &show, &[e1], false, false).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].provider, "second");
    assert_eq!(results[0].quality, Quality::HDWEBDL);
}

#[tokio::test]
async fn test_later_provider_lower_quality_does_not_replace() {
    let first = FakeProvider::new("first", &["Show.Name.S01E01.720p.HDTV.x264-GRP"]);
    let second = FakeProvider::new("second", &["Show.Name.S01E01.HDTV.x264-LOL"]);
    let h = harness(vec![first, second], SearchSettings::default()).await;
    let db = &h.ctx.db;
    let show = add_show(db, "Show Name", upgrade_profile()).await;
    let e1 = add_episode(db, &show, 1, 1, aired(), wanted()).await;

    let results = search_providers(&h.ctx, &show, &[e1], false, false).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].provider, "first");
    assert_eq!(results[0].quality, Quality::HDTV);
}
