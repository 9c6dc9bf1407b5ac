//! External service integrations

pub mod filename_parser;
pub mod notifications;
pub mod tvmaze;

pub use filename_parser::{ParsedRelease, normalize_show_name, parse_release, show_name_matches};
pub use notifications::{LogNotifier, NotificationKind, NotificationService, Notifier, UiNotification};
pub use tvmaze::{EpisodeMetadata, MetadataSource, ShowMetadata, TvMazeClient};
