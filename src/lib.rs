//! Episode search queue and release selection engine for a TV library
//! manager.
//!
//! Searches run one at a time through [`queue::SearchQueue`]; the results of
//! every provider are reconciled into one snatch per episode by the
//! [`search`] module.

pub mod api;
pub mod app;
pub mod clients;
pub mod common;
pub mod config;
pub mod db;
pub mod indexer;
pub mod jobs;
pub mod queue;
pub mod search;
pub mod services;

pub use app::AppState;
