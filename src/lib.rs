pub mod analysis;
pub mod catalog;
pub mod chart;
pub mod collector;
pub mod config;
pub mod dates;
pub mod db;
pub mod matching;
pub mod reconcile;

/// Application name for XDG paths
pub const APP_NAME: &str = "chartlink";
