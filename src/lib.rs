//! Client for the HoYoLAB community news API.
//!
//! Fetches news posts for the supported games, maps them into canonical
//! [`models::FeedItem`] records and detects which posts are new or changed
//! since the last poll.
//!
//! - [`hoyolab`] - the API client
//! - [`models`] - games, languages, categories and feed records
//! - [`error`] - classified client errors
//! - [`sync`] - change detection and batch fetching for callers
//! - [`config`] - optional TOML configuration

pub mod config;
pub mod error;
pub mod hoyolab;
pub mod models;
pub mod sync;

pub use error::{ApiError, ErrorKind};
pub use hoyolab::{HoyolabNews, RawPost};
pub use models::{FeedItem, FeedItemCategory, FeedItemMeta, Game, Language};
