//! HoYoLAB news API client.
//!
//! - [`client`] - request construction, envelope validation and error classification
//! - [`mapping`] - typed decoding of raw post records into [`FeedItem`](crate::models::FeedItem)
//!   and [`FeedItemMeta`](crate::models::FeedItemMeta)
//!
//! # Example
//!
//! ```ignore
//! use hoyolab_news::hoyolab::HoyolabNews;
//! use hoyolab_news::models::{FeedItemCategory, Game};
//!
//! let session = reqwest::Client::new();
//! let api = HoyolabNews::new(Game::Genshin, None);
//!
//! let metas = api.get_latest_item_metas(&session, FeedItemCategory::Info, 5).await?;
//! for meta in metas {
//!     let item = api.get_feed_item(&session, meta.id).await?;
//! }
//! ```

mod client;
mod mapping;

pub use client::{ClientBuildError, HoyolabNews, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use mapping::RawPost;
