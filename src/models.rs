//! Domain model: supported games, locales, categories and the canonical feed records.
//!
//! Games and categories are closed enums with an explicit lookup table to the
//! numeric codes HoYoLAB uses, so an unknown upstream code is a detectable error
//! instead of a silently accepted value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by the code and name lookup tables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Numeric upstream code with no matching variant
    #[error("Unknown {what} code: {code}")]
    UnknownCode { what: &'static str, code: u32 },
    /// Name that does not match any variant
    #[error("Unknown {what}: {name}")]
    UnknownName { what: &'static str, name: String },
}

// ============================================================================
// Game
// ============================================================================

/// A game with its own news section on HoYoLAB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Game {
    Honkai,
    Genshin,
    Themis,
    StarRail,
    Zenless,
}

impl Game {
    pub const ALL: [Game; 5] = [
        Game::Honkai,
        Game::Genshin,
        Game::Themis,
        Game::StarRail,
        Game::Zenless,
    ];

    /// Upstream game identifier (`gids` query parameter).
    pub fn gid(self) -> u32 {
        match self {
            Game::Honkai => 1,
            Game::Genshin => 2,
            Game::Themis => 4,
            Game::StarRail => 6,
            Game::Zenless => 8,
        }
    }

    pub fn try_from_gid(gid: u32) -> Result<Self, ModelError> {
        Self::ALL
            .into_iter()
            .find(|game| game.gid() == gid)
            .ok_or(ModelError::UnknownCode {
                what: "game",
                code: gid,
            })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Game::Honkai => "honkai",
            Game::Genshin => "genshin",
            Game::Themis => "themis",
            Game::StarRail => "starrail",
            Game::Zenless => "zenless",
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Game {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|game| game.as_str() == lowered)
            .ok_or_else(|| ModelError::UnknownName {
                what: "game",
                name: s.to_owned(),
            })
    }
}

// ============================================================================
// Language
// ============================================================================

/// Response language, sent to HoYoLAB as the `x-rpc-language` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "de-de")]
    German,
    #[default]
    #[serde(rename = "en-us")]
    English,
    #[serde(rename = "es-es")]
    Spanish,
    #[serde(rename = "fr-fr")]
    French,
    #[serde(rename = "id-id")]
    Indonesian,
    #[serde(rename = "it-it")]
    Italian,
    #[serde(rename = "ja-jp")]
    Japanese,
    #[serde(rename = "ko-kr")]
    Korean,
    #[serde(rename = "pt-pt")]
    Portuguese,
    #[serde(rename = "ru-ru")]
    Russian,
    #[serde(rename = "th-th")]
    Thai,
    #[serde(rename = "tr-tr")]
    Turkish,
    #[serde(rename = "vi-vn")]
    Vietnamese,
    #[serde(rename = "zh-cn")]
    ChineseSimplified,
    #[serde(rename = "zh-tw")]
    ChineseTraditional,
}

impl Language {
    pub const ALL: [Language; 15] = [
        Language::German,
        Language::English,
        Language::Spanish,
        Language::French,
        Language::Indonesian,
        Language::Italian,
        Language::Japanese,
        Language::Korean,
        Language::Portuguese,
        Language::Russian,
        Language::Thai,
        Language::Turkish,
        Language::Vietnamese,
        Language::ChineseSimplified,
        Language::ChineseTraditional,
    ];

    /// Locale code understood by the upstream API.
    pub fn code(self) -> &'static str {
        match self {
            Language::German => "de-de",
            Language::English => "en-us",
            Language::Spanish => "es-es",
            Language::French => "fr-fr",
            Language::Indonesian => "id-id",
            Language::Italian => "it-it",
            Language::Japanese => "ja-jp",
            Language::Korean => "ko-kr",
            Language::Portuguese => "pt-pt",
            Language::Russian => "ru-ru",
            Language::Thai => "th-th",
            Language::Turkish => "tr-tr",
            Language::Vietnamese => "vi-vn",
            Language::ChineseSimplified => "zh-cn",
            Language::ChineseTraditional => "zh-tw",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|language| language.code() == lowered)
            .ok_or_else(|| ModelError::UnknownName {
                what: "language",
                name: s.to_owned(),
            })
    }
}

// ============================================================================
// FeedItemCategory
// ============================================================================

/// News category, mapped to the upstream `official_type` / `type` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedItemCategory {
    Notices,
    Events,
    Info,
}

impl FeedItemCategory {
    pub const ALL: [FeedItemCategory; 3] = [
        FeedItemCategory::Notices,
        FeedItemCategory::Events,
        FeedItemCategory::Info,
    ];

    pub fn code(self) -> u32 {
        match self {
            FeedItemCategory::Notices => 1,
            FeedItemCategory::Events => 2,
            FeedItemCategory::Info => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedItemCategory::Notices => "notices",
            FeedItemCategory::Events => "events",
            FeedItemCategory::Info => "info",
        }
    }
}

impl TryFrom<u32> for FeedItemCategory {
    type Error = ModelError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|category| category.code() == code)
            .ok_or(ModelError::UnknownCode {
                what: "category",
                code,
            })
    }
}

impl fmt::Display for FeedItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedItemCategory {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "notices" | "notice" => Ok(FeedItemCategory::Notices),
            "events" | "event" => Ok(FeedItemCategory::Events),
            "info" => Ok(FeedItemCategory::Info),
            _ => Err(ModelError::UnknownName {
                what: "category",
                name: s.to_owned(),
            }),
        }
    }
}

// ============================================================================
// Feed records
// ============================================================================

/// Minimal record used to tell whether a post is new or changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedItemMeta {
    pub id: u64,
    pub last_modified: DateTime<Utc>,
}

/// Canonical representation of a news post, independent of the upstream schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: u64,
    pub title: String,
    pub author: String,
    /// Post body as HTML, exactly as delivered upstream.
    pub content: String,
    pub category: FeedItemCategory,
    pub published: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub image: Option<Url>,
}

impl FeedItem {
    /// Change-detection record for an item that is already stored.
    ///
    /// Uses the later of `published` and `updated`, matching how metadata is
    /// derived from list summaries.
    pub fn meta(&self) -> FeedItemMeta {
        FeedItemMeta {
            id: self.id,
            last_modified: self.published.max(self.updated),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
