//! Typed decoding of raw post records into canonical feed records.
//!
//! The client only checks the response envelope. Field-level decoding happens
//! here, so a missing or mistyped leaf surfaces as [`ApiError::Mapping`]
//! instead of a panic deep inside the caller.

use crate::error::ApiError;
use crate::models::{FeedItem, FeedItemCategory, FeedItemMeta};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

/// A post record exactly as the API delivered it.
///
/// Returned by `get_post` (full record) and `get_news_list` (summaries).
/// Both share the `{ post: {...}, last_modify_time, ... }` layout.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPost(Value);

impl RawPost {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn into_value(self) -> Value {
        self.0
    }

    /// Change-detection metadata from a summary or full record.
    ///
    /// `last_modified` is the later of `created_at` and `last_modify_time`;
    /// a `last_modify_time` of 0 means the post was never modified.
    pub fn to_meta(&self) -> Result<FeedItemMeta, ApiError> {
        let summary = SummaryDto::deserialize(&self.0)
            .map_err(|e| ApiError::Mapping(format!("invalid post summary: {e}")))?;

        let id = summary.post.post_id.to_id()?;
        let created_at = summary.post.created_at;
        let last_modified = match summary.last_modify_time {
            Some(modified) if modified > 0 => created_at.max(modified),
            _ => created_at,
        };

        Ok(FeedItemMeta {
            id,
            last_modified: timestamp(last_modified, "created_at")?,
        })
    }

    /// Canonical feed item from a full post record.
    pub fn to_feed_item(&self) -> Result<FeedItem, ApiError> {
        let record = PostRecordDto::deserialize(&self.0)
            .map_err(|e| ApiError::Mapping(format!("invalid post record: {e}")))?;

        let id = record.post.post_id.to_id()?;
        let category = FeedItemCategory::try_from(record.post.official_type)
            .map_err(|e| ApiError::Mapping(format!("post {id}: {e}")))?;
        let author = record
            .user
            .map(|user| user.nickname)
            .ok_or_else(|| ApiError::Mapping(format!("post {id}: missing user.nickname")))?;

        let published = timestamp(record.post.created_at, "created_at")?;
        let updated = match record.last_modify_time {
            Some(modified) if modified > 0 => timestamp(modified, "last_modify_time")?,
            _ => published,
        };

        let image = match record
            .image_list
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|image| image.url)
        {
            Some(raw) if !raw.trim().is_empty() => Some(
                Url::parse(&raw)
                    .map_err(|e| ApiError::Mapping(format!("post {id}: invalid image URL: {e}")))?,
            ),
            _ => None,
        };

        Ok(FeedItem {
            id,
            title: record.post.subject,
            author,
            content: record.post.content,
            category,
            published,
            updated,
            image,
        })
    }
}

fn timestamp(secs: i64, field: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| ApiError::Mapping(format!("{field} out of range: {secs}")))
}

// ============================================================================
// Wire DTOs
// ============================================================================

/// Post ids come as strings from most endpoints but as numbers from some.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PostIdDto {
    Number(u64),
    Text(String),
}

impl PostIdDto {
    fn to_id(&self) -> Result<u64, ApiError> {
        match self {
            PostIdDto::Number(id) => Ok(*id),
            PostIdDto::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| ApiError::Mapping(format!("post_id is not an integer: {text:?}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SummaryDto {
    post: SummaryPostDto,
    #[serde(default)]
    last_modify_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SummaryPostDto {
    post_id: PostIdDto,
    created_at: i64,
}

#[derive(Debug, Deserialize)]
struct PostRecordDto {
    post: PostDto,
    #[serde(default)]
    user: Option<UserDto>,
    #[serde(default)]
    image_list: Option<Vec<ImageDto>>,
    #[serde(default)]
    last_modify_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PostDto {
    post_id: PostIdDto,
    subject: String,
    content: String,
    official_type: u32,
    created_at: i64,
}

#[derive(Debug, Deserialize)]
struct UserDto {
    nickname: String,
}

#[derive(Debug, Deserialize)]
struct ImageDto {
    url: String,
}

// ============================================================================
// Tests
// ============================================================================
