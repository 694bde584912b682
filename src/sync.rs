//! Change detection on top of [`HoyolabNews`].
//!
//! A poll cycle compares freshly fetched [`FeedItemMeta`] records against the
//! metadata of items the caller already has, then fetches full posts only for
//! ids that are new or whose `last_modified` advanced. Persisting the result
//! is left to the caller.

use crate::error::ApiError;
use crate::hoyolab::HoyolabNews;
use crate::models::{FeedItem, FeedItemCategory, FeedItemMeta};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Types
// ============================================================================

/// What to do when one post of a batch fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    /// Return the first error; requests still in flight are dropped.
    #[default]
    FailFast,
    /// Run every request and report failures next to the successes.
    CollectAll,
}

impl fmt::Display for FetchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchPolicy::FailFast => f.write_str("fail-fast"),
            FetchPolicy::CollectAll => f.write_str("collect-all"),
        }
    }
}

impl FromStr for FetchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-fast" => Ok(FetchPolicy::FailFast),
            "collect-all" => Ok(FetchPolicy::CollectAll),
            other => Err(format!(
                "unknown fetch policy '{other}' (expected fail-fast or collect-all)"
            )),
        }
    }
}

/// Ids that need a full fetch, split by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaDiff {
    /// Ids not seen before
    pub new: Vec<u64>,
    /// Known ids whose `last_modified` moved forward
    pub updated: Vec<u64>,
}

impl MetaDiff {
    /// New ids followed by updated ids.
    pub fn changed_ids(&self) -> Vec<u64> {
        self.new.iter().chain(&self.updated).copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty()
    }
}

/// Result of a batch fetch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Successfully fetched items, in the order the ids were given
    pub items: Vec<FeedItem>,
    /// Ids that failed, with their error (always empty under [`FetchPolicy::FailFast`])
    pub failures: Vec<(u64, ApiError)>,
}

/// Tuning for [`refresh`].
#[derive(Debug, Clone, Copy)]
pub struct RefreshOptions {
    /// Posts requested per category from the list endpoint
    pub page_size: usize,
    pub policy: FetchPolicy,
    /// Maximum full-post requests in flight
    pub concurrency: usize,
    /// Maximum items kept after merging (0 = unlimited)
    pub max_items: usize,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            page_size: 5,
            policy: FetchPolicy::FailFast,
            concurrency: 5,
            max_items: 0,
        }
    }
}

/// Outcome of one poll cycle for a game.
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Merged item list, newest first
    pub items: Vec<FeedItem>,
    pub new: usize,
    pub updated: usize,
    /// Posts that could not be fetched under [`FetchPolicy::CollectAll`]
    pub failures: Vec<(u64, ApiError)>,
}

// ============================================================================
// Operations
// ============================================================================

/// Compares the latest metadata against what the caller already knows.
///
/// Order of both lists in the result follows `latest`.
pub fn diff_metas(previous: &[FeedItemMeta], latest: &[FeedItemMeta]) -> MetaDiff {
    let known: HashMap<u64, DateTime<Utc>> = previous
        .iter()
        .map(|meta| (meta.id, meta.last_modified))
        .collect();

    let mut diff = MetaDiff::default();
    for meta in latest {
        match known.get(&meta.id) {
            None => diff.new.push(meta.id),
            Some(last_modified) if meta.last_modified > *last_modified => {
                diff.updated.push(meta.id)
            }
            Some(_) => {}
        }
    }
    diff
}

/// Collapses metas sharing an id into one, keeping the latest `last_modified`.
///
/// First-seen order is kept. A post listed under several categories would
/// otherwise be counted and fetched once per category.
fn dedup_metas(metas: Vec<FeedItemMeta>) -> Vec<FeedItemMeta> {
    let mut positions: HashMap<u64, usize> = HashMap::with_capacity(metas.len());
    let mut unique: Vec<FeedItemMeta> = Vec::with_capacity(metas.len());
    for meta in metas {
        match positions.get(&meta.id) {
            Some(&pos) => {
                if meta.last_modified > unique[pos].last_modified {
                    unique[pos].last_modified = meta.last_modified;
                }
            }
            None => {
                positions.insert(meta.id, unique.len());
                unique.push(meta);
            }
        }
    }
    unique
}

/// Fetches full items for `ids` with at most `concurrency` requests in flight.
///
/// Items come back in the order of `ids`, not in completion order.
///
/// # Errors
///
/// Under [`FetchPolicy::FailFast`] returns the first error to complete;
/// dropping the stream cancels every request still pending. Under
/// [`FetchPolicy::CollectAll`] this never fails; errors land in
/// [`BatchOutcome::failures`].
pub async fn fetch_feed_items(
    api: &HoyolabNews,
    session: &reqwest::Client,
    ids: &[u64],
    policy: FetchPolicy,
    concurrency: usize,
) -> Result<BatchOutcome, ApiError> {
    if ids.is_empty() {
        return Ok(BatchOutcome::default());
    }

    let mut requests = stream::iter(ids.iter().copied().enumerate())
        .map(|(index, id)| async move { (index, id, api.get_feed_item(session, id).await) })
        .buffer_unordered(concurrency.max(1));

    let mut fetched: Vec<(usize, FeedItem)> = Vec::with_capacity(ids.len());
    let mut failures: Vec<(usize, u64, ApiError)> = Vec::new();

    while let Some((index, id, result)) = requests.next().await {
        match result {
            Ok(item) => fetched.push((index, item)),
            Err(e) if policy == FetchPolicy::FailFast => {
                tracing::warn!(
                    game = %api.game(),
                    post_id = id,
                    error = %e,
                    "Post fetch failed, aborting batch"
                );
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    game = %api.game(),
                    post_id = id,
                    error = %e,
                    "Post fetch failed, continuing batch"
                );
                failures.push((index, id, e));
            }
        }
    }

    fetched.sort_by_key(|(index, _)| *index);
    failures.sort_by_key(|(index, _, _)| *index);

    Ok(BatchOutcome {
        items: fetched.into_iter().map(|(_, item)| item).collect(),
        failures: failures.into_iter().map(|(_, id, e)| (id, e)).collect(),
    })
}

/// Merges freshly fetched items into a previously known list.
///
/// Fetched items replace known items with the same id. The result is sorted by
/// `published` descending (ties by id descending) and cut to `max_items`
/// unless that is 0.
pub fn merge_items(previous: Vec<FeedItem>, fetched: Vec<FeedItem>, max_items: usize) -> Vec<FeedItem> {
    let mut by_id: HashMap<u64, FeedItem> =
        previous.into_iter().map(|item| (item.id, item)).collect();
    for item in fetched {
        by_id.insert(item.id, item);
    }

    let mut items: Vec<FeedItem> = by_id.into_values().collect();
    items.sort_by(|a, b| {
        b.published
            .cmp(&a.published)
            .then_with(|| b.id.cmp(&a.id))
    });
    if max_items > 0 {
        items.truncate(max_items);
    }
    items
}

/// Runs one poll cycle for the client's game over `categories`.
///
/// Latest metadata of every category is compared against the metadata of
/// `previous_items`; only new or updated posts are fetched in full, then
/// merged with `previous_items`.
///
/// # Errors
///
/// Any error of the metadata requests, and the first post error under
/// [`FetchPolicy::FailFast`].
pub async fn refresh(
    api: &HoyolabNews,
    session: &reqwest::Client,
    categories: &[FeedItemCategory],
    previous_items: Vec<FeedItem>,
    options: RefreshOptions,
) -> Result<RefreshReport, ApiError> {
    let mut latest = Vec::new();
    for &category in categories {
        latest.extend(
            api.get_latest_item_metas(session, category, options.page_size)
                .await?,
        );
    }

    let latest = dedup_metas(latest);
    let previous: Vec<FeedItemMeta> = previous_items.iter().map(FeedItem::meta).collect();
    let diff = diff_metas(&previous, &latest);

    if diff.is_empty() {
        tracing::debug!(game = %api.game(), "No new or updated posts");
        return Ok(RefreshReport {
            items: merge_items(previous_items, Vec::new(), options.max_items),
            ..RefreshReport::default()
        });
    }

    let outcome = fetch_feed_items(
        api,
        session,
        &diff.changed_ids(),
        options.policy,
        options.concurrency,
    )
    .await?;

    tracing::info!(
        game = %api.game(),
        new = diff.new.len(),
        updated = diff.updated.len(),
        failed = outcome.failures.len(),
        "Refreshed posts"
    );

    Ok(RefreshReport {
        items: merge_items(previous_items, outcome.items, options.max_items),
        new: diff.new.len(),
        updated: diff.updated.len(),
        failures: outcome.failures,
    })
}

// ============================================================================
// Tests
// ============================================================================
