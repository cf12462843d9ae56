//! Domain types and response parsing.
//!
//! The GraphQL timeline payloads are deeply nested and mostly noise; rather
//! than mirror them with serde structs we walk the `serde_json::Value` tree
//! and pull out the handful of fields the mirror cares about. Entries that
//! fail to parse are skipped with a debug log, never fatal.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Error, Result};

/// A tracked account as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: u64,
    pub screen_name: String,
    pub name: String,
    pub friends_count: i64,
    pub protected: bool,
}

impl Account {
    /// Display title used for the on-disk entity directory (pre-sanitation).
    pub fn title(&self) -> String {
        format!("{}(@{})", self.name, self.screen_name)
    }
}

/// An explicit list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListInfo {
    pub id: u64,
    pub name: String,
    pub member_count: i64,
    pub owner_id: u64,
}

/// One timestamped unit of downloadable content belonging to an account.
///
/// Delivered newest-first by the fetch collaborator; a single item may carry
/// several media URLs (multi-photo posts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub urls: Vec<String>,
}

/// Descend into a JSON value along a key path.
fn dig<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

/// Timestamp format used throughout the legacy API payloads.
fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a `user_results` object into an [`Account`].
pub fn parse_user_results(value: &Value) -> Result<Account> {
    let result = value
        .get("result")
        .ok_or_else(|| Error::Api("user_results without result".into()))?;
    let id = dig(result, &["rest_id"])
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| Error::Api("user result without rest_id".into()))?;
    let legacy = result
        .get("legacy")
        .ok_or_else(|| Error::Api("user result without legacy".into()))?;

    Ok(Account {
        id,
        screen_name: legacy
            .get("screen_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        name: legacy
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        friends_count: legacy
            .get("friends_count")
            .and_then(Value::as_i64)
            .unwrap_or(0),
        protected: legacy
            .get("protected")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

/// Parse a `data.list` object into a [`ListInfo`].
pub fn parse_list(value: &Value) -> Result<ListInfo> {
    if value.is_null() {
        return Err(Error::Api("the list doesn't exist".into()));
    }
    let id = value
        .get("id_str")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| Error::Api("list without id_str".into()))?;
    let owner = value
        .get("user_results")
        .map(parse_user_results)
        .transpose()?;

    Ok(ListInfo {
        id,
        name: value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        member_count: value
            .get("member_count")
            .and_then(Value::as_i64)
            .unwrap_or(0),
        owner_id: owner.map(|o| o.id).unwrap_or(0),
    })
}

/// Collect the `itemContent` values of every `TimelineAddEntries` instruction
/// found at `instructions_path`.
fn timeline_item_contents<'a>(root: &'a Value, instructions_path: &[&str]) -> Vec<&'a Value> {
    let mut contents = Vec::new();
    let Some(instructions) = dig(root, instructions_path).and_then(Value::as_array) else {
        return contents;
    };
    for instruction in instructions {
        if instruction.get("type").and_then(Value::as_str) != Some("TimelineAddEntries") {
            continue;
        }
        let Some(entries) = instruction.get("entries").and_then(Value::as_array) else {
            continue;
        };
        for entry in entries {
            if let Some(item) = dig(entry, &["content", "itemContent"]) {
                contents.push(item);
            }
        }
    }
    contents
}

/// Pick the download URL for one media object: highest-bitrate variant for
/// videos and animated GIFs, the direct image URL otherwise.
fn media_download_url(media: &Value) -> Option<String> {
    match media.get("type").and_then(Value::as_str) {
        Some("video") | Some("animated_gif") => {
            let variants = dig(media, &["video_info", "variants"])?.as_array()?;
            variants
                .iter()
                .filter(|v| v.get("content_type").and_then(Value::as_str) == Some("video/mp4"))
                .max_by_key(|v| v.get("bitrate").and_then(Value::as_i64).unwrap_or(0))
                .and_then(|v| v.get("url"))
                .and_then(Value::as_str)
                .map(str::to_string)
        }
        _ => media
            .get("media_url_https")
            .and_then(Value::as_str)
            // Request the original resolution, not the timeline rendition.
            .map(|u| format!("{}?name=orig", u)),
    }
}

/// Parse one `tweet_results` object into a [`MediaItem`], skipping posts
/// without media.
fn parse_tweet_results(value: &Value) -> Option<MediaItem> {
    let result = value.get("result")?;
    // Visibility-wrapped tweets nest the payload one level deeper.
    let result = result.get("tweet").unwrap_or(result);

    let id = result
        .get("rest_id")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<u64>().ok())?;
    let legacy = result.get("legacy")?;
    let created_at = legacy
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(parse_created_at)?;

    let media = dig(legacy, &["extended_entities", "media"])?.as_array()?;
    let urls: Vec<String> = media.iter().filter_map(media_download_url).collect();
    if urls.is_empty() {
        return None;
    }

    Some(MediaItem {
        id,
        created_at,
        urls,
    })
}

/// Extract all media items from a timeline payload, newest first.
pub fn parse_media_items(root: &Value, instructions_path: &[&str]) -> Vec<MediaItem> {
    let mut items: Vec<MediaItem> = timeline_item_contents(root, instructions_path)
        .into_iter()
        .filter_map(|content| {
            let tweet_results = content.get("tweet_results")?;
            let item = parse_tweet_results(tweet_results);
            if item.is_none() {
                tracing::debug!("skipping timeline entry without parsable media");
            }
            item
        })
        .collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items
}

/// Extract member accounts from a members/following timeline payload.
pub fn parse_members(root: &Value, instructions_path: &[&str]) -> Vec<Account> {
    timeline_item_contents(root, instructions_path)
        .into_iter()
        .filter_map(|content| {
            let user_results = content.get("user_results")?;
            match parse_user_results(user_results) {
                Ok(account) => Some(account),
                Err(e) => {
                    tracing::debug!("failed to parse member entry: {}", e);
                    None
                }
            }
        })
        .collect()
}
