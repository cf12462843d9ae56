//! Authenticated API surface and the `MediaSource` seam.
//!
//! The pipeline consumes the narrow [`MediaSource`] trait rather than
//! [`XApi`] directly so tests can substitute a stub for the network.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde_json::json;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::api::auth::session_headers;
use crate::api::client::XClient;
use crate::api::list::ListSource;
use crate::api::rate_limit::RateLimiter;
use crate::api::types::{
    parse_list, parse_media_items, parse_members, parse_user_results, Account, ListInfo, MediaItem,
};
use crate::error::{Error, Result};

/// Endpoint used to verify the session at login.
const SETTINGS_URL: &str = "https://api.x.com/1.1/account/settings.json";

/// GraphQL API root.
const GRAPHQL_BASE: &str = "https://x.com/i/api/graphql";

/// Media items requested per fetch. Pagination is out of scope; the fetch
/// collaborator delivers one ordered batch.
const MEDIA_BATCH: u32 = 100;

const MEDIA_INSTRUCTIONS: &[&str] = &[
    "data",
    "user",
    "result",
    "timeline_v2",
    "timeline",
    "instructions",
];
const MEMBERS_INSTRUCTIONS: &[&str] =
    &["data", "list", "members_timeline", "timeline", "instructions"];
const FOLLOWING_INSTRUCTIONS: &[&str] = &[
    "data",
    "user",
    "result",
    "timeline",
    "timeline",
    "instructions",
];

/// Client knobs surfaced through the config file.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub retry_count: u32,
    pub reserve_fraction: f64,
    pub probe_failure_limit: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            retry_count: 5,
            reserve_fraction: 0.01,
            probe_failure_limit: 5,
        }
    }
}

/// Source of media timelines and downloadable bytes.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Fetch media items newer than `since`, newest first.
    async fn fetch_media(
        &self,
        account: &Account,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MediaItem>>;

    /// Download one media URL into `dir` as `stem` plus an extension derived
    /// from the URL or the response. Returns the written path.
    async fn download_to(&self, url: &str, dir: &Path, stem: &str) -> Result<PathBuf>;
}

/// Authenticated API client.
pub struct XApi {
    client: XClient,
}

impl XApi {
    /// Build a session from browser credentials and verify it, returning the
    /// logged-in screen name.
    pub async fn login(
        cookie: &str,
        auth_token: &str,
        options: &ClientOptions,
    ) -> Result<(Self, String)> {
        let headers = session_headers(cookie, auth_token)?;
        let limiter = Arc::new(RateLimiter::new(
            options.reserve_fraction,
            options.probe_failure_limit,
        ));
        let client = XClient::new(headers, limiter, options.retry_count)?;
        let api = XApi { client };

        let settings = api.client.get_json(&Url::parse(SETTINGS_URL)?).await?;
        let screen_name = settings
            .get("screen_name")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::Authentication("settings response has no screen_name".into()))?
            .to_string();
        Ok((api, screen_name))
    }

    fn graphql_url(operation: &str, variables: serde_json::Value) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}", GRAPHQL_BASE, operation))?;
        url.query_pairs_mut()
            .append_pair("variables", &variables.to_string());
        Ok(url)
    }

    /// Look an account up by handle.
    pub async fn get_user_by_screen_name(&self, screen_name: &str) -> Result<Account> {
        let url = Self::graphql_url(
            "qW5u-DAuXpMEG0zA1F7UGQ/UserByScreenName",
            json!({"screen_name": screen_name}),
        )?;
        let body = self.client.get_json(&url).await?;
        let user = body
            .get("data")
            .and_then(|d| d.get("user"))
            .filter(|u| !u.is_null())
            .ok_or_else(|| Error::AccountNotFound(screen_name.to_string()))?;
        parse_user_results(user)
    }

    /// Look an explicit list up by id.
    pub async fn get_list(&self, id: u64) -> Result<ListInfo> {
        let url = Self::graphql_url(
            "ZMKtNFkd-2A0Jit23P2sBQ/ListByRestId",
            json!({"listId": id.to_string()}),
        )?;
        let body = self.client.get_json(&url).await?;
        let list = body
            .get("data")
            .and_then(|d| d.get("list"))
            .ok_or(Error::ListNotFound(id))?;
        parse_list(list)
    }

}

#[async_trait]
impl crate::api::list::MemberSource for XApi {
    async fn fetch_members(&self, source: &ListSource) -> Result<Vec<Account>> {
        let (url, instructions): (Url, &[&str]) = match source {
            ListSource::List(info) => (
                Self::graphql_url(
                    "tA7h9hy4U0Yc9NSe3IWVpA/ListMembers",
                    json!({"listId": info.id.to_string(), "count": 200}),
                )?,
                MEMBERS_INSTRUCTIONS,
            ),
            ListSource::FollowingOf(account) => (
                Self::graphql_url(
                    "t-BPOrMIduGUJWO_LxcvNQ/Following",
                    json!({"userId": account.id.to_string(), "count": 200}),
                )?,
                FOLLOWING_INSTRUCTIONS,
            ),
        };
        let body = self.client.get_json(&url).await?;
        Ok(parse_members(&body, instructions))
    }
}

/// Derive a file extension: URL path first, response content type second.
fn extension_for(url: &Url, content_type: Option<&str>) -> String {
    if let Some(ext) = Path::new(url.path()).extension().and_then(|e| e.to_str()) {
        return ext.to_ascii_lowercase();
    }
    content_type
        .and_then(|ct| mime_guess::get_mime_extensions_str(ct))
        .and_then(|exts| exts.first())
        .map(|ext| ext.to_string())
        .unwrap_or_else(|| "bin".to_string())
}

#[async_trait]
impl MediaSource for XApi {
    async fn fetch_media(
        &self,
        account: &Account,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MediaItem>> {
        let url = Self::graphql_url(
            "HaouMjBviBKKTYZGV_9qJg/UserMedia",
            json!({
                "userId": account.id.to_string(),
                "count": MEDIA_BATCH,
                "includePromotedContent": false,
            }),
        )?;
        let body = self.client.get_json(&url).await?;
        let mut items = parse_media_items(&body, MEDIA_INSTRUCTIONS);
        if let Some(since) = since {
            items.retain(|item| item.created_at > since);
        }
        Ok(items)
    }

    async fn download_to(&self, url: &str, dir: &Path, stem: &str) -> Result<PathBuf> {
        let url = Url::parse(url)?;
        let response = self.client.get(&url).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let path = dir.join(format!(
            "{}.{}",
            stem,
            extension_for(&url, content_type.as_deref())
        ));

        let mut file = File::create(&path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Download(format!("stream error: {}", e)))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_prefers_url_path() {
        let url = Url::parse("https://pbs.twimg.com/media/a.JPG?name=orig").unwrap();
        assert_eq!(extension_for(&url, Some("image/png")), "jpg");
    }

    #[test]
    fn extension_falls_back_to_content_type() {
        let url = Url::parse("https://video.twimg.com/stream/xyz").unwrap();
        assert_eq!(extension_for(&url, Some("video/mp4")), "mp4");
        assert_eq!(extension_for(&url, None), "bin");
    }

    #[test]
    fn graphql_url_carries_variables() {
        let url = XApi::graphql_url("op/Name", json!({"id": "5"})).unwrap();
        assert!(url.as_str().starts_with(GRAPHQL_BASE));
        assert!(url.query().unwrap().contains("variables="));
    }
}
