//! Scriptable `MediaSource` stub shared by the pipeline tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::api::{Account, ListSource, MediaItem, MediaSource, MemberSource};
use crate::error::{Error, Result};

#[derive(Default)]
pub(crate) struct StubSource {
    media: Mutex<HashMap<u64, Vec<MediaItem>>>,
    members: Mutex<HashMap<i64, Vec<Account>>>,
    rate_limited: Mutex<HashSet<u64>>,
    failing_fetches: Mutex<HashSet<u64>>,
    panicking_fetches: Mutex<HashSet<u64>>,
    failing_urls: Mutex<HashSet<String>>,
    since_log: Mutex<HashMap<u64, Vec<Option<DateTime<Utc>>>>>,
    downloads: Mutex<Vec<String>>,
}

impl StubSource {
    pub fn with_media(self, account_id: u64, items: Vec<MediaItem>) -> Self {
        self.media.lock().unwrap().insert(account_id, items);
        self
    }

    /// Fetches for this account report HTTP 429.
    pub fn with_rate_limit(self, account_id: u64) -> Self {
        self.rate_limited.lock().unwrap().insert(account_id);
        self
    }

    /// Fetches for this account fail with a generic API error.
    pub fn with_fetch_error(self, account_id: u64) -> Self {
        self.failing_fetches.lock().unwrap().insert(account_id);
        self
    }

    /// Members returned for a list source with this id.
    pub fn with_members(self, source_id: i64, members: Vec<Account>) -> Self {
        self.members.lock().unwrap().insert(source_id, members);
        self
    }

    /// Fetches for this account panic, exercising worker isolation.
    pub fn with_fetch_panic(self, account_id: u64) -> Self {
        self.panicking_fetches.lock().unwrap().insert(account_id);
        self
    }

    /// Downloads of this URL fail.
    pub fn with_failing_url(self, url: &str) -> Self {
        self.failing_urls.lock().unwrap().insert(url.to_string());
        self
    }

    /// The `since` argument of the most recent fetch for an account.
    pub fn last_since(&self, account_id: u64) -> Option<DateTime<Utc>> {
        self.since_log
            .lock()
            .unwrap()
            .get(&account_id)
            .and_then(|calls| calls.last().cloned())
            .flatten()
    }

    /// Number of fetches issued for an account.
    pub fn fetch_count(&self, account_id: u64) -> usize {
        self.since_log
            .lock()
            .unwrap()
            .get(&account_id)
            .map_or(0, Vec::len)
    }

    /// URLs passed to `download_to`, in completion order.
    pub fn downloaded_urls(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemberSource for StubSource {
    async fn fetch_members(&self, source: &ListSource) -> Result<Vec<Account>> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(&source.id())
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl MediaSource for StubSource {
    async fn fetch_media(
        &self,
        account: &Account,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MediaItem>> {
        self.since_log
            .lock()
            .unwrap()
            .entry(account.id)
            .or_default()
            .push(since);

        if self.rate_limited.lock().unwrap().contains(&account.id) {
            return Err(Error::RateLimited {
                path: "/i/api/graphql/UserMedia".to_string(),
            });
        }
        if self.panicking_fetches.lock().unwrap().contains(&account.id) {
            panic!("stubbed fetch panic");
        }
        if self.failing_fetches.lock().unwrap().contains(&account.id) {
            return Err(Error::Api("stubbed fetch failure".to_string()));
        }

        let mut items = self
            .media
            .lock()
            .unwrap()
            .get(&account.id)
            .cloned()
            .unwrap_or_default();
        if let Some(since) = since {
            items.retain(|item| item.created_at > since);
        }
        Ok(items)
    }

    async fn download_to(&self, url: &str, dir: &Path, stem: &str) -> Result<PathBuf> {
        if self.failing_urls.lock().unwrap().contains(url) {
            return Err(Error::Download(format!("stubbed download failure: {}", url)));
        }
        let path = dir.join(format!("{}.bin", stem));
        tokio::fs::write(&path, url.as_bytes()).await?;
        self.downloads.lock().unwrap().push(url.to_string());
        Ok(path)
    }
}
