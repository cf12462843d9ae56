//! Sources of member account sets.
//!
//! A mirror run is seeded either from an explicit list or from everything an
//! account follows. Both expose an ordered member collection, a stable
//! numeric identifier, and a display title; new variants slot in here without
//! touching the pipeline.

use async_trait::async_trait;

use crate::api::types::{Account, ListInfo};
use crate::error::Result;

/// Something that can resolve a list source to its member accounts.
#[async_trait]
pub trait MemberSource: Send + Sync {
    /// Fetch the member accounts, in delivery order.
    async fn fetch_members(&self, source: &ListSource) -> Result<Vec<Account>>;
}

/// Where the initial account set comes from.
#[derive(Debug, Clone)]
pub enum ListSource {
    /// An explicit, server-side list.
    List(ListInfo),
    /// The set of accounts a user follows.
    FollowingOf(Account),
}

impl ListSource {
    /// Stable identifier. Following-sets use the negated account id so they
    /// can never collide with real list ids.
    pub fn id(&self) -> i64 {
        match self {
            ListSource::List(info) => info.id as i64,
            ListSource::FollowingOf(account) => -(account.id as i64),
        }
    }

    /// Display title used for the on-disk list directory (pre-sanitation).
    pub fn title(&self) -> String {
        match self {
            ListSource::List(info) => format!("{}({})", info.name, info.id),
            ListSource::FollowingOf(account) => {
                format!("{}'s Following", account.screen_name)
            }
        }
    }

    /// Fetch the member accounts, in delivery order.
    pub async fn members<M: MemberSource + ?Sized>(&self, api: &M) -> Result<Vec<Account>> {
        api.fetch_members(self).await
    }
}
