//! Media fetch stage.
//!
//! Asks the source for items newer than the entity's watermark. On a
//! non-empty result the watermark is persisted before any download job is
//! enqueued: each item is fetched at most once, and a crash between the
//! persist and the download finishing loses those items rather than
//! re-fetching the whole window.

use crate::api::{Account, MediaItem, MediaSource};
use crate::error::Result;
use crate::store::EntityHandle;

/// Fetch new items for one entity and advance the watermark.
///
/// Items come back newest first; the first item's creation time is the new
/// watermark. An empty result leaves the watermark alone.
pub(crate) async fn fetch_new_items(
    source: &dyn MediaSource,
    account: &Account,
    entity: &EntityHandle,
) -> Result<Vec<MediaItem>> {
    let items = source.fetch_media(account, entity.watermark()).await?;
    if let Some(newest) = items.first() {
        entity.set_watermark(newest.created_at).await?;
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::pipeline::testutil::StubSource;
    use crate::store::Db;
    use chrono::TimeZone;
    use std::path::Path;

    fn account(id: u64) -> Account {
        Account {
            id,
            screen_name: format!("a{}", id),
            name: format!("A{}", id),
            friends_count: 0,
            protected: false,
        }
    }

    fn item(id: u64, secs: i64) -> MediaItem {
        MediaItem {
            id,
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            urls: vec![format!("https://pbs.twimg.com/media/{}.jpg", id)],
        }
    }

    #[tokio::test]
    async fn watermark_moves_to_newest_before_return() {
        let db = Db::open_memory().await.unwrap();
        let record = db.create_entity(1, Path::new("/m"), "A1(@a1)").await.unwrap();
        let entity = EntityHandle::new(db.clone(), record);

        let source = StubSource::default().with_media(1, vec![item(11, 200), item(10, 100)]);
        let items = fetch_new_items(&source, &account(1), &entity).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(entity.watermark().unwrap().timestamp(), 200);

        // Persisted, not just in memory.
        let reloaded = db.locate_entity(1, Path::new("/m")).await.unwrap().unwrap();
        assert_eq!(reloaded.latest_release_at.unwrap().timestamp(), 200);
    }

    #[tokio::test]
    async fn empty_result_keeps_the_watermark() {
        let db = Db::open_memory().await.unwrap();
        let record = db.create_entity(1, Path::new("/m"), "A1(@a1)").await.unwrap();
        let entity = EntityHandle::new(db.clone(), record);
        entity
            .set_watermark(Utc.timestamp_opt(500, 0).unwrap())
            .await
            .unwrap();

        let source = StubSource::default();
        let items = fetch_new_items(&source, &account(1), &entity).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(entity.watermark().unwrap().timestamp(), 500);
    }

    #[tokio::test]
    async fn since_is_the_current_watermark() {
        let db = Db::open_memory().await.unwrap();
        let record = db.create_entity(1, Path::new("/m"), "A1(@a1)").await.unwrap();
        let entity = EntityHandle::new(db.clone(), record);
        entity
            .set_watermark(Utc.timestamp_opt(150, 0).unwrap())
            .await
            .unwrap();

        let source = StubSource::default().with_media(1, vec![item(11, 200), item(10, 100)]);
        fetch_new_items(&source, &account(1), &entity).await.unwrap();
        assert_eq!(
            source.last_since(1).unwrap().timestamp(),
            150,
        );
    }
}
