//! Mirror entry points: one account, or a whole list source.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::{Account, ListSource, MediaSource, MemberSource};
use crate::error::Result;
use crate::fs;
use crate::pipeline::batch::{mirror_accounts, PipelineOptions};
use crate::pipeline::download::FailedJob;
use crate::pipeline::memo::RunMemos;
use crate::store::{Db, ListEntityRecord};

/// Mirror a single account into `dir`.
pub async fn mirror_user(
    source: Arc<dyn MediaSource>,
    db: Db,
    account: Account,
    dir: &Path,
    memos: Arc<RunMemos>,
    cancel: CancellationToken,
    options: &PipelineOptions,
) -> Result<Vec<FailedJob>> {
    fs::ensure_dir(dir).await?;
    Ok(mirror_accounts(
        source,
        db,
        vec![account],
        dir.to_path_buf(),
        None,
        memos,
        cancel,
        options,
    )
    .await)
}

/// Mirror every member of a list source.
///
/// The list itself becomes a directory of symlinks under `dir`; member
/// account directories live under `real_dir` so an account shared by several
/// lists is stored once.
#[allow(clippy::too_many_arguments)]
pub async fn mirror_list<S>(
    api: Arc<S>,
    db: Db,
    source: ListSource,
    dir: &Path,
    real_dir: &Path,
    memos: Arc<RunMemos>,
    cancel: CancellationToken,
    options: &PipelineOptions,
) -> Result<Vec<FailedJob>>
where
    S: MediaSource + MemberSource + 'static,
{
    if let ListSource::List(info) = &source {
        db.upsert_list(info).await?;
    }

    fs::ensure_dir(dir).await?;
    fs::ensure_dir(real_dir).await?;
    let list_entity = sync_list_entity(&db, &source, dir).await?;

    let members = source.members(api.as_ref()).await?;
    info!(list = %source.title(), members = members.len(), "mirroring list");
    if members.is_empty() {
        return Ok(Vec::new());
    }

    let media: Arc<dyn MediaSource> = api;
    Ok(mirror_accounts(
        media,
        db,
        members,
        real_dir.to_path_buf(),
        Some(list_entity),
        memos,
        cancel,
        options,
    )
    .await)
}

/// Locate or create the list's directory entity, renaming on title drift.
async fn sync_list_entity(
    db: &Db,
    source: &ListSource,
    dir: &Path,
) -> Result<ListEntityRecord> {
    let title = fs::sanitize_title(&source.title())?;
    let entity = match db.locate_list_entity(source.id(), dir).await? {
        Some(record) if record.title != title => db.rename_list_entity(&record, &title).await?,
        Some(record) => {
            fs::ensure_dir(&record.path()).await?;
            record
        }
        None => {
            let record = db.create_list_entity(source.id(), dir, &title).await?;
            fs::ensure_dir(&record.path()).await?;
            record
        }
    };
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ListInfo, MediaItem};
    use crate::pipeline::testutil::StubSource;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn account(id: u64, screen_name: &str) -> Account {
        Account {
            id,
            screen_name: screen_name.to_string(),
            name: screen_name.to_uppercase(),
            friends_count: 0,
            protected: false,
        }
    }

    fn list_source() -> ListSource {
        ListSource::List(ListInfo {
            id: 9,
            name: "space".to_string(),
            member_count: 2,
            owner_id: 1,
        })
    }

    #[tokio::test]
    async fn mirror_user_downloads_into_its_directory() {
        let root = tempdir().unwrap();
        let db = Db::open_memory().await.unwrap();
        let source = Arc::new(StubSource::default().with_media(
            1,
            vec![MediaItem {
                id: 10,
                created_at: Utc.timestamp_opt(100, 0).unwrap(),
                urls: vec!["https://m/10.jpg".to_string()],
            }],
        ));

        let failures = mirror_user(
            source.clone(),
            db,
            account(1, "nasa"),
            root.path(),
            Arc::new(RunMemos::new()),
            CancellationToken::new(),
            &PipelineOptions::default(),
        )
        .await
        .unwrap();

        assert!(failures.is_empty());
        assert_eq!(source.downloaded_urls().len(), 1);
        assert!(root.path().join("NASA(@nasa)").is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn mirror_list_records_and_links_members() {
        let root = tempdir().unwrap();
        let lists_dir = root.path().join("lists");
        let users_dir = root.path().join("users");
        let db = Db::open_memory().await.unwrap();

        let source = Arc::new(
            StubSource::default()
                .with_members(9, vec![account(1, "nasa"), account(2, "esa")]),
        );

        let failures = mirror_list(
            source,
            db.clone(),
            list_source(),
            &lists_dir,
            &users_dir,
            Arc::new(RunMemos::new()),
            CancellationToken::new(),
            &PipelineOptions::default(),
        )
        .await
        .unwrap();

        assert!(failures.is_empty());
        assert!(db.get_list(9).await.unwrap().is_some());
        let list_path = lists_dir.join("space(9)");
        assert!(list_path.is_dir());
        for title in ["NASA(@nasa)", "ESA(@esa)"] {
            assert!(users_dir.join(title).is_dir());
            assert_eq!(
                tokio::fs::read_link(list_path.join(title)).await.unwrap(),
                users_dir.join(title)
            );
        }
    }

    #[tokio::test]
    async fn list_title_drift_renames_the_directory() {
        let root = tempdir().unwrap();
        let db = Db::open_memory().await.unwrap();

        let old = db
            .create_list_entity(9, root.path(), "old name(9)")
            .await
            .unwrap();
        fs::ensure_dir(&old.path()).await.unwrap();

        let entity = sync_list_entity(&db, &list_source(), root.path())
            .await
            .unwrap();
        assert_eq!(entity.title, "space(9)");
        assert!(root.path().join("space(9)").is_dir());
        assert!(!root.path().join("old name(9)").exists());
    }

    #[tokio::test]
    async fn empty_list_is_a_no_op() {
        let root = tempdir().unwrap();
        let db = Db::open_memory().await.unwrap();
        let source = Arc::new(StubSource::default());

        let failures = mirror_list(
            source,
            db,
            ListSource::FollowingOf(account(7, "solo")),
            root.path(),
            root.path(),
            Arc::new(RunMemos::new()),
            CancellationToken::new(),
            &PipelineOptions::default(),
        )
        .await
        .unwrap();
        assert!(failures.is_empty());
        // The list directory itself still exists for next time.
        assert!(root.path().join("solo's Following").is_dir());
    }
}
