//! Entity sync stage.
//!
//! Brings one account's database row and directory up to date: upsert the
//! account, locate or create its entity under the mirror directory, rename
//! the directory when the display title drifted, re-point existing member
//! symlinks, and (when scoped to a list) create this list's symlink.

use std::sync::Arc;

use tracing::warn;

use crate::api::Account;
use crate::error::Result;
use crate::fs;
use crate::pipeline::memo::RunMemos;
use crate::store::{Db, EntityHandle, ListEntityRecord};

/// Sync one account. Returns the entity only when this call performed the
/// sync; a memo hit returns `None` so the account is not re-emitted to the
/// fetch stage.
pub(crate) async fn sync_account(
    db: &Db,
    account: &Account,
    dir: &std::path::Path,
    list_entity: Option<&ListEntityRecord>,
    memos: &RunMemos,
) -> Result<Option<Arc<EntityHandle>>> {
    let title = fs::sanitize_title(&account.title())?;

    if let Some(entity) = memos.entity_for(account.id) {
        // Already synced this run; only the list link may still be missing.
        if let Some(list_entity) = list_entity {
            ensure_member_link(db, memos, list_entity, &entity).await?;
        }
        return Ok(None);
    }

    db.upsert_account(account).await?;

    let entity = match db.locate_entity(account.id, dir).await? {
        Some(record) => {
            let entity = Arc::new(EntityHandle::new(db.clone(), record));
            if entity.title() != title {
                entity.rename(&title).await?;
            } else {
                fs::ensure_dir(&entity.path()).await?;
            }
            entity
        }
        None => {
            let record = db.create_entity(account.id, dir, &title).await?;
            let entity = Arc::new(EntityHandle::new(db.clone(), record));
            fs::ensure_dir(&entity.path()).await?;
            entity
        }
    };

    memos.record_entity(account.id, entity.clone());
    repoint_links(db, &entity).await;

    if let Some(list_entity) = list_entity {
        ensure_member_link(db, memos, list_entity, &entity).await?;
    }

    Ok(Some(entity))
}

/// Re-point every recorded symlink at this account's current directory.
/// Link maintenance failures never fail the sync; the mirror itself is fine.
async fn repoint_links(db: &Db, entity: &EntityHandle) {
    let links = match db.links_targeting(entity.account_id).await {
        Ok(links) => links,
        Err(err) => {
            warn!(account_id = entity.account_id, error = %err, "could not load member links");
            return;
        }
    };

    let title = entity.title();
    for link in links {
        let result = async {
            let Some(list_entity) = db.list_entity_by_id(link.list_entity_id).await? else {
                return Ok(());
            };
            let stale = list_entity.path().join(&link.name);
            if link.name != title && tokio::fs::symlink_metadata(&stale).await.is_ok() {
                tokio::fs::remove_file(&stale).await?;
            }
            fs::create_symlink(&entity.path(), &list_entity.path().join(&title)).await?;
            db.update_link_name(link.id, &title).await
        }
        .await;

        if let Err(err) = result {
            warn!(account_id = entity.account_id, link = link.id, error = %err,
                "could not re-point member link");
        }
    }
}

/// Create the member symlink for the current list, at most once per
/// (list, account) pair per run.
async fn ensure_member_link(
    db: &Db,
    memos: &RunMemos,
    list_entity: &ListEntityRecord,
    entity: &EntityHandle,
) -> Result<()> {
    if !memos.claim_link(list_entity.id, entity.account_id) {
        return Ok(());
    }
    let title = entity.title();
    fs::create_symlink(&entity.path(), &list_entity.path().join(&title)).await?;
    db.create_link(list_entity.id, entity.account_id, &title).await
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[tokio::test]
    async fn first_sync_creates_row_and_directory() {
        let root = tempdir().unwrap();
        let db = Db::open_memory().await.unwrap();
        let memos = RunMemos::new();

        let entity = sync_account(&db, &account(1, "nasa"), root.path(), None, &memos)
            .await
            .unwrap()
            .expect("fresh account is emitted");

        assert_eq!(entity.title(), "NASA(@nasa)");
        assert!(entity.path().is_dir());
        assert!(db.get_account(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn memo_hit_is_not_re_emitted() {
        let root = tempdir().unwrap();
        let db = Db::open_memory().await.unwrap();
        let memos = RunMemos::new();
        let acc = account(1, "nasa");

        assert!(sync_account(&db, &acc, root.path(), None, &memos)
            .await
            .unwrap()
            .is_some());
        assert!(sync_account(&db, &acc, root.path(), None, &memos)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn title_drift_renames_the_directory() {
        let root = tempdir().unwrap();
        let db = Db::open_memory().await.unwrap();

        // Prior run stored the old handle.
        sync_account(&db, &account(1, "old"), root.path(), None, &RunMemos::new())
            .await
            .unwrap();
        assert!(root.path().join("OLD(@old)").is_dir());

        sync_account(&db, &account(1, "new"), root.path(), None, &RunMemos::new())
            .await
            .unwrap();
        assert!(root.path().join("NEW(@new)").is_dir());
        assert!(!root.path().join("OLD(@old)").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn list_scope_creates_one_symlink() {
        let root = tempdir().unwrap();
        let db = Db::open_memory().await.unwrap();
        let memos = RunMemos::new();

        let list_dir = root.path().join("lists");
        fs::ensure_dir(&list_dir).await.unwrap();
        let list_entity = db.create_list_entity(9, &list_dir, "space(9)").await.unwrap();
        fs::ensure_dir(&list_entity.path()).await.unwrap();

        let acc = account(1, "nasa");
        sync_account(&db, &acc, root.path(), Some(&list_entity), &memos)
            .await
            .unwrap();
        // Memo hit still may not create a second link.
        sync_account(&db, &acc, root.path(), Some(&list_entity), &memos)
            .await
            .unwrap();

        let link = list_entity.path().join("NASA(@nasa)");
        assert!(tokio::fs::symlink_metadata(&link).await.is_ok());
        assert_eq!(db.links_targeting(1).await.unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn rename_re_points_recorded_links() {
        let root = tempdir().unwrap();
        let db = Db::open_memory().await.unwrap();

        let list_dir = root.path().join("lists");
        fs::ensure_dir(&list_dir).await.unwrap();
        let list_entity = db.create_list_entity(9, &list_dir, "space(9)").await.unwrap();
        fs::ensure_dir(&list_entity.path()).await.unwrap();

        sync_account(&db, &account(1, "old"), root.path(), Some(&list_entity), &RunMemos::new())
            .await
            .unwrap();

        // Next run: the account was renamed upstream.
        sync_account(&db, &account(1, "new"), root.path(), Some(&list_entity), &RunMemos::new())
            .await
            .unwrap();

        let links = db.links_targeting(1).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].name, "NEW(@new)");
        let link = list_entity.path().join("NEW(@new)");
        assert_eq!(
            tokio::fs::read_link(&link).await.unwrap(),
            root.path().join("NEW(@new)")
        );
        assert!(!list_entity.path().join("OLD(@old)").exists());
    }
}
