//! List records, list mirror directories, and member symlink bookkeeping.
//!
//! A list entity is the on-disk directory of one list source; inside it each
//! member account gets a symlink pointing at the account's own entity
//! directory. Link rows remember which symlinks exist so renames can re-point
//! them.

use std::path::PathBuf;

use sqlx::Row;

use crate::api::ListInfo;
use crate::error::Result;
use crate::store::db::Db;

/// One row of the `list_entities` table.
#[derive(Debug, Clone)]
pub struct ListEntityRecord {
    pub id: i64,
    pub list_id: i64,
    pub parent_dir: PathBuf,
    pub title: String,
}

impl ListEntityRecord {
    /// The list directory: parent dir joined with the title.
    pub fn path(&self) -> PathBuf {
        self.parent_dir.join(&self.title)
    }
}

/// One row of the `links` table: a member symlink inside a list directory.
#[derive(Debug, Clone)]
pub struct LinkRecord {
    pub id: i64,
    pub list_entity_id: i64,
    pub account_id: u64,
    pub name: String,
}

fn row_to_list_entity(row: sqlx::sqlite::SqliteRow) -> ListEntityRecord {
    ListEntityRecord {
        id: row.get("id"),
        list_id: row.get("list_id"),
        parent_dir: PathBuf::from(row.get::<String, _>("parent_dir")),
        title: row.get("title"),
    }
}

impl Db {
    /// Fetch a list row by id.
    pub async fn get_list(&self, id: u64) -> Result<Option<ListInfo>> {
        let row = sqlx::query("SELECT id, name, owner_id FROM lists WHERE id = ?1")
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| ListInfo {
            id: row.get::<i64, _>("id") as u64,
            name: row.get("name"),
            member_count: 0,
            owner_id: row.get::<i64, _>("owner_id") as u64,
        }))
    }

    /// Insert or refresh a list row.
    pub async fn upsert_list(&self, list: &ListInfo) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lists (id, name, owner_id)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                owner_id = excluded.owner_id
            "#,
        )
        .bind(list.id as i64)
        .bind(&list.name)
        .bind(list.owner_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Find the entity of a list source under a parent directory.
    pub async fn locate_list_entity(
        &self,
        list_id: i64,
        parent_dir: &std::path::Path,
    ) -> Result<Option<ListEntityRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, list_id, parent_dir, title
            FROM list_entities
            WHERE list_id = ?1 AND parent_dir = ?2
            "#,
        )
        .bind(list_id)
        .bind(parent_dir.to_string_lossy().as_ref())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_list_entity))
    }

    /// Fetch a list entity row by primary key.
    pub async fn list_entity_by_id(&self, id: i64) -> Result<Option<ListEntityRecord>> {
        let row = sqlx::query(
            "SELECT id, list_id, parent_dir, title FROM list_entities WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_list_entity))
    }

    /// Insert a fresh list entity row.
    pub async fn create_list_entity(
        &self,
        list_id: i64,
        parent_dir: &std::path::Path,
        title: &str,
    ) -> Result<ListEntityRecord> {
        let id = sqlx::query(
            r#"
            INSERT INTO list_entities (list_id, parent_dir, title)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(list_id)
        .bind(parent_dir.to_string_lossy().as_ref())
        .bind(title)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(ListEntityRecord {
            id,
            list_id,
            parent_dir: parent_dir.to_path_buf(),
            title: title.to_string(),
        })
    }

    /// Rename a list entity: update the row and move the directory.
    pub async fn rename_list_entity(
        &self,
        record: &ListEntityRecord,
        new_title: &str,
    ) -> Result<ListEntityRecord> {
        sqlx::query("UPDATE list_entities SET title = ?1 WHERE id = ?2")
            .bind(new_title)
            .bind(record.id)
            .execute(&self.pool)
            .await?;

        let new_path = record.parent_dir.join(new_title);
        if tokio::fs::try_exists(&record.path()).await? {
            tokio::fs::rename(record.path(), &new_path).await?;
        } else {
            crate::fs::ensure_dir(&new_path).await?;
        }

        let mut renamed = record.clone();
        renamed.title = new_title.to_string();
        Ok(renamed)
    }

    /// All member links pointing at one account, across every list directory.
    pub async fn links_targeting(&self, account_id: u64) -> Result<Vec<LinkRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, list_entity_id, account_id, name
            FROM links
            WHERE account_id = ?1
            "#,
        )
        .bind(account_id as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| LinkRecord {
                id: row.get("id"),
                list_entity_id: row.get("list_entity_id"),
                account_id: row.get::<i64, _>("account_id") as u64,
                name: row.get("name"),
            })
            .collect())
    }

    /// Record a member symlink.
    pub async fn create_link(
        &self,
        list_entity_id: i64,
        account_id: u64,
        name: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO links (list_entity_id, account_id, name)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (list_entity_id, account_id) DO UPDATE SET
                name = excluded.name
            "#,
        )
        .bind(list_entity_id)
        .bind(account_id as i64)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rename a recorded symlink after its target entity was renamed.
    pub async fn update_link_name(&self, link_id: i64, name: &str) -> Result<()> {
        sqlx::query("UPDATE links SET name = ?1 WHERE id = ?2")
            .bind(name)
            .bind(link_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
