//! Account mirror entities.
//!
//! An entity ties an account to one directory on disk and carries the fetch
//! watermark (creation time of the newest item already mirrored there). The
//! same account mirrored under two parent directories has two independent
//! entities. Entities are never deleted.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::Row;

use crate::error::Result;
use crate::fs;
use crate::store::db::Db;

/// One row of the `entities` table.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub id: i64,
    pub account_id: u64,
    pub parent_dir: PathBuf,
    pub title: String,
    pub latest_release_at: Option<DateTime<Utc>>,
}

fn row_to_record(row: sqlx::sqlite::SqliteRow) -> EntityRecord {
    EntityRecord {
        id: row.get("id"),
        account_id: row.get::<i64, _>("account_id") as u64,
        parent_dir: PathBuf::from(row.get::<String, _>("parent_dir")),
        title: row.get("title"),
        latest_release_at: row
            .get::<Option<i64>, _>("latest_release_at")
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
    }
}

impl Db {
    /// Find the entity of an account under a parent directory.
    pub async fn locate_entity(
        &self,
        account_id: u64,
        parent_dir: &Path,
    ) -> Result<Option<EntityRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, parent_dir, title, latest_release_at
            FROM entities
            WHERE account_id = ?1 AND parent_dir = ?2
            "#,
        )
        .bind(account_id as i64)
        .bind(parent_dir.to_string_lossy().as_ref())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_record))
    }

    /// Insert a fresh entity row with no watermark.
    pub async fn create_entity(
        &self,
        account_id: u64,
        parent_dir: &Path,
        title: &str,
    ) -> Result<EntityRecord> {
        let id = sqlx::query(
            r#"
            INSERT INTO entities (account_id, parent_dir, title, latest_release_at)
            VALUES (?1, ?2, ?3, NULL)
            "#,
        )
        .bind(account_id as i64)
        .bind(parent_dir.to_string_lossy().as_ref())
        .bind(title)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(EntityRecord {
            id,
            account_id,
            parent_dir: parent_dir.to_path_buf(),
            title: title.to_string(),
            latest_release_at: None,
        })
    }

    async fn rename_entity_row(&self, id: i64, title: &str) -> Result<()> {
        sqlx::query("UPDATE entities SET title = ?1 WHERE id = ?2")
            .bind(title)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_entity_watermark(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE entities SET latest_release_at = ?1 WHERE id = ?2")
            .bind(at.timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Live handle to an entity: database row plus in-memory title and watermark.
///
/// Shared across pipeline stages behind an `Arc`. The interior mutexes guard
/// only field reads and writes; database writes happen outside them.
pub struct EntityHandle {
    db: Db,
    pub id: i64,
    pub account_id: u64,
    parent_dir: PathBuf,
    title: Mutex<String>,
    watermark: Mutex<Option<DateTime<Utc>>>,
}

impl EntityHandle {
    pub fn new(db: Db, record: EntityRecord) -> Self {
        EntityHandle {
            db,
            id: record.id,
            account_id: record.account_id,
            parent_dir: record.parent_dir,
            title: Mutex::new(record.title),
            watermark: Mutex::new(record.latest_release_at),
        }
    }

    /// The entity directory: parent dir joined with the current title.
    pub fn path(&self) -> PathBuf {
        self.parent_dir.join(self.title().as_str())
    }

    pub fn title(&self) -> String {
        self.title.lock().expect("title lock poisoned").clone()
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        *self.watermark.lock().expect("watermark lock poisoned")
    }

    /// Advance the watermark. Persisted before the in-memory value moves, and
    /// never moved backwards.
    pub async fn set_watermark(&self, at: DateTime<Utc>) -> Result<()> {
        {
            let current = self.watermark.lock().expect("watermark lock poisoned");
            if current.is_some_and(|w| w >= at) {
                return Ok(());
            }
        }
        self.db.set_entity_watermark(self.id, at).await?;
        *self.watermark.lock().expect("watermark lock poisoned") = Some(at);
        Ok(())
    }

    /// Rename the entity: update the row, move the directory, then adopt the
    /// new title. A directory that never existed is simply created at the new
    /// location.
    pub async fn rename(&self, new_title: &str) -> Result<()> {
        let old_path = self.path();
        self.db.rename_entity_row(self.id, new_title).await?;

        let new_path = self.parent_dir.join(new_title);
        if tokio::fs::try_exists(&old_path).await? {
            tokio::fs::rename(&old_path, &new_path).await?;
        } else {
            fs::ensure_dir(&new_path).await?;
        }

        *self.title.lock().expect("title lock poisoned") = new_title.to_string();
        Ok(())
    }
}
