//! SQLite-backed sync state.
//!
//! Connection handling and migrations live here; account, entity, and list
//! queries live in their own modules.

use std::path::Path;

use directories::ProjectDirs;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

use crate::error::{Error, Result};

/// Percent-encode a path for use in a sqlite:// URI so spaces and special
/// chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the sync-state database.
///
/// Cheap to clone; every clone shares one connection pool.
#[derive(Clone)]
pub struct Db {
    pub(crate) pool: Pool<Sqlite>,
}

impl Db {
    /// Open (or create) the default database under the platform data
    /// directory and run migrations.
    pub async fn open_default() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "tweet-mirror")
            .ok_or_else(|| Error::Config("could not determine data directory".to_string()))?;
        let data_dir = dirs.data_dir();
        tokio::fs::create_dir_all(data_dir).await?;
        Self::open_at(data_dir.join("sync.db")).await
    }

    /// Open (or create) the database at a specific path. Creates parent dirs
    /// if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await?;
        let db = Db { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        // Account entities are unique per (account, parent dir) so the same
        // account mirrored inside two list directories keeps two independent
        // watermarks. Watermarks are Unix seconds, NULL until first fetch.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                screen_name TEXT NOT NULL,
                name TEXT NOT NULL,
                friends_count INTEGER NOT NULL DEFAULT 0,
                protected INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                parent_dir TEXT NOT NULL,
                title TEXT NOT NULL,
                latest_release_at INTEGER,
                UNIQUE (account_id, parent_dir)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lists (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                owner_id INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS list_entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                list_id INTEGER NOT NULL,
                parent_dir TEXT NOT NULL,
                title TEXT NOT NULL,
                UNIQUE (list_id, parent_dir)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                list_entity_id INTEGER NOT NULL,
                account_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                UNIQUE (list_entity_id, account_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Open an in-memory database for tests (no disk I/O).
    #[cfg(test)]
    pub(crate) async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Db { pool };
        db.migrate().await?;
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn sqlite_uri_escapes_reserved_chars() {
        let path = PathBuf::from("/tmp/my data/a#b.db");
        assert_eq!(
            path_to_sqlite_uri(&path),
            "sqlite:///tmp/my%20data/a%23b.db"
        );
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = Db::open_memory().await.unwrap();
        db.migrate().await.unwrap();
    }
}
