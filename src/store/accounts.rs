//! Account record reads and writes.

use sqlx::Row;

use crate::api::Account;
use crate::error::Result;
use crate::store::db::Db;

impl Db {
    /// Fetch an account row by id.
    pub async fn get_account(&self, id: u64) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, screen_name, name, friends_count, protected
            FROM accounts
            WHERE id = ?1
            "#,
        )
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Account {
            id: row.get::<i64, _>("id") as u64,
            screen_name: row.get("screen_name"),
            name: row.get("name"),
            friends_count: row.get("friends_count"),
            protected: row.get::<i64, _>("protected") != 0,
        }))
    }

    /// Insert or refresh an account row with the latest API snapshot.
    pub async fn upsert_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, screen_name, name, friends_count, protected)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (id) DO UPDATE SET
                screen_name = excluded.screen_name,
                name = excluded.name,
                friends_count = excluded.friends_count,
                protected = excluded.protected
            "#,
        )
        .bind(account.id as i64)
        .bind(&account.screen_name)
        .bind(&account.name)
        .bind(account.friends_count)
        .bind(account.protected as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
