//! User directory.

use super::Store;
use async_trait::async_trait;
use parley_core::{error::ParleyError, message::UserRecord, traits::UserStore};

impl Store {
    /// Insert or update a user.
    pub async fn upsert_user(
        &self,
        address: &str,
        display_name: Option<&str>,
        role: &str,
    ) -> Result<(), ParleyError> {
        sqlx::query(
            "INSERT INTO users (address, display_name, role) VALUES (?, ?, ?) \
             ON CONFLICT(address) DO UPDATE SET \
             display_name = COALESCE(excluded.display_name, users.display_name), \
             role = excluded.role, \
             updated_at = datetime('now')",
        )
        .bind(address)
        .bind(display_name)
        .bind(role)
        .execute(&self.pool)
        .await
        .map_err(|e| ParleyError::Store(format!("upsert user failed: {e}")))?;

        Ok(())
    }

    /// Look up a user by canonical address.
    pub async fn get_user(&self, address: &str) -> Result<Option<UserRecord>, ParleyError> {
        let row: Option<(String, Option<String>, String)> =
            sqlx::query_as("SELECT address, display_name, role FROM users WHERE address = ?")
                .bind(address)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| ParleyError::Store(format!("user lookup failed: {e}")))?;

        Ok(row.map(|(address, display_name, role)| UserRecord {
            address,
            display_name,
            role,
        }))
    }
}

#[async_trait]
impl UserStore for Store {
    async fn get_user_by_address(&self, address: &str) -> Result<Option<UserRecord>, ParleyError> {
        self.get_user(address).await
    }
}
