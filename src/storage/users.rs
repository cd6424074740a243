use super::schema::Database;
use super::types::{now_millis, StoreError, User};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user. Names are globally unique.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the name is already taken.
    pub async fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let now = now_millis();
        sqlx::query_as(
            "INSERT INTO users (name, created_at, updated_at) VALUES (?, ?, ?)
             RETURNING id, name, created_at, updated_at",
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::conflict_or(e, "user", name))
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<User, StoreError> {
        sqlx::query_as("SELECT id, name, created_at, updated_at FROM users WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("user", name))
    }

    pub async fn get_user_by_id(&self, user_id: i64) -> Result<User, StoreError> {
        sqlx::query_as("SELECT id, name, created_at, updated_at FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("user", user_id))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as("SELECT id, name, created_at, updated_at FROM users ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    /// Delete every user. Feeds, follows and posts cascade with their owners.
    ///
    /// Returns the number of users removed.
    pub async fn reset(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM users").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
