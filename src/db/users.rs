use time::OffsetDateTime;

use crate::error::{ChatError, ChatResult};

use super::{Store, User, UserId, UserStatus};

const USER_COLUMNS: &str =
    "id,username,email,password_hash,display_name,avatar_url,status,created_at,last_active";

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub display_name: Option<&'a str>,
}

impl Store {
    pub async fn create_user(&self, new: NewUser<'_>) -> ChatResult<User> {
        let now = OffsetDateTime::now_utc();
        let id = sqlx::query(
            "INSERT INTO users (username,email,password_hash,display_name,status,created_at,last_active) VALUES (?,?,?,?,?,?,?)",
        )
        .bind(new.username)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.display_name.unwrap_or(new.username))
        .bind(UserStatus::Offline)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| ChatError::from_insert(e, "username or email already exists"))?
        .last_insert_rowid();

        self.get_user(id).await?.ok_or(ChatError::NotFound("user"))
    }

    pub async fn get_user(&self, id: UserId) -> ChatResult<Option<User>> {
        Ok(
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id=?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn find_user_by_username(&self, username: &str) -> ChatResult<Option<User>> {
        Ok(
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE username=?"))
                .bind(username)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn email_taken(&self, email: &str) -> ChatResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE email=?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Matches `query` against username and display name; everyone when empty.
    pub async fn search_users(&self, query: &str) -> ChatResult<Vec<User>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(
                sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY username"))
                    .fetch_all(&self.pool)
                    .await?,
            );
        }

        let pattern = format!("%{query}%");
        Ok(sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username LIKE ? OR display_name LIKE ? ORDER BY username"
        ))
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Overwrites only the fields that are `Some`.
    pub async fn update_profile(
        &self,
        id: UserId,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> ChatResult<Option<User>> {
        sqlx::query(
            "UPDATE users SET display_name=COALESCE(?,display_name), avatar_url=COALESCE(?,avatar_url) WHERE id=?",
        )
        .bind(display_name)
        .bind(avatar_url)
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.get_user(id).await
    }

    /// Returns false when the user does not exist.
    pub async fn set_user_status(&self, id: UserId, status: UserStatus) -> ChatResult<bool> {
        let result = sqlx::query("UPDATE users SET status=?, last_active=? WHERE id=?")
            .bind(status)
            .bind(OffsetDateTime::now_utc())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
