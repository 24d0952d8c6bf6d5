mod members;
mod messages;

use sqlx::SqlitePool;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::model::{Gender, User};

/// Durable relational storage for users, rooms, memberships and messages.
/// Everything else in the crate talks to SQLite through this type.
#[derive(Clone)]
pub struct Directory {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error("malformed id in row: {0}")]
    BadRow(#[from] uuid::Error),

    #[error("unexpected {0} value in row")]
    Corrupt(&'static str),
}

impl Directory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        gender: Gender,
        avatar_url: Option<&str>,
    ) -> Result<User, StoreError> {
        let id = Uuid::now_v7();
        let created_at = OffsetDateTime::now_utc();
        sqlx::query("INSERT INTO users (id,username,email,gender,avatar_url,created_at) VALUES (?,?,?,?,?,?)")
            .bind(id.to_string())
            .bind(username)
            .bind(email)
            .bind(gender.as_str())
            .bind(avatar_url)
            .bind(created_at)
            .execute(&self.pool)
            .await?;

        debug!(user = %id, %username, "user created");
        Ok(User {
            id,
            username: username.to_owned(),
            email: email.to_owned(),
            gender,
            avatar_url: avatar_url.map(str::to_owned),
            created_at,
        })
    }
}
