use time::OffsetDateTime;
use uuid::Uuid;

use super::{Directory, StoreError};
use crate::model::{Author, ContentType, MessageRecord};

type MessageRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    OffsetDateTime,
    String,
    Option<String>,
);

const HYDRATED: &str = "SELECT m.id, m.room_id, m.user_id, m.content, m.content_type, m.file_url, m.created_at, \
                        u.username, u.avatar_url \
                        FROM messages m JOIN users u ON u.id = m.user_id";

impl Directory {
    /// Append a message and return its canonical stored form, author
    /// identity joined in. Failing the re-read fails the whole append from
    /// the caller's point of view.
    pub async fn insert_message(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        content: &str,
        content_type: ContentType,
        file_url: Option<&str>,
    ) -> Result<MessageRecord, StoreError> {
        let id = Uuid::now_v7();
        let created_at = OffsetDateTime::now_utc();
        sqlx::query(
            "INSERT INTO messages (id,room_id,user_id,content,content_type,file_url,created_at) VALUES (?,?,?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .bind(content)
        .bind(content_type.as_str())
        .bind(file_url)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        let row: MessageRow = sqlx::query_as(&format!("{HYDRATED} WHERE m.id = ?"))
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        message_from_row(row)
    }

    /// Room history, oldest first. Id is the tiebreak so equal timestamps
    /// keep insert order.
    pub async fn room_messages(&self, room_id: Uuid) -> Result<Vec<MessageRecord>, StoreError> {
        let rows: Vec<MessageRow> =
            sqlx::query_as(&format!("{HYDRATED} WHERE m.room_id = ? ORDER BY m.created_at, m.id"))
                .bind(room_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(message_from_row).collect()
    }
}

fn message_from_row(row: MessageRow) -> Result<MessageRecord, StoreError> {
    let (id, room_id, user_id, content, content_type, file_url, created_at, username, avatar_url) = row;
    let user_id = Uuid::parse_str(&user_id)?;
    Ok(MessageRecord {
        id: Uuid::parse_str(&id)?,
        room_id: Uuid::parse_str(&room_id)?,
        user_id,
        content,
        content_type: ContentType::parse(&content_type).ok_or(StoreError::Corrupt("content_type"))?,
        file_url,
        created_at,
        author: Author {
            id: user_id,
            username,
            avatar_url,
        },
    })
}
