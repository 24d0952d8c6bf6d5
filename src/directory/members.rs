use time::OffsetDateTime;
use uuid::Uuid;

use super::{Directory, StoreError};
use crate::model::{
    Author, Gender, LastMessage, MemberProfile, MemberStatus, Membership, MembershipStanding, Room,
    RoomSummary, RosterEntry,
};

type MembershipRow = (String, String, String, String, bool, OffsetDateTime);

impl Directory {
    pub async fn room(&self, room_id: Uuid) -> Result<Option<Room>, StoreError> {
        let row: Option<(String, String, String, OffsetDateTime)> =
            sqlx::query_as("SELECT id,name,created_by,created_at FROM rooms WHERE id = ?")
                .bind(room_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        let Some((id, name, created_by, created_at)) = row else {
            return Ok(None);
        };
        Ok(Some(Room {
            id: Uuid::parse_str(&id)?,
            name,
            created_by: Uuid::parse_str(&created_by)?,
            created_at,
        }))
    }

    /// Room row plus the creator's admin membership, written as one
    /// transaction so a room can never exist without a valid admin.
    pub async fn insert_room_with_admin(
        &self,
        name: &str,
        creator_id: Uuid,
    ) -> Result<(Room, Membership), StoreError> {
        let room_id = Uuid::now_v7();
        let membership_id = Uuid::now_v7();
        let created_at = OffsetDateTime::now_utc();

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO rooms (id,name,created_by,created_at) VALUES (?,?,?,?)")
            .bind(room_id.to_string())
            .bind(name)
            .bind(creator_id.to_string())
            .bind(created_at)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO room_members (id,room_id,user_id,status,is_admin,created_at) VALUES (?,?,?,?,?,?)",
        )
        .bind(membership_id.to_string())
        .bind(room_id.to_string())
        .bind(creator_id.to_string())
        .bind(MemberStatus::Member.as_str())
        .bind(true)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let room = Room {
            id: room_id,
            name: name.to_owned(),
            created_by: creator_id,
            created_at,
        };
        let membership = Membership {
            id: membership_id,
            room_id,
            user_id: creator_id,
            status: MemberStatus::Member,
            is_admin: true,
            created_at,
        };
        Ok((room, membership))
    }

    pub async fn delete_room(&self, room_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM rooms WHERE id = ?")
            .bind(room_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn membership_for(
        &self,
        room_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, StoreError> {
        let row: Option<MembershipRow> = sqlx::query_as(
            "SELECT id,room_id,user_id,status,is_admin,created_at FROM room_members WHERE room_id = ? AND user_id = ?",
        )
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(membership_from_row).transpose()
    }

    pub async fn membership(
        &self,
        room_id: Uuid,
        membership_id: Uuid,
    ) -> Result<Option<Membership>, StoreError> {
        let row: Option<MembershipRow> = sqlx::query_as(
            "SELECT id,room_id,user_id,status,is_admin,created_at FROM room_members WHERE id = ? AND room_id = ?",
        )
        .bind(membership_id.to_string())
        .bind(room_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(membership_from_row).transpose()
    }

    pub async fn insert_membership(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        status: MemberStatus,
        is_admin: bool,
    ) -> Result<Membership, StoreError> {
        let id = Uuid::now_v7();
        let created_at = OffsetDateTime::now_utc();
        sqlx::query(
            "INSERT INTO room_members (id,room_id,user_id,status,is_admin,created_at) VALUES (?,?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .bind(status.as_str())
        .bind(is_admin)
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        Ok(Membership {
            id,
            room_id,
            user_id,
            status,
            is_admin,
            created_at,
        })
    }

    pub async fn set_membership_status(
        &self,
        room_id: Uuid,
        membership_id: Uuid,
        status: MemberStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE room_members SET status = ? WHERE id = ? AND room_id = ?")
            .bind(status.as_str())
            .bind(membership_id.to_string())
            .bind(room_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_membership(
        &self,
        room_id: Uuid,
        membership_id: Uuid,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM room_members WHERE id = ? AND room_id = ?")
            .bind(membership_id.to_string())
            .bind(room_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn room_roster(&self, room_id: Uuid) -> Result<Vec<RosterEntry>, StoreError> {
        let rows: Vec<(String, String, bool, String, String, Option<String>, String)> = sqlx::query_as(
            "SELECT m.id, m.status, m.is_admin, u.id, u.username, u.avatar_url, u.gender \
             FROM room_members m JOIN users u ON u.id = m.user_id \
             WHERE m.room_id = ? ORDER BY m.created_at, m.id",
        )
        .bind(room_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(membership_id, status, is_admin, user_id, username, avatar_url, gender)| {
                Ok(RosterEntry {
                    membership_id: Uuid::parse_str(&membership_id)?,
                    status: MemberStatus::parse(&status).ok_or(StoreError::Corrupt("status"))?,
                    is_admin,
                    user: MemberProfile {
                        id: Uuid::parse_str(&user_id)?,
                        username,
                        avatar_url,
                        gender: Gender::parse(&gender).ok_or(StoreError::Corrupt("gender"))?,
                    },
                })
            })
            .collect()
    }

    /// Every room with its creator, the given user's standing and a
    /// last-message preview. Newest rooms first.
    pub async fn rooms_for_user(&self, user_id: Uuid) -> Result<Vec<RoomSummary>, StoreError> {
        type SummaryRow = (
            String,
            String,
            OffsetDateTime,
            String,
            String,
            Option<String>,
            Option<String>,
            Option<bool>,
            Option<String>,
            Option<OffsetDateTime>,
            Option<String>,
        );
        let rows: Vec<SummaryRow> = sqlx::query_as(
            "SELECT r.id, r.name, r.created_at, u.id, u.username, u.avatar_url, \
                    m.status, m.is_admin, \
                    (SELECT content FROM messages WHERE room_id = r.id ORDER BY created_at DESC, id DESC LIMIT 1), \
                    (SELECT created_at FROM messages WHERE room_id = r.id ORDER BY created_at DESC, id DESC LIMIT 1), \
                    (SELECT u2.username FROM messages m2 JOIN users u2 ON u2.id = m2.user_id \
                     WHERE m2.room_id = r.id ORDER BY m2.created_at DESC, m2.id DESC LIMIT 1) \
             FROM rooms r \
             JOIN users u ON u.id = r.created_by \
             LEFT JOIN room_members m ON m.room_id = r.id AND m.user_id = ? \
             ORDER BY r.created_at DESC, r.id DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let (
                    room_id,
                    name,
                    created_at,
                    creator_id,
                    creator_name,
                    creator_avatar,
                    status,
                    is_admin,
                    last_content,
                    last_at,
                    last_author,
                ) = row;
                let membership = match (status, is_admin) {
                    (Some(status), Some(is_admin)) => Some(MembershipStanding {
                        status: MemberStatus::parse(&status).ok_or(StoreError::Corrupt("status"))?,
                        is_admin,
                    }),
                    _ => None,
                };
                let last_message = match (last_content, last_at, last_author) {
                    (Some(content), Some(created_at), Some(username)) => Some(LastMessage {
                        content,
                        username,
                        created_at,
                    }),
                    _ => None,
                };
                Ok(RoomSummary {
                    id: Uuid::parse_str(&room_id)?,
                    name,
                    created_at,
                    creator: Author {
                        id: Uuid::parse_str(&creator_id)?,
                        username: creator_name,
                        avatar_url: creator_avatar,
                    },
                    membership,
                    last_message,
                })
            })
            .collect()
    }
}

fn membership_from_row(row: MembershipRow) -> Result<Membership, StoreError> {
    let (id, room_id, user_id, status, is_admin, created_at) = row;
    Ok(Membership {
        id: Uuid::parse_str(&id)?,
        room_id: Uuid::parse_str(&room_id)?,
        user_id: Uuid::parse_str(&user_id)?,
        status: MemberStatus::parse(&status).ok_or(StoreError::Corrupt("status"))?,
        is_admin,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use crate::db;
    use crate::directory::Directory;
    use crate::model::{ContentType, Gender, MemberStatus};

    async fn fixture() -> Directory {
        Directory::new(db::connect_memory().await.unwrap())
    }

    #[tokio::test]
    async fn room_listing_carries_standing_and_preview() {
        let directory = fixture().await;
        let ada = directory
            .create_user("ada", "ada@example.com", Gender::Female, None)
            .await
            .unwrap();
        let bob = directory
            .create_user("bob", "bob@example.com", Gender::Male, None)
            .await
            .unwrap();
        let (room, _) = directory.insert_room_with_admin("general", ada.id).await.unwrap();
        directory
            .insert_message(room.id, ada.id, "welcome", ContentType::Text, None)
            .await
            .unwrap();

        let for_ada = directory.rooms_for_user(ada.id).await.unwrap();
        assert_eq!(for_ada.len(), 1);
        let standing = for_ada[0].membership.as_ref().unwrap();
        assert_eq!(standing.status, MemberStatus::Member);
        assert!(standing.is_admin);
        let preview = for_ada[0].last_message.as_ref().unwrap();
        assert_eq!(preview.content, "welcome");
        assert_eq!(preview.username, "ada");

        let for_bob = directory.rooms_for_user(bob.id).await.unwrap();
        assert!(for_bob[0].membership.is_none());
        assert_eq!(for_bob[0].creator.username, "ada");
    }

    #[tokio::test]
    async fn deleting_a_room_cascades_rows() {
        let directory = fixture().await;
        let ada = directory
            .create_user("ada", "ada@example.com", Gender::Female, None)
            .await
            .unwrap();
        let (room, _) = directory.insert_room_with_admin("general", ada.id).await.unwrap();
        directory
            .insert_message(room.id, ada.id, "bye", ContentType::Text, None)
            .await
            .unwrap();

        assert!(directory.delete_room(room.id).await.unwrap());
        assert!(directory.room(room.id).await.unwrap().is_none());
        assert!(directory.membership_for(room.id, ada.id).await.unwrap().is_none());
        assert!(directory.room_messages(room.id).await.unwrap().is_empty());
    }
}
