use tracing::info;
use uuid::Uuid;

use crate::directory::{Directory, StoreError};
use crate::error::{AppError, AppResult};
use crate::model::{MemberStatus, Membership, Room};

/// Authorizes and mutates membership rows. Runs entirely against the
/// Directory, independent of live connections: clients observe membership
/// changes on their next fetch or reconnect, nothing is pushed.
#[derive(Clone)]
pub struct MembershipCoordinator {
    directory: Directory,
}

impl MembershipCoordinator {
    pub fn new(directory: Directory) -> Self {
        Self { directory }
    }

    /// Idempotent join request: an existing row of any status is reported
    /// back untouched, so a member can never be downgraded to pending and
    /// no user ever holds two rows for one room.
    pub async fn request_join(&self, user_id: Uuid, room_id: Uuid) -> AppResult<Membership> {
        if self.directory.room(room_id).await?.is_none() {
            return Err(AppError::NotFound("room"));
        }
        if let Some(existing) = self.directory.membership_for(room_id, user_id).await? {
            return Ok(existing);
        }

        match self
            .directory
            .insert_membership(room_id, user_id, MemberStatus::PendingApproval, false)
            .await
        {
            Ok(membership) => Ok(membership),
            // lost the race against an identical request; report that row
            Err(StoreError::Db(sqlx::Error::Database(db))) if db.is_unique_violation() => self
                .directory
                .membership_for(room_id, user_id)
                .await?
                .ok_or(AppError::NotFound("membership")),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn approve(
        &self,
        admin_id: Uuid,
        room_id: Uuid,
        membership_id: Uuid,
    ) -> AppResult<Membership> {
        self.require_admin(admin_id, room_id).await?;
        let Some(target) = self.directory.membership(room_id, membership_id).await? else {
            return Err(AppError::NotFound("membership"));
        };
        self.directory
            .set_membership_status(room_id, membership_id, MemberStatus::Member)
            .await?;
        info!(room = %room_id, member = %target.user_id, "join request approved");
        Ok(Membership {
            status: MemberStatus::Member,
            ..target
        })
    }

    /// Denial deletes the row outright; a denied user has to re-request
    /// from scratch.
    pub async fn deny(&self, admin_id: Uuid, room_id: Uuid, membership_id: Uuid) -> AppResult<()> {
        self.require_admin(admin_id, room_id).await?;
        if !self.directory.delete_membership(room_id, membership_id).await? {
            return Err(AppError::NotFound("membership"));
        }
        info!(room = %room_id, membership = %membership_id, "join request denied");
        Ok(())
    }

    pub async fn create_room(&self, creator_id: Uuid, name: &str) -> AppResult<Room> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("room name must not be empty".into()));
        }
        let (room, _) = self.directory.insert_room_with_admin(name, creator_id).await?;
        info!(room = %room.id, creator = %creator_id, "room created");
        Ok(room)
    }

    pub async fn delete_room(&self, user_id: Uuid, room_id: Uuid) -> AppResult<()> {
        let Some(room) = self.directory.room(room_id).await? else {
            return Err(AppError::NotFound("room"));
        };
        if room.created_by != user_id {
            return Err(AppError::Forbidden("only the room creator can delete it"));
        }
        self.directory.delete_room(room_id).await?;
        info!(room = %room_id, "room deleted");
        Ok(())
    }

    /// Read-path gate: approved members only. The hub itself never checks
    /// membership, so every surface that serves room data calls this first.
    pub async fn require_member(&self, user_id: Uuid, room_id: Uuid) -> AppResult<Membership> {
        match self.directory.membership_for(room_id, user_id).await? {
            Some(m) if m.status == MemberStatus::Member => Ok(m),
            Some(_) => Err(AppError::Forbidden("membership is pending approval")),
            None => Err(AppError::Forbidden("not a member of this room")),
        }
    }

    pub async fn require_admin(&self, user_id: Uuid, room_id: Uuid) -> AppResult<Membership> {
        let membership = self.require_member(user_id, room_id).await?;
        if !membership.is_admin {
            return Err(AppError::Forbidden("admin rights required"));
        }
        Ok(membership)
    }
}
