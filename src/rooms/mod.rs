pub mod ws;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router, debug_handler};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::Directory;
use crate::membership::MembershipCoordinator;
use crate::model::{MemberStatus, Membership, MessageRecord, Room, RoomSummary, RosterEntry};
use crate::session::AuthedUser;
use crate::{AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_rooms).post(create_room))
        .route("/{room_id}", delete(delete_room))
        .route("/{room_id}/join", post(request_join))
        .route("/{room_id}/members", get(roster))
        .route("/{room_id}/members/{membership_id}/approve", post(approve))
        .route("/{room_id}/members/{membership_id}/deny", post(deny))
        .route("/{room_id}/messages", get(history))
}

#[debug_handler(state = AppState)]
async fn list_rooms(
    State(directory): State<Directory>,
    AuthedUser(user_id): AuthedUser,
) -> AppResult<Json<Vec<RoomSummary>>> {
    Ok(Json(directory.rooms_for_user(user_id).await?))
}

#[derive(Debug, Deserialize)]
struct CreateRoomBody {
    name: String,
}

#[debug_handler(state = AppState)]
async fn create_room(
    State(coordinator): State<MembershipCoordinator>,
    AuthedUser(user_id): AuthedUser,
    Json(body): Json<CreateRoomBody>,
) -> AppResult<(StatusCode, Json<Room>)> {
    let room = coordinator.create_room(user_id, &body.name).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

#[debug_handler(state = AppState)]
async fn delete_room(
    State(coordinator): State<MembershipCoordinator>,
    AuthedUser(user_id): AuthedUser,
    Path(room_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    coordinator.delete_room(user_id, room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
async fn request_join(
    State(coordinator): State<MembershipCoordinator>,
    AuthedUser(user_id): AuthedUser,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<Membership>> {
    Ok(Json(coordinator.request_join(user_id, room_id).await?))
}

#[derive(Debug, Serialize)]
struct RosterResponse {
    members: Vec<RosterEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending: Option<Vec<RosterEntry>>,
}

/// Approved members see the roster; admins additionally see the pending
/// request queue.
#[debug_handler(state = AppState)]
async fn roster(
    State(directory): State<Directory>,
    State(coordinator): State<MembershipCoordinator>,
    AuthedUser(user_id): AuthedUser,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<RosterResponse>> {
    let caller = coordinator.require_member(user_id, room_id).await?;

    let (members, pending): (Vec<RosterEntry>, Vec<RosterEntry>) = directory
        .room_roster(room_id)
        .await?
        .into_iter()
        .partition(|entry| entry.status == MemberStatus::Member);

    Ok(Json(RosterResponse {
        members,
        pending: caller.is_admin.then_some(pending),
    }))
}

#[debug_handler(state = AppState)]
async fn approve(
    State(coordinator): State<MembershipCoordinator>,
    AuthedUser(user_id): AuthedUser,
    Path((room_id, membership_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Membership>> {
    Ok(Json(coordinator.approve(user_id, room_id, membership_id).await?))
}

#[debug_handler(state = AppState)]
async fn deny(
    State(coordinator): State<MembershipCoordinator>,
    AuthedUser(user_id): AuthedUser,
    Path((room_id, membership_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    coordinator.deny(user_id, room_id, membership_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
async fn history(
    State(directory): State<Directory>,
    State(coordinator): State<MembershipCoordinator>,
    AuthedUser(user_id): AuthedUser,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<Vec<MessageRecord>>> {
    coordinator.require_member(user_id, room_id).await?;
    Ok(Json(directory.room_messages(room_id).await?))
}
