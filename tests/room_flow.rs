//! End-to-end flow over the public API: signup, room creation, join
//! approval, live fan-out, leave.

use connectsphere::db;
use connectsphere::fanout::SendIntent;
use connectsphere::model::{ContentType, Gender, MemberStatus};
use connectsphere::AppState;

fn text_intent(room_id: uuid::Uuid, content: &str) -> SendIntent {
    SendIntent {
        room_id,
        content: content.to_owned(),
        content_type: ContentType::Text,
        file_url: None,
    }
}

#[tokio::test]
async fn full_room_lifecycle() {
    let state = AppState::new(db::connect_memory().await.unwrap());

    let ada = state
        .directory
        .create_user("ada", "ada@example.com", Gender::Female, Some("http://a/ada.png"))
        .await
        .unwrap();
    let bob = state
        .directory
        .create_user("bob", "bob@example.com", Gender::Male, None)
        .await
        .unwrap();

    // ada creates the room and is its admin from the start
    let room = state.coordinator.create_room(ada.id, "Team").await.unwrap();
    assert!(state.coordinator.require_admin(ada.id, room.id).await.is_ok());

    // bob has to be approved before the read gate lets him in
    let pending = state.coordinator.request_join(bob.id, room.id).await.unwrap();
    assert_eq!(pending.status, MemberStatus::PendingApproval);
    assert!(state.coordinator.require_member(bob.id, room.id).await.is_err());
    state
        .coordinator
        .approve(ada.id, room.id, pending.id)
        .await
        .unwrap();
    assert!(state.coordinator.require_member(bob.id, room.id).await.is_ok());

    // both go live
    let (ada_conn, _ada_tx, mut ada_rx) = state.hub.connect().await;
    let (bob_conn, _bob_tx, mut bob_rx) = state.hub.connect().await;
    state.hub.join(ada_conn, room.id).await;
    state.hub.join(bob_conn, room.id).await;

    let record = state
        .fanout
        .dispatch(bob.id, text_intent(room.id, "made it in"))
        .await
        .unwrap();
    assert_eq!(record.author.username, "bob");

    for rx in [&mut ada_rx, &mut bob_rx] {
        let frame: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["type"], "new_message");
        assert_eq!(frame["message"]["content"], "made it in");
        assert_eq!(frame["message"]["author"]["username"], "bob");
        assert!(rx.try_recv().is_err());
    }

    // history serves the canonical record, not the raw intent
    let history = state.directory.room_messages(room.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, record.id);

    // bob leaves and stops hearing the room
    state.hub.leave(bob_conn, room.id).await;
    state
        .fanout
        .dispatch(ada.id, text_intent(room.id, "anyone here?"))
        .await
        .unwrap();
    assert!(bob_rx.try_recv().is_err());
    let frame: serde_json::Value =
        serde_json::from_str(&ada_rx.try_recv().unwrap()).unwrap();
    assert_eq!(frame["message"]["content"], "anyone here?");
}

#[tokio::test]
async fn summaries_follow_membership_changes() {
    let state = AppState::new(db::connect_memory().await.unwrap());
    let ada = state
        .directory
        .create_user("ada", "ada@example.com", Gender::Female, None)
        .await
        .unwrap();
    let bob = state
        .directory
        .create_user("bob", "bob@example.com", Gender::Male, None)
        .await
        .unwrap();
    let room = state.coordinator.create_room(ada.id, "Team").await.unwrap();

    // membership changes are not pushed; bob sees them on his next fetch
    let before = state.directory.rooms_for_user(bob.id).await.unwrap();
    assert!(before[0].membership.is_none());

    let pending = state.coordinator.request_join(bob.id, room.id).await.unwrap();
    let during = state.directory.rooms_for_user(bob.id).await.unwrap();
    assert_eq!(
        during[0].membership.as_ref().unwrap().status,
        MemberStatus::PendingApproval
    );

    state
        .coordinator
        .approve(ada.id, room.id, pending.id)
        .await
        .unwrap();
    let after = state.directory.rooms_for_user(bob.id).await.unwrap();
    assert_eq!(after[0].membership.as_ref().unwrap().status, MemberStatus::Member);
}
