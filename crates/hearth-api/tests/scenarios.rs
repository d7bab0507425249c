mod common;

use common::{Harness, drain};

use hearth_api::error::ApiError;
use hearth_api::{chats, emergency, family, messages, pins, polls};
use hearth_types::api::{CreatePollRequest, SendMessageRequest, TriggerAlertRequest};
use hearth_types::events::GatewayEvent;
use hearth_types::ids::ChatRef;
use hearth_types::models::{AlertStatus, PresenceStatus, Role};

fn text_to(chat_id: ChatRef, recipient: Option<uuid::Uuid>, content: &str) -> SendMessageRequest {
    SendMessageRequest {
        content: content.into(),
        chat_id,
        recipient_id: recipient,
        reply_to: None,
    }
}

// -- Conversations --

#[tokio::test]
async fn listing_shows_group_and_virtual_chats() {
    let h = Harness::new();
    let (admin, arjun, meera) = h.family("fam1");

    let chats = chats::list_conversations(&h.state, &admin).await.unwrap();

    assert_eq!(chats.len(), 3);
    assert!(chats[0].is_group_chat);
    assert_eq!(chats[0].chat_name, "Family Group");
    assert_eq!(chats[0].users.len(), 3);

    // Virtual chats sort by the counterpart's account age
    assert_eq!(chats[1].id, ChatRef::Virtual(meera.id));
    assert_eq!(chats[2].id, ChatRef::Virtual(arjun.id));
    assert_eq!(chats[2].id.to_string(), format!("virtual-{}", arjun.id));
    assert!(chats[2].is_virtual);
    assert_eq!(chats[2].chat_name, "Arjun");
    assert!(chats[2].latest_message.is_none());
    assert!(chats[2].pinned_notes.is_empty());
}

#[tokio::test]
async fn group_chat_is_created_once() {
    let h = Harness::new();
    let (admin, arjun, _) = h.family("fam1");

    let first = chats::list_conversations(&h.state, &admin).await.unwrap();
    let second = chats::list_conversations(&h.state, &arjun).await.unwrap();

    let group_of = |list: &[hearth_types::api::ConversationView]| {
        list.iter().find(|c| c.is_group_chat).map(|c| c.id).unwrap()
    };
    assert_eq!(group_of(&first), group_of(&second));
    assert_eq!(second.iter().filter(|c| c.is_group_chat).count(), 1);
}

#[tokio::test]
async fn late_joiner_is_added_to_the_family_group() {
    let h = Harness::new();
    let (admin, _, _) = h.family("fam1");
    let before = chats::list_conversations(&h.state, &admin).await.unwrap();

    let kabir = h.seed("Kabir", Role::Child, "fam1", Some(&admin), None, 5);
    let after = chats::list_conversations(&h.state, &kabir).await.unwrap();

    let group = after.iter().find(|c| c.is_group_chat).unwrap();
    assert_eq!(group.id, before[0].id);
    assert_eq!(group.users.len(), 4);
    assert!(group.users.iter().any(|u| u.id == kabir.id));

    // The newcomer can post into the group straight away
    messages::send_message(&h.state, &kabir, text_to(group.id, None, "Hi all"))
        .await
        .unwrap();
}

#[tokio::test]
async fn users_without_family_see_nothing() {
    let h = Harness::new();
    let (mut admin, _, _) = h.family("fam1");
    admin.family_id = None;

    assert!(chats::list_conversations(&h.state, &admin).await.unwrap().is_empty());
}

#[tokio::test]
async fn first_message_materializes_the_virtual_chat() {
    let h = Harness::new();
    let (admin, arjun, _) = h.family("fam1");
    chats::list_conversations(&h.state, &admin).await.unwrap();
    let mut rx = h.listen(&arjun);

    let virtual_ref = ChatRef::Virtual(arjun.id);
    let message = messages::send_message(&h.state, &admin, text_to(virtual_ref, Some(arjun.id), "Dinner at 7"))
        .await
        .unwrap();

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    let new_chat_id = match &events[0] {
        GatewayEvent::VirtualChatCreated { virtual_id, new_chat } => {
            assert_eq!(*virtual_id, virtual_ref);
            assert!(!new_chat.is_virtual);
            assert_eq!(new_chat.users.len(), 2);
            new_chat.id
        }
        other => panic!("expected virtual_chat_created first, got {}", other.name()),
    };
    match &events[1] {
        GatewayEvent::NewMessage(view) => {
            assert_eq!(view.id, message.id);
            assert_eq!(view.sender.name, "Priya");
            assert_eq!(view.chat.as_ref().map(|c| c.id), Some(new_chat_id));
        }
        other => panic!("expected new_message second, got {}", other.name()),
    }
    assert_eq!(ChatRef::Persisted(message.chat_id), new_chat_id);

    // Both sides now see the real chat and no virtual stand-in
    for viewer in [&admin, &arjun] {
        let list = chats::list_conversations(&h.state, viewer).await.unwrap();
        let direct = list.iter().find(|c| c.id == new_chat_id).unwrap();
        assert_eq!(
            direct.latest_message.as_ref().map(|m| m.content.as_str()),
            Some("Dinner at 7")
        );
        assert!(!list.iter().any(|c| c.id == ChatRef::Virtual(arjun.id)));
        assert!(!list.iter().any(|c| c.id == ChatRef::Virtual(admin.id)));
    }
    let arjun_view = chats::list_conversations(&h.state, &arjun).await.unwrap();
    let direct = arjun_view.iter().find(|c| c.id == new_chat_id).unwrap();
    assert_eq!(direct.chat_name, "Priya");
    // Fresh activity sorts first
    assert_eq!(arjun_view[0].id, new_chat_id);
}

#[tokio::test]
async fn stale_virtual_ref_reuses_the_existing_chat() {
    let h = Harness::new();
    let (admin, arjun, _) = h.family("fam1");
    let virtual_ref = ChatRef::Virtual(arjun.id);

    let first = messages::send_message(&h.state, &admin, text_to(virtual_ref, Some(arjun.id), "one"))
        .await
        .unwrap();

    // Arjun's client still shows the virtual chat with Priya
    let mut rx = h.listen(&admin);
    let second = messages::send_message(
        &h.state,
        &arjun,
        text_to(ChatRef::Virtual(admin.id), Some(admin.id), "two"),
    )
    .await
    .unwrap();

    assert_eq!(first.chat_id, second.chat_id);
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], GatewayEvent::NewMessage(_)));

    let history = messages::chat_history(&h.state, &admin, ChatRef::Persisted(first.chat_id))
        .await
        .unwrap();
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "two"]);
}

#[tokio::test]
async fn virtual_send_without_recipient_writes_nothing() {
    let h = Harness::new();
    let (admin, arjun, _) = h.family("fam1");
    let mut rx = h.listen(&admin);

    let err = messages::send_message(&h.state, &admin, text_to(ChatRef::Virtual(arjun.id), None, "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let err = messages::send_message(
        &h.state,
        &admin,
        text_to(ChatRef::Virtual(arjun.id), Some(arjun.id), "   "),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    assert!(
        h.db.find_direct_chat(&admin.id.to_string(), &arjun.id.to_string())
            .unwrap()
            .is_none()
    );
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn virtual_history_is_empty() {
    let h = Harness::new();
    let (admin, arjun, _) = h.family("fam1");

    let history = messages::chat_history(&h.state, &admin, ChatRef::Virtual(arjun.id))
        .await
        .unwrap();
    assert!(history.is_empty());
    assert_eq!(
        messages::mark_read(&h.state, &admin, ChatRef::Virtual(arjun.id)).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn other_families_cannot_read_a_chat() {
    let h = Harness::new();
    let (admin, arjun, meera) = h.family("fam1");
    let (outsider, _, _) = h.family("fam2");

    let sent = messages::send_message(&h.state, &admin, text_to(ChatRef::Virtual(arjun.id), Some(arjun.id), "private"))
        .await
        .unwrap();
    let chat = ChatRef::Persisted(sent.chat_id);

    let err = messages::chat_history(&h.state, &outsider, chat).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    // Same family, not a participant
    let err = messages::chat_history(&h.state, &meera, chat).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let err = messages::send_message(&h.state, &outsider, text_to(ChatRef::Virtual(arjun.id), Some(arjun.id), "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn group_chat_messages_reach_the_whole_family() {
    let h = Harness::new();
    let (admin, arjun, meera) = h.family("fam1");
    let mut rx = h.listen(&meera);

    let group = chats::list_conversations(&h.state, &admin).await.unwrap()[0].id;
    messages::send_message(&h.state, &arjun, text_to(group, None, "Who took the charger?"))
        .await
        .unwrap();

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], GatewayEvent::NewMessage(m) if m.sender.id == arjun.id));

    let history = messages::chat_history(&h.state, &meera, group).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn read_receipts_and_reactions() {
    let h = Harness::new();
    let (admin, arjun, _) = h.family("fam1");

    let sent = messages::send_message(&h.state, &admin, text_to(ChatRef::Virtual(arjun.id), Some(arjun.id), "ping"))
        .await
        .unwrap();
    let chat = ChatRef::Persisted(sent.chat_id);

    assert_eq!(messages::mark_read(&h.state, &arjun, chat).await.unwrap(), 1);
    assert_eq!(messages::mark_read(&h.state, &arjun, chat).await.unwrap(), 0);

    messages::react(&h.state, &arjun, sent.id, "👍".into()).await.unwrap();
    let counters = messages::react(&h.state, &admin, sent.id, "👍".into()).await.unwrap();
    assert_eq!(counters.get("👍"), Some(&2));

    let err = messages::react(&h.state, &admin, sent.id, "x".repeat(17)).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let history = messages::chat_history(&h.state, &admin, chat).await.unwrap();
    assert_eq!(history[0].read_by, vec![arjun.id]);
    assert_eq!(history[0].reactions.get("👍"), Some(&2));
}

#[tokio::test]
async fn pinning_broadcasts_the_full_note_list() {
    let h = Harness::new();
    let (admin, arjun, _) = h.family("fam1");
    let group = chats::list_conversations(&h.state, &admin).await.unwrap()[0].id;
    let mut rx = h.listen(&arjun);

    pins::pin_note(&h.state, &admin, group, "Wifi: hearth-home".into()).await.unwrap();
    let notes = pins::pin_note(&h.state, &arjun, group, "Trash day is Tuesday".into())
        .await
        .unwrap();

    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].pinned_by.name, "Priya");
    let events = drain(&mut rx);
    assert!(matches!(
        events.last(),
        Some(GatewayEvent::PinnedNotesUpdated { pinned_notes, .. }) if pinned_notes.len() == 2
    ));

    let err = pins::pin_note(&h.state, &admin, ChatRef::Virtual(arjun.id), "nope".into())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

// -- Polls --

#[tokio::test]
async fn revote_moves_the_voter() {
    let h = Harness::new();
    let (admin, arjun, _) = h.family("fam1");
    let mut rx = h.listen(&admin);

    let poll = polls::create_poll(
        &h.state,
        &admin,
        CreatePollRequest {
            question: "Weekend trip?".into(),
            options: vec![" Beach ".into(), "".into(), "Hills".into()],
        },
    )
    .await
    .unwrap();
    assert_eq!(poll.options.len(), 2);
    assert_eq!(poll.options[0].text, "Beach");
    assert!(matches!(drain(&mut rx).as_slice(), [GatewayEvent::NewPoll(_)]));

    let (a, b) = (poll.options[0].id, poll.options[1].id);
    polls::vote(&h.state, &arjun, poll.id, a).await.unwrap();
    let updated = polls::vote(&h.state, &arjun, poll.id, b).await.unwrap();

    assert_eq!(updated.total_votes, 1);
    assert!(updated.options[0].votes.is_empty());
    assert_eq!(updated.options[1].votes[0].id, arjun.id);
    assert_eq!(updated.options[0].percentage, 0.0);
    assert_eq!(updated.options[1].percentage, 100.0);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| matches!(e, GatewayEvent::PollUpdated(_))));
}

#[tokio::test]
async fn poll_validation_and_scoping() {
    let h = Harness::new();
    let (admin, arjun, _) = h.family("fam1");
    let (outsider, _, _) = h.family("fam2");

    let err = polls::create_poll(
        &h.state,
        &admin,
        CreatePollRequest {
            question: "Pizza?".into(),
            options: vec!["Yes".into(), "  ".into()],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let poll = polls::create_poll(
        &h.state,
        &admin,
        CreatePollRequest {
            question: "Pizza?".into(),
            options: vec!["Yes".into(), "No".into()],
        },
    )
    .await
    .unwrap();

    let err = polls::poll_detail(&h.state, &outsider, poll.id).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
    let err = polls::poll_detail(&h.state, &admin, uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let err = polls::vote(&h.state, &arjun, poll.id, uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    let detail = polls::poll_detail(&h.state, &arjun, poll.id).await.unwrap();
    assert_eq!(detail.total_votes, 0);

    assert_eq!(polls::list_polls(&h.state, &arjun).await.unwrap().len(), 1);
    assert!(polls::list_polls(&h.state, &outsider).await.unwrap().is_empty());
}

// -- Emergency --

#[tokio::test]
async fn duplicate_trigger_conflicts() {
    let h = Harness::new();
    let (admin, arjun, _) = h.family("fam1");
    let mut rx = h.listen(&admin);
    let here = || TriggerAlertRequest { lat: 12.97, lng: 77.59 };

    let resp = emergency::trigger(&h.state, &arjun, here()).await.unwrap();
    assert_eq!(resp.alert.status, AlertStatus::Active);
    assert_eq!(resp.alert.triggered_by.name, "Arjun");
    assert_eq!(resp.notified_contacts, 1);

    let err = emergency::trigger(&h.state, &arjun, here()).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    let history = emergency::history(&h.state, &admin).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(matches!(drain(&mut rx).as_slice(), [GatewayEvent::NewAlert(_)]));

    // The child's guardian is the only target
    let sent = h.notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, resp.alert.id);
    assert_eq!(sent[0].1.len(), 1);
    assert_eq!(sent[0].1[0].user_id, admin.id);
}

#[tokio::test]
async fn admin_alert_targets_every_child() {
    let h = Harness::new();
    let (admin, arjun, meera) = h.family("fam1");

    let resp = emergency::trigger(&h.state, &admin, TriggerAlertRequest { lat: 0.0, lng: 0.0 })
        .await
        .unwrap();

    // Neither child has a phone on file
    assert_eq!(resp.notified_contacts, 0);
    let sent = h.notifier.sent.lock().unwrap();
    let mut targets: Vec<_> = sent[0].1.iter().map(|t| t.user_id).collect();
    targets.sort();
    let mut expected = vec![arjun.id, meera.id];
    expected.sort();
    assert_eq!(targets, expected);
}

#[tokio::test]
async fn only_the_trigger_can_resolve() {
    let h = Harness::new();
    let (admin, arjun, meera) = h.family("fam1");
    let mut rx = h.listen(&admin);

    let resp = emergency::trigger(&h.state, &arjun, TriggerAlertRequest { lat: 1.0, lng: 2.0 })
        .await
        .unwrap();

    let err = emergency::resolve(&h.state, &meera).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    assert_eq!(emergency::history(&h.state, &admin).await.unwrap()[0].status, AlertStatus::Active);

    let resolved = emergency::resolve(&h.state, &arjun).await.unwrap();
    assert_eq!(resolved.id, resp.alert.id);
    assert_eq!(resolved.status, AlertStatus::Resolved);
    assert!(resolved.resolved_at.is_some());

    let events = drain(&mut rx);
    assert!(matches!(
        events.last(),
        Some(GatewayEvent::AlertResolved { alert_id, resolved_by }) if *alert_id == resp.alert.id && resolved_by == "Arjun"
    ));

    // A fresh alert is allowed once the previous one is resolved
    emergency::trigger(&h.state, &arjun, TriggerAlertRequest { lat: 1.0, lng: 2.0 })
        .await
        .unwrap();
    assert_eq!(emergency::history(&h.state, &admin).await.unwrap().len(), 2);
}

// -- Presence --

#[tokio::test]
async fn family_presence_classifies_members() {
    let h = Harness::new();
    let (admin, arjun, meera) = h.family("fam1");

    h.db.set_user_online(&admin.id.to_string()).unwrap();
    let ten_minutes_ago = hearth_db::format_timestamp(chrono::Utc::now() - chrono::Duration::minutes(10));
    h.db.set_user_offline(&arjun.id.to_string(), &ten_minutes_ago).unwrap();
    let twenty_minutes_ago = hearth_db::format_timestamp(chrono::Utc::now() - chrono::Duration::minutes(20));
    h.db.set_user_offline(&meera.id.to_string(), &twenty_minutes_ago).unwrap();

    let presence = family::family_presence(&h.state, &admin).await.unwrap();
    assert_eq!(presence.online_count, 1);
    let status_of = |id| presence.members.iter().find(|m| m.id == id).unwrap().status;
    assert_eq!(status_of(admin.id), PresenceStatus::Online);
    assert_eq!(status_of(arjun.id), PresenceStatus::Away);
    assert_eq!(status_of(meera.id), PresenceStatus::Offline);
    assert_eq!(arjun.role, Role::Child);
}
