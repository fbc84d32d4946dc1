mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{FakeApi, FakeTransport, message, settle, wait_until};
use rust_social_chat::chat::{ChatSession, ConnectionState, SUBSCRIBER_KEY, SessionOptions};
use rust_social_chat::common::{
    ChatMessage, Conversation, MessageStatus, PresenceEvent, Reaction, ReactionEvent, StatusEvent,
    TransportEvent, TypingEvent,
};
use rust_social_chat::network::Transport;
use rust_social_chat::network::protocol::ClientFrame;
use rust_social_chat::storage::MessageCache;
use rust_social_chat::store::Store;

fn options() -> SessionOptions {
    SessionOptions {
        reconnect_delay: None,
        ..SessionOptions::default()
    }
}

fn session_with(
    transport: &Arc<FakeTransport>,
    api: &Arc<FakeApi>,
    options: SessionOptions,
) -> ChatSession<FakeTransport> {
    ChatSession::new(transport.clone(), api.clone(), Store::new(), options)
}

/// Session for user A, connected over an auto-accepting fake.
async fn connected_session() -> (ChatSession<FakeTransport>, Arc<FakeTransport>, Arc<FakeApi>) {
    let transport = FakeTransport::new();
    let api = FakeApi::new();
    let session = session_with(&transport, &api, options());
    session.connect("A");
    settle().await;
    (session, transport, api)
}

fn typing(user_id: &str, typing: bool) -> TransportEvent {
    TransportEvent::Typing(TypingEvent {
        user_id: user_id.to_string(),
        target_id: Some("A".to_string()),
        typing,
    })
}

#[tokio::test]
async fn conversation_id_is_the_other_party() {
    let (session, transport, _api) = connected_session().await;

    transport.emit(TransportEvent::Message(message("m1", "A", "B", 1)));
    transport.emit(TransportEvent::Message(message("m2", "B", "A", 2)));
    settle().await;

    let state = session.store().snapshot();
    let conversation: Vec<_> = state
        .messages_with("B")
        .iter()
        .map(|m| (m.id.as_str(), m.conversation_id.as_deref()))
        .collect();
    assert_eq!(conversation, [("m1", Some("B")), ("m2", Some("B"))]);
    assert_eq!(state.unread_count("B"), 1, "own message is not unread");
}

#[tokio::test(start_paused = true)]
async fn typing_clears_after_exactly_the_debounce_window() {
    let (session, transport, _api) = connected_session().await;

    transport.emit(typing("B", true));
    settle().await;
    assert!(session.store().select(|s| s.is_typing("B")));

    tokio::time::advance(Duration::from_millis(2999)).await;
    settle().await;
    assert!(session.store().select(|s| s.is_typing("B")));

    tokio::time::advance(Duration::from_millis(1)).await;
    settle().await;
    assert!(!session.store().select(|s| s.is_typing("B")));
}

#[tokio::test(start_paused = true)]
async fn repeated_typing_resets_the_window() {
    let (session, transport, _api) = connected_session().await;
    let mut changes = session.store().subscribe();

    transport.emit(typing("B", true));
    settle().await;
    tokio::time::advance(Duration::from_millis(2000)).await;
    transport.emit(typing("B", true));
    settle().await;

    tokio::time::advance(Duration::from_millis(2999)).await;
    settle().await;
    assert!(
        session.store().select(|s| s.is_typing("B")),
        "first timer must not clear the indicator"
    );

    let _ = changes.borrow_and_update();
    tokio::time::advance(Duration::from_millis(1)).await;
    settle().await;
    assert!(!session.store().select(|s| s.is_typing("B")));
    assert!(changes.has_changed().unwrap());

    let _ = changes.borrow_and_update();
    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    assert!(!changes.has_changed().unwrap(), "no second clear");
}

#[tokio::test(start_paused = true)]
async fn explicit_typing_stop_cancels_the_timer() {
    let (session, transport, _api) = connected_session().await;

    transport.emit(typing("B", true));
    settle().await;
    transport.emit(typing("B", false));
    settle().await;
    assert!(!session.store().select(|s| s.is_typing("B")));

    transport.emit(typing("B", true));
    settle().await;
    tokio::time::advance(Duration::from_millis(2500)).await;
    settle().await;
    assert!(session.store().select(|s| s.is_typing("B")));
}

#[tokio::test]
async fn selecting_conversation_marks_all_unread_in_one_batch() {
    let (session, transport, api) = connected_session().await;
    let mut conversation = Conversation::new("B");
    conversation.unread_count = 3;
    *api.conversations.lock().unwrap() = vec![conversation];
    api.history.lock().unwrap().insert(
        "B".into(),
        vec![
            message("u1", "B", "A", 1),
            message("mine", "A", "B", 2),
            message("u2", "B", "A", 3),
            message("u3", "B", "A", 4),
        ],
    );

    session.fetch_conversations().await.unwrap();
    assert_eq!(session.store().select(|s| s.unread_count("B")), 3);

    session.select_conversation("B").await;

    let state = session.store().snapshot();
    assert_eq!(state.unread_count("B"), 0);
    assert!(state.unread_ids_from("B").is_empty());
    assert_eq!(
        transport.mark_read_batches(),
        vec![vec!["u1".to_string(), "u2".to_string(), "u3".to_string()]]
    );
    assert!(api.mark_read_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn reopening_a_conversation_does_not_reacknowledge() {
    let (session, transport, api) = connected_session().await;
    api.history
        .lock()
        .unwrap()
        .insert("B".into(), vec![message("u1", "B", "A", 1)]);

    session.select_conversation("B").await;
    session.close_conversation();
    session.select_conversation("B").await;

    let state = session.store().snapshot();
    assert_eq!(state.messages_with("B")[0].status, MessageStatus::Read);
    assert_eq!(
        state.conversation("B").unwrap().last_message.as_ref().unwrap().status,
        MessageStatus::Read
    );
    assert_eq!(transport.mark_read_batches(), vec![vec!["u1".to_string()]]);
}

#[tokio::test]
async fn conversation_refresh_keeps_the_open_one_read() {
    let (session, _transport, api) = connected_session().await;
    session.select_conversation("B").await;

    let mut open = Conversation::new("B");
    open.unread_count = 2;
    let mut other = Conversation::new("C");
    other.unread_count = 1;
    *api.conversations.lock().unwrap() = vec![open, other];
    session.fetch_conversations().await.unwrap();

    let state = session.store().snapshot();
    assert_eq!(state.active_conversation.as_deref(), Some("B"));
    assert_eq!(state.unread_count("B"), 0);
    assert_eq!(state.unread_count("C"), 1);
}

#[tokio::test]
async fn mark_read_falls_back_to_rest_while_disconnected() {
    let transport = FakeTransport::manual();
    let api = FakeApi::new();
    api.history
        .lock()
        .unwrap()
        .insert("B".into(), vec![message("u1", "B", "A", 1), message("u2", "B", "A", 2)]);
    let session = session_with(&transport, &api, options());

    session.select_conversation("B").await;

    assert_eq!(
        *api.mark_read_calls.lock().unwrap(),
        vec![vec!["u1".to_string(), "u2".to_string()]]
    );
    assert!(transport.frames().is_empty());
}

#[tokio::test]
async fn nothing_fires_after_disconnect() {
    let (session, transport, _api) = connected_session().await;

    // Already queued for the session loop when the link goes away.
    transport.emit(TransportEvent::Message(message("late", "B", "A", 1)));
    session.disconnect();
    settle().await;

    assert_eq!(transport.emit(TransportEvent::Message(message("m2", "B", "A", 2))), 0);
    assert_eq!(transport.emit(typing("B", true)), 0);
    settle().await;

    let state = session.store().snapshot();
    assert!(state.messages_with("B").is_empty());
    assert_eq!(state.unread_count("B"), 0);
    assert!(!state.is_typing("B"));
    assert!(!state.ws_connected);
    assert!(transport.registry().is_empty());
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn message_for_inactive_conversation_counts_as_unread() {
    let (session, transport, _api) = connected_session().await;
    session.select_conversation("C").await;

    transport.emit(TransportEvent::Message(message("m1", "B", "A", 1)));
    settle().await;

    assert_eq!(session.store().select(|s| s.unread_count("B")), 1);
    assert!(transport.mark_read_batches().is_empty());
}

#[tokio::test]
async fn message_for_active_conversation_is_marked_read_immediately() {
    let (session, transport, _api) = connected_session().await;
    session.select_conversation("B").await;

    transport.emit(TransportEvent::Message(message("m1", "B", "A", 1)));
    settle().await;

    let state = session.store().snapshot();
    assert_eq!(state.unread_count("B"), 0);
    assert_eq!(transport.mark_read_batches(), vec![vec!["m1".to_string()]]);
    assert_eq!(state.messages_with("B")[0].status, MessageStatus::Read);
}

#[tokio::test]
async fn duplicate_message_is_ignored() {
    let (session, transport, _api) = connected_session().await;

    transport.emit(TransportEvent::Message(message("m1", "B", "A", 1)));
    transport.emit(TransportEvent::Message(message("m1", "B", "A", 1)));
    settle().await;

    let state = session.store().snapshot();
    assert_eq!(state.messages_with("B").len(), 1);
    assert_eq!(state.unread_count("B"), 1);
}

#[tokio::test]
async fn rest_failure_sets_error_and_keeps_subscriptions() {
    let (session, transport, api) = connected_session().await;
    api.fail_all.store(true, Ordering::SeqCst);

    assert!(session.fetch_conversations().await.is_err());
    let state = session.store().snapshot();
    assert_eq!(state.error.as_deref(), Some("Server exploded"));
    assert!(!state.loading_conversations);

    assert_eq!(transport.registry().len(), 5);
    transport.emit(TransportEvent::Message(message("m1", "B", "A", 1)));
    settle().await;
    assert_eq!(session.store().select(|s| s.unread_count("B")), 1);
}

#[tokio::test]
async fn subscriptions_use_the_session_key() {
    let (_session, transport, _api) = connected_session().await;

    let replaced = transport.on_message(SUBSCRIBER_KEY, Arc::new(|_: ChatMessage| {}));
    assert_eq!(transport.registry().len(), 5);
    replaced.unsubscribe();
    assert_eq!(transport.registry().len(), 4);
}

#[tokio::test]
async fn connection_states_follow_the_transport() {
    let transport = FakeTransport::manual();
    let api = FakeApi::new();
    let session = session_with(&transport, &api, options());
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);

    session.connect("A");
    session.connect("A");
    assert_eq!(session.connection_state(), ConnectionState::Connecting);
    assert_eq!(transport.connect_calls.load(Ordering::SeqCst), 1);

    transport.accept();
    wait_until(session.store(), |s| s.ws_connected).await;
    assert_eq!(session.connection_state(), ConnectionState::Connected);
    assert_eq!(session.user_id().as_deref(), Some("A"));
}

#[tokio::test]
async fn rejected_connect_ends_disconnected() {
    let transport = FakeTransport::manual();
    let api = FakeApi::new();
    let session = session_with(&transport, &api, options());

    session.connect("A");
    transport.reject("handshake refused");
    settle().await;

    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(transport.registry().is_empty());
    assert!(!session.store().select(|s| s.ws_connected));
}

#[tokio::test]
async fn dropped_link_tears_down_the_session() {
    let (session, transport, _api) = connected_session().await;
    transport.emit(typing("B", true));
    settle().await;

    transport.drop_link("server went away");
    settle().await;

    let state = session.store().snapshot();
    assert!(!state.ws_connected);
    assert!(!state.is_typing("B"));
    assert!(transport.registry().is_empty());
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(transport.connect_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_link_reconnects_after_delay() {
    let transport = FakeTransport::new();
    let api = FakeApi::new();
    let session = session_with(
        &transport,
        &api,
        SessionOptions {
            reconnect_delay: Some(Duration::from_secs(2)),
            ..SessionOptions::default()
        },
    );
    session.connect("A");
    settle().await;

    transport.drop_link("server went away");
    settle().await;
    assert_eq!(transport.connect_calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(transport.connect_calls.load(Ordering::SeqCst), 2);
    assert_eq!(session.connection_state(), ConnectionState::Connected);
    assert_eq!(transport.registry().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn explicit_disconnect_cancels_pending_reconnect() {
    let transport = FakeTransport::new();
    let api = FakeApi::new();
    let session = session_with(
        &transport,
        &api,
        SessionOptions {
            reconnect_delay: Some(Duration::from_secs(2)),
            ..SessionOptions::default()
        },
    );
    session.connect("A");
    settle().await;

    transport.drop_link("server went away");
    settle().await;
    session.disconnect();

    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(transport.connect_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn send_uses_socket_when_connected() {
    let (session, transport, api) = connected_session().await;

    session.send_message("B", "hello", Some("m0")).await.unwrap();

    match transport.frames().as_slice() {
        [ClientFrame::Message {
            recipient_id,
            content,
            reply_to_id,
            ..
        }] => {
            assert_eq!(recipient_id, "B");
            assert_eq!(content, "hello");
            assert_eq!(reply_to_id.as_deref(), Some("m0"));
        }
        frames => panic!("unexpected frames {frames:?}"),
    }
    assert!(api.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn send_falls_back_to_rest_when_socket_is_down() {
    let transport = FakeTransport::manual();
    let api = FakeApi::new();
    let session = session_with(&transport, &api, options());
    session.connect("A");

    session.send_message("B", "hello", None).await.unwrap();

    assert_eq!(
        *api.sent.lock().unwrap(),
        vec![("B".to_string(), "hello".to_string())]
    );
    let state = session.store().snapshot();
    let stored = &state.messages_with("B")[0];
    assert_eq!(stored.id, "rest-1");
    assert_eq!(stored.conversation_id.as_deref(), Some("B"));
}

#[tokio::test]
async fn send_without_user_fails() {
    let transport = FakeTransport::manual();
    let api = FakeApi::new();
    let session = session_with(&transport, &api, options());

    assert!(session.send_message("B", "hello", None).await.is_err());
}

#[tokio::test]
async fn disconnect_cancels_in_flight_history() {
    let (session, transport, api) = connected_session().await;
    api.stall_history.store(true, Ordering::SeqCst);
    api.history
        .lock()
        .unwrap()
        .insert("B".into(), vec![message("u1", "B", "A", 1)]);

    let select = session.select_conversation("B");
    tokio::pin!(select);
    tokio::select! {
        _ = &mut select => panic!("history should still be loading"),
        _ = settle() => {}
    }
    assert_eq!(
        session.store().select(|s| s.loading_history.clone()).as_deref(),
        Some("B")
    );

    session.disconnect();
    tokio::time::timeout(Duration::from_secs(1), select)
        .await
        .expect("cancelled request should return");
    assert!(transport.mark_read_batches().is_empty());
    assert!(api.mark_read_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn presence_without_last_seen_is_stamped_when_offline() {
    let (session, transport, _api) = connected_session().await;

    transport.emit(TransportEvent::Presence(PresenceEvent {
        user_id: "B".into(),
        online: true,
        last_seen: None,
    }));
    settle().await;
    assert!(session.store().select(|s| s.is_online("B")));

    transport.emit(TransportEvent::Presence(PresenceEvent {
        user_id: "B".into(),
        online: false,
        last_seen: None,
    }));
    settle().await;
    let state = session.store().snapshot();
    assert!(!state.is_online("B"));
    assert!(state.last_seen.contains_key("B"));
}

#[tokio::test]
async fn status_and_reactions_update_existing_messages() {
    let (session, transport, _api) = connected_session().await;
    transport.emit(TransportEvent::Message(message("m1", "A", "B", 1)));

    transport.emit(TransportEvent::Status(StatusEvent {
        message_ids: vec!["m1".into()],
        status: MessageStatus::Read,
    }));
    transport.emit(TransportEvent::Status(StatusEvent {
        message_ids: vec!["m1".into()],
        status: MessageStatus::Delivered,
    }));
    transport.emit(TransportEvent::Reaction(ReactionEvent {
        message_id: "m1".into(),
        reactions: vec![Reaction {
            user_id: "B".into(),
            emoji: "❤️".into(),
        }],
    }));
    settle().await;

    let state = session.store().snapshot();
    let stored = &state.messages_with("B")[0];
    assert_eq!(stored.status, MessageStatus::Read);
    assert_eq!(stored.reactions.len(), 1);
}

#[tokio::test]
async fn cache_survives_sessions() {
    let cache = Arc::new(MessageCache::in_memory().unwrap());
    let api = FakeApi::new();

    {
        let transport = FakeTransport::new();
        let session = session_with(&transport, &api, options().with_cache(cache.clone()));
        session.connect("A");
        settle().await;
        transport.emit(TransportEvent::Message(message("m1", "B", "A", 1)));
        transport.emit(TransportEvent::Message(message("m2", "A", "B", 2)));
        settle().await;
    }
    assert_eq!(cache.message_count().unwrap(), 2);

    let transport = FakeTransport::new();
    let session = session_with(&transport, &api, options().with_cache(cache.clone()));
    session.connect("A");
    settle().await;
    session.select_conversation("B").await;

    let state = session.store().snapshot();
    let ids: Vec<_> = state.messages_with("B").iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["m1", "m2"]);
    assert_eq!(transport.mark_read_batches(), vec![vec!["m1".to_string()]]);

    let cached = cache.conversation("A", "B", 10).unwrap();
    assert_eq!(cached[0].status, MessageStatus::Read);
}

#[tokio::test]
async fn cached_read_status_outlives_a_stale_history() {
    let cache = Arc::new(MessageCache::in_memory().unwrap());
    let mut read = message("m1", "B", "A", 1);
    read.status = MessageStatus::Read;
    cache.insert_message(&read).unwrap();

    let api = FakeApi::new();
    api.history
        .lock()
        .unwrap()
        .insert("B".into(), vec![message("m1", "B", "A", 1)]);
    let transport = FakeTransport::new();
    let session = session_with(&transport, &api, options().with_cache(cache.clone()));
    session.connect("A");
    settle().await;
    session.select_conversation("B").await;

    let state = session.store().snapshot();
    assert_eq!(state.messages_with("B").len(), 1);
    assert_eq!(state.messages_with("B")[0].status, MessageStatus::Read);
    assert!(transport.mark_read_batches().is_empty());
    assert_eq!(
        cache.conversation("A", "B", 10).unwrap()[0].status,
        MessageStatus::Read
    );
}

#[tokio::test]
async fn presence_refresh_fills_online_map() {
    let (session, _transport, api) = connected_session().await;
    api.presences.lock().unwrap().push(rust_social_chat::common::Presence {
        user_id: "B".into(),
        online: true,
        last_seen: None,
    });

    session
        .refresh_presence(&["B".to_string(), "C".to_string()])
        .await
        .unwrap();
    assert!(session.store().select(|s| s.is_online("B")));
    assert!(!session.store().select(|s| s.is_online("C")));
}
