//! Integration test: run the hub on a loopback port and drive real client
//! sessions end-to-end: profile creation, message delivery over the feed,
//! typing auto-clear, presence, pagination, ownership checks, voice upload.

use std::net::SocketAddr;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

use croft_client::{ClientConfig, ClientError, CommunityService, ConnectionPhase, ServiceEvent};
use croft_types::models::MessageKind;

async fn spawn_hub() -> (SocketAddr, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let state = croft_server::build_state(&dir.path().join("hub.db"), dir.path().join("voice"))
        .await
        .unwrap();
    let router = croft_server::build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, dir)
}

fn client(addr: SocketAddr) -> CommunityService {
    let mut config = ClientConfig::new(format!("http://{addr}").parse().unwrap());
    // Short quiet period so the auto-clear test doesn't wait 3 seconds
    config.typing_quiet_period = Duration::from_millis(300);
    CommunityService::new(config).unwrap()
}

/// Wait (bounded) for the first event the predicate accepts, skipping others.
async fn next_matching<T>(
    rx: &mut broadcast::Receiver<ServiceEvent>,
    mut pred: impl FnMut(ServiceEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(out) = pred(event) {
                        return out;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event stream closed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Feed subscriptions are installed by the hub's receive loop; give it a
/// moment before relying on cross-client delivery.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn connect_creates_profile_and_announces_once() {
    let (addr, _dir) = spawn_hub().await;
    let service = client(addr);
    let mut rx = service.events();

    let profile = service.connect("F42").await.unwrap();
    assert_eq!(profile.display_name, "Farmer F42");
    assert!(profile.online);
    assert_eq!(service.phase().await, ConnectionPhase::Connected);

    // The first session event is ConnectionState(true)
    let first = rx.recv().await.unwrap();
    assert!(matches!(first, ServiceEvent::ConnectionState(true)));

    // ...and it fires exactly once per session
    tokio::time::sleep(Duration::from_millis(300)).await;
    let mut extra_connected = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, ServiceEvent::ConnectionState(true)) {
            extra_connected += 1;
        }
    }
    assert_eq!(extra_connected, 0);

    service.disconnect().await;
    assert_eq!(service.phase().await, ConnectionPhase::Disconnected);
}

#[tokio::test]
async fn disconnect_without_connect_is_a_noop() {
    let (addr, _dir) = spawn_hub().await;
    let service = client(addr);
    let mut rx = service.events();

    service.disconnect().await;
    assert_eq!(service.phase().await, ConnectionPhase::Disconnected);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn concurrent_connects_are_rejected() {
    let (addr, _dir) = spawn_hub().await;
    let service = client(addr);

    service.connect("alice").await.unwrap();
    assert!(matches!(
        service.connect("alice").await,
        Err(ClientError::AlreadyConnected)
    ));

    service.disconnect().await;
    service.connect("alice").await.unwrap();
}

#[tokio::test]
async fn text_messages_reach_other_farmers() {
    let (addr, _dir) = spawn_hub().await;
    let alice = client(addr);
    let bob = client(addr);

    alice.connect("alice").await.unwrap();
    bob.connect("bob").await.unwrap();
    let mut bob_rx = bob.events();
    settle().await;

    let sent = alice.send_text("hello from the paddock", None).await.unwrap();
    let alice_profile = alice.profile().await.unwrap();
    assert_eq!(sent.profile_id, alice_profile.id);
    assert_eq!(sent.author_name, "Farmer alice");
    assert_eq!(sent.kind, MessageKind::Text);
    assert!(!sent.edited);

    let received = next_matching(&mut bob_rx, |event| match event {
        ServiceEvent::NewMessage(m) if m.content.as_deref() == Some("hello from the paddock") => {
            Some(m)
        }
        _ => None,
    })
    .await;
    assert_eq!(received.id, sent.id);
    assert_eq!(received.author_name, "Farmer alice");
}

#[tokio::test]
async fn replies_reference_their_parent() {
    let (addr, _dir) = spawn_hub().await;
    let alice = client(addr);
    alice.connect("alice").await.unwrap();

    let parent = alice.send_text("anyone seen rain?", None).await.unwrap();
    let reply = alice.send_text("two inches here", Some(parent.id)).await.unwrap();
    assert_eq!(reply.reply_to, Some(parent.id));

    // A dangling reply is a caller error, surfaced as a hub rejection
    let bogus = uuid::Uuid::new_v4();
    assert!(matches!(
        alice.send_text("into the void", Some(bogus)).await,
        Err(ClientError::Api { status: 400, .. })
    ));
}

#[tokio::test]
async fn history_pages_are_ascending_and_disjoint() {
    let (addr, _dir) = spawn_hub().await;
    let alice = client(addr);
    alice.connect("alice").await.unwrap();

    for n in 1..=5 {
        alice.send_text(&format!("m{n}"), None).await.unwrap();
    }

    let newest = alice.get_messages(2, 0).await.unwrap();
    let older = alice.get_messages(2, 2).await.unwrap();

    // Each page is ascending within itself
    let newest_texts: Vec<_> = newest.iter().filter_map(|m| m.content.clone()).collect();
    let older_texts: Vec<_> = older.iter().filter_map(|m| m.content.clone()).collect();
    assert_eq!(newest_texts, vec!["m4", "m5"]);
    assert_eq!(older_texts, vec!["m2", "m3"]);

    // Pages are disjoint and concatenate in ascending order
    let mut ids: Vec<_> = older.iter().chain(newest.iter()).map(|m| m.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);

    let combined: Vec<_> = older
        .iter()
        .chain(newest.iter())
        .map(|m| m.created_at)
        .collect();
    assert!(combined.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn first_connect_posts_a_join_notice() {
    let (addr, _dir) = spawn_hub().await;
    let alice = client(addr);
    alice.connect("alice").await.unwrap();

    let page = alice.get_messages(10, 0).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].kind, MessageKind::System);
    assert_eq!(page[0].content.as_deref(), Some("Farmer alice joined the community"));

    // Reconnecting as the same farmer does not post another
    alice.disconnect().await;
    alice.connect("alice").await.unwrap();
    assert_eq!(alice.get_messages(10, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn edits_and_deletes_are_owner_scoped() {
    let (addr, _dir) = spawn_hub().await;
    let alice = client(addr);
    let bob = client(addr);

    alice.connect("alice").await.unwrap();
    bob.connect("bob").await.unwrap();
    let mut bob_rx = bob.events();
    settle().await;

    let msg = alice.send_text("draft", None).await.unwrap();

    // Not the owner: indistinguishable from a missing message
    assert!(matches!(
        bob.edit_message(msg.id, "hijack").await,
        Err(ClientError::NotOwner)
    ));
    assert!(matches!(
        bob.delete_message(msg.id).await,
        Err(ClientError::NotOwner)
    ));

    let edited = alice.edit_message(msg.id, "final").await.unwrap();
    assert!(edited.edited);
    assert_eq!(edited.content.as_deref(), Some("final"));

    let update = next_matching(&mut bob_rx, |event| match event {
        ServiceEvent::MessageUpdated(m) if m.id == msg.id => Some(m),
        _ => None,
    })
    .await;
    assert_eq!(update.content.as_deref(), Some("final"));

    alice.delete_message(msg.id).await.unwrap();
    next_matching(&mut bob_rx, |event| match event {
        ServiceEvent::MessageDeleted(id) if id == msg.id => Some(()),
        _ => None,
    })
    .await;

    // Once gone, the owner no longer owns it either
    assert!(matches!(
        alice.delete_message(msg.id).await,
        Err(ClientError::NotOwner)
    ));
}

#[tokio::test]
async fn typing_auto_clears_after_quiet_period() {
    let (addr, _dir) = spawn_hub().await;
    let alice = client(addr);
    let bob = client(addr);

    alice.connect("alice").await.unwrap();
    bob.connect("bob").await.unwrap();
    let mut bob_rx = bob.events();
    settle().await;

    let alice_id = alice.profile().await.unwrap().id;

    alice.set_typing(true).await.unwrap();
    let on = next_matching(&mut bob_rx, |event| match event {
        ServiceEvent::TypingChanged(t) if t.profile_id == alice_id && t.typing => Some(t),
        _ => None,
    })
    .await;
    assert_eq!(on.display_name, "Farmer alice");

    // A refresh inside the window replaces the pending clear
    tokio::time::sleep(Duration::from_millis(150)).await;
    alice.set_typing(true).await.unwrap();

    next_matching(&mut bob_rx, |event| match event {
        ServiceEvent::TypingChanged(t) if t.profile_id == alice_id && !t.typing => Some(()),
        _ => None,
    })
    .await;

    // ...and exactly one clear arrives for the whole burst
    tokio::time::sleep(Duration::from_secs(1)).await;
    let mut clears = 1;
    while let Ok(event) = bob_rx.try_recv() {
        if let ServiceEvent::TypingChanged(t) = event {
            if t.profile_id == alice_id && !t.typing {
                clears += 1;
            }
        }
    }
    assert_eq!(clears, 1);
}

#[tokio::test]
async fn two_farmers_typing_keep_separate_indicators() {
    let (addr, _dir) = spawn_hub().await;
    let alice = client(addr);
    let bob = client(addr);
    let carol = client(addr);

    alice.connect("alice").await.unwrap();
    bob.connect("bob").await.unwrap();
    carol.connect("carol").await.unwrap();
    let mut carol_rx = carol.events();
    settle().await;

    alice.set_typing(true).await.unwrap();
    bob.set_typing(true).await.unwrap();

    let alice_id = alice.profile().await.unwrap().id;
    let bob_id = bob.profile().await.unwrap().id;

    let mut seen = Vec::new();
    while seen.len() < 2 {
        let t = next_matching(&mut carol_rx, |event| match event {
            ServiceEvent::TypingChanged(t) if t.typing => Some(t),
            _ => None,
        })
        .await;
        if !seen.contains(&t.profile_id) {
            seen.push(t.profile_id);
        }
    }
    assert!(seen.contains(&alice_id));
    assert!(seen.contains(&bob_id));
}

#[tokio::test]
async fn voice_messages_upload_and_play_back() {
    let (addr, _dir) = spawn_hub().await;
    let alice = client(addr);
    let bob = client(addr);

    alice.connect("alice").await.unwrap();
    bob.connect("bob").await.unwrap();
    let mut bob_rx = bob.events();
    settle().await;

    let audio = vec![7u8; 2048];
    let msg = alice.send_voice(audio.clone(), 2.5, None).await.unwrap();
    assert_eq!(msg.kind, MessageKind::Voice);
    assert_eq!(msg.voice_duration_secs, Some(2.5));
    let url = msg.voice_url.clone().expect("voice message carries a url");
    assert!(url.starts_with("/voice/"));

    // The public URL serves the original bytes back
    let fetched = reqwest::get(format!("http://{addr}{url}")).await.unwrap();
    assert_eq!(fetched.headers()["content-type"], "audio/webm");
    let bytes = fetched.bytes().await.unwrap();
    assert_eq!(bytes.as_ref(), audio.as_slice());

    let received = next_matching(&mut bob_rx, |event| match event {
        ServiceEvent::NewMessage(m) if m.kind == MessageKind::Voice => Some(m),
        _ => None,
    })
    .await;
    assert_eq!(received.voice_url.as_deref(), Some(url.as_str()));
}

#[tokio::test]
async fn presence_tracks_connection_lifecycle() {
    let (addr, _dir) = spawn_hub().await;
    let alice = client(addr);
    let bob = client(addr);

    alice.connect("alice").await.unwrap();
    bob.connect("bob").await.unwrap();
    settle().await;

    // Most recently seen first
    let online = bob.online_farmers().await.unwrap();
    let names: Vec<_> = online.iter().map(|p| p.display_name.as_str()).collect();
    assert_eq!(names, vec!["Farmer bob", "Farmer alice"]);

    let mut bob_rx = bob.events();
    let alice_id = alice.profile().await.unwrap().id;
    alice.disconnect().await;

    let gone = next_matching(&mut bob_rx, |event| match event {
        ServiceEvent::OnlineStatusChanged(p) if p.id == alice_id && !p.online => Some(p),
        _ => None,
    })
    .await;
    assert_eq!(gone.display_name, "Farmer alice");

    let online = bob.online_farmers().await.unwrap();
    assert_eq!(online.len(), 1);
    assert_eq!(online[0].display_name, "Farmer bob");
}

#[tokio::test]
async fn network_hints_drive_one_clean_reconnect() {
    let (addr, _dir) = spawn_hub().await;
    let service = client(addr);
    service.connect("alice").await.unwrap();
    let mut rx = service.events();

    service.network_offline().await;
    next_matching(&mut rx, |event| {
        matches!(event, ServiceEvent::ConnectionState(false)).then_some(())
    })
    .await;
    assert_eq!(service.phase().await, ConnectionPhase::Reconnecting);

    service.network_online().await;
    next_matching(&mut rx, |event| {
        matches!(event, ServiceEvent::ConnectionState(true)).then_some(())
    })
    .await;
    assert_eq!(service.phase().await, ConnectionPhase::Connected);

    // No duplicate session came up behind our back
    tokio::time::sleep(Duration::from_millis(300)).await;
    let mut extra = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, ServiceEvent::ConnectionState(true)) {
            extra += 1;
        }
    }
    assert_eq!(extra, 0);

    service.send_text("back online", None).await.unwrap();
}

#[tokio::test]
async fn gives_up_after_max_attempts_then_allows_fresh_connect() {
    // A port with nothing listening: bind, note the address, drop
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = ClientConfig::new(format!("http://{addr}").parse().unwrap());
    config.max_reconnect_attempts = 2;
    config.request_timeout = Duration::from_secs(2);
    let service = CommunityService::new(config).unwrap();
    let mut rx = service.events();

    assert!(service.connect("alice").await.is_err());
    assert_eq!(service.phase().await, ConnectionPhase::Reconnecting);

    // Initial failure, two backoff attempts (1s, 2s), then the give-up notice
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(service.phase().await, ConnectionPhase::GivenUp);

    let mut errors = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, ServiceEvent::Error(_)) {
            errors += 1;
        }
    }
    assert_eq!(errors, 4);

    // Nothing further is scheduled after giving up
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(rx.try_recv().is_err());

    // An explicit connect starts a fresh attempt sequence
    let retry = service.connect("alice").await;
    assert!(!matches!(retry, Err(ClientError::AlreadyConnected)));
    assert!(retry.is_err());
}
