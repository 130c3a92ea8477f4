use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use croft_db::Database;
use croft_types::events::{Feed, FeedCommand, FeedEvent};
use croft_types::models::FarmerProfile;

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: the hub sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a client gets to identify before the socket is closed.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle one WebSocket feed connection: identify handshake, Ready, then
/// the event relay loop. The farmer must already have a profile; clients
/// ensure it over REST before dialing the feed.
pub async fn handle_feed(socket: WebSocket, dispatcher: Dispatcher, db: Arc<Database>) {
    let (mut sender, mut receiver) = socket.split();

    let farmer_id = match wait_for_identify(&mut receiver).await {
        Some(id) => id,
        None => {
            warn!("feed client failed to identify, closing");
            return;
        }
    };

    let profile = {
        let db = db.clone();
        let fid = farmer_id.clone();
        let looked_up = tokio::task::spawn_blocking(move || db.get_profile_by_farmer_id(&fid)).await;
        match looked_up {
            Ok(Ok(Some(row))) => match row.into_profile() {
                Ok(profile) => profile,
                Err(e) => {
                    warn!("corrupt profile row for {}: {}", farmer_id, e);
                    return;
                }
            },
            Ok(Ok(None)) => {
                warn!("feed identify for unknown farmer {}, closing", farmer_id);
                return;
            }
            Ok(Err(e)) => {
                warn!("profile lookup failed for {}: {}", farmer_id, e);
                return;
            }
            Err(e) => {
                warn!("spawn_blocking join error: {}", e);
                return;
            }
        }
    };

    info!("{} ({}) connected to feed", profile.display_name, profile.id);

    let conn_id = dispatcher.register_connection(profile.id).await;

    let ready = FeedEvent::Ready {
        profile: profile.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        let _ = dispatcher.end_connection(profile.id, conn_id).await;
        return;
    }

    let mut broadcast_rx = dispatcher.subscribe();

    // Per-connection feed subscriptions (shared between send and recv tasks).
    let subscriptions: Arc<std::sync::RwLock<HashSet<Feed>>> =
        Arc::new(std::sync::RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward subscribed broadcasts to the client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("feed receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if let Some(feed) = event.feed() {
                        let subs = send_subscriptions.read()
                            .expect("subscription lock poisoned");
                        if !subs.contains(&feed) {
                            continue;
                        }
                    }

                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from the client
    let recv_subscriptions = subscriptions.clone();
    let recv_name = profile.display_name.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<FeedCommand>(&text) {
                    Ok(FeedCommand::Identify { .. }) => {} // Already handled
                    Ok(FeedCommand::Subscribe { feeds }) => {
                        info!("{} subscribing to {} feeds", recv_name, feeds.len());
                        let mut subs = recv_subscriptions.write()
                            .expect("subscription lock poisoned");
                        *subs = feeds.into_iter().collect();
                    }
                    Err(e) => {
                        warn!(
                            "{} bad feed command: {} -- raw: {}",
                            recv_name,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Only the connection that still owns the profile cleans up presence;
    // a reconnect that raced ahead of us must not be marked offline.
    if dispatcher.end_connection(profile.id, conn_id).await {
        mark_offline(&dispatcher, &db, &profile).await;
    }

    info!("{} ({}) disconnected from feed", profile.display_name, profile.id);
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
) -> Option<String> {
    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(FeedCommand::Identify { farmer_id }) =
                    serde_json::from_str::<FeedCommand>(&text)
                {
                    if farmer_id.trim().is_empty() {
                        return None;
                    }
                    return Some(farmer_id);
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

/// Best-effort ghost-presence cleanup for a dropped connection. Skipped if
/// the profile already went offline through the REST path.
async fn mark_offline(dispatcher: &Dispatcher, db: &Arc<Database>, profile: &FarmerProfile) {
    let db = db.clone();
    let profile_id = profile.id.to_string();

    let updated = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<croft_db::models::ProfileRow>> {
        match db.get_profile(&profile_id)? {
            Some(row) if row.online => db.set_presence(&profile_id, false, &croft_db::now_ts()),
            _ => Ok(None),
        }
    })
    .await;

    match updated {
        Ok(Ok(Some(row))) => match row.into_profile() {
            Ok(profile) => dispatcher.broadcast(FeedEvent::PresenceUpdate { profile }),
            Err(e) => warn!("corrupt profile row after offline cleanup: {}", e),
        },
        Ok(Ok(None)) => {}
        Ok(Err(e)) => warn!("offline cleanup failed for {}: {}", profile.id, e),
        Err(e) => warn!("spawn_blocking join error: {}", e),
    }
}
