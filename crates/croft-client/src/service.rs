use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use croft_types::api::{validate_content, SendMessageRequest};
use croft_types::events::{Feed, FeedCommand, FeedEvent};
use croft_types::models::{ChatMessage, FarmerProfile};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::ServiceEvent;
use crate::http::ApiClient;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Connection lifecycle. `Reconnecting` covers both "waiting out a backoff
/// delay" and "offline, waiting for the network to return".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    GivenUp,
}

/// One farmer's session against the community hub.
///
/// Cheap to clone; all clones share the session. Constructed explicitly,
/// with lifecycle owned by whoever owns the sign-in, not by module load.
#[derive(Clone)]
pub struct CommunityService {
    inner: Arc<ServiceInner>,
}

pub(crate) struct ServiceInner {
    config: ClientConfig,
    api: ApiClient,
    events_tx: broadcast::Sender<ServiceEvent>,
    session: Mutex<Session>,
}

struct Session {
    phase: ConnectionPhase,
    farmer_id: Option<String>,
    profile: Option<FarmerProfile>,
    /// Consecutive failed connection attempts; reset on success.
    attempts: u32,
    /// Session epoch. Bumped by connect/disconnect/network_offline so that
    /// tasks spawned for an older epoch see the mismatch and stand down.
    generation: u64,
    network_online: bool,
    reader: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    typing_clear: Option<JoinHandle<()>>,
    pending_reconnect: Option<JoinHandle<()>>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            farmer_id: None,
            profile: None,
            attempts: 0,
            generation: 0,
            network_online: true,
            reader: None,
            heartbeat: None,
            typing_clear: None,
            pending_reconnect: None,
        }
    }
}

impl ServiceInner {
    fn emit(&self, event: ServiceEvent) {
        let _ = self.events_tx.send(event);
    }

    fn emit_error(&self, e: &ClientError) {
        self.emit(ServiceEvent::Error(e.to_string()));
    }
}

impl CommunityService {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let api = ApiClient::new(&config)?;
        let (events_tx, _) = broadcast::channel(256);

        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                api,
                events_tx,
                session: Mutex::new(Session::default()),
            }),
        })
    }

    /// Subscribe to session events. Subscribers only see events emitted
    /// after they subscribe.
    pub fn events(&self) -> broadcast::Receiver<ServiceEvent> {
        self.inner.events_tx.subscribe()
    }

    pub async fn phase(&self) -> ConnectionPhase {
        self.inner.session.lock().await.phase
    }

    pub async fn profile(&self) -> Option<FarmerProfile> {
        self.inner.session.lock().await.profile.clone()
    }

    /// Establish the session: ensure the profile, open the feed, subscribe
    /// to all three feeds, mark presence online and start the background
    /// tasks. Guarded against concurrent re-entry: a second call while
    /// connecting or connected is an error, not a duplicate subscription.
    ///
    /// On failure the error is also emitted on the event stream and a
    /// reconnect is scheduled; `ConnectionState(true)` is never emitted for
    /// a failed attempt.
    pub async fn connect(&self, farmer_id: &str) -> Result<FarmerProfile, ClientError> {
        let farmer_id = farmer_id.trim();
        if farmer_id.is_empty() {
            return Err(ClientError::InvalidFarmerId);
        }

        let generation = {
            let mut session = self.inner.session.lock().await;
            match session.phase {
                ConnectionPhase::Connecting | ConnectionPhase::Connected => {
                    return Err(ClientError::AlreadyConnected)
                }
                _ => {}
            }
            if let Some(handle) = session.pending_reconnect.take() {
                handle.abort();
            }
            session.generation += 1;
            session.phase = ConnectionPhase::Connecting;
            session.farmer_id = Some(farmer_id.to_string());
            session.attempts = 0;
            session.generation
        };

        match establish(&self.inner, farmer_id, generation).await {
            Ok(profile) => Ok(profile),
            Err(ClientError::Superseded) => Err(ClientError::Superseded),
            Err(e) => {
                self.inner.emit_error(&e);
                revert_to_reconnecting(&self.inner, generation).await;
                Err(e)
            }
        }
    }

    /// Tear the session down: stop every background task, close the feed,
    /// mark presence offline (best effort) and emit `ConnectionState(false)`.
    /// Safe to call when never connected; every step no-ops on absent state.
    pub async fn disconnect(&self) {
        let (was_active, profile, farmer_id) = {
            let mut session = self.inner.session.lock().await;
            let was_active = matches!(
                session.phase,
                ConnectionPhase::Connecting | ConnectionPhase::Connected | ConnectionPhase::Reconnecting
            );
            session.generation += 1;
            session.phase = ConnectionPhase::Disconnected;
            session.attempts = 0;
            for handle in [
                session.reader.take(),
                session.heartbeat.take(),
                session.typing_clear.take(),
                session.pending_reconnect.take(),
            ]
            .into_iter()
            .flatten()
            {
                handle.abort();
            }
            (was_active, session.profile.take(), session.farmer_id.take())
        };

        // Best effort: failure is fine, the hub's ghost-presence cleanup
        // covers it once the socket drops.
        if let (Some(profile), Some(farmer_id)) = (profile, farmer_id) {
            if let Err(e) = self.inner.api.set_presence(&farmer_id, profile.id, false).await {
                debug!("offline presence write failed during disconnect: {}", e);
            }
        }

        if was_active {
            self.inner.emit(ServiceEvent::ConnectionState(false));
        }
    }

    /// Post a text message. Content is validated here with the same check
    /// the hub applies, so an invalid message never leaves the process.
    pub async fn send_text(
        &self,
        content: &str,
        reply_to: Option<Uuid>,
    ) -> Result<ChatMessage, ClientError> {
        validate_content(content)?;
        let (farmer_id, _) = self.require_connected().await?;

        let req = SendMessageRequest::Text {
            content: content.to_string(),
            reply_to,
        };
        match self.inner.api.send_message(&farmer_id, &req).await {
            Ok(message) => Ok(message),
            Err(e) => {
                self.inner.emit_error(&e);
                Err(e)
            }
        }
    }

    /// Upload a voice clip and post a message referencing it. Refuses while
    /// disconnected before any upload happens. If the upload succeeds and
    /// the insert then fails, the stored object is orphaned; no
    /// compensating delete is issued.
    pub async fn send_voice(
        &self,
        audio: Vec<u8>,
        duration_secs: f64,
        reply_to: Option<Uuid>,
    ) -> Result<ChatMessage, ClientError> {
        if audio.is_empty() {
            return Err(ClientError::InvalidVoice("empty audio payload"));
        }
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(ClientError::InvalidVoice("duration must be positive"));
        }
        let (farmer_id, _) = self.require_connected().await?;

        let name = voice_object_name(&farmer_id, Utc::now().timestamp_millis());
        let uploaded = match self.inner.api.upload_voice(&farmer_id, &name, audio).await {
            Ok(uploaded) => uploaded,
            Err(e) => {
                self.inner.emit_error(&e);
                return Err(e);
            }
        };
        debug!("uploaded voice object {} (sha256 {})", name, uploaded.sha256);

        let req = SendMessageRequest::Voice {
            voice_url: uploaded.url,
            voice_duration_secs: duration_secs,
            reply_to,
        };
        match self.inner.api.send_message(&farmer_id, &req).await {
            Ok(message) => Ok(message),
            Err(e) => {
                self.inner.emit_error(&e);
                Err(e)
            }
        }
    }

    /// Upsert this farmer's typing indicator. `true` schedules an automatic
    /// `set_typing(false)` after the quiet period; calling again within the
    /// window replaces the pending clear rather than stacking another.
    pub async fn set_typing(&self, is_typing: bool) -> Result<(), ClientError> {
        let (farmer_id, _) = self.require_connected().await?;

        if let Err(e) = self.inner.api.set_typing(&farmer_id, is_typing).await {
            self.inner.emit_error(&e);
            return Err(e);
        }

        let mut session = self.inner.session.lock().await;
        if let Some(handle) = session.typing_clear.take() {
            handle.abort();
        }
        if is_typing && session.phase == ConnectionPhase::Connected {
            let inner = self.inner.clone();
            let generation = session.generation;
            let quiet = self.inner.config.typing_quiet_period;
            session.typing_clear = Some(tokio::spawn(async move {
                tokio::time::sleep(quiet).await;
                auto_clear_typing(inner, generation).await;
            }));
        }
        Ok(())
    }

    /// One page of history, oldest-first. The hub serves newest-first pages;
    /// the reversal here gives callers ascending chronological order within
    /// the page, which is the contract they rely on. Page-boundary
    /// anomalies under concurrent writes are accepted.
    pub async fn get_messages(&self, limit: u32, offset: u32) -> Result<Vec<ChatMessage>, ClientError> {
        let (farmer_id, _) = self.require_connected().await?;
        let mut page = self.inner.api.get_messages(&farmer_id, limit, offset).await?;
        page.reverse();
        Ok(page)
    }

    /// Online farmers, most-recently-seen first.
    pub async fn online_farmers(&self) -> Result<Vec<FarmerProfile>, ClientError> {
        let (farmer_id, _) = self.require_connected().await?;
        Ok(self.inner.api.online_profiles(&farmer_id).await?)
    }

    /// Edit one of this farmer's messages. "No rows affected", whether
    /// missing or someone else's, comes back as [`ClientError::NotOwner`]
    /// without distinguishing the two.
    pub async fn edit_message(
        &self,
        message_id: Uuid,
        content: &str,
    ) -> Result<ChatMessage, ClientError> {
        validate_content(content)?;
        let (farmer_id, _) = self.require_connected().await?;

        match self.inner.api.edit_message(&farmer_id, message_id, content).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(ClientError::NotOwner),
            Err(e) => {
                self.inner.emit_error(&e);
                Err(e)
            }
        }
    }

    /// Delete one of this farmer's messages; same ownership contract as
    /// [`Self::edit_message`].
    pub async fn delete_message(&self, message_id: Uuid) -> Result<(), ClientError> {
        let (farmer_id, _) = self.require_connected().await?;

        match self.inner.api.delete_message(&farmer_id, message_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ClientError::NotOwner),
            Err(e) => {
                self.inner.emit_error(&e);
                Err(e)
            }
        }
    }

    /// Hint that the network went away. Suspends the feed and cancels any
    /// pending reconnect timer; the session waits for [`Self::network_online`].
    pub async fn network_offline(&self) {
        let was_live = {
            let mut session = self.inner.session.lock().await;
            session.network_online = false;
            if let Some(handle) = session.pending_reconnect.take() {
                handle.abort();
            }
            match session.phase {
                ConnectionPhase::Connected | ConnectionPhase::Connecting => {
                    session.generation += 1;
                    session.phase = ConnectionPhase::Reconnecting;
                    for handle in [session.reader.take(), session.heartbeat.take()]
                        .into_iter()
                        .flatten()
                    {
                        handle.abort();
                    }
                    true
                }
                _ => false,
            }
        };

        if was_live {
            info!("network offline, feed suspended");
            self.inner.emit(ServiceEvent::ConnectionState(false));
        }
    }

    /// Hint that the network is back. Feeds the reconnection coordinator
    /// rather than bypassing it: any pending backoff timer is replaced by
    /// one immediate attempt, so flapping cannot stack concurrent connects.
    pub async fn network_online(&self) {
        let mut session = self.inner.session.lock().await;
        session.network_online = true;
        if session.phase != ConnectionPhase::Reconnecting {
            return;
        }
        if let Some(handle) = session.pending_reconnect.take() {
            handle.abort();
        }
        info!("network online, reconnecting now");
        let inner = self.inner.clone();
        let generation = session.generation;
        session.pending_reconnect = Some(tokio::spawn(async move {
            attempt_reconnect(inner, generation).await;
        }));
    }

    async fn require_connected(&self) -> Result<(String, Uuid), ClientError> {
        let session = self.inner.session.lock().await;
        if session.phase != ConnectionPhase::Connected {
            return Err(ClientError::NotConnected);
        }
        match (&session.farmer_id, &session.profile) {
            (Some(farmer_id), Some(profile)) => Ok((farmer_id.clone(), profile.id)),
            _ => Err(ClientError::NotConnected),
        }
    }
}

/// The one connect path, shared by `connect()` and reconnect attempts.
/// Installs the session only if the epoch is still ours; a disconnect or a
/// newer connect that raced us wins, and we stand down.
async fn establish(
    inner: &Arc<ServiceInner>,
    farmer_id: &str,
    generation: u64,
) -> Result<FarmerProfile, ClientError> {
    let profile = inner.api.ensure_profile(farmer_id).await?;

    let feed_url = inner.config.feed_url()?;
    let (ws, _) = tokio::time::timeout(inner.config.connect_timeout, connect_async(feed_url.as_str()))
        .await
        .map_err(|_| ClientError::Timeout)?
        .map_err(|e| ClientError::Feed(e.to_string()))?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    send_command(
        &mut ws_tx,
        &FeedCommand::Identify {
            farmer_id: farmer_id.to_string(),
        },
    )
    .await?;
    let ready = wait_for_ready(&mut ws_rx, inner.config.request_timeout).await?;
    debug!("feed handshake complete for {}", ready.display_name);

    send_command(
        &mut ws_tx,
        &FeedCommand::Subscribe {
            feeds: vec![Feed::Messages, Feed::Presence, Feed::Typing],
        },
    )
    .await?;

    let profile = inner.api.set_presence(farmer_id, profile.id, true).await?;

    {
        let mut session = inner.session.lock().await;
        if session.generation != generation || session.phase != ConnectionPhase::Connecting {
            return Err(ClientError::Superseded);
        }
        session.phase = ConnectionPhase::Connected;
        session.attempts = 0;
        session.profile = Some(profile.clone());
        // Announce before the reader can forward anything: ConnectionState
        // is always the first event of a session.
        inner.emit(ServiceEvent::ConnectionState(true));
        session.reader = Some(tokio::spawn(read_feed(inner.clone(), ws_tx, ws_rx, generation)));
        session.heartbeat = Some(tokio::spawn(run_heartbeat(
            inner.clone(),
            farmer_id.to_string(),
            profile.id,
            generation,
        )));
    }

    info!("connected to community as {}", profile.display_name);
    Ok(profile)
}

async fn read_feed(inner: Arc<ServiceInner>, mut ws_tx: WsSink, mut ws_rx: WsSource, generation: u64) {
    loop {
        match ws_rx.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<FeedEvent>(&text) {
                Ok(event) => forward_event(&inner, event),
                Err(e) => warn!(
                    "unparseable feed event: {} -- raw: {}",
                    e,
                    &text[..text.len().min(200)]
                ),
            },
            Some(Ok(Message::Ping(payload))) => {
                if ws_tx.send(Message::Pong(payload)).await.is_err() {
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("feed stream error: {}", e);
                break;
            }
        }
    }

    handle_connection_lost(inner, generation).await;
}

fn forward_event(inner: &Arc<ServiceInner>, event: FeedEvent) {
    let event = match event {
        FeedEvent::Ready { .. } => return,
        FeedEvent::MessageCreate { message } => ServiceEvent::NewMessage(message),
        FeedEvent::MessageUpdate { message } => ServiceEvent::MessageUpdated(message),
        FeedEvent::MessageDelete { message_id } => ServiceEvent::MessageDeleted(message_id),
        FeedEvent::TypingUpdate { indicator } => ServiceEvent::TypingChanged(indicator),
        FeedEvent::PresenceUpdate { profile } => ServiceEvent::OnlineStatusChanged(profile),
    };
    inner.emit(event);
}

async fn handle_connection_lost(inner: Arc<ServiceInner>, generation: u64) {
    {
        let mut session = inner.session.lock().await;
        if session.generation != generation || session.phase != ConnectionPhase::Connected {
            // Deliberate teardown, or a newer session took over
            return;
        }
        session.phase = ConnectionPhase::Reconnecting;
        session.reader = None;
        if let Some(handle) = session.heartbeat.take() {
            handle.abort();
        }
    }

    warn!("feed connection lost, scheduling reconnect");
    inner.emit(ServiceEvent::ConnectionState(false));
    schedule_reconnect(&inner).await;
}

/// Single-flight scheduling: at most one pending attempt exists at a time,
/// and both the backoff timer and the network-online hint go through here.
async fn schedule_reconnect(inner: &Arc<ServiceInner>) {
    let mut session = inner.session.lock().await;
    if session.pending_reconnect.is_some() || session.phase != ConnectionPhase::Reconnecting {
        return;
    }
    if !session.network_online {
        debug!("offline, deferring reconnect until the network returns");
        return;
    }
    if session.attempts >= inner.config.max_reconnect_attempts {
        session.phase = ConnectionPhase::GivenUp;
        let attempts = session.attempts;
        drop(session);
        warn!("giving up after {} reconnect attempts", attempts);
        inner.emit(ServiceEvent::Error(format!(
            "giving up after {attempts} reconnect attempts"
        )));
        return;
    }

    let delay = backoff_delay(session.attempts);
    session.attempts += 1;
    debug!("reconnect attempt {} in {:?}", session.attempts, delay);

    let task_inner = inner.clone();
    let generation = session.generation;
    session.pending_reconnect = Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        attempt_reconnect(task_inner, generation).await;
    }));
}

// Returns a boxed, explicitly-`Send` future rather than being a plain
// `async fn`. This reconnect path is part of a spawn cycle
// (establish -> read_feed -> schedule_reconnect -> spawn(attempt_reconnect)
// -> establish); naming the future type here breaks the opaque auto-trait
// inference cycle that otherwise makes the spawned future appear non-`Send`.
fn attempt_reconnect(
    inner: Arc<ServiceInner>,
    generation: u64,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async move {
        let farmer_id = {
            let mut session = inner.session.lock().await;
            if session.generation != generation || session.phase != ConnectionPhase::Reconnecting {
                return;
            }
            session.pending_reconnect = None;
            session.phase = ConnectionPhase::Connecting;
            match &session.farmer_id {
                Some(farmer_id) => farmer_id.clone(),
                None => return,
            }
        };

        match establish(&inner, &farmer_id, generation).await {
            Ok(_) => {}
            Err(ClientError::Superseded) => {}
            Err(e) => {
                inner.emit_error(&e);
                revert_to_reconnecting(&inner, generation).await;
            }
        }
    })
}

async fn revert_to_reconnecting(inner: &Arc<ServiceInner>, generation: u64) {
    {
        let mut session = inner.session.lock().await;
        if session.generation != generation || session.phase != ConnectionPhase::Connecting {
            return;
        }
        session.phase = ConnectionPhase::Reconnecting;
    }
    schedule_reconnect(inner).await;
}

async fn auto_clear_typing(inner: Arc<ServiceInner>, generation: u64) {
    let farmer_id = {
        let mut session = inner.session.lock().await;
        if session.generation != generation || session.phase != ConnectionPhase::Connected {
            return;
        }
        session.typing_clear = None;
        match &session.farmer_id {
            Some(farmer_id) => farmer_id.clone(),
            None => return,
        }
    };

    if let Err(e) = inner.api.set_typing(&farmer_id, false).await {
        warn!("typing auto-clear failed: {}", e);
        inner.emit_error(&e);
    }
}

async fn run_heartbeat(inner: Arc<ServiceInner>, farmer_id: String, profile_id: Uuid, generation: u64) {
    let mut interval = tokio::time::interval(inner.config.heartbeat_interval);
    // Presence was just written by establish; skip the immediate tick.
    interval.tick().await;

    loop {
        interval.tick().await;
        {
            let session = inner.session.lock().await;
            if session.generation != generation || session.phase != ConnectionPhase::Connected {
                return;
            }
        }
        if let Err(e) = inner.api.set_presence(&farmer_id, profile_id, true).await {
            warn!("presence heartbeat failed: {}", e);
        }
    }
}

async fn send_command(ws_tx: &mut WsSink, cmd: &FeedCommand) -> Result<(), ClientError> {
    let text = serde_json::to_string(cmd).map_err(|e| ClientError::Feed(e.to_string()))?;
    ws_tx
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| ClientError::Feed(e.to_string()))
}

async fn wait_for_ready(ws_rx: &mut WsSource, deadline: Duration) -> Result<FarmerProfile, ClientError> {
    let handshake = async {
        while let Some(msg) = ws_rx.next().await {
            let msg = msg.map_err(|e| ClientError::Feed(e.to_string()))?;
            if let Message::Text(text) = msg {
                match serde_json::from_str::<FeedEvent>(&text) {
                    Ok(FeedEvent::Ready { profile }) => return Ok(profile),
                    Ok(_) => continue,
                    Err(e) => warn!("unparseable handshake frame: {}", e),
                }
            }
        }
        Err(ClientError::Feed("feed closed during handshake".into()))
    };

    tokio::time::timeout(deadline, handshake)
        .await
        .map_err(|_| ClientError::Timeout)?
}

fn backoff_delay(attempt: u32) -> Duration {
    // 2^attempt seconds; the shift cap only guards overflow, the attempt
    // ceiling lives in the config.
    Duration::from_secs(1u64 << attempt.min(32))
}

fn voice_object_name(farmer_id: &str, now_ms: i64) -> String {
    let safe: String = farmer_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .take(32)
        .collect();
    format!("voice_{safe}_{now_ms}.webm")
}

#[cfg(test)]
mod tests {
    use super::*;
    use croft_types::api::ContentError;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(4), Duration::from_secs(16));
    }

    #[test]
    fn voice_names_are_flat_and_derived_from_identity() {
        let name = voice_object_name("F42", 1722945600000);
        assert_eq!(name, "voice_F42_1722945600000.webm");

        // Anything that could escape the voice directory is mapped away
        let name = voice_object_name("../evil farmer", 1);
        assert!(!name.contains('/'));
        assert!(!name.contains(' '));
    }

    #[tokio::test]
    async fn operations_require_a_connection() {
        let service = CommunityService::new(ClientConfig::default()).unwrap();

        assert!(matches!(
            service.send_text("hello", None).await,
            Err(ClientError::NotConnected)
        ));
        // Voice refuses before any upload is attempted
        assert!(matches!(
            service.send_voice(vec![1, 2, 3], 2.0, None).await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            service.set_typing(true).await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            service.get_messages(10, 0).await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn content_is_validated_before_anything_else() {
        let service = CommunityService::new(ClientConfig::default()).unwrap();

        assert!(matches!(
            service.send_text("   ", None).await,
            Err(ClientError::InvalidContent(ContentError::Empty))
        ));
        let too_long = "x".repeat(croft_types::api::MAX_MESSAGE_CHARS + 1);
        assert!(matches!(
            service.send_text(&too_long, None).await,
            Err(ClientError::InvalidContent(ContentError::TooLong(_)))
        ));
    }

    #[tokio::test]
    async fn empty_voice_payloads_are_rejected_locally() {
        let service = CommunityService::new(ClientConfig::default()).unwrap();

        assert!(matches!(
            service.send_voice(Vec::new(), 2.0, None).await,
            Err(ClientError::InvalidVoice(_))
        ));
        assert!(matches!(
            service.send_voice(vec![1], 0.0, None).await,
            Err(ClientError::InvalidVoice(_))
        ));
    }

    #[tokio::test]
    async fn blank_farmer_ids_are_rejected() {
        let service = CommunityService::new(ClientConfig::default()).unwrap();
        assert!(matches!(
            service.connect("   ").await,
            Err(ClientError::InvalidFarmerId)
        ));
        assert_eq!(service.phase().await, ConnectionPhase::Disconnected);
    }
}
