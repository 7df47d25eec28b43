//! Battle transport connection manager
//!
//! Owns the single per-match socket. Inbound frames are decoded into
//! [`BattleEvent`]s and fanned out to listeners registered per [`EventKind`];
//! outbound intents are encoded and written by the same background task.
//! Unexpected closures trigger a bounded reconnection loop.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use reqwest::Url;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, warn};

use crate::config::TransportConfig;

use super::protocol::{
    BattleAction, ClientFrame, MatchOverResult, MatchState, ParticipantJoined, ParticipantLeft,
    RoundResult, ServerFrame,
};
use super::IntentSink;

pub type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// An open transport, split into its write and read halves
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens transports to a battle room URL
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str) -> Result<Link, TransportError>;
}

/// Production connector backed by tokio-tungstenite
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Link, TransportError> {
        let (socket, _response) = tokio_tungstenite::connect_async(url).await?;
        let (sink, stream) = socket.split();
        Ok(Link {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

/// Event categories listeners can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MatchState,
    RoundResult,
    MatchOver,
    ParticipantJoined,
    ParticipantLeft,
    TransportError,
    ConnectionFailed,
}

/// Decoded inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum BattleEvent {
    MatchState(MatchState),
    RoundResult(RoundResult),
    MatchOver(MatchOverResult),
    ParticipantJoined(ParticipantJoined),
    ParticipantLeft(ParticipantLeft),
    /// Socket error or an `error` frame from the server
    TransportError { message: String },
    /// Reconnection exhausted; no further attempts are made
    ConnectionFailed,
}

impl BattleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BattleEvent::MatchState(_) => EventKind::MatchState,
            BattleEvent::RoundResult(_) => EventKind::RoundResult,
            BattleEvent::MatchOver(_) => EventKind::MatchOver,
            BattleEvent::ParticipantJoined(_) => EventKind::ParticipantJoined,
            BattleEvent::ParticipantLeft(_) => EventKind::ParticipantLeft,
            BattleEvent::TransportError { .. } => EventKind::TransportError,
            BattleEvent::ConnectionFailed => EventKind::ConnectionFailed,
        }
    }
}

impl From<ServerFrame> for BattleEvent {
    fn from(frame: ServerFrame) -> Self {
        match frame {
            ServerFrame::GameState(state) => BattleEvent::MatchState(state),
            ServerFrame::RoundResult(result) => BattleEvent::RoundResult(result),
            ServerFrame::GameOver(result) => BattleEvent::MatchOver(result),
            ServerFrame::PlayerJoined(joined) => BattleEvent::ParticipantJoined(joined),
            ServerFrame::PlayerLeft(left) => BattleEvent::ParticipantLeft(left),
            ServerFrame::Error(payload) => BattleEvent::TransportError {
                message: payload.message,
            },
        }
    }
}

/// Event handler; receives only the decoded payload
pub type Handler = Arc<dyn Fn(&BattleEvent) + Send + Sync>;

/// Token returned by [`ConnectionManager::on`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    handlers: DashMap<EventKind, Vec<(ListenerId, Handler)>>,
}

impl Listeners {
    fn add(&self, kind: EventKind, handler: Handler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.entry(kind).or_default().push((id, handler));
        id
    }

    fn remove(&self, kind: EventKind, id: ListenerId) -> bool {
        self.handlers
            .get_mut(&kind)
            .map(|mut entry| {
                let before = entry.len();
                entry.retain(|(existing, _)| *existing != id);
                entry.len() != before
            })
            .unwrap_or(false)
    }

    fn clear(&self) {
        self.handlers.clear();
    }

    fn emit(&self, event: &BattleEvent) {
        // Snapshot first so handlers may subscribe or unsubscribe while running.
        let handlers: Vec<Handler> = self
            .handlers
            .get(&event.kind())
            .map(|entry| entry.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default();

        for handler in handlers {
            handler(event);
        }
    }
}

/// State of the currently bound transport
struct ActiveLink {
    match_id: String,
    outbound: mpsc::UnboundedSender<Message>,
    shutdown: Option<oneshot::Sender<()>>,
    open: Arc<AtomicBool>,
}

/// Connection manager for one battle room at a time
pub struct ConnectionManager {
    config: TransportConfig,
    connector: Arc<dyn Connector>,
    listeners: Arc<Listeners>,
    active: Mutex<Option<ActiveLink>>,
    /// Bumped by every `connect` and `disconnect`; a pending open that sees
    /// a different value was superseded
    generation: AtomicU64,
}

impl ConnectionManager {
    pub fn new(config: TransportConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            listeners: Arc::new(Listeners::default()),
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Open a transport bound to `match_id`, replacing any previous one.
    /// Resolves once the transport is open, or with
    /// [`TransportError::Cancelled`] if `disconnect()` ran while opening.
    pub async fn connect(
        &self,
        match_id: &str,
        viewer_id: &str,
        viewer_name: &str,
    ) -> Result<(), TransportError> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.close_transport();

        let url = self.room_url(match_id, viewer_id, viewer_name)?;
        info!(match_id = %match_id, url = %url, "Connecting to battle room");

        let link = self.connector.open(&url).await.map_err(|e| {
            error!(match_id = %match_id, error = %e, "Battle transport failed to open");
            e
        })?;

        let mut active = self.active.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            info!(match_id = %match_id, "Connect superseded while opening, dropping transport");
            drop(link);
            return Err(TransportError::Cancelled);
        }

        info!(match_id = %match_id, "Battle transport open");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let open = Arc::new(AtomicBool::new(true));

        let task = TransportTask {
            match_id: match_id.to_string(),
            url,
            connector: self.connector.clone(),
            listeners: self.listeners.clone(),
            open: open.clone(),
            max_reconnect_attempts: self.config.max_reconnect_attempts,
            reconnect_delay: self.config.reconnect_delay,
        };
        tokio::spawn(task.run(link, outbound_rx, shutdown_rx));

        *active = Some(ActiveLink {
            match_id: match_id.to_string(),
            outbound: outbound_tx,
            shutdown: Some(shutdown_tx),
            open,
        });

        Ok(())
    }

    /// Close with a normal-closure code and drop every listener.
    /// Never triggers reconnection.
    pub fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.close_transport();
        self.listeners.clear();
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&BattleEvent) + Send + Sync + 'static,
    {
        self.listeners.add(kind, Arc::new(handler))
    }

    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.listeners.remove(kind, id)
    }

    pub fn is_connected(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .map(|active| active.open.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Room of the bound transport, if any
    pub fn match_id(&self) -> Option<String> {
        self.active.lock().as_ref().map(|active| active.match_id.clone())
    }

    pub fn send_action(&self, action: &BattleAction) {
        info!(player_id = %action.player_id, "Sending player action");
        self.send_frame(&ClientFrame::PlayerAction(action.clone()));
    }

    pub fn send_ready(&self) {
        info!("Sending ready");
        self.send_frame(&ClientFrame::PlayerReady);
    }

    fn send_frame(&self, frame: &ClientFrame) {
        let active = self.active.lock();
        let Some(active) = active
            .as_ref()
            .filter(|active| active.open.load(Ordering::Acquire))
        else {
            error!("Battle transport not open, dropping outbound frame");
            return;
        };

        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Failed to encode outbound frame");
                return;
            }
        };

        if active.outbound.send(Message::Text(text)).is_err() {
            warn!(match_id = %active.match_id, "Transport task gone, frame dropped");
        }
    }

    fn close_transport(&self) {
        if let Some(mut active) = self.active.lock().take() {
            info!(match_id = %active.match_id, "Closing battle transport");
            active.open.store(false, Ordering::Release);
            if let Some(shutdown) = active.shutdown.take() {
                let _ = shutdown.send(());
            }
        }
    }

    fn room_url(
        &self,
        match_id: &str,
        viewer_id: &str,
        viewer_name: &str,
    ) -> Result<String, TransportError> {
        let base = format!(
            "ws://{}/battle/{}",
            self.config.battle_service_addr, match_id
        );
        let mut url =
            Url::parse(&base).map_err(|e| TransportError::InvalidAddress(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("userid", viewer_id)
            .append_pair("name", viewer_name);
        Ok(url.to_string())
    }
}

impl IntentSink for ConnectionManager {
    fn send_action(&self, action: &BattleAction) {
        ConnectionManager::send_action(self, action);
    }

    fn send_ready(&self) {
        ConnectionManager::send_ready(self);
    }
}

enum Exit {
    /// `disconnect()` or a replacing `connect()` asked us to stop
    Shutdown,
    /// The transport went away on its own
    Closed,
}

enum Reconnect {
    Linked(Link),
    Cancelled,
    Exhausted,
}

/// Background task driving one transport and its reconnections
struct TransportTask {
    match_id: String,
    url: String,
    connector: Arc<dyn Connector>,
    listeners: Arc<Listeners>,
    open: Arc<AtomicBool>,
    max_reconnect_attempts: u32,
    reconnect_delay: Duration,
}

impl TransportTask {
    async fn run(
        self,
        mut link: Link,
        mut outbound: mpsc::UnboundedReceiver<Message>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            match self.pump(&mut link, &mut outbound, &mut shutdown).await {
                Exit::Shutdown => {
                    let close = Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "User disconnect".into(),
                    }));
                    if let Err(e) = link.sink.send(close).await {
                        debug!(match_id = %self.match_id, error = %e, "Close frame not delivered");
                    }
                    let _ = link.sink.close().await;
                    info!(match_id = %self.match_id, "Battle transport closed by request");
                    return;
                }
                Exit::Closed => {
                    self.open.store(false, Ordering::Release);
                    // Intents written while closed are dropped, not queued.
                    while outbound.try_recv().is_ok() {}
                    warn!(match_id = %self.match_id, "Battle transport closed unexpectedly");

                    match self.reconnect(&mut shutdown).await {
                        Reconnect::Linked(new_link) => {
                            link = new_link;
                            self.open.store(true, Ordering::Release);
                        }
                        Reconnect::Cancelled => {
                            info!(match_id = %self.match_id, "Reconnection cancelled");
                            return;
                        }
                        Reconnect::Exhausted => {
                            error!(
                                match_id = %self.match_id,
                                attempts = self.max_reconnect_attempts,
                                "Reconnection failed, giving up"
                            );
                            self.listeners.emit(&BattleEvent::ConnectionFailed);
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn pump(
        &self,
        link: &mut Link,
        outbound: &mut mpsc::UnboundedReceiver<Message>,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> Exit {
        loop {
            tokio::select! {
                _ = &mut *shutdown => return Exit::Shutdown,

                Some(message) = outbound.recv() => {
                    if let Err(e) = link.sink.send(message).await {
                        warn!(match_id = %self.match_id, error = %e, "Failed to write frame");
                        self.listeners.emit(&BattleEvent::TransportError { message: e.to_string() });
                        return Exit::Closed;
                    }
                }

                incoming = link.stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Close(frame))) => {
                        info!(match_id = %self.match_id, ?frame, "Server closed the battle transport");
                        return Exit::Closed;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!(match_id = %self.match_id, "Received binary frame, ignoring");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(match_id = %self.match_id, error = %e, "Battle transport error");
                        self.listeners.emit(&BattleEvent::TransportError { message: e.to_string() });
                        return Exit::Closed;
                    }
                    None => return Exit::Closed,
                },
            }
        }
    }

    async fn reconnect(&self, shutdown: &mut oneshot::Receiver<()>) -> Reconnect {
        for attempt in 1..=self.max_reconnect_attempts {
            info!(
                match_id = %self.match_id,
                attempt,
                max_attempts = self.max_reconnect_attempts,
                "Reconnecting to battle room"
            );

            tokio::select! {
                _ = &mut *shutdown => return Reconnect::Cancelled,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }

            let opened = tokio::select! {
                _ = &mut *shutdown => return Reconnect::Cancelled,
                opened = self.connector.open(&self.url) => opened,
            };

            match opened {
                Ok(link) => {
                    info!(match_id = %self.match_id, attempt, "Reconnected to battle room");
                    return Reconnect::Linked(link);
                }
                Err(e) => {
                    warn!(match_id = %self.match_id, attempt, error = %e, "Reconnection attempt failed");
                }
            }
        }

        Reconnect::Exhausted
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<ServerFrame>(text) {
            Ok(frame) => {
                let event = BattleEvent::from(frame);
                debug!(match_id = %self.match_id, kind = ?event.kind(), "Inbound event");
                self.listeners.emit(&event);
            }
            Err(e) => {
                warn!(match_id = %self.match_id, error = %e, "Dropping malformed frame");
            }
        }
    }
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    #[error("Invalid battle service address: {0}")]
    InvalidAddress(String),

    #[error("Connection refused: {0}")]
    Refused(String),

    #[error("No battle room to reconnect to")]
    NoMatch,

    #[error("Connect cancelled by disconnect")]
    Cancelled,
}
