use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use crate::common::events::names;
use crate::config::ReconnectConfig;

use super::frame::Frame;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Lifecycle of the one physical connection of this client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    /// Last attempt failed or the link dropped; retrying in the background.
    Degraded,
    /// Reconnect attempts ran out. Only an explicit `connect()` retries.
    Failed,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    pub url: String,
    pub token: Option<String>,
    pub reconnect: ReconnectConfig,
}

/// Returned by [`Socket::on`]; pass it back to [`Socket::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(Uuid);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid socket url: {0}")]
    Request(#[source] tungstenite::Error),
    #[error("auth token is not a valid header value")]
    InvalidToken,
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("connection closed by server")]
    ClosedByServer,
}

/// Handle to the shared messaging connection.
///
/// Clones are cheap and all refer to the same connection, handler table and
/// outbound queue. Views never build their own; they get a clone of
/// [`Socket::shared`].
#[derive(Clone)]
pub struct Socket {
    inner: Arc<Inner>,
}

struct Inner {
    config: SocketConfig,
    handlers: Mutex<HashMap<String, Vec<(HandlerId, Handler)>>>,
    outbound: Mutex<Outbound>,
    state: watch::Sender<ConnectionState>,
    running: Mutex<Option<Running>>,
    rooms: Mutex<HashMap<String, usize>>,
}

struct Outbound {
    tx: mpsc::UnboundedSender<Frame>,
    rx: Option<mpsc::UnboundedReceiver<Frame>>,
}

struct Running {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl Outbound {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }

    /// Hands the queue to a new I/O task, starting a fresh one if the last
    /// task consumed it.
    fn take_receiver(&mut self) -> mpsc::UnboundedReceiver<Frame> {
        match self.rx.take() {
            Some(rx) => rx,
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.tx = tx;
                rx
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Socket {
    pub fn new(config: SocketConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            inner: Arc::new(Inner {
                config,
                handlers: Mutex::new(HashMap::new()),
                outbound: Mutex::new(Outbound::new()),
                state,
                running: Mutex::new(None),
                rooms: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The process-wide connection, created on first use. Later calls ignore
    /// `config` and return the existing instance.
    pub fn shared(config: &SocketConfig) -> Socket {
        static SHARED: OnceLock<Socket> = OnceLock::new();
        SHARED.get_or_init(|| Socket::new(config.clone())).clone()
    }

    /// Starts the background connection task unless one is already alive.
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        let mut running = lock(&self.inner.running);
        if running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
        {
            return;
        }

        let outbound = lock(&self.inner.outbound).take_receiver();
        let (shutdown, shutdown_rx) = watch::channel(false);
        self.inner.set_state(ConnectionState::Connecting);

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(run_connection(inner, outbound, shutdown_rx));
        *running = Some(Running { handle, shutdown });
    }

    /// Session teardown: flushes queued frames, closes the link and stops
    /// reconnecting.
    pub async fn disconnect(&self) {
        let running = lock(&self.inner.running).take();
        let Some(Running {
            mut handle,
            shutdown,
        }) = running
        else {
            return;
        };

        let _ = shutdown.send(true);
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle)
            .await
            .is_err()
        {
            log::warn!("Socket task did not stop in time; aborting");
            handle.abort();
        }

        *lock(&self.inner.outbound) = Outbound::new();
        self.inner.set_state(ConnectionState::Closed);
        self.inner.dispatch(
            names::DISCONNECT,
            &Value::String("client disconnect".to_string()),
        );
        log::info!("Socket disconnected from {}", self.inner.config.url);
    }

    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = HandlerId(Uuid::new_v4());
        let handler: Handler = Arc::new(handler);
        lock(&self.inner.handlers)
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Removes one registration. Returns false if it was not registered.
    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        let mut handlers = lock(&self.inner.handlers);
        let Some(list) = handlers.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(registered, _)| *registered != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event);
        }
        removed
    }

    /// Queues an event for the server. Fire-and-forget: frames emitted while
    /// the link is down are written after the next successful connect.
    pub fn emit(&self, event: &str, payload: Value) {
        self.inner.enqueue(Frame::new(event, payload));
    }

    /// Adds one local member to `room` and announces it with `join`.
    pub fn join_room(&self, room: &str) {
        *lock(&self.inner.rooms).entry(room.to_string()).or_insert(0) += 1;
        self.emit(names::JOIN, Value::String(room.to_string()));
    }

    /// Removes one local member. `leave` goes out only when the last member of
    /// `room` is gone, so one view closing cannot unsubscribe another.
    pub fn leave_room(&self, room: &str) {
        {
            let mut rooms = lock(&self.inner.rooms);
            let Some(members) = rooms.get_mut(room) else {
                log::debug!("Ignoring leave for unjoined room {room}");
                return;
            };
            *members -= 1;
            if *members > 0 {
                log::debug!("Room {room} still has {members} local members");
                return;
            }
            rooms.remove(room);
        }
        self.emit(names::LEAVE, Value::String(room.to_string()));
    }

    pub fn room_members(&self, room: &str) -> usize {
        lock(&self.inner.rooms).get(room).copied().unwrap_or(0)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn handler_count(&self, event: &str) -> usize {
        lock(&self.inner.handlers).get(event).map_or(0, Vec::len)
    }

    /// Delivers an event to local handlers as if it came off the wire.
    #[cfg(test)]
    pub(crate) fn inject(&self, event: &str, payload: &Value) {
        self.inner.dispatch(event, payload);
    }

    /// Takes the outbound queue so tests can observe emitted frames without a
    /// server.
    #[cfg(test)]
    pub(crate) fn detach_outbound(&self) -> mpsc::UnboundedReceiver<Frame> {
        lock(&self.inner.outbound).take_receiver()
    }
}

impl Inner {
    fn enqueue(&self, frame: Frame) {
        if let Err(err) = lock(&self.outbound).tx.send(frame) {
            log::debug!("Dropping outbound {} frame: {err}", err.0.event);
        }
    }

    /// Re-announces every joined room; the server forgets them with the old
    /// link.
    fn rejoin_rooms(&self) {
        let rooms: Vec<String> = lock(&self.rooms).keys().cloned().collect();
        for room in rooms {
            log::debug!("Rejoining room {room}");
            self.enqueue(Frame::new(names::JOIN, Value::String(room)));
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Calls every handler for `event` in registration order. The table is
    /// snapshotted first so handlers may register or deregister.
    fn dispatch(&self, event: &str, payload: &Value) {
        let handlers: Vec<Handler> = lock(&self.handlers)
            .get(event)
            .map(|list| list.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            log::debug!("No handlers for socket event `{event}`");
        }
        for handler in handlers {
            handler(payload);
        }
    }
}

async fn run_connection(
    inner: Arc<Inner>,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    mut shutdown: watch::Receiver<bool>,
) {
    let url = inner.config.url.clone();
    let mut attempt: u32 = 0;
    let mut opened_before = false;

    loop {
        let opened = tokio::select! {
            opened = open_stream(&inner.config) => opened,
            _ = shutdown.changed() => return,
        };

        let reason = match opened {
            Ok(stream) => {
                attempt = 0;
                log::info!("Socket connected to {url}");
                if opened_before {
                    inner.rejoin_rooms();
                }
                opened_before = true;
                inner.set_state(ConnectionState::Open);
                inner.dispatch(names::CONNECT, &Value::Null);

                match pump(&inner, stream, &mut outbound, &mut shutdown).await {
                    Ok(()) => return,
                    Err(err) => {
                        log::warn!("Socket connection to {url} lost: {err}");
                        err.to_string()
                    }
                }
            }
            Err(err) => {
                log::warn!("Socket connect to {url} failed: {err}");
                err.to_string()
            }
        };

        inner.set_state(ConnectionState::Degraded);
        inner.dispatch(names::CONNECT_ERROR, &Value::String(reason));

        attempt += 1;
        if inner.config.reconnect.exhausted(attempt) {
            log::error!("Giving up on {url} after {attempt} failed attempts");
            inner.set_state(ConnectionState::Failed);
            inner.dispatch(
                names::DISCONNECT,
                &Value::String("reconnect attempts exhausted".to_string()),
            );
            return;
        }

        let delay = inner.config.reconnect.delay_for(attempt);
        log::debug!("Reconnecting to {url} in {delay:?} (attempt {attempt})");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return,
        }
    }
}

async fn open_stream(config: &SocketConfig) -> Result<WsStream, TransportError> {
    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(TransportError::Request)?;

    if let Some(token) = &config.token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| TransportError::InvalidToken)?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

/// Moves frames both ways until the link fails (`Err`) or shutdown is
/// requested (`Ok`). Inbound frames are dispatched one at a time, in order.
async fn pump(
    inner: &Inner,
    stream: WsStream,
    outbound: &mut mpsc::UnboundedReceiver<Frame>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), TransportError> {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                while let Ok(frame) = outbound.try_recv() {
                    if let Ok(text) = frame.encode() {
                        sink.send(WsMessage::Text(text)).await?;
                    }
                }
                let _ = sink.close().await;
                return Ok(());
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.close().await;
                    return Ok(());
                };
                match frame.encode() {
                    Ok(text) => sink.send(WsMessage::Text(text)).await?,
                    Err(err) => log::warn!("Dropping unencodable `{}` frame: {err}", frame.event),
                }
            }
            incoming = source.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => match Frame::decode(&text) {
                    Ok(frame) if names::is_lifecycle(&frame.event) => {
                        log::warn!("Ignoring server frame named after local event `{}`", frame.event);
                    }
                    Ok(frame) => inner.dispatch(&frame.event, &frame.data),
                    Err(err) => log::warn!("Skipping inbound frame: {err}"),
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    return Err(TransportError::ClosedByServer);
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.into()),
            }
        }
    }
}
