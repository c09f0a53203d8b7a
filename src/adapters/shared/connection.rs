//! Self-healing WebSocket connection
//!
//! A [`ResilientConnection`] is a handle to one background task that owns a
//! single socket to a single endpoint. The task reconnects with jittered
//! exponential backoff, optionally runs an application-level heartbeat, and
//! buffers outbound payloads while the socket is down. It knows nothing about
//! exchanges: inbound text is handed to the owner's handler as
//! [`ConnectionEvent::Message`].
//!
//! Status transitions: `Closed -> Connecting -> Open -> (Closing | Closed)`,
//! with a reconnect-pending phase between `Closed` and the next `Connecting`.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::adapters::errors::{ExchangeError, ExchangeResult};
use crate::adapters::shared::queue::{OutboundQueue, DEFAULT_QUEUE_CAPACITY};
use crate::adapters::shared::reconnect::BackoffPolicy;
use crate::adapters::shared::websocket::{connect_ws, WsStream};

type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Predicate deciding whether an inbound text frame answers a heartbeat ping
pub type PongPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Callback receiving connection events, run on the connection task
pub type EventHandler = Box<dyn FnMut(ConnectionEvent<'_>) + Send + Sync + 'static>;

// =============================================================================
// Configuration
// =============================================================================

/// Application-level heartbeat settings
#[derive(Clone)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    /// Grace period for a pong after a ping
    pub timeout: Duration,
    /// Text sent on every interval tick (`None` only watches for staleness)
    pub ping_payload: Option<String>,
    /// Recognizes pong frames; `None` treats any inbound message as a pong
    pub pong_predicate: Option<PongPredicate>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            timeout: Duration::from_secs(10),
            ping_payload: None,
            pong_predicate: None,
        }
    }
}

impl HeartbeatConfig {
    /// Heartbeat that sends `ping` text and expects an exact `pong` reply
    pub fn text_ping_pong(ping: &str, pong: &str) -> Self {
        let pong = pong.to_string();
        Self {
            ping_payload: Some(ping.to_string()),
            pong_predicate: Some(Arc::new(move |text: &str| text == pong)),
            ..Self::default()
        }
    }

    fn is_pong(&self, text: &str) -> bool {
        self.pong_predicate.as_ref().map_or(true, |p| p(text))
    }
}

impl fmt::Debug for HeartbeatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeartbeatConfig")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("ping_payload", &self.ping_payload)
            .field("pong_predicate", &self.pong_predicate.is_some())
            .finish()
    }
}

/// Settings for one [`ResilientConnection`]
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: String,
    pub backoff: BackoffPolicy,
    pub auto_reconnect: bool,
    /// Heartbeat is off unless set
    pub heartbeat: Option<HeartbeatConfig>,
    pub queue_capacity: usize,
    /// Limit on a single transport handshake
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backoff: BackoffPolicy::default(),
            auto_reconnect: true,
            heartbeat: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

// =============================================================================
// Status / Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Read-only view of the connection task state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub status: ConnectionStatus,
    pub reconnect_attempt: u32,
    pub pending_sends: usize,
    /// Task has stopped for good (manual close, exhausted, or no auto-reconnect)
    pub terminated: bool,
}

impl Default for ConnectionSnapshot {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Closed,
            reconnect_attempt: 0,
            pending_sends: 0,
            terminated: false,
        }
    }
}

/// Events delivered to the owner's handler, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent<'a> {
    Open,
    Message(&'a str),
    Close,
    Error(String),
    Reconnecting { attempt: u32, delay: Duration },
    ReconnectExhausted { attempts: u32 },
    Flushed { count: usize },
}

enum Command {
    Send { payload: String, replay: bool },
    Close,
}

// =============================================================================
// Handle
// =============================================================================

/// Owner-side handle of a managed connection
pub struct ResilientConnection {
    label: String,
    config: ConnectionConfig,
    handler: Option<EventHandler>,
    backlog: OutboundQueue,
    replay_backlog: Vec<String>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    state_tx: Option<watch::Sender<ConnectionSnapshot>>,
    state_rx: watch::Receiver<ConnectionSnapshot>,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

impl ResilientConnection {
    /// Create the handle. Nothing touches the network until [`connect`](Self::connect).
    pub fn new(label: impl Into<String>, config: ConnectionConfig, handler: EventHandler) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionSnapshot::default());
        Self {
            label: label.into(),
            backlog: OutboundQueue::new(config.queue_capacity),
            config,
            handler: Some(handler),
            replay_backlog: Vec::new(),
            commands: None,
            state_tx: Some(state_tx),
            state_rx,
            task: None,
            closed: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Start the connection task if needed and wait until the socket is open.
    ///
    /// Fails if the connection was closed manually, or if the task gave up
    /// (reconnects exhausted or auto-reconnect disabled) before opening.
    pub async fn connect(&mut self) -> ExchangeResult<()> {
        if self.closed {
            return Err(ExchangeError::ConnectionClosed(format!(
                "{} was closed manually",
                self.label
            )));
        }
        if self.task.is_none() {
            self.spawn()?;
        }

        let mut rx = self.state_rx.clone();
        let snapshot = match rx
            .wait_for(|s| s.status == ConnectionStatus::Open || s.terminated)
            .await
        {
            Ok(snapshot) => *snapshot,
            Err(_) => *self.state_rx.borrow(),
        };

        if snapshot.status == ConnectionStatus::Open {
            Ok(())
        } else {
            Err(ExchangeError::ConnectionClosed(format!(
                "{} stopped before opening",
                self.label
            )))
        }
    }

    /// Send a text payload now, or queue it until the socket opens.
    pub fn send(&mut self, payload: impl Into<String>) -> ExchangeResult<()> {
        self.dispatch(payload.into(), false)
    }

    /// Like [`send`](Self::send), and re-send the payload after every reconnect.
    ///
    /// Used for subscribe frames so a new socket resumes the same streams.
    pub fn send_replayed(&mut self, payload: impl Into<String>) -> ExchangeResult<()> {
        self.dispatch(payload.into(), true)
    }

    /// Close the socket with code 1000 and stop reconnecting. Terminal.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Close);
        }
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                tracing::warn!(connection = %self.label, "Connection task did not stop in time");
            }
        }
        self.backlog = OutboundQueue::new(self.config.queue_capacity);
        self.replay_backlog.clear();
        tracing::info!(connection = %self.label, "Connection closed");
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let mut snapshot = *self.state_rx.borrow();
        if self.task.is_none() {
            snapshot.pending_sends = self.backlog.len();
        }
        snapshot
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state_rx.borrow().status
    }

    pub fn is_open(&self) -> bool {
        self.status() == ConnectionStatus::Open
    }

    /// Subscribe to snapshot changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.state_rx.clone()
    }

    fn dispatch(&mut self, payload: String, replay: bool) -> ExchangeResult<()> {
        if self.closed {
            return Err(ExchangeError::ConnectionClosed(format!(
                "{} was closed manually",
                self.label
            )));
        }
        if self.state_rx.borrow().terminated {
            return Err(ExchangeError::ConnectionClosed(format!(
                "{} is no longer running",
                self.label
            )));
        }
        match &self.commands {
            Some(commands) => commands
                .send(Command::Send { payload, replay })
                .map_err(|_| {
                    ExchangeError::ConnectionClosed(format!("{} is no longer running", self.label))
                }),
            None => {
                if replay {
                    self.replay_backlog.push(payload.clone());
                }
                self.backlog.push(payload);
                Ok(())
            }
        }
    }

    fn spawn(&mut self) -> ExchangeResult<()> {
        let (handler, state) = match (self.handler.take(), self.state_tx.take()) {
            (Some(handler), Some(state)) => (handler, state),
            _ => {
                return Err(ExchangeError::ConnectionFailed(format!(
                    "{} cannot be restarted",
                    self.label
                )))
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let mut queue = OutboundQueue::new(self.config.queue_capacity);
        queue.append(&mut self.backlog);

        let task = ConnectionTask {
            label: self.label.clone(),
            config: self.config.clone(),
            handler,
            queue,
            replay: std::mem::take(&mut self.replay_backlog),
            commands: rx,
            state,
            attempt: 0,
            opened_before: false,
        };

        tracing::debug!(connection = %self.label, url = %self.config.url, "Spawning connection task");
        self.commands = Some(tx);
        self.task = Some(tokio::spawn(task.run()));
        Ok(())
    }
}

impl fmt::Debug for ResilientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientConnection")
            .field("label", &self.label)
            .field("url", &self.config.url)
            .field("snapshot", &self.snapshot())
            .field("closed", &self.closed)
            .finish()
    }
}

// =============================================================================
// Connection task
// =============================================================================

/// How a socket session ended
enum SessionEnd {
    /// Transport dropped or was force-closed; reconnect if allowed
    Dropped,
    /// Owner asked to close
    Manual,
}

struct ConnectionTask {
    label: String,
    config: ConnectionConfig,
    handler: EventHandler,
    queue: OutboundQueue,
    /// Payloads re-sent on every reopen
    replay: Vec<String>,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionSnapshot>,
    attempt: u32,
    opened_before: bool,
}

impl ConnectionTask {
    async fn run(mut self) {
        loop {
            self.publish(ConnectionStatus::Connecting, false);

            match self.open_transport().await {
                None => break,
                Some(Ok(ws)) => {
                    if let SessionEnd::Manual = self.session(ws).await {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(connection = %self.label, error = %e, "Connect attempt failed");
                    self.publish(ConnectionStatus::Closed, false);
                    self.emit(ConnectionEvent::Error(e.to_string()));
                    self.emit(ConnectionEvent::Close);
                }
            }

            if !self.config.auto_reconnect {
                tracing::info!(connection = %self.label, "Auto-reconnect disabled, stopping");
                break;
            }

            self.attempt += 1;
            if self.config.backoff.exhausted(self.attempt) {
                let attempts = self.attempt - 1;
                tracing::warn!(connection = %self.label, attempts, "Reconnect attempts exhausted");
                self.emit(ConnectionEvent::ReconnectExhausted { attempts });
                break;
            }

            let delay = self.config.backoff.next_delay(self.attempt);
            tracing::info!(
                connection = %self.label,
                attempt = self.attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );
            self.publish(ConnectionStatus::Closed, false);
            self.emit(ConnectionEvent::Reconnecting {
                attempt: self.attempt,
                delay,
            });

            if !self.wait_backoff(delay).await {
                break;
            }
        }

        self.publish(ConnectionStatus::Closed, true);
        tracing::debug!(connection = %self.label, "Connection task stopped");
    }

    /// Run the handshake while still serving commands.
    /// `None` means a close was requested meanwhile.
    async fn open_transport(&mut self) -> Option<ExchangeResult<WsStream>> {
        let url = self.config.url.clone();
        let handshake = connect_ws(&url, self.config.connect_timeout);
        tokio::pin!(handshake);

        loop {
            tokio::select! {
                result = &mut handshake => return Some(result),
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Send { payload, replay }) => self.enqueue(payload, replay),
                    Some(Command::Close) | None => return None,
                },
            }
        }
    }

    /// Sleep out the backoff delay; `false` if a close arrived meanwhile
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Send { payload, replay }) => self.enqueue(payload, replay),
                    Some(Command::Close) | None => return false,
                },
            }
        }
    }

    async fn session(&mut self, ws: WsStream) -> SessionEnd {
        let (mut sink, mut source) = ws.split();

        self.attempt = 0;
        self.publish(ConnectionStatus::Open, false);
        tracing::info!(connection = %self.label, url = %self.config.url, "Connection open");

        let flushed = match self.flush(&mut sink).await {
            Ok(count) => count,
            Err(e) => return self.drop_transport(sink, format!("flush failed: {}", e)).await,
        };
        self.opened_before = true;

        self.emit(ConnectionEvent::Open);
        if flushed > 0 {
            self.emit(ConnectionEvent::Flushed { count: flushed });
        }

        self.serve(sink, &mut source).await
    }

    async fn serve(&mut self, mut sink: WsSink, source: &mut WsSource) -> SessionEnd {
        let heartbeat = self.config.heartbeat.clone();
        let mut ticker = heartbeat.as_ref().map(|hb| {
            let mut ticker = tokio::time::interval_at(Instant::now() + hb.interval, hb.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        let mut last_inbound = Instant::now();
        let mut pong_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Send { payload, replay }) => {
                        if replay {
                            self.replay.push(payload.clone());
                        }
                        if let Err(e) = sink.send(Message::Text(payload.clone())).await {
                            self.queue.push_front(payload);
                            return self.drop_transport(sink, format!("send failed: {}", e)).await;
                        }
                    }
                    Some(Command::Close) | None => {
                        self.close_transport(sink).await;
                        return SessionEnd::Manual;
                    }
                },

                inbound = source.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        last_inbound = Instant::now();
                        if heartbeat.as_ref().is_some_and(|hb| hb.is_pong(&text)) {
                            pong_deadline = None;
                        }
                        tracing::trace!(connection = %self.label, len = text.len(), "Inbound message");
                        self.emit(ConnectionEvent::Message(&text));
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        last_inbound = Instant::now();
                        match std::str::from_utf8(&bytes) {
                            Ok(text) => {
                                if heartbeat.as_ref().is_some_and(|hb| hb.is_pong(text)) {
                                    pong_deadline = None;
                                }
                                self.emit(ConnectionEvent::Message(text));
                            }
                            Err(_) => {
                                tracing::debug!(connection = %self.label, len = bytes.len(), "Ignoring non-UTF-8 binary frame");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // Protocol-level pings are answered by tungstenite
                        last_inbound = Instant::now();
                        if heartbeat.as_ref().is_some_and(|hb| hb.pong_predicate.is_none()) {
                            pong_deadline = None;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(connection = %self.label, frame = ?frame, "Server closed connection");
                        self.publish(ConnectionStatus::Closed, false);
                        self.emit(ConnectionEvent::Close);
                        return SessionEnd::Dropped;
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        return self.drop_transport(sink, e.to_string()).await;
                    }
                    None => {
                        tracing::info!(connection = %self.label, "Connection stream ended");
                        self.publish(ConnectionStatus::Closed, false);
                        self.emit(ConnectionEvent::Close);
                        return SessionEnd::Dropped;
                    }
                },

                _ = next_tick(&mut ticker) => {
                    let Some(hb) = heartbeat.as_ref() else { continue };
                    let now = Instant::now();
                    let silent = now.duration_since(last_inbound);
                    if silent > hb.interval + hb.timeout {
                        tracing::warn!(
                            connection = %self.label,
                            silent_ms = silent.as_millis() as u64,
                            "Connection stale, forcing reconnect"
                        );
                        return self.drop_transport(sink, "stale connection".to_string()).await;
                    }
                    // Without a ping there is nothing to answer; staleness alone decides
                    if let Some(ping) = &hb.ping_payload {
                        if let Err(e) = sink.send(Message::Text(ping.clone())).await {
                            return self.drop_transport(sink, format!("ping failed: {}", e)).await;
                        }
                        if pong_deadline.is_none() {
                            pong_deadline = Some(now + hb.timeout);
                        }
                    }
                }

                _ = sleep_until_deadline(pong_deadline) => {
                    tracing::warn!(connection = %self.label, "Heartbeat timeout, forcing reconnect");
                    return self.drop_transport(sink, "heartbeat timeout".to_string()).await;
                }
            }
        }
    }

    /// Send replay frames (on reopen only), then drain the queue FIFO.
    ///
    /// On failure the payload goes back to the queue head.
    async fn flush(&mut self, sink: &mut WsSink) -> Result<usize, tokio_tungstenite::tungstenite::Error> {
        let mut replayed: HashSet<String> = HashSet::new();
        if self.opened_before {
            for payload in &self.replay {
                sink.send(Message::Text(payload.clone())).await?;
                replayed.insert(payload.clone());
            }
            if !replayed.is_empty() {
                tracing::debug!(connection = %self.label, count = replayed.len(), "Replayed subscriptions");
            }
        }

        let mut count = 0;
        while let Some(payload) = self.queue.pop() {
            if replayed.contains(&payload) {
                continue;
            }
            if let Err(e) = sink.send(Message::Text(payload.clone())).await {
                self.queue.push_front(payload);
                self.publish(ConnectionStatus::Open, false);
                return Err(e);
            }
            count += 1;
        }
        self.publish(ConnectionStatus::Open, false);
        Ok(count)
    }

    /// Abandon a broken or stale socket; the run loop decides on reconnect.
    async fn drop_transport(&mut self, mut sink: WsSink, reason: String) -> SessionEnd {
        tracing::warn!(connection = %self.label, reason = %reason, "Dropping connection");
        self.publish(ConnectionStatus::Closed, false);
        self.emit(ConnectionEvent::Error(reason));
        let _ = tokio::time::timeout(Duration::from_secs(1), sink.close()).await;
        self.emit(ConnectionEvent::Close);
        SessionEnd::Dropped
    }

    async fn close_transport(&mut self, mut sink: WsSink) {
        self.publish(ConnectionStatus::Closing, false);
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "client close".into(),
        };
        let close = async {
            sink.send(Message::Close(Some(frame))).await?;
            sink.close().await
        };
        if let Ok(Err(e)) = tokio::time::timeout(Duration::from_secs(1), close).await {
            tracing::debug!(connection = %self.label, error = %e, "Close handshake failed");
        }
        self.publish(ConnectionStatus::Closed, false);
        self.emit(ConnectionEvent::Close);
    }

    fn enqueue(&mut self, payload: String, replay: bool) {
        if replay {
            self.replay.push(payload.clone());
        }
        self.queue.push(payload);
        let status = self.state.borrow().status;
        self.publish(status, false);
    }

    fn publish(&self, status: ConnectionStatus, terminated: bool) {
        self.state.send_replace(ConnectionSnapshot {
            status,
            reconnect_attempt: self.attempt,
            pending_sends: self.queue.len(),
            terminated,
        });
    }

    fn emit(&mut self, event: ConnectionEvent<'_>) {
        (self.handler)(event);
    }
}

async fn next_tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
