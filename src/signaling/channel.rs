//! Reconnecting signaling channel
//!
//! One long-lived task owns the control connection:
//!
//! ```text
//!   ┌────────────┐  ok   ┌──────┐ closed/error ┌────────┐
//!   │ Connecting ├──────►│ Open ├─────────────►│ Closed │
//!   └─────▲──────┘       └──────┘              └───┬────┘
//!         │      failed                            │
//!         │◄──────────────── sleep(reconnect_delay)┘
//! ```
//!
//! Registered handlers live in the channel, not in the connection, so they
//! keep receiving messages across reconnects. Inbound messages are handed to
//! every handler in registration order, one message at a time, and each
//! handler is awaited before the next one runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::codec::{self, SignalingMessage};
use super::transport::{Connection, Connector};
use crate::events::{AgentEvent, EventBus, StatusSource};
use crate::utils::LogThrottler;
use crate::warn_throttled;

/// Delay between a closure and the next connection attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Control channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// `connect()` not called yet
    Idle,
    /// Connection attempt in flight
    Connecting,
    /// Messages can be sent
    Open,
    /// Waiting for the reconnect timer
    Closed,
    /// `shutdown()` called; no further attempts
    ShutDown,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelState::Idle => write!(f, "idle"),
            ChannelState::Connecting => write!(f, "connecting"),
            ChannelState::Open => write!(f, "open"),
            ChannelState::Closed => write!(f, "closed"),
            ChannelState::ShutDown => write!(f, "shut_down"),
        }
    }
}

/// Receives inbound signaling messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Called once per inbound message
    ///
    /// Failures must be handled inside; the channel does not look at them.
    async fn handle(&self, message: &SignalingMessage);
}

/// Registration handle returned by [`SignalingChannel::on_message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Shared handle to the control channel
///
/// Cloning is cheap; all clones drive the same connection.
#[derive(Clone)]
pub struct SignalingChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    url: String,
    reconnect_delay: Duration,
    connector: Arc<dyn Connector>,
    events: Arc<EventBus>,
    handlers: RwLock<Vec<(HandlerId, Arc<dyn MessageHandler>)>>,
    next_handler_id: AtomicU64,
    /// Present only while the connection is open
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    state: watch::Sender<ChannelState>,
    attempts: AtomicU64,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    throttler: LogThrottler,
}

impl SignalingChannel {
    /// Create a channel; nothing is opened until [`connect`](Self::connect)
    pub fn new(
        url: impl Into<String>,
        reconnect_delay: Duration,
        connector: Arc<dyn Connector>,
        events: Arc<EventBus>,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::Idle);

        Self {
            inner: Arc::new(ChannelInner {
                url: url.into(),
                reconnect_delay,
                connector,
                events,
                handlers: RwLock::new(Vec::new()),
                next_handler_id: AtomicU64::new(1),
                outbound: Mutex::new(None),
                state,
                attempts: AtomicU64::new(0),
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
                throttler: LogThrottler::with_secs(5),
            }),
        }
    }

    /// Start the connection task
    ///
    /// Returns immediately; the outcome shows up as state changes and status
    /// events. Calling it again while the task runs does nothing.
    pub fn connect(&self) {
        if self.inner.cancel.is_cancelled() {
            warn!("Signaling channel was shut down, not reconnecting");
            return;
        }

        let mut task = self.inner.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Signaling channel task already running");
            return;
        }

        let inner = self.inner.clone();
        *task = Some(tokio::spawn(async move { inner.run().await }));
    }

    /// Queue `message` for transmission
    ///
    /// Delivery is not guaranteed: when the channel is not open the message
    /// is dropped and a (throttled) warning is logged.
    pub fn send(&self, message: &SignalingMessage) {
        let text = match codec::encode(message) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode {} message: {}", message.tag(), e);
                return;
            }
        };

        let outbound = self.inner.outbound.lock();
        match outbound.as_ref() {
            Some(tx) if tx.send(text).is_ok() => {
                debug!("Queued {} message", message.tag());
            }
            _ => {
                warn_throttled!(
                    self.inner.throttler,
                    "send_dropped",
                    "Signaling channel not open, dropping {} message",
                    message.tag()
                );
            }
        }
    }

    /// Register a handler for inbound messages
    pub fn on_message(&self, handler: Arc<dyn MessageHandler>) -> HandlerId {
        let id = HandlerId(self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed));
        self.inner.handlers.write().push((id, handler));
        debug!("Registered signaling handler {:?}", id);
        id
    }

    /// Unregister a handler; returns false if it was not registered
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self.inner.handlers.write();
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        handlers.len() != before
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.read().len()
    }

    /// Current state
    pub fn state(&self) -> ChannelState {
        *self.inner.state.borrow()
    }

    /// Subscribe to state changes
    pub fn state_watch(&self) -> watch::Receiver<ChannelState> {
        self.inner.state.subscribe()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Connection attempts made so far
    pub fn attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::Relaxed)
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Stop the connection task, cancelling any pending reconnect
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let task = self.inner.task.lock().take();
        if let Some(handle) = task {
            if let Err(e) = handle.await {
                warn!("Signaling task ended abnormally: {}", e);
            }
        }
        self.inner.set_state(ChannelState::ShutDown);
    }
}

impl ChannelInner {
    async fn run(self: Arc<Self>) {
        loop {
            let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
            self.set_state(ChannelState::Connecting);
            info!("Connecting to signaling endpoint {} (attempt {})", self.url, attempt);

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.connector.connect(&self.url) => result,
            };

            match connected {
                Ok(connection) => self.serve(connection).await,
                Err(e) => {
                    warn!("Signaling connection failed: {}", e);
                    self.events
                        .status(StatusSource::Signaling, "signaling error");
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }

            self.set_state(ChannelState::Closed);
            info!(
                "Signaling disconnected, reconnecting in {} ms",
                self.reconnect_delay.as_millis()
            );
            self.events.status(
                StatusSource::Signaling,
                format!(
                    "signaling disconnected, reconnecting in {}s",
                    self.reconnect_delay.as_secs_f64()
                ),
            );

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        *self.outbound.lock() = None;
        self.set_state(ChannelState::ShutDown);
        info!("Signaling channel stopped");
    }

    /// Pump one open connection until it closes or the channel shuts down
    async fn serve(&self, connection: Connection) {
        let Connection {
            mut sink,
            mut stream,
        } = connection;
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        *self.outbound.lock() = Some(tx);
        self.throttler.clear("send_dropped");
        self.set_state(ChannelState::Open);
        info!("Signaling channel open: {}", self.url);
        self.events
            .status(StatusSource::Signaling, "signaling connected");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    if let Err(e) = sink.close().await {
                        debug!("Error closing signaling connection: {}", e);
                    }
                    break;
                }
                Some(text) = rx.recv() => {
                    if let Err(e) = sink.send(text).await {
                        warn!("Signaling transport error: {}", e);
                        self.events.status(StatusSource::Signaling, "signaling error");
                        break;
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(text)) => self.dispatch(&text).await,
                    Some(Err(e)) => {
                        warn!("Signaling transport error: {}", e);
                        self.events.status(StatusSource::Signaling, "signaling error");
                        break;
                    }
                    None => {
                        info!("Signaling connection closed by peer");
                        break;
                    }
                },
            }
        }

        // Anything still queued is lost with the connection
        *self.outbound.lock() = None;
    }

    async fn dispatch(&self, text: &str) {
        let message = match codec::decode(text) {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!("Ignoring signaling message with unhandled type");
                return;
            }
            Err(e) => {
                warn!("Malformed signaling message: {}", e);
                return;
            }
        };

        debug!("Signaling message received: {}", message.tag());

        let handlers: Vec<Arc<dyn MessageHandler>> = self
            .handlers
            .read()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();

        for handler in handlers {
            handler.handle(&message).await;
        }
    }

    fn set_state(&self, state: ChannelState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            self.events
                .publish(AgentEvent::ChannelStateChanged { state });
        }
    }
}
