//! Media session: one peer transport negotiated over the signaling channel
//!
//! The session registers a handler on the shared [`SignalingChannel`] for its
//! lifetime and drains [`PeerEvent`]s from its transport on a separate task.
//! Both paths go through one negotiation lock, which gives the two ordering
//! rules the exchange needs:
//!
//! - local candidates are sent only after the local description is applied
//! - remote candidates are applied only after the remote description is applied
//!
//! Candidates that arrive too early are queued and flushed in arrival order.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use webrtc::track::track_local::TrackLocal;

use super::transport::{ConnectionState, PeerEvent, PeerTransport, TransportFactory};
use crate::error::{AppError, Result};
use crate::events::{AgentEvent, EventBus, StatusSource};
use crate::signaling::{
    HandlerId, IceCandidate, MessageHandler, SessionDescription, SignalingChannel,
    SignalingMessage,
};

/// Negotiation bookkeeping, guarded by one lock
#[derive(Debug, Default)]
struct Negotiation {
    local_applied: bool,
    remote_applied: bool,
    pending_remote: Vec<IceCandidate>,
    pending_local: Vec<IceCandidate>,
    /// Set once `Connected` is reported; later non-terminal states keep the status line
    streaming: bool,
    closed: bool,
}

struct SessionInner {
    session_id: String,
    transport: Arc<dyn PeerTransport>,
    channel: SignalingChannel,
    events: Arc<EventBus>,
    negotiation: Mutex<Negotiation>,
    state: watch::Sender<ConnectionState>,
    handler_id: SyncMutex<Option<HandlerId>>,
    pump: SyncMutex<Option<JoinHandle<()>>>,
}

/// One negotiated peer connection
///
/// Dropping the session without calling [`stop`](Self::stop) leaves the
/// transport open; the controller always stops it.
pub struct MediaSession {
    inner: Arc<SessionInner>,
}

impl MediaSession {
    /// Create the transport, attach `tracks` and start listening on `channel`
    ///
    /// Negotiation starts with [`negotiate`](Self::negotiate), or when the
    /// remote side sends an offer.
    pub async fn start(
        session_id: &str,
        tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>,
        channel: SignalingChannel,
        factory: &dyn TransportFactory,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let transport = factory.create(session_id, event_tx).await?;

        for track in tracks {
            if let Err(e) = transport.add_track(track).await {
                if let Err(close_err) = transport.close().await {
                    debug!("Error closing transport after failed start: {}", close_err);
                }
                return Err(e);
            }
        }

        let (state, _) = watch::channel(ConnectionState::Idle);
        let inner = Arc::new(SessionInner {
            session_id: session_id.to_string(),
            transport,
            channel,
            events,
            negotiation: Mutex::new(Negotiation::default()),
            state,
            handler_id: SyncMutex::new(None),
            pump: SyncMutex::new(None),
        });

        let handler_id = inner.channel.on_message(Arc::new(SessionHandler {
            session: Arc::downgrade(&inner),
        }));
        *inner.handler_id.lock() = Some(handler_id);

        let pump = tokio::spawn(pump_peer_events(Arc::downgrade(&inner), event_rx));
        *inner.pump.lock() = Some(pump);

        info!("Media session {} started", inner.session_id);
        Ok(Self { inner })
    }

    /// Run the offer flow: create an offer, apply it locally, send it
    pub async fn negotiate(&self) -> Result<()> {
        let result = self.inner.send_offer().await;
        if let Err(ref e) = result {
            self.inner.report_negotiation_error("offer", e);
        }
        result
    }

    /// Apply the remote answer (or offer) and flush queued remote candidates
    pub async fn on_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.inner.apply_remote_description(description).await
    }

    /// Apply a remote candidate, or queue it until the remote description is in
    pub async fn on_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.inner.apply_remote_candidate(candidate).await
    }

    /// Close the transport and detach from the channel
    ///
    /// The channel itself keeps running.
    pub async fn stop(&self) {
        self.inner.stop().await;
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Current transport state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Remote candidates waiting for the remote description
    pub async fn pending_remote_candidates(&self) -> usize {
        self.inner.negotiation.lock().await.pending_remote.len()
    }
}

impl SessionInner {
    async fn send_offer(&self) -> Result<()> {
        let mut negotiation = self.negotiation.lock().await;
        if negotiation.closed {
            return Err(AppError::Negotiation("session is closed".to_string()));
        }

        let offer = self.transport.create_offer().await?;
        self.transport.set_local_description(offer.clone()).await?;
        negotiation.local_applied = true;

        debug!("Sending offer for session {}", self.session_id);
        self.channel.send(&SignalingMessage::Offer { offer });
        self.flush_local(&mut negotiation);
        Ok(())
    }

    /// Answering path: the remote side initiated
    async fn answer_offer(&self, offer: SessionDescription) -> Result<()> {
        let mut negotiation = self.negotiation.lock().await;
        if negotiation.closed {
            return Ok(());
        }

        self.transport.set_remote_description(offer).await?;
        negotiation.remote_applied = true;
        let flushed = self.flush_remote(&mut negotiation).await;

        let answer = self.transport.create_answer().await?;
        self.transport.set_local_description(answer.clone()).await?;
        negotiation.local_applied = true;

        debug!("Sending answer for session {}", self.session_id);
        self.channel.send(&SignalingMessage::Answer { answer });
        self.flush_local(&mut negotiation);
        flushed
    }

    async fn apply_remote_description(&self, description: SessionDescription) -> Result<()> {
        let mut negotiation = self.negotiation.lock().await;
        if negotiation.closed {
            return Ok(());
        }

        self.transport.set_remote_description(description).await?;
        negotiation.remote_applied = true;
        debug!("Remote description applied for session {}", self.session_id);
        self.flush_remote(&mut negotiation).await
    }

    async fn apply_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let mut negotiation = self.negotiation.lock().await;
        if negotiation.closed {
            return Ok(());
        }

        if !negotiation.remote_applied {
            debug!(
                "Queueing remote candidate for session {} until the remote description is applied",
                self.session_id
            );
            negotiation.pending_remote.push(candidate);
            return Ok(());
        }

        self.transport.add_ice_candidate(candidate).await
    }

    async fn flush_remote(&self, negotiation: &mut Negotiation) -> Result<()> {
        let pending = std::mem::take(&mut negotiation.pending_remote);
        if !pending.is_empty() {
            debug!("Applying {} queued remote candidates", pending.len());
        }
        // One bad candidate must not cost the rest of the queue
        let mut first_error = None;
        for candidate in pending {
            if let Err(e) = self.transport.add_ice_candidate(candidate).await {
                warn!(
                    "Queued remote candidate rejected for session {}: {}",
                    self.session_id, e
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn flush_local(&self, negotiation: &mut Negotiation) {
        for candidate in std::mem::take(&mut negotiation.pending_local) {
            self.channel.send(&SignalingMessage::IceCandidate { candidate });
        }
    }

    async fn on_local_candidate(&self, candidate: IceCandidate) {
        let mut negotiation = self.negotiation.lock().await;
        if negotiation.closed {
            return;
        }

        if negotiation.local_applied {
            self.channel.send(&SignalingMessage::IceCandidate { candidate });
        } else {
            debug!("Holding local candidate until the local description is applied");
            negotiation.pending_local.push(candidate);
        }
    }

    async fn on_state_changed(&self, state: ConnectionState) {
        let show = {
            let mut negotiation = self.negotiation.lock().await;
            if negotiation.closed {
                return;
            }
            let show = !negotiation.streaming || state.is_terminal();
            match state {
                ConnectionState::Connected => negotiation.streaming = true,
                s if s.is_terminal() => negotiation.streaming = false,
                _ => {}
            }
            show
        };

        self.state.send_replace(state);
        info!("Session {} connection state: {}", self.session_id, state);
        self.events.publish(AgentEvent::ConnectionStateChanged {
            session_id: self.session_id.clone(),
            state,
        });

        if show {
            if let Some(text) = state.status_text() {
                self.events.status(StatusSource::Webrtc, text);
            }
        }
    }

    fn report_negotiation_error(&self, step: &str, e: &AppError) {
        error!(
            "Negotiation failed for session {} ({}): {}",
            self.session_id, step, e
        );
        self.events
            .status(StatusSource::Webrtc, "negotiation error");
    }

    async fn stop(&self) {
        {
            let mut negotiation = self.negotiation.lock().await;
            if negotiation.closed {
                return;
            }
            negotiation.closed = true;
            negotiation.pending_local.clear();
            negotiation.pending_remote.clear();
        }

        if let Some(id) = self.handler_id.lock().take() {
            self.channel.remove_handler(id);
        }
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        if let Err(e) = self.transport.close().await {
            warn!("Error closing transport for session {}: {}", self.session_id, e);
        }

        info!("Media session {} stopped", self.session_id);
    }
}

/// Channel handler bound to one session
struct SessionHandler {
    session: Weak<SessionInner>,
}

#[async_trait]
impl MessageHandler for SessionHandler {
    async fn handle(&self, message: &SignalingMessage) {
        let Some(session) = self.session.upgrade() else {
            return;
        };

        let (step, result) = match message {
            SignalingMessage::Answer { answer } => (
                "answer",
                session.apply_remote_description(answer.clone()).await,
            ),
            SignalingMessage::Offer { offer } => {
                ("remote offer", session.answer_offer(offer.clone()).await)
            }
            SignalingMessage::IceCandidate { candidate } => (
                "remote candidate",
                session.apply_remote_candidate(candidate.clone()).await,
            ),
            SignalingMessage::Numbers { .. }
            | SignalingMessage::RoiToggle { .. }
            | SignalingMessage::Error { .. } => return,
        };

        if let Err(e) = result {
            session.report_negotiation_error(step, &e);
        }
    }
}

async fn pump_peer_events(
    session: Weak<SessionInner>,
    mut events: mpsc::UnboundedReceiver<PeerEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(session) = session.upgrade() else {
            break;
        };

        match event {
            PeerEvent::LocalCandidate(candidate) => session.on_local_candidate(candidate).await,
            PeerEvent::GatheringComplete => {
                debug!("ICE gathering complete for session {}", session.session_id)
            }
            PeerEvent::StateChanged(state) => session.on_state_changed(state).await,
        }
    }
}
