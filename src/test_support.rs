//! In-memory doubles for the channel, transport and feed seams

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc as fmpsc;
use futures::{FutureExt, SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use webrtc::track::track_local::TrackLocal;

use crate::capture::{vp8_sample_track, CaptureConstraints, Feed, FeedSource, Resolution};
use crate::error::{AppError, Result};
use crate::signaling::codec::{self, SdpType, SessionDescription, SignalingMessage};
use crate::signaling::{Connection, Connector, IceCandidate, MessageHandler};
use crate::webrtc::{PeerEvent, PeerTransport, TransportFactory};

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

/// Connector handing every connection to a [`MockServer`]
pub struct MockConnector {
    accepted: mpsc::UnboundedSender<ServerSide>,
    attempts: Mutex<Vec<Instant>>,
    urls: Mutex<Vec<String>>,
    failures: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, MockServer) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            accepted,
            attempts: Mutex::new(Vec::new()),
            urls: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(0),
        });
        (connector, MockServer { accepted: rx })
    }

    /// Refuse the next `n` attempts
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    /// When each attempt was made (paused-clock time in timer tests)
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Connection> {
        self.attempts.lock().push(Instant::now());
        self.urls.lock().push(url.to_string());

        let refuse = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refuse {
            return Err(AppError::Signaling("connection refused".to_string()));
        }

        let (to_client, client_rx) = fmpsc::unbounded::<String>();
        let (client_tx, from_client) = fmpsc::unbounded::<String>();
        let _ = self.accepted.send(ServerSide {
            to_client,
            from_client,
        });

        Ok(Connection {
            sink: Box::pin(
                client_tx.sink_map_err(|e| AppError::Signaling(format!("mock send: {}", e))),
            ),
            stream: Box::pin(client_rx.map(Ok)),
        })
    }
}

/// Accepts the connections made through a [`MockConnector`]
pub struct MockServer {
    accepted: mpsc::UnboundedReceiver<ServerSide>,
}

impl MockServer {
    /// Wait for the next connection
    pub async fn accept(&mut self) -> ServerSide {
        self.accepted
            .recv()
            .await
            .expect("mock connector dropped")
    }
}

/// Server end of one mock connection; dropping it closes the connection
pub struct ServerSide {
    to_client: fmpsc::UnboundedSender<String>,
    from_client: fmpsc::UnboundedReceiver<String>,
}

impl ServerSide {
    pub fn push(&self, message: &SignalingMessage) {
        self.push_raw(&codec::encode(message).unwrap());
    }

    pub fn push_raw(&self, text: &str) {
        self.to_client.unbounded_send(text.to_string()).unwrap();
    }

    /// Next message the client sent; `None` once the client hung up
    pub async fn next_message(&mut self) -> Option<SignalingMessage> {
        let text = self.from_client.next().await?;
        Some(codec::decode(&text).unwrap().expect("client sent unknown tag"))
    }

    /// Next message if one is already queued
    pub fn try_next_message(&mut self) -> Option<SignalingMessage> {
        let text = self.from_client.next().now_or_never()??;
        codec::decode(&text).unwrap()
    }
}

/// Handler forwarding every message to a channel
pub struct RecordingHandler {
    tx: mpsc::UnboundedSender<SignalingMessage>,
}

impl RecordingHandler {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SignalingMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: &SignalingMessage) {
        let _ = self.tx.send(message.clone());
    }
}

// ---------------------------------------------------------------------------
// Peer transport
// ---------------------------------------------------------------------------

pub fn vp8_track(id: &str) -> Arc<dyn TrackLocal + Send + Sync> {
    vp8_sample_track(id, "test-stream")
}

/// One call made on a [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    AddTrack(String),
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpType),
    SetRemote(SdpType),
    AddCandidate(String),
    Close,
}

/// Transport that records calls in order
pub struct RecordingTransport {
    session_id: String,
    calls: Mutex<Vec<TransportCall>>,
    events: mpsc::UnboundedSender<PeerEvent>,
    fail_remote: AtomicBool,
    rejected: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| **c == TransportCall::Close)
            .count()
    }

    /// SDP returned by `create_offer`
    pub fn offer_sdp(&self) -> String {
        format!("v=0\r\ns={}-offer\r\n", self.session_id)
    }

    /// Make `set_remote_description` fail from now on
    pub fn fail_remote_description(&self) {
        self.fail_remote.store(true, Ordering::SeqCst);
    }

    /// Make `add_ice_candidate` fail for this candidate line
    pub fn reject_candidate(&self, candidate: &str) {
        self.rejected.lock().push(candidate.to_string());
    }

    /// Candidates that were added without error, in order
    pub fn applied_candidates(&self) -> Vec<String> {
        let rejected = self.rejected.lock().clone();
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                TransportCall::AddCandidate(line) if !rejected.contains(line) => {
                    Some(line.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Simulate a transport callback
    pub fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl PeerTransport for RecordingTransport {
    async fn add_track(&self, track: Arc<dyn TrackLocal + Send + Sync>) -> Result<()> {
        self.record(TransportCall::AddTrack(track.id().to_string()));
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.record(TransportCall::CreateOffer);
        Ok(SessionDescription::offer(self.offer_sdp()))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record(TransportCall::CreateAnswer);
        Ok(SessionDescription::answer(format!(
            "v=0\r\ns={}-answer\r\n",
            self.session_id
        )))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.record(TransportCall::SetLocal(description.sdp_type));
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.record(TransportCall::SetRemote(description.sdp_type));
        if self.fail_remote.load(Ordering::SeqCst) {
            return Err(AppError::Negotiation("rejected description".to_string()));
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let rejected = self.rejected.lock().contains(&candidate.candidate);
        self.record(TransportCall::AddCandidate(candidate.candidate));
        if rejected {
            return Err(AppError::Negotiation("malformed candidate".to_string()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(TransportCall::Close);
        Ok(())
    }
}

/// Factory producing [`RecordingTransport`]s
pub struct MockTransportFactory {
    transports: Mutex<Vec<Arc<RecordingTransport>>>,
    fail_next: AtomicBool,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self {
            transports: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Most recently created transport
    pub fn last(&self) -> Option<Arc<RecordingTransport>> {
        self.transports.lock().last().cloned()
    }

    pub fn created(&self) -> usize {
        self.transports.lock().len()
    }

    /// Make the next `create` fail
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create(
        &self,
        session_id: &str,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerTransport>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AppError::WebRtcError("no peer connection".to_string()));
        }

        let transport = Arc::new(RecordingTransport {
            session_id: session_id.to_string(),
            calls: Mutex::new(Vec::new()),
            events,
            fail_remote: AtomicBool::new(false),
            rejected: Mutex::new(Vec::new()),
        });
        self.transports.lock().push(transport.clone());
        Ok(transport)
    }
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// Feed source whose metadata and failures are driven by the test
pub struct ScriptedFeedSource {
    failure: Mutex<Option<String>>,
    defer: AtomicBool,
    metadata: Mutex<Option<watch::Sender<Option<Resolution>>>>,
    acquired: AtomicUsize,
}

impl ScriptedFeedSource {
    pub fn new() -> Self {
        Self {
            failure: Mutex::new(None),
            defer: AtomicBool::new(false),
            metadata: Mutex::new(None),
            acquired: AtomicUsize::new(0),
        }
    }

    /// Fail the next acquisition with `reason`
    pub fn fail_next(&self, reason: &str) {
        *self.failure.lock() = Some(reason.to_string());
    }

    /// Feeds acquired from now on start without a resolution
    pub fn defer_metadata(&self) {
        self.defer.store(true, Ordering::SeqCst);
    }

    /// Report a resolution on the latest feed
    pub fn report_resolution(&self, resolution: Resolution) {
        if let Some(tx) = self.metadata.lock().as_ref() {
            tx.send_replace(Some(resolution));
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for ScriptedFeedSource {
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<Feed> {
        if let Some(reason) = self.failure.lock().take() {
            return Err(AppError::Capture(reason));
        }

        let n = self.acquired.fetch_add(1, Ordering::SeqCst) + 1;
        let initial = if self.defer.load(Ordering::SeqCst) {
            None
        } else {
            Some(constraints.resolution())
        };
        let (tx, rx) = watch::channel(initial);
        *self.metadata.lock() = Some(tx);

        let id = format!("feed-{}", n);
        let track = vp8_sample_track("video", &id);
        Ok(Feed::new(id, vec![track], rx))
    }
}
