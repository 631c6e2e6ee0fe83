//! Peer transport
//!
//! [`PeerTransport`] is the narrow surface the media session negotiates
//! through. [`RtcPeerTransport`] implements it on a `webrtc` peer connection;
//! its callbacks only forward [`PeerEvent`]s into a queue the session drains.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::ice::mdns::MulticastDnsMode;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::TrackLocal;

use super::config::WebRtcConfig;
use super::mdns::{default_mdns_host_name, mdns_mode, mdns_mode_label};
use crate::error::{AppError, Result};
use crate::signaling::{IceCandidate, SdpType, SessionDescription};

/// Peer connection state as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

impl ConnectionState {
    /// Status line for this state, if it has one
    pub fn status_text(&self) -> Option<&'static str> {
        match self {
            ConnectionState::Idle => None,
            ConnectionState::Connecting => Some("negotiating"),
            ConnectionState::Connected => Some("streaming"),
            ConnectionState::Disconnected => Some("disconnected"),
            ConnectionState::Failed => Some("failed"),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Failed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

impl ConnectionState {
    fn from_rtc(state: RTCPeerConnectionState) -> Option<Self> {
        match state {
            RTCPeerConnectionState::New => Some(ConnectionState::Idle),
            RTCPeerConnectionState::Connecting => Some(ConnectionState::Connecting),
            RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
            RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Closed => {
                Some(ConnectionState::Disconnected)
            }
            RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
            _ => None,
        }
    }
}

/// Something the transport noticed on its own
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// A local candidate was discovered
    LocalCandidate(IceCandidate),
    /// Candidate gathering finished
    GatheringComplete,
    /// Connection state changed
    StateChanged(ConnectionState),
}

/// Negotiation surface of one peer connection
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn add_track(&self, track: Arc<dyn TrackLocal + Send + Sync>) -> Result<()>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Creates one transport per session
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Build a transport that reports to `events`
    async fn create(
        &self,
        session_id: &str,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerTransport>>;
}

/// Factory for `webrtc` peer connections
pub struct RtcTransportFactory {
    config: WebRtcConfig,
}

impl RtcTransportFactory {
    pub fn new(config: WebRtcConfig) -> Self {
        Self { config }
    }

    fn ice_servers(&self) -> Vec<RTCIceServer> {
        let mut ice_servers = vec![];

        for stun_url in &self.config.stun_servers {
            ice_servers.push(RTCIceServer {
                urls: vec![stun_url.clone()],
                ..Default::default()
            });
        }

        for turn in &self.config.turn_servers {
            ice_servers.push(RTCIceServer {
                urls: turn.urls.clone(),
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            });
        }

        ice_servers
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn create(
        &self,
        session_id: &str,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerTransport>> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| AppError::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(|e| {
            AppError::WebRtcError(format!("Failed to register interceptors: {}", e))
        })?;

        let mut setting_engine = SettingEngine::default();
        let mode = mdns_mode();
        setting_engine.set_ice_multicast_dns_mode(mode);
        if mode == MulticastDnsMode::QueryAndGather {
            setting_engine.set_multicast_dns_host_name(default_mdns_host_name(session_id));
        }
        info!(
            "WebRTC mDNS mode: {} (session {})",
            mdns_mode_label(mode),
            session_id
        );

        let api = APIBuilder::new()
            .with_setting_engine(setting_engine)
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: self.ice_servers(),
            ..Default::default()
        };

        let pc = api.new_peer_connection(rtc_config).await.map_err(|e| {
            AppError::WebRtcError(format!("Failed to create peer connection: {}", e))
        })?;

        let transport = RtcPeerTransport {
            session_id: session_id.to_string(),
            pc: Arc::new(pc),
        };
        transport.forward_events(events);

        Ok(Arc::new(transport))
    }
}

/// [`PeerTransport`] over an `RTCPeerConnection`
pub struct RtcPeerTransport {
    session_id: String,
    pc: Arc<RTCPeerConnection>,
}

impl RtcPeerTransport {
    fn forward_events(&self, events: mpsc::UnboundedSender<PeerEvent>) {
        let state_events = events.clone();
        let session_id = self.session_id.clone();

        self.pc
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let events = state_events.clone();
                let session_id = session_id.clone();

                Box::pin(async move {
                    let Some(state) = ConnectionState::from_rtc(s) else {
                        return;
                    };
                    debug!("Peer {} connection state: {}", session_id, state);
                    let _ = events.send(PeerEvent::StateChanged(state));
                })
            }));

        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let events = events.clone();

                Box::pin(async move {
                    let event = match candidate {
                        Some(c) => match c.to_json() {
                            Ok(init) => PeerEvent::LocalCandidate(IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                                username_fragment: init.username_fragment,
                            }),
                            Err(e) => {
                                debug!("Skipping unserializable ICE candidate: {}", e);
                                return;
                            }
                        },
                        None => PeerEvent::GatheringComplete,
                    };
                    let _ = events.send(event);
                })
            }));
    }

    fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription> {
        let SessionDescription { sdp_type, sdp } = description;
        let parsed = match sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(sdp),
            SdpType::Answer => RTCSessionDescription::answer(sdp),
            SdpType::Pranswer => RTCSessionDescription::pranswer(sdp),
            SdpType::Rollback => {
                return Err(AppError::Negotiation(
                    "Rollback descriptions are not supported".to_string(),
                ))
            }
        };
        parsed.map_err(|e| AppError::Negotiation(format!("Invalid SDP {}: {}", sdp_type, e)))
    }
}

#[async_trait]
impl PeerTransport for RtcPeerTransport {
    async fn add_track(&self, track: Arc<dyn TrackLocal + Send + Sync>) -> Result<()> {
        let id = track.id().to_string();
        self.pc
            .add_track(track)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to add track {}: {}", id, e)))?;
        debug!("Track {} added to peer {}", id, self.session_id);
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| AppError::Negotiation(format!("Failed to create offer: {}", e)))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| AppError::Negotiation(format!("Failed to create answer: {}", e)))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let description = Self::to_rtc(description)?;
        self.pc
            .set_local_description(description)
            .await
            .map_err(|e| AppError::Negotiation(format!("Failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let description = Self::to_rtc(description)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(|e| AppError::Negotiation(format!("Failed to set remote description: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| AppError::Negotiation(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        self.pc
            .close()
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to close peer connection: {}", e)))
    }
}
