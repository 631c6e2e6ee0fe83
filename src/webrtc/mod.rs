//! WebRTC media session
//!
//! ```text
//! Feed tracks ──► MediaSession ──► PeerTransport (RTCPeerConnection)
//!                     │  ▲
//!      offer/answer/  │  │ answer/offer/
//!      ice-candidate  ▼  │ ice-candidate
//!                 SignalingChannel ◄──► detection service
//! ```

pub mod config;
pub mod mdns;
pub mod session;
pub mod transport;

pub use config::{TurnServer, WebRtcConfig};
pub use session::MediaSession;
pub use transport::{
    ConnectionState, PeerEvent, PeerTransport, RtcPeerTransport, RtcTransportFactory,
    TransportFactory,
};
