//! Signaling: the control channel to the detection service
//!
//! - [`codec`]: the JSON message union
//! - [`transport`]: how a connection is opened (WebSocket in production)
//! - [`channel`]: the long-lived, reconnecting channel that routes messages

pub mod channel;
pub mod codec;
pub mod transport;

pub use channel::{ChannelState, HandlerId, MessageHandler, SignalingChannel, DEFAULT_RECONNECT_DELAY};
pub use codec::{IceCandidate, NumberValues, SdpType, SessionDescription, SignalingMessage};
pub use transport::{Connection, Connector, WsConnector};
